pub mod config;
pub mod get;
pub mod model;
pub mod report;
pub mod segment;
