pub mod io;

use anyhow::{anyhow, Context, Result};
use std::{fs, path::Path};

pub use io::{read_from_stdin, read_lines, LOG_PREFIX_INFO};

/// Parse a `key=value` command line filter.
pub fn parse_key_value(string: &str) -> Result<(String, String)> {
    let (key, value) = string
        .split_once('=')
        .ok_or_else(|| anyhow!("expected `key=value`, got `{}`", string))?;
    if key.is_empty() {
        return Err(anyhow!("empty key in `{}`", string));
    }
    Ok((key.to_owned(), value.to_owned()))
}

pub fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Could not read file `{}`", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Could not parse JSON in `{}`", path.display()))
}
