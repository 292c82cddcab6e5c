use crate::{
    commands::{
        config::ConfigArgs, get::GetArgs, model::ModelArgs, report::ReportArgs,
        segment::SegmentArgs,
    },
    printer::OutputFormat,
};
use anyhow::{anyhow, Error, Result};
use std::{path::PathBuf, str::FromStr};
use structopt::StructOpt;
use url::Url;

/// nexus is the command line interface to the AppNexus console API.
#[derive(Debug, StructOpt)]
#[structopt(
    global_settings = &[
        structopt::clap::AppSettings::ColoredHelp,
        structopt::clap::AppSettings::InferSubcommands,
    ]
)]
pub struct Args {
    #[structopt(long = "config-file", parse(from_os_str))]
    /// Path to the configuration file. Typically defaults to ~/.config/nexus on Linux.
    pub config: Option<PathBuf>,

    #[structopt(short = "c", long = "context")]
    /// Specify what context to use. Overrides the current context, if any.
    pub context: Option<String>,

    #[structopt(short = "v", long = "verbose")]
    /// Enable more verbose logging.
    pub verbose: bool,

    #[structopt(long = "endpoint", parse(try_from_str))]
    /// Specify what API endpoint to use. Overrides the one from the current
    /// context, if any.
    pub endpoint: Option<Url>,

    #[structopt(long = "direct-endpoint", parse(try_from_str))]
    /// Specify the direct API endpoint used for member segments.
    pub direct_endpoint: Option<Url>,

    #[structopt(long = "username")]
    /// Username to log in with. Overrides the one from the current context, if any.
    pub username: Option<String>,

    #[structopt(long = "password")]
    /// Password to log in with. Prompted for when neither given nor stored in the context.
    pub password: Option<String>,

    #[structopt(short = "k", long = "accept-invalid-certificates", parse(try_from_str))]
    pub accept_invalid_certificates: Option<bool>,

    #[structopt(long = "proxy")]
    /// URL of an HTTP proxy used for all requests.
    pub proxy: Option<Url>,

    #[structopt(short = "o", long = "output", default_value = "table")]
    /// Output format. One of: table, json
    pub output: OutputFormat,

    #[structopt(subcommand)]
    pub command: Command,
}

#[derive(Debug, StructOpt)]
pub enum Command {
    #[structopt(name = "completion")]
    /// Output shell completion code for the specified shell (bash or zsh)
    Completion { shell: Shell },

    #[structopt(name = "config")]
    /// Manage login and endpoint contexts
    Config {
        #[structopt(subcommand)]
        config_args: ConfigArgs,
    },

    #[structopt(name = "get")]
    /// Read objects of a console service
    Get {
        #[structopt(flatten)]
        get_args: GetArgs,
    },

    #[structopt(name = "report")]
    /// Run reports and inspect the report service
    Report {
        #[structopt(subcommand)]
        report_args: ReportArgs,
    },

    #[structopt(name = "segment")]
    /// Upload users to segments and manage segments
    Segment {
        #[structopt(subcommand)]
        segment_args: SegmentArgs,
    },

    #[structopt(name = "model")]
    /// Manage custom bidding models
    Model {
        #[structopt(subcommand)]
        model_args: ModelArgs,
    },
}

#[derive(Debug)]
pub enum Shell {
    Bash,
    Zsh,
}

impl FromStr for Shell {
    type Err = Error;

    fn from_str(string: &str) -> Result<Self> {
        match string {
            "bash" => Ok(Shell::Bash),
            "zsh" => Ok(Shell::Zsh),
            _ => Err(anyhow!("unknown shell: '{}'", string)),
        }
    }
}
