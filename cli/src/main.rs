#![deny(clippy::all)]
mod args;
mod commands;
mod config;
mod printer;
mod progress;
mod utils;

use anyhow::{anyhow, Context, Result};
use log::{error, warn};
use nexus_client::{
    Client, Config as ClientConfig, Credentials, DEFAULT_DIRECT_ENDPOINT, DEFAULT_ENDPOINT,
};
use std::{fs, io, path::PathBuf, process};
use structopt::{clap::Shell as ClapShell, StructOpt};

use crate::{
    args::{Args, Command, Shell},
    commands::{config as config_command, get, model, report, segment},
    config::NexusConfig,
    printer::Printer,
    utils::{
        io::{init_env_logger, read_password},
        read_from_stdin,
    },
};

fn run(args: Args) -> Result<()> {
    let config_path = find_configuration(&args)?;
    let cli_config = config::read_nexus_config(&config_path)?;
    let printer = Printer::new(args.output);

    match &args.command {
        Command::Config { config_args } => {
            config_command::run(config_args, cli_config, config_path).map(|_| ())
        }
        Command::Completion { shell } => {
            let mut app = Args::clap();
            let clap_shell = match shell {
                Shell::Zsh => ClapShell::Zsh,
                Shell::Bash => ClapShell::Bash,
            };
            app.gen_completions_to("nexus", clap_shell, &mut io::stdout());
            Ok(())
        }
        Command::Get { get_args } => {
            get::run(get_args, client_from_args(&args, &cli_config)?, &printer)
        }
        Command::Report { report_args } => {
            report::run(report_args, client_from_args(&args, &cli_config)?, &printer)
        }
        Command::Segment { segment_args } => {
            segment::run(segment_args, client_from_args(&args, &cli_config)?, &printer)
        }
        Command::Model { model_args } => {
            model::run(model_args, client_from_args(&args, &cli_config)?, &printer)
        }
    }
}

fn client_from_args(args: &Args, config: &NexusConfig) -> Result<Client> {
    let current_context = if let Some(context_name) = args.context.as_ref() {
        let context = config.get_context(context_name);
        if context.is_none() {
            return Err(anyhow!("Unknown context `{}`.", context_name));
        };
        context
    } else {
        config.get_current_context()
    };

    let endpoint = args
        .endpoint
        .clone()
        .or_else(|| current_context.map(|context| context.endpoint.clone()))
        .unwrap_or_else(|| DEFAULT_ENDPOINT.clone());

    let direct_endpoint = args
        .direct_endpoint
        .clone()
        .or_else(|| current_context.and_then(|context| context.direct_endpoint.clone()))
        .unwrap_or_else(|| DEFAULT_DIRECT_ENDPOINT.clone());

    let username = match args
        .username
        .clone()
        .or_else(|| current_context.map(|context| context.username.clone()))
    {
        Some(username) => username,
        None => read_from_stdin("Username", None)?,
    };

    let password = match args
        .password
        .clone()
        .or_else(|| current_context.and_then(|context| context.password.clone()))
    {
        Some(password) => password,
        None => read_password(&username)?,
    };

    let accept_invalid_certificates = args
        .accept_invalid_certificates
        .or_else(|| current_context.map(|context| context.accept_invalid_certificates))
        .unwrap_or(false);

    if accept_invalid_certificates {
        warn!(concat!(
            "TLS certificate verification is disabled. ",
            "Do NOT use this over an insecure network."
        ));
    }

    let proxy = args
        .proxy
        .clone()
        .or_else(|| current_context.and_then(|context| context.proxy.clone()));

    Client::new(ClientConfig {
        endpoint,
        direct_endpoint,
        credentials: Credentials::new(username, password),
        accept_invalid_certificates,
        proxy,
        ..Default::default()
    })
    .context("Failed to initialise the API client.")
}

fn find_configuration(args: &Args) -> Result<PathBuf> {
    let config_path = if let Some(config_path) = args.config.clone() {
        if !config_path.exists() {
            warn!(
                "Configuration file `{}` doesn't exist.",
                config_path.display()
            );
        }
        config_path
    } else {
        let mut config_path =
            dirs::config_dir().context("Could not get path to the user's config directory")?;
        config_path.push("nexus");
        fs::create_dir_all(&config_path).with_context(|| {
            format!(
                "Could not create config directory {}",
                config_path.display()
            )
        })?;
        config_path.push("contexts.json");
        config_path
    };
    Ok(config_path)
}

fn main() {
    let args = Args::from_args();
    init_env_logger(args.verbose);

    if let Err(error) = run(args) {
        error!("An error occurred:");
        for cause in error.chain() {
            error!(" |- {cause}");
        }

        #[cfg(feature = "backtrace")]
        {
            error!("{}", error.backtrace());
        }

        process::exit(1);
    }
}
