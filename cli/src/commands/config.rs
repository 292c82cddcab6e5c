use colored::Colorize;
use log::{error, info, warn};
use nexus_client::DEFAULT_ENDPOINT;
use prettytable::{cell, row};
use std::path::Path;
use structopt::StructOpt;
use url::Url;

use crate::{
    config::{self, ContextConfig, NexusConfig},
    printer::new_table,
    utils::{self, io::read_password},
};
use anyhow::Result;

#[derive(Debug, StructOpt)]
pub enum ConfigArgs {
    #[structopt(name = "add")]
    /// Add a new context to the nexus config file
    AddContext {
        #[structopt(long = "name", short = "n")]
        /// The name of the context that will be created or updated
        name: Option<String>,

        #[structopt(long = "endpoint", short = "e")]
        /// The console API endpoint that will be used for this context
        endpoint: Option<Url>,

        #[structopt(long = "direct-endpoint")]
        /// The direct API endpoint used for member segments
        direct_endpoint: Option<Url>,

        #[structopt(long = "username", short = "u")]
        /// The username that will be used for this context
        username: Option<String>,

        #[structopt(long = "password")]
        /// The password that will be stored with this context
        password: Option<String>,

        #[structopt(long = "save-password")]
        /// Prompt for a password and store it when none is given
        save_password: bool,

        #[structopt(long = "accept-invalid-certificates", short = "k")]
        /// Whether to accept invalid TLS certificates
        accept_invalid_certificates: bool,

        #[structopt(long = "proxy")]
        /// URL for an HTTP proxy that will be used for all requests if specified
        proxy: Option<Option<Url>>,
    },

    #[structopt(name = "current")]
    /// Display the current context
    CurrentContext,

    #[structopt(name = "delete")]
    /// Delete the specified context from the nexus config file
    DeleteContext {
        /// The name(s) of the context(s) which will be deleted
        names: Vec<String>,
    },

    #[structopt(name = "ls")]
    /// List available contexts in a nexus config file
    ListContexts {
        #[structopt(long = "passwords")]
        /// Show stored passwords (by default they are hidden).
        passwords: bool,
    },

    #[structopt(name = "use")]
    /// Set the current context in the nexus config file
    UseContext {
        /// The name of the context.
        name: String,
    },
}

pub fn run(
    args: &ConfigArgs,
    mut config: NexusConfig,
    config_path: impl AsRef<Path>,
) -> Result<NexusConfig> {
    match args {
        ConfigArgs::ListContexts { passwords } if config.num_contexts() > 0 => {
            let mut contexts = config.get_all_contexts().clone();
            contexts.sort_unstable_by(|lhs, rhs| lhs.name.cmp(&rhs.name));
            let mut table = new_table();
            table.set_titles(
                row![bFg => "Active", "Context", "Endpoint", "Username", "Insecure", "Password", "Proxy"],
            );
            let current = config.get_current_context().map(|context| context.name.clone());
            for context in contexts.iter() {
                let active = current.as_deref() == Some(context.name.as_str());
                table.add_row(row![
                    if active { "    ->" } else { "" },
                    if active {
                        context.name.bold().bright_white()
                    } else {
                        context.name.normal()
                    },
                    context.endpoint,
                    context.username,
                    if context.accept_invalid_certificates {
                        "Yes"
                    } else {
                        "No"
                    },
                    match (&context.password, *passwords) {
                        (None, _) => String::new(),
                        (Some(password), true) => password.clone(),
                        (Some(_), false) => "<Hidden>".into(),
                    },
                    context
                        .proxy
                        .as_ref()
                        .map(Url::to_string)
                        .unwrap_or_default()
                ]);
            }
            table.printstd();
        }
        ConfigArgs::ListContexts { .. } => {
            info!("No available contexts.");
        }
        ConfigArgs::AddContext {
            name,
            endpoint,
            direct_endpoint,
            username,
            password,
            save_password,
            accept_invalid_certificates,
            proxy,
        } => {
            let context = prompt_context(
                ContextArgs {
                    name,
                    endpoint,
                    direct_endpoint,
                    username,
                    password,
                    save_password: *save_password,
                    accept_invalid_certificates: *accept_invalid_certificates,
                    proxy,
                },
                &config,
                config_path.as_ref(),
            )?;
            add_or_edit_context(context, &mut config, config_path.as_ref())?;
        }
        ConfigArgs::UseContext { name } => {
            if !config.set_current_context(name) {
                error!(
                    "No such context `{}` exists in `{}`.",
                    name,
                    config_path.as_ref().display()
                );
            } else {
                config::write_nexus_config(config_path, &config)?;
                info!("Switched to context `{}`.", name);
            }
        }
        ConfigArgs::CurrentContext => config.get_current_context().map_or_else(
            || info!("There is no default context in use."),
            |current_context| println!("{}", current_context.name),
        ),
        ConfigArgs::DeleteContext { names } => {
            for name in names {
                if config.delete_context(name) {
                    config::write_nexus_config(&config_path, &config)?;
                    info!(
                        "Deleted context `{}` from `{}`.",
                        name,
                        config_path.as_ref().display()
                    );
                } else {
                    error!(
                        "No such context `{}` exists in `{}`.",
                        name,
                        config_path.as_ref().display()
                    );
                }
            }
        }
    }
    Ok(config)
}

struct ContextArgs<'a> {
    name: &'a Option<String>,
    endpoint: &'a Option<Url>,
    direct_endpoint: &'a Option<Url>,
    username: &'a Option<String>,
    password: &'a Option<String>,
    save_password: bool,
    accept_invalid_certificates: bool,
    proxy: &'a Option<Option<Url>>,
}

/// Fill in whatever the command line left out, from the existing context or from stdin.
fn prompt_context(
    args: ContextArgs<'_>,
    config: &NexusConfig,
    config_path: &Path,
) -> Result<ContextConfig> {
    let name = loop {
        let name = match args.name {
            None => utils::read_from_stdin("Context name", None)?,
            Some(name) => name.clone(),
        };
        if !name.is_empty() {
            break name;
        } else {
            error!("Context name cannot be empty.");
        }
    };

    let existing_context = config.get_context(&name);
    if existing_context.is_some() {
        info!("Context `{}` already exists, it will be modified.", name);
    } else {
        info!("A new context `{}` will be created.", name);
    }

    let endpoint = match args.endpoint {
        None => loop {
            let default = existing_context
                .map(|context| context.endpoint.as_str())
                .unwrap_or_else(|| DEFAULT_ENDPOINT.as_str());
            match Url::parse(&utils::read_from_stdin("Endpoint", Some(default))?) {
                Ok(url) => break url,
                Err(error) => error!("Invalid endpoint URL: {}", error),
            }
        },
        Some(endpoint) => endpoint.clone(),
    };

    let username = loop {
        let username = match args.username {
            None => utils::read_from_stdin(
                "Username",
                existing_context.map(|context| context.username.as_str()),
            )?,
            Some(username) => username.clone(),
        };
        if !username.is_empty() {
            break username;
        } else {
            error!("Username cannot be empty.");
        }
    };

    let password = match (args.password, args.save_password) {
        (Some(password), _) => Some(password.clone()),
        (None, true) => Some(read_password(&username)?),
        (None, false) => None,
    };
    if password.is_none() {
        info!(concat!(
            "No password was associated with the context. ",
            "You will have to enter it for every request."
        ));
    } else {
        warn!(
            "Be careful, passwords are stored in cleartext in {}.",
            config_path.display()
        );
    }

    Ok(ContextConfig {
        name,
        endpoint,
        direct_endpoint: args
            .direct_endpoint
            .clone()
            .or_else(|| existing_context.and_then(|context| context.direct_endpoint.clone())),
        username,
        password,
        accept_invalid_certificates: args.accept_invalid_certificates,
        proxy: args
            .proxy
            .clone()
            .unwrap_or_else(|| existing_context.and_then(|context| context.proxy.clone())),
    })
}

fn add_or_edit_context(
    context: ContextConfig,
    config: &mut NexusConfig,
    config_path: &Path,
) -> Result<()> {
    let name = context.name.clone();
    let update_existing = config.set_context(context);
    if !update_existing && config.num_contexts() == 1 {
        info!("Default context set to `{}`.", name);
        config.set_current_context(&name);
    }

    config::write_nexus_config(config_path, config)?;

    if update_existing {
        info!("Context `{}` was updated.", name);
    } else {
        info!("New context `{}` was created.", name);
    }
    Ok(())
}
