use anyhow::{Context, Result};
use log::info;
use nexus_client::{Client, MemberId, NewCustomModel};
use std::{
    fs,
    path::{Path, PathBuf},
};
use structopt::StructOpt;

use crate::printer::Printer;

#[derive(Debug, StructOpt)]
pub enum ModelArgs {
    #[structopt(name = "ls")]
    /// List the custom models of the member
    List,

    #[structopt(name = "get")]
    /// Get one custom model with all its fields
    Get {
        #[structopt(name = "model-id")]
        model_id: u64,
    },

    #[structopt(name = "check")]
    /// Validate a model file with the parser service without saving it
    Check {
        #[structopt(long = "file", parse(from_os_str))]
        /// File with the model text
        file: PathBuf,
    },

    #[structopt(name = "add")]
    /// Create a custom model
    Add(ModelDefinitionArgs),

    #[structopt(name = "modify")]
    /// Replace the text and settings of the model with the given name
    Modify(ModelDefinitionArgs),

    #[structopt(name = "delete")]
    /// Delete custom models
    Delete {
        #[structopt(name = "model-id")]
        /// Ids of the models to delete
        model_ids: Vec<u64>,
    },
}

#[derive(Debug, StructOpt)]
pub struct ModelDefinitionArgs {
    #[structopt(long = "name")]
    /// Name of the model
    name: String,

    #[structopt(long = "file", parse(from_os_str))]
    /// File with the model text
    file: PathBuf,

    #[structopt(long = "member-id")]
    /// Member owning the model. Looked up from the login when omitted.
    member_id: Option<u64>,

    #[structopt(long = "advertiser-id")]
    /// Restrict the model to one advertiser
    advertiser_id: Option<u64>,

    #[structopt(long = "output", default_value = "bid_modifier")]
    /// What the model computes, `bid` or `bid_modifier`
    model_output: String,
}

pub fn run(args: &ModelArgs, client: Client, printer: &Printer) -> Result<()> {
    match args {
        ModelArgs::List => {
            let mut models = client
                .get_custom_models()
                .context("Operation to list custom models has failed.")?;
            models.sort_unstable_by_key(|model| model.id);
            printer.print_resources(&models)?;
        }
        ModelArgs::Get { model_id } => {
            let model = client
                .get_custom_model(*model_id)
                .context("Operation to get custom model has failed.")?;
            printer.print_json(&[model])?;
        }
        ModelArgs::Check { file } => {
            client
                .check_custom_model(&read_model_text(file)?)
                .context("Model is not valid.")?;
            info!("Model in `{}` is valid.", file.display());
        }
        ModelArgs::Add(definition) => {
            let model = new_custom_model(definition, &client)?;
            let response = client
                .add_custom_model(&model)
                .context("Operation to add custom model has failed.")?;
            printer.print_json(&[response])?;
        }
        ModelArgs::Modify(definition) => {
            let model = new_custom_model(definition, &client)?;
            let response = client
                .modify_custom_model(&definition.name, &model)
                .context("Operation to modify custom model has failed.")?;
            printer.print_json(&[response])?;
        }
        ModelArgs::Delete { model_ids } => {
            for model_id in model_ids {
                client
                    .delete_custom_model(*model_id)
                    .with_context(|| format!("Operation to delete model {model_id} has failed."))?;
                info!("Deleted custom model {}.", model_id);
            }
        }
    };
    Ok(())
}

fn read_model_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Could not read model `{}`", path.display()))
}

fn new_custom_model(args: &ModelDefinitionArgs, client: &Client) -> Result<NewCustomModel> {
    let member_id = match args.member_id {
        Some(member_id) => MemberId(member_id),
        None => client.member_id()?,
    };
    Ok(NewCustomModel {
        name: args.name.clone(),
        member_id,
        advertiser_id: args.advertiser_id,
        model_output: args.model_output.clone(),
        model_text: read_model_text(&args.file)?,
    })
}
