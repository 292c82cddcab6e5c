use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};
use url::Url;

/// Contents of the contexts file: named logins and the one in use.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct NexusConfig {
    current_context: Option<String>,
    contexts: Vec<ContextConfig>,
}

impl NexusConfig {
    pub fn get_all_contexts(&self) -> &Vec<ContextConfig> {
        &self.contexts
    }

    pub fn get_context(&self, name: &str) -> Option<&ContextConfig> {
        self.contexts.iter().find(|context| context.name == name)
    }

    /// Insert or replace a context. Returns whether one with the same name existed.
    pub fn set_context(&mut self, context: ContextConfig) -> bool {
        match self.context_position(&context.name) {
            Some(index) => {
                self.contexts[index] = context;
                true
            }
            None => {
                self.contexts.push(context);
                false
            }
        }
    }

    pub fn delete_context(&mut self, name: &str) -> bool {
        let Some(index) = self.context_position(name) else {
            return false;
        };
        self.contexts.remove(index);
        if self.current_context.as_deref() == Some(name) {
            self.current_context = None;
        }
        true
    }

    pub fn get_current_context(&self) -> Option<&ContextConfig> {
        self.current_context
            .as_ref()
            .and_then(|current_context| self.get_context(current_context))
    }

    pub fn set_current_context(&mut self, name: &str) -> bool {
        if self.get_context(name).is_some() {
            self.current_context = Some(name.to_owned());
            true
        } else {
            false
        }
    }

    pub fn num_contexts(&self) -> usize {
        self.contexts.len()
    }

    fn context_position(&self, name: &str) -> Option<usize> {
        self.contexts
            .iter()
            .position(|context| context.name == name)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContextConfig {
    pub name: String,
    pub endpoint: Url,
    #[serde(default)]
    pub direct_endpoint: Option<Url>,
    pub username: String,
    /// Stored in clear text when present. Prompted for on every call otherwise.
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub accept_invalid_certificates: bool,
    #[serde(default)]
    pub proxy: Option<Url>,
}

pub fn read_nexus_config(path: impl AsRef<Path>) -> Result<NexusConfig> {
    let path = path.as_ref();
    debug!("Reading config file at `{}`", path.display());
    if !path.exists() {
        return Ok(Default::default());
    }
    let file = File::open(path)
        .with_context(|| format!("Could not open config file `{}`", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Could not parse config file `{}`", path.display()))
}

pub fn write_nexus_config(path: impl AsRef<Path>, config: &NexusConfig) -> Result<()> {
    let path = path.as_ref();
    debug!("Writing config file at `{}`", path.display());
    let file = File::create(path)
        .with_context(|| format!("Could not create config file `{}`", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &config)
        .with_context(|| format!("Could not serialise configuration to `{}`", path.display()))
}
