use colored::Colorize;
use nexus_client::{CustomModel, Names};
use prettytable::{cell, format, row, Row, Table};
use serde::Serialize;
use serde_json::Value;

use anyhow::{anyhow, Context, Error, Result};
use std::{
    io::{self, Write},
    path::PathBuf,
    str::FromStr,
};

pub fn print_resources_as_json<Resource>(
    resources: impl IntoIterator<Item = Resource>,
    mut writer: impl Write,
) -> Result<()>
where
    Resource: Serialize,
{
    for resource in resources {
        serde_json::to_writer(&mut writer, &resource)
            .context("Could not serialise resource.")
            .and_then(|_| writeln!(writer).context("Failed to write JSON resource to writer."))?;
    }
    Ok(())
}

#[derive(Copy, Clone, Debug, Default)]
pub enum OutputFormat {
    Json,
    #[default]
    Table,
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(string: &str) -> Result<Self> {
        match string {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            _ => Err(anyhow!("unknown output format `{}`", string)),
        }
    }
}

/// Represents a resource that is able to be displayed as a table.
pub trait DisplayTable {
    fn to_table_headers() -> Row;

    fn to_table_row(&self) -> Row;
}

/// One entry of an id to name mapping.
#[derive(Debug, Clone, Serialize)]
pub struct NamedObject {
    pub id: u64,
    pub name: Option<String>,
}

pub fn named_objects(names: Names) -> Vec<NamedObject> {
    names
        .into_iter()
        .map(|(id, name)| NamedObject { id, name })
        .collect()
}

impl DisplayTable for NamedObject {
    fn to_table_headers() -> Row {
        row![bFg => "ID", "Name"]
    }

    fn to_table_row(&self) -> Row {
        row![
            self.id,
            match &self.name {
                Some(name) => name.as_str().into(),
                None => "unnamed".dimmed(),
            }
        ]
    }
}

impl DisplayTable for CustomModel {
    fn to_table_headers() -> Row {
        row![bFg => "ID", "Name", "Advertiser", "Output"]
    }

    fn to_table_row(&self) -> Row {
        let field = |key: &str| match self.extra.get(key) {
            Some(Value::Null) | None => "-".dimmed(),
            Some(Value::String(value)) => value.as_str().into(),
            Some(value) => value.to_string().normal(),
        };
        row![
            self.id,
            self.name.as_deref().unwrap_or_default(),
            field("advertiser_id"),
            field("model_output")
        ]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Metric {
    pub metric: String,
    pub value: Value,
}

impl DisplayTable for Metric {
    fn to_table_headers() -> Row {
        row![bFg => "Metric", "Value"]
    }

    fn to_table_row(&self) -> Row {
        row![
            self.metric,
            match &self.value {
                Value::Null => "-".dimmed(),
                value => value.to_string().bold(),
            }
        ]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SavedFile {
    pub name: String,
    pub report_type: Option<String>,
    pub path: PathBuf,
}

impl DisplayTable for SavedFile {
    fn to_table_headers() -> Row {
        row![bFg => "Name", "Type", "Path"]
    }

    fn to_table_row(&self) -> Row {
        row![
            self.name,
            self.report_type.as_deref().unwrap_or("archive"),
            self.path.display()
        ]
    }
}

/// Helper trait to allow collection of resources to be converted into a table.
pub trait IntoTable {
    fn into_table(self) -> Table;
}

/// All iterators of resources can be converted into a table.
impl<'a, Iterable, Item: 'a> IntoTable for Iterable
where
    Iterable: IntoIterator<Item = &'a Item>,
    Item: DisplayTable,
{
    fn into_table(self) -> Table {
        let mut table = new_table();
        table.set_titles(Item::to_table_headers());
        for resource in self.into_iter() {
            table.add_row(resource.to_table_row());
        }
        table
    }
}

pub fn new_table() -> Table {
    let mut table = Table::new();
    let format = format::FormatBuilder::new()
        .column_separator(' ')
        .borders(' ')
        .separators(&[], format::LineSeparator::new('-', '+', '+', '+'))
        .padding(0, 1)
        .build();
    table.set_format(format);
    table
}

/// Print resources using the selected output format.
#[derive(Default, Debug)]
pub struct Printer {
    output: OutputFormat,
}

impl Printer {
    pub fn new(output: OutputFormat) -> Self {
        Self { output }
    }

    pub fn print_resources<T, Resource>(&self, resources: T) -> Result<()>
    where
        T: IntoIterator<Item = Resource> + IntoTable,
        Resource: Serialize,
    {
        match self.output {
            OutputFormat::Table => resources.into_table().printstd(),
            OutputFormat::Json => print_resources_as_json(resources, io::stdout().lock())?,
        };
        Ok(())
    }

    /// Raw API responses have no table layout and are always printed as JSON lines.
    pub fn print_json(&self, values: &[Value]) -> Result<()> {
        print_resources_as_json(values, io::stdout().lock())
    }
}
