use anyhow::{anyhow, Context, Error, Result};
use log::info;
use nexus_client::{
    Client, ReportArchive, ReportDefinition, ReportRequest, SavedReports, TransferStatistics,
};
use serde::Deserialize;
use std::{collections::BTreeMap, fs, path::PathBuf, str::FromStr, time::Instant};
use structopt::StructOpt;

use crate::{
    printer::{Printer, SavedFile},
    progress::{Progress, ProgressMessage},
    utils::read_json_file,
};

#[derive(Debug, StructOpt)]
pub enum ReportArgs {
    #[structopt(name = "run")]
    /// Compute reports and save them as CSV files
    Run(RunReportArgs),

    #[structopt(name = "meta")]
    /// Show the report types and columns the API offers
    Meta,

    #[structopt(name = "history")]
    /// Show recently requested reports
    History,
}

#[derive(Debug, StructOpt)]
pub struct RunReportArgs {
    #[structopt(long = "preset")]
    /// Built-in report to run: `network-analytics` or `segment-load`. Can be repeated.
    presets: Vec<Preset>,

    #[structopt(long = "file", parse(from_os_str))]
    /// JSON file holding one report request, or an object of named requests
    file: Option<PathBuf>,

    #[structopt(long = "name")]
    /// Name of the report read from `--file`, when it holds a single request
    name: Option<String>,

    #[structopt(long = "interval")]
    /// Override the `report_interval` of every report, e.g. `yesterday`
    interval: Option<String>,

    #[structopt(long = "start-date")]
    /// Override the start date of every report
    start_date: Option<String>,

    #[structopt(long = "end-date")]
    /// Override the end date of every report
    end_date: Option<String>,

    #[structopt(long = "output-dir", parse(from_os_str), default_value = ".")]
    /// Folder the reports are written to
    output_dir: PathBuf,

    #[structopt(long = "zip")]
    /// Bundle the reports into a single zip archive
    zip: bool,

    #[structopt(long = "zip-name")]
    /// Name of the archive, without extension. Defaults to `reports_<date>`.
    zip_name: Option<String>,

    #[structopt(long = "no-progress")]
    /// Don't display a progress bar
    no_progress: bool,
}

#[derive(Debug, Clone, Copy)]
pub enum Preset {
    NetworkAnalytics,
    SegmentLoad,
}

impl Preset {
    fn name(self) -> &'static str {
        match self {
            Preset::NetworkAnalytics => "network_analytics",
            Preset::SegmentLoad => "segment_load",
        }
    }

    fn definition(self) -> ReportDefinition {
        match self {
            Preset::NetworkAnalytics => ReportDefinition::network_analytics(),
            Preset::SegmentLoad => ReportDefinition::segment_load(),
        }
    }
}

impl FromStr for Preset {
    type Err = Error;

    fn from_str(string: &str) -> Result<Self> {
        match string.replace('_', "-").as_str() {
            "network-analytics" => Ok(Preset::NetworkAnalytics),
            "segment-load" => Ok(Preset::SegmentLoad),
            _ => Err(anyhow!("unknown report preset `{}`", string)),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ReportFile {
    Request(ReportRequest),
    Definition(ReportDefinition),
    Named(BTreeMap<String, ReportRequest>),
}

pub fn run(args: &ReportArgs, client: Client, printer: &Printer) -> Result<()> {
    match args {
        ReportArgs::Run(run_args) => run_reports(run_args, &client, printer),
        ReportArgs::Meta => {
            let meta = client
                .get_reports_meta()
                .context("Operation to get report metadata has failed.")?;
            printer.print_json(&[meta])
        }
        ReportArgs::History => {
            let history = client
                .get_reports_history()
                .context("Operation to get report history has failed.")?;
            printer.print_json(&[history])
        }
    }
}

fn run_reports(args: &RunReportArgs, client: &Client, printer: &Printer) -> Result<()> {
    let requests = collect_requests(args)?;
    if requests.is_empty() {
        return Err(anyhow!("Nothing to run, use `--preset` or `--file`."));
    }

    fs::create_dir_all(&args.output_dir).with_context(|| {
        format!("Could not create folder `{}`", args.output_dir.display())
    })?;

    let archive = if args.zip {
        ReportArchive::Zip {
            name: args.zip_name.clone(),
        }
    } else {
        ReportArchive::Files
    };

    let started = Instant::now();
    let progress = if args.no_progress {
        None
    } else {
        Some(download_progress(&client.transfer_statistics()))
    };
    let saved = client
        .save_reports(&requests, &args.output_dir, archive)
        .context("Operation to run reports has failed.")?;
    drop(progress);
    info!(
        "Saved {} report(s) in {:.1}s",
        requests.len(),
        started.elapsed().as_secs_f64()
    );

    let files: Vec<SavedFile> = match saved {
        SavedReports::Archive(path) => vec![SavedFile {
            name: path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default(),
            report_type: None,
            path,
        }],
        SavedReports::Files(reports) => reports
            .into_iter()
            .map(|(path, report)| SavedFile {
                name: path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                report_type: Some(report.report_type),
                path,
            })
            .collect(),
    };
    printer.print_resources(&files)
}

fn collect_requests(args: &RunReportArgs) -> Result<BTreeMap<String, ReportRequest>> {
    let mut requests: BTreeMap<String, ReportRequest> = args
        .presets
        .iter()
        .map(|preset| (preset.name().to_owned(), ReportRequest::from(preset.definition())))
        .collect();

    if let Some(path) = &args.file {
        match read_json_file::<ReportFile>(path)? {
            ReportFile::Named(named) => requests.extend(named),
            ReportFile::Request(request) => {
                requests.insert(single_report_name(args, path), request);
            }
            ReportFile::Definition(definition) => {
                requests.insert(single_report_name(args, path), definition.into());
            }
        }
    }

    for request in requests.values_mut() {
        if let Some(interval) = &args.interval {
            request.report.report_interval = Some(interval.clone());
            request.report.start_date = None;
            request.report.end_date = None;
        }
        if let Some(start_date) = &args.start_date {
            request.report.report_interval = None;
            request.report.start_date = Some(start_date.clone());
        }
        if let Some(end_date) = &args.end_date {
            request.report.end_date = Some(end_date.clone());
        }
    }
    Ok(requests)
}

fn single_report_name(args: &RunReportArgs, path: &std::path::Path) -> String {
    args.name.clone().unwrap_or_else(|| {
        path.file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "report".to_owned())
    })
}

fn download_progress(statistics: &std::sync::Arc<TransferStatistics>) -> Progress {
    Progress::new(
        |statistics: &TransferStatistics| ProgressMessage {
            position: statistics.transferred(),
            length: statistics.expected(),
            prefix: "downloading".to_owned(),
        },
        statistics,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn run_args(command_line: &[&str]) -> RunReportArgs {
        RunReportArgs::from_iter_safe(std::iter::once("run").chain(command_line.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_presets_with_interval_override() {
        let requests = collect_requests(&run_args(&[
            "--preset",
            "network-analytics",
            "--preset",
            "segment_load",
            "--interval",
            "last_7_days",
        ]))
        .unwrap();

        assert_eq!(
            requests.keys().collect::<Vec<_>>(),
            vec!["network_analytics", "segment_load"]
        );
        for request in requests.values() {
            assert_eq!(request.report.report_interval.as_deref(), Some("last_7_days"));
        }
    }

    #[test]
    fn test_single_request_file_is_named_after_the_file() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("daily_spend.json");
        write!(
            fs::File::create(&path).unwrap(),
            r#"{{"report": {{"report_type": "network_analytics", "columns": ["day", "imps"]}}}}"#
        )
        .unwrap();

        let requests =
            collect_requests(&run_args(&["--file", path.to_str().unwrap()])).unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests["daily_spend"].report.columns,
            vec!["day".to_owned(), "imps".to_owned()]
        );
    }

    #[test]
    fn test_named_request_file() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("reports.json");
        fs::write(
            &path,
            r#"{
                "loads": {"report": {"report_type": "segment_load"}},
                "spend": {"report": {"report_type": "network_analytics"}}
            }"#,
        )
        .unwrap();

        let requests =
            collect_requests(&run_args(&["--file", path.to_str().unwrap()])).unwrap();
        assert_eq!(requests["loads"].report_type(), "segment_load");
        assert_eq!(requests["spend"].report_type(), "network_analytics");
    }
}
