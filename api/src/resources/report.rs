use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::{
    borrow::Cow,
    collections::BTreeMap,
    fs::{self, File},
    io::{Cursor, Write},
    path::{Path, PathBuf},
    thread::sleep,
    time::Instant,
};
use zip::{write::SimpleFileOptions, ZipWriter};

use crate::{
    error::{Error, Result},
    resources::{id_string, str_field},
    Client, Request,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDefinition {
    pub report_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_interval: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub orders: Vec<String>,

    #[serde(default = "default_format")]
    pub format: String,

    /// Any other report field, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_format() -> String {
    "csv".to_owned()
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_owned()).collect()
}

impl ReportDefinition {
    pub fn new(report_type: impl Into<String>) -> Self {
        Self {
            report_type: report_type.into(),
            report_interval: None,
            start_date: None,
            end_date: None,
            columns: Vec::new(),
            filters: Vec::new(),
            groups: Vec::new(),
            orders: Vec::new(),
            format: default_format(),
            extra: Map::new(),
        }
    }

    /// Hourly delivery per advertiser over the last 30 days, for France.
    pub fn network_analytics() -> Self {
        Self {
            report_interval: Some("last_30_days".to_owned()),
            columns: strings(&[
                "hour",
                "insertion_order_id",
                "line_item_id",
                "campaign_id",
                "advertiser_id",
                "pixel_id",
                "imps",
                "imps_viewed",
                "clicks",
                "cost",
                "cpm",
                "cpm_including_fees",
                "revenue",
                "revenue_including_fees",
                "total_convs",
                "geo_country",
            ]),
            filters: vec![json!({"geo_country": "FR"})],
            groups: strings(&["advertiser_id", "hour"]),
            ..Self::new("network_analytics")
        }
    }

    /// Monthly loads and uniques per segment, month to date.
    pub fn segment_load() -> Self {
        Self {
            report_interval: Some("month_to_date".to_owned()),
            columns: strings(&[
                "segment_id",
                "segment_name",
                "month",
                "total_loads",
                "monthly_uniques",
                "avg_daily_uniques",
            ]),
            groups: strings(&["segment_id", "month"]),
            orders: strings(&["month"]),
            ..Self::new("segment_load")
        }
    }
}

/// Body of a report submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub report: ReportDefinition,
}

impl From<ReportDefinition> for ReportRequest {
    fn from(report: ReportDefinition) -> Self {
        Self { report }
    }
}

impl ReportRequest {
    pub fn report_type(&self) -> &str {
        &self.report.report_type
    }
}

/// A report accepted by the API and being computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedReport {
    pub report_id: String,
    pub report_type: String,
}

/// A computed report waiting to be downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyReport {
    pub report_id: String,
    pub report_type: String,
    pub url: String,
    pub size: Option<u64>,
}

/// A downloaded report, either held in memory or written to `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub report_type: String,
    pub path: Option<PathBuf>,
    pub data: Option<Vec<u8>>,
}

impl Report {
    pub fn contents(&self) -> Result<Cow<'_, [u8]>> {
        match (&self.data, &self.path) {
            (Some(data), _) => Ok(Cow::Borrowed(data)),
            (None, Some(path)) => fs::read(path).map(Cow::Owned).map_err(|source| Error::Io {
                message: format!("Could not read report `{}`", path.display()),
                source,
            }),
            (None, None) => Ok(Cow::Borrowed(&[])),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportArchive {
    /// Bundle all reports in one zip file, named `reports_{date}` unless given.
    Zip { name: Option<String> },
    /// Write one CSV file per report.
    Files,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SavedReports {
    Archive(PathBuf),
    Files(BTreeMap<PathBuf, Report>),
}

fn lenient_u64(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|string| string.parse().ok()))
}

impl Client {
    pub fn submit_report(&self, request: &ReportRequest) -> Result<SubmittedReport> {
        let report_type = request.report_type().to_owned();
        let response = self.execute(
            &Request::post(self.endpoints().report().clone()).json(json!(request)),
        )?;

        if let Some(error) = response.get("error") {
            return Err(Error::InvalidParams {
                code: report_type,
                message: error
                    .as_str()
                    .map(str::to_owned)
                    .unwrap_or_else(|| error.to_string()),
            });
        }

        let report_id = response
            .get("report_id")
            .and_then(id_string)
            .ok_or_else(|| Error::BadResponse {
                message: format!("`report_id` missing from {response}"),
            })?;
        info!("Submitted {report_type} report `{report_id}`");
        Ok(SubmittedReport {
            report_id,
            report_type,
        })
    }

    /// Poll the report status until it is no longer pending.
    pub fn wait_for_report(&self, submitted: SubmittedReport) -> Result<ReadyReport> {
        let polling = self.polling();
        let request = Request::get(self.endpoints().report().clone())
            .query([("id".to_owned(), submitted.report_id.clone())]);

        for i_poll in 1..=polling.max_report_polls {
            let response = self.execute(&request)?;
            let status = str_field(&response, "execution_status").unwrap_or_default();
            if status != "pending" {
                let report = response.get("report");
                let url = report
                    .and_then(|report| str_field(report, "url"))
                    .ok_or_else(|| Error::BadResponse {
                        message: format!(
                            "report `{}` has status `{}` but no download url",
                            submitted.report_id, status
                        ),
                    })?
                    .to_owned();
                let size = report
                    .and_then(|report| report.get("report_size"))
                    .and_then(lenient_u64);
                info!("Report `{}` is {status}", submitted.report_id);
                return Ok(ReadyReport {
                    report_id: submitted.report_id,
                    report_type: submitted.report_type,
                    url,
                    size,
                });
            }

            debug!(
                "Report `{}` pending ({}/{})",
                submitted.report_id, i_poll, polling.max_report_polls
            );
            if i_poll < polling.max_report_polls {
                sleep(polling.interval);
            }
        }

        Err(Error::ReportNotDownloaded {
            report_id: submitted.report_id,
            polls: polling.max_report_polls,
        })
    }

    pub fn download_report(&self, ready: ReadyReport, destination: Option<&Path>) -> Result<Report> {
        let url = self.endpoints().report_download(&ready.url)?;
        let data = self.download_file(&url, destination, ready.size)?;
        Ok(Report {
            report_type: ready.report_type,
            path: destination.map(Path::to_path_buf),
            data,
        })
    }

    fn run_report(&self, request: &ReportRequest, destination: Option<&Path>) -> Result<Report> {
        let started = Instant::now();
        let submitted = self.submit_report(request)?;
        let ready = self.wait_for_report(submitted)?;
        let report = self.download_report(ready, destination)?;
        info!(
            "{} report done in {:.1?}",
            report.report_type,
            started.elapsed()
        );
        Ok(report)
    }

    /// Compute a report and return its contents.
    pub fn get_report(&self, request: &ReportRequest) -> Result<Report> {
        self.run_report(request, None)
    }

    pub fn get_reports(
        &self,
        requests: &BTreeMap<String, ReportRequest>,
    ) -> Result<BTreeMap<String, Report>> {
        requests
            .iter()
            .map(|(name, request)| Ok((name.clone(), self.get_report(request)?)))
            .collect()
    }

    /// Compute a report and write it to `{folder}/{name}.csv`.
    pub fn save_report(&self, name: &str, request: &ReportRequest, folder: &Path) -> Result<Report> {
        let path = folder.join(format!("{name}.csv"));
        self.run_report(request, Some(&path))
    }

    pub fn save_reports(
        &self,
        requests: &BTreeMap<String, ReportRequest>,
        folder: &Path,
        archive: ReportArchive,
    ) -> Result<SavedReports> {
        match archive {
            ReportArchive::Zip { name } => {
                let reports = self.get_reports(requests)?;
                zip_reports(&reports, folder, name.as_deref()).map(SavedReports::Archive)
            }
            ReportArchive::Files => requests
                .iter()
                .map(|(name, request)| {
                    let report = self.save_report(name, request, folder)?;
                    let path = folder.join(format!("{name}.csv"));
                    Ok((path, report))
                })
                .collect::<Result<_>>()
                .map(SavedReports::Files),
        }
    }

    pub fn get_reports_meta(&self) -> Result<Value> {
        self.execute(&Request::get(self.endpoints().report_meta()))
    }

    pub fn get_reports_history(&self) -> Result<Value> {
        self.execute(&Request::get(self.endpoints().report().clone()))
    }
}

/// Zip archive with one `{name}.csv` entry per report.
pub fn reports_archive(reports: &BTreeMap<String, Report>) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, report) in reports {
        writer
            .start_file(format!("{name}.csv"), SimpleFileOptions::default())
            .map_err(Error::Zip)?;
        writer
            .write_all(&report.contents()?)
            .map_err(|source| Error::Io {
                message: format!("Could not add `{name}` to the archive"),
                source,
            })?;
    }
    Ok(writer.finish().map_err(Error::Zip)?.into_inner())
}

pub fn default_zip_name() -> String {
    format!("reports_{}", chrono::Local::now().date_naive())
}

/// Write `reports` to `{folder}/{zip_name}.zip` and return the archive path.
pub fn zip_reports(
    reports: &BTreeMap<String, Report>,
    folder: &Path,
    zip_name: Option<&str>,
) -> Result<PathBuf> {
    let zip_name = zip_name.map_or_else(default_zip_name, str::to_owned);
    let path = folder.join(format!("{zip_name}.zip"));
    let archive = reports_archive(reports)?;
    File::create(&path)
        .and_then(|mut file| file.write_all(&archive))
        .map_err(|source| Error::Io {
            message: format!("Could not write `{}`", path.display()),
            source,
        })?;
    info!("Wrote {} reports to `{}`", reports.len(), path.display());
    Ok(path)
}
