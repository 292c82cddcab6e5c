use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use nexus_client::{format_data, Client, MemberId, Query, UPLOAD_METRICS};
use serde_json::Value;
use std::path::PathBuf;
use structopt::StructOpt;

use crate::{
    printer::{named_objects, Metric, Printer},
    utils::{read_json_file, read_lines},
};

#[derive(Debug, StructOpt)]
pub enum SegmentArgs {
    #[structopt(name = "upload")]
    /// Add users to a segment through the batch upload service
    Upload {
        #[structopt(long = "segment-id")]
        /// Segment the users are added to
        segment_id: u64,

        #[structopt(long = "member-id")]
        /// Member owning the segment. Looked up from the login when omitted.
        member_id: Option<u64>,

        #[structopt(long = "file", parse(from_os_str), default_value = "-")]
        /// File with one user id per line. Reads stdin when `-`.
        file: PathBuf,

        #[structopt(long = "metric")]
        /// Job fields to print once the upload is processed. Defaults to the upload counters.
        metrics: Vec<String>,
    },

    #[structopt(name = "add")]
    /// Create a segment from a JSON definition
    Add {
        #[structopt(long = "file", parse(from_os_str))]
        /// JSON file with the segment fields
        file: PathBuf,

        #[structopt(long = "member-id")]
        /// Create the segment for this member through the direct API
        member_id: Option<u64>,
    },

    #[structopt(name = "ls")]
    /// List the segments of a member through the direct API
    List {
        #[structopt(long = "member-id")]
        /// Member whose segments are listed. Looked up from the login when omitted.
        member_id: Option<u64>,

        #[structopt(long = "segment-id")]
        /// Only get this segment
        segment_id: Option<u64>,

        #[structopt(long = "full")]
        /// Print the raw API response instead of an id to name table
        full: bool,
    },

    #[structopt(name = "to-network")]
    /// Move an advertiser segment up to the network level
    ToNetwork {
        #[structopt(name = "segment-id")]
        segment_id: u64,

        #[structopt(long = "member-id")]
        member_id: Option<u64>,
    },

    #[structopt(name = "delete")]
    /// Delete segments
    Delete {
        #[structopt(name = "segment-id")]
        /// Ids of the segments to delete
        segment_ids: Vec<u64>,
    },
}

pub fn run(args: &SegmentArgs, client: Client, printer: &Printer) -> Result<()> {
    match args {
        SegmentArgs::Upload {
            segment_id,
            member_id,
            file,
            metrics,
        } => {
            let user_ids = read_lines(file)?;
            if user_ids.is_empty() {
                return Err(anyhow!("No user ids found in `{}`", file.display()));
            }
            info!(
                "Uploading {} user(s) to segment {}",
                user_ids.len(),
                segment_id
            );
            let payload = format_data(&user_ids, *segment_id)?;
            let job = client
                .upload_segment(payload, member_id.map(MemberId))
                .context("Operation to upload segment users has failed.")?;

            if job.is_complete() {
                info!("Upload job {} completed.", job.job_id().unwrap_or_default());
            } else {
                warn!(
                    "Upload job {} is still in phase `{}` ({}% complete).",
                    job.job_id().unwrap_or_default(),
                    job.phase().unwrap_or("unknown"),
                    job.percent_complete().unwrap_or(0.0)
                );
            }

            let names: Vec<&str> = if metrics.is_empty() {
                UPLOAD_METRICS.to_vec()
            } else {
                metrics.iter().map(String::as_str).collect()
            };
            let metrics: Vec<Metric> = job
                .metrics(&names)
                .into_iter()
                .map(|(metric, value)| Metric {
                    metric: metric.to_owned(),
                    value,
                })
                .collect();
            printer.print_resources(&metrics)?;
        }
        SegmentArgs::Add { file, member_id } => {
            let segment: Value = read_json_file(file)?;
            match member_id {
                Some(member_id) => {
                    let id = client
                        .add_direct_segment(MemberId(*member_id), &segment)
                        .context("Operation to create segment has failed.")?;
                    info!("Created segment {} for member {}.", id, member_id);
                }
                None => {
                    let response = client
                        .add_segment(&segment)
                        .context("Operation to create segment has failed.")?;
                    printer.print_json(&[response])?;
                }
            }
        }
        SegmentArgs::List {
            member_id,
            segment_id,
            full,
        } => {
            let member_id = match member_id {
                Some(member_id) => MemberId(*member_id),
                None => client.member_id()?,
            };
            if *full {
                let response = client
                    .get_direct_segments(member_id, *segment_id, &Query::new())
                    .context("Operation to list segments has failed.")?;
                printer.print_json(&[response])?;
            } else {
                let names = client
                    .get_direct_segment_names(member_id, *segment_id, &Query::new())
                    .context("Operation to list segments has failed.")?;
                printer.print_resources(&named_objects(names))?;
            }
        }
        SegmentArgs::ToNetwork {
            segment_id,
            member_id,
        } => {
            let member_id = match member_id {
                Some(member_id) => MemberId(*member_id),
                None => client.member_id()?,
            };
            client
                .move_segment_to_network(*segment_id, member_id)
                .context("Operation to move segment has failed.")?;
            info!("Moved segment {} to member {}.", segment_id, member_id);
        }
        SegmentArgs::Delete { segment_ids } => {
            for segment_id in segment_ids {
                client
                    .delete_segment(*segment_id)
                    .with_context(|| format!("Operation to delete segment {segment_id} has failed."))?;
                info!("Deleted segment {}.", segment_id);
            }
        }
    };
    Ok(())
}
