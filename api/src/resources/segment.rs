use flate2::{write::GzEncoder, Compression};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::{collections::BTreeMap, fmt::Display, io::Write, thread::sleep};
use url::Url;

use crate::{
    error::{Error, Result},
    params::{Query, Selector},
    resources::{id_string, service::Service, str_field},
    session::MemberId,
    Client, Request,
};

/// Counters reported by a finished batch upload job.
pub const UPLOAD_METRICS: [&str; 10] = [
    "num_valid",
    "num_invalid_user",
    "num_unauth_segment",
    "num_other_error",
    "num_inactive_segment",
    "num_valid_user",
    "num_invalid_segment",
    "num_invalid_timestamp",
    "num_invalid_format",
    "num_past_expiration",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTicket {
    pub job_id: String,
    pub upload_url: Url,
}

/// Status record of a batch segment upload job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentUploadJob {
    fields: Map<String, Value>,
}

impl SegmentUploadJob {
    pub fn job_id(&self) -> Option<String> {
        self.fields.get("job_id").and_then(id_string)
    }

    pub fn phase(&self) -> Option<&str> {
        self.fields.get("phase").and_then(Value::as_str)
    }

    pub fn percent_complete(&self) -> Option<f64> {
        self.fields.get("percent_complete").and_then(Value::as_f64)
    }

    pub fn is_complete(&self) -> bool {
        self.percent_complete() == Some(100.0)
    }

    /// The requested fields of the job, `null` for the ones it does not report.
    pub fn metrics<'a>(&self, names: &[&'a str]) -> BTreeMap<&'a str, Value> {
        names
            .iter()
            .map(|name| (*name, self.fields.get(*name).cloned().unwrap_or(Value::Null)))
            .collect()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// Build a batch segment payload: one `{user_id},{segment_id}:0` line per user, gzipped.
pub fn format_data<T: Display>(user_ids: &[T], segment_id: u64) -> Result<Vec<u8>> {
    let io_error = |source| Error::Io {
        message: "Could not compress segment payload".to_owned(),
        source,
    };
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    for user_id in user_ids {
        writeln!(encoder, "{user_id},{segment_id}:0").map_err(io_error)?;
    }
    encoder.finish().map_err(io_error)
}

impl Client {
    pub fn create_upload_job(&self, member_id: MemberId) -> Result<UploadTicket> {
        let response = self.execute(
            &Request::post(self.endpoints().batch_segment().clone())
                .query([("member_id".to_owned(), member_id.to_string())]),
        )?;
        if str_field(&response, "error_code") == Some("DB_UNKNOWN") {
            return Err(Error::InvalidParams {
                code: "DB_UNKNOWN".to_owned(),
                message: format!(
                    "Invalid member id {member_id}: {}",
                    str_field(&response, "error").unwrap_or_default()
                ),
            });
        }

        let job = response
            .get("batch_segment_upload_job")
            .ok_or_else(|| Error::BadResponse {
                message: format!("`batch_segment_upload_job` missing from {response}"),
            })?;
        let job_id = job
            .get("job_id")
            .and_then(id_string)
            .ok_or_else(|| Error::BadResponse {
                message: format!("`job_id` missing from {job}"),
            })?;
        let upload_url = str_field(job, "upload_url").ok_or_else(|| Error::BadResponse {
            message: format!("`upload_url` missing from {job}"),
        })?;
        let upload_url = Url::parse(upload_url).map_err(|source| Error::UrlParseError {
            message: format!("Invalid upload url `{upload_url}`"),
            source,
        })?;
        info!("Created segment upload job `{job_id}`");
        Ok(UploadTicket { job_id, upload_url })
    }

    /// Send the payload built by [`format_data`] to the upload url of a job.
    pub fn upload_payload(&self, ticket: &UploadTicket, payload: Vec<u8>) -> Result<String> {
        let response = self.execute(&Request::post(ticket.upload_url.clone()).bytes(payload))?;
        response
            .get("segment_upload")
            .and_then(|upload| upload.get("job_id"))
            .and_then(id_string)
            .ok_or_else(|| Error::BadResponse {
                message: format!("`segment_upload.job_id` missing from {response}"),
            })
    }

    pub fn get_upload_progress(&self, job_id: &str, member_id: MemberId) -> Result<Value> {
        self.execute(
            &Request::get(self.endpoints().batch_segment().clone()).query([
                ("member_id".to_owned(), member_id.to_string()),
                ("job_id".to_owned(), job_id.to_owned()),
            ]),
        )
    }

    /// Upload a segment payload and wait for the job to be processed.
    ///
    /// The job is polled at most `max_retry_count` times. If it has not completed by then the
    /// status of the last poll is returned, or `SegmentUpload` when that poll had no job record.
    pub fn upload_segment(
        &self,
        payload: Vec<u8>,
        member_id: Option<MemberId>,
    ) -> Result<SegmentUploadJob> {
        let member_id = match member_id {
            Some(member_id) => member_id,
            None => self.member_id()?,
        };
        let ticket = self.create_upload_job(member_id)?;
        self.upload_payload(&ticket, payload)?;

        let max_polls = self.max_retry_count();
        let mut last_job: Option<SegmentUploadJob> = None;
        for i_poll in 1..=max_polls {
            let response = self.get_upload_progress(&ticket.job_id, member_id)?;
            if str_field(&response, "status") == Some("ERROR") {
                return Err(Error::SegmentUpload {
                    code: str_field(&response, "error_code").map(str::to_owned),
                    message: response
                        .get("errors")
                        .and_then(|errors| errors.get(0))
                        .map(|error| match error {
                            Value::String(error) => error.clone(),
                            other => other.to_string(),
                        })
                        .or_else(|| str_field(&response, "error").map(str::to_owned))
                        .unwrap_or_else(|| response.to_string()),
                });
            }

            last_job = match response.get("batch_segment_upload_job").map(|job| {
                serde_json::from_value::<SegmentUploadJob>(job.clone())
            }) {
                Some(Ok(job)) => {
                    if job.is_complete() {
                        info!("Segment upload job `{}` completed", ticket.job_id);
                        return Ok(job);
                    }
                    debug!(
                        "Segment upload job `{}` at {}% ({}/{})",
                        ticket.job_id,
                        job.percent_complete().unwrap_or_default(),
                        i_poll,
                        max_polls
                    );
                    Some(job)
                }
                Some(Err(error)) => {
                    warn!("Malformed `batch_segment_upload_job` in {response}: {error}");
                    None
                }
                None => {
                    warn!("`batch_segment_upload_job` not found in {response}");
                    None
                }
            };

            if i_poll < max_polls {
                sleep(self.polling().interval);
            }
        }

        last_job.ok_or_else(|| Error::SegmentUpload {
            code: None,
            message: format!(
                "job `{}` did not report its progress on the last poll",
                ticket.job_id
            ),
        })
    }

    /// Create a segment. `segment` is the full body, i.e. `{"segment": {...}}`.
    pub fn add_segment(&self, segment: &Value) -> Result<Value> {
        self.execute(
            &Request::post(self.endpoints().service(Service::Segment)?).json(segment.clone()),
        )
    }

    /// Turn an advertiser segment into a network (member level) segment.
    pub fn move_segment_to_network(&self, segment_id: u64, member_id: MemberId) -> Result<Value> {
        let query = Query::from(Selector::IdForMember {
            id: segment_id,
            member_id,
        });
        self.execute(
            &Request::put(self.endpoints().service(Service::Segment)?)
                .query(query.to_pairs()?)
                .json(json!({"segment": {"advertiser_id": null}})),
        )
    }

    pub fn delete_segment(&self, segment_id: u64) -> Result<Value> {
        let query = Query::from(Selector::Id(segment_id));
        self.execute(
            &Request::delete(self.endpoints().service(Service::Segment)?).query(query.to_pairs()?),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{client, client_with_retries};
    use flate2::read::GzDecoder;
    use mockito::{Matcher, Server};
    use pretty_assertions::assert_eq;
    use std::io::Read;

    fn mock_job_creation(server: &mut Server) -> (mockito::Mock, mockito::Mock) {
        let create = server
            .mock("POST", "/batch-segment")
            .match_query(Matcher::UrlEncoded("member_id".into(), "958".into()))
            .with_body(
                json!({"response": {"status": "OK", "batch_segment_upload_job": {
                    "job_id": "job-1",
                    "upload_url": format!("{}/segment-upload?job_id=job-1", server.url())
                }}})
                .to_string(),
            )
            .expect(1)
            .create();
        let upload = server
            .mock("POST", "/segment-upload")
            .match_query(Matcher::UrlEncoded("job_id".into(), "job-1".into()))
            .match_header("content-type", "application/octet-stream")
            .with_body(r#"{"response": {"status": "OK", "segment_upload": {"job_id": "job-1"}}}"#)
            .expect(1)
            .create();
        (create, upload)
    }

    fn progress(percent_complete: u64) -> String {
        let phase = if percent_complete == 100 {
            "completed"
        } else {
            "processing"
        };
        json!({"response": {"status": "OK", "batch_segment_upload_job": {
            "job_id": "job-1",
            "phase": phase,
            "percent_complete": percent_complete,
            "num_valid": 2,
            "num_invalid_user": 0
        }}})
        .to_string()
    }

    #[test]
    fn test_format_data_round_trips_through_gzip() {
        let payload = format_data(&["a1", "b2", "c3"], 42).unwrap();
        let mut decoded = String::new();
        GzDecoder::new(payload.as_slice())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "a1,42:0\nb2,42:0\nc3,42:0\n");
    }

    #[test]
    fn test_upload_stops_polling_once_complete() {
        let mut server = Server::new();
        let (create, upload) = mock_job_creation(&mut server);
        let processing = server
            .mock("GET", "/batch-segment")
            .match_query(Matcher::UrlEncoded("job_id".into(), "job-1".into()))
            .with_body(progress(50))
            .expect(2)
            .create();
        let completed = server
            .mock("GET", "/batch-segment")
            .match_query(Matcher::UrlEncoded("job_id".into(), "job-1".into()))
            .with_body(progress(100))
            .expect(1)
            .create();

        let client = client(&server.url());
        let payload = format_data(&[1, 2], 7).unwrap();
        let job = client.upload_segment(payload, Some(MemberId(958))).unwrap();

        assert!(job.is_complete());
        assert_eq!(job.phase(), Some("completed"));
        assert_eq!(
            job.metrics(&["num_valid", "num_past_expiration"]),
            BTreeMap::from([("num_valid", json!(2)), ("num_past_expiration", Value::Null)])
        );
        create.assert();
        upload.assert();
        processing.assert();
        completed.assert();
    }

    #[test]
    fn test_upload_error_status() {
        let mut server = Server::new();
        let _mocks = mock_job_creation(&mut server);
        server
            .mock("GET", "/batch-segment")
            .match_query(Matcher::UrlEncoded("job_id".into(), "job-1".into()))
            .with_body(
                r#"{"response": {"status": "ERROR", "error_code": "BAD_FORMAT", "errors": ["line 1: bad segment"]}}"#,
            )
            .expect(1)
            .create();

        let client = client(&server.url());
        match client.upload_segment(Vec::new(), Some(MemberId(958))) {
            Err(Error::SegmentUpload { code, message }) => {
                assert_eq!(code.as_deref(), Some("BAD_FORMAT"));
                assert_eq!(message, "line 1: bad segment");
            }
            other => panic!("expected segment upload error, got {other:?}"),
        }
    }

    #[test]
    fn test_upload_budget_exhausted_returns_last_status() {
        let mut server = Server::new();
        let _mocks = mock_job_creation(&mut server);
        let missing = server
            .mock("GET", "/batch-segment")
            .match_query(Matcher::UrlEncoded("job_id".into(), "job-1".into()))
            .with_body(r#"{"response": {"status": "OK"}}"#)
            .expect(1)
            .create();
        let processing = server
            .mock("GET", "/batch-segment")
            .match_query(Matcher::UrlEncoded("job_id".into(), "job-1".into()))
            .with_body(progress(80))
            .expect(9)
            .create();

        let client = client(&server.url());
        let job = client.upload_segment(Vec::new(), Some(MemberId(958))).unwrap();
        assert_eq!(job.percent_complete(), Some(80.0));
        assert!(!job.is_complete());
        missing.assert();
        processing.assert();
    }

    #[test]
    fn test_upload_keeps_polling_after_malformed_status() {
        let mut server = Server::new();
        let _mocks = mock_job_creation(&mut server);
        let malformed = server
            .mock("GET", "/batch-segment")
            .match_query(Matcher::UrlEncoded("job_id".into(), "job-1".into()))
            .with_body(r#"{"response": {"status": "OK", "batch_segment_upload_job": null}}"#)
            .expect(1)
            .create();
        let completed = server
            .mock("GET", "/batch-segment")
            .match_query(Matcher::UrlEncoded("job_id".into(), "job-1".into()))
            .with_body(progress(100))
            .expect(1)
            .create();

        let client = client(&server.url());
        let job = client.upload_segment(Vec::new(), Some(MemberId(958))).unwrap();
        assert!(job.is_complete());
        malformed.assert();
        completed.assert();
    }

    #[test]
    fn test_upload_fails_when_last_poll_has_no_status() {
        let mut server = Server::new();
        let _mocks = mock_job_creation(&mut server);
        let processing = server
            .mock("GET", "/batch-segment")
            .match_query(Matcher::UrlEncoded("job_id".into(), "job-1".into()))
            .with_body(progress(10))
            .expect(9)
            .create();
        let missing = server
            .mock("GET", "/batch-segment")
            .match_query(Matcher::UrlEncoded("job_id".into(), "job-1".into()))
            .with_body(r#"{"response": {"status": "OK"}}"#)
            .expect(1)
            .create();

        let client = client(&server.url());
        match client.upload_segment(Vec::new(), Some(MemberId(958))) {
            Err(Error::SegmentUpload { code: None, message }) => {
                assert!(message.contains("job-1"), "{message}");
            }
            other => panic!("expected segment upload error, got {other:?}"),
        }
        processing.assert();
        missing.assert();
    }

    #[test]
    fn test_upload_fails_without_any_status() {
        let mut server = Server::new();
        let _mocks = mock_job_creation(&mut server);
        let missing = server
            .mock("GET", "/batch-segment")
            .match_query(Matcher::UrlEncoded("job_id".into(), "job-1".into()))
            .with_body(r#"{"response": {"status": "OK"}}"#)
            .expect(3)
            .create();

        let client = client_with_retries(&server.url(), 3);
        assert!(matches!(
            client.upload_segment(Vec::new(), Some(MemberId(958))),
            Err(Error::SegmentUpload { code: None, .. })
        ));
        missing.assert();
    }

    #[test]
    fn test_unknown_member_is_invalid_params() {
        let mut server = Server::new();
        let create = server
            .mock("POST", "/batch-segment")
            .match_query(Matcher::UrlEncoded("member_id".into(), "404".into()))
            .with_body(
                r#"{"response": {"status": "OK", "error_code": "DB_UNKNOWN", "error": "member not found"}}"#,
            )
            .expect(1)
            .create();
        let upload = server
            .mock("POST", "/segment-upload")
            .match_query(Matcher::Any)
            .expect(0)
            .create();

        let client = client(&server.url());
        match client.upload_segment(Vec::new(), Some(MemberId(404))) {
            Err(Error::InvalidParams { code, message }) => {
                assert_eq!(code, "DB_UNKNOWN");
                assert_eq!(message, "Invalid member id 404: member not found");
            }
            other => panic!("expected invalid params, got {other:?}"),
        }
        create.assert();
        upload.assert();
    }

    #[test]
    fn test_move_segment_to_network() {
        let mut server = Server::new();
        let mock = server
            .mock("PUT", "/segment")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("id".into(), "12".into()),
                Matcher::UrlEncoded("member_id".into(), "958".into()),
            ]))
            .match_body(Matcher::Json(json!({"segment": {"advertiser_id": null}})))
            .with_body(r#"{"response": {"status": "OK", "id": 12}}"#)
            .expect(1)
            .create();

        let client = client(&server.url());
        client.move_segment_to_network(12, MemberId(958)).unwrap();
        mock.assert();
    }
}
