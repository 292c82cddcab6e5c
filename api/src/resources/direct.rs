//! Member level segments, served by the direct API host.
use serde_json::{json, Value};

use crate::{
    error::{Error, Result},
    pagination::Names,
    params::Query,
    resources::{id_string, names_from_response},
    session::MemberId,
    Client, Request,
};

impl Client {
    pub fn get_direct_segments(
        &self,
        member_id: MemberId,
        segment_id: Option<u64>,
        query: &Query,
    ) -> Result<Value> {
        self.get(
            self.endpoints().direct_segment(member_id, segment_id)?,
            query,
        )
    }

    pub fn get_direct_segment_names(
        &self,
        member_id: MemberId,
        segment_id: Option<u64>,
        query: &Query,
    ) -> Result<Names> {
        let response = self.get_direct_segments(member_id, segment_id, query)?;
        Ok(names_from_response(&response, "segments", "segment"))
    }

    /// Create a segment for `member_id` and return its id.
    pub fn add_direct_segment(&self, member_id: MemberId, segment: &Value) -> Result<String> {
        let response = self.execute(
            &Request::post(self.endpoints().direct_segment(member_id, None)?)
                .json(json!({ "segment": segment })),
        )?;
        response
            .get("id")
            .or_else(|| response.get("segment").and_then(|segment| segment.get("id")))
            .and_then(id_string)
            .ok_or_else(|| Error::BadResponse {
                message: format!("segment id missing from {response}"),
            })
    }
}
