pub mod custom_model;
pub mod direct;
pub mod report;
pub mod segment;
pub mod service;

use reqwest::StatusCode;
use serde_json::Value;

use crate::{
    error::{Error, Result},
    pagination::Names,
};

const NO_TRANSACTION_DATA: &str = "no transaction data is found";

/// Extract the `response` object every API reply is wrapped in.
pub(crate) fn parse_envelope(body: &str) -> Result<Value> {
    let mut json: Value = serde_json::from_str(body).map_err(Error::BadJsonResponse)?;
    match json.get_mut("response") {
        Some(response) => Ok(response.take()),
        None => Err(Error::MissingEnvelope {
            body: body.to_owned(),
        }),
    }
}

/// How the request engine should treat a parsed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Verdict {
    Success,
    InvalidLogin,
    SessionExpired,
    RateExceeded { message: String },
    NoTransactionData,
    Failed { code: String, message: String },
}

impl Verdict {
    pub fn of(status_code: StatusCode, response: &Value) -> Self {
        let error_id = str_field(response, "error_id");
        if status_code != StatusCode::UNAUTHORIZED && error_id.is_none() {
            return Verdict::Success;
        }

        let error_code = str_field(response, "error_code");
        let error = str_field(response, "error");
        let error_message = str_field(response, "error_message");

        if error_code == Some("INVALID_LOGIN") {
            Verdict::InvalidLogin
        } else if error_id.is_none() || error_id == Some("NOAUTH") {
            Verdict::SessionExpired
        } else if error_code == Some("RATE_EXCEEDED") {
            Verdict::RateExceeded {
                message: error.unwrap_or("Rate exceeded").to_owned(),
            }
        } else if error_message == Some(NO_TRANSACTION_DATA) || error == Some(NO_TRANSACTION_DATA)
        {
            Verdict::NoTransactionData
        } else {
            Verdict::Failed {
                code: error_id.or(error_code).unwrap_or_default().to_owned(),
                message: error.or(error_message).unwrap_or_default().to_owned(),
            }
        }
    }
}

/// Identifiers come back as strings or numbers depending on the service.
pub(crate) fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(string) => Some(string.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

pub(crate) fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// Map identifiers to names in a service response.
///
/// Looks for the `plural` list first, then `singular` which may be a list or a single object. A
/// missing `name` falls back to `short_name`.
pub fn names_from_response(response: &Value, plural: &str, singular: &str) -> Names {
    let entries = match response.get(plural).or_else(|| response.get(singular)) {
        Some(Value::Array(entries)) => entries.iter().collect(),
        Some(entry @ Value::Object(_)) => vec![entry],
        _ => Vec::new(),
    };
    entries
        .into_iter()
        .filter_map(|entry| {
            let id = entry.get("id")?.as_u64()?;
            let name = str_field(entry, "name")
                .filter(|name| !name.is_empty())
                .or_else(|| str_field(entry, "short_name"))
                .map(str::to_owned);
            Some((id, name))
        })
        .collect()
}
