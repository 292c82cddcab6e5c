use reqwest::StatusCode;
use url::Url;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Login is not a valid one")]
    InvalidLogin,

    #[error("Invalid parameters [{}]: {}", code, message)]
    InvalidParams { code: String, message: String },

    #[error("No transaction data is found")]
    NoTransactionData,

    #[error("Request did not succeed after {} attempts", attempts)]
    TooManyRequests { attempts: u32 },

    #[error(
        "Report `{}` could not be downloaded: still pending after {} status checks",
        report_id,
        polls
    )]
    ReportNotDownloaded { report_id: String, polls: u32 },

    #[error("Segment upload failed [{}]: {}", code.as_deref().unwrap_or("unknown"), message)]
    SegmentUpload {
        code: Option<String>,
        message: String,
    },

    #[error("API request failed with {}: {}", status_code, message)]
    Api {
        status_code: StatusCode,
        message: String,
    },

    #[error("`response` not in {}", body)]
    MissingEnvelope { body: String },

    #[error("Could not parse JSON response.")]
    BadJsonResponse(#[source] serde_json::Error),

    #[error("Unexpected response payload: {}", message)]
    BadResponse { message: String },

    #[error("Invalid endpoint `{}`", endpoint)]
    BadEndpoint { endpoint: Url },

    #[error("Failed to initialise the HTTP client")]
    BuildHttpClient(#[source] reqwest::Error),

    #[error("HTTP request error: {}", message)]
    ReqwestError {
        message: String,
        source: reqwest::Error,
    },

    #[error("Url parsing error: {}", message)]
    UrlParseError {
        message: String,
        source: url::ParseError,
    },

    #[error("Only one selector can be used per request, got `{}` and `{}`", first, second)]
    ConflictingSelectors {
        first: &'static str,
        second: &'static str,
    },

    #[error("At most {} ids can be requested at once, got {}", max, count)]
    TooManyIds { count: usize, max: usize },

    #[error("Page and chunk sizes must be greater than zero")]
    BadPageSize,

    #[error("Unknown service `{}`", name)]
    UnknownService { name: String },

    #[error("Model name `{}` not found", name)]
    UnknownModel { name: String },

    #[error("I/O error: {}", message)]
    Io {
        message: String,
        source: std::io::Error,
    },

    #[error("Could not write report archive")]
    Zip(#[source] zip::result::ZipError),
}

