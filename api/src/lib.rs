#![deny(clippy::all)]
mod error;
pub mod pagination;
pub mod params;
pub mod resources;
pub mod retry;
mod session;

use log::{debug, info};
use once_cell::sync::Lazy;
use reqwest::{
    blocking::{Client as HttpClient, Response as HttpResponse},
    header, Method, Proxy, Result as ReqwestResult, StatusCode,
};
use serde_json::{json, Value};
use std::{
    fs::File,
    io::{BufWriter, Read, Write},
    path::Path,
    sync::{
        atomic::{AtomicU64, Ordering::SeqCst},
        Arc,
    },
    thread::sleep,
    time::Duration,
};
use url::Url;

use crate::{
    resources::{parse_envelope, Verdict},
    retry::{Attempt, Backoff, PollingConfig, Retrier, RetryConfig},
    session::{AuthResponse, MemberResponse, Session},
};

pub use crate::{
    error::{Error, Result},
    pagination::{
        bulk_fetch, fetch_all, Names, Page, PageOptions, PageRequest, ReducibleResponse,
        DEFAULT_CHUNK_SIZE, DEFAULT_PAGE_SIZE,
    },
    params::{Query, Selector, MAX_IDS_PER_REQUEST},
    resources::{
        custom_model::{CustomModel, NewCustomModel},
        names_from_response,
        report::{
            default_zip_name, reports_archive, zip_reports, ReadyReport, Report, ReportArchive,
            ReportDefinition, ReportRequest, SavedReports, SubmittedReport,
        },
        segment::{format_data, SegmentUploadJob, UploadTicket, UPLOAD_METRICS},
        service::Service,
    },
    session::{Credentials, MemberId},
};

pub static DEFAULT_ENDPOINT: Lazy<Url> =
    Lazy::new(|| Url::parse("https://api.appnexus.com").expect("Default URL is well-formed"));

pub static DEFAULT_DIRECT_ENDPOINT: Lazy<Url> = Lazy::new(|| {
    Url::parse("https://api.adnxs.com/v1.17").expect("Default direct URL is well-formed")
});

const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 5;
const DEFAULT_DOWNLOAD_TIMEOUT_SECONDS: u64 = 300;
const DOWNLOAD_CHUNK_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub endpoint: Url,
    /// Host of the direct API, used for member level segment operations.
    pub direct_endpoint: Url,
    pub credentials: Credentials,
    /// Timeout applying to each individual API call.
    pub timeout: Duration,
    /// Timeout for file downloads, which can be much larger than API responses.
    pub download_timeout: Duration,
    pub accept_invalid_certificates: bool,
    pub proxy: Option<Url>,
    pub retry_config: RetryConfig,
    pub polling: PollingConfig,
    /// Fixed delay before every API call.
    pub throttle: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            endpoint: DEFAULT_ENDPOINT.clone(),
            direct_endpoint: DEFAULT_DIRECT_ENDPOINT.clone(),
            credentials: Credentials::default(),
            timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECONDS),
            download_timeout: Duration::from_secs(DEFAULT_DOWNLOAD_TIMEOUT_SECONDS),
            accept_invalid_certificates: false,
            proxy: None,
            retry_config: RetryConfig::default(),
            polling: PollingConfig::default(),
            throttle: None,
        }
    }
}

/// Progress of the current file download, shared with whoever displays it.
#[derive(Debug, Default)]
pub struct TransferStatistics {
    transferred: AtomicU64,
    expected: AtomicU64,
}

impl TransferStatistics {
    pub fn transferred(&self) -> u64 {
        self.transferred.load(SeqCst)
    }

    /// Expected size of the current download, if known.
    pub fn expected(&self) -> Option<u64> {
        match self.expected.load(SeqCst) {
            0 => None,
            expected => Some(expected),
        }
    }

    fn start(&self, expected: Option<u64>) {
        self.transferred.store(0, SeqCst);
        self.expected.store(expected.unwrap_or(0), SeqCst);
    }

    fn add(&self, num_bytes: u64) {
        self.transferred.fetch_add(num_bytes, SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Json(Value),
    /// Raw bytes, sent as `application/octet-stream`.
    Bytes(Vec<u8>),
}

/// Everything needed to issue one logical API call.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    method: Method,
    url: Url,
    query: Vec<(String, String)>,
    body: Option<Body>,
    timeout: Option<Duration>,
    max_retry_count: Option<u32>,
    authenticating: bool,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            query: Vec::new(),
            body: None,
            timeout: None,
            max_retry_count: None,
            authenticating: false,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: Url) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn delete(url: Url) -> Self {
        Self::new(Method::DELETE, url)
    }

    pub fn query(mut self, pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        self.query.extend(pairs);
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(Body::Json(body));
        self
    }

    pub fn bytes(mut self, bytes: Vec<u8>) -> Self {
        self.body = Some(Body::Bytes(bytes));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_retry_count(mut self, max_retry_count: u32) -> Self {
        self.max_retry_count = Some(max_retry_count);
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[derive(Debug)]
pub struct Client {
    endpoints: Endpoints,
    http_client: HttpClient,
    session: Session,
    retrier: Retrier,
    polling: PollingConfig,
    throttle: Option<Duration>,
    download_timeout: Duration,
    transfer_statistics: Arc<TransferStatistics>,
}

impl Client {
    /// Create a new API client. No request is made until the first call.
    pub fn new(config: Config) -> Result<Client> {
        let http_client = build_http_client(&config)?;
        let endpoints = Endpoints::new(config.endpoint, config.direct_endpoint)?;
        Ok(Client {
            endpoints,
            http_client,
            session: Session::new(config.credentials),
            retrier: Retrier::new(config.retry_config),
            polling: config.polling,
            throttle: config.throttle,
            download_timeout: config.download_timeout,
            transfer_statistics: Arc::new(TransferStatistics::default()),
        })
    }

    /// Get the base url for the client
    pub fn base_url(&self) -> &Url {
        &self.endpoints.base
    }

    pub fn transfer_statistics(&self) -> Arc<TransferStatistics> {
        Arc::clone(&self.transfer_statistics)
    }

    /// Open a session straight away rather than on the first rejected call.
    pub fn login(&self) -> Result<()> {
        self.authenticate(self.endpoints.auth(&self.endpoints.base)?)
    }

    /// The member id of the logged in user, fetched on first use.
    pub fn member_id(&self) -> Result<MemberId> {
        self.session
            .member_id()
            .get_or_try_init(|| {
                let response = self.execute(&Request::get(self.endpoints.member.clone()))?;
                let MemberResponse { member } =
                    serde_json::from_value(response).map_err(Error::BadJsonResponse)?;
                info!("Resolved member id {}", member.id);
                Ok(member.id)
            })
            .copied()
    }

    /// Execute a request and return the `response` object of the envelope.
    ///
    /// Timeouts, connection failures and rate limiting are retried, an expired session is renewed
    /// and the request retried. Any other API error is returned straight away.
    pub fn execute(&self, request: &Request) -> Result<Value> {
        if let Some(throttle) = self.throttle {
            sleep(throttle);
        }
        debug!("Attempting {} `{}`", request.method, request.url);

        self.retrier
            .with_retries(request.max_retry_count, |_| {
                let (status, body) = match self.send(request) {
                    Ok(response) => response,
                    Err(error) if is_transient(&error) => {
                        return Ok(Attempt::Retry {
                            reason: format!("{} `{}`: {}", request.method, request.url, error),
                            backoff: Backoff::Connection,
                        })
                    }
                    Err(source) => {
                        return Err(Error::ReqwestError {
                            message: format!("{} operation failed.", request.method),
                            source,
                        })
                    }
                };

                let response = parse_envelope(&body)?;
                match Verdict::of(status, &response) {
                    Verdict::Success => Ok(Attempt::Done(response)),
                    Verdict::InvalidLogin => Err(Error::InvalidLogin),
                    Verdict::SessionExpired if request.authenticating => Err(Error::InvalidLogin),
                    Verdict::SessionExpired => {
                        self.authenticate(self.endpoints.auth(&request.url)?)?;
                        Ok(Attempt::Retry {
                            reason: "Session renewed".to_owned(),
                            backoff: Backoff::Immediate,
                        })
                    }
                    Verdict::RateExceeded { message } => Ok(Attempt::Retry {
                        reason: message,
                        backoff: Backoff::RateLimit,
                    }),
                    Verdict::NoTransactionData => Err(Error::NoTransactionData),
                    Verdict::Failed { code, message } => {
                        Err(Error::InvalidParams { code, message })
                    }
                }
            })
    }

    /// Download the file at `url`, writing it to `destination` or returning its bytes when no
    /// destination is given.
    ///
    /// `file_size` overrides the `Content-Length` of the response for progress reporting.
    pub fn download_file(
        &self,
        url: &Url,
        destination: Option<&Path>,
        file_size: Option<u64>,
    ) -> Result<Option<Vec<u8>>> {
        debug!("Downloading `{url}`");
        let mut response = self.retrier.with_retries(None, |_| {
            let mut request = self
                .http_client
                .get(url.clone())
                .timeout(self.download_timeout);
            if let Some(token) = self.session.token() {
                request = request.header(header::AUTHORIZATION, token);
            }
            match request.send() {
                Ok(response) => Ok(Attempt::Done(response)),
                Err(error) if is_transient(&error) => Ok(Attempt::Retry {
                    reason: format!("GET `{url}`: {error}"),
                    backoff: Backoff::Connection,
                }),
                Err(source) => Err(Error::ReqwestError {
                    message: "Download failed.".to_owned(),
                    source,
                }),
            }
        })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(Error::Api {
                status_code: status,
                message: response.text().unwrap_or_default(),
            });
        }

        self.transfer_statistics
            .start(file_size.or_else(|| response.content_length()));

        match destination {
            Some(path) => {
                let file = File::create(path).map_err(|source| Error::Io {
                    message: format!("Could not create `{}`", path.display()),
                    source,
                })?;
                let mut writer = BufWriter::new(file);
                self.copy_chunks(&mut response, &mut writer)?;
                writer.flush().map_err(|source| Error::Io {
                    message: format!("Could not write `{}`", path.display()),
                    source,
                })?;
                info!("Downloaded `{}`", path.display());
                Ok(None)
            }
            None => {
                let mut buffer = Vec::new();
                self.copy_chunks(&mut response, &mut buffer)?;
                Ok(Some(buffer))
            }
        }
    }

    fn copy_chunks(&self, response: &mut HttpResponse, writer: &mut impl Write) -> Result<u64> {
        let mut chunk = vec![0u8; DOWNLOAD_CHUNK_SIZE];
        let mut total = 0;
        loop {
            let num_read = response.read(&mut chunk).map_err(|source| Error::Io {
                message: "Could not read download stream".to_owned(),
                source,
            })?;
            if num_read == 0 {
                return Ok(total);
            }
            writer
                .write_all(&chunk[..num_read])
                .map_err(|source| Error::Io {
                    message: "Could not write downloaded chunk".to_owned(),
                    source,
                })?;
            total += num_read as u64;
            self.transfer_statistics.add(num_read as u64);
        }
    }

    fn authenticate(&self, auth_url: Url) -> Result<()> {
        info!(
            "Authenticating `{}` at `{}`",
            self.session.credentials().username,
            auth_url
        );
        let request = Request {
            authenticating: true,
            ..Request::post(auth_url).json(json!({ "auth": self.session.credentials() }))
        };
        let AuthResponse { token } =
            serde_json::from_value(self.execute(&request)?).map_err(Error::BadJsonResponse)?;
        self.session.renew(token);
        Ok(())
    }

    fn send(&self, request: &Request) -> ReqwestResult<(StatusCode, String)> {
        let mut builder = self
            .http_client
            .request(request.method.clone(), request.url.clone())
            .query(&request.query);
        if let Some(token) = self.session.token() {
            builder = builder.header(header::AUTHORIZATION, token);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        builder = match &request.body {
            Some(Body::Json(body)) => builder.json(body),
            Some(Body::Bytes(bytes)) => builder
                .header(header::CONTENT_TYPE, "application/octet-stream")
                .body(bytes.clone()),
            None => builder,
        };

        // The body is read here so that a timeout while streaming it is retried like any other.
        let response = builder.send()?;
        let status = response.status();
        Ok((status, response.text()?))
    }

    pub(crate) fn get(&self, url: Url, query: &Query) -> Result<Value> {
        self.execute(&Request::get(url).query(query.to_pairs()?))
    }

    pub(crate) fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub(crate) fn polling(&self) -> &PollingConfig {
        &self.polling
    }

    pub(crate) fn max_retry_count(&self) -> u32 {
        self.retrier.max_retry_count()
    }
}

fn is_transient(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
}

#[derive(Debug)]
pub(crate) struct Endpoints {
    base: Url,
    direct: Url,
    member: Url,
    report: Url,
    batch_segment: Url,
    custom_model: Url,
    custom_model_parser: Url,
}

fn construct_endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut endpoint = base.clone();

    let mut endpoint_segments = endpoint
        .path_segments_mut()
        .map_err(|_| Error::BadEndpoint {
            endpoint: base.clone(),
        })?;

    endpoint_segments.pop_if_empty();
    for segment in segments {
        endpoint_segments.push(segment);
    }

    drop(endpoint_segments);

    Ok(endpoint)
}

/// Resolve a possibly relative location returned by the API (e.g. `report-download?id=…`).
fn resolve_location(base: &Url, location: &str) -> Result<Url> {
    if let Ok(url) = Url::parse(location) {
        return Ok(url);
    }
    let joined = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        location.trim_start_matches('/')
    );
    Url::parse(&joined).map_err(|source| Error::UrlParseError {
        message: format!("Invalid location `{location}`"),
        source,
    })
}

impl Endpoints {
    pub fn new(base: Url, direct: Url) -> Result<Self> {
        let member = construct_endpoint(&base, &["member"])?;
        let report = construct_endpoint(&base, &["report"])?;
        let batch_segment = construct_endpoint(&base, &["batch-segment"])?;
        let custom_model = construct_endpoint(&base, &["custom-model"])?;
        let custom_model_parser = construct_endpoint(&base, &["custom-model-parser"])?;
        Ok(Endpoints {
            base,
            direct,
            member,
            report,
            batch_segment,
            custom_model,
            custom_model_parser,
        })
    }

    /// The auth endpoint of the host serving `url`.
    fn auth(&self, url: &Url) -> Result<Url> {
        let prefix_len = |host: &Url| {
            let host = host.as_str().trim_end_matches('/');
            url.as_str().starts_with(host).then_some(host.len())
        };
        // Longest matching host wins, the direct API may live under the console host.
        let host = match (prefix_len(&self.base), prefix_len(&self.direct)) {
            (Some(base), Some(direct)) if direct > base => &self.direct,
            (None, Some(_)) => &self.direct,
            _ => &self.base,
        };
        construct_endpoint(host, &["auth"])
    }

    pub fn report(&self) -> &Url {
        &self.report
    }

    pub fn report_meta(&self) -> Url {
        let mut url = self.report.clone();
        url.set_query(Some("meta"));
        url
    }

    pub fn report_download(&self, location: &str) -> Result<Url> {
        resolve_location(&self.base, location)
    }

    pub fn batch_segment(&self) -> &Url {
        &self.batch_segment
    }

    pub fn custom_model(&self) -> &Url {
        &self.custom_model
    }

    pub fn custom_model_parser(&self) -> &Url {
        &self.custom_model_parser
    }

    pub fn service(&self, service: Service) -> Result<Url> {
        construct_endpoint(&self.base, &[service.path()])
    }

    pub fn direct_segment(&self, member_id: MemberId, segment_id: Option<u64>) -> Result<Url> {
        let member_id = member_id.to_string();
        match segment_id {
            Some(segment_id) => construct_endpoint(
                &self.direct,
                &["segment", &member_id, &segment_id.to_string()],
            ),
            None => construct_endpoint(&self.direct, &["segment", &member_id]),
        }
    }
}

fn build_http_client(config: &Config) -> Result<HttpClient> {
    let mut builder = HttpClient::builder()
        .cookie_store(true)
        .danger_accept_invalid_certs(config.accept_invalid_certificates)
        .timeout(Some(config.timeout));

    if let Some(proxy) = config.proxy.clone() {
        builder = builder.proxy(Proxy::all(proxy).map_err(Error::BuildHttpClient)?);
    }
    builder.build().map_err(Error::BuildHttpClient)
}
