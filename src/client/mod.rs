//! `VolairClient` — blocking HTTP client for the orchestration server.
//!
//! Lifecycle:
//!   1. Classify the URL ([`ServerKind`]). For dev-server URLs, rewrite to the
//!      local address and start the server through [`DevServer`].
//!   2. Health-check `GET {url}/status`. Anything but 200 fails construction
//!      with [`ClientError::ServerStatus`]; there is no reconnect.
//!   3. Serve calls through [`VolairClient::send_request`], one attempt each.
//!
//! Every call builds its own `reqwest::blocking::Client`, so nothing is pooled
//! across calls.

mod dev_server;
mod request;
mod server_kind;

use std::collections::BTreeMap;
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

pub use dev_server::{DEFAULT_DEV_SERVER_PORT, DEFAULT_DEV_SERVER_PROGRAM, DevServer, ProcessDevServer};
pub use request::{ApiResponse, FilePart, Method};
pub use server_kind::ServerKind;

pub const DEFAULT_LLM_MODEL: &str = "openai/gpt-4o";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_STATUS_TIMEOUT: Duration = Duration::from_secs(5);

const DEV_SERVER_POLL_INTERVAL: Duration = Duration::from_millis(250);

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ClientError {
    /// Health check failed at construction; no client exists.
    #[error("failed to connect to the server at initialization: {0}")]
    ServerStatus(String),

    /// Server answered 408, or the request never completed (DNS, refused,
    /// reset, deadline). All transport failures land here.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// 4xx/5xx status other than 408, passed through from reqwest.
    #[error("http error: {0}")]
    Http(#[source] reqwest::Error),

    /// Non-2xx status reqwest does not treat as an error (1xx, 3xx).
    /// Redirects are never followed.
    #[error("unexpected status {status} from {url}")]
    UnexpectedStatus { status: StatusCode, url: String },

    #[error("cannot decode response: {0}")]
    Decode(String),

    #[error("cannot build request: {0}")]
    Build(String),

    #[error("dev server error: {0}")]
    DevServer(String),
}

impl ClientError {
    /// HTTP status carried by an [`ClientError::Http`] or
    /// [`ClientError::UnexpectedStatus`] error.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Http(e) => e.status(),
            ClientError::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// ── Options ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Per-call deadline for `send_request`.
    pub request_timeout: Duration,
    /// Deadline for the `/status` probe.
    pub status_timeout: Duration,
    pub default_llm_model: String,
    /// Keep dev-server output on the terminal instead of discarding it.
    pub debug: bool,
    /// Address dev-server URLs are rewritten to.
    pub dev_server_url: String,
    /// How long to wait for a freshly started dev server to answer `/status`.
    pub dev_server_startup_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            status_timeout: DEFAULT_STATUS_TIMEOUT,
            default_llm_model: DEFAULT_LLM_MODEL.to_string(),
            debug: false,
            dev_server_url: format!("http://localhost:{DEFAULT_DEV_SERVER_PORT}"),
            dev_server_startup_timeout: Duration::from_secs(30),
        }
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

pub struct ClientBuilder {
    url: String,
    options: ClientOptions,
    dev_server: Option<Box<dyn DevServer>>,
}

impl ClientBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            options: ClientOptions::default(),
            dev_server: None,
        }
    }

    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.options.debug = debug;
        self
    }

    /// Dev server to launch for dev-server URLs. Defaults to [`ProcessDevServer::default`].
    pub fn dev_server(mut self, server: impl DevServer + 'static) -> Self {
        self.dev_server = Some(Box::new(server));
        self
    }

    /// Classify, bootstrap if needed, and health-check.
    pub fn connect(self) -> Result<VolairClient, ClientError> {
        let ClientBuilder { url, options, dev_server } = self;
        let kind = ServerKind::classify(&url);

        let (url, dev_server) = if kind.needs_dev_server() {
            let mut server: Box<dyn DevServer> = match dev_server {
                Some(server) => server,
                None => Box::new(ProcessDevServer::default()),
            };
            server.start(!options.debug)?;
            (options.dev_server_url.clone(), Some(server))
        } else {
            (url, None)
        };

        // Built before the health check so a failed connect still stops the dev server on drop.
        let client = VolairClient {
            url: url.trim_end_matches('/').to_string(),
            kind,
            default_llm_model: options.default_llm_model.clone(),
            options,
            dev_server,
        };

        let reachable = if client.dev_server.is_some() {
            client.wait_for_dev_server()
        } else {
            client.check_server_status()
        };

        if !reachable {
            warn!(server = %kind, url = %client.url, status = "Failed", "server connection");
            return Err(ClientError::ServerStatus(client.url.clone()));
        }

        info!(server = %kind, url = %client.url, status = "Established", "server connection");
        Ok(client)
    }
}

// ── Client ────────────────────────────────────────────────────────────────────

pub struct VolairClient {
    url: String,
    kind: ServerKind,
    default_llm_model: String,
    options: ClientOptions,
    dev_server: Option<Box<dyn DevServer>>,
}

impl fmt::Debug for VolairClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VolairClient")
            .field("url", &self.url)
            .field("kind", &self.kind)
            .field("default_llm_model", &self.default_llm_model)
            .field("dev_server", &self.dev_server.is_some())
            .finish()
    }
}

impl VolairClient {
    /// Connect with default options.
    pub fn connect(url: &str) -> Result<Self, ClientError> {
        ClientBuilder::new(url).connect()
    }

    pub fn builder(url: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(url)
    }

    /// Effective base URL (after any dev-server rewrite).
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn server_kind(&self) -> ServerKind {
        self.kind
    }

    pub fn default_llm_model(&self) -> &str {
        &self.default_llm_model
    }

    pub fn set_default_llm_model(&mut self, model: impl Into<String>) {
        self.default_llm_model = model.into();
    }

    /// `true` iff `GET {url}/status` answers 200.
    pub fn check_server_status(&self) -> bool {
        let client = match Client::builder()
            .timeout(self.options.status_timeout)
            .redirect(Policy::none())
            .build()
        {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "cannot build status client");
                return false;
            }
        };
        match client.get(format!("{}/status", self.url)).send() {
            Ok(resp) => {
                debug!(url = %self.url, status = %resp.status(), "status probe");
                resp.status() == StatusCode::OK
            }
            Err(e) => {
                debug!(url = %self.url, error = %e, "status probe failed");
                false
            }
        }
    }

    fn wait_for_dev_server(&self) -> bool {
        let deadline = Instant::now() + self.options.dev_server_startup_timeout;
        loop {
            if self.check_server_status() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(DEV_SERVER_POLL_INTERVAL);
        }
    }

    /// Send one request to `{url}{endpoint}`.
    ///
    /// GET sends `data` as query parameters. POST sends it as a JSON body,
    /// or as multipart text fields when `files` is non-empty. The body is
    /// returned as parsed JSON, or untouched when `return_raw` is set.
    pub fn send_request(
        &self,
        endpoint: &str,
        data: &Map<String, Value>,
        files: Option<&BTreeMap<String, FilePart>>,
        method: Method,
        return_raw: bool,
    ) -> Result<ApiResponse, ClientError> {
        let url = format!("{}{endpoint}", self.url);
        let client = Client::builder()
            .timeout(self.options.request_timeout)
            .redirect(Policy::none())
            .build()
            .map_err(|e| ClientError::Build(format!("failed to build HTTP client: {e}")))?;

        let files = files.filter(|f| !f.is_empty());
        let builder = match method {
            Method::Get => client.get(&url).query(&request::to_pairs(data)),
            Method::Post => match files {
                Some(files) => client.post(&url).multipart(request::multipart_form(data, files)?),
                None => client.post(&url).json(data),
            },
        };

        debug!(%method, url = %url, fields = data.len(), files = files.map_or(0, |f| f.len()), "sending request");

        let response = builder.send().map_err(|e| {
            warn!(url = %url, error = %e, "request failed (transport)");
            ClientError::Timeout(format!("HTTP request failed: {e}"))
        })?;

        if response.status() == StatusCode::REQUEST_TIMEOUT {
            warn!(url = %url, "server reported 408");
            return Err(ClientError::Timeout("server returned 408 Request Timeout".into()));
        }

        let response = response.error_for_status().map_err(ClientError::Http)?;
        if !response.status().is_success() {
            warn!(url = %url, status = %response.status(), "unexpected status");
            return Err(ClientError::UnexpectedStatus { status: response.status(), url });
        }

        let body = response.bytes().map_err(|e| {
            ClientError::Timeout(format!("HTTP request failed while reading body: {e}"))
        })?;
        debug!(url = %url, bytes = body.len(), "response received");

        if return_raw {
            return Ok(ApiResponse::Raw(body.to_vec()));
        }
        serde_json::from_slice(&body)
            .map(ApiResponse::Json)
            .map_err(|e| ClientError::Decode(format!("{url}: {e}")))
    }

    /// GET `endpoint` with `data` as query parameters; JSON result.
    pub fn get(&self, endpoint: &str, data: &Map<String, Value>) -> Result<Value, ClientError> {
        self.send_request(endpoint, data, None, Method::Get, false)?.into_json()
    }

    /// POST `data` as JSON to `endpoint`; JSON result.
    pub fn post(&self, endpoint: &str, data: &Map<String, Value>) -> Result<Value, ClientError> {
        self.send_request(endpoint, data, None, Method::Post, false)?.into_json()
    }
}

impl Drop for VolairClient {
    fn drop(&mut self) {
        let Some(server) = self.dev_server.as_mut() else {
            return;
        };
        if server.is_running() {
            if let Err(e) = server.stop() {
                warn!(error = %e, "failed to stop dev server");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};

    /// Port with nothing listening on it.
    fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    fn unconnected(url: String) -> VolairClient {
        VolairClient {
            kind: ServerKind::classify(&url),
            url,
            default_llm_model: DEFAULT_LLM_MODEL.into(),
            options: ClientOptions {
                request_timeout: Duration::from_secs(2),
                status_timeout: Duration::from_secs(1),
                ..ClientOptions::default()
            },
            dev_server: None,
        }
    }

    #[derive(Default)]
    struct FakeState {
        started: bool,
        stopped: bool,
        redirect_output: Option<bool>,
    }

    #[derive(Clone, Default)]
    struct FakeDevServer(Arc<Mutex<FakeState>>);

    impl DevServer for FakeDevServer {
        fn start(&mut self, redirect_output: bool) -> Result<(), ClientError> {
            let mut s = self.0.lock().unwrap();
            s.started = true;
            s.redirect_output = Some(redirect_output);
            Ok(())
        }

        fn stop(&mut self) -> Result<(), ClientError> {
            self.0.lock().unwrap().stopped = true;
            Ok(())
        }

        fn is_running(&mut self) -> bool {
            let s = self.0.lock().unwrap();
            s.started && !s.stopped
        }
    }

    #[test]
    fn default_options() {
        let opts = ClientOptions::default();
        assert_eq!(opts.request_timeout, Duration::from_secs(600));
        assert_eq!(opts.dev_server_url, "http://localhost:7541");
        assert_eq!(opts.default_llm_model, "openai/gpt-4o");
    }

    #[test]
    fn transport_failure_is_timeout() {
        let client = unconnected(format!("http://127.0.0.1:{}", closed_port()));
        let err = client
            .send_request("/agent", &Map::new(), None, Method::Post, false)
            .unwrap_err();
        assert!(matches!(err, ClientError::Timeout(_)), "got {err:?}");
        assert!(err.status().is_none());
    }

    #[test]
    fn status_probe_false_when_unreachable() {
        let client = unconnected(format!("http://127.0.0.1:{}", closed_port()));
        assert!(!client.check_server_status());
    }

    #[test]
    fn default_model_can_be_changed() {
        let mut client = unconnected("http://127.0.0.1:1".into());
        assert_eq!(client.default_llm_model(), "openai/gpt-4o");
        client.set_default_llm_model("anthropic/claude-3-5-sonnet");
        assert_eq!(client.default_llm_model(), "anthropic/claude-3-5-sonnet");
    }

    #[test]
    fn dev_server_url_is_rewritten_and_started() {
        let mut server = mockito::Server::new();
        let _status = server.mock("GET", "/status").with_status(200).create();

        let fake = FakeDevServer::default();
        let client = VolairClient::builder("http://devserver")
            .options(ClientOptions {
                dev_server_url: server.url(),
                ..ClientOptions::default()
            })
            .dev_server(fake.clone())
            .connect()
            .unwrap();

        assert_eq!(client.server_kind(), ServerKind::LocalServer);
        assert_eq!(client.url(), server.url());
        {
            let s = fake.0.lock().unwrap();
            assert!(s.started);
            assert_eq!(s.redirect_output, Some(true));
            assert!(!s.stopped);
        }

        drop(client);
        assert!(fake.0.lock().unwrap().stopped);
    }

    #[test]
    fn dev_server_keeps_output_in_debug_mode() {
        let mut server = mockito::Server::new();
        let _status = server.mock("GET", "/status").with_status(200).create();

        let fake = FakeDevServer::default();
        let _client = VolairClient::builder("localserver")
            .options(ClientOptions {
                dev_server_url: server.url(),
                ..ClientOptions::default()
            })
            .debug(true)
            .dev_server(fake.clone())
            .connect()
            .unwrap();

        assert_eq!(fake.0.lock().unwrap().redirect_output, Some(false));
    }

    #[test]
    fn failed_dev_server_connect_stops_server() {
        let fake = FakeDevServer::default();
        let err = VolairClient::builder("http://devserver")
            .options(ClientOptions {
                dev_server_url: format!("http://127.0.0.1:{}", closed_port()),
                status_timeout: Duration::from_millis(200),
                dev_server_startup_timeout: Duration::from_millis(300),
                ..ClientOptions::default()
            })
            .dev_server(fake.clone())
            .connect()
            .unwrap_err();

        assert!(matches!(err, ClientError::ServerStatus(_)));
        let s = fake.0.lock().unwrap();
        assert!(s.started);
        assert!(s.stopped);
    }
}
