//! HDFS over the WebHDFS REST API.
//!
//! Only available with the `webhdfs` feature. Maps the backend primitives
//! onto WebHDFS operations:
//!
//! | Primitive | Request |
//! |---|---|
//! | `exists` | `GET ?op=GETFILESTATUS` |
//! | `open_for_append` | `POST ?op=APPEND` with an empty body |
//! | `create` | `PUT ?op=CREATE&overwrite=true` |
//! | `rename` | `PUT ?op=RENAME&destination=…` |
//! | `make_directories` | `PUT ?op=MKDIRS` |
//!
//! File handles buffer writes and push them on flush. When the cluster
//! supports append, each flush sends an `APPEND`. Otherwise the handle keeps
//! the file body and re-creates it on every flush, up to
//! [`WebHdfsConfig::rewrite_limit`] bytes; a write past the limit fails, which
//! closes the session, and the next open moves the full file aside and starts
//! a new one.

use std::io::{self, ErrorKind, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::Method;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;

use super::Backend;
use crate::error::{AppendError, Result, WebHdfsError};

/// Default cap on a file body held for re-creation when append is unavailable.
pub const DEFAULT_REWRITE_LIMIT: usize = 8 * 1024 * 1024;

/// Exception name WebHDFS reports when append is disabled or unsupported.
const UNSUPPORTED_EXCEPTION: &str = "UnsupportedOperationException";

/// Connection settings for a WebHDFS endpoint.
#[derive(Debug, Clone)]
pub struct WebHdfsConfig {
    /// Base URL including the API prefix, e.g. `http://namenode:9870/webhdfs/v1`.
    pub base_url: String,
    /// Value for the `user.name` query parameter (simple authentication).
    pub user: Option<String>,
    /// HTTP timeout for each request.
    pub timeout: Duration,
    /// Extra HTTP headers (e.g., for authentication proxies).
    pub headers: Vec<(String, String)>,
    /// Largest file body a handle keeps for re-creation on clusters without append.
    pub rewrite_limit: usize,
}

impl WebHdfsConfig {
    /// Creates a config with a 30s timeout, no user, and the default rewrite limit.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            user: None,
            timeout: Duration::from_secs(30),
            headers: Vec::new(),
            rewrite_limit: DEFAULT_REWRITE_LIMIT,
        }
    }

    /// Sets the `user.name` parameter.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Sets the HTTP timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the rewrite limit in bytes.
    #[must_use]
    pub fn with_rewrite_limit(mut self, bytes: usize) -> Self {
        self.rewrite_limit = bytes;
        self
    }

    /// Adds an HTTP header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }
}

#[derive(Debug)]
struct Inner {
    client: Client,
    config: WebHdfsConfig,
    append_supported: AtomicBool,
}

impl Inner {
    fn request(&self, method: Method, path: &str, op: &str, params: &[(&str, &str)]) -> RequestBuilder {
        let mut request = self
            .client
            .request(method, self.config.url(path))
            .query(&[("op", op)])
            .query(params);

        if let Some(user) = &self.config.user {
            request = request.query(&[("user.name", user.as_str())]);
        }
        for (name, value) in &self.config.headers {
            request = request.header(name, value);
        }
        request
    }

    fn send(&self, request: RequestBuilder) -> std::result::Result<Response, RemoteFault> {
        let response = request.send().map_err(|e| RemoteFault::transport(&e))?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().unwrap_or_default();
        Err(RemoteFault::from_response(status, &body))
    }

    fn boolean_op(&self, path: &str, op: &str, params: &[(&str, &str)]) -> io::Result<bool> {
        let response = self
            .send(self.request(Method::PUT, path, op, params))
            .map_err(RemoteFault::into_io)?;
        let bytes = response.bytes().map_err(io::Error::other)?;
        let body: BooleanBody = serde_json::from_slice(&bytes)
            .map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;
        Ok(body.boolean)
    }

    fn create(&self, path: &str, body: Vec<u8>) -> io::Result<()> {
        let request = self
            .request(Method::PUT, path, "CREATE", &[("overwrite", "true")])
            .header("Content-Type", "application/octet-stream")
            .body(body);
        self.send(request).map(drop).map_err(RemoteFault::into_io)
    }

    fn append(&self, path: &str, body: Vec<u8>) -> std::result::Result<(), RemoteFault> {
        let request = self
            .request(Method::POST, path, "APPEND", &[])
            .header("Content-Type", "application/octet-stream")
            .body(body);
        self.send(request).map(drop)
    }
}

/// Backend over a WebHDFS endpoint.
#[derive(Debug, Clone)]
pub struct WebHdfsBackend {
    inner: Arc<Inner>,
}

impl WebHdfsBackend {
    /// Builds the HTTP client for `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is not http(s) or the client cannot
    /// be created.
    pub fn new(config: WebHdfsConfig) -> Result<Self> {
        if !(config.base_url.starts_with("http://") || config.base_url.starts_with("https://")) {
            return Err(WebHdfsError::InvalidUrl {
                url: config.base_url,
            }
            .into());
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| WebHdfsError::ClientCreate { source: e })?;

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                config,
                append_supported: AtomicBool::new(true),
            }),
        })
    }

    /// Whether append has been observed to work (or not yet been refused).
    pub fn append_supported(&self) -> bool {
        self.inner.append_supported.load(Ordering::Relaxed)
    }
}

impl Backend for WebHdfsBackend {
    type Handle = WebHdfsFile;

    fn exists(&self, path: &str) -> io::Result<bool> {
        match self
            .inner
            .send(self.inner.request(Method::GET, path, "GETFILESTATUS", &[]))
        {
            Ok(_) => Ok(true),
            Err(fault) if fault.status == Some(404) => Ok(false),
            Err(fault) => Err(fault.into_io()),
        }
    }

    fn open_for_append(&self, path: &str) -> std::result::Result<WebHdfsFile, AppendError> {
        if !self.append_supported() {
            return Err(AppendError::Unsupported(
                "append previously refused by this cluster".to_string(),
            ));
        }

        match self.inner.append(path, Vec::new()) {
            Ok(()) => Ok(WebHdfsFile::new(Arc::clone(&self.inner), path, FlushMode::Append)),
            Err(fault) if fault.is_unsupported() => {
                self.inner.append_supported.store(false, Ordering::Relaxed);
                Err(AppendError::Unsupported(fault.message))
            }
            Err(fault) => Err(AppendError::Io(fault.into_io())),
        }
    }

    fn create(&self, path: &str) -> io::Result<WebHdfsFile> {
        self.inner.create(path, Vec::new())?;

        let mode = if self.append_supported() {
            FlushMode::Append
        } else {
            FlushMode::Rewrite {
                written: Vec::new(),
            }
        };
        Ok(WebHdfsFile::new(Arc::clone(&self.inner), path, mode))
    }

    fn rename(&self, src: &str, dst: &str) -> io::Result<bool> {
        self.inner.boolean_op(src, "RENAME", &[("destination", dst)])
    }

    fn make_directories(&self, path: &str) -> io::Result<bool> {
        self.inner.boolean_op(path, "MKDIRS", &[])
    }
}

#[derive(Debug)]
enum FlushMode {
    Append,
    Rewrite { written: Vec<u8> },
}

/// A buffered WebHDFS file handle.
#[derive(Debug)]
pub struct WebHdfsFile {
    inner: Arc<Inner>,
    path: String,
    mode: FlushMode,
    pending: Vec<u8>,
}

impl WebHdfsFile {
    fn new(inner: Arc<Inner>, path: &str, mode: FlushMode) -> Self {
        Self {
            inner,
            path: path.to_string(),
            mode,
            pending: Vec::new(),
        }
    }
}

impl Write for WebHdfsFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let FlushMode::Rewrite { written } = &self.mode {
            let held = written.len() + self.pending.len();
            let limit = self.inner.config.rewrite_limit;
            if held > 0 && held + buf.len() > limit {
                return Err(io::Error::new(
                    ErrorKind::FileTooLarge,
                    format!("{} would exceed the rewrite limit of {limit} bytes", self.path),
                ));
            }
        }
        self.pending.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        match &mut self.mode {
            FlushMode::Append => {
                self.inner
                    .append(&self.path, self.pending.clone())
                    .map_err(RemoteFault::into_io)?;
            }
            FlushMode::Rewrite { written } => {
                let mut body = Vec::with_capacity(written.len() + self.pending.len());
                body.extend_from_slice(written);
                body.extend_from_slice(&self.pending);
                self.inner.create(&self.path, body.clone())?;
                *written = body;
            }
        }

        self.pending.clear();
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct BooleanBody {
    boolean: bool,
}

#[derive(Debug, Deserialize)]
struct RemoteExceptionBody {
    #[serde(rename = "RemoteException")]
    remote_exception: RemoteException,
}

#[derive(Debug, Deserialize)]
struct RemoteException {
    exception: String,
    #[serde(default)]
    message: String,
}

/// A failed WebHDFS call, before it is folded into an `io::Error`.
#[derive(Debug)]
struct RemoteFault {
    status: Option<u16>,
    exception: String,
    message: String,
}

impl RemoteFault {
    fn transport(error: &reqwest::Error) -> Self {
        Self {
            status: None,
            exception: String::new(),
            message: error.to_string(),
        }
    }

    fn from_response(status: u16, body: &str) -> Self {
        match serde_json::from_str::<RemoteExceptionBody>(body) {
            Ok(parsed) => Self {
                status: Some(status),
                exception: parsed.remote_exception.exception,
                message: parsed.remote_exception.message,
            },
            Err(_) => Self {
                status: Some(status),
                exception: String::new(),
                message: body.to_string(),
            },
        }
    }

    fn is_unsupported(&self) -> bool {
        self.exception == UNSUPPORTED_EXCEPTION || matches!(self.status, Some(405 | 501))
    }

    fn kind(&self) -> ErrorKind {
        match (self.exception.as_str(), self.status) {
            ("FileNotFoundException", _) | (_, Some(404)) => ErrorKind::NotFound,
            ("AccessControlException" | "SecurityException", _) | (_, Some(401 | 403)) => {
                ErrorKind::PermissionDenied
            }
            ("FileAlreadyExistsException", _) => ErrorKind::AlreadyExists,
            (UNSUPPORTED_EXCEPTION, _) => ErrorKind::Unsupported,
            (_, None) => ErrorKind::ConnectionAborted,
            _ => ErrorKind::Other,
        }
    }

    fn into_io(self) -> io::Error {
        let kind = self.kind();
        let text = match (self.status, self.exception.is_empty()) {
            (Some(status), false) => format!("{status} {}: {}", self.exception, self.message),
            (Some(status), true) => format!("{status}: {}", self.message),
            (None, _) => self.message,
        };
        io::Error::new(kind, text)
    }
}
