// elfwatch/src/http_api.rs
//
// Dashboard HTTP surface. A hand-rolled HTTP/1.1 server on a tokio listener:
// one task per connection, one request per connection, `Connection: close`.
//
//   GET  /                          dashboard page (or a template debug page)
//   GET  /api/data-summary          columns, row count and sample per CSV
//   GET  /api/analyze-elf/<name>    profile; `?enrich=true` adds insight
//   GET  /api/workshop-status       workshop rollup
//   GET  /api/predict-elf/<name>    behavior prediction
//   POST /api/reload                re-read the data directory
//   GET  /metrics                   Prometheus counters
//
// Every request obtains its tables through the TableSource, so the reload
// policy decides whether on-disk edits are visible immediately.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::engine::{self, workshop_summary};
use crate::insight::InsightProvider;
use crate::loader::{TableSource, Tables};
use crate::metrics::DashboardMetrics;
use crate::records::{Analysis, NotFound};
use crate::summary;

const MAX_REQUEST_BYTES: usize = 64 * 1024;
const TEMPLATE_FILE: &str = "index.html";
const READ_TIMEOUT: Duration = Duration::from_secs(10);

// ── Shared state ──────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub source:       Arc<TableSource>,
    pub template_dir: PathBuf,
    pub insight:      Option<Arc<dyn InsightProvider>>,
    pub metrics:      Arc<DashboardMetrics>,
}

impl AppState {
    pub fn new(source: Arc<TableSource>, template_dir: impl Into<PathBuf>) -> Self {
        Self {
            source,
            template_dir: template_dir.into(),
            insight:      None,
            metrics:      DashboardMetrics::new(),
        }
    }

    pub fn with_insight(mut self, provider: Arc<dyn InsightProvider>) -> Self {
        self.insight = Some(provider);
        self
    }
}

// ── Routing ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Dashboard,
    DataSummary,
    AnalyzeElf { name: String, enrich: bool },
    WorkshopStatus,
    PredictElf { name: String },
    Reload,
    Metrics,
    NotFound,
    MethodNotAllowed { allow: &'static str },
}

/// Map a request line to a route. Pure; no I/O.
pub fn route(method: &str, target: &str) -> Route {
    let (path, query) = target.split_once('?').unwrap_or((target, ""));

    let (matched, allow) = match path {
        "/"                     => (Route::Dashboard, "GET"),
        "/api/data-summary"     => (Route::DataSummary, "GET"),
        "/api/workshop-status"  => (Route::WorkshopStatus, "GET"),
        "/api/reload"           => (Route::Reload, "POST"),
        "/metrics"              => (Route::Metrics, "GET"),
        _ => {
            if let Some(raw) = path.strip_prefix("/api/analyze-elf/") {
                match decode_name(raw) {
                    Some(name) => (Route::AnalyzeElf { name, enrich: wants_enrichment(query) }, "GET"),
                    None       => return Route::NotFound,
                }
            } else if let Some(raw) = path.strip_prefix("/api/predict-elf/") {
                match decode_name(raw) {
                    Some(name) => (Route::PredictElf { name }, "GET"),
                    None       => return Route::NotFound,
                }
            } else {
                return Route::NotFound;
            }
        }
    };

    if method == allow {
        matched
    } else {
        Route::MethodNotAllowed { allow }
    }
}

/// A single path segment, percent-decoded. Empty or nested segments don't match.
fn decode_name(raw: &str) -> Option<String> {
    if raw.is_empty() || raw.contains('/') {
        return None;
    }
    let name = percent_decode_str(raw).decode_utf8_lossy().into_owned();
    if name.is_empty() { None } else { Some(name) }
}

fn wants_enrichment(query: &str) -> bool {
    query.split('&')
        .filter_map(|pair| pair.split_once('='))
        .any(|(k, v)| {
            k == "enrich"
                && ["true", "1", "yes"].iter().any(|t| v.eq_ignore_ascii_case(t))
        })
}

// ── Request framing ───────────────────────────────────────────────────────────

fn is_complete_request(text: &str) -> bool {
    let body_start = match text.find("\r\n\r\n") {
        Some(i) => i + 4,
        None => match text.find("\n\n") {
            Some(i) => i + 2,
            None => return false,
        },
    };

    match header_value(&text[..body_start], "content-length").and_then(|v| v.trim().parse::<usize>().ok()) {
        Some(len) => text.len() >= body_start + len,
        None => true,
    }
}

fn header_value<'a>(head: &'a str, header: &str) -> Option<&'a str> {
    head.lines()
        .skip(1)
        .filter_map(|line| line.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case(header))
        .map(|(_, v)| v.trim())
}

/// `(method, target)` from the request line.
fn request_line(text: &str) -> Option<(&str, &str)> {
    let mut parts = text.lines().next()?.split_whitespace();
    let method  = parts.next()?;
    let target  = parts.next()?;
    let version = parts.next()?;
    if !version.starts_with("HTTP/") || !target.starts_with('/') {
        return None;
    }
    Some((method, target))
}

async fn read_request(stream: &mut TcpStream) -> Result<String> {
    let mut buf   = Vec::with_capacity(1024);
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() > MAX_REQUEST_BYTES {
            anyhow::bail!("request too large: {} bytes", buf.len());
        }
        if is_complete_request(&String::from_utf8_lossy(&buf)) {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

// ── Responses ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Response {
    pub status:       u16,
    pub content_type: &'static str,
    pub body:         String,
    allow:            Option<&'static str>,
}

impl Response {
    fn new(status: u16, content_type: &'static str, body: String) -> Self {
        Self { status, content_type, body, allow: None }
    }

    fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => Self::new(status, "application/json", body),
            Err(e)   => Self::error(500, &format!("serialization failed: {}", e)),
        }
    }

    fn error(status: u16, message: &str) -> Self {
        Self::new(status, "application/json", json!({ "error": message }).to_string())
    }

    fn html(body: String) -> Self {
        Self::new(200, "text/html; charset=utf-8", body)
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n",
            self.status, reason(self.status), self.content_type, self.body.len()
        );
        if let Some(allow) = self.allow {
            head.push_str(&format!("Allow: {}\r\n", allow));
        }
        head.push_str("\r\n");
        let mut out = head.into_bytes();
        out.extend_from_slice(self.body.as_bytes());
        out
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _   => "",
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Inline diagnostic shown when the dashboard template can't be read.
fn debug_page(error: &str, template_dir: &Path) -> String {
    let folder = template_dir.display().to_string();
    let index  = template_dir.join(TEMPLATE_FILE);
    format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Dashboard template error</title></head>\n<body>\n\
         <h1>Error loading template</h1>\n\
         <p>Error: {}</p>\n\
         <p>Template folder: {}</p>\n\
         <p>Template folder exists: {}</p>\n\
         <p>{} exists: {}</p>\n\
         </body>\n</html>\n",
        escape_html(error),
        escape_html(&folder),
        template_dir.is_dir(),
        TEMPLATE_FILE,
        index.is_file(),
    )
}

// ── Server ────────────────────────────────────────────────────────────────────

pub struct DashboardServer {
    state:        AppState,
    addr:         SocketAddr,
    read_timeout: Duration,
}

impl DashboardServer {
    pub fn new(state: AppState, addr: SocketAddr) -> Self {
        Self { state, addr, read_timeout: READ_TIMEOUT }
    }

    /// Deadline for a client to deliver its full request.
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn metrics(&self) -> &Arc<DashboardMetrics> {
        &self.state.metrics
    }

    pub async fn serve(self: Arc<Self>) -> Result<()> {
        let listener = TcpListener::bind(self.addr).await
            .with_context(|| format!("binding dashboard listener on {}", self.addr))?;
        self.serve_on(listener).await
    }

    /// Accept loop over an already-bound listener.
    pub async fn serve_on(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        info!("Dashboard listening on http://{}", listener.local_addr()?);

        loop {
            let (stream, peer) = listener.accept().await?;
            let srv = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = srv.handle_connection(stream).await {
                    warn!("Dashboard connection error from {}: {}", peer, e);
                }
            });
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream) -> Result<()> {
        let text = match tokio::time::timeout(self.read_timeout, read_request(&mut stream)).await {
            Ok(read) => read?,
            Err(_) => anyhow::bail!("no complete request within {:?}", self.read_timeout),
        };
        if text.is_empty() {
            return Ok(());
        }

        let response = match request_line(&text) {
            Some((method, target)) => {
                self.state.metrics.record_request();
                let resp = self.respond(route(method, target)).await;
                debug!("{} {} -> {}", method, target, resp.status);
                resp
            }
            None => Response::error(400, "bad request"),
        };

        stream.write_all(&response.to_bytes()).await?;
        stream.shutdown().await?;
        Ok(())
    }

    pub async fn respond(&self, route: Route) -> Response {
        match route {
            Route::Dashboard                  => self.dashboard().await,
            Route::DataSummary                => self.data_summary().await,
            Route::AnalyzeElf { name, enrich } => self.analyze_elf(&name, enrich).await,
            Route::WorkshopStatus             => self.workshop_status().await,
            Route::PredictElf { name }        => self.predict_elf(&name).await,
            Route::Reload                     => self.reload().await,
            Route::Metrics                    => Response::new(
                200,
                "text/plain; version=0.0.4",
                self.state.metrics.prometheus_text(),
            ),
            Route::NotFound                   => Response::error(404, "not found"),
            Route::MethodNotAllowed { allow } => {
                let mut resp = Response::error(405, "method not allowed");
                resp.allow = Some(allow);
                resp
            }
        }
    }

    /// Tables for this request; a load failure becomes a 500 for this request only.
    async fn tables(&self) -> Result<Arc<Tables>, Response> {
        let source = Arc::clone(&self.state.source);
        let loaded = tokio::task::spawn_blocking(move || source.current()).await;
        match loaded {
            Ok(Ok(tables)) => Ok(tables),
            Ok(Err(e)) => {
                self.state.metrics.record_load_failure();
                warn!("Data load failed: {}", e);
                Err(Response::error(500, &e.to_string()))
            }
            Err(e) => {
                self.state.metrics.record_load_failure();
                warn!("Data load task failed: {}", e);
                Err(Response::error(500, "data load task failed"))
            }
        }
    }

    async fn dashboard(&self) -> Response {
        let path = self.state.template_dir.join(TEMPLATE_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(page) => Response::html(page),
            Err(e) => {
                warn!("Template {} unavailable: {}", path.display(), e);
                Response::html(debug_page(&e.to_string(), &self.state.template_dir))
            }
        }
    }

    async fn data_summary(&self) -> Response {
        let dir = self.state.source.dir().to_path_buf();
        match tokio::task::spawn_blocking(move || summary::summarize_dir(&dir)).await {
            Ok(Ok(files)) => Response::json(200, &files),
            Ok(Err(e)) => {
                self.state.metrics.record_load_failure();
                warn!("Data summary failed: {}", e);
                Response::error(500, &e.to_string())
            }
            Err(e) => {
                warn!("Data summary task failed: {}", e);
                Response::error(500, "data summary task failed")
            }
        }
    }

    async fn analyze_elf(&self, name: &str, enrich: bool) -> Response {
        let tables = match self.tables().await {
            Ok(t) => t,
            Err(resp) => return resp,
        };

        let analysis = match (enrich, &self.state.insight) {
            (true, Some(provider)) => {
                let analysis = engine::analyze_enriched(&tables, name, &**provider).await;
                if let Analysis::Profile(p) = &analysis {
                    self.state.metrics.record_insight(p.ai_assessment.is_some());
                }
                analysis
            }
            (true, None) => {
                debug!("Enrichment requested for {} but no insight provider is configured", name);
                engine::analyze(&tables, name)
            }
            (false, _) => engine::analyze(&tables, name),
        };

        self.state.metrics.record_analysis(&analysis);
        Response::json(200, &analysis)
    }

    async fn workshop_status(&self) -> Response {
        match self.tables().await {
            Ok(tables) => Response::json(200, &workshop_summary(&tables)),
            Err(resp) => resp,
        }
    }

    async fn predict_elf(&self, name: &str) -> Response {
        let tables = match self.tables().await {
            Ok(t) => t,
            Err(resp) => return resp,
        };

        let provider = self.state.insight.as_deref();
        match engine::predict(&tables, name, provider).await {
            Some(prediction) => {
                if provider.is_some() {
                    self.state.metrics.record_insight(prediction.prediction.is_some());
                }
                Response::json(200, &prediction)
            }
            None => {
                self.state.metrics.record_analysis(&Analysis::NotFound(NotFound::elf(name)));
                Response::json(200, &NotFound::elf(name))
            }
        }
    }

    async fn reload(&self) -> Response {
        let source = Arc::clone(&self.state.source);
        let policy = source.policy();
        match tokio::task::spawn_blocking(move || source.reload()).await {
            Ok(Ok(tables)) => {
                self.state.metrics.record_reload();
                Response::json(200, &json!({
                    "reloaded":      true,
                    "policy":        policy,
                    "behavior_rows": tables.behavior.len(),
                }))
            }
            Ok(Err(e)) => {
                warn!("Reload failed, keeping previous tables: {}", e);
                Response::json(500, &json!({
                    "reloaded": false,
                    "policy":   policy,
                    "error":    e.to_string(),
                }))
            }
            Err(e) => {
                warn!("Reload task failed: {}", e);
                Response::error(500, "reload task failed")
            }
        }
    }
}
