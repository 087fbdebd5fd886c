//! HTTP API - Exposes each pipeline operation as its own endpoint
//!
//! Minimal HTTP/1.1 handling on top of tokio: one request per connection,
//! JSON in and out. Input errors map to 400, every other failure to 500 with
//! `{"error": message}`.

use crate::error::{LucyError, Result};
use crate::execution::ResultRow;
use crate::pipeline::{AnalyticsPipeline, AskOptions};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

const MAX_REQUEST_BYTES: usize = 1024 * 1024;

/// Parsed request line, headers and body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl HttpRequest {
    pub fn parse(raw: &str) -> Option<Self> {
        let (head, body) = raw.split_once("\r\n\r\n").unwrap_or((raw, ""));
        let mut lines = head.lines();
        let mut parts = lines.next()?.split_whitespace();
        let method = parts.next()?.to_string();
        let target = parts.next()?;

        // Drop the query string and normalize the trailing slash
        let path = target.split('?').next().unwrap_or(target).trim_end_matches('/');
        let path = if path.is_empty() { "/" } else { path }.to_string();

        let headers = lines
            .take_while(|line| !line.is_empty())
            .filter_map(|line| line.split_once(':'))
            .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
            .collect();

        Some(Self {
            method,
            path,
            headers,
            body: body.to_string(),
        })
    }

    fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        serde_json::from_str(&self.body)
            .map_err(|e| LucyError::Input(format!("Invalid JSON body: {}", e)))
    }
}

pub fn create_response(status: u16, status_text: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: Content-Type\r\n\
         Content-Length: {}\r\n\
         \r\n\
         {}",
        status,
        status_text,
        body.len(),
        body
    )
}

fn json_response(status: u16, status_text: &str, body: &serde_json::Value) -> String {
    create_response(status, status_text, &body.to_string())
}

fn error_response(err: &LucyError) -> String {
    let body = json!({ "error": err.to_string() });
    if err.is_input() {
        json_response(400, "Bad Request", &body)
    } else {
        json_response(500, "Internal Server Error", &body)
    }
}

fn to_response<T: serde::Serialize>(result: Result<T>) -> String {
    match result.and_then(|value| serde_json::to_value(value).map_err(LucyError::from)) {
        Ok(body) => json_response(200, "OK", &body),
        Err(e) => error_response(&e),
    }
}

#[derive(Deserialize)]
struct GenerateBody {
    input: String,
}

#[derive(Deserialize)]
struct ExecuteBody {
    query: String,
}

#[derive(Deserialize)]
struct ExplainBody {
    input: String,
    query: String,
}

#[derive(Deserialize)]
struct ChartBody {
    input: String,
    rows: Vec<ResultRow>,
}

#[derive(Deserialize)]
struct AskBody {
    input: String,
    #[serde(flatten)]
    options: AskOptions,
}

pub struct ApiServer {
    pipeline: Arc<AnalyticsPipeline>,
}

impl ApiServer {
    pub fn new(pipeline: Arc<AnalyticsPipeline>) -> Self {
        Self { pipeline }
    }

    /// Accept connections on `addr` until the listener fails.
    pub async fn serve(self: Arc<Self>, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", addr);

        loop {
            let (stream, peer) = listener.accept().await?;
            let server = self.clone();
            let span = info_span!("request", id = %Uuid::new_v4(), peer = %peer);
            tokio::spawn(async move { server.handle_connection(stream).await }.instrument(span));
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream) {
        let response = match read_request(&mut stream).await {
            Ok(raw) => self.handle_request(&raw).await,
            Err(e) => {
                warn!("Failed to read request: {}", e);
                json_response(400, "Bad Request", &json!({ "error": e.to_string() }))
            }
        };

        if let Err(e) = stream.write_all(response.as_bytes()).await {
            error!("Failed to write response: {}", e);
        }
    }

    pub async fn handle_request(&self, raw: &str) -> String {
        let request = match HttpRequest::parse(raw) {
            Some(request) => request,
            None => return json_response(400, "Bad Request", &json!({ "error": "Malformed request" })),
        };
        info!("{} {}", request.method, request.path);

        match (request.method.as_str(), request.path.as_str()) {
            ("OPTIONS", _) => create_response(204, "No Content", ""),
            ("GET", "/api/health") => {
                json_response(200, "OK", &json!({ "status": "ok", "service": "lucy-analytics" }))
            }
            ("GET", "/api/catalog") => to_response(Ok(self.pipeline.catalog())),
            ("POST", "/api/query/generate") => {
                let result = match request.json::<GenerateBody>() {
                    Ok(body) => self.pipeline.generate_query(&body.input).await,
                    Err(e) => Err(e),
                };
                to_response(result.map(|q| json!({ "query": q.sql, "catalogCheck": q.catalog_check })))
            }
            ("POST", "/api/query/execute") => {
                let result = match request.json::<ExecuteBody>() {
                    Ok(body) => self.pipeline.execute_query(&body.query).await,
                    Err(e) => Err(e),
                };
                to_response(result.map(|rows| json!({ "rows": rows })))
            }
            ("POST", "/api/query/explain") => {
                let result = match request.json::<ExplainBody>() {
                    Ok(body) => self.pipeline.explain_query(&body.input, &body.query).await,
                    Err(e) => Err(e),
                };
                to_response(result)
            }
            ("POST", "/api/chart/config") => {
                let result = match request.json::<ChartBody>() {
                    Ok(body) => self.pipeline.generate_chart_config(&body.rows, &body.input).await,
                    Err(e) => Err(e),
                };
                to_response(result.map(|config| json!({ "config": config })))
            }
            ("POST", "/api/ask") => {
                let result = match request.json::<AskBody>() {
                    Ok(body) => self.pipeline.ask(&body.input, body.options).await,
                    Err(e) => Err(e),
                };
                to_response(result)
            }
            ("GET", "/api/diagnostics") => to_response(Ok(self.pipeline.test_database_connection().await)),
            ("GET", "/api/dashboard/stats") => {
                to_response(Ok(json!({ "stats": self.pipeline.dashboard_stats().await })))
            }
            _ => json_response(404, "Not Found", &json!({ "error": "Not found" })),
        }
    }
}

/// Read headers, then as many body bytes as `Content-Length` announces.
async fn read_request(stream: &mut TcpStream) -> Result<String> {
    let mut buffer = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if buffer.len() > MAX_REQUEST_BYTES {
            return Err(LucyError::Input("Request too large".to_string()));
        }

        if let Some(header_end) = find_header_end(&buffer) {
            let head = String::from_utf8_lossy(&buffer[..header_end]);
            let content_length = content_length(&head)?;
            if buffer.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }

    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Declared body length, bounded by `MAX_REQUEST_BYTES`
fn content_length(head: &str) -> Result<usize> {
    let declared = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
        .map(|(_, v)| v.trim());

    match declared {
        None => Ok(0),
        Some(value) => match value.parse::<usize>() {
            Ok(length) if length <= MAX_REQUEST_BYTES => Ok(length),
            Ok(_) => Err(LucyError::Input("Request too large".to_string())),
            Err(_) => Err(LucyError::Input(format!("Invalid Content-Length: {}", value))),
        },
    }
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|w| w == b"\r\n\r\n")
}
