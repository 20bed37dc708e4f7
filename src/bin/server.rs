//! HTTP server for the question-answering pipeline
//! Simple HTTP server using tokio and basic HTTP handling

use business_agent::config::Config;
use business_agent::pipeline::{ErrorResponse, Pipeline, QueryRequest};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const MAX_REQUEST_BYTES: usize = 1_000_000;

struct AppState {
    pipeline: Pipeline,
    allowed_origins: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    if config.require_api_key().is_err() {
        warn!("No LLM API key found - every question will fail at generation");
    }

    let pipeline = Pipeline::from_config(&config).await?;

    // Warm the schema cache; a failure here is retried by the first request.
    match pipeline.schema_cache().get().await {
        Ok(schema) => info!("[OK] Database schema loaded ({} tables)", schema.len()),
        Err(e) => error!("Failed to load database schema: {}", e),
    }

    let state = Arc::new(AppState {
        pipeline,
        allowed_origins: config.cors_allowed_origins.clone(),
    });

    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!("[OK] Server listening on port {}", config.port);

    loop {
        let (stream, addr) = listener.accept().await?;
        debug!("New connection from: {}", addr);
        tokio::spawn(handle_connection(stream, Arc::clone(&state)));
    }
}

async fn handle_connection(mut stream: TcpStream, state: Arc<AppState>) {
    // Read request with timeout to prevent hanging
    let mut buffer = Vec::new();
    let mut temp_buf = [0; 8192];

    let read_result = timeout(Duration::from_secs(5), async {
        loop {
            match stream.read(&mut temp_buf).await {
                Ok(0) => break, // EOF
                Ok(n) => {
                    buffer.extend_from_slice(&temp_buf[..n]);
                    if request_complete(&buffer) || buffer.len() > MAX_REQUEST_BYTES {
                        break;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    })
    .await;

    match read_result {
        Err(_) => {
            warn!("Request read timeout");
            return;
        }
        Ok(Err(e)) => {
            error!("Failed to read from stream: {}", e);
            return;
        }
        Ok(Ok(())) => {}
    }

    if buffer.is_empty() {
        return;
    }

    let response = respond(buffer, &state).await;
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        error!("Failed to write response: {}", e);
    }
}

async fn respond(buffer: Vec<u8>, state: &AppState) -> String {
    if buffer.len() > MAX_REQUEST_BYTES {
        warn!("Rejecting request of {} bytes", buffer.len());
        return create_response(
            413,
            "Payload Too Large",
            None,
            r#"{"error":"Request body too large"}"#,
        );
    }
    match String::from_utf8(buffer) {
        Ok(request) => handle_request(&request, state).await,
        Err(_) => create_response(400, "Bad Request", None, r#"{"error":"request is not valid UTF-8"}"#),
    }
}

/// Headers are in and, if a body was announced, all of it has arrived.
fn request_complete(buffer: &[u8]) -> bool {
    let Ok(s) = std::str::from_utf8(buffer) else {
        return false;
    };
    match s.find("\r\n\r\n") {
        Some(headers_end) => match extract_content_length(s) {
            Some(content_length) => buffer.len() >= headers_end + 4 + content_length,
            None => true,
        },
        None => false,
    }
}

fn extract_content_length(request: &str) -> Option<usize> {
    for line in request.lines() {
        if line.is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            if key.trim().eq_ignore_ascii_case("content-length") {
                return value.trim().parse().ok();
            }
        }
    }
    None
}

struct ParsedRequest<'a> {
    method: &'a str,
    path: String,
    headers: HashMap<String, String>,
    body: &'a str,
}

fn parse_request(request: &str) -> Option<ParsedRequest<'_>> {
    let (head, body) = request.split_once("\r\n\r\n").unwrap_or((request, ""));
    let mut lines = head.lines();
    let mut parts = lines.next()?.split_whitespace();
    let method = parts.next()?;
    let full_path = parts.next()?;

    let path_str = full_path.split('?').next().unwrap_or(full_path);
    // Normalize path (remove trailing slash except for root)
    let mut path = path_str.trim_end_matches('/').to_string();
    if path.is_empty() {
        path = "/".to_string();
    }

    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_lowercase(), value.trim().to_string()))
        .collect();

    Some(ParsedRequest {
        method,
        path,
        headers,
        body,
    })
}

async fn handle_request(request: &str, state: &AppState) -> String {
    let Some(parsed) = parse_request(request) else {
        return create_response(400, "Bad Request", None, "{}");
    };
    debug!("Request: {} {}", parsed.method, parsed.path);

    let origin = parsed
        .headers
        .get("origin")
        .filter(|o| state.allowed_origins.iter().any(|allowed| allowed == *o))
        .map(|o| o.as_str());

    match (parsed.method, parsed.path.as_str()) {
        ("OPTIONS", _) => create_response(204, "No Content", origin, ""),
        ("GET", "/health") | ("GET", "/api/health") => create_response(
            200,
            "OK",
            origin,
            r#"{"status":"ok","database":"postgresql"}"#,
        ),
        ("GET", "/") => {
            let banner = serde_json::json!({
                "message": "Query SQL API is running",
                "endpoints": {
                    "health": "/health",
                    "query": "/api/query"
                },
                "version": env!("CARGO_PKG_VERSION")
            });
            create_response(200, "OK", origin, &banner.to_string())
        }
        ("POST", "/query") | ("POST", "/api/query") => {
            let (status, status_text, body) = answer_query(parsed.body, state).await;
            create_response(status, status_text, origin, &body)
        }
        _ => create_response(404, "Not Found", origin, r#"{"error":"Not found"}"#),
    }
}

async fn answer_query(body: &str, state: &AppState) -> (u16, &'static str, String) {
    let request: QueryRequest = match serde_json::from_str(body.trim()) {
        Ok(request) => request,
        Err(e) => {
            return (
                400,
                "Bad Request",
                error_body(&ErrorResponse {
                    error: format!("Invalid JSON body: {}", e),
                }),
            )
        }
    };

    match state.pipeline.handle(request).await {
        Ok(response) => match serde_json::to_string(&response) {
            Ok(json) => (200, "OK", json),
            Err(e) => (
                500,
                "Internal Server Error",
                error_body(&ErrorResponse { error: e.to_string() }),
            ),
        },
        Err(failure) if failure.error.is_client_error() => {
            (400, "Bad Request", error_body(&failure.to_response()))
        }
        Err(failure) => (500, "Internal Server Error", error_body(&failure.to_response())),
    }
}

fn error_body(error: &ErrorResponse) -> String {
    serde_json::to_string(error).unwrap_or_else(|_| r#"{"error":"internal error"}"#.to_string())
}

fn create_response(status: u16, status_text: &str, origin: Option<&str>, body: &str) -> String {
    let cors = match origin {
        Some(origin) => format!(
            "Access-Control-Allow-Origin: {}\r\n\
             Access-Control-Allow-Credentials: true\r\n\
             Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
             Access-Control-Allow-Headers: Content-Type\r\n\
             Vary: Origin\r\n",
            origin
        ),
        None => String::new(),
    };
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         {}\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        status,
        status_text,
        cors,
        body.len(),
        body
    )
}
