// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A minimal hand-rolled mock HTTP/1.1 server for end-to-end tests.
//! Avoids pulling in an external mock-HTTP crate since the stack already
//! depends on `reqwest`/`tokio`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value as Json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[derive(Clone)]
pub struct CannedResponse {
    pub status: u16,
    pub body: Json,
}

impl CannedResponse {
    pub fn ok(body: Json) -> Self {
        Self { status: 200, body }
    }

    pub fn unauthorized() -> Self {
        Self { status: 401, body: Json::Null }
    }

    /// A non-retryable 4xx other than 401.
    pub fn rejected(status: u16) -> Self {
        Self { status, body: Json::Null }
    }
}

/// A handle to a running mock manager. Holds per-path canned response
/// queues (consumed front-to-back) and per-path hit counters.
pub struct MockManager {
    pub base_url: String,
    responses: Arc<Mutex<HashMap<String, Vec<CannedResponse>>>>,
    hits: Arc<Mutex<HashMap<String, usize>>>,
    shutdown: Arc<AtomicUsize>,
}

impl MockManager {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock manager");
        let addr = listener.local_addr().expect("local addr");
        let responses: Arc<Mutex<HashMap<String, Vec<CannedResponse>>>> = Arc::new(Mutex::new(HashMap::new()));
        let hits: Arc<Mutex<HashMap<String, usize>>> = Arc::new(Mutex::new(HashMap::new()));
        let shutdown = Arc::new(AtomicUsize::new(0));

        let responses_bg = responses.clone();
        let hits_bg = hits.clone();
        let shutdown_bg = shutdown.clone();
        tokio::spawn(async move {
            loop {
                if shutdown_bg.load(Ordering::SeqCst) == 1 {
                    return;
                }
                let Ok((stream, _)) = listener.accept().await else { return };
                let responses = responses_bg.clone();
                let hits = hits_bg.clone();
                tokio::spawn(async move {
                    let _ = handle_connection(stream, responses, hits).await;
                });
            }
        });

        Self { base_url: format!("http://{addr}"), responses, hits, shutdown }
    }

    /// Queues a response to be returned the next time `path` is hit.
    pub fn queue(&self, path: &str, response: CannedResponse) {
        self.responses.lock().unwrap().entry(path.to_string()).or_default().push(response);
    }

    pub fn hits(&self, path: &str) -> usize {
        *self.hits.lock().unwrap().get(path).unwrap_or(&0)
    }

    pub fn stop(&self) {
        self.shutdown.store(1, Ordering::SeqCst);
    }
}

async fn handle_connection(
    mut stream: tokio::net::TcpStream,
    responses: Arc<Mutex<HashMap<String, Vec<CannedResponse>>>>,
    hits: Arc<Mutex<HashMap<String, usize>>>,
) -> std::io::Result<()> {
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 1024];
    let (method_path, headers_end) = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_headers_end(&buf) {
            break (parse_request_line(&buf), pos);
        }
        if buf.len() > 64 * 1024 {
            return Ok(());
        }
    };

    let header_text = String::from_utf8_lossy(&buf[..headers_end]).to_string();
    let content_length: usize = header_text
        .lines()
        .find_map(|line| line.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().to_string()))
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let mut body = buf[headers_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    let path = method_path.unwrap_or_default();
    let path_only = path.split('?').next().unwrap_or("").to_string();

    *hits.lock().unwrap().entry(path_only.clone()).or_insert(0) += 1;

    let response = {
        let mut guard = responses.lock().unwrap();
        guard.get_mut(&path_only).and_then(|queue| if queue.len() > 1 { Some(queue.remove(0)) } else { queue.first().cloned() })
    };

    let response = response.unwrap_or(CannedResponse { status: 404, body: Json::Null });
    let body_text = serde_json::to_string(&response.body).unwrap_or_else(|_| "null".to_string());
    let status_text = match response.status {
        200 => "OK",
        401 => "Unauthorized",
        404 => "Not Found",
        _ => "Error",
    };
    let http_response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        response.status,
        status_text,
        body_text.len(),
        body_text
    );
    stream.write_all(http_response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|pos| pos + 4)
}

fn parse_request_line(buf: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(buf);
    let line = text.lines().next()?;
    let mut parts = line.split_whitespace();
    let _method = parts.next()?;
    let path = parts.next()?;
    Some(path.to_string())
}
