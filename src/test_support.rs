//! Loopback HTTP server and scripted chat backend shared by unit tests.

use anyhow::Result;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::sync::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::sse::SseEvent;
use crate::stream::ChatBackend;

/// Accept a single connection, answer it with the given response and hand
/// back the raw request text.
pub async fn serve_once(
    status: u16,
    reason: &str,
    content_type: &str,
    body: &str,
) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        request
    });

    (base, handle)
}

/// A base URL nothing is listening on
pub async fn unused_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            return String::from_utf8_lossy(&raw).into_owned();
        }
        raw.extend_from_slice(&buf[..n]);
        if let Some(pos) = find(&raw, b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&raw[..header_end]).to_lowercase();
    let content_length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|value| value.trim().parse::<usize>().ok());
    let chunked = head.contains("transfer-encoding: chunked");

    loop {
        let body = &raw[header_end..];
        let complete = match content_length {
            Some(len) => body.len() >= len,
            None if chunked => find(body, b"0\r\n\r\n").is_some(),
            None => true,
        };
        if complete {
            break;
        }
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&buf[..n]);
    }

    String::from_utf8_lossy(&raw).into_owned()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Chat backend whose streams are fed by the test.
///
/// Every `chat_stream` call records the message and opens a fresh channel;
/// `sender(i)` returns the feeding end of the i-th stream.
#[derive(Default)]
pub struct ScriptedBackend {
    requests: Mutex<Vec<String>>,
    senders: Mutex<Vec<mpsc::UnboundedSender<Result<SseEvent>>>>,
}

impl ScriptedBackend {
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn sender(&self, index: usize) -> mpsc::UnboundedSender<Result<SseEvent>> {
        self.senders.lock().unwrap()[index].clone()
    }
}

impl ChatBackend for ScriptedBackend {
    fn chat_stream(&self, message: &str) -> BoxStream<'static, Result<SseEvent>> {
        self.requests.lock().unwrap().push(message.to_string());
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().unwrap().push(tx);

        stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
    }
}

/// An unnamed SSE event carrying `data`
pub fn data(payload: &str) -> Result<SseEvent> {
    Ok(SseEvent {
        event: None,
        data: payload.to_string(),
    })
}

pub fn content(text: &str) -> Result<SseEvent> {
    data(&serde_json::json!({ "type": "content", "content": text }).to_string())
}

pub fn done() -> Result<SseEvent> {
    data(r#"{"type": "done"}"#)
}
