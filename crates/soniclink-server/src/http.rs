//! Plain-HTTP sidecar on the control listener.
//!
//! The control port speaks WebSocket for the protocol itself, but also
//! answers a few plain GET requests: a health check and a static control
//! page. Requests are classified by peeking at the head before handing the
//! stream to the WebSocket handshake, so no HTTP framework is needed.

use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// How a freshly accepted connection should be handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preflight {
    /// The request carries a WebSocket upgrade; run the tungstenite handshake.
    WebSocket,
    /// A plain HTTP request; answer it and close.
    Plain(PlainRequest),
}

/// Parsed head of a plain HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainRequest {
    pub method: String,
    /// Request path with any query string stripped.
    pub path: String,
    /// Bytes of the request head to consume before writing a response.
    pub head_len: usize,
}

const MAX_HEAD: usize = 4096;

/// Peek at the request head without consuming it and classify the connection.
pub async fn preflight(stream: &TcpStream) -> io::Result<Preflight> {
    let mut buf = [0u8; MAX_HEAD];
    let mut len = 0;

    // The head almost always arrives in one segment; retry briefly if a
    // client trickles it.
    for _ in 0..50 {
        len = stream.peek(&mut buf).await?;
        if len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before request head",
            ));
        }
        if head_complete(&buf[..len]) || len == MAX_HEAD {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    Ok(classify(&buf[..len]))
}

fn head_complete(head: &[u8]) -> bool {
    head.windows(4).any(|w| w == b"\r\n\r\n")
}

/// Classify a request head as a WebSocket upgrade or a plain request.
pub fn classify(head: &[u8]) -> Preflight {
    let text = String::from_utf8_lossy(head);
    let mut lines = text.lines();

    let request_line = lines.next().unwrap_or("");
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let target = parts.next().unwrap_or("/");
    let path = target.split('?').next().unwrap_or("/").to_string();

    for line in lines.by_ref() {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("upgrade")
                && value.trim().eq_ignore_ascii_case("websocket")
            {
                return Preflight::WebSocket;
            }
        }
    }

    Preflight::Plain(PlainRequest {
        method,
        path,
        head_len: head.len(),
    })
}

/// Answer a plain HTTP request and close the connection.
pub async fn respond(mut stream: TcpStream, request: &PlainRequest) -> io::Result<()> {
    // Consume the peeked head before writing.
    let mut scratch = vec![0u8; request.head_len];
    stream.read_exact(&mut scratch).await?;

    let response = match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/api/health") => http_response(
            "200 OK",
            "application/json",
            &format!(
                r#"{{"status":"ok","version":"{}"}}"#,
                env!("CARGO_PKG_VERSION")
            ),
        ),
        ("GET", "/") | ("GET", "/control") => http_response("200 OK", "text/html", CONTROL_PAGE),
        _ => http_response("404 Not Found", "text/plain", "not found"),
    };

    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

fn http_response(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

/// Minimal built-in control page. The desktop app ships the full remote
/// UI; this page exists so a browser hitting the port gets something
/// useful instead of a failed upgrade.
const CONTROL_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>SonicLink Remote</title>
</head>
<body>
  <h1>SonicLink Remote</h1>
  <p>This is the SonicLink LAN control endpoint. Connect with a SonicLink
  remote client over WebSocket and authenticate with the LAN password shown
  in the desktop app.</p>
</body>
</html>
"#;
