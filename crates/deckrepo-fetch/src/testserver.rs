//! Minimal scripted HTTP server for exercising network paths in tests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// A fixed response served for one path.
pub struct CannedResponse {
    pub status: u16,
    pub reason: &'static str,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CannedResponse {
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            reason: "OK",
            headers: vec![("content-type".to_owned(), "application/octet-stream".to_owned())],
            body,
        }
    }

    pub fn json(body: &str) -> Self {
        Self {
            status: 200,
            reason: "OK",
            headers: vec![("content-type".to_owned(), "application/json".to_owned())],
            body: body.as_bytes().to_vec(),
        }
    }

    pub fn redirect(location: &str) -> Self {
        Self {
            status: 302,
            reason: "Found",
            headers: vec![("location".to_owned(), location.to_owned())],
            body: Vec::new(),
        }
    }

    fn not_found() -> Self {
        Self {
            status: 404,
            reason: "Not Found",
            headers: Vec::new(),
            body: Vec::new(),
        }
    }
}

/// Serves canned responses by request path; unknown paths answer 404.
pub struct TestServer {
    addr: SocketAddr,
}

impl TestServer {
    pub async fn spawn(routes: HashMap<String, CannedResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test server");
        let addr = listener.local_addr().expect("test server local addr");
        let routes = Arc::new(routes);

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let routes = Arc::clone(&routes);
                tokio::spawn(async move {
                    let _ = handle_connection(stream, routes).await;
                });
            }
        });

        Self { addr }
    }

    pub fn base(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

async fn handle_connection(
    mut stream: tokio::net::TcpStream,
    routes: Arc<HashMap<String, CannedResponse>>,
) -> std::io::Result<()> {
    // Read until the end of the request head; the tests never send bodies.
    let mut buf = vec![0u8; 8192];
    let mut read = 0usize;
    loop {
        let n = stream.read(&mut buf[read..]).await?;
        if n == 0 {
            break;
        }
        read += n;
        if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") || read == buf.len() {
            break;
        }
    }

    let head = String::from_utf8_lossy(&buf[..read]);
    let path = head
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .to_owned();

    let fallback = CannedResponse::not_found();
    let resp = routes.get(&path).unwrap_or(&fallback);

    let mut out = format!("HTTP/1.1 {} {}\r\n", resp.status, resp.reason);
    for (name, value) in &resp.headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str(&format!("content-length: {}\r\n", resp.body.len()));
    out.push_str("connection: close\r\n\r\n");

    stream.write_all(out.as_bytes()).await?;
    stream.write_all(&resp.body).await?;
    stream.shutdown().await
}
