//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves one archive at `/<file_name>`; any other path is a 404. Can fail the
//! first N requests with 503 or cut the body short after announcing the full
//! `Content-Length`.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

#[derive(Debug, Clone, Copy, Default)]
pub struct ServerOptions {
    /// Respond 503 to this many requests before serving the body.
    pub fail_first: usize,
    /// Send only this many body bytes, then close.
    pub truncate_to: Option<usize>,
}

pub struct TestServer {
    base: String,
    file_name: String,
    hits: Arc<AtomicUsize>,
}

impl TestServer {
    /// Base URL ending in `/`.
    pub fn base_url(&self) -> &str {
        &self.base
    }

    pub fn archive_url(&self) -> String {
        format!("{}{}", self.base, self.file_name)
    }

    /// Requests received so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

pub fn start(file_name: &str, body: Vec<u8>) -> TestServer {
    start_with_options(file_name, body, ServerOptions::default())
}

/// The server runs until the process exits.
pub fn start_with_options(file_name: &str, body: Vec<u8>, opts: ServerOptions) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let hits = Arc::new(AtomicUsize::new(0));
    let path = format!("/{}", file_name);
    {
        let hits = Arc::clone(&hits);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let body = Arc::clone(&body);
                let n = hits.fetch_add(1, Ordering::SeqCst);
                let path = path.clone();
                thread::spawn(move || handle(stream, &path, &body, n, opts));
            }
        });
    }
    TestServer {
        base: format!("http://127.0.0.1:{}/", port),
        file_name: file_name.to_string(),
        hits,
    }
}

fn handle(
    mut stream: std::net::TcpStream,
    path: &str,
    body: &[u8],
    request_index: usize,
    opts: ServerOptions,
) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let (method, target) = parse_request_line(request);
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        return;
    }
    if target != path {
        let _ = stream.write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        return;
    }
    if request_index < opts.fail_first {
        let _ = stream.write_all(
            b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        return;
    }
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(header.as_bytes());
    let sent = match opts.truncate_to {
        Some(n) => &body[..n.min(body.len())],
        None => body,
    };
    let _ = stream.write_all(sent);
    let _ = stream.flush();
}

fn parse_request_line(request: &str) -> (&str, &str) {
    let mut parts = request.lines().next().unwrap_or("").split_whitespace();
    let method = parts.next().unwrap_or("");
    let target = parts.next().unwrap_or("");
    (method, target)
}
