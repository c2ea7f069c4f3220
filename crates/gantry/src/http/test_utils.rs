//! Test helpers for the HTTP adapter.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use super::{Request, RequestHandler, Response};

/// Handler that counts calls and sleeps before answering `200`.
pub(crate) struct SlowHandler {
    delay: Duration,
    entered: Arc<AtomicUsize>,
}

impl SlowHandler {
    pub(crate) fn new(delay: Duration) -> (Arc<AtomicUsize>, Self) {
        let entered = Arc::new(AtomicUsize::new(0));
        let handler = Self {
            delay,
            entered: Arc::clone(&entered),
        };
        (entered, handler)
    }
}

impl RequestHandler for SlowHandler {
    fn handle(&self, _request: &Request) -> Response {
        self.entered.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        Response::text(200, "ok\n")
    }
}

/// Writes raw bytes and returns the status code and full response text.
pub(crate) fn exchange(addr: SocketAddr, raw: &[u8]) -> io::Result<(u16, String)> {
    let mut stream = TcpStream::connect(addr)?;
    stream.set_read_timeout(Some(Duration::from_secs(10)))?;
    stream.write_all(raw)?;
    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    let status = response
        .split_ascii_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing status line"))?;
    Ok((status, response))
}

pub(crate) fn get(addr: SocketAddr, path: &str) -> io::Result<(u16, String)> {
    exchange(
        addr,
        format!("GET {path} HTTP/1.1\r\nHost: test\r\n\r\n").as_bytes(),
    )
}
