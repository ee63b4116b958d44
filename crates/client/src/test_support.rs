//! An in-memory server for tests: each connection answers a fixed list of responses, one
//! per request read, then stays silent until the client goes away (or hangs up itself).

use std::collections::VecDeque;
use std::io;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::BytesMut;
use micro_fetch_http::connection::HttpConnection;
use micro_fetch_http::protocol::Protocol;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use crate::pool::{Connector, Origin};

#[derive(Clone)]
pub(crate) struct ScriptedConnector {
    inner: Arc<Inner>,
}

struct Inner {
    scripts: Mutex<VecDeque<Vec<String>>>,
    connects: AtomicUsize,
    requests: Arc<Mutex<Vec<String>>>,
    hang_up: bool,
}

impl ScriptedConnector {
    /// One entry per connection, holding the responses written on it in order.
    pub(crate) fn new(scripts: Vec<Vec<&str>>) -> Self {
        Self::with_hang_up(scripts, false)
    }

    /// Like [`new`](Self::new), but the server closes each connection right after its
    /// last response, the way an idle keep-alive timeout does.
    pub(crate) fn hanging_up(scripts: Vec<Vec<&str>>) -> Self {
        Self::with_hang_up(scripts, true)
    }

    fn with_hang_up(scripts: Vec<Vec<&str>>, hang_up: bool) -> Self {
        let scripts = scripts.into_iter().map(|responses| responses.into_iter().map(str::to_string).collect()).collect();
        Self {
            inner: Arc::new(Inner {
                scripts: Mutex::new(scripts),
                connects: AtomicUsize::new(0),
                requests: Arc::new(Mutex::new(Vec::new())),
                hang_up,
            }),
        }
    }

    pub(crate) fn connects(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    /// Every request received so far, head and body as text.
    pub(crate) fn requests(&self) -> Vec<String> {
        self.inner.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _origin: &Origin) -> io::Result<HttpConnection> {
        let Some(responses) = self.inner.scripts.lock().unwrap().pop_front() else {
            return Err(io::Error::new(ErrorKind::ConnectionRefused, "no scripted connection left"));
        };
        self.inner.connects.fetch_add(1, Ordering::SeqCst);

        let (client, server) = tokio::io::duplex(64 * 1024);
        tokio::spawn(serve(server, responses, Arc::clone(&self.inner.requests), self.inner.hang_up));
        Ok(HttpConnection::new(client, Protocol::http11()))
    }
}

async fn serve(mut io: DuplexStream, responses: Vec<String>, requests: Arc<Mutex<Vec<String>>>, hang_up: bool) {
    let mut buffer = BytesMut::new();
    for response in responses {
        let Some(request) = read_request(&mut io, &mut buffer).await else {
            return;
        };
        requests.lock().unwrap().push(request);
        if io.write_all(response.as_bytes()).await.is_err() {
            return;
        }
    }
    if hang_up {
        return;
    }

    loop {
        buffer.clear();
        match io.read_buf(&mut buffer).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
    }
}

async fn read_request(io: &mut DuplexStream, buffer: &mut BytesMut) -> Option<String> {
    loop {
        if let Some(len) = request_len(buffer) {
            let request = buffer.split_to(len);
            return Some(String::from_utf8_lossy(&request).into_owned());
        }
        if io.read_buf(buffer).await.ok()? == 0 {
            return None;
        }
    }
}

/// Length of the first complete request in `buffer`.
fn request_len(buffer: &[u8]) -> Option<usize> {
    let mut headers = [httparse::EMPTY_HEADER; 64];
    let mut request = httparse::Request::new(&mut headers);
    let httparse::Status::Complete(head_len) = request.parse(buffer).ok()? else {
        return None;
    };

    let header = |name: &str| {
        request.headers.iter().find(|header| header.name.eq_ignore_ascii_case(name)).map(|header| header.value)
    };

    if header("transfer-encoding").is_some() {
        let body = &buffer[head_len..];
        let last_chunk = if body.starts_with(b"0\r\n") { 0 } else { find(body, b"\r\n0\r\n")? + 2 };
        let after = last_chunk + 3;
        let end = if body[after..].starts_with(b"\r\n") { after + 2 } else { after + find(&body[after..], b"\r\n\r\n")? + 4 };
        return Some(head_len + end);
    }

    let length = header("content-length").and_then(|value| std::str::from_utf8(value).ok()?.trim().parse::<usize>().ok());
    let len = head_len + length.unwrap_or(0);
    (buffer.len() >= len).then_some(len)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}
