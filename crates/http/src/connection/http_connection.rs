use std::error::Error;
use std::fmt;
use std::future::poll_fn;
use std::io;
use std::io::ErrorKind;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures::task::noop_waker_ref;
use futures::{SinkExt, StreamExt};
use http::Method;
use http_body::Body;
use http_body_util::BodyExt;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf, ReadHalf, WriteHalf};
use tokio::select;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, trace};

use crate::codec::{RequestEncoder, ResponseDecoder};
use crate::connection::Connection;
use crate::protocol::{HttpError, Message, ParseError, PayloadItem, PayloadSize, Protocol, RequestHead, ResponseHead, SendError};

/// Byte streams an [`HttpConnection`] can run on.
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Io for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

type BoxIo = Box<dyn Io>;

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// One HTTP/1.1 client connection: a transport byte stream plus its [`Connection`] handle.
///
/// Requests are strictly sequential. For each exchange the caller:
/// 1. writes the request with [`send_request`](Self::send_request)
/// 2. reads the head with [`read_response_head`](Self::read_response_head)
/// 3. pulls body items with [`poll_payload`](Self::poll_payload) until `Eof`, or gives up
///    and calls [`skip_body`](Self::skip_body)
///
/// Every read and write fails promptly with `ConnectionAborted` once the handle is closed.
pub struct HttpConnection {
    connection: Connection,
    framed_read: FramedRead<ReadHalf<BoxIo>, ResponseDecoder>,
    framed_write: FramedWrite<WriteHalf<BoxIo>, RequestEncoder>,
    state: State,
}

#[derive(Debug, Clone, Copy)]
struct State {
    /// both sides allow another exchange after this one
    keep_alive: bool,
    /// no exchange in progress: the last response body has been read to its end
    body_done: bool,
    /// an I/O or protocol error happened, the stream position is unknown
    broken: bool,
}

impl HttpConnection {
    pub fn new<T: Io>(io: T, protocol: Protocol) -> Self {
        let boxed: BoxIo = Box::new(io);
        let (reader, writer) = tokio::io::split(boxed);
        Self {
            connection: Connection::new(protocol),
            framed_read: FramedRead::with_capacity(reader, ResponseDecoder::new(), READ_BUFFER_SIZE),
            framed_write: FramedWrite::new(writer, RequestEncoder::new()),
            state: State { keep_alive: true, body_done: true, broken: false },
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Writes a request head and streams `body` after it.
    ///
    /// An exact size hint is sent as `content-length` (`0` only for methods that usually
    /// carry a body), anything else is sent chunked. Trailer frames become chunked trailers.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors, on body source errors and when the connection gets closed.
    pub async fn send_request<B>(&mut self, head: RequestHead, body: B) -> Result<(), SendError>
    where
        B: Body<Data = Bytes> + Unpin,
        B::Error: Into<Box<dyn Error + Send + Sync>>,
    {
        if self.connection.is_closed() {
            self.state.broken = true;
            return Err(SendError::io(aborted()));
        }

        // the exchange stays open until the response body reaches its end
        self.state.body_done = false;
        if has_token(head.headers().get_all(http::header::CONNECTION), "close") {
            self.state.keep_alive = false;
        }

        let connection = self.connection.clone();
        let result = select! {
            biased;
            () = connection.closed() => Err(SendError::io(aborted())),
            result = self.do_send_request(head, body) => result,
        };

        if result.is_err() {
            self.state.broken = true;
        }
        result
    }

    async fn do_send_request<B>(&mut self, head: RequestHead, mut body: B) -> Result<(), SendError>
    where
        B: Body<Data = Bytes> + Unpin,
        B::Error: Into<Box<dyn Error + Send + Sync>>,
    {
        let payload_size = match body.size_hint().exact() {
            Some(0) => PayloadSize::Empty,
            Some(length) => PayloadSize::Length(length),
            None => PayloadSize::Chunked,
        };

        trace!(conn_id = self.connection.id(), method = %head.method(), target = head.target(), ?payload_size, "send request head");

        let header = Message::<_, Bytes>::Header((head, payload_size));
        if payload_size.is_empty() {
            // using send instead of feed, because a bodiless request must reach the peer now
            return self.framed_write.send(header).await;
        }
        self.framed_write.feed(header).await?;

        loop {
            match body.frame().await {
                Some(Ok(frame)) => {
                    let payload_item = match frame.into_data() {
                        Ok(data) => PayloadItem::Chunk(data),
                        Err(frame) => match frame.into_trailers() {
                            Ok(trailers) => PayloadItem::Trailers(trailers),
                            Err(_) => continue,
                        },
                    };
                    self.framed_write.feed(Message::Payload(payload_item)).await?;
                }
                Some(Err(e)) => return Err(SendError::body(e)),
                None => {
                    return self.framed_write.send(Message::Payload(PayloadItem::<Bytes>::Eof)).await;
                }
            }
        }
    }

    /// Writes a request, then reads the head of its response.
    ///
    /// # Errors
    ///
    /// See [`send_request`](Self::send_request) and
    /// [`read_response_head`](Self::read_response_head).
    pub async fn round_trip<B>(&mut self, head: RequestHead, body: B) -> Result<(ResponseHead, PayloadSize), HttpError>
    where
        B: Body<Data = Bytes> + Unpin,
        B::Error: Into<Box<dyn Error + Send + Sync>>,
    {
        let method = head.method().clone();
        self.send_request(head, body).await?;
        Ok(self.read_response_head(&method).await?)
    }

    /// Reads the head of the response to a request made with `method`.
    ///
    /// Interim 1xx responses (other than 101) are skipped.
    ///
    /// # Errors
    ///
    /// Fails on I/O and parse errors, when the peer closes before a complete head
    /// ([`ParseError::Incomplete`]), and when the connection gets closed.
    pub async fn read_response_head(&mut self, method: &Method) -> Result<(ResponseHead, PayloadSize), ParseError> {
        self.framed_read.decoder_mut().expect_response_to(method.clone());

        let connection = self.connection.clone();
        let next = select! {
            biased;
            () = connection.closed() => Some(Err(ParseError::io(aborted()))),
            next = self.framed_read.next() => next,
        };

        let result = match next {
            Some(Ok(Message::Header((head, payload_size)))) => {
                let reusable_framing = !payload_size.is_until_close() && head.status().code() != 101;
                self.state.keep_alive &= head.keep_alive() && reusable_framing;
                trace!(conn_id = self.connection.id(), status = %head.status(), keep_alive = self.state.keep_alive, "read response head");
                Ok((head, payload_size))
            }
            Some(Ok(Message::Payload(_))) => Err(ParseError::invalid_body("expect response head but receive payload")),
            Some(Err(e)) => Err(e),
            None => Err(ParseError::Incomplete),
        };

        if result.is_err() {
            self.state.broken = true;
        }
        result
    }

    /// Polls the next item of the current response body.
    ///
    /// Yields chunks, at most one trailer section, then `Eof`; `None` after that.
    /// Does not register for close notifications; callers that need a prompt wake-up on
    /// [`Connection::close`] poll [`Connection::closed_owned`] alongside.
    pub fn poll_payload(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<PayloadItem, ParseError>>> {
        if self.state.body_done {
            return Poll::Ready(None);
        }

        if self.connection.is_closed() {
            self.state.broken = true;
            return Poll::Ready(Some(Err(ParseError::io(aborted()))));
        }

        let item = match ready!(self.framed_read.poll_next_unpin(cx)) {
            Some(Ok(Message::Payload(item))) => {
                if item.is_eof() {
                    self.state.body_done = true;
                }
                Ok(item)
            }
            Some(Ok(Message::Header(_))) => Err(ParseError::invalid_body("receive response head while reading body")),
            Some(Err(e)) => Err(e),
            None => Err(ParseError::Incomplete),
        };

        if item.is_err() {
            self.state.broken = true;
        }
        Poll::Ready(Some(item))
    }

    /// Async variant of [`poll_payload`](Self::poll_payload) that also wakes up on close.
    pub async fn next_payload(&mut self) -> Option<Result<PayloadItem, ParseError>> {
        let connection = self.connection.clone();
        select! {
            biased;
            () = connection.closed() => {
                self.state.broken = true;
                Some(Err(ParseError::io(aborted())))
            }
            item = poll_fn(|cx| self.poll_payload(cx)) => item,
        }
    }

    /// Reads and discards the rest of the current body, giving up after `max_bytes`.
    ///
    /// Returns true when the body was read to its end. Connections that can't be reused
    /// anyway are not drained at all.
    pub async fn skip_body(&mut self, max_bytes: u64) -> bool {
        if self.state.body_done {
            return true;
        }
        if !self.state.keep_alive || self.state.broken {
            return false;
        }

        let mut skipped = 0u64;
        loop {
            match self.next_payload().await {
                None | Some(Ok(PayloadItem::Eof)) => {
                    trace!(conn_id = self.connection.id(), skipped, "skipped response body");
                    return true;
                }
                Some(Ok(PayloadItem::Chunk(bytes))) => {
                    skipped += bytes.len() as u64;
                    if skipped > max_bytes {
                        debug!(conn_id = self.connection.id(), max_bytes, "response body too large to skip");
                        self.state.broken = true;
                        return false;
                    }
                }
                Some(Ok(PayloadItem::Trailers(_))) => {}
                Some(Err(e)) => {
                    debug!(conn_id = self.connection.id(), cause = %e, "skip response body error");
                    return false;
                }
            }
        }
    }

    /// Whether the current response body has been read to its end.
    pub fn is_body_done(&self) -> bool {
        self.state.body_done
    }

    /// Checks, without waiting, that an idle connection is still open.
    ///
    /// Between exchanges the peer has nothing to say: end of stream, unsolicited bytes
    /// and read errors all mean the connection is gone, and it is marked broken. Only
    /// meaningful while [`is_reusable`](Self::is_reusable) holds.
    pub fn check_idle(&mut self) -> bool {
        if !self.is_reusable() {
            return false;
        }

        let mut cx = Context::from_waker(noop_waker_ref());
        let mut buf = [0u8; 1];
        let mut read_buf = ReadBuf::new(&mut buf);
        let alive = match Pin::new(self.framed_read.get_mut()).poll_read(&mut cx, &mut read_buf) {
            Poll::Pending => true,
            Poll::Ready(Ok(())) => {
                trace!(conn_id = self.connection.id(), eof = read_buf.filled().is_empty(), "idle connection got readable");
                false
            }
            Poll::Ready(Err(e)) => {
                trace!(conn_id = self.connection.id(), cause = %e, "idle connection read error");
                false
            }
        };

        if !alive {
            self.state.broken = true;
        }
        alive
    }

    /// Whether another request may be sent on this connection.
    pub fn is_reusable(&self) -> bool {
        !self.connection.is_closed()
            && !self.state.broken
            && self.state.keep_alive
            && self.state.body_done
            && self.framed_write.encoder().is_idle()
            && self.framed_read.decoder().is_idle()
            && self.framed_read.read_buffer().is_empty()
    }
}

impl fmt::Debug for HttpConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpConnection").field("connection", &self.connection).field("state", &self.state).finish_non_exhaustive()
    }
}

fn aborted() -> io::Error {
    io::Error::new(ErrorKind::ConnectionAborted, "connection closed")
}

fn has_token(values: http::header::GetAll<'_, http::HeaderValue>, token: &str) -> bool {
    values
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|item| item.trim().eq_ignore_ascii_case(token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Request;
    use http_body_util::{Empty, Full};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    fn pair() -> (HttpConnection, DuplexStream) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        (HttpConnection::new(client, Protocol::http11()), server)
    }

    fn head(request: Request<()>) -> RequestHead {
        RequestHead::from(request)
    }

    async fn read_request(server: &mut DuplexStream) -> String {
        let mut buf = vec![0u8; 64 * 1024];
        let n = server.read(&mut buf).await.unwrap();
        String::from_utf8(buf[..n].to_vec()).unwrap()
    }

    async fn read_body(conn: &mut HttpConnection) -> Vec<u8> {
        let mut body = Vec::new();
        while let Some(item) = conn.next_payload().await {
            match item.unwrap() {
                PayloadItem::Chunk(bytes) => body.extend_from_slice(&bytes),
                PayloadItem::Trailers(_) => {}
                PayloadItem::Eof => break,
            }
        }
        body
    }

    #[tokio::test]
    async fn get_exchange_keeps_connection_reusable() {
        let (mut conn, mut server) = pair();

        let request = Request::get("http://example.com/index.html").header("host", "example.com").body(()).unwrap();
        conn.send_request(head(request), Empty::<Bytes>::new()).await.unwrap();
        assert_eq!(read_request(&mut server).await, "GET /index.html HTTP/1.1\r\nhost: example.com\r\n\r\n");

        server.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello").await.unwrap();
        let (head, payload_size) = conn.read_response_head(&Method::GET).await.unwrap();
        assert_eq!(head.status().code(), 200);
        assert_eq!(payload_size, PayloadSize::Length(5));
        assert!(!conn.is_reusable());
        assert!(!conn.is_body_done());

        assert_eq!(read_body(&mut conn).await, b"hello");
        assert!(conn.is_body_done());
        assert!(conn.is_reusable());
    }

    #[tokio::test]
    async fn post_with_fixed_body() {
        let (mut conn, mut server) = pair();

        let request = Request::post("http://example.com/submit").body(()).unwrap();
        conn.send_request(head(request), Full::new(Bytes::from_static(b"a=1&b=2"))).await.unwrap();
        assert_eq!(read_request(&mut server).await, "POST /submit HTTP/1.1\r\ncontent-length: 7\r\n\r\na=1&b=2");
    }

    #[tokio::test]
    async fn round_trip_with_chunked_trailers() {
        let (mut conn, mut server) = pair();
        server
            .write_all(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n2\r\nok\r\n0\r\nx-digest: 1f\r\n\r\n")
            .await
            .unwrap();

        let request = Request::get("http://example.com/").body(()).unwrap();
        let (head, payload_size) = conn.round_trip(head(request), Empty::<Bytes>::new()).await.unwrap();
        assert_eq!(head.status().code(), 200);
        assert_eq!(payload_size, PayloadSize::Chunked);

        let mut trailers = None;
        while let Some(item) = conn.next_payload().await {
            match item.unwrap() {
                PayloadItem::Trailers(map) => trailers = Some(map),
                PayloadItem::Chunk(bytes) => assert_eq!(bytes, "ok"),
                PayloadItem::Eof => break,
            }
        }
        assert_eq!(trailers.unwrap().get("x-digest").unwrap(), "1f");
        assert!(conn.is_reusable());
        assert!(read_request(&mut server).await.starts_with("GET / HTTP/1.1\r\n"));
    }

    #[tokio::test]
    async fn connection_close_is_not_reusable() {
        let (mut conn, mut server) = pair();

        conn.send_request(head(Request::get("http://example.com/").body(()).unwrap()), Empty::<Bytes>::new()).await.unwrap();
        server.write_all(b"HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n").await.unwrap();

        conn.read_response_head(&Method::GET).await.unwrap();
        assert!(read_body(&mut conn).await.is_empty());
        assert!(!conn.is_reusable());
    }

    #[tokio::test]
    async fn close_aborts_pending_read() {
        let (mut conn, _server) = pair();
        conn.send_request(head(Request::get("http://example.com/").body(()).unwrap()), Empty::<Bytes>::new()).await.unwrap();
        // waiting for a response is not an idle state
        assert!(!conn.is_reusable());

        let handle = conn.connection().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.close();
        });

        let err = conn.read_response_head(&Method::GET).await.unwrap_err();
        assert!(matches!(err, ParseError::Io { ref source } if source.kind() == ErrorKind::ConnectionAborted));
        assert!(conn.connection().is_closed());
        assert!(!conn.is_reusable());
    }

    #[tokio::test]
    async fn skip_body_is_bounded() {
        let (mut conn, mut server) = pair();
        let body = "x".repeat(100);

        conn.send_request(head(Request::get("http://example.com/").body(()).unwrap()), Empty::<Bytes>::new()).await.unwrap();
        server.write_all(format!("HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n{body}").as_bytes()).await.unwrap();
        conn.read_response_head(&Method::GET).await.unwrap();
        assert!(conn.skip_body(1000).await);
        assert!(conn.is_reusable());

        conn.send_request(head(Request::get("http://example.com/").body(()).unwrap()), Empty::<Bytes>::new()).await.unwrap();
        server.write_all(format!("HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n{body}").as_bytes()).await.unwrap();
        conn.read_response_head(&Method::GET).await.unwrap();
        assert!(!conn.skip_body(10).await);
        assert!(!conn.is_reusable());
    }

    #[tokio::test]
    async fn idle_check_detects_peer_hang_up() {
        let (mut conn, mut server) = pair();

        conn.send_request(head(Request::get("http://example.com/").body(()).unwrap()), Empty::<Bytes>::new()).await.unwrap();
        server.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok").await.unwrap();
        conn.read_response_head(&Method::GET).await.unwrap();
        assert_eq!(read_body(&mut conn).await, b"ok");
        assert!(conn.check_idle());
        assert!(conn.is_reusable());

        drop(server);
        assert!(!conn.check_idle());
        assert!(!conn.is_reusable());
    }

    #[tokio::test]
    async fn idle_check_rejects_unsolicited_bytes() {
        let (mut conn, mut server) = pair();
        assert!(conn.check_idle());

        server.write_all(b"HTTP/1.1 408 Request Timeout\r\n\r\n").await.unwrap();
        assert!(!conn.check_idle());
        assert!(!conn.is_reusable());
    }

    #[tokio::test]
    async fn truncated_body_is_an_error() {
        let (mut conn, mut server) = pair();

        conn.send_request(head(Request::get("http://example.com/").body(()).unwrap()), Empty::<Bytes>::new()).await.unwrap();
        server.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc").await.unwrap();
        drop(server);

        conn.read_response_head(&Method::GET).await.unwrap();
        assert_eq!(conn.next_payload().await.unwrap().unwrap().as_bytes().unwrap(), "abc");
        assert!(matches!(conn.next_payload().await, Some(Err(ParseError::Incomplete))));
        assert!(!conn.is_reusable());
    }

    #[tokio::test]
    async fn until_close_body_is_never_reusable() {
        let (mut conn, mut server) = pair();

        conn.send_request(head(Request::get("http://example.com/").body(()).unwrap()), Empty::<Bytes>::new()).await.unwrap();
        server.write_all(b"HTTP/1.1 200 OK\r\n\r\nall of it").await.unwrap();
        drop(server);

        let (_, payload_size) = conn.read_response_head(&Method::GET).await.unwrap();
        assert!(payload_size.is_until_close());
        assert_eq!(read_body(&mut conn).await, b"all of it");
        assert!(!conn.is_reusable());
    }
}
