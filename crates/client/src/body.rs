//! Outgoing request bodies.
//!
//! A [`BodySource`] may have to be transmitted more than once (redirects answered with
//! 307/308, caller driven retries). Each attempt calls [`BodySource::prepare`], which
//! yields a fresh [`RequestBody`] or fails with [`ClientError::BodyNotRestartable`].
//!
//! Bodies can also be written instead of read: [`BodySource::writer`] runs a callback per
//! attempt that writes into one end of an in-memory pipe while the connection reads the
//! other.

use std::fmt;
use std::io;
use std::io::SeekFrom;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use http::HeaderMap;
use http_body::{Body, Frame, SizeHint};
use tokio::io::{AsyncRead, AsyncSeek, AsyncSeekExt, DuplexStream};
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tracing::trace;

use crate::ClientError;

/// Readers a [`BodySource::seekable`] source can be built from.
pub trait ReadSeek: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T> ReadSeek for T where T: AsyncRead + AsyncSeek + Send + Unpin {}

type BoxReader = Box<dyn AsyncRead + Send + Unpin>;

type Factory = Box<dyn FnMut() -> io::Result<BoxReader> + Send>;

type WriteFn = Box<dyn FnMut(DuplexStream) -> BoxFuture<'static, io::Result<()>> + Send>;

/// Capacity of the pipe between a body writer and the connection.
const WRITER_BUFFER_SIZE: usize = 64 * 1024;

/// Where the bytes of a request body come from.
pub struct BodySource {
    kind: Kind,
    attempts: usize,
}

enum Kind {
    /// in memory, always restartable
    Bytes(Bytes),
    /// one-shot reader, taken by the first attempt
    Reader(Option<BoxReader>),
    /// rewound to `start` before every attempt after the first
    Seekable { reader: Box<dyn ReadSeek>, start: Option<u64> },
    /// called once per attempt
    Factory(Factory),
    /// called once per attempt with the write end of a fresh pipe
    Writer(WriteFn),
}

impl BodySource {
    pub fn bytes<B: Into<Bytes>>(bytes: B) -> Self {
        Self::from_kind(Kind::Bytes(bytes.into()))
    }

    /// A reader that can be sent only once; it is dropped after its transmission.
    pub fn reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self::from_kind(Kind::Reader(Some(Box::new(reader))))
    }

    /// A reader whose current position is recorded before the first attempt and restored
    /// before every later one.
    pub fn seekable<R>(reader: R) -> Self
    where
        R: ReadSeek + 'static,
    {
        Self::from_kind(Kind::Seekable { reader: Box::new(reader), start: None })
    }

    /// A factory producing the body afresh for every attempt.
    ///
    /// Every reader it returns must yield the same bytes.
    pub fn restartable<F, R>(mut factory: F) -> Self
    where
        F: FnMut() -> io::Result<R> + Send + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self::from_kind(Kind::Factory(Box::new(move || factory().map(|reader| Box::new(reader) as BoxReader))))
    }

    /// A callback writing the body, called once per attempt that sends it: zero times when
    /// nothing is sent, more than once across redirects.
    ///
    /// The body ends when the returned future completes and has dropped the writer; an
    /// error it returns fails the transmission. Every call must write the same bytes.
    ///
    /// ```
    /// use micro_fetch::BodySource;
    /// use tokio::io::AsyncWriteExt;
    ///
    /// let source = BodySource::writer(|mut writer| async move {
    ///     writer.write_all(b"line 1\n").await?;
    ///     writer.write_all(b"line 2\n").await
    /// });
    /// assert!(source.is_restartable());
    /// ```
    pub fn writer<F, Fut>(mut write: F) -> Self
    where
        F: FnMut(DuplexStream) -> Fut + Send + 'static,
        Fut: Future<Output = io::Result<()>> + Send + 'static,
    {
        Self::from_kind(Kind::Writer(Box::new(move |writer| write(writer).boxed())))
    }

    fn from_kind(kind: Kind) -> Self {
        Self { kind, attempts: 0 }
    }

    /// Whether a later attempt can reproduce the body.
    #[must_use]
    pub fn is_restartable(&self) -> bool {
        !matches!(self.kind, Kind::Reader(_))
    }

    /// Number of times the body has been prepared for transmission.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// Produces the body of the next transmission attempt, followed by `trailers`.
    ///
    /// # Errors
    ///
    /// [`ClientError::BodyNotRestartable`] when a one-shot reader is asked for a second
    /// time; I/O errors from seeking or from the factory.
    pub async fn prepare(&mut self, trailers: Option<HeaderMap>) -> Result<RequestBody<'_>, ClientError> {
        self.attempts += 1;
        let attempt = self.attempts;

        let kind = match &mut self.kind {
            Kind::Bytes(bytes) => BodyKind::Once(Some(bytes.clone())),
            Kind::Reader(reader) => match reader.take() {
                Some(reader) => BodyKind::Stream(ReaderStream::new(reader)),
                None => return Err(ClientError::BodyNotRestartable),
            },
            Kind::Seekable { reader, start } => {
                if let Some(start) = *start {
                    reader.seek(SeekFrom::Start(start)).await?;
                } else {
                    *start = Some(reader.stream_position().await?);
                }
                BodyKind::Stream(ReaderStream::new(Box::new(reader)))
            }
            Kind::Factory(factory) => BodyKind::Stream(ReaderStream::new(factory()?)),
            Kind::Writer(write) => BodyKind::Written(Written { write: Some(write), stream: None, task: None }),
        };

        trace!(attempt, "prepared request body");
        Ok(RequestBody { kind, trailers: trailers.filter(|trailers| !trailers.is_empty()) })
    }
}

impl fmt::Debug for BodySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            Kind::Bytes(bytes) => format!("Bytes({})", bytes.len()),
            Kind::Reader(_) => "Reader".to_string(),
            Kind::Seekable { start, .. } => format!("Seekable({start:?})"),
            Kind::Factory(_) => "Factory".to_string(),
            Kind::Writer(_) => "Writer".to_string(),
        };
        f.debug_struct("BodySource").field("kind", &kind).field("attempts", &self.attempts).finish()
    }
}

impl From<Bytes> for BodySource {
    fn from(bytes: Bytes) -> Self {
        Self::bytes(bytes)
    }
}

impl From<Vec<u8>> for BodySource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::bytes(bytes)
    }
}

impl From<String> for BodySource {
    fn from(str: String) -> Self {
        Self::bytes(str)
    }
}

impl From<&'static str> for BodySource {
    fn from(str: &'static str) -> Self {
        Self::bytes(str)
    }
}

impl From<&'static [u8]> for BodySource {
    fn from(bytes: &'static [u8]) -> Self {
        Self::bytes(bytes)
    }
}

/// One transmission attempt of a request body.
///
/// In-memory bodies report their exact size and are sent with `content-length`; streamed
/// bodies, and any body followed by trailers, are sent chunked.
pub struct RequestBody<'a> {
    kind: BodyKind<'a>,
    trailers: Option<HeaderMap>,
}

enum BodyKind<'a> {
    Once(Option<Bytes>),
    Stream(ReaderStream<Box<dyn AsyncRead + Send + Unpin + 'a>>),
    Written(Written<'a>),
}

/// A writer body: the callback starts on the first poll, so an attempt that never gets
/// to send its body never calls it.
struct Written<'a> {
    write: Option<&'a mut WriteFn>,
    stream: Option<ReaderStream<DuplexStream>>,
    task: Option<WriterTask>,
}

impl Written<'_> {
    fn poll_data(&mut self, cx: &mut Context<'_>) -> Poll<Option<io::Result<Bytes>>> {
        if let Some(write) = self.write.take() {
            let (reader, writer) = tokio::io::duplex(WRITER_BUFFER_SIZE);
            self.task = Some(WriterTask(tokio::spawn(write(writer))));
            self.stream = Some(ReaderStream::new(reader));
        }

        if let Some(stream) = self.stream.as_mut() {
            match ready!(stream.poll_next_unpin(cx)) {
                Some(item) => return Poll::Ready(Some(item)),
                None => self.stream = None,
            }
        }

        // the pipe is closed, the writer's own outcome decides how the body ends
        if let Some(task) = self.task.as_mut() {
            let result = ready!(task.poll_finish(cx));
            self.task = None;
            if let Err(e) = result {
                return Poll::Ready(Some(Err(e)));
            }
        }
        Poll::Ready(None)
    }
}

/// A running body writer, aborted when the attempt is dropped before it finishes.
struct WriterTask(JoinHandle<io::Result<()>>);

impl WriterTask {
    fn poll_finish(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match ready!(self.0.poll_unpin(cx)) {
            Ok(result) => Poll::Ready(result),
            Err(e) => Poll::Ready(Err(io::Error::other(e))),
        }
    }
}

impl Drop for WriterTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl RequestBody<'_> {
    /// A body with no data, optionally followed by trailers.
    #[must_use]
    pub fn empty(trailers: Option<HeaderMap>) -> Self {
        Self { kind: BodyKind::Once(None), trailers: trailers.filter(|trailers| !trailers.is_empty()) }
    }
}

impl Body for RequestBody<'_> {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        match &mut this.kind {
            BodyKind::Once(bytes) => {
                if let Some(bytes) = bytes.take().filter(|bytes| !bytes.is_empty()) {
                    return Poll::Ready(Some(Ok(Frame::data(bytes))));
                }
            }
            BodyKind::Stream(stream) => match ready!(stream.poll_next_unpin(cx)) {
                Some(Ok(bytes)) => return Poll::Ready(Some(Ok(Frame::data(bytes)))),
                Some(Err(e)) => return Poll::Ready(Some(Err(e))),
                None => {}
            },
            BodyKind::Written(written) => match ready!(written.poll_data(cx)) {
                Some(Ok(bytes)) => return Poll::Ready(Some(Ok(Frame::data(bytes)))),
                Some(Err(e)) => return Poll::Ready(Some(Err(e))),
                None => {}
            },
        }

        Poll::Ready(this.trailers.take().map(|trailers| Ok(Frame::trailers(trailers))))
    }

    fn is_end_stream(&self) -> bool {
        matches!(self.kind, BodyKind::Once(None)) && self.trailers.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        if self.trailers.is_some() {
            return SizeHint::default();
        }
        match &self.kind {
            BodyKind::Once(Some(bytes)) => SizeHint::with_exact(bytes.len() as u64),
            BodyKind::Once(None) => SizeHint::with_exact(0),
            BodyKind::Stream(_) | BodyKind::Written(_) => SizeHint::default(),
        }
    }
}

impl fmt::Debug for RequestBody<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBody").field("size_hint", &self.size_hint()).field("trailers", &self.trailers).finish()
    }
}
