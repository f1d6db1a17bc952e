//! SHOUTcast client transport
//!
//! Each opened source gets its own tokio task: connect over TCP, send an
//! HTTP/1.0 request asking for ICY metadata, validate the response head, then
//! read until EOF, forwarding audio and title changes to the sink. The task
//! always finishes with exactly one `Disconnected` event unless it was
//! closed by its owner first. Nothing is retried.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use url::{Host, Url};

use crate::constants::{
    DEFAULT_HTTP_PORT, DEFAULT_USER_AGENT, MAX_RESPONSE_HEADER_LEN, READ_CHUNK_SIZE,
};
use crate::error::StreamError;
use crate::stream::icy::{IcyChunk, IcyDemuxer, IcyHeaders};
use crate::stream::{StreamConnection, StreamEvent, StreamEventSink, StreamSource, StreamTransport};

/// Target of an ICY request, taken from an `http://` URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpUrl {
    /// Host name or address, IPv6 without brackets
    pub host: String,
    pub port: u16,
    /// Path plus query; the fragment never goes on the wire
    pub path: String,
}

impl HttpUrl {
    pub fn parse(url: &str) -> Result<Self, StreamError> {
        let parsed = Url::parse(url).map_err(|e| StreamError::InvalidUrl(format!("{}: {}", url, e)))?;
        if parsed.scheme() != "http" {
            return Err(StreamError::UnsupportedScheme(parsed.scheme().to_string()));
        }

        let host = match parsed.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            _ => return Err(StreamError::InvalidUrl(url.to_string())),
        };
        let port = parsed.port_or_known_default().unwrap_or(DEFAULT_HTTP_PORT);

        let mut path = parsed.path().to_string();
        if let Some(query) = parsed.query() {
            path.push('?');
            path.push_str(query);
        }

        Ok(Self { host, port, path })
    }

    /// Value for the `Host` header
    pub fn host_header(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        if self.port == DEFAULT_HTTP_PORT {
            host
        } else {
            format!("{}:{}", host, self.port)
        }
    }
}

/// Transport connecting to SHOUTcast/Icecast servers over plain HTTP
pub struct ShoutcastTransport {
    runtime: Handle,
    user_agent: String,
}

impl ShoutcastTransport {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    /// Use the runtime of the calling context
    pub fn from_current() -> Result<Self, StreamError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| StreamError::NoRuntime)
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

impl StreamTransport for ShoutcastTransport {
    fn open(
        &mut self,
        source: &StreamSource,
        sink: StreamEventSink,
    ) -> Result<Box<dyn StreamConnection>, StreamError> {
        let url = HttpUrl::parse(source.url())?;
        tracing::info!("Connecting to {}", source);

        let task = self.runtime.spawn(run_connection(
            url,
            source.mime_type().to_string(),
            self.user_agent.clone(),
            sink,
        ));

        Ok(Box::new(ShoutcastConnection { task: Some(task) }))
    }
}

/// Handle to a running connection task
pub struct ShoutcastConnection {
    task: Option<JoinHandle<()>>,
}

impl StreamConnection for ShoutcastConnection {
    fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ShoutcastConnection {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_connection(url: HttpUrl, mime_type: String, user_agent: String, sink: StreamEventSink) {
    let reason = match stream_audio(&url, &mime_type, &user_agent, &sink).await {
        Ok(()) => {
            tracing::info!("Stream {}{} ended", url.host_header(), url.path);
            None
        }
        Err(e) => {
            tracing::warn!("Stream {}{} failed: {}", url.host_header(), url.path, e);
            Some(e)
        }
    };
    sink.send(StreamEvent::Disconnected { reason });
}

async fn stream_audio(
    url: &HttpUrl,
    mime_type: &str,
    user_agent: &str,
    sink: &StreamEventSink,
) -> Result<(), StreamError> {
    let mut socket = TcpStream::connect((url.host.as_str(), url.port))
        .await
        .map_err(|e| StreamError::ConnectionFailed(format!("{}: {}", url.host_header(), e)))?;
    let _ = socket.set_nodelay(true);

    let request = format!(
        "GET {} HTTP/1.0\r\n\
         Host: {}\r\n\
         User-Agent: {}\r\n\
         Accept: */*\r\n\
         Icy-MetaData: 1\r\n\
         Connection: close\r\n\
         \r\n",
        url.path,
        url.host_header(),
        user_agent
    );
    socket
        .write_all(request.as_bytes())
        .await
        .map_err(|e| StreamError::ConnectionFailed(e.to_string()))?;

    let mut reader = BufReader::new(socket);
    let headers = read_response_head(&mut reader).await?;

    if let Some(content_type) = headers.content_type.as_deref() {
        if !content_type.eq_ignore_ascii_case(mime_type) {
            tracing::warn!("Server announced {}, expected {}", content_type, mime_type);
        }
    }
    tracing::info!(
        "Connected: {} ({} kbps, metaint {})",
        headers.station_name.as_deref().unwrap_or("unnamed station"),
        headers.bitrate.unwrap_or_default(),
        headers.metaint
    );

    let mut demuxer = IcyDemuxer::new(headers.metaint);
    if !sink.send(StreamEvent::Connected(headers)) {
        return Ok(());
    }

    let mut chunk = vec![0u8; READ_CHUNK_SIZE];
    loop {
        let n = reader
            .read(&mut chunk)
            .await
            .map_err(|e| StreamError::ReceiveFailed(e.to_string()))?;
        if n == 0 {
            return Ok(());
        }

        for item in demuxer.push(&chunk[..n]) {
            let event = match item {
                IcyChunk::Audio(bytes) => StreamEvent::Data(bytes),
                IcyChunk::Title(title) => StreamEvent::TitleChanged(title),
            };
            if !sink.send(event) {
                return Ok(());
            }
        }
    }
}

async fn read_response_head<R>(reader: &mut R) -> Result<IcyHeaders, StreamError>
where
    R: AsyncBufRead + Unpin,
{
    let mut head = Vec::new();
    let mut limited = reader.take(MAX_RESPONSE_HEADER_LEN as u64);
    loop {
        let start = head.len();
        let n = limited
            .read_until(b'\n', &mut head)
            .await
            .map_err(|e| StreamError::BadResponse(e.to_string()))?;
        if n == 0 {
            let reason = if head.len() >= MAX_RESPONSE_HEADER_LEN {
                "response header too large"
            } else {
                "connection closed during headers"
            };
            return Err(StreamError::BadResponse(reason.to_string()));
        }
        if matches!(&head[start..], b"\n" | b"\r\n") {
            break;
        }
    }
    IcyHeaders::parse_response(&decode_header_text(head))
}

/// Header text is usually ASCII; stations still send Latin-1 names
fn decode_header_text(head: Vec<u8>) -> String {
    String::from_utf8(head)
        .unwrap_or_else(|e| e.into_bytes().into_iter().map(char::from).collect())
}
