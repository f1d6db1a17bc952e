//! Stream transport
//!
//! The player consumes a transport through [`StreamTransport`]: opening a
//! source yields a [`StreamConnection`] handle, and the transport reports
//! [`StreamEvent`]s through the [`StreamEventSink`] it was given. Dropping or
//! closing the handle ends the connection.

pub mod icy;
pub mod shoutcast;

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::constants::AAC_MIME_TYPE;
use crate::error::StreamError;

pub use icy::{IcyDemuxer, IcyHeaders};
pub use shoutcast::ShoutcastTransport;

/// Remote endpoint and declared content type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSource {
    url: String,
    mime_type: String,
}

impl StreamSource {
    pub fn new(url: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Source announcing `audio/aac`
    pub fn aac(url: impl Into<String>) -> Self {
        Self::new(url, AAC_MIME_TYPE)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }
}

impl fmt::Display for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.url, self.mime_type)
    }
}

/// Identifies one play session; events from older sessions are stale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Notifications emitted by a transport, in delivery order
#[derive(Debug)]
pub enum StreamEvent {
    /// Response headers accepted, audio follows
    Connected(IcyHeaders),
    /// Connection ended; `reason` is set when it failed
    Disconnected { reason: Option<StreamError> },
    /// Raw audio bytes with ICY metadata removed
    Data(Bytes),
    TitleChanged(String),
}

/// Where a transport delivers its events
#[derive(Clone)]
pub struct StreamEventSink {
    deliver: Arc<dyn Fn(StreamEvent) -> bool + Send + Sync>,
}

impl StreamEventSink {
    /// `deliver` returns false once the receiving side is gone
    pub fn new(deliver: impl Fn(StreamEvent) -> bool + Send + Sync + 'static) -> Self {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    /// Sink feeding an unbounded channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(move |event| tx.send(event).is_ok()), rx)
    }

    /// Deliver an event; false if nobody is listening any more
    pub fn send(&self, event: StreamEvent) -> bool {
        (self.deliver)(event)
    }
}

impl fmt::Debug for StreamEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamEventSink").finish_non_exhaustive()
    }
}

/// Live connection handle owned by a play session
pub trait StreamConnection: Send {
    /// Stop delivering events and release the connection
    fn close(&mut self);
}

/// Opens connections to stream sources
pub trait StreamTransport: Send {
    fn open(
        &mut self,
        source: &StreamSource,
        sink: StreamEventSink,
    ) -> Result<Box<dyn StreamConnection>, StreamError>;
}
