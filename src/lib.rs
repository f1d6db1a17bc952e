//! # Soundtrack
//!
//! Low-latency player for SHOUTcast internet radio streams carrying AAC
//! audio in ADTS framing.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                     SHOUTcast server (audio/aac)                     │
//! └───────────────────────────────────┬──────────────────────────────────┘
//!                                     │ HTTP/1.0 + Icy-MetaData: 1
//!                                     ▼
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │          ShoutcastTransport (stream::shoutcast) - tokio task         │
//! │   ICY header parse ─► metadata strip (stream::icy) ─► StreamEvent    │
//! └───────────────────────────────────┬──────────────────────────────────┘
//!                                     │ PlayerMessage { session, event }
//!                                     ▼
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │              StreamPlayer actor (player) - single task               │
//! │  ┌────────────────────────────────────────────────────────────────┐  │
//! │  │ Session { transport, AdtsParser, phase }                       │  │
//! │  │                                                                │  │
//! │  │  bytes ─► ADTS framing ─► AAC decode ─► remap/resample ─► PCM  │  │
//! │  │           (codec::adts)   (symphonia)   (rubato)               │  │
//! │  └────────────────────────────────────────────────────────────────┘  │
//! │        │ start / stop / title                    │ schedule_buffer   │
//! └────────┼─────────────────────────────────────────┼───────────────────┘
//!          ▼                                         ▼
//! ┌──────────────────┐             ┌─────────────────────────────────────┐
//! │  PlayerDelegate  │             │   CpalEngine (audio::output)        │
//! │   (UI / CLI)     │             │   SegQueue ─► render thread ─► HW   │
//! └──────────────────┘             └─────────────────────────────────────┘
//! ```

pub mod audio;
pub mod codec;
pub mod config;
pub mod error;
pub mod player;
pub mod stream;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// MIME type announced by AAC SHOUTcast servers
    pub const AAC_MIME_TYPE: &str = "audio/aac";

    /// ADTS fixed + variable header length without CRC
    pub const ADTS_HEADER_LEN: usize = 7;

    /// Length of the optional ADTS CRC word
    pub const ADTS_CRC_LEN: usize = 2;

    /// Maximum bytes discarded while looking for the first sync marker
    pub const MAX_SYNC_SEARCH: usize = 8192;

    /// PCM frames produced by one AAC-LC raw data block
    pub const AAC_FRAME_SAMPLES: usize = 1024;

    /// Read size for the network transport
    pub const READ_CHUNK_SIZE: usize = 4096;

    /// Upper bound on the ICY response header block
    pub const MAX_RESPONSE_HEADER_LEN: usize = 16 * 1024;

    /// Default HTTP port for stream URLs without an explicit port
    pub const DEFAULT_HTTP_PORT: u16 = 80;

    /// User agent sent to stream servers
    pub const DEFAULT_USER_AGENT: &str = concat!("Soundtrack/", env!("CARGO_PKG_VERSION"));
}
