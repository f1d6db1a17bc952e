//! Error types for the stream player

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Player task has stopped")]
    PlayerClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio engine errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Audio output failed: {0}")]
    OutputFailed(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Engine is not prepared")]
    NotPrepared,

    #[error("cpal error: {0}")]
    CpalError(String),
}

/// ADTS framing and AAC decoding errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Bad ADTS sync word: {0:#05x}")]
    BadSyncWord(u16),

    #[error("Invalid ADTS header: {0}")]
    InvalidHeader(String),

    #[error("ADTS CRC mismatch: frame carries {expected:#06x}, computed {computed:#06x}")]
    CrcMismatch { expected: u16, computed: u16 },

    #[error("No ADTS sync marker within {0} bytes")]
    SyncNotFound(usize),

    #[error("Decoder initialization failed: {0}")]
    DecoderInit(String),

    #[error("Decoding failed: {0}")]
    DecodingFailed(String),

    #[error("Resampler error: {0}")]
    Resample(String),

    #[error("Stream format changed mid-session: {0}")]
    FormatChanged(String),
}

/// Stream transport errors
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Invalid stream URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Unexpected response: {0}")]
    BadResponse(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("No async runtime available")]
    NoRuntime,
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
