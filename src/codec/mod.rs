//! ADTS/AAC codec
//!
//! Frames the incoming byte stream into ADTS frames, decodes each AAC
//! payload and converts the PCM to the audio engine's output format.

pub mod adts;
pub mod decoder;
pub mod parser;
pub mod resample;

#[cfg(test)]
pub(crate) mod testing;

pub use adts::AdtsHeader;
pub use decoder::{AacDecoder, DecodedFrame, DecoderFactory, FrameDecoder};
pub use parser::{AdtsParser, ParserEvent, ParserStats};
pub use resample::FormatConverter;
