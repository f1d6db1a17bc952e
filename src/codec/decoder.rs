//! AAC frame decoder
//!
//! Wraps symphonia's AAC decoder so it can be fed one raw data block at a
//! time. The decoder is configured from the first frame's header through a
//! synthesized AudioSpecificConfig.

use std::sync::Arc;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions, CODEC_TYPE_AAC};
use symphonia::core::formats::Packet;

use crate::codec::adts::AdtsHeader;
use crate::constants::AAC_FRAME_SAMPLES;
use crate::error::CodecError;

/// One decoded frame in the stream's native format
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    /// Interleaved samples
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedFrame {
    /// Samples per channel
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }
}

/// Decodes one raw data block of an ADTS frame
pub trait FrameDecoder: Send {
    fn decode(&mut self, header: &AdtsHeader, payload: &[u8]) -> Result<DecodedFrame, CodecError>;
}

/// Builds a decoder for the stream described by the first frame header
pub type DecoderFactory =
    Arc<dyn Fn(&AdtsHeader) -> Result<Box<dyn FrameDecoder>, CodecError> + Send + Sync>;

/// Factory producing [`AacDecoder`]s
pub fn default_decoder_factory() -> DecoderFactory {
    Arc::new(|header: &AdtsHeader| {
        let decoder = AacDecoder::new(header)?;
        Ok(Box::new(decoder) as Box<dyn FrameDecoder>)
    })
}

/// symphonia-backed AAC decoder
pub struct AacDecoder {
    decoder: Box<dyn Decoder>,
    sample_buffer: Option<SampleBuffer<f32>>,
    /// Presentation timestamp of the next packet, in samples
    timestamp: u64,
    frames_decoded: u64,
}

impl AacDecoder {
    /// Create a decoder for the stream described by `header`
    pub fn new(header: &AdtsHeader) -> Result<Self, CodecError> {
        let mut params = CodecParameters::new();
        params
            .for_codec(CODEC_TYPE_AAC)
            .with_sample_rate(header.sample_rate())
            .with_extra_data(header.audio_specific_config().to_vec().into_boxed_slice());

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| CodecError::DecoderInit(e.to_string()))?;

        tracing::debug!(
            "AAC decoder ready: object type {}, {} Hz, {} channels",
            header.audio_object_type(),
            header.sample_rate(),
            header.channels()
        );

        Ok(Self {
            decoder,
            sample_buffer: None,
            timestamp: 0,
            frames_decoded: 0,
        })
    }

    /// Number of frames decoded so far
    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }
}

impl FrameDecoder for AacDecoder {
    fn decode(&mut self, _header: &AdtsHeader, payload: &[u8]) -> Result<DecodedFrame, CodecError> {
        let packet = Packet::new_from_slice(0, self.timestamp, AAC_FRAME_SAMPLES as u64, payload);

        let decoded = self
            .decoder
            .decode(&packet)
            .map_err(|e| CodecError::DecodingFailed(e.to_string()))?;

        let spec = *decoded.spec();
        let frames = decoded.frames();

        let needs_alloc = match &self.sample_buffer {
            Some(buf) => buf.capacity() < decoded.capacity() * spec.channels.count(),
            None => true,
        };
        if needs_alloc {
            self.sample_buffer = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }

        let samples = match self.sample_buffer.as_mut() {
            Some(buf) => {
                buf.copy_interleaved_ref(decoded);
                buf.samples().to_vec()
            }
            None => Vec::new(),
        };

        self.timestamp += frames as u64;
        self.frames_decoded += 1;

        Ok(DecodedFrame {
            samples,
            sample_rate: spec.rate,
            channels: spec.channels.count() as u16,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::testing::SILENT_AAC_PAYLOAD;

    // 44.1 kHz stereo AAC-LC, no CRC
    const HEADER: [u8; 7] = [0xff, 0xf1, 0x50, 0x80, 0x2e, 0x7f, 0xfc];

    #[test]
    fn test_decodes_silent_aac_frame() {
        let header = AdtsHeader::parse(&HEADER).unwrap();
        let mut decoder = AacDecoder::new(&header).unwrap();

        let frame = decoder.decode(&header, &SILENT_AAC_PAYLOAD).unwrap();

        assert_eq!(frame.sample_rate, 44100);
        assert_eq!(frame.channels, 2);
        assert_eq!(frame.samples.len(), 2048);
        assert_eq!(frame.frames(), AAC_FRAME_SAMPLES);
        assert_eq!(decoder.frames_decoded(), 1);
    }

    #[test]
    fn test_consecutive_frames_reuse_sample_buffer() {
        let header = AdtsHeader::parse(&HEADER).unwrap();
        let mut decoder = AacDecoder::new(&header).unwrap();

        for _ in 0..4 {
            let frame = decoder.decode(&header, &SILENT_AAC_PAYLOAD).unwrap();
            assert_eq!(frame.samples.len(), 2048);
        }
        assert_eq!(decoder.frames_decoded(), 4);
    }
}
