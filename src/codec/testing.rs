//! Test doubles for the codec pipeline

use std::sync::Arc;

use crate::codec::adts::{adts_crc, AdtsHeader, MpegVersion};
use crate::codec::decoder::{DecodedFrame, DecoderFactory, FrameDecoder};
use crate::constants::ADTS_HEADER_LEN;
use crate::error::CodecError;

/// Payloads starting with this byte make [`StubDecoder`] fail
pub const CORRUPT_PAYLOAD: [u8; 2] = [0xee, 0xee];

/// Raw data block of one silent 44.1 kHz stereo AAC-LC frame
pub const SILENT_AAC_PAYLOAD: [u8; 9] = [0x21, 0x00, 0x49, 0x90, 0x02, 0x19, 0x00, 0x23, 0x80];

/// Wrap `payload` in a 44.1 kHz stereo AAC-LC ADTS header
pub fn adts_frame(payload: &[u8]) -> Vec<u8> {
    adts_frame_with(&[payload], false)
}

/// Build a 44.1 kHz stereo AAC-LC frame holding `blocks`, with block
/// positions and CRC words when `protected`
pub fn adts_frame_with(blocks: &[&[u8]], protected: bool) -> Vec<u8> {
    let mut header = AdtsHeader {
        mpeg_version: MpegVersion::Mpeg4,
        protection_absent: !protected,
        profile: 1,
        sampling_index: 4,
        channel_config: 2,
        frame_length: 0,
        buffer_fullness: 0x7ff,
        raw_data_blocks: (blocks.len() - 1) as u8,
    };

    let mut body = Vec::new();
    let mut positions = Vec::new();
    for (i, block) in blocks.iter().enumerate() {
        if i > 0 {
            positions.extend_from_slice(&(body.len() as u16).to_be_bytes());
        }
        body.extend_from_slice(block);
        if protected && blocks.len() > 1 {
            body.extend_from_slice(&adts_crc(&[*block]).to_be_bytes());
        }
    }

    header.frame_length = header.header_len() + body.len();
    let mut frame = header.to_bytes().to_vec();
    if protected {
        frame.extend_from_slice(&positions);
        let crc = if blocks.len() == 1 {
            adts_crc(&[&frame[..ADTS_HEADER_LEN], blocks[0]])
        } else {
            adts_crc(&[&frame[..]])
        };
        frame.extend_from_slice(&crc.to_be_bytes());
    }
    frame.extend_from_slice(&body);
    frame
}

/// Emits one PCM frame per payload byte, valued as the byte, on every
/// channel the header announces
pub struct StubDecoder;

impl FrameDecoder for StubDecoder {
    fn decode(&mut self, header: &AdtsHeader, payload: &[u8]) -> Result<DecodedFrame, CodecError> {
        if payload.first() == Some(&CORRUPT_PAYLOAD[0]) {
            return Err(CodecError::DecodingFailed("corrupt payload".to_string()));
        }
        let channels = header.channels();
        let samples = payload
            .iter()
            .flat_map(|&b| std::iter::repeat(b as f32).take(channels as usize))
            .collect();
        Ok(DecodedFrame {
            samples,
            sample_rate: header.sample_rate(),
            channels,
        })
    }
}

pub fn stub_decoder_factory() -> DecoderFactory {
    Arc::new(|_header: &AdtsHeader| Ok(Box::new(StubDecoder) as Box<dyn FrameDecoder>))
}
