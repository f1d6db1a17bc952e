//! ADTS header parsing
//!
//! An ADTS frame is a 7-byte header followed by one to four raw AAC data
//! blocks. Bit layout of the header:
//!
//! ```text
//! AAAAAAAA AAAABCCD EEFFFFGH HHIJKLMM MMMMMMMM MMMOOOOO OOOOOOPP
//! A sync (0xFFF)  B MPEG version  C layer  D protection absent
//! E profile  F sampling index  G private  H channel configuration
//! I..L originality/home/copyright  M frame length  O buffer fullness
//! P raw data blocks - 1
//! ```
//!
//! With protection, a single-block frame carries a CRC word between header
//! and block, covering both. A multi-block frame carries the byte positions
//! of blocks 2..n (relative to the first block) and a CRC over the header,
//! then every block is followed by its own CRC. Without protection the block
//! boundaries of a multi-block frame are not recorded anywhere.

use crate::constants::{ADTS_CRC_LEN, ADTS_HEADER_LEN};
use crate::error::CodecError;

/// Sampling frequencies addressed by the 4-bit sampling index
const SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpegVersion {
    Mpeg4,
    Mpeg2,
}

/// Parsed ADTS header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsHeader {
    pub mpeg_version: MpegVersion,
    pub protection_absent: bool,
    /// Profile field (audio object type minus one)
    pub profile: u8,
    pub sampling_index: u8,
    pub channel_config: u8,
    /// Header plus payload, in bytes
    pub frame_length: usize,
    pub buffer_fullness: u16,
    /// Number of raw data blocks minus one
    pub raw_data_blocks: u8,
}

impl AdtsHeader {
    /// Parse and validate the header at the start of `buf`.
    ///
    /// Needs at least [`ADTS_HEADER_LEN`] bytes; the payload does not have to
    /// be present yet.
    pub fn parse(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < ADTS_HEADER_LEN {
            return Err(CodecError::InvalidHeader(format!(
                "need {} bytes, got {}",
                ADTS_HEADER_LEN,
                buf.len()
            )));
        }

        let sync = ((buf[0] as u16) << 4) | ((buf[1] as u16) >> 4);
        if sync != 0xfff {
            return Err(CodecError::BadSyncWord(sync));
        }

        let layer = (buf[1] >> 1) & 0x3;
        if layer != 0 {
            return Err(CodecError::InvalidHeader(format!("layer {} (expected 0)", layer)));
        }

        let header = Self {
            mpeg_version: if buf[1] & 0x08 == 0 {
                MpegVersion::Mpeg4
            } else {
                MpegVersion::Mpeg2
            },
            protection_absent: buf[1] & 0x01 == 1,
            profile: buf[2] >> 6,
            sampling_index: (buf[2] >> 2) & 0x0f,
            channel_config: ((buf[2] & 0x01) << 2) | (buf[3] >> 6),
            frame_length: (((buf[3] & 0x03) as usize) << 11)
                | ((buf[4] as usize) << 3)
                | ((buf[5] as usize) >> 5),
            buffer_fullness: (((buf[5] & 0x1f) as u16) << 6) | ((buf[6] as u16) >> 2),
            raw_data_blocks: buf[6] & 0x03,
        };

        if header.sampling_index as usize >= SAMPLE_RATES.len() {
            return Err(CodecError::InvalidHeader(format!(
                "reserved sampling index {}",
                header.sampling_index
            )));
        }
        if header.channel_config == 0 {
            return Err(CodecError::InvalidHeader(
                "channel configuration 0 (in-band PCE) is not supported".to_string(),
            ));
        }
        if header.frame_length < header.header_len() {
            return Err(CodecError::InvalidHeader(format!(
                "frame length {} shorter than header",
                header.frame_length
            )));
        }
        Ok(header)
    }

    /// Bytes before the first raw data block: the header, plus block
    /// positions and the header CRC when protected
    pub fn header_len(&self) -> usize {
        if self.protection_absent {
            ADTS_HEADER_LEN
        } else {
            ADTS_HEADER_LEN + 2 * self.raw_data_blocks as usize + ADTS_CRC_LEN
        }
    }

    /// Raw data blocks in the frame
    pub fn block_count(&self) -> usize {
        self.raw_data_blocks as usize + 1
    }

    /// Verify the CRC words of a complete `frame` and locate its raw data
    /// blocks
    pub fn raw_blocks<'a>(&self, frame: &'a [u8]) -> Result<RawBlocks<'a>, CodecError> {
        if frame.len() != self.frame_length {
            return Err(CodecError::InvalidHeader(format!(
                "frame is {} bytes, header says {}",
                frame.len(),
                self.frame_length
            )));
        }
        let body = &frame[self.header_len()..];

        if self.protection_absent {
            return Ok(if self.raw_data_blocks == 0 {
                RawBlocks::Blocks(vec![body])
            } else {
                RawBlocks::Unindexed(self.block_count())
            });
        }

        let crc_at = self.header_len() - ADTS_CRC_LEN;
        let header_crc = read_u16(frame, crc_at);
        if self.raw_data_blocks == 0 {
            verify_crc(header_crc, &[&frame[..ADTS_HEADER_LEN], body])?;
            return Ok(RawBlocks::Blocks(vec![body]));
        }
        verify_crc(header_crc, &[&frame[..crc_at]])?;

        let mut bounds = Vec::with_capacity(self.block_count() + 1);
        bounds.push(0);
        for i in 0..self.raw_data_blocks as usize {
            bounds.push(read_u16(frame, ADTS_HEADER_LEN + 2 * i) as usize);
        }
        bounds.push(body.len());

        let mut blocks = Vec::with_capacity(self.block_count());
        for pair in bounds.windows(2) {
            let (start, end) = (pair[0], pair[1]);
            if end < start + ADTS_CRC_LEN || end > body.len() {
                return Err(CodecError::InvalidHeader(format!(
                    "raw data block at {}..{} outside {} byte frame body",
                    start,
                    end,
                    body.len()
                )));
            }
            let block = &body[start..end - ADTS_CRC_LEN];
            verify_crc(read_u16(body, end - ADTS_CRC_LEN), &[block])?;
            blocks.push(block);
        }
        Ok(RawBlocks::Blocks(blocks))
    }

    pub fn payload_len(&self) -> usize {
        self.frame_length - self.header_len()
    }

    pub fn sample_rate(&self) -> u32 {
        SAMPLE_RATES[self.sampling_index as usize]
    }

    /// Channel count implied by the channel configuration
    pub fn channels(&self) -> u16 {
        match self.channel_config {
            7 => 8,
            n => n as u16,
        }
    }

    /// MPEG-4 audio object type (2 = AAC LC)
    pub fn audio_object_type(&self) -> u8 {
        self.profile + 1
    }

    /// Two-byte AudioSpecificConfig describing this stream
    pub fn audio_specific_config(&self) -> [u8; 2] {
        let object_type = self.audio_object_type();
        [
            (object_type << 3) | (self.sampling_index >> 1),
            ((self.sampling_index & 0x01) << 7) | (self.channel_config << 3),
        ]
    }

    /// True if `other` describes the same audio layout
    pub fn same_stream_format(&self, other: &AdtsHeader) -> bool {
        self.profile == other.profile
            && self.sampling_index == other.sampling_index
            && self.channel_config == other.channel_config
    }

    /// Serialize the 7 fixed/variable header bytes
    pub fn to_bytes(&self) -> [u8; ADTS_HEADER_LEN] {
        let version_bit = match self.mpeg_version {
            MpegVersion::Mpeg4 => 0,
            MpegVersion::Mpeg2 => 0x08,
        };
        let len = self.frame_length;
        [
            0xff,
            0xf0 | version_bit | self.protection_absent as u8,
            (self.profile << 6) | (self.sampling_index << 2) | (self.channel_config >> 2),
            ((self.channel_config & 0x03) << 6) | ((len >> 11) & 0x03) as u8,
            ((len >> 3) & 0xff) as u8,
            (((len & 0x07) as u8) << 5) | ((self.buffer_fullness >> 6) & 0x1f) as u8,
            (((self.buffer_fullness & 0x3f) as u8) << 2) | self.raw_data_blocks,
        ]
    }
}

/// Raw data blocks of one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawBlocks<'a> {
    Blocks(Vec<&'a [u8]>),
    /// Several blocks without protection; their boundaries are unknown
    Unindexed(usize),
}

/// CRC-16 (polynomial 0x8005, initial value 0xFFFF) over `parts` in order
pub fn adts_crc(parts: &[&[u8]]) -> u16 {
    let mut crc: u16 = 0xffff;
    for &byte in parts.iter().flat_map(|part| part.iter()) {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x8005
            } else {
                crc << 1
            };
        }
    }
    crc
}

fn verify_crc(expected: u16, parts: &[&[u8]]) -> Result<(), CodecError> {
    let computed = adts_crc(parts);
    if computed != expected {
        return Err(CodecError::CrcMismatch { expected, computed });
    }
    Ok(())
}

fn read_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([buf[at], buf[at + 1]])
}

/// Offset of the first plausible sync marker (`0xFFF` + layer 0) in `buf`
pub fn find_sync(buf: &[u8]) -> Option<usize> {
    buf.windows(2)
        .position(|w| w[0] == 0xff && w[1] & 0xf6 == 0xf0)
}
