//! Streaming ADTS parser
//!
//! Accepts network chunks with no alignment to frame boundaries, carries
//! partial frames between calls, and turns every complete frame into a PCM
//! buffer in the target format. The first malformed or undecodable frame
//! after sync, including one failing its CRC, is fatal: the parser reports
//! it once and then ignores input.

use bytes::{Buf, BytesMut};

use crate::audio::buffer::{PcmBuffer, PcmFormat};
use crate::codec::adts::{find_sync, AdtsHeader, RawBlocks};
use crate::codec::decoder::{default_decoder_factory, DecoderFactory, FrameDecoder};
use crate::codec::resample::FormatConverter;
use crate::constants::{ADTS_HEADER_LEN, MAX_SYNC_SEARCH};
use crate::error::CodecError;

/// Output of [`AdtsParser::parse`], in stream order
#[derive(Debug)]
pub enum ParserEvent {
    Decoded(PcmBuffer),
    Failed(CodecError),
}

/// Parser counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParserStats {
    pub frames_decoded: u64,
    /// Well-formed frames that could not be split into raw data blocks
    pub frames_skipped: u64,
    pub bytes_consumed: u64,
    /// Bytes dropped before the first sync marker
    pub bytes_discarded: u64,
}

/// Outcome of one framing step
enum Step {
    Decoded(PcmBuffer),
    Skipped,
    NeedMore,
}

pub struct AdtsParser {
    target: PcmFormat,
    residual: BytesMut,
    decoder_factory: DecoderFactory,
    decoder: Option<Box<dyn FrameDecoder>>,
    converter: Option<FormatConverter>,
    /// Header of the first frame; later frames must match its layout
    stream_header: Option<AdtsHeader>,
    locked: bool,
    failed: bool,
    sequence: u64,
    stats: ParserStats,
}

impl AdtsParser {
    /// Create a parser decoding with symphonia's AAC decoder
    pub fn new(target: PcmFormat) -> Self {
        Self::with_decoder_factory(target, default_decoder_factory())
    }

    pub fn with_decoder_factory(target: PcmFormat, decoder_factory: DecoderFactory) -> Self {
        Self {
            target,
            residual: BytesMut::new(),
            decoder_factory,
            decoder: None,
            converter: None,
            stream_header: None,
            locked: false,
            failed: false,
            sequence: 0,
            stats: ParserStats::default(),
        }
    }

    /// Format every emitted buffer conforms to
    pub fn target_format(&self) -> PcmFormat {
        self.target
    }

    pub fn has_failed(&self) -> bool {
        self.failed
    }

    /// Bytes carried over waiting for the rest of a frame
    pub fn pending_bytes(&self) -> usize {
        self.residual.len()
    }

    pub fn stats(&self) -> &ParserStats {
        &self.stats
    }

    /// Feed a chunk of the stream
    pub fn parse(&mut self, chunk: &[u8]) -> Vec<ParserEvent> {
        if self.failed {
            return Vec::new();
        }

        self.residual.extend_from_slice(chunk);

        let mut events = Vec::new();
        loop {
            match self.next_frame() {
                Ok(Step::Decoded(buffer)) => events.push(ParserEvent::Decoded(buffer)),
                Ok(Step::Skipped) => {}
                Ok(Step::NeedMore) => break,
                Err(e) => {
                    tracing::warn!("ADTS parser failed after {} frames: {}", self.stats.frames_decoded, e);
                    self.fail();
                    events.push(ParserEvent::Failed(e));
                    break;
                }
            }
        }
        events
    }

    fn fail(&mut self) {
        self.failed = true;
        self.residual.clear();
        self.decoder = None;
        self.converter = None;
    }

    /// Decode the next complete frame
    fn next_frame(&mut self) -> Result<Step, CodecError> {
        let header = loop {
            if !self.locked && !self.acquire_sync()? {
                return Ok(Step::NeedMore);
            }
            if self.residual.len() < ADTS_HEADER_LEN {
                return Ok(Step::NeedMore);
            }
            match AdtsHeader::parse(&self.residual) {
                Ok(header) => break header,
                Err(e) if self.locked => return Err(e),
                Err(e) => {
                    tracing::trace!("Ignoring false sync marker: {}", e);
                    self.discard(1)?;
                }
            }
        };

        if self.residual.len() < header.frame_length {
            return Ok(Step::NeedMore);
        }

        let frame = self.residual.split_to(header.frame_length).freeze();
        if !self.locked {
            tracing::debug!(
                "ADTS sync acquired after {} bytes: {} Hz, {} channels",
                self.stats.bytes_discarded,
                header.sample_rate(),
                header.channels()
            );
            self.locked = true;
        }
        self.stats.bytes_consumed += frame.len() as u64;

        match &self.stream_header {
            Some(first) if !first.same_stream_format(&header) => {
                return Err(CodecError::FormatChanged(format!(
                    "{} Hz/{} ch -> {} Hz/{} ch",
                    first.sample_rate(),
                    first.channels(),
                    header.sample_rate(),
                    header.channels()
                )));
            }
            Some(_) => {}
            None => self.stream_header = Some(header),
        }

        let blocks = match header.raw_blocks(&frame)? {
            RawBlocks::Blocks(blocks) => blocks,
            RawBlocks::Unindexed(count) => {
                tracing::warn!("Skipping frame with {} unprotected raw data blocks", count);
                self.stats.frames_skipped += 1;
                return Ok(Step::Skipped);
            }
        };

        if self.decoder.is_none() {
            self.decoder = Some((self.decoder_factory)(&header)?);
        }
        let decoder = match self.decoder.as_mut() {
            Some(decoder) => decoder,
            None => return Err(CodecError::DecoderInit("decoder unavailable".to_string())),
        };

        let mut samples = Vec::new();
        for block in blocks {
            let decoded = decoder.decode(&header, block)?;
            if self.converter.is_none() {
                let source = PcmFormat::new(decoded.sample_rate, decoded.channels);
                self.converter = Some(FormatConverter::new(source, self.target)?);
            }
            match self.converter.as_mut() {
                Some(converter) => samples.extend(converter.convert(decoded)?),
                None => return Err(CodecError::Resample("converter unavailable".to_string())),
            }
        }

        let buffer = PcmBuffer::new(samples, self.target, self.sequence);
        self.sequence += 1;
        self.stats.frames_decoded += 1;
        Ok(Step::Decoded(buffer))
    }

    /// Drop bytes ahead of the first sync marker. Returns false when no
    /// marker is buffered yet.
    fn acquire_sync(&mut self) -> Result<bool, CodecError> {
        match find_sync(&self.residual) {
            Some(0) => Ok(true),
            Some(offset) => {
                self.discard(offset)?;
                Ok(true)
            }
            None => {
                // Keep a trailing 0xFF, it may start a marker
                let keep = usize::from(self.residual.last() == Some(&0xff));
                let drop = self.residual.len() - keep;
                self.discard(drop)?;
                Ok(false)
            }
        }
    }

    fn discard(&mut self, count: usize) -> Result<(), CodecError> {
        self.residual.advance(count);
        self.stats.bytes_discarded += count as u64;
        if self.stats.bytes_discarded > MAX_SYNC_SEARCH as u64 {
            return Err(CodecError::SyncNotFound(MAX_SYNC_SEARCH));
        }
        Ok(())
    }
}
