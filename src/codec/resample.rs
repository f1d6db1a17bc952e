//! Conversion of decoded frames to the engine output format
//!
//! Channel layout is remapped first, then the sample rate is converted with
//! a sinc resampler when the stream rate differs from the output rate.

use rubato::{
    Resampler as RubatoResampler, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};

use crate::audio::buffer::PcmFormat;
use crate::codec::decoder::DecodedFrame;
use crate::constants::AAC_FRAME_SAMPLES;
use crate::error::CodecError;

const SINC_PARAMS: SincInterpolationParameters = SincInterpolationParameters {
    sinc_len: 256,
    f_cutoff: 0.95,
    interpolation: SincInterpolationType::Linear,
    oversampling_factor: 128,
    window: WindowFunction::BlackmanHarris2,
};

/// Converts frames from one stream format into the fixed target format
pub struct FormatConverter {
    source: PcmFormat,
    target: PcmFormat,
    resampler: Option<SincFixedIn<f32>>,
    /// Deinterleaved input waiting for a full resampler chunk
    pending: Vec<Vec<f32>>,
}

impl FormatConverter {
    pub fn new(source: PcmFormat, target: PcmFormat) -> Result<Self, CodecError> {
        if source.channels == 0 || target.channels == 0 {
            return Err(CodecError::Resample(format!(
                "cannot convert {} -> {}",
                source, target
            )));
        }

        let resampler = if source.sample_rate != target.sample_rate {
            let ratio = target.sample_rate as f64 / source.sample_rate as f64;
            let resampler = SincFixedIn::<f32>::new(
                ratio,
                1.0,
                SINC_PARAMS,
                AAC_FRAME_SAMPLES,
                target.channels as usize,
            )
            .map_err(|e| CodecError::Resample(e.to_string()))?;
            tracing::info!(
                "Resampling stream {} Hz -> {} Hz ({} frames delay)",
                source.sample_rate,
                target.sample_rate,
                resampler.output_delay()
            );
            Some(resampler)
        } else {
            None
        };

        Ok(Self {
            source,
            target,
            resampler,
            pending: vec![Vec::new(); target.channels as usize],
        })
    }

    pub fn source(&self) -> PcmFormat {
        self.source
    }

    pub fn target(&self) -> PcmFormat {
        self.target
    }

    /// Frames of leading silence the resampler adds, 0 without resampling
    pub fn output_delay(&self) -> usize {
        self.resampler.as_ref().map_or(0, |r| r.output_delay())
    }

    /// Convert one frame, returning interleaved samples in the target format
    pub fn convert(&mut self, frame: DecodedFrame) -> Result<Vec<f32>, CodecError> {
        let frame_format = PcmFormat::new(frame.sample_rate, frame.channels);
        if frame_format != self.source {
            return Err(CodecError::FormatChanged(format!(
                "{} -> {}",
                self.source, frame_format
            )));
        }

        let remapped = remap_channels(
            frame.samples,
            self.source.channels as usize,
            self.target.channels as usize,
        );

        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(remapped);
        };

        let channels = self.target.channels as usize;
        for (i, sample) in remapped.into_iter().enumerate() {
            self.pending[i % channels].push(sample);
        }

        let mut output = Vec::new();
        while self.pending[0].len() >= resampler.input_frames_next() {
            let needed = resampler.input_frames_next();
            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|channel| channel.drain(..needed).collect())
                .collect();

            let resampled = resampler
                .process(&chunk, None)
                .map_err(|e| CodecError::Resample(e.to_string()))?;

            interleave_into(&resampled, &mut output);
        }

        Ok(output)
    }
}

/// Remap interleaved samples between channel counts.
///
/// Mono is duplicated to every output channel, anything folded down to mono
/// is averaged, otherwise channels are copied by index and missing ones are
/// left silent.
pub fn remap_channels(samples: Vec<f32>, from: usize, to: usize) -> Vec<f32> {
    if from == to || from == 0 {
        return samples;
    }

    let frames = samples.len() / from;
    let mut out = Vec::with_capacity(frames * to);

    for frame in samples.chunks_exact(from) {
        if from == 1 {
            out.extend(std::iter::repeat(frame[0]).take(to));
        } else if to == 1 {
            out.push(frame.iter().sum::<f32>() / from as f32);
        } else {
            for ch in 0..to {
                out.push(frame.get(ch).copied().unwrap_or(0.0));
            }
        }
    }

    out
}

fn interleave_into(channels: &[Vec<f32>], out: &mut Vec<f32>) {
    let Some(first) = channels.first() else {
        return;
    };
    out.reserve(first.len() * channels.len());
    for frame_idx in 0..first.len() {
        for channel in channels {
            out.push(channel[frame_idx]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine_frame(rate: u32, channels: u16, frames: usize) -> DecodedFrame {
        let mut samples = Vec::with_capacity(frames * channels as usize);
        for i in 0..frames {
            let t = i as f32 / rate as f32;
            let value = (2.0 * PI * 440.0 * t).sin() * 0.8;
            for _ in 0..channels {
                samples.push(value);
            }
        }
        DecodedFrame {
            samples,
            sample_rate: rate,
            channels,
        }
    }

    #[test]
    fn test_passthrough_when_formats_match() {
        let format = PcmFormat::new(44100, 2);
        let mut converter = FormatConverter::new(format, format).unwrap();
        let frame = sine_frame(44100, 2, 1024);
        let expected = frame.samples.clone();

        assert_eq!(converter.convert(frame).unwrap(), expected);
    }

    #[test]
    fn test_mono_to_stereo() {
        let out = remap_channels(vec![0.1, 0.2, 0.3], 1, 2);
        assert_eq!(out, vec![0.1, 0.1, 0.2, 0.2, 0.3, 0.3]);
    }

    #[test]
    fn test_stereo_to_mono_averages() {
        let out = remap_channels(vec![0.2, 0.4, -1.0, 1.0], 2, 1);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.3).abs() < 1e-6);
        assert!(out[1].abs() < 1e-6);
    }

    #[test]
    fn test_stereo_to_quad_pads_silence() {
        let out = remap_channels(vec![0.5, -0.5], 2, 4);
        assert_eq!(out, vec![0.5, -0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_resamples_48k_to_44k() {
        let mut converter =
            FormatConverter::new(PcmFormat::new(48000, 2), PcmFormat::new(44100, 2)).unwrap();

        let per_frame: Vec<usize> = (0..10)
            .map(|_| converter.convert(sine_frame(48000, 2, 1024)).unwrap().len() / 2)
            .collect();

        // The first chunk is shortened by the filter delay; after that
        // 1024 * 44100 / 48000 = ~941 frames per chunk
        assert!(per_frame[0] > 0 && per_frame[0] < 941, "first chunk {}", per_frame[0]);
        for frames in &per_frame[1..] {
            assert!((936..=946).contains(frames), "steady chunk {}", frames);
        }

        let total: usize = per_frame.iter().sum();
        let expected = 10 * 1024 * 44100 / 48000;
        let with_delay = total + converter.output_delay();
        assert!(with_delay.abs_diff(expected) <= 16, "{} + delay vs {}", total, expected);
    }

    #[test]
    fn test_resampler_holds_partial_chunks() {
        let mut converter =
            FormatConverter::new(PcmFormat::new(22050, 1), PcmFormat::new(44100, 1)).unwrap();

        assert!(converter.convert(sine_frame(22050, 1, 512)).unwrap().is_empty());
        let output = converter.convert(sine_frame(22050, 1, 512)).unwrap();

        // One full chunk of 1024 input frames doubles, minus the filter delay
        assert!(!output.is_empty());
        let with_delay = output.len() + converter.output_delay();
        assert!(with_delay.abs_diff(2048) <= 16, "got {} samples", output.len());
    }

    #[test]
    fn test_source_format_change_is_rejected() {
        let format = PcmFormat::new(44100, 2);
        let mut converter = FormatConverter::new(format, format).unwrap();

        let result = converter.convert(sine_frame(48000, 2, 1024));
        assert!(matches!(result, Err(CodecError::FormatChanged(_))));
    }
}
