//! cpal-backed audio engine
//!
//! The output stream lives on a dedicated thread for its whole lifetime
//! (cpal streams are not `Send` on every host). The render callback pulls
//! scheduled PCM from the lock-free schedule queue and plays silence while
//! the playback node is stopped or the queue runs dry.
//!
//! `start` waits for the output thread to report readiness and `stop` joins
//! it. On a multi-threaded tokio runtime both waits run under
//! `block_in_place` so other tasks keep their worker.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, StreamConfig};
use crossbeam_channel::{bounded, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio::runtime::{Handle, RuntimeFlavor};

use crate::audio::buffer::{
    create_shared_queue, PcmBuffer, PcmFormat, PlaybackCursor, SharedScheduleQueue,
};
use crate::audio::device::resolve_output_device;
use crate::audio::engine::{AudioEngine, EngineErrorHandler, EngineStats};
use crate::error::AudioError;

/// Audio engine rendering to a cpal output device
pub struct CpalEngine {
    /// Configured device id, `None` for the system default
    device_id: Option<String>,

    device_name: String,

    /// Output format negotiated with the device
    format: PcmFormat,

    sample_format: SampleFormat,

    /// Buffers waiting for the render callback
    queue: SharedScheduleQueue,

    /// Whether the output stream thread is running
    running: Arc<AtomicBool>,

    /// Whether the playback node feeds queued audio (silence otherwise)
    playing: Arc<AtomicBool>,

    prepared: bool,

    thread_handle: Option<JoinHandle<()>>,

    /// Dropping this ends the output thread
    stop_tx: Option<Sender<()>>,

    error_handler: Option<EngineErrorHandler>,
}

impl CpalEngine {
    /// Connect a playback node to the device's mixer in its default format
    pub fn new(device_id: Option<&str>) -> Result<Self, AudioError> {
        let device = resolve_output_device(device_id)?;
        let default_config = device.default_output_config()?;

        let format = PcmFormat::new(default_config.sample_rate().0, default_config.channels());
        let sample_format = default_config.sample_format();

        tracing::info!(
            "Audio output: {} ({}, {:?})",
            device.name,
            format,
            sample_format
        );

        Ok(Self {
            device_id: device_id.map(str::to_string),
            device_name: device.name,
            format,
            sample_format,
            queue: create_shared_queue(),
            running: Arc::new(AtomicBool::new(false)),
            playing: Arc::new(AtomicBool::new(false)),
            prepared: false,
            thread_handle: None,
            stop_tx: None,
            error_handler: None,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    fn join_thread(&mut self) {
        self.stop_tx = None;
        if let Some(handle) = self.thread_handle.take() {
            let _ = blocking(|| handle.join());
        }
    }
}

impl AudioEngine for CpalEngine {
    fn output_format(&self) -> PcmFormat {
        self.format
    }

    fn prepare(&mut self) -> Result<(), AudioError> {
        self.prepared = true;
        Ok(())
    }

    fn start(&mut self) -> Result<(), AudioError> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }
        if !self.prepared {
            return Err(AudioError::NotPrepared);
        }

        let device = resolve_output_device(self.device_id.as_deref())?;
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(0);
        self.stop_tx = Some(stop_tx);
        let error_handler = self.error_handler.clone();
        self.queue.reset_stats();

        let config = StreamConfig {
            channels: self.format.channels,
            sample_rate: cpal::SampleRate(self.format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let sample_format = self.sample_format;
        let queue = self.queue.clone();
        let playing = self.playing.clone();
        let running = self.running.clone();

        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let cpal_device = device.into_inner();

                let stream = match sample_format {
                    SampleFormat::F32 => {
                        build_stream::<f32>(&cpal_device, &config, queue, playing, error_handler)
                    }
                    SampleFormat::I16 => {
                        build_stream::<i16>(&cpal_device, &config, queue, playing, error_handler)
                    }
                    SampleFormat::U16 => {
                        build_stream::<u16>(&cpal_device, &config, queue, playing, error_handler)
                    }
                    other => Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
                };

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        running.store(false, Ordering::SeqCst);
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    running.store(false, Ordering::SeqCst);
                    let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                    return;
                }

                let _ = ready_tx.send(Ok(()));

                // Returns once the engine drops its sender
                let _ = stop_rx.recv();
                running.store(false, Ordering::SeqCst);

                // Stream is dropped here, stopping output
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                self.stop_tx = None;
                AudioError::StreamError(e.to_string())
            })?;

        self.thread_handle = Some(handle);

        match blocking(|| ready_rx.recv()) {
            Ok(Ok(())) => {
                tracing::info!("Audio engine started on {}", self.device_name);
                Ok(())
            }
            Ok(Err(e)) => {
                self.join_thread();
                Err(e)
            }
            Err(_) => {
                self.running.store(false, Ordering::SeqCst);
                self.join_thread();
                Err(AudioError::StreamError("output thread exited".to_string()))
            }
        }
    }

    fn stop(&mut self) {
        self.join_thread();
        self.running.store(false, Ordering::SeqCst);
    }

    fn play_node(&mut self) {
        self.playing.store(true, Ordering::SeqCst);
    }

    fn stop_node(&mut self) {
        self.playing.store(false, Ordering::SeqCst);
        self.queue.flush();
    }

    fn schedule_buffer(&mut self, buffer: PcmBuffer) {
        debug_assert_eq!(buffer.format, self.format);
        self.queue.schedule(buffer);
    }

    fn set_error_handler(&mut self, handler: EngineErrorHandler) {
        self.error_handler = Some(handler);
    }

    fn stats(&self) -> EngineStats {
        EngineStats {
            buffers_scheduled: self.queue.scheduled_count(),
            buffers_queued: self.queue.len(),
            underruns: self.queue.underrun_count(),
        }
    }
}

impl Drop for CpalEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    queue: SharedScheduleQueue,
    playing: Arc<AtomicBool>,
    error_handler: Option<EngineErrorHandler>,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample + FromSample<f32>,
{
    let mut cursor = PlaybackCursor::new();
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if !playing.load(Ordering::Relaxed) {
                    cursor.reset();
                    data.fill(T::EQUILIBRIUM);
                    return;
                }

                scratch.resize(data.len(), 0.0);
                cursor.fill(&queue, &mut scratch);
                for (dst, src) in data.iter_mut().zip(scratch.iter()) {
                    *dst = T::from_sample(*src);
                }
            },
            move |err| {
                tracing::error!("Audio output error: {}", err);
                if let Some(handler) = &error_handler {
                    handler(AudioError::OutputFailed(err.to_string()));
                }
            },
            None,
        )
        .map_err(|e| AudioError::CpalError(e.to_string()))
}

/// Run a blocking wait without stalling a multi-threaded runtime worker
fn blocking<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_blocking_outside_runtime() {
        assert_eq!(blocking(|| 7), 7);
    }

    #[tokio::test]
    async fn test_blocking_on_current_thread_runtime() {
        assert_eq!(blocking(|| 7), 7);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_blocking_wait_lets_worker_tasks_run() {
        // The only worker is busy waiting; the sender can only run if the
        // wait hands the worker over
        let waiter = tokio::spawn(async {
            let (tx, rx) = bounded::<u32>(0);
            tokio::spawn(async move {
                let _ = tx.send(42);
            });
            blocking(|| rx.recv_timeout(Duration::from_secs(5)))
        });

        assert_eq!(waiter.await.unwrap(), Ok(42));
    }
}
