//! Fake engine, transport and delegate recording into one timeline

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::audio::buffer::{PcmBuffer, PcmFormat};
use crate::audio::engine::{AudioEngine, EngineErrorHandler};
use crate::error::{AudioError, Error, StreamError};
use crate::player::delegate::{PlayerDelegate, PlayerEvent};
use crate::stream::{StreamConnection, StreamEventSink, StreamSource, StreamTransport};

#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Start,
    Stop,
    PlayNode,
    StopNode,
    /// Sequence number and first sample of a scheduled buffer
    Schedule(u64, f32),
    Notify(PlayerEvent),
}

pub type Timeline = Arc<Mutex<Vec<Entry>>>;

pub struct FakeEngine {
    pub timeline: Timeline,
    pub fail_start: bool,
    /// Handler installed by the player, shared so tests can raise errors
    pub error_handler: Arc<Mutex<Option<EngineErrorHandler>>>,
    running: bool,
}

impl FakeEngine {
    pub fn new(timeline: Timeline) -> Self {
        Self {
            timeline,
            fail_start: false,
            error_handler: Arc::new(Mutex::new(None)),
            running: false,
        }
    }
}

impl AudioEngine for FakeEngine {
    fn output_format(&self) -> PcmFormat {
        PcmFormat::new(44100, 2)
    }

    fn prepare(&mut self) -> Result<(), AudioError> {
        Ok(())
    }

    fn start(&mut self) -> Result<(), AudioError> {
        if self.fail_start {
            return Err(AudioError::StreamError("device busy".to_string()));
        }
        self.running = true;
        self.timeline.lock().push(Entry::Start);
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
        self.timeline.lock().push(Entry::Stop);
    }

    fn set_error_handler(&mut self, handler: EngineErrorHandler) {
        *self.error_handler.lock() = Some(handler);
    }

    fn play_node(&mut self) {
        self.timeline.lock().push(Entry::PlayNode);
    }

    fn stop_node(&mut self) {
        self.timeline.lock().push(Entry::StopNode);
    }

    fn schedule_buffer(&mut self, buffer: PcmBuffer) {
        assert!(self.running, "buffer scheduled before engine start");
        self.timeline
            .lock()
            .push(Entry::Schedule(buffer.sequence, buffer.samples[0]));
    }
}

pub struct RecordingDelegate {
    pub timeline: Timeline,
}

impl PlayerDelegate for RecordingDelegate {
    fn did_start_playback(&self, _source: &StreamSource) {
        self.timeline.lock().push(Entry::Notify(PlayerEvent::Started));
    }

    fn did_stop_playback(&self, _source: &StreamSource) {
        self.timeline.lock().push(Entry::Notify(PlayerEvent::Stopped));
    }

    fn did_change_song(&self, _source: &StreamSource, title: &str) {
        self.timeline
            .lock()
            .push(Entry::Notify(PlayerEvent::SongChanged(title.to_string())));
    }

    fn did_fail(&self, _source: &StreamSource, error: &Error) {
        self.timeline
            .lock()
            .push(Entry::Notify(PlayerEvent::Failed(error.to_string())));
    }
}

/// Records the sink of every opened connection
#[derive(Default)]
pub struct FakeTransport {
    pub sinks: Arc<Mutex<Vec<StreamEventSink>>>,
    pub closed: Arc<AtomicUsize>,
    pub fail_open: bool,
}

impl StreamTransport for FakeTransport {
    fn open(
        &mut self,
        source: &StreamSource,
        sink: StreamEventSink,
    ) -> Result<Box<dyn StreamConnection>, StreamError> {
        if self.fail_open {
            return Err(StreamError::InvalidUrl(source.url().to_string()));
        }
        self.sinks.lock().push(sink);
        Ok(Box::new(FakeConnection {
            closed: self.closed.clone(),
            open: true,
        }))
    }
}

struct FakeConnection {
    closed: Arc<AtomicUsize>,
    open: bool,
}

impl StreamConnection for FakeConnection {
    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}
