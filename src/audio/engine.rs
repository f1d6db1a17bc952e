//! Audio engine capability set used by the stream player

use std::sync::Arc;

use crate::audio::buffer::{PcmBuffer, PcmFormat};
use crate::error::AudioError;

/// Receives failures of a running output, called from the audio thread
pub type EngineErrorHandler = Arc<dyn Fn(AudioError) + Send + Sync>;

/// Counters reported by an engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub buffers_scheduled: u64,
    pub buffers_queued: usize,
    pub underruns: usize,
}

/// Output graph with a single playback node feeding the hardware mixer.
///
/// `prepare` is called once when the player is built. `start` may fail, in
/// which case nothing is running afterwards. Buffers passed to
/// `schedule_buffer` play back-to-back in the order they were scheduled;
/// `stop_node` discards whatever is still queued. Failures after a
/// successful `start` (device loss, stream errors) go to the handler set
/// with `set_error_handler`.
pub trait AudioEngine: Send {
    /// Format buffers must be converted to before scheduling
    fn output_format(&self) -> PcmFormat;

    fn prepare(&mut self) -> Result<(), AudioError>;

    fn start(&mut self) -> Result<(), AudioError>;

    fn stop(&mut self);

    fn play_node(&mut self);

    fn stop_node(&mut self);

    fn schedule_buffer(&mut self, buffer: PcmBuffer);

    /// Handler for failures of outputs started after this call
    fn set_error_handler(&mut self, handler: EngineErrorHandler);

    fn stats(&self) -> EngineStats {
        EngineStats::default()
    }
}
