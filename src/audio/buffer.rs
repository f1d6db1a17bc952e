//! PCM buffers and the playback queue
//!
//! Decoded buffers are scheduled from the player task and consumed by the
//! real-time render callback. The queue is lock-free so the render thread
//! never blocks on the scheduler.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::queue::SegQueue;

/// Sample rate and channel layout of interleaved PCM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }
}

impl fmt::Display for PcmFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz/{} ch", self.sample_rate, self.channels)
    }
}

/// Decoded audio ready for playback
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    /// Interleaved audio samples (f32)
    pub samples: Vec<f32>,
    pub format: PcmFormat,
    /// Position in decode order within a session
    pub sequence: u64,
}

impl PcmBuffer {
    pub fn new(samples: Vec<f32>, format: PcmFormat, sequence: u64) -> Self {
        Self {
            samples,
            format,
            sequence,
        }
    }

    /// Get number of samples per channel
    pub fn frames(&self) -> usize {
        self.samples.len() / self.format.channels.max(1) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Get buffer duration in microseconds
    pub fn duration_us(&self) -> u64 {
        (self.frames() as u64 * 1_000_000) / self.format.sample_rate.max(1) as u64
    }
}

/// FIFO of scheduled buffers shared with the render thread
pub struct ScheduleQueue {
    queue: SegQueue<PcmBuffer>,
    /// Incremented on every flush so the render side drops its partial buffer
    epoch: AtomicU64,
    scheduled_count: AtomicU64,
    underrun_count: AtomicUsize,
}

impl ScheduleQueue {
    pub fn new() -> Self {
        Self {
            queue: SegQueue::new(),
            epoch: AtomicU64::new(0),
            scheduled_count: AtomicU64::new(0),
            underrun_count: AtomicUsize::new(0),
        }
    }

    /// Enqueue a buffer behind everything already scheduled
    pub fn schedule(&self, buffer: PcmBuffer) {
        self.queue.push(buffer);
        self.scheduled_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pop(&self) -> Option<PcmBuffer> {
        self.queue.pop()
    }

    /// Drop every scheduled buffer, including the one being rendered
    pub fn flush(&self) {
        while self.queue.pop().is_some() {}
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn scheduled_count(&self) -> u64 {
        self.scheduled_count.load(Ordering::Relaxed)
    }

    pub fn underrun_count(&self) -> usize {
        self.underrun_count.load(Ordering::Relaxed)
    }

    fn note_underrun(&self) {
        self.underrun_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Reset statistics, e.g. when a new output run starts
    pub fn reset_stats(&self) {
        self.scheduled_count.store(0, Ordering::Relaxed);
        self.underrun_count.store(0, Ordering::Relaxed);
    }
}

impl Default for ScheduleQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe handle to a schedule queue
pub type SharedScheduleQueue = Arc<ScheduleQueue>;

/// Create a new shared schedule queue
pub fn create_shared_queue() -> SharedScheduleQueue {
    Arc::new(ScheduleQueue::new())
}

/// Render-side read position across scheduled buffers
#[derive(Default)]
pub struct PlaybackCursor {
    current: Option<PcmBuffer>,
    position: usize,
    epoch: u64,
}

impl PlaybackCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill `out` with queued samples, padding with silence on underrun.
    /// Returns the number of samples taken from the queue.
    pub fn fill(&mut self, queue: &ScheduleQueue, out: &mut [f32]) -> usize {
        let epoch = queue.epoch();
        if epoch != self.epoch {
            self.current = None;
            self.position = 0;
            self.epoch = epoch;
        }

        let mut written = 0;
        while written < out.len() {
            if self.current.is_none() {
                match queue.pop() {
                    Some(buffer) => {
                        self.current = Some(buffer);
                        self.position = 0;
                    }
                    None => break,
                }
            }

            let Some(buffer) = self.current.as_ref() else {
                break;
            };
            let available = buffer.samples.len() - self.position;
            let n = available.min(out.len() - written);
            out[written..written + n]
                .copy_from_slice(&buffer.samples[self.position..self.position + n]);
            written += n;
            self.position += n;

            if self.position >= buffer.samples.len() {
                self.current = None;
            }
        }

        if written < out.len() {
            out[written..].fill(0.0);
            // Only count starvation once playback has real data in flight
            if queue.scheduled_count() > 0 {
                queue.note_underrun();
            }
        }

        written
    }

    /// Forget any partially rendered buffer
    pub fn reset(&mut self) {
        self.current = None;
        self.position = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(value: f32, frames: usize, sequence: u64) -> PcmBuffer {
        PcmBuffer::new(vec![value; frames * 2], PcmFormat::new(44100, 2), sequence)
    }

    #[test]
    fn test_buffer_frames_and_duration() {
        let b = buffer(0.0, 441, 0);
        assert_eq!(b.frames(), 441);
        assert_eq!(b.duration_us(), 10_000);
    }

    #[test]
    fn test_queue_is_fifo() {
        let queue = ScheduleQueue::new();
        queue.schedule(buffer(0.0, 4, 0));
        queue.schedule(buffer(1.0, 4, 1));
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.pop().unwrap().sequence, 0);
        assert_eq!(queue.pop().unwrap().sequence, 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_cursor_spans_buffer_boundaries() {
        let queue = ScheduleQueue::new();
        queue.schedule(buffer(1.0, 3, 0));
        queue.schedule(buffer(2.0, 3, 1));

        let mut cursor = PlaybackCursor::new();
        let mut out = [9.0f32; 8];
        assert_eq!(cursor.fill(&queue, &mut out), 8);
        assert_eq!(out, [1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 2.0, 2.0]);

        let mut out = [9.0f32; 4];
        assert_eq!(cursor.fill(&queue, &mut out), 4);
        assert_eq!(out, [2.0; 4]);
        assert_eq!(queue.underrun_count(), 0);
    }

    #[test]
    fn test_cursor_pads_silence_on_underrun() {
        let queue = ScheduleQueue::new();
        queue.schedule(buffer(0.5, 1, 0));

        let mut cursor = PlaybackCursor::new();
        let mut out = [9.0f32; 6];
        assert_eq!(cursor.fill(&queue, &mut out), 2);
        assert_eq!(out, [0.5, 0.5, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(queue.underrun_count(), 1);
    }

    #[test]
    fn test_silence_before_first_schedule_is_not_underrun() {
        let queue = ScheduleQueue::new();
        let mut cursor = PlaybackCursor::new();
        let mut out = [1.0f32; 4];

        assert_eq!(cursor.fill(&queue, &mut out), 0);
        assert_eq!(out, [0.0; 4]);
        assert_eq!(queue.underrun_count(), 0);
    }

    #[test]
    fn test_reset_stats_starts_a_fresh_run() {
        let queue = ScheduleQueue::new();
        queue.schedule(buffer(0.5, 1, 0));
        let mut cursor = PlaybackCursor::new();
        let mut out = [0.0f32; 4];
        cursor.fill(&queue, &mut out);
        assert_eq!(queue.underrun_count(), 1);

        queue.reset_stats();

        assert_eq!(queue.scheduled_count(), 0);
        assert_eq!(queue.underrun_count(), 0);
        cursor.fill(&queue, &mut out);
        assert_eq!(queue.underrun_count(), 0);
    }

    #[test]
    fn test_flush_drops_partial_buffer() {
        let queue = ScheduleQueue::new();
        queue.schedule(buffer(1.0, 4, 0));

        let mut cursor = PlaybackCursor::new();
        let mut out = [0.0f32; 2];
        cursor.fill(&queue, &mut out);

        queue.flush();
        queue.schedule(buffer(3.0, 1, 0));

        let mut out = [0.0f32; 2];
        cursor.fill(&queue, &mut out);
        assert_eq!(out, [3.0, 3.0]);
    }
}
