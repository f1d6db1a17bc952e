//! Audio output subsystem

pub mod buffer;
pub mod device;
pub mod engine;
pub mod output;

pub use buffer::{PcmBuffer, PcmFormat, ScheduleQueue};
pub use device::{list_output_devices, AudioDeviceInfo};
pub use engine::{AudioEngine, EngineStats};
pub use output::CpalEngine;
