//! Audio output subsystem

pub mod buffer;
pub mod device;
pub mod output;

pub use buffer::{SampleRing, ScopeTap, SharedSampleRing, SharedScopeTap};
pub use device::{get_output_device, list_output_devices, AudioDeviceInfo};
pub use output::{CpalOutput, OutputDevice};
