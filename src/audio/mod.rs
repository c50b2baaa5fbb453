//! Audio capture: ring buffer, input devices, WAV file input.

pub mod capture;
#[cfg(feature = "cpal-audio")]
pub mod device;
pub mod wav;

pub use capture::CaptureBuffer;
#[cfg(feature = "cpal-audio")]
pub use device::{CaptureStream, InputDevice, list_input_devices, open_capture};
