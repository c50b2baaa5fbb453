//! Audio input devices via CPAL (Cross-Platform Audio Library).
//!
//! Enumerates input devices, flags loopback candidates (system-audio
//! sources such as "Stereo Mix" or PipeWire monitors), and opens a capture
//! stream that feeds a [`CaptureBuffer`] from the driver callback.

use crate::audio::capture::CaptureBuffer;
use crate::error::{Result, VoxlogError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Device-name fragments that identify system-audio (loopback) sources.
///
/// WASAPI exposes "Stereo Mix"/"What U Hear" style devices; Japanese
/// Windows builds call it "ステレオミキサー"; PipeWire/Pulse expose
/// "Monitor of ..." sources.
const LOOPBACK_PATTERNS: &[&str] = &[
    "stereo mix",
    "ステレオミキサー",
    "loopback",
    "what u hear",
    "monitor",
];

/// An input device as shown to the device picker.
#[derive(Debug, Clone, PartialEq)]
pub struct InputDevice {
    /// Positional id within the current enumeration.
    pub id: usize,
    /// Driver-reported device name.
    pub name: String,
    /// Whether the name suggests a system-audio loopback source.
    pub is_loopback_candidate: bool,
}

/// Check if a device name looks like a loopback/system-audio source.
fn is_loopback_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    LOOPBACK_PATTERNS.iter().any(|p| lower.contains(p))
}

/// List all available audio input devices.
///
/// # Errors
/// Returns `VoxlogError::AudioCapture` if device enumeration fails.
pub fn list_input_devices() -> Result<Vec<InputDevice>> {
    let host = cpal::default_host();
    let devices = host.input_devices().map_err(|e| VoxlogError::AudioCapture {
        message: format!("Failed to enumerate input devices: {}", e),
    })?;

    let mut result = Vec::new();
    for (id, device) in devices.enumerate() {
        if let Ok(name) = device.name() {
            result.push(InputDevice {
                id,
                is_loopback_candidate: is_loopback_name(&name),
                name,
            });
        }
    }

    Ok(result)
}

/// Find the first loopback candidate, if any.
pub fn find_loopback_device() -> Option<InputDevice> {
    list_input_devices()
        .ok()?
        .into_iter()
        .find(|d| d.is_loopback_candidate)
}

/// Resolve a cpal device by name, preferring loopback candidates when no
/// name is given, then the system default input.
fn resolve_device(device_name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();

    if let Some(name) = device_name {
        let devices = host.input_devices().map_err(|e| VoxlogError::AudioCapture {
            message: format!("Failed to enumerate devices: {}", e),
        })?;
        for device in devices {
            if let Ok(dev_name) = device.name()
                && dev_name == name
            {
                return Ok(device);
            }
        }
        return Err(VoxlogError::DeviceUnavailable {
            device: name.to_string(),
        });
    }

    if let Some(candidate) = find_loopback_device() {
        let devices = host.input_devices().map_err(|e| VoxlogError::AudioCapture {
            message: format!("Failed to enumerate devices: {}", e),
        })?;
        for device in devices {
            if device.name().is_ok_and(|n| n == candidate.name) {
                info!(device = %candidate.name, "using loopback capture device");
                return Ok(device);
            }
        }
    }

    host.default_input_device()
        .ok_or_else(|| VoxlogError::DeviceUnavailable {
            device: "default".to_string(),
        })
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only touched through the Mutex in CaptureStream,
/// so access is serialized even though cpal::Stream itself is not Send.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// A running capture stream feeding a [`CaptureBuffer`].
///
/// Dropping the stream stops capture.
pub struct CaptureStream {
    stream: Mutex<Option<SendableStream>>,
    device_name: String,
}

impl CaptureStream {
    /// Driver-reported name of the captured device.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Stops the capture stream. Safe to call more than once.
    pub fn stop(&self) -> Result<()> {
        let mut guard = self
            .stream
            .lock()
            .map_err(|e| VoxlogError::AudioCapture {
                message: format!("Failed to lock stream: {}", e),
            })?;
        if let Some(sendable) = guard.take() {
            sendable.0.pause().map_err(|e| VoxlogError::AudioCapture {
                message: format!("Failed to stop audio stream: {}", e),
            })?;
        }
        Ok(())
    }
}

/// Open an input stream that pushes mono f32 samples into `buffer`.
///
/// Tries mono at the buffer's sample rate first, then the device's native
/// channel count at the same rate with software downmixing. Sample-rate
/// conversion is out of scope: a device that cannot deliver the configured
/// rate is reported as a capture error.
///
/// # Errors
/// `VoxlogError::DeviceUnavailable` when the named device is missing,
/// `VoxlogError::AudioCapture` when no usable stream config exists.
pub fn open_capture(
    device_name: Option<&str>,
    buffer: Arc<CaptureBuffer>,
) -> Result<CaptureStream> {
    let device = resolve_device(device_name)?;
    let name = device.name().unwrap_or_else(|_| "unknown".to_string());
    let sample_rate = buffer.sample_rate();

    let err_callback = |err| {
        warn!(error = %err, "audio stream error");
    };

    // Preferred: f32 mono at the target rate (PipeWire/Pulse convert
    // transparently)
    let mono_config = cpal::StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let cb_buffer = Arc::clone(&buffer);
    if let Ok(stream) = device.build_input_stream(
        &mono_config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            cb_buffer.push(data);
        },
        err_callback,
        None,
    ) {
        stream.play().map_err(|e| VoxlogError::AudioCapture {
            message: format!("Failed to start audio stream: {}", e),
        })?;
        info!(device = %name, rate = sample_rate, "capture started (mono)");
        return Ok(CaptureStream {
            stream: Mutex::new(Some(SendableStream(stream))),
            device_name: name,
        });
    }

    // Fallback: native channel count at the target rate, downmixed in the
    // callback
    let default_config = device
        .default_input_config()
        .map_err(|e| VoxlogError::AudioCapture {
            message: format!("Failed to query default input config: {}", e),
        })?;
    let channels = default_config.channels() as usize;

    let native_config = cpal::StreamConfig {
        channels: channels as u16,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let cb_buffer = Arc::clone(&buffer);
    let stream = device
        .build_input_stream(
            &native_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let mono = downmix_to_mono(data, channels);
                cb_buffer.push(&mono);
            },
            err_callback,
            None,
        )
        .map_err(|e| VoxlogError::AudioCapture {
            message: format!(
                "Device does not support {} Hz f32 capture: {}",
                sample_rate, e
            ),
        })?;

    stream.play().map_err(|e| VoxlogError::AudioCapture {
        message: format!("Failed to start audio stream: {}", e),
    })?;
    info!(device = %name, rate = sample_rate, channels, "capture started (downmixed)");

    Ok(CaptureStream {
        stream: Mutex::new(Some(SendableStream(stream))),
        device_name: name,
    })
}

/// Mix interleaved multi-channel audio down to mono by averaging channels.
fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
