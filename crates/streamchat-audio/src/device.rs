use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host};
use streamchat_foundation::AudioError;

/// Selects the loopback source to capture from.
///
/// We want what the machine is playing, not a microphone. PipeWire and
/// PulseAudio expose that as an input device named after the output it
/// mirrors (`<sink>.monitor`); WASAPI exposes output devices that accept
/// an input stream. The candidate order below prefers a monitor of the
/// default output, then any monitor, then whatever the host calls the
/// default input.
pub struct DeviceManager {
    host: Host,
}

impl DeviceManager {
    pub fn new() -> Result<Self, AudioError> {
        Ok(Self {
            host: cpal::default_host(),
        })
    }

    pub fn host_id(&self) -> cpal::HostId {
        self.host.id()
    }

    /// Candidate device names in descending preference. The capture
    /// thread walks this list until one produces frames.
    pub fn candidate_device_names(&self) -> Vec<String> {
        let mut monitors_of_default = Vec::new();
        let mut other_monitors = Vec::new();

        let default_output = self
            .host
            .default_output_device()
            .and_then(|d| d.name().ok());

        if let Ok(inputs) = self.host.input_devices() {
            for device in inputs {
                let Ok(name) = device.name() else { continue };
                let lower = name.to_lowercase();
                if !(lower.contains("monitor") || lower.contains("loopback")) {
                    continue;
                }
                match &default_output {
                    Some(out) if name.contains(out.as_str()) => {
                        monitors_of_default.push(name);
                    }
                    _ => other_monitors.push(name),
                }
            }
        }

        let mut candidates = monitors_of_default;
        candidates.extend(other_monitors);
        if let Some(default_input) = self.host.default_input_device().and_then(|d| d.name().ok()) {
            if !candidates.contains(&default_input) {
                candidates.push(default_input);
            }
        }
        candidates
    }

    /// Open a device by exact name, or the default input when `None`.
    pub fn open_device(&self, name: Option<&str>) -> Result<Device, AudioError> {
        match name {
            Some(wanted) => {
                if let Ok(inputs) = self.host.input_devices() {
                    for device in inputs {
                        if device.name().map(|n| n == wanted).unwrap_or(false) {
                            return Ok(device);
                        }
                    }
                }
                Err(AudioError::DeviceNotFound {
                    name: Some(wanted.to_string()),
                })
            }
            None => self
                .host
                .default_input_device()
                .ok_or(AudioError::DeviceNotFound { name: None }),
        }
    }
}
