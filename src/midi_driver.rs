use crate::device::{
    ensure_open, find_device, wait_for, DeviceState, HeadTracker, DEFAULT_ZERO_TIMEOUT,
};
use crate::midi::{MidiBackend, MidiInput, MidiMessage, MidiOutput};
use crate::protocol::{
    build_open_sysex, central_pull_byte, parse_supperware, Chirality, CompassStatus, Gestures,
    MrHeadTrackerDecoder, RefreshRate, SupperwareEvent, SupperwareSetup, CLOSE_SYSEX,
};
use crate::reference::ReferenceFrame;
use crate::types::{OrientFormat, Pose, Quaternion, Sample};
use crate::Result;
use std::time::Duration;

/// Which MIDI head tracker is on the other end of the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiVendor {
    /// Supperware Head Tracker 1 (SysEx configured and streamed).
    Supperware,
    /// IEM MrHeadTracker (14-bit control changes, no configuration).
    MrHeadTracker,
}

impl MidiVendor {
    pub fn as_str(&self) -> &'static str {
        match self {
            MidiVendor::Supperware => "Supperware Head Tracker 1",
            MidiVendor::MrHeadTracker => "MrHeadTracker",
        }
    }
}

/// Configuration of a MIDI tracker. Only the Supperware tracker uses the
/// sensor settings; MrHeadTracker ignores them.
#[derive(Debug, Clone, PartialEq)]
pub struct MidiOptions {
    pub vendor: MidiVendor,
    pub device_name: String,
    /// Output port for configuration messages, if it differs from the input.
    pub device_name_output: Option<String>,
    pub orient_format: OrientFormat,
    /// 25, 50 or 100 Hz.
    pub refresh_rate: u32,
    pub compass_on: bool,
    /// Yaw pull-back rate in deg/s (0.05..=6.4), `None` disables it.
    pub central_pull: Option<f64>,
    pub gestures: Gestures,
    pub chirality: Chirality,
    pub zero_timeout: Duration,
}

impl MidiOptions {
    pub fn new(vendor: MidiVendor, device_name: impl Into<String>, orient_format: OrientFormat) -> Self {
        Self {
            vendor,
            device_name: device_name.into(),
            device_name_output: None,
            orient_format,
            refresh_rate: 50,
            compass_on: false,
            central_pull: None,
            gestures: Gestures::Preserve,
            chirality: Chirality::Preserve,
            zero_timeout: DEFAULT_ZERO_TIMEOUT,
        }
    }

    pub fn with_output_port(mut self, name: impl Into<String>) -> Self {
        self.device_name_output = Some(name.into());
        self
    }

    pub fn with_refresh_rate(mut self, hz: u32) -> Self {
        self.refresh_rate = hz;
        self
    }

    pub fn with_compass(mut self, on: bool) -> Self {
        self.compass_on = on;
        self
    }

    pub fn with_central_pull(mut self, rate: Option<f64>) -> Self {
        self.central_pull = rate;
        self
    }

    pub fn with_gestures(mut self, gestures: Gestures) -> Self {
        self.gestures = gestures;
        self
    }

    pub fn with_chirality(mut self, chirality: Chirality) -> Self {
        self.chirality = chirality;
        self
    }

    pub fn with_zero_timeout(mut self, timeout: Duration) -> Self {
        self.zero_timeout = timeout;
        self
    }

    fn output_port(&self) -> &str {
        self.device_name_output.as_deref().unwrap_or(&self.device_name)
    }
}

/// One-shot settings applied while opening.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenOptions {
    /// Ask the Supperware tracker to recalibrate its compass.
    pub compass_force_calibration: bool,
}

/// Head tracker connected over MIDI.
pub struct MidiTracker<B: MidiBackend> {
    backend: B,
    options: MidiOptions,
    refresh_rate: RefreshRate,
    input: Option<B::Input>,
    output: Option<B::Output>,
    decoder: MrHeadTrackerDecoder,
    compass: CompassStatus,
    reference: ReferenceFrame,
    state: DeviceState,
}

impl<B: MidiBackend> MidiTracker<B> {
    /// Validate `options` and create a closed tracker.
    pub fn new(backend: B, options: MidiOptions) -> Result<Self> {
        let refresh_rate = RefreshRate::from_hz(options.refresh_rate)?;
        if let Some(rate) = options.central_pull {
            central_pull_byte(rate)?;
        }

        Ok(Self {
            backend,
            decoder: MrHeadTrackerDecoder::new(options.orient_format),
            options,
            refresh_rate,
            input: None,
            output: None,
            compass: CompassStatus::default(),
            reference: ReferenceFrame::new(),
            state: DeviceState::Closed,
        })
    }

    pub fn options(&self) -> &MidiOptions {
        &self.options
    }

    /// Last compass state reported by a Supperware tracker.
    pub fn compass_status(&self) -> CompassStatus {
        self.compass
    }

    pub fn reference(&self) -> &ReferenceFrame {
        &self.reference
    }

    /// Open the ports and, for Supperware, configure and start the stream.
    pub fn open_with(&mut self, open: OpenOptions) -> Result<()> {
        if self.state == DeviceState::Open {
            return Ok(());
        }

        let inputs = self.backend.input_ports()?;
        log::debug!("MIDI inputs: {:?}", inputs);
        let input_name = find_device(&self.options.device_name, &inputs)?;

        let (input, output) = match self.options.vendor {
            MidiVendor::Supperware => {
                let setup = SupperwareSetup {
                    refresh_rate: self.refresh_rate,
                    format: self.options.orient_format,
                    compass_on: self.options.compass_on,
                    force_calibration: open.compass_force_calibration,
                    central_pull: self.options.central_pull,
                    gestures: self.options.gestures,
                    chirality: self.options.chirality,
                };
                let sysex = build_open_sysex(&setup)?;

                let outputs = self.backend.output_ports()?;
                log::debug!("MIDI outputs: {:?}", outputs);
                let output_name = find_device(self.options.output_port(), &outputs)?;

                let input = self.backend.open_input(&input_name)?;
                let mut output = self.backend.open_output(&output_name)?;
                output.send(&sysex)?;
                (input, Some(output))
            }
            MidiVendor::MrHeadTracker => (self.backend.open_input(&input_name)?, None),
        };

        self.input = Some(input);
        self.output = output;
        self.decoder = MrHeadTrackerDecoder::new(self.options.orient_format);
        self.state = DeviceState::Open;
        log::info!(
            "Opened {} on '{}' ({}, {} Hz)",
            self.options.vendor.as_str(),
            input_name,
            self.options.orient_format.as_str(),
            self.refresh_rate.hz()
        );
        Ok(())
    }

    /// Drain the input and keep the most recent complete orientation.
    fn poll_latest(&mut self) -> Option<Quaternion> {
        let input = self.input.as_mut()?;
        let mut latest = None;

        while let Some(raw) = input.poll() {
            let Some(message) = MidiMessage::parse(&raw) else {
                log::warn!("Ignoring malformed MIDI message: {:02X?}", raw);
                continue;
            };

            match (self.options.vendor, message) {
                (MidiVendor::Supperware, MidiMessage::SysEx(payload)) => {
                    match parse_supperware(&payload) {
                        Some(SupperwareEvent::Orientation(q)) => latest = Some(q),
                        Some(SupperwareEvent::Compass(status)) => {
                            if status != self.compass {
                                log::info!("Compass status: {:?}", status);
                            }
                            self.compass = status;
                        }
                        None => log::trace!("Ignoring SysEx {:02X?}", payload),
                    }
                }
                (MidiVendor::MrHeadTracker, MidiMessage::ControlChange { control, value, .. }) => {
                    if let Some(q) = self.decoder.feed(control, value) {
                        latest = Some(q);
                    }
                }
                (_, other) => log::trace!("Ignoring {:?}", other),
            }
        }

        latest
    }
}

impl<B: MidiBackend> HeadTracker for MidiTracker<B> {
    type Frame = ();

    fn name(&self) -> &str {
        &self.options.device_name
    }

    fn orient_format(&self) -> OrientFormat {
        self.options.orient_format
    }

    fn state(&self) -> DeviceState {
        self.state
    }

    fn open(&mut self) -> Result<()> {
        self.open_with(OpenOptions::default())
    }

    fn close(&mut self) {
        if self.state == DeviceState::Closed {
            return;
        }

        if let Some(output) = self.output.as_mut() {
            if let Err(e) = output.send(&CLOSE_SYSEX) {
                log::warn!("Failed to stop {}: {}", self.options.device_name, e);
            }
        }
        self.output = None;
        self.input = None;
        self.state = DeviceState::Closed;
        log::info!("Closed {}", self.options.device_name);
    }

    fn zero(&mut self) -> Result<()> {
        ensure_open(self.state)?;
        let raw = wait_for(self.options.zero_timeout, || Ok(self.poll_latest()))?;
        self.reference.set_orientation_zero(raw);
        log::info!("Zeroed {}", self.options.device_name);
        Ok(())
    }

    fn read_pose(&mut self, _frame: ()) -> Result<Option<Pose>> {
        ensure_open(self.state)?;
        Ok(self.poll_latest().map(|raw| Pose {
            orientation: Some(self.options.orient_format.sample(self.reference.apply(&raw))),
            position: None,
        }))
    }

    /// MIDI trackers are orientation only.
    fn read_position(&mut self, _frame: ()) -> Result<Option<Sample>> {
        ensure_open(self.state)?;
        Ok(None)
    }
}

impl<B: MidiBackend> Drop for MidiTracker<B> {
    fn drop(&mut self) {
        self.close();
    }
}
