//! Vendor byte layouts of the MIDI head trackers.
//!
//! Supperware Head Tracker 1 is configured with SysEx parameter/value pairs
//! and streams orientation as SysEx. IEM MrHeadTracker streams 14-bit
//! control changes and needs no configuration.

use crate::midi::{STATUS_CONTROL_CHANGE, SYSEX_END, SYSEX_START};
use crate::types::{OrientFormat, Quaternion, Ypr};
use crate::{HeadTrackerError, Result};

// -- Supperware SysEx framing --
pub const SUPPERWARE_ID: [u8; 3] = [0x00, 0x21, 0x42];

// -- Supperware configuration parameters --
pub const PARAM_SENSOR_SETUP: u8 = 0;
pub const PARAM_DATA_OUTPUT: u8 = 1;
pub const PARAM_COMPASS: u8 = 3;
pub const PARAM_GESTURES: u8 = 4;
pub const PARAM_CENTRAL_PULL: u8 = 6;

// -- Supperware device-to-host messages --
pub const MSG_ORIENTATION: u8 = 0x40;
pub const MSG_COMPASS_STATUS: u8 = 0x42;

/// Orientation sub-formats of `MSG_ORIENTATION`.
pub const FORMAT_YPR: u8 = 0x00;
pub const FORMAT_QUATERNION: u8 = 0x01;

/// Fixed-point scales of the 14-bit data words.
pub const YPR_SCALE: f64 = 2048.0;
pub const QUATERNION_SCALE: f64 = 8192.0;

/// Sends sensors-off and stops the data stream.
pub const CLOSE_SYSEX: [u8; 8] = [0xF0, 0x00, 0x21, 0x42, 0x00, 0x01, 0x00, 0xF7];

/// Central pull is sent in 0.05 deg/s steps, minus one.
pub const CENTRAL_PULL_STEP: f64 = 0.05;

bitflags::bitflags! {
    /// Parameter 0: sensor setup.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SensorSetup: u8 {
        const SENSORS_ON = 1 << 6;
        const RATE_100HZ = 1 << 5;
        const RATE_25HZ  = 1 << 4;
        /// Always set by the host when configuring.
        const HOST_SETUP = 1 << 3;
    }
}

bitflags::bitflags! {
    /// Parameter 1: data output and formatting.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DataOutput: u8 {
        const FORMAT_QUATERNION = 1 << 2;
        const OUTPUT_ENABLED    = 1 << 0;
    }
}

bitflags::bitflags! {
    /// Parameter 3: compass control.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CompassControl: u8 {
        const COMPASS_ON        = 1 << 4;
        const CENTRAL_PULL_OFF  = 1 << 3;
        const FORCE_CALIBRATION = 1 << 2;
    }
}

/// Supported Supperware update rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshRate {
    Hz25,
    #[default]
    Hz50,
    Hz100,
}

impl RefreshRate {
    pub fn from_hz(hz: u32) -> Result<RefreshRate> {
        match hz {
            25 => Ok(RefreshRate::Hz25),
            50 => Ok(RefreshRate::Hz50),
            100 => Ok(RefreshRate::Hz100),
            other => Err(HeadTrackerError::invalid(format!(
                "refresh rate must be 25, 50 or 100 Hz, got {}",
                other
            ))),
        }
    }

    pub fn hz(&self) -> u32 {
        match self {
            RefreshRate::Hz25 => 25,
            RefreshRate::Hz50 => 50,
            RefreshRate::Hz100 => 100,
        }
    }

    fn flags(&self) -> SensorSetup {
        match self {
            RefreshRate::Hz25 => SensorSetup::RATE_25HZ,
            RefreshRate::Hz50 => SensorSetup::empty(),
            RefreshRate::Hz100 => SensorSetup::RATE_100HZ,
        }
    }
}

/// Gesture recognition setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gestures {
    /// Leave the device setting untouched.
    #[default]
    Preserve,
    On,
    Off,
}

/// Side of the head the tracker cable leaves from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Chirality {
    #[default]
    Preserve,
    Left,
    Right,
}

/// Compass state reported by the Supperware tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompassStatus {
    #[default]
    Off,
    Calibrating,
    Calibrated,
    Poor,
}

impl CompassStatus {
    fn from_byte(b: u8) -> Option<CompassStatus> {
        match b {
            0 => Some(CompassStatus::Off),
            1 => Some(CompassStatus::Calibrating),
            2 => Some(CompassStatus::Calibrated),
            3 => Some(CompassStatus::Poor),
            _ => None,
        }
    }
}

/// Everything that goes into the Supperware configuration message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupperwareSetup {
    pub refresh_rate: RefreshRate,
    pub format: OrientFormat,
    pub compass_on: bool,
    pub force_calibration: bool,
    /// Yaw pull-back rate in deg/s, `None` to disable.
    pub central_pull: Option<f64>,
    pub gestures: Gestures,
    pub chirality: Chirality,
}

/// Encode a central pull rate (deg/s) as its parameter byte.
pub fn central_pull_byte(rate: f64) -> Result<u8> {
    let steps = (rate / CENTRAL_PULL_STEP).round() - 1.0;
    if !steps.is_finite() || !(0.0..=127.0).contains(&steps) {
        return Err(HeadTrackerError::invalid(format!(
            "central pull rate must be within 0.05..=6.4 deg/s, got {}",
            rate
        )));
    }
    Ok(steps as u8)
}

/// Build the SysEx that configures and starts the Supperware stream.
///
/// Layout: `F0 00 21 42 (param value)* F7`. Parameter 4 is only sent when
/// gestures or chirality change; parameter 6 only with central pull on.
pub fn build_open_sysex(setup: &SupperwareSetup) -> Result<Vec<u8>> {
    let mut msg = vec![SYSEX_START];
    msg.extend_from_slice(&SUPPERWARE_ID);

    let sensors = SensorSetup::SENSORS_ON | SensorSetup::HOST_SETUP | setup.refresh_rate.flags();
    msg.extend_from_slice(&[PARAM_SENSOR_SETUP, sensors.bits()]);

    let output = DataOutput::OUTPUT_ENABLED
        | match setup.format {
            OrientFormat::Ypr => DataOutput::empty(),
            OrientFormat::Quaternion => DataOutput::FORMAT_QUATERNION,
        };
    msg.extend_from_slice(&[PARAM_DATA_OUTPUT, output.bits()]);

    let mut compass = CompassControl::empty();
    compass.set(CompassControl::COMPASS_ON, setup.compass_on);
    compass.set(CompassControl::CENTRAL_PULL_OFF, setup.central_pull.is_none());
    compass.set(CompassControl::FORCE_CALIBRATION, setup.force_calibration);
    msg.extend_from_slice(&[PARAM_COMPASS, compass.bits()]);

    if setup.gestures != Gestures::Preserve || setup.chirality != Chirality::Preserve {
        let gestures: u8 = match setup.gestures {
            Gestures::Preserve => 0b000,
            Gestures::Off => 0b100,
            Gestures::On => 0b110,
        };
        let chirality: u8 = match setup.chirality {
            Chirality::Preserve => 0b00,
            Chirality::Right => 0b01,
            Chirality::Left => 0b10,
        };
        msg.extend_from_slice(&[PARAM_GESTURES, (gestures << 2) | chirality]);
    }

    if let Some(rate) = setup.central_pull {
        msg.extend_from_slice(&[PARAM_CENTRAL_PULL, central_pull_byte(rate)?]);
    }

    msg.push(SYSEX_END);
    Ok(msg)
}

/// A decoded Supperware device-to-host message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SupperwareEvent {
    Orientation(Quaternion),
    Compass(CompassStatus),
}

/// Decode a signed 14-bit value sent as two 7-bit bytes (MSB first).
fn read_i14(msb: u8, lsb: u8) -> i32 {
    let raw = (i32::from(msb & 0x7F) << 7) | i32::from(lsb & 0x7F);
    if raw >= 0x2000 {
        raw - 0x4000
    } else {
        raw
    }
}

fn write_i14(value: i32) -> [u8; 2] {
    let raw = value.clamp(-0x2000, 0x1FFF).rem_euclid(0x4000);
    [((raw >> 7) & 0x7F) as u8, (raw & 0x7F) as u8]
}

/// Parse a Supperware SysEx payload (bytes between `F0` and `F7`).
///
/// Returns `None` for other manufacturers, unknown message types and
/// malformed data.
pub fn parse_supperware(payload: &[u8]) -> Option<SupperwareEvent> {
    if payload.len() < 5 || payload[..3] != SUPPERWARE_ID {
        return None;
    }

    match payload[3] {
        MSG_ORIENTATION => {
            let words: Vec<i32> = payload[5..]
                .chunks_exact(2)
                .map(|pair| read_i14(pair[0], pair[1]))
                .collect();
            match (payload[4], words.as_slice()) {
                (FORMAT_YPR, [yaw, pitch, roll]) => {
                    let scale = |v: &i32| f64::from(*v) / YPR_SCALE;
                    Ypr::from_radians(scale(yaw), scale(pitch), scale(roll))
                        .ok()
                        .map(|ypr| SupperwareEvent::Orientation(ypr.to_quaternion()))
                }
                (FORMAT_QUATERNION, [w, x, y, z]) => {
                    let scale = |v: &i32| f64::from(*v) / QUATERNION_SCALE;
                    Quaternion::new(scale(w), scale(x), scale(y), scale(z))
                        .ok()
                        .map(SupperwareEvent::Orientation)
                }
                _ => None,
            }
        }
        MSG_COMPASS_STATUS => CompassStatus::from_byte(payload[4]).map(SupperwareEvent::Compass),
        _ => None,
    }
}

/// Encode an orientation the way the Supperware tracker streams it.
pub fn encode_supperware_orientation(q: &Quaternion, format: OrientFormat) -> Vec<u8> {
    let mut msg = vec![SYSEX_START];
    msg.extend_from_slice(&SUPPERWARE_ID);
    msg.push(MSG_ORIENTATION);
    match format {
        OrientFormat::Ypr => {
            msg.push(FORMAT_YPR);
            for angle in q.to_ypr().to_radians() {
                msg.extend_from_slice(&write_i14((angle * YPR_SCALE).round() as i32));
            }
        }
        OrientFormat::Quaternion => {
            msg.push(FORMAT_QUATERNION);
            for c in q.to_array() {
                msg.extend_from_slice(&write_i14((c * QUATERNION_SCALE).round() as i32));
            }
        }
    }
    msg.push(SYSEX_END);
    msg
}

// -- MrHeadTracker 14-bit control changes --
/// MSB controllers for the w, x, y, z slots.
pub const MRHT_CC_MSB: [u8; 4] = [16, 17, 18, 19];
/// LSB controllers for the w, x, y, z slots.
pub const MRHT_CC_LSB: [u8; 4] = [48, 49, 50, 51];
/// In YPR mode the slots carry angles normalized to +-1 half turn.
pub const MRHT_ANGLE_SCALE: f64 = 180.0;

/// Reassembles MrHeadTracker orientation from a stream of control changes.
///
/// A component is complete when its LSB arrives after an MSB. Once every
/// slot the format needs is complete, one orientation is emitted and the
/// slots are reset.
#[derive(Debug, Clone)]
pub struct MrHeadTrackerDecoder {
    format: OrientFormat,
    msb: [Option<u8>; 4],
    values: [Option<f64>; 4],
}

impl MrHeadTrackerDecoder {
    pub fn new(format: OrientFormat) -> Self {
        Self {
            format,
            msb: [None; 4],
            values: [None; 4],
        }
    }

    fn slots(&self) -> usize {
        match self.format {
            OrientFormat::Quaternion => 4,
            OrientFormat::Ypr => 3,
        }
    }

    /// Feed one control change; returns an orientation once complete.
    pub fn feed(&mut self, control: u8, value: u8) -> Option<Quaternion> {
        if let Some(slot) = MRHT_CC_MSB.iter().position(|&cc| cc == control) {
            self.msb[slot] = Some(value & 0x7F);
            return None;
        }

        let slot = MRHT_CC_LSB.iter().position(|&cc| cc == control)?;
        let msb = self.msb[slot]?;
        let raw = u32::from(msb) * 128 + u32::from(value & 0x7F);
        self.values[slot] = Some(f64::from(raw) / 8192.0 - 1.0);

        let n = self.slots();
        if self.values[..n].iter().any(Option::is_none) {
            return None;
        }
        let v: Vec<f64> = self.values[..n].iter().flatten().copied().collect();
        self.values = [None; 4];

        let decoded = match self.format {
            // Slots hold roll, pitch, yaw.
            OrientFormat::Ypr => Ypr::new(
                v[2] * MRHT_ANGLE_SCALE,
                v[1] * MRHT_ANGLE_SCALE,
                v[0] * MRHT_ANGLE_SCALE,
            )
            .map(|ypr| ypr.to_quaternion()),
            OrientFormat::Quaternion => Quaternion::new(v[0], v[1], v[2], v[3]),
        };
        match decoded {
            Ok(q) => Some(q),
            Err(e) => {
                log::warn!("Dropping MrHeadTracker sample: {}", e);
                None
            }
        }
    }
}

fn encode_mrheadtracker_slots(values: &[f64]) -> Vec<[u8; 3]> {
    let mut out = Vec::with_capacity(values.len() * 2);
    for (slot, v) in values.iter().enumerate() {
        let raw = (((v + 1.0) * 8192.0).round() as i64).clamp(0, 0x3FFF) as u16;
        out.push([STATUS_CONTROL_CHANGE, MRHT_CC_MSB[slot], (raw >> 7) as u8]);
        out.push([STATUS_CONTROL_CHANGE, MRHT_CC_LSB[slot], (raw & 0x7F) as u8]);
    }
    out
}

/// Encode a quaternion as the MrHeadTracker control-change sequence.
pub fn encode_mrheadtracker_quaternion(q: &Quaternion) -> Vec<[u8; 3]> {
    encode_mrheadtracker_slots(&q.to_array())
}

/// Encode an orientation in MrHeadTracker YPR mode (roll, pitch, yaw slots).
pub fn encode_mrheadtracker_ypr(ypr: &Ypr) -> Vec<[u8; 3]> {
    encode_mrheadtracker_slots(&[
        ypr.roll() / MRHT_ANGLE_SCALE,
        ypr.pitch() / MRHT_ANGLE_SCALE,
        ypr.yaw() / MRHT_ANGLE_SCALE,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_setup() -> SupperwareSetup {
        SupperwareSetup {
            refresh_rate: RefreshRate::Hz50,
            format: OrientFormat::Quaternion,
            compass_on: true,
            force_calibration: false,
            central_pull: None,
            gestures: Gestures::Preserve,
            chirality: Chirality::Preserve,
        }
    }

    #[test]
    fn test_open_sysex_default() {
        let msg = build_open_sysex(&default_setup()).unwrap();
        assert_eq!(
            msg,
            vec![
                0xF0, 0x00, 0x21, 0x42,
                PARAM_SENSOR_SETUP, 0b100_1000,
                PARAM_DATA_OUTPUT, 0b000_0101,
                PARAM_COMPASS, 0b001_1000,
                0xF7,
            ]
        );
    }

    #[test]
    fn test_open_sysex_all_options() {
        let setup = SupperwareSetup {
            refresh_rate: RefreshRate::Hz100,
            format: OrientFormat::Ypr,
            compass_on: false,
            force_calibration: true,
            central_pull: Some(0.3),
            gestures: Gestures::On,
            chirality: Chirality::Left,
        };
        let msg = build_open_sysex(&setup).unwrap();
        assert_eq!(
            msg,
            vec![
                0xF0, 0x00, 0x21, 0x42,
                PARAM_SENSOR_SETUP, 0b110_1000,
                PARAM_DATA_OUTPUT, 0b000_0001,
                PARAM_COMPASS, 0b000_0100,
                PARAM_GESTURES, 0b001_1010,
                PARAM_CENTRAL_PULL, 5,
                0xF7,
            ]
        );
    }

    #[test]
    fn test_data_output_flags_all_reachable() {
        let mut seen = DataOutput::empty();
        for format in [OrientFormat::Ypr, OrientFormat::Quaternion] {
            let setup = SupperwareSetup { format, ..default_setup() };
            let msg = build_open_sysex(&setup).unwrap();
            assert_eq!(msg[6], PARAM_DATA_OUTPUT);
            seen |= DataOutput::from_bits(msg[7]).unwrap();
        }
        assert_eq!(seen, DataOutput::all());
    }

    #[test]
    fn test_refresh_rate_validation() {
        assert_eq!(RefreshRate::from_hz(25).unwrap(), RefreshRate::Hz25);
        assert_eq!(RefreshRate::from_hz(100).unwrap().hz(), 100);
        assert!(matches!(
            RefreshRate::from_hz(60),
            Err(HeadTrackerError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_central_pull_range() {
        assert_eq!(central_pull_byte(0.05).unwrap(), 0);
        assert_eq!(central_pull_byte(6.4).unwrap(), 127);
        assert!(central_pull_byte(0.0).is_err());
        assert!(central_pull_byte(7.0).is_err());
        assert!(central_pull_byte(f64::NAN).is_err());
    }

    #[test]
    fn test_i14_sign_handling() {
        assert_eq!(read_i14(0x00, 0x01), 1);
        assert_eq!(read_i14(0x7F, 0x7F), -1);
        assert_eq!(read_i14(0x40, 0x00), -8192);
        assert_eq!(write_i14(-1), [0x7F, 0x7F]);
        assert_eq!(write_i14(8191), [0x3F, 0x7F]);
    }

    #[test]
    fn test_parse_supperware_quaternion() {
        let q = Ypr::new(30.0, -10.0, 5.0).unwrap().to_quaternion();
        let msg = encode_supperware_orientation(&q, OrientFormat::Quaternion);
        let payload = &msg[1..msg.len() - 1];
        match parse_supperware(payload) {
            Some(SupperwareEvent::Orientation(decoded)) => assert!(decoded.same_rotation(&q, 0.05)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_supperware_ypr() {
        let q = Ypr::new(-120.0, 20.0, 60.0).unwrap().to_quaternion();
        let msg = encode_supperware_orientation(&q, OrientFormat::Ypr);
        match parse_supperware(&msg[1..msg.len() - 1]) {
            Some(SupperwareEvent::Orientation(decoded)) => assert!(decoded.same_rotation(&q, 0.1)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_supperware_compass_and_foreign() {
        assert_eq!(
            parse_supperware(&[0x00, 0x21, 0x42, MSG_COMPASS_STATUS, 2]),
            Some(SupperwareEvent::Compass(CompassStatus::Calibrated))
        );
        assert_eq!(parse_supperware(&[0x00, 0x21, 0x42, MSG_COMPASS_STATUS, 9]), None);
        assert_eq!(parse_supperware(&[0x00, 0x20, 0x42, MSG_ORIENTATION, 0]), None);
        // Truncated quaternion
        assert_eq!(
            parse_supperware(&[0x00, 0x21, 0x42, MSG_ORIENTATION, FORMAT_QUATERNION, 0x20, 0x00]),
            None
        );
    }

    #[test]
    fn test_mrheadtracker_decoder_quaternion() {
        let q = Ypr::new(45.0, 10.0, -20.0).unwrap().to_quaternion();
        let mut decoder = MrHeadTrackerDecoder::new(OrientFormat::Quaternion);
        let mut out = None;
        for [_, cc, value] in encode_mrheadtracker_quaternion(&q) {
            if let Some(decoded) = decoder.feed(cc, value) {
                out = Some(decoded);
            }
        }
        assert!(out.unwrap().same_rotation(&q, 0.05));
    }

    #[test]
    fn test_mrheadtracker_decoder_ypr_slots() {
        let ypr = Ypr::new(90.0, -30.0, 15.0).unwrap();
        let mut decoder = MrHeadTrackerDecoder::new(OrientFormat::Ypr);
        let mut out = None;
        for [_, cc, value] in encode_mrheadtracker_ypr(&ypr) {
            if let Some(decoded) = decoder.feed(cc, value) {
                out = Some(decoded);
            }
        }
        let decoded = out.unwrap().to_ypr();
        assert!((decoded.yaw() - 90.0).abs() < 0.1);
        assert!((decoded.pitch() + 30.0).abs() < 0.1);
        assert!((decoded.roll() - 15.0).abs() < 0.1);
    }

    #[test]
    fn test_mrheadtracker_decoder_needs_msb_first() {
        let mut decoder = MrHeadTrackerDecoder::new(OrientFormat::Quaternion);
        // LSBs without MSBs are ignored.
        for cc in MRHT_CC_LSB {
            assert_eq!(decoder.feed(cc, 0), None);
        }
        // Unrelated controllers are ignored.
        assert_eq!(decoder.feed(7, 100), None);
    }
}
