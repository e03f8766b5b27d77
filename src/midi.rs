//! MIDI port seam.
//!
//! The crate does not talk to an OS MIDI API itself. A `MidiBackend`
//! enumerates and opens ports; opened ports are owned by the driver and
//! released when dropped. Port names are matched exactly, see
//! `find_device`. Callback-driven MIDI libraries can feed a `ChannelInput`
//! from their callback.

use crate::Result;
use crossbeam_channel::{Receiver, Sender};

/// Access to the platform's MIDI ports.
pub trait MidiBackend {
    type Input: MidiInput;
    type Output: MidiOutput;

    /// Names of all input ports, as the platform reports them
    /// (usually with an appended index, e.g. `"Head Tracker 1"`).
    fn input_ports(&self) -> Result<Vec<String>>;

    fn output_ports(&self) -> Result<Vec<String>>;

    /// Open an input port by exact name. Returns `DeviceUnavailable` if the
    /// port is claimed by another process.
    fn open_input(&mut self, port: &str) -> Result<Self::Input>;

    fn open_output(&mut self, port: &str) -> Result<Self::Output>;
}

/// An open input port. `poll` never blocks.
pub trait MidiInput {
    /// Next pending raw MIDI message, if any.
    fn poll(&mut self) -> Option<Vec<u8>>;
}

/// An open output port.
pub trait MidiOutput {
    fn send(&mut self, message: &[u8]) -> Result<()>;
}

pub const STATUS_CONTROL_CHANGE: u8 = 0xB0;
pub const SYSEX_START: u8 = 0xF0;
pub const SYSEX_END: u8 = 0xF7;

/// A decoded MIDI message. Only what the trackers send is distinguished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiMessage {
    ControlChange { channel: u8, control: u8, value: u8 },
    /// Payload between `F0` and `F7`.
    SysEx(Vec<u8>),
    Other(u8),
}

impl MidiMessage {
    /// Parse one complete raw message. Running status is not supported.
    pub fn parse(bytes: &[u8]) -> Option<MidiMessage> {
        let (&status, data) = bytes.split_first()?;
        if status & 0x80 == 0 {
            return None;
        }

        if status & 0xF0 == STATUS_CONTROL_CHANGE {
            if data.len() < 2 || data[0] & 0x80 != 0 || data[1] & 0x80 != 0 {
                return None;
            }
            return Some(MidiMessage::ControlChange {
                channel: status & 0x0F,
                control: data[0],
                value: data[1],
            });
        }

        if status == SYSEX_START {
            let (&last, payload) = data.split_last()?;
            if last != SYSEX_END || payload.iter().any(|b| b & 0x80 != 0) {
                return None;
            }
            return Some(MidiMessage::SysEx(payload.to_vec()));
        }

        Some(MidiMessage::Other(status))
    }

    /// Raw bytes for sending.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            MidiMessage::ControlChange {
                channel,
                control,
                value,
            } => vec![STATUS_CONTROL_CHANGE | (channel & 0x0F), control & 0x7F, value & 0x7F],
            MidiMessage::SysEx(payload) => {
                let mut out = Vec::with_capacity(payload.len() + 2);
                out.push(SYSEX_START);
                out.extend_from_slice(payload);
                out.push(SYSEX_END);
                out
            }
            MidiMessage::Other(status) => vec![*status],
        }
    }
}

/// Input port fed through a bounded channel. Clones share one queue.
#[derive(Clone)]
pub struct ChannelInput {
    receiver: Receiver<Vec<u8>>,
}

/// Sending half of a `ChannelInput`, handed to a MIDI callback.
#[derive(Clone)]
pub struct ChannelSender {
    sender: Sender<Vec<u8>>,
}

/// Create a connected sender/input pair holding at most `capacity` messages.
pub fn channel_input(capacity: usize) -> (ChannelSender, ChannelInput) {
    let (sender, receiver) = crossbeam_channel::bounded(capacity);
    (ChannelSender { sender }, ChannelInput { receiver })
}

impl ChannelSender {
    /// Queue a raw message. Returns false if it was dropped because the
    /// channel is full or the input was closed.
    pub fn send(&self, message: &[u8]) -> bool {
        match self.sender.try_send(message.to_vec()) {
            Ok(()) => true,
            Err(crossbeam_channel::TrySendError::Full(_)) => {
                log::trace!("MIDI input channel full, dropping message");
                false
            }
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => false,
        }
    }
}

impl MidiInput for ChannelInput {
    fn poll(&mut self) -> Option<Vec<u8>> {
        self.receiver.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_control_change() {
        assert_eq!(
            MidiMessage::parse(&[0xB3, 48, 100]),
            Some(MidiMessage::ControlChange {
                channel: 3,
                control: 48,
                value: 100
            })
        );
        assert_eq!(MidiMessage::parse(&[0xB0, 48]), None);
        assert_eq!(MidiMessage::parse(&[0xB0, 0x80, 1]), None);
    }

    #[test]
    fn test_parse_sysex() {
        assert_eq!(
            MidiMessage::parse(&[0xF0, 0x00, 0x21, 0x42, 0xF7]),
            Some(MidiMessage::SysEx(vec![0x00, 0x21, 0x42]))
        );
        // Unterminated
        assert_eq!(MidiMessage::parse(&[0xF0, 0x00, 0x21]), None);
        assert_eq!(MidiMessage::parse(&[0xF0]), None);
    }

    #[test]
    fn test_parse_other_and_garbage() {
        assert_eq!(MidiMessage::parse(&[0x90, 60, 100]), Some(MidiMessage::Other(0x90)));
        assert_eq!(MidiMessage::parse(&[0x10, 0x20]), None);
        assert_eq!(MidiMessage::parse(&[]), None);
    }

    #[test]
    fn test_channel_input_drops_when_full() {
        let (tx, mut rx) = channel_input(2);
        assert!(tx.send(&[0xB0, 1, 1]));
        assert!(tx.send(&[0xB0, 1, 2]));
        assert!(!tx.send(&[0xB0, 1, 3]));
        assert_eq!(rx.poll(), Some(vec![0xB0, 1, 1]));
        assert_eq!(rx.poll(), Some(vec![0xB0, 1, 2]));
        assert_eq!(rx.poll(), None);

        drop(rx);
        assert!(!tx.send(&[0xB0, 1, 4]));
    }
}
