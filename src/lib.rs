//! # headtracker - head tracking for spatial audio
//!
//! One orientation/position model for MIDI inertial trackers (Supperware
//! Head Tracker 1, IEM MrHeadTracker), camera face-landmark tracking and
//! XR headsets, plus an OSC relay to spatial audio renderers. Provides:
//! - Quaternion / yaw-pitch-roll conversion in one canonical frame
//!   (x forward, y left, z up)
//! - Zeroing: reads are relative to the pose captured by `zero()`
//! - A `HeadTracker` trait with an Open/Closed lifecycle per device
//! - OSC output for IEM SceneRotator, DirectivityShaper, RoomEncoder,
//!   SPARTA and TASCAR
//!
//! Hardware and the network are reached through small traits
//! (`MidiBackend`, `LandmarkSource`, `PoseRuntime`, `Transport`).
//!
//! ## Quick Start
//! ```no_run
//! use headtracker::{HeadTracker, MidiBackend, MidiOptions, MidiTracker, MidiVendor};
//! use headtracker::{OrientFormat, Relay, Target, UdpTransport};
//!
//! fn run<B: MidiBackend>(backend: B) -> headtracker::Result<()> {
//!     let options = MidiOptions::new(MidiVendor::Supperware, "Head Tracker 1", OrientFormat::Quaternion);
//!     let mut tracker = MidiTracker::new(backend, options)?;
//!     tracker.open()?;
//!     tracker.zero()?;
//!
//!     let transport = UdpTransport::connect("127.0.0.1:8000")?;
//!     let mut relay = Relay::new(transport, Target::SceneRotator(OrientFormat::Quaternion));
//!     loop {
//!         if let Some(sample) = tracker.read_orientation(())? {
//!             relay.send_orientation(&sample)?;
//!         }
//!     }
//! }
//! ```

pub mod error;
pub mod types;
pub mod rotation;
pub mod reference;
pub mod device;
pub mod midi;
pub mod protocol;
pub mod midi_driver;
pub mod landmark;
pub mod hmd;
pub mod osc;
pub mod relay;

#[cfg(test)]
mod mock;

pub use error::HeadTrackerError;
pub use types::*;
pub use reference::ReferenceFrame;
pub use device::{DeviceState, FrameToken, HeadTracker, Tracker};
pub use midi::{MidiBackend, MidiInput, MidiOutput};
pub use midi_driver::{MidiOptions, MidiTracker, MidiVendor, OpenOptions};
pub use landmark::{LandmarkOptions, LandmarkSource, LandmarkTemplate, LandmarkTracker};
pub use hmd::{HmdOptions, HmdTracker, PoseRuntime, RawPose};
pub use relay::{AngleAdjust, Relay, RoomEncoderRole, Target, Transport, UdpTransport};

/// Result type alias for headtracker operations.
pub type Result<T> = std::result::Result<T, HeadTrackerError>;
