use crate::hmd::{HmdTracker, PoseRuntime};
use crate::landmark::{LandmarkSource, LandmarkTracker};
use crate::midi::MidiBackend;
use crate::midi_driver::MidiTracker;
use crate::types::{OrientFormat, Pose, Sample};
use crate::{HeadTrackerError, Result};
use std::time::{Duration, Instant};

/// Default bound on how long `zero()` waits for a fresh sample.
pub const DEFAULT_ZERO_TIMEOUT: Duration = Duration::from_secs(1);

/// Sleep between polls while `zero()` waits for a sample.
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Lifecycle state of a device. Construction yields `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Closed,
    Open,
}

/// Identifies one predicted render frame and view of an HMD.
///
/// Poses are only valid for the frame they were predicted for, so HMD reads
/// take a token instead of being free-running polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameToken {
    /// Predicted display time in the runtime's clock, nanoseconds.
    pub predicted_display_time_ns: i64,
    /// Eye/view index within the frame.
    pub view_index: u32,
}

/// Common contract of every head-tracker driver.
///
/// `read_*` never block: `Ok(None)` means "no new sample yet, try again".
/// Everything except `open`/`close` fails with `NotOpen` outside the `Open`
/// state.
pub trait HeadTracker {
    /// Per-read context: `()` for poll-driven devices, `FrameToken` for HMDs.
    type Frame: Copy;

    fn name(&self) -> &str;

    fn orient_format(&self) -> OrientFormat;

    fn state(&self) -> DeviceState;

    fn is_open(&self) -> bool {
        self.state() == DeviceState::Open
    }

    /// Connect to the device. A failed open leaves the device `Closed`.
    fn open(&mut self) -> Result<()>;

    /// Release the connection. No-op when already closed.
    fn close(&mut self);

    /// Capture the current raw pose as the new reference frame.
    fn zero(&mut self) -> Result<()>;

    /// Latest rebased orientation and position derived from one raw sample.
    fn read_pose(&mut self, frame: Self::Frame) -> Result<Option<Pose>>;

    fn read_orientation(&mut self, frame: Self::Frame) -> Result<Option<Sample>> {
        Ok(self.read_pose(frame)?.and_then(|pose| pose.orientation))
    }

    fn read_position(&mut self, frame: Self::Frame) -> Result<Option<Sample>> {
        Ok(self
            .read_pose(frame)?
            .and_then(|pose| pose.position)
            .map(Sample::Position))
    }
}

/// Find `requested` among the enumerated `available` device names.
///
/// Matching is exact: platforms append an index to MIDI port names, so
/// `"HT1"` does not open `"HT1 1"`. The error lists every candidate so the
/// caller can correct the name.
pub fn find_device(requested: &str, available: &[String]) -> Result<String> {
    available
        .iter()
        .find(|name| name.as_str() == requested)
        .cloned()
        .ok_or_else(|| HeadTrackerError::DeviceNotFound {
            requested: requested.to_string(),
            available: available.to_vec(),
        })
}

pub(crate) fn ensure_open(state: DeviceState) -> Result<()> {
    match state {
        DeviceState::Open => Ok(()),
        DeviceState::Closed => Err(HeadTrackerError::NotOpen),
    }
}

/// Poll until `poll` yields a value or `timeout` elapses.
///
/// `poll` is always called at least once, so a zero timeout is a single
/// attempt.
pub(crate) fn wait_for<T>(
    timeout: Duration,
    mut poll: impl FnMut() -> Result<Option<T>>,
) -> Result<T> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = poll()? {
            return Ok(value);
        }
        if Instant::now() >= deadline {
            return Err(HeadTrackerError::NoDataAvailable(timeout));
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Any supported tracker, dispatched statically over the known families.
pub enum Tracker<M: MidiBackend, L: LandmarkSource, R: PoseRuntime> {
    Midi(MidiTracker<M>),
    Landmark(LandmarkTracker<L>),
    Hmd(HmdTracker<R>),
}

impl<M: MidiBackend, L: LandmarkSource, R: PoseRuntime> Tracker<M, L, R> {
    pub fn name(&self) -> &str {
        match self {
            Tracker::Midi(t) => t.name(),
            Tracker::Landmark(t) => t.name(),
            Tracker::Hmd(t) => t.name(),
        }
    }

    pub fn orient_format(&self) -> OrientFormat {
        match self {
            Tracker::Midi(t) => t.orient_format(),
            Tracker::Landmark(t) => t.orient_format(),
            Tracker::Hmd(t) => t.orient_format(),
        }
    }

    pub fn state(&self) -> DeviceState {
        match self {
            Tracker::Midi(t) => t.state(),
            Tracker::Landmark(t) => t.state(),
            Tracker::Hmd(t) => t.state(),
        }
    }

    /// True for families that report translation.
    pub fn has_position(&self) -> bool {
        !matches!(self, Tracker::Midi(_))
    }

    pub fn open(&mut self) -> Result<()> {
        match self {
            Tracker::Midi(t) => t.open(),
            Tracker::Landmark(t) => t.open(),
            Tracker::Hmd(t) => t.open(),
        }
    }

    pub fn close(&mut self) {
        match self {
            Tracker::Midi(t) => t.close(),
            Tracker::Landmark(t) => t.close(),
            Tracker::Hmd(t) => t.close(),
        }
    }

    pub fn zero(&mut self) -> Result<()> {
        match self {
            Tracker::Midi(t) => t.zero(),
            Tracker::Landmark(t) => t.zero(),
            Tracker::Hmd(t) => t.zero(),
        }
    }

    /// Read a pose. `frame` is ignored by poll-driven families; an HMD without
    /// a frame token has nothing to locate and yields `Ok(None)`.
    pub fn read_pose(&mut self, frame: Option<FrameToken>) -> Result<Option<Pose>> {
        match self {
            Tracker::Midi(t) => t.read_pose(()),
            Tracker::Landmark(t) => t.read_pose(()),
            Tracker::Hmd(t) => match frame {
                Some(token) => t.read_pose(token),
                None => {
                    ensure_open(t.state())?;
                    Ok(None)
                }
            },
        }
    }

    pub fn read_orientation(&mut self, frame: Option<FrameToken>) -> Result<Option<Sample>> {
        match self {
            Tracker::Midi(t) => t.read_orientation(()),
            Tracker::Landmark(t) => t.read_orientation(()),
            Tracker::Hmd(t) => match frame {
                Some(token) => t.read_orientation(token),
                None => {
                    ensure_open(t.state())?;
                    Ok(None)
                }
            },
        }
    }

    pub fn read_position(&mut self, frame: Option<FrameToken>) -> Result<Option<Sample>> {
        match self {
            Tracker::Midi(t) => t.read_position(()),
            Tracker::Landmark(t) => t.read_position(()),
            Tracker::Hmd(t) => match frame {
                Some(token) => t.read_position(token),
                None => {
                    ensure_open(t.state())?;
                    Ok(None)
                }
            },
        }
    }
}
