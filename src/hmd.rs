//! Head pose from an XR runtime (OpenXR or similar).
//!
//! HMD poses are predicted per render frame, so every read names the frame
//! it is for with a `FrameToken`.

use crate::device::{ensure_open, find_device, DeviceState, FrameToken, HeadTracker};
use crate::reference::ReferenceFrame;
use crate::rotation::FrameMap;
use crate::types::{OrientFormat, Pose, Position, Quaternion};
use crate::{HeadTrackerError, Result};
use std::time::Duration;

/// Runtime frame (x right, y up, z backward) to canonical frame:
/// forward = -z, left = -x, up = y.
pub const RUNTIME_FRAME: FrameMap = FrameMap::from_rows([[0, 0, -1], [-1, 0, 0], [0, 1, 0]]);

/// Head pose as the runtime reports it, in the runtime's frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawPose {
    /// `[w, x, y, z]`
    pub orientation: [f64; 4],
    /// Meters.
    pub position: [f64; 3],
}

/// The vendor XR runtime.
pub trait PoseRuntime {
    /// Names of the systems (headsets) the runtime can drive.
    fn systems(&self) -> Result<Vec<String>>;

    fn begin_session(&mut self, system: &str) -> Result<()>;

    fn end_session(&mut self);

    /// Head pose predicted for `frame`. `None` when the runtime flags the
    /// orientation or position as invalid for that frame.
    fn locate_head(&mut self, frame: FrameToken) -> Result<Option<RawPose>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HmdOptions {
    pub system: String,
    pub orient_format: OrientFormat,
}

impl HmdOptions {
    pub fn new(system: impl Into<String>, orient_format: OrientFormat) -> Self {
        Self {
            system: system.into(),
            orient_format,
        }
    }
}

/// Head tracker backed by an HMD runtime.
pub struct HmdTracker<R: PoseRuntime> {
    runtime: R,
    options: HmdOptions,
    reference: ReferenceFrame,
    state: DeviceState,
    last_frame: Option<FrameToken>,
    zero_pending: bool,
}

impl<R: PoseRuntime> HmdTracker<R> {
    pub fn new(runtime: R, options: HmdOptions) -> Self {
        Self {
            runtime,
            options,
            reference: ReferenceFrame::new(),
            state: DeviceState::Closed,
            last_frame: None,
            zero_pending: false,
        }
    }

    pub fn reference(&self) -> &ReferenceFrame {
        &self.reference
    }

    /// Most recent frame token passed to a read.
    pub fn last_frame(&self) -> Option<FrameToken> {
        self.last_frame
    }

    /// Capture the zero from the next valid pose read instead of now.
    pub fn zero_on_next_frame(&mut self) -> Result<()> {
        ensure_open(self.state)?;
        self.zero_pending = true;
        Ok(())
    }

    fn locate(&mut self, frame: FrameToken) -> Result<Option<(Quaternion, Position)>> {
        let Some(raw) = self.runtime.locate_head(frame)? else {
            log::trace!("no valid head pose for {:?}", frame);
            return Ok(None);
        };
        let orientation = RUNTIME_FRAME.map_rotation(&Quaternion::from_array(raw.orientation)?);
        let [x, y, z] = RUNTIME_FRAME.map_vector(raw.position);
        Ok(Some((orientation, Position::try_new(x, y, z)?)))
    }
}

impl<R: PoseRuntime> HeadTracker for HmdTracker<R> {
    type Frame = FrameToken;

    fn name(&self) -> &str {
        &self.options.system
    }

    fn orient_format(&self) -> OrientFormat {
        self.options.orient_format
    }

    fn state(&self) -> DeviceState {
        self.state
    }

    fn open(&mut self) -> Result<()> {
        if self.state == DeviceState::Open {
            return Ok(());
        }
        let systems = self.runtime.systems()?;
        log::debug!("XR systems: {:?}", systems);
        let system = find_device(&self.options.system, &systems)?;
        self.runtime.begin_session(&system)?;
        self.last_frame = None;
        self.zero_pending = false;
        self.state = DeviceState::Open;
        log::info!("Opened XR session on '{}'", system);
        Ok(())
    }

    fn close(&mut self) {
        if self.state == DeviceState::Closed {
            return;
        }
        self.runtime.end_session();
        self.state = DeviceState::Closed;
        log::info!("Closed XR session on '{}'", self.options.system);
    }

    /// Zero on the pose of the most recently read frame. Fails with
    /// `NoDataAvailable` before the first read or if that pose is invalid.
    fn zero(&mut self) -> Result<()> {
        ensure_open(self.state)?;
        let frame = self
            .last_frame
            .ok_or(HeadTrackerError::NoDataAvailable(Duration::ZERO))?;
        let (orientation, position) = self
            .locate(frame)?
            .ok_or(HeadTrackerError::NoDataAvailable(Duration::ZERO))?;
        self.reference.set_zero(orientation, Some(position));
        log::info!("Zeroed '{}' at {:?}", self.options.system, frame);
        Ok(())
    }

    fn read_pose(&mut self, frame: FrameToken) -> Result<Option<Pose>> {
        ensure_open(self.state)?;
        self.last_frame = Some(frame);
        let Some((orientation, position)) = self.locate(frame)? else {
            return Ok(None);
        };

        if self.zero_pending {
            self.reference.set_zero(orientation, Some(position));
            self.zero_pending = false;
            log::info!("Zeroed '{}' at {:?}", self.options.system, frame);
        }

        Ok(Some(Pose {
            orientation: Some(
                self.options
                    .orient_format
                    .sample(self.reference.apply(&orientation)),
            ),
            position: Some(self.reference.apply_position(&position)),
        }))
    }
}

impl<R: PoseRuntime> Drop for HmdTracker<R> {
    fn drop(&mut self) {
        self.close();
    }
}
