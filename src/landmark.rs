//! Camera head tracking from 3D face landmarks.
//!
//! A landmark estimator (a black box behind `LandmarkSource`) delivers one
//! set of 3D points per camera frame, ordered like the `LandmarkTemplate`.
//! The head pose is the rigid transform that best maps the template onto
//! the observed points.
//!
//! Estimator frame: x image-right, y up, z toward the camera, meters.

use crate::device::{ensure_open, find_device, wait_for, DeviceState, HeadTracker, DEFAULT_ZERO_TIMEOUT};
use crate::reference::ReferenceFrame;
use crate::rotation::{from_matrix3, FrameMap};
use crate::types::{OrientFormat, Pose, Position, Quaternion, Sample};
use crate::{HeadTrackerError, Result};
use nalgebra::{Matrix3, Vector3};
use std::time::Duration;

/// Estimator frame to canonical frame: forward = z, left = x, up = y.
pub const ESTIMATOR_FRAME: FrameMap = FrameMap::from_rows([[0, 0, 1], [1, 0, 0], [0, 1, 0]]);

/// Relative singular value below which a point set counts as collinear.
const DEGENERATE_RATIO: f64 = 1e-9;

/// Neutral face points: nose tip, chin, outer eye corners, mouth corners.
const DEFAULT_POINTS: [[f64; 3]; 6] = [
    [0.0, 0.0, 0.0],
    [0.0, -0.063, -0.033],
    [-0.043, 0.032, -0.026],
    [0.043, 0.032, -0.026],
    [-0.028, -0.028, -0.025],
    [0.028, -0.028, -0.025],
];

/// Producer of landmark frames, e.g. a webcam plus face landmark model.
pub trait LandmarkSource {
    /// Names of the cameras that can be started.
    fn available_cameras(&self) -> Result<Vec<String>>;

    fn start(&mut self, camera: &str) -> Result<()>;

    fn stop(&mut self);

    /// Next pending frame of landmark points, `None` if nothing new (or no
    /// face was detected). Never blocks.
    fn poll_frame(&mut self) -> Result<Option<Vec<[f64; 3]>>>;
}

/// Reference landmark positions of a neutral, camera-facing head.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkTemplate {
    points: Vec<[f64; 3]>,
}

impl LandmarkTemplate {
    /// Validate a custom template. It needs at least three finite,
    /// non-collinear points.
    pub fn new(points: Vec<[f64; 3]>) -> Result<Self> {
        fit_rigid(&points, &points)?;
        Ok(Self { points })
    }

    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl Default for LandmarkTemplate {
    fn default() -> Self {
        Self {
            points: DEFAULT_POINTS.to_vec(),
        }
    }
}

/// Rigid transform with `observed ~ rotation * template + translation`.
#[derive(Debug, Clone, Copy)]
pub struct RigidFit {
    pub rotation: Quaternion,
    pub translation: Position,
    /// Root-mean-square residual of the fit, meters.
    pub rms_error: f64,
}

fn to_vectors(points: &[[f64; 3]]) -> Vec<Vector3<f64>> {
    points.iter().map(|p| Vector3::new(p[0], p[1], p[2])).collect()
}

fn centroid(points: &[Vector3<f64>]) -> Vector3<f64> {
    points.iter().fold(Vector3::zeros(), |acc, p| acc + p) / points.len() as f64
}

/// Least-squares rotation and translation mapping `template` onto
/// `observed` (Kabsch), corrected so the result is never a reflection.
pub fn fit_rigid(template: &[[f64; 3]], observed: &[[f64; 3]]) -> Result<RigidFit> {
    if template.len() < 3 {
        return Err(HeadTrackerError::invalid(format!(
            "rigid fit needs at least 3 points, got {}",
            template.len()
        )));
    }
    if template.len() != observed.len() {
        return Err(HeadTrackerError::invalid(format!(
            "landmark count mismatch: template has {}, frame has {}",
            template.len(),
            observed.len()
        )));
    }
    if template.iter().chain(observed).flatten().any(|v| !v.is_finite()) {
        return Err(HeadTrackerError::invalid("non-finite landmark coordinate"));
    }

    let src = to_vectors(template);
    let dst = to_vectors(observed);
    let src_c = centroid(&src);
    let dst_c = centroid(&dst);

    let mut h = Matrix3::zeros();
    for (s, d) in src.iter().zip(&dst) {
        h += (s - src_c) * (d - dst_c).transpose();
    }

    let svd = h.svd(true, true);
    let mut sv: Vec<f64> = svd.singular_values.iter().copied().collect();
    sv.sort_by(|a, b| b.total_cmp(a));
    if sv[0] <= f64::EPSILON || sv[1] <= sv[0] * DEGENERATE_RATIO {
        return Err(HeadTrackerError::invalid("degenerate landmark set (collinear points)"));
    }

    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => return Err(HeadTrackerError::invalid("SVD did not converge")),
    };
    let v = v_t.transpose();
    let sign = (v * u.transpose()).determinant().signum();
    let correction = Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, sign));
    let r = v * correction * u.transpose();
    let t = dst_c - r * src_c;

    let sq_sum: f64 = src
        .iter()
        .zip(&dst)
        .map(|(s, d)| (r * s + t - d).norm_squared())
        .sum();

    Ok(RigidFit {
        rotation: from_matrix3(&r)?,
        translation: Position::new(t.x, t.y, t.z),
        rms_error: (sq_sum / src.len() as f64).sqrt(),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkOptions {
    /// Camera name as listed by `LandmarkSource::available_cameras`.
    pub camera: String,
    pub orient_format: OrientFormat,
    pub template: LandmarkTemplate,
    pub zero_timeout: Duration,
}

impl LandmarkOptions {
    pub fn new(camera: impl Into<String>, orient_format: OrientFormat) -> Self {
        Self {
            camera: camera.into(),
            orient_format,
            template: LandmarkTemplate::default(),
            zero_timeout: DEFAULT_ZERO_TIMEOUT,
        }
    }

    pub fn with_template(mut self, template: LandmarkTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_zero_timeout(mut self, timeout: Duration) -> Self {
        self.zero_timeout = timeout;
        self
    }
}

/// Camera-based head tracker reporting orientation and position.
pub struct LandmarkTracker<S: LandmarkSource> {
    source: S,
    options: LandmarkOptions,
    reference: ReferenceFrame,
    state: DeviceState,
    /// Latest fitted raw pose, shared by orientation and position reads.
    latest: Option<(Quaternion, Position)>,
    orientation_fresh: bool,
    position_fresh: bool,
}

impl<S: LandmarkSource> LandmarkTracker<S> {
    pub fn new(source: S, options: LandmarkOptions) -> Result<Self> {
        if options.camera.trim().is_empty() {
            return Err(HeadTrackerError::invalid("camera name must not be empty"));
        }
        Ok(Self {
            source,
            options,
            reference: ReferenceFrame::new(),
            state: DeviceState::Closed,
            latest: None,
            orientation_fresh: false,
            position_fresh: false,
        })
    }

    pub fn reference(&self) -> &ReferenceFrame {
        &self.reference
    }

    /// Fit the latest pending frame and return the raw canonical pose.
    fn poll_raw(&mut self) -> Result<Option<(Quaternion, Position)>> {
        let mut latest = None;
        while let Some(frame) = self.source.poll_frame()? {
            latest = Some(frame);
        }
        let Some(points) = latest else {
            return Ok(None);
        };

        let fit = fit_rigid(self.options.template.points(), &points)?;
        log::trace!("landmark fit rms={:.4} m", fit.rms_error);
        let [x, y, z] = ESTIMATOR_FRAME.map_vector(fit.translation.to_array());
        Ok(Some((
            ESTIMATOR_FRAME.map_rotation(&fit.rotation),
            Position::new(x, y, z),
        )))
    }

    /// Fit any pending frame. Each half of a new pose is handed out once.
    fn refresh(&mut self) -> Result<()> {
        ensure_open(self.state)?;
        if let Some(raw) = self.poll_raw()? {
            self.latest = Some(raw);
            self.orientation_fresh = true;
            self.position_fresh = true;
        }
        Ok(())
    }

    fn rebased_orientation(&self, orientation: &Quaternion) -> Sample {
        self.options
            .orient_format
            .sample(self.reference.apply(orientation))
    }

    fn capture(&mut self) -> Result<(Quaternion, Position)> {
        ensure_open(self.state)?;
        let raw = wait_for(self.options.zero_timeout, || self.poll_raw())?;
        self.latest = Some(raw);
        self.orientation_fresh = false;
        self.position_fresh = false;
        Ok(raw)
    }

    /// Rebase orientation only; the position offset is kept.
    pub fn zero_orientation(&mut self) -> Result<()> {
        let (orientation, _) = self.capture()?;
        self.reference.set_orientation_zero(orientation);
        Ok(())
    }

    /// Rebase position only; the orientation offset is kept.
    pub fn zero_position(&mut self) -> Result<()> {
        let (_, position) = self.capture()?;
        self.reference.set_position_zero(position);
        Ok(())
    }
}

impl<S: LandmarkSource> HeadTracker for LandmarkTracker<S> {
    type Frame = ();

    fn name(&self) -> &str {
        &self.options.camera
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
        let cameras = self.source.available_cameras()?;
        log::debug!("Cameras: {:?}", cameras);
        let camera = find_device(&self.options.camera, &cameras)?;
        self.source.start(&camera)?;
        self.state = DeviceState::Open;
        log::info!(
            "Opened camera '{}' ({} landmarks)",
            camera,
            self.options.template.len()
        );
        Ok(())
    }

    fn close(&mut self) {
        if self.state == DeviceState::Closed {
            return;
        }
        self.source.stop();
        self.latest = None;
        self.orientation_fresh = false;
        self.position_fresh = false;
        self.state = DeviceState::Closed;
        log::info!("Closed camera '{}'", self.options.camera);
    }

    fn zero(&mut self) -> Result<()> {
        let (orientation, position) = self.capture()?;
        self.reference.set_zero(orientation, Some(position));
        log::info!("Zeroed camera '{}'", self.options.camera);
        Ok(())
    }

    fn read_pose(&mut self, _frame: ()) -> Result<Option<Pose>> {
        self.refresh()?;
        if !(self.orientation_fresh || self.position_fresh) {
            return Ok(None);
        }
        self.orientation_fresh = false;
        self.position_fresh = false;
        Ok(self.latest.map(|(orientation, position)| Pose {
            orientation: Some(self.rebased_orientation(&orientation)),
            position: Some(self.reference.apply_position(&position)),
        }))
    }

    fn read_orientation(&mut self, _frame: ()) -> Result<Option<Sample>> {
        self.refresh()?;
        if !std::mem::take(&mut self.orientation_fresh) {
            return Ok(None);
        }
        Ok(self
            .latest
            .map(|(orientation, _)| self.rebased_orientation(&orientation)))
    }

    fn read_position(&mut self, _frame: ()) -> Result<Option<Sample>> {
        self.refresh()?;
        if !std::mem::take(&mut self.position_fresh) {
            return Ok(None);
        }
        Ok(self
            .latest
            .map(|(_, position)| Sample::Position(self.reference.apply_position(&position))))
    }
}

impl<S: LandmarkSource> Drop for LandmarkTracker<S> {
    fn drop(&mut self) {
        self.close();
    }
}
