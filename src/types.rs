use crate::{HeadTrackerError, Result};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

/// Tolerance used when comparing rotations and checking unit norm.
pub const EPSILON: f64 = 1e-9;

/// Unit quaternion [w, x, y, z] in the canonical frame.
///
/// Components are private: every constructor validates and renormalizes, so a
/// `Quaternion` value always has unit norm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    w: f64,
    x: f64,
    y: f64,
    z: f64,
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion {
        w: 1.0,
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    /// Build a quaternion from raw components and normalize it.
    ///
    /// Fails with `InvalidValue` on NaN/Inf components or a zero-length input.
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Result<Quaternion> {
        if !(w.is_finite() && x.is_finite() && y.is_finite() && z.is_finite()) {
            return Err(HeadTrackerError::invalid(format!(
                "non-finite quaternion [{}, {}, {}, {}]",
                w, x, y, z
            )));
        }
        let norm = (w * w + x * x + y * y + z * z).sqrt();
        if norm < EPSILON {
            return Err(HeadTrackerError::invalid("zero-length quaternion"));
        }
        Ok(Quaternion {
            w: w / norm,
            x: x / norm,
            y: y / norm,
            z: z / norm,
        })
    }

    /// Renormalize components that are already known to be finite and close
    /// to unit length, e.g. the product of two unit quaternions.
    pub(crate) fn from_unit(w: f64, x: f64, y: f64, z: f64) -> Quaternion {
        let norm = (w * w + x * x + y * y + z * z).sqrt();
        Quaternion {
            w: w / norm,
            x: x / norm,
            y: y / norm,
            z: z / norm,
        }
    }

    /// Build from a [w, x, y, z] array.
    pub fn from_array(q: [f64; 4]) -> Result<Quaternion> {
        Quaternion::new(q[0], q[1], q[2], q[3])
    }

    /// Rotation of `angle_deg` degrees about `axis` (need not be unit length).
    pub fn from_axis_angle(axis: [f64; 3], angle_deg: f64) -> Result<Quaternion> {
        let len = (axis[0] * axis[0] + axis[1] * axis[1] + axis[2] * axis[2]).sqrt();
        if !len.is_finite() || len < EPSILON || !angle_deg.is_finite() {
            return Err(HeadTrackerError::invalid("degenerate rotation axis or angle"));
        }
        let half = angle_deg.to_radians() * 0.5;
        let s = half.sin() / len;
        Quaternion::new(half.cos(), axis[0] * s, axis[1] * s, axis[2] * s)
    }

    pub fn w(&self) -> f64 {
        self.w
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn z(&self) -> f64 {
        self.z
    }

    /// Components as [w, x, y, z].
    pub fn to_array(&self) -> [f64; 4] {
        [self.w, self.x, self.y, self.z]
    }

    pub fn dot(&self, other: &Quaternion) -> f64 {
        self.w * other.w + self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Geodesic angle between two orientations, in degrees [0, 180].
    pub fn angle_to(&self, other: &Quaternion) -> f64 {
        let d = self.dot(other).abs().min(1.0);
        (2.0 * d.acos()).to_degrees()
    }

    /// True if both quaternions describe the same rotation (q and -q included).
    pub fn same_rotation(&self, other: &Quaternion, tolerance_deg: f64) -> bool {
        self.angle_to(other) <= tolerance_deg
    }

    pub fn to_ypr(&self) -> Ypr {
        crate::rotation::quaternion_to_ypr(self)
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Quaternion::IDENTITY
    }
}

impl fmt::Display for Quaternion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[w={:+.4}, x={:+.4}, y={:+.4}, z={:+.4}]",
            self.w, self.x, self.y, self.z
        )
    }
}

/// Yaw, pitch, roll in degrees, intrinsic Z-Y'-X''.
///
/// Always normalized: yaw and roll in (-180, 180], pitch in [-90, 90].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Ypr {
    yaw: f64,
    pitch: f64,
    roll: f64,
}

impl Ypr {
    /// Build from angles in degrees and normalize them into range.
    pub fn new(yaw: f64, pitch: f64, roll: f64) -> Result<Ypr> {
        if !(yaw.is_finite() && pitch.is_finite() && roll.is_finite()) {
            return Err(HeadTrackerError::invalid(format!(
                "non-finite angles [{}, {}, {}]",
                yaw, pitch, roll
            )));
        }
        Ok(Ypr::from_degrees_unchecked(yaw, pitch, roll))
    }

    pub fn from_radians(yaw: f64, pitch: f64, roll: f64) -> Result<Ypr> {
        Ypr::new(yaw.to_degrees(), pitch.to_degrees(), roll.to_degrees())
    }

    /// Fold arbitrary finite angles into the canonical ranges.
    ///
    /// A pitch beyond +-90 is reflected, which adds 180 to yaw and roll; the
    /// described rotation is unchanged.
    pub(crate) fn from_degrees_unchecked(yaw: f64, pitch: f64, roll: f64) -> Ypr {
        let mut yaw = yaw;
        let mut roll = roll;
        let mut pitch = wrap_degrees(pitch);
        if pitch > 90.0 {
            pitch = 180.0 - pitch;
            yaw += 180.0;
            roll += 180.0;
        } else if pitch < -90.0 {
            pitch = -180.0 - pitch;
            yaw += 180.0;
            roll += 180.0;
        }
        Ypr {
            yaw: wrap_degrees(yaw),
            pitch,
            roll: wrap_degrees(roll),
        }
    }

    pub fn yaw(&self) -> f64 {
        self.yaw
    }

    pub fn pitch(&self) -> f64 {
        self.pitch
    }

    pub fn roll(&self) -> f64 {
        self.roll
    }

    /// Angles as [yaw, pitch, roll] in degrees.
    pub fn to_array(&self) -> [f64; 3] {
        [self.yaw, self.pitch, self.roll]
    }

    pub fn to_radians(&self) -> [f64; 3] {
        [
            self.yaw.to_radians(),
            self.pitch.to_radians(),
            self.roll.to_radians(),
        ]
    }

    pub fn to_quaternion(&self) -> Quaternion {
        crate::rotation::ypr_to_quaternion(self)
    }
}

impl fmt::Display for Ypr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[yaw={:+7.2}, pitch={:+7.2}, roll={:+7.2}]",
            self.yaw, self.pitch, self.roll
        )
    }
}

/// Wrap an angle in degrees into (-180, 180].
pub fn wrap_degrees(angle: f64) -> f64 {
    180.0 - (180.0 - angle).rem_euclid(360.0)
}

/// Translation in meters, canonical frame (x forward, y left, z up).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub const ORIGIN: Position = Position {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Position {
        Position { x, y, z }
    }

    /// Like `new`, but rejects NaN/Inf.
    pub fn try_new(x: f64, y: f64, z: f64) -> Result<Position> {
        if !(x.is_finite() && y.is_finite() && z.is_finite()) {
            return Err(HeadTrackerError::invalid(format!(
                "non-finite position [{}, {}, {}]",
                x, y, z
            )));
        }
        Ok(Position { x, y, z })
    }

    pub fn to_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        (*self - *other).norm()
    }

    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

impl Add for Position {
    type Output = Position;

    fn add(self, rhs: Position) -> Position {
        Position::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Position {
    type Output = Position;

    fn sub(self, rhs: Position) -> Position {
        Position::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[x={:+.3}, y={:+.3}, z={:+.3}]", self.x, self.y, self.z)
    }
}

/// Output format for orientation data, fixed per device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrientFormat {
    /// `"q"`
    #[default]
    Quaternion,
    /// `"ypr"`
    Ypr,
}

impl OrientFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrientFormat::Quaternion => "q",
            OrientFormat::Ypr => "ypr",
        }
    }

    /// Express a canonical orientation in this format.
    pub fn sample(&self, q: Quaternion) -> Sample {
        match self {
            OrientFormat::Quaternion => Sample::Quaternion(q),
            OrientFormat::Ypr => Sample::Ypr(q.to_ypr()),
        }
    }
}

impl FromStr for OrientFormat {
    type Err = HeadTrackerError;

    fn from_str(s: &str) -> Result<OrientFormat> {
        match s {
            "q" => Ok(OrientFormat::Quaternion),
            "ypr" => Ok(OrientFormat::Ypr),
            other => Err(HeadTrackerError::invalid(format!(
                "orientation format must be \"q\" or \"ypr\", got \"{}\"",
                other
            ))),
        }
    }
}

/// One orientation or position reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    Quaternion(Quaternion),
    Ypr(Ypr),
    Position(Position),
}

impl Sample {
    /// Short tag used in logs and `UnsupportedFormat` errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Sample::Quaternion(_) => "quaternion",
            Sample::Ypr(_) => "ypr",
            Sample::Position(_) => "position",
        }
    }

    /// The orientation as a quaternion, whichever orientation tag it carries.
    pub fn orientation(&self) -> Option<Quaternion> {
        match self {
            Sample::Quaternion(q) => Some(*q),
            Sample::Ypr(ypr) => Some(ypr.to_quaternion()),
            Sample::Position(_) => None,
        }
    }

    pub fn position(&self) -> Option<Position> {
        match self {
            Sample::Position(p) => Some(*p),
            _ => None,
        }
    }
}

/// Orientation and position derived from the same raw frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    pub orientation: Option<Sample>,
    pub position: Option<Position>,
}
