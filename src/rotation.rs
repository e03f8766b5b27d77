//! Rotation conversions and frame transforms.
//!
//! Convention: yaw-pitch-roll is intrinsic Z-Y'-X'' in degrees, so
//! `q = qz(yaw) * qy(pitch) * qx(roll)` with Hamilton products. The canonical
//! frame is right-handed with x forward, y left and z up.

use crate::types::{Quaternion, Ypr};
use crate::{HeadTrackerError, Result};
use nalgebra::{Matrix3, Rotation3, UnitQuaternion};

/// |sin(pitch)| above `1 - GIMBAL_EPSILON` is treated as gimbal lock.
const GIMBAL_EPSILON: f64 = 1e-9;

/// Convert a quaternion to yaw/pitch/roll in degrees.
///
/// At gimbal lock (pitch at +-90) yaw and roll share one degree of freedom;
/// roll is set to 0 and the whole residual rotation goes into yaw.
pub fn quaternion_to_ypr(q: &Quaternion) -> Ypr {
    let [w, x, y, z] = q.to_array();

    let sinp = 2.0 * (w * y - z * x);
    if sinp.abs() >= 1.0 - GIMBAL_EPSILON {
        let pitch = 90.0_f64.copysign(sinp);
        let yaw = (2.0 * z.atan2(w)).to_degrees();
        return Ypr::from_degrees_unchecked(yaw, pitch, 0.0);
    }

    let yaw = (2.0 * (w * z + x * y)).atan2(1.0 - 2.0 * (y * y + z * z));
    let pitch = sinp.asin();
    let roll = (2.0 * (w * x + y * z)).atan2(1.0 - 2.0 * (x * x + y * y));
    Ypr::from_degrees_unchecked(yaw.to_degrees(), pitch.to_degrees(), roll.to_degrees())
}

/// Convert yaw/pitch/roll to a unit quaternion.
pub fn ypr_to_quaternion(ypr: &Ypr) -> Quaternion {
    ypr_to_quaternion_unchecked(ypr.yaw(), ypr.pitch(), ypr.roll())
}

/// Same as `ypr_to_quaternion` for raw finite angles that were not folded
/// into range.
pub(crate) fn ypr_to_quaternion_unchecked(yaw: f64, pitch: f64, roll: f64) -> Quaternion {
    let (sy, cy) = (yaw.to_radians() * 0.5).sin_cos();
    let (sp, cp) = (pitch.to_radians() * 0.5).sin_cos();
    let (sr, cr) = (roll.to_radians() * 0.5).sin_cos();

    Quaternion::from_unit(
        cr * cp * cy + sr * sp * sy,
        sr * cp * cy - cr * sp * sy,
        cr * sp * cy + sr * cp * sy,
        cr * cp * sy - sr * sp * cy,
    )
}

/// Hamilton product `a * b`: rotation `b` applied in the body frame reached
/// after `a`. Renormalized.
pub fn compose(a: &Quaternion, b: &Quaternion) -> Quaternion {
    let [w1, x1, y1, z1] = a.to_array();
    let [w2, x2, y2, z2] = b.to_array();

    Quaternion::from_unit(
        w1 * w2 - x1 * x2 - y1 * y2 - z1 * z2,
        w1 * x2 + x1 * w2 + y1 * z2 - z1 * y2,
        w1 * y2 - x1 * z2 + y1 * w2 + z1 * x2,
        w1 * z2 + x1 * y2 - y1 * x2 + z1 * w2,
    )
}

/// Inverse of a unit quaternion (its conjugate).
pub fn inverse(q: &Quaternion) -> Quaternion {
    Quaternion::from_unit(q.w(), -q.x(), -q.y(), -q.z())
}

/// Rotate a vector by `q`.
pub fn rotate_vector(q: &Quaternion, v: [f64; 3]) -> [f64; 3] {
    let m = to_rotation_matrix(q);
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

/// Convert a quaternion to a 3x3 rotation matrix (row-major).
pub fn to_rotation_matrix(q: &Quaternion) -> [[f64; 3]; 3] {
    let [w, x, y, z] = q.to_array();
    [
        [1.0 - 2.0*(y*y + z*z), 2.0*(x*y - z*w),       2.0*(x*z + y*w)],
        [2.0*(x*y + z*w),       1.0 - 2.0*(x*x + z*z), 2.0*(y*z - x*w)],
        [2.0*(x*z - y*w),       2.0*(y*z + x*w),       1.0 - 2.0*(x*x + y*y)],
    ]
}

/// Convert a proper rotation matrix (row-major) to a quaternion.
///
/// Fails with `InvalidValue` on non-finite entries or a matrix that is not
/// a proper rotation (determinant far from +1).
pub fn from_rotation_matrix(m: &[[f64; 3]; 3]) -> Result<Quaternion> {
    if m.iter().flatten().any(|v| !v.is_finite()) {
        return Err(HeadTrackerError::invalid("non-finite rotation matrix"));
    }
    let mat = Matrix3::new(
        m[0][0], m[0][1], m[0][2],
        m[1][0], m[1][1], m[1][2],
        m[2][0], m[2][1], m[2][2],
    );
    from_matrix3(&mat)
}

pub(crate) fn from_matrix3(mat: &Matrix3<f64>) -> Result<Quaternion> {
    let det = mat.determinant();
    if (det - 1.0).abs() > 1e-3 {
        return Err(HeadTrackerError::invalid(format!(
            "not a proper rotation matrix (det={:.6})",
            det
        )));
    }
    let uq = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(*mat));
    let c = uq.into_inner().coords;
    // nalgebra stores [i, j, k, w]
    Quaternion::new(c[3], c[0], c[1], c[2])
}

/// Fixed signed axis permutation from a device frame into the canonical frame.
///
/// Row `i` names which device axis (with sign) becomes canonical axis `i`.
/// Only proper rotations are allowed, so quaternions map by rotating their
/// vector part and keeping `w`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMap {
    rows: [[i8; 3]; 3],
}

impl FrameMap {
    pub const IDENTITY: FrameMap = FrameMap {
        rows: [[1, 0, 0], [0, 1, 0], [0, 0, 1]],
    };

    /// Validate and build a frame map from its rows.
    pub fn new(rows: [[i8; 3]; 3]) -> Result<FrameMap> {
        let map = FrameMap { rows };
        let mut used = [false; 3];
        for row in &rows {
            let nonzero: Vec<usize> = (0..3).filter(|&c| row[c] != 0).collect();
            if nonzero.len() != 1 || row[nonzero[0]].abs() != 1 || used[nonzero[0]] {
                return Err(HeadTrackerError::invalid(format!(
                    "frame map rows {:?} are not a signed permutation",
                    rows
                )));
            }
            used[nonzero[0]] = true;
        }
        if map.determinant() != 1 {
            return Err(HeadTrackerError::invalid(format!(
                "frame map rows {:?} change handedness",
                rows
            )));
        }
        Ok(map)
    }

    pub(crate) const fn from_rows(rows: [[i8; 3]; 3]) -> FrameMap {
        FrameMap { rows }
    }

    pub fn determinant(&self) -> i32 {
        let r = self.rows.map(|row| row.map(i32::from));
        r[0][0] * (r[1][1] * r[2][2] - r[1][2] * r[2][1])
            - r[0][1] * (r[1][0] * r[2][2] - r[1][2] * r[2][0])
            + r[0][2] * (r[1][0] * r[2][1] - r[1][1] * r[2][0])
    }

    pub fn map_vector(&self, v: [f64; 3]) -> [f64; 3] {
        let mut out = [0.0; 3];
        for (i, row) in self.rows.iter().enumerate() {
            out[i] = row
                .iter()
                .zip(v.iter())
                .map(|(&s, &c)| f64::from(s) * c)
                .sum();
        }
        out
    }

    pub fn map_rotation(&self, q: &Quaternion) -> Quaternion {
        let [x, y, z] = self.map_vector([q.x(), q.y(), q.z()]);
        Quaternion::from_unit(q.w(), x, y, z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(w: f64, x: f64, y: f64, z: f64) -> Quaternion {
        Quaternion::new(w, x, y, z).unwrap()
    }

    fn assert_ypr(actual: Ypr, expected: [f64; 3]) {
        let a = actual.to_array();
        for i in 0..3 {
            assert!(
                (a[i] - expected[i]).abs() < 1e-2,
                "got {:?}, expected {:?}",
                a,
                expected
            );
        }
    }

    #[test]
    fn test_quaternion_to_ypr_reference_values() {
        let h = std::f64::consts::FRAC_1_SQRT_2;
        assert_ypr(quaternion_to_ypr(&q(1.0, 0.0, 0.0, 0.0)), [0.0, 0.0, 0.0]);
        assert_ypr(quaternion_to_ypr(&q(0.0, 1.0, 0.0, 0.0)), [0.0, 0.0, 180.0]);
        assert_ypr(quaternion_to_ypr(&q(0.0, 0.0, 1.0, 0.0)), [180.0, 0.0, 180.0]);
        assert_ypr(quaternion_to_ypr(&q(0.0, 0.0, 0.0, 1.0)), [180.0, 0.0, 0.0]);
        assert_ypr(quaternion_to_ypr(&q(h, h, 0.0, 0.0)), [0.0, 0.0, 90.0]);
        assert_ypr(quaternion_to_ypr(&q(h, 0.0, 0.0, h)), [90.0, 0.0, 0.0]);
        assert_ypr(quaternion_to_ypr(&q(0.5, 0.5, 0.5, 0.5)), [90.0, 0.0, 90.0]);
    }

    #[test]
    fn test_gimbal_lock_sets_roll_to_zero() {
        let h = std::f64::consts::FRAC_1_SQRT_2;
        let ypr = quaternion_to_ypr(&q(h, 0.0, h, 0.0));
        assert_ypr(ypr, [0.0, 90.0, 0.0]);

        // yaw 30 / pitch 90 / roll 10 collapses to yaw 20 / roll 0.
        let locked = ypr_to_quaternion_unchecked(30.0, 90.0, 10.0);
        let ypr = quaternion_to_ypr(&locked);
        assert_eq!(ypr.roll(), 0.0);
        assert_ypr(ypr, [20.0, 90.0, 0.0]);
        assert!(ypr.to_quaternion().same_rotation(&locked, 1e-6));

        let locked = ypr_to_quaternion_unchecked(30.0, -90.0, 10.0);
        let ypr = quaternion_to_ypr(&locked);
        assert_ypr(ypr, [40.0, -90.0, 0.0]);
        assert!(ypr.to_quaternion().same_rotation(&locked, 1e-6));
    }

    #[test]
    fn test_ypr_to_quaternion_reference_values() {
        let h = std::f64::consts::FRAC_1_SQRT_2;
        let cases = [
            ([0.0, 0.0, 0.0], q(1.0, 0.0, 0.0, 0.0)),
            ([90.0, 0.0, 0.0], q(h, 0.0, 0.0, h)),
            ([0.0, 90.0, 0.0], q(h, 0.0, h, 0.0)),
            ([0.0, 0.0, 90.0], q(h, h, 0.0, 0.0)),
            ([90.0, 0.0, 90.0], q(0.5, 0.5, 0.5, 0.5)),
        ];
        for (angles, expected) in cases {
            let ypr = Ypr::new(angles[0], angles[1], angles[2]).unwrap();
            let actual = ypr_to_quaternion(&ypr);
            assert!(actual.same_rotation(&expected, 1e-6), "{:?}", angles);
        }
    }

    #[test]
    fn test_round_trip_away_from_gimbal_lock() {
        for &(yaw, pitch, roll) in &[
            (0.0, 0.0, 0.0),
            (45.0, 30.0, -60.0),
            (-170.0, -80.0, 175.0),
            (120.0, 10.0, 5.0),
            (179.0, 45.0, -179.0),
        ] {
            let ypr = Ypr::new(yaw, pitch, roll).unwrap();
            let q = ypr.to_quaternion();
            let back = quaternion_to_ypr(&q);
            assert!(back.to_quaternion().dot(&q).abs() > 1.0 - 1e-9);
            assert_ypr(back, ypr.to_array());
        }
    }

    #[test]
    fn test_compose_inverse_is_identity() {
        for qq in [
            q(1.0, 0.0, 0.0, 0.0),
            q(0.5, 0.5, 0.5, 0.5),
            q(0.1, -0.7, 0.3, 0.2),
            q(0.0, 0.0, 0.0, 1.0),
        ] {
            let id = compose(&inverse(&qq), &qq);
            assert!(id.same_rotation(&Quaternion::IDENTITY, 1e-6));
            let id = compose(&qq, &inverse(&qq));
            assert!(id.same_rotation(&Quaternion::IDENTITY, 1e-6));
        }
    }

    #[test]
    fn test_compose_matches_ypr_order() {
        let yaw = Quaternion::from_axis_angle([0.0, 0.0, 1.0], 30.0).unwrap();
        let pitch = Quaternion::from_axis_angle([0.0, 1.0, 0.0], 20.0).unwrap();
        let roll = Quaternion::from_axis_angle([1.0, 0.0, 0.0], 10.0).unwrap();
        let composed = compose(&compose(&yaw, &pitch), &roll);
        let direct = Ypr::new(30.0, 20.0, 10.0).unwrap().to_quaternion();
        assert!(composed.same_rotation(&direct, 1e-9));
    }

    #[test]
    fn test_rotation_matrix_round_trip() {
        let qq = Ypr::new(-35.0, 12.0, 70.0).unwrap().to_quaternion();
        let m = to_rotation_matrix(&qq);
        let back = from_rotation_matrix(&m).unwrap();
        assert!(back.same_rotation(&qq, 1e-6));

        let v = rotate_vector(&Quaternion::from_axis_angle([0.0, 0.0, 1.0], 90.0).unwrap(), [1.0, 0.0, 0.0]);
        assert!((v[0]).abs() < 1e-12 && (v[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_from_rotation_matrix_rejects_reflection() {
        let m = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, -1.0]];
        assert!(matches!(
            from_rotation_matrix(&m),
            Err(HeadTrackerError::InvalidValue(_))
        ));
        let m = [[f64::NAN, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        assert!(from_rotation_matrix(&m).is_err());
    }

    #[test]
    fn test_frame_map_validation() {
        assert!(FrameMap::new([[0, 0, 1], [1, 0, 0], [0, 1, 0]]).is_ok());
        assert!(FrameMap::new([[1, 0, 0], [0, 1, 0], [0, 0, -1]]).is_err());
        assert!(FrameMap::new([[1, 0, 0], [1, 0, 0], [0, 0, 1]]).is_err());
        assert!(FrameMap::new([[2, 0, 0], [0, 1, 0], [0, 0, 1]]).is_err());
    }

    #[test]
    fn test_frame_map_rotation_agrees_with_vectors() {
        let map = FrameMap::new([[0, 0, -1], [-1, 0, 0], [0, 1, 0]]).unwrap();
        let device_q = Ypr::new(25.0, -15.0, 40.0).unwrap().to_quaternion();
        let v = [0.3, -0.2, 0.9];

        // Rotating then mapping equals mapping then rotating with the mapped quaternion.
        let a = map.map_vector(rotate_vector(&device_q, v));
        let b = rotate_vector(&map.map_rotation(&device_q), map.map_vector(v));
        for i in 0..3 {
            assert!((a[i] - b[i]).abs() < 1e-12);
        }
    }
}
