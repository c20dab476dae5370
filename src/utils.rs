use cgmath::{Deg, Rotation3};

use crate::types::Quaternion;

/// Convert euler angles in DEGREES to a quaternion.
/// BVH rotations are applied as Z, then X, then Y: `q = qz * qx * qy`,
/// whatever order the channels were declared in.
pub fn from_euler_zxy(x: f64, y: f64, z: f64) -> Quaternion {
    let qx = Quaternion::from_angle_x(Deg(x));
    let qy = Quaternion::from_angle_y(Deg(y));
    let qz = Quaternion::from_angle_z(Deg(z));
    qz * qx * qy
}
