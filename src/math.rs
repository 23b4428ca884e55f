//! Basic calculus on rigid body transformations with the nalgebra backend.
//!
//! Spatial vectors (twists and wrenches) are 6-vectors ordered `[angular; linear]`. A
//! transform `T` of a child frame relative to a parent frame maps child coordinates into
//! parent coordinates, and the adjoint `Ad_T` maps a twist expressed in the child frame into
//! the parent frame.

use nalgebra::{
    Isometry3, Matrix3, Matrix6, Rotation3, Translation3, UnitQuaternion, Vector3, Vector6,
};
use num_traits::Float;

/// Rigid transformation (rotation and translation)
pub type Transform = Isometry3<f64>;

/// Skew-symmetric matrix such that `skew(a) * b == a.cross(&b)`
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    v.cross_matrix()
}

/// Creates a rotation around the x axis.
pub fn rotate_x(param: f64) -> Rotation3<f64> {
    Rotation3::from_axis_angle(&Vector3::x_axis(), param)
}

/// Creates a rotation around the y axis.
pub fn rotate_y(param: f64) -> Rotation3<f64> {
    Rotation3::from_axis_angle(&Vector3::y_axis(), param)
}

/// Creates a rotation around the z axis.
pub fn rotate_z(param: f64) -> Rotation3<f64> {
    Rotation3::from_axis_angle(&Vector3::z_axis(), param)
}

/// Exponential map from exponential coordinates to a rotation
pub fn exp_so3(w: &Vector3<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::from_scaled_axis(*w)
}

/// Logarithm of a rotation (exponential coordinates with angle in `[0, π]`)
pub fn log_so3(rotation: &UnitQuaternion<f64>) -> Vector3<f64> {
    rotation.scaled_axis()
}

/// Left Jacobian of SO(3), relating the body twist of the exponential map to the
/// translation it produces: `exp_se3([ω; v]).translation == left_jacobian_so3(ω) * v`.
pub fn left_jacobian_so3(w: &Vector3<f64>) -> Matrix3<f64> {
    let theta = w.norm();
    let wx = skew(w);
    if theta < 1e-6 {
        return Matrix3::identity() + 0.5 * wx + wx * wx / 6.0;
    }
    let theta2 = theta * theta;
    Matrix3::identity()
        + (1.0 - theta.cos()) / theta2 * wx
        + (theta - theta.sin()) / (theta2 * theta) * wx * wx
}

/// Exponential map of a twist `[ω; v]` to a rigid transform
pub fn exp_se3(twist: &Vector6<f64>) -> Transform {
    let w = angular(twist);
    let v = linear(twist);
    Isometry3::from_parts(Translation3::from(left_jacobian_so3(&w) * v), exp_so3(&w))
}

/// Translation only transform
pub fn translation(offset: &Vector3<f64>) -> Transform {
    Isometry3::from_parts(Translation3::from(*offset), UnitQuaternion::identity())
}

/// Angular part of a spatial vector
pub fn angular(v: &Vector6<f64>) -> Vector3<f64> {
    v.fixed_rows::<3>(0).into_owned()
}

/// Linear part of a spatial vector
pub fn linear(v: &Vector6<f64>) -> Vector3<f64> {
    v.fixed_rows::<3>(3).into_owned()
}

/// Assembles a spatial vector from its angular and linear part
pub fn spatial(angular: &Vector3<f64>, linear: &Vector3<f64>) -> Vector6<f64> {
    Vector6::new(
        angular.x, angular.y, angular.z, linear.x, linear.y, linear.z,
    )
}

/// Adjoint `Ad_T = [[R, 0], [[p]R, R]]`, maps twists from the child into the parent frame
pub fn adjoint(t: &Transform) -> Matrix6<f64> {
    let r = t.rotation.to_rotation_matrix().into_inner();
    let p = t.translation.vector;
    let mut result = Matrix6::zeros();
    result.fixed_view_mut::<3, 3>(0, 0).copy_from(&r);
    result.fixed_view_mut::<3, 3>(3, 3).copy_from(&r);
    result.fixed_view_mut::<3, 3>(3, 0).copy_from(&(skew(&p) * r));
    result
}

/// Inverse adjoint `Ad_{T⁻¹} = [[Rᵀ, 0], [-Rᵀ[p], Rᵀ]]`, maps twists from the parent into the
/// child frame
pub fn adjoint_inverse(t: &Transform) -> Matrix6<f64> {
    let rt = t.rotation.to_rotation_matrix().into_inner().transpose();
    let p = t.translation.vector;
    let mut result = Matrix6::zeros();
    result.fixed_view_mut::<3, 3>(0, 0).copy_from(&rt);
    result.fixed_view_mut::<3, 3>(3, 3).copy_from(&rt);
    result.fixed_view_mut::<3, 3>(3, 0).copy_from(&(-rt * skew(&p)));
    result
}

/// `Ad_{T⁻¹} V`, a parent-frame twist expressed in the child frame
pub fn transform_twist_inverse(t: &Transform, v: &Vector6<f64>) -> Vector6<f64> {
    let w = t.rotation.inverse_transform_vector(&angular(v));
    let lin = t
        .rotation
        .inverse_transform_vector(&(linear(v) - t.translation.vector.cross(&angular(v))));
    spatial(&w, &lin)
}

/// `Ad_T V`, a child-frame twist expressed in the parent frame
pub fn transform_twist(t: &Transform, v: &Vector6<f64>) -> Vector6<f64> {
    let w = t.rotation * angular(v);
    let lin = t.rotation * linear(v) + t.translation.vector.cross(&w);
    spatial(&w, &lin)
}

/// `Ad_{T⁻¹}ᵀ F`, a wrench acting on the child expressed in the parent frame
pub fn transform_wrench(t: &Transform, f: &Vector6<f64>) -> Vector6<f64> {
    let force = t.rotation * linear(f);
    let moment = t.rotation * angular(f) + t.translation.vector.cross(&force);
    spatial(&moment, &force)
}

/// Lie bracket `ad_V W = [ω × ω'; ω × v' + v × ω']`
pub fn ad(v: &Vector6<f64>, w: &Vector6<f64>) -> Vector6<f64> {
    let (w1, v1) = (angular(v), linear(v));
    let (w2, v2) = (angular(w), linear(w));
    spatial(&w1.cross(&w2), &(w1.cross(&v2) + v1.cross(&w2)))
}

/// Matrix form of [ad], `ad_V = [[[ω], 0], [[v], [ω]]]`
pub fn ad_matrix(v: &Vector6<f64>) -> Matrix6<f64> {
    let wx = skew(&angular(v));
    let mut result = Matrix6::zeros();
    result.fixed_view_mut::<3, 3>(0, 0).copy_from(&wx);
    result.fixed_view_mut::<3, 3>(3, 3).copy_from(&wx);
    result.fixed_view_mut::<3, 3>(3, 0).copy_from(&skew(&linear(v)));
    result
}

/// Dual adjoint `ad_Vᵀ F = [-(ω × m) - v × f; -(ω × f)]` for a wrench `F = [m; f]`
pub fn dad(v: &Vector6<f64>, f: &Vector6<f64>) -> Vector6<f64> {
    let (w, lin) = (angular(v), linear(v));
    let (m, force) = (angular(f), linear(f));
    spatial(&(-w.cross(&m) - lin.cross(&force)), &(-w.cross(&force)))
}

/// Intrinsic x-y-z rotation `Rx(a)·Ry(b)·Rz(c)`
pub fn euler_xyz(angles: &Vector3<f64>) -> Rotation3<f64> {
    rotate_x(angles.x) * rotate_y(angles.y) * rotate_z(angles.z)
}

/// Intrinsic z-y-x rotation `Rz(a)·Ry(b)·Rx(c)`
pub fn euler_zyx(angles: &Vector3<f64>) -> Rotation3<f64> {
    rotate_z(angles.x) * rotate_y(angles.y) * rotate_x(angles.z)
}

/// Whether all values are finite numbers
pub fn all_finite<'a, T>(values: impl IntoIterator<Item = &'a T>) -> bool
where
    T: Float + 'a,
{
    values.into_iter().all(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    fn sample_transform() -> Transform {
        Isometry3::from_parts(
            Translation3::new(0.3, -1.2, 0.5),
            UnitQuaternion::from_scaled_axis(Vector3::new(0.2, 0.4, -0.7)),
        )
    }

    #[test]
    fn test_rotations() {
        let v = rotate_z(FRAC_PI_2) * Vector3::x();
        assert_abs_diff_eq!(v, Vector3::y(), epsilon = 1e-12);
        let v = rotate_x(FRAC_PI_2) * Vector3::y();
        assert_abs_diff_eq!(v, Vector3::z(), epsilon = 1e-12);
        let v = rotate_y(FRAC_PI_2) * Vector3::z();
        assert_abs_diff_eq!(v, Vector3::x(), epsilon = 1e-12);
    }

    #[test]
    fn test_exp_log() {
        let w = Vector3::new(0.1, -0.5, 0.9);
        assert_abs_diff_eq!(log_so3(&exp_so3(&w)), w, epsilon = 1e-12);
        assert_abs_diff_eq!(left_jacobian_so3(&Vector3::zeros()), Matrix3::identity());
    }

    #[test]
    fn test_exp_se3_matches_integration() {
        // constant body twist integrated with many small steps
        let twist = Vector6::new(0.3, -0.2, 0.8, 1.0, 0.5, -0.4);
        let mut t = Transform::identity();
        let n = 10000;
        let dt = 1.0 / n as f64;
        for _ in 0..n {
            let w = angular(&twist) * dt;
            let v = linear(&twist) * dt;
            t = t * Isometry3::from_parts(Translation3::from(v), exp_so3(&w));
        }
        let exact = exp_se3(&twist);
        assert_abs_diff_eq!(t.translation.vector, exact.translation.vector, epsilon = 1e-3);
        assert_abs_diff_eq!(
            t.rotation.to_rotation_matrix().into_inner(),
            exact.rotation.to_rotation_matrix().into_inner(),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_adjoints() {
        let t = sample_transform();
        let v = Vector6::new(0.1, 0.2, 0.3, -1.0, 0.5, 2.0);
        assert_abs_diff_eq!(adjoint(&t) * adjoint_inverse(&t), Matrix6::identity(), epsilon = 1e-12);
        assert_abs_diff_eq!(transform_twist(&t, &v), adjoint(&t) * v, epsilon = 1e-12);
        assert_abs_diff_eq!(transform_twist_inverse(&t, &v), adjoint_inverse(&t) * v, epsilon = 1e-12);
        assert_abs_diff_eq!(
            transform_wrench(&t, &v),
            adjoint_inverse(&t).transpose() * v,
            epsilon = 1e-12
        );
        // power is frame independent
        let f = Vector6::new(0.4, -0.3, 0.2, 1.5, -2.0, 0.7);
        assert_abs_diff_eq!(
            transform_wrench(&t, &f).dot(&transform_twist(&t, &v)),
            f.dot(&v),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_ad() {
        let v = Vector6::new(0.1, 0.2, 0.3, -1.0, 0.5, 2.0);
        let w = Vector6::new(-0.4, 0.7, 0.1, 0.3, 0.2, -0.9);
        assert_abs_diff_eq!(ad(&v, &w), ad_matrix(&v) * w, epsilon = 1e-12);
        assert_abs_diff_eq!(dad(&v, &w), ad_matrix(&v).transpose() * w, epsilon = 1e-12);
        assert_abs_diff_eq!(ad(&v, &v), Vector6::zeros(), epsilon = 1e-12);
    }

    #[test]
    fn test_euler() {
        let angles = Vector3::new(0.3, -0.2, 1.1);
        let xyz = euler_xyz(&angles);
        let expected = rotate_x(0.3) * rotate_y(-0.2) * rotate_z(1.1);
        assert_abs_diff_eq!(xyz.into_inner(), expected.into_inner(), epsilon = 1e-12);
        assert_abs_diff_eq!(euler_zyx(&Vector3::zeros()).into_inner(), Matrix3::identity());
    }

    #[test]
    fn test_all_finite() {
        assert!(all_finite(&[1.0, 2.0]));
        assert!(!all_finite(&[1.0, f64::NAN]));
        assert!(!all_finite(Vector6::<f64>::repeat(f64::INFINITY).iter()));
    }
}
