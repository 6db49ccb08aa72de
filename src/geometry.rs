//! 2D vector helpers on top of `nalgebra`.

use nalgebra::{Rotation2, Vector2};

pub type Vec2 = Vector2<f64>;

/// Operations the simulation needs that `nalgebra` does not name directly.
pub trait VectorExt {
    /// Returns the vector rotated counter-clockwise by `angle` radians.
    fn rotated(&self, angle: f64) -> Self;

    /// Signed angle in radians needed to rotate `self` onto `other`, in `(-PI, PI]`.
    fn signed_angle_to(&self, other: &Self) -> f64;

    /// Unit vector, or the zero vector if the length is zero.
    fn normalized_or_zero(&self) -> Self;
}

impl VectorExt for Vec2 {
    fn rotated(&self, angle: f64) -> Self {
        Rotation2::new(angle) * self
    }

    fn signed_angle_to(&self, other: &Self) -> f64 {
        let cross = self.x * other.y - self.y * other.x;
        cross.atan2(self.dot(other))
    }

    fn normalized_or_zero(&self) -> Self {
        let len = self.magnitude();
        if len > 0.0 {
            self / len
        } else {
            Vec2::zeros()
        }
    }
}

pub fn distance(a: &Vec2, b: &Vec2) -> f64 {
    (a - b).magnitude()
}

/// Projects `point` onto the infinite line through `origin` along unit vector `dir`.
pub fn closest_point_on_line(origin: &Vec2, dir: &Vec2, point: &Vec2) -> Vec2 {
    origin + dir * (point - origin).dot(dir)
}

/// True when two vectors are equal within `eps` on both axes.
pub fn approx_eq(a: &Vec2, b: &Vec2, eps: f64) -> bool {
    (a.x - b.x).abs() <= eps && (a.y - b.y).abs() <= eps
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_rotate_quarter_turn() {
        let v = Vec2::new(1.0, 0.0).rotated(FRAC_PI_2);
        assert!(approx_eq(&v, &Vec2::new(0.0, 1.0), 1e-12));
    }

    #[test]
    fn test_signed_angle_sign() {
        let right = Vec2::new(1.0, 0.0);
        assert!((right.signed_angle_to(&Vec2::new(0.0, 1.0)) - FRAC_PI_2).abs() < 1e-12);
        assert!((right.signed_angle_to(&Vec2::new(0.0, -1.0)) + FRAC_PI_2).abs() < 1e-12);
        assert_eq!(right.signed_angle_to(&right), 0.0);
    }

    #[test]
    fn test_closest_point_on_line() {
        let p = closest_point_on_line(&Vec2::new(0.0, 2.0), &Vec2::new(1.0, 0.0), &Vec2::new(5.0, -3.0));
        assert!(approx_eq(&p, &Vec2::new(5.0, 2.0), 1e-12));
    }

    #[test]
    fn test_normalize_zero_is_zero() {
        assert_eq!(Vec2::zeros().normalized_or_zero(), Vec2::zeros());
        assert!((Vec2::new(3.0, 4.0).normalized_or_zero().magnitude() - 1.0).abs() < 1e-12);
    }
}
