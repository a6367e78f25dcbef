//! 3D affine transforms.

use serde::{Deserialize, Serialize};

/// An affine 3D transform stored as the upper 3×4 block of a homogeneous
/// matrix. The bottom row is always `(0, 0, 0, 1)`.
///
/// Columns 0..3 hold the rotation (row-major), column 3 the translation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform3D {
    rows: [[f64; 4]; 3],
}

impl Default for Transform3D {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform3D {
    pub const fn identity() -> Self {
        Self {
            rows: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
            ],
        }
    }

    /// Build from a rotation block and a translation vector.
    pub fn from_parts(rotation: [[f64; 3]; 3], translation: [f64; 3]) -> Self {
        let mut rows = [[0.0; 4]; 3];
        for (r, row) in rows.iter_mut().enumerate() {
            row[..3].copy_from_slice(&rotation[r]);
            row[3] = translation[r];
        }
        Self { rows }
    }

    pub fn translation(dx: f64, dy: f64, dz: f64) -> Self {
        let mut t = Self::identity();
        t.rows[0][3] = dx;
        t.rows[1][3] = dy;
        t.rows[2][3] = dz;
        t
    }

    pub fn rotation_x(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self::from_parts([[1.0, 0.0, 0.0], [0.0, c, -s], [0.0, s, c]], [0.0; 3])
    }

    pub fn rotation_y(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self::from_parts([[c, 0.0, s], [0.0, 1.0, 0.0], [-s, 0.0, c]], [0.0; 3])
    }

    pub fn rotation_z(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self::from_parts([[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]], [0.0; 3])
    }

    /// Matrix element at `(row, col)` of the homogeneous 4×4 form, `None`
    /// outside it.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        match (row, col) {
            (0..=2, 0..=3) => Some(self.rows[row][col]),
            (3, 3) => Some(1.0),
            (3, 0..=2) => Some(0.0),
            _ => None,
        }
    }

    pub fn rotation(&self) -> [[f64; 3]; 3] {
        let mut out = [[0.0; 3]; 3];
        for (r, row) in out.iter_mut().enumerate() {
            row.copy_from_slice(&self.rows[r][..3]);
        }
        out
    }

    pub fn translation_vector(&self) -> [f64; 3] {
        [self.rows[0][3], self.rows[1][3], self.rows[2][3]]
    }

    /// Full homogeneous matrix with the fixed bottom row.
    pub fn homogeneous(&self) -> [[f64; 4]; 4] {
        [self.rows[0], self.rows[1], self.rows[2], [0.0, 0.0, 0.0, 1.0]]
    }

    /// Composition `self * rhs` (apply `rhs` first).
    pub fn compose(&self, rhs: &Transform3D) -> Transform3D {
        let mut rows = [[0.0; 4]; 3];
        for (r, row) in rows.iter_mut().enumerate() {
            for (c, cell) in row.iter_mut().enumerate() {
                let mut acc = 0.0;
                for k in 0..3 {
                    acc += self.rows[r][k] * rhs.rows[k][c];
                }
                if c == 3 {
                    acc += self.rows[r][3];
                }
                *cell = acc;
            }
        }
        Transform3D { rows }
    }

    pub fn apply(&self, p: [f64; 3]) -> [f64; 3] {
        let mut out = [0.0; 3];
        for (r, o) in out.iter_mut().enumerate() {
            *o = self.rows[r][0] * p[0] + self.rows[r][1] * p[1] + self.rows[r][2] * p[2] + self.rows[r][3];
        }
        out
    }

    /// Element-wise comparison within `eps`.
    pub fn approx_eq(&self, other: &Transform3D, eps: f64) -> bool {
        self.rows
            .iter()
            .flatten()
            .zip(other.rows.iter().flatten())
            .all(|(a, b)| (a - b).abs() <= eps)
    }
}

impl std::ops::Mul for Transform3D {
    type Output = Transform3D;

    fn mul(self, rhs: Transform3D) -> Transform3D {
        self.compose(&rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_identity_bottom_row() {
        let t = Transform3D::translation(1.0, 2.0, 3.0);
        assert_eq!(t.homogeneous()[3], [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(t.get(3, 3), Some(1.0));
        assert_eq!(t.get(3, 0), Some(0.0));
        assert_eq!(t.get(0, 3), Some(1.0));
    }

    #[test]
    fn test_get_outside_matrix_is_none() {
        let t = Transform3D::translation(1.0, 2.0, 3.0);
        assert_eq!(t.get(0, 4), None);
        assert_eq!(t.get(4, 0), None);
        assert_eq!(t.get(3, 4), None);
    }

    #[test]
    fn test_compose_rotation_then_translation() {
        let t = Transform3D::translation(10.0, 0.0, 0.0) * Transform3D::rotation_z(FRAC_PI_2);
        let p = t.apply([1.0, 0.0, 0.0]);
        assert!((p[0] - 10.0).abs() < 1e-12);
        assert!((p[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_translations_add_up() {
        let t = Transform3D::translation(0.0, 0.0, 5.0) * Transform3D::translation(0.0, 0.0, 7.0);
        assert_eq!(t.translation_vector(), [0.0, 0.0, 12.0]);
    }
}
