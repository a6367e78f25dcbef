//! Transform codec: 9 rotation coefficients row-major, then dx, dy, dz.

use crate::model::Transform3D;
use crate::storage::{Cell, Row};
use crate::{Error, Result};

pub const COEFFICIENTS: usize = 12;

pub fn encode(t: &Transform3D) -> [f64; COEFFICIENTS] {
    let mut out = [0.0; COEFFICIENTS];
    for (r, row) in t.rotation().iter().enumerate() {
        out[r * 3..r * 3 + 3].copy_from_slice(row);
    }
    out[9..].copy_from_slice(&t.translation_vector());
    out
}

/// Inverse of [`encode`]; the bottom row `(0, 0, 0, 1)` is implied.
pub fn decode(coefficients: &[f64]) -> Result<Transform3D> {
    if coefficients.len() != COEFFICIENTS {
        return Err(Error::MalformedRecord {
            table: "GeoTransform".into(),
            id: None,
            message: format!("expected {COEFFICIENTS} coefficients, found {}", coefficients.len()),
        });
    }
    let c = coefficients;
    Ok(Transform3D::from_parts(
        [[c[0], c[1], c[2]], [c[3], c[4], c[5]], [c[6], c[7], c[8]]],
        [c[9], c[10], c[11]],
    ))
}

pub fn to_row(t: &Transform3D) -> Row {
    encode(t).into_iter().map(Cell::Float).collect()
}

pub fn from_row(row: &Row) -> Result<Transform3D> {
    let coefficients = row
        .iter()
        .map(|cell| {
            cell.as_float().ok_or_else(|| Error::MalformedRecord {
                table: "GeoTransform".into(),
                id: None,
                message: format!("coefficient is {}, not a number", cell.type_name()),
            })
        })
        .collect::<Result<Vec<f64>>>()?;
    decode(&coefficients)
}
