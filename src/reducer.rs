//! Fixed-size descriptor for a variable-length joint trajectory.
//!
//! The trajectory `X` (`T x D`, rows already relative to the tracking
//! reference) is reduced to its Gram matrix `R = Xᵗ·X`, which is `D x D`
//! whatever the gesture duration. This is a plain self-Gram projection,
//! not PCA: no centering across time and no eigen-decomposition.

use ndarray::Array2;

use crate::error::{PipelineError, Result};

pub fn reduce(trajectory: &[Vec<f64>]) -> Result<Array2<f64>> {
    let x = to_matrix(trajectory)?;
    Ok(x.t().dot(&x))
}

/// Stack rows into a `T x D` matrix, checking every row has the same width.
pub fn to_matrix(rows: &[Vec<f64>]) -> Result<Array2<f64>> {
    let first = rows.first().ok_or(PipelineError::EmptyTrajectory)?;
    let d = first.len();
    let mut flat = Vec::with_capacity(rows.len() * d);
    for row in rows {
        if row.len() != d {
            return Err(PipelineError::RowWidth {
                expected: d,
                found: row.len(),
            });
        }
        flat.extend_from_slice(row);
    }
    Array2::from_shape_vec((rows.len(), d), flat).map_err(|_| PipelineError::RowWidth {
        expected: d,
        found: 0,
    })
}

pub fn to_rows(m: &Array2<f64>) -> Vec<Vec<f64>> {
    m.rows().into_iter().map(|r| r.to_vec()).collect()
}
