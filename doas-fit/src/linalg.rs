//!
//! A small dense linear least-squares solver for the DOAS fit core's linear stage
//! (spec §4.5 step 3): the design matrix is at most a handful of references plus a
//! low-order polynomial wide, so a hand-rolled normal-equations solve is
//! appropriate rather than pulling in a general-purpose linear-algebra crate for a
//! problem this small.
//!

use crate::result::{Error, Result};

/// Solves the linear least-squares problem `design * params ≈ target` via the
/// normal equations `(designᵀ design) params = designᵀ target`, solved by
/// Gauss-Jordan elimination with partial pivoting. `design` is row-major: one row
/// per sample, one column per fit parameter. Returns the parameter vector and the
/// inverse of `designᵀ design` (the covariance matrix up to a noise-variance
/// scale factor), which the caller uses to derive per-parameter errors.
pub fn solve_least_squares(design: &[Vec<f64>], target: &[f64]) -> Result<(Vec<f64>, Vec<Vec<f64>>)> {
    let n_samples = design.len();
    let n_params = design.first().map_or(0, |row| row.len());
    if n_samples == 0 || n_params == 0 {
        return Err(Error::IllConditioned);
    }

    let mut ata = vec![vec![0.0; n_params]; n_params];
    let mut atb = vec![0.0; n_params];
    for sample in 0..n_samples {
        let row = &design[sample];
        for i in 0..n_params {
            atb[i] += row[i] * target[sample];
            for j in 0..n_params {
                ata[i][j] += row[i] * row[j];
            }
        }
    }

    let inverse = invert(&ata)?;
    let mut params = vec![0.0; n_params];
    for i in 0..n_params {
        params[i] = inverse[i].iter().zip(atb.iter()).map(|(a, b)| a * b).sum();
    }

    Ok((params, inverse))
}

/// Inverts a square matrix by Gauss-Jordan elimination with partial pivoting.
/// Returns [Error::IllConditioned] if a pivot is numerically zero.
fn invert(matrix: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
    let n = matrix.len();
    let mut a: Vec<Vec<f64>> = matrix.to_vec();
    let mut inv = vec![vec![0.0; n]; n];
    for (i, row) in inv.iter_mut().enumerate() {
        row[i] = 1.0;
    }

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&r1, &r2| a[r1][col].abs().partial_cmp(&a[r2][col].abs()).unwrap())
            .unwrap();
        if a[pivot_row][col].abs() < 1e-12 {
            return Err(Error::IllConditioned);
        }
        a.swap(col, pivot_row);
        inv.swap(col, pivot_row);

        let pivot = a[col][col];
        for v in a[col].iter_mut() {
            *v /= pivot;
        }
        for v in inv[col].iter_mut() {
            *v /= pivot;
        }

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[row][col];
            if factor == 0.0 {
                continue;
            }
            for k in 0..n {
                a[row][k] -= factor * a[col][k];
                inv[row][k] -= factor * inv[col][k];
            }
        }
    }

    Ok(inv)
}

/// Residual sum of squares for `design * params` against `target`.
pub fn residual_sum_of_squares(design: &[Vec<f64>], target: &[f64], params: &[f64]) -> f64 {
    design
        .iter()
        .zip(target.iter())
        .map(|(row, &t)| {
            let predicted: f64 = row.iter().zip(params.iter()).map(|(d, p)| d * p).sum();
            (t - predicted).powi(2)
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solves_exact_linear_system() {
        // y = 2*x0 + 3*x1, sampled exactly at three points.
        let design = vec![
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 1.0],
        ];
        let target = vec![2.0, 3.0, 5.0];
        let (params, _) = solve_least_squares(&design, &target).unwrap();
        assert!((params[0] - 2.0).abs() < 1e-9);
        assert!((params[1] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn singular_design_is_ill_conditioned() {
        let design = vec![vec![1.0, 1.0], vec![2.0, 2.0]];
        let target = vec![1.0, 2.0];
        assert!(matches!(solve_least_squares(&design, &target), Err(Error::IllConditioned)));
    }

    #[test]
    fn residual_is_zero_for_exact_fit() {
        let design = vec![vec![1.0], vec![2.0], vec![3.0]];
        let target = vec![2.0, 4.0, 6.0];
        let (params, _) = solve_least_squares(&design, &target).unwrap();
        let rss = residual_sum_of_squares(&design, &target, &params);
        assert!(rss < 1e-9);
    }
}
