//! Least squares solvers.
//!
//! Every linearised initial-guess heuristic and the closed-form linear model
//! reduce to small ordinary least squares problems:
//!
//! ```text
//! minimize Σ (y_i - x_i^T β)^2
//! ```
//!
//! Implementation choices:
//! - SVD solve, which handles tall design matrices and degrades gracefully
//!   when columns are nearly collinear (e.g. log-transformed areas that barely vary).
//! - Parameter dimension is tiny (1–3 columns), so SVD cost is irrelevant.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Fit `y = b0 + b1 x`, returning `(b0, b1)`.
///
/// Returns `None` with fewer than two points, a constant `x`, or non-finite input.
pub fn simple_regression(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    let n = x.len();
    if n < 2 || n != y.len() {
        return None;
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return None;
    }
    let (lo, hi) = x
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if hi - lo <= 1e-12 * hi.abs().max(1.0) {
        return None;
    }

    let design = DMatrix::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { x[i] });
    let rhs = DVector::from_column_slice(y);
    let beta = solve_least_squares(&design, &rhs)?;
    Some((beta[0], beta[1]))
}

/// Fit `y = b x` through the origin.
pub fn regression_through_origin(x: &[f64], y: &[f64]) -> Option<f64> {
    let sxx: f64 = x.iter().map(|v| v * v).sum();
    let sxy: f64 = x.iter().zip(y.iter()).map(|(a, b)| a * b).sum();
    let b = sxy / sxx;
    (sxx > 0.0 && b.is_finite()).then_some(b)
}

/// Solve a general design given as rows.
pub fn multiple_regression(rows: &[Vec<f64>], y: &[f64]) -> Option<Vec<f64>> {
    let n = rows.len();
    let p = rows.first()?.len();
    if n < p || n != y.len() || rows.iter().any(|r| r.len() != p) {
        return None;
    }
    let design = DMatrix::from_fn(n, p, |i, j| rows[i][j]);
    let rhs = DVector::from_column_slice(y);
    solve_least_squares(&design, &rhs).map(|b| b.iter().copied().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn simple_regression_recovers_line() {
        let x = [1.0, 2.0, 4.0, 8.0];
        let y: Vec<f64> = x.iter().map(|v| 1.5 - 0.25 * v).collect();
        let (b0, b1) = simple_regression(&x, &y).unwrap();
        assert!((b0 - 1.5).abs() < 1e-10);
        assert!((b1 + 0.25).abs() < 1e-10);
    }

    #[test]
    fn simple_regression_rejects_constant_x() {
        assert!(simple_regression(&[3.0, 3.0, 3.0], &[1.0, 2.0, 3.0]).is_none());
        assert!(simple_regression(&[1.0], &[1.0]).is_none());
    }

    #[test]
    fn multiple_regression_three_columns() {
        // y = 1 + 2 a - 0.5 b
        let rows: Vec<Vec<f64>> = (0..6)
            .map(|i| {
                let a = i as f64;
                let b = (i * i) as f64;
                vec![1.0, a, b]
            })
            .collect();
        let y: Vec<f64> = rows.iter().map(|r| 1.0 + 2.0 * r[1] - 0.5 * r[2]).collect();
        let beta = multiple_regression(&rows, &y).unwrap();
        assert!((beta[0] - 1.0).abs() < 1e-9);
        assert!((beta[1] - 2.0).abs() < 1e-9);
        assert!((beta[2] + 0.5).abs() < 1e-9);
    }
}
