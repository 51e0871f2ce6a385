//! Small dense kernels for symmetric positive-definite systems.

use ndarray::{Array1, Array2};

use crate::error::SolverError;

/// Lower-triangular Cholesky factor `L` such that `A = L·Lᵀ`.
pub fn cholesky(a: &Array2<f64>) -> Result<Array2<f64>, SolverError> {
    let n = a.nrows();
    debug_assert_eq!(n, a.ncols());
    let mut l = Array2::<f64>::zeros((n, n));
    for j in 0..n {
        let mut d = a[[j, j]];
        for k in 0..j {
            d -= l[[j, k]] * l[[j, k]];
        }
        if !(d > 0.0 && d.is_finite()) {
            return Err(SolverError::NotPositiveDefinite);
        }
        let d = d.sqrt();
        l[[j, j]] = d;
        for i in j + 1..n {
            let mut s = a[[i, j]];
            for k in 0..j {
                s -= l[[i, k]] * l[[j, k]];
            }
            l[[i, j]] = s / d;
        }
    }
    Ok(l)
}

/// Solves `L·Lᵀ·x = b` given the Cholesky factor `L`.
pub fn cholesky_solve(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();
    let mut y = b.clone();
    for i in 0..n {
        let mut s = y[i];
        for k in 0..i {
            s -= l[[i, k]] * y[k];
        }
        y[i] = s / l[[i, i]];
    }
    for i in (0..n).rev() {
        let mut s = y[i];
        for k in i + 1..n {
            s -= l[[k, i]] * y[k];
        }
        y[i] = s / l[[i, i]];
    }
    y
}

/// Solves `A·x = b` for symmetric positive-definite `A`.
pub fn solve_spd(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>, SolverError> {
    let l = cholesky(a)?;
    Ok(cholesky_solve(&l, b))
}

/// Inverse of a symmetric positive-definite matrix. The result is exactly symmetric.
pub fn inverse_spd(a: &Array2<f64>) -> Result<Array2<f64>, SolverError> {
    let n = a.nrows();
    let l = cholesky(a)?;
    let mut inverse = Array2::<f64>::zeros((n, n));
    let mut unit = Array1::<f64>::zeros(n);
    for j in 0..n {
        unit.fill(0.0);
        unit[j] = 1.0;
        inverse.column_mut(j).assign(&cholesky_solve(&l, &unit));
    }
    for i in 0..n {
        for j in i + 1..n {
            let mean = 0.5 * (inverse[[i, j]] + inverse[[j, i]]);
            inverse[[i, j]] = mean;
            inverse[[j, i]] = mean;
        }
    }
    Ok(inverse)
}

/// Adds `value` to every diagonal entry.
pub fn add_diagonal(a: &mut Array2<f64>, value: f64) {
    a.diag_mut().mapv_inplace(|x| x + value);
}
