//! Levenberg–Marquardt least squares for small parametric models.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitFailure {
    #[error("{points} points cannot constrain {params} parameters")]
    TooFewPoints { points: usize, params: usize },

    #[error("no convergence after {iterations} iterations")]
    NotConverged { iterations: usize },

    #[error("model produced non-finite values")]
    NonFinite,
}

#[derive(Debug, Clone, Copy)]
pub struct LmOptions {
    pub max_iterations: usize,
    /// Relative cost reduction below which a step counts as converged.
    pub ftol: f64,
    /// Relative step size below which a step counts as converged.
    pub xtol: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_iterations: 400,
            ftol: 1.49e-8,
            xtol: 1.49e-8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LmSolution {
    pub params: Vec<f64>,
    /// Sum of squared residuals at `params`.
    pub cost: f64,
    /// `(JᵀJ)⁻¹ · cost / (m - n)`, when the normal matrix is invertible.
    pub covariance: Option<DMatrix<f64>>,
    pub iterations: usize,
}

const LAMBDA_START: f64 = 1e-3;
const LAMBDA_MAX: f64 = 1e16;

/// Minimise `Σ (y_i - f(x_i; p))²` starting from `p0`.
///
/// `model(x, p, grad)` returns `f(x; p)` and writes `∂f/∂p` into `grad`
/// (same length as `p`).
pub fn levenberg_marquardt<F>(
    x: &[f64],
    y: &[f64],
    p0: &[f64],
    model: F,
    options: &LmOptions,
) -> Result<LmSolution, FitFailure>
where
    F: Fn(f64, &[f64], &mut [f64]) -> f64,
{
    let m = x.len().min(y.len());
    let n = p0.len();
    if m < n {
        return Err(FitFailure::TooFewPoints {
            points: m,
            params: n,
        });
    }

    let mut grad = vec![0.0; n];
    let mut p = DVector::from_column_slice(p0);
    let mut r = residuals(x, y, &p, &model, &mut grad);
    let mut cost = r.norm_squared();
    if !cost.is_finite() {
        return Err(FitFailure::NonFinite);
    }
    let mut lambda = LAMBDA_START;

    for iteration in 1..=options.max_iterations {
        if cost == 0.0 {
            return finish(x, p, cost, iteration, &model, &mut grad);
        }

        let j = jacobian(x, &p, &model, &mut grad);
        let jtj = j.transpose() * &j;
        let g = j.transpose() * &r;
        if g.amax() == 0.0 {
            return finish(x, p, cost, iteration, &model, &mut grad);
        }

        let mut stepped = false;
        while lambda <= LAMBDA_MAX {
            let mut a = jtj.clone();
            for k in 0..n {
                a[(k, k)] += lambda * jtj[(k, k)].max(1e-12);
            }
            let Some(chol) = a.cholesky() else {
                lambda *= 10.0;
                continue;
            };
            let delta = chol.solve(&g);
            let candidate = &p + &delta;
            let r_new = residuals(x, y, &candidate, &model, &mut grad);
            let cost_new = r_new.norm_squared();

            if cost_new.is_finite() && cost_new < cost {
                let reduction = (cost - cost_new) / cost;
                let step = delta.norm();
                p = candidate;
                r = r_new;
                cost = cost_new;
                lambda = (lambda / 10.0).max(1e-12);
                stepped = true;

                if reduction <= options.ftol || step <= options.xtol * (p.norm() + options.xtol) {
                    return finish(x, p, cost, iteration, &model, &mut grad);
                }
                break;
            }
            lambda *= 10.0;
        }

        // No downhill step left: p sits at a local minimum.
        if !stepped {
            return finish(x, p, cost, iteration, &model, &mut grad);
        }
    }

    Err(FitFailure::NotConverged {
        iterations: options.max_iterations,
    })
}

fn finish<F>(
    x: &[f64],
    p: DVector<f64>,
    cost: f64,
    iterations: usize,
    model: &F,
    grad: &mut [f64],
) -> Result<LmSolution, FitFailure>
where
    F: Fn(f64, &[f64], &mut [f64]) -> f64,
{
    if p.iter().any(|v| !v.is_finite()) {
        return Err(FitFailure::NonFinite);
    }

    let n = p.len();
    let dof = x.len().saturating_sub(n);
    let covariance = if dof > 0 {
        let j = jacobian(x, &p, model, grad);
        (j.transpose() * &j)
            .try_inverse()
            .map(|inv| inv * (cost / dof as f64))
            .filter(|cov| cov.iter().all(|v| v.is_finite()))
    } else {
        None
    };

    Ok(LmSolution {
        params: p.iter().copied().collect(),
        cost,
        covariance,
        iterations,
    })
}

fn residuals<F>(x: &[f64], y: &[f64], p: &DVector<f64>, model: &F, grad: &mut [f64]) -> DVector<f64>
where
    F: Fn(f64, &[f64], &mut [f64]) -> f64,
{
    DVector::from_iterator(
        x.len().min(y.len()),
        x.iter().zip(y).map(|(&xi, &yi)| yi - model(xi, p.as_slice(), grad)),
    )
}

fn jacobian<F>(x: &[f64], p: &DVector<f64>, model: &F, grad: &mut [f64]) -> DMatrix<f64>
where
    F: Fn(f64, &[f64], &mut [f64]) -> f64,
{
    let n = p.len();
    let mut j = DMatrix::zeros(x.len(), n);
    for (i, &xi) in x.iter().enumerate() {
        model(xi, p.as_slice(), grad);
        for k in 0..n {
            j[(i, k)] = grad[k];
        }
    }
    j
}
