//! Finite difference utilities for gradient verification.
//!
//! Numerical gradients of tensor functions, for checking the backward pass.

use crate::error::Result;
use crate::tensor::{Tensor, TensorOptions};

/// Gradient of `sum(f(x))` with respect to every element of `x`, by central
/// differences.
///
/// `f` is called twice per element of `input`, each time on an untracked
/// copy of `input` with one element moved by `±eps`. The result is in the
/// row-major order of `input`.
///
/// # Example
/// ```
/// use ad_core::{finite_diff_grad, Tensor};
///
/// // f(x) = x^2, df/dx = 2x
/// let x = Tensor::new([2], vec![3.0, 4.0]).unwrap();
/// let grads = finite_diff_grad(|t| Ok(t.pow(2.0)), &x, 1e-6).unwrap();
///
/// assert!((grads[0] - 6.0).abs() < 1e-4);
/// assert!((grads[1] - 8.0).abs() < 1e-4);
/// ```
pub fn finite_diff_grad<F>(f: F, input: &Tensor, eps: f64) -> Result<Vec<f64>>
where
    F: Fn(&Tensor) -> Result<Tensor>,
{
    let point = input.get_data()?;
    let options = TensorOptions::on(input.device());
    let eval_at = |values: &[f64]| -> Result<f64> {
        let x = Tensor::with_options(input.shape().clone(), values.to_vec(), options)?;
        f(&x)?.reduce_sum().item()
    };

    let mut grads = Vec::with_capacity(point.len());
    let mut perturbed = point.clone();
    for i in 0..point.len() {
        perturbed[i] = point[i] + eps;
        let f_plus = eval_at(&perturbed)?;
        perturbed[i] = point[i] - eps;
        let f_minus = eval_at(&perturbed)?;
        perturbed[i] = point[i];

        grads.push((f_plus - f_minus) / (2.0 * eps));
    }
    Ok(grads)
}

/// Gradient of `sum(f(x))` at `x = input` computed by the backward pass.
pub fn autodiff_grad<F>(f: F, input: &Tensor) -> Result<Vec<f64>>
where
    F: Fn(&Tensor) -> Result<Tensor>,
{
    let x = Tensor::with_options(
        input.shape().clone(),
        input.get_data()?,
        TensorOptions::tracked().device(input.device()),
    )?;
    f(&x)?.reduce_sum().backward()?;
    x.gradient()?.get_data()
}

/// Largest absolute difference between backward-pass and finite-difference
/// gradients of `sum(f(x))` at `input`.
pub fn check_gradient<F>(f: F, input: &Tensor, eps: f64) -> Result<f64>
where
    F: Fn(&Tensor) -> Result<Tensor>,
{
    let analytic = autodiff_grad(&f, input)?;
    let numeric = finite_diff_grad(&f, input, eps)?;
    Ok(max_grad_error(&analytic, &numeric))
}

/// Maximum absolute difference between two gradient vectors, or infinity
/// when their lengths differ.
pub fn max_grad_error(grad1: &[f64], grad2: &[f64]) -> f64 {
    if grad1.len() != grad2.len() {
        return f64::INFINITY;
    }
    grad1
        .iter()
        .zip(grad2)
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finite_diff_quadratic() {
        // sum(x^2 + 2x), d/dx = 2x + 2
        let x = Tensor::new([3], vec![1.0, -2.0, 0.5]).unwrap();
        let grads = finite_diff_grad(|t| t.pow(2.0).add(&t.elementwise_mult_scalar(2.0)), &x, 1e-6)
            .unwrap();

        for (g, x) in grads.iter().zip([1.0, -2.0, 0.5]) {
            assert!((g - (2.0 * x + 2.0)).abs() < 1e-5, "{g} vs {}", 2.0 * x + 2.0);
        }
    }

    #[test]
    fn test_autodiff_matches_finite_diff() {
        let x = Tensor::new([2, 2], vec![0.5, 1.5, 2.0, 3.0]).unwrap();
        let f = |t: &Tensor| t.pow(3.0).elementwise_division(&t.add_scalar(1.0));
        let err = check_gradient(f, &x, 1e-6).unwrap();
        assert!(err < 1e-4, "max error {err}");
    }

    #[test]
    fn test_input_is_untouched() {
        let x = Tensor::new([2], vec![1.0, 2.0]).unwrap();
        autodiff_grad(|t| Ok(t.pow(2.0)), &x).unwrap();
        assert!(!x.requires_grad());
        assert_eq!(x.get_data().unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_max_grad_error() {
        let g1 = vec![1.0, 2.0, 3.0];
        let g2 = vec![1.1, 2.0, 2.8];

        let err = max_grad_error(&g1, &g2);
        assert!((err - 0.2).abs() < 1e-10);
        assert_eq!(max_grad_error(&g1, &g2[..2]), f64::INFINITY);
    }
}
