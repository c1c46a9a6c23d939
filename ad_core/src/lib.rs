//! # ad_core - Lazy Tensor Graphs with Reverse-mode Autodiff
//!
//! Operations on a [`Tensor`] build an expression graph without computing
//! anything. Reading data evaluates the graph on demand, each node at most
//! once, by dispatching kernels to the backend registered for the node's
//! device. [`Tensor::backward`] walks the same graph in reverse and
//! accumulates a gradient on every tracked node.
//!
//! ## Quick Start
//!
//! ```
//! use ad_core::Tensor;
//!
//! let x = Tensor::var([2, 3], vec![1.0, 2.0, 3.0, 3.0, 2.0, 1.0]).unwrap();
//! let y = Tensor::var([2, 3], vec![3.0, 2.0, 1.0, 1.0, 2.0, 3.0]).unwrap();
//!
//! // L = sum((x - y)^3); nothing is computed yet
//! let loss = x.subtract(&y).unwrap().pow(3.0).reduce_sum();
//! assert!(!loss.is_materialized());
//!
//! assert_eq!(loss.item().unwrap(), 0.0);
//!
//! // dL/dx = 3 (x - y)^2, dL/dy = -3 (x - y)^2
//! loss.backward().unwrap();
//! let dx = x.gradient().unwrap().get_data().unwrap();
//! let dy = y.gradient().unwrap().get_data().unwrap();
//! assert_eq!(dx, vec![12.0, 0.0, 12.0, 12.0, 0.0, 12.0]);
//! assert_eq!(dy, vec![-12.0, 0.0, -12.0, -12.0, 0.0, -12.0]);
//! ```
//!
//! ## Supported Operations
//!
//! | Category | Operations |
//! |----------|------------|
//! | Elementwise | [`Tensor::add`], [`Tensor::subtract`], [`Tensor::elementwise_mult`], [`Tensor::elementwise_division`], scalar forms on either side, [`Tensor::neg`], [`Tensor::pow`], [`Tensor::reciprocal`] |
//! | Activation | [`Tensor::relu`], [`Tensor::binarize`] |
//! | Structural | [`Tensor::matmul`], [`Tensor::transpose`], [`Tensor::reshape`], [`Tensor::reduce_sum`] |
//! | Placement | [`Tensor::to_device`], [`Tensor::detach`] |
//!
//! Binary elementwise operations accept identical shapes or a single-element
//! operand on either side. Anything else is a [`TensorError::ShapeMismatch`].
//!
//! ## Architecture
//!
//! - **[`Tensor`]**: reference-counted handle to a graph node. Cloning is O(1).
//! - **[`TensorOp`]**: the closed set of operations, with forward and
//!   gradient rules.
//! - **[`runtime`]**: backend registry. The host backend is always present;
//!   the accelerator backend is opened from [`RuntimeConfig`] or installed
//!   explicitly.
//! - **[`finite_diff_grad`]**: numerical gradients for validating the
//!   backward pass.

mod backward;
pub mod config;
mod error;
mod eval;
mod finite_diff;
mod node;
mod ops;
pub mod runtime;
mod tensor;

pub use ad_tensor::{BinaryKernel, Device, Shape, UnaryKernel};
pub use config::{AcceleratorPolicy, RuntimeConfig};
pub use error::{Result, TensorError};
pub use finite_diff::{autodiff_grad, check_gradient, finite_diff_grad, max_grad_error};
pub use node::NodeId;
pub use ops::TensorOp;
pub use tensor::{Tensor, TensorOptions};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::{AcceleratorPolicy, RuntimeConfig};
    pub use crate::error::{Result, TensorError};
    pub use crate::runtime;
    pub use crate::tensor::{Tensor, TensorOptions};
    pub use ad_tensor::{Device, Shape};
}
