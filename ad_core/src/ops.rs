//! The operation catalogue.
//!
//! Every node carries one [`TensorOp`]. This module holds the two tables the
//! engine dispatches on: [`forward`] computes a node's buffer from its
//! operands' buffers, and [`local_gradients`] turns the gradient arriving at a
//! node into one gradient per operand.

use std::sync::Arc;

use ad_tensor::prelude::*;

use crate::error::{Result, TensorError};
use crate::node::Node;
use crate::tensor::{Tensor, TensorOptions};

/// The operation a node performs, with its scalar parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TensorOp {
    /// Data supplied at construction.
    Leaf,
    /// Every element set to a constant.
    Fill(f64),
    /// Elementwise op over one operand (negation, relu, scalar arithmetic, pow).
    Unary(UnaryKernel),
    /// Elementwise op over two operands; `Broadcast` names the scalar side.
    Binary(BinaryKernel, Broadcast),
    Matmul(MatmulDims),
    /// Swap of the last two axes.
    Transpose(TransposeDims),
    /// Same elements under a new shape.
    Reshape,
    /// Sum of all elements into shape `[1]`.
    ReduceSum,
    /// Same values with gradient tracking cut.
    Detach,
    /// Same values moved to the node's device.
    ToDevice,
}

impl TensorOp {
    pub fn name(&self) -> &'static str {
        match self {
            TensorOp::Leaf => "leaf",
            TensorOp::Fill(_) => "fill",
            TensorOp::Unary(k) => k.name(),
            TensorOp::Binary(k, _) => k.name(),
            TensorOp::Matmul(_) => "matmul",
            TensorOp::Transpose(_) => "transpose",
            TensorOp::Reshape => "reshape",
            TensorOp::ReduceSum => "reduce_sum",
            TensorOp::Detach => "detach",
            TensorOp::ToDevice => "to_device",
        }
    }

    /// True for ops whose forward pass reuses the operand buffer.
    pub fn is_view(&self) -> bool {
        matches!(
            self,
            TensorOp::Reshape | TensorOp::Detach | TensorOp::ToDevice
        )
    }
}

/// Compute the buffer of a node of `numel` elements from its operands'
/// buffers, already staged onto `backend`'s device.
pub(crate) fn forward(
    op: &TensorOp,
    backend: &dyn Backend,
    numel: usize,
    inputs: &[Buffer],
) -> Result<Buffer> {
    match *op {
        TensorOp::Reshape | TensorOp::Detach | TensorOp::ToDevice => Ok(inputs[0].clone()),
        TensorOp::Leaf => Err(TensorError::InvalidState(
            "leaf node has no materialized data".into(),
        )),
        TensorOp::Fill(value) => launch(backend, numel, |out| backend.fill(out, value)),
        TensorOp::Unary(kernel) => {
            launch(backend, numel, |out| backend.unary(kernel, out, &*inputs[0]))
        }
        TensorOp::Binary(kernel, broadcast) => launch(backend, numel, |out| {
            backend.binary(kernel, out, &*inputs[0], &*inputs[1], broadcast)
        }),
        TensorOp::Matmul(dims) => launch(backend, numel, |out| {
            backend.matmul(out, &*inputs[0], &*inputs[1], dims)
        }),
        TensorOp::Transpose(dims) => {
            launch(backend, numel, |out| backend.transpose(out, &*inputs[0], dims))
        }
        TensorOp::ReduceSum => launch(backend, numel, |out| backend.reduce_sum(out, &*inputs[0])),
    }
}

fn launch<F>(backend: &dyn Backend, numel: usize, kernel: F) -> Result<Buffer>
where
    F: FnOnce(&mut dyn DeviceStorage) -> ad_tensor::Result<()>,
{
    let mut out = backend.allocate(numel)?;
    kernel(&mut *out)?;
    Ok(Arc::from(out))
}

/// Gradient contributions to each operand of `node`, given the gradient
/// `grad` arriving at it. `None` marks an operand that receives nothing.
///
/// Gradient expressions are built on detached operands, so the returned
/// tensors never track gradients themselves.
pub(crate) fn local_gradients(node: &Node, grad: &Tensor) -> Result<Vec<Option<Tensor>>> {
    let operand = |i: usize| node.children[i].detach();

    let grads = match node.op {
        TensorOp::Leaf | TensorOp::Fill(_) | TensorOp::Detach => vec![],

        TensorOp::Unary(kernel) => {
            let a = operand(0);
            let g = match kernel {
                UnaryKernel::Neg | UnaryKernel::ScalarSub(_) => grad.neg(),
                UnaryKernel::AddScalar(_) | UnaryKernel::SubScalar(_) => grad.clone(),
                UnaryKernel::MulScalar(n) => grad.elementwise_mult_scalar(n),
                UnaryKernel::DivScalar(n) => grad.elementwise_division_scalar(n),
                // d(n/a) = -n/a^2
                UnaryKernel::ScalarDiv(n) => {
                    grad.elementwise_mult(&a.pow(2.0).scalar_division(-n))?
                }
                UnaryKernel::Pow(n) => {
                    grad.elementwise_mult(&a.pow(n - 1.0).elementwise_mult_scalar(n))?
                }
                UnaryKernel::Relu => grad.elementwise_mult(&a.binarize())?,
                UnaryKernel::Binarize => Tensor::zeros_with(
                    a.shape().clone(),
                    TensorOptions::on(node.device),
                )?,
            };
            vec![Some(g)]
        }

        TensorOp::Binary(kernel, _) => {
            let (a, b) = (operand(0), operand(1));
            let (ga, gb) = match kernel {
                BinaryKernel::Add => (grad.clone(), grad.clone()),
                BinaryKernel::Sub => (grad.clone(), grad.neg()),
                BinaryKernel::Mul => (b.elementwise_mult(grad)?, a.elementwise_mult(grad)?),
                // d(a/b)/db = -a/b^2
                BinaryKernel::Div => (
                    grad.elementwise_division(&b)?,
                    grad.elementwise_mult(&a)?
                        .elementwise_division(&b.pow(2.0))?
                        .neg(),
                ),
            };
            vec![
                Some(unbroadcast(ga, &a, &node.shape)?),
                Some(unbroadcast(gb, &b, &node.shape)?),
            ]
        }

        TensorOp::Matmul(dims) => {
            if dims.batch > 1 || node.children[0].shape().ndim() == 3 {
                return Err(TensorError::UnsupportedOperation(
                    "gradient of a batched (3-D) matmul".into(),
                ));
            }
            let (a, b) = (operand(0), operand(1));
            vec![
                Some(grad.matmul(&b.transpose()?)?),
                Some(a.transpose()?.matmul(grad)?),
            ]
        }

        TensorOp::Transpose(_) => vec![Some(grad.transpose()?)],

        TensorOp::Reshape => vec![Some(grad.reshape(node.children[0].shape().clone())?)],

        TensorOp::ReduceSum => {
            let a = &node.children[0];
            let ones = Tensor::ones_with(a.shape().clone(), TensorOptions::on(node.device))?;
            vec![Some(ones.elementwise_mult(grad)?)]
        }

        TensorOp::ToDevice => vec![Some(grad.to_device(node.children[0].device())?)],
    };
    Ok(grads)
}

/// Reduce a gradient computed at the result shape back to the shape of a
/// broadcast scalar operand.
fn unbroadcast(grad: Tensor, operand: &Tensor, result: &Shape) -> Result<Tensor> {
    if operand.shape() == result {
        return Ok(grad);
    }
    let summed = grad.reduce_sum();
    if summed.shape() == operand.shape() {
        Ok(summed)
    } else {
        summed.reshape(operand.shape().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_ops() {
        assert!(TensorOp::Reshape.is_view());
        assert!(TensorOp::Detach.is_view());
        assert!(TensorOp::ToDevice.is_view());
        assert!(!TensorOp::ReduceSum.is_view());
        assert!(!TensorOp::Fill(0.0).is_view());
    }

    #[test]
    fn test_names() {
        assert_eq!(TensorOp::Unary(UnaryKernel::Pow(3.0)).name(), "pow");
        assert_eq!(TensorOp::Binary(BinaryKernel::Div, Broadcast::Rhs).name(), "div");
        assert_eq!(TensorOp::ReduceSum.name(), "reduce_sum");
    }

    #[test]
    fn test_unbroadcast_reduces_scalar_operand() {
        let result = Shape::from([2, 3]);
        let grad = Tensor::ones([2, 3]).unwrap();

        let scalar = Tensor::new([1, 1], vec![5.0]).unwrap();
        let g = unbroadcast(grad.clone(), &scalar, &result).unwrap();
        assert_eq!(g.shape(), &Shape::from([1, 1]));
        assert_eq!(g.get_data().unwrap(), vec![6.0]);

        let full = Tensor::zeros([2, 3]).unwrap();
        let g = unbroadcast(grad.clone(), &full, &result).unwrap();
        assert_eq!(g.id(), grad.id());
    }

    #[test]
    fn test_leaf_has_no_forward() {
        let backend = ad_backend_cpu::CpuBackend::new();
        let err = forward(&TensorOp::Leaf, &backend, 1, &[]).unwrap_err();
        assert!(matches!(err, TensorError::InvalidState(_)));
    }
}
