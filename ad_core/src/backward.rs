//! Reverse-mode automatic differentiation.
//!
//! The backward pass walks the graph recursively from the node it is called
//! on, one edge at a time:
//! 1. Untracked nodes stop the walk.
//! 2. The incoming gradient is added to the node's accumulator.
//! 3. The node's operation turns the incoming gradient into one gradient per
//!    operand, and the walk recurses into each operand in order.
//!
//! A node reached along several paths accumulates the sum of all incoming
//! gradients. A walk that fails part-way keeps the accumulations it already
//! made.

use tracing::trace;

use crate::error::{Result, TensorError};
use crate::ops::local_gradients;
use crate::tensor::Tensor;

pub(crate) fn backward(tensor: &Tensor, grad: Tensor) -> Result<()> {
    let node = &tensor.0;
    if !node.save_gradient {
        return Ok(());
    }
    if grad.shape() != &node.shape {
        return Err(TensorError::InvalidState(format!(
            "gradient of shape {} does not match node {} of shape {}",
            grad.shape(),
            node.id,
            node.shape
        )));
    }
    trace!(id = %node.id, op = node.op.name(), "backward visit");

    {
        let mut slot = node.gradient.lock();
        let accumulated = match slot.as_ref() {
            Some(prev) => prev.add(&grad)?,
            None => grad.clone(),
        };
        *slot = Some(accumulated);
    }

    let grads = local_gradients(node, &grad)?;
    for (child, g) in node.children.iter().zip(grads) {
        if let Some(g) = g {
            backward(child, g)?;
        }
    }
    Ok(())
}
