//! Lazy evaluation.
//!
//! A node is materialized the first time its data is read or it is needed as
//! an operand. Operands are evaluated first (post-order), staged onto the
//! node's device, and fed to the node's forward rule. The result is stored in
//! the node's write-once cell, so each kernel runs at most once per node.

use std::sync::Arc;

use tracing::trace;

use ad_tensor::{Backend, Buffer, Device};

use crate::error::Result;
use crate::ops;
use crate::runtime;
use crate::tensor::Tensor;

/// Materialize `tensor` and return its buffer.
pub(crate) fn eval(tensor: &Tensor) -> Result<Buffer> {
    let node = &tensor.0;
    if let Some(buffer) = node.buffer.get() {
        return Ok(buffer.clone());
    }

    let backend = runtime::backend(node.device)?;
    let mut inputs = Vec::with_capacity(node.children.len());
    for child in &node.children {
        let buffer = eval(child)?;
        inputs.push(stage(buffer, node.device, &*backend)?);
    }

    let buffer = ops::forward(&node.op, &*backend, node.numel(), &inputs)?;
    trace!(
        id = %node.id,
        op = node.op.name(),
        backend = backend.name(),
        view = node.op.is_view(),
        "materialized"
    );
    Ok(node.buffer.get_or_init(|| buffer).clone())
}

/// Make `buffer` resident on `device`, copying through host memory when it
/// lives elsewhere.
pub(crate) fn stage(buffer: Buffer, device: Device, target: &dyn Backend) -> Result<Buffer> {
    if buffer.device() == device {
        return Ok(buffer);
    }
    let source = runtime::backend(buffer.device())?;
    let host = source.copy_device_to_host(&*buffer)?;
    trace!(from = %buffer.device(), to = %device, len = host.len(), "staging buffer");
    Ok(Arc::from(target.copy_host_to_device(&host)?))
}

/// Read a buffer back into host memory.
pub(crate) fn to_host(buffer: &Buffer) -> Result<Vec<f64>> {
    let backend = runtime::backend(buffer.device())?;
    Ok(backend.copy_device_to_host(&**buffer)?)
}
