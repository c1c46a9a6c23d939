//! Graph nodes.
//!
//! A node is created by every tensor operation and shared through
//! [`Tensor`] handles. Parents hold their operands as handles, so the graph
//! is a reference-counted DAG and a node lives as long as anything reachable
//! still refers to it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use ad_tensor::{Buffer, Device, Shape};

use crate::ops::TensorOp;
use crate::tensor::Tensor;

static NODE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_node_id() -> u64 {
    NODE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Unique identifier for a node in the computation graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub(crate) struct Node {
    pub id: NodeId,
    pub shape: Shape,
    pub device: Device,
    /// Gradient tracking. Fixed at construction.
    pub save_gradient: bool,
    pub op: TensorOp,
    pub children: Vec<Tensor>,
    /// Set once, either at construction (leaves) or on first evaluation.
    pub buffer: OnceCell<Buffer>,
    /// Accumulated gradient; `Some` once a backward walk has reached the node.
    pub gradient: Mutex<Option<Tensor>>,
}

impl Node {
    pub fn new(
        op: TensorOp,
        children: Vec<Tensor>,
        shape: Shape,
        device: Device,
        save_gradient: bool,
    ) -> Self {
        Node {
            id: NodeId(next_node_id()),
            shape,
            device,
            save_gradient,
            op,
            children,
            buffer: OnceCell::new(),
            gradient: Mutex::new(None),
        }
    }

    /// Leaf holding data that is already on `device`.
    pub fn leaf(buffer: Buffer, shape: Shape, device: Device, save_gradient: bool) -> Self {
        Node {
            buffer: OnceCell::with_value(buffer),
            ..Node::new(TensorOp::Leaf, vec![], shape, device, save_gradient)
        }
    }

    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    pub fn is_materialized(&self) -> bool {
        self.buffer.get().is_some()
    }

    pub fn found_gradient(&self) -> bool {
        self.gradient.lock().is_some()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("op", &self.op)
            .field("shape", &self.shape)
            .field("device", &self.device)
            .field("save_gradient", &self.save_gradient)
            .field(
                "children",
                &self.children.iter().map(Tensor::id).collect::<Vec<_>>(),
            )
            .field("materialized", &self.is_materialized())
            .finish()
    }
}
