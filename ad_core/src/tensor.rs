//! The public tensor handle.

use std::fmt;
use std::sync::Arc;

use tracing::instrument;

use ad_tensor::{BinaryKernel, Buffer, Device, Shape, UnaryKernel};

use crate::backward;
use crate::error::{Result, TensorError};
use crate::eval;
use crate::node::{Node, NodeId};
use crate::ops::TensorOp;
use crate::runtime;

/// Options for building a tensor.
///
/// For leaves and fills, `device: None` means the host. For operations it
/// means the device inferred from the operands, and `requires_grad` is OR-ed
/// with the operands' tracking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TensorOptions {
    pub requires_grad: bool,
    pub device: Option<Device>,
}

impl TensorOptions {
    /// Gradient-tracked, on the host.
    pub fn tracked() -> Self {
        TensorOptions {
            requires_grad: true,
            device: None,
        }
    }

    /// Untracked, on `device`.
    pub fn on(device: Device) -> Self {
        TensorOptions {
            requires_grad: false,
            device: Some(device),
        }
    }

    pub fn requires_grad(mut self, requires_grad: bool) -> Self {
        self.requires_grad = requires_grad;
        self
    }

    pub fn device(mut self, device: Device) -> Self {
        self.device = Some(device);
        self
    }
}

/// A handle to a node of the lazy expression graph.
///
/// Cloning is O(1) and aliases the same node. Tensors are immutable: every
/// operation returns a new handle whose node records the operation and its
/// operands. No kernel runs until data is read with [`Tensor::get_data`]
/// (or a derived tensor is read), and then each node is computed once.
///
/// Binary elementwise operations accept operands of identical shape, or one
/// operand holding a single element which is broadcast over the other.
#[derive(Clone)]
pub struct Tensor(pub(crate) Arc<Node>);

fn check_shape(op: &'static str, shape: &Shape) -> Result<()> {
    if shape.is_valid() {
        Ok(())
    } else {
        Err(TensorError::shape(
            op,
            format!("{shape} is not a valid shape, dimensions must be positive and their product must fit in usize"),
        ))
    }
}

impl Tensor {
    // === Construction ===

    /// Untracked host tensor holding `data` in row-major order.
    pub fn new(shape: impl Into<Shape>, data: Vec<f64>) -> Result<Tensor> {
        Tensor::with_options(shape, data, TensorOptions::default())
    }

    /// Gradient-tracked host tensor.
    pub fn var(shape: impl Into<Shape>, data: Vec<f64>) -> Result<Tensor> {
        Tensor::with_options(shape, data, TensorOptions::tracked())
    }

    /// Same as [`Tensor::new`].
    pub fn constant(shape: impl Into<Shape>, data: Vec<f64>) -> Result<Tensor> {
        Tensor::new(shape, data)
    }

    /// Leaf tensor with explicit options. The data is copied to the target
    /// device immediately.
    pub fn with_options(
        shape: impl Into<Shape>,
        data: Vec<f64>,
        options: TensorOptions,
    ) -> Result<Tensor> {
        let shape = shape.into();
        check_shape("tensor", &shape)?;
        if data.len() != shape.numel() {
            return Err(TensorError::shape(
                "tensor",
                format!("{} values cannot fill shape {shape}", data.len()),
            ));
        }
        let device = options.device.unwrap_or_default();
        let backend = runtime::backend(device)?;
        let buffer: Buffer = Arc::from(backend.copy_host_to_device(&data)?);
        Ok(Tensor(Arc::new(Node::leaf(
            buffer,
            shape,
            device,
            options.requires_grad,
        ))))
    }

    pub fn zeros(shape: impl Into<Shape>) -> Result<Tensor> {
        Tensor::full_with(shape, 0.0, TensorOptions::default())
    }

    pub fn zeros_with(shape: impl Into<Shape>, options: TensorOptions) -> Result<Tensor> {
        Tensor::full_with(shape, 0.0, options)
    }

    pub fn ones(shape: impl Into<Shape>) -> Result<Tensor> {
        Tensor::full_with(shape, 1.0, TensorOptions::default())
    }

    pub fn ones_with(shape: impl Into<Shape>, options: TensorOptions) -> Result<Tensor> {
        Tensor::full_with(shape, 1.0, options)
    }

    pub fn full(shape: impl Into<Shape>, value: f64) -> Result<Tensor> {
        Tensor::full_with(shape, value, TensorOptions::default())
    }

    /// Pending tensor with every element equal to `value`. The fill kernel
    /// runs on first read.
    pub fn full_with(shape: impl Into<Shape>, value: f64, options: TensorOptions) -> Result<Tensor> {
        let shape = shape.into();
        check_shape("full", &shape)?;
        let device = options.device.unwrap_or_default();
        runtime::backend(device)?;
        Ok(Tensor(Arc::new(Node::new(
            TensorOp::Fill(value),
            vec![],
            shape,
            device,
            options.requires_grad,
        ))))
    }

    /// Leaf filled with samples from N(`mean`, `stddev`²), drawn from the
    /// runtime's seeded generator.
    pub fn fill_random(
        shape: impl Into<Shape>,
        mean: f64,
        stddev: f64,
        options: TensorOptions,
    ) -> Result<Tensor> {
        let shape = shape.into();
        check_shape("fill_random", &shape)?;
        let data = runtime::sample_normal(shape.numel(), mean, stddev)?;
        Tensor::with_options(shape, data, options)
    }

    fn from_op(op: TensorOp, children: Vec<Tensor>, shape: Shape) -> Tensor {
        let device = Device::resolve(children.iter().map(Tensor::device));
        let save_gradient = children.iter().any(Tensor::requires_grad);
        Tensor(Arc::new(Node::new(op, children, shape, device, save_gradient)))
    }

    /// Like `from_op`, but an explicit device wins over the inferred one and
    /// an explicit `requires_grad` turns tracking on.
    fn from_op_with(
        op: TensorOp,
        children: Vec<Tensor>,
        shape: Shape,
        options: TensorOptions,
    ) -> Result<Tensor> {
        let device = match options.device {
            Some(device) => {
                runtime::backend(device)?;
                device
            }
            None => Device::resolve(children.iter().map(Tensor::device)),
        };
        let save_gradient = options.requires_grad || children.iter().any(Tensor::requires_grad);
        Ok(Tensor(Arc::new(Node::new(
            op,
            children,
            shape,
            device,
            save_gradient,
        ))))
    }

    // === Accessors ===

    pub fn id(&self) -> NodeId {
        self.0.id
    }

    pub fn shape(&self) -> &Shape {
        &self.0.shape
    }

    pub fn numel(&self) -> usize {
        self.0.numel()
    }

    pub fn device(&self) -> Device {
        self.0.device
    }

    pub fn requires_grad(&self) -> bool {
        self.0.save_gradient
    }

    pub fn op(&self) -> TensorOp {
        self.0.op
    }

    pub fn operands(&self) -> &[Tensor] {
        &self.0.children
    }

    /// True once the node's buffer has been computed (always true for leaves).
    pub fn is_materialized(&self) -> bool {
        self.0.is_materialized()
    }

    /// True once a backward walk has deposited a gradient on this node.
    pub fn found_gradient(&self) -> bool {
        self.0.found_gradient()
    }

    // === Elementwise ===

    fn unary(&self, kernel: UnaryKernel) -> Tensor {
        Tensor::from_op(
            TensorOp::Unary(kernel),
            vec![self.clone()],
            self.shape().clone(),
        )
    }

    /// Apply a unary kernel with explicit tracking and placement.
    pub fn unary_with(&self, kernel: UnaryKernel, options: TensorOptions) -> Result<Tensor> {
        Tensor::from_op_with(
            TensorOp::Unary(kernel),
            vec![self.clone()],
            self.shape().clone(),
            options,
        )
    }

    /// Apply a binary elementwise kernel with explicit tracking and placement.
    pub fn binary_with(
        &self,
        kernel: BinaryKernel,
        other: &Tensor,
        options: TensorOptions,
    ) -> Result<Tensor> {
        let (shape, broadcast) = self
            .shape()
            .broadcast_with(other.shape())
            .ok_or_else(|| TensorError::operands(kernel.name(), self.shape(), other.shape()))?;
        Tensor::from_op_with(
            TensorOp::Binary(kernel, broadcast),
            vec![self.clone(), other.clone()],
            shape,
            options,
        )
    }

    pub fn add(&self, other: &Tensor) -> Result<Tensor> {
        self.binary_with(BinaryKernel::Add, other, TensorOptions::default())
    }

    pub fn add_with(&self, other: &Tensor, options: TensorOptions) -> Result<Tensor> {
        self.binary_with(BinaryKernel::Add, other, options)
    }

    pub fn subtract(&self, other: &Tensor) -> Result<Tensor> {
        self.binary_with(BinaryKernel::Sub, other, TensorOptions::default())
    }

    pub fn subtract_with(&self, other: &Tensor, options: TensorOptions) -> Result<Tensor> {
        self.binary_with(BinaryKernel::Sub, other, options)
    }

    pub fn elementwise_mult(&self, other: &Tensor) -> Result<Tensor> {
        self.binary_with(BinaryKernel::Mul, other, TensorOptions::default())
    }

    pub fn elementwise_mult_with(&self, other: &Tensor, options: TensorOptions) -> Result<Tensor> {
        self.binary_with(BinaryKernel::Mul, other, options)
    }

    pub fn elementwise_division(&self, other: &Tensor) -> Result<Tensor> {
        self.binary_with(BinaryKernel::Div, other, TensorOptions::default())
    }

    pub fn elementwise_division_with(
        &self,
        other: &Tensor,
        options: TensorOptions,
    ) -> Result<Tensor> {
        self.binary_with(BinaryKernel::Div, other, options)
    }

    pub fn add_scalar(&self, n: f64) -> Tensor {
        self.unary(UnaryKernel::AddScalar(n))
    }

    /// `self - n`
    pub fn subtract_scalar(&self, n: f64) -> Tensor {
        self.unary(UnaryKernel::SubScalar(n))
    }

    /// `n - self`
    pub fn scalar_subtract(&self, n: f64) -> Tensor {
        self.unary(UnaryKernel::ScalarSub(n))
    }

    pub fn elementwise_mult_scalar(&self, n: f64) -> Tensor {
        self.unary(UnaryKernel::MulScalar(n))
    }

    /// `self / n`
    pub fn elementwise_division_scalar(&self, n: f64) -> Tensor {
        self.unary(UnaryKernel::DivScalar(n))
    }

    /// `n / self`
    pub fn scalar_division(&self, n: f64) -> Tensor {
        self.unary(UnaryKernel::ScalarDiv(n))
    }

    pub fn neg(&self) -> Tensor {
        self.unary(UnaryKernel::Neg)
    }

    pub fn pow(&self, exponent: f64) -> Tensor {
        self.unary(UnaryKernel::Pow(exponent))
    }

    /// `max(x, 0)`; `relu(0)` is `0`.
    pub fn relu(&self) -> Tensor {
        self.unary(UnaryKernel::Relu)
    }

    /// `1` where `x > 0`, else `0`.
    pub fn binarize(&self) -> Tensor {
        self.unary(UnaryKernel::Binarize)
    }

    /// `1 / x`
    pub fn reciprocal(&self) -> Tensor {
        self.scalar_division(1.0)
    }

    // === Structural ===

    /// Matrix product. `other` must be 2-D; `self` is 2-D, or 3-D for a
    /// batched product sharing `other` across the batch. Batched products
    /// cannot be differentiated.
    pub fn matmul(&self, other: &Tensor) -> Result<Tensor> {
        self.matmul_with(other, TensorOptions::default())
    }

    pub fn matmul_with(&self, other: &Tensor, options: TensorOptions) -> Result<Tensor> {
        let (shape, dims) = self
            .shape()
            .matmul_with(other.shape())
            .ok_or_else(|| TensorError::operands("matmul", self.shape(), other.shape()))?;
        check_shape("matmul", &shape)?;
        Tensor::from_op_with(
            TensorOp::Matmul(dims),
            vec![self.clone(), other.clone()],
            shape,
            options,
        )
    }

    /// Swap the last two axes of a 2-D or 3-D tensor.
    pub fn transpose(&self) -> Result<Tensor> {
        self.transpose_with(TensorOptions::default())
    }

    pub fn transpose_with(&self, options: TensorOptions) -> Result<Tensor> {
        let (shape, dims) = self.shape().transposed().ok_or_else(|| {
            TensorError::shape("transpose", format!("{} is not 2-D or 3-D", self.shape()))
        })?;
        Tensor::from_op_with(TensorOp::Transpose(dims), vec![self.clone()], shape, options)
    }

    pub fn reshape(&self, shape: impl Into<Shape>) -> Result<Tensor> {
        self.reshape_with(shape, TensorOptions::default())
    }

    pub fn reshape_with(&self, shape: impl Into<Shape>, options: TensorOptions) -> Result<Tensor> {
        let shape = shape.into();
        check_shape("reshape", &shape)?;
        if shape.numel() != self.numel() {
            return Err(TensorError::operands("reshape", self.shape(), &shape));
        }
        Tensor::from_op_with(TensorOp::Reshape, vec![self.clone()], shape, options)
    }

    /// Sum of all elements, as a tensor of shape `[1]`.
    pub fn reduce_sum(&self) -> Tensor {
        Tensor::from_op(TensorOp::ReduceSum, vec![self.clone()], Shape::singleton())
    }

    pub fn reduce_sum_with(&self, options: TensorOptions) -> Result<Tensor> {
        Tensor::from_op_with(
            TensorOp::ReduceSum,
            vec![self.clone()],
            Shape::singleton(),
            options,
        )
    }

    /// Same values, without gradient tracking.
    pub fn detach(&self) -> Tensor {
        Tensor(Arc::new(Node::new(
            TensorOp::Detach,
            vec![self.clone()],
            self.shape().clone(),
            self.device(),
            false,
        )))
    }

    /// Same values placed on `device`. Gradients flow back to the source
    /// device.
    pub fn to_device(&self, device: Device) -> Result<Tensor> {
        runtime::backend(device)?;
        if device == self.device() {
            return Ok(self.clone());
        }
        Ok(Tensor(Arc::new(Node::new(
            TensorOp::ToDevice,
            vec![self.clone()],
            self.shape().clone(),
            device,
            self.requires_grad(),
        ))))
    }

    // === Evaluation ===

    /// Materialize the tensor (and anything it depends on) and copy its
    /// values to host memory in row-major order.
    #[instrument(skip(self), fields(id = %self.0.id, shape = %self.0.shape))]
    pub fn get_data(&self) -> Result<Vec<f64>> {
        let buffer = eval::eval(self)?;
        eval::to_host(&buffer)
    }

    /// The single value of a one-element tensor.
    pub fn item(&self) -> Result<f64> {
        if self.numel() != 1 {
            return Err(TensorError::InvalidState(format!(
                "item() needs a single-element tensor, got shape {}",
                self.shape()
            )));
        }
        Ok(self.get_data()?[0])
    }

    /// Write every value to stdout, one per line.
    pub fn print(&self) -> Result<()> {
        for value in self.get_data()? {
            println!("{value:.6}");
        }
        Ok(())
    }

    // === Gradients ===

    /// Backpropagate from this tensor with a seed of ones of its own shape.
    ///
    /// On a non-scalar tensor this differentiates the sum of its elements.
    pub fn backward(&self) -> Result<()> {
        let seed = Tensor::ones_with(self.shape().clone(), TensorOptions::on(self.device()))?;
        self.backward_with(&seed)
    }

    /// Backpropagate `grad` from this tensor, accumulating into the gradient
    /// of every tracked node it depends on. `grad` must have this tensor's
    /// shape.
    #[instrument(skip(self, grad), fields(id = %self.0.id))]
    pub fn backward_with(&self, grad: &Tensor) -> Result<()> {
        if grad.shape() != self.shape() {
            return Err(TensorError::InvalidState(format!(
                "seed of shape {} does not match tensor {} of shape {}",
                grad.shape(),
                self.id(),
                self.shape()
            )));
        }
        backward::backward(self, grad.detach())
    }

    /// The gradient accumulated by previous backward calls.
    pub fn gradient(&self) -> Result<Tensor> {
        if !self.requires_grad() {
            return Err(TensorError::InvalidState(format!(
                "tensor {} does not track gradients",
                self.id()
            )));
        }
        self.0.gradient.lock().clone().ok_or_else(|| {
            TensorError::InvalidState(format!("no gradient has reached tensor {}", self.id()))
        })
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

// === Operator overloads ===

impl std::ops::Neg for &Tensor {
    type Output = Tensor;

    fn neg(self) -> Tensor {
        Tensor::neg(self)
    }
}

impl std::ops::Neg for Tensor {
    type Output = Tensor;

    fn neg(self) -> Tensor {
        Tensor::neg(&self)
    }
}

/// `tensor op f64` and `f64 op tensor` for one arithmetic operator.
macro_rules! scalar_ops {
    ($trait:ident, $method:ident, $tensor_lhs:ident, $scalar_lhs:ident) => {
        impl std::ops::$trait<f64> for &Tensor {
            type Output = Tensor;

            fn $method(self, rhs: f64) -> Tensor {
                Tensor::$tensor_lhs(self, rhs)
            }
        }

        impl std::ops::$trait<f64> for Tensor {
            type Output = Tensor;

            fn $method(self, rhs: f64) -> Tensor {
                Tensor::$tensor_lhs(&self, rhs)
            }
        }

        impl std::ops::$trait<&Tensor> for f64 {
            type Output = Tensor;

            fn $method(self, rhs: &Tensor) -> Tensor {
                Tensor::$scalar_lhs(rhs, self)
            }
        }

        impl std::ops::$trait<Tensor> for f64 {
            type Output = Tensor;

            fn $method(self, rhs: Tensor) -> Tensor {
                Tensor::$scalar_lhs(&rhs, self)
            }
        }
    };
}

scalar_ops!(Add, add, add_scalar, add_scalar);
scalar_ops!(Sub, sub, subtract_scalar, scalar_subtract);
scalar_ops!(Mul, mul, elementwise_mult_scalar, elementwise_mult_scalar);
scalar_ops!(Div, div, elementwise_division_scalar, scalar_division);
