//! Shapes and the narrow broadcasting rules used by every tensor operation.

use std::fmt;

/// A tensor shape (dimensions).
///
/// A valid shape is non-empty and every dimension is positive, so `numel()`
/// is always at least one.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Shape(pub Vec<usize>);

/// Which operand of a binary elementwise operation is a broadcast scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Broadcast {
    /// Both operands have the result shape.
    None,
    /// The left operand holds a single element.
    Lhs,
    /// The right operand holds a single element.
    Rhs,
}

/// Loop bounds for a (possibly batched) matrix multiply.
///
/// `lhs` is `[batch, m, k]` (batch is 1 for a plain 2-D product), `rhs` is
/// always `[k, n]` and shared across the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatmulDims {
    pub batch: usize,
    pub m: usize,
    pub k: usize,
    pub n: usize,
}

/// Loop bounds for swapping the last two axes of a `[batch, rows, cols]` input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransposeDims {
    pub batch: usize,
    pub rows: usize,
    pub cols: usize,
}

impl Shape {
    /// Create a new shape from dimensions.
    pub fn new(dims: Vec<usize>) -> Self {
        Shape(dims)
    }

    /// The single-element shape `[1]` produced by full reductions.
    pub fn singleton() -> Self {
        Shape(vec![1])
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.0.len()
    }

    /// Get dimension at index.
    pub fn dim(&self, idx: usize) -> usize {
        self.0[idx]
    }

    /// Get dimensions as slice.
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Total number of elements.
    pub fn numel(&self) -> usize {
        self.0.iter().product()
    }

    /// Element count, or `None` if it does not fit in `usize`.
    pub fn checked_numel(&self) -> Option<usize> {
        self.0.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    /// True when the shape has at least one axis, no zero-sized axis, and an
    /// element count that fits in `usize`.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && self.0.iter().all(|&d| d > 0) && self.checked_numel().is_some()
    }

    /// True for any single-element shape (`[1]`, `[1, 1]`, ...).
    pub fn is_scalar(&self) -> bool {
        self.numel() == 1
    }

    /// Resolve the result shape of a binary elementwise operation.
    ///
    /// Only two forms are accepted: identical shapes, or one side holding a
    /// single element. Returns `None` for anything else.
    pub fn broadcast_with(&self, other: &Shape) -> Option<(Shape, Broadcast)> {
        if self == other {
            Some((self.clone(), Broadcast::None))
        } else if other.is_scalar() {
            Some((self.clone(), Broadcast::Rhs))
        } else if self.is_scalar() {
            Some((other.clone(), Broadcast::Lhs))
        } else {
            None
        }
    }

    /// Resolve `self @ rhs`: `rhs` must be 2-D, `self` 2-D or 3-D (batched),
    /// and the inner dimensions must agree.
    pub fn matmul_with(&self, rhs: &Shape) -> Option<(Shape, MatmulDims)> {
        if rhs.ndim() != 2 {
            return None;
        }
        let (k, n) = (rhs.dim(0), rhs.dim(1));
        match self.dims() {
            &[m, lk] if lk == k => Some((Shape(vec![m, n]), MatmulDims { batch: 1, m, k, n })),
            &[batch, m, lk] if lk == k => Some((
                Shape(vec![batch, m, n]),
                MatmulDims { batch, m, k, n },
            )),
            _ => None,
        }
    }

    /// Shape after swapping the last two axes (2-D or 3-D only).
    pub fn transposed(&self) -> Option<(Shape, TransposeDims)> {
        match self.dims() {
            &[rows, cols] => Some((Shape(vec![cols, rows]), TransposeDims { batch: 1, rows, cols })),
            &[batch, rows, cols] => Some((
                Shape(vec![batch, cols, rows]),
                TransposeDims { batch, rows, cols },
            )),
            _ => None,
        }
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape({:?})", self.0)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        if self.0.len() == 1 {
            write!(f, ",")?;
        }
        write!(f, ")")
    }
}

impl From<Vec<usize>> for Shape {
    fn from(v: Vec<usize>) -> Self {
        Shape(v)
    }
}

impl From<&[usize]> for Shape {
    fn from(s: &[usize]) -> Self {
        Shape(s.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(s: [usize; N]) -> Self {
        Shape(s.to_vec())
    }
}

impl From<&Shape> for Shape {
    fn from(s: &Shape) -> Self {
        s.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_basics() {
        let s = Shape::new(vec![2, 3, 4]);
        assert_eq!(s.ndim(), 3);
        assert_eq!(s.dim(0), 2);
        assert_eq!(s.dim(2), 4);
        assert_eq!(s.numel(), 24);
        assert!(s.is_valid());
        assert!(!s.is_scalar());
    }

    #[test]
    fn test_invalid_shapes() {
        assert!(!Shape::new(vec![]).is_valid());
        assert!(!Shape::new(vec![2, 0]).is_valid());
        assert!(Shape::singleton().is_valid());
    }

    #[test]
    fn test_overflowing_shape_is_invalid() {
        let s = Shape::from([usize::MAX, 2]);
        assert_eq!(s.checked_numel(), None);
        assert!(!s.is_valid());
        assert!(!Shape::from([(1usize << 63) + 1, 2]).is_valid());
        assert_eq!(Shape::from([usize::MAX, 1]).checked_numel(), Some(usize::MAX));
    }

    #[test]
    fn test_broadcast_same_shape() {
        let a = Shape::from([2, 3]);
        let b = Shape::from([2, 3]);
        assert_eq!(a.broadcast_with(&b), Some((a.clone(), Broadcast::None)));
    }

    #[test]
    fn test_broadcast_scalar_either_side() {
        let a = Shape::from([2, 3]);
        let s = Shape::singleton();
        assert_eq!(a.broadcast_with(&s), Some((a.clone(), Broadcast::Rhs)));
        assert_eq!(s.broadcast_with(&a), Some((a.clone(), Broadcast::Lhs)));

        // [1, 1] is still a single element.
        let s2 = Shape::from([1, 1]);
        assert_eq!(a.broadcast_with(&s2), Some((a, Broadcast::Rhs)));
    }

    #[test]
    fn test_broadcast_rejects_general_broadcasting() {
        let a = Shape::from([2, 3]);
        assert_eq!(a.broadcast_with(&Shape::from([3])), None);
        assert_eq!(a.broadcast_with(&Shape::from([1, 3])), None);
        assert_eq!(a.broadcast_with(&Shape::from([3, 2])), None);
    }

    #[test]
    fn test_matmul_shapes() {
        let (out, dims) = Shape::from([2, 3]).matmul_with(&Shape::from([3, 4])).unwrap();
        assert_eq!(out, Shape::from([2, 4]));
        assert_eq!(dims, MatmulDims { batch: 1, m: 2, k: 3, n: 4 });

        let (out, dims) = Shape::from([5, 2, 3]).matmul_with(&Shape::from([3, 4])).unwrap();
        assert_eq!(out, Shape::from([5, 2, 4]));
        assert_eq!(dims.batch, 5);

        assert!(Shape::from([2, 3]).matmul_with(&Shape::from([2, 4])).is_none());
        assert!(Shape::from([2, 3]).matmul_with(&Shape::from([1, 3, 4])).is_none());
        assert!(Shape::from([3]).matmul_with(&Shape::from([3, 4])).is_none());
    }

    #[test]
    fn test_transposed() {
        let (t, dims) = Shape::from([2, 3]).transposed().unwrap();
        assert_eq!(t, Shape::from([3, 2]));
        assert_eq!(dims, TransposeDims { batch: 1, rows: 2, cols: 3 });

        let (t, _) = Shape::from([4, 2, 3]).transposed().unwrap();
        assert_eq!(t, Shape::from([4, 3, 2]));

        assert!(Shape::from([6]).transposed().is_none());
        assert!(Shape::from([1, 2, 3, 4]).transposed().is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(Shape::from([3]).to_string(), "(3,)");
        assert_eq!(Shape::from([2, 3]).to_string(), "(2, 3)");
    }
}
