//! Slice-level host kernels.
//!
//! Each kernel parallelises over independent output elements with rayon;
//! no kernel reads an output element written by another iteration.

use rayon::prelude::*;

use ad_tensor::prelude::*;

/// Below this many elements the rayon split overhead dominates.
const PAR_THRESHOLD: usize = 4096;

pub fn fill(out: &mut [f64], value: f64) {
    if out.len() < PAR_THRESHOLD {
        out.fill(value);
    } else {
        out.par_iter_mut().for_each(|o| *o = value);
    }
}

pub fn unary(op: UnaryKernel, out: &mut [f64], x: &[f64]) {
    if out.len() < PAR_THRESHOLD {
        for (o, &v) in out.iter_mut().zip(x) {
            *o = op.apply(v);
        }
    } else {
        out.par_iter_mut()
            .zip(x.par_iter())
            .for_each(|(o, &v)| *o = op.apply(v));
    }
}

pub fn binary(op: BinaryKernel, out: &mut [f64], a: &[f64], b: &[f64], broadcast: Broadcast) {
    let lhs = |i: usize| if broadcast == Broadcast::Lhs { a[0] } else { a[i] };
    let rhs = |i: usize| if broadcast == Broadcast::Rhs { b[0] } else { b[i] };

    if out.len() < PAR_THRESHOLD {
        for (i, o) in out.iter_mut().enumerate() {
            *o = op.apply(lhs(i), rhs(i));
        }
    } else {
        out.par_iter_mut()
            .enumerate()
            .for_each(|(i, o)| *o = op.apply(lhs(i), rhs(i)));
    }
}

/// Row-parallel matrix multiply; `a` is `[batch, m, k]`, `b` is `[k, n]`.
pub fn matmul(out: &mut [f64], a: &[f64], b: &[f64], dims: MatmulDims) {
    let MatmulDims { k, n, .. } = dims;
    // One chunk per output row across all batches.
    out.par_chunks_mut(n).enumerate().for_each(|(row, out_row)| {
        let a_row = &a[row * k..(row + 1) * k];
        for (j, o) in out_row.iter_mut().enumerate() {
            let mut acc = 0.0;
            for (kk, &av) in a_row.iter().enumerate() {
                acc += av * b[kk * n + j];
            }
            *o = acc;
        }
    });
}

/// Swap the last two axes of a `[batch, rows, cols]` input.
pub fn transpose(out: &mut [f64], x: &[f64], dims: TransposeDims) {
    let TransposeDims { rows, cols, .. } = dims;
    let plane = rows * cols;
    out.par_chunks_mut(plane)
        .zip(x.par_chunks(plane))
        .for_each(|(dst, src)| {
            for i in 0..rows {
                for j in 0..cols {
                    dst[j * rows + i] = src[i * cols + j];
                }
            }
        });
}

pub fn reduce_sum(x: &[f64]) -> f64 {
    if x.len() < PAR_THRESHOLD {
        x.iter().sum()
    } else {
        x.par_iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unary_kernels() {
        let x = [1.0, 0.0, -3.0];
        let mut out = [0.0; 3];

        unary(UnaryKernel::Neg, &mut out, &x);
        assert_eq!(out, [-1.0, 0.0, 3.0]);

        unary(UnaryKernel::Relu, &mut out, &x);
        assert_eq!(out, [1.0, 0.0, 0.0]);

        unary(UnaryKernel::Binarize, &mut out, &x);
        assert_eq!(out, [1.0, 0.0, 0.0]);

        unary(UnaryKernel::Pow(2.0), &mut out, &x);
        assert_eq!(out, [1.0, 0.0, 9.0]);
    }

    #[test]
    fn test_binary_broadcast() {
        let a = [1.0, 2.0, 3.0];
        let s = [10.0];
        let mut out = [0.0; 3];

        binary(BinaryKernel::Add, &mut out, &a, &s, Broadcast::Rhs);
        assert_eq!(out, [11.0, 12.0, 13.0]);

        binary(BinaryKernel::Sub, &mut out, &s, &a, Broadcast::Lhs);
        assert_eq!(out, [9.0, 8.0, 7.0]);

        binary(BinaryKernel::Mul, &mut out, &a, &a, Broadcast::None);
        assert_eq!(out, [1.0, 4.0, 9.0]);
    }

    #[test]
    fn test_large_inputs_take_parallel_path() {
        let n = PAR_THRESHOLD * 2;
        let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let mut out = vec![0.0; n];

        unary(UnaryKernel::MulScalar(2.0), &mut out, &x);
        assert_eq!(out[n - 1], 2.0 * (n - 1) as f64);

        let total = reduce_sum(&x);
        assert_eq!(total, (n * (n - 1) / 2) as f64);
    }

    #[test]
    fn test_matmul_2d() {
        // [[1,2,3],[3,2,1]] @ [[0,1],[2,3],[4,5]]
        let a = [1.0, 2.0, 3.0, 3.0, 2.0, 1.0];
        let b = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let mut out = [0.0; 4];
        matmul(&mut out, &a, &b, MatmulDims { batch: 1, m: 2, k: 3, n: 2 });
        assert_eq!(out, [16.0, 22.0, 8.0, 14.0]);
    }

    #[test]
    fn test_matmul_batched() {
        // Two batches of [1, 2] @ [2, 1]
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [1.0, 1.0];
        let mut out = [0.0; 2];
        matmul(&mut out, &a, &b, MatmulDims { batch: 2, m: 1, k: 2, n: 1 });
        assert_eq!(out, [3.0, 7.0]);
    }

    #[test]
    fn test_transpose() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut out = [0.0; 6];
        transpose(&mut out, &x, TransposeDims { batch: 1, rows: 2, cols: 3 });
        assert_eq!(out, [1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);

        // Batched: each [1, 3] plane becomes [3, 1], i.e. unchanged in memory.
        transpose(&mut out, &x, TransposeDims { batch: 2, rows: 1, cols: 3 });
        assert_eq!(out, x);
    }
}
