//! CUDA C source for the accelerator kernels (double precision).
//!
//! One thread per output element; every kernel guards `i < n`. Entry points
//! carry an `_f64` suffix so they never shadow CUDA math builtins.

pub const KERNEL_SOURCE: &str = r#"
extern "C" __global__ void fill_f64(double* out, double value, size_t n) {
    size_t i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i < n) out[i] = value;
}

extern "C" __global__ void neg_f64(double* out, const double* x, double p, size_t n) {
    size_t i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i < n) out[i] = -x[i];
}

extern "C" __global__ void relu_f64(double* out, const double* x, double p, size_t n) {
    size_t i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i < n) out[i] = x[i] > 0.0 ? x[i] : 0.0;
}

extern "C" __global__ void binarize_f64(double* out, const double* x, double p, size_t n) {
    size_t i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i < n) out[i] = x[i] > 0.0 ? 1.0 : 0.0;
}

extern "C" __global__ void add_scalar_f64(double* out, const double* x, double p, size_t n) {
    size_t i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i < n) out[i] = x[i] + p;
}

extern "C" __global__ void sub_scalar_f64(double* out, const double* x, double p, size_t n) {
    size_t i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i < n) out[i] = x[i] - p;
}

extern "C" __global__ void scalar_sub_f64(double* out, const double* x, double p, size_t n) {
    size_t i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i < n) out[i] = p - x[i];
}

extern "C" __global__ void mul_scalar_f64(double* out, const double* x, double p, size_t n) {
    size_t i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i < n) out[i] = x[i] * p;
}

extern "C" __global__ void div_scalar_f64(double* out, const double* x, double p, size_t n) {
    size_t i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i < n) out[i] = x[i] / p;
}

extern "C" __global__ void scalar_div_f64(double* out, const double* x, double p, size_t n) {
    size_t i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i < n) out[i] = p / x[i];
}

extern "C" __global__ void pow_f64(double* out, const double* x, double p, size_t n) {
    size_t i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i < n) out[i] = pow(x[i], p);
}

// a_step / b_step are 0 for the broadcast scalar side, 1 otherwise.
extern "C" __global__ void add_f64(double* out, const double* a, const double* b,
                               size_t a_step, size_t b_step, size_t n) {
    size_t i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i < n) out[i] = a[i * a_step] + b[i * b_step];
}

extern "C" __global__ void sub_f64(double* out, const double* a, const double* b,
                               size_t a_step, size_t b_step, size_t n) {
    size_t i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i < n) out[i] = a[i * a_step] - b[i * b_step];
}

extern "C" __global__ void mul_f64(double* out, const double* a, const double* b,
                               size_t a_step, size_t b_step, size_t n) {
    size_t i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i < n) out[i] = a[i * a_step] * b[i * b_step];
}

extern "C" __global__ void div_f64(double* out, const double* a, const double* b,
                               size_t a_step, size_t b_step, size_t n) {
    size_t i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i < n) out[i] = a[i * a_step] / b[i * b_step];
}

// a is [batch, m, k], b is [k, n_cols], out is [batch, m, n_cols].
extern "C" __global__ void matmul_f64(double* out, const double* a, const double* b,
                                  size_t m, size_t k, size_t n_cols, size_t n) {
    size_t i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i >= n) return;
    size_t row = i / n_cols;
    size_t col = i % n_cols;
    double acc = 0.0;
    for (size_t kk = 0; kk < k; ++kk) {
        acc += a[row * k + kk] * b[kk * n_cols + col];
    }
    out[i] = acc;
}

// x is [batch, rows, cols], out is [batch, cols, rows].
extern "C" __global__ void transpose_f64(double* out, const double* x,
                                     size_t rows, size_t cols, size_t n) {
    size_t i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i >= n) return;
    size_t plane = rows * cols;
    size_t b = i / plane;
    size_t r = (i % plane) / cols;
    size_t c = i % cols;
    out[b * plane + c * rows + r] = x[i];
}

// Single-block tree reduction; launched with one block of REDUCE_THREADS.
extern "C" __global__ void reduce_sum_f64(double* out, const double* x, size_t n) {
    __shared__ double partial[256];
    size_t t = threadIdx.x;
    double acc = 0.0;
    for (size_t i = t; i < n; i += blockDim.x) {
        acc += x[i];
    }
    partial[t] = acc;
    __syncthreads();
    for (size_t stride = blockDim.x / 2; stride > 0; stride >>= 1) {
        if (t < stride) partial[t] += partial[t + stride];
        __syncthreads();
    }
    if (t == 0) out[0] = partial[0];
}
"#;

/// Module name the kernels are registered under.
pub const MODULE: &str = "ad_kernels";

/// Threads in the single reduction block; matches `partial[256]` above.
pub const REDUCE_THREADS: u32 = 256;

pub const KERNEL_NAMES: &[&str] = &[
    "fill_f64",
    "neg_f64",
    "relu_f64",
    "binarize_f64",
    "add_scalar_f64",
    "sub_scalar_f64",
    "scalar_sub_f64",
    "mul_scalar_f64",
    "div_scalar_f64",
    "scalar_div_f64",
    "pow_f64",
    "add_f64",
    "sub_f64",
    "mul_f64",
    "div_f64",
    "matmul_f64",
    "transpose_f64",
    "reduce_sum_f64",
];
