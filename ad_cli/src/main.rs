//! CLI demo for the lazy tensor autodiff engine.
//!
//! Builds two expression graphs, evaluates them, backpropagates, and checks
//! every gradient against finite differences. Exits non-zero on a mismatch.
//!
//! Configuration comes from `AD_*` environment variables (see
//! `ad_core::config`); log output is controlled by `RUST_LOG`.

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use ad_core::prelude::*;
use ad_core::{check_gradient, max_grad_error};

const EPS: f64 = 1e-6;
const TOLERANCE: f64 = 1e-4;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}

fn print_row(label: &str, values: &[f64]) {
    let cells: Vec<String> = values.iter().map(|v| format!("{v:>9.4}")).collect();
    println!("  {label:<8}[{}]", cells.join(", "));
}

/// Records the worst gradient error seen across all checks.
struct Report {
    max_err: f64,
}

impl Report {
    fn check(&mut self, label: &str, err: f64) {
        let status = if err < TOLERANCE { "ok" } else { "MISMATCH" };
        println!("  {label:<20} max |autodiff - fd| = {err:.2e}  {status}");
        self.max_err = self.max_err.max(err);
    }
}

fn cubic_example(device: Device, report: &mut Report) -> Result<()> {
    println!("1. L = sum((x - y)^3) on the {device} device");

    let options = TensorOptions::tracked().device(device);
    let x = Tensor::with_options([2, 3], vec![1.0, 2.0, 3.0, 3.0, 2.0, 1.0], options)?;
    let y = Tensor::with_options([2, 3], vec![3.0, 2.0, 1.0, 1.0, 2.0, 3.0], options)?;

    let loss = x.subtract(&y)?.pow(3.0).reduce_sum();
    println!("  L = {:.6} (expected 0)", loss.item()?);

    loss.backward()?;
    let dx = x.gradient()?.get_data()?;
    let dy = y.gradient()?.get_data()?;
    print_row("dL/dx", &dx);
    print_row("dL/dy", &dy);

    // dL/dx = 3 (x - y)^2
    let diff = x.subtract(&y)?.get_data()?;
    let expected: Vec<f64> = diff.iter().map(|d| 3.0 * d * d).collect();
    report.check("closed form dL/dx", max_grad_error(&dx, &expected));

    let y_const = y.detach();
    let fd_err = check_gradient(|t| Ok(t.subtract(&y_const)?.pow(3.0)), &x.detach(), EPS)?;
    report.check("finite diff dL/dx", fd_err);
    println!();
    Ok(())
}

fn matmul_example(device: Device, report: &mut Report) -> Result<()> {
    println!("2. L = sum(relu(A @ B) * 2 - 1) on the {device} device");

    let options = TensorOptions::on(device);
    let a = Tensor::with_options([2, 3], vec![1.0, 2.0, 3.0, 3.0, 2.0, 1.0], options)?;
    let b = Tensor::with_options([3, 2], vec![0.0, 1.0, 2.0, -3.0, 4.0, 5.0], options)?;

    let product = a.matmul(&b)?;
    print_row("A @ B", &product.get_data()?);

    let head = |t: &Tensor| -> ad_core::Result<Tensor> { Ok(t.relu() * 2.0 - 1.0) };
    let err_a = check_gradient(|t| head(&t.matmul(&b)?), &a, EPS)?;
    report.check("finite diff dL/dA", err_a);
    let err_b = check_gradient(|t| head(&a.matmul(t)?), &b, EPS)?;
    report.check("finite diff dL/dB", err_b);
    println!();
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();

    let config = RuntimeConfig::from_env().context("reading AD_* configuration")?;
    runtime::init(&config);
    info!(?config, "runtime configured");

    println!("=== Lazy Tensor Autodiff Demo ===\n");

    let mut devices = vec![Device::Host];
    if runtime::is_available(Device::Accelerator) {
        devices.push(Device::Accelerator);
    }

    let mut report = Report { max_err: 0.0 };
    for device in devices {
        cubic_example(device, &mut report)?;
        matmul_example(device, &mut report)?;
    }

    let random = Tensor::fill_random([2, 2], 0.0, 1.0, TensorOptions::default())?;
    let err = check_gradient(|t| t.elementwise_division(&t.pow(2.0).add_scalar(1.0)), &random, EPS)?;
    println!("3. x / (x^2 + 1) at a random point (seed {})", config.seed);
    report.check("finite diff dL/dx", err);
    println!();

    if report.max_err < TOLERANCE {
        println!(
            "PASS: Max error ({:.2e}) < tolerance ({:.2e})",
            report.max_err, TOLERANCE
        );
        Ok(())
    } else {
        bail!(
            "FAIL: Max error ({:.2e}) >= tolerance ({:.2e})",
            report.max_err,
            TOLERANCE
        )
    }
}
