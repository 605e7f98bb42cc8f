//! Kernel builders: 1-D causal (temporal) and 2-D spatial kernels.
//!
//! All builders are pure functions of their numeric parameters and are
//! invoked once, at configuration time. Temporal kernels are normalized to
//! unit sum after near-zero truncation; the DoG inhibition kernel splits
//! into a positive and a negative lobe combined as `A·lobe⁺ − B·lobe⁻`.

use crate::{Error, Matrix};

/// Entries below this magnitude are zeroed out of spatial / gamma kernels.
const TRUNCATION_EPS: f64 = 1e-4;

/// ln Γ(n) for integer order, i.e. ln (n−1)!.
fn ln_gamma_int(n: u32) -> f64 {
    (1..n).map(|i| f64::from(i).ln()).sum()
}

/// Discretized gamma-density delay kernel.
///
/// `k[t] = (n·t/τ)^n · e^(−n·t/τ) / (Γ(n)·τ)`, evaluated in the log domain
/// so high orders do not overflow. Length defaults to `⌈3τ⌉` and is at
/// least 2. The kernel is normalized to unit sum, truncated below `1e-4`,
/// and renormalized.
pub fn gamma_kernel(order: u32, tau: f32, len: Option<usize>) -> Result<Vec<f32>, Error> {
    if !(tau > 0.0) {
        return Err(Error::InvalidParameter(format!(
            "gamma kernel requires tau > 0, got {tau}"
        )));
    }
    let order = order.max(1);
    let len = len
        .unwrap_or_else(|| (3.0 * f64::from(tau)).ceil() as usize)
        .max(2);

    let n = f64::from(order);
    let tau = f64::from(tau);
    let ln_norm = ln_gamma_int(order) + tau.ln();
    let mut kernel = vec![0.0_f64; len];
    for (t, k) in kernel.iter_mut().enumerate().skip(1) {
        let x = n * t as f64 / tau;
        *k = (n * x.ln() - x - ln_norm).exp();
    }

    normalize_truncate(&mut kernel, TRUNCATION_EPS)
        .ok_or_else(|| Error::InvalidParameter("gamma kernel is degenerate".into()))?;
    Ok(kernel.into_iter().map(|v| v as f32).collect())
}

/// Fractional-difference kernel used by the FracSTMD lamina.
///
/// `α = 1` degenerates to a unit impulse; otherwise
/// `k[t] = e^(−αt/(1−α)) / (1−α)`, normalized to unit sum with sub-`1e-16`
/// entries zeroed.
pub fn fractional_kernel(alpha: f32, width: usize) -> Result<Vec<f32>, Error> {
    if !(alpha > 0.0 && alpha <= 1.0) {
        return Err(Error::InvalidParameter(format!(
            "fractional kernel requires alpha in (0, 1], got {alpha}"
        )));
    }
    let width = width.max(2);
    let mut kernel = vec![0.0_f32; width];
    if alpha == 1.0 {
        kernel[0] = 1.0;
        return Ok(kernel);
    }

    let alpha = f64::from(alpha);
    let rate = alpha / (1.0 - alpha);
    let mut sum = 0.0_f64;
    let mut raw = vec![0.0_f64; width];
    for (t, k) in raw.iter_mut().enumerate() {
        *k = (-rate * t as f64).exp() / (1.0 - alpha);
        sum += *k;
    }
    for (k, r) in kernel.iter_mut().zip(&raw) {
        let v = r / sum;
        *k = if v < 1e-16 { 0.0 } else { v as f32 };
    }
    Ok(kernel)
}

/// Normalized isotropic Gaussian, truncated below `1e-4` and renormalized.
pub fn gaussian_kernel(size: usize, sigma: f32) -> Result<Matrix, Error> {
    if size == 0 {
        return Err(Error::InvalidParameter("gaussian size must be positive".into()));
    }
    if !(sigma > 0.0) {
        return Err(Error::InvalidParameter(format!(
            "gaussian sigma must be positive, got {sigma}"
        )));
    }

    let radius = (size as f64 - 1.0) / 2.0;
    let s2 = 2.0 * f64::from(sigma).powi(2);
    let mut data = vec![0.0_f64; size * size];
    for iy in 0..size {
        let y = iy as f64 - radius;
        for ix in 0..size {
            let x = ix as f64 - radius;
            data[iy * size + ix] = (-(x * x + y * y) / s2).exp();
        }
    }

    normalize_truncate(&mut data, TRUNCATION_EPS)
        .ok_or_else(|| Error::InvalidParameter("gaussian kernel is degenerate".into()))?;
    Matrix::from_vec(size, size, data.into_iter().map(|v| v as f32).collect())
}

/// Surround-inhibition kernel `A·max(dog, 0) − B·max(−dog, 0)` with
/// `dog = G(σ1) − e·G(σ2) − ρ`. An even `size` is silently bumped to the
/// next odd value so the kernel has a center cell.
#[allow(clippy::too_many_arguments)]
pub fn dog_inhibition_kernel(
    size: usize,
    sigma1: f32,
    sigma2: f32,
    e: f32,
    rho: f32,
    a: f32,
    b: f32,
) -> Result<Matrix, Error> {
    if !(sigma1 > 0.0) || !(sigma2 > 0.0) {
        return Err(Error::InvalidParameter(format!(
            "DoG sigmas must be positive, got {sigma1} and {sigma2}"
        )));
    }
    let size = if size % 2 == 0 { size + 1 } else { size }.max(1);
    let radius = (size / 2) as i32;

    let norm1 = 1.0 / (2.0 * std::f64::consts::PI * f64::from(sigma1).powi(2));
    let norm2 = 1.0 / (2.0 * std::f64::consts::PI * f64::from(sigma2).powi(2));
    let s1 = 2.0 * f64::from(sigma1).powi(2);
    let s2 = 2.0 * f64::from(sigma2).powi(2);

    let mut out = Matrix::zeros(size, size);
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let r2 = f64::from(dx * dx + dy * dy);
            let g1 = norm1 * (-r2 / s1).exp();
            let g2 = norm2 * (-r2 / s2).exp();
            let dog = g1 - f64::from(e) * g2 - f64::from(rho);
            let v = f64::from(a) * dog.max(0.0) - f64::from(b) * (-dog).max(0.0);
            out.set((dx + radius) as usize, (dy + radius) as usize, v as f32);
        }
    }
    Ok(out)
}

/// Normalize to unit sum, zero entries below `eps`, renormalize. Returns
/// `None` when the kernel collapses to all zeros.
fn normalize_truncate(kernel: &mut [f64], eps: f64) -> Option<()> {
    let sum: f64 = kernel.iter().sum();
    if sum <= 0.0 {
        return None;
    }
    for k in kernel.iter_mut() {
        *k /= sum;
        if *k < eps {
            *k = 0.0;
        }
    }
    let sum: f64 = kernel.iter().sum();
    if sum <= 0.0 {
        return None;
    }
    for k in kernel.iter_mut() {
        *k /= sum;
    }
    Some(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gamma_kernel_is_normalized() {
        let k = gamma_kernel(2, 3.0, None).unwrap();
        assert_eq!(k.len(), 9);
        let sum: f32 = k.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6, "sum = {sum}");
        assert!(k.iter().all(|v| v.is_finite() && *v >= 0.0));
    }

    #[test]
    fn gamma_kernel_high_order_does_not_overflow() {
        let k = gamma_kernel(100, 25.0, None).unwrap();
        let sum: f32 = k.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn gamma_kernel_rejects_bad_tau() {
        assert!(gamma_kernel(2, 0.0, None).is_err());
        assert!(gamma_kernel(2, -1.0, None).is_err());
    }

    #[test]
    fn gamma_kernel_length_floor_is_two() {
        let k = gamma_kernel(1, 0.3, None).unwrap();
        assert_eq!(k.len(), 2);
    }

    #[test]
    fn fractional_kernel_unit_alpha_is_impulse() {
        let k = fractional_kernel(1.0, 5).unwrap();
        assert_eq!(k[0], 1.0);
        assert!(k[1..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn fractional_kernel_is_normalized_and_validated() {
        let k = fractional_kernel(0.8, 10).unwrap();
        let sum: f32 = k.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(fractional_kernel(0.0, 10).is_err());
        assert!(fractional_kernel(1.5, 10).is_err());
    }

    #[test]
    fn gaussian_kernel_is_normalized() {
        let k = gaussian_kernel(5, 1.5).unwrap();
        let sum: f32 = k.data.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        // symmetric around the center
        assert_eq!(k.at(0, 2), k.at(4, 2));
        assert_eq!(k.at(2, 0), k.at(2, 4));
    }

    #[test]
    fn dog_kernel_forces_odd_size() {
        let k = dog_inhibition_kernel(14, 1.5, 3.0, 1.0, 0.0, 1.0, 3.0).unwrap();
        assert_eq!(k.shape(), (15, 15));
        // positive center, negative surround
        assert!(k.at(7, 7) > 0.0);
        assert!(k.at(0, 7) <= 0.0);
    }
}
