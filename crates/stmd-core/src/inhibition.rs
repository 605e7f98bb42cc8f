//! Spatial surround inhibition: DoG convolution plus rectification.

use crate::kernel::dog_inhibition_kernel;
use crate::{Error, Matrix};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Dense 2-D convolution with a constant-zero border.
///
/// The spatial kernels used here are radially symmetric, so correlation
/// and convolution coincide.
pub fn convolve2d(input: &Matrix, kernel: &Matrix) -> Matrix {
    let (w, h) = input.shape();
    let mut out = Matrix::zeros(w, h);
    if input.is_empty() || kernel.is_empty() {
        return out;
    }
    let rx = (kernel.w / 2) as i32;
    let ry = (kernel.h / 2) as i32;

    let row = |y: usize, out_row: &mut [f32]| {
        for (x, o) in out_row.iter_mut().enumerate() {
            let mut acc = 0.0_f32;
            for ky in 0..kernel.h {
                let sy = y as i32 + ky as i32 - ry;
                if sy < 0 || sy >= h as i32 {
                    continue;
                }
                for kx in 0..kernel.w {
                    let sx = x as i32 + kx as i32 - rx;
                    if sx < 0 || sx >= w as i32 {
                        continue;
                    }
                    acc += kernel.at(kx, ky) * input.at(sx as usize, sy as usize);
                }
            }
            *o = acc;
        }
    };

    #[cfg(feature = "rayon")]
    out.data
        .par_chunks_mut(w)
        .enumerate()
        .for_each(|(y, out_row)| row(y, out_row));

    #[cfg(not(feature = "rayon"))]
    for (y, out_row) in out.data.chunks_mut(w).enumerate() {
        row(y, out_row);
    }

    out
}

/// Surround inhibitor: convolve with a DoG-derived kernel, then rectify.
///
/// Suppresses spatially extended (clutter) responses while passing small,
/// isolated ones. Stateless per frame; all the temporal behavior lives in
/// [`crate::TemporalFilter`].
#[derive(Clone, Debug)]
pub struct SurroundInhibition {
    kernel: Matrix,
}

impl SurroundInhibition {
    /// Build from the DoG parameter set (see
    /// [`kernel::dog_inhibition_kernel`](crate::kernel::dog_inhibition_kernel)).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        size: usize,
        sigma1: f32,
        sigma2: f32,
        e: f32,
        rho: f32,
        a: f32,
        b: f32,
    ) -> Result<Self, Error> {
        Ok(Self {
            kernel: dog_inhibition_kernel(size, sigma1, sigma2, e, rho, a, b)?,
        })
    }

    /// Wrap a prebuilt spatial kernel, e.g. a directional inhibitor.
    pub fn from_kernel(kernel: Matrix) -> Self {
        Self { kernel }
    }

    pub fn kernel(&self) -> &Matrix {
        &self.kernel
    }

    /// `max(input ∗ kernel, 0)`.
    pub fn process(&self, input: &Matrix) -> Matrix {
        convolve2d(input, &self.kernel).rectified()
    }
}
