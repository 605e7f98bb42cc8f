//! Causal temporal filters over a ring buffer of recent frames.

use crate::kernel::{fractional_kernel, gamma_kernel};
use crate::ring::RingBuffer;
use crate::{Error, Matrix};

/// Kernel taps below this magnitude are skipped in the history sum.
const TAP_EPS: f32 = 1e-16;

/// Convolve the buffered history with a 1-D causal kernel.
///
/// Empty slots and near-zero taps contribute nothing; before the buffer is
/// fully populated the sum simply runs over fewer terms. Output shape
/// follows `shape`.
fn convolve_history(
    buffer: &RingBuffer<Matrix>,
    kernel: &[f32],
    shape: (usize, usize),
) -> Matrix {
    let (w, h) = shape;
    let mut out = Matrix::zeros(w, h);
    let steps = buffer.capacity().min(kernel.len());
    for (t, &k) in kernel.iter().enumerate().take(steps) {
        if k.abs() < TAP_EPS {
            continue;
        }
        if let Some(frame) = buffer.read(t) {
            for (o, &v) in out.data.iter_mut().zip(&frame.data) {
                *o += k * v;
            }
        }
    }
    out
}

/// Causal delay filter: a 1-D kernel applied across the frame history.
///
/// One `process` call records the frame into the internal ring buffer and
/// returns the temporal convolution of the stored history. The in-loop
/// mode replaces `record_next` with `cover` so iterative feedback loops
/// can re-enter without consuming a history step.
#[derive(Clone, Debug)]
pub struct TemporalFilter {
    kernel: Vec<f32>,
    buffer: RingBuffer<Matrix>,
    in_loop: bool,
    shape: Option<(usize, usize)>,
}

impl TemporalFilter {
    /// Gamma-delay filter of the given order and time constant. Kernel
    /// length defaults to `⌈3τ⌉` (minimum 2).
    pub fn gamma(order: u32, tau: f32, len: Option<usize>) -> Result<Self, Error> {
        Self::from_kernel(gamma_kernel(order, tau, len)?)
    }

    /// Fractional-difference filter with parameter `α ∈ (0, 1]`.
    pub fn fractional(alpha: f32, width: usize) -> Result<Self, Error> {
        Self::from_kernel(fractional_kernel(alpha, width)?)
    }

    /// Wrap an arbitrary causal kernel. Buffer capacity equals the kernel
    /// length.
    pub fn from_kernel(kernel: Vec<f32>) -> Result<Self, Error> {
        let buffer = RingBuffer::new(kernel.len())?;
        Ok(Self {
            kernel,
            buffer,
            in_loop: false,
            shape: None,
        })
    }

    pub fn kernel(&self) -> &[f32] {
        &self.kernel
    }

    /// Switch between `record_next` (default) and `cover` recording.
    pub fn set_in_loop(&mut self, in_loop: bool) {
        self.in_loop = in_loop;
    }

    /// Record `frame` and return the delayed signal.
    pub fn process(&mut self, frame: &Matrix) -> Result<Matrix, Error> {
        let shape = check_shape(&mut self.shape, frame)?;
        if self.in_loop {
            self.buffer.cover(frame.clone());
        } else {
            self.buffer.record_next(frame.clone());
        }
        Ok(convolve_history(&self.buffer, &self.kernel, shape))
    }
}

/// Gamma band-pass: the difference of two gamma delays sharing one frame
/// history. The slow branch must lag the fast one; a non-increasing `tau2`
/// is bumped to `tau1 + 1`.
#[derive(Clone, Debug)]
pub struct GammaBandpass {
    fast: Vec<f32>,
    slow: Vec<f32>,
    buffer: RingBuffer<Matrix>,
    shape: Option<(usize, usize)>,
}

impl GammaBandpass {
    pub fn new(order1: u32, tau1: f32, order2: u32, tau2: f32) -> Result<Self, Error> {
        let tau2 = if tau2 <= tau1 { tau1 + 1.0 } else { tau2 };
        let fast = gamma_kernel(order1, tau1, None)?;
        let slow = gamma_kernel(order2, tau2, None)?;
        let buffer = RingBuffer::new(fast.len().max(slow.len()))?;
        Ok(Self {
            fast,
            slow,
            buffer,
            shape: None,
        })
    }

    /// Record `frame` and return `fast(history) − slow(history)`.
    pub fn process(&mut self, frame: &Matrix) -> Result<Matrix, Error> {
        let shape = check_shape(&mut self.shape, frame)?;
        self.buffer.record_next(frame.clone());
        let fast = convolve_history(&self.buffer, &self.fast, shape);
        let slow = convolve_history(&self.buffer, &self.slow, shape);
        let data = fast
            .data
            .iter()
            .zip(&slow.data)
            .map(|(&a, &b)| a - b)
            .collect();
        Matrix::from_vec(shape.0, shape.1, data)
    }
}

/// Pin the filter to the first frame's shape; later changes are an error.
fn check_shape(
    expected: &mut Option<(usize, usize)>,
    frame: &Matrix,
) -> Result<(usize, usize), Error> {
    match *expected {
        Some((w, h)) if (w, h) != frame.shape() => Err(Error::ShapeMismatch {
            expected_w: w,
            expected_h: h,
            w: frame.w,
            h: frame.h,
        }),
        Some(shape) => Ok(shape),
        None => {
            *expected = Some(frame.shape());
            Ok(frame.shape())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(w: usize, h: usize, v: f32) -> Matrix {
        Matrix::from_vec(w, h, vec![v; w * h]).unwrap()
    }

    #[test]
    fn first_frames_are_finite_with_partial_history() {
        let mut filter = TemporalFilter::gamma(2, 4.0, None).unwrap();
        let len = filter.kernel().len();
        for i in 0..len - 1 {
            let out = filter.process(&constant(4, 3, 1.0 + i as f32)).unwrap();
            assert!(out.data.iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn saturated_unit_input_reproduces_kernel_sum() {
        let mut filter = TemporalFilter::gamma(2, 3.0, None).unwrap();
        let len = filter.kernel().len();
        let mut out = Matrix::zeros(0, 0);
        for _ in 0..len {
            out = filter.process(&constant(3, 3, 1.0)).unwrap();
        }
        // kernel sums to 1, so a constant unit input passes through
        for &v in &out.data {
            assert!((v - 1.0).abs() < 1e-5, "v = {v}");
        }
    }

    #[test]
    fn in_loop_mode_does_not_advance_history() {
        let mut filter = TemporalFilter::from_kernel(vec![0.5, 0.5]).unwrap();
        filter.process(&constant(2, 2, 1.0)).unwrap();
        filter.process(&constant(2, 2, 2.0)).unwrap();
        filter.set_in_loop(true);
        // repeated covers keep the older slot intact
        let a = filter.process(&constant(2, 2, 4.0)).unwrap();
        let b = filter.process(&constant(2, 2, 6.0)).unwrap();
        assert!((a.at(0, 0) - (0.5 * 4.0 + 0.5 * 1.0)).abs() < 1e-6);
        assert!((b.at(0, 0) - (0.5 * 6.0 + 0.5 * 1.0)).abs() < 1e-6);
    }

    #[test]
    fn shape_change_is_rejected() {
        let mut filter = TemporalFilter::gamma(1, 2.0, None).unwrap();
        filter.process(&constant(4, 4, 1.0)).unwrap();
        let err = filter.process(&constant(5, 4, 1.0)).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn bandpass_bumps_non_increasing_slow_tau() {
        // tau2 <= tau1 must not collapse the two branches into one
        let mut bp = GammaBandpass::new(2, 3.0, 3, 2.0).unwrap();
        let mut out = Matrix::zeros(0, 0);
        for i in 0..12 {
            out = bp.process(&constant(2, 2, i as f32)).unwrap();
        }
        // fast minus slow on a ramp is positive once history fills
        assert!(out.at(0, 0) > 0.0);
    }

    #[test]
    fn bandpass_of_constant_input_decays_to_zero() {
        let mut bp = GammaBandpass::new(2, 3.0, 3, 6.0).unwrap();
        let mut out = Matrix::zeros(0, 0);
        for _ in 0..40 {
            out = bp.process(&constant(3, 2, 5.0)).unwrap();
        }
        for &v in &out.data {
            assert!(v.abs() < 1e-4, "v = {v}");
        }
    }
}
