//! Core primitives for small-target motion detection (STMD) pipelines.
//!
//! # Overview
//!
//! The published STMD model family (ESTMD, DSTMD, FracSTMD, …) shares three
//! pieces of machinery, and this crate implements exactly those:
//!
//! - [`temporal`] – causal delay filters (gamma / fractional-difference
//!   kernels) over a fixed-capacity [`ring::RingBuffer`] of recent frames.
//! - [`inhibition`] – difference-of-Gaussians surround inhibition and the
//!   2-D convolution it rides on, plus [`direction`] for recombining
//!   per-heading channels into a response and a direction map.
//! - [`nms`] – four interchangeable non-maximum suppression algorithms with
//!   a self-tuning, memoizing dispatcher, and [`detect`] for turning a
//!   suppressed response map into a sparse peak list.
//!
//! Individual model variants are thin wirings over these primitives; a
//! reference wiring lives in the `stmd` companion crate.
//!
//! # Features
//!
//! - `rayon` – parallelizes the spatial convolution over image rows. Same
//!   numerical results, only performance changes.
//! - `tracing` – emits spans/events from the detector and the NMS
//!   dispatcher.

pub mod detect;
pub mod direction;
pub mod inhibition;
pub mod kernel;
pub mod nms;
pub mod ring;
pub mod temporal;

pub use detect::{peaks_from_response, Peak};
pub use direction::DirectionCombiner;
pub use inhibition::{convolve2d, SurroundInhibition};
pub use nms::{NmsBench, NmsEngine, NmsMemo, NmsMethod};
pub use ring::RingBuffer;
pub use temporal::{GammaBandpass, TemporalFilter};

/// Errors reported by the core primitives.
///
/// Parameter validation happens once at construction time and fails fast;
/// per-frame numeric edge cases (empty buffer slots, all-zero maps) are
/// treated as legitimate zeros, never as errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("process called before init_config")]
    NotInitialized,
    #[error("frame shape changed: expected {expected_w}x{expected_h}, got {w}x{h}")]
    ShapeMismatch {
        expected_w: usize,
        expected_h: usize,
        w: usize,
        h: usize,
    },
}

/// Dense real-valued matrix in row-major layout.
///
/// Frames, response maps, direction maps and 2-D kernels are all `Matrix`
/// values. `w`/`h`/`data` are public on purpose, mirroring how consumers
/// index into the map directly.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    pub w: usize,
    pub h: usize,
    pub data: Vec<f32>,
}

impl Matrix {
    /// All-zero matrix of the given size.
    pub fn zeros(w: usize, h: usize) -> Self {
        Self {
            w,
            h,
            data: vec![0.0; w * h],
        }
    }

    /// Wrap an existing row-major buffer.
    pub fn from_vec(w: usize, h: usize, data: Vec<f32>) -> Result<Self, Error> {
        if data.len() != w * h {
            return Err(Error::InvalidParameter(format!(
                "matrix data length {} does not match {w}x{h}",
                data.len()
            )));
        }
        Ok(Self { w, h, data })
    }

    #[inline]
    /// Value at an integer coordinate.
    pub fn at(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.w + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, v: f32) {
        self.data[y * self.w + x] = v;
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.w, self.h)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    /// Maximum element, or 0 for an empty matrix.
    pub fn max_value(&self) -> f32 {
        self.data.iter().copied().fold(0.0_f32, f32::max)
    }

    /// Elementwise transform into a fresh matrix.
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Matrix {
        Matrix {
            w: self.w,
            h: self.h,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Half-wave rectification `max(v, 0)`.
    pub fn rectified(&self) -> Matrix {
        self.map(|v| v.max(0.0))
    }

    /// Elementwise product. Shapes must match.
    pub fn hadamard(&self, rhs: &Matrix) -> Matrix {
        debug_assert_eq!(self.shape(), rhs.shape());
        Matrix {
            w: self.w,
            h: self.h,
            data: self
                .data
                .iter()
                .zip(&rhs.data)
                .map(|(&a, &b)| a * b)
                .collect(),
        }
    }

    /// Shift contents by `(dx, dy)` holding the size; vacated cells are
    /// zero-filled. Shifts beyond the matrix extent yield an all-zero
    /// matrix.
    pub fn shifted(&self, dx: i32, dy: i32) -> Matrix {
        let mut out = Matrix::zeros(self.w, self.h);
        if dx.unsigned_abs() as usize >= self.w || dy.unsigned_abs() as usize >= self.h {
            return out;
        }
        for y in 0..self.h {
            let sy = y as i32 - dy;
            if sy < 0 || sy >= self.h as i32 {
                continue;
            }
            for x in 0..self.w {
                let sx = x as i32 - dx;
                if sx < 0 || sx >= self.w as i32 {
                    continue;
                }
                out.set(x, y, self.at(sx as usize, sy as usize));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_vec_rejects_bad_length() {
        assert!(Matrix::from_vec(3, 2, vec![0.0; 5]).is_err());
        assert!(Matrix::from_vec(3, 2, vec![0.0; 6]).is_ok());
    }

    #[test]
    fn shifted_moves_and_zero_fills() {
        let mut m = Matrix::zeros(4, 3);
        m.set(1, 1, 7.0);
        let s = m.shifted(2, 1);
        assert_eq!(s.at(3, 2), 7.0);
        assert_eq!(s.at(1, 1), 0.0);
        // shift larger than the extent clears everything
        assert_eq!(m.shifted(4, 0).max_value(), 0.0);
    }

    #[test]
    fn max_value_of_empty_is_zero() {
        assert_eq!(Matrix::zeros(0, 0).max_value(), 0.0);
    }
}
