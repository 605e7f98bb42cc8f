//! Recombination of per-heading response channels.

use crate::{Error, Matrix};

/// Reduces `C` channel maps, channel `c` tuned to heading `θ_c = 2πc/C`,
/// into one scalar response map (elementwise max) and one direction map
/// (vector summation of cos/sin-weighted channels).
#[derive(Clone, Copy, Debug)]
pub struct DirectionCombiner {
    num_channels: usize,
}

impl DirectionCombiner {
    pub fn new(num_channels: usize) -> Result<Self, Error> {
        if num_channels == 0 {
            return Err(Error::InvalidParameter(
                "direction combiner needs at least one channel".into(),
            ));
        }
        Ok(Self { num_channels })
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Heading associated with channel `c`.
    #[inline]
    pub fn theta(&self, c: usize) -> f32 {
        2.0 * std::f32::consts::PI * c as f32 / self.num_channels as f32
    }

    /// Combine channel maps into `(response, direction)`.
    ///
    /// `direction[p] = atan2(Σ_c m_c[p]·sin θ_c, Σ_c m_c[p]·cos θ_c)`
    /// wrapped into `[0, 2π)`, and NaN where both weighted sums are zero
    /// (no channel carries a reliable heading there). If only channel `c*`
    /// is non-zero at a pixel, the recovered direction is `θ_c*`.
    pub fn combine(&self, maps: &[Matrix]) -> Result<(Matrix, Matrix), Error> {
        if maps.len() != self.num_channels {
            return Err(Error::InvalidParameter(format!(
                "expected {} channel maps, got {}",
                self.num_channels,
                maps.len()
            )));
        }
        let (w, h) = maps[0].shape();
        for m in &maps[1..] {
            if m.shape() != (w, h) {
                return Err(Error::ShapeMismatch {
                    expected_w: w,
                    expected_h: h,
                    w: m.w,
                    h: m.h,
                });
            }
        }

        let mut response = maps[0].clone();
        let mut sum_cos = vec![0.0_f32; w * h];
        let mut sum_sin = vec![0.0_f32; w * h];
        for (c, map) in maps.iter().enumerate() {
            let theta = self.theta(c);
            let (cos_t, sin_t) = (theta.cos(), theta.sin());
            for (i, &v) in map.data.iter().enumerate() {
                if c > 0 && v > response.data[i] {
                    response.data[i] = v;
                }
                sum_cos[i] += v * cos_t;
                sum_sin[i] += v * sin_t;
            }
        }

        let mut direction = Matrix::zeros(w, h);
        for (i, d) in direction.data.iter_mut().enumerate() {
            if sum_sin[i] == 0.0 && sum_cos[i] == 0.0 {
                *d = f32::NAN;
            } else {
                let mut angle = sum_sin[i].atan2(sum_cos[i]);
                if angle < 0.0 {
                    angle += 2.0 * std::f32::consts::PI;
                }
                *d = angle;
            }
        }
        Ok((response, direction))
    }
}
