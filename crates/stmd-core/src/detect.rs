//! Sparse peak extraction from a response map.

use crate::nms::NmsEngine;
use crate::Matrix;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// A detected peak on the response map.
#[derive(Clone, Debug, PartialEq)]
pub struct Peak {
    /// Column of the peak.
    pub x: usize,
    /// Row of the peak.
    pub y: usize,
    /// Response value at the peak.
    pub score: f32,
    /// Heading in `[0, 2π)` where the pipeline produced a direction map
    /// and the heading is defined at this pixel.
    pub direction: Option<f32>,
}

/// Threshold a response map at `threshold_rel` of its maximum, suppress
/// non-maxima, and return the surviving peaks.
///
/// An all-zero or empty map yields an empty list; a frame with no
/// detections is not an error.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip_all, fields(w = response.w, h = response.h))
)]
pub fn peaks_from_response(
    response: &Matrix,
    direction: Option<&Matrix>,
    engine: &mut NmsEngine,
    threshold_rel: f32,
) -> Vec<Peak> {
    if response.is_empty() {
        return Vec::new();
    }

    let mut max_r = f32::NEG_INFINITY;
    for &v in &response.data {
        if v > max_r {
            max_r = v;
        }
    }
    if !max_r.is_finite() || max_r <= 0.0 {
        return Vec::new();
    }

    let mut thr = threshold_rel * max_r;
    if thr < 0.0 {
        // a negative threshold would accept noise
        thr = 0.0;
    }

    let suppressed = engine.suppress(response);
    let mut peaks = Vec::new();
    for y in 0..suppressed.h {
        for x in 0..suppressed.w {
            let v = suppressed.at(x, y);
            if v <= 0.0 || v < thr {
                continue;
            }
            let dir = direction.and_then(|d| {
                let angle = d.at(x, y);
                angle.is_finite().then_some(angle)
            });
            peaks.push(Peak {
                x,
                y,
                score: v,
                direction: dir,
            });
        }
    }
    peaks
}
