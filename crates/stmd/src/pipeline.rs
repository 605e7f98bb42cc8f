//! Reference ESTMD pipeline wiring over the core primitives.
//!
//! The stage follows the layered insect-visual pathway: retina (Gaussian
//! blur) → lamina (gamma band-pass) → medulla (half-wave ON/OFF split with
//! a gamma-delayed OFF channel) → lobula (ON×delayed-OFF correlation and
//! surround inhibition). With `num_directions > 0` the correlation is
//! computed once per heading against a spatially shifted delayed-OFF map
//! and recombined into a response plus a direction map.

use stmd_core::kernel::gaussian_kernel;
use stmd_core::{
    convolve2d, peaks_from_response, DirectionCombiner, Error, GammaBandpass, Matrix, NmsEngine,
    Peak, SurroundInhibition, TemporalFilter,
};
use tracing::debug;

/// Numeric parameters for the pipeline stage.
///
/// Defaults reproduce the canonical ESTMD configuration; every model
/// variant is a different assignment over the same fields.
#[derive(Clone, Debug)]
pub struct PipelineParams {
    /// Retina blur kernel size and width.
    pub blur_size: usize,
    pub blur_sigma: f32,
    /// Fast (excitatory) branch of the lamina band-pass.
    pub fast_order: u32,
    pub fast_tau: f32,
    /// Slow (inhibitory) branch; a non-increasing tau is bumped at init.
    pub slow_order: u32,
    pub slow_tau: f32,
    /// Gamma delay applied to the OFF channel before correlation.
    pub delay_order: u32,
    pub delay_tau: f32,
    /// Surround-inhibition DoG parameters.
    pub kernel_size: usize,
    pub sigma1: f32,
    pub sigma2: f32,
    pub e: f32,
    pub rho: f32,
    pub a: f32,
    pub b: f32,
    /// Number of direction channels; 0 disables the direction map.
    pub num_directions: usize,
    /// Spatial offset (pixels) of the per-heading correlation.
    pub direction_shift: f32,
    /// Relative detection threshold handed to peak extraction.
    pub threshold_rel: f32,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            blur_size: 3,
            blur_sigma: 1.0,
            fast_order: 2,
            fast_tau: 3.0,
            slow_order: 3,
            slow_tau: 6.0,
            delay_order: 12,
            delay_tau: 25.0,
            kernel_size: 15,
            sigma1: 1.5,
            sigma2: 3.0,
            e: 1.0,
            rho: 0.0,
            a: 1.0,
            b: 3.0,
            num_directions: 0,
            direction_shift: 1.0,
            threshold_rel: 0.5,
        }
    }
}

/// Per-frame pipeline output.
#[derive(Clone, Debug)]
pub struct PipelineOutput {
    /// Non-negative response map.
    pub response: Matrix,
    /// Heading map in `[0, 2π)` (NaN where undefined); present only when
    /// direction channels are enabled.
    pub direction: Option<Matrix>,
}

/// Configured sub-units; built once by `init_config`.
struct Stages {
    blur: Matrix,
    bandpass: GammaBandpass,
    off_delay: TemporalFilter,
    inhibition: SurroundInhibition,
    combiner: Option<DirectionCombiner>,
    shape: Option<(usize, usize)>,
}

/// The pipeline stage: `Unconfigured → Configured → (Processing)*`.
///
/// `init_config` must be called exactly once, after all parameters are
/// set; `process` mutates the internal frame history exactly once per
/// call, so an instance is not reentrant.
pub struct StmdPipeline {
    params: PipelineParams,
    stages: Option<Stages>,
}

impl StmdPipeline {
    /// New, unconfigured stage.
    pub fn new(params: PipelineParams) -> Self {
        Self {
            params,
            stages: None,
        }
    }

    pub fn params(&self) -> &PipelineParams {
        &self.params
    }

    /// Build every kernel and allocate every buffer. Fails fast on bad
    /// parameters; calling it a second time is an error.
    pub fn init_config(&mut self) -> Result<(), Error> {
        if self.stages.is_some() {
            return Err(Error::InvalidParameter(
                "init_config called twice".into(),
            ));
        }
        let p = &self.params;
        let combiner = match p.num_directions {
            0 => None,
            c => Some(DirectionCombiner::new(c)?),
        };
        self.stages = Some(Stages {
            blur: gaussian_kernel(p.blur_size, p.blur_sigma)?,
            bandpass: GammaBandpass::new(p.fast_order, p.fast_tau, p.slow_order, p.slow_tau)?,
            off_delay: TemporalFilter::gamma(p.delay_order, p.delay_tau, None)?,
            inhibition: SurroundInhibition::new(
                p.kernel_size,
                p.sigma1,
                p.sigma2,
                p.e,
                p.rho,
                p.a,
                p.b,
            )?,
            combiner,
            shape: None,
        });
        Ok(())
    }

    /// Consume one frame and produce the response (+ direction) map.
    pub fn process(&mut self, frame: &Matrix) -> Result<PipelineOutput, Error> {
        let stages = self.stages.as_mut().ok_or(Error::NotInitialized)?;
        match stages.shape {
            None => stages.shape = Some(frame.shape()),
            Some((w, h)) if (w, h) != frame.shape() => {
                return Err(Error::ShapeMismatch {
                    expected_w: w,
                    expected_h: h,
                    w: frame.w,
                    h: frame.h,
                })
            }
            Some(_) => {}
        }

        // retina: smooth photoreceptor input
        let retina = convolve2d(frame, &stages.blur);
        // lamina: band-pass picks up luminance change
        let band = stages.bandpass.process(&retina)?;
        // medulla: half-wave split; the OFF channel is delayed
        let on = band.rectified();
        let off = band.map(|v| (-v).max(0.0));
        let delayed_off = stages.off_delay.process(&off)?;

        match &stages.combiner {
            None => {
                // lobula: correlate, then suppress spatially broad clutter
                let correlation = on.hadamard(&delayed_off);
                let response = stages.inhibition.process(&correlation);
                Ok(PipelineOutput {
                    response,
                    direction: None,
                })
            }
            Some(combiner) => {
                let shift = self.params.direction_shift;
                let mut channels = Vec::with_capacity(combiner.num_channels());
                for c in 0..combiner.num_channels() {
                    let theta = combiner.theta(c);
                    let dx = (shift * theta.cos()).round() as i32;
                    let dy = (shift * theta.sin()).round() as i32;
                    let correlation = on.hadamard(&delayed_off.shifted(dx, dy));
                    channels.push(stages.inhibition.process(&correlation));
                }
                let (response, direction) = combiner.combine(&channels)?;
                Ok(PipelineOutput {
                    response,
                    direction: Some(direction),
                })
            }
        }
    }

    /// Process a frame and extract thresholded peaks in one call.
    pub fn detect(&mut self, frame: &Matrix, engine: &mut NmsEngine) -> Result<Vec<Peak>, Error> {
        let output = self.process(frame)?;
        let peaks = peaks_from_response(
            &output.response,
            output.direction.as_ref(),
            engine,
            self.params.threshold_rel,
        );
        debug!(peaks = peaks.len(), "frame processed");
        Ok(peaks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stmd_core::NmsMethod;

    fn small_params() -> PipelineParams {
        PipelineParams {
            delay_order: 2,
            delay_tau: 3.0,
            kernel_size: 5,
            ..PipelineParams::default()
        }
    }

    #[test]
    fn process_before_init_is_an_error() {
        let mut pipeline = StmdPipeline::new(small_params());
        let err = pipeline.process(&Matrix::zeros(8, 8)).unwrap_err();
        assert_eq!(err, Error::NotInitialized);
    }

    #[test]
    fn init_config_is_once_only() {
        let mut pipeline = StmdPipeline::new(small_params());
        pipeline.init_config().unwrap();
        assert!(pipeline.init_config().is_err());
    }

    #[test]
    fn shape_change_is_rejected() {
        let mut pipeline = StmdPipeline::new(small_params());
        pipeline.init_config().unwrap();
        pipeline.process(&Matrix::zeros(16, 12)).unwrap();
        let err = pipeline.process(&Matrix::zeros(12, 16)).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn static_scene_produces_no_response() {
        let mut pipeline = StmdPipeline::new(small_params());
        pipeline.init_config().unwrap();
        let frame = Matrix::from_vec(20, 20, vec![0.5; 400]).unwrap();
        let mut last = Matrix::zeros(0, 0);
        for _ in 0..30 {
            last = pipeline.process(&frame).unwrap().response;
        }
        assert!(last.max_value() < 1e-4);

        let mut engine = NmsEngine::new(3, NmsMethod::Conv2).unwrap();
        let peaks = peaks_from_response(&last, None, &mut engine, 0.5);
        assert!(peaks.iter().all(|p| p.score < 1e-4));
    }

    #[test]
    fn directional_mode_emits_a_direction_map() {
        let mut pipeline = StmdPipeline::new(PipelineParams {
            num_directions: 4,
            ..small_params()
        });
        pipeline.init_config().unwrap();
        let out = pipeline.process(&Matrix::zeros(16, 16)).unwrap();
        assert!(out.direction.is_some());
        assert_eq!(out.direction.unwrap().shape(), (16, 16));
    }
}
