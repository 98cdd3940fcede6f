//! Audio source separation (stem separation)
//!
//! Wraps a [`Predictor`] with the steps around the application engine:
//! - 16-bit quantization and normalization of the mix
//! - [`apply_model`] with the configured shifts / split
//! - denormalization and naming of the 4 stems (drums, bass, other, vocals)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rf_demix::separation::{Separator, SeparationConfig, StemType};
//!
//! let config = SeparationConfig::default().with_seed(42);
//! let mut separator = rf_demix::separation::load_onnx("models/demucs.onnx", config)?;
//! let stems = separator.separate(mix.view())?;
//!
//! let vocals = stems.get(StemType::Vocals).unwrap();
//! let instrumental = stems.instrumental();
//! ```

mod config;
mod stems;

pub use config::SeparationConfig;
pub use stems::{SeparationStats, StemCollection, StemOutput, StemType};

use std::path::Path;
use std::time::Instant;

use ndarray::ArrayView2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::apply::apply_model;
use crate::error::{DemixError, DemixResult};
use crate::format::format_duration;
use crate::inference::OnnxPredictor;
use crate::normalize::{MixNormalizer, quantize_16bit};
use crate::predictor::Predictor;

/// Separation pipeline around one predictor
pub struct Separator<P> {
    predictor: P,
    config: SeparationConfig,
    rng: ChaCha8Rng,
    model_name: String,
}

impl<P: Predictor> Separator<P> {
    pub fn new(predictor: P, config: SeparationConfig, model_name: impl Into<String>) -> DemixResult<Self> {
        config.validate()?;

        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_os_rng(),
        };

        Ok(Self {
            predictor,
            config,
            rng,
            model_name: model_name.into(),
        })
    }

    pub fn config(&self) -> &SeparationConfig {
        &self.config
    }

    pub fn predictor(&self) -> &P {
        &self.predictor
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Separate a `[channels, samples]` mix into stems of the same shape
    pub fn separate(&mut self, mix: ArrayView2<'_, f32>) -> DemixResult<StemCollection> {
        let (channels, samples) = mix.dim();
        if channels == 0 {
            return Err(DemixError::InvalidInputShape {
                expected: "[channels >= 1, samples]".into(),
                got: format!("{:?}", mix.shape()),
            });
        }

        let start = Instant::now();
        log::debug!(
            "{}: {} channels x {} samples, {} predictor passes",
            self.model_name,
            channels,
            samples,
            self.config.estimated_passes(samples)
        );

        let (normalizer, input) = if self.config.normalize {
            let quantized = quantize_16bit(mix);
            let normalizer = MixNormalizer::analyze(quantized.view());
            let input = normalizer.normalize(&quantized);
            (normalizer, input)
        } else {
            (MixNormalizer::identity(), mix.to_owned())
        };

        let options = self.config.to_apply_options();
        let mut sources = apply_model(&self.predictor, input.view(), &options, &mut self.rng)?;
        normalizer.denormalize_in_place(&mut sources);

        let mut collection =
            StemCollection::from_sources(sources, self.config.sample_rate, self.model_name.clone())?;

        let elapsed = start.elapsed();
        let audio_secs = samples as f64 / self.config.sample_rate as f64;
        collection.stats = SeparationStats {
            elapsed_ms: elapsed.as_millis() as u64,
            samples,
            rtf: if elapsed.as_secs_f64() > 0.0 {
                (audio_secs / elapsed.as_secs_f64()) as f32
            } else {
                0.0
            },
            shifts: self.config.shifts,
            split: self.config.split,
        };

        log::info!(
            "Separated {} of audio with {} in {} (shifts {}, split {})",
            format_duration(audio_secs),
            self.model_name,
            format_duration(elapsed.as_secs_f64()),
            self.config.shifts,
            self.config.split
        );

        Ok(collection)
    }
}

/// Separator backed by an ONNX model, named after the file stem
pub fn load_onnx<M: AsRef<Path>>(
    model_path: M,
    config: SeparationConfig,
) -> DemixResult<Separator<OnnxPredictor>> {
    let predictor = OnnxPredictor::new(model_path, config.geometry)?;
    let name = predictor.name().to_string();
    Separator::new(predictor, config, name)
}
