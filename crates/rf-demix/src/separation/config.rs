//! Separation configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::apply::ApplyOptions;
use crate::error::{DemixError, DemixResult};
use crate::predictor::ValidLength;
use crate::{CHUNK_SAMPLES, MAX_SHIFT, SAMPLE_RATE};

/// Separation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeparationConfig {
    /// Number of random shifts (more = better quality, slower)
    pub shifts: usize,

    /// Split the input into fixed windows (required for memory hungry models)
    pub split: bool,

    /// Window length for split mode
    pub chunk_samples: usize,

    /// Upper bound of the random shift offsets
    pub max_shift: usize,

    /// Run windows and shifts on the rayon pool
    pub parallel: bool,

    /// Seed for shift offsets (None = seeded from the OS)
    pub seed: Option<u64>,

    /// Normalize the mix before separation and undo it on the stems
    pub normalize: bool,

    /// Model sample rate
    pub sample_rate: u32,

    /// Input length rule of the model
    pub geometry: ValidLength,
}

impl Default for SeparationConfig {
    fn default() -> Self {
        Self {
            shifts: 10,
            split: false,
            chunk_samples: CHUNK_SAMPLES,
            max_shift: MAX_SHIFT,
            parallel: false,
            seed: None,
            normalize: true,
            sample_rate: SAMPLE_RATE,
            geometry: ValidLength::default(),
        }
    }
}

impl SeparationConfig {
    /// Single pass, no shift averaging
    pub fn fast() -> Self {
        Self {
            shifts: 0,
            ..Self::default()
        }
    }

    /// Shift averaging on bounded-memory windows, spread over all cores
    pub fn high_quality() -> Self {
        Self {
            shifts: 10,
            split: true,
            parallel: true,
            ..Self::default()
        }
    }

    pub fn with_shifts(mut self, shifts: usize) -> Self {
        self.shifts = shifts;
        self
    }

    pub fn with_split(mut self, split: bool) -> Self {
        self.split = split;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_geometry(mut self, geometry: ValidLength) -> Self {
        self.geometry = geometry;
        self
    }

    /// Load from a JSON file; missing fields take their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> DemixResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| DemixError::Config(format!("{}: {}", path.as_ref().display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Engine options for this configuration
    pub fn to_apply_options(&self) -> ApplyOptions {
        ApplyOptions {
            shifts: self.shifts,
            split: self.split,
            chunk_samples: self.chunk_samples,
            max_shift: self.max_shift,
            parallel: self.parallel,
        }
    }

    pub fn validate(&self) -> DemixResult<()> {
        if self.chunk_samples == 0 {
            return Err(DemixError::Config("chunk_samples must be > 0".into()));
        }
        if self.max_shift == 0 {
            return Err(DemixError::Config("max_shift must be > 0".into()));
        }
        if self.sample_rate == 0 {
            return Err(DemixError::Config("sample_rate must be > 0".into()));
        }
        Ok(())
    }

    /// Predictor invocations for a mix of `samples` per channel
    pub fn estimated_passes(&self, samples: usize) -> usize {
        let windows = if self.split {
            samples.div_ceil(self.chunk_samples).max(1)
        } else {
            1
        };
        windows * self.shifts.min(self.max_shift).max(1)
    }
}
