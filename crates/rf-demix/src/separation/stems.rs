//! Stem types and output structures

use ndarray::{Array2, Array3, Axis};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::SOURCES;
use crate::error::{DemixError, DemixResult};

/// Separated source, in model output order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StemType {
    /// Drum kit (kick, snare, hats, toms, cymbals)
    Drums,
    /// Bass instruments (bass guitar, synth bass)
    Bass,
    /// Everything else (guitars, synths, strings, etc.)
    Other,
    /// Vocal content (lead, backing, harmonies)
    Vocals,
}

impl StemType {
    /// Order of the sources along the model's source axis
    pub const ORDER: [StemType; SOURCES] = [
        StemType::Drums,
        StemType::Bass,
        StemType::Other,
        StemType::Vocals,
    ];

    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            StemType::Drums => "Drums",
            StemType::Bass => "Bass",
            StemType::Other => "Other",
            StemType::Vocals => "Vocals",
        }
    }

    /// Get short name for file naming
    pub fn short_name(&self) -> &'static str {
        match self {
            StemType::Drums => "drums",
            StemType::Bass => "bass",
            StemType::Other => "other",
            StemType::Vocals => "vocals",
        }
    }

    /// Index along the model's source axis
    pub fn index(&self) -> usize {
        match self {
            StemType::Drums => 0,
            StemType::Bass => 1,
            StemType::Other => 2,
            StemType::Vocals => 3,
        }
    }
}

/// Single stem output
#[derive(Debug, Clone)]
pub struct StemOutput {
    /// Stem type
    pub stem_type: StemType,

    /// Audio data, `[channels, samples]`
    pub audio: Array2<f32>,

    /// Sample rate
    pub sample_rate: u32,
}

impl StemOutput {
    /// Create new stem output
    pub fn new(stem_type: StemType, audio: Array2<f32>, sample_rate: u32) -> Self {
        Self {
            stem_type,
            audio,
            sample_rate,
        }
    }

    /// Number of channels
    pub fn channels(&self) -> usize {
        self.audio.nrows()
    }

    /// Samples per channel
    pub fn samples(&self) -> usize {
        self.audio.ncols()
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.samples() as f64 / self.sample_rate as f64
    }

    /// Compute RMS level
    pub fn rms(&self) -> f32 {
        if self.audio.is_empty() {
            return 0.0;
        }

        let sum_sq: f32 = self.audio.iter().map(|&s| s * s).sum();
        (sum_sq / self.audio.len() as f32).sqrt()
    }

    /// Compute peak level
    pub fn peak(&self) -> f32 {
        self.audio.iter().map(|&s| s.abs()).fold(0.0f32, f32::max)
    }

    /// Channel-interleaved samples, as audio files store them
    pub fn interleaved(&self) -> Vec<f32> {
        self.audio.t().iter().copied().collect()
    }
}

/// Separated stems of one track
#[derive(Debug, Clone)]
pub struct StemCollection {
    /// Stems in model output order
    stems: Vec<StemOutput>,

    /// Sample rate
    pub sample_rate: u32,

    /// Model used
    pub model_name: String,

    /// Processing stats
    pub stats: SeparationStats,
}

impl StemCollection {
    /// Build from the engine output `[SOURCES, channels, samples]`
    pub fn from_sources(
        sources: Array3<f32>,
        sample_rate: u32,
        model_name: impl Into<String>,
    ) -> DemixResult<Self> {
        if sources.len_of(Axis(0)) != SOURCES {
            return Err(DemixError::InvalidOutputShape {
                expected: format!("[{}, channels, samples]", SOURCES),
                got: format!("{:?}", sources.shape()),
            });
        }

        let stems = StemType::ORDER
            .iter()
            .zip(sources.outer_iter())
            .map(|(&stem_type, audio)| StemOutput::new(stem_type, audio.to_owned(), sample_rate))
            .collect();

        Ok(Self {
            stems,
            sample_rate,
            model_name: model_name.into(),
            stats: SeparationStats::default(),
        })
    }

    /// Get a stem by type
    pub fn get(&self, stem_type: StemType) -> Option<&StemOutput> {
        self.stems.iter().find(|s| s.stem_type == stem_type)
    }

    /// Stems in model output order
    pub fn iter(&self) -> impl Iterator<Item = &StemOutput> {
        self.stems.iter()
    }

    /// Number of stems
    pub fn len(&self) -> usize {
        self.stems.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.stems.is_empty()
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.stems.first().map(StemOutput::duration).unwrap_or(0.0)
    }

    /// Remix stems with custom gains (missing gains default to 1.0)
    pub fn remix(&self, gains: &HashMap<StemType, f32>) -> Array2<f32> {
        let Some(reference) = self.stems.first() else {
            return Array2::zeros((0, 0));
        };

        let mut output = Array2::<f32>::zeros(reference.audio.raw_dim());
        for stem in &self.stems {
            let gain = gains.get(&stem.stem_type).copied().unwrap_or(1.0);
            output.scaled_add(gain, &stem.audio);
        }
        output
    }

    /// Get instrumental mix (everything except vocals)
    pub fn instrumental(&self) -> Array2<f32> {
        let gains = HashMap::from([(StemType::Vocals, 0.0)]);
        self.remix(&gains)
    }
}

/// Separation statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeparationStats {
    /// Total processing time (ms)
    pub elapsed_ms: u64,

    /// Samples per channel processed
    pub samples: usize,

    /// Real-time factor (1.0 = real-time, 10.0 = 10x faster)
    pub rtf: f32,

    /// Shifts averaged
    pub shifts: usize,

    /// Split mode used
    pub split: bool,
}
