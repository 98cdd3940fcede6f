//! Model application engine
//!
//! Applies a [`Predictor`] to a mix of any length and returns one waveform per
//! source with exactly the length of the mix. Three strategies compose:
//!
//! - **Single**: pad to the predictor's valid length, run it once, center trim
//!   back to the original length.
//! - **Shift**: run Single on randomly time-shifted copies of the mix and
//!   average the de-shifted outputs (equivariant stabilization).
//! - **Split**: cut the mix into fixed windows and run Shift or Single on each,
//!   bounding peak memory by the window size.
//!
//! The strategy is an explicit value threaded through the calls. Split only
//! ever hands its windows to Shift or Single, and Shift only to Single, so the
//! recursion is at most three levels deep.
//!
//! ```rust,ignore
//! use rf_demix::{apply_model, ApplyOptions};
//! use rand::SeedableRng;
//!
//! let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(42);
//! let options = ApplyOptions::default().with_shifts(10).with_split(true);
//! let sources = apply_model(&predictor, mix.view(), &options, &mut rng)?;
//! assert_eq!(sources.shape(), &[4, mix.nrows(), mix.ncols()]);
//! ```

mod shift;
mod split;

use ndarray::{Array3, ArrayView2, Axis, s};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{DemixError, DemixResult};
use crate::predictor::Predictor;
use crate::trim::center_trim;
use crate::{CHUNK_SAMPLES, MAX_SHIFT, SOURCES};

pub use shift::draw_offsets;

/// Knobs governing which strategies activate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyOptions {
    /// Number of random shifts to average (0 = disabled)
    pub shifts: usize,

    /// Process the mix in fixed windows of `chunk_samples`
    pub split: bool,

    /// Window length for split mode
    pub chunk_samples: usize,

    /// Upper bound (exclusive) of the random shift offsets
    pub max_shift: usize,

    /// Evaluate windows and shifts on the rayon pool
    pub parallel: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            shifts: 0,
            split: false,
            chunk_samples: CHUNK_SAMPLES,
            max_shift: MAX_SHIFT,
            parallel: false,
        }
    }
}

impl ApplyOptions {
    pub fn with_shifts(mut self, shifts: usize) -> Self {
        self.shifts = shifts;
        self
    }

    pub fn with_split(mut self, split: bool) -> Self {
        self.split = split;
        self
    }

    pub fn with_chunk_samples(mut self, chunk_samples: usize) -> Self {
        self.chunk_samples = chunk_samples;
        self
    }

    pub fn with_max_shift(mut self, max_shift: usize) -> Self {
        self.max_shift = max_shift;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Strategy for a top-level call
    pub fn strategy(&self) -> Strategy {
        Strategy::select(self.shifts, self.split)
    }

    /// Reject settings that can never produce output
    pub fn validate(&self) -> DemixResult<()> {
        if self.split && self.chunk_samples == 0 {
            return Err(DemixError::Config("chunk_samples must be > 0".into()));
        }
        if self.shifts > 0 && self.max_shift == 0 {
            return Err(DemixError::Config(
                "max_shift must be > 0 when shifts are enabled".into(),
            ));
        }
        Ok(())
    }
}

/// How a single call applies the predictor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Fixed windows, each handled with `Shift { shifts }` or `Single`
    Split { shifts: usize },
    /// Average over `shifts` random offsets, each handled with `Single`
    Shift { shifts: usize },
    /// One padded predictor invocation
    Single,
}

impl Strategy {
    /// Split wins over shifting; shifting wins over the single pass
    pub fn select(shifts: usize, split: bool) -> Self {
        if split {
            Strategy::Split { shifts }
        } else if shifts > 0 {
            Strategy::Shift { shifts }
        } else {
            Strategy::Single
        }
    }
}

/// Apply `model` to `mix` (`[channels, samples]`).
///
/// Returns `[SOURCES, channels, samples]`. The random generator drives shift
/// offsets only; seed it to make shift averaging reproducible.
pub fn apply_model<P, R>(
    model: &P,
    mix: ArrayView2<'_, f32>,
    options: &ApplyOptions,
    rng: &mut R,
) -> DemixResult<Array3<f32>>
where
    P: Predictor + ?Sized,
    R: Rng + ?Sized,
{
    options.validate()?;
    run(model, mix, options.strategy(), options, rng)
}

pub(crate) fn run<P, R>(
    model: &P,
    mix: ArrayView2<'_, f32>,
    strategy: Strategy,
    options: &ApplyOptions,
    rng: &mut R,
) -> DemixResult<Array3<f32>>
where
    P: Predictor + ?Sized,
    R: Rng + ?Sized,
{
    match strategy {
        Strategy::Split { shifts } => split::apply_split(model, mix, shifts, options, rng),
        Strategy::Shift { shifts } => shift::apply_shifted(model, mix, shifts, options, rng),
        Strategy::Single => apply_single(model, mix),
    }
}

/// Single padded pass through the predictor.
///
/// The mix is zero-padded on both sides up to `model.valid_length(L)` (extra
/// sample on the right), and the output is center trimmed back to `L`.
pub fn apply_single<P>(model: &P, mix: ArrayView2<'_, f32>) -> DemixResult<Array3<f32>>
where
    P: Predictor + ?Sized,
{
    let (channels, length) = mix.dim();
    let valid_length = model.valid_length(length);
    if valid_length < length {
        return Err(DemixError::InvalidLength {
            length: valid_length,
            reference: length,
        });
    }

    let delta = valid_length - length;
    let left = delta / 2;

    let mut padded = Array3::<f32>::zeros((1, channels, valid_length));
    padded
        .slice_mut(s![0, .., left..left + length])
        .assign(&mix);

    let output = model.predict(padded.view())?;

    let shape = output.shape();
    if shape[0] != 1 || shape[1] != SOURCES || shape[2] != channels {
        return Err(DemixError::InvalidOutputShape {
            expected: format!("[1, {}, {}, >={}]", SOURCES, channels, length),
            got: format!("{:?}", shape),
        });
    }

    let output = output.index_axis_move(Axis(0), 0);
    let trimmed = center_trim(&output, &mix)?;
    Ok(trimmed.to_owned())
}
