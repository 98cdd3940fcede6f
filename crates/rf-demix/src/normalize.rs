//! Mix normalization
//!
//! Separation models are trained on mixes quantized to 16 bits and scaled to
//! zero mean and unit variance. The statistics are measured on the channel
//! average of the quantized mix and applied to every channel, then undone on
//! the separated sources.

use ndarray::{Array2, ArrayBase, ArrayView2, Axis, Data, Dimension};

const QUANT_SCALE: f32 = 32768.0;

/// Quantize to the 16-bit grid (`round(x * 2^15) / 2^15`)
pub fn quantize_16bit(mix: ArrayView2<'_, f32>) -> Array2<f32> {
    mix.mapv(|x| (x * QUANT_SCALE).round() / QUANT_SCALE)
}

/// Scale statistics of a mix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixNormalizer {
    pub mean: f32,
    pub std: f32,
}

impl MixNormalizer {
    /// Identity normalization
    pub fn identity() -> Self {
        Self {
            mean: 0.0,
            std: 1.0,
        }
    }

    /// Measure mean and unbiased standard deviation of the channel average.
    ///
    /// Silent or too-short mixes have no usable deviation; they keep a unit
    /// scale so that normalization only removes the offset.
    pub fn analyze(mix: ArrayView2<'_, f32>) -> Self {
        let Some(reference) = mix.mean_axis(Axis(0)) else {
            return Self::identity();
        };

        let mean = reference.mean().unwrap_or(0.0);
        let std = if reference.len() > 1 {
            reference.std(1.0)
        } else {
            0.0
        };

        if !(std.is_finite() && std > f32::EPSILON) || !mean.is_finite() {
            log::warn!(
                "Mix has no usable deviation (mean {}, std {}), skipping scaling",
                mean,
                std
            );
            return Self {
                mean: if mean.is_finite() { mean } else { 0.0 },
                std: 1.0,
            };
        }

        Self { mean, std }
    }

    /// `(x - mean) / std`
    pub fn normalize<S, D>(&self, audio: &ArrayBase<S, D>) -> ndarray::Array<f32, D>
    where
        S: Data<Elem = f32>,
        D: Dimension,
    {
        audio.mapv(|x| (x - self.mean) / self.std)
    }

    /// `y * std + mean`, applied in place to separated sources
    pub fn denormalize_in_place<D: Dimension>(&self, sources: &mut ndarray::Array<f32, D>) {
        sources.mapv_inplace(|y| y * self.std + self.mean);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array3, array};

    #[test]
    fn test_quantize_snaps_to_grid() {
        let mix = array![[0.1f32, -0.5, 1.0 / 65536.0]];
        let q = quantize_16bit(mix.view());
        for &x in q.iter() {
            assert_abs_diff_eq!((x * QUANT_SCALE).fract(), 0.0);
        }
        assert_eq!(q[[0, 1]], -0.5);
    }

    #[test]
    fn test_statistics_use_channel_average() {
        // Channel average: [1, 2, 3, 4] -> mean 2.5, unbiased std sqrt(5/3)
        let mix = array![[0.0f32, 2.0, 2.0, 4.0], [2.0, 2.0, 4.0, 4.0]];
        let stats = MixNormalizer::analyze(mix.view());
        assert_abs_diff_eq!(stats.mean, 2.5, epsilon = 1e-6);
        assert_abs_diff_eq!(stats.std, (5.0f32 / 3.0).sqrt(), epsilon = 1e-5);
    }

    #[test]
    fn test_round_trip() {
        let mix = Array2::from_shape_fn((2, 500), |(c, i)| ((i as f32) * 0.05 + c as f32).sin() * 0.4);
        let stats = MixNormalizer::analyze(mix.view());
        let normalized = stats.normalize(&mix);

        let avg = normalized.mean_axis(Axis(0)).unwrap();
        assert_abs_diff_eq!(avg.mean().unwrap(), 0.0, epsilon = 1e-4);
        assert_abs_diff_eq!(avg.std(1.0), 1.0, epsilon = 1e-4);

        let mut sources = Array3::from_shape_fn((4, 2, 500), |(_, c, i)| normalized[[c, i]]);
        stats.denormalize_in_place(&mut sources);
        for source in sources.outer_iter() {
            assert_abs_diff_eq!(source, mix.view(), epsilon = 1e-4);
        }
    }

    #[test]
    fn test_silence_keeps_unit_scale() {
        let mix = Array2::<f32>::from_elem((2, 100), 0.25);
        let stats = MixNormalizer::analyze(mix.view());
        assert_eq!(stats.std, 1.0);
        assert_abs_diff_eq!(stats.mean, 0.25);

        let empty = Array2::<f32>::zeros((2, 0));
        assert_eq!(MixNormalizer::analyze(empty.view()), MixNormalizer::identity());
    }
}
