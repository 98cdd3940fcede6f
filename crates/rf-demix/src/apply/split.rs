//! Fixed-window processing for predictors with a large memory footprint

use ndarray::{Array3, ArrayView2, Axis, s};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use super::{ApplyOptions, Strategy, run};
use crate::SOURCES;
use crate::error::DemixResult;
use crate::predictor::Predictor;

/// Apply the predictor window by window and stitch the results.
///
/// Windows are `chunk_samples` long (the last one may be shorter), do not
/// overlap and are written back at hard boundaries. Each window gets its own
/// generator seeded from `rng` in window order, so sequential and parallel
/// runs draw the same shift offsets.
pub(super) fn apply_split<P, R>(
    model: &P,
    mix: ArrayView2<'_, f32>,
    shifts: usize,
    options: &ApplyOptions,
    rng: &mut R,
) -> DemixResult<Array3<f32>>
where
    P: Predictor + ?Sized,
    R: Rng + ?Sized,
{
    let (channels, length) = mix.dim();
    let chunk = options.chunk_samples;
    let inner = Strategy::select(shifts, false);

    let windows: Vec<(usize, u64)> = (0..length)
        .step_by(chunk)
        .map(|offset| (offset, rng.random::<u64>()))
        .collect();

    log::debug!(
        "Splitting {} samples into {} windows of {} ({:?} per window)",
        length,
        windows.len(),
        chunk,
        inner
    );

    let process = |offset: usize, seed: u64| -> DemixResult<Array3<f32>> {
        let end = (offset + chunk).min(length);
        let window = mix.slice(s![.., offset..end]);
        let mut window_rng = ChaCha8Rng::seed_from_u64(seed);
        run(model, window, inner, options, &mut window_rng)
    };

    let mut out = Array3::<f32>::zeros((SOURCES, channels, length));
    let mut write = |offset: usize, window_out: Array3<f32>| {
        let len = window_out.len_of(Axis(2));
        out.slice_mut(s![.., .., offset..offset + len])
            .assign(&window_out);
    };

    if options.parallel {
        // One batch of windows in flight per pool pass keeps memory bounded
        // by the thread count, not the mix length.
        let batch = rayon::current_num_threads().max(1);
        for group in windows.chunks(batch) {
            let results = group
                .par_iter()
                .map(|&(offset, seed)| process(offset, seed).map(|o| (offset, o)))
                .collect::<DemixResult<Vec<_>>>()?;
            for (offset, window_out) in results {
                write(offset, window_out);
            }
        }
    } else {
        for &(offset, seed) in &windows {
            write(offset, process(offset, seed)?);
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::apply_model;
    use crate::error::DemixError;
    use crate::predictor::{FnPredictor, ValidLength};
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, Array4, ArrayView3};
    use std::sync::Mutex;

    fn broadcast(input: ArrayView3<'_, f32>) -> DemixResult<Array4<f32>> {
        let (batch, channels, samples) = input.dim();
        let mut out = Array4::<f32>::zeros((batch, SOURCES, channels, samples));
        for mut source in out.axis_iter_mut(Axis(1)) {
            source.assign(&input);
        }
        Ok(out)
    }

    fn ramp(channels: usize, samples: usize) -> Array2<f32> {
        Array2::from_shape_fn((channels, samples), |(c, i)| (c * samples + i) as f32)
    }

    #[test]
    fn test_exact_multiple_reassembles_without_gaps() {
        let lengths = Mutex::new(Vec::new());
        let model = FnPredictor::new(ValidLength::Exact, |input| {
            lengths.lock().unwrap().push(input.dim().2);
            broadcast(input)
        });
        let mix = ramp(2, 200);
        let options = ApplyOptions::default().with_split(true).with_chunk_samples(100);

        let out = apply_model(&model, mix.view(), &options, &mut ChaCha8Rng::seed_from_u64(0)).unwrap();
        assert_eq!(*lengths.lock().unwrap(), vec![100, 100]);
        for source in out.axis_iter(Axis(0)) {
            assert_eq!(source, mix);
        }
    }

    #[test]
    fn test_short_last_window() {
        let lengths = Mutex::new(Vec::new());
        let model = FnPredictor::new(ValidLength::Multiple { of: 64 }, |input| {
            lengths.lock().unwrap().push(input.dim().2);
            broadcast(input)
        });
        let mix = ramp(1, 250);
        let options = ApplyOptions::default().with_split(true).with_chunk_samples(100);

        let out = apply_model(&model, mix.view(), &options, &mut ChaCha8Rng::seed_from_u64(0)).unwrap();
        // 100, 100, 50 padded to multiples of 64
        assert_eq!(*lengths.lock().unwrap(), vec![128, 128, 64]);
        assert_eq!(out.shape(), &[SOURCES, 1, 250]);
        assert_eq!(out.index_axis(Axis(0), 3), mix);
    }

    #[test]
    fn test_boundaries_are_hard() {
        // Model stamps the window-relative index, which restarts at every boundary
        let model = FnPredictor::new(ValidLength::Exact, |input| {
            let mut out = broadcast(input)?;
            for ((_, _, _, i), value) in out.indexed_iter_mut() {
                *value = i as f32;
            }
            Ok(out)
        });
        let mix = Array2::<f32>::zeros((1, 25));
        let options = ApplyOptions::default().with_split(true).with_chunk_samples(10);

        let out = apply_model(&model, mix.view(), &options, &mut ChaCha8Rng::seed_from_u64(0)).unwrap();
        let expected: Vec<f32> = (0..25).map(|i| (i % 10) as f32).collect();
        assert_eq!(out.slice(s![0, 0, ..]).to_vec(), expected);
    }

    #[test]
    fn test_split_with_shifts_per_window() {
        let calls = Mutex::new(0usize);
        let model = FnPredictor::new(ValidLength::Exact, |input| {
            *calls.lock().unwrap() += 1;
            broadcast(input)
        });
        let mix = ramp(2, 30);
        let options = ApplyOptions::default()
            .with_split(true)
            .with_chunk_samples(10)
            .with_shifts(2)
            .with_max_shift(4);

        let out = apply_model(&model, mix.view(), &options, &mut ChaCha8Rng::seed_from_u64(1)).unwrap();
        assert_eq!(*calls.lock().unwrap(), 3 * 2);
        for source in out.axis_iter(Axis(0)) {
            assert_abs_diff_eq!(source, mix.view(), epsilon = 1e-3);
        }
    }

    #[test]
    fn test_empty_mix() {
        let model = FnPredictor::new(ValidLength::Exact, broadcast);
        let mix = Array2::<f32>::zeros((2, 0));
        let options = ApplyOptions::default().with_split(true);

        let out = apply_model(&model, mix.view(), &options, &mut ChaCha8Rng::seed_from_u64(0)).unwrap();
        assert_eq!(out.shape(), &[SOURCES, 2, 0]);
    }

    #[test]
    fn test_failing_window_fails_whole_call() {
        let model = FnPredictor::new(ValidLength::Exact, |input| {
            if input[[0, 0, 0]] >= 20.0 {
                return Err(DemixError::Predictor {
                    reason: "window 3".into(),
                });
            }
            broadcast(input)
        });
        let mix = Array2::from_shape_fn((1, 40), |(_, i)| i as f32);
        let options = ApplyOptions::default().with_split(true).with_chunk_samples(10);

        for parallel in [false, true] {
            let result = apply_model(
                &model,
                mix.view(),
                &options.with_parallel(parallel),
                &mut ChaCha8Rng::seed_from_u64(0),
            );
            assert!(matches!(result, Err(DemixError::Predictor { .. })));
        }
    }

    #[test]
    fn test_parallel_windows_match_sequential() {
        let model = FnPredictor::new(ValidLength::Multiple { of: 16 }, |input| {
            let mut out = broadcast(input)?;
            for ((_, s, _, i), value) in out.indexed_iter_mut() {
                *value = *value * 0.5 + (s * 3 + i % 7) as f32;
            }
            Ok(out)
        });
        let mix = ramp(2, 170);
        let options = ApplyOptions::default()
            .with_split(true)
            .with_chunk_samples(40)
            .with_shifts(3)
            .with_max_shift(9);

        let sequential =
            apply_model(&model, mix.view(), &options, &mut ChaCha8Rng::seed_from_u64(21)).unwrap();
        let parallel = apply_model(
            &model,
            mix.view(),
            &options.with_parallel(true),
            &mut ChaCha8Rng::seed_from_u64(21),
        )
        .unwrap();

        assert_abs_diff_eq!(sequential, parallel, epsilon = 1e-3);
    }
}
