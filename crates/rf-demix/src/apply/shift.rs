//! Equivariant stabilization through random time shifts

use ndarray::{Array2, Array3, ArrayView2, s};
use rand::Rng;
use rand::seq::SliceRandom;
use rayon::prelude::*;

use super::{ApplyOptions, apply_single};
use crate::SOURCES;
use crate::error::DemixResult;
use crate::predictor::Predictor;

/// Draw `count` distinct offsets from `[0, max_shift)`.
///
/// The full offset range is shuffled and the first `count` kept, so offsets
/// never repeat; a `count >= max_shift` yields every offset exactly once.
pub fn draw_offsets<R>(rng: &mut R, max_shift: usize, count: usize) -> Vec<usize>
where
    R: Rng + ?Sized,
{
    let mut offsets: Vec<usize> = (0..max_shift).collect();
    offsets.shuffle(rng);
    offsets.truncate(count);
    offsets
}

/// Average the predictor over `shifts` randomly shifted copies of `mix`.
///
/// The sum over the drawn offsets is divided by `shifts`.
pub(super) fn apply_shifted<P, R>(
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
    let max_shift = options.max_shift;

    let mut padded = Array2::<f32>::zeros((channels, length + 2 * max_shift));
    padded
        .slice_mut(s![.., max_shift..max_shift + length])
        .assign(&mix);

    let offsets = draw_offsets(rng, max_shift, shifts);
    log::debug!(
        "Averaging {} shifts over {} samples ({} channels)",
        offsets.len(),
        length,
        channels
    );

    // Window starts `offset` samples into the padding; the model output is
    // read back `max_shift - offset` samples in to undo the shift.
    let deshifted = |offset: usize| -> DemixResult<Array3<f32>> {
        let shifted = padded.slice(s![.., offset..offset + length + max_shift]);
        let out = apply_single(model, shifted)?;
        let start = max_shift - offset;
        Ok(out.slice(s![.., .., start..start + length]).to_owned())
    };

    let mut out = if options.parallel {
        offsets
            .par_iter()
            .map(|&offset| deshifted(offset))
            .try_reduce(
                || Array3::<f32>::zeros((SOURCES, channels, length)),
                |acc, next| Ok(acc + &next),
            )?
    } else {
        let mut acc = Array3::<f32>::zeros((SOURCES, channels, length));
        for &offset in &offsets {
            acc += &deshifted(offset)?;
        }
        acc
    };

    // Offsets never repeat, so past max_shift the sum holds fewer than
    // `shifts` terms; the divisor stays `shifts`.
    out /= shifts as f32;
    Ok(out)
}
