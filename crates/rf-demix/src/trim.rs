//! Length reconciliation between model output and the requested length

use ndarray::{ArrayBase, ArrayView, Axis, Data, Dimension, RawData, Slice};

use crate::error::{DemixError, DemixResult};

/// Something a tensor can be center-trimmed against.
///
/// Either an explicit length or another array, in which case its trailing
/// axis length is used.
pub trait TrimReference {
    fn target_len(&self) -> usize;
}

impl TrimReference for usize {
    fn target_len(&self) -> usize {
        *self
    }
}

impl<S, D> TrimReference for ArrayBase<S, D>
where
    S: RawData,
    D: Dimension,
{
    fn target_len(&self) -> usize {
        trailing_len(self)
    }
}

impl<T: TrimReference + ?Sized> TrimReference for &T {
    fn target_len(&self) -> usize {
        (**self).target_len()
    }
}

/// Length of the trailing axis (0 for a 0-d array)
pub(crate) fn trailing_len<S, D>(array: &ArrayBase<S, D>) -> usize
where
    S: RawData,
    D: Dimension,
{
    array.shape().last().copied().unwrap_or(0)
}

/// Center trim `tensor` along its trailing axis to the length of `reference`.
///
/// `floor(delta / 2)` samples are removed from the start and
/// `ceil(delta / 2)` from the end, so an odd leftover sample always comes
/// off the right side. Fails if `tensor` is shorter than the reference.
pub fn center_trim<'a, A, S, D, R>(
    tensor: &'a ArrayBase<S, D>,
    reference: R,
) -> DemixResult<ArrayView<'a, A, D>>
where
    S: Data<Elem = A>,
    D: Dimension,
    R: TrimReference,
{
    let length = trailing_len(tensor);
    let target = reference.target_len();

    if length < target {
        return Err(DemixError::InvalidLength {
            length,
            reference: target,
        });
    }

    let delta = length - target;
    let view = tensor.view();
    if delta == 0 || tensor.ndim() == 0 {
        return Ok(view);
    }

    let start = delta / 2;
    let axis = Axis(tensor.ndim() - 1);
    Ok(view.slice_axis_move(axis, Slice::from(start..start + target)))
}
