//! WAV input and stem output

use std::path::{Path, PathBuf};

use ndarray::Array2;

use crate::error::{DemixError, DemixResult};
use crate::separation::StemCollection;

/// Channels the separation models expect
pub const MODEL_CHANNELS: usize = 2;

/// Read a WAV file into `[2, samples]` f32 in [-1, 1].
///
/// Mono is duplicated to both channels. The file must already be at
/// `expected_rate`; no resampling is done.
pub fn read_wav<P: AsRef<Path>>(path: P, expected_rate: u32) -> DemixResult<Array2<f32>> {
    let path = path.as_ref();
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels as usize;

    if spec.sample_rate != expected_rate {
        return Err(DemixError::UnsupportedAudio(format!(
            "{}: sample rate {} Hz, expected {} Hz",
            path.display(),
            spec.sample_rate,
            expected_rate
        )));
    }
    if channels == 0 || channels > MODEL_CHANNELS {
        return Err(DemixError::UnsupportedAudio(format!(
            "{}: {} channels, expected mono or stereo",
            path.display(),
            channels
        )));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()?
        }
    };

    let frames = interleaved.len() / channels;
    let audio = Array2::from_shape_fn((MODEL_CHANNELS, frames), |(c, i)| {
        interleaved[i * channels + c.min(channels - 1)]
    });

    log::debug!(
        "Read {} ({} frames, {} channels, {} bit {:?})",
        path.display(),
        frames,
        channels,
        spec.bits_per_sample,
        spec.sample_format
    );
    Ok(audio)
}

/// `<out>/<model_name>/<track name up to its first '.'>`
pub fn track_folder<P: AsRef<Path>, T: AsRef<Path>>(out: P, model_name: &str, track: T) -> PathBuf {
    let file_name = track
        .as_ref()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = file_name.split('.').next().unwrap_or_default();
    out.as_ref().join(model_name).join(stem)
}

/// Write one 32-bit float WAV per stem into `dir` as `<stem>.wav`.
pub fn write_stems<P: AsRef<Path>>(collection: &StemCollection, dir: P) -> DemixResult<Vec<PathBuf>> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;

    let mut written = Vec::with_capacity(collection.len());
    for stem in collection.iter() {
        let path = dir.join(format!("{}.wav", stem.stem_type.short_name()));
        let spec = hound::WavSpec {
            channels: stem.channels() as u16,
            sample_rate: stem.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };

        let mut writer = hound::WavWriter::create(&path, spec)?;
        for sample in stem.interleaved() {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;

        log::debug!("Wrote {}", path.display());
        written.push(path);
    }

    Ok(written)
}
