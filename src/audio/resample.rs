//! Band-limited sample rate conversion.
//!
//! Uses rubato's windowed-sinc resampler so that content above the new
//! Nyquist frequency is filtered out instead of folding back. The whole
//! waveform is pushed through in fixed-size chunks, the tail is flushed and the
//! filter delay removed, so the output keeps the input's duration:
//! `output.len() == ceil(input.len() * target / native)`.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::debug;

use super::Waveform;
use crate::error::ScoreError;

const CHUNK_SIZE: usize = 1024;

fn sinc_parameters() -> SincInterpolationParameters {
    SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    }
}

/// Converts `waveform` to `target_rate` Hz. Returns it unchanged when the
/// rates already match.
pub fn resample(waveform: Waveform, target_rate: u32) -> Result<Waveform, ScoreError> {
    if target_rate == 0 {
        return Err(ScoreError::Configuration(
            "target sample rate must be positive".to_string(),
        ));
    }
    if waveform.sample_rate == 0 {
        return Err(ScoreError::Decode("source sample rate is zero".to_string()));
    }
    if waveform.sample_rate == target_rate {
        return Ok(waveform);
    }
    if waveform.is_empty() {
        return Ok(Waveform::new(Vec::new(), target_rate));
    }

    let ratio = target_rate as f64 / waveform.sample_rate as f64;
    let expected = output_len(waveform.len(), waveform.sample_rate, target_rate);

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, sinc_parameters(), CHUNK_SIZE, 1)?;
    let delay = resampler.output_delay();
    let input = &waveform.samples;

    let mut output: Vec<f32> = Vec::with_capacity(expected + delay + CHUNK_SIZE);
    let mut pos = 0usize;

    while input.len() - pos >= resampler.input_frames_next() {
        let end = pos + resampler.input_frames_next();
        let frames: [&[f32]; 1] = [&input[pos..end]];
        let chunk = resampler.process(&frames[..], None)?;
        output.extend_from_slice(&chunk[0]);
        pos = end;
    }

    if pos < input.len() {
        let frames: [&[f32]; 1] = [&input[pos..]];
        let chunk = resampler.process_partial(Some(&frames[..]), None)?;
        output.extend_from_slice(&chunk[0]);
    }

    // Flush the filter until the delayed tail has come out.
    while output.len() < expected + delay {
        let chunk = resampler.process_partial(None::<&[&[f32]]>, None)?;
        if chunk[0].is_empty() {
            break;
        }
        output.extend_from_slice(&chunk[0]);
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected);

    debug!(
        from = waveform.sample_rate,
        to = target_rate,
        input_samples = input.len(),
        output_samples = output.len(),
        "Resampled waveform"
    );

    Ok(Waveform::new(output, target_rate))
}

/// `ceil(len * to / from)` in integer arithmetic.
fn output_len(len: usize, from: u32, to: u32) -> usize {
    let num = len as u64 * to as u64;
    num.div_ceil(from as u64) as usize
}
