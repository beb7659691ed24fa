//! Container probing and packet decoding.
//!
//! The container format is detected from the content itself, so callers can
//! hand over an upload without a file name. Every channel layout is reduced to
//! mono by averaging the channels at each time index.

use std::io::{Cursor, ErrorKind};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use super::Waveform;
use crate::error::ScoreError;

/// Decodes an encoded audio buffer into a mono waveform at its native rate.
///
/// Fails with [`ScoreError::Decode`] when the buffer is empty, the container
/// is not recognised, no sample rate can be determined, or a sample is NaN or
/// infinite. Individual packets that fail to decode are skipped.
pub fn decode(bytes: Vec<u8>) -> Result<Waveform, ScoreError> {
    if bytes.is_empty() {
        return Err(ScoreError::Decode("empty audio buffer".to_string()));
    }

    let source = Cursor::new(bytes);
    let mss = MediaSourceStream::new(Box::new(source), Default::default());

    let probed = symphonia::default::get_probe().format(
        &Hint::new(),
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| ScoreError::Decode("no supported audio track".to_string()))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples: Vec<f32> = Vec::new();
    let mut channels = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(Error::IoError(ref e)) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(Error::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate.get_or_insert(spec.rate);
                channels = spec.channels.count();

                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                if let Some(offset) = buf.samples().iter().position(|s| !s.is_finite()) {
                    return Err(ScoreError::Decode(format!(
                        "non-finite sample at index {}",
                        samples.len() * channels.max(1) + offset
                    )));
                }
                downmix_into(buf.samples(), channels, &mut samples);
            }
            Err(Error::DecodeError(msg)) => {
                warn!(packet_ts = packet.ts(), error = msg, "Skipping undecodable packet");
            }
            Err(Error::IoError(ref e)) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
    }

    let sample_rate = sample_rate
        .filter(|&rate| rate > 0)
        .ok_or_else(|| ScoreError::Decode("stream has no sample rate".to_string()))?;

    debug!(
        sample_rate,
        channels,
        samples = samples.len(),
        "Decoded audio"
    );

    Ok(Waveform::new(samples, sample_rate))
}

/// Appends the per-frame channel mean of `interleaved` to `out`.
pub(crate) fn downmix_into(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels <= 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    out.reserve(interleaved.len() / channels);
    for frame in interleaved.chunks_exact(channels) {
        let sum: f32 = frame.iter().sum();
        out.push(sum / channels as f32);
    }
}
