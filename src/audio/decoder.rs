use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use crate::error::DecodeError;
use crate::types::AudioData;

/// Decode an audio file to raw PCM samples (mono, f32) at its native rate.
///
/// `max_duration` (seconds) stops decoding once that much audio is collected.
pub fn decode_audio<P: AsRef<Path>>(
    path: P,
    max_duration: Option<f64>,
) -> Result<AudioData, DecodeError> {
    let path = path.as_ref();
    let fail = |reason: String| DecodeError::new(path, reason);

    let file = std::fs::File::open(path).map_err(|err| fail(format!("cannot open: {err}")))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let probe_result = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| fail(format!("unrecognised format: {err}")))?;
    let mut format = probe_result.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| fail("no audio tracks found".to_string()))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| fail("sample rate not specified".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|err| fail(format!("unsupported codec: {err}")))?;

    let limit = max_duration
        .map(|seconds| ((seconds * sample_rate as f64).ceil() as usize).max(1))
        .unwrap_or(usize::MAX);
    let mut mono = Vec::new();
    let mut skipped_packets = 0usize;

    while mono.len() < limit {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(err) => return Err(fail(format!("failed to read packet: {err}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(reason)) => {
                skipped_packets += 1;
                debug!(file = %path.display(), reason = %reason, "skipping undecodable packet");
                continue;
            }
            Err(err) => return Err(fail(format!("decode failed: {err}"))),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        mix_to_mono(buffer.samples(), channels, &mut mono);
    }

    mono.truncate(limit);
    if mono.is_empty() {
        return Err(fail(format!(
            "no samples decoded ({skipped_packets} packets skipped)"
        )));
    }

    Ok(AudioData::new(mono, sample_rate))
}

/// Average interleaved frames down to a single channel.
fn mix_to_mono(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels == 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    let scale = 1.0 / channels as f32;
    out.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() * scale),
    );
}
