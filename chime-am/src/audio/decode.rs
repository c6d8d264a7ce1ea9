//! In-memory clip decoding using symphonia
//!
//! Decodes a complete clip from fetched bytes into interleaved stereo f32.
//!
//! # Supported Formats
//!
//! Per Cargo.toml symphonia features (plus symphonia defaults):
//! - WAV / PCM
//! - MP3, FLAC, AAC, MP4/M4A, Vorbis
//!
//! # Channel handling
//!
//! - Mono: duplicated to stereo
//! - Stereo: copied
//! - Multi-channel: even channels averaged into left, odd into right

use crate::audio::types::DecodedClip;
use crate::error::{Error, Result};
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// File extension of an identifier, ignoring any query string or fragment.
///
/// `"https://host/clips/seven.mp3?v=2"` → `Some("mp3")`
pub fn extension_hint(id: &str) -> Option<&str> {
    let without_query = id.split(['?', '#']).next().unwrap_or(id);
    let last_segment = without_query
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(without_query);
    let (stem, ext) = last_segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext)
}

/// Decode a complete clip from bytes.
///
/// # Errors
/// - Unknown or unsupported container/codec
/// - Fatal decode error
/// - Stream containing no audio frames
pub fn decode_clip(bytes: Vec<u8>, extension: Option<&str>) -> Result<DecodedClip> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| Error::Decode(format!("Failed to probe format: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

    let mut sample_rate = codec_params.sample_rate;
    let mut stereo: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(Error::Decode(format!("Format error: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate.get_or_insert(spec.rate);
                let channels = spec.channels.count();

                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                append_as_stereo(buffer.samples(), channels, &mut stereo);
            }
            Err(SymphoniaError::DecodeError(e)) => {
                // Corrupt packet: skip it and keep the rest of the clip
                warn!("Skipping undecodable packet: {}", e);
            }
            Err(e) => return Err(Error::Decode(format!("Failed to decode packet: {}", e))),
        }
    }

    let sample_rate = sample_rate
        .ok_or_else(|| Error::Decode("Stream did not report a sample rate".to_string()))?;

    let clip = DecodedClip::new(stereo, sample_rate);
    if clip.frames == 0 {
        return Err(Error::Decode("Stream contains no audio frames".to_string()));
    }

    debug!(
        "Decoded {} frames at {} Hz ({:.3}s)",
        clip.frames,
        clip.sample_rate,
        clip.duration().as_secs_f64()
    );
    Ok(clip)
}

/// Append interleaved samples with `channels` channels as interleaved stereo
fn append_as_stereo(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    match channels {
        0 => {}
        1 => {
            out.reserve(interleaved.len() * 2);
            for &sample in interleaved {
                out.push(sample);
                out.push(sample);
            }
        }
        2 => out.extend_from_slice(interleaved),
        _ => {
            let left_count = channels.div_ceil(2) as f32;
            let right_count = (channels / 2) as f32;
            for frame in interleaved.chunks_exact(channels) {
                let mut left_sum = 0.0f32;
                let mut right_sum = 0.0f32;
                for (ch_idx, &sample) in frame.iter().enumerate() {
                    if ch_idx % 2 == 0 {
                        left_sum += sample;
                    } else {
                        right_sum += sample;
                    }
                }
                out.push(left_sum / left_count);
                out.push(right_sum / right_count);
            }
        }
    }
}
