//! PCM helpers and the canonical WAV container used for engine handoff

use std::io::Cursor;

use crate::{Error, Result};

/// Sample rate of client microphone audio (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16_000;

/// Channel count of client microphone audio
pub const CHANNELS: u16 = 1;

/// Bits per sample of client microphone audio
pub const BITS_PER_SAMPLE: u16 = 16;

/// Size of the canonical RIFF/WAVE header
pub const WAV_HEADER_LEN: usize = 44;

/// Build the canonical 44-byte header for `data_len` bytes of 16kHz mono 16-bit PCM
///
/// # Errors
///
/// Returns error if the payload does not fit in a RIFF container
pub fn wav_header(data_len: usize) -> Result<[u8; WAV_HEADER_LEN]> {
    let data_len = u32::try_from(data_len)
        .ok()
        .filter(|len| len.checked_add(36).is_some())
        .ok_or_else(|| Error::Audio(format!("{data_len} bytes is too large for a WAV file")))?;

    let block_align = CHANNELS * (BITS_PER_SAMPLE / 8);
    let byte_rate = SAMPLE_RATE * u32::from(block_align);

    let mut header = [0u8; WAV_HEADER_LEN];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(36 + data_len).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    // PCM format tag
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&CHANNELS.to_le_bytes());
    header[24..28].copy_from_slice(&SAMPLE_RATE.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_len.to_le_bytes());

    Ok(header)
}

/// Prefix raw PCM bytes with the canonical WAV header
///
/// # Errors
///
/// Returns error if the payload does not fit in a RIFF container
pub fn pcm_to_wav(pcm: &[u8]) -> Result<Vec<u8>> {
    let header = wav_header(pcm.len())?;
    let mut wav = Vec::with_capacity(WAV_HEADER_LEN + pcm.len());
    wav.extend_from_slice(&header);
    wav.extend_from_slice(pcm);
    Ok(wav)
}

/// Whether the payload starts with a RIFF/WAVE signature
#[must_use]
pub fn is_wav(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

/// Decode little-endian 16-bit PCM bytes into samples
///
/// A trailing odd byte is ignored.
#[must_use]
pub fn pcm_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Decode a WAV file into mono 16-bit samples
///
/// Multi-channel audio is mixed down by averaging each frame.
///
/// # Errors
///
/// Returns error if the file is not a readable 16-bit integer or 32-bit float WAV
pub fn decode_wav(bytes: &[u8]) -> Result<Vec<i16>> {
    let mut reader =
        hound::WavReader::new(Cursor::new(bytes)).map_err(|e| Error::Audio(e.to_string()))?;
    let spec = reader.spec();

    let interleaved: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Audio(e.to_string()))?,
        (hound::SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .map(|s| s.map(float_to_i16))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Audio(e.to_string()))?,
        (format, bits) => {
            return Err(Error::Audio(format!(
                "unsupported WAV encoding: {format:?} {bits}-bit"
            )));
        }
    };

    let channels = usize::from(spec.channels.max(1));
    if channels == 1 {
        return Ok(interleaved);
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let mono = interleaved
        .chunks(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
            (sum / frame.len() as i32) as i16
        })
        .collect();

    Ok(mono)
}

#[allow(clippy::cast_possible_truncation)]
fn float_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}
