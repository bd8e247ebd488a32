//! Canonical RIFF/WAVE packaging of 16-bit PCM samples.

use bytes::{BufMut, Bytes, BytesMut};

use crate::decoder::AudioChunk;

/// Size of the canonical 44-byte PCM header.
pub const WAV_HEADER_LEN: usize = 44;

const BITS_PER_SAMPLE: u16 = 16;
const FORMAT_PCM: u16 = 1;

/// Concatenate `chunks` and wrap them in a single WAV header.
///
/// Returns an empty buffer when there are no samples, so callers can skip
/// publishing an audio file for containers without audio.
pub fn encode_wav(chunks: &[AudioChunk], channels: u16, sample_rate_hz: u32) -> Bytes {
    let sample_count: usize = chunks.iter().map(|chunk| chunk.samples.len()).sum();
    if sample_count == 0 {
        return Bytes::new();
    }

    let data_len = (sample_count * 2) as u32;
    let block_align = channels * (BITS_PER_SAMPLE / 8);
    let byte_rate = sample_rate_hz * block_align as u32;

    let mut buf = BytesMut::with_capacity(WAV_HEADER_LEN + data_len as usize);
    buf.put_slice(b"RIFF");
    buf.put_u32_le(36 + data_len);
    buf.put_slice(b"WAVE");

    buf.put_slice(b"fmt ");
    buf.put_u32_le(16);
    buf.put_u16_le(FORMAT_PCM);
    buf.put_u16_le(channels);
    buf.put_u32_le(sample_rate_hz);
    buf.put_u32_le(byte_rate);
    buf.put_u16_le(block_align);
    buf.put_u16_le(BITS_PER_SAMPLE);

    buf.put_slice(b"data");
    buf.put_u32_le(data_len);
    for sample in chunks.iter().flat_map(|chunk| chunk.samples.iter()) {
        buf.put_i16_le(*sample);
    }

    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u32_at(buf: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
    }

    fn u16_at(buf: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes(buf[offset..offset + 2].try_into().unwrap())
    }

    #[test]
    fn test_header_fields() {
        let chunks = vec![
            AudioChunk::new(0, vec![1, -1, 2, -2]),
            AudioChunk::new(10, vec![3, -3]),
        ];
        let wav = encode_wav(&chunks, 2, 48_000);

        assert_eq!(wav.len(), WAV_HEADER_LEN + 12);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(u32_at(&wav, 4), 36 + 12);
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(u16_at(&wav, 20), 1);
        assert_eq!(u16_at(&wav, 22), 2);
        assert_eq!(u32_at(&wav, 24), 48_000);
        assert_eq!(u32_at(&wav, 28), 48_000 * 4);
        assert_eq!(u16_at(&wav, 32), 4);
        assert_eq!(u16_at(&wav, 34), 16);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32_at(&wav, 40), 12);
    }

    #[test]
    fn test_samples_are_concatenated_in_order() {
        let chunks = vec![AudioChunk::new(0, vec![1, -1]), AudioChunk::new(1, vec![256])];
        let wav = encode_wav(&chunks, 1, 8_000);

        let data = &wav[WAV_HEADER_LEN..];
        assert_eq!(data, &[1, 0, 0xff, 0xff, 0, 1]);
    }

    #[test]
    fn test_no_samples_gives_empty_buffer() {
        assert!(encode_wav(&[], 2, 48_000).is_empty());
        assert!(encode_wav(&[AudioChunk::new(0, Vec::new())], 2, 48_000).is_empty());
    }
}
