//! Self-describing compression codec for session payloads.
//!
//! Encoded payloads carry a four-byte tag identifying the compressor used:
//! `:sn:` snappy, `:lz:` lzf, `:l4:` lz4, `:gz:` gzip. Untagged payloads are
//! passed through unchanged. The format is transparent: switching
//! `compressionLibrary` at runtime never breaks reads of records written
//! under a previous library, because `decode` dispatches on the tag it
//! finds, not on the caller's current configuration.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tracing::warn;

use crate::config::CompressionLibrary;
use crate::error::SessionError;

const TAG_SNAPPY: &[u8; 4] = b":sn:";
const TAG_LZF: &[u8; 4] = b":lz:";
const TAG_LZ4: &[u8; 4] = b":l4:";
const TAG_GZIP: &[u8; 4] = b":gz:";

/// Compress `input` per `library`, prefixing the result with its tag, if
/// `threshold > 0`, `library` isn't `None`, and `input` is at least
/// `threshold` bytes. Otherwise, or if the compressor fails, return `input`
/// unchanged (compression is best-effort).
#[must_use]
pub fn encode(input: &[u8], threshold: usize, library: CompressionLibrary) -> Vec<u8> {
    if threshold == 0 || library == CompressionLibrary::None || input.len() < threshold {
        return input.to_vec();
    }

    let compressed = match library {
        CompressionLibrary::Snappy => compress_snappy(input),
        CompressionLibrary::Lzf => compress_lzf(input),
        CompressionLibrary::Lz4 => compress_lz4(input),
        CompressionLibrary::Gzip => compress_gzip(input),
        CompressionLibrary::None => None,
    };

    match compressed {
        Some(mut body) if !body.is_empty() => {
            let mut tagged = Vec::with_capacity(body.len() + 4);
            tagged.extend_from_slice(tag_for(library));
            tagged.append(&mut body);
            tagged
        }
        _ => {
            warn!(?library, "compressor produced no output, storing uncompressed");
            input.to_vec()
        }
    }
}

/// Inspect the first four bytes of `input` and dispatch to the matching
/// decompressor. Untagged input (or input shorter than four bytes) is
/// returned unchanged.
pub fn decode(input: &[u8]) -> Result<Vec<u8>, SessionError> {
    if input.len() < 4 {
        return Ok(input.to_vec());
    }

    let (tag, body) = input.split_at(4);
    match tag {
        t if t == TAG_SNAPPY => decompress_snappy(body),
        t if t == TAG_LZF => decompress_lzf(body),
        t if t == TAG_LZ4 => decompress_lz4(body),
        t if t == TAG_GZIP => decompress_gzip(body),
        _ => Ok(input.to_vec()),
    }
}

fn tag_for(library: CompressionLibrary) -> &'static [u8; 4] {
    match library {
        CompressionLibrary::Snappy => TAG_SNAPPY,
        CompressionLibrary::Lzf => TAG_LZF,
        CompressionLibrary::Lz4 => TAG_LZ4,
        CompressionLibrary::Gzip => TAG_GZIP,
        CompressionLibrary::None => unreachable!("None is filtered out before tagging"),
    }
}

fn compress_snappy(input: &[u8]) -> Option<Vec<u8>> {
    Some(snap::raw::Encoder::new().compress_vec(input).ok()?)
}

fn decompress_snappy(body: &[u8]) -> Result<Vec<u8>, SessionError> {
    snap::raw::Decoder::new()
        .decompress_vec(body)
        .map_err(|e| SessionError::DecodeError(format!("snappy: {e}")))
}

fn compress_lzf(input: &[u8]) -> Option<Vec<u8>> {
    lzf::compress(input).ok()
}

fn decompress_lzf(body: &[u8]) -> Result<Vec<u8>, SessionError> {
    // LZF carries no length header of its own; retry with a larger output
    // buffer until one is big enough, since sessions are small.
    let mut cap = body.len().saturating_mul(8).max(4096);
    let mut last_err = None;
    while cap <= 1 << 24 {
        match lzf::decompress(body, cap) {
            Ok(out) => return Ok(out),
            Err(e) => {
                last_err = Some(e);
                cap *= 2;
            }
        }
    }
    Err(SessionError::DecodeError(format!(
        "lzf: {:?}",
        last_err.expect("loop ran at least once")
    )))
}

fn compress_lz4(input: &[u8]) -> Option<Vec<u8>> {
    Some(lz4_flex::compress_prepend_size(input))
}

fn decompress_lz4(body: &[u8]) -> Result<Vec<u8>, SessionError> {
    lz4_flex::decompress_size_prepended(body)
        .map_err(|e| SessionError::DecodeError(format!("lz4: {e}")))
}

fn compress_gzip(input: &[u8]) -> Option<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(input).ok()?;
    encoder.finish().ok()
}

fn decompress_gzip(body: &[u8]) -> Result<Vec<u8>, SessionError> {
    let mut decoder = GzDecoder::new(body);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| SessionError::DecodeError(format!("gzip: {e}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_threshold_is_passed_through_untagged() {
        let input = b"short";
        let out = encode(input, 100, CompressionLibrary::Gzip);
        assert_eq!(out, input);
    }

    #[test]
    fn threshold_zero_disables_compression() {
        let input = vec![b'x'; 1000];
        let out = encode(&input, 0, CompressionLibrary::Gzip);
        assert_eq!(out, input);
    }

    #[test]
    fn roundtrip_gzip() {
        let input = vec![b'a'; 500];
        let encoded = encode(&input, 10, CompressionLibrary::Gzip);
        assert!(encoded.starts_with(TAG_GZIP));
        assert_eq!(decode(&encoded).unwrap(), input);
    }

    #[test]
    fn roundtrip_snappy() {
        let input = vec![b'b'; 500];
        let encoded = encode(&input, 10, CompressionLibrary::Snappy);
        assert!(encoded.starts_with(TAG_SNAPPY));
        assert_eq!(decode(&encoded).unwrap(), input);
    }

    #[test]
    fn roundtrip_lz4() {
        let input = vec![b'c'; 500];
        let encoded = encode(&input, 10, CompressionLibrary::Lz4);
        assert!(encoded.starts_with(TAG_LZ4));
        assert_eq!(decode(&encoded).unwrap(), input);
    }

    #[test]
    fn roundtrip_lzf() {
        let input = vec![b'd'; 500];
        let encoded = encode(&input, 10, CompressionLibrary::Lzf);
        assert!(encoded.starts_with(TAG_LZF));
        assert_eq!(decode(&encoded).unwrap(), input);
    }

    #[test]
    fn untagged_input_decodes_unchanged() {
        let input = b"plain data, no tag here";
        assert_eq!(decode(input).unwrap(), input);
    }

    #[test]
    fn short_input_decodes_unchanged() {
        assert_eq!(decode(b"ab").unwrap(), b"ab");
    }

    #[test]
    fn switching_library_does_not_break_old_reads() {
        let written_under_gzip = encode(&vec![b'e'; 500], 10, CompressionLibrary::Gzip);
        // Handler is now configured for lz4, but decode dispatches on the tag.
        assert_eq!(decode(&written_under_gzip).unwrap(), vec![b'e'; 500]);
    }
}
