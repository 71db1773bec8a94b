//! Byte compression for stored rule buffers: gzip, rendered as hex so the
//! result can sit inside a JSON string.

use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

pub fn compress(bytes: &[u8]) -> Result<String> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(bytes)?;
    Ok(hex::encode(encoder.finish()?))
}

pub fn decompress(text: &str) -> Result<Vec<u8>> {
    let compressed = hex::decode(text.trim()).map_err(|e| Error::Decompression(e.to_string()))?;
    let mut decoder = GzDecoder::new(compressed.as_slice());
    let mut bytes = Vec::new();
    decoder
        .read_to_end(&mut bytes)
        .map_err(|e| Error::Decompression(e.to_string()))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let bytes: Vec<u8> = (0..2000u32).map(|i| (i % 7) as u8).collect();
        let text = compress(&bytes).unwrap();
        assert!(text.len() < bytes.len());
        assert_eq!(decompress(&text).unwrap(), bytes);
        assert_eq!(decompress(&compress(&[]).unwrap()).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(decompress("not hex"), Err(Error::Decompression(_))));
        assert!(matches!(decompress("deadbeef"), Err(Error::Decompression(_))));
    }
}
