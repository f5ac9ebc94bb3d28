//! JPEG-compressed strips and tiles.
//!
//! Each strip is a JPEG stream that may omit the tables carried once in the
//! `JPEGTables` tag; the two are spliced before decoding.

use crate::error::{CodecErrorKind, IoError, IoResult};

/// Decoded JPEG samples, 8-bit interleaved.
#[derive(Debug, Clone)]
pub struct Decoded {
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
    /// Samples per pixel: 1, 3 or 4.
    pub components: usize,
    /// `width * height * components` bytes.
    pub data: Vec<u8>,
}

/// Joins a `JPEGTables` stream and an abbreviated strip stream.
pub fn splice_tables(tables: Option<&[u8]>, strip: &[u8]) -> Vec<u8> {
    const SOI: [u8; 2] = [0xFF, 0xD8];
    const EOI: [u8; 2] = [0xFF, 0xD9];
    match tables {
        Some(tables) if tables.len() > 4 && tables.starts_with(&SOI) => {
            let head = if tables.ends_with(&EOI) {
                &tables[..tables.len() - 2]
            } else {
                tables
            };
            let body = strip.strip_prefix(&SOI[..]).unwrap_or(strip);
            let mut stream = Vec::with_capacity(head.len() + body.len());
            stream.extend_from_slice(head);
            stream.extend_from_slice(body);
            stream
        }
        _ => strip.to_vec(),
    }
}

#[cfg(feature = "jpeg")]
fn corrupt(detail: impl std::fmt::Display) -> IoError {
    IoError::codec(CodecErrorKind::CorruptImage, format!("jpeg: {detail}"))
}

fn unsupported(detail: &str) -> IoError {
    IoError::codec(CodecErrorKind::CompressionNotSupported, format!("jpeg: {detail}"))
}

/// Decodes one strip or tile.
#[cfg(feature = "jpeg")]
pub fn decode(strip: &[u8], tables: Option<&[u8]>) -> IoResult<Decoded> {
    use jpeg_decoder::{Decoder, PixelFormat};

    let stream = splice_tables(tables, strip);
    let mut decoder = Decoder::new(stream.as_slice());
    let data = decoder.decode().map_err(corrupt)?;
    let info = decoder.info().ok_or_else(|| corrupt("missing frame header"))?;
    let components = match info.pixel_format {
        PixelFormat::L8 => 1,
        PixelFormat::RGB24 => 3,
        PixelFormat::CMYK32 => 4,
        #[allow(unreachable_patterns)]
        _ => return Err(unsupported("12/16-bit precision")),
    };
    Ok(Decoded {
        width: info.width as usize,
        height: info.height as usize,
        components,
        data,
    })
}

/// Decodes one strip or tile.
#[cfg(not(feature = "jpeg"))]
pub fn decode(_strip: &[u8], _tables: Option<&[u8]>) -> IoResult<Decoded> {
    Err(unsupported("built without the jpeg feature"))
}

/// Encodes 8-bit interleaved samples. `sampling` is the chroma factor
/// `(horizontal, vertical)` for three-component data.
#[cfg(feature = "jpeg")]
pub fn encode(
    data: &[u8],
    width: usize,
    height: usize,
    components: usize,
    quality: u8,
    sampling: Option<(u8, u8)>,
) -> IoResult<Vec<u8>> {
    use jpeg_encoder::{ColorType, Encoder, SamplingFactor};

    let (Ok(w), Ok(h)) = (u16::try_from(width), u16::try_from(height)) else {
        return Err(unsupported("dimensions exceed 65535"));
    };
    let color = match components {
        1 => ColorType::Luma,
        3 => ColorType::Rgb,
        4 => ColorType::Cmyk,
        _ => return Err(unsupported("component count")),
    };
    let mut out = Vec::new();
    let mut encoder = Encoder::new(&mut out, quality.clamp(1, 100));
    if components == 3 {
        let factor = match sampling.unwrap_or((2, 2)) {
            (1, 1) => SamplingFactor::F_1_1,
            (2, 1) => SamplingFactor::F_2_1,
            (1, 2) => SamplingFactor::F_1_2,
            (4, 1) => SamplingFactor::F_4_1,
            (4, 2) => SamplingFactor::F_4_2,
            _ => SamplingFactor::F_2_2,
        };
        encoder.set_sampling_factor(factor);
    }
    encoder.encode(data, w, h, color).map_err(corrupt)?;
    Ok(out)
}

/// Encodes 8-bit interleaved samples.
#[cfg(not(feature = "jpeg"))]
pub fn encode(
    _data: &[u8],
    _width: usize,
    _height: usize,
    _components: usize,
    _quality: u8,
    _sampling: Option<(u8, u8)>,
) -> IoResult<Vec<u8>> {
    Err(unsupported("built without the jpeg feature"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splice_tables() {
        let tables = [0xFF, 0xD8, 0xFF, 0xDB, 0x01, 0xFF, 0xD9];
        let strip = [0xFF, 0xD8, 0xFF, 0xDA, 0x02, 0xFF, 0xD9];
        assert_eq!(
            splice_tables(Some(&tables), &strip),
            vec![0xFF, 0xD8, 0xFF, 0xDB, 0x01, 0xFF, 0xDA, 0x02, 0xFF, 0xD9]
        );
        assert_eq!(splice_tables(None, &strip), strip.to_vec());
    }

    #[cfg(feature = "jpeg")]
    #[test]
    fn test_gray_round_trip() {
        let data: Vec<u8> = (0..16 * 16).map(|i| (i % 16 * 16) as u8).collect();
        let stream = encode(&data, 16, 16, 1, 95, None).unwrap();
        let decoded = decode(&stream, None).unwrap();
        assert_eq!((decoded.width, decoded.height, decoded.components), (16, 16, 1));
        for (a, b) in decoded.data.iter().zip(&data) {
            assert!((*a as i32 - *b as i32).abs() <= 8);
        }
    }
}
