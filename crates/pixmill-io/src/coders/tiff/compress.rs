//! Byte-oriented strip codecs: PackBits, LZW and Deflate, plus the
//! horizontal predictor and fill-order reversal shared by every scheme.

use pixmill_core::Endian;

use super::ifd::{get_uint, put_uint};
use super::tags::Scheme;
use crate::error::{CodecErrorKind, IoError, IoResult};

/// Returns `true` when `scheme` can be decoded by this build.
pub fn is_supported(scheme: Scheme) -> bool {
    match scheme {
        Scheme::None | Scheme::PackBits | Scheme::CcittRle | Scheme::Fax3 | Scheme::Fax4 => true,
        Scheme::Lzw => cfg!(feature = "lzw"),
        Scheme::AdobeDeflate | Scheme::Deflate => cfg!(feature = "deflate"),
        Scheme::Jpeg | Scheme::OldJpeg => cfg!(feature = "jpeg"),
        Scheme::Other(_) => false,
    }
}

fn unsupported(scheme: Scheme) -> IoError {
    IoError::codec(
        CodecErrorKind::CompressionNotSupported,
        format!("compression {}", scheme.code()),
    )
}

fn corrupt(scheme: Scheme, detail: impl std::fmt::Display) -> IoError {
    IoError::codec(
        CodecErrorKind::CorruptImage,
        format!("compression {}: {detail}", scheme.code()),
    )
}

// === Decoding ===

/// Expands one strip or tile. `expected` is the decoded size; output may be
/// shorter when the payload is truncated.
pub fn decode(scheme: Scheme, raw: &[u8], expected: usize) -> IoResult<Vec<u8>> {
    match scheme {
        Scheme::None => Ok(raw.to_vec()),
        Scheme::PackBits => Ok(unpack_bits(raw, expected)),
        Scheme::Lzw => decode_lzw(raw, expected),
        Scheme::AdobeDeflate | Scheme::Deflate => decode_deflate(raw, expected),
        other => Err(unsupported(other)),
    }
}

/// Expands PackBits runs until `expected` bytes are produced or input ends.
pub fn unpack_bits(raw: &[u8], expected: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(expected);
    let mut i = 0;
    while i < raw.len() && out.len() < expected {
        let n = raw[i] as i8;
        i += 1;
        match n {
            0..=127 => {
                let count = n as usize + 1;
                let end = (i + count).min(raw.len());
                out.extend_from_slice(&raw[i..end]);
                i = end;
            }
            -127..=-1 => {
                if let Some(&byte) = raw.get(i) {
                    out.extend(std::iter::repeat_n(byte, (1 - n as isize) as usize));
                    i += 1;
                }
            }
            // -128 is a no-op.
            _ => {}
        }
    }
    out.truncate(expected);
    out
}

/// Decodes into a buffer of exactly `expected` bytes, stopping once it is
/// full.
#[cfg(feature = "lzw")]
fn decode_lzw(raw: &[u8], expected: usize) -> IoResult<Vec<u8>> {
    use weezl::{decode::Decoder, BitOrder, LzwStatus};

    let mut out = crate::resource::acquire_buffer::<u8>(expected)?;
    let mut decoder = Decoder::with_tiff_size_switch(BitOrder::Msb, 8);
    let (mut read, mut written) = (0, 0);
    while written < expected {
        let result = decoder.decode_bytes(&raw[read..], &mut out[written..]);
        read += result.consumed_in;
        written += result.consumed_out;
        if result.consumed_in == 0 && result.consumed_out == 0 {
            break;
        }
        match result.status {
            Ok(LzwStatus::Ok) => {}
            Ok(LzwStatus::Done | LzwStatus::NoProgress) => break,
            Err(err) => return Err(corrupt(Scheme::Lzw, err)),
        }
    }
    out.truncate(written);
    Ok(out)
}

#[cfg(not(feature = "lzw"))]
fn decode_lzw(_raw: &[u8], _expected: usize) -> IoResult<Vec<u8>> {
    Err(unsupported(Scheme::Lzw))
}

#[cfg(feature = "deflate")]
fn decode_deflate(raw: &[u8], expected: usize) -> IoResult<Vec<u8>> {
    use std::io::Read;

    let mut out = Vec::new();
    out.try_reserve_exact(expected).map_err(|e| {
        IoError::resource(
            crate::error::ResourceErrorKind::AllocationFailed,
            format!("{expected} bytes: {e}"),
        )
    })?;
    let mut decoder = flate2::read::ZlibDecoder::new(raw).take(expected as u64);
    if let Err(err) = decoder.read_to_end(&mut out) {
        if out.len() < expected {
            return Err(corrupt(Scheme::AdobeDeflate, err));
        }
    }
    Ok(out)
}

#[cfg(not(feature = "deflate"))]
fn decode_deflate(_raw: &[u8], _expected: usize) -> IoResult<Vec<u8>> {
    Err(unsupported(Scheme::AdobeDeflate))
}

// === Encoding ===

/// Compresses one strip or tile. `level` is the Deflate level `1..=9`.
pub fn encode(scheme: Scheme, data: &[u8], level: u32) -> IoResult<Vec<u8>> {
    match scheme {
        Scheme::None => Ok(data.to_vec()),
        Scheme::PackBits => Ok(pack_bits(data)),
        Scheme::Lzw => encode_lzw(data),
        Scheme::AdobeDeflate | Scheme::Deflate => encode_deflate(data, level),
        other => Err(unsupported(other)),
    }
}

/// PackBits: literal runs of up to 128 bytes, repeats of 2 to 128.
pub fn pack_bits(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 128 + 1);
    let mut i = 0;
    while i < data.len() {
        let mut run = 1;
        while i + run < data.len() && run < 128 && data[i + run] == data[i] {
            run += 1;
        }
        if run >= 2 {
            out.push((1i16 - run as i16) as i8 as u8);
            out.push(data[i]);
            i += run;
            continue;
        }
        let start = i;
        while i < data.len() && i - start < 128 {
            if i + 1 < data.len() && data[i] == data[i + 1] {
                break;
            }
            i += 1;
        }
        if i == start {
            i += 1;
        }
        out.push((i - start - 1) as u8);
        out.extend_from_slice(&data[start..i]);
    }
    out
}

#[cfg(feature = "lzw")]
fn encode_lzw(data: &[u8]) -> IoResult<Vec<u8>> {
    use weezl::{encode::Encoder, BitOrder};

    Encoder::with_tiff_size_switch(BitOrder::Msb, 8)
        .encode(data)
        .map_err(|err| corrupt(Scheme::Lzw, err))
}

#[cfg(not(feature = "lzw"))]
fn encode_lzw(_data: &[u8]) -> IoResult<Vec<u8>> {
    Err(unsupported(Scheme::Lzw))
}

#[cfg(feature = "deflate")]
fn encode_deflate(data: &[u8], level: u32) -> IoResult<Vec<u8>> {
    use std::io::Write;

    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::new(level.clamp(1, 9)));
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|err| IoError::io_source(crate::error::IoErrorKind::Write, "deflate", err))
}

#[cfg(not(feature = "deflate"))]
fn encode_deflate(_data: &[u8], _level: u32) -> IoResult<Vec<u8>> {
    Err(unsupported(Scheme::AdobeDeflate))
}

// === Predictor and bit order ===

/// Undoes horizontal differencing in place. `row_bytes` is the decoded row
/// size, `samples` the interleaved samples per pixel.
pub fn undo_predictor(data: &mut [u8], row_bytes: usize, samples: usize, bits: u32, endian: Endian) -> IoResult<()> {
    if row_bytes == 0 {
        return Ok(());
    }
    match bits {
        8 => {
            for row in data.chunks_mut(row_bytes) {
                for i in samples..row.len() {
                    row[i] = row[i].wrapping_add(row[i - samples]);
                }
            }
        }
        16 | 32 | 64 => {
            let size = bits as usize / 8;
            for row in data.chunks_mut(row_bytes) {
                let mut values: Vec<u64> = row.chunks_exact(size).map(|c| get_uint(c, endian)).collect();
                for i in samples..values.len() {
                    values[i] = values[i].wrapping_add(values[i - samples]);
                }
                write_words(row, &values, size, endian);
            }
        }
        _ => {
            return Err(IoError::codec(
                CodecErrorKind::ImageTypeNotSupported,
                format!("horizontal predictor with {bits}-bit samples"),
            ));
        }
    }
    Ok(())
}

/// Applies horizontal differencing in place.
pub fn apply_predictor(data: &mut [u8], row_bytes: usize, samples: usize, bits: u32, endian: Endian) -> IoResult<()> {
    if row_bytes == 0 {
        return Ok(());
    }
    match bits {
        8 => {
            for row in data.chunks_mut(row_bytes) {
                for i in (samples..row.len()).rev() {
                    row[i] = row[i].wrapping_sub(row[i - samples]);
                }
            }
        }
        16 | 32 | 64 => {
            let size = bits as usize / 8;
            for row in data.chunks_mut(row_bytes) {
                let mut values: Vec<u64> = row.chunks_exact(size).map(|c| get_uint(c, endian)).collect();
                for i in (samples..values.len()).rev() {
                    values[i] = values[i].wrapping_sub(values[i - samples]);
                }
                write_words(row, &values, size, endian);
            }
        }
        _ => {
            return Err(IoError::codec(
                CodecErrorKind::ImageTypeNotSupported,
                format!("horizontal predictor with {bits}-bit samples"),
            ));
        }
    }
    Ok(())
}

fn write_words(row: &mut [u8], values: &[u64], size: usize, endian: Endian) {
    let mask = if size == 8 { u64::MAX } else { (1u64 << (size * 8)) - 1 };
    let mut bytes = Vec::with_capacity(size);
    for (chunk, &value) in row.chunks_exact_mut(size).zip(values) {
        bytes.clear();
        put_uint(&mut bytes, endian, value & mask, size);
        chunk.copy_from_slice(&bytes);
    }
}

/// Reverses the bit order of every byte (`FillOrder` 2).
pub fn reverse_bits(data: &mut [u8]) {
    for byte in data {
        *byte = byte.reverse_bits();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packbits_known_stream() {
        // Apple's reference example.
        let packed = [
            0xFE, 0xAA, 0x02, 0x80, 0x00, 0x2A, 0xFD, 0xAA, 0x03, 0x80, 0x00, 0x2A, 0x22, 0xF7, 0xAA,
        ];
        let expected = [
            0xAA, 0xAA, 0xAA, 0x80, 0x00, 0x2A, 0xAA, 0xAA, 0xAA, 0xAA, 0x80, 0x00, 0x2A, 0x22, 0xAA, 0xAA,
            0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA,
        ];
        assert_eq!(unpack_bits(&packed, expected.len()), expected);
    }

    #[test]
    fn test_packbits_long_runs() {
        let mut data = vec![7u8; 300];
        data.extend((0..200).map(|i| i as u8));
        let packed = pack_bits(&data);
        assert!(packed.len() < data.len());
        assert_eq!(unpack_bits(&packed, data.len()), data);
    }

    #[test]
    fn test_packbits_truncated() {
        assert_eq!(unpack_bits(&[0x05, 1, 2], 6), vec![1, 2]);
    }

    #[cfg(feature = "lzw")]
    #[test]
    fn test_lzw_round_trip() {
        let data: Vec<u8> = (0..4096).map(|i| (i % 17) as u8).collect();
        let packed = encode(Scheme::Lzw, &data, 0).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(decode(Scheme::Lzw, &packed, data.len()).unwrap(), data);
    }

    #[cfg(feature = "deflate")]
    #[test]
    fn test_deflate_round_trip() {
        let data = vec![42u8; 1000];
        let packed = encode(Scheme::AdobeDeflate, &data, 6).unwrap();
        assert_eq!(decode(Scheme::Deflate, &packed, 1000).unwrap(), data);
    }

    #[cfg(feature = "lzw")]
    #[test]
    fn test_lzw_stops_at_expected_size() {
        let data = vec![0u8; 1 << 20];
        let packed = encode(Scheme::Lzw, &data, 0).unwrap();
        let out = decode(Scheme::Lzw, &packed, 64).unwrap();
        assert_eq!(out, vec![0u8; 64]);
        assert_eq!(out.capacity(), 64);
    }

    #[cfg(feature = "deflate")]
    #[test]
    fn test_deflate_stops_at_expected_size() {
        let data = vec![0u8; 1 << 20];
        let packed = encode(Scheme::Deflate, &data, 9).unwrap();
        assert!(packed.len() < 4096);
        let out = decode(Scheme::Deflate, &packed, 64).unwrap();
        assert_eq!(out, vec![0u8; 64]);
        assert_eq!(out.capacity(), 64);
    }

    #[test]
    fn test_predictor_8_and_16() {
        let original = vec![10u8, 20, 30, 11, 21, 31, 12, 22, 32];
        let mut data = original.clone();
        apply_predictor(&mut data, 9, 3, 8, Endian::Lsb).unwrap();
        assert_eq!(&data[..6], &[10, 20, 30, 1, 1, 1]);
        undo_predictor(&mut data, 9, 3, 8, Endian::Lsb).unwrap();
        assert_eq!(data, original);

        let mut wide = vec![0x00, 0x01, 0xFF, 0x00, 0x00, 0x02];
        let before = wide.clone();
        apply_predictor(&mut wide, 6, 1, 16, Endian::Msb).unwrap();
        assert_eq!(&wide[2..4], &[0xFE, 0xFF]);
        undo_predictor(&mut wide, 6, 1, 16, Endian::Msb).unwrap();
        assert_eq!(wide, before);

        assert!(undo_predictor(&mut [0u8; 2], 2, 1, 4, Endian::Lsb).is_err());
    }

    #[test]
    fn test_reverse_bits() {
        let mut data = [0b1000_0001, 0b1100_0000];
        reverse_bits(&mut data);
        assert_eq!(data, [0b1000_0001, 0b0000_0011]);
    }
}
