//! Scanalytics IPLab images.
//!
//! Layout: a 4-byte endian marker (`iiii` little, `mmmm` big), 8 bytes of
//! version data, then a `data` chunk holding seven 32-bit header fields
//! (size, width, height, colors, z, time, byte type) followed by planar
//! samples. Frames are ordered `{t0 z0, t0 z1, .., t1 z0, ..}` and each
//! frame stores one plane per color. The writer closes the file with a
//! `fini` chunk of length zero.

use pixmill_core::{Colorspace, Endian, Image, ImageInfo, ImageList, OptionSource};
use tracing::debug;

use crate::blob::Blob;
use crate::coders::{allocate, next_frame, warn_eof};
use crate::context::Context;
use crate::error::{CodecErrorKind, IoError, IoResult, OptionErrorKind};
use crate::quantum::{export_pixels, import_row, QuantumFormat, QuantumInfo, QuantumType};
use crate::registry::CoderInfo;

const MODULE: &str = "ipl";

const HEADER_FIELDS: u32 = 28;

/// Returns `true` when a `data` chunk sits at offset 0 or after the marker
/// and version block.
pub fn is_ipl(header: &[u8]) -> bool {
    header.starts_with(b"data") || header.get(12..16) == Some(b"data")
}

/// Registry entry.
pub fn coder_info() -> Vec<CoderInfo> {
    vec![
        CoderInfo::new("IPL", "IPL Image Sequence")
            .with_module(MODULE)
            .with_decoder(decode)
            .with_encoder(encode)
            .with_magic(is_ipl)
            .with_adjoin(true),
    ]
}

// === Sample types ===

/// Sample encoding named by the header's byte type field.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SampleType {
    code: u32,
    depth: u32,
    format: QuantumFormat,
    range: Option<(f64, f64)>,
}

impl SampleType {
    fn from_code(code: u32) -> Self {
        let (depth, format, range) = match code {
            0 => (8, QuantumFormat::Unsigned, Some((0.0, 255.0))),
            1 => (16, QuantumFormat::Signed, Some((-32767.0, 32767.0))),
            2 => (16, QuantumFormat::Unsigned, Some((0.0, 65535.0))),
            3 => (32, QuantumFormat::Signed, Some((-2147483647.0, 2147483647.0))),
            4 => (32, QuantumFormat::FloatingPoint, Some((0.0, 1.0))),
            5 => (8, QuantumFormat::Unsigned, None),
            6 => (16, QuantumFormat::Unsigned, None),
            10 => (64, QuantumFormat::FloatingPoint, Some((0.0, 1.0))),
            _ => (16, QuantumFormat::Unsigned, Some((0.0, 65535.0))),
        };
        Self {
            code,
            depth,
            format,
            range,
        }
    }

    /// Picks the byte type for an image of `depth` whose samples are
    /// described by `format`.
    fn for_image(depth: u32, format: QuantumFormat) -> Self {
        let code = match (depth, format) {
            (8, _) => 0,
            (16, QuantumFormat::Signed) => 1,
            (32, QuantumFormat::FloatingPoint) => 4,
            (32, _) => 3,
            (64, _) => 10,
            _ => 2,
        };
        Self::from_code(code)
    }

    fn quantum_info(&self, endian: Endian) -> QuantumInfo {
        let mut qi = QuantumInfo::default()
            .with_depth(self.depth)
            .with_format(self.format)
            .with_endian(endian);
        if self.format == QuantumFormat::FloatingPoint {
            qi.set_range(0.0, 1.0);
        }
        qi
    }

    fn annotate(&self, image: &mut Image) {
        image
            .properties
            .set("quantum:format", self.format.as_str());
        if let Some((minimum, maximum)) = self.range {
            image.properties.set("quantum:minimum", minimum.to_string());
            image.properties.set("quantum:maximum", maximum.to_string());
        }
    }
}

// === Header ===

#[derive(Debug, Clone)]
struct IplHeader {
    endian: Endian,
    size: u32,
    width: u32,
    height: u32,
    colors: u32,
    z: u32,
    time: u32,
    sample: SampleType,
}

impl IplHeader {
    fn frames(&self) -> usize {
        (self.z.max(1) as usize) * (self.time.max(1) as usize)
    }

    fn planes(&self) -> &'static [QuantumType] {
        if self.colors == 3 {
            &[QuantumType::Red, QuantumType::Green, QuantumType::Blue]
        } else {
            &[QuantumType::Gray]
        }
    }
}

fn read_u32(blob: &mut Blob, endian: Endian) -> IoResult<u32> {
    match endian {
        Endian::Lsb => blob.read_u32_le(),
        _ => blob.read_u32_be(),
    }
}

fn write_u32(blob: &mut Blob, endian: Endian, value: u32) -> IoResult<()> {
    match endian {
        Endian::Lsb => blob.write_u32_le(value),
        _ => blob.write_u32_be(value),
    }
}

fn read_header(info: &ImageInfo, blob: &mut Blob) -> IoResult<IplHeader> {
    let marker = blob.read_up_to(4)?;
    let endian = match marker.as_slice() {
        b"iiii" => Endian::Lsb,
        b"mmmm" => Endian::Msb,
        _ => return Err(IoError::improper_header(info.filename.clone())),
    };
    blob.skip(8)?;
    if blob.read_up_to(4)?.as_slice() != b"data" {
        return Err(IoError::improper_header(info.filename.clone()));
    }
    let mut fields = [0u32; 7];
    for field in fields.iter_mut() {
        *field = read_u32(blob, endian)?;
    }
    let [size, width, height, colors, z, time, code] = fields;
    if width == u32::MAX || height == u32::MAX {
        return Err(IoError::improper_header(info.filename.clone()));
    }
    if width == 0 || height == 0 {
        return Err(IoError::option(
            OptionErrorKind::NegativeOrZeroImageSize,
            info.filename.clone(),
        ));
    }
    Ok(IplHeader {
        endian,
        size,
        width,
        height,
        colors,
        z,
        time,
        sample: SampleType::from_code(code),
    })
}

// === Decoding ===

/// Reads every `z * time` frame, honouring `scene` and `number_scenes`.
pub fn decode(info: &ImageInfo, blob: &mut Blob, ctx: &mut Context) -> IoResult<ImageList> {
    let header = read_header(info, blob)?;
    debug!(
        width = header.width,
        height = header.height,
        colors = header.colors,
        frames = header.frames(),
        byte_type = header.sample.code,
        chunk = header.size,
        "ipl header"
    );
    let (columns, rows) = (header.width as usize, header.height as usize);
    let qi = header.sample.quantum_info(header.endian);
    let row_bytes = qi.row_bytes(QuantumType::Gray, columns);
    let frame_bytes = (row_bytes * rows * header.planes().len()) as u64;

    let template = |image: &mut Image| {
        image.endian = header.endian;
        image.depth = header.sample.depth;
        image.x_resolution = 1.0;
        image.y_resolution = 1.0;
        image.set_colorspace(if header.colors == 3 {
            Colorspace::Rgb
        } else {
            Colorspace::Gray
        });
        header.sample.annotate(image);
        image
            .properties
            .set("number_scenes", header.frames().to_string());
    };

    let mut list = ImageList::new();
    if info.ping {
        let mut image = Image::from_info(info);
        template(&mut image);
        allocate(&mut image, info, columns, rows)?;
        list.append(image);
        return Ok(list);
    }

    let mut image = Image::from_info(info);
    for frame in 0..header.frames() {
        if frame < info.scene {
            blob.skip(frame_bytes)?;
            continue;
        }
        if let Some(previous) = list.last() {
            image = next_frame(info, previous);
        }
        image.scene = frame;
        template(&mut image);
        allocate(&mut image, info, columns, rows)?;

        let mut truncated = false;
        'planes: for &kind in header.planes() {
            for y in 0..rows {
                let row = blob.read_up_to(row_bytes)?;
                if row.len() < row_bytes {
                    truncated = true;
                    break 'planes;
                }
                import_row(&mut image, &qi, kind, y, &row)?;
            }
        }
        if truncated {
            warn_eof(ctx, &mut image, MODULE);
        }
        list.append(std::mem::take(&mut image));
        ctx.progress(MODULE, frame as u64, header.frames() as u64)?;
        if truncated || info.scene_limit_reached(frame) {
            break;
        }
    }
    Ok(list)
}

// === Encoding ===

/// Writes the list as a z-stack of planar frames.
pub fn encode(info: &ImageInfo, list: &mut ImageList, blob: &mut Blob, ctx: &mut Context) -> IoResult<()> {
    let Some(first) = list.first() else {
        return Ok(());
    };
    let frames: Vec<&Image> = if info.adjoin {
        list.iter().collect()
    } else {
        vec![first]
    };
    let (columns, rows) = (first.columns(), first.rows());
    if frames.iter().any(|f| f.columns() != columns || f.rows() != rows) {
        return Err(IoError::codec(
            CodecErrorKind::ImageTypeNotSupported,
            format!("{}: frames differ in size", info.filename),
        ));
    }

    let format = info
        .option("quantum:format")
        .or_else(|| first.properties.get("quantum:format"))
        .and_then(|v| v.parse().ok())
        .unwrap_or(QuantumFormat::Unsigned);
    let sample = SampleType::for_image(first.depth, format);
    let colors: u32 = if first.colorspace() == Colorspace::Gray { 1 } else { 3 };
    let endian = if info.endian == Endian::Lsb {
        Endian::Lsb
    } else {
        Endian::Msb
    };
    let size = HEADER_FIELDS as u64
        + (sample.depth / 8) as u64 * rows as u64 * columns as u64 * colors as u64 * frames.len() as u64;

    blob.write_bytes(if endian == Endian::Lsb { b"iiii" } else { b"mmmm" })?;
    write_u32(blob, endian, 4)?;
    blob.write_bytes(b"100f")?;
    blob.write_bytes(b"data")?;
    for field in [
        size.min(u32::MAX as u64) as u32,
        columns as u32,
        rows as u32,
        colors,
        frames.len() as u32,
        1,
        sample.code,
    ] {
        write_u32(blob, endian, field)?;
    }

    let qi = sample.quantum_info(endian);
    let planes: &[QuantumType] = if colors == 3 {
        &[QuantumType::Red, QuantumType::Green, QuantumType::Blue]
    } else {
        &[QuantumType::Gray]
    };
    let mut row = Vec::with_capacity(qi.row_bytes(QuantumType::Gray, columns));
    for (scene, image) in frames.iter().enumerate() {
        for &kind in planes {
            for y in 0..rows {
                row.clear();
                export_pixels(image, &qi, kind, 0, y, columns, 1, &mut row)?;
                blob.write_bytes(&row)?;
            }
        }
        ctx.progress(MODULE, scene as u64, frames.len() as u64)?;
    }
    blob.write_bytes(b"fini")?;
    write_u32(blob, endian, 0)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixmill_core::{PixelPacket, QUANTUM_RANGE};

    fn header(endian: &[u8; 4], fields: [u32; 7]) -> Vec<u8> {
        let mut data = endian.to_vec();
        data.extend_from_slice(&[0, 0, 0, 4, b'1', b'0', b'0', b'f']);
        data.extend_from_slice(b"data");
        for f in fields {
            if endian == b"iiii" {
                data.extend_from_slice(&f.to_le_bytes());
            } else {
                data.extend_from_slice(&f.to_be_bytes());
            }
        }
        data
    }

    #[test]
    fn test_magic() {
        assert!(is_ipl(b"data"));
        assert!(is_ipl(b"iiii\0\0\0\x04100fdata"));
        assert!(!is_ipl(b"mmmm\0\0\0\x04100f"));
    }

    #[test]
    fn test_byte_types() {
        assert_eq!(SampleType::from_code(1).format, QuantumFormat::Signed);
        assert_eq!(SampleType::from_code(4).depth, 32);
        assert_eq!(SampleType::from_code(10).depth, 64);
        assert_eq!(SampleType::for_image(16, QuantumFormat::Signed).code, 1);
        assert_eq!(SampleType::for_image(32, QuantumFormat::FloatingPoint).code, 4);
        assert_eq!(SampleType::for_image(12, QuantumFormat::Unsigned).code, 2);
    }

    #[test]
    fn test_decode_gray_u8_lsb() {
        let mut data = header(b"iiii", [32, 2, 1, 1, 1, 1, 0]);
        data.extend_from_slice(&[0, 255]);
        let list = decode(&ImageInfo::new("a.ipl"), &mut Blob::from_memory(data), &mut Context::new()).unwrap();
        assert_eq!(list.len(), 1);
        let image = &list[0];
        assert_eq!(image.colorspace(), Colorspace::Gray);
        assert_eq!(image.pixel(1, 0).unwrap().red, QUANTUM_RANGE);
        assert_eq!(image.properties.get("quantum:format"), Some("unsigned"));
        assert_eq!(image.properties.get("number_scenes"), Some("1"));
    }

    #[test]
    fn test_decode_rgb_frames() {
        // Two z-slices of 1x1 RGB u8, big-endian.
        let mut data = header(b"mmmm", [34, 1, 1, 3, 2, 1, 0]);
        data.extend_from_slice(&[255, 0, 0, 0, 0, 255]);
        let list = decode(&ImageInfo::new("b.ipl"), &mut Blob::from_memory(data), &mut Context::new()).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].pixel(0, 0).unwrap(), PixelPacket::rgb(QUANTUM_RANGE, 0.0, 0.0));
        assert_eq!(list[1].pixel(0, 0).unwrap(), PixelPacket::rgb(0.0, 0.0, QUANTUM_RANGE));
        assert_eq!(list[1].scene, 1);
    }

    #[test]
    fn test_bad_marker() {
        let data = b"xxxx\0\0\0\x04100fdata".to_vec();
        let err = decode(&ImageInfo::new("c.ipl"), &mut Blob::from_memory(data), &mut Context::new()).unwrap_err();
        assert_eq!(err.codec_kind(), Some(CodecErrorKind::ImproperImageHeader));
    }

    #[test]
    fn test_round_trip_float() {
        let mut image = Image::new(2, 1).unwrap();
        image.depth = 32;
        image.properties.set("quantum:format", "floating-point");
        image
            .set_pixel(0, 0, PixelPacket::rgb(QUANTUM_RANGE, 0.0, QUANTUM_RANGE / 2.0))
            .unwrap();
        let mut list = ImageList::new();
        list.append(image);
        let info = ImageInfo::new("d.ipl").with_endian(Endian::Lsb);
        let mut out = Blob::memory_writer();
        encode(&info, &mut list, &mut out, &mut Context::new()).unwrap();
        let data = out.into_memory().unwrap();
        assert_eq!(&data[..4], b"iiii");
        assert_eq!(&data[data.len() - 8..], b"fini\0\0\0\0");
        // 2x1 pixels, 3 planes, 4 bytes each.
        assert_eq!(data.len(), 16 + 28 + 24 + 8);

        let back = decode(&info, &mut Blob::from_memory(data), &mut Context::new()).unwrap();
        let p = back[0].pixel(0, 0).unwrap();
        approx::assert_abs_diff_eq!(p.red, QUANTUM_RANGE, epsilon = 0.5);
        approx::assert_abs_diff_eq!(p.blue, QUANTUM_RANGE / 2.0, epsilon = 0.5);
        assert_eq!(back[0].properties.get("quantum:format"), Some("floating-point"));
    }
}
