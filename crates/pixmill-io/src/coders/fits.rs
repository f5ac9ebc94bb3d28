//! Flexible Image Transport System.
//!
//! A FITS file is a header of 80-byte `KEY = value` records ending at `END`,
//! padded to a 2880-byte block, followed by big-endian samples. Each plane
//! of a three-axis file (`NAXIS3`) decodes as its own colormapped gray
//! frame. Samples are mapped through `BSCALE`/`BZERO` and normalized from
//! `[DATAMIN, DATAMAX]`; when neither bound is present the range is scanned
//! from the data. Rows are stored bottom-to-top.
//!
//! Every header keyword is also kept as a `fits:<KEY>` image property.

use pixmill_core::quantum::scale_quantum_to_any;
use pixmill_core::{Colorspace, Image, ImageInfo, ImageList, QUANTUM_RANGE};
use tracing::debug;

use crate::blob::Blob;
use crate::coders::{allocate, next_frame};
use crate::context::Context;
use crate::error::{CodecErrorKind, IoError, IoResult};
use crate::registry::CoderInfo;

const MODULE: &str = "fits";

/// Header and data block size.
pub const BLOCK_SIZE: usize = 2880;

/// Header record size.
pub const RECORD_SIZE: usize = 80;

lazy_static::lazy_static! {
    /// Powers of two indexed by biased single-precision exponent, offset so
    /// that entry 150 is 1.0.
    static ref EXPONENT_32: Vec<f64> = exponent_table(256, 150);
    /// Powers of two indexed by biased double-precision exponent, offset so
    /// that entry 1075 is 1.0.
    static ref EXPONENT_64: Vec<f64> = exponent_table(2048, 1075);
}

fn exponent_table(len: usize, unity: usize) -> Vec<f64> {
    (0..len)
        .map(|i| 2f64.powi(i as i32 - unity as i32))
        .collect()
}

/// Returns `true` for `SIMPLE` or `IT0` headers.
pub fn is_fits(header: &[u8]) -> bool {
    header.starts_with(b"SIMPLE") || header.starts_with(b"IT0")
}

/// Registry entries.
pub fn coder_info() -> Vec<CoderInfo> {
    vec![
        CoderInfo::new("FITS", "Flexible Image Transport System")
            .with_module(MODULE)
            .with_decoder(decode)
            .with_encoder(encode)
            .with_magic(is_fits)
            .with_adjoin(false),
        CoderInfo::new("FTS", "Flexible Image Transport System")
            .with_module(MODULE)
            .with_decoder(decode)
            .with_encoder(encode)
            .with_adjoin(false),
    ]
}

// === Header ===

#[derive(Debug, Clone)]
struct FitsHeader {
    simple: bool,
    bits_per_pixel: i32,
    number_axes: usize,
    columns: usize,
    rows: usize,
    number_planes: usize,
    min_data: Option<f64>,
    max_data: Option<f64>,
    zero: f64,
    scale: f64,
    records: Vec<(String, String)>,
}

impl Default for FitsHeader {
    fn default() -> Self {
        Self {
            simple: false,
            bits_per_pixel: 8,
            number_axes: 0,
            columns: 1,
            rows: 1,
            number_planes: 1,
            min_data: None,
            max_data: None,
            zero: 0.0,
            scale: 1.0,
            records: Vec::new(),
        }
    }
}

impl FitsHeader {
    fn packet_size(&self) -> usize {
        (self.bits_per_pixel.unsigned_abs() / 8) as usize
    }

    fn plane_bytes(&self) -> usize {
        self.packet_size() * self.columns * self.rows
    }

    /// Storage depth of decoded frames.
    fn depth(&self) -> u32 {
        if self.bits_per_pixel <= 8 && self.bits_per_pixel > 0 {
            8
        } else {
            16
        }
    }

    fn assign(&mut self, key: &str, value: &str) {
        let number = || value.trim().parse::<f64>().ok();
        match key {
            "SIMPLE" => self.simple = value.starts_with(['T', 't']),
            "BITPIX" => self.bits_per_pixel = number().unwrap_or(0.0) as i32,
            "NAXIS" => self.number_axes = number().unwrap_or(0.0) as usize,
            "NAXIS1" => self.columns = number().unwrap_or(0.0) as usize,
            "NAXIS2" => self.rows = number().unwrap_or(0.0) as usize,
            "NAXIS3" => self.number_planes = number().unwrap_or(1.0) as usize,
            "DATAMAX" => self.max_data = number(),
            "DATAMIN" => self.min_data = number(),
            "BZERO" => self.zero = number().unwrap_or(0.0),
            "BSCALE" => self.scale = number().unwrap_or(1.0),
            _ => {}
        }
    }
}

/// Splits one record into keyword and value. Comments after `/` and
/// quotes around strings are dropped.
fn parse_record(record: &[u8]) -> Option<(String, String)> {
    let text = String::from_utf8_lossy(record);
    let (key, rest) = text.split_once('=')?;
    let key = key.trim().to_ascii_uppercase();
    if key.is_empty() {
        return None;
    }
    let rest = rest.trim_start();
    let value = if let Some(quoted) = rest.strip_prefix('\'') {
        quoted.split('\'').next().unwrap_or_default().trim_end()
    } else {
        rest.split('/').next().unwrap_or_default().trim()
    };
    Some((key, value.to_string()))
}

fn read_header(blob: &mut Blob, info: &ImageInfo) -> IoResult<FitsHeader> {
    let mut header = FitsHeader::default();
    let mut records = 0usize;
    loop {
        let record = blob.read_up_to(RECORD_SIZE)?;
        if record.len() < RECORD_SIZE {
            return Err(IoError::improper_header(info.filename.clone()));
        }
        records += 1;
        let keyword = String::from_utf8_lossy(&record[..8]);
        if keyword.trim_end() == "END" {
            break;
        }
        if let Some((key, value)) = parse_record(&record) {
            header.assign(&key, &value);
            header.records.push((key, value));
        }
    }
    let used = records * RECORD_SIZE;
    let pad = (BLOCK_SIZE - used % BLOCK_SIZE) % BLOCK_SIZE;
    blob.skip(pad as u64)?;

    let pixels = header.columns * header.rows;
    let supported = matches!(header.bits_per_pixel, 8 | 16 | 32 | -32 | -64);
    if !header.simple || !(1..=4).contains(&header.number_axes) || pixels == 0 || !supported {
        return Err(IoError::codec(
            CodecErrorKind::ImageTypeNotSupported,
            info.filename.clone(),
        ));
    }
    if header.number_axes < 3 {
        header.number_planes = 1;
    }
    header.number_planes = header.number_planes.max(1);
    Ok(header)
}

// === Sample decoding ===

fn decode_f32(b: &[u8]) -> f64 {
    let k = b[0] as usize;
    let j = ((b[1] as usize) << 16) | ((b[2] as usize) << 8) | b[3] as usize;
    let exponent = ((k & 0x7f) << 1) | (j >> 23);
    if exponent == 0 && (j & 0x7f_ffff) == 0 {
        return 0.0;
    }
    let value = EXPONENT_32[exponent] * (j | 0x80_0000) as f64;
    if k & 0x80 != 0 { -value } else { value }
}

fn decode_f64(b: &[u8]) -> f64 {
    let k = b[0] as u64;
    let j = ((b[1] as u64) << 24) | ((b[2] as u64) << 16) | ((b[3] as u64) << 8) | b[4] as u64;
    let l = ((b[5] as u64) << 16) | ((b[6] as u64) << 8) | b[7] as u64;
    let exponent = (((k & 0x7f) << 4) | (j >> 28)) as usize;
    if exponent == 0 && (j & 0x0fff_ffff) == 0 && l == 0 {
        return 0.0;
    }
    let mantissa = 16_777_216.0 * ((j & 0x0fff_ffff) | 0x1000_0000) as f64 + l as f64;
    let value = EXPONENT_64[exponent] * mantissa;
    if k & 0x80 != 0 { -value } else { value }
}

/// Raw sample value before `BSCALE`/`BZERO`.
fn sample(bits_per_pixel: i32, b: &[u8]) -> f64 {
    match bits_per_pixel {
        8 => b[0] as f64,
        16 => i16::from_be_bytes([b[0], b[1]]) as f64,
        32 => i32::from_be_bytes([b[0], b[1], b[2], b[3]]) as f64,
        -32 => decode_f32(b),
        _ => decode_f64(b),
    }
}

/// Physical data range of a plane.
fn data_range(header: &FitsHeader, plane: &[u8]) -> (f64, f64) {
    if header.min_data.is_some() || header.max_data.is_some() {
        let min = header.min_data.unwrap_or(0.0);
        let mut max = header.max_data.unwrap_or(0.0);
        if max == 0.0 && header.bits_per_pixel > 0 {
            max = 2f64.powi(header.bits_per_pixel) - 1.0;
        }
        return (min, max);
    }
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for chunk in plane.chunks_exact(header.packet_size()) {
        let value = sample(header.bits_per_pixel, chunk) * header.scale + header.zero;
        if value.is_finite() {
            min = min.min(value);
            max = max.max(value);
        }
    }
    if !min.is_finite() {
        return (0.0, 0.0);
    }
    if header.bits_per_pixel < 0 {
        min = min.min(0.0);
        max = max.max(1.0);
    }
    (min, max)
}

// === Decoding ===

/// Reads every plane of a FITS file as a gray frame.
pub fn decode(info: &ImageInfo, blob: &mut Blob, ctx: &mut Context) -> IoResult<ImageList> {
    let header = read_header(blob, info)?;
    debug!(
        bitpix = header.bits_per_pixel,
        columns = header.columns,
        rows = header.rows,
        planes = header.number_planes,
        "fits header"
    );
    let depth = header.depth();
    let levels = (1u64 << depth) - 1;
    let plane_bytes = header.plane_bytes();

    let mut list = ImageList::new();
    let mut image = Image::from_info(info);
    image.scene = 0;
    for plane in 0..header.number_planes {
        image.scene = plane;
        image.depth = depth;
        image.set_colorspace(Colorspace::Gray);
        for (key, value) in &header.records {
            image.properties.set(format!("fits:{key}"), value.as_str());
        }
        if plane < info.scene {
            blob.skip(plane_bytes as u64)?;
            continue;
        }
        allocate(&mut image, info, header.columns, header.rows)?;
        image.allocate_colormap(1usize << depth)?;
        if info.ping {
            blob.skip(plane_bytes as u64)?;
        } else {
            let data = blob.read_up_to(plane_bytes)?;
            if data.len() < plane_bytes {
                return Err(IoError::codec(
                    CodecErrorKind::InsufficientImageDataInFile,
                    info.filename.clone(),
                ));
            }
            let (min, max) = data_range(&header, &data);
            let scale = if (header.bits_per_pixel < 0 || max - min > levels as f64) && max > min {
                levels as f64 / (max - min)
            } else {
                1.0
            };
            let colormap = image.colormap().to_vec();
            let columns = header.columns;
            let mut rows = data.chunks_exact(header.packet_size() * columns);
            for y in (0..header.rows).rev() {
                let Some(row) = rows.next() else { break };
                let start = y * columns;
                for (x, chunk) in row.chunks_exact(header.packet_size()).enumerate() {
                    let value = sample(header.bits_per_pixel, chunk) * header.scale + header.zero;
                    let scaled = scale * (value - min);
                    let index = if scaled.is_nan() || scaled < 0.0 {
                        0
                    } else {
                        ((scaled + 0.5) as u64).min(levels) as usize
                    };
                    image.indexes_mut()[start + x] = index as f32;
                    image.pixels_mut()[start + x] = colormap[index];
                }
                ctx.progress(MODULE, (header.rows - 1 - y) as u64, header.rows as u64)?;
            }
        }
        let next = next_frame(info, &image);
        list.append(image);
        if info.scene_limit_reached(plane) {
            break;
        }
        image = next;
    }
    Ok(list)
}

// === Encoding ===

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Plane {
    Intensity,
    Red,
    Green,
    Blue,
    Black,
    Alpha,
}

fn planes_for(image: &Image) -> Vec<Plane> {
    if image.is_gray() && image.colorspace() != Colorspace::Cmyk {
        return vec![Plane::Intensity];
    }
    let mut planes = vec![Plane::Red, Plane::Green, Plane::Blue];
    if image.colorspace() == Colorspace::Cmyk {
        planes.push(Plane::Black);
    }
    if image.matte {
        planes.push(Plane::Alpha);
    }
    planes
}

/// Appends one `KEY = value` record padded to 80 bytes.
fn push_record(header: &mut Vec<u8>, key: &str, value: &str) {
    let record = format!("{key:<8}= {value:>20}");
    push_raw(header, &record);
}

fn push_raw(header: &mut Vec<u8>, text: &str) {
    let mut record = text.as_bytes().to_vec();
    record.truncate(RECORD_SIZE);
    record.resize(RECORD_SIZE, b' ');
    header.extend_from_slice(&record);
}

fn exponent(value: f64) -> String {
    format!("{value:.6E}")
}

/// Writes the first image as a FITS file.
pub fn encode(_info: &ImageInfo, list: &mut ImageList, blob: &mut Blob, ctx: &mut Context) -> IoResult<()> {
    let Some(image) = list.first() else {
        return Ok(());
    };
    let depth: u32 = if image.depth <= 8 { 8 } else { 16 };
    let planes = planes_for(image);
    let (columns, rows) = (image.columns(), image.rows());
    let bzero = if depth > 8 { 2f64.powi(depth as i32 - 1) } else { 0.0 };

    let mut header = Vec::with_capacity(BLOCK_SIZE);
    push_record(&mut header, "SIMPLE", "T");
    push_record(&mut header, "BITPIX", &depth.to_string());
    let axes = if planes.len() >= 3 { 3 } else { 2 };
    push_record(&mut header, "NAXIS", &axes.to_string());
    push_record(&mut header, "NAXIS1", &columns.to_string());
    push_record(&mut header, "NAXIS2", &rows.to_string());
    if planes.len() >= 3 {
        push_record(&mut header, "NAXIS3", &planes.len().to_string());
    }
    push_record(&mut header, "BSCALE", &exponent(1.0));
    push_record(&mut header, "BZERO", &exponent(bzero));
    push_record(&mut header, "DATAMAX", &exponent(2f64.powi(depth as i32) - 1.0));
    push_record(&mut header, "DATAMIN", &exponent(0.0));
    push_raw(&mut header, &format!("HISTORY pixmill {}", env!("CARGO_PKG_VERSION")));
    push_raw(&mut header, "END");
    header.resize(header.len().div_ceil(BLOCK_SIZE) * BLOCK_SIZE, b' ');
    blob.write_bytes(&header)?;
    debug!(depth, planes = planes.len(), columns, rows, "write fits");

    let packet = (depth / 8) as usize;
    let mut row_bytes = Vec::with_capacity(columns * packet);
    let span = (planes.len() * rows) as u64;
    for (p, plane) in planes.iter().enumerate() {
        for y in (0..rows).rev() {
            row_bytes.clear();
            let pixels = image.pixel_row(y);
            let indexes = if *plane == Plane::Black { image.index_row(y) } else { &[] };
            for (x, pixel) in pixels.iter().enumerate() {
                let q = match plane {
                    Plane::Intensity => pixel.intensity(),
                    Plane::Red => pixel.red,
                    Plane::Green => pixel.green,
                    Plane::Blue => pixel.blue,
                    Plane::Black => indexes.get(x).copied().unwrap_or_default(),
                    Plane::Alpha => QUANTUM_RANGE - pixel.opacity,
                };
                let value = scale_quantum_to_any(q, depth);
                if depth > 8 {
                    let stored = (value as i64 - bzero as i64) as i16;
                    row_bytes.extend_from_slice(&stored.to_be_bytes());
                } else {
                    row_bytes.push(value as u8);
                }
            }
            blob.write_bytes(&row_bytes)?;
            ctx.progress(MODULE, (p * rows + rows - 1 - y) as u64, span)?;
        }
    }
    let length = packet * columns * rows * planes.len();
    let pad = (BLOCK_SIZE - length % BLOCK_SIZE) % BLOCK_SIZE;
    blob.write_bytes(&vec![0u8; pad])?;
    Ok(())
}
