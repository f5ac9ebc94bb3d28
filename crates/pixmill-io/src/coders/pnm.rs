//! Netpbm family: PBM, PGM, PPM, PNM, PAM and PFM.
//!
//! | Magic | Layout |
//! |-------|--------|
//! | `P1` / `P4` | bitmap, ASCII digits / packed bits |
//! | `P2` / `P5` | gray, ASCII / binary big-endian |
//! | `P3` / `P6` | RGB, ASCII / binary big-endian |
//! | `P7` | PAM keyword header, gray/RGB/CMYK with optional alpha |
//! | `PF` / `Pf` | float RGB / gray, rows bottom-to-top |
//!
//! Bitmaps and graymaps decode as colormapped images with a gray ramp of
//! `maxval + 1` entries. The first `#` comment becomes the `Comment`
//! property. Frames may be concatenated; decoding continues while the next
//! non-blank byte is `P`.

use pixmill_core::quantum::scale_quantum_to_any;
use pixmill_core::{
    Colorspace, Compression, Endian, Image, ImageInfo, ImageList, PixelPacket, Severity,
    MAX_COLORMAP_SIZE, QUANTUM_RANGE,
};
use tracing::debug;

use crate::blob::Blob;
use crate::coders::{allocate, next_frame, warn_eof};
use crate::context::Context;
use crate::error::{CodecErrorKind, IoError, IoResult, OptionErrorKind};
use crate::quantum::{export_pixels, import_row, QuantumFormat, QuantumInfo, QuantumType};
use crate::registry::CoderInfo;

const MODULE: &str = "pnm";

/// Largest accepted `maxval`.
pub const MAX_VALUE: u32 = 65535;

// === Variants ===

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variant {
    AsciiBitmap,
    AsciiGray,
    AsciiColor,
    Bitmap,
    Gray,
    Color,
    Pam,
    FloatColor,
    FloatGray,
}

impl Variant {
    fn from_magic(byte: u8) -> Option<Self> {
        Some(match byte {
            b'1' => Self::AsciiBitmap,
            b'2' => Self::AsciiGray,
            b'3' => Self::AsciiColor,
            b'4' => Self::Bitmap,
            b'5' => Self::Gray,
            b'6' => Self::Color,
            b'7' => Self::Pam,
            b'F' => Self::FloatColor,
            b'f' => Self::FloatGray,
            _ => return None,
        })
    }

    fn magic(self) -> char {
        match self {
            Self::AsciiBitmap => '1',
            Self::AsciiGray => '2',
            Self::AsciiColor => '3',
            Self::Bitmap => '4',
            Self::Gray => '5',
            Self::Color => '6',
            Self::Pam => '7',
            Self::FloatColor => 'F',
            Self::FloatGray => 'f',
        }
    }

    fn is_ascii(self) -> bool {
        matches!(self, Self::AsciiBitmap | Self::AsciiGray | Self::AsciiColor)
    }

    fn is_colormapped(self) -> bool {
        matches!(
            self,
            Self::AsciiBitmap | Self::AsciiGray | Self::Bitmap | Self::Gray
        )
    }

    fn is_float(self) -> bool {
        matches!(self, Self::FloatColor | Self::FloatGray)
    }
}

/// PAM `TUPLTYPE` flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Tuple {
    grayscale: bool,
    matte: bool,
    cmyk: bool,
}

impl Tuple {
    fn parse(value: &str) -> Self {
        let value = value.to_ascii_uppercase();
        Self {
            grayscale: value.starts_with("BLACKANDWHITE") || value.starts_with("GRAYSCALE"),
            matte: value.ends_with("_ALPHA"),
            cmyk: value.starts_with("CMYK"),
        }
    }

    /// Samples per pixel.
    fn channels(&self) -> usize {
        let color = if self.grayscale { 1 } else { 3 };
        color + usize::from(self.cmyk) + usize::from(self.matte)
    }
}

#[derive(Debug, Clone, Copy)]
struct Header {
    variant: Variant,
    columns: usize,
    rows: usize,
    max_value: u32,
    tuple: Tuple,
    float_scale: f64,
    endian: Endian,
}

impl Header {
    /// Smallest bit count addressing `max_value`.
    fn depth(&self) -> u32 {
        let mut depth = 1;
        while (1u64 << depth) < self.max_value as u64 {
            depth += 1;
        }
        depth
    }

    fn sample_bytes(&self) -> usize {
        if self.max_value > 255 { 2 } else { 1 }
    }

    /// Binary body size; `CorruptImage` when it does not fit in `u64`.
    fn body_bytes(&self) -> IoResult<u64> {
        let per_pixel = match self.variant {
            Variant::Gray => self.sample_bytes(),
            Variant::Color => 3 * self.sample_bytes(),
            Variant::Pam => self.tuple.channels() * self.sample_bytes(),
            Variant::FloatColor => 12,
            Variant::FloatGray => 4,
            _ => 0,
        };
        let row = match self.variant {
            Variant::Bitmap => Some(self.columns.div_ceil(8)),
            _ => self.columns.checked_mul(per_pixel),
        };
        row.and_then(|row| (row as u64).checked_mul(self.rows as u64))
            .ok_or_else(|| {
                IoError::codec(
                    CodecErrorKind::CorruptImage,
                    format!("{}x{} body overflows", self.columns, self.rows),
                )
            })
    }
}

/// Returns `true` for `P1`..`P7`, `PF` and `Pf`.
pub fn is_pnm(header: &[u8]) -> bool {
    header.len() >= 2 && header[0] == b'P' && Variant::from_magic(header[1]).is_some()
}

/// Registry entries.
pub fn coder_info() -> Vec<CoderInfo> {
    [
        ("PAM", "Common 2-dimensional bitmap format"),
        ("PBM", "Portable bitmap format (black and white)"),
        ("PFM", "Portable float format"),
        ("PGM", "Portable graymap format (gray scale)"),
        ("PNM", "Portable anymap"),
        ("PPM", "Portable pixmap format (color)"),
    ]
    .into_iter()
    .map(|(tag, description)| {
        let info = CoderInfo::new(tag, description)
            .with_module(MODULE)
            .with_decoder(decode)
            .with_encoder(encode);
        if tag == "PNM" {
            info.with_magic(is_pnm)
        } else {
            info
        }
    })
    .collect()
}

// === Header parsing ===

/// Next byte that is not ASCII whitespace.
fn next_non_space(blob: &mut Blob) -> IoResult<Option<u8>> {
    while let Some(byte) = blob.read_byte()? {
        if !byte.is_ascii_whitespace() {
            return Ok(Some(byte));
        }
    }
    Ok(None)
}

/// Reads the next unsigned integer, or a single binary digit when
/// `bitmap` is set. `#` comments are collected into the `Comment` property.
/// The delimiter after a multi-digit value is consumed.
fn read_integer(blob: &mut Blob, image: &mut Image, bitmap: bool) -> IoResult<Option<u32>> {
    let mut comment: Option<String> = None;
    let first = loop {
        let Some(byte) = blob.read_byte()? else {
            return Ok(None);
        };
        if byte == b'#' {
            let text = comment.get_or_insert_with(String::new);
            while let Some(c) = blob.read_byte()? {
                if c == b'\n' {
                    break;
                }
                text.push(c as char);
            }
            continue;
        }
        if byte.is_ascii_digit() {
            break byte;
        }
    };
    if let Some(text) = comment {
        if !image.properties.contains("Comment") {
            image.properties.set("Comment", text.trim_end_matches('\r'));
        }
    }
    let mut value = (first - b'0') as u32;
    if bitmap {
        return Ok(Some(value));
    }
    while let Some(byte) = blob.read_byte()? {
        if !byte.is_ascii_digit() {
            break;
        }
        value = value.saturating_mul(10).saturating_add((byte - b'0') as u32);
    }
    Ok(Some(value))
}

fn require(value: Option<u32>, info: &ImageInfo) -> IoResult<u32> {
    value.ok_or_else(|| IoError::improper_header(info.filename.clone()))
}

fn read_pam_header(blob: &mut Blob, image: &mut Image, info: &ImageInfo) -> IoResult<Header> {
    let mut header = Header {
        variant: Variant::Pam,
        columns: 0,
        rows: 0,
        max_value: 1,
        tuple: Tuple::default(),
        float_scale: 1.0,
        endian: Endian::Msb,
    };
    let mut depth = None;
    loop {
        let Some(line) = blob.read_string()? else {
            return Err(IoError::improper_header(info.filename.clone()));
        };
        let line = line.trim();
        if let Some(comment) = line.strip_prefix('#') {
            if !image.properties.contains("Comment") {
                image.properties.set("Comment", comment);
            }
            continue;
        }
        let mut parts = line.splitn(2, char::is_whitespace);
        let keyword = parts.next().unwrap_or_default().to_ascii_uppercase();
        let value = parts.next().unwrap_or_default().trim();
        let number = || value.parse::<u32>().unwrap_or(0);
        match keyword.as_str() {
            "ENDHDR" => break,
            "WIDTH" => header.columns = number() as usize,
            "HEIGHT" => header.rows = number() as usize,
            "DEPTH" => depth = Some(number() as usize),
            "MAXVAL" => header.max_value = number(),
            "TUPLTYPE" => header.tuple = Tuple::parse(value),
            _ => {}
        }
    }
    if let Some(depth) = depth {
        if depth != header.tuple.channels() {
            debug!(depth, tuple = ?header.tuple, "PAM depth disagrees with tuple type");
            if header.tuple == Tuple::default() {
                header.tuple = match depth {
                    1 => Tuple { grayscale: true, ..Tuple::default() },
                    2 => Tuple { grayscale: true, matte: true, ..Tuple::default() },
                    4 => Tuple { matte: true, ..Tuple::default() },
                    _ => header.tuple,
                };
            }
        }
    }
    Ok(header)
}

fn read_header(blob: &mut Blob, image: &mut Image, info: &ImageInfo) -> IoResult<Header> {
    let magic = blob.read_byte()?;
    let Some(variant) = magic.and_then(Variant::from_magic) else {
        return Err(IoError::improper_header(info.filename.clone()));
    };
    let header = if variant == Variant::Pam {
        read_pam_header(blob, image, info)?
    } else {
        let columns = require(read_integer(blob, image, false)?, info)? as usize;
        let rows = require(read_integer(blob, image, false)?, info)? as usize;
        let mut header = Header {
            variant,
            columns,
            rows,
            max_value: 1,
            tuple: Tuple::default(),
            float_scale: 1.0,
            endian: Endian::Msb,
        };
        if variant.is_float() {
            let line = blob.read_string()?.unwrap_or_default();
            let marker: f64 = line
                .trim()
                .parse()
                .map_err(|_| IoError::improper_header(info.filename.clone()))?;
            header.float_scale = marker.abs();
            header.endian = if marker < 0.0 { Endian::Lsb } else { Endian::Msb };
        } else if !matches!(variant, Variant::AsciiBitmap | Variant::Bitmap) {
            header.max_value = require(read_integer(blob, image, false)?, info)?;
        }
        header
    };
    if header.columns == 0 || header.rows == 0 {
        return Err(IoError::option(
            OptionErrorKind::NegativeOrZeroImageSize,
            info.filename.clone(),
        ));
    }
    if header.max_value == 0 || header.max_value > MAX_VALUE {
        return Err(IoError::improper_header(info.filename.clone()));
    }
    Ok(header)
}

// === Decoding ===

/// Reads every frame of a Netpbm stream.
pub fn decode(info: &ImageInfo, blob: &mut Blob, ctx: &mut Context) -> IoResult<ImageList> {
    let mut list = ImageList::new();
    let mut image = Image::from_info(info);
    let mut lead = next_non_space(blob)?;
    loop {
        if lead != Some(b'P') {
            return Err(IoError::improper_header(info.filename.clone()));
        }
        let header = read_header(blob, &mut image, info)?;
        debug!(
            magic = %header.variant.magic(),
            columns = header.columns,
            rows = header.rows,
            max_value = header.max_value,
            "pnm header"
        );
        configure(&mut image, &header, info)?;

        let complete = if info.ping && !header.variant.is_ascii() {
            let body = header.body_bytes()?;
            blob.skip(body)? == body
        } else {
            decode_body(blob, &mut image, &header, info, ctx)?
        };
        if !complete {
            warn_eof(ctx, &mut image, MODULE);
        }

        let scene = image.scene;
        let next = next_frame(info, &image);
        list.append(image);
        if !complete || info.scene_limit_reached(scene) {
            break;
        }
        lead = next_non_space(blob)?;
        if lead != Some(b'P') {
            break;
        }
        image = next;
    }
    Ok(list)
}

fn configure(image: &mut Image, header: &Header, info: &ImageInfo) -> IoResult<()> {
    allocate(image, info, header.columns, header.rows)?;
    image.depth = header.depth();
    match header.variant {
        Variant::FloatColor | Variant::FloatGray => {
            image.depth = 32;
            image.endian = header.endian;
            if header.variant == Variant::FloatGray {
                image.set_colorspace(Colorspace::Gray);
            }
        }
        Variant::Pam => {
            image.matte = header.tuple.matte;
            if header.tuple.cmyk {
                image.set_colorspace(Colorspace::Cmyk);
            } else if header.tuple.grayscale {
                image.set_colorspace(Colorspace::Gray);
            }
        }
        variant if variant.is_colormapped() => {
            let colors = (header.max_value as usize + 1).min(MAX_COLORMAP_SIZE);
            image.allocate_colormap(colors)?;
            image.set_colorspace(Colorspace::Gray);
            image.depth = header.depth();
        }
        _ => {}
    }
    Ok(())
}

/// Reads `count` samples; `None` on a short read.
fn read_samples(
    blob: &mut Blob,
    image: &mut Image,
    header: &Header,
    count: usize,
) -> IoResult<Option<Vec<u32>>> {
    match header.variant {
        Variant::AsciiBitmap | Variant::AsciiGray | Variant::AsciiColor => {
            let bitmap = header.variant == Variant::AsciiBitmap;
            let mut samples = Vec::with_capacity(count);
            for _ in 0..count {
                match read_integer(blob, image, bitmap)? {
                    Some(value) => samples.push(value),
                    None => return Ok(None),
                }
            }
            Ok(Some(samples))
        }
        Variant::Bitmap => {
            let bytes = blob.read_up_to(count.div_ceil(8))?;
            if bytes.len() < count.div_ceil(8) {
                return Ok(None);
            }
            Ok(Some(
                (0..count)
                    .map(|x| ((bytes[x / 8] >> (7 - x % 8)) & 1) as u32)
                    .collect(),
            ))
        }
        _ => {
            let wide = header.sample_bytes() == 2;
            let bytes = blob.read_up_to(count * header.sample_bytes())?;
            if bytes.len() < count * header.sample_bytes() {
                return Ok(None);
            }
            Ok(Some(if wide {
                bytes
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]) as u32)
                    .collect()
            } else {
                bytes.iter().map(|&b| b as u32).collect()
            }))
        }
    }
}

fn decode_body(
    blob: &mut Blob,
    image: &mut Image,
    header: &Header,
    info: &ImageInfo,
    ctx: &mut Context,
) -> IoResult<bool> {
    let columns = header.columns;
    let rows = header.rows;

    if header.variant.is_float() {
        let kind = if header.variant == Variant::FloatGray {
            QuantumType::Gray
        } else {
            QuantumType::RGB
        };
        let mut qi = QuantumInfo::default()
            .with_depth(32)
            .with_format(QuantumFormat::FloatingPoint)
            .with_endian(header.endian);
        qi.scale = QUANTUM_RANGE as f64 * header.float_scale;
        let length = qi.row_bytes(kind, columns);
        for y in (0..rows).rev() {
            let row = blob.read_up_to(length)?;
            if row.len() < length {
                return Ok(false);
            }
            if !info.ping {
                import_row(image, &qi, kind, y, &row)?;
            }
            ctx.progress(MODULE, (rows - 1 - y) as u64, rows as u64)?;
        }
        return Ok(true);
    }

    let channels = match header.variant {
        Variant::AsciiColor | Variant::Color => 3,
        Variant::Pam => header.tuple.channels(),
        _ => 1,
    };
    let max = header.max_value as f32;
    let to_quantum = |v: u32| (v.min(header.max_value) as f32) * QUANTUM_RANGE / max;
    let colormap = image.colormap().to_vec();
    let mut clamped = false;

    for y in 0..rows {
        let Some(samples) = read_samples(blob, image, header, columns * channels)? else {
            if clamped {
                ctx.warn_image(image, MODULE, Severity::CorruptImageWarning, "InvalidColormapIndex");
            }
            return Ok(false);
        };
        if info.ping {
            continue;
        }
        let start = y * columns;
        match header.variant {
            Variant::AsciiBitmap | Variant::Bitmap | Variant::AsciiGray | Variant::Gray => {
                let bitmap = matches!(header.variant, Variant::AsciiBitmap | Variant::Bitmap);
                for (x, &sample) in samples.iter().enumerate() {
                    let raw = if bitmap { usize::from(sample == 0) } else { sample as usize };
                    let (index, out_of_range) = pixmill_core::image::constrain_index(raw, colormap.len());
                    clamped |= out_of_range;
                    image.indexes_mut()[start + x] = index as f32;
                    image.pixels_mut()[start + x] = colormap[index];
                }
            }
            Variant::AsciiColor | Variant::Color => {
                let row = &mut image.pixels_mut()[start..start + columns];
                for (pixel, rgb) in row.iter_mut().zip(samples.chunks_exact(3)) {
                    *pixel = PixelPacket::rgb(to_quantum(rgb[0]), to_quantum(rgb[1]), to_quantum(rgb[2]));
                }
            }
            _ => {
                let tuple = header.tuple;
                for (x, pixel) in samples.chunks_exact(channels).enumerate() {
                    let mut c = pixel.iter().copied().map(to_quantum);
                    let mut packet = if tuple.grayscale {
                        PixelPacket::gray(c.next().unwrap_or_default())
                    } else {
                        let r = c.next().unwrap_or_default();
                        let g = c.next().unwrap_or_default();
                        let b = c.next().unwrap_or_default();
                        PixelPacket::rgb(r, g, b)
                    };
                    if tuple.cmyk {
                        image.indexes_mut()[start + x] = c.next().unwrap_or_default();
                    }
                    if tuple.matte {
                        packet.opacity = QUANTUM_RANGE - c.next().unwrap_or_default();
                    }
                    image.pixels_mut()[start + x] = packet;
                }
            }
        }
        ctx.progress(MODULE, y as u64, rows as u64)?;
    }
    if clamped {
        ctx.warn_image(image, MODULE, Severity::CorruptImageWarning, "InvalidColormapIndex");
    }
    Ok(true)
}

// === Encoding ===

fn choose_variant(tag: &str, image: &Image) -> Variant {
    let ascii = image.compression == Compression::None;
    let pick = |binary, text| if ascii { text } else { binary };
    match tag.to_ascii_uppercase().as_str() {
        "PAM" => Variant::Pam,
        "PBM" => pick(Variant::Bitmap, Variant::AsciiBitmap),
        "PFM" if image.is_gray() => Variant::FloatGray,
        "PFM" => Variant::FloatColor,
        "PGM" => pick(Variant::Gray, Variant::AsciiGray),
        "PNM" if image.is_monochrome() => pick(Variant::Bitmap, Variant::AsciiBitmap),
        "PNM" if image.is_gray() => pick(Variant::Gray, Variant::AsciiGray),
        _ => pick(Variant::Color, Variant::AsciiColor),
    }
}

fn write_comment(blob: &mut Blob, comment: &str) -> IoResult<()> {
    let mut text = String::with_capacity(comment.len() + 2);
    text.push('#');
    let mut chars = comment.chars().peekable();
    while let Some(c) = chars.next() {
        text.push(c);
        if (c == '\n' || c == '\r') && chars.peek().is_some() {
            text.push('#');
        }
    }
    text.push('\n');
    blob.write_str(&text)
}

/// PAM tuple type and sample depth for `image`.
fn pam_layout(image: &Image) -> (Tuple, String, u32) {
    let mut tuple = Tuple::default();
    let mut name;
    let mut depth = image.depth.clamp(1, 16);
    if image.colorspace() == Colorspace::Cmyk {
        tuple.cmyk = true;
        name = "CMYK".to_string();
    } else if image.is_gray() {
        tuple.grayscale = true;
        name = "GRAYSCALE".to_string();
        if image.is_monochrome() && image.depth == 1 {
            name = "BLACKANDWHITE".to_string();
            depth = 1;
        }
    } else {
        name = "RGB".to_string();
    }
    if image.matte {
        tuple.matte = true;
        name.push_str("_ALPHA");
    }
    (tuple, name, depth)
}

/// Writes every frame in the Netpbm variant selected by the tag.
pub fn encode(info: &ImageInfo, list: &mut ImageList, blob: &mut Blob, ctx: &mut Context) -> IoResult<()> {
    for image in list.iter() {
        let variant = choose_variant(&info.magick, image);
        debug!(magic = %variant.magic(), columns = image.columns(), rows = image.rows(), "write pnm");
        blob.write_str(&format!("P{}\n", variant.magic()))?;
        if let Some(comment) = image.properties.get("Comment") {
            write_comment(blob, comment)?;
        }
        match variant {
            Variant::Pam => encode_pam(image, blob, ctx)?,
            Variant::FloatColor | Variant::FloatGray => {
                blob.write_str(&format!("{} {}\n", image.columns(), image.rows()))?;
                encode_float(image, variant, blob, ctx)?;
            }
            _ => {
                blob.write_str(&format!("{} {}\n", image.columns(), image.rows()))?;
                encode_integer(image, variant, blob, ctx)?;
            }
        }
    }
    Ok(())
}

fn encode_integer(image: &Image, variant: Variant, blob: &mut Blob, ctx: &mut Context) -> IoResult<()> {
    let (columns, rows) = (image.columns(), image.rows());
    let wide = image.depth > 8;
    let depth = if wide { 16 } else { 8 };
    if !matches!(variant, Variant::AsciiBitmap | Variant::Bitmap) {
        blob.write_str(if wide { "65535\n" } else { "255\n" })?;
    }
    let black = |p: &PixelPacket| p.intensity() < QUANTUM_RANGE / 2.0;
    let mut column = 0usize;
    let mut out = Vec::with_capacity(columns * 6);
    for y in 0..rows {
        let row = image.pixel_row(y);
        out.clear();
        match variant {
            Variant::AsciiBitmap => {
                let mut text = String::new();
                for p in row {
                    text.push_str(if black(p) { "1 " } else { "0 " });
                    column += 1;
                    if column == 36 {
                        text.push('\n');
                        column = 0;
                    }
                }
                blob.write_str(&text)?;
            }
            Variant::AsciiGray => {
                let mut text = String::new();
                for p in row {
                    text.push_str(&format!(" {}", scale_quantum_to_any(p.intensity(), depth)));
                    column += 1;
                    if column == 12 {
                        text.push('\n');
                        column = 0;
                    }
                }
                blob.write_str(&text)?;
            }
            Variant::AsciiColor => {
                let mut text = String::new();
                for p in row {
                    text.push_str(&format!(
                        "{} {} {} ",
                        scale_quantum_to_any(p.red, depth),
                        scale_quantum_to_any(p.green, depth),
                        scale_quantum_to_any(p.blue, depth)
                    ));
                    column += 1;
                    if column == 4 {
                        text.push('\n');
                        column = 0;
                    }
                }
                blob.write_str(&text)?;
            }
            Variant::Bitmap => {
                out.resize(columns.div_ceil(8), 0);
                for (x, p) in row.iter().enumerate() {
                    if black(p) {
                        out[x / 8] |= 0x80 >> (x % 8);
                    }
                }
                blob.write_bytes(&out)?;
            }
            Variant::Gray => {
                for p in row {
                    push_sample(&mut out, scale_quantum_to_any(p.intensity(), depth), wide);
                }
                blob.write_bytes(&out)?;
            }
            _ => {
                for p in row {
                    for q in [p.red, p.green, p.blue] {
                        push_sample(&mut out, scale_quantum_to_any(q, depth), wide);
                    }
                }
                blob.write_bytes(&out)?;
            }
        }
        ctx.progress(MODULE, y as u64, rows as u64)?;
    }
    if variant.is_ascii() && column != 0 {
        blob.write_str("\n")?;
    }
    Ok(())
}

fn push_sample(out: &mut Vec<u8>, value: u64, wide: bool) {
    if wide {
        out.extend_from_slice(&(value as u16).to_be_bytes());
    } else {
        out.push(value as u8);
    }
}

fn encode_pam(image: &Image, blob: &mut Blob, ctx: &mut Context) -> IoResult<()> {
    let (columns, rows) = (image.columns(), image.rows());
    let (tuple, name, depth) = pam_layout(image);
    let max_value = (1u32 << depth) - 1;
    blob.write_str(&format!(
        "WIDTH {columns}\nHEIGHT {rows}\nDEPTH {}\nMAXVAL {max_value}\nTUPLTYPE {name}\nENDHDR\n",
        tuple.channels()
    ))?;
    let wide = depth > 8;
    let mut out = Vec::with_capacity(columns * tuple.channels() * 2);
    for y in 0..rows {
        out.clear();
        let pixels = image.pixel_row(y);
        let indexes = if tuple.cmyk { image.index_row(y) } else { &[] };
        for (x, p) in pixels.iter().enumerate() {
            if tuple.grayscale {
                push_sample(&mut out, scale_quantum_to_any(p.intensity(), depth), wide);
            } else {
                for q in [p.red, p.green, p.blue] {
                    push_sample(&mut out, scale_quantum_to_any(q, depth), wide);
                }
            }
            if tuple.cmyk {
                let black = indexes.get(x).copied().unwrap_or_default();
                push_sample(&mut out, scale_quantum_to_any(black, depth), wide);
            }
            if tuple.matte {
                push_sample(&mut out, scale_quantum_to_any(QUANTUM_RANGE - p.opacity, depth), wide);
            }
        }
        blob.write_bytes(&out)?;
        ctx.progress(MODULE, y as u64, rows as u64)?;
    }
    Ok(())
}

fn encode_float(image: &Image, variant: Variant, blob: &mut Blob, ctx: &mut Context) -> IoResult<()> {
    let lsb = image.endian == Endian::Lsb;
    blob.write_str(if lsb { "-1.0\n" } else { "1.0\n" })?;
    let kind = if variant == Variant::FloatGray {
        QuantumType::Gray
    } else {
        QuantumType::RGB
    };
    let qi = QuantumInfo::default()
        .with_depth(32)
        .with_format(QuantumFormat::FloatingPoint)
        .with_endian(if lsb { Endian::Lsb } else { Endian::Msb });
    let (columns, rows) = (image.columns(), image.rows());
    let mut out = Vec::with_capacity(columns * 12);
    for y in (0..rows).rev() {
        out.clear();
        export_pixels(image, &qi, kind, 0, y, columns, 1, &mut out)?;
        blob.write_bytes(&out)?;
        ctx.progress(MODULE, (rows - 1 - y) as u64, rows as u64)?;
    }
    Ok(())
}
