//! Pixel marshalling between external sample rows and image pixels.
//!
//! A [`QuantumInfo`] describes how samples look on the wire (bit depth,
//! integer or float, byte order, polarity, float range). A [`QuantumType`]
//! selects which channels a row carries and in what order. Together they
//! drive two operations:
//!
//! - [`import_pixels`] unpacks rows into the image's pending pixel window
//!   (see [`Image::get_pixel_window`])
//! - [`export_pixels`] packs a region of the image into bytes
//!
//! # Sample encoding
//!
//! | Format | Depth | Mapping |
//! |--------|-------|---------|
//! | unsigned | 1..=64 | `[0, 2^d-1]` linear onto `[0, QUANTUM_RANGE]` |
//! | signed | 8..=64 | offset binary: `(v + 2^(d-1)) / (2^d-1)` |
//! | float | 16, 32, 64 | `(f - minimum) * scale` |
//!
//! Depths that are not a multiple of eight are bit-packed MSB-first and every
//! row starts on a byte boundary. Wider samples follow `endian`, with
//! [`Endian::Undefined`] read as big-endian.
//!
//! # Alpha
//!
//! Pixels store opacity (`0` = opaque). `Alpha` selectors convert with
//! `opacity = QUANTUM_RANGE - alpha`; `Opacity` selectors copy verbatim.
//! Exporting alpha from an image without matte writes fully opaque samples.
//!
//! # Example
//!
//! ```rust
//! use pixmill_core::{Image, QUANTUM_RANGE};
//! use pixmill_io::quantum::{import_row, export_pixels, QuantumInfo, QuantumType};
//!
//! let mut image = Image::new(2, 1).unwrap();
//! let qi = QuantumInfo::default().with_depth(8);
//! import_row(&mut image, &qi, QuantumType::RGB, 0, &[255, 0, 0, 0, 0, 255]).unwrap();
//! assert_eq!(image.pixel(0, 0).unwrap().red, QUANTUM_RANGE);
//!
//! let mut out = Vec::new();
//! export_pixels(&image, &qi, QuantumType::RGB, 0, 0, 2, 1, &mut out).unwrap();
//! assert_eq!(out, vec![255, 0, 0, 0, 0, 255]);
//! ```

use std::str::FromStr;

use half::f16;
use pixmill_core::image::constrain_index;
use pixmill_core::quantum::{max_value_for_depth, scale_any_to_quantum, scale_quantum_to_any};
use pixmill_core::{
    Colorspace, Endian, Error as CoreError, Image, ImageInfo, OptionSource, PixelPacket, Quantum,
    Severity, Warning, QUANTUM_RANGE,
};

use crate::error::{CodecErrorKind, IoError, IoResult};

// === Descriptors ===

/// Numeric interpretation of samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuantumFormat {
    /// Not specified; integer samples are read as unsigned.
    #[default]
    Undefined,
    /// Unsigned integer.
    Unsigned,
    /// Two's complement integer.
    Signed,
    /// IEEE float of 16, 32 or 64 bits.
    FloatingPoint,
}

impl FromStr for QuantumFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "undefined" => Ok(Self::Undefined),
            "unsigned" => Ok(Self::Unsigned),
            "signed" => Ok(Self::Signed),
            "floating-point" | "floatingpoint" | "float" => Ok(Self::FloatingPoint),
            _ => Err(()),
        }
    }
}

impl QuantumFormat {
    /// Option value naming this format.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Unsigned => "unsigned",
            Self::Signed => "signed",
            Self::FloatingPoint => "floating-point",
        }
    }
}

/// Channel selector for one row of samples.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantumType {
    Gray,
    GrayAlpha,
    RGB,
    RGBA,
    RGBO,
    CMYK,
    CMYKA,
    Index,
    IndexAlpha,
    Red,
    Green,
    Blue,
    Alpha,
    Opacity,
    Cyan,
    Magenta,
    Yellow,
    Black,
}

impl QuantumType {
    /// Samples per pixel.
    pub fn channels(self) -> usize {
        match self {
            Self::GrayAlpha | Self::IndexAlpha => 2,
            Self::RGB => 3,
            Self::RGBA | Self::RGBO | Self::CMYK => 4,
            Self::CMYKA => 5,
            _ => 1,
        }
    }
}

/// Wire description of samples.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantumInfo {
    /// Numeric interpretation.
    pub format: QuantumFormat,
    /// Bits per sample.
    pub depth: u32,
    /// Bits skipped after each pixel group.
    pub pad: usize,
    /// Gray samples are inverted (0 = white).
    pub min_is_white: bool,
    /// Float value mapped to quantum zero.
    pub minimum: f64,
    /// Float value mapped to the top of the quantum range.
    pub maximum: f64,
    /// Float multiplier into quantum range.
    pub scale: f64,
    /// Byte order of multi-byte samples.
    pub endian: Endian,
}

impl Default for QuantumInfo {
    fn default() -> Self {
        Self {
            format: QuantumFormat::Undefined,
            depth: 8,
            pad: 0,
            min_is_white: false,
            minimum: 0.0,
            maximum: 1.0,
            scale: QUANTUM_RANGE as f64,
            endian: Endian::Undefined,
        }
    }
}

impl QuantumInfo {
    /// Builds a descriptor from the image depth and endian plus the
    /// `quantum:*` options, falling back to image properties of the same
    /// name.
    pub fn new(info: &ImageInfo, image: &Image) -> Self {
        let lookup = |key: &str| -> Option<String> {
            info.option(key)
                .or_else(|| image.properties.get(key))
                .map(str::to_string)
        };
        let mut qi = Self {
            depth: image.depth.max(1),
            endian: image.endian,
            ..Self::default()
        };
        if let Some(format) = lookup("quantum:format").and_then(|v| v.parse().ok()) {
            qi.format = format;
        }
        let minimum = lookup("quantum:minimum").and_then(|v| v.trim().parse::<f64>().ok());
        let maximum = lookup("quantum:maximum").and_then(|v| v.trim().parse::<f64>().ok());
        if let (Some(min), Some(max)) = (minimum, maximum) {
            qi.set_range(min, max);
        }
        if let Some(scale) = lookup("quantum:scale").and_then(|v| v.trim().parse::<f64>().ok()) {
            qi.scale = scale;
        }
        qi.min_is_white = lookup("quantum:polarity")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("min-is-white"));
        qi
    }

    /// Sets the float range and derives `scale`. Equal non-zero bounds scale
    /// by the single value with a zero minimum.
    pub fn set_range(&mut self, minimum: f64, maximum: f64) {
        let range = QUANTUM_RANGE as f64;
        if (maximum - minimum).abs() < f64::EPSILON {
            if minimum.abs() > f64::EPSILON {
                self.scale = range / minimum;
                self.minimum = 0.0;
                self.maximum = minimum;
            }
            return;
        }
        self.minimum = minimum;
        self.maximum = maximum;
        self.scale = range / (maximum - minimum);
    }

    /// Sets the bit depth.
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Sets the numeric format.
    pub fn with_format(mut self, format: QuantumFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the byte order.
    pub fn with_endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    /// Sets the per-pixel pad in bits.
    pub fn with_pad(mut self, pad: usize) -> Self {
        self.pad = pad;
        self
    }

    /// Sets gray polarity.
    pub fn with_min_is_white(mut self, min_is_white: bool) -> Self {
        self.min_is_white = min_is_white;
        self
    }

    /// Returns `true` for float samples of a supported width.
    pub fn is_floating_point(&self) -> bool {
        self.format == QuantumFormat::FloatingPoint && matches!(self.depth, 16 | 32 | 64)
    }

    /// Bytes in one row of `width` pixels of `kind`.
    pub fn row_bytes(&self, kind: QuantumType, width: usize) -> usize {
        let bits = width * (kind.channels() * self.depth as usize + self.pad);
        bits.div_ceil(8)
    }

    fn lsb(&self) -> bool {
        self.endian == Endian::Lsb
    }

    fn decode(&self, raw: u64) -> Quantum {
        let depth = self.depth;
        match self.format {
            QuantumFormat::FloatingPoint if self.is_floating_point() => {
                let value = match depth {
                    16 => f16::from_bits(raw as u16).to_f64(),
                    32 => f32::from_bits(raw as u32) as f64,
                    _ => f64::from_bits(raw),
                };
                ((value - self.minimum) * self.scale) as Quantum
            }
            QuantumFormat::Signed if depth > 1 => {
                let shift = 64 - depth.min(64);
                let signed = ((raw << shift) as i64 >> shift) as f64;
                let half = 2f64.powi(depth as i32 - 1);
                ((signed + half) * QUANTUM_RANGE as f64 / max_value_for_depth(depth)) as Quantum
            }
            _ => scale_any_to_quantum(raw, depth),
        }
    }

    fn encode(&self, quantum: Quantum) -> u64 {
        let depth = self.depth;
        match self.format {
            QuantumFormat::FloatingPoint if self.is_floating_point() => {
                let value = quantum as f64 / self.scale + self.minimum;
                match depth {
                    16 => f16::from_f64(value).to_bits() as u64,
                    32 => (value as f32).to_bits() as u64,
                    _ => value.to_bits(),
                }
            }
            QuantumFormat::Signed if depth > 1 => {
                let half = 2f64.powi(depth as i32 - 1) as i64;
                let unsigned = scale_quantum_to_any(quantum, depth) as i64;
                let value = (unsigned - half) as u64;
                if depth >= 64 {
                    value
                } else {
                    value & ((1u64 << depth) - 1)
                }
            }
            _ => scale_quantum_to_any(quantum, depth),
        }
    }

    /// Integer value of a sample used as a colormap index.
    fn decode_index(&self, raw: u64) -> usize {
        if self.is_floating_point() {
            let value = match self.depth {
                16 => f16::from_bits(raw as u16).to_f64(),
                32 => f32::from_bits(raw as u32) as f64,
                _ => f64::from_bits(raw),
            };
            return value.round().max(0.0) as usize;
        }
        raw as usize
    }

    fn encode_index(&self, index: usize) -> u64 {
        if self.is_floating_point() {
            return self.encode(index as Quantum * self.scale as Quantum);
        }
        index as u64
    }

    fn polarity(&self, value: Quantum) -> Quantum {
        if self.min_is_white {
            QUANTUM_RANGE - value
        } else {
            value
        }
    }
}

// === Bit streams ===

struct SampleReader<'a> {
    data: &'a [u8],
    pos: usize,
    bit: u32,
    depth: u32,
    lsb: bool,
}

impl<'a> SampleReader<'a> {
    fn new(data: &'a [u8], qi: &QuantumInfo) -> Self {
        Self {
            data,
            pos: 0,
            bit: 0,
            depth: qi.depth,
            lsb: qi.lsb(),
        }
    }

    fn next(&mut self) -> u64 {
        if self.depth % 8 == 0 && self.bit == 0 {
            let n = (self.depth / 8) as usize;
            let bytes = &self.data[self.pos..self.pos + n];
            self.pos += n;
            return if self.lsb {
                bytes.iter().rev().fold(0u64, |acc, &b| (acc << 8) | b as u64)
            } else {
                bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
            };
        }
        let mut value = 0u64;
        let mut remaining = self.depth;
        while remaining > 0 {
            let byte = self.data[self.pos];
            let available = 8 - self.bit;
            let take = available.min(remaining);
            let shift = available - take;
            let bits = (byte >> shift) & ((1u16 << take) - 1) as u8;
            value = (value << take) | bits as u64;
            remaining -= take;
            self.bit += take;
            if self.bit == 8 {
                self.bit = 0;
                self.pos += 1;
            }
        }
        value
    }

    fn skip(&mut self, bits: usize) {
        let total = self.bit as usize + bits;
        self.pos += total / 8;
        self.bit = (total % 8) as u32;
    }
}

struct SampleWriter<'a> {
    out: &'a mut Vec<u8>,
    acc: u8,
    bit: u32,
    depth: u32,
    lsb: bool,
}

impl<'a> SampleWriter<'a> {
    fn new(out: &'a mut Vec<u8>, qi: &QuantumInfo) -> Self {
        Self {
            out,
            acc: 0,
            bit: 0,
            depth: qi.depth,
            lsb: qi.lsb(),
        }
    }

    fn push(&mut self, value: u64) {
        if self.depth % 8 == 0 && self.bit == 0 {
            let n = (self.depth / 8) as usize;
            for i in 0..n {
                let shift = if self.lsb { i * 8 } else { (n - 1 - i) * 8 };
                self.out.push((value >> shift) as u8);
            }
            return;
        }
        let mut remaining = self.depth;
        while remaining > 0 {
            let available = 8 - self.bit;
            let take = available.min(remaining);
            let bits = ((value >> (remaining - take)) & ((1u64 << take) - 1)) as u8;
            self.acc |= bits << (available - take);
            self.bit += take;
            remaining -= take;
            if self.bit == 8 {
                self.out.push(self.acc);
                self.acc = 0;
                self.bit = 0;
            }
        }
    }

    fn pad(&mut self, bits: usize) {
        let mut remaining = bits;
        while remaining > 0 {
            if self.bit == 0 && remaining >= 8 {
                self.out.extend(std::iter::repeat_n(0u8, remaining / 8));
                remaining %= 8;
                continue;
            }
            let take = (8 - self.bit as usize).min(remaining);
            self.bit += take as u32;
            remaining -= take;
            if self.bit == 8 {
                self.out.push(self.acc);
                self.acc = 0;
                self.bit = 0;
            }
        }
    }

    fn flush(&mut self) {
        if self.bit != 0 {
            self.out.push(self.acc);
            self.acc = 0;
            self.bit = 0;
        }
    }
}

// === Import ===

fn from_colormap(colormap: &[PixelPacket], raw: usize, slot: &mut Quantum, clamped: &mut bool) -> PixelPacket {
    let (index, out_of_range) = constrain_index(raw, colormap.len());
    *clamped |= out_of_range;
    *slot = index as Quantum;
    colormap.get(index).copied().unwrap_or_default()
}

/// Unpacks rows of `kind` samples into the pending pixel window. Each row of
/// the window consumes [`QuantumInfo::row_bytes`] bytes. Returns the bytes
/// consumed.
///
/// Out-of-range colormap indexes are clamped and reported once per call as
/// an `InvalidColormapIndex` warning on the image.
pub fn import_pixels(
    image: &mut Image,
    qi: &QuantumInfo,
    kind: QuantumType,
    data: &[u8],
) -> IoResult<usize> {
    let width = image.pixel_window().map(|w| w.width).unwrap_or(0);
    import_window(image, qi, kind, data, qi.row_bytes(kind, width), 0)
}

fn import_window(
    image: &mut Image,
    qi: &QuantumInfo,
    kind: QuantumType,
    data: &[u8],
    stride: usize,
    skip: usize,
) -> IoResult<usize> {
    let filename = image.filename.clone();
    let Some(window) = image.pixel_window() else {
        return Err(IoError::codec(
            CodecErrorKind::CorruptImage,
            format!("{filename}: no pixel window to import into"),
        ));
    };
    let width = window.width;
    let needed = stride * (window.height - 1) + qi.row_bytes(kind, skip + width);
    if data.len() < needed {
        return Err(IoError::codec(
            CodecErrorKind::InsufficientImageDataInFile,
            filename,
        ));
    }
    let colormap = window.colormap;
    let pseudo = !colormap.is_empty() && !window.indexes.is_empty();
    let colors = colormap.len();
    let mut clamped = false;
    let mut spare: Quantum = 0.0;

    for y in 0..window.height {
        let mut reader = SampleReader::new(&data[y * stride..], qi);
        for _ in 0..skip {
            for _ in 0..kind.channels() {
                reader.next();
            }
            reader.skip(qi.pad);
        }
        for x in 0..width {
            let i = y * width + x;
            let pixel = &mut window.pixels[i];
            let slot = window.indexes.get_mut(i).unwrap_or(&mut spare);
            match kind {
                QuantumType::Gray | QuantumType::GrayAlpha => {
                    let value = qi.polarity(qi.decode(reader.next()));
                    if pseudo {
                        let raw = (value as f64 * (colors - 1) as f64 / QUANTUM_RANGE as f64).round()
                            as usize;
                        let opacity = pixel.opacity;
                        *pixel = from_colormap(colormap, raw, slot, &mut clamped);
                        pixel.opacity = opacity;
                    } else {
                        pixel.red = value;
                        pixel.green = value;
                        pixel.blue = value;
                    }
                    if kind == QuantumType::GrayAlpha {
                        pixel.opacity = QUANTUM_RANGE - qi.decode(reader.next());
                    }
                }
                QuantumType::Index | QuantumType::IndexAlpha => {
                    let raw = qi.decode_index(reader.next());
                    if pseudo {
                        *pixel = from_colormap(colormap, raw, slot, &mut clamped);
                    } else {
                        let value = scale_any_to_quantum(raw as u64, qi.depth);
                        *pixel = PixelPacket::gray(value);
                    }
                    if kind == QuantumType::IndexAlpha {
                        pixel.opacity = QUANTUM_RANGE - qi.decode(reader.next());
                    }
                }
                QuantumType::RGB | QuantumType::RGBA | QuantumType::RGBO => {
                    pixel.red = qi.decode(reader.next());
                    pixel.green = qi.decode(reader.next());
                    pixel.blue = qi.decode(reader.next());
                    match kind {
                        QuantumType::RGBA => pixel.opacity = QUANTUM_RANGE - qi.decode(reader.next()),
                        QuantumType::RGBO => pixel.opacity = qi.decode(reader.next()),
                        _ => {}
                    }
                }
                QuantumType::CMYK | QuantumType::CMYKA => {
                    pixel.red = qi.decode(reader.next());
                    pixel.green = qi.decode(reader.next());
                    pixel.blue = qi.decode(reader.next());
                    *slot = qi.decode(reader.next());
                    if kind == QuantumType::CMYKA {
                        pixel.opacity = QUANTUM_RANGE - qi.decode(reader.next());
                    }
                }
                QuantumType::Red | QuantumType::Cyan => pixel.red = qi.decode(reader.next()),
                QuantumType::Green | QuantumType::Magenta => pixel.green = qi.decode(reader.next()),
                QuantumType::Blue | QuantumType::Yellow => pixel.blue = qi.decode(reader.next()),
                QuantumType::Black => *slot = qi.decode(reader.next()),
                QuantumType::Alpha => pixel.opacity = QUANTUM_RANGE - qi.decode(reader.next()),
                QuantumType::Opacity => pixel.opacity = qi.decode(reader.next()),
            }
            reader.skip(qi.pad);
        }
    }
    if clamped {
        window.warnings.push(Warning::new(
            "quantum",
            Severity::CorruptImageWarning,
            "InvalidColormapIndex",
            filename,
        ));
    }
    Ok(needed)
}

/// Opens a one-row window at `y`, imports `data` and commits it.
pub fn import_row(
    image: &mut Image,
    qi: &QuantumInfo,
    kind: QuantumType,
    y: usize,
    data: &[u8],
) -> IoResult<usize> {
    import_row_at(image, qi, kind, y, 0, data)
}

/// Imports row `y` from a wider external row, starting `x_offset` pixels in.
/// Used when reading a sub-window of a larger raw raster.
pub fn import_row_at(
    image: &mut Image,
    qi: &QuantumInfo,
    kind: QuantumType,
    y: usize,
    x_offset: usize,
    data: &[u8],
) -> IoResult<usize> {
    let columns = image.columns();
    image.get_pixel_window(0, y, columns, 1)?;
    let consumed = import_window(image, qi, kind, data, data.len(), x_offset)?;
    image.sync_pixel_window()?;
    Ok(consumed)
}

// === Export ===

/// Packs the `width x height` region at `(x, y)` as `kind` samples, appending
/// to `out`. Each row is byte-aligned. Returns the bytes appended.
#[allow(clippy::too_many_arguments)]
pub fn export_pixels(
    image: &Image,
    qi: &QuantumInfo,
    kind: QuantumType,
    x: usize,
    y: usize,
    width: usize,
    height: usize,
    out: &mut Vec<u8>,
) -> IoResult<usize> {
    if width == 0
        || height == 0
        || x + width > image.columns()
        || y + height > image.rows()
        || !image.has_pixels()
    {
        return Err(CoreError::invalid_region(x, y, width, height, image.columns(), image.rows()).into());
    }
    let start = out.len();
    let indexes = image.indexes();
    let cmyk = image.colorspace() == Colorspace::Cmyk;
    let alpha = |p: &PixelPacket| if image.matte { QUANTUM_RANGE - p.opacity } else { QUANTUM_RANGE };
    let opacity = |p: &PixelPacket| if image.matte { p.opacity } else { 0.0 };
    let black = |i: usize| if cmyk { indexes.get(i).copied().unwrap_or(0.0) } else { 0.0 };

    for row in y..y + height {
        let mut writer = SampleWriter::new(out, qi);
        for col in x..x + width {
            let i = row * image.columns() + col;
            let p = &image.pixels()[i];
            match kind {
                QuantumType::Gray | QuantumType::GrayAlpha => {
                    writer.push(qi.encode(qi.polarity(p.intensity())));
                    if kind == QuantumType::GrayAlpha {
                        writer.push(qi.encode(alpha(p)));
                    }
                }
                QuantumType::Index | QuantumType::IndexAlpha => {
                    let index = indexes.get(i).map(|v| *v as usize).unwrap_or(0);
                    writer.push(qi.encode_index(index));
                    if kind == QuantumType::IndexAlpha {
                        writer.push(qi.encode(alpha(p)));
                    }
                }
                QuantumType::RGB | QuantumType::RGBA | QuantumType::RGBO => {
                    writer.push(qi.encode(p.red));
                    writer.push(qi.encode(p.green));
                    writer.push(qi.encode(p.blue));
                    match kind {
                        QuantumType::RGBA => writer.push(qi.encode(alpha(p))),
                        QuantumType::RGBO => writer.push(qi.encode(opacity(p))),
                        _ => {}
                    }
                }
                QuantumType::CMYK | QuantumType::CMYKA => {
                    writer.push(qi.encode(p.red));
                    writer.push(qi.encode(p.green));
                    writer.push(qi.encode(p.blue));
                    writer.push(qi.encode(black(i)));
                    if kind == QuantumType::CMYKA {
                        writer.push(qi.encode(alpha(p)));
                    }
                }
                QuantumType::Red | QuantumType::Cyan => writer.push(qi.encode(p.red)),
                QuantumType::Green | QuantumType::Magenta => writer.push(qi.encode(p.green)),
                QuantumType::Blue | QuantumType::Yellow => writer.push(qi.encode(p.blue)),
                QuantumType::Black => writer.push(qi.encode(black(i))),
                QuantumType::Alpha => writer.push(qi.encode(alpha(p))),
                QuantumType::Opacity => writer.push(qi.encode(opacity(p))),
            }
            writer.pad(qi.pad);
        }
        writer.flush();
    }
    Ok(out.len() - start)
}

/// Packs row `y` as `kind` samples into a fresh buffer.
pub fn export_row(image: &Image, qi: &QuantumInfo, kind: QuantumType, y: usize) -> IoResult<Vec<u8>> {
    let mut out = Vec::with_capacity(qi.row_bytes(kind, image.columns()));
    export_pixels(image, qi, kind, 0, y, image.columns(), 1, &mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_one_bit_rows_are_byte_aligned() {
        let mut image = Image::new(10, 2).unwrap();
        image.set_colorspace(Colorspace::Gray);
        let qi = QuantumInfo::default().with_depth(1);
        assert_eq!(qi.row_bytes(QuantumType::Gray, 10), 2);
        let data = [0b1010_0000, 0b0100_0000, 0xFF, 0xC0];
        image.get_pixel_window(0, 0, 10, 2).unwrap();
        assert_eq!(import_pixels(&mut image, &qi, QuantumType::Gray, &data).unwrap(), 4);
        image.sync_pixel_window().unwrap();
        assert_eq!(image.pixel(0, 0).unwrap().red, QUANTUM_RANGE);
        assert_eq!(image.pixel(1, 0).unwrap().red, 0.0);
        assert_eq!(image.pixel(9, 0).unwrap().red, QUANTUM_RANGE);
        assert_eq!(image.pixel(9, 1).unwrap().red, QUANTUM_RANGE);

        let mut out = Vec::new();
        export_pixels(&image, &qi, QuantumType::Gray, 0, 0, 10, 2, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_sixteen_bit_lsb() {
        let mut image = Image::new(1, 1).unwrap();
        let qi = QuantumInfo::default().with_depth(16).with_endian(Endian::Lsb);
        import_row(&mut image, &qi, QuantumType::Gray, 0, &[0x34, 0x12]).unwrap();
        assert_eq!(image.pixel(0, 0).unwrap().red, 0x1234 as Quantum);
        let out = export_row(&image, &qi, QuantumType::Gray, 0).unwrap();
        assert_eq!(out, vec![0x34, 0x12]);
        let msb = export_row(&image, &qi.clone().with_endian(Endian::Msb), QuantumType::Gray, 0).unwrap();
        assert_eq!(msb, vec![0x12, 0x34]);
    }

    #[test]
    fn test_twelve_bit_packing() {
        let mut image = Image::new(2, 1).unwrap();
        let qi = QuantumInfo::default().with_depth(12);
        let data = [0xFF, 0xF0, 0x00];
        import_row(&mut image, &qi, QuantumType::Gray, 0, &data).unwrap();
        assert_eq!(image.pixel(0, 0).unwrap().red, QUANTUM_RANGE);
        assert_eq!(image.pixel(1, 0).unwrap().red, 0.0);
        assert_eq!(export_row(&image, &qi, QuantumType::Gray, 0).unwrap(), data);
    }

    #[test]
    fn test_signed_offset_binary() {
        let mut image = Image::new(3, 1).unwrap();
        let qi = QuantumInfo::default().with_depth(8).with_format(QuantumFormat::Signed);
        import_row(&mut image, &qi, QuantumType::Gray, 0, &[0x80, 0x00, 0x7F]).unwrap();
        assert_eq!(image.pixel(0, 0).unwrap().red, 0.0);
        assert_eq!(image.pixel(2, 0).unwrap().red, QUANTUM_RANGE);
        assert_eq!(
            export_row(&image, &qi, QuantumType::Gray, 0).unwrap(),
            vec![0x80, 0x00, 0x7F]
        );
    }

    #[test]
    fn test_float_range() {
        let mut image = Image::new(2, 1).unwrap();
        let mut qi = QuantumInfo::default()
            .with_depth(32)
            .with_format(QuantumFormat::FloatingPoint)
            .with_endian(Endian::Msb);
        qi.set_range(-1.0, 1.0);
        let mut data = Vec::new();
        data.extend_from_slice(&(-1.0f32).to_be_bytes());
        data.extend_from_slice(&0.0f32.to_be_bytes());
        import_row(&mut image, &qi, QuantumType::Gray, 0, &data).unwrap();
        assert_relative_eq!(image.pixel(0, 0).unwrap().red, 0.0);
        assert_relative_eq!(image.pixel(1, 0).unwrap().red, QUANTUM_RANGE / 2.0, epsilon = 0.01);
        assert_eq!(export_row(&image, &qi, QuantumType::Gray, 0).unwrap(), data);
    }

    #[test]
    fn test_index_clamps_and_warns() {
        let mut image = Image::new(2, 1).unwrap();
        image.allocate_colormap(4).unwrap();
        let qi = QuantumInfo::default().with_depth(8);
        import_row(&mut image, &qi, QuantumType::Index, 0, &[2, 200]).unwrap();
        assert_eq!(image.index(0, 0), Some(2.0));
        assert_eq!(image.index(1, 0), Some(3.0));
        assert_eq!(image.pixel(1, 0), Some(image.colormap()[3]));
        assert_eq!(image.warnings.len(), 1);
        assert_eq!(image.warnings[0].template, "InvalidColormapIndex");
    }

    #[test]
    fn test_alpha_and_opacity_selectors() {
        let mut image = Image::new(1, 1).unwrap();
        image.matte = true;
        let qi = QuantumInfo::default();
        import_row(&mut image, &qi, QuantumType::RGBA, 0, &[1, 2, 3, 255]).unwrap();
        assert_eq!(image.pixel(0, 0).unwrap().opacity, 0.0);
        assert_eq!(export_row(&image, &qi, QuantumType::RGBO, 0).unwrap(), vec![1, 2, 3, 0]);
        image.matte = false;
        assert_eq!(export_row(&image, &qi, QuantumType::Alpha, 0).unwrap(), vec![255]);
    }

    #[test]
    fn test_cmyk_black_goes_to_indexes() {
        let mut image = Image::new(1, 1).unwrap();
        image.set_colorspace(Colorspace::Cmyk);
        let qi = QuantumInfo::default();
        import_row(&mut image, &qi, QuantumType::CMYK, 0, &[10, 20, 30, 255]).unwrap();
        assert_eq!(image.index(0, 0), Some(QUANTUM_RANGE));
        assert_eq!(export_row(&image, &qi, QuantumType::Black, 0).unwrap(), vec![255]);
    }

    #[test]
    fn test_min_is_white() {
        let mut image = Image::new(1, 1).unwrap();
        let qi = QuantumInfo::default().with_min_is_white(true);
        import_row(&mut image, &qi, QuantumType::Gray, 0, &[0]).unwrap();
        assert_eq!(image.pixel(0, 0).unwrap().red, QUANTUM_RANGE);
        assert_eq!(export_row(&image, &qi, QuantumType::Gray, 0).unwrap(), vec![0]);
    }

    #[test]
    fn test_import_row_at_offset() {
        let mut image = Image::new(2, 1).unwrap();
        let qi = QuantumInfo::default();
        import_row_at(&mut image, &qi, QuantumType::Gray, 0, 1, &[0, 255, 0, 9]).unwrap();
        assert_eq!(image.pixel(0, 0).unwrap().red, QUANTUM_RANGE);
        assert_eq!(image.pixel(1, 0).unwrap().red, 0.0);
        assert!(import_row_at(&mut image, &qi, QuantumType::Gray, 0, 3, &[0, 255, 0, 9]).is_err());
    }

    #[test]
    fn test_pad_bytes_are_skipped() {
        let mut image = Image::new(2, 1).unwrap();
        let qi = QuantumInfo::default().with_pad(8);
        assert_eq!(qi.row_bytes(QuantumType::Gray, 2), 4);
        import_row(&mut image, &qi, QuantumType::Gray, 0, &[255, 9, 0, 9]).unwrap();
        assert_eq!(image.pixel(0, 0).unwrap().red, QUANTUM_RANGE);
        assert_eq!(image.pixel(1, 0).unwrap().red, 0.0);
    }

    #[test]
    fn test_sub_byte_pad_keeps_nibbles_aligned() {
        let mut image = Image::new(3, 1).unwrap();
        let qi = QuantumInfo::default().with_depth(4).with_pad(4);
        assert_eq!(qi.row_bytes(QuantumType::Gray, 3), 3);
        import_row(&mut image, &qi, QuantumType::Gray, 0, &[0xF0, 0x00, 0xF0]).unwrap();
        assert_eq!(image.pixel(0, 0).unwrap().red, QUANTUM_RANGE);
        assert_eq!(image.pixel(1, 0).unwrap().red, 0.0);
        assert_eq!(image.pixel(2, 0).unwrap().red, QUANTUM_RANGE);

        let mut out = Vec::new();
        export_pixels(&image, &qi, QuantumType::Gray, 0, 0, 3, 1, &mut out).unwrap();
        assert_eq!(out, [0xF0, 0x00, 0xF0]);
    }

    #[test]
    fn test_short_data_is_an_error() {
        let mut image = Image::new(4, 1).unwrap();
        image.get_pixel_window(0, 0, 4, 1).unwrap();
        let err = import_pixels(&mut image, &QuantumInfo::default(), QuantumType::RGB, &[0; 5]).unwrap_err();
        assert_eq!(err.codec_kind(), Some(CodecErrorKind::InsufficientImageDataInFile));
    }

    #[test]
    fn test_options_configure_range() {
        let info = ImageInfo::default()
            .with_option("quantum:format", "floating-point")
            .with_option("quantum:minimum", "0")
            .with_option("quantum:maximum", "4");
        let mut image = Image::new(1, 1).unwrap();
        image.depth = 32;
        let qi = QuantumInfo::new(&info, &image);
        assert_eq!(qi.format, QuantumFormat::FloatingPoint);
        assert_relative_eq!(qi.scale, QUANTUM_RANGE as f64 / 4.0);
    }
}
