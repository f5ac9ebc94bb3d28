//! TIFF decoding.
//!
//! Directories are visited in chain order; each becomes one frame. The
//! frame's samples are pulled strip by strip (or tile by tile), expanded
//! by the directory's compression scheme and handed to the quantum
//! importer one row at a time. Planar files import every plane into the
//! same rows with single-channel quantum kinds.

use std::collections::HashSet;
use std::io::SeekFrom;

use pixmill_core::quantum::{clamp_to_quantum, MAGICK_EPSILON};
use pixmill_core::{
    Colorspace, Image, ImageInfo, ImageList, Interlace, OptionSource, Orientation, PixelPacket, ResolutionUnits,
    Severity, StorageClass, Warning, QUANTUM_RANGE,
};
use smallvec::SmallVec;
use tracing::{debug, trace};

use super::ifd::{read_directory, read_header, Directory, Header};
use super::tags::{
    tag, Photometric, SampleFormat, Scheme, EXTRASAMPLE_ASSOCALPHA, PREDICTOR_HORIZONTAL,
};
use super::{compress, fax, jpeg, MODULE};
use crate::blob::Blob;
use crate::coders::{allocate, warn_eof};
use crate::context::Context;
use crate::error::{CodecErrorKind, IoError, IoResult, OptionErrorKind, ResourceErrorKind};
use crate::quantum::{import_row, QuantumFormat, QuantumInfo, QuantumType};
use crate::resource::acquire_buffer;

/// Tiles may overhang the image by at most this many pixels per axis.
const MAX_TILE_OVERHANG: usize = 1024;

/// How a directory's pixels are pulled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadMethod {
    Tile,
    SingleSample,
    Rgba,
    Cmyka,
    Generic,
    Strip,
}

/// Geometry and encoding of one directory.
#[derive(Debug, Clone)]
struct Layout {
    width: usize,
    height: usize,
    bits: u32,
    samples: usize,
    extra: SmallVec<[u64; 4]>,
    photometric: Photometric,
    scheme: Scheme,
    separate: bool,
    sample_format: SampleFormat,
    predictor: u64,
    fill_lsb: bool,
    tile: Option<(usize, usize)>,
    has_strips: bool,
    rows_per_strip: usize,
    offsets: Vec<u64>,
    byte_counts: Vec<u64>,
    group3_options: u64,
    subsampling: (usize, usize),
    jpeg_tables: Option<Vec<u8>>,
}

impl Layout {
    /// Samples stored per pixel in one block.
    fn block_samples(&self) -> usize {
        if self.separate { 1 } else { self.samples }
    }

    fn planes(&self) -> usize {
        if self.separate { self.samples } else { 1 }
    }

    fn row_bytes(&self, width: usize) -> usize {
        (width * self.block_samples() * self.bits as usize).div_ceil(8)
    }

    fn is_jpeg(&self) -> bool {
        matches!(self.scheme, Scheme::Jpeg | Scheme::OldJpeg)
    }

    fn is_fax(&self) -> bool {
        matches!(self.scheme, Scheme::Fax3 | Scheme::Fax4 | Scheme::CcittRle)
    }

    /// Chroma-subsampled YCbCr stored without JPEG.
    fn is_subsampled(&self) -> bool {
        self.photometric == Photometric::YCbCr
            && !self.is_jpeg()
            && !self.separate
            && self.bits == 8
            && self.samples == 3
            && self.subsampling != (1, 1)
    }

    /// Bytes a block of `width x rows` expands to before subsampling is
    /// undone.
    fn stored_bytes(&self, width: usize, rows: usize) -> usize {
        if self.is_subsampled() {
            let (h, v) = self.subsampling;
            width.div_ceil(h) * rows.div_ceil(v) * (h * v + 2)
        } else {
            self.row_bytes(width) * rows
        }
    }
}

fn first_or(dir: &Directory, tag: u16, default: u64) -> u64 {
    dir.uints(tag)
        .and_then(|v| v.first().copied())
        .unwrap_or(default)
}

/// Largest tile extent accepted along an image axis of `extent` pixels.
fn tile_limit(extent: usize) -> usize {
    extent.next_multiple_of(16) + MAX_TILE_OVERHANG
}

fn parse_layout(dir: &Directory, info: &ImageInfo) -> IoResult<Layout> {
    let width = dir.uint_or(tag::IMAGE_WIDTH, 0) as usize;
    let height = dir.uint_or(tag::IMAGE_LENGTH, 0) as usize;
    if width == 0 || height == 0 {
        return Err(IoError::option(
            OptionErrorKind::NegativeOrZeroImageSize,
            info.filename.clone(),
        ));
    }
    let bits = first_or(dir, tag::BITS_PER_SAMPLE, 1) as u32;
    let samples = dir.uint_or(tag::SAMPLES_PER_PIXEL, 1).max(1) as usize;
    if !(1..=64).contains(&bits) || samples > 16 {
        return Err(IoError::codec(
            CodecErrorKind::ImageTypeNotSupported,
            format!("{}: {samples} samples of {bits} bits", info.filename),
        ));
    }
    let photometric = match dir.uint(tag::PHOTOMETRIC) {
        Some(code) => Photometric::from_code(code as u16),
        None if samples >= 3 => Photometric::Rgb,
        None => Photometric::MinIsBlack,
    };
    let scheme = Scheme::from_code(dir.uint_or(tag::COMPRESSION, 1) as u16);
    let tile = match (dir.uint(tag::TILE_WIDTH), dir.uint(tag::TILE_LENGTH)) {
        (Some(w), Some(h)) if dir.contains(tag::TILE_OFFSETS) => {
            if w == 0 || h == 0 {
                return Err(IoError::improper_header(info.filename.clone()));
            }
            let (w, h) = (w as usize, h as usize);
            if w > tile_limit(width) || h > tile_limit(height) {
                return Err(IoError::improper_header(format!(
                    "{}: {w}x{h} tiles for a {width}x{height} image",
                    info.filename
                )));
            }
            Some((w, h))
        }
        _ => None,
    };
    let (offset_tag, count_tag) = if tile.is_some() {
        (tag::TILE_OFFSETS, tag::TILE_BYTE_COUNTS)
    } else {
        (tag::STRIP_OFFSETS, tag::STRIP_BYTE_COUNTS)
    };
    let has_strips = tile.is_none() && dir.contains(tag::STRIP_OFFSETS);
    let mut offsets: Vec<u64> = dir.uints(offset_tag).map(|v| v.to_vec()).unwrap_or_default();
    let mut byte_counts: Vec<u64> = dir.uints(count_tag).map(|v| v.to_vec()).unwrap_or_default();
    let mut rows_per_strip = (dir.uint_or(tag::ROWS_PER_STRIP, height as u64) as usize).clamp(1, height);
    if offsets.is_empty() {
        // Old-style JPEG may only point at an interchange stream.
        match dir.uint(tag::JPEG_INTERCHANGE_FORMAT) {
            Some(start) if scheme == Scheme::OldJpeg => {
                offsets = vec![start];
                byte_counts = vec![dir.uint_or(tag::JPEG_INTERCHANGE_FORMAT_LENGTH, 0)];
                rows_per_strip = height;
            }
            _ => return Err(IoError::improper_header(info.filename.clone())),
        }
    }
    byte_counts.resize(offsets.len(), 0);
    let subsampling = match dir.uints(tag::YCBCR_SUBSAMPLING) {
        Some(v) if v.len() >= 2 => ((v[0] as usize).max(1), (v[1] as usize).max(1)),
        _ => (2, 2),
    };
    Ok(Layout {
        width,
        height,
        bits,
        samples,
        extra: dir.uints(tag::EXTRA_SAMPLES).unwrap_or_default(),
        photometric,
        scheme,
        separate: dir.uint_or(tag::PLANAR_CONFIG, 1) == 2,
        sample_format: SampleFormat::from_code(first_or(dir, tag::SAMPLE_FORMAT, 1) as u16),
        predictor: dir.uint_or(tag::PREDICTOR, 1),
        fill_lsb: dir.uint_or(tag::FILL_ORDER, 1) == 2,
        tile,
        has_strips,
        rows_per_strip,
        offsets,
        byte_counts,
        group3_options: dir.uint_or(tag::GROUP3_OPTIONS, 0),
        subsampling,
        jpeg_tables: dir.bytes(tag::JPEG_TABLES).map(<[u8]>::to_vec),
    })
}

// === Frame attributes ===

const TEXT_PROPERTIES: &[(u16, &str)] = &[
    (tag::ARTIST, "tiff:artist"),
    (tag::DATE_TIME, "tiff:timestamp"),
    (tag::SOFTWARE, "tiff:software"),
    (tag::HOST_COMPUTER, "tiff:hostcomputer"),
    (tag::DOCUMENT_NAME, "tiff:document"),
    (tag::MAKE, "tiff:make"),
    (tag::MODEL, "tiff:model"),
    (tag::COPYRIGHT, "tiff:copyright"),
    (tag::KODAK_33423, "kodak-33423"),
    (tag::KODAK_36867, "kodak-36867"),
    (tag::PAGE_NAME, "label"),
    (tag::IMAGE_DESCRIPTION, "comment"),
];

const PROFILES: &[(u16, &str)] = &[
    (tag::ICC_PROFILE, "icc"),
    (tag::PHOTOSHOP, "8bim"),
    (tag::RICH_TIFF_IPTC, "iptc"),
    (tag::XMP, "xmp"),
    (tag::IMAGE_SOURCE_DATA, "tiff:37724"),
];

fn read_metadata(dir: &Directory, layout: &Layout, image: &mut Image) {
    for &(code, key) in TEXT_PROPERTIES {
        if let Some(text) = dir.ascii(code) {
            image.properties.set(key, text);
        }
    }
    for &(code, name) in PROFILES {
        if let Some(data) = dir.bytes(code) {
            image.profiles.set(name, data.to_vec());
        }
    }
    if layout.tile.is_none() {
        image
            .properties
            .set("tiff:rows-per-strip", layout.rows_per_strip.to_string());
    }
    if let Some(pages) = dir.uints(tag::PAGE_NUMBER) {
        if let Some(&page) = pages.first() {
            image.scene = page as usize;
        }
    }
    image.orientation = Orientation::from_tag(dir.uint_or(tag::ORIENTATION, 1) as u32);
    image.endian = if layout.fill_lsb {
        pixmill_core::Endian::Lsb
    } else {
        pixmill_core::Endian::Msb
    };
    image.compression = layout.scheme.compression();
    if let (Some(x), Some(y)) = (dir.float(tag::X_RESOLUTION), dir.float(tag::Y_RESOLUTION)) {
        image.x_resolution = x;
        image.y_resolution = y;
    }
    let unit = dir.uint_or(tag::RESOLUTION_UNIT, 2) as i64;
    image.units = ResolutionUnits::from_index(unit - 1);
    if let Some(x) = dir.float(tag::X_POSITION) {
        image.page.x = (x * image.x_resolution + 0.5) as i64;
    }
    if let Some(y) = dir.float(tag::Y_POSITION) {
        image.page.y = (y * image.y_resolution + 0.5) as i64;
    }
    if let Some(primaries) = dir.floats(tag::PRIMARY_CHROMATICITIES) {
        if primaries.len() >= 6 {
            let c = &mut image.chromaticity;
            c.red_primary.x = primaries[0];
            c.red_primary.y = primaries[1];
            c.green_primary.x = primaries[2];
            c.green_primary.y = primaries[3];
            c.blue_primary.x = primaries[4];
            c.blue_primary.y = primaries[5];
        }
    }
    if let Some(white) = dir.floats(tag::WHITE_POINT) {
        if white.len() >= 2 {
            image.chromaticity.white_point.x = white[0];
            image.chromaticity.white_point.y = white[1];
        }
    }
    if layout.is_jpeg() {
        let (h, v) = layout.subsampling;
        image.properties.set("jpeg:sampling-factor", format!("{h}x{v}"));
    }
}

/// Sets colorspace and matte, returning whether alpha is premultiplied.
fn classify(info: &ImageInfo, layout: &Layout, image: &mut Image) -> IoResult<bool> {
    let colorspace = match layout.photometric {
        Photometric::MinIsWhite | Photometric::MinIsBlack => Colorspace::Gray,
        Photometric::Palette => Colorspace::Rgb,
        Photometric::Separated => Colorspace::Cmyk,
        Photometric::CieLab => Colorspace::Lab,
        // The JPEG decoder hands back RGB.
        Photometric::YCbCr if layout.is_jpeg() => Colorspace::Rgb,
        Photometric::YCbCr => Colorspace::YCbCr,
        Photometric::Rgb => Colorspace::Rgb,
        Photometric::Mask | Photometric::Other(_) => {
            return Err(IoError::codec(
                CodecErrorKind::ImageTypeNotSupported,
                format!("{}: photometric {}", info.filename, layout.photometric.code()),
            ));
        }
    };
    image.set_colorspace(colorspace);
    image.interlace = if layout.separate { Interlace::Plane } else { Interlace::None };
    image.matte = !layout.extra.is_empty()
        || (layout.photometric == Photometric::Rgb && layout.samples == 4);
    let mut associated = layout.extra.first() == Some(&EXTRASAMPLE_ASSOCALPHA);
    if let Some(mode) = info.option("tiff:alpha") {
        match mode.trim().to_ascii_lowercase().as_str() {
            "associate" | "associated" => associated = true,
            "unassociate" | "unassociated" => associated = false,
            _ => {}
        }
    }
    if image.matte {
        let label = match layout.extra.first() {
            Some(_) if associated => "associated",
            None if associated => "associated",
            Some(&code) if code == super::tags::EXTRASAMPLE_UNASSALPHA => "unassociated",
            _ => "unspecified",
        };
        image.properties.set("tiff:alpha", label);
    }
    Ok(image.matte && associated)
}

/// Installs the palette, or a two-entry map for bilevel gray.
fn install_colormap(dir: &Directory, layout: &Layout, image: &mut Image) -> IoResult<()> {
    match layout.photometric {
        Photometric::Palette if layout.samples <= 2 => {
            if layout.bits > 16 {
                return Err(IoError::codec(
                    CodecErrorKind::ImageTypeNotSupported,
                    format!("{}-bit palette", layout.bits),
                ));
            }
            let colors = 1usize << layout.bits;
            match dir.uints(tag::COLOR_MAP) {
                Some(values) if values.len() >= 3 * colors => {
                    let legacy = values.iter().all(|&v| v < 256);
                    let range = if legacy { 255.0 } else { 65535.0 };
                    let scale = |v: u64| (v as f64 * QUANTUM_RANGE as f64 / range) as f32;
                    let colormap = (0..colors)
                        .map(|i| {
                            PixelPacket::rgb(
                                scale(values[i]),
                                scale(values[colors + i]),
                                scale(values[2 * colors + i]),
                            )
                        })
                        .collect();
                    image.set_colormap(colormap)?;
                }
                _ => image.allocate_colormap(colors)?,
            }
        }
        Photometric::MinIsWhite | Photometric::MinIsBlack
            if layout.bits == 1 && layout.samples == 1 =>
        {
            image.allocate_colormap(2)?;
        }
        _ => {}
    }
    Ok(())
}

fn quantum_info(info: &ImageInfo, header: &Header, dir: &Directory, layout: &Layout, image: &mut Image) -> QuantumInfo {
    let mut qi = QuantumInfo::new(info, image)
        .with_depth(layout.bits)
        .with_endian(header.endian)
        .with_min_is_white(layout.photometric == Photometric::MinIsWhite);
    match layout.sample_format {
        SampleFormat::IeeeFp => {
            qi.format = QuantumFormat::FloatingPoint;
            let min = dir.float(tag::S_MIN_SAMPLE_VALUE);
            let max = dir.float(tag::S_MAX_SAMPLE_VALUE);
            match (min, max) {
                (Some(min), Some(max)) if max > min => {
                    qi.set_range(min, max);
                    image.properties.set("quantum:minimum", min.to_string());
                    image.properties.set("quantum:maximum", max.to_string());
                }
                _ => qi.set_range(0.0, 1.0),
            }
        }
        SampleFormat::Int => qi.format = QuantumFormat::Signed,
        _ => {}
    }
    if qi.format != QuantumFormat::Undefined {
        image.properties.set("quantum:format", qi.format.as_str());
    }
    if qi.min_is_white {
        image.properties.set("quantum:polarity", "min-is-white");
    }
    qi
}

fn select_method(layout: &Layout, image: &Image) -> ReadMethod {
    if layout.tile.is_some() {
        return ReadMethod::Tile;
    }
    if image.storage_class() == StorageClass::Pseudo {
        return ReadMethod::SingleSample;
    }
    if matches!(layout.photometric, Photometric::MinIsBlack | Photometric::MinIsWhite) {
        return ReadMethod::SingleSample;
    }
    if layout.samples >= 2 && !layout.separate {
        return ReadMethod::Rgba;
    }
    if layout.samples >= 2 && layout.separate {
        return ReadMethod::Cmyka;
    }
    if !matches!(layout.photometric, Photometric::Rgb | Photometric::Separated) {
        return ReadMethod::Generic;
    }
    if layout.has_strips {
        return ReadMethod::Strip;
    }
    ReadMethod::Generic
}

// === Import kinds ===

/// Quantum kind and pad bits for interleaved samples.
fn contiguous_kind(layout: &Layout, image: &Image) -> (QuantumType, usize) {
    let alpha = image.matte;
    let kind = if image.storage_class() == StorageClass::Pseudo
        && layout.photometric == Photometric::Palette
    {
        if alpha && layout.samples >= 2 { QuantumType::IndexAlpha } else { QuantumType::Index }
    } else if image.colorspace() == Colorspace::Gray {
        if alpha && layout.samples >= 2 { QuantumType::GrayAlpha } else { QuantumType::Gray }
    } else if image.colorspace() == Colorspace::Cmyk {
        if alpha && layout.samples >= 5 { QuantumType::CMYKA } else { QuantumType::CMYK }
    } else if layout.samples >= 3 || layout.is_jpeg() {
        if alpha && layout.samples >= 4 { QuantumType::RGBA } else { QuantumType::RGB }
    } else {
        QuantumType::Gray
    };
    let unused = layout.samples.saturating_sub(kind.channels());
    let pad = if layout.is_jpeg() { 0 } else { unused * layout.bits as usize };
    (kind, pad)
}

/// Quantum kind for each stored plane; `None` planes are skipped.
fn plane_kinds(layout: &Layout, image: &Image) -> Vec<Option<QuantumType>> {
    let color: &[QuantumType] = if image.colorspace() == Colorspace::Cmyk {
        &[QuantumType::Cyan, QuantumType::Magenta, QuantumType::Yellow, QuantumType::Black]
    } else if image.storage_class() == StorageClass::Pseudo
        && layout.photometric == Photometric::Palette
    {
        &[QuantumType::Index]
    } else if image.colorspace() == Colorspace::Gray || layout.samples < 3 {
        &[QuantumType::Gray]
    } else {
        &[QuantumType::Red, QuantumType::Green, QuantumType::Blue]
    };
    (0..layout.samples)
        .map(|plane| match color.get(plane) {
            Some(&kind) => Some(kind),
            None if plane == color.len() && image.matte => Some(QuantumType::Alpha),
            None => None,
        })
        .collect()
}

// === Blocks ===

/// Reads and expands one strip or tile to `row_bytes(width) * rows` bytes.
#[allow(clippy::too_many_arguments)]
fn read_block(
    blob: &mut Blob,
    ctx: &Context,
    image: &mut Image,
    header: &Header,
    layout: &Layout,
    index: usize,
    width: usize,
    rows: usize,
) -> IoResult<Vec<u8>> {
    let expected = layout.row_bytes(width).checked_mul(rows).ok_or_else(|| {
        IoError::resource(
            ResourceErrorKind::AllocationFailed,
            format!("{}: {width}x{rows} block", image.filename),
        )
    })?;
    let (Some(&offset), Some(&count)) = (layout.offsets.get(index), layout.byte_counts.get(index)) else {
        warn_eof(ctx, image, MODULE);
        return acquire_buffer(expected);
    };
    let size = blob.size()?;
    if offset >= size {
        warn_eof(ctx, image, MODULE);
        return acquire_buffer(expected);
    }
    let available = size - offset;
    if count > available {
        warn_eof(ctx, image, MODULE);
    }
    let count = if count == 0 { available } else { count.min(available) };
    blob.seek_to(SeekFrom::Start(offset))?;
    let mut raw = blob.read_up_to(count as usize)?;
    if (raw.len() as u64) < count {
        warn_eof(ctx, image, MODULE);
    }
    if layout.fill_lsb {
        compress::reverse_bits(&mut raw);
    }
    trace!(index, offset, count, "tiff block");

    let mut data = match layout.scheme {
        Scheme::Fax3 => fax::decode_g3(&raw, width, rows, layout.group3_options)?,
        Scheme::Fax4 => fax::decode_g4(&raw, width, rows)?,
        Scheme::CcittRle => fax::decode_mh(&raw, width, rows)?,
        Scheme::Jpeg | Scheme::OldJpeg => {
            let decoded = jpeg::decode(&raw, layout.jpeg_tables.as_deref())?;
            restride(&decoded, width * layout.block_samples(), rows)
        }
        scheme => compress::decode(scheme, &raw, layout.stored_bytes(width, rows))?,
    };
    if layout.predictor == PREDICTOR_HORIZONTAL && !layout.is_jpeg() && !layout.is_fax() {
        let row_bytes = layout.row_bytes(width);
        compress::undo_predictor(&mut data, row_bytes, layout.block_samples(), layout.bits, header.endian)?;
    }
    if layout.is_subsampled() {
        let (h, v) = layout.subsampling;
        data = expand_ycbcr(&data, width, rows, h, v);
    }
    if data.len() < expected {
        warn_eof(ctx, image, MODULE);
        data.try_reserve_exact(expected - data.len()).map_err(|e| {
            IoError::resource(ResourceErrorKind::AllocationFailed, format!("{}: {e}", image.filename))
        })?;
        data.resize(expected, 0);
    }
    Ok(data)
}

/// Copies decoded JPEG rows into a buffer of `row_bytes * rows`.
fn restride(decoded: &jpeg::Decoded, row_bytes: usize, rows: usize) -> Vec<u8> {
    let stride = decoded.width * decoded.components;
    let mut out = vec![0u8; row_bytes * rows];
    if stride == 0 {
        return out;
    }
    let take = stride.min(row_bytes);
    for (dst, src) in out.chunks_mut(row_bytes).zip(decoded.data.chunks(stride)) {
        let n = take.min(src.len());
        dst[..n].copy_from_slice(&src[..n]);
    }
    out
}

/// Expands `h x v` luma blocks with one chroma pair into interleaved
/// `Y Cb Cr` triplets.
fn expand_ycbcr(data: &[u8], width: usize, rows: usize, h: usize, v: usize) -> Vec<u8> {
    let across = width.div_ceil(h);
    let unit = h * v + 2;
    let mut out = vec![0u8; width * rows * 3];
    for (u, block) in data.chunks_exact(unit).enumerate() {
        let ux = (u % across) * h;
        let uy = (u / across) * v;
        let (cb, cr) = (block[h * v], block[h * v + 1]);
        for j in 0..v {
            for i in 0..h {
                let (x, y) = (ux + i, uy + j);
                if x < width && y < rows {
                    let o = (y * width + x) * 3;
                    out[o] = block[j * h + i];
                    out[o + 1] = cb;
                    out[o + 2] = cr;
                }
            }
        }
    }
    out
}

// === Pixel transfer ===

struct Transfer<'a> {
    layout: &'a Layout,
    header: &'a Header,
    contiguous: (QuantumType, QuantumInfo),
    planes: Vec<Option<(QuantumType, QuantumInfo)>>,
}

impl<'a> Transfer<'a> {
    fn new(layout: &'a Layout, header: &'a Header, qi: &QuantumInfo, image: &Image) -> Self {
        let (kind, pad) = contiguous_kind(layout, image);
        let mut contiguous_qi = qi.clone().with_pad(pad);
        if layout.is_jpeg() {
            contiguous_qi = contiguous_qi.with_depth(8);
        }
        let planes = plane_kinds(layout, image)
            .into_iter()
            .map(|kind| kind.map(|k| (k, qi.clone().with_pad(0))))
            .collect();
        Self {
            layout,
            header,
            contiguous: (kind, contiguous_qi),
            planes,
        }
    }

    /// Imports `rows` rows of one plane starting at image row `y`.
    fn import(&self, image: &mut Image, plane: usize, band: &[u8], stride: usize, y: usize, rows: usize) -> IoResult<()> {
        let (kind, qi) = if self.layout.separate {
            match self.planes.get(plane) {
                Some(Some((kind, qi))) => (*kind, qi),
                _ => return Ok(()),
            }
        } else {
            (self.contiguous.0, &self.contiguous.1)
        };
        for (r, row) in band.chunks(stride).take(rows).enumerate() {
            import_row(image, qi, kind, y + r, row)?;
        }
        Ok(())
    }
}

fn read_strips(
    blob: &mut Blob,
    ctx: &Context,
    image: &mut Image,
    transfer: &Transfer<'_>,
    whole: bool,
) -> IoResult<()> {
    let layout = transfer.layout;
    let rps = layout.rows_per_strip;
    let strips = layout.height.div_ceil(rps);
    let stride = layout.row_bytes(layout.width);
    for plane in 0..layout.planes() {
        let mut band = Vec::new();
        for s in 0..strips {
            let y = s * rps;
            let rows = rps.min(layout.height - y);
            let index = plane * strips + s;
            let block = read_block(blob, ctx, image, transfer.header, layout, index, layout.width, rows)?;
            if whole {
                band.extend_from_slice(&block[..stride * rows]);
                continue;
            }
            transfer.import(image, plane, &block, stride, y, rows)?;
            if plane == 0 {
                ctx.progress(MODULE, (y + rows) as u64, layout.height as u64)?;
            }
        }
        if whole {
            transfer.import(image, plane, &band, stride, 0, layout.height)?;
            ctx.progress(MODULE, (plane + 1) as u64, layout.planes() as u64)?;
        }
    }
    Ok(())
}

fn read_tiles(blob: &mut Blob, ctx: &Context, image: &mut Image, transfer: &Transfer<'_>) -> IoResult<()> {
    let layout = transfer.layout;
    let Some((tw, th)) = layout.tile else {
        return Err(IoError::codec(CodecErrorKind::ImageIsNotTiled, image.filename.clone()));
    };
    let across = layout.width.div_ceil(tw);
    let down = layout.height.div_ceil(th);
    if across > 1 && (tw * layout.block_samples() * layout.bits as usize) % 8 != 0 {
        return Err(IoError::codec(
            CodecErrorKind::ImageTypeNotSupported,
            format!("{}: tile width {tw} is not byte aligned", image.filename),
        ));
    }
    image.extract_info.width = tw;
    image.extract_info.height = th;
    let stride = layout.row_bytes(layout.width);
    let tile_stride = layout.row_bytes(tw);
    for ty in 0..down {
        let y = ty * th;
        let rows = th.min(layout.height - y);
        for plane in 0..layout.planes() {
            let mut band = vec![0u8; stride * rows];
            for tx in 0..across {
                let index = plane * across * down + ty * across + tx;
                let tile = read_block(blob, ctx, image, transfer.header, layout, index, tw, th)?;
                let x = tx * tw;
                let columns = tw.min(layout.width - x);
                let start = layout.row_bytes(x);
                let span = layout.row_bytes(columns).min(stride - start);
                for r in 0..rows {
                    let src = &tile[r * tile_stride..r * tile_stride + span];
                    band[r * stride + start..r * stride + start + span].copy_from_slice(src);
                }
            }
            transfer.import(image, plane, &band, stride, y, rows)?;
        }
        ctx.progress(MODULE, (y + rows) as u64, layout.height as u64)?;
    }
    Ok(())
}

/// Divides color by alpha, leaving fully transparent pixels alone.
fn disassociate_alpha(image: &mut Image) {
    let range = QUANTUM_RANGE as f64;
    for p in image.pixels_mut() {
        let alpha = (range - p.opacity as f64) / range;
        if alpha.abs() <= MAGICK_EPSILON {
            continue;
        }
        let gamma = 1.0 / alpha;
        p.red = clamp_to_quantum(gamma * p.red as f64);
        p.green = clamp_to_quantum(gamma * p.green as f64);
        p.blue = clamp_to_quantum(gamma * p.blue as f64);
    }
}

// === Decoding ===

fn read_frame(
    info: &ImageInfo,
    blob: &mut Blob,
    ctx: &mut Context,
    header: &Header,
    dir: &Directory,
    image: &mut Image,
) -> IoResult<()> {
    let layout = parse_layout(dir, info)?;
    if !compress::is_supported(layout.scheme) {
        return Err(IoError::codec(
            CodecErrorKind::CompressionNotSupported,
            format!("{}: compression {}", info.filename, layout.scheme.code()),
        ));
    }
    image.depth = layout.bits;
    read_metadata(dir, &layout, image);
    let associated = classify(info, &layout, image)?;
    let qi = quantum_info(info, header, dir, &layout, image);
    allocate(image, info, layout.width, layout.height)?;
    install_colormap(dir, &layout, image)?;
    let method = select_method(&layout, image);
    debug!(
        width = layout.width,
        height = layout.height,
        bits = layout.bits,
        samples = layout.samples,
        photometric = ?layout.photometric,
        compression = ?layout.scheme,
        ?method,
        "tiff directory"
    );
    if info.ping {
        return Ok(());
    }
    let transfer = Transfer::new(&layout, header, &qi, image);
    match method {
        ReadMethod::Tile => read_tiles(blob, ctx, image, &transfer)?,
        ReadMethod::Generic => read_strips(blob, ctx, image, &transfer, true)?,
        ReadMethod::SingleSample | ReadMethod::Rgba | ReadMethod::Cmyka | ReadMethod::Strip => {
            read_strips(blob, ctx, image, &transfer, false)?
        }
    }
    if associated {
        disassociate_alpha(image);
    }
    Ok(())
}

/// Reads the directories selected by `scene` / `number_scenes` as frames.
pub fn decode(info: &ImageInfo, blob: &mut Blob, ctx: &mut Context) -> IoResult<ImageList> {
    let header = read_header(blob)?;
    debug!(endian = ?header.endian, big = header.big, first = header.first, "tiff header");
    let mut list = ImageList::new();
    let mut visited = HashSet::new();
    let mut offset = header.first;
    let mut index = 0usize;
    while offset != 0 {
        if !visited.insert(offset) {
            ctx.warn(Warning::new(
                MODULE,
                Severity::CorruptImageWarning,
                "DirectoryLoopDetected",
                info.filename.clone(),
            ));
            break;
        }
        let dir = read_directory(blob, &header, offset)?;
        offset = dir.next;
        if index < info.scene {
            index += 1;
            continue;
        }
        let mut image = Image::from_info(info);
        image.scene = index;
        read_frame(info, blob, ctx, &header, &dir, &mut image)?;
        list.append(image);
        if info.scene_limit_reached(index) {
            break;
        }
        index += 1;
    }
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coders::tiff::ifd::FileWriter;
    use crate::coders::tiff::tags::EXTRASAMPLE_UNASSALPHA;
    use pixmill_core::Endian;

    fn decode_bytes(data: Vec<u8>, info: &ImageInfo) -> (ImageList, Context) {
        let mut blob = Blob::from_memory(data);
        let mut ctx = Context::new();
        let list = decode(info, &mut blob, &mut ctx).unwrap();
        (list, ctx)
    }

    fn gray_file(endian: Endian, strips: &[&[u8]], width: u32, rows_per_strip: u32, photometric: u16) -> Vec<u8> {
        let mut file = FileWriter::new(endian, false);
        let offsets: Vec<u64> = strips.iter().map(|s| file.append(s)).collect();
        let counts: Vec<u64> = strips.iter().map(|s| s.len() as u64).collect();
        let height = strips.iter().map(|s| s.len() as u32).sum::<u32>() / width;
        let mut dir = file.directory();
        dir.long(tag::IMAGE_WIDTH, &[width]);
        dir.long(tag::IMAGE_LENGTH, &[height]);
        dir.short(tag::BITS_PER_SAMPLE, &[8]);
        dir.short(tag::PHOTOMETRIC, &[photometric]);
        dir.long(tag::ROWS_PER_STRIP, &[rows_per_strip]);
        dir.offsets(tag::STRIP_OFFSETS, &offsets).unwrap();
        dir.offsets(tag::STRIP_BYTE_COUNTS, &counts).unwrap();
        dir.ascii(tag::ARTIST, "pixmill");
        file.write_directory(dir).unwrap();
        file.finish()
    }

    #[test]
    fn test_gray_strips() {
        let data = gray_file(Endian::Msb, &[&[0, 255], &[128, 64]], 2, 1, 1);
        let (list, _) = decode_bytes(data, &ImageInfo::new("g.tif"));
        let image = list.first().unwrap();
        assert_eq!((image.columns(), image.rows()), (2, 2));
        assert_eq!(image.colorspace(), Colorspace::Gray);
        assert_eq!(image.pixel(1, 0).unwrap().red, QUANTUM_RANGE);
        assert_eq!(image.pixel(1, 1).unwrap().red, 64.0 * 257.0);
        assert_eq!(image.properties.get("tiff:artist"), Some("pixmill"));
        assert_eq!(image.properties.get("tiff:rows-per-strip"), Some("1"));
    }

    #[test]
    fn test_oversized_strip_count_is_clamped() {
        let mut file = FileWriter::new(Endian::Lsb, true);
        let strip = file.append(&[77]);
        let mut dir = file.directory();
        dir.long(tag::IMAGE_WIDTH, &[1]);
        dir.long(tag::IMAGE_LENGTH, &[1]);
        dir.short(tag::BITS_PER_SAMPLE, &[8]);
        dir.short(tag::PHOTOMETRIC, &[1]);
        dir.offsets(tag::STRIP_OFFSETS, &[strip]).unwrap();
        dir.offsets(tag::STRIP_BYTE_COUNTS, &[1 << 62]).unwrap();
        file.write_directory(dir).unwrap();
        let (list, _) = decode_bytes(file.finish(), &ImageInfo::new("big.tif"));
        let image = list.first().unwrap();
        assert_eq!(image.pixel(0, 0).unwrap().red, 77.0 * 257.0);
        assert!(!image.warnings.is_empty());
    }

    #[test]
    fn test_oversized_tiles_are_rejected() {
        let mut file = FileWriter::new(Endian::Lsb, false);
        let tile = file.append(&[0; 16]);
        let mut dir = file.directory();
        dir.long(tag::IMAGE_WIDTH, &[1]);
        dir.long(tag::IMAGE_LENGTH, &[1]);
        dir.short(tag::BITS_PER_SAMPLE, &[8]);
        dir.short(tag::PHOTOMETRIC, &[1]);
        dir.long(tag::TILE_WIDTH, &[0x4000_0000]);
        dir.long(tag::TILE_LENGTH, &[0x4000_0000]);
        dir.offsets(tag::TILE_OFFSETS, &[tile]).unwrap();
        dir.offsets(tag::TILE_BYTE_COUNTS, &[16]).unwrap();
        file.write_directory(dir).unwrap();
        let err = decode(&ImageInfo::new("t.tif"), &mut Blob::from_memory(file.finish()), &mut Context::new())
            .unwrap_err();
        assert_eq!(err.codec_kind(), Some(CodecErrorKind::ImproperImageHeader));
    }

    #[test]
    fn test_nibble_extra_sample_is_skipped() {
        // Gray, alpha and one unspecified sample at 4 bits each.
        let mut file = FileWriter::new(Endian::Msb, false);
        let strip = file.append(&[0xFF, 0x00, 0xFF]);
        let mut dir = file.directory();
        dir.long(tag::IMAGE_WIDTH, &[2]);
        dir.long(tag::IMAGE_LENGTH, &[1]);
        dir.short(tag::BITS_PER_SAMPLE, &[4, 4, 4]);
        dir.short(tag::SAMPLES_PER_PIXEL, &[3]);
        dir.short(tag::PHOTOMETRIC, &[1]);
        dir.short(tag::EXTRA_SAMPLES, &[EXTRASAMPLE_UNASSALPHA as u16, 0]);
        dir.offsets(tag::STRIP_OFFSETS, &[strip]).unwrap();
        dir.offsets(tag::STRIP_BYTE_COUNTS, &[3]).unwrap();
        file.write_directory(dir).unwrap();
        let (list, _) = decode_bytes(file.finish(), &ImageInfo::new("n.tif"));
        let image = list.first().unwrap();
        assert!(image.matte);
        assert_eq!(image.pixel(0, 0), Some(PixelPacket::WHITE));
        assert_eq!(image.pixel(1, 0), Some(PixelPacket::BLACK));
    }

    #[test]
    fn test_tile_limit_allows_overhang() {
        assert!(256 <= tile_limit(10));
        assert!(0x4000_0000 > tile_limit(1));
    }

    #[test]
    fn test_min_is_white_inverts() {
        let data = gray_file(Endian::Lsb, &[&[0, 255]], 2, 1, 0);
        let (list, _) = decode_bytes(data, &ImageInfo::new("w.tif"));
        let image = list.first().unwrap();
        assert_eq!(image.pixel(0, 0), Some(PixelPacket::WHITE));
        assert_eq!(image.pixel(1, 0), Some(PixelPacket::BLACK));
    }

    #[test]
    fn test_ping_reads_no_pixels() {
        let data = gray_file(Endian::Lsb, &[&[1, 2, 3, 4]], 2, 2, 1);
        let (list, _) = decode_bytes(data, &ImageInfo::new("p.tif").with_ping(true));
        let image = list.first().unwrap();
        assert_eq!((image.columns(), image.rows()), (2, 2));
        assert!(!image.has_pixels());
    }

    #[test]
    fn test_palette_legacy_colormap() {
        let mut file = FileWriter::new(Endian::Lsb, false);
        let strip = file.append(&[0x01]);
        let mut dir = file.directory();
        dir.long(tag::IMAGE_WIDTH, &[2]);
        dir.long(tag::IMAGE_LENGTH, &[1]);
        dir.short(tag::BITS_PER_SAMPLE, &[4]);
        dir.short(tag::PHOTOMETRIC, &[3]);
        let mut map = vec![0u16; 48];
        map[1] = 255;
        dir.short(tag::COLOR_MAP, &map);
        dir.offsets(tag::STRIP_OFFSETS, &[strip]).unwrap();
        dir.offsets(tag::STRIP_BYTE_COUNTS, &[1]).unwrap();
        file.write_directory(dir).unwrap();
        let (list, _) = decode_bytes(file.finish(), &ImageInfo::new("p.tif"));
        let image = list.first().unwrap();
        assert_eq!(image.storage_class(), StorageClass::Pseudo);
        assert_eq!(image.colormap().len(), 16);
        assert_eq!(image.index(1, 0), Some(1.0));
        assert_eq!(image.pixel(1, 0), Some(PixelPacket::rgb(QUANTUM_RANGE, 0.0, 0.0)));
    }

    #[test]
    fn test_planar_cmyk() {
        let mut file = FileWriter::new(Endian::Msb, false);
        let planes: [&[u8]; 4] = [&[255, 0], &[0, 255], &[10, 20], &[30, 40]];
        let offsets: Vec<u64> = planes.iter().map(|p| file.append(p)).collect();
        let mut dir = file.directory();
        dir.long(tag::IMAGE_WIDTH, &[2]);
        dir.long(tag::IMAGE_LENGTH, &[1]);
        dir.short(tag::BITS_PER_SAMPLE, &[8, 8, 8, 8]);
        dir.short(tag::SAMPLES_PER_PIXEL, &[4]);
        dir.short(tag::PHOTOMETRIC, &[5]);
        dir.short(tag::PLANAR_CONFIG, &[2]);
        dir.offsets(tag::STRIP_OFFSETS, &offsets).unwrap();
        dir.offsets(tag::STRIP_BYTE_COUNTS, &[2, 2, 2, 2]).unwrap();
        file.write_directory(dir).unwrap();
        let (list, _) = decode_bytes(file.finish(), &ImageInfo::new("c.tif"));
        let image = list.first().unwrap();
        assert_eq!(image.colorspace(), Colorspace::Cmyk);
        assert_eq!(image.pixel(0, 0).unwrap().red, QUANTUM_RANGE);
        assert_eq!(image.pixel(1, 0).unwrap().green, QUANTUM_RANGE);
        assert_eq!(image.index(1, 0), Some(40.0 * 257.0));
    }

    #[test]
    fn test_partial_tiles() {
        // 3x3 image in 2x2 tiles.
        let mut file = FileWriter::new(Endian::Lsb, false);
        let tiles: [[u8; 4]; 4] = [[1, 2, 4, 5], [3, 0, 6, 0], [7, 8, 0, 0], [9, 0, 0, 0]];
        let offsets: Vec<u64> = tiles.iter().map(|t| file.append(t)).collect();
        let mut dir = file.directory();
        dir.long(tag::IMAGE_WIDTH, &[3]);
        dir.long(tag::IMAGE_LENGTH, &[3]);
        dir.short(tag::BITS_PER_SAMPLE, &[8]);
        dir.short(tag::PHOTOMETRIC, &[1]);
        dir.long(tag::TILE_WIDTH, &[2]);
        dir.long(tag::TILE_LENGTH, &[2]);
        dir.offsets(tag::TILE_OFFSETS, &offsets).unwrap();
        dir.offsets(tag::TILE_BYTE_COUNTS, &[4, 4, 4, 4]).unwrap();
        file.write_directory(dir).unwrap();
        let (list, _) = decode_bytes(file.finish(), &ImageInfo::new("t.tif"));
        let image = list.first().unwrap();
        let values: Vec<f32> = image.pixels().iter().map(|p| p.red / 257.0).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        assert_eq!(image.extract_info.width, 2);
    }

    fn rgba_file(extra: u16, pixel: [u8; 4]) -> Vec<u8> {
        let mut file = FileWriter::new(Endian::Lsb, false);
        let strip = file.append(&pixel);
        let mut dir = file.directory();
        dir.long(tag::IMAGE_WIDTH, &[1]);
        dir.long(tag::IMAGE_LENGTH, &[1]);
        dir.short(tag::BITS_PER_SAMPLE, &[8, 8, 8, 8]);
        dir.short(tag::SAMPLES_PER_PIXEL, &[4]);
        dir.short(tag::PHOTOMETRIC, &[2]);
        dir.short(tag::EXTRA_SAMPLES, &[extra]);
        dir.offsets(tag::STRIP_OFFSETS, &[strip]).unwrap();
        dir.offsets(tag::STRIP_BYTE_COUNTS, &[4]).unwrap();
        file.write_directory(dir).unwrap();
        file.finish()
    }

    #[test]
    fn test_associated_alpha_is_divided_out() {
        let data = rgba_file(EXTRASAMPLE_ASSOCALPHA as u16, [64, 0, 128, 128]);
        let (list, _) = decode_bytes(data, &ImageInfo::new("a.tif"));
        let image = list.first().unwrap();
        assert!(image.matte);
        assert_eq!(image.properties.get("tiff:alpha"), Some("associated"));
        let p = image.pixel(0, 0).unwrap();
        let alpha = 128.0 / 255.0;
        assert!((p.red as f64 - 64.0 * 257.0 / alpha).abs() < 1.0);
        assert!((p.blue as f64 - QUANTUM_RANGE as f64).abs() < 1.0);
    }

    #[test]
    fn test_alpha_override() {
        let data = rgba_file(EXTRASAMPLE_UNASSALPHA as u16, [64, 0, 128, 128]);
        let (list, _) = decode_bytes(data.clone(), &ImageInfo::new("u.tif"));
        assert_eq!(list.first().unwrap().pixel(0, 0).unwrap().red, 64.0 * 257.0);
        let info = ImageInfo::new("u.tif").with_option("tiff:alpha", "associate");
        let (list, _) = decode_bytes(data, &info);
        assert!(list.first().unwrap().pixel(0, 0).unwrap().red > 64.0 * 257.0);
    }

    #[test]
    fn test_transparent_pixel_untouched() {
        let data = rgba_file(EXTRASAMPLE_ASSOCALPHA as u16, [10, 20, 30, 0]);
        let (list, _) = decode_bytes(data, &ImageInfo::new("a.tif"));
        let p = list.first().unwrap().pixel(0, 0).unwrap();
        assert_eq!((p.red, p.opacity), (10.0 * 257.0, QUANTUM_RANGE));
    }

    #[test]
    fn test_scene_selection_and_loop() {
        let mut file = FileWriter::new(Endian::Lsb, false);
        for value in [10u8, 20, 30] {
            let strip = file.append(&[value]);
            let mut dir = file.directory();
            dir.long(tag::IMAGE_WIDTH, &[1]);
            dir.long(tag::IMAGE_LENGTH, &[1]);
            dir.short(tag::BITS_PER_SAMPLE, &[8]);
            dir.short(tag::PHOTOMETRIC, &[1]);
            dir.offsets(tag::STRIP_OFFSETS, &[strip]).unwrap();
            dir.offsets(tag::STRIP_BYTE_COUNTS, &[1]).unwrap();
            file.write_directory(dir).unwrap();
        }
        let data = file.finish();
        let (list, _) = decode_bytes(data.clone(), &ImageInfo::new("m.tif"));
        assert_eq!(list.len(), 3);
        let (list, _) = decode_bytes(data.clone(), &ImageInfo::new("m.tif").with_scenes(1, 1));
        assert_eq!(list.len(), 1);
        assert_eq!(list.first().unwrap().scene, 1);
        assert_eq!(list.first().unwrap().pixel(0, 0).unwrap().red, 20.0 * 257.0);

        // Point the last directory back at the first.
        let mut looped = data;
        let first = u32::from_le_bytes([looped[4], looped[5], looped[6], looped[7]]);
        let mut offset = first as usize;
        for _ in 0..2 {
            let count = u16::from_le_bytes([looped[offset], looped[offset + 1]]) as usize;
            let link = offset + 2 + count * 12;
            offset = u32::from_le_bytes([looped[link], looped[link + 1], looped[link + 2], looped[link + 3]]) as usize;
        }
        let count = u16::from_le_bytes([looped[offset], looped[offset + 1]]) as usize;
        let link = offset + 2 + count * 12;
        looped[link..link + 4].copy_from_slice(&first.to_le_bytes());
        let (list, ctx) = decode_bytes(looped, &ImageInfo::new("loop.tif"));
        assert_eq!(list.len(), 3);
        assert!(ctx.exceptions.contains("DirectoryLoopDetected"));
    }

    #[test]
    fn test_expand_ycbcr() {
        // 2x2 luma block with one chroma pair.
        let data = [1, 2, 3, 4, 100, 200];
        let out = expand_ycbcr(&data, 2, 2, 2, 2);
        assert_eq!(out, vec![1, 100, 200, 2, 100, 200, 3, 100, 200, 4, 100, 200]);
    }

    #[test]
    fn test_zero_width_rejected() {
        let mut file = FileWriter::new(Endian::Lsb, false);
        let mut dir = file.directory();
        dir.long(tag::IMAGE_WIDTH, &[0]);
        dir.long(tag::IMAGE_LENGTH, &[1]);
        file.write_directory(dir).unwrap();
        let mut blob = Blob::from_memory(file.finish());
        let err = decode(&ImageInfo::new("z.tif"), &mut blob, &mut Context::new()).unwrap_err();
        assert_eq!(err.option_kind(), Some(OptionErrorKind::NegativeOrZeroImageSize));
    }
}
