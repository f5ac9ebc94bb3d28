//! TIFF encoding.
//!
//! Each frame is exported row band by row band through the quantum
//! exporter, compressed and appended to an in-memory [`FileWriter`]; its
//! directory follows the pixel data. The finished file is written to the
//! blob in one call.
//!
//! Requested compression falls back to PackBits when the frame cannot
//! carry it: fax schemes need an opaque bilevel frame, JPEG needs 8-bit
//! gray, RGB or CMYK without alpha, and schemes left out of the build are
//! never emitted.

use pixmill_core::quantum::{clamp_to_quantum, scale_quantum_to_short};
use pixmill_core::{
    transform, Colorspace, Compression, Endian, Geometry, Image, ImageInfo, ImageList, Interlace,
    OptionSource, Orientation, StorageClass, QUANTUM_RANGE,
};
use tracing::debug;

use super::ifd::{DirectoryBuilder, FileWriter};
use super::tags::{
    tag, FieldType, Photometric, Scheme, EXTRASAMPLE_ASSOCALPHA, EXTRASAMPLE_UNASSALPHA,
    FILETYPE_PAGE, FILETYPE_REDUCED_IMAGE, GROUP3OPT_FILLBITS, INKSET_CMYK, PREDICTOR_HORIZONTAL,
};
use super::{compress, fax, jpeg, MODULE};
use crate::blob::Blob;
use crate::context::Context;
use crate::error::{IoError, IoResult, OptionErrorKind};
use crate::quantum::{export_pixels, QuantumFormat, QuantumInfo, QuantumType};

/// Target uncompressed strip size.
const STRIP_BYTES: usize = 8192;

/// Pyramid levels stop once both sides are below this.
const PYRAMID_LIMIT: usize = 64;

const TEXT_TAGS: &[(&str, u16)] = &[
    ("tiff:hostcomputer", tag::HOST_COMPUTER),
    ("tiff:artist", tag::ARTIST),
    ("tiff:timestamp", tag::DATE_TIME),
    ("tiff:make", tag::MAKE),
    ("tiff:model", tag::MODEL),
    ("tiff:copyright", tag::COPYRIGHT),
    ("kodak-33423", tag::KODAK_33423),
    ("kodak-36867", tag::KODAK_36867),
    ("label", tag::PAGE_NAME),
    ("comment", tag::IMAGE_DESCRIPTION),
];

/// How a directory relates to the rest of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    None,
    /// One page of a multi-page document with this many pages.
    Page(usize),
    /// Reduced-resolution copy of the previous full image.
    Reduced,
}

/// Encoding choices for one frame.
#[derive(Debug, Clone)]
struct Plan {
    scheme: Scheme,
    photometric: Photometric,
    bits: u32,
    samples: usize,
    separate: bool,
    kinds: Vec<QuantumType>,
    predictor: bool,
    fill_lsb: bool,
    endian: Endian,
    level: u32,
    quality: u8,
    sampling: Option<(u8, u8)>,
}

impl Plan {
    fn block_samples(&self) -> usize {
        if self.separate { 1 } else { self.samples }
    }

    fn row_bytes(&self, width: usize) -> usize {
        (width * self.block_samples() * self.bits as usize).div_ceil(8)
    }

    /// Compresses one strip or tile of `width x rows`.
    fn encode_block(&self, mut data: Vec<u8>, width: usize, rows: usize) -> IoResult<Vec<u8>> {
        let row_bytes = self.row_bytes(width);
        if self.predictor {
            compress::apply_predictor(&mut data, row_bytes, self.block_samples(), self.bits, self.endian)?;
        }
        let mut out = match self.scheme {
            Scheme::Fax3 => fax::encode_g3(&data, width, rows),
            Scheme::Fax4 => fax::encode_g4(&data, width, rows),
            Scheme::Jpeg => jpeg::encode(&data, width, rows, self.block_samples(), self.quality, self.sampling)?,
            // Runs never cross rows.
            Scheme::PackBits => data
                .chunks(row_bytes.max(1))
                .flat_map(compress::pack_bits)
                .collect(),
            scheme => compress::encode(scheme, &data, self.level)?,
        };
        if self.fill_lsb {
            compress::reverse_bits(&mut out);
        }
        Ok(out)
    }
}

// === Frame preparation ===

fn choose_scheme(requested: Compression, image: &Image) -> Scheme {
    let scheme = match requested {
        Compression::Fax | Compression::Group4 => {
            if !image.is_monochrome() || !image.is_opaque() {
                Scheme::PackBits
            } else if requested == Compression::Fax {
                Scheme::Fax3
            } else {
                Scheme::Fax4
            }
        }
        Compression::Jpeg => Scheme::Jpeg,
        Compression::Lzw => Scheme::Lzw,
        Compression::Zip => Scheme::AdobeDeflate,
        Compression::Rle => Scheme::PackBits,
        Compression::None | Compression::Undefined => Scheme::None,
    };
    if compress::is_supported(scheme) {
        scheme
    } else {
        Scheme::PackBits
    }
}

/// RGB to CMYK with black pulled out of the common component.
fn convert_to_cmyk(image: &mut Image) {
    image.set_direct_class();
    let range = QUANTUM_RANGE as f64;
    let pixels = image.pixels().to_vec();
    image.set_colorspace(Colorspace::Cmyk);
    let mut blacks = Vec::with_capacity(pixels.len());
    for (p, source) in image.pixels_mut().iter_mut().zip(&pixels) {
        let cyan = range - source.red as f64;
        let magenta = range - source.green as f64;
        let yellow = range - source.blue as f64;
        let black = cyan.min(magenta).min(yellow);
        let scale = |v: f64| {
            if (range - black).abs() < f64::EPSILON {
                0.0
            } else {
                clamp_to_quantum(range * (v - black) / (range - black))
            }
        };
        p.red = scale(cyan);
        p.green = scale(magenta);
        p.blue = scale(yellow);
        blacks.push(clamp_to_quantum(black));
    }
    for (slot, black) in image.indexes_mut().iter_mut().zip(blacks) {
        *slot = black;
    }
}

/// Multiplies color by alpha.
fn associate_alpha(image: &mut Image) {
    let range = QUANTUM_RANGE as f64;
    for p in image.pixels_mut() {
        let alpha = (range - p.opacity as f64) / range;
        p.red = clamp_to_quantum(alpha * p.red as f64);
        p.green = clamp_to_quantum(alpha * p.green as f64);
        p.blue = clamp_to_quantum(alpha * p.blue as f64);
    }
}

fn wants_association(info: &ImageInfo, image: &Image) -> bool {
    let mode = info
        .option("tiff:alpha")
        .or_else(|| image.properties.get("tiff:alpha"))
        .map(|v| v.trim().to_ascii_lowercase());
    matches!(mode.as_deref(), Some("associate" | "associated"))
}

fn quantum_depth(depth: u32) -> u32 {
    match depth {
        0..=8 => 8,
        9..=16 => 16,
        _ => 32,
    }
}

fn parse_sampling(text: &str) -> Option<(u8, u8)> {
    let geometry = Geometry::parse(&text.replace([',', ':'], "x")).ok()?;
    let h = geometry.width?;
    let v = geometry.height.unwrap_or(h);
    Some((u8::try_from(h).ok()?, u8::try_from(v).ok()?))
}

fn strip_rows(info: &ImageInfo, plan: &Plan, width: usize, height: usize) -> usize {
    let scanline = plan.row_bytes(width).max(1);
    let mut rows = (STRIP_BYTES / scanline).max(1);
    if let Some(option) = info.option_usize("tiff:rows-per-strip").filter(|&r| r > 0) {
        rows = option;
    }
    match plan.scheme {
        Scheme::Jpeg => rows + (16 - rows % 16),
        Scheme::AdobeDeflate | Scheme::Deflate | Scheme::Fax3 | Scheme::Fax4 => height,
        _ => rows,
    }
}

// === Directory ===

fn write_metadata(dir: &mut DirectoryBuilder, image: &Image) {
    if image.x_resolution != 0.0 && image.y_resolution != 0.0 {
        dir.short(tag::RESOLUTION_UNIT, &[image.units.index() + 1]);
        dir.rational(tag::X_RESOLUTION, &[image.x_resolution]);
        dir.rational(tag::Y_RESOLUTION, &[image.y_resolution]);
        if image.page.x != 0 || image.page.y != 0 {
            dir.rational(tag::X_POSITION, &[image.page.x as f64 / image.x_resolution]);
            dir.rational(tag::Y_POSITION, &[image.page.y as f64 / image.y_resolution]);
        }
    }
    let c = &image.chromaticity;
    if c.white_point.x != 0.0 {
        dir.rational(
            tag::PRIMARY_CHROMATICITIES,
            &[
                c.red_primary.x,
                c.red_primary.y,
                c.green_primary.x,
                c.green_primary.y,
                c.blue_primary.x,
                c.blue_primary.y,
            ],
        );
        dir.rational(tag::WHITE_POINT, &[c.white_point.x, c.white_point.y]);
    }
    for (name, data) in image.profiles.iter() {
        match name {
            "xmp" => dir.bytes(tag::XMP, FieldType::Byte, data),
            "icc" => dir.bytes(tag::ICC_PROFILE, FieldType::Undefined, data),
            "iptc" => {
                let mut words = data.to_vec();
                words.resize(data.len().div_ceil(4) * 4, 0);
                dir.raw_longs(tag::RICH_TIFF_IPTC, words);
            }
            "8bim" => {
                let mut even = data.to_vec();
                even.resize(data.len() + data.len() % 2, 0);
                dir.bytes(tag::PHOTOSHOP, FieldType::Byte, &even);
            }
            "tiff:37724" => dir.bytes(tag::IMAGE_SOURCE_DATA, FieldType::Undefined, data),
            _ => {}
        }
    }
    for &(key, code) in TEXT_TAGS {
        if let Some(text) = image.properties.get(key) {
            dir.ascii(code, text);
        }
    }
    dir.ascii(tag::SOFTWARE, &format!("pixmill {}", pixmill_core::VERSION));
    if !image.filename.is_empty() {
        dir.ascii(tag::DOCUMENT_NAME, &image.filename);
    }
}

fn write_frame(
    info: &ImageInfo,
    source: &Image,
    file: &mut FileWriter,
    ctx: &Context,
    marker: Marker,
) -> IoResult<()> {
    let (width, height) = (source.columns(), source.rows());
    if width == 0 || height == 0 || width > u32::MAX as usize || height > u32::MAX as usize {
        return Err(IoError::option(
            OptionErrorKind::NegativeOrZeroImageSize,
            source.filename.clone(),
        ));
    }
    let mut image = source.clone();
    let requested = if info.compression != Compression::Undefined {
        info.compression
    } else {
        image.compression
    };
    let mut scheme = choose_scheme(requested, &image);
    let jpeg_ready = !image.matte
        && matches!(image.colorspace(), Colorspace::Rgb | Colorspace::Gray | Colorspace::Cmyk | Colorspace::Undefined);
    if scheme == Scheme::Jpeg {
        if jpeg_ready {
            image.set_direct_class();
            image.depth = 8;
        } else {
            scheme = Scheme::PackBits;
        }
    }

    let qi = QuantumInfo::new(info, &image);
    let cmyk = (info.colorspace == Colorspace::Undefined && image.colorspace() == Colorspace::Cmyk)
        || info.colorspace == Colorspace::Cmyk;
    let (mut photometric, mut samples) = if cmyk {
        if image.colorspace() != Colorspace::Cmyk {
            convert_to_cmyk(&mut image);
        }
        (Photometric::Separated, 4)
    } else if image.colorspace() == Colorspace::Lab {
        (Photometric::CieLab, 3)
    } else if image.colorspace() == Colorspace::YCbCr {
        image.depth = 8;
        (Photometric::YCbCr, 3)
    } else if image.is_gray() {
        if info.depth == 0 && scheme != Scheme::Jpeg && image.is_monochrome() {
            image.depth = 1;
        }
        if qi.min_is_white {
            (Photometric::MinIsWhite, 1)
        } else {
            (Photometric::MinIsBlack, 1)
        }
    } else if image.storage_class() == StorageClass::Pseudo {
        (Photometric::Palette, 1)
    } else {
        (Photometric::Rgb, 3)
    };
    if matches!(scheme, Scheme::Fax3 | Scheme::Fax4) {
        if samples == 1 && !matches!(photometric, Photometric::Palette) {
            image.depth = 1;
            photometric = Photometric::MinIsWhite;
        } else {
            scheme = Scheme::PackBits;
        }
    }

    let tile = info
        .extract
        .as_deref()
        .and_then(|e| Geometry::parse(e).ok())
        .map(|g| {
            let rect = g.to_rectangle(width, height);
            (rect.width.max(1).div_ceil(16) * 16, rect.height.max(1).div_ceil(16) * 16)
        });
    if tile.is_some() && image.depth != 1 {
        image.depth = quantum_depth(image.depth);
    }

    let float = qi.format == QuantumFormat::FloatingPoint;
    let mut bits = if float {
        if matches!(image.depth, 16 | 32 | 64) { image.depth } else { 32 }
    } else {
        image.depth.clamp(1, 64)
    };
    if photometric == Photometric::Palette {
        bits = bits.min(16);
        while bits < 16 && (1usize << bits) < image.colormap().len() {
            bits = if bits < 8 { 8 } else { 16 };
        }
    }
    let qi = qi
        .with_depth(bits)
        .with_endian(file.endian())
        .with_min_is_white(photometric == Photometric::MinIsWhite)
        .with_pad(0);

    let associate = image.matte && wants_association(info, &image);
    if image.matte {
        samples += 1;
    }
    if associate {
        associate_alpha(&mut image);
    }

    let separate = matches!(photometric, Photometric::Rgb | Photometric::Separated)
        && matches!(info.interlace, Interlace::Plane | Interlace::Partition)
        && !matches!(scheme, Scheme::Jpeg | Scheme::Fax3 | Scheme::Fax4);
    let matte = image.matte;
    let kinds = if separate {
        let mut kinds = if photometric == Photometric::Separated {
            vec![QuantumType::Cyan, QuantumType::Magenta, QuantumType::Yellow, QuantumType::Black]
        } else {
            vec![QuantumType::Red, QuantumType::Green, QuantumType::Blue]
        };
        if matte {
            kinds.push(QuantumType::Alpha);
        }
        kinds
    } else {
        vec![match photometric {
            Photometric::Separated if matte => QuantumType::CMYKA,
            Photometric::Separated => QuantumType::CMYK,
            Photometric::MinIsWhite | Photometric::MinIsBlack if matte => QuantumType::GrayAlpha,
            Photometric::MinIsWhite | Photometric::MinIsBlack => QuantumType::Gray,
            Photometric::Palette if matte => QuantumType::IndexAlpha,
            Photometric::Palette => QuantumType::Index,
            _ if matte => QuantumType::RGBA,
            _ => QuantumType::RGB,
        }]
    };

    let quality = [info.quality, image.quality]
        .into_iter()
        .find(|&q| q != 0)
        .unwrap_or(75)
        .min(100) as u8;
    let sampling = if scheme == Scheme::Jpeg && photometric == Photometric::Rgb {
        info.sampling_factor
            .as_deref()
            .or_else(|| image.properties.get("jpeg:sampling-factor"))
            .and_then(parse_sampling)
            .or(Some((2, 2)))
    } else {
        None
    };
    let plan = Plan {
        scheme,
        photometric,
        bits,
        samples,
        separate,
        kinds,
        predictor: matches!(scheme, Scheme::Lzw | Scheme::AdobeDeflate)
            && matches!(photometric, Photometric::Rgb | Photometric::MinIsBlack)
            && matches!(bits, 8 | 16)
            && !float,
        fill_lsb: image.endian == Endian::Lsb,
        endian: file.endian(),
        level: if info.quality == 0 { 7 } else { (info.quality / 10).min(9) as u32 },
        quality,
        sampling,
    };
    let rows_per_strip = strip_rows(info, &plan, width, height);
    debug!(
        width,
        height,
        bits,
        samples,
        photometric = ?plan.photometric,
        compression = ?plan.scheme,
        separate,
        ?tile,
        "tiff frame"
    );

    // Pixel data.
    let mut offsets = Vec::new();
    let mut counts = Vec::new();
    match tile {
        None => {
            for (plane, &kind) in plan.kinds.iter().enumerate() {
                let mut y = 0;
                while y < height {
                    let rows = rows_per_strip.min(height - y);
                    let mut data = Vec::with_capacity(plan.row_bytes(width) * rows);
                    export_pixels(&image, &qi, kind, 0, y, width, rows, &mut data)?;
                    let block = plan.encode_block(data, width, rows)?;
                    offsets.push(file.append(&block));
                    counts.push(block.len() as u64);
                    y += rows;
                    if plane == 0 {
                        ctx.progress(MODULE, y as u64, height as u64)?;
                    }
                }
            }
        }
        Some((tw, th)) => {
            let across = width.div_ceil(tw);
            let down = height.div_ceil(th);
            let tile_stride = plan.row_bytes(tw);
            for (plane, &kind) in plan.kinds.iter().enumerate() {
                for ty in 0..down {
                    for tx in 0..across {
                        let (x, y) = (tx * tw, ty * th);
                        let (w, h) = (tw.min(width - x), th.min(height - y));
                        let mut region = Vec::new();
                        export_pixels(&image, &qi, kind, x, y, w, h, &mut region)?;
                        let region_stride = plan.row_bytes(w);
                        let mut data = vec![0u8; tile_stride * th];
                        for (r, row) in region.chunks(region_stride).take(h).enumerate() {
                            data[r * tile_stride..r * tile_stride + row.len()].copy_from_slice(row);
                        }
                        let block = plan.encode_block(data, tw, th)?;
                        offsets.push(file.append(&block));
                        counts.push(block.len() as u64);
                    }
                    if plane == 0 {
                        ctx.progress(MODULE, ((ty + 1) * th).min(height) as u64, height as u64)?;
                    }
                }
            }
        }
    }

    // Directory.
    let mut dir = file.directory();
    match marker {
        Marker::Page(pages) => {
            dir.long(tag::NEW_SUBFILE_TYPE, &[FILETYPE_PAGE as u32]);
            if image.scene != 0 {
                dir.short(tag::PAGE_NUMBER, &[image.scene as u16, pages as u16]);
            }
        }
        Marker::Reduced => dir.long(tag::NEW_SUBFILE_TYPE, &[FILETYPE_REDUCED_IMAGE as u32]),
        Marker::None => {}
    }
    dir.long(tag::IMAGE_WIDTH, &[width as u32]);
    dir.long(tag::IMAGE_LENGTH, &[height as u32]);
    dir.short(tag::BITS_PER_SAMPLE, &vec![bits as u16; samples]);
    dir.short(tag::COMPRESSION, &[scheme.code()]);
    dir.short(tag::PHOTOMETRIC, &[photometric.code()]);
    dir.short(tag::FILL_ORDER, &[if plan.fill_lsb { 2 } else { 1 }]);
    let orientation = match image.orientation {
        Orientation::Undefined => Orientation::TopLeft,
        other => other,
    };
    dir.short(tag::ORIENTATION, &[orientation.to_tag() as u16]);
    dir.short(tag::SAMPLES_PER_PIXEL, &[samples as u16]);
    dir.short(tag::PLANAR_CONFIG, &[if separate { 2 } else { 1 }]);
    if photometric == Photometric::Separated {
        dir.short(tag::INK_SET, &[INKSET_CMYK as u16]);
    }
    if matte {
        let extra = if associate { EXTRASAMPLE_ASSOCALPHA } else { EXTRASAMPLE_UNASSALPHA };
        dir.short(tag::EXTRA_SAMPLES, &[extra as u16]);
    }
    match qi.format {
        QuantumFormat::FloatingPoint => {
            dir.short(tag::SAMPLE_FORMAT, &vec![3; samples]);
            dir.double(tag::S_MIN_SAMPLE_VALUE, &vec![qi.minimum; samples]);
            dir.double(tag::S_MAX_SAMPLE_VALUE, &vec![qi.maximum; samples]);
        }
        QuantumFormat::Signed => dir.short(tag::SAMPLE_FORMAT, &vec![2; samples]),
        QuantumFormat::Unsigned => dir.short(tag::SAMPLE_FORMAT, &vec![1; samples]),
        QuantumFormat::Undefined => {}
    }
    if photometric == Photometric::Palette {
        let colors = 1usize << bits;
        let mut map = vec![0u16; 3 * colors];
        for (i, p) in image.colormap().iter().take(colors).enumerate() {
            map[i] = scale_quantum_to_short(p.red);
            map[colors + i] = scale_quantum_to_short(p.green);
            map[2 * colors + i] = scale_quantum_to_short(p.blue);
        }
        dir.short(tag::COLOR_MAP, &map);
    }
    match tile {
        Some((tw, th)) => {
            dir.long(tag::TILE_WIDTH, &[tw as u32]);
            dir.long(tag::TILE_LENGTH, &[th as u32]);
            dir.offsets(tag::TILE_OFFSETS, &offsets)?;
            dir.offsets(tag::TILE_BYTE_COUNTS, &counts)?;
        }
        None => {
            dir.long(tag::ROWS_PER_STRIP, &[rows_per_strip.min(u32::MAX as usize) as u32]);
            dir.offsets(tag::STRIP_OFFSETS, &offsets)?;
            dir.offsets(tag::STRIP_BYTE_COUNTS, &counts)?;
        }
    }
    if plan.predictor {
        dir.short(tag::PREDICTOR, &[PREDICTOR_HORIZONTAL as u16]);
    }
    if scheme == Scheme::Fax3 {
        dir.long(tag::GROUP3_OPTIONS, &[GROUP3OPT_FILLBITS as u32]);
    }
    if let Some((h, v)) = plan.sampling {
        dir.short(tag::YCBCR_SUBSAMPLING, &[h as u16, v as u16]);
    } else if photometric == Photometric::YCbCr {
        dir.short(tag::YCBCR_SUBSAMPLING, &[1, 1]);
    }
    write_metadata(&mut dir, &image);
    file.write_directory(dir)
}

// === Encoding ===

fn open_file(info: &ImageInfo) -> FileWriter {
    let big = info.magick.eq_ignore_ascii_case("TIFF64");
    FileWriter::new(info.endian.or(Endian::native()), big)
}

/// Writes the list as one TIFF, every frame a page when `adjoin` is set.
pub fn encode(info: &ImageInfo, list: &mut ImageList, blob: &mut Blob, ctx: &mut Context) -> IoResult<()> {
    let mut file = open_file(info);
    let pages = list.len();
    for image in list.iter() {
        let marker = if info.adjoin && pages > 1 {
            Marker::Page(pages)
        } else {
            Marker::None
        };
        write_frame(info, image, &mut file, ctx, marker)?;
        if !info.adjoin {
            break;
        }
    }
    blob.write_bytes(&file.finish())
}

/// Halved copies of `image` until both sides drop below 64 pixels.
pub fn pyramid(image: &Image) -> IoResult<Vec<Image>> {
    let mut levels = vec![image.clone()];
    loop {
        let (columns, rows) = match levels.last() {
            Some(last) => (last.columns(), last.rows()),
            None => break,
        };
        if (columns < PYRAMID_LIMIT && rows < PYRAMID_LIMIT) || (columns <= 1 && rows <= 1) {
            break;
        }
        let level = transform::resize(image, (columns / 2).max(1), (rows / 2).max(1))?;
        levels.push(level);
    }
    Ok(levels)
}

/// Writes the first image followed by its reduced-resolution pyramid.
pub fn encode_pyramid(info: &ImageInfo, list: &mut ImageList, blob: &mut Blob, ctx: &mut Context) -> IoResult<()> {
    let Some(first) = list.first() else {
        return Ok(());
    };
    let levels = pyramid(first)?;
    debug!(levels = levels.len(), "tiff pyramid");
    let mut file = open_file(info);
    for (i, level) in levels.iter().enumerate() {
        let marker = if i == 0 { Marker::None } else { Marker::Reduced };
        write_frame(info, level, &mut file, ctx, marker)?;
    }
    blob.write_bytes(&file.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coders::tiff::ifd::{read_directory, read_header};
    use crate::coders::tiff::read;
    use pixmill_core::{PixelPacket, ResolutionUnits};

    fn write(info: &ImageInfo, images: Vec<Image>) -> Vec<u8> {
        let mut list = ImageList::new();
        for image in images {
            list.append(image);
        }
        let mut blob = Blob::memory_writer();
        encode(info, &mut list, &mut blob, &mut Context::new()).unwrap();
        blob.into_memory().unwrap()
    }

    fn read_back(data: Vec<u8>) -> ImageList {
        let mut blob = Blob::from_memory(data);
        read::decode(&ImageInfo::new("t.tif"), &mut blob, &mut Context::new()).unwrap()
    }

    fn gradient(columns: usize, rows: usize) -> Image {
        let mut image = Image::new(columns, rows).unwrap();
        image.depth = 8;
        for y in 0..rows {
            for x in 0..columns {
                let v = |k: usize| ((x * 7 + y * 13 + k * 50) % 256) as f32 * 257.0;
                image.set_pixel(x, y, PixelPacket::rgb(v(0), v(1), v(2))).unwrap();
            }
        }
        image
    }

    fn checkerboard(columns: usize, rows: usize) -> Image {
        let mut image = Image::new(columns, rows).unwrap();
        for y in 0..rows {
            for x in 0..columns {
                if (x / 3 + y) % 2 == 0 {
                    image.set_pixel(x, y, PixelPacket::WHITE).unwrap();
                }
            }
        }
        image
    }

    #[test]
    fn test_lossless_schemes_round_trip() {
        let image = gradient(37, 21);
        for compression in [Compression::None, Compression::Rle, Compression::Lzw, Compression::Zip] {
            let info = ImageInfo::new("t.tif").with_compression(compression);
            let list = read_back(write(&info, vec![image.clone()]));
            let back = list.first().unwrap();
            assert_eq!(back.compression, compression, "{compression:?}");
            assert_eq!(back.pixels(), image.pixels(), "{compression:?}");
        }
    }

    #[test]
    fn test_bilevel_fax_round_trip() {
        let image = checkerboard(50, 9);
        for compression in [Compression::Fax, Compression::Group4] {
            let info = ImageInfo::new("t.tif").with_compression(compression);
            let list = read_back(write(&info, vec![image.clone()]));
            let back = list.first().unwrap();
            assert_eq!(back.depth, 1);
            assert_eq!(back.compression, compression);
            for (a, b) in back.pixels().iter().zip(image.pixels()) {
                assert_eq!(a.red, b.red);
            }
        }
    }

    #[test]
    fn test_fax_downgrades_for_color() {
        let info = ImageInfo::new("t.tif").with_compression(Compression::Group4);
        let list = read_back(write(&info, vec![gradient(4, 4)]));
        assert_eq!(list.first().unwrap().compression, Compression::Rle);
    }

    #[test]
    fn test_palette_round_trip() {
        let mut image = Image::new(3, 1).unwrap();
        let colors = vec![
            PixelPacket::rgb(QUANTUM_RANGE, 0.0, 0.0),
            PixelPacket::rgb(0.0, QUANTUM_RANGE, 0.0),
            PixelPacket::rgb(0.0, 0.0, QUANTUM_RANGE),
        ];
        image.set_colormap(colors.clone()).unwrap();
        for (x, color) in colors.into_iter().enumerate() {
            image.set_index(x, 0, x as f32).unwrap();
            image.set_pixel(x, 0, color).unwrap();
        }
        let list = read_back(write(&ImageInfo::new("p.tif"), vec![image]));
        let back = list.first().unwrap();
        assert_eq!(back.storage_class(), StorageClass::Pseudo);
        assert_eq!(back.pixel(2, 0), Some(PixelPacket::rgb(0.0, 0.0, QUANTUM_RANGE)));
        assert_eq!(back.index(1, 0), Some(1.0));
    }

    #[test]
    fn test_planar_cmyk_round_trip() {
        let mut image = Image::new(2, 2).unwrap();
        image.depth = 8;
        image.set_colorspace(Colorspace::Cmyk);
        for (i, p) in image.pixels_mut().iter_mut().enumerate() {
            *p = PixelPacket::rgb(i as f32 * 257.0, 2.0 * 257.0, 255.0 * 257.0);
        }
        for (i, k) in image.indexes_mut().iter_mut().enumerate() {
            *k = (100 + i) as f32 * 257.0;
        }
        let info = ImageInfo::new("c.tif").with_interlace(Interlace::Plane);
        let data = write(&info, vec![image.clone()]);
        let mut blob = Blob::from_memory(data.clone());
        let header = read_header(&mut blob).unwrap();
        let dir = read_directory(&mut blob, &header, header.first).unwrap();
        assert_eq!(dir.uint(tag::PLANAR_CONFIG), Some(2));
        assert_eq!(dir.uint(tag::INK_SET), Some(INKSET_CMYK));
        let list = read_back(data);
        let back = list.first().unwrap();
        assert_eq!(back.colorspace(), Colorspace::Cmyk);
        assert_eq!(back.pixels(), image.pixels());
        assert_eq!(back.indexes(), image.indexes());
    }

    #[test]
    fn test_rgb_converted_for_cmyk_request() {
        let mut image = Image::new(1, 1).unwrap();
        image.set_pixel(0, 0, PixelPacket::rgb(QUANTUM_RANGE, 0.0, 0.0)).unwrap();
        let mut info = ImageInfo::new("c.tif");
        info.colorspace = Colorspace::Cmyk;
        let list = read_back(write(&info, vec![image]));
        let back = list.first().unwrap();
        assert_eq!(back.colorspace(), Colorspace::Cmyk);
        let p = back.pixel(0, 0).unwrap();
        assert_eq!((p.red, p.green, p.blue), (0.0, QUANTUM_RANGE, QUANTUM_RANGE));
        assert_eq!(back.index(0, 0), Some(0.0));
    }

    #[test]
    fn test_associated_alpha_premultiplies() {
        let mut image = Image::new(1, 1).unwrap();
        image.depth = 8;
        image.matte = true;
        image
            .set_pixel(0, 0, PixelPacket::rgbo(200.0 * 257.0, 100.0 * 257.0, 0.0, QUANTUM_RANGE / 2.0))
            .unwrap();
        let info = ImageInfo::new("a.tif").with_option("tiff:alpha", "associate");
        let data = write(&info, vec![image]);
        let mut blob = Blob::from_memory(data.clone());
        let header = read_header(&mut blob).unwrap();
        let dir = read_directory(&mut blob, &header, header.first).unwrap();
        assert_eq!(dir.uint(tag::EXTRA_SAMPLES), Some(EXTRASAMPLE_ASSOCALPHA));
        let offset = dir.uint(tag::STRIP_OFFSETS).unwrap() as usize;
        assert_eq!(&data[offset..offset + 3], &[100, 50, 0]);
    }

    #[test]
    fn test_tiles_from_extract() {
        let image = gradient(40, 20);
        let info = ImageInfo::new("t.tif").with_extract("20x10");
        let data = write(&info, vec![image.clone()]);
        let mut blob = Blob::from_memory(data.clone());
        let header = read_header(&mut blob).unwrap();
        let dir = read_directory(&mut blob, &header, header.first).unwrap();
        assert_eq!(dir.uint(tag::TILE_WIDTH), Some(32));
        assert_eq!(dir.uint(tag::TILE_LENGTH), Some(16));
        let list = read_back(data);
        assert_eq!(list.first().unwrap().pixels(), image.pixels());
    }

    #[test]
    fn test_rows_per_strip_option() {
        let info = ImageInfo::new("t.tif").with_option("tiff:rows-per-strip", "3");
        let list = read_back(write(&info, vec![gradient(5, 7)]));
        assert_eq!(list.first().unwrap().properties.get("tiff:rows-per-strip"), Some("3"));
    }

    #[test]
    fn test_default_rows_per_strip() {
        let info = ImageInfo::new("t.tif");
        let list = read_back(write(&info, vec![gradient(1000, 8)]));
        // 3000-byte scanlines give two rows per 8 KiB strip.
        assert_eq!(list.first().unwrap().properties.get("tiff:rows-per-strip"), Some("2"));
    }

    #[test]
    fn test_bigtiff_header() {
        let info = ImageInfo::new("b.tif").with_magick("TIFF64").with_endian(Endian::Msb);
        let data = write(&info, vec![gradient(3, 3)]);
        assert_eq!(&data[..4], b"MM\x00\x2b");
        assert_eq!(read_back(data).first().unwrap().columns(), 3);
    }

    #[test]
    fn test_pages_and_metadata() {
        let mut first = gradient(2, 2);
        first.properties.set("comment", "hello");
        first.properties.set("tiff:artist", "someone");
        first.x_resolution = 300.0;
        first.y_resolution = 150.0;
        first.units = ResolutionUnits::PixelsPerInch;
        first.profiles.set("icc", vec![1, 2, 3, 4, 5]);
        let mut second = gradient(2, 2);
        second.scene = 1;
        let list = read_back(write(&ImageInfo::new("m.tif"), vec![first, second]));
        assert_eq!(list.len(), 2);
        let a = list.first().unwrap();
        assert_eq!(a.properties.get("comment"), Some("hello"));
        assert_eq!(a.properties.get("tiff:artist"), Some("someone"));
        assert_eq!((a.x_resolution, a.y_resolution), (300.0, 150.0));
        assert_eq!(a.units, ResolutionUnits::PixelsPerInch);
        assert_eq!(a.profiles.get("icc"), Some(&[1u8, 2, 3, 4, 5][..]));
        assert_eq!(list.get(1).unwrap().scene, 1);
    }

    #[test]
    fn test_float_samples() {
        let mut image = gradient(3, 2);
        image.depth = 32;
        let info = ImageInfo::new("f.tif").with_option("quantum:format", "floating-point");
        let list = read_back(write(&info, vec![image.clone()]));
        let back = list.first().unwrap();
        assert_eq!(back.properties.get("quantum:format"), Some("floating-point"));
        for (a, b) in back.pixels().iter().zip(image.pixels()) {
            assert!((a.red - b.red).abs() < 0.5);
        }
    }

    #[test]
    fn test_pyramid_levels() {
        let levels = pyramid(&gradient(200, 100)).unwrap();
        let sizes: Vec<_> = levels.iter().map(|l| (l.columns(), l.rows())).collect();
        assert_eq!(sizes, vec![(200, 100), (100, 50), (50, 25)]);

        let mut list = ImageList::new();
        list.append(gradient(130, 70));
        let mut blob = Blob::memory_writer();
        let info = ImageInfo::new("p.ptif").with_magick("PTIF");
        encode_pyramid(&info, &mut list, &mut blob, &mut Context::new()).unwrap();
        let data = blob.into_memory().unwrap();
        let mut blob = Blob::from_memory(data.clone());
        let header = read_header(&mut blob).unwrap();
        let first = read_directory(&mut blob, &header, header.first).unwrap();
        assert!(!first.contains(tag::NEW_SUBFILE_TYPE));
        let second = read_directory(&mut blob, &header, first.next).unwrap();
        assert_eq!(second.uint(tag::NEW_SUBFILE_TYPE), Some(FILETYPE_REDUCED_IMAGE));
        assert_eq!(read_back(data).len(), 3);
    }

    #[cfg(feature = "jpeg")]
    #[test]
    fn test_jpeg_round_trip() {
        let mut image = Image::new(24, 20).unwrap();
        image.depth = 8;
        for p in image.pixels_mut() {
            *p = PixelPacket::rgb(180.0 * 257.0, 90.0 * 257.0, 30.0 * 257.0);
        }
        let info = ImageInfo::new("j.tif").with_compression(Compression::Jpeg).with_quality(95);
        let list = read_back(write(&info, vec![image]));
        let back = list.first().unwrap();
        assert_eq!(back.compression, Compression::Jpeg);
        assert_eq!(back.colorspace(), Colorspace::Rgb);
        assert_eq!(back.properties.get("jpeg:sampling-factor"), Some("2x2"));
        let p = back.pixel(10, 10).unwrap();
        assert!((p.red / 257.0 - 180.0).abs() < 6.0);
        assert!((p.blue / 257.0 - 30.0).abs() < 6.0);
    }
}
