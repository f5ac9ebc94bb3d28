//! Headerless planar rasters: RGB, RGBA, RGBO, GRAY, YCbCr and YCbCrA.
//!
//! These formats carry no header, so the caller supplies the extent with
//! `ImageInfo::size` (`WxH[+offset]`). An `extract` geometry selects a
//! sub-window of the stored raster; rows and columns outside it are read
//! and discarded.
//!
//! # Interlace
//!
//! | Mode | Layout of one frame |
//! |------|---------------------|
//! | `None` | `C1 C2 .. Cn [A]` per pixel, row after row |
//! | `Line` | per row: plane 1 row, plane 2 row, ... |
//! | `Plane` | all of plane 1, then plane 2, ... |
//! | `Partition` | like `Plane`, one file per plane named by suffix |
//!
//! Partition suffixes replace the file extension: `R G B A` (`O` for
//! opacity) for RGB and `Y Cb Cr A` for YCbCr, so `img.rgb` is stored as
//! `img.R`, `img.G` and `img.B`.
//!
//! Frames follow each other in the same stream until it runs out. A short
//! row ends decoding with an `UnexpectedEndOfFile` warning and keeps what
//! was read.
//!
//! YCbCr samples are carried through unchanged; the image is only tagged
//! with the colorspace.

use pixmill_core::{
    Colorspace, Error as CoreError, Image, ImageInfo, ImageList, Interlace,
};
use tracing::debug;

use crate::blob::{partition_filename, Blob, BlobMode};
use crate::coders::{allocate, next_frame, warn_eof};
use crate::context::Context;
use crate::error::{IoError, IoResult, OptionErrorKind};
use crate::quantum::{export_pixels, import_row_at, QuantumInfo, QuantumType};
use crate::registry::CoderInfo;

// === Layouts ===

#[derive(Debug, Clone, Copy)]
struct Layout {
    module: &'static str,
    colorspace: Colorspace,
    planes: &'static [(QuantumType, &'static str)],
    alpha: Option<(QuantumType, &'static str)>,
    packed: QuantumType,
}

impl Layout {
    fn for_tag(tag: &str) -> Self {
        const RGB: &[(QuantumType, &str)] = &[
            (QuantumType::Red, "R"),
            (QuantumType::Green, "G"),
            (QuantumType::Blue, "B"),
        ];
        const YCBCR: &[(QuantumType, &str)] = &[
            (QuantumType::Red, "Y"),
            (QuantumType::Green, "Cb"),
            (QuantumType::Blue, "Cr"),
        ];
        match tag.to_ascii_uppercase().as_str() {
            "GRAY" => Self {
                module: "gray",
                colorspace: Colorspace::Gray,
                planes: &[(QuantumType::Gray, "Y")],
                alpha: None,
                packed: QuantumType::Gray,
            },
            "RGBA" => Self {
                module: "rgb",
                colorspace: Colorspace::Rgb,
                planes: RGB,
                alpha: Some((QuantumType::Alpha, "A")),
                packed: QuantumType::RGBA,
            },
            "RGBO" => Self {
                module: "rgb",
                colorspace: Colorspace::Rgb,
                planes: RGB,
                alpha: Some((QuantumType::Opacity, "O")),
                packed: QuantumType::RGBO,
            },
            "YCBCR" => Self {
                module: "ycbcr",
                colorspace: Colorspace::YCbCr,
                planes: YCBCR,
                alpha: None,
                packed: QuantumType::RGB,
            },
            "YCBCRA" => Self {
                module: "ycbcr",
                colorspace: Colorspace::YCbCr,
                planes: YCBCR,
                alpha: Some((QuantumType::Alpha, "A")),
                packed: QuantumType::RGBA,
            },
            _ => Self {
                module: "rgb",
                colorspace: Colorspace::Rgb,
                planes: RGB,
                alpha: None,
                packed: QuantumType::RGB,
            },
        }
    }

    fn all_planes(&self) -> Vec<(QuantumType, &'static str)> {
        let mut planes = self.planes.to_vec();
        planes.extend(self.alpha);
        planes
    }

    fn interlace(&self, requested: Interlace) -> Interlace {
        match requested {
            _ if self.packed == QuantumType::Gray => Interlace::None,
            Interlace::Line | Interlace::Plane | Interlace::Partition => requested,
            _ => Interlace::None,
        }
    }

    /// Bytes of one stored frame.
    fn frame_bytes(&self, qi: &QuantumInfo, interlace: Interlace, width: usize, height: usize) -> u64 {
        let row = match interlace {
            Interlace::None => qi.row_bytes(self.packed, width),
            _ => self
                .all_planes()
                .iter()
                .map(|(kind, _)| qi.row_bytes(*kind, width))
                .sum(),
        };
        (row * height) as u64
    }
}

/// Stored raster extent and the window read from it.
#[derive(Debug, Clone, Copy)]
struct Region {
    width: usize,
    height: usize,
    x: usize,
    y: usize,
    columns: usize,
    rows: usize,
}

impl Region {
    fn of(image: &Image) -> IoResult<Self> {
        let columns = image.columns();
        let rows = image.rows();
        let region = Self {
            width: image.extract_info.width.max(columns),
            height: image.extract_info.height.max(rows),
            x: image.extract_info.x.max(0) as usize,
            y: image.extract_info.y.max(0) as usize,
            columns,
            rows,
        };
        if region.x + columns > region.width || region.y + rows > region.height {
            return Err(CoreError::invalid_region(
                region.x,
                region.y,
                columns,
                rows,
                region.width,
                region.height,
            )
            .into());
        }
        Ok(region)
    }

    fn contains_row(&self, raw_y: usize) -> Option<usize> {
        (raw_y >= self.y && raw_y < self.y + self.rows).then(|| raw_y - self.y)
    }
}

/// Registry entries.
pub fn coder_info() -> Vec<CoderInfo> {
    [
        ("RGB", "Raw red, green, and blue samples"),
        ("RGBA", "Raw red, green, blue, and alpha samples"),
        ("RGBO", "Raw red, green, blue, and opacity samples"),
        ("GRAY", "Raw gray samples"),
        ("YCbCr", "Raw Y, Cb, and Cr samples"),
        ("YCbCrA", "Raw Y, Cb, Cr, and alpha samples"),
    ]
    .into_iter()
    .map(|(tag, description)| {
        CoderInfo::new(tag, description)
            .with_module(Layout::for_tag(tag).module)
            .with_decoder(decode)
            .with_encoder(encode)
            .with_raw(true)
            .with_endian_support(true)
            .with_seekable_stream(true)
    })
    .collect()
}

// === Decoding ===

/// Reads every frame of a raw raster.
pub fn decode(info: &ImageInfo, blob: &mut Blob, ctx: &mut Context) -> IoResult<ImageList> {
    let layout = Layout::for_tag(&info.magick);
    let mut image = Image::from_info(info);
    if image.columns() == 0 || image.rows() == 0 {
        return Err(IoError::option(
            OptionErrorKind::MustSpecifyImageSize,
            info.filename.clone(),
        ));
    }
    let region = Region::of(&image)?;
    image.set_colorspace(layout.colorspace);
    image.matte = layout.alpha.is_some();
    let qi = QuantumInfo::new(info, &image);
    let interlace = layout.interlace(info.interlace);
    image.interlace = interlace;
    debug!(
        module = layout.module,
        width = region.width,
        height = region.height,
        depth = qi.depth,
        ?interlace,
        "raw raster"
    );

    let mut list = ImageList::new();
    if interlace == Interlace::Partition {
        allocate(&mut image, info, region.columns, region.rows)?;
        decode_partition(info, &mut image, &qi, &layout, &region, ctx)?;
        list.append(image);
        return Ok(list);
    }

    blob.skip(image.offset)?;
    let frame_bytes = layout.frame_bytes(&qi, interlace, region.width, region.height);
    for _ in 0..info.scene {
        if blob.skip(frame_bytes)? < frame_bytes {
            return Ok(list);
        }
    }

    loop {
        allocate(&mut image, info, region.columns, region.rows)?;
        let complete = if info.ping {
            let skipped = blob.skip(frame_bytes)?;
            skipped == frame_bytes
        } else {
            decode_frame(blob, &mut image, &qi, &layout, interlace, &region, ctx)?
        };
        if !complete {
            warn_eof(ctx, &mut image, layout.module);
        }
        let scene = image.scene;
        let next = next_frame(info, &image);
        list.append(image);
        if !complete || info.scene_limit_reached(scene) || at_end(blob)? {
            break;
        }
        image = next;
        image.set_colorspace(layout.colorspace);
        image.matte = layout.alpha.is_some();
        image.interlace = interlace;
    }
    Ok(list)
}

fn at_end(blob: &mut Blob) -> IoResult<bool> {
    if !blob.is_seekable() {
        return Ok(true);
    }
    Ok(blob.tell() >= blob.size()?)
}

/// Reads one row of `kind` samples; `None` on a short read.
fn read_row(blob: &mut Blob, qi: &QuantumInfo, kind: QuantumType, width: usize) -> IoResult<Option<Vec<u8>>> {
    let length = qi.row_bytes(kind, width);
    let row = blob.read_up_to(length)?;
    Ok((row.len() == length).then_some(row))
}

fn decode_frame(
    blob: &mut Blob,
    image: &mut Image,
    qi: &QuantumInfo,
    layout: &Layout,
    interlace: Interlace,
    region: &Region,
    ctx: &mut Context,
) -> IoResult<bool> {
    let planes = layout.all_planes();
    match interlace {
        Interlace::Line => {
            for raw_y in 0..region.height {
                for (kind, _) in &planes {
                    let Some(row) = read_row(blob, qi, *kind, region.width)? else {
                        return Ok(false);
                    };
                    if let Some(y) = region.contains_row(raw_y) {
                        import_row_at(image, qi, *kind, y, region.x, &row)?;
                    }
                }
                ctx.progress(layout.module, raw_y as u64, region.height as u64)?;
            }
        }
        Interlace::Plane => {
            let span = (planes.len() * region.height) as u64;
            for (p, (kind, _)) in planes.iter().enumerate() {
                for raw_y in 0..region.height {
                    let Some(row) = read_row(blob, qi, *kind, region.width)? else {
                        return Ok(false);
                    };
                    if let Some(y) = region.contains_row(raw_y) {
                        import_row_at(image, qi, *kind, y, region.x, &row)?;
                    }
                    ctx.progress(layout.module, (p * region.height + raw_y) as u64, span)?;
                }
            }
        }
        _ => {
            for raw_y in 0..region.height {
                let Some(row) = read_row(blob, qi, layout.packed, region.width)? else {
                    return Ok(false);
                };
                if let Some(y) = region.contains_row(raw_y) {
                    import_row_at(image, qi, layout.packed, y, region.x, &row)?;
                }
                ctx.progress(layout.module, raw_y as u64, region.height as u64)?;
            }
        }
    }
    Ok(true)
}

fn decode_partition(
    info: &ImageInfo,
    image: &mut Image,
    qi: &QuantumInfo,
    layout: &Layout,
    region: &Region,
    ctx: &mut Context,
) -> IoResult<()> {
    let planes = layout.all_planes();
    let span = (planes.len() * region.height) as u64;
    for (p, (kind, suffix)) in planes.iter().enumerate() {
        let name = partition_filename(&info.filename, suffix);
        let mut part = Blob::open(&name, BlobMode::ReadBinary)?;
        part.skip(image.offset)?;
        for raw_y in 0..region.height {
            let row = if info.ping {
                None
            } else {
                read_row(&mut part, qi, *kind, region.width)?
            };
            match (row, region.contains_row(raw_y)) {
                (Some(row), Some(y)) => {
                    import_row_at(image, qi, *kind, y, region.x, &row)?;
                }
                (Some(_), None) => {}
                (None, _) if info.ping => break,
                (None, _) => {
                    warn_eof(ctx, image, layout.module);
                    return part.close();
                }
            }
            ctx.progress(layout.module, (p * region.height + raw_y) as u64, span)?;
        }
        part.close()?;
    }
    Ok(())
}

// === Encoding ===

/// Writes every frame as a raw raster.
pub fn encode(info: &ImageInfo, list: &mut ImageList, blob: &mut Blob, ctx: &mut Context) -> IoResult<()> {
    let layout = Layout::for_tag(&info.magick);
    let interlace = layout.interlace(info.interlace);
    let planes = layout.all_planes();
    let mut row = Vec::new();

    for (n, image) in list.iter().enumerate() {
        let qi = QuantumInfo::new(info, image);
        let (columns, rows) = (image.columns(), image.rows());
        debug!(module = layout.module, columns, rows, depth = qi.depth, ?interlace, "write raw raster");
        match interlace {
            Interlace::Line => {
                for y in 0..rows {
                    for (kind, _) in &planes {
                        row.clear();
                        export_pixels(image, &qi, *kind, 0, y, columns, 1, &mut row)?;
                        blob.write_bytes(&row)?;
                    }
                    ctx.progress(layout.module, y as u64, rows as u64)?;
                }
            }
            Interlace::Plane => {
                let span = (planes.len() * rows) as u64;
                for (p, (kind, _)) in planes.iter().enumerate() {
                    for y in 0..rows {
                        row.clear();
                        export_pixels(image, &qi, *kind, 0, y, columns, 1, &mut row)?;
                        blob.write_bytes(&row)?;
                        ctx.progress(layout.module, (p * rows + y) as u64, span)?;
                    }
                }
            }
            Interlace::Partition => {
                let span = (planes.len() * rows) as u64;
                let mode = if n == 0 { BlobMode::WriteBinary } else { BlobMode::AppendBinary };
                for (p, (kind, suffix)) in planes.iter().enumerate() {
                    let name = partition_filename(&info.filename, suffix);
                    let mut part = Blob::open(&name, mode)?;
                    for y in 0..rows {
                        row.clear();
                        export_pixels(image, &qi, *kind, 0, y, columns, 1, &mut row)?;
                        part.write_bytes(&row)?;
                        ctx.progress(layout.module, (p * rows + y) as u64, span)?;
                    }
                    part.close()?;
                }
            }
            _ => {
                for y in 0..rows {
                    row.clear();
                    export_pixels(image, &qi, layout.packed, 0, y, columns, 1, &mut row)?;
                    blob.write_bytes(&row)?;
                    ctx.progress(layout.module, y as u64, rows as u64)?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixmill_core::{PixelPacket, QUANTUM_RANGE};

    fn read(info: &ImageInfo, data: Vec<u8>) -> (ImageList, Context) {
        let mut ctx = Context::new();
        let mut blob = Blob::from_memory(data);
        let list = decode(info, &mut blob, &mut ctx).unwrap();
        (list, ctx)
    }

    #[test]
    fn test_missing_size_is_an_option_error() {
        let info = ImageInfo::new("x.rgb").with_magick("RGB");
        let mut blob = Blob::from_memory(vec![0; 12]);
        let err = decode(&info, &mut blob, &mut Context::new()).unwrap_err();
        assert_eq!(err.option_kind(), Some(OptionErrorKind::MustSpecifyImageSize));
    }

    #[test]
    fn test_rgb_no_interlace() {
        let info = ImageInfo::new("x.rgb").with_magick("RGB").with_size("2x1");
        let (list, _) = read(&info, vec![255, 0, 0, 0, 0, 255]);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].pixel(0, 0), Some(PixelPacket::rgb(QUANTUM_RANGE, 0.0, 0.0)));
        assert_eq!(list[0].pixel(1, 0), Some(PixelPacket::rgb(0.0, 0.0, QUANTUM_RANGE)));
    }

    #[test]
    fn test_line_interlace_rgba() {
        let info = ImageInfo::new("x.rgba")
            .with_magick("RGBA")
            .with_size("1x2")
            .with_interlace(Interlace::Line);
        let data = vec![255, 0, 0, 255, 0, 255, 0, 0];
        let (list, _) = read(&info, data);
        let image = &list[0];
        assert!(image.matte);
        assert_eq!(image.pixel(0, 0).unwrap().red, QUANTUM_RANGE);
        assert_eq!(image.pixel(0, 0).unwrap().opacity, 0.0);
        assert_eq!(image.pixel(0, 1).unwrap().green, QUANTUM_RANGE);
        assert_eq!(image.pixel(0, 1).unwrap().opacity, QUANTUM_RANGE);
    }

    #[test]
    fn test_extract_window() {
        let info = ImageInfo::new("x.gray")
            .with_magick("GRAY")
            .with_size("3x3")
            .with_extract("1x1+1+1");
        let data = vec![0, 0, 0, 0, 255, 0, 0, 0, 0];
        let (list, _) = read(&info, data);
        let image = &list[0];
        assert_eq!((image.columns(), image.rows()), (1, 1));
        assert_eq!(image.pixel(0, 0).unwrap().red, QUANTUM_RANGE);
    }

    #[test]
    fn test_multiple_frames_and_scene_skip() {
        let info = ImageInfo::new("x.gray").with_magick("GRAY").with_size("1x1");
        let (list, _) = read(&info, vec![1, 2, 3]);
        assert_eq!(list.iter().map(|i| i.scene).collect::<Vec<_>>(), vec![0, 1, 2]);

        let info = info.with_scenes(1, 1);
        let (list, _) = read(&info, vec![1, 2, 3]);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].scene, 1);
        assert_eq!(list[0].pixel(0, 0).unwrap().red, 2.0 * 257.0);
    }

    #[test]
    fn test_short_row_warns_and_keeps_frame() {
        let info = ImageInfo::new("x.rgb").with_magick("RGB").with_size("2x2");
        let (list, ctx) = read(&info, vec![255; 8]);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].warnings[0].template, "UnexpectedEndOfFile");
        assert!(ctx.exceptions.is_empty());
    }

    #[test]
    fn test_offset_is_skipped() {
        let info = ImageInfo::new("x.gray").with_magick("GRAY").with_size("1x1+2");
        let (list, _) = read(&info, vec![9, 9, 255]);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].pixel(0, 0).unwrap().red, QUANTUM_RANGE);
    }

    #[test]
    fn test_plane_round_trip_bytes() {
        let info = ImageInfo::new("x.rgb")
            .with_magick("RGB")
            .with_size("2x1")
            .with_interlace(Interlace::Plane);
        let data = vec![1, 2, 3, 4, 5, 6];
        let (mut list, _) = read(&info, data.clone());
        let mut out = Blob::memory_writer();
        encode(&info, &mut list, &mut out, &mut Context::new()).unwrap();
        assert_eq!(out.into_memory().unwrap(), data);
    }

    #[test]
    fn test_ycbcr_is_tagged_only() {
        let info = ImageInfo::new("x.ycbcr").with_magick("YCbCr").with_size("1x1");
        let (list, _) = read(&info, vec![10, 20, 30]);
        assert_eq!(list[0].colorspace(), Colorspace::YCbCr);
        assert_eq!(list[0].pixel(0, 0).unwrap().green, 20.0 * 257.0);
    }
}
