//! MPEG-1 and MPEG-2 video through external delegates.
//!
//! Decoding runs the `mpeg-decode` delegate, which leaves one PPM per frame
//! named `<unique><n>.ppm`, and reads those back with the PNM coder.
//! Encoding writes a parameter file, optional quantizer matrices and one
//! planar 4:2:0 (or 4:2:2) YUV file per displayed frame, then runs
//! `mpeg-encode`. All scratch files live in one temporary directory that is
//! removed when the call returns, whether it succeeded or not.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use pixmill_core::transform::coalesce;
use pixmill_core::{Image, ImageInfo, ImageList};
use tracing::debug;

use crate::blob::{Blob, BlobMode};
use crate::coders::pnm;
use crate::context::Context;
use crate::delegate::{DelegateArgs, MPEG_DECODE, MPEG_ENCODE};
use crate::error::{CodecErrorKind, IoError, IoErrorKind, IoResult};
use crate::registry::CoderInfo;
use crate::resource;

const MODULE: &str = "mpeg";

/// Default intra quantizer matrix, scaled by quality.
const INTRA_MATRIX: [u32; 64] = [
    8, 16, 19, 22, 26, 27, 29, 34, //
    16, 16, 22, 24, 27, 29, 34, 37, //
    19, 22, 26, 27, 29, 34, 34, 38, //
    22, 22, 26, 27, 29, 34, 37, 40, //
    22, 26, 27, 29, 32, 35, 40, 48, //
    26, 27, 29, 32, 35, 40, 48, 58, //
    26, 27, 29, 34, 38, 46, 56, 69, //
    27, 29, 35, 38, 46, 56, 69, 83,
];

/// Returns `true` for an MPEG sequence header start code.
pub fn is_mpeg(header: &[u8]) -> bool {
    header.starts_with(&[0x00, 0x00, 0x01, 0xB3])
}

/// Registry entries. Only `MPEG` carries the magic test, so detection
/// never lands on an alias.
pub fn coder_info() -> Vec<CoderInfo> {
    ["MPEG", "MPG", "M2V"]
        .into_iter()
        .map(|tag| {
            let info = CoderInfo::new(tag, "MPEG Video Stream")
                .with_module(MODULE)
                .with_decoder(decode)
                .with_encoder(encode)
                .with_blob_support(false);
            if tag == "MPEG" {
                info.with_magic(is_mpeg)
            } else {
                info
            }
        })
        .collect()
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn fs_error(kind: IoErrorKind, path: &Path, err: std::io::Error) -> IoError {
    IoError::io_source(kind, path_str(path), err)
}

// === Decoding ===

/// Decodes through the `mpeg-decode` delegate.
pub fn decode(info: &ImageInfo, blob: &mut Blob, ctx: &mut Context) -> IoResult<ImageList> {
    let scratch = resource::unique_dir()?;
    let input = if blob.is_memory() || blob.filename().is_empty() {
        let staged = scratch.path().join("input.mpg");
        let data = blob.read_remaining()?;
        fs::write(&staged, data).map_err(|e| fs_error(IoErrorKind::Write, &staged, e))?;
        staged
    } else {
        PathBuf::from(blob.filename())
    };
    let unique = path_str(&scratch.path().join("frame"));
    ctx.delegates().invoke(
        MPEG_DECODE,
        &DelegateArgs {
            input: &path_str(&input),
            output: "",
            unique: &unique,
        },
    )?;

    let mut list = ImageList::new();
    let mut frame_info = info.clone();
    frame_info.magick = "PPM".to_string();
    frame_info.affirm = true;
    frame_info.scene = 0;
    frame_info.number_scenes = 0;
    for scene in info.scene.. {
        let path = PathBuf::from(format!("{unique}{scene}.ppm"));
        if !path.exists() {
            break;
        }
        frame_info.filename = path_str(&path);
        let mut frame_blob = Blob::open(&frame_info.filename, BlobMode::ReadBinary)?;
        let frames = pnm::decode(&frame_info, &mut frame_blob, ctx)?;
        frame_blob.close()?;
        for mut image in frames {
            image.magick = info.magick.clone();
            image.filename = info.filename.clone();
            image.scene = scene;
            list.append(image);
        }
        ctx.progress(MODULE, scene as u64, 0)?;
        if info.scene_limit_reached(scene) {
            break;
        }
    }
    debug!(frames = list.len(), "mpeg frames decoded");
    Ok(list)
}

// === Encoding ===

/// Stream flavour chosen by tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Mpeg1,
    Mpeg2,
}

/// Number of encoded frames one image occupies: `delay` in centiseconds,
/// one frame per three.
pub fn frame_repeat(image: &Image) -> usize {
    let delay = 100.0 * image.delay as f64 / (image.ticks_per_second as f64).max(1.0);
    ((delay + 1.0) / 3.0).max(1.0) as usize
}

/// Parses `HxV` chroma subsampling; a single value applies to both axes.
fn sampling_factors(text: &str) -> Option<(u32, u32)> {
    let mut parts = text
        .split(|c: char| c == 'x' || c == 'X' || c == ',')
        .map(|p| p.trim().parse::<f64>().ok().map(|v| v as u32));
    let horizontal = parts.next()??;
    let vertical = match parts.next() {
        Some(v) => v?,
        None => horizontal,
    };
    Some((horizontal, vertical))
}

fn vertical_factor(info: &ImageInfo, stream: Stream) -> Option<u32> {
    let Some(text) = info.sampling_factor.as_deref() else {
        return Some(2);
    };
    let (horizontal, vertical) = sampling_factors(text)?;
    let valid = match stream {
        Stream::Mpeg1 => horizontal == 2 && vertical == 2,
        Stream::Mpeg2 => horizontal == 2 && (vertical == 1 || vertical == 2),
    };
    valid.then_some(vertical)
}

fn even(n: usize) -> usize {
    n + (n & 1)
}

fn matrix_text(values: impl Iterator<Item = u32>) -> String {
    let mut text = String::new();
    for (i, v) in values.enumerate() {
        let _ = write!(text, " {v}");
        if i % 8 == 7 {
            text.push('\n');
        }
    }
    text
}

/// Intra quantizer matrix for `quality` in `1..=100`.
fn intra_matrix(quality: usize) -> String {
    let quality = quality as f64;
    if quality >= 75.0 {
        let q = (2.0 * (quality - 75.0)).max(1.0);
        matrix_text(INTRA_MATRIX.iter().map(|&m| (m as f64 / q).clamp(1.0, 255.0) as u32))
    } else {
        let q = ((75.0 - quality) / 8.0).max(1.0);
        matrix_text(INTRA_MATRIX.iter().map(|&m| (q * m as f64 + 0.5).clamp(1.0, 255.0) as u32))
    }
}

/// Non-intra quantizer matrix for `quality` in `1..=100`.
fn non_intra_matrix(quality: usize) -> String {
    let q = (66.0 - (2.0 * quality as f64) / 3.0).clamp(1.0, 255.0) as u32;
    matrix_text(std::iter::repeat_n(q, 64))
}

/// Inputs of the parameter file.
struct Parameters<'a> {
    basename: &'a str,
    stream: Stream,
    quality: usize,
    frames: usize,
    columns: usize,
    rows: usize,
    vertical_factor: u32,
}

impl Parameters<'_> {
    /// Renders the encoder parameter file, one value or value group per line.
    fn render(&self) -> String {
        let mpeg1 = self.stream == Stream::Mpeg1;
        let pick = |a: &'static str, b: &'static str| if mpeg1 { a } else { b };
        let matrix = |ext: &str| {
            if self.quality == 0 {
                "-".to_string()
            } else {
                format!("{}.{ext}", self.basename)
            }
        };
        let (width, height) = (even(self.columns), even(self.rows));
        let high_quality = self.quality > 98;
        let lines: Vec<String> = vec![
            "MPEG".into(),
            format!("{}.%d", self.basename),
            "-".into(),
            matrix("iqm"),
            matrix("niq"),
            format!("{}.log", self.basename),
            "1".into(),
            self.frames.to_string(),
            "0".into(),
            "00:00:00:00".into(),
            if high_quality { "1" } else { pick("12", "15") }.into(),
            if high_quality { "1" } else { "3" }.into(),
            pick("1", "0").into(),
            "0".into(),
            width.to_string(),
            height.to_string(),
            pick("8", "2").into(),
            pick("3", "5").into(),
            pick("1.152e+06", "5e+06").into(),
            pick("20", "112").into(),
            "0".into(),
            pick("1", "0").into(),
            pick("4", "1").into(),
            pick("8", "4").into(),
            pick("1", "0").into(),
            if self.vertical_factor == 2 { "1" } else { "2" }.into(),
            pick("1", "2").into(),
            "5".into(),
            "5".into(),
            pick("5", "4").into(),
            width.to_string(),
            height.to_string(),
            "0".into(),
            pick("0", "1").into(),
            pick("1 1 1", "0 0 0").into(),
            "0 0 0".into(),
            pick("0 0 0", "1 1 1").into(),
            pick("0 0 0", "1 0 0").into(),
            "0 0 0".into(),
            "0".into(),
            pick("1", "0").into(),
            "0".into(),
            "0".into(),
            "0".into(),
            "0".into(),
            "0".into(),
            "0".into(),
            "0".into(),
            "0".into(),
            "0".into(),
            "2 2 11 11".into(),
            "1 1 3 3".into(),
            "1 1 7 7".into(),
            "1 1 7 7".into(),
            "1 1 3 3".into(),
        ];
        let mut text = lines.join("\n");
        text.push('\n');
        text
    }
}

/// Planar 8-bit Y, Cb, Cr with chroma averaged over 2x`vertical` blocks.
/// Odd extents are padded by repeating the last column and row.
fn yuv_frame(image: &Image, vertical: u32) -> Vec<u8> {
    let (columns, rows) = (image.columns(), image.rows());
    let (width, height) = (even(columns), even(rows));
    let vertical = vertical.max(1) as usize;
    let to_byte = |v: f64| (v / 257.0).round().clamp(0.0, 255.0) as u8;
    let sample = |x: usize, y: usize| {
        let p = image.pixel_row(y.min(rows - 1))[x.min(columns - 1)];
        let (r, g, b) = (p.red as f64, p.green as f64, p.blue as f64);
        let luma = 0.299 * r + 0.587 * g + 0.114 * b;
        let cb = -0.168736 * r - 0.331264 * g + 0.5 * b;
        let cr = 0.5 * r - 0.418688 * g - 0.081312 * b;
        (luma, cb, cr)
    };
    let chroma_rows = height / vertical;
    let mut out = Vec::with_capacity(width * height + 2 * (width / 2) * chroma_rows);
    for y in 0..height {
        for x in 0..width {
            out.push(to_byte(sample(x, y).0));
        }
    }
    let half = 32767.5;
    for plane in 0..2 {
        for cy in 0..chroma_rows {
            for cx in 0..width / 2 {
                let mut sum = 0.0;
                for dy in 0..vertical {
                    for dx in 0..2 {
                        let (_, cb, cr) = sample(cx * 2 + dx, cy * vertical + dy);
                        sum += if plane == 0 { cb } else { cr };
                    }
                }
                out.push(to_byte(sum / (2 * vertical) as f64 + half));
            }
        }
    }
    out
}

/// Encodes through the `mpeg-encode` delegate.
pub fn encode(info: &ImageInfo, list: &mut ImageList, blob: &mut Blob, ctx: &mut Context) -> IoResult<()> {
    let Some(first) = list.first() else {
        return Ok(());
    };
    let aligned = list.iter().all(|i| {
        i.columns() == first.columns()
            && i.rows() == first.rows()
            && i.page.x == first.page.x
            && i.page.y == first.page.y
    });
    let coalesced;
    let frames: &ImageList = if aligned {
        list
    } else {
        coalesced = coalesce(list)?;
        &coalesced
    };
    let Some(first) = frames.first() else {
        return Ok(());
    };

    let stream = if info.magick.eq_ignore_ascii_case("M2V") {
        Stream::Mpeg2
    } else {
        Stream::Mpeg1
    };
    let unable = || {
        IoError::codec(
            CodecErrorKind::UnableToWriteMPEGParameters,
            info.filename.clone(),
        )
    };
    let vertical = vertical_factor(info, stream).ok_or_else(unable)?;
    let quality = if info.quality != 0 { info.quality } else { first.quality };

    let scratch = resource::unique_dir()?;
    let base = scratch.path().join("mpeg");
    let basename = path_str(&base);
    let total: usize = frames.iter().map(frame_repeat).sum();
    let parameters = Parameters {
        basename: &basename,
        stream,
        quality,
        frames: total,
        columns: first.columns(),
        rows: first.rows(),
        vertical_factor: vertical,
    };
    let write = |path: &Path, data: &[u8]| {
        fs::write(path, data).map_err(|e| fs_error(IoErrorKind::Write, path, e))
    };
    write(&base, parameters.render().as_bytes()).map_err(|_| unable())?;
    if quality != 0 {
        write(&scratch.path().join("mpeg.iqm"), intra_matrix(quality).as_bytes())?;
        write(&scratch.path().join("mpeg.niq"), non_intra_matrix(quality).as_bytes())?;
    }

    let mut count = 0usize;
    for (index, image) in frames.iter().enumerate() {
        let data = yuv_frame(image, vertical);
        for _ in 0..frame_repeat(image) {
            write(&scratch.path().join(format!("mpeg.{count}.yuv")), &data)?;
            count += 1;
        }
        debug!(scene = image.scene, first = count - frame_repeat(image), "wrote yuv frames");
        ctx.progress(MODULE, index as u64, frames.len() as u64)?;
    }

    let output = scratch.path().join("output.mpg");
    ctx.delegates().invoke(
        MPEG_ENCODE,
        &DelegateArgs {
            input: &basename,
            output: &path_str(&output),
            unique: &basename,
        },
    )?;
    let encoded = fs::read(&output).map_err(|e| fs_error(IoErrorKind::Read, &output, e))?;
    blob.write_bytes(&encoded)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_repeat() {
        let mut image = Image::new(2, 2).unwrap();
        assert_eq!(frame_repeat(&image), 1);
        image.delay = 10;
        image.ticks_per_second = 100;
        assert_eq!(frame_repeat(&image), 3);
        image.delay = 1;
        image.ticks_per_second = 1;
        assert_eq!(frame_repeat(&image), 33);
    }

    #[test]
    fn test_sampling_factor_validation() {
        let mut info = ImageInfo::new("a.mpg");
        assert_eq!(vertical_factor(&info, Stream::Mpeg1), Some(2));
        info.sampling_factor = Some("2x1".into());
        assert_eq!(vertical_factor(&info, Stream::Mpeg1), None);
        assert_eq!(vertical_factor(&info, Stream::Mpeg2), Some(1));
        info.sampling_factor = Some("2".into());
        assert_eq!(vertical_factor(&info, Stream::Mpeg2), Some(2));
        info.sampling_factor = Some("4x4".into());
        assert_eq!(vertical_factor(&info, Stream::Mpeg2), None);
    }

    #[test]
    fn test_parameter_file() {
        let text = Parameters {
            basename: "/tmp/b",
            stream: Stream::Mpeg1,
            quality: 0,
            frames: 7,
            columns: 33,
            rows: 20,
            vertical_factor: 2,
        }
        .render();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "MPEG");
        assert_eq!(lines[1], "/tmp/b.%d");
        assert_eq!(lines[3], "-");
        assert_eq!(lines[5], "/tmp/b.log");
        assert_eq!(lines[7], "7");
        assert_eq!(lines[10], "12");
        assert_eq!(lines[14], "34");
        assert_eq!(lines[15], "20");
        assert_eq!(lines[18], "1.152e+06");
        assert_eq!(lines[25], "1");
        assert_eq!(*lines.last().unwrap(), "1 1 3 3");

        let m2v = Parameters {
            basename: "b",
            stream: Stream::Mpeg2,
            quality: 99,
            frames: 1,
            columns: 2,
            rows: 2,
            vertical_factor: 1,
        }
        .render();
        let lines: Vec<&str> = m2v.lines().collect();
        assert_eq!(lines[3], "b.iqm");
        assert_eq!(lines[10], "1");
        assert_eq!(lines[25], "2");
    }

    #[test]
    fn test_quantizer_matrices() {
        let intra = intra_matrix(75);
        assert_eq!(intra.lines().count(), 8);
        assert!(intra.starts_with(" 8 16 19"));
        let niq = non_intra_matrix(75);
        assert_eq!(niq.split_whitespace().count(), 64);
        assert!(niq.split_whitespace().all(|v| v == "16"));
    }

    #[test]
    fn test_yuv_layout() {
        let image = Image::new(3, 1).unwrap();
        let yuv = yuv_frame(&image, 2);
        // 4x2 luma, then two 2x1 chroma planes.
        assert_eq!(yuv.len(), 8 + 2 + 2);
        assert!(yuv[..8].iter().all(|&v| v == 0));
        assert!(yuv[8..].iter().all(|&v| v == 128));
    }

    #[cfg(unix)]
    #[test]
    fn test_decode_through_delegate() {
        use std::sync::Arc;

        use crate::delegate::DelegateTable;

        let table = DelegateTable::new();
        table.set(
            MPEG_DECODE,
            "sh -c \"printf 'P2 1 1 255 10' > %u0.ppm; printf 'P2 1 1 255 20' > %u1.ppm\"",
        );
        let mut ctx = Context::new().with_delegates(Arc::new(table));
        let info = ImageInfo::new("clip.mpg").with_magick("MPEG");
        let mut blob = Blob::from_memory(vec![0, 0, 1, 0xB3]);
        let list = decode(&info, &mut blob, &mut ctx).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].scene, 1);
        assert_eq!(list[0].magick, "MPEG");

        let info = info.with_scenes(1, 1);
        let list = decode(&info, &mut Blob::from_memory(vec![0, 0, 1, 0xB3]), &mut ctx).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].scene, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_encode_through_delegate() {
        use std::sync::Arc;

        use crate::delegate::DelegateTable;

        let table = DelegateTable::new();
        table.set(MPEG_ENCODE, "sh -c \"cat %i.0.yuv > %o\"");
        let mut ctx = Context::new().with_delegates(Arc::new(table));
        let mut list = ImageList::new();
        list.append(Image::new(2, 2).unwrap());
        let mut out = Blob::memory_writer();
        encode(&ImageInfo::new("a.mpg").with_magick("MPEG"), &mut list, &mut out, &mut ctx).unwrap();
        assert_eq!(out.into_memory().unwrap(), vec![0, 0, 0, 0, 128, 128]);
    }
}
