//! Top-level read and write entry points.
//!
//! [`read_image`] and [`write_image`] pick a coder, open the stream the
//! coder needs, run it under the coder's lock and tidy the result:
//!
//! 1. `@file` names expand to the whitespace-separated names inside `file`.
//! 2. A trailing `[0,2-4]` selects scenes.
//! 3. The format comes from a `TAG:` prefix, then from the magic bytes,
//!    then from the filename suffix. A suffix naming a raw format wins over
//!    magic detection since raw formats have no signature.
//! 4. Coders that need to seek get a spooled copy of pipes; coders that
//!    cannot work on memory get a staged temporary file.
//! 5. Tags without a coder fall back to the `<tag>-decode` or
//!    `<tag>-encode` delegate, which exchanges PNM files with pixmill.
//!
//! After decoding, `EXIF:`/`TIFF:` orientation and resolution properties
//! are folded into the image fields, `extract` crops or resizes, and
//! profiles stored under alias names move to their canonical names.
//!
//! Writes go to a temporary file next to the target that is renamed into
//! place once the coder succeeds. A multi-frame list sent to a coder without
//! `adjoin` becomes one file per frame.

use std::fs;
use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;

use pixmill_core::quantum::{
    clamp_to_quantum, scale_any_to_quantum, scale_char_to_quantum, scale_short_to_quantum,
};
use pixmill_core::{
    transform, Colorspace, Compression, Endian, Geometry, Image, ImageInfo, ImageList, Interlace, Orientation,
    PixelPacket, Quantum, ResolutionUnits, SceneSpec, QUANTUM_RANGE,
};
use tracing::{debug, trace};

use crate::blob::{Blob, BlobMode};
use crate::coders::pnm;
use crate::context::Context;
use crate::delegate::DelegateArgs;
use crate::error::{CodecErrorKind, IoError, IoErrorKind, IoResult, OptionErrorKind};
use crate::registry::{CoderInfo, Registry, ThreadSupport, MAGIC_LENGTH};
use crate::resource;

/// Profiles some coders store under another name.
const PROFILE_ALIASES: &[(&str, &str)] = &[
    ("icm", "icc"),
    ("tiff:34675", "icc"),
    ("tiff:33723", "iptc"),
    ("tiff:34377", "8bim"),
    ("tiff:700", "xmp"),
];

// === Name handling ===

/// Splits `TAG:rest` when `TAG` is a known format or delegate.
fn split_prefix(filename: &str, registry: &Registry, ctx: &Context) -> Option<(String, String)> {
    let (tag, rest) = filename.split_once(':')?;
    if tag.len() < 2 || !tag.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    let lower = tag.to_ascii_lowercase();
    let known = registry.contains(tag)
        || ctx.delegates().get(&format!("{lower}-decode")).is_some()
        || ctx.delegates().get(&format!("{lower}-encode")).is_some();
    known.then(|| (tag.to_ascii_uppercase(), rest.to_string()))
}

/// Splits `name[spec]` when `spec` is a scene list and `name[spec]` is not
/// itself an existing file.
fn split_scenes(filename: &str) -> Option<(String, String)> {
    let body = filename.strip_suffix(']')?;
    let open = body.rfind('[')?;
    let spec = &body[open + 1..];
    if !SceneSpec::looks_like(spec) || Path::new(filename).exists() {
        return None;
    }
    Some((body[..open].to_string(), spec.to_string()))
}

fn suffix_tag(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_uppercase())
        .filter(|ext| !ext.is_empty())
}

/// Name of frame `scene` when a list is split into files. A printf-style
/// `%d` (with optional zero padding and width) is replaced by the scene;
/// otherwise `-<scene>` goes before the extension.
pub fn frame_filename(template: &str, scene: usize) -> String {
    if let Some(start) = template.find('%') {
        let spec = &template[start + 1..];
        let digits = spec.chars().take_while(|c| c.is_ascii_digit()).count();
        if spec[digits..].starts_with('d') {
            let flags = &spec[..digits];
            let width: usize = flags.parse().unwrap_or(0);
            let number = if flags.starts_with('0') {
                format!("{scene:0width$}")
            } else {
                format!("{scene:width$}")
            };
            return format!("{}{}{}", &template[..start], number, &spec[digits + 1..]);
        }
    }
    let path = Path::new(template);
    match (path.file_stem(), path.extension()) {
        (Some(stem), Some(ext)) => path
            .with_file_name(format!("{}-{}.{}", stem.to_string_lossy(), scene, ext.to_string_lossy()))
            .to_string_lossy()
            .into_owned(),
        _ => format!("{template}-{scene}"),
    }
}

// === Property interpretation ===

/// Parses `72`, `72.5` or a rational `72/1`.
fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim();
    match text.split_once('/') {
        Some((n, d)) => {
            let n: f64 = n.trim().parse().ok()?;
            let d: f64 = d.trim().parse().ok()?;
            (d != 0.0).then(|| n / d)
        }
        None => text.parse().ok(),
    }
}

/// Moves `EXIF:`/`TIFF:` orientation and resolution properties into the
/// image fields and removes them.
fn interpret_properties(image: &mut Image) {
    for prefix in ["exif", "tiff"] {
        let mut take = |key: &str| {
            image
                .properties
                .remove(&format!("{prefix}:{key}"))
                .and_then(|v| parse_number(&v))
        };
        let orientation = take("Orientation");
        let x = take("XResolution");
        let y = take("YResolution");
        let unit = take("ResolutionUnit");
        if let Some(value) = orientation {
            image.orientation = Orientation::from_tag(value as u32);
        }
        if let Some(value) = x {
            image.x_resolution = value;
        }
        if let Some(value) = y {
            image.y_resolution = value;
        }
        if let Some(value) = unit {
            image.units = ResolutionUnits::from_index(value as i64 - 1);
        }
    }
}

fn hoist_profiles(image: &mut Image) {
    for &(alias, name) in PROFILE_ALIASES {
        if image.profiles.get(name).is_none() {
            if let Some(data) = image.profiles.remove(alias) {
                image.profiles.set(name, data);
            }
        }
    }
}

/// Crops (geometry with an offset) or resizes (size only) to `extract`.
fn apply_extract(image: Image, extract: &str) -> IoResult<Image> {
    let Ok(geometry) = Geometry::parse(extract) else {
        return Ok(image);
    };
    let rect = geometry.to_rectangle(image.columns(), image.rows());
    if !image.has_pixels()
        || rect.is_empty()
        || (rect.width == image.columns() && rect.height == image.rows())
    {
        return Ok(image);
    }
    let result = if geometry.has_offset() {
        transform::crop(&image, rect)?
    } else {
        transform::resize(&image, rect.width, rect.height)?
    };
    Ok(result)
}

// === Reading ===

/// Picks the coder for a read, peeking at the blob when needed.
fn resolve_decoder(
    info: &mut ImageInfo,
    blob: &mut Blob,
    registry: &Registry,
) -> IoResult<Option<Arc<CoderInfo>>> {
    if info.affirm && !info.magick.is_empty() {
        return Ok(registry.get(&info.magick));
    }
    let by_suffix = suffix_tag(&info.filename).and_then(|tag| registry.get(&tag));
    if let Some(coder) = by_suffix.as_ref().filter(|c| c.raw) {
        info.magick = coder.tag.clone();
        return Ok(Some(coder.clone()));
    }
    if blob.is_closed() {
        return Ok(by_suffix);
    }
    blob.promote_to_seekable()?;
    let header = blob.read_up_to(MAGIC_LENGTH)?;
    blob.seek_to(SeekFrom::Start(0))?;
    let detected = registry.detect(&header).or(by_suffix);
    if let Some(coder) = &detected {
        info.magick = coder.tag.clone();
    }
    Ok(detected)
}

fn open_input(info: &ImageInfo, partition: bool) -> IoResult<Blob> {
    if let Some(data) = &info.blob {
        let mut blob = Blob::from_memory(data.clone());
        blob.set_filename(&info.filename);
        return Ok(blob);
    }
    if partition {
        return Ok(Blob::detached(&info.filename, BlobMode::ReadBinary));
    }
    Blob::open(&info.filename, BlobMode::ReadBinary)
}

/// Copies a memory blob into a temporary file for coders that need a path.
fn stage_input(blob: &mut Blob, suffix: &str) -> IoResult<(Blob, tempfile::TempPath)> {
    let staged = resource::unique_path(suffix)?;
    let data = blob.read_remaining()?;
    fs::write(&staged, data).map_err(|e| IoError::io_source(IoErrorKind::Write, staged.to_string_lossy(), e))?;
    let reopened = Blob::open_path(&staged, BlobMode::ReadBinary)?;
    trace!(staged = %staged.display(), "staged input for path-only coder");
    Ok((reopened, staged))
}

/// Runs the `<tag>-decode` delegate and reads its PNM output.
fn decode_with_delegate(
    info: &ImageInfo,
    tag: &str,
    blob: &mut Blob,
    ctx: &mut Context,
) -> IoResult<Option<ImageList>> {
    let name = format!("{}-decode", tag.to_ascii_lowercase());
    if ctx.delegates().get(&name).is_none() {
        return Ok(None);
    }
    let scratch = resource::unique_dir()?;
    let input = if blob.is_memory() || blob.filename() == "-" {
        let path = scratch.path().join(format!("input.{}", tag.to_ascii_lowercase()));
        let data = blob.read_remaining()?;
        fs::write(&path, data).map_err(|e| IoError::io_source(IoErrorKind::Write, path.to_string_lossy(), e))?;
        path.to_string_lossy().into_owned()
    } else {
        blob.filename().to_string()
    };
    let output = scratch.path().join("output.pnm").to_string_lossy().into_owned();
    let unique = scratch.path().join("frame").to_string_lossy().into_owned();
    ctx.delegates().invoke(
        &name,
        &DelegateArgs {
            input: &input,
            output: &output,
            unique: &unique,
        },
    )?;
    let mut pnm_info = info.clone();
    pnm_info.filename = output.clone();
    pnm_info.magick = "PNM".to_string();
    pnm_info.blob = None;
    let mut pnm_blob = Blob::open(&output, BlobMode::ReadBinary)?;
    let list = pnm::decode(&pnm_info, &mut pnm_blob, ctx)?;
    pnm_blob.close()?;
    Ok(Some(list))
}

fn read_list_file(info: &ImageInfo, path: &str, registry: &Registry, ctx: &mut Context) -> IoResult<ImageList> {
    let text = fs::read_to_string(path).map_err(|e| IoError::io_source(IoErrorKind::OpenFailed, path, e))?;
    let mut list = ImageList::new();
    for entry in text.split_whitespace() {
        let mut entry_info = info.clone();
        entry_info.filename = entry.to_string();
        entry_info.blob = None;
        list.append_list(read_image_with(&entry_info, registry, ctx)?);
    }
    Ok(list)
}

/// Reads every frame `info` selects using the global registry.
pub fn read_image(info: &ImageInfo) -> IoResult<ImageList> {
    read_image_with(info, Registry::global(), &mut Context::new())
}

/// Reads headers only: frames carry dimensions and metadata, no pixels.
pub fn ping_image(info: &ImageInfo) -> IoResult<ImageList> {
    let info = info.clone().with_ping(true);
    read_image_with(&info, Registry::global(), &mut Context::new())
}

/// Decodes `data`; `info.filename` still guides suffix detection.
pub fn read_image_blob(info: &ImageInfo, data: Vec<u8>) -> IoResult<ImageList> {
    let info = info.clone().with_blob(data);
    read_image_with(&info, Registry::global(), &mut Context::new())
}

/// Reads with an explicit registry and context. Warnings raised by the
/// coder are copied into `ctx.exceptions`.
pub fn read_image_with(info: &ImageInfo, registry: &Registry, ctx: &mut Context) -> IoResult<ImageList> {
    if info.blob.is_none() {
        if let Some(path) = info.filename.strip_prefix('@') {
            return read_list_file(info, path, registry, ctx);
        }
    }
    let mut info = info.clone();
    let original_name = info.filename.clone();
    if let Some((tag, rest)) = split_prefix(&info.filename, registry, ctx) {
        info.magick = tag;
        info.affirm = true;
        info.filename = rest;
    }
    if let Some((name, spec)) = split_scenes(&info.filename) {
        info.filename = name;
        info.scenes = Some(spec);
    }
    let scenes = match info.scenes.as_deref() {
        Some(text) => Some(SceneSpec::parse(text)?),
        None => None,
    };
    if let Some(spec) = &scenes {
        if let (Some(low), Some(high)) = (spec.min(), spec.max()) {
            info.scene = low;
            info.number_scenes = high - low + 1;
        }
    }
    debug!(filename = %info.filename, magick = %info.magick, ping = info.ping, "read image");

    let suffix_coder = suffix_tag(&info.filename).and_then(|tag| registry.get(&tag));
    let named_coder = if info.magick.is_empty() {
        suffix_coder
    } else {
        registry.get(&info.magick).or(suffix_coder)
    };
    let partition = info.interlace == Interlace::Partition
        && info.blob.is_none()
        && named_coder.is_some_and(|c| c.raw);
    let mut blob = open_input(&info, partition)?;
    let coder = resolve_decoder(&mut info, &mut blob, registry)?;
    let decoder = coder.as_ref().and_then(|c| c.decoder.map(|d| (c.clone(), d)));

    let list = match decoder {
        Some((coder, decode)) => {
            if coder.seekable_stream && !blob.is_closed() {
                blob.promote_to_seekable()?;
            }
            let mut staged = None;
            if !coder.blob_support && blob.is_memory() {
                let suffix = format!(".{}", coder.tag.to_ascii_lowercase());
                let (reopened, path) = stage_input(&mut blob, &suffix)?;
                blob = reopened;
                info.filename = path.to_string_lossy().into_owned();
                staged = Some(path);
            }
            let result = {
                let _guard = coder.acquire(ThreadSupport::DECODER);
                decode(&info, &mut blob, ctx)
            };
            blob.close()?;
            drop(staged);
            let mut list = result?;
            for image in list.iter_mut() {
                image.magick = coder.tag.clone();
            }
            list
        }
        None => {
            let tag = if info.magick.is_empty() {
                suffix_tag(&info.filename).unwrap_or_default()
            } else {
                info.magick.clone()
            };
            let delegated = decode_with_delegate(&info, &tag, &mut blob, ctx)?;
            blob.close()?;
            let mut list = delegated.ok_or_else(|| {
                IoError::codec(CodecErrorKind::NoDecoder, format!("{tag} ({})", info.filename))
            })?;
            for image in list.iter_mut() {
                image.magick = tag.clone();
            }
            list
        }
    };

    let mut finished = ImageList::new();
    for mut image in list {
        ctx.absorb(&image);
        image.filename = original_name.clone();
        image.magick_filename = original_name.clone();
        interpret_properties(&mut image);
        hoist_profiles(&mut image);
        if let Some(extract) = info.extract.as_deref() {
            image = apply_extract(image, extract)?;
        }
        if image.page.width == 0 {
            image.page.width = image.columns();
        }
        if image.page.height == 0 {
            image.page.height = image.rows();
        }
        finished.append(image);
    }
    if let (Some(spec), Some(text)) = (&scenes, info.scenes.as_deref()) {
        if finished.iter().any(|image| !spec.contains(image.scene)) {
            finished = finished.clone_by_scenes(text)?;
        }
    }
    if finished.is_empty() {
        return Err(IoError::option(
            OptionErrorKind::SubimageSpecifierMatchedNoImages,
            info.filename,
        ));
    }
    debug!(frames = finished.len(), "read complete");
    Ok(finished)
}

// === Writing ===

/// Where one encoder call sends its bytes.
enum Target {
    /// Memory sink returned to the caller.
    Memory,
    /// Standard output.
    Stdout,
    /// Filename the encoder manages itself.
    Detached(String),
    /// Regular file written through a temporary sibling.
    File(String),
}

fn target_for(filename: &str, memory: bool, coder: Option<&CoderInfo>, info: &ImageInfo) -> Target {
    if memory {
        Target::Memory
    } else if filename == "-" {
        Target::Stdout
    } else if info.interlace == Interlace::Partition && coder.is_some_and(|c| c.raw) {
        Target::Detached(filename.to_string())
    } else {
        Target::File(filename.to_string())
    }
}

/// Runs `encode` for one output. Returns the bytes for memory targets.
fn run_encoder(
    info: &ImageInfo,
    list: &mut ImageList,
    coder: &CoderInfo,
    target: Target,
    ctx: &mut Context,
) -> IoResult<Option<Vec<u8>>> {
    let Some(encode) = coder.encoder else {
        return Err(IoError::codec(CodecErrorKind::NoEncoder, coder.tag.clone()));
    };
    let _guard = coder.acquire(ThreadSupport::ENCODER);
    match target {
        Target::Memory if coder.blob_support => {
            let mut blob = Blob::memory_writer();
            blob.set_filename(&info.filename);
            encode(info, list, &mut blob, ctx)?;
            Ok(blob.into_memory())
        }
        Target::Memory => {
            let staged = resource::unique_path(&format!(".{}", coder.tag.to_ascii_lowercase()))?;
            let mut staged_info = info.clone();
            staged_info.filename = staged.to_string_lossy().into_owned();
            let mut blob = Blob::open_path(&staged, BlobMode::WriteBinary)?;
            encode(&staged_info, list, &mut blob, ctx)?;
            blob.close()?;
            let data = fs::read(&staged).map_err(|e| IoError::io_source(IoErrorKind::Read, staged.to_string_lossy(), e))?;
            Ok(Some(data))
        }
        Target::Stdout => {
            let mut blob = Blob::open("-", BlobMode::WriteBinary)?;
            encode(info, list, &mut blob, ctx)?;
            blob.close()?;
            Ok(None)
        }
        Target::Detached(name) => {
            let mut blob = Blob::detached(&name, BlobMode::WriteBinary);
            encode(info, list, &mut blob, ctx)?;
            Ok(None)
        }
        Target::File(name) => {
            let temp = resource::unique_file_in(&resource::staging_dir(&name))?;
            let mut blob = Blob::open_path(temp.path(), BlobMode::WriteBinary)?;
            blob.set_filename(&name);
            encode(info, list, &mut blob, ctx)?;
            blob.close()?;
            temp.persist(&name)
                .map_err(|e| IoError::io_source(IoErrorKind::Write, name.clone(), e.error))?;
            trace!(target = %name, "renamed into place");
            Ok(None)
        }
    }
}

/// Writes a PNM through the `<tag>-encode` delegate.
fn encode_with_delegate(
    info: &ImageInfo,
    tag: &str,
    list: &mut ImageList,
    memory: bool,
    ctx: &mut Context,
) -> IoResult<Option<Option<Vec<u8>>>> {
    let name = format!("{}-encode", tag.to_ascii_lowercase());
    if ctx.delegates().get(&name).is_none() {
        return Ok(None);
    }
    let scratch = resource::unique_dir()?;
    let input = scratch.path().join("input.pnm");
    let mut pnm_info = info.clone();
    pnm_info.filename = input.to_string_lossy().into_owned();
    pnm_info.magick = "PNM".to_string();
    let mut blob = Blob::open_path(&input, BlobMode::WriteBinary)?;
    pnm::encode(&pnm_info, list, &mut blob, ctx)?;
    blob.close()?;
    let output = if memory {
        scratch.path().join(format!("output.{}", tag.to_ascii_lowercase()))
    } else {
        Path::new(&info.filename).to_path_buf()
    };
    ctx.delegates().invoke(
        &name,
        &DelegateArgs {
            input: &pnm_info.filename,
            output: &output.to_string_lossy(),
            unique: &scratch.path().join("frame").to_string_lossy(),
        },
    )?;
    if memory {
        let data = fs::read(&output).map_err(|e| IoError::io_source(IoErrorKind::Read, output.to_string_lossy(), e))?;
        return Ok(Some(Some(data)));
    }
    Ok(Some(None))
}

/// Writes `list` using the global registry.
pub fn write_image(info: &ImageInfo, list: &mut ImageList) -> IoResult<()> {
    write_image_with(info, list, Registry::global(), &mut Context::new()).map(|_| ())
}

/// Encodes `list` into memory.
pub fn write_image_blob(info: &ImageInfo, list: &mut ImageList) -> IoResult<Vec<u8>> {
    let mut ctx = Context::new();
    let data = write_output(info, list, Registry::global(), &mut ctx, true)?;
    Ok(data.unwrap_or_default())
}

/// Writes with an explicit registry and context.
pub fn write_image_with(
    info: &ImageInfo,
    list: &mut ImageList,
    registry: &Registry,
    ctx: &mut Context,
) -> IoResult<()> {
    write_output(info, list, registry, ctx, false).map(|_| ())
}

fn write_output(
    info: &ImageInfo,
    list: &mut ImageList,
    registry: &Registry,
    ctx: &mut Context,
    memory: bool,
) -> IoResult<Option<Vec<u8>>> {
    let mut info = info.clone();
    if let Some((tag, rest)) = split_prefix(&info.filename, registry, ctx) {
        info.magick = tag;
        info.affirm = true;
        info.filename = rest;
    }
    if info.magick.is_empty() || !info.affirm {
        let from_suffix = suffix_tag(&info.filename).filter(|tag| {
            registry.contains(tag) || ctx.delegates().get(&format!("{}-encode", tag.to_ascii_lowercase())).is_some()
        });
        let from_image = list.first().map(|image| image.magick.clone()).filter(|m| !m.is_empty());
        if let Some(tag) = from_suffix.or(from_image) {
            info.magick = tag.to_ascii_uppercase();
        }
    }
    if info.magick.is_empty() {
        return Err(IoError::codec(CodecErrorKind::NoEncoder, info.filename));
    }
    debug!(filename = %info.filename, magick = %info.magick, frames = list.len(), "write image");

    let coder = registry.get(&info.magick).filter(|c| c.encoder.is_some());
    if let Some(coder) = &coder {
        info.magick = coder.tag.clone();
    }
    if !list.scenes_increasing() {
        list.normalize_scenes();
    }
    for image in list.iter_mut() {
        if info.depth != 0 {
            image.depth = info.depth;
        }
        if info.compression != Compression::Undefined {
            image.compression = info.compression;
        }
        if info.endian != Endian::Undefined {
            image.endian = info.endian;
        }
        image.filename = info.filename.clone();
        image.magick = info.magick.clone();
    }

    let Some(coder) = coder else {
        let tag = info.magick.clone();
        return encode_with_delegate(&info, &tag, list, memory, ctx)?
            .ok_or_else(|| IoError::codec(CodecErrorKind::NoEncoder, format!("{tag} ({})", info.filename)));
    };

    if list.len() > 1 && (!coder.adjoin || !info.adjoin) && !memory && info.filename != "-" {
        for image in list.iter() {
            let mut frame_info = info.clone();
            frame_info.filename = frame_filename(&info.filename, image.scene);
            frame_info.adjoin = false;
            let mut single = ImageList::from(image.clone());
            if let Some(first) = single.first_mut() {
                first.filename = frame_info.filename.clone();
            }
            let target = target_for(&frame_info.filename, false, Some(&coder), &frame_info);
            run_encoder(&frame_info, &mut single, &coder, target, ctx)?;
        }
        return Ok(None);
    }
    if !coder.adjoin {
        info.adjoin = false;
    }
    let target = target_for(&info.filename, memory, Some(&coder), &info);
    run_encoder(&info, list, &coder, target, ctx)
}

// === Construction from caller buffers ===

/// Caller-owned samples for [`constitute_image`].
#[derive(Debug, Clone, Copy)]
pub enum PixelStorage<'a> {
    /// 8-bit unsigned samples.
    U8(&'a [u8]),
    /// 16-bit unsigned samples.
    U16(&'a [u16]),
    /// 32-bit unsigned samples.
    U32(&'a [u32]),
    /// Floats in `0.0..=1.0`.
    F32(&'a [f32]),
    /// Doubles in `0.0..=1.0`.
    F64(&'a [f64]),
}

impl PixelStorage<'_> {
    fn len(&self) -> usize {
        match self {
            Self::U8(s) => s.len(),
            Self::U16(s) => s.len(),
            Self::U32(s) => s.len(),
            Self::F32(s) => s.len(),
            Self::F64(s) => s.len(),
        }
    }

    fn quantum(&self, i: usize) -> Quantum {
        match self {
            Self::U8(s) => scale_char_to_quantum(s[i]),
            Self::U16(s) => scale_short_to_quantum(s[i]),
            Self::U32(s) => scale_any_to_quantum(s[i] as u64, 32),
            Self::F32(s) => clamp_to_quantum(s[i] as f64 * QUANTUM_RANGE as f64),
            Self::F64(s) => clamp_to_quantum(s[i] * QUANTUM_RANGE as f64),
        }
    }
}

/// Builds an image from interleaved samples. `map` names one channel per
/// sample: `R G B` color, `A` alpha, `O` opacity, `C M Y K` ink, `I`
/// intensity, `P` padding that is skipped.
pub fn constitute_image(columns: usize, rows: usize, map: &str, pixels: PixelStorage<'_>) -> IoResult<Image> {
    if columns == 0 || rows == 0 {
        return Err(IoError::option(
            OptionErrorKind::NegativeOrZeroImageSize,
            format!("{columns}x{rows}"),
        ));
    }
    let channels: Vec<char> = map.chars().map(|c| c.to_ascii_uppercase()).collect();
    if channels.is_empty() || channels.iter().any(|c| !"RGBAOCMYKIP".contains(*c)) {
        return Err(IoError::option(OptionErrorKind::InvalidOption, format!("channel map '{map}'")));
    }
    let needed = columns
        .checked_mul(rows)
        .and_then(|n| n.checked_mul(channels.len()))
        .ok_or_else(|| {
            IoError::codec(
                CodecErrorKind::InsufficientImageDataInFile,
                format!("{columns}x{rows} {map} overflows"),
            )
        })?;
    if pixels.len() < needed {
        return Err(IoError::codec(
            CodecErrorKind::InsufficientImageDataInFile,
            format!("{} of {needed} samples", pixels.len()),
        ));
    }

    let mut image = Image::new(columns, rows)?;
    let cmyk = channels.iter().any(|c| matches!(c, 'C' | 'M' | 'Y' | 'K'));
    if cmyk {
        image.set_colorspace(Colorspace::Cmyk);
    } else if channels.iter().all(|c| matches!(c, 'I' | 'A' | 'O' | 'P')) {
        image.set_colorspace(Colorspace::Gray);
    }
    image.matte = channels.iter().any(|c| matches!(c, 'A' | 'O'));
    let mut blacks = Vec::with_capacity(if cmyk { columns * rows } else { 0 });
    for (n, p) in image.pixels_mut().iter_mut().enumerate() {
        let mut pixel = PixelPacket::BLACK;
        let mut black = 0.0;
        for (k, channel) in channels.iter().enumerate() {
            let value = pixels.quantum(n * channels.len() + k);
            match channel {
                'R' | 'C' => pixel.red = value,
                'G' | 'M' => pixel.green = value,
                'B' | 'Y' => pixel.blue = value,
                'A' => pixel.opacity = QUANTUM_RANGE - value,
                'O' => pixel.opacity = value,
                'K' => black = value,
                'I' => {
                    pixel.red = value;
                    pixel.green = value;
                    pixel.blue = value;
                }
                _ => {}
            }
        }
        *p = pixel;
        if cmyk {
            blacks.push(black);
        }
    }
    for (slot, black) in image.indexes_mut().iter_mut().zip(blacks) {
        *slot = black;
    }
    image.depth = match pixels {
        PixelStorage::U8(_) => 8,
        PixelStorage::U16(_) => 16,
        _ => 32,
    };
    Ok(image)
}
