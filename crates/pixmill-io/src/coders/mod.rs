//! Built-in coders.
//!
//! Each module registers one or more tags through a `coder_info()` function
//! and exposes plain `decode` / `encode` entry points matching
//! [`DecodeFn`](crate::registry::DecodeFn) and
//! [`EncodeFn`](crate::registry::EncodeFn).
//!
//! | Module | Tags |
//! |--------|------|
//! | [`raw`] | RGB, RGBA, RGBO, GRAY, YCbCr, YCbCrA |
//! | [`pnm`] | PNM, PBM, PGM, PPM, PAM, PFM |
//! | [`fits`] | FITS, FTS |
//! | [`vicar`] | VICAR |
//! | [`ipl`] | IPL |
//! | [`tiff`] | TIFF, TIF, TIFF64, PTIF |
//! | [`mpeg`] | MPEG, MPG, M2V |

use pixmill_core::{Image, ImageInfo, Severity};

use crate::context::Context;
use crate::error::IoResult;
use crate::registry::CoderInfo;

pub mod fits;
pub mod ipl;
pub mod mpeg;
pub mod pnm;
pub mod raw;
pub mod tiff;
pub mod vicar;

/// Every built-in coder entry.
pub fn builtin() -> Vec<CoderInfo> {
    let mut coders = Vec::new();
    coders.extend(raw::coder_info());
    coders.extend(pnm::coder_info());
    coders.extend(fits::coder_info());
    coders.extend(vicar::coder_info());
    coders.extend(ipl::coder_info());
    coders.extend(tiff::coder_info());
    coders.extend(mpeg::coder_info());
    coders
}

/// Gives `image` its extent: pixels when reading, dimensions only when
/// pinging.
pub(crate) fn allocate(image: &mut Image, info: &ImageInfo, columns: usize, rows: usize) -> IoResult<()> {
    if info.ping {
        image.set_dimensions(columns, rows);
    } else {
        image.set_extent(columns, rows)?;
    }
    Ok(())
}

/// Header-only frame that continues a sequence after `previous`.
pub(crate) fn next_frame(info: &ImageInfo, previous: &Image) -> Image {
    let mut image = Image::from_info(info);
    image.scene = previous.scene + 1;
    image.filename = previous.filename.clone();
    image
}

/// Records the standard short-read warning.
pub(crate) fn warn_eof(ctx: &Context, image: &mut Image, module: &str) {
    ctx.warn_image(image, module, Severity::CorruptImageWarning, "UnexpectedEndOfFile");
}
