//! # pixmill-io
//!
//! Raster codecs and the dispatcher that picks between them.
//!
//! # Architecture
//!
//! - [`Blob`] - byte stream over a file, pipe or memory buffer
//! - [`Registry`] - format tags mapped to [`CoderInfo`] entries
//! - [`Context`] - progress monitor, warning sink and delegate table for one call
//! - [`read_image`] / [`write_image`] - format resolution, stream setup and
//!   post-processing around a coder call
//! - [`quantum`] - pixel packing shared by the sample-oriented coders
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use pixmill_core::ImageInfo;
//! use pixmill_io::{read_image, write_image};
//!
//! // Format comes from magic bytes, a "TAG:" prefix or the suffix
//! let mut frames = read_image(&ImageInfo::new("scan.tif"))?;
//!
//! // Raw formats need a size
//! let info = ImageInfo::new("gray:out.raw").with_size("640x480");
//! write_image(&info, &mut frames)?;
//! ```
//!
//! # Supported Formats
//!
//! | Tag | Read | Write | Notes |
//! |-----|------|-------|-------|
//! | RGB, RGBA, RGBO, GRAY, YCbCr, YCbCrA | Yes | Yes | Raw samples, four interlace modes |
//! | PBM, PGM, PPM, PNM, PAM, PFM | Yes | Yes | Plain and binary, `P1`-`P7`, `PF`/`Pf` |
//! | FITS, FTS | Yes | Yes | 8/16/32-bit integer and IEEE float |
//! | VICAR | Yes | Yes | 8-bit bands |
//! | IPL | Yes | Yes | Scientific stacks |
//! | TIFF, TIF, TIFF64, PTIF | Yes | Yes | Strips, tiles, BigTIFF, pyramids |
//! | MPEG, MPG, M2V | Yes | Yes | Through external delegates |
//!
//! # Feature Flags
//!
//! - `jpeg` - JPEG-in-TIFF (default)
//! - `deflate` - Deflate-in-TIFF (default)
//! - `lzw` - LZW-in-TIFF (default)

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod blob;
pub mod coders;
pub mod constitute;
pub mod context;
pub mod delegate;
pub mod error;
pub mod quantum;
pub mod registry;
pub mod resource;

pub use blob::{Blob, BlobMode};
pub use constitute::{
    constitute_image, ping_image, read_image, read_image_blob, read_image_with, write_image,
    write_image_blob, write_image_with, PixelStorage,
};
pub use context::{Context, ExceptionSink, ProgressMonitor};
pub use delegate::{DelegateArgs, DelegateTable};
pub use error::{CodecErrorKind, IoError, IoErrorKind, IoResult, OptionErrorKind, ResourceErrorKind};
pub use registry::{CoderInfo, Registry, ThreadSupport};
