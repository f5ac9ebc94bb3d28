//! # pixmill-core
//!
//! In-memory raster model shared by every pixmill codec.
//!
//! # Overview
//!
//! - [`Image`] - one frame: pixels, optional colormap and index array,
//!   properties, profiles and format metadata
//! - [`ImageList`] - owned sequence of frames with scene selection
//! - [`ImageInfo`] - read/write configuration and the `format:key` option map
//! - [`quantum`] - the `f32` quantum scalar and depth scaling
//! - [`transform`] - crop, Lanczos resize and coalesce used by codecs
//!
//! # Quantum Model
//!
//! Samples are stored as `f32` in `[0, QUANTUM_RANGE]` (65535). Integer
//! formats of any depth map linearly onto that range; float formats may
//! exceed it and are only clamped on integer export.
//!
//! # Example
//!
//! ```rust
//! use pixmill_core::{Colorspace, Image, PixelPacket, QUANTUM_RANGE};
//!
//! let mut image = Image::new(2, 2).unwrap();
//! image.set_colorspace(Colorspace::Gray);
//! image.set_pixel(0, 0, PixelPacket::gray(QUANTUM_RANGE)).unwrap();
//! assert!(image.is_gray());
//! ```
//!
//! # Dependencies
//!
//! - [`thiserror`] - error derive
//! - [`half`] - 16-bit float samples
//! - [`rayon`] - parallel resize passes

#![warn(missing_docs)]

pub mod colorspace;
pub mod error;
pub mod exception;
pub mod format;
pub mod geometry;
pub mod image;
pub mod info;
pub mod list;
pub mod pixel;
pub mod properties;
pub mod quantum;
pub mod scenes;
pub mod transform;

pub use colorspace::Colorspace;
pub use error::{Error, Result};
pub use exception::{Severity, Warning};
pub use format::{Compression, Endian, Interlace, Orientation, ResolutionUnits, StorageClass};
pub use geometry::{Geometry, RectangleInfo};
pub use image::{ChromaticityInfo, Image, PixelWindow, PrimaryInfo, MAX_COLORMAP_SIZE};
pub use info::{ImageInfo, OptionSource};
pub use list::ImageList;
pub use pixel::{PixelPacket, OPAQUE_OPACITY, TRANSPARENT_OPACITY};
pub use properties::{Profiles, Properties};
pub use quantum::{IndexPacket, Quantum, QUANTUM_DEPTH, QUANTUM_RANGE};
pub use scenes::{SceneRange, SceneSpec};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
