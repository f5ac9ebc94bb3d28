//! Error types for pixmill-core operations.
//!
//! # Overview
//!
//! The [`Error`] enum covers failures of the in-memory data model:
//! - Pixel window and region bounds checks
//! - Image extent and colormap allocation
//! - Geometry and scene specifier parsing
//!
//! Codec and stream failures live in `pixmill-io`, which wraps this type.
//!
//! # Usage
//!
//! ```rust
//! use pixmill_core::{Error, Result};
//!
//! fn check(x: usize, y: usize, columns: usize, rows: usize) -> Result<()> {
//!     if x >= columns || y >= rows {
//!         return Err(Error::out_of_bounds(x, y, columns, rows));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the image data model.
///
/// # Categories
///
/// - **Bounds errors**: [`OutOfBounds`](Error::OutOfBounds), [`InvalidRegion`](Error::InvalidRegion)
/// - **Allocation errors**: [`AllocationFailed`](Error::AllocationFailed), [`ColormapTooLarge`](Error::ColormapTooLarge)
/// - **Dimension errors**: [`InvalidDimensions`](Error::InvalidDimensions)
/// - **Parse errors**: [`InvalidGeometry`](Error::InvalidGeometry), [`InvalidSceneSpecifier`](Error::InvalidSceneSpecifier)
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// Pixel coordinates are outside image bounds.
    #[error("pixel ({x}, {y}) out of bounds for image {columns}x{rows}")]
    OutOfBounds {
        /// X coordinate that was out of bounds
        x: usize,
        /// Y coordinate that was out of bounds
        y: usize,
        /// Image columns
        columns: usize,
        /// Image rows
        rows: usize,
    },

    /// A pixel window extends beyond image bounds.
    ///
    /// Returned by [`crate::Image::get_pixel_window`] and the crop helpers
    /// when the requested rectangle does not fit.
    #[error("region ({x}, {y}, {width}x{height}) exceeds image bounds {columns}x{rows}")]
    InvalidRegion {
        /// Region X origin
        x: usize,
        /// Region Y origin
        y: usize,
        /// Region width
        width: usize,
        /// Region height
        height: usize,
        /// Image columns
        columns: usize,
        /// Image rows
        rows: usize,
    },

    /// Pixel storage could not be reserved.
    #[error("failed to allocate {requested} pixels: {reason}")]
    AllocationFailed {
        /// Pixels requested
        requested: usize,
        /// Failure reason
        reason: String,
    },

    /// Colormap request exceeds what the image depth can address.
    #[error("colormap of {requested} entries exceeds limit {limit}")]
    ColormapTooLarge {
        /// Entries requested
        requested: usize,
        /// Maximum allowed entries
        limit: usize,
    },

    /// Zero or overflowing image extent.
    #[error("invalid dimensions: {columns}x{rows} ({reason})")]
    InvalidDimensions {
        /// Requested columns
        columns: usize,
        /// Requested rows
        rows: usize,
        /// Reason why dimensions are invalid
        reason: String,
    },

    /// Geometry string such as `640x480+10+20` could not be parsed.
    #[error("invalid geometry '{0}'")]
    InvalidGeometry(String),

    /// Scene specifier such as `0,3,5-7` could not be parsed.
    #[error("invalid scene specifier '{0}'")]
    InvalidSceneSpecifier(String),
}

impl Error {
    /// Creates an [`Error::OutOfBounds`] error.
    #[inline]
    pub fn out_of_bounds(x: usize, y: usize, columns: usize, rows: usize) -> Self {
        Self::OutOfBounds { x, y, columns, rows }
    }

    /// Creates an [`Error::InvalidRegion`] error.
    #[inline]
    pub fn invalid_region(
        x: usize,
        y: usize,
        width: usize,
        height: usize,
        columns: usize,
        rows: usize,
    ) -> Self {
        Self::InvalidRegion {
            x,
            y,
            width,
            height,
            columns,
            rows,
        }
    }

    /// Creates an [`Error::AllocationFailed`] error.
    #[inline]
    pub fn allocation_failed(requested: usize, reason: impl Into<String>) -> Self {
        Self::AllocationFailed {
            requested,
            reason: reason.into(),
        }
    }

    /// Creates an [`Error::InvalidDimensions`] error.
    #[inline]
    pub fn invalid_dimensions(columns: usize, rows: usize, reason: impl Into<String>) -> Self {
        Self::InvalidDimensions {
            columns,
            rows,
            reason: reason.into(),
        }
    }

    /// Returns `true` if this is a bounds-related error.
    #[inline]
    pub fn is_bounds_error(&self) -> bool {
        matches!(self, Self::OutOfBounds { .. } | Self::InvalidRegion { .. })
    }

    /// Returns `true` if this is an allocation error.
    #[inline]
    pub fn is_allocation_error(&self) -> bool {
        matches!(
            self,
            Self::AllocationFailed { .. } | Self::ColormapTooLarge { .. }
        )
    }
}
