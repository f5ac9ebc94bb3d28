//! Read/write configuration.
//!
//! [`ImageInfo`] carries everything a decode or encode call needs besides
//! the pixels: the filename and format tag, which frames to materialize,
//! the requested sample layout and the per-format option map.
//!
//! # Option Map
//!
//! Per-format options use `format:key` names:
//!
//! | Key | Used by |
//! |-----|---------|
//! | `tiff:rows-per-strip` | TIFF encoder strip height |
//! | `tiff:alpha` | TIFF associated alpha (`associate`, `unassociated`) |
//! | `quantum:format` | sample format (`FloatingPoint`, `Signed`, `Unsigned`) |
//! | `quantum:minimum`, `quantum:maximum` | float normalization window |
//! | `quantum:scale` | float scale multiplier |
//! | `quantum:polarity` | `min-is-white` inverts gray samples |
//!
//! ```rust
//! use pixmill_core::{ImageInfo, Interlace, OptionSource};
//!
//! let info = ImageInfo::new("frame.rgb")
//!     .with_size("640x480")
//!     .with_interlace(Interlace::Plane)
//!     .with_option("quantum:format", "FloatingPoint");
//! assert_eq!(info.option("QUANTUM:FORMAT"), Some("FloatingPoint"));
//! ```

use crate::colorspace::Colorspace;
use crate::format::{Compression, Endian, Interlace};
use crate::properties::Properties;

/// Read-only access to `format:key` options.
pub trait OptionSource {
    /// Looks up an option.
    fn option(&self, key: &str) -> Option<&str>;

    /// Parses an option as a float.
    fn option_f64(&self, key: &str) -> Option<f64> {
        self.option(key).and_then(|v| v.trim().parse().ok())
    }

    /// Parses an option as an unsigned integer.
    fn option_usize(&self, key: &str) -> Option<usize> {
        self.option(key).and_then(|v| v.trim().parse().ok())
    }

    /// Case-insensitive comparison of an option value.
    fn option_is(&self, key: &str, expected: &str) -> bool {
        self.option(key)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case(expected))
    }
}

/// Configuration of one read or write call.
#[derive(Debug, Clone)]
pub struct ImageInfo {
    /// Path, `-` for standard streams, or `@list` indirect file.
    pub filename: String,
    /// Format tag, e.g. `TIFF`; empty until resolved.
    pub magick: String,
    /// `true` when `magick` was given explicitly and must not be re-detected.
    pub affirm: bool,
    /// First frame to materialize.
    pub scene: usize,
    /// Frames to materialize; `0` means all.
    pub number_scenes: usize,
    /// Scene specifier such as `0,2-4`.
    pub scenes: Option<String>,
    /// Parse headers only.
    pub ping: bool,
    /// Write all frames into one file when the format allows.
    pub adjoin: bool,
    /// Requested interlace.
    pub interlace: Interlace,
    /// Requested byte order.
    pub endian: Endian,
    /// Requested colorspace.
    pub colorspace: Colorspace,
    /// Requested sample depth; `0` keeps the image depth.
    pub depth: u32,
    /// Compression quality `1..=100`; `0` means undefined.
    pub quality: usize,
    /// Requested compression.
    pub compression: Compression,
    /// Chroma sampling factor such as `2x2`.
    pub sampling_factor: Option<String>,
    /// Sub-window `WxH+X+Y` to materialize or tile over.
    pub extract: Option<String>,
    /// Out-of-band raw dimensions `WxH+offset`.
    pub size: Option<String>,
    /// Verbose diagnostics.
    pub verbose: bool,
    /// Debug tracing.
    pub debug: bool,
    /// In-memory source; when set the filename is informational.
    pub blob: Option<Vec<u8>>,
    options: Properties,
}

impl Default for ImageInfo {
    fn default() -> Self {
        Self {
            filename: String::new(),
            magick: String::new(),
            affirm: false,
            scene: 0,
            number_scenes: 0,
            scenes: None,
            ping: false,
            adjoin: true,
            interlace: Interlace::None,
            endian: Endian::Undefined,
            colorspace: Colorspace::Undefined,
            depth: 0,
            quality: 0,
            compression: Compression::Undefined,
            sampling_factor: None,
            extract: None,
            size: None,
            verbose: false,
            debug: false,
            blob: None,
            options: Properties::new(),
        }
    }
}

impl ImageInfo {
    /// Creates a configuration for `filename`.
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            ..Self::default()
        }
    }

    /// Sets the format tag explicitly.
    pub fn with_magick(mut self, magick: impl Into<String>) -> Self {
        self.magick = magick.into().to_ascii_uppercase();
        self.affirm = true;
        self
    }

    /// Sets the raw dimensions.
    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = Some(size.into());
        self
    }

    /// Sets the extract window.
    pub fn with_extract(mut self, extract: impl Into<String>) -> Self {
        self.extract = Some(extract.into());
        self
    }

    /// Sets the interlace.
    pub fn with_interlace(mut self, interlace: Interlace) -> Self {
        self.interlace = interlace;
        self
    }

    /// Sets the byte order.
    pub fn with_endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    /// Sets the sample depth.
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Sets the compression.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Sets the quality.
    pub fn with_quality(mut self, quality: usize) -> Self {
        self.quality = quality;
        self
    }

    /// Selects a frame window.
    pub fn with_scenes(mut self, scene: usize, number_scenes: usize) -> Self {
        self.scene = scene;
        self.number_scenes = number_scenes;
        self
    }

    /// Enables header-only parsing.
    pub fn with_ping(mut self, ping: bool) -> Self {
        self.ping = ping;
        self
    }

    /// Toggles multi-frame output.
    pub fn with_adjoin(mut self, adjoin: bool) -> Self {
        self.adjoin = adjoin;
        self
    }

    /// Sets an in-memory source.
    pub fn with_blob(mut self, data: Vec<u8>) -> Self {
        self.blob = Some(data);
        self
    }

    /// Sets a `format:key` option.
    pub fn with_option(mut self, key: &str, value: &str) -> Self {
        self.set_option(key, value);
        self
    }

    /// Sets a `format:key` option.
    pub fn set_option(&mut self, key: &str, value: &str) {
        self.options.set(key, value);
    }

    /// Removes an option.
    pub fn remove_option(&mut self, key: &str) -> Option<String> {
        self.options.remove(key)
    }

    /// Iterates options in insertion order.
    pub fn options(&self) -> impl Iterator<Item = (&str, &str)> {
        self.options.iter()
    }

    /// Returns `true` if the last requested frame has been reached.
    pub fn scene_limit_reached(&self, scene: usize) -> bool {
        self.number_scenes != 0 && scene + 1 >= self.scene + self.number_scenes
    }
}

impl OptionSource for ImageInfo {
    fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let info = ImageInfo::default();
        assert!(info.adjoin);
        assert_eq!(info.number_scenes, 0);
        assert_eq!(info.interlace, Interlace::None);
        assert!(!info.affirm);
    }

    #[test]
    fn test_typed_options() {
        let info = ImageInfo::new("a.tif")
            .with_option("tiff:rows-per-strip", " 16 ")
            .with_option("quantum:minimum", "-1.5")
            .with_option("tiff:alpha", "Associate");
        assert_eq!(info.option_usize("tiff:rows-per-strip"), Some(16));
        assert_eq!(info.option_f64("quantum:minimum"), Some(-1.5));
        assert!(info.option_is("tiff:alpha", "associate"));
        assert_eq!(info.option_f64("missing"), None);
    }

    #[test]
    fn test_scene_limit() {
        let info = ImageInfo::new("x").with_scenes(2, 3);
        assert!(!info.scene_limit_reached(2));
        assert!(!info.scene_limit_reached(3));
        assert!(info.scene_limit_reached(4));
        assert!(!ImageInfo::new("x").scene_limit_reached(1000));
    }

    #[test]
    fn test_with_magick_affirms() {
        let info = ImageInfo::new("x").with_magick("tiff");
        assert_eq!(info.magick, "TIFF");
        assert!(info.affirm);
    }
}
