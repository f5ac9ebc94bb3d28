//! The image frame.
//!
//! An [`Image`] owns a `columns x rows` array of [`PixelPacket`]s in
//! row-major order plus, for colormapped and CMYK images, a parallel array
//! of [`IndexPacket`]s holding the colormap index or the black sample.
//!
//! # Storage Invariants
//!
//! - `pixels().len() == columns * rows`
//! - `StorageClass::Pseudo` holds `1..=2^depth` colormap entries;
//!   `StorageClass::Direct` holds none
//! - the index array is present exactly when the image is colormapped or CMYK
//!
//! # Pixel Windows
//!
//! Coders write through a window: a rectangle copied out of the image by
//! [`Image::get_pixel_window`], filled in place and committed by
//! [`Image::sync_pixel_window`]. The index array of the same rectangle is
//! reached through [`Image::get_indexes_window`].
//!
//! ```rust
//! use pixmill_core::{Image, PixelPacket, QUANTUM_RANGE};
//!
//! let mut image = Image::new(4, 2).unwrap();
//! let row = image.get_pixel_window(0, 1, 4, 1).unwrap();
//! row.fill(PixelPacket::gray(QUANTUM_RANGE));
//! image.sync_pixel_window().unwrap();
//! assert_eq!(image.pixel(3, 1), Some(PixelPacket::WHITE));
//! assert_eq!(image.pixel(3, 0), Some(PixelPacket::BLACK));
//! ```

use crate::colorspace::Colorspace;
use crate::error::{Error, Result};
use crate::exception::Warning;
use crate::format::{Compression, Endian, Interlace, Orientation, ResolutionUnits, StorageClass};
use crate::geometry::{Geometry, RectangleInfo};
use crate::info::ImageInfo;
use crate::pixel::{PixelPacket, OPAQUE_OPACITY};
use crate::properties::{Profiles, Properties};
use crate::quantum::{IndexPacket, Quantum, QUANTUM_RANGE};

/// Largest colormap any image may carry.
pub const MAX_COLORMAP_SIZE: usize = 65536;

/// Chromaticity coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PrimaryInfo {
    /// CIE x.
    pub x: f64,
    /// CIE y.
    pub y: f64,
}

/// Primary and white point chromaticities.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChromaticityInfo {
    /// Red primary.
    pub red_primary: PrimaryInfo,
    /// Green primary.
    pub green_primary: PrimaryInfo,
    /// Blue primary.
    pub blue_primary: PrimaryInfo,
    /// White point.
    pub white_point: PrimaryInfo,
}

#[derive(Debug, Clone)]
struct Window {
    x: usize,
    y: usize,
    width: usize,
    height: usize,
    pixels: Vec<PixelPacket>,
    indexes: Vec<IndexPacket>,
}

/// Mutable view of the pending pixel window together with the colormap.
#[derive(Debug)]
pub struct PixelWindow<'a> {
    /// Window width.
    pub width: usize,
    /// Window height.
    pub height: usize,
    /// Window pixels, row-major.
    pub pixels: &'a mut [PixelPacket],
    /// Window indexes; empty when the image has none.
    pub indexes: &'a mut [IndexPacket],
    /// Image colormap; empty for direct class images.
    pub colormap: &'a [PixelPacket],
    /// Warnings raised while filling the window.
    pub warnings: &'a mut Vec<Warning>,
}

/// One raster frame with its metadata.
#[derive(Debug, Clone)]
pub struct Image {
    columns: usize,
    rows: usize,
    storage_class: StorageClass,
    colorspace: Colorspace,
    colormap: Vec<PixelPacket>,
    pixels: Vec<PixelPacket>,
    indexes: Vec<IndexPacket>,
    window: Option<Window>,

    /// Sample precision in bits.
    pub depth: u32,
    /// Whether opacity is meaningful.
    pub matte: bool,
    /// Byte order of the source or destination.
    pub endian: Endian,
    /// Sub-window requested of the decoder or tile size for the encoder.
    pub extract_info: RectangleInfo,
    /// Bytes to skip before raw pixel data.
    pub offset: u64,
    /// Frame number.
    pub scene: usize,
    /// Textual properties.
    pub properties: Properties,
    /// Embedded profiles.
    pub profiles: Profiles,
    /// Source or destination path.
    pub filename: String,
    /// Format tag that decoded the frame.
    pub magick: String,
    /// Filename as given to the dispatcher.
    pub magick_filename: String,
    /// Compression of the source.
    pub compression: Compression,
    /// Compression quality; `0` is undefined.
    pub quality: usize,
    /// Orientation tag.
    pub orientation: Orientation,
    /// Resolution units.
    pub units: ResolutionUnits,
    /// Horizontal resolution.
    pub x_resolution: f64,
    /// Vertical resolution.
    pub y_resolution: f64,
    /// Chromaticities.
    pub chromaticity: ChromaticityInfo,
    /// Virtual canvas.
    pub page: RectangleInfo,
    /// Interlace of the source.
    pub interlace: Interlace,
    /// Frame duration in ticks.
    pub delay: u64,
    /// Ticks per second; `0` means 100.
    pub ticks_per_second: u64,
    /// Non-fatal diagnostics raised while decoding this frame.
    pub warnings: Vec<Warning>,
}

impl Default for Image {
    fn default() -> Self {
        Self {
            columns: 0,
            rows: 0,
            storage_class: StorageClass::Direct,
            colorspace: Colorspace::Rgb,
            colormap: Vec::new(),
            pixels: Vec::new(),
            indexes: Vec::new(),
            window: None,
            depth: 8,
            matte: false,
            endian: Endian::Undefined,
            extract_info: RectangleInfo::default(),
            offset: 0,
            scene: 0,
            properties: Properties::new(),
            profiles: Profiles::new(),
            filename: String::new(),
            magick: String::new(),
            magick_filename: String::new(),
            compression: Compression::Undefined,
            quality: 0,
            orientation: Orientation::Undefined,
            units: ResolutionUnits::Undefined,
            x_resolution: 0.0,
            y_resolution: 0.0,
            chromaticity: ChromaticityInfo::default(),
            page: RectangleInfo::default(),
            interlace: Interlace::None,
            delay: 0,
            ticks_per_second: 100,
            warnings: Vec::new(),
        }
    }
}

impl Image {
    /// Creates an opaque black RGB image.
    pub fn new(columns: usize, rows: usize) -> Result<Self> {
        let mut image = Self::default();
        image.set_extent(columns, rows)?;
        Ok(image)
    }

    /// Creates a header-only image primed from read options.
    ///
    /// `size` (`WxH+offset`) provides raw dimensions and the data offset.
    /// `extract` (`WxH+X+Y`) narrows the frame to a window; the full raw
    /// extent is kept in `extract_info.width/height` and the window origin in
    /// `extract_info.x/y`.
    pub fn from_info(info: &ImageInfo) -> Self {
        let mut image = Self {
            filename: info.filename.clone(),
            magick: info.magick.clone(),
            magick_filename: info.filename.clone(),
            endian: info.endian,
            interlace: info.interlace,
            compression: info.compression,
            quality: info.quality,
            scene: info.scene,
            ..Self::default()
        };
        if info.depth != 0 {
            image.depth = info.depth;
        }
        if let Some(size) = info.size.as_deref().and_then(|s| Geometry::parse(s).ok()) {
            let rect = size.to_rectangle(0, 0);
            image.columns = rect.width;
            image.rows = rect.height;
            image.offset = size.x.unwrap_or(0).max(0) as u64;
            image.extract_info = RectangleInfo::new(rect.width, rect.height, 0, 0);
        }
        if let Some(extract) = info.extract.as_deref().and_then(|s| Geometry::parse(s).ok()) {
            let rect = extract.to_rectangle(image.columns, image.rows);
            if rect.width != 0 && rect.height != 0 {
                if image.extract_info.width == 0 {
                    image.extract_info.width = rect.width;
                    image.extract_info.height = rect.height;
                }
                image.columns = rect.width;
                image.rows = rect.height;
                image.extract_info.x = rect.x;
                image.extract_info.y = rect.y;
            }
        }
        image
    }

    /// Copies every attribute except pixels into a new image of the given
    /// extent.
    pub fn clone_with_extent(&self, columns: usize, rows: usize) -> Result<Self> {
        let mut image = Self {
            columns: 0,
            rows: 0,
            storage_class: self.storage_class,
            colorspace: self.colorspace,
            colormap: self.colormap.clone(),
            pixels: Vec::new(),
            indexes: Vec::new(),
            window: None,
            depth: self.depth,
            matte: self.matte,
            endian: self.endian,
            extract_info: self.extract_info,
            offset: self.offset,
            scene: self.scene,
            properties: self.properties.clone(),
            profiles: self.profiles.clone(),
            filename: self.filename.clone(),
            magick: self.magick.clone(),
            magick_filename: self.magick_filename.clone(),
            compression: self.compression,
            quality: self.quality,
            orientation: self.orientation,
            units: self.units,
            x_resolution: self.x_resolution,
            y_resolution: self.y_resolution,
            chromaticity: self.chromaticity,
            page: self.page,
            interlace: self.interlace,
            delay: self.delay,
            ticks_per_second: self.ticks_per_second,
            warnings: Vec::new(),
        };
        image.set_extent(columns, rows)?;
        Ok(image)
    }

    /// Allocates pixel storage for `columns x rows`, discarding old pixels.
    pub fn set_extent(&mut self, columns: usize, rows: usize) -> Result<()> {
        if columns == 0 || rows == 0 {
            return Err(Error::invalid_dimensions(
                columns,
                rows,
                "width and height must be positive",
            ));
        }
        let count = columns
            .checked_mul(rows)
            .ok_or_else(|| Error::invalid_dimensions(columns, rows, "pixel count overflows"))?;
        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(count)
            .map_err(|e| Error::allocation_failed(count, e.to_string()))?;
        pixels.resize(count, PixelPacket::BLACK);
        self.pixels = pixels;
        self.columns = columns;
        self.rows = rows;
        self.window = None;
        self.indexes.clear();
        if self.has_indexes() {
            self.indexes.resize(count, 0.0);
        }
        Ok(())
    }

    /// Records header dimensions without allocating pixels (ping mode).
    pub fn set_dimensions(&mut self, columns: usize, rows: usize) {
        self.columns = columns;
        self.rows = rows;
        self.pixels.clear();
        self.indexes.clear();
        self.window = None;
    }

    /// Returns `true` when pixel storage matches the extent.
    pub fn has_pixels(&self) -> bool {
        self.columns != 0 && self.pixels.len() == self.columns * self.rows
    }

    /// Width in pixels.
    #[inline]
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Height in pixels.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Storage class.
    #[inline]
    pub fn storage_class(&self) -> StorageClass {
        self.storage_class
    }

    /// Colorspace tag.
    #[inline]
    pub fn colorspace(&self) -> Colorspace {
        self.colorspace
    }

    /// Sets the colorspace tag; CMYK images gain an index array for black.
    pub fn set_colorspace(&mut self, colorspace: Colorspace) {
        self.colorspace = colorspace;
        self.sync_index_storage();
    }

    /// Returns `true` when a parallel index array is kept.
    #[inline]
    pub fn has_indexes(&self) -> bool {
        self.storage_class == StorageClass::Pseudo || self.colorspace == Colorspace::Cmyk
    }

    fn sync_index_storage(&mut self) {
        let count = if self.has_pixels() {
            self.columns * self.rows
        } else {
            0
        };
        if self.has_indexes() {
            if self.indexes.len() != count {
                self.indexes.resize(count, 0.0);
            }
        } else {
            self.indexes.clear();
        }
    }

    /// Colormap entries.
    #[inline]
    pub fn colormap(&self) -> &[PixelPacket] {
        &self.colormap
    }

    /// Mutable colormap entries; the length cannot change.
    #[inline]
    pub fn colormap_mut(&mut self) -> &mut [PixelPacket] {
        &mut self.colormap
    }

    /// Makes the image colormapped with `colors` entries forming a linear
    /// gray ramp. Depth grows if it cannot address every entry.
    pub fn allocate_colormap(&mut self, colors: usize) -> Result<()> {
        if colors == 0 || colors > MAX_COLORMAP_SIZE {
            return Err(Error::ColormapTooLarge {
                requested: colors,
                limit: MAX_COLORMAP_SIZE,
            });
        }
        let step = QUANTUM_RANGE as f64 / (colors.max(2) - 1) as f64;
        let colormap = (0..colors)
            .map(|i| PixelPacket::gray((i as f64 * step) as Quantum))
            .collect();
        self.set_colormap(colormap)
    }

    /// Installs an explicit colormap and switches to `Pseudo` storage.
    pub fn set_colormap(&mut self, colormap: Vec<PixelPacket>) -> Result<()> {
        let colors = colormap.len();
        if colors == 0 || colors > MAX_COLORMAP_SIZE {
            return Err(Error::ColormapTooLarge {
                requested: colors,
                limit: MAX_COLORMAP_SIZE,
            });
        }
        while self.depth < 32 && (1u64 << self.depth) < colors as u64 {
            self.depth = if self.depth < 8 { 8 } else { 16 };
        }
        self.colormap = colormap;
        self.storage_class = StorageClass::Pseudo;
        self.sync_index_storage();
        Ok(())
    }

    /// Drops the colormap and keeps the resolved pixel colors.
    pub fn set_direct_class(&mut self) {
        self.colormap.clear();
        self.storage_class = StorageClass::Direct;
        self.sync_index_storage();
    }

    /// Clamps an index into the colormap. Returns the index and whether it
    /// was out of range.
    #[inline]
    pub fn constrain_colormap_index(&self, index: usize) -> (usize, bool) {
        constrain_index(index, self.colormap.len())
    }

    /// All pixels, row-major.
    #[inline]
    pub fn pixels(&self) -> &[PixelPacket] {
        &self.pixels
    }

    /// All pixels, mutable.
    #[inline]
    pub fn pixels_mut(&mut self) -> &mut [PixelPacket] {
        &mut self.pixels
    }

    /// All indexes; empty when the image has none.
    #[inline]
    pub fn indexes(&self) -> &[IndexPacket] {
        &self.indexes
    }

    /// All indexes, mutable.
    #[inline]
    pub fn indexes_mut(&mut self) -> &mut [IndexPacket] {
        &mut self.indexes
    }

    /// One row of pixels.
    pub fn pixel_row(&self, y: usize) -> &[PixelPacket] {
        let start = y * self.columns;
        &self.pixels[start..start + self.columns]
    }

    /// One row of indexes; empty when the image has none.
    pub fn index_row(&self, y: usize) -> &[IndexPacket] {
        if self.indexes.is_empty() {
            return &[];
        }
        let start = y * self.columns;
        &self.indexes[start..start + self.columns]
    }

    /// Pixel at `(x, y)`.
    pub fn pixel(&self, x: usize, y: usize) -> Option<PixelPacket> {
        if x >= self.columns || y >= self.rows {
            return None;
        }
        self.pixels.get(y * self.columns + x).copied()
    }

    /// Index at `(x, y)`.
    pub fn index(&self, x: usize, y: usize) -> Option<IndexPacket> {
        if x >= self.columns || y >= self.rows {
            return None;
        }
        self.indexes.get(y * self.columns + x).copied()
    }

    /// Stores a pixel.
    pub fn set_pixel(&mut self, x: usize, y: usize, pixel: PixelPacket) -> Result<()> {
        if x >= self.columns || y >= self.rows || !self.has_pixels() {
            return Err(Error::out_of_bounds(x, y, self.columns, self.rows));
        }
        self.pixels[y * self.columns + x] = pixel;
        Ok(())
    }

    /// Stores an index.
    pub fn set_index(&mut self, x: usize, y: usize, index: IndexPacket) -> Result<()> {
        if x >= self.columns || y >= self.rows || self.indexes.is_empty() {
            return Err(Error::out_of_bounds(x, y, self.columns, self.rows));
        }
        self.indexes[y * self.columns + x] = index;
        Ok(())
    }

    // === Pixel windows ===

    /// Opens a writable window over `cols x rows` pixels at `(x, y)`. The
    /// window starts with the current contents and replaces any window left
    /// unsynced.
    pub fn get_pixel_window(
        &mut self,
        x: usize,
        y: usize,
        cols: usize,
        rows: usize,
    ) -> Result<&mut [PixelPacket]> {
        if cols == 0
            || rows == 0
            || x + cols > self.columns
            || y + rows > self.rows
            || !self.has_pixels()
        {
            return Err(Error::invalid_region(
                x,
                y,
                cols,
                rows,
                self.columns,
                self.rows,
            ));
        }
        let mut pixels = Vec::with_capacity(cols * rows);
        let mut indexes = Vec::new();
        for row in y..y + rows {
            let start = row * self.columns + x;
            pixels.extend_from_slice(&self.pixels[start..start + cols]);
            if !self.indexes.is_empty() {
                indexes.extend_from_slice(&self.indexes[start..start + cols]);
            }
        }
        let window = self.window.insert(Window {
            x,
            y,
            width: cols,
            height: rows,
            pixels,
            indexes,
        });
        Ok(window.pixels.as_mut_slice())
    }

    /// Index array of the pending window; empty when inapplicable.
    pub fn get_indexes_window(&mut self) -> &mut [IndexPacket] {
        match self.window.as_mut() {
            Some(window) => window.indexes.as_mut_slice(),
            None => &mut [],
        }
    }

    /// Pending window with the colormap, for marshalling code that needs
    /// every part at once.
    pub fn pixel_window(&mut self) -> Option<PixelWindow<'_>> {
        let window = self.window.as_mut()?;
        Some(PixelWindow {
            width: window.width,
            height: window.height,
            pixels: &mut window.pixels,
            indexes: &mut window.indexes,
            colormap: &self.colormap,
            warnings: &mut self.warnings,
        })
    }

    /// Commits the pending window back into the image.
    pub fn sync_pixel_window(&mut self) -> Result<()> {
        let Some(window) = self.window.take() else {
            return Ok(());
        };
        if window.x + window.width > self.columns || window.y + window.height > self.rows {
            return Err(Error::invalid_region(
                window.x,
                window.y,
                window.width,
                window.height,
                self.columns,
                self.rows,
            ));
        }
        for row in 0..window.height {
            let dst = (window.y + row) * self.columns + window.x;
            let src = row * window.width;
            self.pixels[dst..dst + window.width]
                .copy_from_slice(&window.pixels[src..src + window.width]);
            if !self.indexes.is_empty() && !window.indexes.is_empty() {
                self.indexes[dst..dst + window.width]
                    .copy_from_slice(&window.indexes[src..src + window.width]);
            }
        }
        Ok(())
    }

    // === Classification ===

    /// Returns `true` when every pixel is gray.
    pub fn is_gray(&self) -> bool {
        if self.colorspace == Colorspace::Gray {
            return true;
        }
        if self.colorspace != Colorspace::Rgb && self.colorspace != Colorspace::Undefined {
            return false;
        }
        self.pixels.iter().all(PixelPacket::is_gray)
    }

    /// Returns `true` when every pixel is pure black or pure white.
    pub fn is_monochrome(&self) -> bool {
        if self.colorspace != Colorspace::Rgb
            && self.colorspace != Colorspace::Gray
            && self.colorspace != Colorspace::Undefined
        {
            return false;
        }
        self.pixels.iter().all(PixelPacket::is_monochrome)
    }

    /// Returns `true` when no pixel carries opacity.
    pub fn is_opaque(&self) -> bool {
        !self.matte || self.pixels.iter().all(|p| p.opacity == OPAQUE_OPACITY)
    }

    /// Sets every pixel's opacity.
    pub fn set_opacity(&mut self, opacity: Quantum) {
        for p in &mut self.pixels {
            p.opacity = opacity;
        }
    }
}

/// Clamps `index` to `[0, colors - 1]`, reporting whether it was clamped.
#[inline]
pub fn constrain_index(index: usize, colors: usize) -> (usize, bool) {
    if colors == 0 {
        return (0, index != 0);
    }
    if index < colors {
        (index, false)
    } else {
        (colors - 1, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_allocates_black() {
        let image = Image::new(3, 2).unwrap();
        assert_eq!(image.pixels().len(), 6);
        assert!(image.indexes().is_empty());
        assert_eq!(image.pixel(2, 1), Some(PixelPacket::BLACK));
        assert_eq!(image.pixel(3, 1), None);
    }

    #[test]
    fn test_zero_extent_rejected() {
        assert!(Image::new(0, 5).is_err());
        assert!(Image::new(5, 0).is_err());
    }

    #[test]
    fn test_allocate_colormap_gray_ramp() {
        let mut image = Image::new(2, 2).unwrap();
        image.allocate_colormap(256).unwrap();
        assert_eq!(image.storage_class(), StorageClass::Pseudo);
        assert_eq!(image.colormap().len(), 256);
        assert_eq!(image.colormap()[0], PixelPacket::BLACK);
        assert_eq!(image.colormap()[255], PixelPacket::WHITE);
        assert_eq!(image.colormap()[1].red, 257.0);
        assert_eq!(image.indexes().len(), 4);
    }

    #[test]
    fn test_colormap_grows_depth() {
        let mut image = Image::new(1, 1).unwrap();
        image.depth = 1;
        image.allocate_colormap(2).unwrap();
        assert_eq!(image.depth, 1);
        image.allocate_colormap(300).unwrap();
        assert_eq!(image.depth, 16);
    }

    #[test]
    fn test_colormap_limits() {
        let mut image = Image::new(1, 1).unwrap();
        assert!(image.allocate_colormap(0).is_err());
        assert!(image.allocate_colormap(MAX_COLORMAP_SIZE + 1).is_err());
    }

    #[test]
    fn test_direct_class_drops_colormap() {
        let mut image = Image::new(1, 1).unwrap();
        image.allocate_colormap(4).unwrap();
        image.set_direct_class();
        assert!(image.colormap().is_empty());
        assert!(image.indexes().is_empty());
    }

    #[test]
    fn test_window_round_trip_with_indexes() {
        let mut image = Image::new(4, 4).unwrap();
        image.set_colorspace(Colorspace::Cmyk);
        let window = image.get_pixel_window(1, 1, 2, 2).unwrap();
        window.fill(PixelPacket::WHITE);
        image.get_indexes_window().fill(42.0);
        image.sync_pixel_window().unwrap();
        assert_eq!(image.pixel(1, 1), Some(PixelPacket::WHITE));
        assert_eq!(image.pixel(2, 2), Some(PixelPacket::WHITE));
        assert_eq!(image.pixel(3, 3), Some(PixelPacket::BLACK));
        assert_eq!(image.index(2, 1), Some(42.0));
        assert_eq!(image.index(0, 0), Some(0.0));
    }

    #[test]
    fn test_window_out_of_bounds() {
        let mut image = Image::new(2, 2).unwrap();
        let err = image.get_pixel_window(1, 0, 2, 1).unwrap_err();
        assert!(err.is_bounds_error());
        assert!(image.get_indexes_window().is_empty());
    }

    #[test]
    fn test_from_info_size_and_extract() {
        let info = ImageInfo::new("raw.gray")
            .with_size("10x8+16")
            .with_extract("4x2+3+1");
        let image = Image::from_info(&info);
        assert_eq!((image.columns(), image.rows()), (4, 2));
        assert_eq!(image.offset, 16);
        assert_eq!(image.extract_info, RectangleInfo::new(10, 8, 3, 1));
    }

    #[test]
    fn test_constrain_index() {
        assert_eq!(constrain_index(3, 4), (3, false));
        assert_eq!(constrain_index(9, 4), (3, true));
        assert_eq!(constrain_index(0, 0), (0, false));
    }

    #[test]
    fn test_classification() {
        let mut image = Image::new(2, 1).unwrap();
        assert!(image.is_gray());
        assert!(image.is_monochrome());
        image.set_pixel(1, 0, PixelPacket::rgb(1.0, 2.0, 3.0)).unwrap();
        assert!(!image.is_gray());
        image.matte = true;
        assert!(image.is_opaque());
        image.set_opacity(10.0);
        assert!(!image.is_opaque());
    }
}
