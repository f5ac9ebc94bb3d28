//! Rectangles and geometry strings.
//!
//! Geometry strings describe a size and an optional offset in the form
//! `WxH+X+Y`. Every part is optional:
//!
//! | String | Width | Height | X | Y |
//! |--------|-------|--------|---|---|
//! | `640x480` | 640 | 480 | - | - |
//! | `640x480+10+20` | 640 | 480 | 10 | 20 |
//! | `+5-3` | - | - | 5 | -3 |
//! | `320` | 320 | - | - | - |
//! | `320x200+1024` | 320 | 200 | 1024 | - |
//!
//! Trailing resize modifiers (`!`, `%`, `>`, `<`, `^`, `@`) are accepted and
//! ignored.
//!
//! # Coordinate System
//!
//! ```text
//! (0,0) ────────► X
//!   │   ┌──────────┐
//!   │   │  window  │
//!   │   └──────────┘
//!   ▼
//!   Y
//! ```
//!
//! ```rust
//! use pixmill_core::Geometry;
//!
//! let g = Geometry::parse("64x32+8+4").unwrap();
//! assert_eq!((g.width, g.height), (Some(64), Some(32)));
//! assert!(g.has_offset());
//! ```

use crate::error::{Error, Result};

/// A rectangle defined by origin and extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RectangleInfo {
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
    /// Horizontal offset.
    pub x: i64,
    /// Vertical offset.
    pub y: i64,
}

impl RectangleInfo {
    /// Creates a rectangle.
    #[inline]
    pub const fn new(width: usize, height: usize, x: i64, y: i64) -> Self {
        Self {
            width,
            height,
            x,
            y,
        }
    }

    /// Returns `true` for zero width or height.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Intersects with an image of `columns x rows` anchored at the origin.
    pub fn clip_to(&self, columns: usize, rows: usize) -> Option<RectangleInfo> {
        let x0 = self.x.max(0);
        let y0 = self.y.max(0);
        let x1 = (self.x + self.width as i64).min(columns as i64);
        let y1 = (self.y + self.height as i64).min(rows as i64);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(RectangleInfo::new(
            (x1 - x0) as usize,
            (y1 - y0) as usize,
            x0,
            y0,
        ))
    }
}

/// Parsed geometry string; absent parts are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Geometry {
    /// Width part.
    pub width: Option<usize>,
    /// Height part.
    pub height: Option<usize>,
    /// X offset part.
    pub x: Option<i64>,
    /// Y offset part.
    pub y: Option<i64>,
}

impl Geometry {
    /// Parses `WxH+X+Y` and its partial forms.
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = || Error::InvalidGeometry(text.to_string());
        let trimmed = text
            .trim()
            .trim_end_matches(['!', '%', '>', '<', '^', '@']);
        if trimmed.is_empty() {
            return Err(invalid());
        }

        let offset_start = trimmed.find(['+', '-']).unwrap_or(trimmed.len());
        let (size, offsets) = trimmed.split_at(offset_start);

        let mut geometry = Geometry::default();
        if !size.is_empty() {
            let mut parts = size.splitn(2, ['x', 'X']);
            let w = parts.next().unwrap_or("");
            if !w.is_empty() {
                geometry.width = Some(w.parse().map_err(|_| invalid())?);
            }
            if let Some(h) = parts.next() {
                if !h.is_empty() {
                    geometry.height = Some(h.parse().map_err(|_| invalid())?);
                }
            }
        }

        let mut rest = offsets;
        let mut values = Vec::with_capacity(2);
        while !rest.is_empty() {
            let sign = if rest.starts_with('-') { -1 } else { 1 };
            rest = &rest[1..];
            let end = rest.find(['+', '-']).unwrap_or(rest.len());
            let digits = &rest[..end];
            if digits.is_empty() {
                return Err(invalid());
            }
            let value: i64 = digits.parse().map_err(|_| invalid())?;
            values.push(sign * value);
            rest = &rest[end..];
        }
        match values.as_slice() {
            [] => {}
            [x] => geometry.x = Some(*x),
            [x, y] => {
                geometry.x = Some(*x);
                geometry.y = Some(*y);
            }
            _ => return Err(invalid()),
        }

        if geometry == Geometry::default() {
            return Err(invalid());
        }
        Ok(geometry)
    }

    /// Returns `true` when an X or Y offset was given.
    #[inline]
    pub fn has_offset(&self) -> bool {
        self.x.is_some() || self.y.is_some()
    }

    /// Resolves missing parts: a missing height copies the width, missing
    /// sizes fall back to the defaults and missing offsets become zero.
    pub fn to_rectangle(&self, default_width: usize, default_height: usize) -> RectangleInfo {
        let width = self.width.unwrap_or(default_width);
        let height = self.height.or(self.width).unwrap_or(default_height);
        RectangleInfo::new(width, height, self.x.unwrap_or(0), self.y.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full() {
        let g = Geometry::parse("640x480+10+20").unwrap();
        assert_eq!(g.width, Some(640));
        assert_eq!(g.height, Some(480));
        assert_eq!(g.x, Some(10));
        assert_eq!(g.y, Some(20));
    }

    #[test]
    fn test_parse_negative_offsets() {
        let g = Geometry::parse("+5-3").unwrap();
        assert_eq!(g.width, None);
        assert_eq!((g.x, g.y), (Some(5), Some(-3)));
    }

    #[test]
    fn test_parse_size_with_single_offset() {
        let g = Geometry::parse("320x200+1024").unwrap();
        assert_eq!(g.x, Some(1024));
        assert_eq!(g.y, None);
        let r = g.to_rectangle(0, 0);
        assert_eq!(r, RectangleInfo::new(320, 200, 1024, 0));
    }

    #[test]
    fn test_width_only_copies_to_height() {
        let r = Geometry::parse("128!").unwrap().to_rectangle(1, 1);
        assert_eq!((r.width, r.height), (128, 128));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Geometry::parse("").is_err());
        assert!(Geometry::parse("axb").is_err());
        assert!(Geometry::parse("10x10+1+2+3").is_err());
        assert!(Geometry::parse("10x10+").is_err());
    }

    #[test]
    fn test_clip_to() {
        let r = RectangleInfo::new(10, 10, -5, 5);
        assert_eq!(r.clip_to(8, 8), Some(RectangleInfo::new(5, 3, 0, 5)));
        assert_eq!(RectangleInfo::new(2, 2, 9, 9).clip_to(8, 8), None);
    }
}
