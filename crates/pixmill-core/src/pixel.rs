//! Pixel packets.
//!
//! A [`PixelPacket`] stores red, green, blue and opacity quanta. Opacity
//! follows the "opacity-as-stored" convention: `0` is fully opaque and
//! [`QUANTUM_RANGE`] is fully transparent. For CMYK images red, green and
//! blue carry cyan, magenta and yellow; black lives in the image's parallel
//! index array.

use crate::quantum::{Quantum, QUANTUM_RANGE};

/// Opacity value of a fully opaque pixel.
pub const OPAQUE_OPACITY: Quantum = 0.0;

/// Opacity value of a fully transparent pixel.
pub const TRANSPARENT_OPACITY: Quantum = QUANTUM_RANGE;

/// One pixel of an [`Image`](crate::Image).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PixelPacket {
    /// Red (or cyan, or luma) sample.
    pub red: Quantum,
    /// Green (or magenta, or Cb) sample.
    pub green: Quantum,
    /// Blue (or yellow, or Cr) sample.
    pub blue: Quantum,
    /// Opacity; `0` is opaque.
    pub opacity: Quantum,
}

impl PixelPacket {
    /// Opaque black.
    pub const BLACK: Self = Self::gray(0.0);
    /// Opaque white.
    pub const WHITE: Self = Self::gray(QUANTUM_RANGE);

    /// Creates an opaque pixel.
    #[inline]
    pub const fn rgb(red: Quantum, green: Quantum, blue: Quantum) -> Self {
        Self {
            red,
            green,
            blue,
            opacity: OPAQUE_OPACITY,
        }
    }

    /// Creates a pixel with explicit opacity.
    #[inline]
    pub const fn rgbo(red: Quantum, green: Quantum, blue: Quantum, opacity: Quantum) -> Self {
        Self {
            red,
            green,
            blue,
            opacity,
        }
    }

    /// Creates an opaque gray pixel.
    #[inline]
    pub const fn gray(value: Quantum) -> Self {
        Self::rgb(value, value, value)
    }

    /// Returns `true` when red, green and blue are equal.
    #[inline]
    pub fn is_gray(&self) -> bool {
        self.red == self.green && self.green == self.blue
    }

    /// Returns `true` when the pixel is pure black or pure white.
    #[inline]
    pub fn is_monochrome(&self) -> bool {
        self.is_gray() && (self.red == 0.0 || self.red == QUANTUM_RANGE)
    }

    /// Luma-weighted intensity; exact for gray pixels.
    #[inline]
    pub fn intensity(&self) -> Quantum {
        if self.is_gray() {
            return self.red;
        }
        (0.299 * self.red as f64 + 0.587 * self.green as f64 + 0.114 * self.blue as f64 + 0.5)
            as Quantum
    }

    /// Alpha in the external convention: `QUANTUM_RANGE` is opaque.
    #[inline]
    pub fn alpha(&self) -> Quantum {
        QUANTUM_RANGE - self.opacity
    }

    /// Sets opacity from an external alpha value.
    #[inline]
    pub fn set_alpha(&mut self, alpha: Quantum) {
        self.opacity = QUANTUM_RANGE - alpha;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intensity_exact_for_gray() {
        assert_eq!(PixelPacket::gray(1234.0).intensity(), 1234.0);
        let p = PixelPacket::rgb(QUANTUM_RANGE, 0.0, 0.0);
        assert!(p.intensity() > 19000.0 && p.intensity() < 20000.0);
    }

    #[test]
    fn test_alpha_opacity_convention() {
        let mut p = PixelPacket::BLACK;
        assert_eq!(p.alpha(), QUANTUM_RANGE);
        p.set_alpha(0.0);
        assert_eq!(p.opacity, TRANSPARENT_OPACITY);
    }

    #[test]
    fn test_monochrome() {
        assert!(PixelPacket::WHITE.is_monochrome());
        assert!(PixelPacket::BLACK.is_monochrome());
        assert!(!PixelPacket::gray(3.0).is_monochrome());
    }
}
