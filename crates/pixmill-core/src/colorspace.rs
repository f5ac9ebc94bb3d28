//! Colorspace tags.
//!
//! pixmill identifies colorspaces but never converts between them. A coder
//! tags each decoded image with the model its samples are expressed in and
//! encoders pick a channel layout from the tag.

use std::fmt;
use std::str::FromStr;

/// Color model of an image's samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Colorspace {
    /// Not yet determined.
    #[default]
    Undefined,
    /// Red, green, blue.
    Rgb,
    /// Single intensity channel replicated into red, green and blue.
    Gray,
    /// Cyan, magenta, yellow in the color channels; black in the indexes.
    Cmyk,
    /// Luma and chroma differences.
    YCbCr,
    /// CIE L*a*b*.
    Lab,
    /// Transparent variant of RGB used by some palette formats.
    Transparent,
}

impl Colorspace {
    /// Canonical tag name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Undefined => "Undefined",
            Self::Rgb => "RGB",
            Self::Gray => "Gray",
            Self::Cmyk => "CMYK",
            Self::YCbCr => "YCbCr",
            Self::Lab => "Lab",
            Self::Transparent => "Transparent",
        }
    }

    /// Number of color channels excluding alpha.
    pub fn channels(&self) -> usize {
        match self {
            Self::Gray => 1,
            Self::Cmyk => 4,
            _ => 3,
        }
    }
}

impl fmt::Display for Colorspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Colorspace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "undefined" => Ok(Self::Undefined),
            "rgb" | "srgb" => Ok(Self::Rgb),
            "gray" | "grey" => Ok(Self::Gray),
            "cmyk" => Ok(Self::Cmyk),
            "ycbcr" | "yuv" => Ok(Self::YCbCr),
            "lab" => Ok(Self::Lab),
            "transparent" => Ok(Self::Transparent),
            _ => Err(format!("unknown colorspace '{s}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("cmyk".parse::<Colorspace>(), Ok(Colorspace::Cmyk));
        assert_eq!("YCbCr".parse::<Colorspace>(), Ok(Colorspace::YCbCr));
        assert!("hsv".parse::<Colorspace>().is_err());
    }

    #[test]
    fn test_channels() {
        assert_eq!(Colorspace::Gray.channels(), 1);
        assert_eq!(Colorspace::Cmyk.channels(), 4);
        assert_eq!(Colorspace::Rgb.to_string(), "RGB");
    }
}
