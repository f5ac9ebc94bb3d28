//! Storage and metadata enumerations shared by images and read/write options.

use std::fmt;
use std::str::FromStr;

/// Whether pixels are direct values or colormap indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StorageClass {
    /// Truecolor samples.
    #[default]
    Direct,
    /// Indices into the image colormap.
    Pseudo,
}

/// Byte order of multi-byte samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Endian {
    /// Not specified; coders pick their native order.
    #[default]
    Undefined,
    /// Little endian.
    Lsb,
    /// Big endian.
    Msb,
}

impl Endian {
    /// Host byte order.
    pub fn native() -> Self {
        if cfg!(target_endian = "little") {
            Self::Lsb
        } else {
            Self::Msb
        }
    }

    /// Resolves `Undefined` to `fallback`.
    pub fn or(self, fallback: Endian) -> Endian {
        match self {
            Self::Undefined => fallback,
            other => other,
        }
    }
}

impl FromStr for Endian {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lsb" | "little" => Ok(Self::Lsb),
            "msb" | "big" => Ok(Self::Msb),
            "undefined" => Ok(Self::Undefined),
            _ => Err(format!("unknown endian '{s}'")),
        }
    }
}

/// Inter-channel layout of raw planar formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Interlace {
    /// Not specified.
    #[default]
    Undefined,
    /// Samples of one pixel are adjacent.
    None,
    /// One scanline per channel, channel after channel.
    Line,
    /// One full plane per channel in a single stream.
    Plane,
    /// One full plane per channel, each in its own file.
    Partition,
}

impl FromStr for Interlace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "no" => Ok(Self::None),
            "line" => Ok(Self::Line),
            "plane" => Ok(Self::Plane),
            "partition" => Ok(Self::Partition),
            "undefined" => Ok(Self::Undefined),
            _ => Err(format!("unknown interlace '{s}'")),
        }
    }
}

/// Pixel payload compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Compression {
    /// Not specified; the encoder picks its default.
    #[default]
    Undefined,
    /// Stored uncompressed.
    None,
    /// CCITT Group 3 fax.
    Fax,
    /// CCITT Group 4 fax.
    Group4,
    /// Baseline JPEG.
    Jpeg,
    /// Lempel-Ziv-Welch.
    Lzw,
    /// Run-length (TIFF PackBits).
    Rle,
    /// Deflate.
    Zip,
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Undefined => "Undefined",
            Self::None => "None",
            Self::Fax => "Fax",
            Self::Group4 => "Group4",
            Self::Jpeg => "JPEG",
            Self::Lzw => "LZW",
            Self::Rle => "RLE",
            Self::Zip => "Zip",
        };
        f.write_str(name)
    }
}

impl FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "undefined" => Ok(Self::Undefined),
            "none" => Ok(Self::None),
            "fax" | "group3" => Ok(Self::Fax),
            "group4" => Ok(Self::Group4),
            "jpeg" => Ok(Self::Jpeg),
            "lzw" => Ok(Self::Lzw),
            "rle" | "runlength" | "packbits" => Ok(Self::Rle),
            "zip" | "deflate" => Ok(Self::Zip),
            _ => Err(format!("unknown compression '{s}'")),
        }
    }
}

/// EXIF/TIFF orientation, numbered as in the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Orientation {
    /// Not specified.
    #[default]
    Undefined = 0,
    /// Row 0 top, column 0 left.
    TopLeft = 1,
    /// Row 0 top, column 0 right.
    TopRight = 2,
    /// Row 0 bottom, column 0 right.
    BottomRight = 3,
    /// Row 0 bottom, column 0 left.
    BottomLeft = 4,
    /// Row 0 left, column 0 top.
    LeftTop = 5,
    /// Row 0 right, column 0 top.
    RightTop = 6,
    /// Row 0 right, column 0 bottom.
    RightBottom = 7,
    /// Row 0 left, column 0 bottom.
    LeftBottom = 8,
}

impl Orientation {
    /// Maps a tag value; unknown values become `Undefined`.
    pub fn from_tag(value: u32) -> Self {
        match value {
            1 => Self::TopLeft,
            2 => Self::TopRight,
            3 => Self::BottomRight,
            4 => Self::BottomLeft,
            5 => Self::LeftTop,
            6 => Self::RightTop,
            7 => Self::RightBottom,
            8 => Self::LeftBottom,
            _ => Self::Undefined,
        }
    }

    /// Tag value.
    pub fn to_tag(self) -> u32 {
        self as u32
    }
}

/// Units of `x_resolution` / `y_resolution`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResolutionUnits {
    /// No absolute unit.
    #[default]
    Undefined,
    /// Pixels per inch.
    PixelsPerInch,
    /// Pixels per centimeter.
    PixelsPerCentimeter,
}

impl ResolutionUnits {
    /// Maps the ordinal `0..=2`; anything else is `Undefined`.
    pub fn from_index(value: i64) -> Self {
        match value {
            1 => Self::PixelsPerInch,
            2 => Self::PixelsPerCentimeter,
            _ => Self::Undefined,
        }
    }

    /// Ordinal value `0..=2`.
    pub fn index(self) -> u16 {
        match self {
            Self::Undefined => 0,
            Self::PixelsPerInch => 1,
            Self::PixelsPerCentimeter => 2,
        }
    }
}
