//! Tag numbers, field types and enumerated tag values.

/// Tag numbers used by the coder.
#[allow(missing_docs)]
pub mod tag {
    pub const NEW_SUBFILE_TYPE: u16 = 254;
    pub const IMAGE_WIDTH: u16 = 256;
    pub const IMAGE_LENGTH: u16 = 257;
    pub const BITS_PER_SAMPLE: u16 = 258;
    pub const COMPRESSION: u16 = 259;
    pub const PHOTOMETRIC: u16 = 262;
    pub const FILL_ORDER: u16 = 266;
    pub const DOCUMENT_NAME: u16 = 269;
    pub const IMAGE_DESCRIPTION: u16 = 270;
    pub const MAKE: u16 = 271;
    pub const MODEL: u16 = 272;
    pub const STRIP_OFFSETS: u16 = 273;
    pub const ORIENTATION: u16 = 274;
    pub const SAMPLES_PER_PIXEL: u16 = 277;
    pub const ROWS_PER_STRIP: u16 = 278;
    pub const STRIP_BYTE_COUNTS: u16 = 279;
    pub const X_RESOLUTION: u16 = 282;
    pub const Y_RESOLUTION: u16 = 283;
    pub const PLANAR_CONFIG: u16 = 284;
    pub const PAGE_NAME: u16 = 285;
    pub const X_POSITION: u16 = 286;
    pub const Y_POSITION: u16 = 287;
    pub const GROUP3_OPTIONS: u16 = 292;
    pub const GROUP4_OPTIONS: u16 = 293;
    pub const RESOLUTION_UNIT: u16 = 296;
    pub const PAGE_NUMBER: u16 = 297;
    pub const SOFTWARE: u16 = 305;
    pub const DATE_TIME: u16 = 306;
    pub const ARTIST: u16 = 315;
    pub const HOST_COMPUTER: u16 = 316;
    pub const PREDICTOR: u16 = 317;
    pub const WHITE_POINT: u16 = 318;
    pub const PRIMARY_CHROMATICITIES: u16 = 319;
    pub const COLOR_MAP: u16 = 320;
    pub const TILE_WIDTH: u16 = 322;
    pub const TILE_LENGTH: u16 = 323;
    pub const TILE_OFFSETS: u16 = 324;
    pub const TILE_BYTE_COUNTS: u16 = 325;
    pub const INK_SET: u16 = 332;
    pub const EXTRA_SAMPLES: u16 = 338;
    pub const SAMPLE_FORMAT: u16 = 339;
    pub const S_MIN_SAMPLE_VALUE: u16 = 340;
    pub const S_MAX_SAMPLE_VALUE: u16 = 341;
    pub const JPEG_TABLES: u16 = 347;
    pub const JPEG_INTERCHANGE_FORMAT: u16 = 513;
    pub const JPEG_INTERCHANGE_FORMAT_LENGTH: u16 = 514;
    pub const YCBCR_SUBSAMPLING: u16 = 530;
    pub const XMP: u16 = 700;
    pub const KODAK_33423: u16 = 33423;
    pub const COPYRIGHT: u16 = 33432;
    pub const RICH_TIFF_IPTC: u16 = 33723;
    pub const PHOTOSHOP: u16 = 34377;
    pub const ICC_PROFILE: u16 = 34675;
    pub const KODAK_36867: u16 = 36867;
    pub const IMAGE_SOURCE_DATA: u16 = 37724;
}

/// `NewSubfileType` bit for a reduced-resolution copy.
pub const FILETYPE_REDUCED_IMAGE: u64 = 1;
/// `NewSubfileType` bit for one page of a multi-page document.
pub const FILETYPE_PAGE: u64 = 2;

/// `ExtraSamples` value for unspecified data.
pub const EXTRASAMPLE_UNSPECIFIED: u64 = 0;
/// `ExtraSamples` value for premultiplied alpha.
pub const EXTRASAMPLE_ASSOCALPHA: u64 = 1;
/// `ExtraSamples` value for straight alpha.
pub const EXTRASAMPLE_UNASSALPHA: u64 = 2;

/// `InkSet` value for CMYK.
pub const INKSET_CMYK: u64 = 1;

/// `Group3Options` bit for two-dimensional coding.
pub const GROUP3OPT_2DENCODING: u64 = 0x1;
/// `Group3Options` bit for byte-aligned EOL codes.
pub const GROUP3OPT_FILLBITS: u64 = 0x4;

/// Horizontal differencing predictor.
pub const PREDICTOR_HORIZONTAL: u64 = 2;

// === Field types ===

/// Entry data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// 8-bit unsigned.
    Byte,
    /// NUL-terminated 7-bit text.
    Ascii,
    /// 16-bit unsigned.
    Short,
    /// 32-bit unsigned.
    Long,
    /// Two `Long`s, numerator and denominator.
    Rational,
    /// 8-bit signed.
    SByte,
    /// Opaque bytes.
    Undefined,
    /// 16-bit signed.
    SShort,
    /// 32-bit signed.
    SLong,
    /// Two `SLong`s.
    SRational,
    /// IEEE single.
    Float,
    /// IEEE double.
    Double,
    /// 32-bit directory offset.
    Ifd,
    /// 64-bit unsigned (BigTIFF).
    Long8,
    /// 64-bit signed (BigTIFF).
    SLong8,
    /// 64-bit directory offset (BigTIFF).
    Ifd8,
}

impl FieldType {
    /// Maps a type code; unknown codes are `None`.
    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            1 => Self::Byte,
            2 => Self::Ascii,
            3 => Self::Short,
            4 => Self::Long,
            5 => Self::Rational,
            6 => Self::SByte,
            7 => Self::Undefined,
            8 => Self::SShort,
            9 => Self::SLong,
            10 => Self::SRational,
            11 => Self::Float,
            12 => Self::Double,
            13 => Self::Ifd,
            16 => Self::Long8,
            17 => Self::SLong8,
            18 => Self::Ifd8,
            _ => return None,
        })
    }

    /// Type code written to the entry.
    pub fn code(self) -> u16 {
        match self {
            Self::Byte => 1,
            Self::Ascii => 2,
            Self::Short => 3,
            Self::Long => 4,
            Self::Rational => 5,
            Self::SByte => 6,
            Self::Undefined => 7,
            Self::SShort => 8,
            Self::SLong => 9,
            Self::SRational => 10,
            Self::Float => 11,
            Self::Double => 12,
            Self::Ifd => 13,
            Self::Long8 => 16,
            Self::SLong8 => 17,
            Self::Ifd8 => 18,
        }
    }

    /// Bytes per value.
    pub fn size(self) -> usize {
        match self {
            Self::Byte | Self::Ascii | Self::SByte | Self::Undefined => 1,
            Self::Short | Self::SShort => 2,
            Self::Long | Self::SLong | Self::Float | Self::Ifd => 4,
            Self::Rational | Self::SRational | Self::Double | Self::Long8 | Self::SLong8 | Self::Ifd8 => 8,
        }
    }
}

// === Enumerated values ===

/// Compression schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Stored.
    None,
    /// Modified Huffman run lengths (no EOLs).
    CcittRle,
    /// CCITT Group 3.
    Fax3,
    /// CCITT Group 4.
    Fax4,
    /// Lempel-Ziv-Welch.
    Lzw,
    /// Pre-TIFF 6.0 JPEG.
    OldJpeg,
    /// TIFF 6.0 technical note JPEG.
    Jpeg,
    /// Deflate, registered code.
    AdobeDeflate,
    /// Deflate, legacy code.
    Deflate,
    /// Macintosh PackBits.
    PackBits,
    /// Anything else.
    Other(u16),
}

impl Scheme {
    /// Maps a `Compression` tag value.
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => Self::None,
            2 => Self::CcittRle,
            3 => Self::Fax3,
            4 => Self::Fax4,
            5 => Self::Lzw,
            6 => Self::OldJpeg,
            7 => Self::Jpeg,
            8 => Self::AdobeDeflate,
            32946 => Self::Deflate,
            32773 => Self::PackBits,
            other => Self::Other(other),
        }
    }

    /// `Compression` tag value.
    pub fn code(self) -> u16 {
        match self {
            Self::None => 1,
            Self::CcittRle => 2,
            Self::Fax3 => 3,
            Self::Fax4 => 4,
            Self::Lzw => 5,
            Self::OldJpeg => 6,
            Self::Jpeg => 7,
            Self::AdobeDeflate => 8,
            Self::Deflate => 32946,
            Self::PackBits => 32773,
            Self::Other(code) => code,
        }
    }

    /// Equivalent image compression.
    pub fn compression(self) -> pixmill_core::Compression {
        use pixmill_core::Compression;
        match self {
            Self::None => Compression::None,
            Self::CcittRle | Self::Fax3 => Compression::Fax,
            Self::Fax4 => Compression::Group4,
            Self::Lzw => Compression::Lzw,
            Self::OldJpeg | Self::Jpeg => Compression::Jpeg,
            Self::AdobeDeflate | Self::Deflate => Compression::Zip,
            Self::PackBits => Compression::Rle,
            Self::Other(_) => Compression::Undefined,
        }
    }
}

/// Photometric interpretations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Photometric {
    /// Zero is white.
    MinIsWhite,
    /// Zero is black.
    MinIsBlack,
    /// Red, green, blue.
    Rgb,
    /// Colormap indexes.
    Palette,
    /// Transparency mask.
    Mask,
    /// Ink separations, CMYK when `InkSet` is 1.
    Separated,
    /// Luma and chroma.
    YCbCr,
    /// 1976 CIE L*a*b*.
    CieLab,
    /// Anything else.
    Other(u16),
}

impl Photometric {
    /// Maps a `PhotometricInterpretation` tag value.
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => Self::MinIsWhite,
            1 => Self::MinIsBlack,
            2 => Self::Rgb,
            3 => Self::Palette,
            4 => Self::Mask,
            5 => Self::Separated,
            6 => Self::YCbCr,
            8 => Self::CieLab,
            other => Self::Other(other),
        }
    }

    /// `PhotometricInterpretation` tag value.
    pub fn code(self) -> u16 {
        match self {
            Self::MinIsWhite => 0,
            Self::MinIsBlack => 1,
            Self::Rgb => 2,
            Self::Palette => 3,
            Self::Mask => 4,
            Self::Separated => 5,
            Self::YCbCr => 6,
            Self::CieLab => 8,
            Self::Other(code) => code,
        }
    }
}

/// `SampleFormat` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Unsigned integer.
    Uint,
    /// Two's complement integer.
    Int,
    /// IEEE float.
    IeeeFp,
    /// Unsupported formats.
    Other(u16),
}

impl SampleFormat {
    /// Maps a `SampleFormat` tag value.
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => Self::Uint,
            2 => Self::Int,
            3 => Self::IeeeFp,
            other => Self::Other(other),
        }
    }

    /// `SampleFormat` tag value.
    pub fn code(self) -> u16 {
        match self {
            Self::Uint => 1,
            Self::Int => 2,
            Self::IeeeFp => 3,
            Self::Other(code) => code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_codes() {
        for code in [1u16, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 16, 17, 18] {
            let ty = FieldType::from_code(code).unwrap();
            assert_eq!(ty.code(), code);
        }
        assert!(FieldType::from_code(14).is_none());
        assert_eq!(FieldType::Rational.size(), 8);
        assert_eq!(FieldType::Short.size(), 2);
    }

    #[test]
    fn test_scheme_mapping() {
        assert_eq!(Scheme::from_code(32773), Scheme::PackBits);
        assert_eq!(Scheme::from_code(6).compression(), pixmill_core::Compression::Jpeg);
        assert_eq!(Scheme::from_code(32946).compression(), pixmill_core::Compression::Zip);
        assert_eq!(Scheme::Other(99).code(), 99);
    }

    #[test]
    fn test_photometric_codes() {
        assert_eq!(Photometric::from_code(5), Photometric::Separated);
        assert_eq!(Photometric::CieLab.code(), 8);
        assert_eq!(Photometric::from_code(32844), Photometric::Other(32844));
    }
}
