//! Tagged Image File Format.
//!
//! The container layer ([`ifd`]) reads and writes classic and BigTIFF
//! directories in either byte order. Pixel payloads go through
//! [`compress`] (PackBits, LZW, Deflate, horizontal predictor), [`fax`]
//! (CCITT modified Huffman, T.4, T.6) and [`jpeg`].
//!
//! Registered tags:
//!
//! | Tag | Reads | Writes |
//! |-----|-------|--------|
//! | `TIFF`, `TIF` | every directory | one page per frame |
//! | `TIFF64` | every directory | BigTIFF header |
//! | `PTIF` | every directory | first frame plus a halving pyramid |
//!
//! Only `TIFF` carries the magic test; the other tags are selected by
//! prefix or suffix.
//!
//! Directory chains are walked with a loop guard; a cycle ends the read
//! with a `DirectoryLoopDetected` warning instead of an error.

use crate::registry::{CoderInfo, ThreadSupport};

pub mod compress;
pub mod fax;
pub mod ifd;
pub mod jpeg;
pub mod read;
pub mod tags;
pub mod write;

pub use read::decode;
pub use write::{encode, encode_pyramid};

const MODULE: &str = "tiff";

/// `II*\0`, `MM\0*`, `II+\0` or `MM\0+`.
pub fn is_tiff(header: &[u8]) -> bool {
    matches!(
        header.get(..4),
        Some(b"II*\x00" | b"MM\x00*" | b"II+\x00" | b"MM\x00+")
    )
}

/// Registry entries for the TIFF family.
pub fn coder_info() -> Vec<CoderInfo> {
    let entry = |tag: &str, description: &str| {
        CoderInfo::new(tag, description)
            .with_module(MODULE)
            .with_decoder(decode)
            .with_seekable_stream(true)
            .with_endian_support(true)
            .with_thread_support(ThreadSupport::empty())
    };
    vec![
        entry("TIFF", "Tagged Image File Format")
            .with_encoder(encode)
            .with_magic(is_tiff),
        entry("TIF", "Tagged Image File Format").with_encoder(encode),
        entry("TIFF64", "Tagged Image File Format (64-bit offsets)").with_encoder(encode),
        entry("PTIF", "Pyramid encoded TIFF")
            .with_encoder(encode_pyramid)
            .with_adjoin(false),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_tiff() {
        assert!(is_tiff(b"II*\x00\x08\x00\x00\x00"));
        assert!(is_tiff(b"MM\x00*"));
        assert!(is_tiff(b"MM\x00+\x00\x08"));
        assert!(!is_tiff(b"MM*\x00"));
        assert!(!is_tiff(b"II"));
    }

    #[test]
    fn test_coder_info() {
        let coders = coder_info();
        let tags: Vec<_> = coders.iter().map(|c| c.tag.as_str()).collect();
        assert_eq!(tags, ["TIFF", "TIF", "TIFF64", "PTIF"]);
        assert!(coders.iter().all(|c| c.seekable_stream && c.decoder.is_some()));
        assert!(coders.iter().all(|c| c.thread_support.is_empty()));
        assert!(!coders[3].adjoin);
        let with_magic: Vec<_> = coders
            .iter()
            .filter(|c| c.magic.is_some())
            .map(|c| c.tag.as_str())
            .collect();
        assert_eq!(with_magic, ["TIFF"]);
    }
}
