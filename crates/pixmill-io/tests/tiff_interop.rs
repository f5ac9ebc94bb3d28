//! TIFF files exchanged with the `tiff` crate.

use std::io::Cursor;

use pixmill_core::quantum::scale_short_to_quantum;
use pixmill_core::{Colorspace, Compression, Endian, ImageInfo, ImageList, Interlace};
use pixmill_io::{constitute_image, read_image_blob, write_image_blob, PixelStorage};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::ColorType;

fn decode_u8(data: Vec<u8>) -> (ColorType, (u32, u32), Vec<u8>) {
    let mut decoder = Decoder::new(Cursor::new(data)).expect("tiff header");
    let color = decoder.colortype().expect("color type");
    let dims = decoder.dimensions().expect("dimensions");
    match decoder.read_image().expect("pixels") {
        DecodingResult::U8(samples) => (color, dims, samples),
        other => panic!("unexpected sample type: {other:?}"),
    }
}

fn schemes() -> Vec<Compression> {
    let mut schemes = vec![Compression::None, Compression::Rle];
    if cfg!(feature = "lzw") {
        schemes.push(Compression::Lzw);
    }
    if cfg!(feature = "deflate") {
        schemes.push(Compression::Zip);
    }
    schemes
}

#[test]
fn rgb_strips_decode_with_tiff_crate() {
    let samples: Vec<u8> = (0..7 * 5 * 3).map(|i| (i * 11 % 256) as u8).collect();
    let image = constitute_image(7, 5, "RGB", PixelStorage::U8(&samples)).unwrap();
    for compression in schemes() {
        let info = ImageInfo::new("interop.tif").with_compression(compression);
        let data = write_image_blob(&info, &mut ImageList::from(image.clone())).unwrap();
        let (color, dims, decoded) = decode_u8(data);
        assert_eq!(color, ColorType::RGB(8), "{compression}");
        assert_eq!(dims, (7, 5));
        assert_eq!(decoded, samples, "{compression}");
    }
}

#[test]
fn big_endian_bigtiff_decodes_with_tiff_crate() {
    let samples: Vec<u8> = (0..16).map(|i| i * 16).collect();
    let image = constitute_image(4, 4, "I", PixelStorage::U8(&samples)).unwrap();
    let info = ImageInfo::new("big.tif").with_magick("TIFF64").with_endian(Endian::Msb);
    let data = write_image_blob(&info, &mut ImageList::from(image)).unwrap();
    assert!(data.starts_with(b"MM\x00+"));
    let (color, _, decoded) = decode_u8(data);
    assert_eq!(color, ColorType::Gray(8));
    assert_eq!(decoded, samples);
}

#[test]
fn tiff_crate_gray16_reads() {
    let samples: Vec<u16> = vec![0, 1000, 20000, 40000, 65535, 12345];
    let mut buffer = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut buffer).unwrap();
        encoder.write_image::<colortype::Gray16>(3, 2, &samples).unwrap();
    }
    let list = read_image_blob(&ImageInfo::new("from-tiff-crate.tif"), buffer.into_inner()).unwrap();
    let image = &list[0];
    assert_eq!(image.magick, "TIFF");
    assert_eq!((image.columns(), image.rows(), image.depth), (3, 2, 16));
    assert!(image.is_gray());
    for (i, &v) in samples.iter().enumerate() {
        assert_eq!(image.pixel(i % 3, i / 3).unwrap().red, scale_short_to_quantum(v));
    }
}

#[test]
fn tiff_crate_rgba8_reads() {
    let samples: Vec<u8> = vec![255, 0, 0, 255, 0, 255, 0, 0];
    let mut buffer = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut buffer).unwrap();
        encoder.write_image::<colortype::RGBA8>(2, 1, &samples).unwrap();
    }
    let list = read_image_blob(&ImageInfo::new("rgba.tif"), buffer.into_inner()).unwrap();
    let image = &list[0];
    assert!(image.matte);
    assert_eq!(image.pixel(0, 0).unwrap().opacity, 0.0);
    assert_eq!(image.pixel(1, 0).unwrap().green, 65535.0);
}

#[test]
fn associated_alpha_payload_survives_reencode() {
    let samples: Vec<u8> = vec![200, 100, 50, 128, 10, 20, 30, 255, 90, 90, 90, 0, 255, 255, 255, 64];
    let image = constitute_image(2, 2, "RGBA", PixelStorage::U8(&samples)).unwrap();
    let info = ImageInfo::new("assoc.tif").with_option("tiff:alpha", "associate");
    let first = write_image_blob(&info, &mut ImageList::from(image)).unwrap();

    let (color, _, stored) = decode_u8(first.clone());
    assert_eq!(color, ColorType::RGBA(8));
    assert!((stored[0] as i32 - 100).abs() <= 1);
    assert_eq!(&stored[4..8], &[10, 20, 30, 255]);

    let mut back = read_image_blob(&ImageInfo::new("assoc.tif"), first).unwrap();
    let p = back[0].pixel(0, 0).unwrap();
    assert!((p.red / 257.0 - 200.0).abs() <= 2.0);
    let second = write_image_blob(&info, &mut back).unwrap();
    let (_, _, restored) = decode_u8(second);
    assert_eq!(restored, stored);
}

#[test]
fn planar_cmyk_payload_round_trips() {
    let samples: Vec<u8> = (0..2 * 2 * 4).map(|i| (i * 15) as u8).collect();
    let image = constitute_image(2, 2, "CMYK", PixelStorage::U8(&samples)).unwrap();
    let info = ImageInfo::new("cmyk.tif").with_interlace(Interlace::Plane);
    let first = write_image_blob(&info, &mut ImageList::from(image.clone())).unwrap();

    let mut back = read_image_blob(&ImageInfo::new("cmyk.tif"), first).unwrap();
    assert_eq!(back[0].colorspace(), Colorspace::Cmyk);
    assert_eq!(back[0].interlace, Interlace::Plane);
    assert_eq!(back[0].indexes(), image.indexes());
    assert_eq!(back[0].pixels(), image.pixels());

    let second = write_image_blob(&info, &mut back).unwrap();
    let again = read_image_blob(&ImageInfo::new("cmyk.tif"), second).unwrap();
    assert_eq!(again[0].indexes(), image.indexes());
    assert_eq!(again[0].pixels(), image.pixels());
}
