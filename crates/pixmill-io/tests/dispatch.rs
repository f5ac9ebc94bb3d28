//! End-to-end reads and writes through the dispatcher.

use std::fs;
use std::sync::Arc;

use approx::assert_relative_eq;
use pixmill_core::quantum::scale_char_to_quantum;
use pixmill_core::{Colorspace, Endian, Image, ImageInfo, ImageList, Interlace, QUANTUM_RANGE};
use pixmill_io::{
    constitute_image, ping_image, read_image, read_image_blob, read_image_with, write_image,
    write_image_blob, write_image_with, CodecErrorKind, Context, DelegateTable, PixelStorage,
    Registry,
};

/// Routes `RUST_LOG`-filtered dispatcher logs to the test output.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn rgb_image(columns: usize, rows: usize) -> Image {
    let samples: Vec<u8> = (0..columns * rows * 3).map(|i| (i * 37 % 256) as u8).collect();
    constitute_image(columns, rows, "RGB", PixelStorage::U8(&samples)).expect("constitute")
}

fn gray_image(values: &[u8]) -> Image {
    constitute_image(values.len(), 1, "I", PixelStorage::U8(values)).expect("constitute")
}

fn encode(filename: &str, image: Image) -> Vec<u8> {
    write_image_blob(&ImageInfo::new(filename), &mut ImageList::from(image)).expect("encode")
}

// === Scenarios ===

#[test]
fn ppm_body_matches_samples() {
    let samples = [255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255];
    let image = constitute_image(2, 2, "RGB", PixelStorage::U8(&samples)).unwrap();
    let data = encode("s1.ppm", image);
    let header = b"P6\n2 2\n255\n";
    assert!(data.starts_with(header));
    assert_eq!(&data[header.len()..], &samples);
}

#[test]
fn pgm_single_pixel() {
    let data = encode("s2.pgm", gray_image(&[128]));
    assert_eq!(data, b"P5\n1 1\n255\n\x80");
}

#[test]
fn vicar_label_and_body() {
    let info = ImageInfo::new("s3").with_magick("VICAR");
    let mut list = ImageList::from(gray_image(&[0, 64, 128, 255]));
    let data = write_image_blob(&info, &mut list).unwrap();
    assert_eq!(data.len(), 2880 + 4);
    let label = String::from_utf8_lossy(&data[..2880]);
    assert!(label.contains("LBLSIZE=2880"));
    assert!(label.contains("NS=4"));
    assert!(label.contains("NL=1"));
    assert_eq!(&data[2880..], &[0x00, 0x40, 0x80, 0xFF]);

    let back = read_image_blob(&ImageInfo::new("s3.img"), data).unwrap();
    assert_eq!(back[0].magick, "VICAR");
    assert_eq!(back[0].columns(), 4);
}

#[test]
fn fits_float_plane() {
    let cards = [
        "SIMPLE  =                    T",
        "BITPIX  =                  -32",
        "NAXIS   =                    2",
        "NAXIS1  =                    2",
        "NAXIS2  =                    1",
        "BSCALE  =                  1.0",
        "BZERO   =                  0.0",
        "END",
    ];
    let mut data = Vec::new();
    for card in cards {
        data.extend_from_slice(format!("{card:<80}").as_bytes());
    }
    data.resize(2880, b' ');
    data.extend_from_slice(&0.25f32.to_be_bytes());
    data.extend_from_slice(&0.75f32.to_be_bytes());
    data.resize(2 * 2880, 0);

    let list = read_image_blob(&ImageInfo::new("s4"), data).unwrap();
    let image = &list[0];
    assert_eq!(image.magick, "FITS");
    assert_relative_eq!(image.pixel(0, 0).unwrap().red / QUANTUM_RANGE, 0.25, epsilon = 1e-3);
    assert_relative_eq!(image.pixel(1, 0).unwrap().red / QUANTUM_RANGE, 0.75, epsilon = 1e-3);
}

#[test]
fn pfm_little_endian_pixel() {
    let mut data = b"PF\n1 1\n-1.0\n".to_vec();
    data.extend_from_slice(&[0x00, 0x00, 0x80, 0x3F, 0x00, 0x00, 0x00, 0x40, 0x00, 0x00, 0x40, 0x40]);
    let list = read_image_blob(&ImageInfo::new("s5.pfm"), data).unwrap();
    let image = &list[0];
    assert_eq!(image.endian, Endian::Lsb);
    let p = image.pixel(0, 0).unwrap();
    assert_relative_eq!(p.red, QUANTUM_RANGE, epsilon = 0.5);
    assert_relative_eq!(p.green, 2.0 * QUANTUM_RANGE, epsilon = 1.0);
    assert_relative_eq!(p.blue, 3.0 * QUANTUM_RANGE, epsilon = 1.0);
}

// === Round trips ===

#[test]
fn binary_pnm_and_raw_reencode_identically() {
    for name in ["a.ppm", "a.pgm"] {
        let first = encode(name, rgb_image(5, 3));
        let mut list = read_image_blob(&ImageInfo::new(name), first.clone()).unwrap();
        let second = write_image_blob(&ImageInfo::new(name), &mut list).unwrap();
        assert_eq!(first, second, "{name}");
    }
    let first = encode("a.rgb", rgb_image(5, 3));
    let mut list = read_image_blob(&ImageInfo::new("a.rgb").with_size("5x3"), first.clone()).unwrap();
    let second = write_image_blob(&ImageInfo::new("a.rgb"), &mut list).unwrap();
    assert_eq!(first, second);
}

#[test]
fn raw_interlace_modes_round_trip() {
    let original = rgb_image(4, 3);
    for tag in ["rgb", "ycbcr"] {
        for interlace in [Interlace::None, Interlace::Line, Interlace::Plane] {
            let name = format!("x.{tag}");
            let info = ImageInfo::new(&name).with_interlace(interlace);
            let data = write_image_blob(&info, &mut ImageList::from(original.clone())).unwrap();
            assert_eq!(data.len(), 4 * 3 * 3);
            let back = read_image_blob(&info.clone().with_size("4x3"), data).unwrap();
            assert_eq!(back[0].pixels(), original.pixels(), "{tag} {interlace:?}");
        }
    }
}

#[test]
fn raw_partition_round_trip() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let original = rgb_image(3, 2);
    for tag in ["rgb", "ycbcr"] {
        let name = dir.path().join(format!("part.{tag}")).to_string_lossy().into_owned();
        let info = ImageInfo::new(&name).with_interlace(Interlace::Partition);
        write_image(&info, &mut ImageList::from(original.clone())).unwrap();
        let back = read_image(&info.clone().with_size("3x2")).unwrap();
        assert_eq!(back[0].pixels(), original.pixels(), "{tag}");
    }
    let parts = fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(parts, 6);
}

#[test]
fn pam_gray_alpha_is_exact() {
    let samples8: Vec<u8> = vec![0, 255, 90, 0, 200, 128, 255, 17];
    let image = constitute_image(2, 2, "IA", PixelStorage::U8(&samples8)).unwrap();
    let data = encode("ga.pam", image.clone());
    assert!(String::from_utf8_lossy(&data).contains("TUPLTYPE GRAYSCALE_ALPHA"));
    let back = read_image_blob(&ImageInfo::new("ga.pam"), data).unwrap();
    assert!(back[0].matte);
    assert_eq!(back[0].pixels(), image.pixels());

    let samples16: Vec<u16> = vec![0, 65535, 1234, 0, 40000, 32768, 65535, 7];
    let image = constitute_image(2, 2, "IA", PixelStorage::U16(&samples16)).unwrap();
    let data = encode("ga.pam", image.clone());
    let back = read_image_blob(&ImageInfo::new("ga.pam"), data).unwrap();
    assert_eq!(back[0].depth, 16);
    assert_eq!(back[0].pixels(), image.pixels());
}

// === Dispatcher behavior ===

#[test]
fn ping_agrees_with_read() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let name = dir.path().join("multi.tif").to_string_lossy().into_owned();
    let mut list = ImageList::new();
    for scene in 0..3 {
        let mut image = rgb_image(6 + scene, 4);
        image.scene = scene;
        list.append(image);
    }
    write_image(&ImageInfo::new(&name), &mut list).unwrap();

    let pinged = ping_image(&ImageInfo::new(&name)).unwrap();
    let read = read_image(&ImageInfo::new(&name)).unwrap();
    assert_eq!(pinged.len(), read.len());
    for (p, r) in pinged.iter().zip(read.iter()) {
        assert_eq!((p.columns(), p.rows(), &p.magick), (r.columns(), r.rows(), &r.magick));
        assert!(!p.has_pixels());
        assert!(r.has_pixels());
    }
    let scenes: Vec<_> = read.iter().map(|i| i.scene).collect();
    assert_eq!(scenes, [0, 1, 2]);

    let tail = read_image(&ImageInfo::new(&name).with_scenes(1, 0)).unwrap();
    assert_eq!(tail.iter().map(|i| i.scene).collect::<Vec<_>>(), [1, 2]);
}

#[test]
fn palette_indexes_stay_in_bounds() {
    let mut image = Image::new(4, 2).unwrap();
    let colors: Vec<_> = (0..5)
        .map(|i| pixmill_core::PixelPacket::rgb(i as f32 * 9000.0, 0.0, QUANTUM_RANGE))
        .collect();
    image.set_colormap(colors.clone()).unwrap();
    for y in 0..2 {
        for x in 0..4 {
            let index = (x + y * 4) % colors.len();
            image.set_index(x, y, index as f32).unwrap();
            image.set_pixel(x, y, colors[index]).unwrap();
        }
    }
    let data = encode("pal.tif", image);
    let back = read_image_blob(&ImageInfo::new("pal.tif"), data).unwrap();
    let image = &back[0];
    assert!(!image.colormap().is_empty());
    assert!(image.indexes().iter().all(|&i| (i as usize) < image.colormap().len()));
}

#[test]
fn progress_cancel_stops_read() {
    let rows = 64;
    let samples = vec![7u8; 8 * rows];
    let image = constitute_image(8, rows, "I", PixelStorage::U8(&samples)).unwrap();
    let data = encode("tall.pgm", image);
    let mut ctx = Context::new().with_monitor(|_: &str, offset: u64, _: u64| offset < 10);
    let info = ImageInfo::new("tall.pgm").with_blob(data);
    let err = read_image_with(&info, Registry::global(), &mut ctx).unwrap_err();
    assert!(err.is_cancelled());
}

#[test]
fn failed_write_leaves_no_files() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let name = dir.path().join("out.pgm").to_string_lossy().into_owned();
    let samples = vec![1u8; 4 * 32];
    let image = constitute_image(4, 32, "I", PixelStorage::U8(&samples)).unwrap();
    let mut ctx = Context::new().with_monitor(|_: &str, offset: u64, _: u64| offset < 5);
    let err = write_image_with(&ImageInfo::new(&name), &mut ImageList::from(image.clone()), Registry::global(), &mut ctx)
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);

    write_image(&ImageInfo::new(&name), &mut ImageList::from(image)).unwrap();
    let names: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["out.pgm"]);
}

#[test]
fn missing_raw_size_is_reported() {
    let err = read_image_blob(&ImageInfo::new("x.gray"), vec![0; 16]).unwrap_err();
    assert_eq!(
        err.option_kind(),
        Some(pixmill_io::OptionErrorKind::MustSpecifyImageSize)
    );
}

#[test]
fn prefix_overrides_magic() {
    let data = encode("p.pgm", gray_image(&[10, 20, 30, 40]));
    // The PGM header bytes are read as raw gray samples.
    let list = read_image_blob(&ImageInfo::new("gray:p.pgm").with_size("4x1"), data).unwrap();
    assert_eq!(list[0].magick, "GRAY");
    assert_eq!(list[0].pixel(0, 0).unwrap().red, scale_char_to_quantum(b'P'));
}

#[test]
fn cmyk_constitution_writes_cmyk_tiff() {
    let samples = [0u8, 50, 100, 150, 200, 250, 25, 75];
    let image = constitute_image(2, 1, "CMYK", PixelStorage::U8(&samples)).unwrap();
    let info = ImageInfo::new("c.tif").with_interlace(Interlace::Plane);
    let first = write_image_blob(&info, &mut ImageList::from(image.clone())).unwrap();
    let back = read_image_blob(&info, first).unwrap();
    assert_eq!(back[0].colorspace(), Colorspace::Cmyk);
    assert_eq!(back[0].pixels(), image.pixels());
    assert_eq!(back[0].indexes(), image.indexes());
}

#[test]
fn detected_tiff_rewrites_as_single_page_tiff() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("noext").to_string_lossy().into_owned();
    let target = dir.path().join("out").to_string_lossy().into_owned();
    let samples: Vec<u8> = (0..128 * 128).map(|i| (i % 251) as u8).collect();
    let image = constitute_image(128, 128, "I", PixelStorage::U8(&samples)).unwrap();
    fs::write(&source, encode("seed.tif", image)).unwrap();

    let mut list = read_image(&ImageInfo::new(&source)).unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].magick, "TIFF");
    write_image(&ImageInfo::new(&target), &mut list).unwrap();

    let again = read_image(&ImageInfo::new(&target)).unwrap();
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].magick, "TIFF");
    assert_eq!((again[0].columns(), again[0].rows()), (128, 128));
    assert_eq!(again[0].pixels(), list[0].pixels());
}

#[test]
fn detected_pnm_and_vicar_keep_their_format_on_rewrite() {
    let dir = tempfile::tempdir().unwrap();
    let cases = [
        ("seed.ppm", rgb_image(4, 3), "PNM"),
        ("seed.vicar", gray_image(&[0, 64, 128, 255]), "VICAR"),
    ];
    for (seed, image, tag) in cases {
        let source = dir.path().join(format!("{tag}-in")).to_string_lossy().into_owned();
        let target = dir.path().join(format!("{tag}-out")).to_string_lossy().into_owned();
        fs::write(&source, encode(seed, image.clone())).unwrap();
        let mut list = read_image(&ImageInfo::new(&source)).unwrap();
        assert_eq!(list[0].magick, tag);
        write_image(&ImageInfo::new(&target), &mut list).unwrap();
        let again = read_image(&ImageInfo::new(&target)).unwrap();
        assert_eq!(again.len(), 1, "{tag}");
        assert_eq!(again[0].magick, tag);
        assert_eq!(again[0].pixels(), image.pixels(), "{tag}");
    }
}

#[cfg(unix)]
#[test]
fn delegates_cover_unknown_tags() {
    init_tracing();
    let table = DelegateTable::new();
    table.set("xyz-decode", "cp %i %o");
    table.set("xyz-encode", "cp %i %o");
    let mut ctx = Context::new().with_delegates(Arc::new(table));

    let pgm = encode("d.pgm", gray_image(&[1, 2, 3]));
    let info = ImageInfo::new("xyz:d.dat").with_blob(pgm);
    let list = read_image_with(&info, Registry::global(), &mut ctx).unwrap();
    assert_eq!(list[0].magick, "XYZ");
    assert_eq!(list[0].columns(), 3);

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("out.xyz").to_string_lossy().into_owned();
    let mut list = list;
    write_image_with(&ImageInfo::new(&target), &mut list, Registry::global(), &mut ctx).unwrap();
    assert!(fs::read(&target).unwrap().starts_with(b"P"));

    let err = read_image_blob(&ImageInfo::new("abc:d.dat"), vec![0; 4]).unwrap_err();
    assert_eq!(err.codec_kind(), Some(CodecErrorKind::NoDecoder));
}
