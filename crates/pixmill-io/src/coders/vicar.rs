//! VICAR rasters.
//!
//! A space-separated `KEY=VALUE` label of `LBLSIZE` bytes precedes 8-bit
//! gray lines. Only the keys that fix the geometry are interpreted; every
//! key seen before the geometry is complete is kept as a `vicar:<KEY>`
//! property.

use pixmill_core::{Colorspace, Image, ImageInfo, ImageList};
use tracing::debug;

use crate::blob::Blob;
use crate::coders::{allocate, warn_eof};
use crate::context::Context;
use crate::error::{IoError, IoResult, OptionErrorKind};
use crate::quantum::{export_pixels, import_row, QuantumInfo, QuantumType};
use crate::registry::CoderInfo;

const MODULE: &str = "vicar";

/// Label size emitted by the encoder.
pub const LABEL_SIZE: usize = 2880;

/// Returns `true` for `LBLSIZE`, `NJPL1I` or `PDS_VERSION_ID` headers.
pub fn is_vicar(header: &[u8]) -> bool {
    [&b"LBLSIZE"[..], b"NJPL1I", b"PDS_VERSION_ID"]
        .iter()
        .any(|magic| header.len() >= magic.len() && header[..magic.len()].eq_ignore_ascii_case(magic))
}

/// Registry entry.
pub fn coder_info() -> Vec<CoderInfo> {
    vec![
        CoderInfo::new("VICAR", "VICAR rasterfile format")
            .with_module(MODULE)
            .with_decoder(decode)
            .with_encoder(encode)
            .with_magic(is_vicar)
            .with_adjoin(false),
    ]
}

// === Label ===

#[derive(Debug, Default)]
struct Label {
    columns: usize,
    rows: usize,
    size: u64,
    entries: Vec<(String, String)>,
}

/// Byte cursor with one byte of lookahead and a running count.
struct Scanner<'a> {
    blob: &'a mut Blob,
    current: Option<u8>,
    consumed: u64,
}

impl<'a> Scanner<'a> {
    fn new(blob: &'a mut Blob) -> IoResult<Self> {
        let mut scanner = Self {
            blob,
            current: None,
            consumed: 0,
        };
        scanner.bump()?;
        Ok(scanner)
    }

    fn bump(&mut self) -> IoResult<()> {
        self.current = self.blob.read_byte()?;
        if self.current.is_some() {
            self.consumed += 1;
        }
        Ok(())
    }

    fn skip_while(&mut self, pred: impl Fn(u8) -> bool) -> IoResult<()> {
        while self.current.is_some_and(&pred) {
            self.bump()?;
        }
        Ok(())
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> IoResult<String> {
        let mut text = String::new();
        while let Some(c) = self.current.filter(|&c| pred(c)) {
            text.push(c as char);
            self.bump()?;
        }
        Ok(text)
    }
}

fn read_label(blob: &mut Blob) -> IoResult<Label> {
    let mut label = Label::default();
    let mut scanner = Scanner::new(blob)?;
    while scanner.current.is_some_and(|c| c.is_ascii_graphic() || c == b' ')
        && (label.columns == 0 || label.rows == 0)
    {
        scanner.skip_while(|c| c == b' ')?;
        if !scanner.current.is_some_and(|c| c.is_ascii_alphanumeric()) {
            if scanner.current.is_some_and(|c| c.is_ascii_graphic()) {
                scanner.bump()?;
            }
            continue;
        }
        let keyword = scanner.take_while(|c| c.is_ascii_alphanumeric() || c == b'_')?;
        scanner.skip_while(|c| c == b' ')?;
        if scanner.current != Some(b'=') {
            continue;
        }
        scanner.bump()?;
        scanner.skip_while(|c| c == b' ')?;
        let value = if scanner.current == Some(b'\'') {
            scanner.bump()?;
            let quoted = scanner.take_while(|c| c != b'\'')?;
            scanner.bump()?;
            quoted
        } else {
            scanner.take_while(|c| c.is_ascii_graphic())?
        };
        let number = || value.trim().parse::<u64>().unwrap_or(0);
        match keyword.to_ascii_uppercase().as_str() {
            "LBLSIZE" | "LABEL_RECORDS" => label.size = number(),
            "RECORD_BYTES" | "NS" => label.columns = number() as usize,
            "LINES" | "NL" => label.rows = number() as usize,
            _ => {}
        }
        label.entries.push((keyword, value));
    }
    // The lookahead byte has been counted but not consumed as label text.
    let consumed = scanner.consumed - u64::from(scanner.current.is_some());
    if consumed < label.size {
        let remaining = label.size - consumed;
        if scanner.current.is_some() {
            scanner.blob.skip(remaining - 1)?;
        } else {
            scanner.blob.skip(remaining)?;
        }
    }
    Ok(label)
}

// === Decoding ===

/// Reads a VICAR raster as an 8-bit colormapped gray image.
pub fn decode(info: &ImageInfo, blob: &mut Blob, ctx: &mut Context) -> IoResult<ImageList> {
    let label = read_label(blob)?;
    if label.columns == 0 || label.rows == 0 {
        return Err(IoError::option(
            OptionErrorKind::NegativeOrZeroImageSize,
            info.filename.clone(),
        ));
    }
    debug!(columns = label.columns, rows = label.rows, label_size = label.size, "vicar label");

    let mut image = Image::from_info(info);
    for (key, value) in &label.entries {
        image.properties.set(format!("vicar:{key}"), value.as_str());
    }
    allocate(&mut image, info, label.columns, label.rows)?;
    image.depth = 8;
    image.set_colorspace(Colorspace::Gray);
    image.allocate_colormap(256)?;

    if !info.ping {
        let qi = QuantumInfo::default().with_depth(8);
        for y in 0..label.rows {
            let row = blob.read_up_to(label.columns)?;
            if row.len() < label.columns {
                warn_eof(ctx, &mut image, MODULE);
                break;
            }
            import_row(&mut image, &qi, QuantumType::Gray, y, &row)?;
            ctx.progress(MODULE, y as u64, label.rows as u64)?;
        }
    }
    let mut list = ImageList::new();
    list.append(image);
    Ok(list)
}

// === Encoding ===

fn label_text(columns: usize, rows: usize) -> Vec<u8> {
    let text = format!(
        "LBLSIZE={LABEL_SIZE} FORMAT='BYTE' TYPE='IMAGE' BUFSIZE=20000 DIM=2 EOL=0 \
         RECSIZE={columns} ORG='BSQ' NL={rows} NS={columns} NB=1 N1=0 N2=0 N3=0 N4=0 NBB=0 \
         NLB=0 TASK='pixmill'"
    );
    let mut label = text.into_bytes();
    label.resize(LABEL_SIZE, b' ');
    label
}

/// Writes the first image as a single VICAR gray plane.
pub fn encode(_info: &ImageInfo, list: &mut ImageList, blob: &mut Blob, ctx: &mut Context) -> IoResult<()> {
    let Some(image) = list.first() else {
        return Ok(());
    };
    let (columns, rows) = (image.columns(), image.rows());
    blob.write_bytes(&label_text(columns, rows))?;
    let qi = QuantumInfo::default().with_depth(8);
    let mut row = Vec::with_capacity(columns);
    for y in 0..rows {
        row.clear();
        export_pixels(image, &qi, QuantumType::Gray, 0, y, columns, 1, &mut row)?;
        blob.write_bytes(&row)?;
        ctx.progress(MODULE, y as u64, rows as u64)?;
    }
    Ok(())
}
