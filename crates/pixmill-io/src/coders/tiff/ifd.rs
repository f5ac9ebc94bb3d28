//! File header and image file directories.
//!
//! Reading walks the directory chain one [`Directory`] at a time with
//! [`read_directory`]; entry values are kept as raw bytes in file order
//! and decoded on access. Writing assembles the whole file in memory with
//! [`FileWriter`] so that directory links can be patched without seeking
//! the output stream.
//!
//! | Layout | Header | Entry | Count | Next link |
//! |--------|--------|-------|-------|-----------|
//! | classic | 8 bytes, magic 42 | 12 bytes | `u16` | `u32` |
//! | BigTIFF | 16 bytes, magic 43 | 20 bytes | `u64` | `u64` |

use std::collections::BTreeMap;
use std::io::SeekFrom;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use pixmill_core::Endian;
use smallvec::SmallVec;
use tracing::trace;

use super::tags::FieldType;
use crate::blob::Blob;
use crate::error::{CodecErrorKind, IoError, IoResult};

/// Classic TIFF magic.
pub const MAGIC_CLASSIC: u16 = 42;
/// BigTIFF magic.
pub const MAGIC_BIG: u16 = 43;

// Directories beyond this many entries are treated as corrupt.
const MAX_ENTRIES: u64 = 4096;

/// Decoded file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Byte order, `Lsb` for `II` and `Msb` for `MM`.
    pub endian: Endian,
    /// `true` for 64-bit offsets.
    pub big: bool,
    /// Offset of the first directory.
    pub first: u64,
}

impl Header {
    fn offset_size(&self) -> usize {
        if self.big { 8 } else { 4 }
    }
}

/// Reads the header at the current blob position.
pub fn read_header(blob: &mut Blob) -> IoResult<Header> {
    let mut order = [0u8; 2];
    blob.read_exact_into(&mut order)?;
    let endian = match &order {
        b"II" => Endian::Lsb,
        b"MM" => Endian::Msb,
        _ => return Err(IoError::improper_header(blob.filename().to_string())),
    };
    let magic = read_uint(blob, endian, 2)? as u16;
    match magic {
        MAGIC_CLASSIC => {
            let first = read_uint(blob, endian, 4)?;
            Ok(Header { endian, big: false, first })
        }
        MAGIC_BIG => {
            let offset_size = read_uint(blob, endian, 2)?;
            let reserved = read_uint(blob, endian, 2)?;
            if offset_size != 8 || reserved != 0 {
                return Err(IoError::improper_header(blob.filename().to_string()));
            }
            let first = read_uint(blob, endian, 8)?;
            Ok(Header { endian, big: true, first })
        }
        _ => Err(IoError::improper_header(blob.filename().to_string())),
    }
}

fn read_uint(blob: &mut Blob, endian: Endian, size: usize) -> IoResult<u64> {
    let mut buf = [0u8; 8];
    blob.read_exact_into(&mut buf[..size])?;
    Ok(get_uint(&buf[..size], endian))
}

/// Decodes an unsigned integer of `bytes.len()` bytes (1, 2, 4 or 8).
pub fn get_uint(bytes: &[u8], endian: Endian) -> u64 {
    let lsb = endian == Endian::Lsb;
    match (bytes.len(), lsb) {
        (1, _) => bytes[0] as u64,
        (2, true) => LittleEndian::read_u16(bytes) as u64,
        (2, false) => BigEndian::read_u16(bytes) as u64,
        (4, true) => LittleEndian::read_u32(bytes) as u64,
        (4, false) => BigEndian::read_u32(bytes) as u64,
        (8, true) => LittleEndian::read_u64(bytes),
        (8, false) => BigEndian::read_u64(bytes),
        _ => 0,
    }
}

/// Appends an unsigned integer of `size` bytes (1, 2, 4 or 8).
pub fn put_uint(out: &mut Vec<u8>, endian: Endian, value: u64, size: usize) {
    let mut buf = [0u8; 8];
    let lsb = endian != Endian::Msb;
    match (size, lsb) {
        (1, _) => buf[0] = value as u8,
        (2, true) => LittleEndian::write_u16(&mut buf, value as u16),
        (2, false) => BigEndian::write_u16(&mut buf, value as u16),
        (4, true) => LittleEndian::write_u32(&mut buf, value as u32),
        (4, false) => BigEndian::write_u32(&mut buf, value as u32),
        (8, true) => LittleEndian::write_u64(&mut buf, value),
        _ => BigEndian::write_u64(&mut buf, value),
    }
    out.extend_from_slice(&buf[..size]);
}

// === Reading ===

/// One directory entry.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Value type.
    pub field_type: FieldType,
    /// Number of values.
    pub count: u64,
    /// Raw values in file byte order.
    pub data: Vec<u8>,
}

/// One image file directory.
#[derive(Debug, Clone)]
pub struct Directory {
    /// File offset of the directory.
    pub offset: u64,
    /// Offset of the next directory, `0` at the end of the chain.
    pub next: u64,
    endian: Endian,
    entries: BTreeMap<u16, Entry>,
}

/// Reads the directory at `offset`, resolving out-of-line values.
pub fn read_directory(blob: &mut Blob, header: &Header, offset: u64) -> IoResult<Directory> {
    let endian = header.endian;
    let offset_size = header.offset_size();
    let file_size = blob.size()?;
    if offset < 8 || offset >= file_size {
        return Err(IoError::improper_header(format!(
            "{}: directory offset {offset} outside file",
            blob.filename()
        )));
    }
    blob.seek_to(SeekFrom::Start(offset))?;
    let count = read_uint(blob, endian, if header.big { 8 } else { 2 })?;
    if count > MAX_ENTRIES {
        return Err(IoError::improper_header(format!(
            "{}: {count} directory entries",
            blob.filename()
        )));
    }

    let mut pending = Vec::with_capacity(count as usize);
    let mut raw = vec![0u8; 4 + 2 * offset_size];
    for _ in 0..count {
        blob.read_exact_into(&mut raw)?;
        let tag = get_uint(&raw[0..2], endian) as u16;
        let code = get_uint(&raw[2..4], endian) as u16;
        let n = get_uint(&raw[4..4 + offset_size], endian);
        let value = raw[4 + offset_size..].to_vec();
        let Some(field_type) = FieldType::from_code(code) else {
            trace!(tag, code, "skipping entry of unknown type");
            continue;
        };
        pending.push((tag, field_type, n, value));
    }
    let next = read_uint(blob, endian, offset_size)?;

    let mut entries = BTreeMap::new();
    for (tag, field_type, n, value) in pending {
        let length = n
            .checked_mul(field_type.size() as u64)
            .filter(|&len| len <= file_size)
            .ok_or_else(|| {
                IoError::codec(
                    CodecErrorKind::ImproperImageHeader,
                    format!("{}: tag {tag} claims {n} values", blob.filename()),
                )
            })?;
        let data = if length as usize <= offset_size {
            value[..length as usize].to_vec()
        } else {
            let at = get_uint(&value, endian);
            if at.checked_add(length).is_none_or(|end| end > file_size) {
                return Err(IoError::codec(
                    CodecErrorKind::ImproperImageHeader,
                    format!("{}: tag {tag} value outside file", blob.filename()),
                ));
            }
            blob.seek_to(SeekFrom::Start(at))?;
            let mut data = vec![0u8; length as usize];
            blob.read_exact_into(&mut data)?;
            data
        };
        entries.insert(
            tag,
            Entry {
                field_type,
                count: n,
                data,
            },
        );
    }
    trace!(offset, entries = entries.len(), next, "read directory");
    Ok(Directory {
        offset,
        next,
        endian,
        entries,
    })
}

impl Directory {
    /// Byte order of the values.
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Returns `true` when `tag` is present.
    pub fn contains(&self, tag: u16) -> bool {
        self.entries.contains_key(&tag)
    }

    /// Raw entry for `tag`.
    pub fn entry(&self, tag: u16) -> Option<&Entry> {
        self.entries.get(&tag)
    }

    /// Tags present, ascending.
    pub fn tags(&self) -> impl Iterator<Item = u16> + '_ {
        self.entries.keys().copied()
    }

    /// Integer values of `tag`. Signed values are reinterpreted; rationals
    /// and floats are `None`.
    pub fn uints(&self, tag: u16) -> Option<SmallVec<[u64; 4]>> {
        let entry = self.entries.get(&tag)?;
        let size = match entry.field_type {
            FieldType::Byte | FieldType::SByte | FieldType::Undefined | FieldType::Ascii => 1,
            FieldType::Short | FieldType::SShort => 2,
            FieldType::Long | FieldType::SLong | FieldType::Ifd => 4,
            FieldType::Long8 | FieldType::SLong8 | FieldType::Ifd8 => 8,
            _ => return None,
        };
        Some(
            entry
                .data
                .chunks_exact(size)
                .map(|chunk| get_uint(chunk, self.endian))
                .collect(),
        )
    }

    /// First integer value of `tag`.
    pub fn uint(&self, tag: u16) -> Option<u64> {
        self.uints(tag)?.first().copied()
    }

    /// First integer value of `tag`, or `default`.
    pub fn uint_or(&self, tag: u16, default: u64) -> u64 {
        self.uint(tag).unwrap_or(default)
    }

    /// Numeric values of `tag` as floats, including rationals.
    pub fn floats(&self, tag: u16) -> Option<SmallVec<[f64; 6]>> {
        let entry = self.entries.get(&tag)?;
        let e = self.endian;
        let values = match entry.field_type {
            FieldType::Rational => entry
                .data
                .chunks_exact(8)
                .map(|c| ratio(get_uint(&c[..4], e) as f64, get_uint(&c[4..], e) as f64))
                .collect(),
            FieldType::SRational => entry
                .data
                .chunks_exact(8)
                .map(|c| ratio(get_uint(&c[..4], e) as u32 as i32 as f64, get_uint(&c[4..], e) as u32 as i32 as f64))
                .collect(),
            FieldType::Float => entry
                .data
                .chunks_exact(4)
                .map(|c| f32::from_bits(get_uint(c, e) as u32) as f64)
                .collect(),
            FieldType::Double => entry
                .data
                .chunks_exact(8)
                .map(|c| f64::from_bits(get_uint(c, e)))
                .collect(),
            _ => self.uints(tag)?.into_iter().map(|v| v as f64).collect(),
        };
        Some(values)
    }

    /// First numeric value of `tag`.
    pub fn float(&self, tag: u16) -> Option<f64> {
        self.floats(tag)?.first().copied()
    }

    /// Text of an ASCII entry up to the first NUL.
    pub fn ascii(&self, tag: u16) -> Option<String> {
        let data = &self.entries.get(&tag)?.data;
        let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        Some(String::from_utf8_lossy(&data[..end]).into_owned())
    }

    /// Raw value bytes of `tag`.
    pub fn bytes(&self, tag: u16) -> Option<&[u8]> {
        self.entries.get(&tag).map(|entry| entry.data.as_slice())
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

// === Writing ===

/// Entries of one directory being written.
#[derive(Debug, Clone)]
pub struct DirectoryBuilder {
    endian: Endian,
    big: bool,
    entries: BTreeMap<u16, Entry>,
}

impl DirectoryBuilder {
    /// Creates an empty directory in the given layout.
    pub fn new(endian: Endian, big: bool) -> Self {
        Self {
            endian,
            big,
            entries: BTreeMap::new(),
        }
    }

    fn insert(&mut self, tag: u16, field_type: FieldType, count: u64, data: Vec<u8>) {
        self.entries.insert(
            tag,
            Entry {
                field_type,
                count,
                data,
            },
        );
    }

    /// Returns `true` when `tag` has been set.
    pub fn contains(&self, tag: u16) -> bool {
        self.entries.contains_key(&tag)
    }

    /// Sets `SHORT` values.
    pub fn short(&mut self, tag: u16, values: &[u16]) {
        let mut data = Vec::with_capacity(values.len() * 2);
        for &v in values {
            put_uint(&mut data, self.endian, v as u64, 2);
        }
        self.insert(tag, FieldType::Short, values.len() as u64, data);
    }

    /// Sets `LONG` values.
    pub fn long(&mut self, tag: u16, values: &[u32]) {
        let mut data = Vec::with_capacity(values.len() * 4);
        for &v in values {
            put_uint(&mut data, self.endian, v as u64, 4);
        }
        self.insert(tag, FieldType::Long, values.len() as u64, data);
    }

    /// Sets offsets or byte counts: `LONG` in classic files, `LONG8` in
    /// BigTIFF.
    pub fn offsets(&mut self, tag: u16, values: &[u64]) -> IoResult<()> {
        if self.big {
            let mut data = Vec::with_capacity(values.len() * 8);
            for &v in values {
                put_uint(&mut data, self.endian, v, 8);
            }
            self.insert(tag, FieldType::Long8, values.len() as u64, data);
            return Ok(());
        }
        let narrow = values
            .iter()
            .map(|&v| u32::try_from(v))
            .collect::<Result<Vec<u32>, _>>()
            .map_err(|_| {
                IoError::codec(
                    CodecErrorKind::ImageTypeNotSupported,
                    "offset exceeds 4 GiB; write TIFF64",
                )
            })?;
        self.long(tag, &narrow);
        Ok(())
    }

    /// Sets unsigned `RATIONAL` values with a fixed denominator.
    pub fn rational(&mut self, tag: u16, values: &[f64]) {
        let mut data = Vec::with_capacity(values.len() * 8);
        for &v in values {
            let (numerator, denominator) = to_rational(v);
            put_uint(&mut data, self.endian, numerator as u64, 4);
            put_uint(&mut data, self.endian, denominator as u64, 4);
        }
        self.insert(tag, FieldType::Rational, values.len() as u64, data);
    }

    /// Sets `DOUBLE` values.
    pub fn double(&mut self, tag: u16, values: &[f64]) {
        let mut data = Vec::with_capacity(values.len() * 8);
        for &v in values {
            put_uint(&mut data, self.endian, v.to_bits(), 8);
        }
        self.insert(tag, FieldType::Double, values.len() as u64, data);
    }

    /// Sets NUL-terminated text.
    pub fn ascii(&mut self, tag: u16, text: &str) {
        let mut data = text.as_bytes().to_vec();
        data.push(0);
        self.insert(tag, FieldType::Ascii, data.len() as u64, data);
    }

    /// Sets opaque bytes as `field_type` (`BYTE` or `UNDEFINED`).
    pub fn bytes(&mut self, tag: u16, field_type: FieldType, data: &[u8]) {
        self.insert(tag, field_type, data.len() as u64, data.to_vec());
    }

    /// Sets pre-encoded 32-bit words, `count` of them.
    pub fn raw_longs(&mut self, tag: u16, data: Vec<u8>) {
        let count = (data.len() / 4) as u64;
        self.insert(tag, FieldType::Long, count, data);
    }
}

/// Positive rational with a denominator of up to 10000.
fn to_rational(value: f64) -> (u32, u32) {
    if !value.is_finite() || value <= 0.0 {
        return (0, 1);
    }
    if value.fract() == 0.0 && value <= u32::MAX as f64 {
        return (value as u32, 1);
    }
    let mut denominator = 10_000u32;
    while denominator > 1 && value * denominator as f64 > u32::MAX as f64 {
        denominator /= 10;
    }
    ((value * denominator as f64).round() as u32, denominator)
}

/// In-memory TIFF being assembled.
#[derive(Debug)]
pub struct FileWriter {
    buf: Vec<u8>,
    endian: Endian,
    big: bool,
    link: usize,
}

impl FileWriter {
    /// Starts a file with a header whose first link is unset.
    pub fn new(endian: Endian, big: bool) -> Self {
        let endian = if endian == Endian::Msb { Endian::Msb } else { Endian::Lsb };
        let mut buf = Vec::new();
        buf.extend_from_slice(if endian == Endian::Lsb { b"II" } else { b"MM" });
        if big {
            put_uint(&mut buf, endian, MAGIC_BIG as u64, 2);
            put_uint(&mut buf, endian, 8, 2);
            put_uint(&mut buf, endian, 0, 2);
            put_uint(&mut buf, endian, 0, 8);
        } else {
            put_uint(&mut buf, endian, MAGIC_CLASSIC as u64, 2);
            put_uint(&mut buf, endian, 0, 4);
        }
        let link = if big { 8 } else { 4 };
        Self { buf, endian, big, link }
    }

    /// Byte order of the file.
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// `true` for BigTIFF.
    pub fn is_big(&self) -> bool {
        self.big
    }

    /// A builder matching this file's layout.
    pub fn directory(&self) -> DirectoryBuilder {
        DirectoryBuilder::new(self.endian, self.big)
    }

    fn align(&mut self) {
        if self.buf.len() % 2 == 1 {
            self.buf.push(0);
        }
    }

    /// Appends a strip or tile, returning its offset.
    pub fn append(&mut self, data: &[u8]) -> u64 {
        self.align();
        let offset = self.buf.len() as u64;
        self.buf.extend_from_slice(data);
        offset
    }

    fn patch(&mut self, at: usize, value: u64) -> IoResult<()> {
        let size = if self.big { 8 } else { 4 };
        if !self.big && value > u32::MAX as u64 {
            return Err(IoError::codec(
                CodecErrorKind::ImageTypeNotSupported,
                "directory offset exceeds 4 GiB; write TIFF64",
            ));
        }
        let mut bytes = Vec::with_capacity(size);
        put_uint(&mut bytes, self.endian, value, size);
        self.buf[at..at + size].copy_from_slice(&bytes);
        Ok(())
    }

    /// Appends a directory and links it after the previous one.
    pub fn write_directory(&mut self, dir: DirectoryBuilder) -> IoResult<()> {
        let offset_size = if self.big { 8 } else { 4 };
        let entry_size = 4 + 2 * offset_size;
        let count_size = if self.big { 8 } else { 2 };
        self.align();
        let start = self.buf.len();
        let table = count_size + dir.entries.len() * entry_size + offset_size;
        let mut spill = start + table;
        spill += spill % 2;

        let mut head = Vec::with_capacity(table);
        let mut tail = Vec::new();
        put_uint(&mut head, self.endian, dir.entries.len() as u64, count_size);
        for (tag, entry) in &dir.entries {
            put_uint(&mut head, self.endian, *tag as u64, 2);
            put_uint(&mut head, self.endian, entry.field_type.code() as u64, 2);
            put_uint(&mut head, self.endian, entry.count, offset_size);
            if entry.data.len() <= offset_size {
                head.extend_from_slice(&entry.data);
                head.extend(std::iter::repeat_n(0u8, offset_size - entry.data.len()));
            } else {
                let at = (spill + tail.len()) as u64;
                put_uint(&mut head, self.endian, at, offset_size);
                tail.extend_from_slice(&entry.data);
                if tail.len() % 2 == 1 {
                    tail.push(0);
                }
            }
        }
        let next_link = start + head.len();
        put_uint(&mut head, self.endian, 0, offset_size);
        self.buf.extend_from_slice(&head);
        self.align();
        self.buf.extend_from_slice(&tail);

        let link = self.link;
        self.patch(link, start as u64)?;
        self.link = next_link;
        if !self.big && self.buf.len() as u64 > u32::MAX as u64 {
            return Err(IoError::codec(
                CodecErrorKind::ImageTypeNotSupported,
                "file exceeds 4 GiB; write TIFF64",
            ));
        }
        Ok(())
    }

    /// Finished file bytes.
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coders::tiff::tags::tag;

    fn build(endian: Endian, big: bool) -> Vec<u8> {
        let mut file = FileWriter::new(endian, big);
        let strip = file.append(&[1, 2, 3]);
        let mut dir = file.directory();
        dir.long(tag::IMAGE_WIDTH, &[3]);
        dir.short(tag::BITS_PER_SAMPLE, &[8, 8, 8]);
        dir.offsets(tag::STRIP_OFFSETS, &[strip]).unwrap();
        dir.rational(tag::X_RESOLUTION, &[72.5]);
        dir.ascii(tag::ARTIST, "someone");
        file.write_directory(dir).unwrap();
        let mut second = file.directory();
        second.short(tag::IMAGE_LENGTH, &[9]);
        file.write_directory(second).unwrap();
        file.finish()
    }

    #[test]
    fn test_header_and_chain() {
        for (endian, big) in [(Endian::Lsb, false), (Endian::Msb, false), (Endian::Lsb, true), (Endian::Msb, true)] {
            let data = build(endian, big);
            let mut blob = Blob::from_memory(data);
            let header = read_header(&mut blob).unwrap();
            assert_eq!(header.endian, endian);
            assert_eq!(header.big, big);

            let first = read_directory(&mut blob, &header, header.first).unwrap();
            assert_eq!(first.uint(tag::IMAGE_WIDTH), Some(3));
            assert_eq!(first.uints(tag::BITS_PER_SAMPLE).unwrap().as_slice(), &[8, 8, 8]);
            assert_eq!(first.float(tag::X_RESOLUTION), Some(72.5));
            assert_eq!(first.ascii(tag::ARTIST).as_deref(), Some("someone"));
            let strip = first.uint(tag::STRIP_OFFSETS).unwrap();
            blob.seek_to(SeekFrom::Start(strip)).unwrap();
            assert_eq!(blob.read_up_to(3).unwrap(), vec![1, 2, 3]);

            assert_ne!(first.next, 0);
            let second = read_directory(&mut blob, &header, first.next).unwrap();
            assert_eq!(second.uint(tag::IMAGE_LENGTH), Some(9));
            assert_eq!(second.next, 0);
        }
    }

    #[test]
    fn test_bad_signature() {
        let mut blob = Blob::from_memory(b"IX*\0\x08\0\0\0".to_vec());
        assert!(read_header(&mut blob).is_err());
        let mut blob = Blob::from_memory(b"II\x2c\0\x08\0\0\0".to_vec());
        assert!(read_header(&mut blob).is_err());
    }

    #[test]
    fn test_value_outside_file() {
        // One ASCII entry whose 16 bytes live at offset 1000.
        let mut data = b"II*\0\x08\0\0\0".to_vec();
        data.extend_from_slice(&[1, 0]);
        data.extend_from_slice(&[0x3B, 0x01, 2, 0, 16, 0, 0, 0, 0xE8, 0x03, 0, 0]);
        data.extend_from_slice(&[0, 0, 0, 0]);
        let mut blob = Blob::from_memory(data);
        let header = read_header(&mut blob).unwrap();
        let err = read_directory(&mut blob, &header, header.first).unwrap_err();
        assert_eq!(err.codec_kind(), Some(CodecErrorKind::ImproperImageHeader));
    }

    #[test]
    fn test_rational_approximation() {
        assert_eq!(to_rational(300.0), (300, 1));
        assert_eq!(to_rational(0.3127), (3127, 10_000));
        assert_eq!(to_rational(-1.0), (0, 1));
    }

    #[test]
    fn test_classic_offset_overflow() {
        let mut dir = DirectoryBuilder::new(Endian::Lsb, false);
        assert!(dir.offsets(tag::STRIP_OFFSETS, &[u32::MAX as u64 + 1]).is_err());
        let mut big = DirectoryBuilder::new(Endian::Lsb, true);
        assert!(big.offsets(tag::STRIP_OFFSETS, &[u32::MAX as u64 + 1]).is_ok());
    }
}
