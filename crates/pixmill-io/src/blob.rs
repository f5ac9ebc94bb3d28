//! Uniform byte streams over files, memory and standard streams.
//!
//! A [`Blob`] is scoped to one decode or encode call. Whatever its
//! backing, it offers the same surface:
//!
//! - raw reads and writes via [`std::io::Read`] / [`std::io::Write`]
//! - endian-aware integer readers and writers (`read_u32_le`, `write_u16_be`, ...)
//! - `tell`, `seek`, `eof`, `size`
//! - bounded line reads with [`Blob::read_string`]
//! - idempotent [`Blob::close`], also run on drop
//!
//! # Backings
//!
//! | Backing | Created by | Seekable |
//! |---------|------------|----------|
//! | File | [`Blob::open`] | yes |
//! | Memory | [`Blob::from_memory`], [`Blob::memory_writer`] | yes |
//! | Stdin / Stdout | [`Blob::open`] with `"-"` | no |
//!
//! Non-seekable input can be spooled into a temporary file with
//! [`Blob::promote_to_seekable`]; the spool is deleted when the blob closes.
//!
//! # Example
//!
//! ```rust
//! use pixmill_io::blob::Blob;
//!
//! let mut blob = Blob::from_memory(vec![0x49, 0x49, 0x2A, 0x00, 8, 0, 0, 0]);
//! assert_eq!(blob.read_u16_le().unwrap(), 0x4949);
//! assert_eq!(blob.read_u16_le().unwrap(), 42);
//! assert_eq!(blob.read_u32_le().unwrap(), 8);
//! assert!(blob.read_u8().is_err());
//! assert!(blob.eof());
//! ```

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use tempfile::TempPath;
use tracing::trace;

use crate::error::{IoError, IoErrorKind, IoResult};
use crate::resource;

/// Longest line [`Blob::read_string`] returns.
pub const MAX_TEXT_EXTENT: usize = 4096;

/// How a blob was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobMode {
    /// Text read.
    Read,
    /// Binary read.
    ReadBinary,
    /// Text write.
    Write,
    /// Binary write.
    WriteBinary,
    /// Binary write appending to an existing file.
    AppendBinary,
}

impl BlobMode {
    /// Returns `true` for the read modes.
    pub fn is_read(&self) -> bool {
        matches!(self, Self::Read | Self::ReadBinary)
    }
}

enum Backing {
    Closed,
    FileRead(BufReader<File>),
    FileWrite(BufWriter<File>),
    Memory { data: Vec<u8>, pos: usize },
    Stdin(io::Stdin),
    Stdout(io::Stdout),
}

/// Byte stream handle.
pub struct Blob {
    backing: Backing,
    filename: String,
    mode: BlobMode,
    eof: bool,
    closed: bool,
    position: u64,
    spool: Option<TempPath>,
}

impl std::fmt::Debug for Blob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backing = match &self.backing {
            Backing::Closed => "closed",
            Backing::FileRead(_) => "file-read",
            Backing::FileWrite(_) => "file-write",
            Backing::Memory { .. } => "memory",
            Backing::Stdin(_) => "stdin",
            Backing::Stdout(_) => "stdout",
        };
        f.debug_struct("Blob")
            .field("filename", &self.filename)
            .field("backing", &backing)
            .field("position", &self.position)
            .field("eof", &self.eof)
            .finish()
    }
}

impl Blob {
    fn with_backing(backing: Backing, filename: &str, mode: BlobMode) -> Self {
        Self {
            backing,
            filename: filename.to_string(),
            mode,
            eof: false,
            closed: false,
            position: 0,
            spool: None,
        }
    }

    /// Opens a file, or the standard stream for `"-"`.
    pub fn open(filename: &str, mode: BlobMode) -> IoResult<Self> {
        trace!(filename, ?mode, "open blob");
        if filename == "-" {
            let backing = if mode.is_read() {
                Backing::Stdin(io::stdin())
            } else {
                Backing::Stdout(io::stdout())
            };
            return Ok(Self::with_backing(backing, filename, mode));
        }
        let backing = if mode.is_read() {
            let file = File::open(filename)
                .map_err(|e| IoError::io_source(IoErrorKind::OpenFailed, filename, e))?;
            Backing::FileRead(BufReader::new(file))
        } else {
            let file = if mode == BlobMode::AppendBinary {
                OpenOptions::new().create(true).append(true).open(filename)
            } else {
                File::create(filename)
            }
            .map_err(|e| IoError::io_source(IoErrorKind::OpenFailed, filename, e))?;
            Backing::FileWrite(BufWriter::new(file))
        };
        Ok(Self::with_backing(backing, filename, mode))
    }

    /// Opens a file by path.
    pub fn open_path(path: &Path, mode: BlobMode) -> IoResult<Self> {
        Self::open(&path.to_string_lossy(), mode)
    }

    /// Wraps bytes for reading.
    pub fn from_memory(data: Vec<u8>) -> Self {
        Self::with_backing(Backing::Memory { data, pos: 0 }, "", BlobMode::ReadBinary)
    }

    /// Creates an empty in-memory sink.
    pub fn memory_writer() -> Self {
        Self::with_backing(
            Backing::Memory {
                data: Vec::new(),
                pos: 0,
            },
            "",
            BlobMode::WriteBinary,
        )
    }

    /// Creates a handle with no backing, for coders that work on filenames.
    pub fn detached(filename: &str, mode: BlobMode) -> Self {
        let mut blob = Self::with_backing(Backing::Closed, filename, mode);
        blob.closed = true;
        blob
    }

    /// Sets the informational filename.
    pub fn set_filename(&mut self, filename: &str) {
        self.filename = filename.to_string();
    }

    /// Filename this blob was opened with.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Open mode.
    pub fn mode(&self) -> BlobMode {
        self.mode
    }

    /// Returns `true` for memory backings.
    pub fn is_memory(&self) -> bool {
        matches!(self.backing, Backing::Memory { .. })
    }

    /// Returns `true` if [`Blob::seek`] is supported.
    pub fn is_seekable(&self) -> bool {
        matches!(
            self.backing,
            Backing::FileRead(_) | Backing::FileWrite(_) | Backing::Memory { .. }
        )
    }

    /// Returns `true` once closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Returns the bytes of a memory backing.
    pub fn memory(&self) -> Option<&[u8]> {
        match &self.backing {
            Backing::Memory { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Consumes the blob, returning the bytes of a memory backing.
    pub fn into_memory(mut self) -> Option<Vec<u8>> {
        match std::mem::replace(&mut self.backing, Backing::Closed) {
            Backing::Memory { data, .. } => Some(data),
            _ => None,
        }
    }

    fn closed_error(&self) -> IoError {
        IoError::io(IoErrorKind::Closed, self.filename.clone())
    }

    /// Spools a non-seekable input into a temporary file and reopens it.
    pub fn promote_to_seekable(&mut self) -> IoResult<()> {
        if self.is_seekable() {
            return Ok(());
        }
        if !self.mode.is_read() {
            return Err(IoError::io(IoErrorKind::Seek, self.filename.clone()));
        }
        let mut spool = resource::unique_file()?;
        let mut buffer = Vec::new();
        self.read_to_end(&mut buffer)?;
        spool
            .write_all(&buffer)
            .map_err(|e| IoError::io_source(IoErrorKind::Write, "spool", e))?;
        let path = spool.into_temp_path();
        let file = File::open(&path)
            .map_err(|e| IoError::io_source(IoErrorKind::OpenFailed, "spool", e))?;
        trace!(filename = %self.filename, spool = %path.display(), "promoted blob to seekable");
        self.backing = Backing::FileRead(BufReader::new(file));
        self.spool = Some(path);
        self.position = 0;
        self.eof = false;
        Ok(())
    }

    /// Flushes and releases the backing. Safe to call repeatedly.
    pub fn close(&mut self) -> IoResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let result = match &mut self.backing {
            Backing::FileWrite(w) => w.flush(),
            Backing::Stdout(s) => s.flush(),
            _ => Ok(()),
        };
        if !matches!(self.backing, Backing::Memory { .. }) {
            self.backing = Backing::Closed;
        }
        if let Some(spool) = self.spool.take() {
            spool
                .close()
                .map_err(|e| IoError::io_source(IoErrorKind::Write, "spool", e))?;
        }
        result.map_err(|e| IoError::io_source(IoErrorKind::Write, self.filename.clone(), e))
    }

    /// Current byte offset.
    pub fn tell(&self) -> u64 {
        self.position
    }

    /// Returns `true` after a read came up short.
    pub fn eof(&self) -> bool {
        self.eof
    }

    /// Total size of the stream, `0` for standard streams.
    pub fn size(&mut self) -> IoResult<u64> {
        match &mut self.backing {
            Backing::FileRead(r) => Ok(r.get_ref().metadata()?.len()),
            Backing::FileWrite(w) => {
                w.flush()?;
                Ok(w.get_ref().metadata()?.len())
            }
            Backing::Memory { data, .. } => Ok(data.len() as u64),
            _ => Ok(0),
        }
    }

    /// Seeks; fails on standard streams.
    pub fn seek_to(&mut self, pos: SeekFrom) -> IoResult<u64> {
        Seek::seek(self, pos).map_err(|e| IoError::io_source(IoErrorKind::Seek, self.filename.clone(), e))
    }

    /// Skips `count` bytes forward, reading when the stream cannot seek.
    /// Returns the number of bytes skipped.
    pub fn skip(&mut self, count: u64) -> IoResult<u64> {
        if self.is_seekable() {
            let size = self.size()?;
            let target = (self.position + count).min(size.max(self.position));
            let short = self.position + count > size && self.mode.is_read();
            let skipped = target - self.position;
            self.seek_to(SeekFrom::Start(target))?;
            if short {
                self.eof = true;
            }
            return Ok(skipped);
        }
        let mut sink = io::sink();
        let copied = io::copy(&mut Read::by_ref(self).take(count), &mut sink)?;
        if copied < count {
            self.eof = true;
        }
        Ok(copied)
    }

    /// Reads up to `buf.len()` bytes, returning how many were read. A short
    /// count sets the EOF flag.
    pub fn read_into(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        let mut total = 0;
        while total < buf.len() {
            match Read::read(self, &mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.map_read(e)),
            }
        }
        if total < buf.len() {
            self.eof = true;
        }
        Ok(total)
    }

    /// Reads up to `count` bytes.
    pub fn read_up_to(&mut self, count: usize) -> IoResult<Vec<u8>> {
        let mut buf = vec![0u8; count];
        let n = self.read_into(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Reads everything left in the stream.
    pub fn read_remaining(&mut self) -> IoResult<Vec<u8>> {
        let mut data = Vec::new();
        Read::read_to_end(self, &mut data).map_err(|e| self.map_read(e))?;
        self.eof = true;
        Ok(data)
    }

    /// Fills `buf` completely or fails with `UnexpectedEof`.
    pub fn read_exact_into(&mut self, buf: &mut [u8]) -> IoResult<()> {
        let n = self.read_into(buf)?;
        if n < buf.len() {
            return Err(IoError::unexpected_eof(self.filename.clone()));
        }
        Ok(())
    }

    /// Reads one byte; `None` at end of stream.
    pub fn read_byte(&mut self) -> IoResult<Option<u8>> {
        let mut b = [0u8; 1];
        Ok((self.read_into(&mut b)? == 1).then_some(b[0]))
    }

    /// Reads up through a newline, returning the line without it. Lines are
    /// cut at [`MAX_TEXT_EXTENT`] bytes. `None` at end of stream.
    pub fn read_string(&mut self) -> IoResult<Option<String>> {
        let mut line = Vec::new();
        let mut any = false;
        while let Some(c) = self.read_byte()? {
            any = true;
            if c == b'\n' {
                break;
            }
            if line.len() < MAX_TEXT_EXTENT {
                line.push(c);
            }
        }
        if !any {
            return Ok(None);
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }

    fn map_read(&self, e: io::Error) -> IoError {
        if self.closed {
            return self.closed_error();
        }
        if e.kind() == io::ErrorKind::UnexpectedEof {
            IoError::unexpected_eof(self.filename.clone())
        } else {
            IoError::io_source(IoErrorKind::Read, self.filename.clone(), e)
        }
    }

    fn map_write(&self, e: io::Error) -> IoError {
        if self.closed {
            return self.closed_error();
        }
        IoError::io_source(IoErrorKind::Write, self.filename.clone(), e)
    }

    /// Reads an unsigned byte.
    pub fn read_u8(&mut self) -> IoResult<u8> {
        ReadBytesExt::read_u8(self).map_err(|e| self.map_read(e))
    }

    /// Reads a big-endian `u16`.
    pub fn read_u16_be(&mut self) -> IoResult<u16> {
        self.read_u16::<BigEndian>().map_err(|e| self.map_read(e))
    }

    /// Reads a little-endian `u16`.
    pub fn read_u16_le(&mut self) -> IoResult<u16> {
        self.read_u16::<LittleEndian>().map_err(|e| self.map_read(e))
    }

    /// Reads a big-endian `u32`.
    pub fn read_u32_be(&mut self) -> IoResult<u32> {
        self.read_u32::<BigEndian>().map_err(|e| self.map_read(e))
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32_le(&mut self) -> IoResult<u32> {
        self.read_u32::<LittleEndian>().map_err(|e| self.map_read(e))
    }

    /// Reads a big-endian `u64`.
    pub fn read_u64_be(&mut self) -> IoResult<u64> {
        self.read_u64::<BigEndian>().map_err(|e| self.map_read(e))
    }

    /// Reads a little-endian `u64`.
    pub fn read_u64_le(&mut self) -> IoResult<u64> {
        self.read_u64::<LittleEndian>().map_err(|e| self.map_read(e))
    }

    /// Writes raw bytes.
    pub fn write_bytes(&mut self, data: &[u8]) -> IoResult<()> {
        self.write_all(data).map_err(|e| self.map_write(e))
    }

    /// Writes a string verbatim.
    pub fn write_str(&mut self, text: &str) -> IoResult<()> {
        self.write_bytes(text.as_bytes())
    }

    /// Writes one byte.
    pub fn write_u8(&mut self, value: u8) -> IoResult<()> {
        WriteBytesExt::write_u8(self, value).map_err(|e| self.map_write(e))
    }

    /// Writes a big-endian `u16`.
    pub fn write_u16_be(&mut self, value: u16) -> IoResult<()> {
        self.write_u16::<BigEndian>(value).map_err(|e| self.map_write(e))
    }

    /// Writes a little-endian `u16`.
    pub fn write_u16_le(&mut self, value: u16) -> IoResult<()> {
        self.write_u16::<LittleEndian>(value).map_err(|e| self.map_write(e))
    }

    /// Writes a big-endian `u32`.
    pub fn write_u32_be(&mut self, value: u32) -> IoResult<()> {
        self.write_u32::<BigEndian>(value).map_err(|e| self.map_write(e))
    }

    /// Writes a little-endian `u32`.
    pub fn write_u32_le(&mut self, value: u32) -> IoResult<()> {
        self.write_u32::<LittleEndian>(value).map_err(|e| self.map_write(e))
    }

    /// Writes a big-endian `u64`.
    pub fn write_u64_be(&mut self, value: u64) -> IoResult<()> {
        self.write_u64::<BigEndian>(value).map_err(|e| self.map_write(e))
    }

    /// Writes a little-endian `u64`.
    pub fn write_u64_le(&mut self, value: u64) -> IoResult<()> {
        self.write_u64::<LittleEndian>(value).map_err(|e| self.map_write(e))
    }
}

impl Read for Blob {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::other("blob is closed"));
        }
        let n = match &mut self.backing {
            Backing::FileRead(r) => r.read(buf)?,
            Backing::Memory { data, pos } => {
                let available = data.len().saturating_sub(*pos);
                let n = available.min(buf.len());
                buf[..n].copy_from_slice(&data[*pos..*pos + n]);
                *pos += n;
                n
            }
            Backing::Stdin(s) => s.read(buf)?,
            _ => return Err(io::Error::other("blob is not readable")),
        };
        if n == 0 && !buf.is_empty() {
            self.eof = true;
        }
        self.position += n as u64;
        Ok(n)
    }
}

impl Write for Blob {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::other("blob is closed"));
        }
        let n = match &mut self.backing {
            Backing::FileWrite(w) => w.write(buf)?,
            Backing::Memory { data, pos } => {
                let end = *pos + buf.len();
                if data.len() < end {
                    data.resize(end, 0);
                }
                data[*pos..end].copy_from_slice(buf);
                *pos = end;
                buf.len()
            }
            Backing::Stdout(s) => s.write(buf)?,
            _ => return Err(io::Error::other("blob is not writable")),
        };
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.backing {
            Backing::FileWrite(w) => w.flush(),
            Backing::Stdout(s) => s.flush(),
            _ => Ok(()),
        }
    }
}

impl Seek for Blob {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new = match &mut self.backing {
            Backing::FileRead(r) => r.seek(pos)?,
            Backing::FileWrite(w) => w.seek(pos)?,
            Backing::Memory { data, pos: cursor } => {
                let target = match pos {
                    SeekFrom::Start(p) => p as i64,
                    SeekFrom::Current(d) => *cursor as i64 + d,
                    SeekFrom::End(d) => data.len() as i64 + d,
                };
                if target < 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "seek before start",
                    ));
                }
                *cursor = target as usize;
                target as u64
            }
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "stream is not seekable",
                ));
            }
        };
        self.position = new;
        self.eof = false;
        Ok(new)
    }
}

impl Drop for Blob {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Replaces the extension of `filename` with `suffix`: `img.rgb` + `R`
/// gives `img.R`. Names without an extension gain one.
pub fn partition_filename(filename: &str, suffix: &str) -> String {
    let path = Path::new(filename);
    path.with_extension(suffix).to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_round_trip() {
        let mut blob = Blob::memory_writer();
        blob.write_u16_be(0x0102).unwrap();
        blob.write_u32_le(0x0A0B0C0D).unwrap();
        blob.write_u64_be(7).unwrap();
        assert_eq!(blob.tell(), 14);
        let data = blob.into_memory().unwrap();
        let mut blob = Blob::from_memory(data);
        assert_eq!(blob.read_u16_be().unwrap(), 0x0102);
        assert_eq!(blob.read_u32_le().unwrap(), 0x0A0B0C0D);
        assert_eq!(blob.read_u64_be().unwrap(), 7);
        assert!(!blob.eof());
        assert!(blob.read_byte().unwrap().is_none());
        assert!(blob.eof());
    }

    #[test]
    fn test_read_string_bounded() {
        let mut text = vec![b'a'; MAX_TEXT_EXTENT + 10];
        text.extend_from_slice(b"\r\nnext\n");
        let mut blob = Blob::from_memory(text);
        assert_eq!(blob.read_string().unwrap().unwrap().len(), MAX_TEXT_EXTENT);
        assert_eq!(blob.read_string().unwrap().as_deref(), Some("next"));
        assert_eq!(blob.read_string().unwrap(), None);
    }

    #[test]
    fn test_seek_and_overwrite() {
        let mut blob = Blob::memory_writer();
        blob.write_bytes(b"hello world").unwrap();
        blob.seek_to(SeekFrom::Start(0)).unwrap();
        blob.write_bytes(b"J").unwrap();
        assert_eq!(blob.memory().unwrap(), b"Jello world");
        assert_eq!(blob.size().unwrap(), 11);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut blob = Blob::from_memory(vec![1, 2, 3]);
        blob.close().unwrap();
        blob.close().unwrap();
        assert!(blob.is_closed());
        let err = blob.read_u8().unwrap_err();
        assert_eq!(err.io_kind(), Some(IoErrorKind::Closed));
    }

    #[test]
    fn test_skip_past_end_sets_eof() {
        let mut blob = Blob::from_memory(vec![0; 4]);
        assert_eq!(blob.skip(2).unwrap(), 2);
        assert_eq!(blob.tell(), 2);
        assert_eq!(blob.skip(10).unwrap(), 2);
        assert!(blob.eof());
    }

    #[test]
    fn test_file_blob() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.bin");
        let name = path.to_string_lossy().into_owned();
        let mut out = Blob::open(&name, BlobMode::WriteBinary).unwrap();
        out.write_bytes(&[9, 8, 7]).unwrap();
        out.close().unwrap();
        let mut input = Blob::open(&name, BlobMode::ReadBinary).unwrap();
        assert_eq!(input.size().unwrap(), 3);
        assert_eq!(input.read_up_to(10).unwrap(), vec![9, 8, 7]);
        assert!(input.eof());
    }

    #[test]
    fn test_open_missing_file() {
        let err = Blob::open("/nonexistent/dir/file.pgm", BlobMode::ReadBinary).unwrap_err();
        assert_eq!(err.io_kind(), Some(IoErrorKind::OpenFailed));
    }

    #[test]
    fn test_partition_filename() {
        assert_eq!(partition_filename("img.rgb", "R"), "img.R");
        assert_eq!(partition_filename("dir/img", "Cb"), "dir/img.Cb");
    }
}
