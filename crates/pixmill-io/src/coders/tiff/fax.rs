//! CCITT bilevel coding: Modified Huffman (compression 2), Group 3 with
//! optional 2-D lines (compression 3) and Group 4 (compression 4).
//!
//! Rows are packed one bit per pixel, MSB first, each row starting on a
//! byte boundary. A set bit is a black run pixel.

use std::collections::HashMap;

use crate::error::{CodecErrorKind, IoError, IoResult};

use super::tags::GROUP3OPT_2DENCODING;

// === Code tables ===

const WHITE_TERMINATING: [&str; 64] = [
    "00110101", "000111", "0111", "1000", "1011", "1100", "1110", "1111", "10011", "10100", "00111", "01000",
    "001000", "000011", "110100", "110101", "101010", "101011", "0100111", "0001100", "0001000", "0010111",
    "0000011", "0000100", "0101000", "0101011", "0010011", "0100100", "0011000", "00000010", "00000011",
    "00011010", "00011011", "00010010", "00010011", "00010100", "00010101", "00010110", "00010111",
    "00101000", "00101001", "00101010", "00101011", "00101100", "00101101", "00000100", "00000101",
    "00001010", "00001011", "01010010", "01010011", "01010100", "01010101", "00100100", "00100101",
    "01011000", "01011001", "01011010", "01011011", "01001010", "01001011", "00110010", "00110011",
    "00110100",
];

const WHITE_MAKEUP: [&str; 27] = [
    "11011", "10010", "010111", "0110111", "00110110", "00110111", "01100100", "01100101", "01101000",
    "01100111", "011001100", "011001101", "011010010", "011010011", "011010100", "011010101", "011010110",
    "011010111", "011011000", "011011001", "011011010", "011011011", "010011000", "010011001", "010011010",
    "011000", "010011011",
];

const BLACK_TERMINATING: [&str; 64] = [
    "0000110111", "010", "11", "10", "011", "0011", "0010", "00011", "000101", "000100", "0000100",
    "0000101", "0000111", "00000100", "00000111", "000011000", "0000010111", "0000011000", "0000001000",
    "00001100111", "00001101000", "00001101100", "00000110111", "00000101000", "00000010111",
    "00000011000", "000011001010", "000011001011", "000011001100", "000011001101", "000001101000",
    "000001101001", "000001101010", "000001101011", "000011010010", "000011010011", "000011010100",
    "000011010101", "000011010110", "000011010111", "000001101100", "000001101101", "000011011010",
    "000011011011", "000001010100", "000001010101", "000001010110", "000001010111", "000001100100",
    "000001100101", "000001010010", "000001010011", "000000100100", "000000110111", "000000111000",
    "000000100111", "000000101000", "000001011000", "000001011001", "000000101011", "000000101100",
    "000001011010", "000001100110", "000001100111",
];

const BLACK_MAKEUP: [&str; 27] = [
    "0000001111", "000011001000", "000011001001", "000001011011", "000000110011", "000000110100",
    "000000110101", "0000001101100", "0000001101101", "0000001001010", "0000001001011", "0000001001100",
    "0000001001101", "0000001110010", "0000001110011", "0000001110100", "0000001110101", "0000001110110",
    "0000001110111", "0000001010010", "0000001010011", "0000001010100", "0000001010101", "0000001011010",
    "0000001011011", "0000001100100", "0000001100101",
];

/// Makeup codes for 1792..=2560, shared by both colors.
const EXTENDED_MAKEUP: [&str; 13] = [
    "00000001000", "00000001100", "00000001101", "000000010010", "000000010011", "000000010100",
    "000000010101", "000000010110", "000000010111", "000000011100", "000000011101", "000000011110",
    "000000011111",
];

const EOL: (u32, u32) = (0b0000_0000_0001, 12);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Pass,
    Horizontal,
    Vertical(i32),
}

const MODES: [(&str, Mode); 9] = [
    ("1", Mode::Vertical(0)),
    ("011", Mode::Vertical(1)),
    ("010", Mode::Vertical(-1)),
    ("001", Mode::Horizontal),
    ("0001", Mode::Pass),
    ("000011", Mode::Vertical(2)),
    ("000010", Mode::Vertical(-2)),
    ("0000011", Mode::Vertical(3)),
    ("0000010", Mode::Vertical(-3)),
];

fn parse(bits: &str) -> (u32, u32) {
    let code = bits.bytes().fold(0u32, |acc, b| (acc << 1) | u32::from(b == b'1'));
    (code, bits.len() as u32)
}

/// Code lookup for one color: `(length, code) -> run`, and `run -> code`.
struct RunTable {
    decode: HashMap<(u32, u32), usize>,
    terminating: Vec<(u32, u32)>,
    makeup: Vec<(u32, u32)>,
}

impl RunTable {
    fn new(terminating: &[&str], makeup: &[&str]) -> Self {
        let mut decode = HashMap::new();
        let terminating: Vec<_> = terminating.iter().map(|bits| parse(bits)).collect();
        let makeup: Vec<_> = makeup.iter().chain(EXTENDED_MAKEUP.iter()).map(|bits| parse(bits)).collect();
        for (run, &(code, len)) in terminating.iter().enumerate() {
            decode.insert((len, code), run);
        }
        for (i, &(code, len)) in makeup.iter().enumerate() {
            decode.insert((len, code), (i + 1) * 64);
        }
        Self {
            decode,
            terminating,
            makeup,
        }
    }
}

lazy_static::lazy_static! {
    static ref WHITE: RunTable = RunTable::new(&WHITE_TERMINATING, &WHITE_MAKEUP);
    static ref BLACK: RunTable = RunTable::new(&BLACK_TERMINATING, &BLACK_MAKEUP);
    static ref MODE_CODES: HashMap<(u32, u32), Mode> = MODES
        .iter()
        .map(|(bits, mode)| {
            let (code, len) = parse(bits);
            ((len, code), *mode)
        })
        .collect();
}

fn table(black: bool) -> &'static RunTable {
    if black { &BLACK } else { &WHITE }
}

fn corrupt(detail: &str) -> IoError {
    IoError::codec(CodecErrorKind::CorruptImage, format!("fax: {detail}"))
}

// === Bit I/O ===

struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn bit(&mut self) -> Option<u32> {
        let byte = *self.data.get(self.pos / 8)?;
        let bit = (byte >> (7 - self.pos % 8)) & 1;
        self.pos += 1;
        Some(u32::from(bit))
    }

    fn peek(&self, count: usize) -> Option<u32> {
        let mut ahead = BitReader {
            data: self.data,
            pos: self.pos,
        };
        let mut value = 0;
        for _ in 0..count {
            value = (value << 1) | ahead.bit()?;
        }
        Some(value)
    }

    fn align(&mut self) {
        self.pos = self.pos.div_ceil(8) * 8;
    }

    fn exhausted(&self) -> bool {
        self.pos >= self.data.len() * 8
    }

    /// Consumes an EOL with any leading fill bits. Returns `false` when the
    /// next bits are not an EOL.
    fn eol(&mut self) -> bool {
        if self.peek(11) != Some(0) {
            return false;
        }
        while let Some(bit) = self.bit() {
            if bit == 1 {
                return true;
            }
        }
        false
    }

    fn lookup<T: Copy>(&mut self, codes: &HashMap<(u32, u32), T>, max_len: u32) -> IoResult<T> {
        let mut code = 0;
        for len in 1..=max_len {
            code = (code << 1) | self.bit().ok_or_else(|| corrupt("data ends inside a code"))?;
            if let Some(&value) = codes.get(&(len, code)) {
                return Ok(value);
            }
        }
        Err(corrupt("invalid code"))
    }

    fn run(&mut self, black: bool) -> IoResult<usize> {
        let mut total = 0;
        loop {
            let run = self.lookup(&table(black).decode, 13)?;
            total += run;
            if run < 64 {
                return Ok(total);
            }
        }
    }
}

#[derive(Default)]
struct BitWriter {
    out: Vec<u8>,
    acc: u32,
    bits: u32,
}

impl BitWriter {
    fn put(&mut self, (code, len): (u32, u32)) {
        for i in (0..len).rev() {
            self.acc = (self.acc << 1) | ((code >> i) & 1);
            self.bits += 1;
            if self.bits == 8 {
                self.out.push(self.acc as u8);
                self.acc = 0;
                self.bits = 0;
            }
        }
    }

    fn run(&mut self, black: bool, mut run: usize) {
        let codes = table(black);
        while run >= 2560 + 64 {
            self.put(codes.makeup[39]);
            run -= 2560;
        }
        if run >= 64 {
            self.put(codes.makeup[run / 64 - 1]);
            run %= 64;
        }
        self.put(codes.terminating[run]);
    }

    fn mode(&mut self, mode: Mode) {
        if let Some((bits, _)) = MODES.iter().find(|(_, m)| *m == mode) {
            self.put(parse(bits));
        }
    }

    /// Pads with zeros so that a following EOL ends on a byte boundary.
    fn fill_for_eol(&mut self) {
        while self.bits != 4 {
            self.put((0, 1));
        }
    }

    fn finish(mut self) -> Vec<u8> {
        if self.bits > 0 {
            self.out.push((self.acc << (8 - self.bits)) as u8);
        }
        self.out
    }
}

// === Lines ===

/// Positions where the color changes, starting from white.
fn changes(row: &[u8], width: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut black = false;
    for x in 0..width {
        let pixel = (row[x / 8] >> (7 - x % 8)) & 1 == 1;
        if pixel != black {
            out.push(x);
            black = pixel;
        }
    }
    out
}

fn render(changes: &[usize], width: usize, row: &mut [u8]) {
    row.fill(0);
    for span in changes.chunks(2) {
        let start = span[0].min(width);
        let end = span.get(1).copied().unwrap_or(width).min(width);
        for x in start..end {
            row[x / 8] |= 0x80 >> (x % 8);
        }
    }
}

/// `b1` and `b2` for a coding position `a0` of the given color. `reference`
/// ends with two `width` sentinels.
fn find_b(reference: &[usize], a0: isize, black: bool) -> (usize, usize) {
    let mut i = usize::from(black);
    while i < reference.len() - 2 && reference[i] as isize <= a0 {
        i += 2;
    }
    let b1 = reference[i.min(reference.len() - 2)];
    let b2 = reference[(i + 1).min(reference.len() - 1)];
    (b1, b2)
}

fn with_sentinels(changes: &[usize], width: usize) -> Vec<usize> {
    let mut reference = changes.to_vec();
    reference.extend([width, width]);
    reference
}

fn decode_1d_line(reader: &mut BitReader<'_>, width: usize) -> IoResult<Vec<usize>> {
    let mut line = Vec::new();
    let mut x = 0;
    let mut black = false;
    while x < width {
        x += reader.run(black)?;
        line.push(x.min(width));
        black = !black;
    }
    if line.last() == Some(&width) {
        line.pop();
    }
    Ok(line)
}

fn decode_2d_line(reader: &mut BitReader<'_>, reference: &[usize], width: usize) -> IoResult<Vec<usize>> {
    let mut line = Vec::new();
    let mut a0: isize = -1;
    let mut black = false;
    while a0 < width as isize {
        let (b1, b2) = find_b(reference, a0, black);
        match reader.lookup(&MODE_CODES, 7)? {
            Mode::Pass => a0 = b2 as isize,
            Mode::Horizontal => {
                let start = a0.max(0) as usize;
                let a1 = (start + reader.run(black)?).min(width);
                let a2 = (a1 + reader.run(!black)?).min(width);
                line.push(a1);
                line.push(a2);
                a0 = a2 as isize;
            }
            Mode::Vertical(delta) => {
                let a1 = (b1 as isize + delta as isize).clamp(0, width as isize);
                if a1 < a0 {
                    return Err(corrupt("vertical mode moves backwards"));
                }
                line.push(a1 as usize);
                a0 = a1;
                black = !black;
            }
        }
    }
    while line.last() == Some(&width) {
        line.pop();
    }
    Ok(line)
}

// === Decoding ===

/// Decodes Modified Huffman rows, each starting on a byte boundary.
pub fn decode_mh(data: &[u8], width: usize, rows: usize) -> IoResult<Vec<u8>> {
    let stride = width.div_ceil(8);
    let mut out = vec![0u8; stride * rows];
    let mut reader = BitReader::new(data);
    for row in out.chunks_mut(stride) {
        if reader.exhausted() {
            break;
        }
        let line = decode_1d_line(&mut reader, width)?;
        render(&line, width, row);
        reader.align();
    }
    Ok(out)
}

/// Decodes a Group 3 strip. Lines may be preceded by EOLs; with the 2-D
/// option each EOL is followed by a bit selecting 1-D (`1`) or 2-D coding.
pub fn decode_g3(data: &[u8], width: usize, rows: usize, options: u64) -> IoResult<Vec<u8>> {
    let stride = width.div_ceil(8);
    let two_d = options & GROUP3OPT_2DENCODING != 0;
    let mut out = vec![0u8; stride * rows];
    let mut reader = BitReader::new(data);
    let mut reference = with_sentinels(&[], width);
    for row in out.chunks_mut(stride) {
        let had_eol = reader.eol();
        if reader.exhausted() {
            break;
        }
        let one_d = if two_d && had_eol {
            reader.bit().ok_or_else(|| corrupt("data ends after EOL"))? == 1
        } else {
            true
        };
        let line = if one_d {
            decode_1d_line(&mut reader, width)?
        } else {
            decode_2d_line(&mut reader, &reference, width)?
        };
        render(&line, width, row);
        reference = with_sentinels(&line, width);
    }
    Ok(out)
}

/// Decodes a Group 4 strip.
pub fn decode_g4(data: &[u8], width: usize, rows: usize) -> IoResult<Vec<u8>> {
    let stride = width.div_ceil(8);
    let mut out = vec![0u8; stride * rows];
    let mut reader = BitReader::new(data);
    let mut reference = with_sentinels(&[], width);
    for row in out.chunks_mut(stride) {
        if reader.peek(12) == Some(EOL.0) || reader.exhausted() {
            break;
        }
        let line = decode_2d_line(&mut reader, &reference, width)?;
        render(&line, width, row);
        reference = with_sentinels(&line, width);
    }
    Ok(out)
}

// === Encoding ===

fn encode_1d_line(writer: &mut BitWriter, line: &[usize], width: usize) {
    let mut x = 0;
    let mut black = false;
    for &change in line.iter().chain(std::iter::once(&width)) {
        writer.run(black, change - x);
        x = change;
        black = !black;
    }
}

/// Encodes rows as 1-D Group 3 with byte-aligned EOLs before every line.
pub fn encode_g3(data: &[u8], width: usize, rows: usize) -> Vec<u8> {
    let stride = width.div_ceil(8);
    let mut writer = BitWriter::default();
    for row in data.chunks(stride).take(rows) {
        writer.fill_for_eol();
        writer.put(EOL);
        encode_1d_line(&mut writer, &changes(row, width), width);
    }
    writer.finish()
}

/// Encodes rows as Group 4, terminated by EOFB.
pub fn encode_g4(data: &[u8], width: usize, rows: usize) -> Vec<u8> {
    let stride = width.div_ceil(8);
    let mut writer = BitWriter::default();
    let mut reference = with_sentinels(&[], width);
    for row in data.chunks(stride).take(rows) {
        let line = changes(row, width);
        let coding = with_sentinels(&line, width);
        let mut a0: isize = -1;
        let mut black = false;
        while a0 < width as isize {
            let a1 = coding.iter().copied().find(|&c| c as isize > a0).unwrap_or(width);
            let (b1, b2) = find_b(&reference, a0, black);
            if b2 < a1 {
                writer.mode(Mode::Pass);
                a0 = b2 as isize;
            } else if (a1 as isize - b1 as isize).abs() <= 3 {
                writer.mode(Mode::Vertical(a1 as i32 - b1 as i32));
                a0 = a1 as isize;
                black = !black;
            } else {
                let a2 = coding.iter().copied().find(|&c| c > a1).unwrap_or(width);
                writer.mode(Mode::Horizontal);
                writer.run(black, a1 - a0.max(0) as usize);
                writer.run(!black, a2 - a1);
                a0 = a2 as isize;
            }
        }
        reference = coding;
    }
    writer.put(EOL);
    writer.put(EOL);
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rows() -> (Vec<u8>, usize, usize) {
        let width: usize = 37;
        let rows = 6;
        let stride = width.div_ceil(8);
        let mut data = vec![0u8; stride * rows];
        for y in 0..rows {
            for x in 0..width {
                let black = (x / (y + 2)) % 2 == 1 || (y == 3 && x > 30);
                if black {
                    data[y * stride + x / 8] |= 0x80 >> (x % 8);
                }
            }
        }
        (data, width, rows)
    }

    #[test]
    fn test_tables_are_prefix_free() {
        for table in [&*WHITE, &*BLACK] {
            assert_eq!(table.decode.len(), 64 + 40);
            let codes: Vec<_> = table.decode.keys().copied().collect();
            for &(la, ca) in &codes {
                for &(lb, cb) in &codes {
                    if la < lb {
                        assert_ne!(cb >> (lb - la), ca, "prefix clash");
                    }
                }
            }
        }
    }

    #[test]
    fn test_g4_round_trip() {
        let (data, width, rows) = sample_rows();
        let packed = encode_g4(&data, width, rows);
        assert_eq!(decode_g4(&packed, width, rows).unwrap(), data);
    }

    #[test]
    fn test_g3_round_trip() {
        let (data, width, rows) = sample_rows();
        let packed = encode_g3(&data, width, rows);
        assert_eq!(decode_g3(&packed, width, rows, 4).unwrap(), data);
    }

    #[test]
    fn test_long_runs() {
        let width: usize = 3000;
        let stride = width.div_ceil(8);
        let mut data = vec![0u8; stride * 2];
        data[stride..stride + 350].fill(0xFF);
        let packed = encode_g4(&data, width, 2);
        assert_eq!(decode_g4(&packed, width, 2).unwrap(), data);
        let packed = encode_g3(&data, width, 2);
        assert_eq!(decode_g3(&packed, width, 2, 0).unwrap(), data);
    }

    #[test]
    fn test_all_white_line_g4() {
        // V0 on an all-white reference reaches the sentinel in one code.
        let data = vec![0u8; 2];
        let packed = encode_g4(&data, 16, 1);
        assert_eq!(packed[0] >> 7, 1);
        assert_eq!(decode_g4(&packed, 16, 1).unwrap(), data);
    }

    #[test]
    fn test_mh_rows_are_byte_aligned() {
        // White 8 = 10011, black 0 terminator not needed at line end.
        let packed = [0b1001_1000];
        assert_eq!(decode_mh(&packed, 8, 1).unwrap(), vec![0]);
    }

    #[test]
    fn test_invalid_code() {
        assert!(decode_g4(&[0x00, 0x10, 0x00], 8, 1).is_ok());
        assert!(decode_g4(&[0b0000_0011, 0xFF], 8, 1).is_err());
    }
}
