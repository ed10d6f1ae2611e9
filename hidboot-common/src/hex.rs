// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Streaming Intel-HEX record reader.
//!
//! Records are pulled out of the input one character at a time, so the whole
//! file never has to be held in memory. Anything between records (line
//! endings, comments, garbage) is skipped up to the next `:` marker.
//!
//! Every fixed-width field goes through [`decode_field`]. The default
//! [`DigitMode::Lenient`] mode reads whatever occupies the field positions the
//! way `strtol(field, NULL, 16)` would, which is what existing HIDBoot hex
//! files have always been fed through. [`DigitMode::Strict`] rejects any
//! non-hex character instead.

use std::io::{self, Read};

use thiserror::Error;

/// Start-of-record marker.
pub const RECORD_MARKER: u8 = b':';

/// Record type carrying data bytes. Every other type is skipped.
pub const DATA_RECORD: u8 = 0x00;

/// End-of-file record type, only emitted by [`encode_records`].
pub const EOF_RECORD: u8 = 0x01;

/// Errors raised while reading hex records.
#[derive(Debug, Error)]
pub enum HexError {
    #[error("failed to read hex input: {0}")]
    Io(#[from] io::Error),

    #[error("invalid hex digit '{}' on line {line}", escaped(.found))]
    InvalidDigit { line: usize, found: u8 },

    #[error("hex record on line {line} ends before its checksum")]
    Truncated { line: usize },
}

fn escaped(byte: &u8) -> String {
    char::from(*byte).escape_default().to_string()
}

/// How fixed-width hex fields are turned into integers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DigitMode {
    /// `strtol`-style: leading whitespace, a sign and a `0x` prefix are
    /// accepted, parsing stops at the first non-hex character and an empty
    /// field reads as zero.
    #[default]
    Lenient,
    /// Every character must be a hex digit.
    Strict,
}

/// Decode one fixed-width hex field.
///
/// Returns the offending byte when `mode` is [`DigitMode::Strict`] and the
/// field contains a non-hex character. Lenient results keep their sign, so
/// `-1` reads as `-1`. The result is not range-checked; the caller truncates
/// it to the field width.
pub fn decode_field(digits: &[u8], mode: DigitMode) -> Result<i32, u8> {
    match mode {
        DigitMode::Lenient => Ok(decode_lenient(digits)),
        DigitMode::Strict => digits.iter().try_fold(0i32, |acc, &c| {
            let digit = char::from(c).to_digit(16).ok_or(c)?;
            Ok(acc.wrapping_shl(4) | digit as i32)
        }),
    }
}

fn decode_lenient(digits: &[u8]) -> i32 {
    let mut s = digits;
    while let [c, rest @ ..] = s {
        if !c.is_ascii_whitespace() {
            break;
        }
        s = rest;
    }

    let negative = match s {
        [b'-', rest @ ..] => {
            s = rest;
            true
        }
        [b'+', rest @ ..] => {
            s = rest;
            false
        }
        _ => false,
    };

    // "0x" only counts as a prefix when a hex digit follows it
    if let [b'0', b'x' | b'X', d, ..] = s {
        if d.is_ascii_hexdigit() {
            s = &s[2..];
        }
    }

    let mut value = 0i32;
    for &c in s {
        match char::from(c).to_digit(16) {
            Some(d) => value = value.wrapping_mul(16).wrapping_add(d as i32),
            None => break,
        }
    }

    if negative {
        value.wrapping_neg()
    } else {
        value
    }
}

/// One decoded `:LLAAAATT[DD...]CC` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexRecord {
    /// Count field as written. A negative lenient count is kept here as its
    /// low byte while `data` stays empty.
    pub byte_count: u8,
    pub address: u16,
    pub record_type: u8,
    pub data: Vec<u8>,
    pub checksum: u8,
}

impl HexRecord {
    /// Build a data record with a correct checksum.
    ///
    /// `data` is cut at 255 bytes, the most a record can carry.
    pub fn data(address: u16, data: &[u8]) -> Self {
        let data = data[..data.len().min(u8::MAX as usize)].to_vec();
        let byte_count = data.len() as u8;
        let checksum = checksum_for(byte_count, address, DATA_RECORD, &data);
        Self {
            byte_count,
            address,
            record_type: DATA_RECORD,
            data,
            checksum,
        }
    }

    /// The end-of-file record (`:00000001FF`).
    pub fn end_of_file() -> Self {
        Self {
            byte_count: 0,
            address: 0,
            record_type: EOF_RECORD,
            data: Vec::new(),
            checksum: checksum_for(0, 0, EOF_RECORD, &[]),
        }
    }

    pub fn is_data(&self) -> bool {
        self.record_type == DATA_RECORD
    }

    /// Sum of every field including the checksum byte, modulo 256.
    pub fn sum(&self) -> u8 {
        let [hi, lo] = self.address.to_be_bytes();
        self.data
            .iter()
            .fold(self.byte_count, |acc, &b| acc.wrapping_add(b))
            .wrapping_add(hi)
            .wrapping_add(lo)
            .wrapping_add(self.record_type)
            .wrapping_add(self.checksum)
    }

    pub fn checksum_valid(&self) -> bool {
        self.sum() == 0
    }

    /// Render the record as one line of hex text, without a line ending.
    pub fn to_line(&self) -> String {
        let mut line = format!(
            ":{:02X}{:04X}{:02X}",
            self.byte_count, self.address, self.record_type
        );
        for b in &self.data {
            line.push_str(&format!("{:02X}", b));
        }
        line.push_str(&format!("{:02X}", self.checksum));
        line
    }
}

/// Checksum byte that makes the record sum to zero.
pub fn checksum_for(byte_count: u8, address: u16, record_type: u8, data: &[u8]) -> u8 {
    let [hi, lo] = address.to_be_bytes();
    data.iter()
        .fold(byte_count, |acc, &b| acc.wrapping_add(b))
        .wrapping_add(hi)
        .wrapping_add(lo)
        .wrapping_add(record_type)
        .wrapping_neg()
}

/// Encode `data` starting at `base` as data records of at most
/// `per_record` bytes, followed by an end-of-file record.
///
/// Addresses wrap at 64 KiB.
pub fn encode_records(base: u16, data: &[u8], per_record: usize) -> String {
    let per_record = per_record.clamp(1, u8::MAX as usize);
    let mut out = String::new();
    for (i, chunk) in data.chunks(per_record).enumerate() {
        let address = base.wrapping_add((i * per_record) as u16);
        out.push_str(&HexRecord::data(address, chunk).to_line());
        out.push('\n');
    }
    out.push_str(&HexRecord::end_of_file().to_line());
    out.push('\n');
    out
}

/// Lazy iterator over the records of a hex stream.
///
/// The reader pulls single bytes from `R`; wrap files in a
/// [`std::io::BufReader`]. After the first error the iterator is exhausted.
pub struct HexRecordReader<R> {
    bytes: io::Bytes<R>,
    mode: DigitMode,
    line: usize,
    done: bool,
}

impl<R: Read> HexRecordReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            bytes: reader.bytes(),
            mode: DigitMode::default(),
            line: 1,
            done: false,
        }
    }

    /// Select how hex fields are decoded.
    pub fn with_mode(mut self, mode: DigitMode) -> Self {
        self.mode = mode;
        self
    }

    /// Current 1-based line number.
    pub fn line(&self) -> usize {
        self.line
    }

    fn next_byte(&mut self) -> Result<Option<u8>, HexError> {
        match self.bytes.next().transpose()? {
            Some(b) => {
                if b == b'\n' {
                    self.line += 1;
                }
                Ok(Some(b))
            }
            None => Ok(None),
        }
    }

    /// Skip to just past the next marker. `false` means end of input.
    fn seek_marker(&mut self) -> Result<bool, HexError> {
        while let Some(b) = self.next_byte()? {
            if b == RECORD_MARKER {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn field(&mut self, width: usize) -> Result<i32, HexError> {
        let line = self.line;
        let mut digits = [0u8; 4];
        for slot in digits.iter_mut().take(width) {
            *slot = self.next_byte()?.ok_or(HexError::Truncated { line })?;
        }
        decode_field(&digits[..width], self.mode)
            .map_err(|found| HexError::InvalidDigit { line, found })
    }

    fn read_record(&mut self) -> Result<HexRecord, HexError> {
        let count = self.field(2)?;
        let address = self.field(4)? as u16;
        let record_type = self.field(2)? as u8;

        // a negative count reads no data fields
        let len = usize::try_from(count).unwrap_or(0);
        let mut data = Vec::with_capacity(len);
        for _ in 0..len {
            data.push(self.field(2)? as u8);
        }
        let checksum = self.field(2)? as u8;

        Ok(HexRecord {
            byte_count: count as u8,
            address,
            record_type,
            data,
            checksum,
        })
    }
}

impl<R: Read> Iterator for HexRecordReader<R> {
    type Item = Result<HexRecord, HexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let result = match self.seek_marker() {
            Ok(true) => self.read_record(),
            Ok(false) => {
                self.done = true;
                return None;
            }
            Err(e) => Err(e),
        };

        if result.is_err() {
            self.done = true;
        }
        Some(result)
    }
}
