//! Nibble codec for IUPAC nucleotide sequences
//!
//! Every symbol of the 16-letter alphabet maps to a distinct 4-bit code, and
//! two codes are packed into each byte: the first symbol in the high nibble,
//! the second in the low nibble. Odd-length sequences pad the trailing low
//! nibble with the gap code (`0x0`). The symbol count is tracked out-of-band,
//! so padding is never mistaken for data.
//!
//! | Code | Symbol | Code | Symbol | Code | Symbol | Code | Symbol |
//! | ---- | ------ | ---- | ------ | ---- | ------ | ---- | ------ |
//! | 0x0  | `-`    | 0x4  | `G`    | 0x8  | `T`    | 0xC  | `K`    |
//! | 0x1  | `A`    | 0x5  | `R`    | 0x9  | `W`    | 0xD  | `D`    |
//! | 0x2  | `C`    | 0x6  | `S`    | 0xA  | `Y`    | 0xE  | `B`    |
//! | 0x3  | `M`    | 0x7  | `V`    | 0xB  | `H`    | 0xF  | `N`    |
//!
//! Codes for the ambiguity symbols are the bitwise union of the bases they
//! stand for (`R` = `A|G` = `0x5`). Any character outside the alphabet is
//! encoded as `N`.

use crate::error::{CodecError, Result};

/// Code used for characters outside the alphabet
pub const UNKNOWN_CODE: u8 = 0xF;

/// Code used to pad the trailing low nibble of odd-length sequences
pub const PAD_CODE: u8 = 0x0;

/// Size in bytes of the checksum trailing each record
pub const CHECKSUM_SIZE: usize = 4;

/// Symbol for every 4-bit code, indexed by code
const DECODE_TABLE: [u8; 16] = *b"-ACMGRSVTWYHKDBN";

/// Code for every byte value, case-insensitive
const ENCODE_TABLE: [u8; 256] = build_encode_table();

const fn build_encode_table() -> [u8; 256] {
    let mut table = [UNKNOWN_CODE; 256];
    let mut code = 0;
    while code < 16 {
        let symbol = DECODE_TABLE[code];
        table[symbol as usize] = code as u8;
        table[symbol.to_ascii_lowercase() as usize] = code as u8;
        code += 1;
    }
    table
}

/// Number of bytes needed to pack `len` symbols
#[inline]
#[must_use]
pub fn packed_len(len: usize) -> usize {
    len.div_ceil(2)
}

/// Returns the 4-bit code for a single character
#[inline]
#[must_use]
pub fn encode_symbol(symbol: char) -> u8 {
    if symbol.is_ascii() {
        ENCODE_TABLE[symbol as usize]
    } else {
        UNKNOWN_CODE
    }
}

/// Returns the symbol for a 4-bit code (only the low nibble is considered)
#[inline]
#[must_use]
pub fn decode_symbol(code: u8) -> char {
    DECODE_TABLE[(code & 0x0F) as usize] as char
}

/// Packs a sequence into `ebuf`, appending to any existing content
///
/// Returns the number of symbols encoded.
pub fn encode_into(sequence: &str, ebuf: &mut Vec<u8>) -> usize {
    ebuf.reserve(packed_len(sequence.len()));
    let mut len = 0;
    let mut high: Option<u8> = None;
    for symbol in sequence.chars() {
        let code = encode_symbol(symbol);
        match high.take() {
            Some(h) => ebuf.push((h << 4) | code),
            None => high = Some(code),
        }
        len += 1;
    }
    if let Some(h) = high {
        ebuf.push((h << 4) | PAD_CODE);
    }
    len
}

/// Packs a sequence into a newly allocated buffer
///
/// Returns the packed bytes together with the original symbol count.
#[must_use]
pub fn encode(sequence: &str) -> (Vec<u8>, usize) {
    let mut ebuf = Vec::new();
    let len = encode_into(sequence, &mut ebuf);
    (ebuf, len)
}

/// Packs raw bytes, failing if they are not valid UTF-8 text
pub fn encode_bytes(sequence: &[u8]) -> Result<(Vec<u8>, usize)> {
    let text = std::str::from_utf8(sequence).map_err(CodecError::InvalidUtf8)?;
    Ok(encode(text))
}

/// Unpacks `len` symbols from `ebuf` into `dbuf`, starting `skip` symbols into the data
///
/// A `skip` of 1 starts decoding at the low nibble of the first byte, which is how
/// windows starting at an odd position are decoded.
pub fn decode_window_into(ebuf: &[u8], skip: usize, len: usize, dbuf: &mut String) -> Result<()> {
    let capacity = ebuf.len() * 2;
    if skip + len > capacity {
        return Err(CodecError::LengthExceedsData {
            len: skip + len,
            capacity,
        }
        .into());
    }
    dbuf.reserve(len);
    for pos in skip..skip + len {
        let byte = ebuf[pos / 2];
        let code = if pos % 2 == 0 { byte >> 4 } else { byte & 0x0F };
        dbuf.push(decode_symbol(code));
    }
    Ok(())
}

/// Unpacks exactly `len` symbols from `ebuf` into `dbuf`
pub fn decode_into(ebuf: &[u8], len: usize, dbuf: &mut String) -> Result<()> {
    decode_window_into(ebuf, 0, len, dbuf)
}

/// Unpacks exactly `len` symbols from `ebuf` into a new string
pub fn decode(ebuf: &[u8], len: usize) -> Result<String> {
    let mut dbuf = String::with_capacity(len);
    decode_into(ebuf, len, &mut dbuf)?;
    Ok(dbuf)
}

/// CRC-32 over packed bytes
#[inline]
#[must_use]
pub fn checksum(ebuf: &[u8]) -> u32 {
    crc32fast::hash(ebuf)
}

/// Recomputes the checksum of `ebuf` and compares it to `expected`
#[inline]
#[must_use]
pub fn verify(ebuf: &[u8], expected: u32) -> bool {
    checksum(ebuf) == expected
}
