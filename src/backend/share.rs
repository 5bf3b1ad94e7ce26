//! Compact, URL-safe token for sharing a set of caught ids.
//!
//! Ids are sorted, delta encoded and written as LEB128 varints, then base64
//! encoded without padding. Dense collections cost about one byte per id.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use std::collections::BTreeSet;
use thiserror::Error;

pub const LINK_PREFIX: &str = "#collection=";

#[derive(Debug, Error, PartialEq)]
pub enum ShareError {
    #[error("share token is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("share token ends in the middle of an id")]
    Truncated,
    #[error("share token contains an id that does not fit in 32 bits")]
    Overflow,
}

pub fn encode(ids: &BTreeSet<u32>) -> String {
    let mut bytes = Vec::with_capacity(ids.len());
    let mut previous = 0u32;

    for (i, &id) in ids.iter().enumerate() {
        let delta = if i == 0 { id } else { id - previous };
        write_varint(&mut bytes, delta);
        previous = id;
    }

    URL_SAFE_NO_PAD.encode(bytes)
}

/// Accepts a bare token or one copied with its `#collection=` prefix.
pub fn decode(token: &str) -> Result<BTreeSet<u32>, ShareError> {
    let token = token.trim();
    let token = token.strip_prefix(LINK_PREFIX).unwrap_or(token);
    let bytes = URL_SAFE_NO_PAD.decode(token)?;

    let mut ids = BTreeSet::new();
    let mut cursor = bytes.as_slice();
    let mut current = 0u32;
    let mut first = true;

    while !cursor.is_empty() {
        let delta = read_varint(&mut cursor)?;
        current = if first {
            delta
        } else {
            current.checked_add(delta).ok_or(ShareError::Overflow)?
        };
        first = false;
        ids.insert(current);
    }

    Ok(ids)
}

fn write_varint(out: &mut Vec<u8>, mut value: u32) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

fn read_varint(cursor: &mut &[u8]) -> Result<u32, ShareError> {
    let mut value = 0u32;
    let mut shift = 0u32;

    loop {
        let (&byte, rest) = cursor.split_first().ok_or(ShareError::Truncated)?;
        *cursor = rest;

        let bits = u32::from(byte & 0x7f);
        if shift >= 32 || (shift == 28 && bits > 0x0f) {
            return Err(ShareError::Overflow);
        }
        value |= bits << shift;

        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}
