// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Reading of (possibly compressed) on-the-wire names.
//!
//! Names are handed out as uncompressed wire-format octets. When the
//! name sits in the message without any compression pointer after its
//! first label, this is a slice of the message itself; otherwise the
//! labels are copied into a caller-supplied [`NameBuf`].

use std::fmt;

use arrayvec::ArrayVec;

use super::constants::{MAX_LABEL_COPIES, MAX_POINTER_HOPS, MAX_WIRE_LEN};
use super::error::{Error, Result};

/// Scratch space able to hold any uncompressed name.
pub type NameBuf = ArrayVec<u8, MAX_WIRE_LEN>;

/// Reads the name starting at index `start` of `octets`, which must be
/// an entire DNS message for pointers to resolve correctly.
///
/// Pointers at the very start of the name are followed without
/// copying. Each pointer followed counts against a budget of
/// [`MAX_POINTER_HOPS`], and each label copied into `scratch` against
/// one of [`MAX_LABEL_COPIES`]; running out of either fails with
/// [`Error::CompressionLoop`].
pub fn read_name<'s>(octets: &'s [u8], start: usize, scratch: &'s mut NameBuf) -> Result<&'s [u8]> {
    let mut hops = 0;
    let mut index = start;
    loop {
        match label_type(octets, index)? {
            LabelType::Pointer => {
                index = follow_pointer(octets, index, &mut hops)?;
            }
            LabelType::Normal(_) => break,
        }
    }

    // Scan the first chunk. If it ends in the null label, we don't need
    // to copy anything.
    let chunk_start = index;
    loop {
        match label_type(octets, index)? {
            LabelType::Pointer => break,
            LabelType::Normal(0) => {
                let end = index + 1;
                if end - chunk_start > MAX_WIRE_LEN {
                    return Err(Error::NameTooLong);
                }
                return Ok(&octets[chunk_start..end]);
            }
            LabelType::Normal(len) => {
                index += len as usize + 1;
            }
        }
    }

    scratch.clear();
    let mut copies = 0;
    index = chunk_start;
    loop {
        match label_type(octets, index)? {
            LabelType::Pointer => {
                index = follow_pointer(octets, index, &mut hops)?;
            }
            LabelType::Normal(len) => {
                let end = index + len as usize + 1;
                let label = octets.get(index..end).ok_or(Error::UnexpectedEom)?;
                scratch
                    .try_extend_from_slice(label)
                    .or(Err(Error::NameTooLong))?;
                if len == 0 {
                    return Ok(scratch.as_slice());
                }
                copies += 1;
                if copies > MAX_LABEL_COPIES {
                    return Err(Error::CompressionLoop);
                }
                index = end;
            }
        }
    }
}

enum LabelType {
    Normal(u8),
    Pointer,
}

fn label_type(octets: &[u8], index: usize) -> Result<LabelType> {
    let len = *octets.get(index).ok_or(Error::UnexpectedEom)?;
    match len & 0xc0 {
        0x00 => Ok(LabelType::Normal(len)),
        0xc0 => Ok(LabelType::Pointer),
        _ => Err(Error::InvalidLabelType),
    }
}

/// Follows the pointer at `index`, returning its target. Unlike RFC
/// 1035 parsers that insist on pointers going backwards, any target
/// inside the message is accepted; loops are caught by the hop budget.
fn follow_pointer(octets: &[u8], index: usize, hops: &mut usize) -> Result<usize> {
    *hops += 1;
    if *hops > MAX_POINTER_HOPS {
        return Err(Error::CompressionLoop);
    }
    let pointer_bytes = octets.get(index..index + 2).ok_or(Error::UnexpectedEom)?;
    let target = (u16::from_be_bytes([pointer_bytes[0], pointer_bytes[1]]) & 0x3fff) as usize;
    if target < octets.len() {
        Ok(target)
    } else {
        Err(Error::UnexpectedEom)
    }
}

/// Compares two uncompressed wire-format names. Per RFC 4343, the
/// comparison is ASCII-case-insensitive.
pub fn names_equal(a: &[u8], b: &[u8]) -> bool {
    // Length octets of valid labels are below 0x40 and so are not
    // affected by ASCII case folding.
    a.eq_ignore_ascii_case(b)
}

/// Wraps an uncompressed wire-format name for presentation.
#[derive(Clone, Copy)]
pub struct DisplayName<'a>(pub &'a [u8]);

impl fmt::Display for DisplayName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut index = 0;
        let mut wrote_label = false;
        while let Some(&len) = self.0.get(index) {
            if len == 0 {
                break;
            }
            let end = (index + len as usize + 1).min(self.0.len());
            for octet in &self.0[index + 1..end] {
                if *octet == b'.' {
                    f.write_str("\\.")?;
                } else if *octet == b'\\' {
                    f.write_str("\\\\")?;
                } else if octet.is_ascii_graphic() {
                    write!(f, "{}", *octet as char)?;
                } else {
                    write!(f, "\\{:03}", *octet)?;
                }
            }
            f.write_str(".")?;
            wrote_label = true;
            index = end;
        }
        if !wrote_label {
            f.write_str(".")?;
        }
        Ok(())
    }
}

impl fmt::Debug for DisplayName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\"{}\"", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_name_borrows_uncompressed_names() {
        let octets = b"\x07example\x03com\x00";
        let mut scratch = NameBuf::new();
        let name = read_name(octets, 0, &mut scratch).unwrap();
        assert_eq!(name, octets);
        assert!(scratch.is_empty());
    }

    #[test]
    fn read_name_follows_leading_pointers_without_copying() {
        let octets = b"\x07example\x03com\x00\xc0\x00";
        let mut scratch = NameBuf::new();
        let name = read_name(octets, 13, &mut scratch).unwrap();
        assert_eq!(name, &octets[..13]);
        assert!(scratch.is_empty());
    }

    #[test]
    fn read_name_decompresses() {
        let octets = b"\x07example\x03com\x00\x03www\xc0\x00";
        let mut scratch = NameBuf::new();
        let name = read_name(octets, 13, &mut scratch).unwrap();
        assert_eq!(name, b"\x03www\x07example\x03com\x00");
    }

    #[test]
    fn read_name_rejects_self_pointer() {
        let mut octets = vec![0; 12];
        octets.extend_from_slice(b"\xc0\x0c\x00\x01\x00\x01");
        let mut scratch = NameBuf::new();
        assert_eq!(read_name(&octets, 12, &mut scratch), Err(Error::CompressionLoop));
    }

    #[test]
    fn read_name_rejects_pointer_loop_after_labels() {
        // "\x01a" followed by a pointer back to itself.
        let octets = b"\x01a\xc0\x00";
        let mut scratch = NameBuf::new();
        assert!(matches!(
            read_name(octets, 0, &mut scratch),
            Err(Error::NameTooLong) | Err(Error::CompressionLoop)
        ));
    }

    #[test]
    fn read_name_rejects_truncation_and_bad_labels() {
        let mut scratch = NameBuf::new();
        assert_eq!(read_name(b"\x03ww", 0, &mut scratch), Err(Error::UnexpectedEom));
        assert_eq!(read_name(b"\x03www", 0, &mut scratch), Err(Error::UnexpectedEom));
        assert_eq!(read_name(b"\x40abc", 0, &mut scratch), Err(Error::InvalidLabelType));
        assert_eq!(read_name(b"\x01a\xc0\x10", 0, &mut scratch), Err(Error::UnexpectedEom));
    }

    #[test]
    fn names_equal_ignores_case() {
        assert!(names_equal(b"\x03WwW\x07example\x00", b"\x03www\x07EXAMPLE\x00"));
        assert!(!names_equal(b"\x03www\x00", b"\x03wwx\x00"));
        assert!(!names_equal(b"\x03www\x00", b"\x00"));
    }

    #[test]
    fn display_name_works() {
        assert_eq!(DisplayName(b"\x00").to_string(), ".");
        assert_eq!(
            DisplayName(b"\x03w.w\x07example\x00").to_string(),
            "w\\.w.example."
        );
    }
}
