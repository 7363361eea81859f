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

//! A streaming base64 decoder for measurement payloads.
//!
//! Unlike general-purpose decoders, this one is tolerant: it skips any
//! octet outside the RFC 4648 alphabet (whitespace, escaped slashes, and
//! the like), stops at the first padded quantum, and decodes a dangling
//! two- or three-character quantum as if it had been padded. It writes
//! straight into the caller's buffer, three octets at a time, so it can
//! decode into the tail of a record buffer with no intermediate copy.

use super::{Error, Result};

/// The value given to `=` in the decoding table.
const PAD: u8 = 64;

/// Decodes base64 text from `src` into `target`, returning the number
/// of octets written. This fails with [`Error::OutputTooSmall`] if
/// `target` cannot hold the decoded data.
pub fn decode(src: &[u8], target: &mut [u8]) -> Result<usize> {
    let mut quantum = [0u8; 4];
    let mut count = 0;
    let mut written = 0;

    for &c in src {
        let value = match decode_char(c) {
            Some(value) => value,
            None => continue,
        };
        quantum[count] = value;
        count += 1;
        if count < 4 {
            continue;
        }
        count = 0;
        if quantum[2] == PAD && quantum[3] == PAD {
            written += write_octets(&quantum, 1, target, written)?;
            return Ok(written);
        } else if quantum[3] == PAD {
            written += write_octets(&quantum, 2, target, written)?;
            return Ok(written);
        } else {
            written += write_octets(&quantum, 3, target, written)?;
        }
    }

    // A single dangling character carries less than one octet and is
    // ignored.
    match count {
        2 => written += write_octets(&quantum, 1, target, written)?,
        3 => written += write_octets(&quantum, 2, target, written)?,
        _ => (),
    }
    Ok(written)
}

/// Returns the length of `src` without up to two trailing `=`
/// characters.
pub fn stripped_len(src: &[u8]) -> usize {
    let mut len = src.len();
    for _ in 0..2 {
        if len > 1 && src[len - 1] == b'=' {
            len -= 1;
        }
    }
    len
}

/// Returns an upper bound for the decoded length of `src`.
pub fn decoded_len_estimate(src: &[u8]) -> usize {
    stripped_len(src) * 3 / 4
}

fn decode_char(c: u8) -> Option<u8> {
    match c {
        b'A'..=b'Z' => Some(c - b'A'),
        b'a'..=b'z' => Some(c - b'a' + 26),
        b'0'..=b'9' => Some(c - b'0' + 52),
        b'+' => Some(62),
        b'/' => Some(63),
        b'=' => Some(PAD),
        _ => None,
    }
}

/// Writes the first `n` octets encoded by `quantum` at `offset` of
/// `target`. Padding values in unused positions are masked away.
fn write_octets(quantum: &[u8; 4], n: usize, target: &mut [u8], offset: usize) -> Result<usize> {
    let out = target
        .get_mut(offset..offset + n)
        .ok_or(Error::OutputTooSmall)?;
    let [a, b, c, d] = *quantum;
    let octets = [
        (a << 2) | ((b & 0x30) >> 4),
        ((b & 0x0f) << 4) | ((c & 0x3c) >> 2),
        ((c & 0x03) << 6) | (d & 0x3f),
    ];
    out.copy_from_slice(&octets[..n]);
    Ok(n)
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use rand::Rng;

    use super::*;

    fn decode_to_vec(src: &[u8]) -> Vec<u8> {
        let mut target = vec![0; decoded_len_estimate(src)];
        let len = decode(src, &mut target).unwrap();
        target.truncate(len);
        target
    }

    #[test]
    fn decode_round_trips_random_data() {
        let mut rng = rand::thread_rng();
        for len in 0..200 {
            let data: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            let encoded = STANDARD.encode(&data);
            assert_eq!(decode_to_vec(encoded.as_bytes()), data);
        }
    }

    #[test]
    fn decode_skips_non_alphabet_characters() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let len = rng.gen_range(1..100);
            let data: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            let mut noisy = Vec::new();
            for c in STANDARD.encode(&data).bytes() {
                if rng.gen_bool(0.2) {
                    noisy.push(b"\n \t\\-_"[rng.gen_range(0..6)]);
                }
                noisy.push(c);
            }
            assert_eq!(decode_to_vec(&noisy), data);
        }
    }

    #[test]
    fn decode_handles_missing_padding() {
        assert_eq!(decode_to_vec(b"AQ"), [1]);
        assert_eq!(decode_to_vec(b"AQI"), [1, 2]);
        // A single dangling character is dropped.
        assert_eq!(decode_to_vec(b"AQIDB"), [1, 2, 3]);
    }

    #[test]
    fn decode_stops_after_padding() {
        assert_eq!(decode_to_vec(b"AQ==AQID"), [1]);
    }

    #[test]
    fn decode_rejects_small_output() {
        let mut target = [0; 2];
        assert_eq!(decode(b"AQID", &mut target), Err(Error::OutputTooSmall));
        assert_eq!(decode(b"AQI=", &mut target), Ok(2));
    }

    #[test]
    fn stripped_len_works() {
        assert_eq!(stripped_len(b"AQ=="), 2);
        assert_eq!(stripped_len(b"AQI="), 3);
        assert_eq!(stripped_len(b"="), 1);
        assert_eq!(decoded_len_estimate(b"AQIDBA=="), 4);
    }
}
