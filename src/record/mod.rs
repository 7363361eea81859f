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

//! The packed record format in which measurement results are stored.
//!
//! A packed record is a 16-octet header followed by the address of the
//! resolver that was queried and a payload:
//!
//! ```text
//!  0               4               8              12      14      16
//! +---------------+---------------+---------------+---+---+-------+
//! |     time      |      rtt      |   probe id    |af |err|  len  |
//! +---------------+---------------+---------------+---+---+-------+
//! | address (4 or 16 octets)      | payload (len octets) | padding |
//! +-------------------------------+----------------------+---------+
//! ```
//!
//! All integers are little-endian, and the round trip time is an IEEE
//! 754 single-precision float. The address family (`af`) is 2 for IPv4
//! and 10 for IPv6 and is the only thing that determines the length of
//! the address. The payload is a DNS message unless the error flag is
//! set, in which case it is the text of an error report. It is padded
//! with `=` to a multiple of four octets. Records are stored back to
//! back with no framing.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use log::{debug, warn};

pub mod b64;
pub mod source;

pub use source::{DailySource, Merge, SourceError};

////////////////////////////////////////////////////////////////////////
// CONSTANTS                                                          //
////////////////////////////////////////////////////////////////////////

/// The size of the fixed record header.
pub const HEADER_SIZE: usize = 16;

/// The address family value for IPv4 addresses.
pub const AF_INET: u8 = 2;

/// The address family value for IPv6 addresses.
pub const AF_INET6: u8 = 10;

/// The octet used to pad payloads.
pub const PADDING: u8 = b'=';

const TIME_START: usize = 0;
const RTT_START: usize = 4;
const PROBE_ID_START: usize = 8;
const AF_BYTE: usize = 12;
const ERROR_BYTE: usize = 13;
const LEN_START: usize = 14;

////////////////////////////////////////////////////////////////////////
// RECORDS                                                            //
////////////////////////////////////////////////////////////////////////

/// A decoded packed record. The payload borrows from the buffer the
/// record was decoded from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Record<'a> {
    /// Collection time in seconds since the epoch.
    pub time: u32,

    /// Round trip time in milliseconds, or -1 when not applicable.
    pub rtt: f32,

    pub probe_id: u32,

    /// The address of the resolver that was queried.
    pub address: IpAddr,

    /// Whether the payload is an error report rather than a DNS
    /// message.
    pub is_error: bool,

    pub payload: &'a [u8],
}

impl<'a> Record<'a> {
    /// The round trip time used for records that have none.
    pub const NO_RTT: f32 = -1.0;

    /// Returns the encoded size of this record.
    pub fn size(&self) -> usize {
        record_size(&self.address, self.payload.len())
    }

    /// Returns the payload as a DNS message, if it is one.
    pub fn message(&self) -> Option<crate::message::Message<'a>> {
        if self.is_error {
            None
        } else {
            crate::message::Message::try_from(self.payload).ok()
        }
    }
}

/// Returns the size of a record with the given address and payload
/// length, including padding.
pub fn record_size(address: &IpAddr, payload_len: usize) -> usize {
    HEADER_SIZE + address_len(address) + round_up_4(payload_len)
}

fn address_len(address: &IpAddr) -> usize {
    match address {
        IpAddr::V4(_) => 4,
        IpAddr::V6(_) => 16,
    }
}

fn family(address: &IpAddr) -> u8 {
    match address {
        IpAddr::V4(_) => AF_INET,
        IpAddr::V6(_) => AF_INET6,
    }
}

fn round_up_4(len: usize) -> usize {
    (len + 3) & !3
}

////////////////////////////////////////////////////////////////////////
// DECODING                                                           //
////////////////////////////////////////////////////////////////////////

/// Decodes the record starting at `offset` of `buffer`, returning it
/// along with the offset of the next record.
pub fn decode_one(buffer: &[u8], offset: usize) -> Result<(Record<'_>, usize)> {
    let address_start = offset.checked_add(HEADER_SIZE).ok_or(Error::Truncated)?;
    let header = buffer
        .get(offset..address_start)
        .ok_or(Error::Truncated)?;
    let addr_len = match header[AF_BYTE] {
        AF_INET => 4,
        AF_INET6 => 16,
        other => return Err(Error::UnknownFamily(other)),
    };
    let len = read_u16(header, LEN_START) as usize;
    let payload_start = address_start + addr_len;
    let next = payload_start
        .checked_add(round_up_4(len))
        .filter(|&next| next <= buffer.len())
        .ok_or(Error::Truncated)?;

    let address = if addr_len == 4 {
        let mut octets = [0; 4];
        octets.copy_from_slice(&buffer[address_start..payload_start]);
        IpAddr::V4(Ipv4Addr::from(octets))
    } else {
        let mut octets = [0; 16];
        octets.copy_from_slice(&buffer[address_start..payload_start]);
        IpAddr::V6(Ipv6Addr::from(octets))
    };

    let record = Record {
        time: read_u32(header, TIME_START),
        rtt: f32::from_bits(read_u32(header, RTT_START)),
        probe_id: read_u32(header, PROBE_ID_START),
        address,
        is_error: header[ERROR_BYTE] != 0,
        payload: &buffer[payload_start..payload_start + len],
    };
    Ok((record, next))
}

/// An iterator over the records in a buffer.
///
/// Iteration ends when fewer than [`HEADER_SIZE`] octets remain or the
/// next record does not fit in the buffer. Such a trailing partial
/// record (as left behind by a writer that was interrupted) is dropped
/// without error. Cloning a `Records` restarts nothing; use
/// [`Records::new`] again to start over.
#[derive(Clone, Debug)]
pub struct Records<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> Records<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    /// Returns the offset of the next record to be decoded.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = Record<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.len() - self.offset < HEADER_SIZE {
            return None;
        }
        match decode_one(self.buffer, self.offset) {
            Ok((record, next)) => {
                self.offset = next;
                Some(record)
            }
            Err(err) => {
                if let Error::UnknownFamily(_) = err {
                    warn!("Stopping at record at offset {}: {}", self.offset, err);
                } else {
                    debug!(
                        "Dropping {} trailing octets: {}",
                        self.buffer.len() - self.offset,
                        err
                    );
                }
                self.offset = self.buffer.len();
                None
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////
// ENCODING                                                           //
////////////////////////////////////////////////////////////////////////

/// Encodes `record` at the beginning of `out`, returning the number of
/// octets written.
pub fn encode_one(record: &Record, out: &mut [u8]) -> Result<usize> {
    let len = u16::try_from(record.payload.len()).or(Err(Error::PayloadTooLong))?;
    let size = record.size();
    if size > out.len() {
        return Err(Error::BufferFull);
    }
    let payload_start = write_header(record, len, out);
    let payload_end = payload_start + record.payload.len();
    out[payload_start..payload_end].copy_from_slice(record.payload);
    out[payload_end..size].fill(PADDING);
    Ok(size)
}

/// Like [`encode_one`], except that `record.payload` holds the payload
/// in base64. It is decoded directly into `out`, and the length field
/// is set from the number of octets actually decoded.
pub fn encode_base64(record: &Record, out: &mut [u8]) -> Result<usize> {
    let payload_start = HEADER_SIZE + address_len(&record.address);
    if payload_start > out.len() {
        return Err(Error::BufferFull);
    }
    let decoded_len = b64::decode(record.payload, &mut out[payload_start..])?;
    let len = u16::try_from(decoded_len).or(Err(Error::PayloadTooLong))?;
    let size = record_size(&record.address, decoded_len);
    if size > out.len() {
        return Err(Error::BufferFull);
    }
    write_header(record, len, out);
    out[payload_start + decoded_len..size].fill(PADDING);
    Ok(size)
}

/// Writes the header and address of `record` with the given payload
/// length, returning the offset of the payload.
fn write_header(record: &Record, len: u16, out: &mut [u8]) -> usize {
    out[TIME_START..TIME_START + 4].copy_from_slice(&record.time.to_le_bytes());
    out[RTT_START..RTT_START + 4].copy_from_slice(&record.rtt.to_bits().to_le_bytes());
    out[PROBE_ID_START..PROBE_ID_START + 4].copy_from_slice(&record.probe_id.to_le_bytes());
    out[AF_BYTE] = family(&record.address);
    out[ERROR_BYTE] = record.is_error as u8;
    out[LEN_START..LEN_START + 2].copy_from_slice(&len.to_le_bytes());
    match record.address {
        IpAddr::V4(address) => {
            out[HEADER_SIZE..HEADER_SIZE + 4].copy_from_slice(&address.octets());
            HEADER_SIZE + 4
        }
        IpAddr::V6(address) => {
            out[HEADER_SIZE..HEADER_SIZE + 16].copy_from_slice(&address.octets());
            HEADER_SIZE + 16
        }
    }
}

/// A growable buffer of packed records.
#[derive(Clone, Debug, Default)]
pub struct RecordWriter {
    octets: Vec<u8>,
}

impl RecordWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `record`.
    pub fn push(&mut self, record: &Record) -> Result<()> {
        let start = self.octets.len();
        self.octets.resize(start + record.size(), 0);
        let result = encode_one(record, &mut self.octets[start..]);
        self.finish(start, result)
    }

    /// Appends `record`, whose payload is base64 text to be decoded.
    pub fn push_base64(&mut self, record: &Record) -> Result<()> {
        let start = self.octets.len();
        let estimate = b64::decoded_len_estimate(record.payload);
        self.octets
            .resize(start + record_size(&record.address, estimate), 0);
        let result = encode_base64(record, &mut self.octets[start..]);
        self.finish(start, result)
    }

    /// Trims the buffer to the end of the record just written, or back
    /// to `start` if writing failed.
    fn finish(&mut self, start: usize, result: Result<usize>) -> Result<()> {
        match result {
            Ok(size) => {
                self.octets.truncate(start + size);
                Ok(())
            }
            Err(err) => {
                self.octets.truncate(start);
                Err(err)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.octets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.octets.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.octets
    }

    pub fn clear(&mut self) {
        self.octets.clear();
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.octets
    }
}

////////////////////////////////////////////////////////////////////////
// SORTING                                                            //
////////////////////////////////////////////////////////////////////////

/// Sorts the records of `buffer` by time, keeping records with equal
/// times in their original order. Returns [`None`] if the records were
/// already in order. Any trailing partial record is dropped from the
/// sorted copy.
pub fn sort_by_time(buffer: &[u8]) -> Option<Vec<u8>> {
    let mut spans = Vec::new();
    let mut records = Records::new(buffer);
    let mut start = 0;
    while let Some(record) = records.next() {
        spans.push((record.time, start, records.offset()));
        start = records.offset();
    }
    if spans.windows(2).all(|pair| pair[0].0 <= pair[1].0) {
        return None;
    }
    spans.sort_by_key(|span| span.0);
    let mut sorted = Vec::with_capacity(start);
    for (_, start, end) in spans {
        sorted.extend_from_slice(&buffer[start..end]);
    }
    Some(sorted)
}

/// Returns the earliest and latest times of the records in `buffer`.
pub fn time_span(buffer: &[u8]) -> Option<(u32, u32)> {
    Records::new(buffer).fold(None, |span, record| match span {
        None => Some((record.time, record.time)),
        Some((min, max)) => Some((min.min(record.time), max.max(record.time))),
    })
}

////////////////////////////////////////////////////////////////////////
// HELPERS                                                            //
////////////////////////////////////////////////////////////////////////

fn read_u16(octets: &[u8], start: usize) -> u16 {
    u16::from_le_bytes([octets[start], octets[start + 1]])
}

fn read_u32(octets: &[u8], start: usize) -> u32 {
    u32::from_le_bytes([
        octets[start],
        octets[start + 1],
        octets[start + 2],
        octets[start + 3],
    ])
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that a record could not be decoded or encoded.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    /// The buffer ended before the end of the record.
    Truncated,

    /// The output buffer is too small for the record.
    BufferFull,

    /// The output buffer is too small for the decoded base64 payload.
    OutputTooSmall,

    /// The payload is longer than the length field can express.
    PayloadTooLong,

    /// The address family is neither IPv4 nor IPv6.
    UnknownFamily(u8),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::Truncated => f.write_str("record is truncated"),
            Self::BufferFull => f.write_str("output buffer is full"),
            Self::OutputTooSmall => f.write_str("output buffer too small for decoded payload"),
            Self::PayloadTooLong => f.write_str("payload is longer than 65535 octets"),
            Self::UnknownFamily(af) => write!(f, "unknown address family {}", af),
        }
    }
}

impl std::error::Error for Error {}

/// The type returned by fallible record functions.
pub type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
