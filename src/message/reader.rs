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

//! Implementation of the [`Message`] and [`Cursor`] types, which walk
//! the records of an on-the-wire DNS message without parsing it into
//! owned structures.

use std::convert::TryFrom;
use std::fmt;

use super::constants::*;
use super::error::{Error, Result};
use super::name::{names_equal, read_name, NameBuf};
use super::{Rcode, Section, Sections};
use crate::class::Class;
use crate::rr::Type;

////////////////////////////////////////////////////////////////////////
// MESSAGE                                                            //
////////////////////////////////////////////////////////////////////////

/// A "frame" around a buffer containing a DNS message.
///
/// A `Message` is constructed using its [`TryFrom`] implementation,
/// which fails unless the buffer holds at least a header and a minimal
/// question (17 octets). Header fields can be read at any time. The
/// questions and records are walked with a [`Cursor`], obtained from
/// [`Message::first`] or [`Message::cursors`].
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Message<'a> {
    octets: &'a [u8],
}

impl<'a> Message<'a> {
    /// Returns the underlying octets.
    pub fn octets(&self) -> &'a [u8] {
        self.octets
    }

    /// Returns the 16-bit ID of the message.
    pub fn id(&self) -> u16 {
        read_u16(self.octets, ID_START).unwrap_or(0)
    }

    /// Returns whether the TC (truncation) bit is set.
    pub fn tc(&self) -> bool {
        (self.octets[TC_BYTE] & TC_MASK) != 0
    }

    /// Returns the RCODE of the message.
    pub fn rcode(&self) -> Rcode {
        (self.octets[RCODE_BYTE] & RCODE_MASK).into()
    }

    /// Returns the number of questions in the message.
    pub fn qdcount(&self) -> u16 {
        read_u16(self.octets, QDCOUNT_START).unwrap_or(0)
    }

    /// Returns the number of answers in the message.
    pub fn ancount(&self) -> u16 {
        read_u16(self.octets, ANCOUNT_START).unwrap_or(0)
    }

    /// Returns the number of authority records in the message.
    pub fn nscount(&self) -> u16 {
        read_u16(self.octets, NSCOUNT_START).unwrap_or(0)
    }

    /// Returns the number of additional records in the message.
    pub fn arcount(&self) -> u16 {
        read_u16(self.octets, ARCOUNT_START).unwrap_or(0)
    }

    /// Returns the total number of questions and records announced by
    /// the header.
    pub fn total_count(&self) -> usize {
        self.qdcount() as usize
            + self.ancount() as usize
            + self.nscount() as usize
            + self.arcount() as usize
    }

    /// Returns a cursor at the first question (or record), if there is
    /// a readable one.
    pub fn first(&self) -> Option<Cursor<'a>> {
        Cursor::locate(*self, 0, HEADER_SIZE)
    }

    /// Returns an iterator over cursors for all readable questions and
    /// records in `sections`.
    pub fn cursors(&self, sections: Sections) -> Cursors<'a> {
        Cursors {
            next: self.first(),
            sections,
        }
    }

    /// Determines which section the question or record with the given
    /// index is in. Indices past the last record announced by the
    /// header map to [`None`].
    fn section_of(&self, index: usize) -> Option<Section> {
        let mut limit = self.qdcount() as usize;
        if index < limit {
            return Some(Section::Question);
        }
        limit += self.ancount() as usize;
        if index < limit {
            return Some(Section::Answer);
        }
        limit += self.nscount() as usize;
        if index < limit {
            return Some(Section::Authority);
        }
        limit += self.arcount() as usize;
        if index < limit {
            Some(Section::Additional)
        } else {
            None
        }
    }
}

impl<'a> TryFrom<&'a [u8]> for Message<'a> {
    type Error = Error;

    fn try_from(octets: &'a [u8]) -> Result<Self> {
        if octets.len() >= MIN_MESSAGE_LEN {
            Ok(Self { octets })
        } else {
            Err(Error::HeaderTooShort)
        }
    }
}

impl fmt::Debug for Message<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.id())
            .field("tc", &self.tc())
            .field("rcode", &self.rcode())
            .field("qdcount", &self.qdcount())
            .field("ancount", &self.ancount())
            .field("nscount", &self.nscount())
            .field("arcount", &self.arcount())
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////
// CURSOR                                                             //
////////////////////////////////////////////////////////////////////////

/// A position at one question or record of a [`Message`].
///
/// The cursor tracks where the owner name starts, where the fixed
/// fields after the owner start, and where the next record starts. The
/// section is never stored; it follows from the record's index and the
/// counts in the header.
///
/// Reads of fixed fields are bounds-checked against the start of the
/// next record. A field that does not fit reads as zero (or as empty
/// RDATA), so a damaged record is still visited but matches nothing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Cursor<'a> {
    message: Message<'a>,
    index: usize,
    start: usize,
    type_start: usize,
    next: usize,
}

impl<'a> Cursor<'a> {
    /// Finds the fixed fields of the record with the given index, whose
    /// owner starts at `start`. Only the length of the owner is looked
    /// at; a pointer ends the scan since it is always the last label.
    fn locate(message: Message<'a>, index: usize, start: usize) -> Option<Self> {
        let section = message.section_of(index)?;
        let octets = message.octets;
        let end = octets.len();
        let mut pos = start;
        let type_start = loop {
            if pos + 4 >= end {
                return None;
            }
            let len = octets[pos];
            if len == 0 {
                break pos + 1;
            } else if len & 0xc0 == 0xc0 {
                if pos + 6 > end {
                    return None;
                }
                break pos + 2;
            } else if len & 0xc0 != 0 {
                return None;
            }
            pos += len as usize + 1;
        };

        let next = if section == Section::Question {
            type_start + QUESTION_FIXED_LEN
        } else if type_start + RDATA_OFFSET > end {
            end
        } else {
            let rdlength = read_u16(octets, type_start + RDLENGTH_OFFSET).unwrap_or(0);
            (type_start + RDATA_OFFSET + rdlength as usize).min(end)
        };

        Some(Self {
            message,
            index,
            start,
            type_start,
            next,
        })
    }

    /// Moves to the next question or record, returning [`None`] past
    /// the last one announced by the header or at the first one that
    /// cannot be located.
    pub fn advance(self) -> Option<Self> {
        Self::locate(self.message, self.index + 1, self.next)
    }

    /// Returns the message this cursor is in.
    pub fn message(&self) -> Message<'a> {
        self.message
    }

    /// Returns the zero-based index of the question or record.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the section the question or record is in.
    pub fn section(&self) -> Section {
        // Cursors only exist for indices within the header counts.
        self.message.section_of(self.index).unwrap_or(Section::Additional)
    }

    /// Returns the RR type, or type 0 if it does not fit.
    pub fn rr_type(&self) -> Type {
        self.field_u16(TYPE_OFFSET).unwrap_or(0).into()
    }

    /// Returns the class, or class 0 if it does not fit.
    pub fn class(&self) -> Class {
        self.field_u16(CLASS_OFFSET).unwrap_or(0).into()
    }

    /// Returns the TTL of a record. Questions have none.
    pub fn ttl(&self) -> Option<u32> {
        let offset = self.type_start + TTL_OFFSET;
        if offset + 4 > self.next {
            return None;
        }
        let octets = self.message.octets;
        Some(u32::from_be_bytes([
            octets[offset],
            octets[offset + 1],
            octets[offset + 2],
            octets[offset + 3],
        ]))
    }

    /// Returns the index of the first RDATA octet within the message.
    pub fn rdata_start(&self) -> usize {
        self.type_start + RDATA_OFFSET
    }

    /// Returns the RDATA of a record. This is empty for questions and
    /// for records whose RDATA does not fit in the message.
    pub fn rdata(&self) -> &'a [u8] {
        self.message
            .octets
            .get(self.rdata_start()..self.next)
            .unwrap_or(&[])
    }

    /// Returns the RDATA length field as it was announced, which may
    /// exceed [`Cursor::rdata`]'s length for a truncated message.
    pub fn rdlength(&self) -> Option<u16> {
        self.field_u16(RDLENGTH_OFFSET)
    }

    /// Reads the owner name, decompressing into `scratch` if needed.
    pub fn owner<'s>(&self, scratch: &'s mut NameBuf) -> Result<&'s [u8]>
    where
        'a: 's,
    {
        read_name(self.message.octets, self.start, scratch)
    }

    /// Reads a (possibly compressed) name starting `offset` octets into
    /// the RDATA.
    pub fn rdata_name<'s>(&self, offset: usize, scratch: &'s mut NameBuf) -> Result<&'s [u8]>
    where
        'a: 's,
    {
        if self.rdata_start() + offset >= self.next {
            return Err(Error::UnexpectedEom);
        }
        read_name(self.message.octets, self.rdata_start() + offset, scratch)
    }

    /// Returns whether the owner name equals `name`. An unreadable
    /// owner matches nothing.
    pub fn owner_equals(&self, name: &[u8]) -> bool {
        let mut scratch = NameBuf::new();
        self.owner(&mut scratch)
            .map_or(false, |owner| names_equal(owner, name))
    }

    /// Returns whether this is a record of the given name, class, and
    /// type.
    pub fn matches(&self, name: &[u8], class: Class, rr_type: Type) -> bool {
        self.rr_type() == rr_type && self.class() == class && self.owner_equals(name)
    }

    /// Returns whether this is an RRSIG record covering the RRset with
    /// the given name, class, and type.
    pub fn covers(&self, name: &[u8], class: Class, rr_type: Type) -> bool {
        self.rr_type() == Type::RRSIG
            && self.class() == class
            && self.field_u16(RRSIG_TYPE_COVERED_OFFSET) == Some(rr_type.into())
            && self.owner_equals(name)
    }

    fn field_u16(&self, offset: usize) -> Option<u16> {
        let start = self.type_start + offset;
        if start + 2 > self.next {
            None
        } else {
            read_u16(self.message.octets, start)
        }
    }
}

/// An iterator over the [`Cursor`]s of a message that lie in a set of
/// sections. It is returned by [`Message::cursors`].
#[derive(Clone, Debug)]
pub struct Cursors<'a> {
    next: Option<Cursor<'a>>,
    sections: Sections,
}

impl<'a> Iterator for Cursors<'a> {
    type Item = Cursor<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(cursor) = self.next {
            self.next = cursor.advance();
            if self.sections.contains(cursor.section()) {
                return Some(cursor);
            }
        }
        None
    }
}

////////////////////////////////////////////////////////////////////////
// HELPERS                                                            //
////////////////////////////////////////////////////////////////////////

/// Reads a network-byte-order `u16` at `index` of `octets`.
fn read_u16(octets: &[u8], index: usize) -> Option<u16> {
    octets
        .get(index..index + 2)
        .map(|bytes| u16::from_be_bytes([bytes[0], bytes[1]]))
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
