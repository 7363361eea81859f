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

//! Implementation of [`Rrset`], a view of the records of one RRset in a
//! message, together with answer resolution and RRset iteration.

use std::convert::TryFrom;

use super::constants::MAX_CNAME_REFERRALS;
use super::name::{names_equal, NameBuf};
use super::reader::{Cursor, Cursors, Message};
use super::{Section, Sections};
use crate::class::Class;
use crate::rr::Type;

////////////////////////////////////////////////////////////////////////
// RRSETS                                                             //
////////////////////////////////////////////////////////////////////////

/// The records in a message sharing an owner, class, and type.
///
/// An `Rrset` doesn't hold its records. It holds the key, and
/// [`Rrset::rrs`] and [`Rrset::rrsigs`] find the matching records in
/// the message when called. The owner is kept in uncompressed form, so
/// matching works whichever way each record's owner was compressed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Rrset<'a> {
    message: Message<'a>,
    name: NameBuf,
    class: Class,
    rr_type: Type,
    sections: Sections,
}

impl<'a> Rrset<'a> {
    /// Creates the RRset with the given key, restricted to `sections`.
    /// This fails if `name` is longer than any valid name.
    pub fn new(
        message: Message<'a>,
        name: &[u8],
        class: Class,
        rr_type: Type,
        sections: Sections,
    ) -> Option<Self> {
        Some(Self {
            message,
            name: NameBuf::try_from(name).ok()?,
            class,
            rr_type,
            sections,
        })
    }

    /// Returns the uncompressed wire-format owner.
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    /// Returns whether the owner is `name`, ignoring case.
    pub fn is_owned_by(&self, name: &[u8]) -> bool {
        names_equal(&self.name, name)
    }

    pub fn class(&self) -> Class {
        self.class
    }

    pub fn rr_type(&self) -> Type {
        self.rr_type
    }

    pub fn sections(&self) -> Sections {
        self.sections
    }

    pub fn message(&self) -> Message<'a> {
        self.message
    }

    /// Returns an iterator over the records of the RRset.
    pub fn rrs(&self) -> impl Iterator<Item = Cursor<'a>> + '_ {
        self.message
            .cursors(self.sections)
            .filter(move |rr| rr.matches(&self.name, self.class, self.rr_type))
    }

    /// Returns an iterator over the RRSIG records covering the RRset.
    pub fn rrsigs(&self) -> impl Iterator<Item = Cursor<'a>> + '_ {
        self.message
            .cursors(self.sections)
            .filter(move |rr| rr.covers(&self.name, self.class, self.rr_type))
    }

    pub fn has_rrs(&self) -> bool {
        self.rrs().next().is_some()
    }

    pub fn has_rrsigs(&self) -> bool {
        self.rrsigs().next().is_some()
    }
}

////////////////////////////////////////////////////////////////////////
// ANSWER RESOLUTION                                                  //
////////////////////////////////////////////////////////////////////////

impl<'a> Message<'a> {
    /// Resolves the answer to the message's first question, for the
    /// class and type given in that question. See
    /// [`Message::resolve_answer`].
    pub fn answer(&self) -> Option<Rrset<'a>> {
        let question = self.first()?;
        self.resolve_answer(question.class(), question.rr_type())
    }

    /// Resolves the answer to the message's first question for the
    /// given class and type.
    ///
    /// Starting at the question name, CNAME records in the answer
    /// section are followed (at most [`MAX_CNAME_REFERRALS`] of them)
    /// and the RRset of the requested type at the last name reached is
    /// returned if it has any records. When the requested type is
    /// CNAME itself, no chasing is done.
    pub fn resolve_answer(&self, class: Class, rr_type: Type) -> Option<Rrset<'a>> {
        let question = self.first()?;
        if question.section() != Section::Question {
            return None;
        }
        let mut scratch = NameBuf::new();
        let qname = question.owner(&mut scratch).ok()?;
        let mut rrset = Rrset::new(*self, qname, class, Type::CNAME, Sections::ANSWER)?;

        if rr_type != Type::CNAME {
            for _ in 0..MAX_CNAME_REFERRALS {
                let cname = match rrset.rrs().next() {
                    Some(cname) => cname,
                    None => break,
                };
                if cname.rdlength() != Some(cname.rdata().len() as u16) {
                    break;
                }
                let mut scratch = NameBuf::new();
                match cname.rdata_name(0, &mut scratch) {
                    Ok(target) => match NameBuf::try_from(target) {
                        Ok(target) => rrset.name = target,
                        Err(_) => break,
                    },
                    Err(_) => break,
                }
            }
            rrset.rr_type = rr_type;
        }

        if rrset.has_rrs() {
            Some(rrset)
        } else {
            None
        }
    }

    /// Returns an iterator over the distinct RRsets in `sections`.
    pub fn rrsets(&self, sections: Sections) -> RrsetIter<'a> {
        RrsetIter {
            message: *self,
            cursors: self.cursors(sections),
            sections,
        }
    }
}

////////////////////////////////////////////////////////////////////////
// RRSET ITERATION                                                    //
////////////////////////////////////////////////////////////////////////

/// An iterator over the distinct RRsets of a message, returned by
/// [`Message::rrsets`].
///
/// Each RRset is produced once, at the position of its first record,
/// even when its records are scattered through the message. RRSIGs are
/// not RRsets of their own; they are found through [`Rrset::rrsigs`].
/// Records whose owner cannot be read are skipped.
#[derive(Clone, Debug)]
pub struct RrsetIter<'a> {
    message: Message<'a>,
    cursors: Cursors<'a>,
    sections: Sections,
}

impl<'a> Iterator for RrsetIter<'a> {
    type Item = Rrset<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        for rr in self.cursors.by_ref() {
            let rr_type = rr.rr_type();
            if rr_type == Type::RRSIG {
                continue;
            }
            let mut scratch = NameBuf::new();
            let owner = match rr.owner(&mut scratch) {
                Ok(owner) => owner,
                Err(_) => continue,
            };
            let class = rr.class();
            let seen = self
                .message
                .cursors(self.sections)
                .take_while(|earlier| earlier.index() < rr.index())
                .any(|earlier| {
                    earlier.rr_type() == rr_type
                        && earlier.class() == class
                        && earlier.owner_equals(owner)
                });
            if !seen {
                return Rrset::new(self.message, owner, class, rr_type, self.sections);
            }
        }
        None
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
