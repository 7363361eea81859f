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

//! Helpers for assembling DNS messages in tests.

use super::Rcode;
use crate::rr::Type;

/// Converts a fully qualified presentation-format name (without
/// escapes) into its uncompressed wire form.
pub fn wire_name(text: &str) -> Vec<u8> {
    let mut wire = Vec::new();
    for label in text.split('.').filter(|label| !label.is_empty()) {
        wire.push(label.len() as u8);
        wire.extend_from_slice(label.as_bytes());
    }
    wire.push(0);
    wire
}

/// Builds TXT RDATA out of character strings.
pub fn txt_rdata(strings: &[&str]) -> Vec<u8> {
    let mut rdata = Vec::new();
    for string in strings {
        rdata.push(string.len() as u8);
        rdata.extend_from_slice(string.as_bytes());
    }
    rdata
}

/// Assembles a response with one IN-class question. Names are written
/// uncompressed; records use class IN and a TTL of 300.
pub struct MessageBuilder {
    rcode: Rcode,
    question: Vec<u8>,
    sections: [Vec<u8>; 3],
    counts: [u16; 3],
}

impl MessageBuilder {
    pub fn new(qname: &str, qtype: Type) -> Self {
        let mut question = wire_name(qname);
        question.extend_from_slice(&u16::from(qtype).to_be_bytes());
        question.extend_from_slice(&[0, 1]);
        Self {
            rcode: Rcode::NoError,
            question,
            sections: Default::default(),
            counts: [0; 3],
        }
    }

    pub fn rcode(mut self, rcode: Rcode) -> Self {
        self.rcode = rcode;
        self
    }

    pub fn answer(self, owner: &str, rr_type: Type, rdata: &[u8]) -> Self {
        self.rr(0, owner, rr_type, rdata)
    }

    pub fn authority(self, owner: &str, rr_type: Type, rdata: &[u8]) -> Self {
        self.rr(1, owner, rr_type, rdata)
    }

    pub fn additional(self, owner: &str, rr_type: Type, rdata: &[u8]) -> Self {
        self.rr(2, owner, rr_type, rdata)
    }

    fn rr(mut self, section: usize, owner: &str, rr_type: Type, rdata: &[u8]) -> Self {
        let octets = &mut self.sections[section];
        octets.extend_from_slice(&wire_name(owner));
        octets.extend_from_slice(&u16::from(rr_type).to_be_bytes());
        octets.extend_from_slice(&[0, 1]);
        octets.extend_from_slice(&300u32.to_be_bytes());
        octets.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        octets.extend_from_slice(rdata);
        self.counts[section] += 1;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut octets = vec![0x12, 0x34, 0x81, 0x80 | u8::from(self.rcode), 0, 1];
        for count in self.counts {
            octets.extend_from_slice(&count.to_be_bytes());
        }
        octets.extend_from_slice(&self.question);
        for section in &self.sections {
            octets.extend_from_slice(section);
        }
        octets
    }
}
