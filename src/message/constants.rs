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

//! Constants related to DNS messages.

pub const HEADER_SIZE: usize = 12;
pub const ID_START: usize = 0;
pub const TC_BYTE: usize = 2;
pub const TC_MASK: u8 = 0x02;
pub const RCODE_BYTE: usize = 3;
pub const RCODE_MASK: u8 = 0x0f;
pub const QDCOUNT_START: usize = 4;
pub const ANCOUNT_START: usize = 6;
pub const NSCOUNT_START: usize = 8;
pub const ARCOUNT_START: usize = 10;

/// A header plus the smallest possible question (root name, QTYPE and
/// QCLASS).
pub const MIN_MESSAGE_LEN: usize = HEADER_SIZE + 5;

/// Offsets relative to the first octet after an RR's owner name.
pub const TYPE_OFFSET: usize = 0;
pub const CLASS_OFFSET: usize = 2;
pub const TTL_OFFSET: usize = 4;
pub const RDLENGTH_OFFSET: usize = 8;
pub const RDATA_OFFSET: usize = 10;
pub const QUESTION_FIXED_LEN: usize = 4;

/// The RRSIG "type covered" field is the first field of its RDATA.
pub const RRSIG_TYPE_COVERED_OFFSET: usize = RDATA_OFFSET;

pub const MAX_POINTER_HOPS: usize = 256;
pub const MAX_LABEL_COPIES: usize = 256;
pub const MAX_CNAME_REFERRALS: usize = 256;

/// The maximum length of the uncompressed on-the-wire representation of
/// a domain name.
pub const MAX_WIRE_LEN: usize = 255;
