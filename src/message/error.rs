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

//! Implementation of the [`Error`] type for message-reading errors.

use std::fmt;

/// An error signaling that part of a DNS message could not be read.
///
/// None of these are fatal to the processing of a message as a whole.
/// An RR whose owner cannot be read is skipped, and iteration carries
/// on with the next one.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    /// The message is too short to hold a header and a minimal
    /// question.
    HeaderTooShort,

    /// Decompressing a name took more than the permitted number of
    /// pointer hops or label copies.
    CompressionLoop,

    /// The decompressed name is longer than 255 octets.
    NameTooLong,

    /// We unexpectedly encountered the end of the message while reading
    /// a name.
    UnexpectedEom,

    /// A label used one of the reserved 0x40 or 0x80 label types.
    InvalidLabelType,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::HeaderTooShort => f.write_str("message too short"),
            Self::CompressionLoop => f.write_str("compression pointer loop"),
            Self::NameTooLong => f.write_str("name is longer than 255 bytes on the wire"),
            Self::UnexpectedEom => f.write_str("unexpected end of message"),
            Self::InvalidLabelType => f.write_str("invalid label type"),
        }
    }
}

impl std::error::Error for Error {}

/// The type returned by fallible message-reading functions.
pub type Result<T> = std::result::Result<T, Error>;
