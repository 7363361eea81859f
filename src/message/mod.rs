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

//! Zero-copy reading of on-the-wire DNS messages.
//!
//! A [`Message`] is a frame around the octets of a DNS response. A
//! [`Cursor`] walks its questions and records in order, reading fields
//! on demand; [`Rrset`] groups records by owner, class, and type; and
//! [`Message::answer`] follows CNAMEs to the answer of the question.

mod constants;
mod error;
mod name;
mod rcode;
mod reader;
mod rrset;
mod section;
#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};
pub use name::{names_equal, read_name, DisplayName, NameBuf};
pub use rcode::Rcode;
pub use reader::{Cursor, Cursors, Message};
pub use rrset::{Rrset, RrsetIter};
pub use section::{Section, Sections};
