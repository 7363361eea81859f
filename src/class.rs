// Copyright 2021 Matthew Ingwersen.
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

//! The [`Class`] type for DNS classes.

use std::fmt;
use std::str::FromStr;

use crate::util::{mnemonic_of, parse_mnemonic};

/// A DNS class, as carried in questions and records.
///
/// Measurement queries are all made in [`IN`](Class::IN), and the
/// message readers match whatever class the question carries. The
/// class field of an OPT pseudo-record holds the sender's UDP payload
/// size instead, which simply shows up as an unnamed class.
#[derive(Clone, Copy, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct Class(u16);

impl Class {
    pub const IN: Self = Self(1);
    pub const CH: Self = Self(3);
    pub const HS: Self = Self(4);
    pub const NONE: Self = Self(254);
    pub const ANY: Self = Self(255);
}

const MNEMONICS: [(Class, &str); 5] = [
    (Class::IN, "IN"),
    (Class::CH, "CH"),
    (Class::HS, "HS"),
    (Class::NONE, "NONE"),
    (Class::ANY, "ANY"),
];

impl From<u16> for Class {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl From<Class> for u16 {
    fn from(class: Class) -> Self {
        class.0
    }
}

impl FromStr for Class {
    type Err = &'static str;

    /// Parses a mnemonic (in any case) or the RFC 3597 `CLASS<n>` form.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        parse_mnemonic(&MNEMONICS, "CLASS", text)
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match mnemonic_of(&MNEMONICS, *self) {
            Some(mnemonic) => f.write_str(mnemonic),
            None => write!(f, "CLASS{}", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Class;

    #[test]
    fn unnamed_classes_display_generically() {
        assert_eq!(Class::from(4096).to_string(), "CLASS4096");
        assert_eq!(Class::ANY.to_string(), "ANY");
    }

    #[test]
    fn parses_mnemonics_and_generic_forms() {
        assert_eq!("in".parse::<Class>(), Ok(Class::IN));
        assert_eq!("Ch".parse::<Class>(), Ok(Class::CH));
        assert_eq!("CLASS1".parse::<Class>(), Ok(Class::IN));
        assert_eq!("class65280".parse::<Class>().map(u16::from), Ok(65280));
        assert!("CLASSX".parse::<Class>().is_err());
        assert!("CLASS65536".parse::<Class>().is_err());
        assert!("INTERNET".parse::<Class>().is_err());
    }
}
