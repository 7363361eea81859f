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

//! Message sections and sets of them.

use std::fmt;
use std::ops::BitOr;

/// The section of a DNS message a record was read from.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Section {
    Question,
    Answer,
    Authority,
    Additional,
}

impl Section {
    fn bit(self) -> u8 {
        match self {
            Self::Question => 1,
            Self::Answer => 2,
            Self::Authority => 4,
            Self::Additional => 8,
        }
    }
}

/// A set of [`Section`]s, used to restrict iteration over a message.
#[derive(Copy, Clone, Eq, Hash, PartialEq)]
pub struct Sections(u8);

impl Sections {
    pub const QUESTION: Self = Self(1);
    pub const ANSWER: Self = Self(2);
    pub const AUTHORITY: Self = Self(4);
    pub const ADDITIONAL: Self = Self(8);
    pub const ANY: Self = Self(15);
    pub const NO_QUESTION: Self = Self(14);
    pub const NO_ADDITIONAL: Self = Self(6);

    /// Returns whether `section` is a member of this set.
    pub fn contains(self, section: Section) -> bool {
        self.0 & section.bit() != 0
    }
}

impl From<Section> for Sections {
    fn from(section: Section) -> Self {
        Self(section.bit())
    }
}

impl BitOr for Sections {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for Sections {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let sections = [
            Section::Question,
            Section::Answer,
            Section::Authority,
            Section::Additional,
        ];
        f.debug_set()
            .entries(sections.iter().filter(|s| self.contains(**s)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_sets_combine() {
        let sections = Sections::ANSWER | Sections::AUTHORITY;
        assert_eq!(sections, Sections::NO_ADDITIONAL);
        assert!(sections.contains(Section::Answer));
        assert!(!sections.contains(Section::Question));
        assert!(Sections::NO_QUESTION.contains(Section::Additional));
    }
}
