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

//! Implementation of [`Selection`] trees.

use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::counter::CapCounter;
use super::descriptor::{DESCRIPTORS, N_DESCRIPTORS};
use super::ReportSettings;
use crate::capability::{Capability, ResolverAccumulator};

/// A node of a tree of counters, each restricted to accumulators with
/// particular capability values.
///
/// The root counts everything. Below a node, there is a child for each
/// known value of each capability after the last one the node selects,
/// so every combination of up to `depth` selected values appears
/// exactly once.
#[derive(Clone, Debug)]
pub struct Selection {
    selected: [Capability; N_DESCRIPTORS],
    counter: CapCounter,
    children: Vec<Selection>,
}

impl Selection {
    /// Builds a tree with `depth` levels below the root.
    pub fn new(depth: usize) -> Self {
        Self::node([Capability::Unknown; N_DESCRIPTORS], 0, depth)
    }

    fn node(selected: [Capability; N_DESCRIPTORS], first: usize, depth: usize) -> Self {
        let mut children = Vec::new();
        if depth > 0 {
            for (index, descriptor) in DESCRIPTORS.iter().enumerate().skip(first) {
                for value in descriptor.known_values() {
                    let mut child_selected = selected;
                    child_selected[index] = value;
                    children.push(Self::node(child_selected, index + 1, depth - 1));
                }
            }
        }
        Self {
            selected,
            counter: CapCounter::new(),
            children,
        }
    }

    /// Returns the value selected for each capability, with
    /// [`Capability::Unknown`] meaning "any".
    pub fn selected(&self) -> &[Capability; N_DESCRIPTORS] {
        &self.selected
    }

    pub fn counter(&self) -> &CapCounter {
        &self.counter
    }

    pub fn children(&self) -> &[Selection] {
        &self.children
    }

    /// Returns the number of nodes in the tree.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(Selection::size).sum::<usize>()
    }

    /// Returns whether the accumulator has every selected value.
    pub fn matches(&self, acc: &ResolverAccumulator) -> bool {
        self.selected
            .iter()
            .zip(&DESCRIPTORS)
            .all(|(value, descriptor)| !value.is_known() || (descriptor.get)(acc) == *value)
    }

    /// Counts the accumulator in every node it matches.
    pub fn count(&mut self, acc: &ResolverAccumulator, asn: i32) {
        if !self.matches(acc) {
            return;
        }
        self.counter.count(acc, asn);
        for child in &mut self.children {
            child.count(acc, asn);
        }
    }

    /// Returns the report directory of this node: one directory level
    /// per selected value, named after it, below `base`.
    pub fn directory(&self, base: &Path) -> PathBuf {
        let mut path = base.to_path_buf();
        for (value, descriptor) in self.selected.iter().zip(&DESCRIPTORS) {
            if let Some(name) = descriptor.value_name(*value) {
                path.push(name);
            }
        }
        path
    }

    /// Appends a row to `report.csv` in the directory of every node of
    /// the tree. Missing directories are created, and new files start
    /// with the header.
    pub fn report(&self, base: &Path, settings: &ReportSettings) -> io::Result<()> {
        let directory = self.directory(base);
        fs::create_dir_all(&directory)?;
        let path = directory.join(REPORT_FILE_NAME);
        let mut writer = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => {
                let mut writer = BufWriter::new(file);
                CapCounter::write_header(&mut writer, settings)?;
                writer
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                BufWriter::new(OpenOptions::new().append(true).open(&path)?)
            }
            Err(err) => return Err(err),
        };
        self.counter.write_row(&mut writer, settings)?;
        writer.flush()?;

        for child in &self.children {
            child.report(base, settings)?;
        }
        Ok(())
    }
}

/// The name of the report file in each node's directory.
pub const REPORT_FILE_NAME: &str = "report.csv";
