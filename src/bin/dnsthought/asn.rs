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

//! Implements the `asn` commands.

use std::fs;
use std::io::{self, Write};

use anyhow::{Context, Result};
use log::{info, warn};

use dnsthought::asn::AsnTables;

use crate::args::{AsnBuildArgs, AsnCommand, AsnLookupArgs};
use crate::output;

pub fn asn(command: AsnCommand) -> Result<()> {
    match command {
        AsnCommand::Build(args) => build(args),
        AsnCommand::Lookup(args) => lookup(args),
    }
}

/// Builds range tables from routing announcements.
fn build(args: AsnBuildArgs) -> Result<()> {
    let routes = fs::read_to_string(&args.routes)
        .with_context(|| format!("failed to read {}", args.routes.display()))?;
    let (tables, skipped) = AsnTables::from_routes(&routes);
    if skipped > 0 {
        warn!("Skipped {} routes of {}.", skipped, args.routes.display());
    }
    info!(
        "Built {} IPv4 and {} IPv6 ranges.",
        tables.v4.len(),
        tables.v6.len(),
    );
    match args.output {
        Some(ref path) => output::write_file(path, |w| tables.write_to(w)),
        None => {
            let stdout = io::stdout();
            let mut out = io::BufWriter::new(stdout.lock());
            tables.write_to(&mut out)?;
            out.flush()?;
            Ok(())
        }
    }
}

/// Prints the owner of each address.
fn lookup(args: AsnLookupArgs) -> Result<()> {
    let text = fs::read_to_string(&args.table)
        .with_context(|| format!("failed to read {}", args.table.display()))?;
    let tables =
        AsnTables::load(&text).with_context(|| format!("failed to load {}", args.table.display()))?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for address in args.addresses {
        writeln!(out, "{}\t{}", address, tables.lookup(address))?;
    }
    Ok(())
}
