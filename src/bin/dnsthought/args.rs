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

//! Implements command-line argument parsing.

use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::NaiveDate;
use clap::{ArgAction, Parser, Subcommand};

/// Parses the command line arguments.
pub fn parse() -> Args {
    Args::parse()
}

/// Tracks DNS resolver capabilities from RIPE Atlas measurements
#[derive(Debug, Parser)]
#[clap(author, version)]
pub struct Args {
    /// Log more (repeat for even more)
    #[clap(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Set the configuration file to use
    #[clap(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Convert Atlas JSON results to packed record files (<json>.dnst)
    Convert(ConvertArgs),

    /// Print the records of a packed record file
    Dump(DumpArgs),

    /// Sort a packed record file by time, in place
    Sort(SortArgs),

    /// Update resolver capabilities from daily measurement files
    Track(TrackArgs),

    /// Write capability reports from a resolver snapshot
    Count(CountArgs),

    /// Summarize QNAME minimization in a resolver snapshot
    Qnamemin(QnameminArgs),

    /// Build or query ASN range tables
    #[clap(subcommand)]
    Asn(AsnCommand),
}

#[derive(Debug, Parser)]
pub struct ConvertArgs {
    /// The Atlas JSON result files
    #[clap(required = true, value_name = "JSON")]
    pub inputs: Vec<PathBuf>,
}

#[derive(Debug, Parser)]
pub struct DumpArgs {
    /// The packed record file
    #[clap(value_name = "DNST")]
    pub input: PathBuf,

    /// Print payloads in base64 instead of summarizing them
    #[clap(long)]
    pub base64: bool,
}

#[derive(Debug, Parser)]
pub struct SortArgs {
    /// The packed record file
    #[clap(value_name = "DNST")]
    pub input: PathBuf,
}

#[derive(Debug, Parser)]
pub struct TrackArgs {
    /// Don't write the resolver log
    #[clap(short, long)]
    pub quiet: bool,

    /// The first day to read; <START>.res is loaded if it exists
    #[clap(value_name = "START")]
    pub start: Day,

    /// The day to stop before; <STOP>.res and <STOP>.csv are written
    #[clap(value_name = "STOP")]
    pub stop: Day,

    /// Measurement directories, each named after its measurement ID
    #[clap(required = true, value_name = "MSM_DIR")]
    pub msm_dirs: Vec<PathBuf>,
}

#[derive(Debug, Parser)]
pub struct CountArgs {
    /// The resolver snapshot, named YYYY-MM-DD.res
    #[clap(value_name = "RESFILE")]
    pub snapshot: PathBuf,

    /// The directory to write reports below
    #[clap(value_name = "OUTPUT_DIR")]
    pub out_dir: PathBuf,

    /// The ASN range table written by `asn build`
    #[clap(long, value_name = "FILE")]
    pub asn_table: PathBuf,
}

#[derive(Debug, Parser)]
pub struct QnameminArgs {
    /// The resolver snapshot, named YYYY-MM-DD.res
    #[clap(value_name = "RESFILE")]
    pub snapshot: PathBuf,

    /// The ASN range table written by `asn build`
    #[clap(long, value_name = "FILE")]
    pub asn_table: PathBuf,
}

#[derive(Debug, Subcommand)]
pub enum AsnCommand {
    /// Build range tables from prefix<TAB>mask<TAB>asn lines
    Build(AsnBuildArgs),

    /// Print the ASN owning an address (0 when none does)
    Lookup(AsnLookupArgs),
}

#[derive(Debug, Parser)]
pub struct AsnBuildArgs {
    /// The routing announcements
    #[clap(value_name = "ROUTES")]
    pub routes: PathBuf,

    /// Write the table here instead of to standard output
    #[clap(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Parser)]
pub struct AsnLookupArgs {
    /// The range table
    #[clap(value_name = "TABLE")]
    pub table: PathBuf,

    /// The addresses to look up
    #[clap(required = true, value_name = "IP")]
    pub addresses: Vec<IpAddr>,
}

/// A UTC day given on the command line as `YYYY-MM-DD`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Day(pub NaiveDate);

impl FromStr for Day {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Day)
            .map_err(|e| anyhow!("invalid day (expected YYYY-MM-DD): {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_from_str_accepts_only_iso_dates() {
        let day: Day = "2018-06-01".parse().unwrap();
        assert_eq!(day.0, NaiveDate::from_ymd_opt(2018, 6, 1).unwrap());
        assert!("2018-6-1x".parse::<Day>().is_err());
        assert!("06/01/2018".parse::<Day>().is_err());
    }

    #[test]
    fn track_arguments_parse() {
        let args = Args::try_parse_from(["dnsthought", "-v", "track", "-q", "2018-06-01", "2018-06-02", "8310237"])
            .unwrap();
        assert_eq!(args.verbose, 1);
        match args.command {
            Command::Track(track) => {
                assert!(track.quiet);
                assert_eq!(track.msm_dirs, [PathBuf::from("8310237")]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn qnamemin_needs_asn_table() {
        assert!(Args::try_parse_from(["dnsthought", "qnamemin", "2018-06-02.res"]).is_err());
        let args = Args::try_parse_from(["dnsthought", "qnamemin", "2018-06-02.res", "--asn-table", "asn.txt"])
            .unwrap();
        match args.command {
            Command::Qnamemin(qnamemin) => {
                assert_eq!(qnamemin.snapshot, PathBuf::from("2018-06-02.res"));
                assert_eq!(qnamemin.asn_table, PathBuf::from("asn.txt"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
