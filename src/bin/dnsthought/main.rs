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

//! The `dnsthought` command-line tool.

use std::process;

use anyhow::Result;
use env_logger::Env;
use log::{error, info};

mod args;
mod asn;
mod config;
mod count;
mod output;
mod records;
mod track;

use args::{Args, Command};

fn main() {
    let args = args::parse();
    let level = match args.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::init_from_env(Env::new().default_filter_or(level));

    if let Err(e) = try_running(args) {
        let mut message = String::from("Failed to run:");
        for (i, cause) in e.chain().enumerate() {
            message.push_str(&format!("\n[{}] {}", i + 1, cause));
        }
        message.push_str("\nExiting with failure.");
        error!("{}", message);
        process::exit(1);
    }
}

fn try_running(args: Args) -> Result<()> {
    info!(
        "dnsthought v{}.{}.{} starting.",
        env!("CARGO_PKG_VERSION_MAJOR"),
        env!("CARGO_PKG_VERSION_MINOR"),
        env!("CARGO_PKG_VERSION_PATCH"),
    );
    let config = config::load(args.config.as_deref())?;
    match args.command {
        Command::Convert(convert_args) => records::convert(convert_args),
        Command::Dump(dump_args) => records::dump(dump_args),
        Command::Sort(sort_args) => records::sort(sort_args),
        Command::Track(track_args) => track::track(track_args, &config.tracking),
        Command::Count(count_args) => count::count(count_args, &config.report),
        Command::Qnamemin(qnamemin_args) => count::qnamemin(qnamemin_args),
        Command::Asn(command) => asn::asn(command),
    }
}
