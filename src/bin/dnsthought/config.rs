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

//! Implements the configuration file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::Level::Debug;
use log::{debug, log_enabled};
use serde::Deserialize;

use dnsthought::aggregate::ReportSettings;
use dnsthought::capability::TrackerSettings;

////////////////////////////////////////////////////////////////////////
// CONFIGURATION LOADING                                              //
////////////////////////////////////////////////////////////////////////

/// Loads the configuration from the file given by `path`, or uses the
/// defaults if there is none.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            let raw_config = fs::read(path).context("failed to read the configuration file")?;
            toml::from_slice(&raw_config).context("failed to parse the configuration file")?
        }
        None => Config::default(),
    };
    log_config_summary(&config);
    Ok(config)
}

/// Summarizes the configuration in the log, if the debug log level is
/// enabled.
fn log_config_summary(config: &Config) {
    if !log_enabled!(Debug) {
        return;
    }
    debug!(
        "Configuration loaded:\n\
         Forget window:      {} days\n\
         Log interval:       {} s\n\
         Max backward jump:  {} s\n\
         Top ECS masks:      {}\n\
         Top ASN bands:      {} (listing up to {} ASNs)\n\
         ASN selections:     {}\n\
         Selection depth:    {}",
        config.tracking.forget_days,
        config.tracking.log_interval,
        config.tracking.max_backward_jump,
        config.report.top_ecs_masks,
        config.report.top_asn_bands,
        config.report.asn_band_listing,
        config.report.asn_selections,
        config.report.selection_depth,
    );
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION FILE STRUCTURE                                       //
////////////////////////////////////////////////////////////////////////

/// The complete configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

/// The configuration of the `track` command.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackingConfig {
    /// Resolvers not updated for this many days before the start day
    /// are dropped from the snapshot.
    #[serde(default = "default_forget_days")]
    pub forget_days: u32,
    #[serde(default = "default_log_interval")]
    pub log_interval: u32,
    #[serde(default = "default_max_backward_jump")]
    pub max_backward_jump: u32,
}

fn default_forget_days() -> u32 {
    10
}

fn default_log_interval() -> u32 {
    TrackerSettings::default().log_interval
}

fn default_max_backward_jump() -> u32 {
    TrackerSettings::default().max_backward_jump
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            forget_days: default_forget_days(),
            log_interval: default_log_interval(),
            max_backward_jump: default_max_backward_jump(),
        }
    }
}

impl From<&TrackingConfig> for TrackerSettings {
    fn from(config: &TrackingConfig) -> Self {
        Self {
            log_interval: config.log_interval,
            max_backward_jump: config.max_backward_jump,
        }
    }
}

/// The configuration of the `count` command. This mirrors
/// [`ReportSettings`], with its defaults.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportConfig {
    #[serde(default = "default_top_ecs_masks")]
    pub top_ecs_masks: usize,
    #[serde(default = "default_top_asn_bands")]
    pub top_asn_bands: usize,
    #[serde(default = "default_asn_band_listing")]
    pub asn_band_listing: usize,
    #[serde(default = "default_asn_selections")]
    pub asn_selections: usize,
    #[serde(default = "default_selection_depth")]
    pub selection_depth: usize,
}

fn default_top_ecs_masks() -> usize {
    ReportSettings::default().top_ecs_masks
}

fn default_top_asn_bands() -> usize {
    ReportSettings::default().top_asn_bands
}

fn default_asn_band_listing() -> usize {
    ReportSettings::default().asn_band_listing
}

fn default_asn_selections() -> usize {
    ReportSettings::default().asn_selections
}

fn default_selection_depth() -> usize {
    ReportSettings::default().selection_depth
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            top_ecs_masks: default_top_ecs_masks(),
            top_asn_bands: default_top_asn_bands(),
            asn_band_listing: default_asn_band_listing(),
            asn_selections: default_asn_selections(),
            selection_depth: default_selection_depth(),
        }
    }
}

impl From<&ReportConfig> for ReportSettings {
    fn from(config: &ReportConfig) -> Self {
        Self {
            top_ecs_masks: config.top_ecs_masks,
            top_asn_bands: config.top_asn_bands,
            asn_band_listing: config.asn_band_listing,
            asn_selections: config.asn_selections,
            selection_depth: config.selection_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.tracking.forget_days, 10);
        assert_eq!(TrackerSettings::from(&config.tracking), TrackerSettings::default());
        assert_eq!(ReportSettings::from(&config.report), ReportSettings::default());
    }

    #[test]
    fn sections_override_defaults() {
        let config: Config = toml::from_str(
            "[tracking]\n\
             forget_days = 3\n\
             [report]\n\
             selection_depth = 1\n\
             asn_selections = 5\n",
        )
        .unwrap();
        assert_eq!(config.tracking.forget_days, 3);
        assert_eq!(config.tracking.log_interval, 3600);
        let settings = ReportSettings::from(&config.report);
        assert_eq!(settings.selection_depth, 1);
        assert_eq!(settings.asn_selections, 5);
        assert_eq!(settings.top_asn_bands, 100);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(toml::from_str::<Config>("[tracking]\nforget = 3\n").is_err());
        assert!(toml::from_str::<Config>("[server]\n").is_err());
    }
}
