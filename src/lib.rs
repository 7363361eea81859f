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

//! Tracking of DNS resolver capabilities from RIPE Atlas measurements.
//!
//! RIPE Atlas probes query their configured resolvers for names that
//! reveal how the resolvers behave: whether they validate DNSSEC
//! signatures of each algorithm, fall back to TCP, send EDNS Client
//! Subnet options, minimize query names, rewrite NXDOMAIN answers, and
//! which root trust anchors they hold. This crate turns the measurement
//! results into per-resolver capability records and aggregate reports:
//!
//! * [`feed`] converts Atlas JSON results into packed records, the
//!   compact storage format of [`record`];
//! * [`message`] reads the DNS responses carried in those records;
//! * [`capability`] folds the responses into one
//!   [`ResolverAccumulator`](capability::ResolverAccumulator) per
//!   (probe, resolver) pair and persists them between runs;
//! * [`asn`] maps resolver addresses to autonomous systems; and
//! * [`aggregate`] counts capabilities over all resolvers, over
//!   selections of them, and per ASN.

pub mod aggregate;
pub mod asn;
pub mod capability;
pub mod class;
pub mod feed;
pub mod message;
pub mod record;
pub mod rr;
pub mod util;
