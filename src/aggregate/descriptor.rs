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

//! The table of capabilities that are counted.

use crate::capability::{Capability, ResolverAccumulator};

/// Describes how one capability is read from an accumulator and how
/// its known values are named.
#[derive(Debug)]
pub struct Descriptor {
    /// Names of the values 1, 2, ... in order. A capability with one
    /// name only ever counts as known in one way.
    pub values: &'static [&'static str],
    pub get: fn(&ResolverAccumulator) -> Capability,
}

impl Descriptor {
    /// Returns the name of `value`, or `None` for [`Capability::Unknown`]
    /// and values the capability never takes.
    pub fn value_name(&self, value: Capability) -> Option<&'static str> {
        let index = value.index().checked_sub(1)?;
        self.values.get(index).copied()
    }

    /// Iterates over the known values the capability can take.
    pub fn known_values(&self) -> impl Iterator<Item = Capability> {
        (1..=self.values.len() as u8).map(Capability::from)
    }
}

/// The number of counted capabilities.
pub const N_DESCRIPTORS: usize = 22;

/// The counted capabilities, in report order.
pub static DESCRIPTORS: [Descriptor; N_DESCRIPTORS] = [
    Descriptor {
        values: &["can_ipv6"],
        get: |acc| acc.can_ipv6(),
    },
    Descriptor {
        values: &["can_tcp"],
        get: |acc| acc.tcp_ipv4,
    },
    Descriptor {
        values: &["can_tcp6"],
        get: |acc| acc.tcp_ipv6,
    },
    Descriptor {
        values: &["does_ecs"],
        get: |acc| acc.does_ecs(),
    },
    Descriptor {
        values: &["does_qnamemin", "doesnt_qnamemin"],
        get: |acc| acc.qnamemin,
    },
    Descriptor {
        values: &["does_nxdomain", "doesnt_nxdomain"],
        get: |acc| acc.nxdomain,
    },
    Descriptor {
        values: &["has_ta_19036", "hasnt_ta_19036"],
        get: |acc| acc.has_ta_19036,
    },
    Descriptor {
        values: &["has_ta_20326", "hasnt_ta_20326"],
        get: |acc| acc.has_ta_20326,
    },
    Descriptor {
        values: &["can_rsamd5", "cannot_rsamd5", "broken_rsamd5"],
        get: |acc| acc.dnskey_alg[0],
    },
    Descriptor {
        values: &["can_dsa", "cannot_dsa", "broken_dsa"],
        get: |acc| acc.dnskey_alg[1],
    },
    Descriptor {
        values: &["can_rsasha1", "cannot_rsasha1", "broken_rsasha1"],
        get: |acc| acc.dnskey_alg[2],
    },
    Descriptor {
        values: &["can_dsansec3", "cannot_dsansec3", "broken_dsansec3"],
        get: |acc| acc.dnskey_alg[3],
    },
    Descriptor {
        values: &["can_rsansec3", "cannot_rsansec3", "broken_rsansec3"],
        get: |acc| acc.dnskey_alg[4],
    },
    Descriptor {
        values: &["can_rsasha256", "cannot_rsasha256", "broken_rsasha256"],
        get: |acc| acc.dnskey_alg[5],
    },
    Descriptor {
        values: &["can_rsasha512", "cannot_rsasha512", "broken_rsasha512"],
        get: |acc| acc.dnskey_alg[6],
    },
    Descriptor {
        values: &["can_eccgost", "cannot_eccgost", "broken_eccgost"],
        get: |acc| acc.dnskey_alg[7],
    },
    Descriptor {
        values: &["can_ecdsa256", "cannot_ecdsa256", "broken_ecdsa256"],
        get: |acc| acc.dnskey_alg[8],
    },
    Descriptor {
        values: &["can_ecdsa384", "cannot_ecdsa384", "broken_ecdsa384"],
        get: |acc| acc.dnskey_alg[9],
    },
    Descriptor {
        values: &["can_ed25519", "cannot_ed25519", "broken_ed25519"],
        get: |acc| acc.dnskey_alg[10],
    },
    Descriptor {
        values: &["can_ed448", "cannot_ed448", "broken_ed448"],
        get: |acc| acc.dnskey_alg[11],
    },
    Descriptor {
        values: &["can_gost", "cannot_gost", "broken_gost"],
        get: |acc| acc.ds_alg[0],
    },
    Descriptor {
        values: &["can_sha384", "cannot_sha384", "broken_sha384"],
        get: |acc| acc.ds_alg[1],
    },
];
