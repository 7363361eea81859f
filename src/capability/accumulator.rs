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

//! Implementation of [`ResolverAccumulator`] and its snapshot encoding.

use std::net::{Ipv4Addr, Ipv6Addr};

use chrono::NaiveDate;

use super::{Capability, ResolverKey};

////////////////////////////////////////////////////////////////////////
// ACCUMULATORS                                                       //
////////////////////////////////////////////////////////////////////////

/// Everything learned about one resolver as seen from one probe.
///
/// The DNSKEY slots are, in order, algorithms 1, 3, 5, 6, 7, 8, 10, 12,
/// 13, 14, 15 and 16. The DS slots are digest types 3 (GOST) and 4
/// (SHA-384). For each slot, the validation result is inferred from
/// the answers to a "secure" and a "bogus" query; see
/// [`extract::secure`](super::extract::secure).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolverAccumulator {
    pub key: ResolverKey,

    /// Time of the newest record applied.
    pub updated: u32,

    /// Time at which the accumulator was last written to the resolver
    /// log.
    pub logged: u32,

    /// The address reported by `o-o.myaddr.l.google.com` TXT.
    pub whoami_g: Ipv4Addr,

    /// The address reported by `whoami.akamai.net` A.
    pub whoami_a: Ipv4Addr,

    /// The IPv6 address the resolver used to reach an IPv6-only
    /// authoritative server.
    pub whoami_6: Ipv6Addr,

    pub secure_reply: [Capability; 12],
    pub bogus_reply: [Capability; 12],
    pub dnskey_alg: [Capability; 12],
    pub ds_secure_reply: [Capability; 2],
    pub ds_bogus_reply: [Capability; 2],
    pub ds_alg: [Capability; 2],

    /// Source prefix length of an IPv4 client subnet, or 0.
    pub ecs_mask: u8,

    /// Source prefix length of an IPv6 client subnet, or 0.
    pub ecs_mask6: u8,

    pub qnamemin: Capability,
    pub tcp_ipv4: Capability,
    pub tcp_ipv6: Capability,
    pub nxdomain: Capability,
    pub not_ta_19036: Capability,
    pub not_ta_20326: Capability,
    pub is_ta_20326: Capability,
    pub has_ta_19036: Capability,
    pub has_ta_20326: Capability,

    /// Addresses returned in place of NXDOMAIN.
    pub hijacked: [Ipv4Addr; 4],

    /// One more than the index of the accumulator's entry in an ASN
    /// cache, or 0 when it has none. Only meaningful within one run.
    pub asn_cache_index: u32,
}

/// Short names of the DNSKEY algorithms, by slot.
pub const DNSKEY_ALGORITHM_NAMES: [&str; 12] = [
    "rsamd5", "dsa", "rsasha1", "dsansec3", "rsansec3", "rsasha256", "rsasha512", "eccgost",
    "ecdsa256", "ecdsa384", "ed25519", "ed448",
];

/// Short names of the DS digest types, by slot.
pub const DS_DIGEST_NAMES: [&str; 2] = ["gost", "sha384"];

/// Mutable references to the three fields of a signal that is
/// inferred from a pair of secure and bogus queries.
#[derive(Debug)]
pub struct DualSignal<'r> {
    pub secure: &'r mut Capability,
    pub bogus: &'r mut Capability,
    pub result: &'r mut Capability,
}

impl ResolverAccumulator {
    /// Creates an accumulator that knows nothing yet.
    pub fn new(key: ResolverKey) -> Self {
        Self {
            key,
            updated: 0,
            logged: 0,
            whoami_g: Ipv4Addr::UNSPECIFIED,
            whoami_a: Ipv4Addr::UNSPECIFIED,
            whoami_6: Ipv6Addr::UNSPECIFIED,
            secure_reply: Default::default(),
            bogus_reply: Default::default(),
            dnskey_alg: Default::default(),
            ds_secure_reply: Default::default(),
            ds_bogus_reply: Default::default(),
            ds_alg: Default::default(),
            ecs_mask: 0,
            ecs_mask6: 0,
            qnamemin: Capability::Unknown,
            tcp_ipv4: Capability::Unknown,
            tcp_ipv6: Capability::Unknown,
            nxdomain: Capability::Unknown,
            not_ta_19036: Capability::Unknown,
            not_ta_20326: Capability::Unknown,
            is_ta_20326: Capability::Unknown,
            has_ta_19036: Capability::Unknown,
            has_ta_20326: Capability::Unknown,
            hijacked: [Ipv4Addr::UNSPECIFIED; 4],
            asn_cache_index: 0,
        }
    }

    /// Returns the signal fields for DNSKEY slot `slot`.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is not less than 12.
    pub fn dnskey_signal(&mut self, slot: usize) -> DualSignal<'_> {
        DualSignal {
            secure: &mut self.secure_reply[slot],
            bogus: &mut self.bogus_reply[slot],
            result: &mut self.dnskey_alg[slot],
        }
    }

    /// Returns the signal fields for DS slot `slot`.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is not less than 2.
    pub fn ds_signal(&mut self, slot: usize) -> DualSignal<'_> {
        DualSignal {
            secure: &mut self.ds_secure_reply[slot],
            bogus: &mut self.ds_bogus_reply[slot],
            result: &mut self.ds_alg[slot],
        }
    }

    /// A resolver can reach IPv6 authoritatives once it has been seen
    /// doing so. There is no negative evidence.
    pub fn can_ipv6(&self) -> Capability {
        if self.whoami_6.is_unspecified() {
            Capability::Unknown
        } else {
            Capability::CAN
        }
    }

    /// Whether the resolver has been seen sending an IPv4 client
    /// subnet.
    pub fn does_ecs(&self) -> Capability {
        if self.ecs_mask != 0 {
            Capability::Does
        } else {
            Capability::Unknown
        }
    }

    /// Returns whether the last update happened on `day` (UTC).
    pub fn updated_on(&self, day: NaiveDate) -> bool {
        crate::util::utc_date(self.updated) == Some(day)
    }

    /// Encodes the accumulator into its fixed-size snapshot form.
    pub fn to_bytes(&self) -> [u8; SNAPSHOT_SIZE] {
        let mut octets = [0; SNAPSHOT_SIZE];
        octets[PROBE_ID_START..PROBE_ID_START + 4].copy_from_slice(&self.key.probe_id.to_le_bytes());
        octets[ADDRESS_START..ADDRESS_START + 16].copy_from_slice(&self.key.address);
        octets[UPDATED_START..UPDATED_START + 4].copy_from_slice(&self.updated.to_le_bytes());
        octets[LOGGED_START..LOGGED_START + 4].copy_from_slice(&self.logged.to_le_bytes());
        octets[WHOAMI_G_START..WHOAMI_G_START + 4].copy_from_slice(&self.whoami_g.octets());
        octets[WHOAMI_A_START..WHOAMI_A_START + 4].copy_from_slice(&self.whoami_a.octets());
        octets[WHOAMI_6_START..WHOAMI_6_START + 16].copy_from_slice(&self.whoami_6.octets());
        put_capabilities(&mut octets[SECURE_START..], &self.secure_reply);
        put_capabilities(&mut octets[BOGUS_START..], &self.bogus_reply);
        put_capabilities(&mut octets[DNSKEY_START..], &self.dnskey_alg);
        put_capabilities(&mut octets[DS_SECURE_START..], &self.ds_secure_reply);
        put_capabilities(&mut octets[DS_BOGUS_START..], &self.ds_bogus_reply);
        put_capabilities(&mut octets[DS_ALG_START..], &self.ds_alg);
        octets[ECS_MASK_BYTE] = self.ecs_mask;
        octets[ECS_MASK6_BYTE] = self.ecs_mask6;
        put_capabilities(&mut octets[FLAGS_START..], &self.flags());
        for (index, address) in self.hijacked.iter().enumerate() {
            let start = HIJACKED_START + 4 * index;
            octets[start..start + 4].copy_from_slice(&address.octets());
        }
        octets[ASN_CACHE_START..].copy_from_slice(&self.asn_cache_index.to_le_bytes());
        octets
    }

    /// Decodes an accumulator from its snapshot form.
    pub fn from_bytes(octets: &[u8; SNAPSHOT_SIZE]) -> Self {
        let mut address = [0; 16];
        address.copy_from_slice(&octets[ADDRESS_START..ADDRESS_START + 16]);
        let mut whoami_6 = [0; 16];
        whoami_6.copy_from_slice(&octets[WHOAMI_6_START..WHOAMI_6_START + 16]);
        let mut hijacked = [Ipv4Addr::UNSPECIFIED; 4];
        for (index, address) in hijacked.iter_mut().enumerate() {
            *address = ipv4_at(octets, HIJACKED_START + 4 * index);
        }
        let flags: [Capability; N_FLAGS] = capabilities_at(octets, FLAGS_START);

        Self {
            key: ResolverKey {
                probe_id: u32_at(octets, PROBE_ID_START),
                address,
            },
            updated: u32_at(octets, UPDATED_START),
            logged: u32_at(octets, LOGGED_START),
            whoami_g: ipv4_at(octets, WHOAMI_G_START),
            whoami_a: ipv4_at(octets, WHOAMI_A_START),
            whoami_6: Ipv6Addr::from(whoami_6),
            secure_reply: capabilities_at(octets, SECURE_START),
            bogus_reply: capabilities_at(octets, BOGUS_START),
            dnskey_alg: capabilities_at(octets, DNSKEY_START),
            ds_secure_reply: capabilities_at(octets, DS_SECURE_START),
            ds_bogus_reply: capabilities_at(octets, DS_BOGUS_START),
            ds_alg: capabilities_at(octets, DS_ALG_START),
            ecs_mask: octets[ECS_MASK_BYTE],
            ecs_mask6: octets[ECS_MASK6_BYTE],
            qnamemin: flags[0],
            tcp_ipv4: flags[1],
            tcp_ipv6: flags[2],
            nxdomain: flags[3],
            not_ta_19036: flags[4],
            not_ta_20326: flags[5],
            is_ta_20326: flags[6],
            has_ta_19036: flags[7],
            has_ta_20326: flags[8],
            hijacked,
            asn_cache_index: u32_at(octets, ASN_CACHE_START),
        }
    }

    fn flags(&self) -> [Capability; N_FLAGS] {
        [
            self.qnamemin,
            self.tcp_ipv4,
            self.tcp_ipv6,
            self.nxdomain,
            self.not_ta_19036,
            self.not_ta_20326,
            self.is_ta_20326,
            self.has_ta_19036,
            self.has_ta_20326,
        ]
    }
}

////////////////////////////////////////////////////////////////////////
// SNAPSHOT LAYOUT                                                    //
////////////////////////////////////////////////////////////////////////

/// The size of an encoded accumulator. Integers are little-endian and
/// each capability takes one octet.
pub const SNAPSHOT_SIZE: usize = 128;

const PROBE_ID_START: usize = 0;
const ADDRESS_START: usize = 4;
const UPDATED_START: usize = 20;
const LOGGED_START: usize = 24;
const WHOAMI_G_START: usize = 28;
const WHOAMI_A_START: usize = 32;
const WHOAMI_6_START: usize = 36;
const SECURE_START: usize = 52;
const BOGUS_START: usize = 64;
const DNSKEY_START: usize = 76;
const DS_SECURE_START: usize = 88;
const DS_BOGUS_START: usize = 90;
const DS_ALG_START: usize = 92;
const ECS_MASK_BYTE: usize = 94;
const ECS_MASK6_BYTE: usize = 95;
const FLAGS_START: usize = 96;
const N_FLAGS: usize = 9;
const HIJACKED_START: usize = FLAGS_START + N_FLAGS;
const ASN_CACHE_START: usize = 124;

// Three reserved octets separate the hijack addresses from the cache
// index.
const _: () = assert!(HIJACKED_START + 16 + 3 == ASN_CACHE_START);
const _: () = assert!(ASN_CACHE_START + 4 == SNAPSHOT_SIZE);

fn u32_at(octets: &[u8; SNAPSHOT_SIZE], start: usize) -> u32 {
    let mut buf = [0; 4];
    buf.copy_from_slice(&octets[start..start + 4]);
    u32::from_le_bytes(buf)
}

fn ipv4_at(octets: &[u8; SNAPSHOT_SIZE], start: usize) -> Ipv4Addr {
    let mut buf = [0; 4];
    buf.copy_from_slice(&octets[start..start + 4]);
    Ipv4Addr::from(buf)
}

fn capabilities_at<const N: usize>(octets: &[u8; SNAPSHOT_SIZE], start: usize) -> [Capability; N] {
    let mut capabilities = [Capability::Unknown; N];
    for (capability, octet) in capabilities.iter_mut().zip(&octets[start..start + N]) {
        *capability = Capability::from(*octet);
    }
    capabilities
}

fn put_capabilities(octets: &mut [u8], capabilities: &[Capability]) {
    for (octet, capability) in octets.iter_mut().zip(capabilities) {
        *octet = u8::from(*capability);
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn random_capability(rng: &mut impl Rng) -> Capability {
        Capability::from(rng.gen::<u8>())
    }

    #[test]
    fn snapshot_encoding_preserves_every_field() {
        let mut rng = rand::thread_rng();
        for _ in 0..64 {
            let mut acc = ResolverAccumulator::new(ResolverKey {
                probe_id: rng.gen(),
                address: rng.gen(),
            });
            acc.updated = rng.gen();
            acc.logged = rng.gen();
            acc.whoami_g = Ipv4Addr::from(rng.gen::<u32>());
            acc.whoami_a = Ipv4Addr::from(rng.gen::<u32>());
            acc.whoami_6 = Ipv6Addr::from(rng.gen::<u128>());
            for slot in 0..12 {
                acc.secure_reply[slot] = random_capability(&mut rng);
                acc.bogus_reply[slot] = random_capability(&mut rng);
                acc.dnskey_alg[slot] = random_capability(&mut rng);
            }
            for slot in 0..2 {
                acc.ds_secure_reply[slot] = random_capability(&mut rng);
                acc.ds_bogus_reply[slot] = random_capability(&mut rng);
                acc.ds_alg[slot] = random_capability(&mut rng);
            }
            acc.ecs_mask = rng.gen();
            acc.ecs_mask6 = rng.gen();
            acc.qnamemin = random_capability(&mut rng);
            acc.tcp_ipv4 = random_capability(&mut rng);
            acc.tcp_ipv6 = random_capability(&mut rng);
            acc.nxdomain = random_capability(&mut rng);
            acc.not_ta_19036 = random_capability(&mut rng);
            acc.not_ta_20326 = random_capability(&mut rng);
            acc.is_ta_20326 = random_capability(&mut rng);
            acc.has_ta_19036 = random_capability(&mut rng);
            acc.has_ta_20326 = random_capability(&mut rng);
            for address in acc.hijacked.iter_mut() {
                *address = Ipv4Addr::from(rng.gen::<u32>());
            }
            acc.asn_cache_index = rng.gen();

            let decoded = ResolverAccumulator::from_bytes(&acc.to_bytes());
            assert_eq!(decoded, acc);
        }
    }

    #[test]
    fn snapshot_layout_is_little_endian() {
        let mut acc = ResolverAccumulator::new(ResolverKey::new(
            0x0102_0304,
            "192.0.2.1".parse().unwrap(),
        ));
        acc.updated = 0x0a0b_0c0d;
        acc.whoami_g = Ipv4Addr::new(198, 51, 100, 7);
        acc.tcp_ipv4 = Capability::CANNOT;
        let octets = acc.to_bytes();
        assert_eq!(&octets[0..4], &[4, 3, 2, 1]);
        assert_eq!(&octets[14..20], &[0xff, 0xff, 192, 0, 2, 1]);
        assert_eq!(&octets[20..24], &[0x0d, 0x0c, 0x0b, 0x0a]);
        assert_eq!(&octets[28..32], &[198, 51, 100, 7]);
        assert_eq!(octets[FLAGS_START + 1], 2);
        assert!(octets[121..].iter().all(|&octet| octet == 0));
    }

    #[test]
    fn derived_capabilities() {
        let mut acc = ResolverAccumulator::new(ResolverKey::default());
        assert_eq!(acc.can_ipv6(), Capability::Unknown);
        assert_eq!(acc.does_ecs(), Capability::Unknown);
        acc.whoami_6 = "2001:db8::53".parse().unwrap();
        acc.ecs_mask = 24;
        assert_eq!(acc.can_ipv6(), Capability::CAN);
        assert_eq!(acc.does_ecs(), Capability::Does);
    }

    #[test]
    fn updated_on_uses_utc_days() {
        let mut acc = ResolverAccumulator::new(ResolverKey::default());
        // 2018-06-01T23:59:59Z
        acc.updated = 1_527_897_599;
        assert!(acc.updated_on(NaiveDate::from_ymd_opt(2018, 6, 1).unwrap()));
        acc.updated += 1;
        assert!(acc.updated_on(NaiveDate::from_ymd_opt(2018, 6, 2).unwrap()));
    }
}
