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

//! Mapping from RIPE Atlas measurement IDs to extractors.

use super::{extract, ResolverAccumulator};
use crate::message::Message;

/// The kinds of measurement whose results are understood.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Probe {
    /// `o-o.myaddr.l.google.com` TXT.
    WhoamiGoogle,
    /// `whoami.akamai.net` A.
    WhoamiAkamai,
    /// `<probe>.<time>.ripe-hackathon6.nlnetlabs.nl` AAAA.
    WhoamiIpv6,
    /// `secure.d2a<alg>n<n>.rootcanary.net` A, by DNSKEY slot.
    DnskeySecure(usize),
    /// `bogus.d2a<alg>n<n>.rootcanary.net` A, by DNSKEY slot.
    DnskeyBogus(usize),
    /// `secure.d<digest>a8n3.rootcanary.net` A, by DS slot.
    DsSecure(usize),
    /// `bogus.d<digest>a8n3.rootcanary.net` A, by DS slot.
    DsBogus(usize),
    /// `qnamemintest.internet.nl` TXT.
    Qnamemin,
    /// `<probe>.<time>.tc.ripe-hackathon4.nlnetlabs.nl` A.
    TcpIpv4,
    /// `<probe>.<time>.tc.ripe-hackathon6.nlnetlabs.nl` AAAA.
    TcpIpv6,
    /// `nxdomain.ripe-hackathon2.nlnetlabs.nl` A.
    Nxdomain,
    /// `root-key-sentinel-not-ta-19036.d2a8n3.rootcanary.net` A.
    NotTa19036,
    /// `root-key-sentinel-not-ta-20326.d2a8n3.rootcanary.net` A.
    NotTa20326,
    /// `root-key-sentinel-is-ta-20326.d2a8n3.rootcanary.net` A.
    IsTa20326,
}

/// The DNSKEY measurements come in secure/bogus pairs with consecutive
/// IDs, one pair per slot.
const DNSKEY_FIRST: u32 = 8926853;
const DNSKEY_LAST: u32 = DNSKEY_FIRST + 2 * 12 - 1;

impl Probe {
    /// Looks up the measurement with the given ID.
    pub fn from_msm_id(msm_id: u32) -> Option<Self> {
        let probe = match msm_id {
            8310237 => Self::WhoamiGoogle,
            8310245 => Self::WhoamiAkamai,
            8310366 => Self::WhoamiIpv6,
            DNSKEY_FIRST..=DNSKEY_LAST => {
                let offset = msm_id - DNSKEY_FIRST;
                let slot = (offset / 2) as usize;
                if offset % 2 == 0 {
                    Self::DnskeySecure(slot)
                } else {
                    Self::DnskeyBogus(slot)
                }
            }
            8926887 => Self::DsSecure(0),
            8926888 => Self::DsBogus(0),
            8926911 => Self::DsSecure(1),
            8926912 => Self::DsBogus(1),
            8310250 => Self::Qnamemin,
            8310360 => Self::TcpIpv4,
            8310364 => Self::TcpIpv6,
            8311777 => Self::Nxdomain,
            15283670 => Self::NotTa19036,
            15283671 => Self::NotTa20326,
            16430285 => Self::IsTa20326,
            _ => return None,
        };
        Some(probe)
    }

    /// Folds a response to this measurement into `acc`.
    pub fn apply(self, acc: &mut ResolverAccumulator, message: Message) {
        match self {
            Self::WhoamiGoogle => extract::whoami_google(acc, message),
            Self::WhoamiAkamai => extract::whoami_akamai(acc, message),
            Self::WhoamiIpv6 => extract::whoami_ipv6(acc, message),
            Self::DnskeySecure(slot) => extract::secure(message, acc.dnskey_signal(slot)),
            Self::DnskeyBogus(slot) => extract::bogus(message, acc.dnskey_signal(slot)),
            Self::DsSecure(slot) => extract::secure(message, acc.ds_signal(slot)),
            Self::DsBogus(slot) => extract::bogus(message, acc.ds_signal(slot)),
            Self::Qnamemin => extract::qnamemin(acc, message),
            Self::TcpIpv4 => extract::tcp_ipv4(acc, message),
            Self::TcpIpv6 => extract::tcp_ipv6(acc, message),
            Self::Nxdomain => extract::nxdomain(acc, message),
            Self::NotTa19036 => extract::not_ta_19036(acc, message),
            Self::NotTa20326 => extract::not_ta_20326(acc, message),
            Self::IsTa20326 => extract::is_ta_20326(acc, message),
        }
    }
}
