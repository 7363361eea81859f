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

//! Extractors that fold one DNS response into a
//! [`ResolverAccumulator`].
//!
//! Each function implements the interpretation of one kind of
//! measurement. They never fail: a response that doesn't carry the
//! expected answer counts as evidence like any other.

use std::net::{Ipv4Addr, Ipv6Addr};

use log::warn;

use super::{Capability, DualSignal, ResolverAccumulator};
use crate::message::{Cursor, Message, Rcode, Rrset};
use crate::rr::Type;

/// The address the canary zones answer with when resolution succeeds.
pub const CANARY_ADDRESS: Ipv4Addr = Ipv4Addr::new(145, 97, 20, 17);

/// The DNSKEY slot of RSASHA256, the algorithm of the root zone.
pub const RSASHA256_SLOT: usize = 5;

/// The prefix of the TXT string in which Google's whoami service
/// reports the client subnet it received.
const ECS_PREFIX: &[u8] = b"edns0-client-subnet ";

/// TXT strings longer than this are never addresses or masks.
const MAX_TEXT_LEN: usize = 79;

////////////////////////////////////////////////////////////////////////
// DNSSEC VALIDATION                                                  //
////////////////////////////////////////////////////////////////////////

/// Applies the response to a query for a correctly signed name.
///
/// A validating resolver answers both the secure and the bogus query
/// only if it doesn't support the algorithm, and answers only the
/// secure one if it does. Failing the secure query is contradictory
/// once the bogus query has been seen.
pub fn secure(message: Message, signal: DualSignal) {
    if answers_with_canary(&message) {
        *signal.secure = Capability::Does;
        match *signal.bogus {
            Capability::DoesNot => *signal.result = Capability::Does,
            Capability::Does => *signal.result = Capability::DoesNot,
            _ => (),
        }
    } else {
        *signal.secure = Capability::DoesNot;
        if signal.bogus.is_known() {
            *signal.result = Capability::Broken;
        }
    }
}

/// Applies the response to a query for a name with a broken signature.
/// See [`secure`].
pub fn bogus(message: Message, signal: DualSignal) {
    if answers_with_canary(&message) {
        *signal.bogus = Capability::Does;
        if *signal.secure == Capability::Does {
            *signal.result = Capability::DoesNot;
        }
    } else {
        *signal.bogus = Capability::DoesNot;
        if *signal.secure == Capability::Does {
            *signal.result = Capability::Does;
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TRUST ANCHOR SENTINELS (RFC 8509)                                  //
////////////////////////////////////////////////////////////////////////

/// Applies the response to `root-key-sentinel-not-ta-19036`. Only a
/// resolver that validates RSASHA256 can be judged.
pub fn not_ta_19036(acc: &mut ResolverAccumulator, message: Message) {
    if answers_with_canary(&message) {
        acc.not_ta_19036 = Capability::Does;
        acc.has_ta_19036 = Capability::Unknown;
    } else {
        acc.not_ta_19036 = Capability::DoesNot;
        acc.has_ta_19036 = if acc.dnskey_alg[RSASHA256_SLOT] == Capability::Does {
            Capability::Does
        } else {
            Capability::Unknown
        };
    }
}

/// Applies the response to `root-key-sentinel-not-ta-20326`.
pub fn not_ta_20326(acc: &mut ResolverAccumulator, message: Message) {
    let supported = acc.has_ta_19036 == Capability::Does;
    if answers_with_canary(&message) {
        acc.not_ta_20326 = Capability::Does;
        acc.has_ta_20326 = if supported && acc.is_ta_20326 != Capability::DoesNot {
            Capability::DoesNot
        } else {
            Capability::Unknown
        };
    } else {
        acc.not_ta_20326 = Capability::DoesNot;
        acc.has_ta_20326 = if supported && acc.is_ta_20326 != Capability::Does {
            Capability::Does
        } else {
            Capability::Unknown
        };
    }
}

/// Applies the response to `root-key-sentinel-is-ta-20326`.
pub fn is_ta_20326(acc: &mut ResolverAccumulator, message: Message) {
    let supported = acc.has_ta_19036 == Capability::Does;
    if answers_with_canary(&message) {
        acc.is_ta_20326 = Capability::Does;
        acc.has_ta_20326 = if supported && acc.not_ta_20326 != Capability::Does {
            Capability::Does
        } else {
            Capability::Unknown
        };
    } else {
        acc.is_ta_20326 = Capability::DoesNot;
        acc.has_ta_20326 = if supported && acc.not_ta_20326 != Capability::DoesNot {
            Capability::DoesNot
        } else {
            Capability::Unknown
        };
    }
}

////////////////////////////////////////////////////////////////////////
// WHOAMI SERVICES                                                    //
////////////////////////////////////////////////////////////////////////

/// Applies the response to `o-o.myaddr.l.google.com` TXT, which
/// reports the resolver's address and any client subnet it sent.
///
/// The client subnet mask is filed as IPv4 when it is at most 32 and
/// as IPv6 otherwise. Both masks are reset when none is reported.
pub fn whoami_google(acc: &mut ResolverAccumulator, message: Message) {
    let mut mask = 0;
    if let Some(rrset) = answer_of_type(&message, Type::TXT) {
        for rr in rrset.rrs() {
            let rdata = match complete_rdata(&rr) {
                Some(rdata) => rdata,
                None => break,
            };
            for text in character_strings(rdata) {
                if text.len() > ECS_PREFIX.len() && text.starts_with(ECS_PREFIX) {
                    if let Some(value) = parse_ecs_mask(text) {
                        mask = value;
                    }
                } else if text.len() <= MAX_TEXT_LEN {
                    if let Ok(text) = std::str::from_utf8(text) {
                        if text.contains(':') {
                            if let Ok(address) = text.parse() {
                                acc.whoami_6 = address;
                            }
                        } else if let Ok(address) = text.parse() {
                            acc.whoami_g = address;
                        }
                    }
                }
            }
        }
    }
    if mask > 32 {
        acc.ecs_mask = 0;
        acc.ecs_mask6 = u8::try_from(mask).unwrap_or(u8::MAX);
    } else {
        acc.ecs_mask = mask as u8;
        acc.ecs_mask6 = 0;
    }
}

/// Applies the response to `whoami.akamai.net` A.
pub fn whoami_akamai(acc: &mut ResolverAccumulator, message: Message) {
    if let Some(octets) = exact_rdata::<4>(&message, Type::A) {
        acc.whoami_a = Ipv4Addr::from(octets);
    }
}

/// Applies the response to the AAAA query for a name served only over
/// IPv6, which answers with the address the query came from.
pub fn whoami_ipv6(acc: &mut ResolverAccumulator, message: Message) {
    if let Some(octets) = exact_rdata::<16>(&message, Type::AAAA) {
        acc.whoami_6 = Ipv6Addr::from(octets);
    }
}

////////////////////////////////////////////////////////////////////////
// OTHER BEHAVIOR                                                     //
////////////////////////////////////////////////////////////////////////

/// Applies the response to `qnamemintest.internet.nl` TXT.
pub fn qnamemin(acc: &mut ResolverAccumulator, message: Message) {
    let rrset = match answer_of_type(&message, Type::TXT) {
        Some(rrset) => rrset,
        None => return,
    };
    for rr in rrset.rrs() {
        let rdata = match complete_rdata(&rr) {
            Some(rdata) => rdata,
            None => break,
        };
        for text in character_strings(rdata) {
            if text.starts_with(b"HOORAY ") {
                acc.qnamemin = Capability::Does;
                break;
            } else if text.starts_with(b"NO ") {
                acc.qnamemin = Capability::DoesNot;
                break;
            }
        }
    }
}

/// Applies the response to an A query whose answer is truncated over
/// UDP, so that only resolvers falling back to TCP receive it. The
/// answer carries the resolver's address.
pub fn tcp_ipv4(acc: &mut ResolverAccumulator, message: Message) {
    match exact_rdata::<4>(&message, Type::A) {
        Some(octets) => {
            acc.tcp_ipv4 = Capability::CAN;
            acc.whoami_a = Ipv4Addr::from(octets);
        }
        None => acc.tcp_ipv4 = Capability::CANNOT,
    }
}

/// Like [`tcp_ipv4`], for an AAAA query to an IPv6-only server.
pub fn tcp_ipv6(acc: &mut ResolverAccumulator, message: Message) {
    match exact_rdata::<16>(&message, Type::AAAA) {
        Some(octets) => {
            acc.tcp_ipv6 = Capability::CAN;
            acc.whoami_6 = Ipv6Addr::from(octets);
        }
        None => acc.tcp_ipv6 = Capability::CANNOT,
    }
}

/// Applies the response to an A query for a nonexistent name. An
/// empty answer is honest; addresses in the answer are recorded as a
/// hijack.
pub fn nxdomain(acc: &mut ResolverAccumulator, message: Message) {
    let rcode = message.rcode();
    if (rcode == Rcode::NxDomain || rcode == Rcode::NoError) && message.ancount() == 0 {
        acc.nxdomain = Capability::DoesNot;
        acc.hijacked = [Ipv4Addr::UNSPECIFIED; 4];
        return;
    }
    let rrset = match answer_of_type(&message, Type::A) {
        Some(rrset) => rrset,
        None => {
            acc.nxdomain = Capability::Broken;
            return;
        }
    };

    acc.nxdomain = Capability::Does;
    let mut rrs = rrset.rrs();
    for (slot, rr) in acc.hijacked.iter_mut().zip(rrs.by_ref()) {
        if let Some(octets) = rr.rdata().get(..4) {
            *slot = Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]);
        }
    }
    if rrs.next().is_some() {
        warn!(
            "More than {} addresses in NXDOMAIN hijack by {}.",
            acc.hijacked.len(),
            acc.key
        );
    }
}

////////////////////////////////////////////////////////////////////////
// HELPERS                                                            //
////////////////////////////////////////////////////////////////////////

/// Returns the answer to a successful query if it has the given type.
fn answer_of_type<'a>(message: &Message<'a>, rr_type: Type) -> Option<Rrset<'a>> {
    if message.rcode() != Rcode::NoError {
        return None;
    }
    message.answer().filter(|rrset| rrset.rr_type() == rr_type)
}

/// Returns whether the first record of the answer is an A record for
/// [`CANARY_ADDRESS`].
fn answers_with_canary(message: &Message) -> bool {
    let rrset = match answer_of_type(message, Type::A) {
        Some(rrset) => rrset,
        None => return false,
    };
    let first = rrset.rrs().next();
    first.map_or(false, |rr| rr.rdata().starts_with(&CANARY_ADDRESS.octets()))
}

/// Returns the RDATA of the first answer record if it has exactly `N`
/// octets.
fn exact_rdata<const N: usize>(message: &Message, rr_type: Type) -> Option<[u8; N]> {
    let rr = answer_of_type(message, rr_type)?.rrs().next()?;
    <[u8; N]>::try_from(complete_rdata(&rr)?).ok()
}

/// Returns the RDATA of a record if all of it is in the message.
fn complete_rdata<'a>(rr: &Cursor<'a>) -> Option<&'a [u8]> {
    let rdata = rr.rdata();
    if rr.rdlength() == Some(rdata.len() as u16) {
        Some(rdata)
    } else {
        None
    }
}

/// Iterates over the character strings of TXT RDATA. Iteration stops
/// at a string that overruns the RDATA.
fn character_strings(rdata: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut rest = rdata;
    std::iter::from_fn(move || {
        let (&len, tail) = rest.split_first()?;
        let len = usize::from(len);
        if tail.len() < len {
            rest = &[];
            return None;
        }
        let (text, tail) = tail.split_at(len);
        rest = tail;
        Some(text)
    })
}

/// Parses the mask out of `edns0-client-subnet <prefix>/<mask>`. The
/// digits after the last slash are read the way `atoi` would, so a
/// missing mask reads as zero.
fn parse_ecs_mask(text: &[u8]) -> Option<u32> {
    let digits = match text.iter().rposition(|&octet| octet == b'/') {
        Some(slash) => &text[slash + 1..],
        None => text,
    };
    if digits.len() > MAX_TEXT_LEN {
        return None;
    }
    Some(
        digits
            .iter()
            .take_while(|octet| octet.is_ascii_digit())
            .fold(0u32, |mask, digit| {
                mask.saturating_mul(10).saturating_add(u32::from(digit - b'0'))
            }),
    )
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::ResolverKey;
    use crate::message::testing::{txt_rdata, MessageBuilder};

    const CANARY_NAME: &str = "secure.d2a8n3.rootcanary.net.";

    fn new_acc() -> ResolverAccumulator {
        ResolverAccumulator::new(ResolverKey::new(1, "192.0.2.1".parse().unwrap()))
    }

    fn canary_answer() -> Vec<u8> {
        MessageBuilder::new(CANARY_NAME, Type::A)
            .answer(CANARY_NAME, Type::A, &[145, 97, 20, 17])
            .build()
    }

    fn servfail(qtype: Type) -> Vec<u8> {
        MessageBuilder::new(CANARY_NAME, qtype)
            .rcode(Rcode::ServFail)
            .build()
    }

    fn message(octets: &[u8]) -> Message<'_> {
        Message::try_from(octets).unwrap()
    }

    #[test]
    fn validating_resolver_is_detected_in_either_order() {
        let (ok, fail) = (canary_answer(), servfail(Type::A));

        let mut acc = new_acc();
        secure(message(&ok), acc.dnskey_signal(3));
        assert_eq!(acc.dnskey_alg[3], Capability::Unknown);
        bogus(message(&fail), acc.dnskey_signal(3));
        assert_eq!(acc.dnskey_alg[3], Capability::Does);

        let mut acc = new_acc();
        bogus(message(&fail), acc.ds_signal(1));
        secure(message(&ok), acc.ds_signal(1));
        assert_eq!(acc.ds_alg[1], Capability::Does);
        assert_eq!(acc.ds_secure_reply[1], Capability::Does);
        assert_eq!(acc.ds_bogus_reply[1], Capability::DoesNot);
    }

    #[test]
    fn answering_bogus_queries_means_no_validation() {
        let ok = canary_answer();
        let mut acc = new_acc();
        secure(message(&ok), acc.dnskey_signal(0));
        bogus(message(&ok), acc.dnskey_signal(0));
        assert_eq!(acc.dnskey_alg[0], Capability::DoesNot);
    }

    #[test]
    fn failing_secure_query_after_bogus_is_broken() {
        let (ok, fail) = (canary_answer(), servfail(Type::A));
        let mut acc = new_acc();
        bogus(message(&ok), acc.dnskey_signal(7));
        secure(message(&fail), acc.dnskey_signal(7));
        assert_eq!(acc.dnskey_alg[7], Capability::Broken);
    }

    #[test]
    fn wrong_canary_address_is_a_failure() {
        let wrong = MessageBuilder::new(CANARY_NAME, Type::A)
            .answer(CANARY_NAME, Type::A, &[192, 0, 2, 1])
            .build();
        let mut acc = new_acc();
        secure(message(&wrong), acc.dnskey_signal(2));
        assert_eq!(acc.secure_reply[2], Capability::DoesNot);
    }

    #[test]
    fn trust_anchor_sentinels() {
        let (ok, fail) = (canary_answer(), servfail(Type::A));
        let mut acc = new_acc();

        // Without RSASHA256 validation nothing can be concluded.
        not_ta_19036(&mut acc, message(&fail));
        assert_eq!(acc.has_ta_19036, Capability::Unknown);

        acc.dnskey_alg[RSASHA256_SLOT] = Capability::Does;
        not_ta_19036(&mut acc, message(&fail));
        assert_eq!(acc.not_ta_19036, Capability::DoesNot);
        assert_eq!(acc.has_ta_19036, Capability::Does);

        not_ta_20326(&mut acc, message(&ok));
        assert_eq!(acc.has_ta_20326, Capability::DoesNot);
        is_ta_20326(&mut acc, message(&fail));
        assert_eq!(acc.is_ta_20326, Capability::DoesNot);
        assert_eq!(acc.has_ta_20326, Capability::DoesNot);

        // A contradicting sentinel leaves the inference open.
        is_ta_20326(&mut acc, message(&ok));
        assert_eq!(acc.has_ta_20326, Capability::Unknown);
        not_ta_20326(&mut acc, message(&fail));
        assert_eq!(acc.has_ta_20326, Capability::Unknown);
        is_ta_20326(&mut acc, message(&ok));
        assert_eq!(acc.has_ta_20326, Capability::Does);

        not_ta_19036(&mut acc, message(&ok));
        assert_eq!(acc.has_ta_19036, Capability::Unknown);
    }

    #[test]
    fn whoami_google_reads_address_and_mask() {
        let name = "o-o.myaddr.l.google.com.";
        let octets = MessageBuilder::new(name, Type::TXT)
            .answer(name, Type::TXT, &txt_rdata(&["192.0.2.53"]))
            .answer(
                name,
                Type::TXT,
                &txt_rdata(&["edns0-client-subnet 198.51.100.0/24"]),
            )
            .build();
        let mut acc = new_acc();
        whoami_google(&mut acc, message(&octets));
        assert_eq!(acc.whoami_g, Ipv4Addr::new(192, 0, 2, 53));
        assert_eq!((acc.ecs_mask, acc.ecs_mask6), (24, 0));

        let octets = MessageBuilder::new(name, Type::TXT)
            .answer(
                name,
                Type::TXT,
                &txt_rdata(&["2001:db8::53", "edns0-client-subnet 2001:db8::/56"]),
            )
            .build();
        whoami_google(&mut acc, message(&octets));
        assert_eq!(acc.whoami_6, "2001:db8::53".parse::<Ipv6Addr>().unwrap());
        assert_eq!((acc.ecs_mask, acc.ecs_mask6), (0, 56));

        // A failed query reports no subnet.
        whoami_google(&mut acc, message(&servfail(Type::TXT)));
        assert_eq!((acc.ecs_mask, acc.ecs_mask6), (0, 0));
        assert_eq!(acc.whoami_g, Ipv4Addr::new(192, 0, 2, 53));
    }

    #[test]
    fn ecs_masks_parse_like_atoi() {
        assert_eq!(parse_ecs_mask(b"edns0-client-subnet 192.0.2.0/24"), Some(24));
        assert_eq!(parse_ecs_mask(b"edns0-client-subnet 192.0.2.0/x"), Some(0));
        assert_eq!(parse_ecs_mask(b"edns0-client-subnet 192.0.2.0"), Some(0));
        assert_eq!(parse_ecs_mask(b"edns0-client-subnet ::/128"), Some(128));
    }

    #[test]
    fn whoami_akamai_and_ipv6_require_exact_rdata() {
        let name = "whoami.akamai.net.";
        let mut acc = new_acc();
        let short = MessageBuilder::new(name, Type::A)
            .answer(name, Type::A, &[192, 0, 2])
            .build();
        whoami_akamai(&mut acc, message(&short));
        assert!(acc.whoami_a.is_unspecified());

        let good = MessageBuilder::new(name, Type::A)
            .answer(name, Type::A, &[192, 0, 2, 9])
            .build();
        whoami_akamai(&mut acc, message(&good));
        assert_eq!(acc.whoami_a, Ipv4Addr::new(192, 0, 2, 9));

        let address: Ipv6Addr = "2001:db8::9".parse().unwrap();
        let v6 = MessageBuilder::new("v6.example.", Type::AAAA)
            .answer("v6.example.", Type::AAAA, &address.octets())
            .build();
        whoami_ipv6(&mut acc, message(&v6));
        assert_eq!(acc.whoami_6, address);
        assert_eq!(acc.can_ipv6(), Capability::CAN);
    }

    #[test]
    fn qnamemin_markers() {
        let name = "qnamemintest.internet.nl.";
        let mut acc = new_acc();
        let yes = MessageBuilder::new(name, Type::TXT)
            .answer(name, Type::TXT, &txt_rdata(&["HOORAY - QNAME minimisation is enabled"]))
            .build();
        qnamemin(&mut acc, message(&yes));
        assert_eq!(acc.qnamemin, Capability::Does);

        let no = MessageBuilder::new(name, Type::TXT)
            .answer(name, Type::TXT, &txt_rdata(&["NO - QNAME minimisation is NOT enabled"]))
            .build();
        qnamemin(&mut acc, message(&no));
        assert_eq!(acc.qnamemin, Capability::DoesNot);

        qnamemin(&mut acc, message(&servfail(Type::TXT)));
        assert_eq!(acc.qnamemin, Capability::DoesNot);
    }

    #[test]
    fn tcp_fallback() {
        let name = "1.1527854400.tc.ripe-hackathon4.nlnetlabs.nl.";
        let mut acc = new_acc();
        let ok = MessageBuilder::new(name, Type::A)
            .answer(name, Type::A, &[198, 51, 100, 53])
            .build();
        tcp_ipv4(&mut acc, message(&ok));
        assert_eq!(acc.tcp_ipv4, Capability::CAN);
        assert_eq!(acc.whoami_a, Ipv4Addr::new(198, 51, 100, 53));

        tcp_ipv6(&mut acc, message(&servfail(Type::AAAA)));
        assert_eq!(acc.tcp_ipv6, Capability::CANNOT);
        assert!(acc.whoami_6.is_unspecified());
    }

    #[test]
    fn nxdomain_hijacks() {
        let name = "nxdomain.ripe-hackathon2.nlnetlabs.nl.";
        let mut acc = new_acc();

        let mut builder = MessageBuilder::new(name, Type::A);
        for last in 1..=5 {
            builder = builder.answer(name, Type::A, &[203, 0, 113, last]);
        }
        nxdomain(&mut acc, message(&builder.build()));
        assert_eq!(acc.nxdomain, Capability::Does);
        assert_eq!(acc.hijacked[0], Ipv4Addr::new(203, 0, 113, 1));
        assert_eq!(acc.hijacked[3], Ipv4Addr::new(203, 0, 113, 4));

        let honest = MessageBuilder::new(name, Type::A)
            .rcode(Rcode::NxDomain)
            .build();
        nxdomain(&mut acc, message(&honest));
        assert_eq!(acc.nxdomain, Capability::DoesNot);
        assert!(acc.hijacked.iter().all(Ipv4Addr::is_unspecified));

        nxdomain(&mut acc, message(&servfail(Type::A)));
        assert_eq!(acc.nxdomain, Capability::Broken);
    }
}
