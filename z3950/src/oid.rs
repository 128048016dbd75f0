//! Z39.50 / Bib1 Object Identifiers and Helpers

use crate::ber::{self, Packet};
use crate::error::{LocalError, LocalResult};

/// MARC21 record syntax.
///
/// <https://oid-base.com/get/1.2.840.10003.5.10>
pub const MARC21: &[u32] = &[1, 2, 840, 10003, 5, 10];

/// UNIMARC record syntax.
///
/// <https://oid-base.com/get/1.2.840.10003.5.1>
pub const UNIMARC: &[u32] = &[1, 2, 840, 10003, 5, 1];

/// SUTRS plain-text record syntax.
///
/// <https://oid-base.com/get/1.2.840.10003.5.101>
pub const SUTRS: &[u32] = &[1, 2, 840, 10003, 5, 101];

/// Bib-1 attribute set.
///
/// Content octets: `2A 86 48 CE 13 03 01`.
pub const BIB1_ATTRIBUTE_SET: &[u32] = &[1, 2, 840, 10003, 3, 1];

/// True if the identifier is the MARC21 record syntax.
pub fn is_marc21(arcs: &[u32]) -> bool {
    arcs == MARC21
}

/// True if the identifier is the UNIMARC record syntax.
pub fn is_unimarc(arcs: &[u32]) -> bool {
    arcs == UNIMARC
}

/// True if the identifier is the SUTRS record syntax.
pub fn is_sutrs(arcs: &[u32]) -> bool {
    arcs == SUTRS
}

/// Encode an arc list into OBJECT IDENTIFIER content octets.
///
/// The first two arcs pack into one octet (40 * first + second), the
/// rest follow in base-128 with continuation bits.
pub fn encode(arcs: &[u32]) -> Vec<u8> {
    let mut bytes = Vec::new();

    if arcs.len() < 2 {
        return bytes;
    }

    push_arc(&mut bytes, arcs[0] * 40 + arcs[1]);
    for arc in &arcs[2..] {
        push_arc(&mut bytes, *arc);
    }

    bytes
}

fn push_arc(bytes: &mut Vec<u8>, arc: u32) {
    let mut groups = [0u8; 5];
    let mut count = 0;
    let mut value = arc;
    loop {
        groups[count] = (value & 0x7F) as u8;
        count += 1;
        value >>= 7;
        if value == 0 {
            break;
        }
    }
    for idx in (0..count).rev() {
        let cont = if idx == 0 { 0x00 } else { 0x80 };
        bytes.push(groups[idx] | cont);
    }
}

/// Decode OBJECT IDENTIFIER content octets back into an arc list.
pub fn decode(bytes: &[u8]) -> LocalResult<Vec<u32>> {
    let mut arcs = Vec::new();
    let mut value: u32 = 0;
    let mut mid_arc = false;

    for octet in bytes {
        if value > u32::MAX >> 7 {
            return Err(LocalError::Protocol("object identifier arc too large".into()));
        }
        value = (value << 7) | (*octet & 0x7F) as u32;

        if octet & 0x80 != 0 {
            mid_arc = true;
            continue;
        }

        if arcs.is_empty() {
            // Unpack the combined leading pair.
            let first = if value < 80 { value / 40 } else { 2 };
            arcs.push(first);
            arcs.push(value - first * 40);
        } else {
            arcs.push(value);
        }
        value = 0;
        mid_arc = false;
    }

    if mid_arc {
        return Err(LocalError::Truncated);
    }

    Ok(arcs)
}

/// Wrap an arc list as a universal OBJECT IDENTIFIER packet.
pub fn to_packet(arcs: &[u32]) -> Packet {
    Packet::primitive(ber::Class::Universal, ber::TAG_OID, encode(arcs))
}
