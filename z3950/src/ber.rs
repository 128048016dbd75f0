//! Basic Encoding Rules tag/length/value packets.
//!
//! Every Z39.50 PDU is one top-level constructed packet.  This module
//! models packets as an owned recursive tree and provides the exact
//! byte-level encode/decode the wire requires: short and long tag
//! forms, definite lengths only (short form below 128, long form
//! otherwise), and primitive vs. constructed bodies.
//!
//! # References
//!
//! * <https://www.itu.int/rec/T-REC-X.690>
//! * <https://www.loc.gov/z3950/agency/asn1.html>

use crate::error::{LocalError, LocalResult};

use std::io::Read;

/// Tag numbers below this value use the short identifier form.
const LONG_FORM_TAG: u32 = 31;

/// Lengths below this value use the short length form.
const LONG_FORM_LENGTH: usize = 128;

const CONSTRUCTED_BIT: u8 = 0x20;

/// Universal tag for SEQUENCE / SEQUENCE OF.
pub const TAG_SEQUENCE: u32 = 16;

/// Universal tag for OCTET STRING.
pub const TAG_OCTET_STRING: u32 = 4;

/// Universal tag for OBJECT IDENTIFIER.
pub const TAG_OID: u32 = 6;

/// Universal tag for INTEGER.
pub const TAG_INTEGER: u32 = 2;

/// Universal tag for EXTERNAL.
pub const TAG_EXTERNAL: u32 = 8;

/// Universal tag for VisibleString.
pub const TAG_VISIBLE_STRING: u32 = 26;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    Universal,
    Application,
    Context,
    Private,
}

impl Class {
    fn bits(self) -> u8 {
        match self {
            Self::Universal => 0x00,
            Self::Application => 0x40,
            Self::Context => 0x80,
            Self::Private => 0xC0,
        }
    }

    fn from_bits(byte: u8) -> Self {
        match byte & 0xC0 {
            0x00 => Self::Universal,
            0x40 => Self::Application,
            0x80 => Self::Context,
            _ => Self::Private,
        }
    }
}

/// A packet either carries raw content octets or an ordered list of
/// child packets; the constructed bit on the wire follows from which.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Primitive(Vec<u8>),
    Constructed(Vec<Packet>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub class: Class,
    pub tag: u32,
    pub content: Content,
}

impl Packet {
    pub fn primitive(class: Class, tag: u32, body: Vec<u8>) -> Self {
        Packet {
            class,
            tag,
            content: Content::Primitive(body),
        }
    }

    pub fn constructed(class: Class, tag: u32, children: Vec<Packet>) -> Self {
        Packet {
            class,
            tag,
            content: Content::Constructed(children),
        }
    }

    /// Context-class primitive packet.
    pub fn context(tag: u32, body: Vec<u8>) -> Self {
        Packet::primitive(Class::Context, tag, body)
    }

    /// Context-class constructed packet.
    pub fn context_seq(tag: u32, children: Vec<Packet>) -> Self {
        Packet::constructed(Class::Context, tag, children)
    }

    /// Universal SEQUENCE.
    pub fn sequence(children: Vec<Packet>) -> Self {
        Packet::constructed(Class::Universal, TAG_SEQUENCE, children)
    }

    pub fn context_int(tag: u32, value: i64) -> Self {
        Packet::context(tag, encode_int(value))
    }

    pub fn context_bool(tag: u32, value: bool) -> Self {
        Packet::context(tag, vec![if value { 0xFF } else { 0x00 }])
    }

    pub fn context_str(tag: u32, value: &str) -> Self {
        Packet::context(tag, value.as_bytes().to_vec())
    }

    pub fn is_constructed(&self) -> bool {
        matches!(self.content, Content::Constructed(_))
    }

    /// Content octets of a primitive packet; empty for constructed.
    pub fn body(&self) -> &[u8] {
        match self.content {
            Content::Primitive(ref b) => b,
            Content::Constructed(_) => &[],
        }
    }

    /// Child packets of a constructed packet; empty for primitive.
    pub fn children(&self) -> &[Packet] {
        match self.content {
            Content::Primitive(_) => &[],
            Content::Constructed(ref c) => c,
        }
    }

    /// First child carrying the given tag number, any class.
    pub fn child(&self, tag: u32) -> Option<&Packet> {
        self.children().iter().find(|c| c.tag == tag)
    }

    /// Like [`Packet::child`], but a missing child is an error naming
    /// the field, so failures identify their position in the PDU.
    pub fn required_child(&self, tag: u32, name: &'static str) -> LocalResult<&Packet> {
        self.child(tag).ok_or(LocalError::MissingField(name))
    }

    /// Content interpreted as a BER INTEGER.
    pub fn int_value(&self) -> i64 {
        decode_int(self.body())
    }

    /// Content interpreted as a BER BOOLEAN.  Any nonzero octet is
    /// true; YAZ sends 0x01 where this codec writes 0xFF.
    pub fn bool_value(&self) -> bool {
        self.body().first().is_some_and(|b| *b != 0)
    }

    /// Content interpreted as a character string.
    pub fn str_value(&self) -> String {
        String::from_utf8_lossy(self.body()).into_owned()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        self.write_bytes(&mut bytes);
        bytes
    }

    fn write_bytes(&self, bytes: &mut Vec<u8>) {
        write_identifier(bytes, self.class, self.is_constructed(), self.tag);

        match self.content {
            Content::Primitive(ref body) => {
                write_length(bytes, body.len());
                bytes.extend_from_slice(body);
            }
            Content::Constructed(ref children) => {
                let mut body = Vec::new();
                for child in children {
                    child.write_bytes(&mut body);
                }
                write_length(bytes, body.len());
                bytes.extend_from_slice(&body);
            }
        }
    }

    /// Decode exactly one packet from the front of `bytes`, returning
    /// it along with the unconsumed remainder.
    pub fn from_bytes(bytes: &[u8]) -> LocalResult<(Packet, &[u8])> {
        let (class, constructed, tag, rest) = read_identifier(bytes)?;
        let (length, rest) = read_length(rest)?;

        if rest.len() < length {
            return Err(LocalError::Truncated);
        }

        let (body, remainder) = rest.split_at(length);

        let content = if constructed {
            let mut children = Vec::new();
            let mut inner = body;
            while !inner.is_empty() {
                let (child, next) = Packet::from_bytes(inner)?;
                children.push(child);
                inner = next;
            }
            Content::Constructed(children)
        } else {
            Content::Primitive(body.to_vec())
        };

        Ok((Packet { class, tag, content }, remainder))
    }
}

fn write_identifier(bytes: &mut Vec<u8>, class: Class, constructed: bool, tag: u32) {
    let mut lead = class.bits();
    if constructed {
        lead |= CONSTRUCTED_BIT;
    }

    if tag < LONG_FORM_TAG {
        bytes.push(lead | tag as u8);
        return;
    }

    bytes.push(lead | 0x1F);

    // Tag number in base-128, high group first, continuation bit on
    // every group but the last.
    let mut groups = [0u8; 5];
    let mut count = 0;
    let mut value = tag;
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

fn read_identifier(bytes: &[u8]) -> LocalResult<(Class, bool, u32, &[u8])> {
    let lead = *bytes.first().ok_or(LocalError::Truncated)?;
    let class = Class::from_bits(lead);
    let constructed = lead & CONSTRUCTED_BIT != 0;

    if lead & 0x1F != 0x1F {
        return Ok((class, constructed, (lead & 0x1F) as u32, &bytes[1..]));
    }

    let mut tag: u32 = 0;
    let mut idx = 1;
    loop {
        let octet = *bytes.get(idx).ok_or(LocalError::Truncated)?;
        if idx == 1 && octet == 0x80 {
            // Leading padding group.
            return Err(LocalError::MalformedTag);
        }
        if tag > u32::MAX >> 7 {
            return Err(LocalError::MalformedTag);
        }
        tag = (tag << 7) | (octet & 0x7F) as u32;
        idx += 1;
        if octet & 0x80 == 0 {
            break;
        }
    }

    if tag < LONG_FORM_TAG {
        // Long form used where short form was required.
        return Err(LocalError::MalformedTag);
    }

    Ok((class, constructed, tag, &bytes[idx..]))
}

fn write_length(bytes: &mut Vec<u8>, length: usize) {
    if length < LONG_FORM_LENGTH {
        bytes.push(length as u8);
        return;
    }

    let octets = length.to_be_bytes();
    let skip = octets.iter().take_while(|b| **b == 0).count();
    bytes.push(0x80 | (octets.len() - skip) as u8);
    bytes.extend_from_slice(&octets[skip..]);
}

fn read_length(bytes: &[u8]) -> LocalResult<(usize, &[u8])> {
    let lead = *bytes.first().ok_or(LocalError::Truncated)?;

    if lead < 0x80 {
        return Ok((lead as usize, &bytes[1..]));
    }

    if lead == 0x80 {
        return Err(LocalError::IndefiniteLength);
    }

    if lead == 0xFF {
        // Reserved by X.690.
        return Err(LocalError::MalformedLength);
    }

    let count = (lead & 0x7F) as usize;
    if count > std::mem::size_of::<usize>() {
        return Err(LocalError::MalformedLength);
    }
    if bytes.len() < 1 + count {
        return Err(LocalError::Truncated);
    }

    let mut length: usize = 0;
    for octet in &bytes[1..1 + count] {
        length = (length << 8) | *octet as usize;
    }

    Ok((length, &bytes[1 + count..]))
}

/// Read exactly one top-level packet from a byte stream, blocking
/// until the full value is available and never consuming bytes past
/// it.  Header octets are pulled one at a time; the body in a single
/// exact read.
pub fn read_packet(reader: &mut impl Read) -> LocalResult<Packet> {
    let mut header = vec![read_octet(reader)?];

    // Tag continuation octets.
    if header[0] & 0x1F == 0x1F {
        loop {
            let octet = read_octet(reader)?;
            header.push(octet);
            if octet & 0x80 == 0 {
                break;
            }
        }
    }

    // Length octets.
    let lead = read_octet(reader)?;
    header.push(lead);

    let length = if lead < 0x80 {
        lead as usize
    } else if lead == 0x80 {
        return Err(LocalError::IndefiniteLength);
    } else {
        let count = (lead & 0x7F) as usize;
        if count > std::mem::size_of::<usize>() {
            return Err(LocalError::MalformedLength);
        }
        let mut length: usize = 0;
        for _ in 0..count {
            let octet = read_octet(reader)?;
            header.push(octet);
            length = (length << 8) | octet as usize;
        }
        length
    };

    let mut buffer = header;
    let body_start = buffer.len();
    buffer.resize(body_start + length, 0);
    reader.read_exact(&mut buffer[body_start..])?;

    let (packet, remainder) = Packet::from_bytes(&buffer)?;
    if !remainder.is_empty() {
        return Err(LocalError::MalformedLength);
    }

    Ok(packet)
}

fn read_octet(reader: &mut impl Read) -> LocalResult<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Encode an INTEGER value using the minimal two's-complement form.
pub fn encode_int(value: i64) -> Vec<u8> {
    let octets = value.to_be_bytes();

    let mut start = 0;
    while start < octets.len() - 1 {
        let octet = octets[start];
        let next = octets[start + 1];
        // Drop redundant sign octets only.
        if (octet == 0x00 && next & 0x80 == 0) || (octet == 0xFF && next & 0x80 != 0) {
            start += 1;
        } else {
            break;
        }
    }

    octets[start..].to_vec()
}

/// Decode a two's-complement INTEGER.  An empty body decodes as zero.
pub fn decode_int(bytes: &[u8]) -> i64 {
    let Some(first) = bytes.first() else {
        return 0;
    };

    let mut value: i64 = if first & 0x80 != 0 { -1 } else { 0 };
    for octet in bytes {
        value = (value << 8) | *octet as i64;
    }
    value
}
