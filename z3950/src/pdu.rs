//! Z39.50 Primary Data Units (i.e. Messages) and Related Types
//!
//! Each PDU is a context-class constructed packet whose tag selects
//! the message type.  The shapes here are the wire contract; encode
//! and decode must reproduce them bit for bit.
//!
//! See <https://www.loc.gov/z3950/agency/asn1.html>

use crate::ber::{self, Class, Packet};
use crate::error::{LocalError, LocalResult};
use crate::oid;
use crate::prefs::ImplementationPrefs;
use crate::rpn::QueryNode;

use std::io::Read;

pub const TAG_INITIALIZE_REQUEST: u32 = 20;
pub const TAG_INITIALIZE_RESPONSE: u32 = 21;
pub const TAG_SEARCH_REQUEST: u32 = 22;
pub const TAG_SEARCH_RESPONSE: u32 = 23;
pub const TAG_PRESENT_REQUEST: u32 = 24;
pub const TAG_PRESENT_RESPONSE: u32 = 25;
pub const TAG_DELETE_REQUEST: u32 = 30;
pub const TAG_DELETE_RESPONSE: u32 = 31;
pub const TAG_SCAN_REQUEST: u32 = 35;
pub const TAG_SCAN_RESPONSE: u32 = 36;
pub const TAG_SORT_REQUEST: u32 = 43;
pub const TAG_SORT_RESPONSE: u32 = 44;
pub const TAG_CLOSE: u32 = 48;

const TAG_REFERENCE_ID: u32 = 2;
const TAG_DATABASE_NAME: u32 = 105;
const TAG_IMPLEMENTATION_ID: u32 = 110;
const TAG_IMPLEMENTATION_NAME: u32 = 111;
const TAG_IMPLEMENTATION_VERSION: u32 = 112;
const TAG_ATTRIBUTES_PLUS_TERM: u32 = 102;
const TAG_ATTRIBUTE_LIST: u32 = 44;
const TAG_TERM: u32 = 45;
const TAG_RECORD_SYNTAX: u32 = 104;

fn push_reference_id(children: &mut Vec<Packet>, reference_id: &Option<Vec<u8>>) {
    if let Some(ref id) = reference_id {
        children.push(Packet::context(TAG_REFERENCE_ID, id.clone()));
    }
}

fn take_reference_id(packet: &Packet) -> Option<Vec<u8>> {
    packet.child(TAG_REFERENCE_ID).map(|p| p.body().to_vec())
}

fn push_impl_info(
    children: &mut Vec<Packet>,
    id: &Option<String>,
    name: &Option<String>,
    version: &Option<String>,
) {
    if let Some(v) = id {
        children.push(Packet::context_str(TAG_IMPLEMENTATION_ID, v));
    }
    if let Some(v) = name {
        children.push(Packet::context_str(TAG_IMPLEMENTATION_NAME, v));
    }
    if let Some(v) = version {
        children.push(Packet::context_str(TAG_IMPLEMENTATION_VERSION, v));
    }
}

fn opt_str(packet: &Packet, tag: u32) -> Option<String> {
    packet.child(tag).map(|p| p.str_value())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializeRequest {
    pub reference_id: Option<Vec<u8>>,
    /// BIT STRING content octets; `[0x00, 0x20]` requests version 3.
    pub protocol_version: Vec<u8>,
    /// BIT STRING content octets; `[0x00, 0xC0]` requests search and
    /// present.
    pub options: Vec<u8>,
    pub preferred_message_size: u32,
    pub exceptional_record_size: u32,
    /// Open-form idAuthentication, conventionally "user/pass".
    pub authentication: Option<String>,
    pub implementation_id: Option<String>,
    pub implementation_name: Option<String>,
    pub implementation_version: Option<String>,
}

impl Default for InitializeRequest {
    fn default() -> Self {
        let prefs = ImplementationPrefs::global();

        InitializeRequest {
            reference_id: None,
            protocol_version: vec![0x00, 0x20],
            options: vec![0x00, 0xC0],
            preferred_message_size: prefs.preferred_message_size,
            exceptional_record_size: prefs.exceptional_record_size,
            authentication: None,
            implementation_id: prefs.implementation_id.clone(),
            implementation_name: prefs.implementation_name.clone(),
            implementation_version: prefs.implementation_version.clone(),
        }
    }
}

impl InitializeRequest {
    pub fn to_packet(&self) -> Packet {
        let mut children = Vec::new();
        push_reference_id(&mut children, &self.reference_id);
        children.push(Packet::context(3, self.protocol_version.clone()));
        children.push(Packet::context(4, self.options.clone()));
        children.push(Packet::context_int(5, self.preferred_message_size as i64));
        children.push(Packet::context_int(6, self.exceptional_record_size as i64));
        if let Some(ref auth) = self.authentication {
            children.push(Packet::context_str(7, auth));
        }
        push_impl_info(
            &mut children,
            &self.implementation_id,
            &self.implementation_name,
            &self.implementation_version,
        );
        Packet::context_seq(TAG_INITIALIZE_REQUEST, children)
    }

    pub fn from_packet(packet: &Packet) -> LocalResult<Self> {
        Ok(InitializeRequest {
            reference_id: take_reference_id(packet),
            protocol_version: packet.required_child(3, "ProtocolVersion")?.body().to_vec(),
            options: packet.required_child(4, "Options")?.body().to_vec(),
            preferred_message_size: packet
                .required_child(5, "PreferredMessageSize")?
                .int_value() as u32,
            exceptional_record_size: packet
                .required_child(6, "MaximumRecordSize")?
                .int_value() as u32,
            authentication: opt_str(packet, 7),
            implementation_id: opt_str(packet, TAG_IMPLEMENTATION_ID),
            implementation_name: opt_str(packet, TAG_IMPLEMENTATION_NAME),
            implementation_version: opt_str(packet, TAG_IMPLEMENTATION_VERSION),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializeResponse {
    pub reference_id: Option<Vec<u8>>,
    pub protocol_version: Vec<u8>,
    pub options: Vec<u8>,
    pub preferred_message_size: u32,
    pub exceptional_record_size: u32,
    pub result: Option<bool>,
    pub implementation_id: Option<String>,
    pub implementation_name: Option<String>,
    pub implementation_version: Option<String>,
}

// InitializeResponse will always be a canned response.
impl Default for InitializeResponse {
    fn default() -> Self {
        let prefs = ImplementationPrefs::global();

        InitializeResponse {
            reference_id: None,
            // Versions 1 through 3.
            protocol_version: vec![0x00, 0xE0],
            options: prefs.init_options.to_bit_bytes(),
            preferred_message_size: prefs.preferred_message_size,
            exceptional_record_size: prefs.exceptional_record_size,
            result: Some(true),
            implementation_id: prefs.implementation_id.clone(),
            implementation_name: prefs.implementation_name.clone(),
            implementation_version: prefs.implementation_version.clone(),
        }
    }
}

impl InitializeResponse {
    pub fn to_packet(&self) -> Packet {
        let mut children = Vec::new();
        push_reference_id(&mut children, &self.reference_id);
        children.push(Packet::context(3, self.protocol_version.clone()));
        children.push(Packet::context(4, self.options.clone()));
        children.push(Packet::context_int(5, self.preferred_message_size as i64));
        children.push(Packet::context_int(6, self.exceptional_record_size as i64));
        if let Some(result) = self.result {
            children.push(Packet::context_bool(12, result));
        }
        push_impl_info(
            &mut children,
            &self.implementation_id,
            &self.implementation_name,
            &self.implementation_version,
        );
        Packet::context_seq(TAG_INITIALIZE_RESPONSE, children)
    }

    pub fn from_packet(packet: &Packet) -> LocalResult<Self> {
        Ok(InitializeResponse {
            reference_id: take_reference_id(packet),
            protocol_version: packet.required_child(3, "ProtocolVersion")?.body().to_vec(),
            options: packet.required_child(4, "Options")?.body().to_vec(),
            preferred_message_size: packet
                .required_child(5, "PreferredMessageSize")?
                .int_value() as u32,
            exceptional_record_size: packet
                .required_child(6, "MaximumRecordSize")?
                .int_value() as u32,
            result: packet.child(12).map(|p| p.bool_value()),
            implementation_id: opt_str(packet, TAG_IMPLEMENTATION_ID),
            implementation_name: opt_str(packet, TAG_IMPLEMENTATION_NAME),
            implementation_version: opt_str(packet, TAG_IMPLEMENTATION_VERSION),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub reference_id: Option<Vec<u8>>,
    pub small_set_upper_bound: u32,
    pub large_set_lower_bound: u32,
    pub medium_set_present_number: u32,
    pub replace_indicator: bool,
    pub result_set_name: String,
    pub database_names: Vec<String>,
    pub query: QueryNode,
}

impl SearchRequest {
    pub fn new(database: &str, query: QueryNode) -> Self {
        SearchRequest {
            reference_id: None,
            small_set_upper_bound: 0,
            large_set_lower_bound: 1,
            medium_set_present_number: 0,
            replace_indicator: true,
            result_set_name: "default".to_string(),
            database_names: vec![database.to_string()],
            query,
        }
    }

    pub fn to_packet(&self) -> Packet {
        let mut children = Vec::new();
        push_reference_id(&mut children, &self.reference_id);
        children.push(Packet::context_int(13, self.small_set_upper_bound as i64));
        children.push(Packet::context_int(14, self.large_set_lower_bound as i64));
        children.push(Packet::context_int(
            15,
            self.medium_set_present_number as i64,
        ));
        children.push(Packet::context_bool(16, self.replace_indicator));
        children.push(Packet::context_str(17, &self.result_set_name));

        let names = self
            .database_names
            .iter()
            .map(|n| Packet::context_str(TAG_DATABASE_NAME, n))
            .collect();
        children.push(Packet::context_seq(18, names));

        // Query [21] holding a Type-1 RPNQuery [1]: the Bib-1
        // attribute set identifier followed by the RPN structure.
        let rpn_query = Packet::context_seq(
            1,
            vec![oid::to_packet(oid::BIB1_ATTRIBUTE_SET), self.query.to_packet()],
        );
        children.push(Packet::context_seq(21, vec![rpn_query]));

        Packet::context_seq(TAG_SEARCH_REQUEST, children)
    }

    pub fn from_packet(packet: &Packet) -> LocalResult<Self> {
        let names = packet
            .required_child(18, "DatabaseNames")?
            .children()
            .iter()
            .filter(|c| c.tag == TAG_DATABASE_NAME)
            .map(|c| c.str_value())
            .collect();

        let query_wrapper = packet.required_child(21, "Query")?;
        let rpn_query = query_wrapper.required_child(1, "RPNQuery")?;

        // The RPN structure is the choice-tagged sibling of the
        // attribute set OID.
        let structure = rpn_query
            .children()
            .iter()
            .find(|c| c.class == Class::Context)
            .ok_or(LocalError::ExpectedOperand)?;

        Ok(SearchRequest {
            reference_id: take_reference_id(packet),
            small_set_upper_bound: packet.required_child(13, "SmallSetUpperBound")?.int_value()
                as u32,
            large_set_lower_bound: packet.required_child(14, "LargeSetLowerBound")?.int_value()
                as u32,
            medium_set_present_number: packet
                .required_child(15, "MediumSetPresentNumber")?
                .int_value() as u32,
            replace_indicator: packet.required_child(16, "ReplaceIndicator")?.bool_value(),
            result_set_name: packet.required_child(17, "ResultSetName")?.str_value(),
            database_names: names,
            query: QueryNode::from_packet(structure)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchResponse {
    pub reference_id: Option<Vec<u8>>,
    pub result_count: u32,
    pub number_of_records_returned: u32,
    pub next_result_set_position: u32,
    pub search_status: bool,
}

impl SearchResponse {
    pub fn to_packet(&self) -> Packet {
        let mut children = Vec::new();
        push_reference_id(&mut children, &self.reference_id);
        children.push(Packet::context_int(23, self.result_count as i64));
        children.push(Packet::context_int(
            24,
            self.number_of_records_returned as i64,
        ));
        children.push(Packet::context_int(
            25,
            self.next_result_set_position as i64,
        ));
        children.push(Packet::context_bool(26, self.search_status));
        Packet::context_seq(TAG_SEARCH_RESPONSE, children)
    }

    pub fn from_packet(packet: &Packet) -> LocalResult<Self> {
        Ok(SearchResponse {
            reference_id: take_reference_id(packet),
            result_count: packet.required_child(23, "ResultCount")?.int_value() as u32,
            number_of_records_returned: packet
                .required_child(24, "NumberOfRecordsReturned")?
                .int_value() as u32,
            next_result_set_position: packet
                .required_child(25, "NextResultSetPosition")?
                .int_value() as u32,
            search_status: packet.required_child(26, "SearchStatus")?.bool_value(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentRequest {
    pub reference_id: Option<Vec<u8>>,
    pub result_set_id: String,
    /// 1-based index of the first record wanted.
    pub result_set_start_point: u32,
    pub number_of_records_requested: u32,
    pub preferred_record_syntax: Option<Vec<u32>>,
}

impl PresentRequest {
    pub fn new(result_set_id: &str, start: u32, count: u32, syntax: &[u32]) -> Self {
        PresentRequest {
            reference_id: None,
            result_set_id: result_set_id.to_string(),
            result_set_start_point: start,
            number_of_records_requested: count,
            preferred_record_syntax: Some(syntax.to_vec()),
        }
    }

    pub fn to_packet(&self) -> Packet {
        let mut children = Vec::new();
        push_reference_id(&mut children, &self.reference_id);
        children.push(Packet::context_str(31, &self.result_set_id));
        children.push(Packet::context_int(30, self.result_set_start_point as i64));
        children.push(Packet::context_int(
            29,
            self.number_of_records_requested as i64,
        ));
        if let Some(ref syntax) = self.preferred_record_syntax {
            children.push(Packet::context(TAG_RECORD_SYNTAX, oid::encode(syntax)));
        }
        Packet::context_seq(TAG_PRESENT_REQUEST, children)
    }

    pub fn from_packet(packet: &Packet) -> LocalResult<Self> {
        let syntax = match packet.child(TAG_RECORD_SYNTAX) {
            Some(p) => Some(oid::decode(p.body())?),
            None => None,
        };

        Ok(PresentRequest {
            reference_id: take_reference_id(packet),
            result_set_id: packet.required_child(31, "ResultSetId")?.str_value(),
            result_set_start_point: packet.required_child(30, "ResultSetStartPoint")?.int_value()
                as u32,
            number_of_records_requested: packet
                .required_child(29, "NumberOfRecordsRequested")?
                .int_value() as u32,
            preferred_record_syntax: syntax,
        })
    }
}

/// One database record inside a PresentResponse.
///
/// On the wire each record rides in an EXTERNAL wrapper carrying the
/// record syntax OID and the octet-aligned payload; a bare OCTET
/// STRING payload is also accepted on decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbRecord {
    pub syntax: Option<Vec<u32>>,
    pub data: Vec<u8>,
}

impl DbRecord {
    pub fn new(syntax: &[u32], data: Vec<u8>) -> Self {
        DbRecord {
            syntax: Some(syntax.to_vec()),
            data,
        }
    }

    fn to_packet(&self) -> Packet {
        let payload = match self.syntax {
            Some(ref syntax) => {
                // EXTERNAL { direct-reference OID, octet-aligned [1] }
                Packet::constructed(
                    Class::Universal,
                    ber::TAG_EXTERNAL,
                    vec![
                        oid::to_packet(syntax),
                        Packet::context(1, self.data.clone()),
                    ],
                )
            }
            None => Packet::primitive(
                Class::Universal,
                ber::TAG_OCTET_STRING,
                self.data.clone(),
            ),
        };

        // Record SEQUENCE { DatabaseRecord [1] { payload } }
        Packet::sequence(vec![Packet::context_seq(1, vec![payload])])
    }

    fn from_packet(packet: &Packet) -> LocalResult<Self> {
        let wrapper = packet.required_child(1, "DatabaseRecord")?;

        for child in wrapper.children() {
            if child.class != Class::Universal {
                continue;
            }
            if child.tag == ber::TAG_OCTET_STRING {
                return Ok(DbRecord {
                    syntax: None,
                    data: child.body().to_vec(),
                });
            }
            if child.tag == ber::TAG_EXTERNAL {
                let syntax = match child.child(ber::TAG_OID) {
                    Some(p) => Some(oid::decode(p.body())?),
                    None => None,
                };
                // Octet-aligned [1], with a universal OCTET STRING
                // fallback for origins that skip the context tag.
                let data = child
                    .children()
                    .iter()
                    .find(|c| {
                        (c.class == Class::Context && c.tag == 1)
                            || (c.class == Class::Universal && c.tag == ber::TAG_OCTET_STRING)
                    })
                    .map(|c| c.body().to_vec())
                    .ok_or(LocalError::MissingField("OctetAligned"))?;

                return Ok(DbRecord { syntax, data });
            }
        }

        Err(LocalError::MissingField("RecordPayload"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PresentResponse {
    pub reference_id: Option<Vec<u8>>,
    pub number_of_records_returned: u32,
    pub next_result_set_position: u32,
    pub present_status: u32,
    pub records: Vec<DbRecord>,
}

impl PresentResponse {
    pub fn to_packet(&self) -> Packet {
        let mut children = Vec::new();
        push_reference_id(&mut children, &self.reference_id);
        children.push(Packet::context_int(
            29,
            self.number_of_records_returned as i64,
        ));
        children.push(Packet::context_int(
            30,
            self.next_result_set_position as i64,
        ));
        children.push(Packet::context_int(27, self.present_status as i64));
        if !self.records.is_empty() {
            let records = self.records.iter().map(|r| r.to_packet()).collect();
            children.push(Packet::context_seq(28, records));
        }
        Packet::context_seq(TAG_PRESENT_RESPONSE, children)
    }

    pub fn from_packet(packet: &Packet) -> LocalResult<Self> {
        let mut records = Vec::new();
        if let Some(wrapper) = packet.child(28) {
            for child in wrapper.children() {
                records.push(DbRecord::from_packet(child)?);
            }
        }

        Ok(PresentResponse {
            reference_id: take_reference_id(packet),
            number_of_records_returned: packet
                .required_child(29, "NumberOfRecordsReturned")?
                .int_value() as u32,
            next_result_set_position: packet
                .required_child(30, "NextResultSetPosition")?
                .int_value() as u32,
            present_status: packet.required_child(27, "PresentStatus")?.int_value() as u32,
            records,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub reference_id: Option<Vec<u8>>,
    pub database_names: Vec<String>,
    /// Attribute (type, value) pairs qualifying the start term.
    pub attributes: Vec<(u32, u32)>,
    pub start_term: String,
    pub number_of_terms_requested: u32,
    pub step_size: u32,
    pub position_of_term: u32,
}

impl ScanRequest {
    pub fn new(database: &str, start_term: &str, use_attribute: u16, count: u32) -> Self {
        ScanRequest {
            reference_id: None,
            database_names: vec![database.to_string()],
            attributes: vec![(1, use_attribute as u32)],
            start_term: start_term.to_string(),
            number_of_terms_requested: count,
            step_size: 0,
            position_of_term: 1,
        }
    }

    pub fn to_packet(&self) -> Packet {
        let mut children = Vec::new();
        push_reference_id(&mut children, &self.reference_id);

        let names = self
            .database_names
            .iter()
            .map(|n| Packet::context_str(TAG_DATABASE_NAME, n))
            .collect();
        children.push(Packet::context_seq(3, names));

        let elements = self
            .attributes
            .iter()
            .map(|(attr_type, attr_value)| {
                Packet::sequence(vec![
                    Packet::context_int(120, *attr_type as i64),
                    Packet::context_int(121, *attr_value as i64),
                ])
            })
            .collect();
        children.push(Packet::context_seq(
            TAG_ATTRIBUTES_PLUS_TERM,
            vec![
                Packet::context_seq(TAG_ATTRIBUTE_LIST, elements),
                Packet::context_str(TAG_TERM, &self.start_term),
            ],
        ));

        children.push(Packet::context_int(
            31,
            self.number_of_terms_requested as i64,
        ));
        children.push(Packet::context_int(32, self.step_size as i64));
        children.push(Packet::context_int(33, self.position_of_term as i64));

        Packet::context_seq(TAG_SCAN_REQUEST, children)
    }

    pub fn from_packet(packet: &Packet) -> LocalResult<Self> {
        let names = packet
            .required_child(3, "DatabaseNames")?
            .children()
            .iter()
            .filter(|c| c.tag == TAG_DATABASE_NAME)
            .map(|c| c.str_value())
            .collect();

        let attr_term = packet.required_child(TAG_ATTRIBUTES_PLUS_TERM, "AttributesPlusTerm")?;
        let start_term = attr_term
            .child(TAG_TERM)
            .ok_or(LocalError::MissingTerm)?
            .str_value();

        let mut attributes = Vec::new();
        if let Some(list) = attr_term.child(TAG_ATTRIBUTE_LIST) {
            for element in list.children() {
                let attr_type = element.child(120).map(|p| p.int_value()).unwrap_or(1);
                if let Some(value) = element.child(121) {
                    attributes.push((attr_type as u32, value.int_value() as u32));
                }
            }
        }

        Ok(ScanRequest {
            reference_id: take_reference_id(packet),
            database_names: names,
            attributes,
            start_term,
            number_of_terms_requested: packet
                .required_child(31, "NumberOfTerms")?
                .int_value() as u32,
            step_size: packet.child(32).map(|p| p.int_value()).unwrap_or(0) as u32,
            position_of_term: packet.child(33).map(|p| p.int_value()).unwrap_or(1) as u32,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermInfo {
    pub term: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanResponse {
    pub reference_id: Option<Vec<u8>>,
    pub step_size: u32,
    /// 0 = success, 6 = failure, per the scan status enumeration.
    pub scan_status: u32,
    pub entries: Vec<TermInfo>,
}

impl ScanResponse {
    pub fn to_packet(&self) -> Packet {
        let mut children = Vec::new();
        push_reference_id(&mut children, &self.reference_id);
        children.push(Packet::context_int(3, self.step_size as i64));
        children.push(Packet::context_int(4, self.scan_status as i64));
        children.push(Packet::context_int(5, self.entries.len() as i64));

        let entries = self
            .entries
            .iter()
            .map(|e| {
                Packet::context_seq(
                    1,
                    vec![
                        Packet::context_str(TAG_TERM, &e.term),
                        Packet::context_int(2, e.count as i64),
                    ],
                )
            })
            .collect();
        children.push(Packet::context_seq(7, entries));

        Packet::context_seq(TAG_SCAN_RESPONSE, children)
    }

    pub fn from_packet(packet: &Packet) -> LocalResult<Self> {
        let mut entries = Vec::new();
        if let Some(wrapper) = packet.child(7) {
            for child in wrapper.children() {
                let term = child
                    .child(TAG_TERM)
                    .ok_or(LocalError::MissingTerm)?
                    .str_value();
                let count = child.child(2).map(|p| p.int_value()).unwrap_or(0) as u64;
                entries.push(TermInfo { term, count });
            }
        }

        Ok(ScanResponse {
            reference_id: take_reference_id(packet),
            step_size: packet.child(3).map(|p| p.int_value()).unwrap_or(0) as u32,
            scan_status: packet.child(4).map(|p| p.int_value()).unwrap_or(0) as u32,
            entries,
        })
    }
}

/// One sort key: Bib-1 sort attributes plus a direction.
///
/// The relation rides as `sortRelation [1] INTEGER` (0 ascending, 1
/// descending) inside the key SEQUENCE.  Decoding also accepts the
/// relation as a bare universal INTEGER, a second form seen on the
/// wire from older origins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKeySpec {
    pub attribute: u16,
    pub descending: bool,
}

impl SortKeySpec {
    fn to_packet(&self) -> Packet {
        // SortElement generic [1] -> sortAttributes [2]
        let attributes = Packet::context_seq(
            2,
            vec![
                oid::to_packet(oid::BIB1_ATTRIBUTE_SET),
                Packet::context_seq(
                    TAG_ATTRIBUTE_LIST,
                    vec![Packet::sequence(vec![
                        Packet::context_int(120, 1),
                        Packet::context_int(121, self.attribute as i64),
                    ])],
                ),
            ],
        );

        Packet::sequence(vec![
            Packet::context_seq(1, vec![attributes]),
            Packet::context_int(1, if self.descending { 1 } else { 0 }),
        ])
    }

    fn from_packet(packet: &Packet) -> LocalResult<Self> {
        let mut attribute: u16 = 0;
        let mut descending = false;

        for child in packet.children() {
            match (child.class, child.tag, child.is_constructed()) {
                (Class::Context, 1, true) => {
                    // SortElement: dig out the first Use value.
                    if let Some(attrs) = child.child(2) {
                        if let Some(list) = attrs.child(TAG_ATTRIBUTE_LIST) {
                            for element in list.children() {
                                if let Some(value) = element.child(121) {
                                    attribute = value.int_value() as u16;
                                    break;
                                }
                            }
                        }
                    }
                }
                (Class::Context, 1, false) => descending = child.int_value() == 1,
                (Class::Universal, ber::TAG_INTEGER, false) => {
                    descending = child.int_value() == 1
                }
                _ => {}
            }
        }

        Ok(SortKeySpec {
            attribute,
            descending,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SortRequest {
    pub reference_id: Option<Vec<u8>>,
    pub input_result_set_names: Vec<String>,
    pub sorted_result_set_name: String,
    pub sort_keys: Vec<SortKeySpec>,
}

impl SortRequest {
    pub fn to_packet(&self) -> Packet {
        let mut children = Vec::new();
        push_reference_id(&mut children, &self.reference_id);

        let names = self
            .input_result_set_names
            .iter()
            .map(|n| {
                Packet::primitive(
                    Class::Universal,
                    ber::TAG_VISIBLE_STRING,
                    n.as_bytes().to_vec(),
                )
            })
            .collect();
        children.push(Packet::context_seq(3, names));
        children.push(Packet::context_str(4, &self.sorted_result_set_name));

        let keys = self.sort_keys.iter().map(|k| k.to_packet()).collect();
        children.push(Packet::context_seq(5, keys));

        Packet::context_seq(TAG_SORT_REQUEST, children)
    }

    pub fn from_packet(packet: &Packet) -> LocalResult<Self> {
        let names = packet
            .required_child(3, "InputResultSetNames")?
            .children()
            .iter()
            .map(|c| c.str_value())
            .collect();

        let mut sort_keys = Vec::new();
        if let Some(wrapper) = packet.child(5) {
            for child in wrapper.children() {
                sort_keys.push(SortKeySpec::from_packet(child)?);
            }
        }

        Ok(SortRequest {
            reference_id: take_reference_id(packet),
            input_result_set_names: names,
            sorted_result_set_name: packet
                .required_child(4, "SortedResultSetName")?
                .str_value(),
            sort_keys,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SortResponse {
    pub reference_id: Option<Vec<u8>>,
    /// 0 = success, 1 = partial, 2 = failure.
    pub sort_status: u32,
}

impl SortResponse {
    pub fn to_packet(&self) -> Packet {
        let mut children = Vec::new();
        push_reference_id(&mut children, &self.reference_id);
        children.push(Packet::context_int(3, self.sort_status as i64));
        Packet::context_seq(TAG_SORT_RESPONSE, children)
    }

    pub fn from_packet(packet: &Packet) -> LocalResult<Self> {
        Ok(SortResponse {
            reference_id: take_reference_id(packet),
            sort_status: packet.required_child(3, "SortStatus")?.int_value() as u32,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeleteResultSetRequest {
    pub reference_id: Option<Vec<u8>>,
    /// 0 = delete the listed sets, 1 = delete all.
    pub delete_function: u32,
    pub result_set_ids: Vec<String>,
}

impl DeleteResultSetRequest {
    pub fn to_packet(&self) -> Packet {
        let mut children = Vec::new();
        push_reference_id(&mut children, &self.reference_id);
        children.push(Packet::context_int(32, self.delete_function as i64));
        for id in &self.result_set_ids {
            children.push(Packet::context_str(31, id));
        }
        Packet::context_seq(TAG_DELETE_REQUEST, children)
    }

    pub fn from_packet(packet: &Packet) -> LocalResult<Self> {
        let ids = packet
            .children()
            .iter()
            .filter(|c| c.tag == 31)
            .map(|c| c.str_value())
            .collect();

        Ok(DeleteResultSetRequest {
            reference_id: take_reference_id(packet),
            delete_function: packet.child(32).map(|p| p.int_value()).unwrap_or(0) as u32,
            result_set_ids: ids,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeleteResultSetResponse {
    pub reference_id: Option<Vec<u8>>,
    /// 0 = success.
    pub delete_operation_status: u32,
}

impl DeleteResultSetResponse {
    pub fn to_packet(&self) -> Packet {
        let mut children = Vec::new();
        push_reference_id(&mut children, &self.reference_id);
        children.push(Packet::context_int(0, self.delete_operation_status as i64));
        Packet::context_seq(TAG_DELETE_RESPONSE, children)
    }

    pub fn from_packet(packet: &Packet) -> LocalResult<Self> {
        Ok(DeleteResultSetResponse {
            reference_id: take_reference_id(packet),
            delete_operation_status: packet
                .required_child(0, "DeleteOperationStatus")?
                .int_value() as u32,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CloseReason {
    #[default]
    Finished,
    Shutdown,
    SystemProblem,
    CostLimit,
    Resources,
    SecurityViolation,
    ProtocolError,
    LackOfActivity,
    PeerAbort,
    Unspecified,
}

impl CloseReason {
    pub fn code(self) -> i64 {
        match self {
            Self::Finished => 0,
            Self::Shutdown => 1,
            Self::SystemProblem => 2,
            Self::CostLimit => 3,
            Self::Resources => 4,
            Self::SecurityViolation => 5,
            Self::ProtocolError => 6,
            Self::LackOfActivity => 7,
            Self::PeerAbort => 8,
            Self::Unspecified => 9,
        }
    }

    pub fn from_code(code: i64) -> CloseReason {
        match code {
            0 => Self::Finished,
            1 => Self::Shutdown,
            2 => Self::SystemProblem,
            3 => Self::CostLimit,
            4 => Self::Resources,
            5 => Self::SecurityViolation,
            6 => Self::ProtocolError,
            7 => Self::LackOfActivity,
            8 => Self::PeerAbort,
            _ => Self::Unspecified,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Close {
    pub reference_id: Option<Vec<u8>>,
    pub close_reason: CloseReason,
    pub diagnostic_information: Option<String>,
}

impl Close {
    pub fn to_packet(&self) -> Packet {
        let mut children = Vec::new();
        push_reference_id(&mut children, &self.reference_id);
        children.push(Packet::context_int(211, self.close_reason.code()));
        if let Some(ref diag) = self.diagnostic_information {
            children.push(Packet::context_str(3, diag));
        }
        Packet::context_seq(TAG_CLOSE, children)
    }

    pub fn from_packet(packet: &Packet) -> LocalResult<Self> {
        Ok(Close {
            reference_id: take_reference_id(packet),
            close_reason: CloseReason::from_code(
                packet.required_child(211, "CloseReason")?.int_value(),
            ),
            diagnostic_information: opt_str(packet, 3),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePayload {
    InitializeRequest(InitializeRequest),
    InitializeResponse(InitializeResponse),
    SearchRequest(SearchRequest),
    SearchResponse(SearchResponse),
    PresentRequest(PresentRequest),
    PresentResponse(PresentResponse),
    DeleteResultSetRequest(DeleteResultSetRequest),
    DeleteResultSetResponse(DeleteResultSetResponse),
    ScanRequest(ScanRequest),
    ScanResponse(ScanResponse),
    SortRequest(SortRequest),
    SortResponse(SortResponse),
    Close(Close),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub payload: MessagePayload,
}

impl Message {
    pub fn from_payload(payload: MessagePayload) -> Self {
        Message { payload }
    }

    pub fn payload(&self) -> &MessagePayload {
        &self.payload
    }

    /// Parses a collection of bytes into a Message.
    ///
    /// Returns None if more bytes are needed to complete the message.
    pub fn from_bytes(bytes: &[u8]) -> LocalResult<Option<Self>> {
        if bytes.is_empty() {
            return Ok(None);
        }

        let (packet, _remainder) = match Packet::from_bytes(bytes) {
            Ok(parts) => parts,
            Err(LocalError::Truncated) => return Ok(None),
            Err(e) => return Err(e),
        };

        Ok(Some(Self::from_packet(&packet)?))
    }

    /// Read exactly one message from a byte stream, blocking until a
    /// whole PDU arrives.
    pub fn read(reader: &mut impl Read) -> LocalResult<Self> {
        let packet = ber::read_packet(reader)?;
        Self::from_packet(&packet)
    }

    pub fn from_packet(packet: &Packet) -> LocalResult<Self> {
        if packet.class != Class::Context {
            return Err(LocalError::Protocol(format!(
                "not a PDU: class {:?} tag {}",
                packet.class, packet.tag
            )));
        }

        let payload = match packet.tag {
            TAG_INITIALIZE_REQUEST => {
                MessagePayload::InitializeRequest(InitializeRequest::from_packet(packet)?)
            }
            TAG_INITIALIZE_RESPONSE => {
                MessagePayload::InitializeResponse(InitializeResponse::from_packet(packet)?)
            }
            TAG_SEARCH_REQUEST => {
                MessagePayload::SearchRequest(SearchRequest::from_packet(packet)?)
            }
            TAG_SEARCH_RESPONSE => {
                MessagePayload::SearchResponse(SearchResponse::from_packet(packet)?)
            }
            TAG_PRESENT_REQUEST => {
                MessagePayload::PresentRequest(PresentRequest::from_packet(packet)?)
            }
            TAG_PRESENT_RESPONSE => {
                MessagePayload::PresentResponse(PresentResponse::from_packet(packet)?)
            }
            TAG_DELETE_REQUEST => MessagePayload::DeleteResultSetRequest(
                DeleteResultSetRequest::from_packet(packet)?,
            ),
            TAG_DELETE_RESPONSE => MessagePayload::DeleteResultSetResponse(
                DeleteResultSetResponse::from_packet(packet)?,
            ),
            TAG_SCAN_REQUEST => MessagePayload::ScanRequest(ScanRequest::from_packet(packet)?),
            TAG_SCAN_RESPONSE => MessagePayload::ScanResponse(ScanResponse::from_packet(packet)?),
            TAG_SORT_REQUEST => MessagePayload::SortRequest(SortRequest::from_packet(packet)?),
            TAG_SORT_RESPONSE => MessagePayload::SortResponse(SortResponse::from_packet(packet)?),
            TAG_CLOSE => MessagePayload::Close(Close::from_packet(packet)?),
            tag => {
                return Err(LocalError::Protocol(format!(
                    "cannot handle message with tag {tag}"
                )))
            }
        };

        Ok(Message { payload })
    }

    pub fn to_packet(&self) -> Packet {
        match self.payload {
            MessagePayload::InitializeRequest(ref m) => m.to_packet(),
            MessagePayload::InitializeResponse(ref m) => m.to_packet(),
            MessagePayload::SearchRequest(ref m) => m.to_packet(),
            MessagePayload::SearchResponse(ref m) => m.to_packet(),
            MessagePayload::PresentRequest(ref m) => m.to_packet(),
            MessagePayload::PresentResponse(ref m) => m.to_packet(),
            MessagePayload::DeleteResultSetRequest(ref m) => m.to_packet(),
            MessagePayload::DeleteResultSetResponse(ref m) => m.to_packet(),
            MessagePayload::ScanRequest(ref m) => m.to_packet(),
            MessagePayload::ScanResponse(ref m) => m.to_packet(),
            MessagePayload::SortRequest(ref m) => m.to_packet(),
            MessagePayload::SortResponse(ref m) => m.to_packet(),
            MessagePayload::Close(ref m) => m.to_packet(),
        }
    }

    /// Translate a message into a collection of bytes suitable for
    /// dropping onto the wire.
    pub fn to_bytes(&self) -> LocalResult<Vec<u8>> {
        Ok(self.to_packet().to_bytes())
    }
}
