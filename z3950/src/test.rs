use crate::ber::{self, Class, Packet};
use crate::oid;
use crate::pdu::*;
use crate::rpn::{Operator, QueryNode};

use std::io::Cursor;

// Print a list of bytes as hex values.
#[allow(dead_code)]
fn hexdump(bytes: &[u8]) {
    println!(
        "\n{}\n",
        bytes
            .iter()
            .map(|b| format!("{b:#04x?}"))
            .collect::<Vec<String>>()
            .join(", ")
    );
}

#[test]
fn test_ber_round_trip() {
    let packet = Packet::context_seq(
        21,
        vec![
            Packet::context_int(5, 1048576),
            Packet::context_bool(12, true),
            Packet::sequence(vec![Packet::context_str(105, "books")]),
        ],
    );

    let bytes = packet.to_bytes();
    let (parsed, remainder) = Packet::from_bytes(&bytes).unwrap();

    assert!(remainder.is_empty());
    assert_eq!(packet, parsed);
    assert_eq!(bytes, parsed.to_bytes());
}

#[test]
fn test_ber_long_form_length() {
    // 200 content bytes forces the two-octet length form.
    let packet = Packet::context(1, vec![0x41; 200]);
    let bytes = packet.to_bytes();

    assert_eq!(&bytes[0..3], &[0x81, 0x81, 0xC8]);

    let (parsed, remainder) = Packet::from_bytes(&bytes).unwrap();
    assert!(remainder.is_empty());
    assert_eq!(packet, parsed);
}

#[test]
fn test_ber_long_form_tag() {
    // Tag 211 (Close reason) takes two identifier octets.
    let packet = Packet::context_int(211, 0);
    assert_eq!(packet.to_bytes(), vec![0x9F, 0x81, 0x53, 0x01, 0x00]);

    let (parsed, _) = Packet::from_bytes(&packet.to_bytes()).unwrap();
    assert_eq!(parsed.tag, 211);
}

#[test]
fn test_ber_rejects_indefinite_length() {
    let bytes = [0x30, 0x80, 0x00, 0x00];
    assert_eq!(
        Packet::from_bytes(&bytes).unwrap_err(),
        crate::error::LocalError::IndefiniteLength
    );
}

#[test]
fn test_ber_truncated() {
    let packet = Packet::context(4, b"truncate me".to_vec());
    let bytes = packet.to_bytes();

    for end in 0..bytes.len() {
        assert_eq!(
            Packet::from_bytes(&bytes[0..end]).unwrap_err(),
            crate::error::LocalError::Truncated,
            "prefix of {end} bytes should be truncated"
        );
    }
}

#[test]
fn test_read_packet_does_not_over_read() {
    let first = Packet::context_int(23, 3).to_bytes();
    let second = Packet::context_str(17, "default").to_bytes();

    let mut stream = Vec::new();
    stream.extend_from_slice(&first);
    stream.extend_from_slice(&second);

    let mut cursor = Cursor::new(stream);

    let one = ber::read_packet(&mut cursor).unwrap();
    assert_eq!(one.int_value(), 3);

    let two = ber::read_packet(&mut cursor).unwrap();
    assert_eq!(two.str_value(), "default");

    assert!(ber::read_packet(&mut cursor).is_err());
}

#[test]
fn test_int_encoding() {
    assert_eq!(ber::encode_int(0), vec![0x00]);
    assert_eq!(ber::encode_int(127), vec![0x7F]);
    assert_eq!(ber::encode_int(128), vec![0x00, 0x80]);
    assert_eq!(ber::encode_int(255), vec![0x00, 0xFF]);
    assert_eq!(ber::encode_int(-1), vec![0xFF]);

    for value in [0i64, 1, 127, 128, 255, 256, 65535, 1048576, -1, -128, -129] {
        assert_eq!(ber::decode_int(&ber::encode_int(value)), value, "{value}");
    }
}

#[test]
fn test_oid_encoding() {
    assert_eq!(
        oid::encode(oid::BIB1_ATTRIBUTE_SET),
        vec![0x2A, 0x86, 0x48, 0xCE, 0x13, 0x03, 0x01]
    );

    for arcs in [oid::MARC21, oid::UNIMARC, oid::SUTRS, oid::BIB1_ATTRIBUTE_SET] {
        assert_eq!(oid::decode(&oid::encode(arcs)).unwrap(), arcs);
    }

    assert!(oid::is_marc21(oid::MARC21));
    assert!(!oid::is_marc21(oid::UNIMARC));
}

#[test]
fn test_initialize_request() {
    let bytes = [
        0xB4, 0x1A, 0x83, 0x02, 0x00, 0x20, 0x84, 0x02, 0x00, 0xC0, 0x85, 0x03, 0x10, 0x00, 0x00,
        0x86, 0x03, 0x10, 0x00, 0x00, 0x9F, 0x6F, 0x05, 0x5A, 0x47, 0x41, 0x54, 0x45,
    ];

    let msg = Message::from_bytes(&bytes)
        .expect("bytes should parse OK")
        .expect("bytes should produce a whole message");

    let MessagePayload::InitializeRequest(ref payload) = msg.payload else {
        panic!("Unexpected type parsed: {msg:?}");
    };

    assert_eq!(payload.protocol_version, vec![0x00, 0x20]);
    assert_eq!(payload.options, vec![0x00, 0xC0]);
    assert_eq!(payload.preferred_message_size, 1048576);
    assert_eq!(Some("ZGATE"), payload.implementation_name.as_deref());

    assert_eq!(bytes.to_vec(), msg.to_bytes().unwrap());

    // Verify valid, partial messages return None instead of Err
    assert!(Message::from_bytes(&bytes[0..10]).unwrap().is_none());
}

#[test]
fn test_search_request() {
    let bytes = [
        0xB6, 0x4B, 0x8D, 0x01, 0x00, 0x8E, 0x01, 0x01, 0x8F, 0x01, 0x00, 0x90, 0x01, 0xFF, 0x91,
        0x07, 0x64, 0x65, 0x66, 0x61, 0x75, 0x6C, 0x74, 0xB2, 0x08, 0x9F, 0x69, 0x05, 0x62, 0x6F,
        0x6F, 0x6B, 0x73, 0xB5, 0x2A, 0xA1, 0x28, 0x06, 0x07, 0x2A, 0x86, 0x48, 0xCE, 0x13, 0x03,
        0x01, 0xA0, 0x1D, 0xBF, 0x66, 0x1A, 0xBF, 0x2C, 0x0A, 0x30, 0x08, 0x9F, 0x78, 0x01, 0x01,
        0x9F, 0x79, 0x01, 0x07, 0x9F, 0x2D, 0x0A, 0x30, 0x38, 0x37, 0x39, 0x33, 0x30, 0x33, 0x37,
        0x32, 0x37,
    ];

    let req = SearchRequest::new("books", QueryNode::leaf_code(7, "0879303727"));
    let msg = Message::from_payload(MessagePayload::SearchRequest(req));

    assert_eq!(bytes.to_vec(), msg.to_bytes().unwrap());

    let parsed = Message::from_bytes(&bytes).unwrap().unwrap();

    let MessagePayload::SearchRequest(ref payload) = parsed.payload else {
        panic!("Wrong message type parsed: {parsed:?}");
    };

    assert_eq!(payload.database_names, vec!["books".to_string()]);
    assert_eq!(
        payload.query,
        QueryNode::Leaf {
            attribute: 7,
            term: "0879303727".to_string()
        }
    );

    assert_eq!(bytes.to_vec(), parsed.to_bytes().unwrap());
}

#[test]
fn test_search_response() {
    let bytes = [
        0xB7, 0x0C, 0x97, 0x01, 0x03, 0x98, 0x01, 0x00, 0x99, 0x01, 0x01, 0x9A, 0x01, 0xFF,
    ];

    let msg = Message::from_bytes(&bytes).unwrap().unwrap();

    let MessagePayload::SearchResponse(ref payload) = msg.payload else {
        panic!("Wrong message type parsed: {msg:?}");
    };

    assert_eq!(payload.result_count, 3);
    assert!(payload.search_status);

    assert_eq!(bytes.to_vec(), msg.to_bytes().unwrap());
}

#[test]
fn test_present_request() {
    let bytes = [
        0xB8, 0x14, 0x9F, 0x1F, 0x01, 0x31, 0x9E, 0x01, 0x01, 0x9D, 0x01, 0x01, 0x9F, 0x68, 0x07,
        0x2A, 0x86, 0x48, 0xCE, 0x13, 0x05, 0x0A,
    ];

    let req = PresentRequest::new("1", 1, 1, oid::MARC21);
    let msg = Message::from_payload(MessagePayload::PresentRequest(req));

    assert_eq!(bytes.to_vec(), msg.to_bytes().unwrap());

    let parsed = Message::from_bytes(&bytes).unwrap().unwrap();

    let MessagePayload::PresentRequest(ref payload) = parsed.payload else {
        panic!("Wrong message type parsed: {parsed:?}");
    };

    assert_eq!(
        Some(oid::MARC21.to_vec()),
        payload.preferred_record_syntax
    );

    assert_eq!(bytes.to_vec(), parsed.to_bytes().unwrap());
}

#[test]
fn test_present_response() {
    let mut resp = PresentResponse::default();
    resp.number_of_records_returned = 1;
    resp.next_result_set_position = 2;
    resp.records
        .push(DbRecord::new(oid::MARC21, b"Pile of MARC Bytes".to_vec()));

    let msg = Message::from_payload(MessagePayload::PresentResponse(resp));

    let bytes = msg.to_bytes().unwrap();
    let parsed = Message::from_bytes(&bytes).unwrap().unwrap();

    assert_eq!(msg, parsed);
    assert_eq!(bytes, parsed.to_bytes().unwrap());

    let MessagePayload::PresentResponse(ref payload) = parsed.payload else {
        panic!("Wrong message type parsed: {parsed:?}");
    };

    assert_eq!(payload.records.len(), 1);
    assert_eq!(payload.records[0].syntax.as_deref(), Some(oid::MARC21));
    assert_eq!(payload.records[0].data, b"Pile of MARC Bytes".to_vec());
}

#[test]
fn test_rpn_reencode_is_byte_identical() {
    let tree = QueryNode::and_not(
        QueryNode::leaf_code(4, "Go"),
        QueryNode::leaf_code(1003, "Pike"),
    );

    let bytes = tree.to_packet().to_bytes();

    let (packet, _) = Packet::from_bytes(&bytes).unwrap();
    let parsed = QueryNode::from_packet(&packet).unwrap();

    assert_eq!(tree, parsed);
    assert_eq!(bytes, parsed.to_packet().to_bytes());
}

#[test]
fn test_rpn_operator_fallback() {
    // An operator wrapper holding an unknown code decodes as AND.
    let packet = Packet::context_seq(
        1,
        vec![
            QueryNode::leaf_code(4, "a").to_packet(),
            QueryNode::leaf_code(4, "b").to_packet(),
            Packet::constructed(
                Class::Context,
                46,
                vec![Packet::primitive(
                    Class::Universal,
                    ber::TAG_INTEGER,
                    ber::encode_int(9),
                )],
            ),
        ],
    );

    let QueryNode::Branch { op, .. } = QueryNode::from_packet(&packet).unwrap() else {
        panic!("expected a branch");
    };

    assert_eq!(op, Operator::And);
}

#[test]
fn test_rpn_missing_term() {
    let attr_term = Packet::context_seq(102, vec![Packet::context_seq(44, vec![])]);
    let packet = Packet::context_seq(0, vec![attr_term]);

    assert_eq!(
        QueryNode::from_packet(&packet).unwrap_err(),
        crate::error::LocalError::MissingTerm
    );
}

#[test]
fn test_scan_round_trip() {
    let req = ScanRequest::new("books", "Go", 4, 10);
    let msg = Message::from_payload(MessagePayload::ScanRequest(req.clone()));

    let bytes = msg.to_bytes().unwrap();
    let parsed = Message::from_bytes(&bytes).unwrap().unwrap();

    let MessagePayload::ScanRequest(ref payload) = parsed.payload else {
        panic!("Wrong message type parsed: {parsed:?}");
    };

    assert_eq!(*payload, req);

    let mut resp = ScanResponse::default();
    resp.entries.push(TermInfo {
        term: "Go in Practice".to_string(),
        count: 1,
    });
    resp.entries.push(TermInfo {
        term: "The Go Programming Language".to_string(),
        count: 2,
    });

    let msg = Message::from_payload(MessagePayload::ScanResponse(resp.clone()));
    let parsed = Message::from_bytes(&msg.to_bytes().unwrap()).unwrap().unwrap();

    assert_eq!(parsed.payload, MessagePayload::ScanResponse(resp));
}

#[test]
fn test_sort_round_trip() {
    let req = SortRequest {
        reference_id: None,
        input_result_set_names: vec!["default".to_string()],
        sorted_result_set_name: "default".to_string(),
        sort_keys: vec![
            SortKeySpec {
                attribute: 4,
                descending: false,
            },
            SortKeySpec {
                attribute: 31,
                descending: true,
            },
        ],
    };

    let msg = Message::from_payload(MessagePayload::SortRequest(req.clone()));
    let parsed = Message::from_bytes(&msg.to_bytes().unwrap()).unwrap().unwrap();

    assert_eq!(parsed.payload, MessagePayload::SortRequest(req));
}

#[test]
fn test_sort_relation_trailing_integer_form() {
    // Some origins emit the relation as a bare INTEGER after the
    // sort element rather than tagging it.
    let key = Packet::sequence(vec![
        Packet::context_seq(
            1,
            vec![Packet::context_seq(
                2,
                vec![
                    oid::to_packet(oid::BIB1_ATTRIBUTE_SET),
                    Packet::context_seq(
                        44,
                        vec![Packet::sequence(vec![
                            Packet::context_int(120, 1),
                            Packet::context_int(121, 4),
                        ])],
                    ),
                ],
            )],
        ),
        Packet::primitive(Class::Universal, ber::TAG_INTEGER, ber::encode_int(1)),
    ]);

    let packet = Packet::context_seq(
        43,
        vec![
            Packet::context_seq(3, vec![]),
            Packet::context_str(4, "default"),
            Packet::context_seq(5, vec![key]),
        ],
    );

    let msg = Message::from_packet(&packet).unwrap();

    let MessagePayload::SortRequest(ref payload) = msg.payload else {
        panic!("Wrong message type parsed: {msg:?}");
    };

    assert_eq!(payload.sort_keys.len(), 1);
    assert_eq!(payload.sort_keys[0].attribute, 4);
    assert!(payload.sort_keys[0].descending);
}

#[test]
fn test_close() {
    let bytes = [0xBF, 0x30, 0x05, 0x9F, 0x81, 0x53, 0x01, 0x00];

    let close = Close::default();
    let msg = Message::from_payload(MessagePayload::Close(close));

    assert_eq!(bytes.to_vec(), msg.to_bytes().unwrap());

    let parsed = Message::from_bytes(&bytes).unwrap().unwrap();

    let MessagePayload::Close(ref payload) = parsed.payload else {
        panic!("Wrong message type parsed: {parsed:?}");
    };

    assert_eq!(payload.close_reason, CloseReason::Finished);
}

#[test]
fn test_delete_round_trip() {
    let req = DeleteResultSetRequest {
        reference_id: None,
        delete_function: 0,
        result_set_ids: vec!["default".to_string()],
    };

    let msg = Message::from_payload(MessagePayload::DeleteResultSetRequest(req.clone()));
    let parsed = Message::from_bytes(&msg.to_bytes().unwrap()).unwrap().unwrap();

    assert_eq!(parsed.payload, MessagePayload::DeleteResultSetRequest(req));
}

#[test]
fn test_use_attribute_fallback() {
    use crate::bib1::Use;

    assert_eq!(Use::from_code(4), Use::Title);
    assert_eq!(Use::from_code(1003), Use::Author);

    // 0 and unbound values resolve to Any.
    assert_eq!(Use::from_code(0), Use::Any);
    assert_eq!(Use::from_code(62), Use::Any);
}
