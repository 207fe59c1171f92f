//! End-to-end encode/decode coverage for the six concrete protocol
//! scenarios worked through by hand.

use bitcodec_core::model::{
    ConditionalAction, ConditionalDependency, EndianType, Node, PaddingConfig, PaddingKind, Protocol, StructuralKind, ValidationResult, ValueType,
};
use bitcodec_core::{decode, encode};

#[test]
fn fixed_header_round_trips() {
    let mut sync = Node::new_leaf("sync", "sync", ValueType::Hex, 16);
    sync.value = Some("0xAA55".to_string());
    let mut version = Node::new_leaf("version", "version", ValueType::Uint, 8);
    version.value = Some("1".to_string());
    let mut length = Node::new_leaf("length", "length", ValueType::Uint, 16);
    length.endian = Some(EndianType::Big);
    length.value = Some("80".to_string());
    let mut seq = Node::new_leaf("seq", "seq", ValueType::Uint, 16);
    seq.endian = Some(EndianType::Big);
    seq.value = Some("1".to_string());

    let header = Node::new_structural("header", "Header", StructuralKind::Header, vec![sync, version, length, seq]);
    let mut protocol = Protocol::new("fixed-header", "FixedHeader");
    protocol.header = Some(header);

    let bytes = encode(&mut protocol).unwrap();
    assert_eq!(bytes, vec![0xAA, 0x55, 0x01, 0x00, 0x50, 0x00, 0x01]);

    let reports = decode(&protocol, &bytes).unwrap();
    assert_eq!(reports.len(), 4);
    assert!(reports.iter().all(|r| r.validation_result == ValidationResult::Matched));
}

#[test]
fn computed_length_field_sizes_itself_from_its_value() {
    let mut count = Node::new_leaf("count", "count", ValueType::Uint, 8);
    count.value = Some("3".to_string());
    // A dynamic-length (length = 0) leaf sizes itself from its resolved
    // value; `count` documents the payload's byte length by convention, it
    // isn't read back by the codec to size `payload`.
    let mut payload = Node::new_leaf("payload", "payload", ValueType::Hex, 0);
    payload.value = Some("0xABCDEF".to_string());

    let mut protocol = Protocol::new("computed-length", "ComputedLength");
    protocol.free_nodes.push(count);
    protocol.free_nodes.push(payload);

    let bytes = encode(&mut protocol).unwrap();
    assert_eq!(bytes, vec![0x03, 0xAB, 0xCD, 0xEF]);

    let reports = decode(&protocol, &bytes).unwrap();
    let payload_report = reports.iter().find(|r| r.id == "payload").unwrap();
    assert_eq!(payload_report.bit_length, 24);
    assert_eq!(payload_report.validation_result, ValidationResult::Matched);
}

#[test]
fn crc_tail_covers_the_body_bytes() {
    let leaves: Vec<Node> = (1..=8u8)
        .map(|v| {
            let mut n = Node::new_leaf(format!("b{v}"), format!("b{v}"), ValueType::Uint, 8);
            n.value = Some(v.to_string());
            n
        })
        .collect();
    let body = Node::new_structural("body", "Body", StructuralKind::Body, leaves);

    let mut crc = Node::new_leaf("crc", "crc", ValueType::Hex, 16);
    crc.forward_expr = Some("crc16Of(#body)".to_string());
    let tail = Node::new_structural("tail", "Tail", StructuralKind::Tail, vec![crc]);

    let mut protocol = Protocol::new("crc-tail", "CrcTail");
    protocol.body = Some(body);
    protocol.tail = Some(tail);

    let bytes = encode(&mut protocol).unwrap();
    assert_eq!(&bytes[0..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(&bytes[8..10], &[0x47, 0x92]);

    let reports = decode(&protocol, &bytes).unwrap();
    let crc_report = reports.iter().find(|r| r.id == "crc").unwrap();
    assert_eq!(crc_report.validation_result, ValidationResult::Matched);
}

#[test]
fn fill_container_padding_zero_fills_the_remainder() {
    let mut a = Node::new_leaf("a", "a", ValueType::Hex, 8);
    a.value = Some("0x12".to_string());
    let mut b = Node::new_leaf("b", "b", ValueType::Hex, 8);
    b.value = Some("0x34".to_string());

    let pad_config = PaddingConfig { kind: PaddingKind::FillContainer, target_length: 64, container_id: Some("body".to_string()), ..PaddingConfig::default() };
    let pad = Node::new_padding("pad", "pad", pad_config);

    let body = Node::new_structural("body", "Body", StructuralKind::Body, vec![a, b, pad]);
    let mut protocol = Protocol::new("fill-container", "FillContainer");
    protocol.body = Some(body);

    let bytes = encode(&mut protocol).unwrap();
    assert_eq!(bytes, vec![0x12, 0x34, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
}

#[test]
fn alignment_padding_pads_to_the_next_boundary() {
    let mut a = Node::new_leaf("a", "a", ValueType::Hex, 12);
    a.value = Some("0xABC".to_string());

    let pad_config = PaddingConfig { kind: PaddingKind::Alignment, target_length: 16, ..PaddingConfig::default() };
    let pad = Node::new_padding("pad", "pad", pad_config);

    let mut b = Node::new_leaf("b", "b", ValueType::Uint, 8);
    b.value = Some("90".to_string());

    let mut protocol = Protocol::new("alignment", "Alignment");
    protocol.free_nodes.push(a);
    protocol.free_nodes.push(pad);
    protocol.free_nodes.push(b);

    let bytes = encode(&mut protocol).unwrap();
    assert_eq!(bytes, vec![0xAB, 0xC0, 0x5A]);
}

#[test]
fn conditional_disable_drops_the_optional_field_entirely() {
    let mut flag = Node::new_leaf("flag", "flag", ValueType::Uint, 8);
    flag.value = Some("1".to_string());
    let mut opt = Node::new_leaf("opt", "opt", ValueType::Uint, 8);
    opt.value = Some("9".to_string());
    opt.conditions.push(ConditionalDependency {
        condition_node_ref: "flag".to_string(),
        condition_expr: "value == 1".to_string(),
        action: ConditionalAction::Disable,
        else_action: None,
        priority: 0,
        description: "omitted whenever flag is set".to_string(),
    });

    let mut protocol = Protocol::new("conditional", "Conditional");
    protocol.free_nodes.push(flag);
    protocol.free_nodes.push(opt);

    let bytes = encode(&mut protocol).unwrap();
    assert_eq!(bytes, vec![0x01]);

    let reports = decode(&protocol, &bytes).unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].id, "flag");
}
