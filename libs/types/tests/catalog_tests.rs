//! Catalog-level properties: header binding, integrity sealing and
//! byte-exact re-encoding.

use codec::{Endianness, LengthPrefix, WireConfig};
use proptest::prelude::*;
use types::{
    Action, ActionKind, Catalog, CatalogError, HandshakeRequest, MessageHeader, Ping,
    TransferCorrupted, TransferOk,
};

prop_compose! {
    fn wire_config()
        (endianness in prop_oneof![Just(Endianness::Big), Just(Endianness::Little)],
         prefix in prop_oneof![Just(LengthPrefix::U16), Just(LengthPrefix::U64)]) -> WireConfig {
        WireConfig::new(endianness, prefix)
    }
}

fn any_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        (any::<u64>(), any::<i64>(), any::<u64>())
            .prop_map(|(id, ms, tx)| Ping::new(id, ms).with_transaction(tx).into()),
        (any::<u64>(), any::<u64>()).prop_map(|(id, hash)| TransferOk::new(id, hash).into()),
        (any::<u64>(), any::<u64>())
            .prop_map(|(id, hash)| TransferCorrupted::new(id, hash).into()),
        any::<u64>().prop_map(|tx| HandshakeRequest::new().with_transaction(tx).into()),
    ]
}

proptest! {
    #[test]
    fn reencoding_is_byte_exact(config in wire_config(), action in any_action()) {
        let catalog = Catalog::new(config);
        let bytes = catalog.encode(&action).unwrap();
        let decoded = catalog.decode(&bytes).unwrap();
        prop_assert_eq!(&decoded, &action);
        prop_assert_eq!(catalog.encode(&decoded).unwrap(), bytes);
    }

    #[test]
    fn header_names_decoded_kind(config in wire_config(), action in any_action()) {
        let catalog = Catalog::new(config);
        let bytes = catalog.encode(&action).unwrap();
        let kind = catalog.peek_kind(&bytes).unwrap();
        prop_assert_eq!(kind, u32::from(action.kind()));
        prop_assert_eq!(Catalog::lookup(kind).unwrap().kind, action.kind());
    }

    #[test]
    fn any_payload_bit_flip_is_detected(
        action in any_action(),
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let catalog = Catalog::default();
        let mut bytes = catalog.encode(&action).unwrap().to_vec();
        prop_assume!(bytes.len() > MessageHeader::SIZE);

        let offset = MessageHeader::SIZE + position.index(bytes.len() - MessageHeader::SIZE);
        bytes[offset] ^= 1 << bit;
        let is_mismatch = matches!(
            catalog.decode(&bytes),
            Err(CatalogError::IntegrityMismatch { .. })
        );
        prop_assert!(is_mismatch);
    }
}

#[test]
fn test_corrupted_hash_slot_is_detected() {
    let catalog = Catalog::default();
    let mut bytes = catalog
        .encode(&HandshakeRequest::new().into())
        .unwrap()
        .to_vec();
    bytes[MessageHeader::HASH_OFFSET] ^= 0x01;

    assert!(matches!(
        catalog.verify_integrity(&bytes),
        Err(CatalogError::IntegrityMismatch { payload_size: 0, .. })
    ));
}

#[test]
fn test_integrity_check_can_be_disabled() {
    let catalog = Catalog::default().with_integrity_check(false);
    let mut bytes = catalog.encode(&Ping::new(1, 2).into()).unwrap().to_vec();
    bytes[MessageHeader::SIZE] ^= 0xFF;

    let action = catalog.decode(&bytes).unwrap();
    match action {
        Action::Ping(ping) => assert_eq!(ping.ping_id, 1 ^ 0xFF),
        other => panic!("unexpected {other}"),
    }
}

#[test]
fn test_truncated_payload_is_wire_error() {
    let catalog = Catalog::default().with_integrity_check(false);
    let bytes = catalog.encode(&TransferOk::new(1, 2).into()).unwrap();
    let err = catalog.decode(&bytes[..bytes.len() - 1]).unwrap_err();
    assert!(err.is_malformed());
    assert!(matches!(err, CatalogError::Wire(ref w) if w.is_truncation()));
}

#[test]
fn test_two_actions_in_one_datagram_rejected() {
    let catalog = Catalog::default();
    let mut bytes = catalog.encode(&Ping::new(1, 1).into()).unwrap().to_vec();
    bytes.extend_from_slice(&catalog.encode(&Ping::new(2, 2).into()).unwrap());
    // The hash covers everything after the header, so the check trips first
    assert!(matches!(
        catalog.decode(&bytes),
        Err(CatalogError::IntegrityMismatch { .. })
    ));

    let lenient = catalog.with_integrity_check(false);
    assert!(matches!(
        lenient.decode(&bytes),
        Err(CatalogError::Wire(codec::WireError::TrailingBytes { .. }))
    ));
}

#[test]
fn test_pong_reply_keeps_transaction() {
    let catalog = Catalog::default();
    let ping = Ping::new(1, 10).with_transaction(500);
    let reply = Ping::new(ping.ping_id, 11).with_transaction(ping.header.transaction_id);

    let back = catalog.decode(&catalog.encode(&reply.into()).unwrap()).unwrap();
    assert_eq!(back.transaction_id(), 500);
    assert_eq!(back.kind(), ActionKind::Ping);
}
