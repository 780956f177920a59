//! Integration tests for the swordfish-core protocol layer.
//!
//! These tests drive the public API end to end: a catalog message is wrapped,
//! serialized, pushed through a frame accumulator in awkward chunks and
//! opened again on the other side.

use swordfish_core::{
    decode_envelope,
    protocol::envelope::{MAX_PAYLOAD_SIZE, SYNC_WORD_FROM_DEVICE},
    CatalogMessage, DecodeError, Direction, Envelope, FrameAccumulator, MessageType, Ping,
    SequenceCounter, SwordFishMessage, VersionData,
};

/// Plays the device side: parses a request and answers it.
fn device_answer(request_bytes: &[u8], answer: impl Into<SwordFishMessage>) -> Vec<u8> {
    let mut acc = FrameAccumulator::new(Direction::ToDevice);
    acc.push(request_bytes);
    let request = acc.next_envelope().expect("device must see the request");
    Envelope::reply_to(&request, answer).to_bytes()
}

#[test]
fn test_version_request_and_reply_round_trip() {
    // Arrange
    let tx = SequenceCounter::new();
    let mut request_msg = VersionData::empty();
    request_msg.set_mcu_type(1);
    request_msg.set_subversion(2);
    request_msg
        .set_uuid(&[1, 2, 3, 4, 5, 6, 7, 8])
        .expect("8-byte uuid");
    let request = Envelope::wrap(tx.current_id(), request_msg);
    tx.next();

    // Act
    let reply_bytes = device_answer(&request.to_bytes(), request_msg);
    let reply = Envelope::from_bytes(&reply_bytes).expect("valid reply");

    // Assert
    assert_eq!(&reply_bytes[..4], &SYNC_WORD_FROM_DEVICE);
    assert_eq!(reply.message_id(), request.message_id());
    assert_eq!(reply.payload(), &[1, 0, 2, 1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(reply.open::<VersionData>(), Ok(request_msg));
    assert_eq!(tx.current(), 1);
}

#[test]
fn test_reply_split_into_every_possible_pair_of_chunks() {
    let request = Envelope::wrap(77, Ping);
    let bytes = device_answer(&request.to_bytes(), VersionData::new(9, 9, [9; 8]));

    for split in 0..=bytes.len() {
        let mut acc = FrameAccumulator::new(Direction::FromDevice);
        acc.push(&bytes[..split]);
        let early = acc.next_envelope();
        acc.push(&bytes[split..]);
        let got = early.or_else(|| acc.next_envelope());

        let env = got.unwrap_or_else(|| panic!("no envelope with split at {split}"));
        assert_eq!(env.message_id(), 77);
        assert_eq!(env.message_type(), MessageType::VersionData);
    }
}

#[test]
fn test_noisy_stream_yields_every_valid_reply_in_order() {
    // Arrange – replies interleaved with noise and a corrupted frame
    let mut stream = vec![0xFF, 0x00, 0xDE];
    let mut expected = Vec::new();
    for id in 0..5u16 {
        let request = Envelope::wrap(id, Ping);
        let reply = Envelope::reply_to(&request, Ping);
        if id == 2 {
            let mut broken = reply.to_bytes();
            let last = broken.len() - 1;
            broken[last] = broken[last].wrapping_add(1);
            stream.extend_from_slice(&broken);
        } else {
            stream.extend_from_slice(&reply.to_bytes());
            expected.push(id);
        }
        stream.extend_from_slice(&[0x55; 3]);
    }

    // Act
    let mut acc = FrameAccumulator::new(Direction::FromDevice);
    let mut seen = Vec::new();
    for chunk in stream.chunks(4) {
        acc.push(chunk);
        while let Some(env) = acc.next_envelope() {
            seen.push(env.message_id());
        }
    }

    // Assert
    assert_eq!(seen, expected);
    assert_eq!(acc.corrupt_frames(), 1);
}

#[test]
fn test_decode_envelope_on_max_size_frame() {
    let env = Envelope::new(
        Direction::FromDevice,
        0xBEEF,
        MessageType::Ping,
        vec![0x5A; MAX_PAYLOAD_SIZE],
    )
    .expect("max payload fits");
    let bytes = env.to_bytes();

    let (decoded, consumed) = decode_envelope(&bytes).expect("decode");

    assert_eq!(bytes.len(), 255);
    assert_eq!(consumed, 255);
    assert_eq!(decoded, env);
    assert_eq!(decoded.open::<Ping>(), Ok(Ping));
}

#[test]
fn test_catalog_payload_mismatch_is_an_error_not_a_panic() {
    for len in [0usize, 1, 10, 12, 200] {
        let env = Envelope::new(
            Direction::FromDevice,
            1,
            MessageType::VersionData,
            vec![0; len],
        )
        .expect("payload fits");
        let result = env.open::<VersionData>();
        assert_eq!(
            result,
            Err(DecodeError::LengthMismatch {
                message_type: MessageType::VersionData,
                expected: 11,
                actual: len,
            })
        );
    }
}

#[test]
fn test_describe_is_available_through_the_trait() {
    fn describe_any<T: CatalogMessage>(m: &T) -> String {
        m.describe()
    }
    assert!(describe_any(&Ping).contains("PING"));
    assert!(describe_any(&VersionData::empty()).contains("VERSION_DATA"));
}
