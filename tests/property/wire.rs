//! Property-based tests for the gateway wire format and status ordering.
//!
//! Uses proptest to verify:
//! 1. Any valid `GatewayFrame` survives an encode → decode round-trip.
//! 2. Random bytes never cause a panic in `decode` (returns `Err` gracefully).
//! 3. Status transitions accepted by `can_transition` never move a record
//!    backwards, and terminal statuses accept nothing at all.

use proptest::prelude::*;
use uuid::Uuid;

use chatlink_proto::codec;
use chatlink_proto::gateway::{GatewayFrame, ReceiptKind};
use chatlink_proto::message::{MessageId, MessageStatus};

// --- Arbitrary implementations for protocol types ---

/// Strategy for generating arbitrary `MessageId` values.
fn arb_message_id() -> impl Strategy<Value = MessageId> {
    any::<u128>().prop_map(|n| MessageId::from_uuid(Uuid::from_u128(n)))
}

/// Strategy for generating arbitrary `ReceiptKind` values.
fn arb_receipt_kind() -> impl Strategy<Value = ReceiptKind> {
    prop_oneof![Just(ReceiptKind::Delivered), Just(ReceiptKind::Read)]
}

/// Strategy for generating arbitrary `MessageStatus` values.
fn arb_message_status() -> impl Strategy<Value = MessageStatus> {
    prop_oneof![
        Just(MessageStatus::Pending),
        Just(MessageStatus::Sent),
        Just(MessageStatus::Delivered),
        Just(MessageStatus::Read),
        Just(MessageStatus::Failed),
    ]
}

/// Strategy for generating arbitrary `GatewayFrame` values.
fn arb_gateway_frame() -> impl Strategy<Value = GatewayFrame> {
    prop_oneof![
        (".{0,64}", prop::option::of(".{0,64}")).prop_map(|(device_label, auth_token)| {
            GatewayFrame::Hello {
                device_label,
                auth_token,
            }
        }),
        ".{0,16}".prop_map(|code| GatewayFrame::Challenge { code }),
        (".{0,64}", ".{0,64}").prop_map(|(identity, device_label)| GatewayFrame::Welcome {
            identity,
            device_label,
        }),
        (arb_message_id(), ".{0,64}", ".{0,1024}").prop_map(|(id, recipient, body)| {
            GatewayFrame::Send {
                id,
                recipient,
                body,
            }
        }),
        arb_message_id().prop_map(|id| GatewayFrame::SendAck { id }),
        (arb_message_id(), ".{0,128}")
            .prop_map(|(id, reason)| GatewayFrame::SendErr { id, reason }),
        (arb_message_id(), arb_receipt_kind())
            .prop_map(|(id, kind)| GatewayFrame::Receipt { id, kind }),
        (any::<u16>(), ".{0,128}").prop_map(|(code, reason)| GatewayFrame::Bye { code, reason }),
    ]
}

// --- Property tests ---

proptest! {
    /// Any valid GatewayFrame survives an encode → decode round-trip.
    #[test]
    fn gateway_frame_round_trip(frame in arb_gateway_frame()) {
        let bytes = codec::encode(&frame).expect("encode should succeed");
        let decoded = codec::decode(&bytes).expect("decode should succeed");
        prop_assert_eq!(frame, decoded);
    }

    /// Random bytes never cause a panic when decoded — they return Err gracefully.
    #[test]
    fn random_bytes_decode_no_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        // We don't care if it returns Ok or Err, just that it doesn't panic.
        let _ = codec::decode(&bytes);
    }

    /// Truncating a valid encoding never causes a panic.
    #[test]
    fn truncated_frame_decode_no_panic(frame in arb_gateway_frame(), cut in 0usize..64) {
        let bytes = codec::encode(&frame).expect("encode should succeed");
        let truncated = &bytes[..bytes.len().saturating_sub(cut)];
        let _ = codec::decode(truncated);
    }

    /// Accepted transitions strictly increase the rank (or land on Failed),
    /// so a record's status never moves backwards no matter what receipt
    /// sequence arrives.
    #[test]
    fn accepted_transitions_never_regress(
        updates in prop::collection::vec(arb_message_status(), 0..32)
    ) {
        let mut current = MessageStatus::Pending;
        for next in updates {
            if current.can_transition(next) {
                prop_assert!(
                    next == MessageStatus::Failed || next.rank() > current.rank(),
                    "accepted regression {current} -> {next}"
                );
                current = next;
            }
        }
    }

    /// Terminal statuses accept no further transitions.
    #[test]
    fn terminal_statuses_are_final(next in arb_message_status()) {
        prop_assert!(!MessageStatus::Read.can_transition(next));
        prop_assert!(!MessageStatus::Failed.can_transition(next));
    }
}
