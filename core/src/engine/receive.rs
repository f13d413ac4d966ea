// Receive pipeline — raw scan results in, decoded events out
//
// Runs indefinitely against a noisy shared channel, so every failure is
// a normal outcome. Decryption success under this device's own key is
// what authenticates a sender; the sender field in the packet only
// selects a display name.

use crate::crypto::engine::decrypt;
use crate::engine::events::EngineEvent;
use crate::message::codec::decode_message;
use crate::radio::driver::Observation;
use crate::replay::ReplayCache;
use crate::store::contacts::ContactStore;

/// Display name for senders missing from the contact list
const UNKNOWN_SENDER: &str = "Unknown";

/// Process one inbound observation.
///
/// Foreign or garbled traffic surfaces as an unrecognized-signal log
/// line; duplicates and stale packets are dropped silently. Nothing
/// here can fail outward.
pub(crate) fn handle_observation(
    observation: Observation,
    own_key: &[u8; 32],
    contacts: &ContactStore,
    replay: &mut ReplayCache,
) -> Option<EngineEvent> {
    let plaintext = match decrypt(&observation.payload, own_key) {
        Ok(plaintext) => plaintext,
        Err(_) => {
            tracing::debug!(rssi = observation.rssi, "unrecognized signal");
            return Some(unrecognized(observation.rssi));
        }
    };

    let message = match decode_message(&plaintext) {
        Ok(message) => message,
        Err(_) => {
            tracing::debug!(rssi = observation.rssi, "authenticated but malformed packet");
            return Some(unrecognized(observation.rssi));
        }
    };

    if !replay.admit(&message.sender_id, message.timestamp_millis) {
        tracing::debug!(sender = %message.sender_id, "duplicate or stale packet dropped");
        return None;
    }

    let name = contacts
        .find(&message.sender_id)
        .map(|c| c.name.clone())
        .unwrap_or_else(|| UNKNOWN_SENDER.to_string());

    tracing::info!(kind = %message.kind, sender = %message.sender_id, "message observed");
    Some(EngineEvent::MessageObserved {
        kind: message.kind,
        name,
        sender_id: message.sender_id,
        position: message.position,
        rssi: observation.rssi,
    })
}

fn unrecognized(rssi: i16) -> EngineEvent {
    EngineEvent::LogLine(format!("RX: unrecognized signal ({rssi} dBm)"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::engine::{encrypt, generate_key};
    use crate::crypto::vault::KeyVault;
    use crate::message::codec::encode_message;
    use crate::message::{Message, MessageKind, Position};
    use crate::store::backend::MemoryStorage;
    use crate::store::contacts::Contact;
    use std::sync::Arc;

    fn empty_contacts() -> ContactStore {
        ContactStore::load(Arc::new(MemoryStorage::new())).unwrap()
    }

    fn sealed(message: &Message, key: &[u8; 32]) -> Vec<u8> {
        encrypt(&encode_message(message).unwrap(), key)
            .unwrap()
            .to_bytes()
    }

    fn observe(payload: Vec<u8>) -> Observation {
        Observation { payload, rssi: -60 }
    }

    #[test]
    fn test_foreign_traffic_is_unrecognized_signal() {
        let key = generate_key();
        let other = generate_key();
        let contacts = empty_contacts();
        let mut replay = ReplayCache::new();

        let payload = sealed(&Message::sos("ghost123".into(), None), &other);
        let event = handle_observation(observe(payload), &key, &contacts, &mut replay);

        assert_eq!(
            event,
            Some(EngineEvent::LogLine("RX: unrecognized signal (-60 dBm)".into()))
        );
        assert!(replay.is_empty());
    }

    #[test]
    fn test_garbage_is_unrecognized_signal() {
        let key = generate_key();
        let contacts = empty_contacts();
        let mut replay = ReplayCache::new();

        let event = handle_observation(observe(vec![0xFF; 40]), &key, &contacts, &mut replay);
        assert!(matches!(event, Some(EngineEvent::LogLine(_))));
    }

    #[test]
    fn test_observed_message_resolves_contact_name() {
        let key = generate_key();
        let vault = KeyVault::ephemeral();
        let mut contacts = empty_contacts();
        contacts
            .add(Contact {
                id: "beef4242".into(),
                name: "Basecamp".into(),
                wrapped_key: vault.wrap(&key).unwrap(),
            })
            .unwrap();
        let mut replay = ReplayCache::new();

        let position = Position {
            latitude: 61.1,
            longitude: 7.09,
        };
        let payload = sealed(&Message::sos("beef4242".into(), Some(position)), &key);
        let event = handle_observation(observe(payload), &key, &contacts, &mut replay);

        match event {
            Some(EngineEvent::MessageObserved {
                kind,
                name,
                sender_id,
                position: observed,
                rssi,
            }) => {
                assert_eq!(kind, MessageKind::Sos);
                assert_eq!(name, "Basecamp");
                assert_eq!(sender_id, "beef4242");
                assert_eq!(observed, Some(position));
                assert_eq!(rssi, -60);
            }
            other => panic!("expected MessageObserved, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_sender_gets_placeholder_name() {
        let key = generate_key();
        let contacts = empty_contacts();
        let mut replay = ReplayCache::new();

        let payload = sealed(&Message::ack("feed7777".into()), &key);
        let event = handle_observation(observe(payload), &key, &contacts, &mut replay);

        match event {
            Some(EngineEvent::MessageObserved { name, kind, .. }) => {
                assert_eq!(name, UNKNOWN_SENDER);
                assert_eq!(kind, MessageKind::Ack);
            }
            other => panic!("expected MessageObserved, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_frame_admitted_once() {
        let key = generate_key();
        let contacts = empty_contacts();
        let mut replay = ReplayCache::new();

        let payload = sealed(&Message::sos("beef4242".into(), None), &key);

        let first = handle_observation(observe(payload.clone()), &key, &contacts, &mut replay);
        assert!(matches!(first, Some(EngineEvent::MessageObserved { .. })));

        // The same frame seen again inside the window is dropped silently
        let second = handle_observation(observe(payload), &key, &contacts, &mut replay);
        assert_eq!(second, None);
    }
}
