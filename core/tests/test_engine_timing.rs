//! Timing-window tests for the engine loop
//!
//! Exercised under paused tokio time with scripted radio drivers:
//! busy backoff (a settling radio never costs a rotation step), the
//! defensive stop-confirmation timeout, and mid-cool-down cancellation.
//!
//! Run with: cargo test --test test_engine_timing

use lifeline_core::message::decode_message;
use lifeline_core::radio::{
    AdvertisingFrame, LoopbackRadio, RadioCallback, RadioDriver, RadioError, RadioHooks,
};
use lifeline_core::store::{MemoryStorage, StorageBackend};
use lifeline_core::{
    decrypt, BroadcastStatus, ContactStore, Engine, EngineConfig, EngineEvent, EngineHandle,
    IdentityStore, KeyVault, MessageKind, NoPositionProvider, PairingRecord, RadioCapabilities,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// Driver whose start confirmation arrives only after a scripted delay;
/// stop confirms immediately. Models a radio stack under load.
#[derive(Clone)]
struct SlowStartRadio {
    inner: Arc<Mutex<ScriptedInner>>,
    start_delay: Duration,
}

/// Driver that never confirms a stop command at all.
#[derive(Clone)]
struct LostStopRadio {
    inner: Arc<Mutex<ScriptedInner>>,
}

#[derive(Default)]
struct ScriptedInner {
    hooks: Option<RadioHooks>,
    transmissions: Vec<Vec<u8>>,
}

impl ScriptedInner {
    fn record(&mut self, frame: &AdvertisingFrame) -> RadioHooks {
        self.transmissions.push(frame.payload.clone());
        self.hooks.clone().expect("attach before commands")
    }
}

impl SlowStartRadio {
    fn new(start_delay: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ScriptedInner::default())),
            start_delay,
        }
    }

    fn transmissions(&self) -> Vec<Vec<u8>> {
        self.inner.lock().unwrap().transmissions.clone()
    }
}

impl RadioDriver for SlowStartRadio {
    fn attach(&mut self, hooks: RadioHooks) {
        self.inner.lock().unwrap().hooks = Some(hooks);
    }

    fn capabilities(&self) -> RadioCapabilities {
        RadioCapabilities::default()
    }

    fn start_advertising(&mut self, frame: &AdvertisingFrame) -> Result<(), RadioError> {
        let hooks = self.inner.lock().unwrap().record(frame);
        let delay = self.start_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = hooks.completions.send(RadioCallback::Started(Ok(())));
        });
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), RadioError> {
        let hooks = self.inner.lock().unwrap().hooks.clone().unwrap();
        let _ = hooks.completions.send(RadioCallback::Stopped);
        Ok(())
    }

    fn start_scanning(&mut self) -> Result<(), RadioError> {
        Ok(())
    }

    fn stop_scanning(&mut self) -> Result<(), RadioError> {
        Ok(())
    }
}

impl LostStopRadio {
    fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ScriptedInner::default())),
        }
    }

    fn transmissions(&self) -> Vec<Vec<u8>> {
        self.inner.lock().unwrap().transmissions.clone()
    }
}

impl RadioDriver for LostStopRadio {
    fn attach(&mut self, hooks: RadioHooks) {
        self.inner.lock().unwrap().hooks = Some(hooks);
    }

    fn capabilities(&self) -> RadioCapabilities {
        RadioCapabilities::default()
    }

    fn start_advertising(&mut self, frame: &AdvertisingFrame) -> Result<(), RadioError> {
        let hooks = self.inner.lock().unwrap().record(frame);
        let _ = hooks.completions.send(RadioCallback::Started(Ok(())));
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), RadioError> {
        // The confirmation never comes.
        Ok(())
    }

    fn start_scanning(&mut self) -> Result<(), RadioError> {
        Ok(())
    }

    fn stop_scanning(&mut self) -> Result<(), RadioError> {
        Ok(())
    }
}

/// Prepare storage with an identity and `names.len()` contacts; returns
/// the raw per-contact keys in list order.
fn seed_contacts(storage: &Arc<dyn StorageBackend>, names: &[(&str, &str)]) -> Vec<[u8; 32]> {
    let vault = KeyVault::open(storage).unwrap();
    IdentityStore::new(storage.clone())
        .load_or_generate(&vault)
        .unwrap();

    let mut contacts = ContactStore::load(storage.clone()).unwrap();
    let mut keys = Vec::new();
    for (id, name) in names {
        let key = *lifeline_core::generate_key();
        let record = PairingRecord {
            id: (*id).into(),
            key: {
                use base64::{engine::general_purpose::STANDARD, Engine as _};
                STANDARD.encode(key)
            },
        };
        contacts
            .add(record.into_contact((*name).into(), &vault).unwrap())
            .unwrap();
        keys.push(key);
    }
    keys
}

fn spawn_engine(
    storage: Arc<dyn StorageBackend>,
    radio: Box<dyn RadioDriver>,
) -> (EngineHandle, UnboundedReceiver<EngineEvent>) {
    let (engine, handle, events) = Engine::new(EngineConfig {
        storage,
        radio,
        position: Box::new(NoPositionProvider),
    })
    .unwrap();
    tokio::spawn(engine.run());
    (handle, events)
}

fn drain(events: &mut UnboundedReceiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test(start_paused = true)]
async fn test_slow_start_backs_off_without_skipping_a_contact() {
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::new());
    let keys = seed_contacts(&storage, &[("aaaa1111", "Ada"), ("bbbb2222", "Ben")]);

    // Start confirmations take 4 s, so the tick after the first
    // broadcast finds the radio still settling and must back off.
    let radio = SlowStartRadio::new(Duration::from_secs(4));
    let probe = radio.clone();
    let (handle, _events) = spawn_engine(storage, Box::new(radio));

    handle.start_sos();
    tokio::time::sleep(Duration::from_millis(5_000)).await;

    // Exactly two transmissions: the backoff retried the same rotation
    // step instead of skipping Ben or double-sending Ada.
    let transmissions = probe.transmissions();
    assert_eq!(transmissions.len(), 2);
    let first = decode_message(&decrypt(&transmissions[0], &keys[0]).unwrap()).unwrap();
    let second = decode_message(&decrypt(&transmissions[1], &keys[1]).unwrap()).unwrap();
    assert_eq!(first.kind, MessageKind::Sos);
    assert_eq!(second.kind, MessageKind::Sos);

    handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_lost_stop_confirmation_does_not_stall_rotation() {
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::new());
    seed_contacts(&storage, &[("aaaa1111", "Ada")]);

    let radio = LostStopRadio::new();
    let probe = radio.clone();
    let (handle, _events) = spawn_engine(storage, Box::new(radio));

    handle.start_sos();

    // First broadcast at ~200 ms; the second tick's stop command gets
    // no confirmation, so only the 200 ms defensive timeout frees the
    // radio for the next broadcast.
    tokio::time::sleep(Duration::from_millis(4_000)).await;

    assert_eq!(probe.transmissions().len(), 2);

    handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_stop_broadcast_cancels_mid_cooldown() {
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::new());
    seed_contacts(&storage, &[("aaaa1111", "Ada")]);

    let radio = LoopbackRadio::new();
    let probe = radio.handle();
    let (handle, mut events) = spawn_engine(storage, Box::new(radio));

    handle.start_sos();
    // 50 ms in, the first cool-down has not elapsed yet.
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.stop_broadcast();

    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(
        probe.transmissions().is_empty(),
        "cancellation mid-cool-down must drop the pending broadcast"
    );
    let events = drain(&mut events);
    assert!(events.contains(&EngineEvent::StatusChanged(BroadcastStatus::Sos)));
    assert!(events.contains(&EngineEvent::StatusChanged(BroadcastStatus::Idle)));

    handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_sos_cadence_follows_tick_interval() {
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::new());
    seed_contacts(&storage, &[("aaaa1111", "Ada")]);

    let radio = LoopbackRadio::new();
    let probe = radio.handle();
    let (handle, _events) = spawn_engine(storage, Box::new(radio));

    handle.start_sos();

    // Broadcasts land at ~0.2 s, ~3.4 s, ~6.6 s.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(probe.transmissions().len(), 1);

    tokio::time::sleep(Duration::from_millis(3_200)).await;
    assert_eq!(probe.transmissions().len(), 2);

    tokio::time::sleep(Duration::from_millis(3_200)).await;
    assert_eq!(probe.transmissions().len(), 3);

    handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_contact_removal_mid_rotation_stops_cleanly() {
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::new());
    seed_contacts(&storage, &[("aaaa1111", "Ada")]);

    let radio = LoopbackRadio::new();
    let probe = radio.handle();
    let (handle, mut events) = spawn_engine(storage, Box::new(radio));

    handle.start_sos();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(probe.transmissions().len(), 1);

    // The only contact disappears while SOS is live.
    handle.remove_contact("aaaa1111");
    tokio::time::sleep(Duration::from_secs(4)).await;

    assert_eq!(probe.transmissions().len(), 1, "no broadcast to nobody");
    let events = drain(&mut events);
    assert!(events.contains(&EngineEvent::StatusChanged(BroadcastStatus::Idle)));

    handle.shutdown();
}
