// Engine — the single-writer owner of all broadcast state
//
// One tokio task holds the scheduler, the radio arbiter, the contact
// store, and the replay cache. Commands from the UI, completion
// callbacks from the hardware adapter, and inbound scan observations
// all arrive over channels and are serviced by the same loop, so no
// state is ever touched from two contexts. Timing windows (tick,
// cool-down, ACK hold, stop timeout) are deadlines inside the loop's
// select, never blocking waits.

pub mod events;
pub mod receive;
pub mod scheduler;

pub use events::{BroadcastStatus, EngineEvent, HardwareComponent};
pub use scheduler::{BroadcastMode, Scheduler};

use crate::crypto::engine::encrypt;
use crate::crypto::vault::{KeyVault, StoredKey};
use crate::message::codec::encode_message;
use crate::message::{Message, Position};
use crate::platform::PositionProvider;
use crate::radio::arbiter::{ArbiterSignal, RadioArbiter, StopOutcome, STOP_CONFIRM_TIMEOUT};
use crate::radio::driver::{Observation, RadioCallback, RadioDriver, RadioHooks};
use crate::radio::{AdvertisingFrame, PhyPreference};
use crate::replay::ReplayCache;
use crate::store::backend::StorageBackend;
use crate::store::contacts::{Contact, ContactStore};
use crate::store::identity::IdentityStore;
use crate::EngineError;
use events::EventSink;
use scheduler::{ACK_HOLD, BUSY_BACKOFF, HARDWARE_COOLDOWN, SOS_TICK_INTERVAL};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;
use zeroize::Zeroizing;

/// Everything the engine needs from the platform.
pub struct EngineConfig {
    pub storage: Arc<dyn StorageBackend>,
    pub radio: Box<dyn RadioDriver>,
    pub position: Box<dyn PositionProvider>,
}

/// Commands accepted by the engine task.
#[derive(Debug)]
pub enum EngineCommand {
    StartSos,
    SendAck { contact_id: String },
    StopBroadcast,
    AddContact(Contact),
    RemoveContact { contact_id: String },
    Shutdown,
}

/// Cloneable command surface handed to the UI collaborator. All sends
/// are fire-and-forget; a gone engine swallows them.
#[derive(Clone)]
pub struct EngineHandle {
    tx: UnboundedSender<EngineCommand>,
}

impl EngineHandle {
    pub fn start_sos(&self) {
        let _ = self.tx.send(EngineCommand::StartSos);
    }

    pub fn send_ack(&self, contact_id: impl Into<String>) {
        let _ = self.tx.send(EngineCommand::SendAck {
            contact_id: contact_id.into(),
        });
    }

    pub fn stop_broadcast(&self) {
        let _ = self.tx.send(EngineCommand::StopBroadcast);
    }

    pub fn add_contact(&self, contact: Contact) {
        let _ = self.tx.send(EngineCommand::AddContact(contact));
    }

    pub fn remove_contact(&self, contact_id: impl Into<String>) {
        let _ = self.tx.send(EngineCommand::RemoveContact {
            contact_id: contact_id.into(),
        });
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(EngineCommand::Shutdown);
    }
}

/// One wakeup of the engine loop.
enum Input {
    Command(Option<EngineCommand>),
    Callback(Option<RadioCallback>),
    Observation(Option<Observation>),
    Deadline,
}

pub struct Engine {
    device_id: String,
    own_key: Zeroizing<[u8; 32]>,
    vault: KeyVault,
    contacts: ContactStore,
    replay: ReplayCache,
    scheduler: Scheduler,
    arbiter: RadioArbiter,
    position: Box<dyn PositionProvider>,
    phy: PhyPreference,
    events: EventSink,
    commands: UnboundedReceiver<EngineCommand>,
    completions: UnboundedReceiver<RadioCallback>,
    observations: UnboundedReceiver<Observation>,
    // Keeps the driver-facing channels open even if a driver drops its
    // copy of the hooks.
    _hooks: RadioHooks,
    radio_ok: bool,
    // Deadlines serviced by the run loop. `None` means not armed.
    tick_at: Option<Instant>,
    broadcast_at: Option<Instant>,
    ack_release_at: Option<Instant>,
    stop_timeout_at: Option<Instant>,
    // Position fix read at tick time, spent by the following broadcast
    pending_fix: Option<Position>,
}

impl Engine {
    /// Build an engine: provision identity and vault, load contacts,
    /// wire the driver's channels. Returns the engine, its command
    /// handle, and the event stream.
    pub fn new(
        config: EngineConfig,
    ) -> Result<(Self, EngineHandle, UnboundedReceiver<EngineEvent>), EngineError> {
        let vault = KeyVault::open(&config.storage)?;
        let identity = IdentityStore::new(config.storage.clone()).load_or_generate(&vault)?;
        let own_key = identity.key.open(&vault).ok_or(EngineError::KeyUnavailable)?;
        let contacts = ContactStore::load(config.storage.clone())?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (observation_tx, observation_rx) = mpsc::unbounded_channel();

        let hooks = RadioHooks {
            completions: completion_tx,
            observations: observation_tx,
        };
        let mut radio = config.radio;
        radio.attach(hooks.clone());
        let arbiter = RadioArbiter::new(radio);
        let phy = arbiter.capabilities().preferred_phy();

        tracing::info!(id = %identity.id, ?phy, "engine ready");

        let engine = Self {
            device_id: identity.id,
            own_key,
            vault,
            contacts,
            replay: ReplayCache::new(),
            scheduler: Scheduler::new(),
            arbiter,
            position: config.position,
            phy,
            events: EventSink::new(event_tx),
            commands: command_rx,
            completions: completion_rx,
            observations: observation_rx,
            _hooks: hooks,
            radio_ok: false,
            tick_at: None,
            broadcast_at: None,
            ack_release_at: None,
            stop_timeout_at: None,
            pending_fix: None,
        };

        Ok((engine, EngineHandle { tx: command_tx }, event_rx))
    }

    /// Short identifier this device stamps into every packet.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Drive the engine until `Shutdown` (or every handle is dropped).
    pub async fn run(mut self) {
        self.events.hardware(HardwareComponent::Service, true);

        self.radio_ok = self.arbiter.start_scanning().is_ok();
        self.events.hardware(HardwareComponent::Radio, self.radio_ok);
        if !self.radio_ok {
            tracing::warn!("scanner failed to start; receive path is down");
        }

        let fix_available = self.position.current_fix().is_some();
        self.events.hardware(HardwareComponent::Position, fix_available);

        loop {
            let next_deadline = [
                self.tick_at,
                self.broadcast_at,
                self.ack_release_at,
                self.stop_timeout_at,
            ]
            .into_iter()
            .flatten()
            .min();

            let input = tokio::select! {
                command = self.commands.recv() => Input::Command(command),
                callback = self.completions.recv() => Input::Callback(callback),
                observation = self.observations.recv() => Input::Observation(observation),
                _ = sleep_until_opt(next_deadline), if next_deadline.is_some() => Input::Deadline,
            };

            match input {
                Input::Command(Some(EngineCommand::Shutdown)) | Input::Command(None) => break,
                Input::Command(Some(command)) => self.on_command(command),
                Input::Callback(Some(callback)) => self.on_radio_callback(callback),
                Input::Observation(Some(observation)) => self.on_observation(observation),
                Input::Callback(None) | Input::Observation(None) => {}
                Input::Deadline => self.on_deadline(Instant::now()),
            }
        }

        self.enter_idle();
        let _ = self.arbiter.stop_scanning();
        self.events.hardware(HardwareComponent::Service, false);
        tracing::info!("engine stopped");
    }

    fn on_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::StartSos => self.start_sos(),
            EngineCommand::SendAck { contact_id } => self.start_ack(contact_id),
            EngineCommand::StopBroadcast => {
                self.events.log("Broadcast stopped");
                self.enter_idle();
            }
            EngineCommand::AddContact(contact) => {
                let name = contact.name.clone();
                match self.contacts.add(contact) {
                    Ok(()) => self.events.log(format!("Contact added: {name}")),
                    Err(e) => self.events.log(format!("Could not add contact: {e}")),
                }
            }
            EngineCommand::RemoveContact { contact_id } => match self.contacts.remove(&contact_id)
            {
                Ok(true) => self.events.log(format!("Contact removed: {contact_id}")),
                Ok(false) => self.events.log(format!("No such contact: {contact_id}")),
                Err(e) => self.events.log(format!("Could not remove contact: {e}")),
            },
            // Handled by the run loop before dispatch
            EngineCommand::Shutdown => {}
        }
    }

    fn start_sos(&mut self) {
        if self.contacts.is_empty() {
            tracing::warn!("SOS requested with no contacts");
            self.events
                .log("No contacts — pair with someone before broadcasting");
            return;
        }
        if self.scheduler.mode() == &BroadcastMode::Sos {
            return;
        }

        self.clear_broadcast_deadlines();
        self.scheduler.set_mode(BroadcastMode::Sos);
        self.events.status(BroadcastStatus::Sos);
        self.events.log("SOS broadcast started");
        self.tick_at = Some(Instant::now());
    }

    fn start_ack(&mut self, contact_id: String) {
        let Some(contact) = self.contacts.find(&contact_id) else {
            self.events.log(format!("No such contact: {contact_id}"));
            self.enter_idle();
            return;
        };
        let name = contact.name.clone();

        self.clear_broadcast_deadlines();
        self.scheduler.set_mode(BroadcastMode::AckTo(contact_id));
        self.events.status(BroadcastStatus::Ack);
        self.events.log(format!("Acknowledging {name}"));
        self.request_stop_with_timeout();
        self.broadcast_at = Some(Instant::now() + HARDWARE_COOLDOWN);
    }

    /// Cancel every pending deadline and settle the radio. The one
    /// cancellation path, safe from any state including mid-cool-down.
    fn enter_idle(&mut self) {
        self.clear_broadcast_deadlines();
        self.pending_fix = None;
        self.request_stop_with_timeout();
        if !self.scheduler.is_idle() {
            self.scheduler.set_mode(BroadcastMode::Idle);
            self.events.status(BroadcastStatus::Idle);
        }
    }

    /// Deadlines tied to the current mode. The stop-confirmation
    /// timeout is deliberately not among them; it outlives mode changes.
    fn clear_broadcast_deadlines(&mut self) {
        self.tick_at = None;
        self.broadcast_at = None;
        self.ack_release_at = None;
    }

    fn request_stop_with_timeout(&mut self) {
        if self.arbiter.request_stop() == StopOutcome::Issued {
            self.stop_timeout_at = Some(Instant::now() + STOP_CONFIRM_TIMEOUT);
        }
    }

    fn on_deadline(&mut self, now: Instant) {
        if take_expired(&mut self.stop_timeout_at, now) {
            self.arbiter.force_idle();
        }
        if take_expired(&mut self.broadcast_at, now) {
            self.on_broadcast_due();
        }
        if take_expired(&mut self.tick_at, now) {
            self.on_tick();
        }
        if take_expired(&mut self.ack_release_at, now) {
            self.events.log("ACK hold elapsed");
            self.enter_idle();
        }
    }

    /// One scheduling tick in SOS mode: read a fix, stop the radio,
    /// and arm the post-cool-down broadcast.
    fn on_tick(&mut self) {
        if self.scheduler.mode() != &BroadcastMode::Sos {
            return;
        }

        if self.contacts.is_empty() {
            tracing::warn!("contact list emptied mid-rotation");
            self.events.log("No contacts — stopping SOS");
            self.enter_idle();
            return;
        }

        if self.arbiter.in_transition() {
            // A prior command is still settling; retry shortly without
            // consuming a rotation step.
            self.tick_at = Some(Instant::now() + BUSY_BACKOFF);
            return;
        }

        self.pending_fix = self.position.current_fix();
        self.request_stop_with_timeout();
        self.broadcast_at = Some(Instant::now() + HARDWARE_COOLDOWN);
    }

    fn on_broadcast_due(&mut self) {
        match self.scheduler.mode().clone() {
            BroadcastMode::Sos => self.broadcast_sos(),
            BroadcastMode::AckTo(contact_id) => self.broadcast_ack(&contact_id),
            BroadcastMode::Idle => {}
        }
    }

    fn broadcast_sos(&mut self) {
        if self.arbiter.is_busy() {
            // The stop has not settled yet; the timeout bounds this.
            self.broadcast_at = Some(Instant::now() + BUSY_BACKOFF);
            return;
        }

        let count = self.contacts.len();
        if count == 0 {
            self.events.log("No contacts — stopping SOS");
            self.enter_idle();
            return;
        }

        let index = self.scheduler.current_index(count);
        let Some(contact) = self.contacts.get(index).cloned() else {
            return;
        };

        let message = Message::sos(self.device_id.clone(), self.pending_fix);
        match self.seal_and_start(&message, &contact) {
            Ok(()) => {
                self.pending_fix = None;
                self.events.log(format!("TX: [SOS] -> {}", contact.name));
                self.scheduler.advance(count);
                self.tick_at = Some(Instant::now() + SOS_TICK_INTERVAL);
            }
            Err(EngineError::RadioBusy) => {
                self.broadcast_at = Some(Instant::now() + BUSY_BACKOFF);
            }
            Err(e) => {
                // This contact is skipped for the cycle; rotation continues
                self.pending_fix = None;
                self.report_send_error(&contact, &e);
                self.scheduler.advance(count);
                self.tick_at = Some(Instant::now() + SOS_TICK_INTERVAL);
            }
        }
    }

    fn broadcast_ack(&mut self, contact_id: &str) {
        if self.arbiter.is_busy() {
            self.broadcast_at = Some(Instant::now() + BUSY_BACKOFF);
            return;
        }

        let Some(contact) = self.contacts.find(contact_id).cloned() else {
            self.events
                .log(format!("Contact {contact_id} gone — ACK cancelled"));
            self.enter_idle();
            return;
        };

        let message = Message::ack(self.device_id.clone());
        match self.seal_and_start(&message, &contact) {
            Ok(()) => {
                self.events.log(format!("TX: [ACK] -> {}", contact.name));
                self.ack_release_at = Some(Instant::now() + ACK_HOLD);
            }
            Err(EngineError::RadioBusy) => {
                self.broadcast_at = Some(Instant::now() + BUSY_BACKOFF);
            }
            Err(e) => {
                self.report_send_error(&contact, &e);
                self.enter_idle();
            }
        }
    }

    /// Encode, seal under the contact's key, and hand to the radio.
    fn seal_and_start(
        &mut self,
        message: &Message,
        contact: &Contact,
    ) -> Result<(), EngineError> {
        let stored = StoredKey::from_blob(&contact.wrapped_key)
            .map_err(|_| EngineError::KeyUnavailable)?;
        let key = stored.open(&self.vault).ok_or(EngineError::KeyUnavailable)?;
        let plaintext = encode_message(message)?;
        let frame = encrypt(&plaintext, &key)?;
        let advert = AdvertisingFrame::new(frame.to_bytes(), self.phy);
        self.arbiter.request_start(&advert)
    }

    fn report_send_error(&mut self, contact: &Contact, error: &EngineError) {
        tracing::warn!(contact = %contact.id, %error, "broadcast skipped");
        match error {
            EngineError::KeyUnavailable => self
                .events
                .log(format!("Key unavailable for {} — skipped", contact.name)),
            EngineError::RadioFailed(code) => {
                self.set_radio_ok(false);
                self.events
                    .log(format!("Radio start failed ({code}) — {} skipped", contact.name));
            }
            _ => self
                .events
                .log(format!("Broadcast to {} failed: {error}", contact.name)),
        }
    }

    fn on_radio_callback(&mut self, callback: RadioCallback) {
        match self.arbiter.on_callback(callback) {
            Some(ArbiterSignal::Ready) => {
                tracing::debug!("advertising confirmed");
                self.set_radio_ok(true);
            }
            Some(ArbiterSignal::Failed(code)) => {
                self.set_radio_ok(false);
                self.events.log(format!("Radio start failed ({code})"));
                // SOS rotation already armed its next tick and carries
                // on; a failed ACK has nothing left to hold for.
                if matches!(self.scheduler.mode(), BroadcastMode::AckTo(_)) {
                    self.enter_idle();
                }
            }
            Some(ArbiterSignal::Stopped) => {
                self.stop_timeout_at = None;
            }
            None => {}
        }
    }

    fn set_radio_ok(&mut self, ok: bool) {
        if self.radio_ok != ok {
            self.radio_ok = ok;
            self.events.hardware(HardwareComponent::Radio, ok);
        }
    }

    fn on_observation(&mut self, observation: Observation) {
        if let Some(event) = receive::handle_observation(
            observation,
            &self.own_key,
            &self.contacts,
            &mut self.replay,
        ) {
            self.events.emit(event);
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn take_expired(slot: &mut Option<Instant>, now: Instant) -> bool {
    if slot.is_some_and(|at| at <= now) {
        *slot = None;
        true
    } else {
        false
    }
}
