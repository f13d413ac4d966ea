// Radio arbiter — serializes every command against the one physical radio
//
// The radio's start/stop outcomes arrive as asynchronous callbacks, and
// the hardware corrupts the broadcast if it receives overlapping
// commands. The arbiter is the only writer of `RadioState`; everyone else
// issues intents and reads the busy signal.

use crate::radio::driver::{RadioCallback, RadioDriver, RadioError};
use crate::radio::AdvertisingFrame;
use crate::EngineError;
use std::time::Duration;

/// Bound on waiting for a stop confirmation. The underlying stack is not
/// fully trusted to always call back; past this the arbiter forces Idle.
pub const STOP_CONFIRM_TIMEOUT: Duration = Duration::from_millis(200);

/// Command/response cycle of the physical radio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioState {
    /// No operation in flight, ready for a start
    Idle,
    /// Start issued, confirmation pending
    Starting,
    /// On the air
    Advertising,
    /// Stop issued, confirmation pending
    Stopping,
}

/// What `request_stop` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// A stop command went to the hardware; arm the confirmation timeout
    Issued,
    /// Nothing to stop
    NoOp,
}

/// State-machine output the engine loop reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbiterSignal {
    /// Start confirmed; the frame is on the air
    Ready,
    /// Start failed with a hardware status code
    Failed(i32),
    /// Stop confirmed
    Stopped,
}

pub struct RadioArbiter {
    state: RadioState,
    driver: Box<dyn RadioDriver>,
}

impl RadioArbiter {
    pub fn new(driver: Box<dyn RadioDriver>) -> Self {
        Self {
            state: RadioState::Idle,
            driver,
        }
    }

    pub fn state(&self) -> RadioState {
        self.state
    }

    /// True whenever any operation is in flight or on the air.
    pub fn is_busy(&self) -> bool {
        self.state != RadioState::Idle
    }

    /// True only while a command is awaiting its confirmation. Steady
    /// advertising is busy but not in transition; the scheduler stops it
    /// itself.
    pub fn in_transition(&self) -> bool {
        matches!(self.state, RadioState::Starting | RadioState::Stopping)
    }

    /// Issue a start. Rejected with `RadioBusy` unless Idle.
    pub fn request_start(&mut self, frame: &AdvertisingFrame) -> Result<(), EngineError> {
        if self.state != RadioState::Idle {
            return Err(EngineError::RadioBusy);
        }

        self.state = RadioState::Starting;
        if let Err(e) = self.driver.start_advertising(frame) {
            self.state = RadioState::Idle;
            return Err(EngineError::RadioFailed(e.status_code()));
        }
        Ok(())
    }

    /// Issue a stop if we are on the air. Idempotent: Idle and Stopping
    /// are no-ops, and a pending start resolves through its own callback.
    pub fn request_stop(&mut self) -> StopOutcome {
        match self.state {
            RadioState::Advertising => {
                self.state = RadioState::Stopping;
                if self.driver.stop_advertising().is_err() {
                    // Command never reached the hardware; nothing will
                    // call back, so settle immediately.
                    self.state = RadioState::Idle;
                }
                StopOutcome::Issued
            }
            _ => StopOutcome::NoOp,
        }
    }

    /// Feed an asynchronous hardware confirmation through the state
    /// machine.
    pub fn on_callback(&mut self, callback: RadioCallback) -> Option<ArbiterSignal> {
        match (self.state, callback) {
            (RadioState::Starting, RadioCallback::Started(Ok(()))) => {
                self.state = RadioState::Advertising;
                Some(ArbiterSignal::Ready)
            }
            (RadioState::Starting, RadioCallback::Started(Err(code))) => {
                self.state = RadioState::Idle;
                Some(ArbiterSignal::Failed(code))
            }
            (RadioState::Stopping, RadioCallback::Stopped) => {
                self.state = RadioState::Idle;
                Some(ArbiterSignal::Stopped)
            }
            (state, callback) => {
                // Stale or out-of-order callback, e.g. a stop
                // confirmation landing after the defensive timeout
                // already forced Idle.
                tracing::debug!(?state, ?callback, "ignoring stray radio callback");
                None
            }
        }
    }

    /// Defensive timeout path: the stop confirmation never came.
    pub fn force_idle(&mut self) {
        if self.state != RadioState::Idle {
            tracing::warn!(state = ?self.state, "radio confirmation timed out, forcing idle");
            self.state = RadioState::Idle;
        }
    }

    pub fn start_scanning(&mut self) -> Result<(), RadioError> {
        self.driver.start_scanning()
    }

    pub fn stop_scanning(&mut self) -> Result<(), RadioError> {
        self.driver.stop_scanning()
    }

    pub fn attach(&mut self, hooks: crate::radio::driver::RadioHooks) {
        self.driver.attach(hooks);
    }

    pub fn capabilities(&self) -> crate::platform::RadioCapabilities {
        self.driver.capabilities()
    }
}
