// Radio driver seam — where platform hardware plugs in
//
// Drivers issue commands synchronously but report outcomes
// asynchronously: start/stop confirmations and inbound scan results are
// pushed into channels owned by the engine's single-writer loop. A driver
// never mutates engine state directly.

use crate::platform::RadioCapabilities;
use crate::radio::AdvertisingFrame;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

/// Errors from an immediate driver command (as opposed to an
/// asynchronous completion)
#[derive(Error, Debug, Clone)]
pub enum RadioError {
    #[error("radio command rejected (status {0})")]
    Command(i32),
    #[error("radio adapter unavailable")]
    AdapterUnavailable,
}

impl RadioError {
    /// Hardware status code for event reporting
    pub fn status_code(&self) -> i32 {
        match self {
            Self::Command(code) => *code,
            Self::AdapterUnavailable => -1,
        }
    }
}

/// Asynchronous completion of a start/stop command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCallback {
    /// Start command settled: Ok, or a hardware status code
    Started(Result<(), i32>),
    /// Stop command settled
    Stopped,
}

/// One inbound scan result: the advertised service data plus signal
/// strength
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub payload: Vec<u8>,
    pub rssi: i16,
}

/// Channels a driver pushes into. Handed over once, before any command.
#[derive(Clone)]
pub struct RadioHooks {
    pub completions: UnboundedSender<RadioCallback>,
    pub observations: UnboundedSender<Observation>,
}

/// The hardware-facing radio contract.
///
/// Implementations wrap a platform advertising stack (or the in-process
/// loopback). All methods must return promptly; slow work belongs behind
/// the completion channel.
pub trait RadioDriver: Send {
    /// Receive the engine's channels. Called exactly once before any
    /// other method.
    fn attach(&mut self, hooks: RadioHooks);

    /// Hardware capabilities, resolved once at startup
    fn capabilities(&self) -> RadioCapabilities;

    /// Begin advertising the frame. Completion arrives as
    /// `RadioCallback::Started`.
    fn start_advertising(&mut self, frame: &AdvertisingFrame) -> Result<(), RadioError>;

    /// Stop advertising. Completion arrives as `RadioCallback::Stopped`.
    fn stop_advertising(&mut self) -> Result<(), RadioError>;

    /// Begin scanning for frames carrying our service identifier.
    fn start_scanning(&mut self) -> Result<(), RadioError>;

    /// Stop scanning.
    fn stop_scanning(&mut self) -> Result<(), RadioError>;
}
