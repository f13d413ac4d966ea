// In-process radio — frames loop back as observations
//
// Stands in for the hardware stack in tests and the CLI self-test.
// Completions are posted through the same channels a real adapter would
// use, so the engine exercises its full callback path.

use crate::platform::RadioCapabilities;
use crate::radio::driver::{Observation, RadioCallback, RadioDriver, RadioError, RadioHooks};
use crate::radio::AdvertisingFrame;
use std::sync::{Arc, Mutex};

/// Simulated signal strength for echoed frames
const LOOPBACK_RSSI: i16 = -42;

#[derive(Default)]
struct Inner {
    hooks: Option<RadioHooks>,
    transmissions: Vec<Vec<u8>>,
    scanning: bool,
    echo: bool,
}

/// Radio driver that keeps everything on this device.
pub struct LoopbackRadio {
    inner: Arc<Mutex<Inner>>,
    capabilities: RadioCapabilities,
}

impl Default for LoopbackRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackRadio {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            capabilities: RadioCapabilities::default(),
        }
    }

    /// Feed every transmitted frame back in as an observation while
    /// scanning is active.
    pub fn with_echo(self) -> Self {
        self.inner.lock().unwrap().echo = true;
        self
    }

    pub fn with_extended_range(mut self) -> Self {
        self.capabilities.extended_range = true;
        self
    }

    /// A handle for observing and injecting from outside the engine.
    pub fn handle(&self) -> LoopbackHandle {
        LoopbackHandle {
            inner: self.inner.clone(),
        }
    }
}

impl RadioDriver for LoopbackRadio {
    fn attach(&mut self, hooks: RadioHooks) {
        self.inner.lock().unwrap().hooks = Some(hooks);
    }

    fn capabilities(&self) -> RadioCapabilities {
        self.capabilities
    }

    fn start_advertising(&mut self, frame: &AdvertisingFrame) -> Result<(), RadioError> {
        let mut inner = self.inner.lock().unwrap();
        inner.transmissions.push(frame.payload.clone());

        let Some(hooks) = inner.hooks.clone() else {
            return Err(RadioError::AdapterUnavailable);
        };
        let _ = hooks.completions.send(RadioCallback::Started(Ok(())));

        if inner.echo && inner.scanning {
            let _ = hooks.observations.send(Observation {
                payload: frame.payload.clone(),
                rssi: LOOPBACK_RSSI,
            });
        }
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), RadioError> {
        let inner = self.inner.lock().unwrap();
        let Some(hooks) = inner.hooks.clone() else {
            return Err(RadioError::AdapterUnavailable);
        };
        let _ = hooks.completions.send(RadioCallback::Stopped);
        Ok(())
    }

    fn start_scanning(&mut self) -> Result<(), RadioError> {
        self.inner.lock().unwrap().scanning = true;
        Ok(())
    }

    fn stop_scanning(&mut self) -> Result<(), RadioError> {
        self.inner.lock().unwrap().scanning = false;
        Ok(())
    }
}

/// Cloneable view into a `LoopbackRadio`, usable after the driver has
/// moved into the engine.
#[derive(Clone)]
pub struct LoopbackHandle {
    inner: Arc<Mutex<Inner>>,
}

impl LoopbackHandle {
    /// Every frame handed to the radio so far, oldest first.
    pub fn transmissions(&self) -> Vec<Vec<u8>> {
        self.inner.lock().unwrap().transmissions.clone()
    }

    /// Deliver a foreign frame as if it had been scanned off the air.
    /// Returns false if the engine is gone or never attached.
    pub fn inject(&self, payload: Vec<u8>, rssi: i16) -> bool {
        let inner = self.inner.lock().unwrap();
        match &inner.hooks {
            Some(hooks) => hooks
                .observations
                .send(Observation { payload, rssi })
                .is_ok(),
            None => false,
        }
    }
}
