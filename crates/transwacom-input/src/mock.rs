//! Mock input backends for testing.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use transwacom_types::{DeviceType, InputEvent};

use crate::error::InputError;
use crate::InputInjector;

/// One recorded injection.
#[derive(Debug, Clone)]
pub struct InjectedBatch {
    pub device_type: DeviceType,
    pub events: Vec<InputEvent>,
}

#[derive(Debug, Default)]
struct MockInjectorState {
    batches: Vec<InjectedBatch>,
    created: Vec<DeviceType>,
    destroyed: bool,
    fail_creation: bool,
}

/// Records injected batches instead of touching uinput.
#[derive(Default)]
pub struct MockInjector {
    state: Arc<Mutex<MockInjectorState>>,
}

impl MockInjector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a clonable handle for observing injections from tests.
    #[must_use]
    pub fn handle(&self) -> MockInjectorHandle {
        MockInjectorHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Make every device creation fail, for capability-failure tests.
    pub fn fail_creation(&self) {
        self.state.lock().unwrap().fail_creation = true;
    }
}

/// Clonable observer handle for [`MockInjector`].
#[derive(Clone)]
pub struct MockInjectorHandle {
    state: Arc<Mutex<MockInjectorState>>,
}

impl MockInjectorHandle {
    #[must_use]
    pub fn batches(&self) -> Vec<InjectedBatch> {
        self.state.lock().unwrap().batches.clone()
    }

    /// Device classes in creation order (each created once).
    #[must_use]
    pub fn created_devices(&self) -> Vec<DeviceType> {
        self.state.lock().unwrap().created.clone()
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.state.lock().unwrap().destroyed
    }
}

#[async_trait]
impl InputInjector for MockInjector {
    async fn inject_batch(
        &mut self,
        device_type: DeviceType,
        events: &[InputEvent],
    ) -> Result<(), InputError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_creation {
            return Err(InputError::VirtualDeviceCreate("mock denied".to_string()));
        }
        if !state.created.contains(&device_type) {
            state.created.push(device_type);
        }
        state.batches.push(InjectedBatch {
            device_type,
            events: events.to_vec(),
        });
        Ok(())
    }

    async fn destroy_all(&mut self) -> Result<(), InputError> {
        let mut state = self.state.lock().unwrap();
        state.destroyed = true;
        state.created.clear();
        Ok(())
    }
}
