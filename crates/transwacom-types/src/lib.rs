//! Shared types for transwacom.
//!
//! This crate contains all types shared across the transwacom workspace:
//! wire protocol messages, input events, device descriptors, machine
//! identity, and the static event-code table.

pub mod codes;
pub mod device;
pub mod event;
pub mod identity;
pub mod message;

pub use codes::EventClass;
pub use device::{DeviceDescriptor, DeviceType};
pub use event::InputEvent;
pub use identity::MachineIdentity;
pub use message::{Message, PROTOCOL_VERSION};
