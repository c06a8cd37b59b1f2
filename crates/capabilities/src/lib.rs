//! `capabilities` crate — the `Capability` trait and its implementations.
//!
//! Every executor a workflow step can call (browser drivers, chat backends,
//! notification dispatchers, the built-in capability) implements
//! [`Capability`]. The engine dispatches through the [`CapabilityRegistry`]
//! and never sees a concrete type.

pub mod builtin;
pub mod error;
pub mod http;
pub mod mock;
pub mod registry;
pub mod traits;

pub use builtin::{BuiltinCapability, BUILTIN_TYPE};
pub use error::CapabilityError;
pub use http::{HttpCapability, HttpCapabilityConfig};
pub use registry::{CapabilityInstance, CapabilityRegistry, InstanceHealth};
pub use traits::{Capability, HealthStatus, InvokeResult};
