//! # Domain Events
//!
//! Event layer connecting state changes to the device protocol and to
//! passive observers.
//!
//! - [`domain`]: the typed [`DomainEvent`] catalog
//! - [`dispatcher`]: kind-routed delivery with an observer broadcast

pub mod dispatcher;
pub mod domain;

pub use dispatcher::{EventDispatcher, EventHandler};
pub use domain::{DomainEvent, EventKind};
