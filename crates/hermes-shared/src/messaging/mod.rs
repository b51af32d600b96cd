//! # Messaging Layer
//!
//! Queue wire formats, naming, the provider-agnostic service layer, and the
//! domain client facade.

pub mod client;
pub mod error;
pub mod messages;
pub mod naming;
pub mod service;

pub use client::QueueClient;
pub use error::MessagingError;
pub use messages::{
    ClaimRequest, InterruptMessage, MessageAttributes, Priority, QueuePayload, ResponseMessage,
    WorkMessage,
};
pub use naming::{
    validate_queue_name, DefaultQueueNamer, QueueNamer, QueueNamerKind, QueueRole,
    DEFAULT_QUEUE_PREFIX,
};
