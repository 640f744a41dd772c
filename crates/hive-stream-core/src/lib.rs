//! Core contracts for attaching to streaming agent runs.
//!
//! This crate provides the pieces every session shares:
//! - `TypeBag` - Generic payload configuration for a session
//! - `StreamOptions` - Caller options and the managed/custom discriminator
//! - `StreamFrame` - Typed frames emitted by a running agent
//! - `FrameStore` - Broadcast + history for late subscribers
//! - `StreamTransport` - Connection strategy capability

pub mod bag;
pub mod config;
pub mod context;
pub mod frame;
pub mod frame_store;
pub mod options;
pub mod traits;

pub use bag::{Bag, Configurable, DefaultBag, State, TypeBag};
pub use config::ClientConfig;
pub use context::RunConfig;
pub use frame::{RunMetadata, StreamEvent, StreamFault, StreamFrame, StreamMode};
pub use frame_store::FrameStore;
pub use options::{
    Callback, Callbacks, Classified, CommonOptions, CustomOptions, ManagedOptions, OptionsError,
    Selection, StreamOptions, classify,
};
pub use traits::{
    Command, FrameStream, RunTicket, StreamTransport, SubmitRequest, ThreadSnapshot,
    TransportError,
};
