//! Session driver and stable dispatch for streaming agent runs.
//!
//! Provides:
//! - `HiveStream` / `StreamSession` - Attach once, re-evaluate many times
//! - `ManagedSession` / `CustomSession` - Typed entry points
//! - `StableSelection` - Connection strategy frozen at creation
//! - `SessionDriver` - Thread state, submit, stop

pub mod driver;
pub mod error;
pub mod handle;
pub mod selection;
pub mod session;

pub use driver::{Interrupt, SessionDriver, SubmitOptions, ThreadValues};
pub use error::StreamError;
pub use handle::{CustomStream, ManagedStream, StreamHandle};
pub use selection::StableSelection;
pub use session::{CustomSession, HiveStream, ManagedSession, StreamSession};

pub use hive_stream_core::{
    Bag, ClientConfig, Command, Configurable, CustomOptions, DefaultBag, ManagedOptions,
    OptionsError, RunConfig, RunMetadata, RunTicket, Selection, State, StreamEvent, StreamFrame,
    StreamMode, StreamOptions, StreamTransport, TypeBag, classify,
};
pub use hive_stream_transport::HttpTransport;
