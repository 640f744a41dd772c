//! Result handles returned to the caller.
//!
//! Both handle shapes dereference to the shared [`SessionDriver`]; the
//! managed shape adds the fields derived from its identifiers.

use std::{ops::Deref, sync::Arc};

use hive_stream_core::{
    ClientConfig, CustomOptions, DefaultBag, ManagedOptions, RunTicket, Selection, State,
    StreamTransport, TypeBag,
};
use hive_stream_transport::HttpTransport;

use crate::{SessionDriver, StreamError, driver::ThreadValues};

/// Handle of a session whose connection is managed from identifiers.
pub struct ManagedStream<S = State, B: TypeBag = DefaultBag> {
    driver: SessionDriver<S, B>,
    transport: Arc<HttpTransport>,
}

impl<S, B: TypeBag> Clone for ManagedStream<S, B> {
    fn clone(&self) -> Self {
        Self {
            driver: self.driver.clone(),
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<S, B: TypeBag> Deref for ManagedStream<S, B> {
    type Target = SessionDriver<S, B>;

    fn deref(&self) -> &Self::Target {
        &self.driver
    }
}

impl<S: ThreadValues, B: TypeBag> ManagedStream<S, B> {
    pub(crate) fn open(options: ManagedOptions<S, B>) -> Result<Self, StreamError> {
        let ManagedOptions {
            assistant_id,
            client,
            common,
        } = options;
        let transport = Arc::new(HttpTransport::new(client, assistant_id)?);
        let driver = SessionDriver::new(
            Arc::clone(&transport) as Arc<dyn StreamTransport>,
            common,
        );
        Ok(Self { driver, transport })
    }

    /// Assistant this session runs.
    #[must_use]
    pub fn assistant_id(&self) -> &str {
        self.transport.assistant_id()
    }

    /// Server connection settings.
    #[must_use]
    pub fn client_config(&self) -> &ClientConfig {
        self.transport.config()
    }

    /// Rejoin a run already executing on this session's thread.
    ///
    /// # Errors
    /// Returns [`StreamError::NoThread`] before a thread is attached, or
    /// [`StreamError::Busy`] while another run is streaming.
    pub async fn join_stream(&self, run_id: impl Into<String>) -> Result<(), StreamError> {
        let thread_id = self.thread_id().ok_or(StreamError::NoThread)?;
        self.driver
            .join(RunTicket {
                run_id: run_id.into(),
                thread_id,
            })
            .await
    }
}

/// Handle of a session driven by a caller-supplied transport.
pub struct CustomStream<S = State, B: TypeBag = DefaultBag> {
    driver: SessionDriver<S, B>,
}

impl<S, B: TypeBag> Clone for CustomStream<S, B> {
    fn clone(&self) -> Self {
        Self {
            driver: self.driver.clone(),
        }
    }
}

impl<S, B: TypeBag> Deref for CustomStream<S, B> {
    type Target = SessionDriver<S, B>;

    fn deref(&self) -> &Self::Target {
        &self.driver
    }
}

impl<S: ThreadValues, B: TypeBag> CustomStream<S, B> {
    pub(crate) fn open(options: CustomOptions<S, B>) -> Self {
        Self {
            driver: SessionDriver::new(options.transport, options.common),
        }
    }
}

/// Either handle shape, for callers whose options were not statically typed.
pub enum StreamHandle<S = State, B: TypeBag = DefaultBag> {
    Managed(ManagedStream<S, B>),
    Custom(CustomStream<S, B>),
}

impl<S, B: TypeBag> Clone for StreamHandle<S, B> {
    fn clone(&self) -> Self {
        match self {
            Self::Managed(m) => Self::Managed(m.clone()),
            Self::Custom(c) => Self::Custom(c.clone()),
        }
    }
}

impl<S, B: TypeBag> Deref for StreamHandle<S, B> {
    type Target = SessionDriver<S, B>;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Managed(m) => &m.driver,
            Self::Custom(c) => &c.driver,
        }
    }
}

impl<S, B: TypeBag> StreamHandle<S, B> {
    /// Shape of this handle.
    #[must_use]
    pub const fn selection(&self) -> Selection {
        match self {
            Self::Managed(_) => Selection::Managed,
            Self::Custom(_) => Selection::Custom,
        }
    }

    #[must_use]
    pub const fn as_managed(&self) -> Option<&ManagedStream<S, B>> {
        match self {
            Self::Managed(m) => Some(m),
            Self::Custom(_) => None,
        }
    }

    #[must_use]
    pub const fn as_custom(&self) -> Option<&CustomStream<S, B>> {
        match self {
            Self::Custom(c) => Some(c),
            Self::Managed(_) => None,
        }
    }

    /// Narrow to the managed shape.
    ///
    /// # Errors
    /// Returns the handle unchanged when it is custom.
    pub fn into_managed(self) -> Result<ManagedStream<S, B>, Self> {
        match self {
            Self::Managed(m) => Ok(m),
            other @ Self::Custom(_) => Err(other),
        }
    }

    /// Narrow to the custom shape.
    ///
    /// # Errors
    /// Returns the handle unchanged when it is managed.
    pub fn into_custom(self) -> Result<CustomStream<S, B>, Self> {
        match self {
            Self::Custom(c) => Ok(c),
            other @ Self::Managed(_) => Err(other),
        }
    }
}
