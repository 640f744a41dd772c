//! Caller options and the managed/custom discriminator.
//!
//! [`StreamOptions`] is the raw mapping a caller hands over on every
//! evaluation. [`classify`] decides which connection strategy it describes,
//! and [`StreamOptions::into_classified`] turns it into one of the two typed
//! shapes.

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{
    ClientConfig, RunConfig, RunMetadata, StreamMode, StreamTransport,
    bag::{DefaultBag, State, TypeBag},
};

/// Shared callback taking a borrowed payload.
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Which connection strategy a session uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    /// Connection managed internally from logical identifiers.
    Managed,
    /// Connection through a caller-supplied transport.
    Custom,
}

/// Malformed options.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OptionsError {
    #[error("options must name an assistant or supply a transport")]
    MissingIdentity,
}

/// Lifecycle callbacks, all optional.
pub struct Callbacks<S, B: TypeBag> {
    pub on_error: Option<Callback<String>>,
    pub on_finish: Option<Callback<S>>,
    pub on_update_event: Option<Callback<Value>>,
    pub on_custom_event: Option<Callback<B::CustomEvent>>,
    pub on_metadata_event: Option<Callback<RunMetadata>>,
    pub on_thread_id: Option<Callback<String>>,
    pub on_stop: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl<S, B: TypeBag> Default for Callbacks<S, B> {
    fn default() -> Self {
        Self {
            on_error: None,
            on_finish: None,
            on_update_event: None,
            on_custom_event: None,
            on_metadata_event: None,
            on_thread_id: None,
            on_stop: None,
        }
    }
}

impl<S, B: TypeBag> Clone for Callbacks<S, B> {
    fn clone(&self) -> Self {
        Self {
            on_error: self.on_error.clone(),
            on_finish: self.on_finish.clone(),
            on_update_event: self.on_update_event.clone(),
            on_custom_event: self.on_custom_event.clone(),
            on_metadata_event: self.on_metadata_event.clone(),
            on_thread_id: self.on_thread_id.clone(),
            on_stop: self.on_stop.clone(),
        }
    }
}

impl<S, B: TypeBag> fmt::Debug for Callbacks<S, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_error", &self.on_error.is_some())
            .field("on_finish", &self.on_finish.is_some())
            .field("on_update_event", &self.on_update_event.is_some())
            .field("on_custom_event", &self.on_custom_event.is_some())
            .field("on_metadata_event", &self.on_metadata_event.is_some())
            .field("on_thread_id", &self.on_thread_id.is_some())
            .field("on_stop", &self.on_stop.is_some())
            .finish()
    }
}

/// Fields honored by both option shapes, on every evaluation.
pub struct CommonOptions<S, B: TypeBag> {
    pub thread_id: Option<String>,
    pub config: Option<RunConfig<B::Configurable>>,
    pub callbacks: Callbacks<S, B>,
    pub stream_modes: Vec<StreamMode>,
    pub stream_subgraphs: bool,
}

impl<S, B: TypeBag> Default for CommonOptions<S, B> {
    fn default() -> Self {
        Self {
            thread_id: None,
            config: None,
            callbacks: Callbacks::default(),
            stream_modes: StreamMode::DEFAULTS.to_vec(),
            stream_subgraphs: false,
        }
    }
}

impl<S, B: TypeBag> Clone for CommonOptions<S, B> {
    fn clone(&self) -> Self {
        Self {
            thread_id: self.thread_id.clone(),
            config: self.config.clone(),
            callbacks: self.callbacks.clone(),
            stream_modes: self.stream_modes.clone(),
            stream_subgraphs: self.stream_subgraphs,
        }
    }
}

impl<S, B: TypeBag> fmt::Debug for CommonOptions<S, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommonOptions")
            .field("thread_id", &self.thread_id)
            .field("has_config", &self.config.is_some())
            .field("callbacks", &self.callbacks)
            .field("stream_modes", &self.stream_modes)
            .field("stream_subgraphs", &self.stream_subgraphs)
            .finish()
    }
}

/// Options identifying a remote assistant; the connection is managed.
pub struct ManagedOptions<S = State, B: TypeBag = DefaultBag> {
    pub assistant_id: String,
    pub client: ClientConfig,
    pub common: CommonOptions<S, B>,
}

impl<S, B: TypeBag> ManagedOptions<S, B> {
    /// Managed options for `assistant_id` against the default server.
    #[must_use]
    pub fn new(assistant_id: impl Into<String>) -> Self {
        Self {
            assistant_id: assistant_id.into(),
            client: ClientConfig::default(),
            common: CommonOptions::default(),
        }
    }
}

/// Options supplying the connection strategy directly.
pub struct CustomOptions<S = State, B: TypeBag = DefaultBag> {
    pub transport: Arc<dyn StreamTransport>,
    pub common: CommonOptions<S, B>,
}

impl<S, B: TypeBag> CustomOptions<S, B> {
    /// Custom options over `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn StreamTransport>) -> Self {
        Self {
            transport,
            common: CommonOptions::default(),
        }
    }
}

/// Options after classification.
pub enum Classified<S = State, B: TypeBag = DefaultBag> {
    Managed(ManagedOptions<S, B>),
    Custom(CustomOptions<S, B>),
}

impl<S, B: TypeBag> Classified<S, B> {
    #[must_use]
    pub const fn selection(&self) -> Selection {
        match self {
            Self::Managed(_) => Selection::Managed,
            Self::Custom(_) => Selection::Custom,
        }
    }
}

/// Raw options as supplied by the caller.
///
/// Every field is optional. The presence of `transport` alone decides the
/// shape; see [`classify`].
pub struct StreamOptions<S = State, B: TypeBag = DefaultBag> {
    pub assistant_id: Option<String>,
    pub transport: Option<Arc<dyn StreamTransport>>,
    pub client: Option<ClientConfig>,
    pub common: CommonOptions<S, B>,
}

impl<S, B: TypeBag> Default for StreamOptions<S, B> {
    fn default() -> Self {
        Self {
            assistant_id: None,
            transport: None,
            client: None,
            common: CommonOptions::default(),
        }
    }
}

impl<S, B: TypeBag> Clone for StreamOptions<S, B> {
    fn clone(&self) -> Self {
        Self {
            assistant_id: self.assistant_id.clone(),
            transport: self.transport.clone(),
            client: self.client.clone(),
            common: self.common.clone(),
        }
    }
}

impl<S, B: TypeBag> fmt::Debug for StreamOptions<S, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamOptions")
            .field("assistant_id", &self.assistant_id)
            .field("has_transport", &self.transport.is_some())
            .field("client", &self.client)
            .field("common", &self.common)
            .finish()
    }
}

/// Classify options by the presence of a transport.
///
/// Only presence is tested; the transport itself is never inspected.
#[must_use]
pub fn classify<S, B: TypeBag>(options: &StreamOptions<S, B>) -> Selection {
    if options.transport.is_some() {
        Selection::Custom
    } else {
        Selection::Managed
    }
}

impl<S, B: TypeBag> StreamOptions<S, B> {
    /// Empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the assistant (graph) identifier.
    #[must_use]
    pub fn assistant_id(mut self, id: impl Into<String>) -> Self {
        self.assistant_id = Some(id.into());
        self
    }

    /// Set the caller-supplied transport.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn StreamTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the server connection for managed sessions.
    #[must_use]
    pub fn client(mut self, client: ClientConfig) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the thread to attach to.
    #[must_use]
    pub fn thread_id(mut self, id: impl Into<String>) -> Self {
        self.common.thread_id = Some(id.into());
        self
    }

    /// Set the run configuration.
    #[must_use]
    pub fn config(mut self, config: RunConfig<B::Configurable>) -> Self {
        self.common.config = Some(config);
        self
    }

    /// Replace the requested stream modes.
    #[must_use]
    pub fn stream_modes(mut self, modes: impl IntoIterator<Item = StreamMode>) -> Self {
        self.common.stream_modes = modes.into_iter().collect();
        self
    }

    /// Include frames from subgraphs.
    #[must_use]
    pub const fn stream_subgraphs(mut self, enabled: bool) -> Self {
        self.common.stream_subgraphs = enabled;
        self
    }

    #[must_use]
    pub fn on_error(mut self, f: impl Fn(&String) + Send + Sync + 'static) -> Self {
        self.common.callbacks.on_error = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_finish(mut self, f: impl Fn(&S) + Send + Sync + 'static) -> Self {
        self.common.callbacks.on_finish = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_update_event(mut self, f: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.common.callbacks.on_update_event = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_custom_event(mut self, f: impl Fn(&B::CustomEvent) + Send + Sync + 'static) -> Self {
        self.common.callbacks.on_custom_event = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_metadata_event(mut self, f: impl Fn(&RunMetadata) + Send + Sync + 'static) -> Self {
        self.common.callbacks.on_metadata_event = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_thread_id(mut self, f: impl Fn(&String) + Send + Sync + 'static) -> Self {
        self.common.callbacks.on_thread_id = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_stop(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.common.callbacks.on_stop = Some(Arc::new(f));
        self
    }

    /// The shape these options describe.
    #[must_use]
    pub fn selection(&self) -> Selection {
        classify(self)
    }

    /// Convert into the typed shape chosen by [`classify`].
    ///
    /// # Errors
    /// Returns [`OptionsError::MissingIdentity`] when there is no transport and
    /// no non-blank assistant id.
    pub fn into_classified(self) -> Result<Classified<S, B>, OptionsError> {
        let Self {
            assistant_id,
            transport,
            client,
            common,
        } = self;

        if let Some(transport) = transport {
            if assistant_id.is_some() {
                tracing::debug!("transport supplied; ignoring assistant_id");
            }
            return Ok(Classified::Custom(CustomOptions { transport, common }));
        }

        match assistant_id {
            Some(id) if !id.trim().is_empty() => Ok(Classified::Managed(ManagedOptions {
                assistant_id: id,
                client: client.unwrap_or_default(),
                common,
            })),
            _ => Err(OptionsError::MissingIdentity),
        }
    }

    /// Drop the discriminating fields, keeping what every session honors.
    #[must_use]
    pub fn into_common(self) -> CommonOptions<S, B> {
        self.common
    }
}

impl<S, B: TypeBag> From<ManagedOptions<S, B>> for StreamOptions<S, B> {
    fn from(options: ManagedOptions<S, B>) -> Self {
        Self {
            assistant_id: Some(options.assistant_id),
            transport: None,
            client: Some(options.client),
            common: options.common,
        }
    }
}

impl<S, B: TypeBag> From<CustomOptions<S, B>> for StreamOptions<S, B> {
    fn from(options: CustomOptions<S, B>) -> Self {
        Self {
            assistant_id: None,
            transport: Some(options.transport),
            client: None,
            common: options.common,
        }
    }
}

impl<S, B: TypeBag> From<Classified<S, B>> for StreamOptions<S, B> {
    fn from(options: Classified<S, B>) -> Self {
        match options {
            Classified::Managed(o) => o.into(),
            Classified::Custom(o) => o.into(),
        }
    }
}
