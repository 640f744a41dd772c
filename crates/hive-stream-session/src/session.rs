//! Dispatch facade: attach once, re-evaluate many times.
//!
//! A host re-supplies options on every evaluation of the component that owns
//! a session. The connection strategy is chosen from the first options and
//! kept for the lifetime of the session; later options still update the
//! thread id, run config, stream modes and callbacks.

use hive_stream_core::{
    Classified, CustomOptions, DefaultBag, ManagedOptions, OptionsError, Selection, State,
    StreamOptions, TypeBag,
};

use crate::{
    CustomStream, ManagedStream, StableSelection, StreamError, StreamHandle,
    driver::ThreadValues,
};

/// Session created from untyped options.
///
/// Evaluations return the tagged [`StreamHandle`], which the caller narrows.
pub struct StreamSession<S = State, B: TypeBag = DefaultBag> {
    selection: StableSelection,
    handle: StreamHandle<S, B>,
}

impl<S: ThreadValues, B: TypeBag> StreamSession<S, B> {
    /// Create a session, freezing its connection strategy.
    ///
    /// # Errors
    /// Returns [`StreamError::Options`] when the options are neither managed
    /// nor custom shaped; no session is created.
    pub fn attach(options: StreamOptions<S, B>) -> Result<Self, StreamError> {
        let selection = StableSelection::freeze(&options);
        let handle = match options.into_classified()? {
            Classified::Managed(managed) => StreamHandle::Managed(ManagedStream::open(managed)?),
            Classified::Custom(custom) => StreamHandle::Custom(CustomStream::open(custom)),
        };
        tracing::debug!(
            session = %handle.session_id(),
            selection = ?selection.get(),
            "session attached"
        );
        handle.start();
        Ok(Self { selection, handle })
    }

    /// Re-evaluate with fresh options.
    ///
    /// The returned handle always has the shape chosen at attach time.
    #[must_use]
    pub fn evaluate(&self, options: StreamOptions<S, B>) -> StreamHandle<S, B> {
        let selection = self.selection.observe(&options);
        debug_assert_eq!(selection, self.handle.selection());
        self.handle.refresh(options.into_common());
        self.handle.clone()
    }

    /// The frozen connection strategy.
    #[must_use]
    pub const fn selection(&self) -> Selection {
        self.selection.get()
    }

    #[must_use]
    pub const fn handle(&self) -> &StreamHandle<S, B> {
        &self.handle
    }
}

/// Session slot of one mounted attachment point.
///
/// The first [`evaluate`](Self::evaluate) creates the session; every later
/// one reuses it.
pub struct HiveStream<S = State, B: TypeBag = DefaultBag> {
    session: Option<StreamSession<S, B>>,
}

impl<S, B: TypeBag> Default for HiveStream<S, B> {
    fn default() -> Self {
        Self { session: None }
    }
}

impl<S: ThreadValues, B: TypeBag> HiveStream<S, B> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate the slot with this cycle's options.
    ///
    /// # Errors
    /// Fails only on the evaluation that would create the session, when its
    /// options are malformed. The slot stays empty in that case.
    pub fn evaluate(&mut self, options: StreamOptions<S, B>) -> Result<StreamHandle<S, B>, StreamError> {
        if let Some(session) = &self.session {
            return Ok(session.evaluate(options));
        }
        let session = StreamSession::attach(options)?;
        let handle = session.handle().clone();
        self.session = Some(session);
        Ok(handle)
    }

    /// Frozen strategy, once a session exists.
    #[must_use]
    pub fn selection(&self) -> Option<Selection> {
        self.session.as_ref().map(StreamSession::selection)
    }

    #[must_use]
    pub const fn session(&self) -> Option<&StreamSession<S, B>> {
        self.session.as_ref()
    }

    /// Tear the slot down, returning its session.
    pub fn unmount(&mut self) -> Option<StreamSession<S, B>> {
        self.session.take()
    }
}

/// Session created from options known to be managed.
pub struct ManagedSession<S = State, B: TypeBag = DefaultBag> {
    selection: StableSelection,
    stream: ManagedStream<S, B>,
}

impl<S: ThreadValues, B: TypeBag> ManagedSession<S, B> {
    /// # Errors
    /// Returns [`StreamError::Options`] for a blank assistant id, or a
    /// transport error if the client cannot be built.
    pub fn attach(options: ManagedOptions<S, B>) -> Result<Self, StreamError> {
        if options.assistant_id.trim().is_empty() {
            return Err(OptionsError::MissingIdentity.into());
        }
        let stream = ManagedStream::open(options)?;
        stream.start();
        Ok(Self {
            selection: StableSelection::fixed(Selection::Managed),
            stream,
        })
    }

    /// Re-evaluate; the result is managed whatever `options` look like.
    #[must_use]
    pub fn evaluate(&self, options: impl Into<StreamOptions<S, B>>) -> ManagedStream<S, B> {
        let options = options.into();
        let selection = self.selection.observe(&options);
        debug_assert_eq!(selection, Selection::Managed);
        self.stream.refresh(options.into_common());
        self.stream.clone()
    }

    #[must_use]
    pub const fn stream(&self) -> &ManagedStream<S, B> {
        &self.stream
    }
}

/// Session created from options known to carry a transport.
pub struct CustomSession<S = State, B: TypeBag = DefaultBag> {
    selection: StableSelection,
    stream: CustomStream<S, B>,
}

impl<S: ThreadValues, B: TypeBag> CustomSession<S, B> {
    #[must_use]
    pub fn attach(options: CustomOptions<S, B>) -> Self {
        let stream = CustomStream::open(options);
        stream.start();
        Self {
            selection: StableSelection::fixed(Selection::Custom),
            stream,
        }
    }

    /// Re-evaluate; the result is custom whatever `options` look like.
    #[must_use]
    pub fn evaluate(&self, options: impl Into<StreamOptions<S, B>>) -> CustomStream<S, B> {
        let options = options.into();
        let selection = self.selection.observe(&options);
        debug_assert_eq!(selection, Selection::Custom);
        self.stream.refresh(options.into_common());
        self.stream.clone()
    }

    #[must_use]
    pub const fn stream(&self) -> &CustomStream<S, B> {
        &self.stream
    }
}
