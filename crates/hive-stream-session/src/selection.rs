//! Connection strategy frozen at session creation.

use hive_stream_core::{Selection, StreamOptions, TypeBag, classify};

/// Classification captured from the first options a session observes.
///
/// There is no way to change it afterwards; later options that would
/// classify differently are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StableSelection {
    selection: Selection,
}

impl StableSelection {
    /// Freeze the classification of `initial`.
    #[must_use]
    pub fn freeze<S, B: TypeBag>(initial: &StreamOptions<S, B>) -> Self {
        Self {
            selection: classify(initial),
        }
    }

    pub(crate) const fn fixed(selection: Selection) -> Self {
        Self { selection }
    }

    /// The frozen classification.
    #[must_use]
    pub const fn get(&self) -> Selection {
        self.selection
    }

    /// Classification to use for a later evaluation with `options`.
    ///
    /// Always the frozen one.
    #[must_use]
    pub fn observe<S, B: TypeBag>(&self, options: &StreamOptions<S, B>) -> Selection {
        let observed = classify(options);
        if observed != self.selection {
            tracing::warn!(
                frozen = ?self.selection,
                ?observed,
                "ignoring connection strategy change on live session"
            );
        }
        self.selection
    }
}
