//! Type configuration bag threaded through a session.

use std::marker::PhantomData;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

/// Open JSON object used when a session does not name its state type.
pub type State = Map<String, Value>;

/// Open JSON object used when a session does not name its configurable type.
pub type Configurable = Map<String, Value>;

/// The four payload shapes used by a single session.
///
/// Implemented by [`Bag`]; callers rarely implement it by hand.
pub trait TypeBag: Send + Sync + 'static {
    /// Per-run contextual configuration sent as `config.configurable`.
    type Configurable: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;
    /// Value a run emits when it pauses for caller input.
    type Interrupt: DeserializeOwned + Clone + Send + Sync + 'static;
    /// Out-of-band events emitted outside the state stream.
    type CustomEvent: DeserializeOwned + Send + Sync + 'static;
    /// Payload submitted to start or advance a run.
    type Update: Serialize + Send + Sync + 'static;
}

/// Generic [`TypeBag`] whose omitted slots fall back to untyped JSON.
///
/// ```
/// use hive_stream_core::{Bag, TypeBag};
///
/// #[derive(serde::Deserialize, Clone)]
/// struct Approval {
///     question: String,
/// }
///
/// type MyBag = Bag<hive_stream_core::Configurable, Approval>;
/// fn interrupt_of(_: <MyBag as TypeBag>::Interrupt) {}
/// ```
pub struct Bag<C = Configurable, I = Value, E = Value, U = Value>(PhantomData<fn() -> (C, I, E, U)>);

/// Bag with every slot left at its default.
pub type DefaultBag = Bag;

impl<C, I, E, U> TypeBag for Bag<C, I, E, U>
where
    C: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    I: DeserializeOwned + Clone + Send + Sync + 'static,
    E: DeserializeOwned + Send + Sync + 'static,
    U: Serialize + Send + Sync + 'static,
{
    type Configurable = C;
    type Interrupt = I;
    type CustomEvent = E;
    type Update = U;
}
