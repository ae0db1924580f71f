//! Failure descriptions fed to the dispatcher
//!
//! An [`ErrorEvent`] is either an explicit status raised by downstream code or a
//! [`Failure`] that escaped it. Failures carry a precomputed type chain, ordered from
//! the most specific type name to [`ROOT_FAILURE_TYPE`], so that resolution is plain
//! sequence matching.

use axum::http::StatusCode;
use std::any::{Any, type_name};
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// A type-erased error, as produced by tower services
pub type BoxError = Box<dyn Error + Send + Sync>;

/// The type name every failure chain ends with
pub const ROOT_FAILURE_TYPE: &str = "std::error::Error";

/// The type name given to failures classified from a panic
pub const PANIC_FAILURE_TYPE: &str = "std::panic";

/// How a failure is re-raised when no handler takes it
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    strum_macros::IntoStaticStr,
    strum_macros::EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum PropagationKind {
    /// Transport I/O failure, re-raised as is
    Io,
    /// Component-level failure, re-raised as is
    Component,
    /// Runtime failure, re-raised as is
    Runtime,
    /// Anything else; wrapped in a [`ComponentError`] before re-raising
    Unrecognized,
}

/// Errors that know their place in a type hierarchy
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Debug, thiserror::Error)]
/// #[error("order {0} not found")]
/// struct OrderNotFound(u64);
///
/// impl Classify for OrderNotFound {
///     fn ancestry(&self) -> &'static [&'static str] {
///         &["app::NotFound", "app::ClientError"]
///     }
/// }
/// ```
pub trait Classify: Error + Send + Sync + 'static {
    /// Ancestor type names, nearest first, excluding the type itself and the root
    fn ancestry(&self) -> &'static [&'static str] {
        &[]
    }

    fn propagation_kind(&self) -> PropagationKind {
        PropagationKind::Runtime
    }
}

/// A classified failure value
///
/// Cloning is cheap and keeps identity, see [`Failure::ptr_eq`].
#[derive(Clone)]
pub struct Failure {
    inner: Arc<FailureInner>,
}

struct FailureInner {
    error: BoxError,
    type_chain: Vec<&'static str>,
    kind: PropagationKind,
}

impl Failure {
    fn build(error: BoxError, type_chain: Vec<&'static str>, kind: PropagationKind) -> Self {
        Self {
            inner: Arc::new(FailureInner {
                error,
                type_chain,
                kind,
            }),
        }
    }

    /// Classify a plain error: its own type, then the root
    pub fn new<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::build(
            Box::new(error),
            vec![type_name::<E>(), ROOT_FAILURE_TYPE],
            PropagationKind::Unrecognized,
        )
    }

    /// Classify a plain error as a runtime failure
    pub fn runtime<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::build(
            Box::new(error),
            vec![type_name::<E>(), ROOT_FAILURE_TYPE],
            PropagationKind::Runtime,
        )
    }

    /// Classify an error using its declared ancestry
    pub fn classified<E: Classify>(error: E) -> Self {
        let mut type_chain = Vec::with_capacity(error.ancestry().len() + 2);
        type_chain.push(type_name::<E>());
        type_chain.extend_from_slice(error.ancestry());
        type_chain.push(ROOT_FAILURE_TYPE);
        let kind = error.propagation_kind();
        Self::build(Box::new(error), type_chain, kind)
    }

    /// Classify an error whose concrete type is no longer known
    ///
    /// Boxed `Failure`s are unwrapped and boxed `io::Error`s keep their I/O kind.
    /// Anything else only matches the root type.
    pub fn from_boxed(error: BoxError) -> Self {
        let error = match error.downcast::<Failure>() {
            Ok(failure) => return *failure,
            Err(error) => error,
        };
        match error.downcast::<std::io::Error>() {
            Ok(io) => Self::from(*io),
            Err(error) => Self::build(
                error,
                vec![ROOT_FAILURE_TYPE],
                PropagationKind::Unrecognized,
            ),
        }
    }

    /// Classify a caught panic payload
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        Self::build(
            Box::new(PanicFailure {
                message: panic_message(payload),
            }),
            vec![PANIC_FAILURE_TYPE, ROOT_FAILURE_TYPE],
            PropagationKind::Runtime,
        )
    }

    /// The most specific type name
    pub fn type_name(&self) -> &'static str {
        self.inner
            .type_chain
            .first()
            .copied()
            .unwrap_or(ROOT_FAILURE_TYPE)
    }

    /// Type names from most to least specific, ending at [`ROOT_FAILURE_TYPE`]
    pub fn type_chain(&self) -> &[&'static str] {
        &self.inner.type_chain
    }

    pub fn message(&self) -> String {
        self.inner.error.to_string()
    }

    pub fn kind(&self) -> PropagationKind {
        self.inner.kind
    }

    pub fn error(&self) -> &(dyn Error + Send + Sync + 'static) {
        self.inner.error.as_ref()
    }

    pub fn downcast_ref<T: Error + 'static>(&self) -> Option<&T> {
        self.inner.error.downcast_ref::<T>()
    }

    pub fn is<T: Error + 'static>(&self) -> bool {
        self.inner.error.is::<T>()
    }

    /// Whether both handles refer to the same failure value
    pub fn ptr_eq(&self, other: &Failure) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The failure as it should be re-raised when no handler took it
    pub fn into_propagated(self) -> Failure {
        match self.kind() {
            PropagationKind::Unrecognized => Self::build(
                Box::new(ComponentError { source: self }),
                vec![type_name::<ComponentError>(), ROOT_FAILURE_TYPE],
                PropagationKind::Component,
            ),
            _ => self,
        }
    }
}

impl From<std::io::Error> for Failure {
    fn from(error: std::io::Error) -> Self {
        Self::build(
            Box::new(error),
            vec![type_name::<std::io::Error>(), ROOT_FAILURE_TYPE],
            PropagationKind::Io,
        )
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Failure")
            .field("type", &self.type_name())
            .field("kind", &self.kind())
            .field("error", &self.inner.error)
            .finish()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner.error, f)
    }
}

impl Error for Failure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.inner.error.source()
    }
}

/// Generic component-level failure wrapping an unrecognized one
#[derive(Debug, thiserror::Error)]
#[error("component failure: {source}")]
pub struct ComponentError {
    #[source]
    source: Failure,
}

impl ComponentError {
    pub fn failure(&self) -> &Failure {
        &self.source
    }
}

/// The value of a failure classified from a panic
#[derive(Debug, thiserror::Error)]
#[error("panicked: {message}")]
pub struct PanicFailure {
    pub message: String,
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// One step of the resolution cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Status(u16),
    Type(&'static str),
}

/// A failure to be routed to an error handler
#[derive(Debug, Clone)]
pub enum ErrorEvent {
    Status {
        status: StatusCode,
        message: Option<String>,
    },
    Exception {
        failure: Failure,
    },
}

impl ErrorEvent {
    pub fn status(status: StatusCode, message: Option<String>) -> Self {
        Self::Status { status, message }
    }

    pub fn exception(failure: Failure) -> Self {
        Self::Exception { failure }
    }

    pub fn message(&self) -> Option<String> {
        match self {
            Self::Status { message, .. } => message.clone(),
            Self::Exception { failure } => Some(failure.message()),
        }
    }

    /// Specificity levels to probe, most specific first
    pub fn levels(&self) -> Vec<Level> {
        match self {
            Self::Status { status, .. } => status_levels(status.as_u16())
                .into_iter()
                .map(Level::Status)
                .collect(),
            Self::Exception { failure } => {
                failure.type_chain().iter().copied().map(Level::Type).collect()
            }
        }
    }
}

/// The status truncation cascade: `code`, then each decimal truncation, then 0
///
/// Consecutive duplicates are collapsed, so 404 yields `[404, 400, 0]`.
pub fn status_levels(code: u16) -> Vec<u16> {
    let mut levels = vec![code];
    let mut current = u32::from(code);
    let mut multiplier = 10u32;
    while current != 0 {
        current = current / multiplier * multiplier;
        multiplier *= 10;
        // truncation never grows the value, so it still fits
        let level = current as u16;
        if levels.last() != Some(&level) {
            levels.push(level);
        }
    }
    levels
}
