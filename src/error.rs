use thiserror::Error;

use crate::state::ViewState;

/// Convenience alias for fallible engine operations.
pub type Result<T> = std::result::Result<T, UiError>;

/// Fatal conditions raised by the engine.
///
/// None of these are retried internally. Each one aborts the operation that
/// triggered it and indicates a caller or configuration bug, not a runtime
/// condition the engine can recover from. Dispatching an unknown action id
/// is deliberately *not* an error; it is a forward-compatible no-op.
#[derive(Debug, Error)]
pub enum UiError {
    /// The requested state pair is outside the legal transition table,
    /// including self-transitions and `Suspended -> Closed`.
    #[error("invalid view state transition: {from:?} -> {to:?}")]
    InvalidTransition { from: ViewState, to: ViewState },

    /// An action handler table was assembled with an invalid descriptor
    /// (arity above the maximum, duplicate id, mismatched domain state).
    #[error("invalid action handler configuration: {reason}")]
    HandlerConfiguration { reason: String },

    /// An operation needed the render root before one was attached.
    #[error("no render root is attached")]
    MissingRoot,

    /// The loader completed without a template for the requested key.
    #[error("loader produced no template for view key {key:?}")]
    NullTemplate { key: String },

    /// The view instance was already destroyed.
    #[error("view instance has been destroyed")]
    DefunctView,

    /// Settings failed parsing or validation.
    #[error("invalid settings: {reason}")]
    InvalidSettings { reason: String },
}
