//! Error types for the reflection core.

use thiserror::Error;

use crate::object::ObjectId;

/// Errors that can occur in the reflection layer.
#[derive(Debug, Clone, Error)]
pub enum ReflectError {
    /// Class name not registered
    #[error("unknown class '{0}'")]
    UnknownClass(String),

    /// Object id does not refer to a live object
    #[error("object {0} is not alive")]
    DeadObject(ObjectId),

    /// Attribute lookup miss on a known class
    #[error("class '{class}' has no attribute '{name}'")]
    UnknownAttribute {
        /// Class name
        class: String,
        /// Attribute name
        name: String,
    },

    /// Method lookup miss on a known class
    #[error("class '{class}' has no method '{name}'")]
    UnknownMethod {
        /// Class name
        class: String,
        /// Method name
        name: String,
    },

    /// Event lookup miss on a known class
    #[error("class '{class}' has no event '{name}'")]
    UnknownEvent {
        /// Class name
        class: String,
        /// Event name
        name: String,
    },

    /// Event id does not refer to a live event
    #[error("event is not alive")]
    DeadEvent,

    /// Handler id does not refer to a live handler
    #[error("handler is not alive")]
    DeadHandler,

    /// Handler/event signature incompatibility
    #[error("signature mismatch: expected {expected}, got {actual}")]
    SignatureMismatch {
        /// The event's signature display form
        expected: String,
        /// The handler's signature display form
        actual: String,
    },
}
