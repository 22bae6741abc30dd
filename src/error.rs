use crate::addressing::Tag;
use crate::ingredient::Ingredient;
use std::io;
use thiserror::Error;

/// Failure of the shared mailbox itself.
///
/// Every variant is fatal to the participant that observes it; callers
/// never retry.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The queue could not be created or attached at startup.
    #[error("message queue with key {key:#x} is unavailable")]
    Unavailable {
        key: i32,
        #[source]
        source: io::Error,
    },

    /// An existing queue id given on the command line does not exist.
    #[error("message queue {id} cannot be attached")]
    Attach {
        id: i32,
        #[source]
        source: io::Error,
    },

    #[error("send on tag {tag} failed")]
    Send {
        tag: Tag,
        #[source]
        source: io::Error,
    },

    #[error("receive on tag {tag} failed")]
    Receive {
        tag: Tag,
        #[source]
        source: io::Error,
    },

    /// The mailbox was destroyed by someone else while in use.
    #[error("mailbox torn down during operation on tag {tag}")]
    TornDown { tag: Tag },

    #[error("failed to destroy message queue")]
    Destroy {
        #[source]
        source: io::Error,
    },
}

impl ChannelError {
    /// Returns `true` when the failure was caused by an external teardown.
    pub fn is_teardown(&self) -> bool {
        matches!(self, ChannelError::TornDown { .. })
    }
}

/// The seller drew two ingredients that no smoker can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AddressingError {
    #[error("no smoker is waiting for {first} and {second}")]
    UnknownPairing { first: Ingredient, second: Ingredient },
}

/// A delivery payload that does not decode into two ingredients.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("delivery payload {text:?} is not of the form <n>:<n>")]
    Format { text: String },

    #[error("ingredient number {0} is out of range")]
    UnknownIngredient(u8),
}

/// Error returned by the seller and smoker loops.
///
/// `step` names the protocol step that failed, so the diagnostic printed by
/// the binary says where the participant stopped.
#[derive(Debug, Error)]
pub enum RoleError {
    #[error("{step} failed")]
    Channel {
        step: &'static str,
        #[source]
        source: ChannelError,
    },

    #[error("{step} failed")]
    Payload {
        step: &'static str,
        #[source]
        source: PayloadError,
    },
}

impl RoleError {
    pub fn step(&self) -> &'static str {
        match self {
            RoleError::Channel { step, .. } | RoleError::Payload { step, .. } => step,
        }
    }

    /// Returns `true` when the loop stopped because the table was torn down.
    pub fn is_teardown(&self) -> bool {
        matches!(self, RoleError::Channel { source, .. } if source.is_teardown())
    }
}

/// Attaches the protocol step to a failing channel or payload operation.
pub(crate) trait StepContext<T> {
    fn during(self, step: &'static str) -> Result<T, RoleError>;
}

impl<T> StepContext<T> for Result<T, ChannelError> {
    fn during(self, step: &'static str) -> Result<T, RoleError> {
        self.map_err(|source| RoleError::Channel { step, source })
    }
}

impl<T> StepContext<T> for Result<T, PayloadError> {
    fn during(self, step: &'static str) -> Result<T, RoleError> {
        self.map_err(|source| RoleError::Payload { step, source })
    }
}
