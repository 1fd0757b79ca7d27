//! Chain-level error kinds recorded by links, chains and processors.

use std::any::Any;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    #[error("type mismatch in {link}: expected {expected}")]
    TypeMismatch { link: String, expected: &'static str },

    #[error("{0} received input before initialization")]
    NotInitialized(String),

    #[error("chain cancelled")]
    Cancelled,

    #[error("child chain for {resource} failed: {source}")]
    ChildFailed {
        resource: String,
        #[source]
        source: Box<ChainError>,
    },

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("{link}: {message}")]
    LinkInternal { link: String, message: String },

    #[error("missing required parameter '{0}'")]
    MissingParam(String),

    #[error("unknown parameter '{0}'")]
    UnknownParam(String),

    #[error("invalid value for parameter '{name}': expected {expected}")]
    InvalidParam { name: String, expected: &'static str },

    #[error("{failed} worker(s) failed: {}", join_errors(.errors))]
    WorkersFailed {
        failed: usize,
        errors: Vec<ChainError>,
    },

    #[error("{} errors: {}", .0.len(), join_errors(.0))]
    Aggregate(Vec<ChainError>),
}

fn join_errors(errors: &[ChainError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ChainError {
    /// Wrap an error returned by a link hook. Errors that already carry a
    /// `ChainError` keep their kind; anything else becomes `LinkInternal`.
    pub fn from_link(link: &str, err: anyhow::Error) -> Self {
        match err.downcast::<ChainError>() {
            Ok(e) => e,
            Err(e) => ChainError::LinkInternal {
                link: link.to_string(),
                message: format!("{e:#}"),
            },
        }
    }

    /// Convert a captured panic payload into `LinkInternal`.
    pub fn from_panic(link: &str, payload: &(dyn Any + Send)) -> Self {
        ChainError::LinkInternal {
            link: link.to_string(),
            message: format!("panicked: {}", panic_message(payload)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ChainError::Cancelled)
    }

    /// Whether recording this error should abort the rest of the chain. `WorkersFailed` is
    /// reported only once every peer worker has delivered, so links downstream keep draining.
    pub fn aborts_chain(&self) -> bool {
        !matches!(self, ChainError::WorkersFailed { .. })
    }

    /// Leaf errors of this error: composite kinds (`Aggregate`, `WorkersFailed`)
    /// are expanded recursively, everything else is returned as is.
    pub fn flatten(&self) -> Vec<&ChainError> {
        match self {
            ChainError::Aggregate(errors) | ChainError::WorkersFailed { errors, .. } => {
                errors.iter().flat_map(ChainError::flatten).collect()
            }
            other => vec![other],
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}
