//! Error types for machine reconciliation
//!
//! Errors are structured with fields to aid debugging in production. Every
//! failure that leaves a reconciliation step is wrapped in [`Error::Step`] so
//! the operator can see which stage of a deploy or teardown broke, while
//! classification helpers (`is_timeout`, `is_retryable`, ...) look through
//! the wrapping.

use std::time::Duration;

use thiserror::Error;

/// Main error type for machine lifecycle operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Object store call failed for a reason other than a kube-rs error
    #[error("transport error [{resource}]: {message}")]
    Transport {
        /// Resource collection being accessed (e.g., "machinedeployments")
        resource: String,
        /// Description of what failed
        message: String,
    },

    /// A bounded wait exceeded its deadline
    #[error("timed out after {timeout:?} waiting for {operation}")]
    Timeout {
        /// What was being waited for
        operation: String,
        /// The deadline that elapsed
        timeout: Duration,
    },

    /// A cluster-resident resource is missing a field it must carry
    #[error("malformed {kind} {name}: {message}")]
    MalformedResource {
        /// Resource kind (e.g., "AWSMachineClass")
        kind: String,
        /// Resource name
        name: String,
        /// Description of what's missing
        message: String,
    },

    /// One or more concurrent sub-operations failed
    #[error("{} failed for {} resource(s): {}", .operation, .errors.len(), join_errors(.errors))]
    AggregateFailure {
        /// The fanned-out operation (e.g., "labelling machines")
        operation: String,
        /// Every failure, in completion order
        errors: Vec<Error>,
    },

    /// Failure of a named reconciliation step
    #[error("{step}: {source}")]
    Step {
        /// Step that failed (e.g., "deploy machine classes")
        step: String,
        /// The underlying error
        source: Box<Error>,
    },

    /// The config generator could not produce machine configuration
    #[error("config generator error: {message}")]
    Generator {
        /// Description of what failed
        message: String,
    },

    /// The manifest applier failed to apply a release
    #[error("apply error [{release}]: {message}")]
    Apply {
        /// Release being applied
        release: String,
        /// Description of what failed
        message: String,
    },

    /// Invalid configuration
    #[error("validation error: {message}")]
    Validation {
        /// Description of what's invalid
        message: String,
        /// The offending setting, if known
        field: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Where the error occurred (e.g., "label_machines_for_force_deletion")
        context: String,
    },
}

fn join_errors(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Create a transport error for a resource collection
    pub fn transport(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Transport {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout,
        }
    }

    /// Create a malformed-resource error
    pub fn malformed(
        kind: impl Into<String>,
        name: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::MalformedResource {
            kind: kind.into(),
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Collect failures of a concurrent fan-out into one error
    pub fn aggregate(operation: impl Into<String>, errors: Vec<Error>) -> Self {
        Self::AggregateFailure {
            operation: operation.into(),
            errors,
        }
    }

    /// Create a config generator error
    pub fn generator(msg: impl Into<String>) -> Self {
        Self::Generator {
            message: msg.into(),
        }
    }

    /// Create an apply error for a release
    pub fn apply(release: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Apply {
            release: release.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error for a specific setting
    pub fn validation_for_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Wrap this error with the name of the step that failed
    pub fn in_step(self, step: impl Into<String>) -> Self {
        Self::Step {
            step: step.into(),
            source: Box::new(self),
        }
    }

    /// The error beneath any step wrapping
    pub fn root(&self) -> &Error {
        match self {
            Error::Step { source, .. } => source.root(),
            other => other,
        }
    }

    /// Name of the outermost failed step, if this error was wrapped
    pub fn step(&self) -> Option<&str> {
        match self {
            Error::Step { step, .. } => Some(step),
            _ => None,
        }
    }

    /// Whether a bounded wait ran out of time
    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), Error::Timeout { .. })
    }

    /// Whether the object store call itself failed
    pub fn is_transport(&self) -> bool {
        matches!(self.root(), Error::Kube { .. } | Error::Transport { .. })
    }

    /// Whether a cluster resource was missing a required field
    pub fn is_malformed(&self) -> bool {
        matches!(self.root(), Error::MalformedResource { .. })
    }

    /// Check if this error is retryable
    ///
    /// Malformed resources and validation errors need a fix before another
    /// attempt can succeed. Everything else may clear up on
    /// the next reconciliation cycle.
    pub fn is_retryable(&self) -> bool {
        match self.root() {
            Error::Kube { source } => {
                !matches!(source, kube::Error::Api(ae) if (400..500).contains(&ae.code))
            }
            Error::AggregateFailure { errors, .. } => errors.iter().any(Error::is_retryable),
            Error::MalformedResource { .. } => false,
            Error::Validation { .. } => false,
            _ => true,
        }
    }
}
