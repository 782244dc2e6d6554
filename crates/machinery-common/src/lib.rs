//! Common types for machinery: errors, Kubernetes helpers and telemetry

#![deny(missing_docs)]

pub mod error;
pub mod kube_utils;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// API version served by the machine controller manager
pub const MACHINE_API_VERSION: &str = "machine.sapcloud.io/v1alpha1";

/// Label the machine controller manager reads to skip draining a machine
pub const FORCE_DELETION_LABEL: &str = "force-deletion";

/// Value of [`FORCE_DELETION_LABEL`] that enables forced deletion
pub const FORCE_DELETION_VALUE: &str = "True";

/// Label key identifying what a secret is used for
pub const PURPOSE_LABEL: &str = "purpose";

/// [`PURPOSE_LABEL`] value carried by machine class secrets
pub const PURPOSE_MACHINE_CLASS: &str = "machine-class";

/// Label selector for machine class secrets (for Kubernetes API queries)
pub const MACHINE_CLASS_SECRET_SELECTOR: &str = "purpose=machine-class";

/// Secret key holding the bootstrap payload, preserved across rotations
pub const USER_DATA_KEY: &str = "userData";
