//! Federation errors.

use thiserror::Error;

/// Errors surfaced by the registry, the configuration service and the
/// configuration loader.
///
/// Per-endpoint fetch failures are not represented here: they are
/// [`FetchError`](crate::fetcher::FetchError) values recorded in the
/// endpoint's status entry and never abort a refresh.
#[derive(Debug, Error)]
pub enum FederationError {
    /// An endpoint with this name is already registered.
    #[error("Endpoint name is already in use: {0}")]
    DuplicateName(String),

    /// An endpoint with this address is already registered.
    #[error("Endpoint address has already been registered: {0}")]
    DuplicateAddress(String),

    /// No endpoint with this name.
    #[error("Endpoint not found: {0}")]
    NotFound(String),

    /// The caller lacks the admin credential required for mutation.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// No admin credential is configured, so mutations cannot be authorized.
    #[error("Missing admin credential configuration (FEDERATED_ADMIN_AUTH)")]
    MisconfiguredAuthorization,

    /// A type identifier the type resolver does not know.
    #[error("Type was not recognised: {0}")]
    UnknownType(String),

    /// Registry persistence failed; the in-memory registry was left unchanged.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl FederationError {
    /// Whether this error was caused by the caller rather than the operator.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateName(_)
                | Self::DuplicateAddress(_)
                | Self::NotFound(_)
                | Self::Unauthorized(_)
                | Self::UnknownType(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FederationError>;
