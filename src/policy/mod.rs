//! # Authorization gate
//!
//! Mutating configuration calls (add/remove endpoint) pass through an
//! [`Authorizer`] before touching the registry. Read calls are never gated.
//!
//! ```text
//! add_endpoint(caller, name, url)
//!   → Authorizer::authorize(caller)
//!     → false: FederationError::Unauthorized
//!     → true:  registry.add(..) → coordinator.refresh()
//! ```
//!
//! The default policy is a single shared admin credential: a caller is
//! authorized when its credential set contains the configured value.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{FederationError, Result};

/// The identity making a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Caller {
    pub user_id: String,

    /// Operation authorisations held by the caller
    #[serde(default)]
    pub op_auths: BTreeSet<String>,
}

impl Caller {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            op_auths: BTreeSet::new(),
        }
    }

    /// A caller with no identity and no credentials.
    pub fn anonymous() -> Self {
        Self::new("anonymous")
    }

    pub fn with_auth(mut self, auth: impl Into<String>) -> Self {
        self.op_auths.insert(auth.into());
        self
    }

    pub fn has_auth(&self, auth: &str) -> bool {
        self.op_auths.contains(auth)
    }
}

/// Decides whether a caller may mutate the federation configuration.
pub trait Authorizer: Send + Sync {
    fn authorize(&self, caller: &Caller) -> bool;
}

/// Grants mutation to callers holding one configured admin credential.
#[derive(Debug, Clone)]
pub struct AdminCredentialAuthorizer {
    admin_auth: String,
}

impl AdminCredentialAuthorizer {
    /// Fails with `MisconfiguredAuthorization` when the credential is
    /// missing or blank: without it no mutation could ever be authorized.
    pub fn new(admin_auth: Option<&str>) -> Result<Self> {
        match admin_auth.map(str::trim) {
            Some(auth) if !auth.is_empty() => Ok(Self {
                admin_auth: auth.to_string(),
            }),
            _ => Err(FederationError::MisconfiguredAuthorization),
        }
    }

    pub fn admin_auth(&self) -> &str {
        &self.admin_auth
    }
}

impl Authorizer for AdminCredentialAuthorizer {
    fn authorize(&self, caller: &Caller) -> bool {
        caller.has_auth(&self.admin_auth)
    }
}
