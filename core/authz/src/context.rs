//! Per-request caller identity and the credential verifier contract.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use fileengine_common::{Error, Result};

/// Caller identity derived from a verified credential.
///
/// Read-only for the lifetime of one request; never stored.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthContext {
    pub user_id: String,
    pub roles: BTreeSet<String>,
}

impl AuthContext {
    pub fn new<I, S>(user_id: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            user_id: user_id.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// Turns a raw bearer credential into an `AuthContext`.
///
/// Token formats and signature checks belong to the implementation;
/// the resolver and storage never parse credentials.
pub trait CredentialVerifier: Send + Sync {
    /// # Errors
    /// - `Unauthenticated` for missing, unknown or invalid credentials
    fn verify(&self, credential: &str) -> Result<AuthContext>;
}

/// Strip an optional, case-insensitive `Bearer ` prefix.
pub fn bearer_token(header: &str) -> &str {
    let trimmed = header.trim();
    match trimmed.get(..7) {
        Some(scheme) if scheme.eq_ignore_ascii_case("bearer ") => trimmed[7..].trim(),
        _ => trimmed,
    }
}

/// Verifier backed by a fixed token table.
#[derive(Default)]
pub struct StaticTokenVerifier {
    tokens: RwLock<HashMap<String, AuthContext>>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the identity behind `token`.
    pub fn insert(&self, token: impl Into<String>, context: AuthContext) -> Result<()> {
        self.tokens
            .write()
            .map_err(|_| Error::Store("token table poisoned".to_string()))?
            .insert(token.into(), context);
        Ok(())
    }

    pub fn with_token(self, token: impl Into<String>, context: AuthContext) -> Result<Self> {
        self.insert(token, context)?;
        Ok(self)
    }
}

impl CredentialVerifier for StaticTokenVerifier {
    fn verify(&self, credential: &str) -> Result<AuthContext> {
        let token = bearer_token(credential);
        if token.is_empty() {
            return Err(Error::Unauthenticated("missing token".to_string()));
        }

        let tokens = self
            .tokens
            .read()
            .map_err(|_| Error::Unauthenticated("token table unavailable".to_string()))?;
        tokens
            .get(token)
            .cloned()
            .ok_or_else(|| Error::Unauthenticated("invalid credential".to_string()))
    }
}
