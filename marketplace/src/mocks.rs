//! In-process identity collaborators for development and tests.

use crate::auth::{
    AuthError, AuthFuture, BearerToken, Caller, CredentialVerifier, IdentityDirectory,
    ProfileFuture, UserProfile,
};
use crate::types::UserId;
use std::collections::HashMap;

/// Verifier backed by a fixed token table.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, Caller>,
}

impl StaticTokenVerifier {
    /// Create an empty verifier: every token is rejected.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` as `caller`.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, caller: Caller) -> Self {
        self.tokens.insert(token.into(), caller);
        self
    }

    /// Accept `token` as the user in `profile`, with the role its admin flag implies.
    #[must_use]
    pub fn with_profile(self, token: impl Into<String>, profile: &UserProfile) -> Self {
        self.with_token(
            token,
            Caller {
                id: profile.id,
                role: profile.role(),
            },
        )
    }
}

impl CredentialVerifier for StaticTokenVerifier {
    fn verify<'a>(&'a self, token: &'a BearerToken) -> AuthFuture<'a, Caller> {
        Box::pin(async move {
            self.tokens
                .get(token.as_str())
                .copied()
                .ok_or(AuthError::InvalidToken)
        })
    }
}

/// Directory backed by a profile map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIdentityDirectory {
    profiles: HashMap<UserId, UserProfile>,
}

impl InMemoryIdentityDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a profile.
    #[must_use]
    pub fn with_profile(mut self, profile: UserProfile) -> Self {
        self.profiles.insert(profile.id, profile);
        self
    }
}

impl IdentityDirectory for InMemoryIdentityDirectory {
    fn profile(&self, id: UserId) -> ProfileFuture<'_> {
        Box::pin(async move { self.profiles.get(&id).cloned() })
    }
}
