//! Identity collaborator seams.
//!
//! Token issuance lives elsewhere. This module only turns an
//! `Authorization` header into a [`Principal`] via a [`CredentialVerifier`],
//! and exposes the [`IdentityDirectory`] used to show who owns a plot.
//!
//! # Example
//!
//! ```ignore
//! let principal = authenticate(&verifier, Some("Bearer abc123")).await?;
//! coordinator.create_booking(&principal, plot_id, None).await?;
//! ```

use crate::error::MarketError;
use crate::types::UserId;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`CredentialVerifier`].
pub type AuthFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, AuthError>> + Send + 'a>>;

/// Boxed future returned by [`IdentityDirectory`].
pub type ProfileFuture<'a> = Pin<Box<dyn Future<Output = Option<UserProfile>> + Send + 'a>>;

/// Credential problems. All of them mean "unauthenticated".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Header present but not `Bearer <token>`
    #[error("Invalid authorization format. Expected 'Bearer <token>'")]
    MalformedHeader,

    /// `Bearer` with nothing after it
    #[error("Bearer token is empty")]
    EmptyToken,

    /// The verifier did not accept the token
    #[error("Invalid or expired token")]
    InvalidToken,
}

/// Bearer token extracted from an `Authorization: Bearer <token>` header.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BearerToken(String);

impl BearerToken {
    /// Wrap a raw token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Parse an optional header value.
    ///
    /// `None` means the request carried no credential at all.
    ///
    /// # Errors
    ///
    /// [`AuthError::MalformedHeader`] or [`AuthError::EmptyToken`] when a
    /// header is present but unusable.
    pub fn from_header(header: Option<&str>) -> Result<Option<Self>, AuthError> {
        let Some(header) = header else {
            return Ok(None);
        };
        let token = header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::MalformedHeader)?
            .trim();
        if token.is_empty() {
            return Err(AuthError::EmptyToken);
        }
        Ok(Some(Self(token.to_string())))
    }

    /// The raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BearerToken(***)")
    }
}

/// Role flag carried by an authenticated caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Ordinary buyer
    #[default]
    Customer,
    /// Administrative role: may create plots and settle bookings
    Admin,
}

/// An authenticated caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Caller {
    /// Identity
    pub id: UserId,
    /// Role
    pub role: Role,
}

impl Caller {
    /// Whether the caller holds the administrative role
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Who is making a request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Principal {
    /// No credential
    #[default]
    Anonymous,
    /// A verified caller
    Caller(Caller),
}

impl Principal {
    /// An authenticated customer
    #[must_use]
    pub const fn customer(id: UserId) -> Self {
        Self::Caller(Caller {
            id,
            role: Role::Customer,
        })
    }

    /// An authenticated administrator
    #[must_use]
    pub const fn admin(id: UserId) -> Self {
        Self::Caller(Caller {
            id,
            role: Role::Admin,
        })
    }

    /// The caller, unless anonymous
    #[must_use]
    pub const fn caller(&self) -> Option<&Caller> {
        match self {
            Self::Anonymous => None,
            Self::Caller(caller) => Some(caller),
        }
    }
}

/// Resolves bearer tokens to callers.
pub trait CredentialVerifier: Send + Sync {
    /// Verify `token`.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidToken`] if the token is unknown, revoked or expired.
    fn verify<'a>(&'a self, token: &'a BearerToken) -> AuthFuture<'a, Caller>;
}

/// A user as held by the identity collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Identity
    pub id: UserId,
    /// Display name
    pub name: String,
    /// Contact address
    pub email: String,
    /// Administrative flag
    pub is_admin: bool,
}

impl UserProfile {
    /// Role derived from the administrative flag
    #[must_use]
    pub const fn role(&self) -> Role {
        if self.is_admin { Role::Admin } else { Role::Customer }
    }
}

/// Owner details shown alongside a plot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerSummary {
    /// Display name
    pub name: String,
    /// Contact address
    pub email: String,
}

impl From<UserProfile> for OwnerSummary {
    fn from(profile: UserProfile) -> Self {
        Self {
            name: profile.name,
            email: profile.email,
        }
    }
}

/// Read access to user profiles.
pub trait IdentityDirectory: Send + Sync {
    /// Look up a profile. Unknown ids yield `None`.
    fn profile(&self, id: UserId) -> ProfileFuture<'_>;
}

/// Resolve an optional `Authorization` header into a [`Principal`].
///
/// # Errors
///
/// [`MarketError::Unauthenticated`] when a header is present but malformed or
/// rejected by the verifier. A missing header is not an error.
pub async fn authenticate(
    verifier: &dyn CredentialVerifier,
    header: Option<&str>,
) -> Result<Principal, MarketError> {
    let Some(token) = BearerToken::from_header(header)? else {
        return Ok(Principal::Anonymous);
    };
    let caller = verifier.verify(&token).await.inspect_err(|error| {
        tracing::debug!(error = %error, "Credential rejected");
    })?;
    Ok(Principal::Caller(caller))
}
