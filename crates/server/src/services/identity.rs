//! Identity verification against Firebase Authentication.
//!
//! Clients sign in with Firebase on their side and send the resulting ID
//! token as `Authorization: Bearer <token>`. Each request's token is resolved
//! to an account through the Identity Toolkit `accounts:lookup` endpoint; the
//! account's email is then checked against the configured [`Whitelist`].

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;
use url::Url;

use waybill_core::{Email, EmailError};

use crate::config::IdentityConfig;

/// Errors that can occur while verifying a credential.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// No `Authorization: Bearer` header on the request.
    #[error("missing bearer token")]
    MissingToken,

    /// The provider rejected the token (expired, revoked, malformed).
    #[error("invalid or expired token")]
    InvalidToken,

    /// The account exists but is disabled.
    #[error("account disabled")]
    Disabled,

    /// The account has no usable email address.
    #[error("account has no email address")]
    NoEmail,

    /// The provider could not be reached or answered unexpectedly.
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for IdentityError {
    fn from(err: reqwest::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Identity established for the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    /// Provider-side account ID.
    pub uid: String,
    pub email: Email,
}

/// A hosted identity provider that turns bearer tokens into identities.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verify `token` and return the identity it belongs to.
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, IdentityError>;
}

// =============================================================================
// Whitelist
// =============================================================================

/// A malformed whitelist entry.
#[derive(Debug, Error)]
pub enum WhitelistError {
    #[error("invalid domain entry `{0}`")]
    InvalidDomain(String),

    #[error("invalid email entry `{entry}`: {source}")]
    InvalidEmail {
        entry: String,
        #[source]
        source: EmailError,
    },
}

/// Identities permitted to use the service beyond mere authentication.
///
/// Entries are exact emails (`ops@example.com`) or whole domains
/// (`@example.com`). An empty whitelist admits nobody.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Whitelist {
    emails: HashSet<Email>,
    domains: HashSet<String>,
}

impl Whitelist {
    /// Parse a comma-separated list of entries.
    ///
    /// # Errors
    ///
    /// Returns a [`WhitelistError`] for the first malformed entry.
    pub fn parse(raw: &str) -> Result<Self, WhitelistError> {
        let mut whitelist = Self::default();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            if let Some(domain) = entry.strip_prefix('@') {
                if domain.is_empty() || domain.contains('@') {
                    return Err(WhitelistError::InvalidDomain(entry.to_string()));
                }
                whitelist.domains.insert(domain.to_lowercase());
            } else {
                let email = Email::parse(entry).map_err(|source| WhitelistError::InvalidEmail {
                    entry: entry.to_string(),
                    source,
                })?;
                whitelist.emails.insert(email);
            }
        }
        Ok(whitelist)
    }

    #[must_use]
    pub fn contains(&self, email: &Email) -> bool {
        self.emails.contains(email) || self.domains.contains(email.domain())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.emails.is_empty() && self.domains.is_empty()
    }

    /// Number of entries (emails plus domains).
    #[must_use]
    pub fn len(&self) -> usize {
        self.emails.len() + self.domains.len()
    }
}

// =============================================================================
// Identity Toolkit client
// =============================================================================

/// Firebase Identity Toolkit client.
pub struct IdentityToolkitProvider {
    client: reqwest::Client,
    lookup_url: Url,
    api_key: SecretString,
    project_id: String,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
    email: Option<String>,
    #[serde(default)]
    disabled: bool,
}

impl IdentityToolkitProvider {
    /// Create a client for the project described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Unavailable` if the HTTP client cannot be built
    /// or the endpoint URL cannot be extended with the lookup path.
    pub fn new(config: &IdentityConfig) -> Result<Self, IdentityError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        let lookup_url = config
            .endpoint
            .join("v1/accounts:lookup")
            .map_err(|e| IdentityError::Unavailable(format!("bad identity endpoint: {e}")))?;

        Ok(Self {
            client,
            lookup_url,
            api_key: config.api_key.clone(),
            project_id: config.project_id.clone(),
        })
    }
}

#[async_trait]
impl IdentityProvider for IdentityToolkitProvider {
    #[instrument(skip(self, token), fields(project = %self.project_id))]
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, IdentityError> {
        let mut url = self.lookup_url.clone();
        url.query_pairs_mut()
            .append_pair("key", self.api_key.expose_secret());

        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({ "idToken": token }))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {}
            // Identity Toolkit answers 400 INVALID_ID_TOKEN / TOKEN_EXPIRED / USER_NOT_FOUND
            StatusCode::BAD_REQUEST => return Err(IdentityError::InvalidToken),
            status => {
                tracing::warn!(%status, "identity lookup failed");
                return Err(IdentityError::Unavailable(format!(
                    "lookup returned {status}"
                )));
            }
        }

        let body: LookupResponse = response.json().await?;
        identity_from_lookup(body)
    }
}

fn identity_from_lookup(body: LookupResponse) -> Result<VerifiedIdentity, IdentityError> {
    let user = body
        .users
        .into_iter()
        .next()
        .ok_or(IdentityError::InvalidToken)?;

    if user.disabled {
        return Err(IdentityError::Disabled);
    }

    let email = user
        .email
        .as_deref()
        .and_then(|e| Email::parse(e).ok())
        .ok_or(IdentityError::NoEmail)?;

    Ok(VerifiedIdentity {
        uid: user.local_id,
        email,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn email(s: &str) -> Email {
        Email::parse(s).unwrap()
    }

    #[test]
    fn test_whitelist_emails_and_domains() {
        let whitelist = Whitelist::parse(" Ops@Example.com, @freight.io ,").unwrap();
        assert_eq!(whitelist.len(), 2);
        assert!(whitelist.contains(&email("ops@example.com")));
        assert!(whitelist.contains(&email("anyone@Freight.io")));
        assert!(!whitelist.contains(&email("intruder@example.com")));
        assert!(!whitelist.contains(&email("ops@sub.freight.io")));
    }

    #[test]
    fn test_empty_whitelist_admits_nobody() {
        let whitelist = Whitelist::parse("").unwrap();
        assert!(whitelist.is_empty());
        assert!(!whitelist.contains(&email("ops@example.com")));
    }

    #[test]
    fn test_whitelist_rejects_bad_entries() {
        assert!(matches!(
            Whitelist::parse("@"),
            Err(WhitelistError::InvalidDomain(entry)) if entry == "@"
        ));
        assert!(matches!(
            Whitelist::parse("@a@b.io"),
            Err(WhitelistError::InvalidDomain(_))
        ));
        let err = Whitelist::parse("ops@example.com, not-an-email").unwrap_err();
        assert!(matches!(&err, WhitelistError::InvalidEmail { entry, .. } if entry == "not-an-email"));
        assert!(err.to_string().starts_with("invalid email entry `not-an-email`"));
    }

    #[test]
    fn test_lookup_response_to_identity() {
        let body: LookupResponse = serde_json::from_str(
            r#"{"kind":"identitytoolkit#GetAccountInfoResponse",
                "users":[{"localId":"u-1","email":"Dispatch@Example.com","emailVerified":true}]}"#,
        )
        .unwrap();
        let identity = identity_from_lookup(body).unwrap();
        assert_eq!(identity.uid, "u-1");
        assert_eq!(identity.email.as_str(), "dispatch@example.com");
    }

    #[test]
    fn test_lookup_without_users_is_invalid() {
        let body: LookupResponse = serde_json::from_str("{}").unwrap();
        assert!(matches!(
            identity_from_lookup(body),
            Err(IdentityError::InvalidToken)
        ));
    }

    #[test]
    fn test_lookup_disabled_or_emailless() {
        let disabled: LookupResponse =
            serde_json::from_str(r#"{"users":[{"localId":"u","email":"a@b.c","disabled":true}]}"#)
                .unwrap();
        assert!(matches!(
            identity_from_lookup(disabled),
            Err(IdentityError::Disabled)
        ));

        let phone_only: LookupResponse =
            serde_json::from_str(r#"{"users":[{"localId":"u","phoneNumber":"+1555"}]}"#).unwrap();
        assert!(matches!(
            identity_from_lookup(phone_only),
            Err(IdentityError::NoEmail)
        ));
    }
}
