//! Service credential hashing and admin authorization
//!
//! Administrative actions (bulk export) are allowed when the caller's email
//! is on the configured allow-list or their `users/<uid>` record carries the
//! `admin` role. Either is sufficient.

use crate::models::{Identity, Role};
use crate::repo::fetch_user_role;
use crate::store::DocumentStore;
use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::{info, warn};

/// Lowercase hex SHA-256 of a service credential
pub fn credential_digest(credential: &str) -> String {
    let digest = Sha256::digest(credential.as_bytes());
    digest.iter().map(|byte| format!("{:02x}", byte)).collect()
}

/// Email allow-list for administrative actions (case-insensitive)
#[derive(Debug, Clone, Default)]
pub struct AdminPolicy {
    emails: HashSet<String>,
}

impl AdminPolicy {
    pub fn new<I, E>(emails: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: AsRef<str>,
    {
        Self {
            emails: emails
                .into_iter()
                .map(|email| email.as_ref().trim().to_lowercase())
                .filter(|email| !email.is_empty())
                .collect(),
        }
    }

    pub fn allows_email(&self, email: Option<&str>) -> bool {
        email.is_some_and(|email| self.emails.contains(&email.to_lowercase()))
    }

    /// Succeeds when `identity` may run administrative actions
    pub async fn authorize<S: DocumentStore>(&self, store: &S, identity: &Identity) -> Result<()> {
        if self.allows_email(identity.email.as_deref()) {
            info!("{} authorized as admin by email allow-list", identity.label());
            return Ok(());
        }

        let role = match fetch_user_role(store, &identity.uid).await {
            Ok(role) => role,
            Err(e) => {
                warn!("Could not read role for {}: {}", identity.uid, e);
                None
            }
        };

        if role == Some(Role::Admin) {
            info!("{} authorized as admin by role", identity.label());
            Ok(())
        } else {
            Err(Error::Unauthorized(format!(
                "{} does not have the admin role",
                identity.label()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, USERS};
    use serde_json::json;

    #[test]
    fn test_credential_digest_is_hex_sha256() {
        assert_eq!(
            credential_digest("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_allow_list_is_case_insensitive() {
        let policy = AdminPolicy::new(["Admin@Example.org ", ""]);
        assert!(policy.allows_email(Some("admin@example.ORG")));
        assert!(!policy.allows_email(Some("other@example.org")));
        assert!(!policy.allows_email(None));
    }

    #[tokio::test]
    async fn test_authorize_by_email() {
        let store = MemoryStore::new();
        let policy = AdminPolicy::new(["lead@example.org"]);
        let identity = Identity::new("u1").with_email("LEAD@example.org");
        assert!(policy.authorize(&store, &identity).await.is_ok());
    }

    #[tokio::test]
    async fn test_authorize_by_role() {
        let store = MemoryStore::new();
        store.insert_raw(USERS, "u2", json!({"role": "admin"}));
        store.insert_raw(USERS, "u3", json!({"role": "annotator"}));
        let policy = AdminPolicy::default();

        assert!(policy.authorize(&store, &Identity::new("u2")).await.is_ok());
        let err = policy.authorize(&store, &Identity::new("u3")).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_role_read_failure_denies() {
        let store = MemoryStore::new();
        store.fail_reads_of(USERS, "u4");
        let err = AdminPolicy::default()
            .authorize(&store, &Identity::new("u4"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }
}
