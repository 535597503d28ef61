//! Officer identity: resolving bearer tokens and checking roles.
//!
//! Authentication resolves a token to an officer id, then loads the
//! profile through the store's narrow `officer_profile` lookup. Role
//! checks run only afterwards, on the already-resolved profile.

use crate::config::OfficerConfig;
use crate::error::StoreError;
use crate::models::{Officer, Role};
use crate::store::SqliteStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingCredentials,
    #[error("invalid or expired token")]
    UnknownToken,
    #[error("officer {0} is inactive")]
    Inactive(String),
    #[error("officer {0} lacks the ADMIN role")]
    Forbidden(String),
    #[error("identity lookup failed: {0}")]
    Storage(#[from] StoreError),
}

/// Resolves a presented credential to an officer id.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve(&self, token: &str) -> Option<String>;
}

/// Token roster loaded from the configuration file.
pub struct StaticTokenProvider {
    tokens: HashMap<String, String>,
}

impl StaticTokenProvider {
    pub fn from_roster(roster: &[OfficerConfig]) -> Self {
        let tokens = roster
            .iter()
            .map(|o| (o.token.clone(), o.id.clone()))
            .collect();
        Self { tokens }
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenProvider {
    async fn resolve(&self, token: &str) -> Option<String> {
        self.tokens.get(token).cloned()
    }
}

/// Writes every configured officer profile into the store.
pub fn seed_officers(store: &SqliteStore, roster: &[OfficerConfig]) -> Result<usize, StoreError> {
    for entry in roster {
        store.upsert_officer(&Officer {
            id: entry.id.clone(),
            email: entry.email.clone(),
            full_name: entry.full_name.clone(),
            department: entry.department.clone(),
            role: entry.role,
            is_active: entry.active,
        })?;
    }
    Ok(roster.len())
}

pub struct Authenticator {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<SqliteStore>,
}

impl Authenticator {
    pub fn new(provider: Arc<dyn IdentityProvider>, store: Arc<SqliteStore>) -> Self {
        Self { provider, store }
    }

    pub async fn authenticate(&self, token: Option<&str>) -> Result<Officer, AuthError> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingCredentials)?;
        let officer_id = self
            .provider
            .resolve(token)
            .await
            .ok_or(AuthError::UnknownToken)?;

        let officer = self
            .store
            .run(move |store| store.officer_profile(&officer_id))
            .await?
            .ok_or(AuthError::UnknownToken)?;
        if !officer.is_active {
            log::warn!("Rejected request from inactive officer {}", officer.id);
            return Err(AuthError::Inactive(officer.id));
        }
        Ok(officer)
    }
}

pub fn require_admin(officer: &Officer) -> Result<(), AuthError> {
    match officer.role {
        Role::Admin => Ok(()),
        Role::Officer => Err(AuthError::Forbidden(officer.id.clone())),
    }
}
