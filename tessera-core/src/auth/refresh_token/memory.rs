use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{NewRefreshToken, RefreshToken, RefreshTokenId, RefreshTokenStore};
use crate::error::{AuthError, AuthResult};

/// Records plus the two secondary indexes. Every structure lives behind the
/// same lock so a reader never sees them disagree.
#[derive(Debug, Default)]
struct Indexes {
    records: HashMap<RefreshTokenId, RefreshToken>,
    by_token: HashMap<String, RefreshTokenId>,
    by_user: HashMap<String, Vec<RefreshTokenId>>,
}

impl Indexes {
    fn record_mut(&mut self, id: &RefreshTokenId) -> AuthResult<&mut RefreshToken> {
        self.records
            .get_mut(id)
            .ok_or_else(|| AuthError::not_found("token not found"))
    }

    fn user_records(&self, user_id: &str) -> impl Iterator<Item = &RefreshToken> {
        self.by_user
            .get(user_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.records.get(id))
    }
}

/// Process-local [`RefreshTokenStore`]. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryRefreshTokenStore {
    inner: RwLock<Indexes>,
}

impl InMemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records held, valid or not.
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn store(&self, token: NewRefreshToken) -> AuthResult<RefreshToken> {
        let mut inner = self.inner.write();

        if inner.by_token.contains_key(&token.token) {
            return Err(AuthError::conflict("token already exists"));
        }

        let id = RefreshTokenId::new(Uuid::new_v4().to_string());
        let record = token.into_record(id.clone());

        inner.by_token.insert(record.token.clone(), id.clone());
        inner
            .by_user
            .entry(record.user_id.clone())
            .or_default()
            .push(id.clone());
        inner.records.insert(id, record.clone());

        Ok(record)
    }

    async fn get_by_token(&self, token: &str) -> AuthResult<RefreshToken> {
        let inner = self.inner.read();
        inner
            .by_token
            .get(token)
            .and_then(|id| inner.records.get(id))
            .cloned()
            .ok_or_else(|| AuthError::not_found("token not found"))
    }

    async fn revoke(&self, id: &RefreshTokenId) -> AuthResult<()> {
        let mut inner = self.inner.write();
        inner.record_mut(id)?.is_revoked = true;
        Ok(())
    }

    async fn get_by_user_id(&self, user_id: &str) -> AuthResult<Vec<RefreshToken>> {
        let inner = self.inner.read();
        Ok(inner.user_records(user_id).cloned().collect())
    }

    async fn update_last_used(&self, id: &RefreshTokenId, at: DateTime<Utc>) -> AuthResult<()> {
        let mut inner = self.inner.write();
        inner.record_mut(id)?.last_used_at = Some(at);
        Ok(())
    }

    async fn revoke_all_for_user(&self, user_id: &str) -> AuthResult<()> {
        let mut inner = self.inner.write();
        let Indexes {
            records, by_user, ..
        } = &mut *inner;

        for id in by_user.get(user_id).into_iter().flatten() {
            if let Some(record) = records.get_mut(id) {
                record.is_revoked = true;
            }
        }

        Ok(())
    }

    async fn delete_expired(&self) -> AuthResult<u64> {
        let now = Utc::now();
        let mut inner = self.inner.write();

        let expired: Vec<RefreshTokenId> = inner
            .records
            .values()
            .filter(|record| record.expires_at < now)
            .map(|record| record.id.clone())
            .collect();

        for id in &expired {
            let Some(record) = inner.records.remove(id) else {
                continue;
            };
            inner.by_token.remove(&record.token);

            if let Some(ids) = inner.by_user.get_mut(&record.user_id) {
                ids.retain(|candidate| candidate != id);
                if ids.is_empty() {
                    inner.by_user.remove(&record.user_id);
                }
            }
        }

        debug!(removed = expired.len(), "swept expired refresh tokens");
        Ok(expired.len() as u64)
    }

    async fn count(&self, user_id: &str) -> AuthResult<usize> {
        let now = Utc::now();
        let inner = self.inner.read();
        Ok(inner
            .user_records(user_id)
            .filter(|record| !record.is_revoked && record.expires_at > now)
            .count())
    }
}
