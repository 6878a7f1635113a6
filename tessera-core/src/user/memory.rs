use async_trait::async_trait;
use chrono::Utc;
use dashmap::{DashMap, mapref::entry::Entry};

use super::{User, UserRepository};
use crate::error::{AuthError, AuthResult};

/// Process-local user store for tests and development servers.
///
/// Usernames are unique, as with the `users` table.
#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    users: DashMap<String, User>,
    by_username: DashMap<String, String>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user, keyed by id. A username held by another
    /// id is a conflict.
    pub fn insert(&self, user: User) -> AuthResult<()> {
        let id = user.id.clone();
        let username = user.username.clone();
        match self.by_username.entry(username.clone()) {
            Entry::Occupied(entry) if entry.get() != &id => {
                return Err(AuthError::conflict("username already exists"));
            }
            Entry::Occupied(_) => {}
            Entry::Vacant(entry) => {
                entry.insert(id.clone());
            }
        }

        if let Some(previous) = self.users.insert(id.clone(), user)
            && previous.username != username
        {
            self.by_username
                .remove_if(&previous.username, |_, owner| owner == &id);
        }
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Option<User> {
        let (_, user) = self.users.remove(id)?;
        self.by_username
            .remove_if(&user.username, |_, owner| owner == id);
        Some(user)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_username(&self, username: &str) -> AuthResult<User> {
        let id = self
            .by_username
            .get(username)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AuthError::not_found("user not found"))?;
        self.find_by_id(&id).await
    }

    async fn find_by_id(&self, id: &str) -> AuthResult<User> {
        self.users
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AuthError::not_found("user not found"))
    }

    async fn update_last_login(&self, id: &str) -> AuthResult<()> {
        let mut entry = self
            .users
            .get_mut(id)
            .ok_or_else(|| AuthError::not_found("user not found"))?;
        entry.mark_logged_in(Utc::now());
        Ok(())
    }
}
