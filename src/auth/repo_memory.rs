//! In-memory `UserDirectory` used by unit and router tests.

use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::{
    error::AuthError,
    password::CredentialHasher,
    repo::UserDirectory,
    repo_types::{NewUser, ProfileUpdate, User},
};

#[derive(Default)]
pub struct MemoryUserDirectory {
    users: RwLock<HashMap<Uuid, User>>,
    hasher: CredentialHasher,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw row access, including soft-deleted users.
    pub async fn row(&self, id: Uuid) -> Option<User> {
        self.users.read().await.get(&id).cloned()
    }

    fn conflicts(
        users: &HashMap<Uuid, User>,
        skip: Option<Uuid>,
        email: &str,
        username: &str,
    ) -> bool {
        users.values().any(|u| {
            is_active(u)
                && Some(u.id) != skip
                && (u.email == email || u.username == username)
        })
    }
}

fn is_active(u: &User) -> bool {
    u.deleted_at.is_none()
}

fn active_mut(users: &mut HashMap<Uuid, User>, id: Uuid) -> Result<&mut User, AuthError> {
    users
        .get_mut(&id)
        .filter(|u| is_active(u))
        .ok_or(AuthError::NotFound)
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn insert_user(&self, new: NewUser<'_>) -> Result<Uuid, AuthError> {
        let hash = self.hasher.hash(new.password)?;
        let mut users = self.users.write().await;
        if Self::conflicts(&users, None, new.email, new.username) {
            return Err(AuthError::DuplicateKey);
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            name: new.name.to_string(),
            email: new.email.to_string(),
            username: new.username.to_string(),
            password_hash: hash,
            password_reset_code: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let id = user.id;
        users.insert(id, user);
        Ok(id)
    }

    async fn user_by_email(&self, email: &str) -> Result<User, AuthError> {
        self.users
            .read()
            .await
            .values()
            .find(|u| is_active(u) && u.email == email)
            .cloned()
            .ok_or(AuthError::NotFound)
    }

    async fn user_by_id(&self, id: Uuid) -> Result<User, AuthError> {
        self.users
            .read()
            .await
            .get(&id)
            .filter(|u| is_active(u))
            .cloned()
            .ok_or(AuthError::NotFound)
    }

    async fn credentials_by_username(&self, username: &str) -> Result<(Uuid, String), AuthError> {
        self.users
            .read()
            .await
            .values()
            .find(|u| is_active(u) && u.username == username)
            .map(|u| (u.id, u.password_hash.clone()))
            .ok_or(AuthError::NotFound)
    }

    async fn list_users(&self) -> Result<Vec<User>, AuthError> {
        let mut users: Vec<User> = self
            .users
            .read()
            .await
            .values()
            .filter(|u| is_active(u))
            .cloned()
            .collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn update_profile(&self, id: Uuid, profile: &ProfileUpdate) -> Result<(), AuthError> {
        let mut users = self.users.write().await;
        if Self::conflicts(&users, Some(id), &profile.email, &profile.username) {
            return Err(AuthError::DuplicateKey);
        }
        let user = active_mut(&mut users, id)?;
        user.name = profile.name.clone();
        user.email = profile.email.clone();
        user.username = profile.username.clone();
        user.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn set_reset_code(&self, id: Uuid, code: &str) -> Result<(), AuthError> {
        let mut users = self.users.write().await;
        let user = active_mut(&mut users, id)?;
        user.password_reset_code = Some(code.to_string());
        user.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn update_password(
        &self,
        email: &str,
        new_hash: &str,
        reset_code: &str,
    ) -> Result<(), AuthError> {
        let mut users = self.users.write().await;
        let user = users
            .values_mut()
            .find(|u| {
                is_active(u)
                    && u.email == email
                    && u.password_reset_code.as_deref() == Some(reset_code)
            })
            .ok_or(AuthError::NotFound)?;
        user.password_hash = new_hash.to_string();
        user.password_reset_code = None;
        user.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<(), AuthError> {
        let mut users = self.users.write().await;
        let user = active_mut(&mut users, id)?;
        let now = OffsetDateTime::now_utc();
        user.deleted_at = Some(now);
        user.updated_at = now;
        Ok(())
    }

    async fn change_password(&self, id: Uuid, new_password: &str) -> Result<(), AuthError> {
        let hash = self.hasher.hash(new_password)?;
        let mut users = self.users.write().await;
        let user = active_mut(&mut users, id)?;
        user.password_hash = hash;
        user.password_reset_code = None;
        user.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ada() -> NewUser<'static> {
        NewUser {
            name: "Ada",
            email: "ada@x.com",
            username: "ada",
            password: "secret1",
        }
    }

    #[tokio::test]
    async fn insert_stores_hash_not_plaintext() {
        let dir = MemoryUserDirectory::new();
        let id = dir.insert_user(ada()).await.unwrap();
        let user = dir.user_by_id(id).await.unwrap();
        assert_ne!(user.password_hash, "secret1");
        assert!(!user.password_hash.is_empty());
    }

    #[tokio::test]
    async fn duplicate_email_or_username_is_rejected() {
        let dir = MemoryUserDirectory::new();
        dir.insert_user(ada()).await.unwrap();

        let same_email = NewUser { username: "other", ..ada() };
        assert!(matches!(
            dir.insert_user(same_email).await,
            Err(AuthError::DuplicateKey)
        ));
        let same_username = NewUser { email: "other@x.com", ..ada() };
        assert!(matches!(
            dir.insert_user(same_username).await,
            Err(AuthError::DuplicateKey)
        ));
    }

    #[tokio::test]
    async fn soft_deleted_user_is_hidden_and_frees_keys() {
        let dir = MemoryUserDirectory::new();
        let id = dir.insert_user(ada()).await.unwrap();
        dir.soft_delete(id).await.unwrap();

        assert!(matches!(dir.user_by_id(id).await, Err(AuthError::NotFound)));
        assert!(matches!(
            dir.user_by_email("ada@x.com").await,
            Err(AuthError::NotFound)
        ));
        assert!(matches!(
            dir.credentials_by_username("ada").await,
            Err(AuthError::NotFound)
        ));
        assert!(dir.row(id).await.unwrap().deleted_at.is_some());
        assert!(dir.insert_user(ada()).await.is_ok());
    }

    #[tokio::test]
    async fn update_password_requires_matching_code() {
        let dir = MemoryUserDirectory::new();
        let id = dir.insert_user(ada()).await.unwrap();
        dir.set_reset_code(id, "abc123XYZ0").await.unwrap();

        assert!(matches!(
            dir.update_password("ada@x.com", "new-hash", "wrong").await,
            Err(AuthError::NotFound)
        ));
        dir.update_password("ada@x.com", "new-hash", "abc123XYZ0")
            .await
            .unwrap();

        let row = dir.row(id).await.unwrap();
        assert_eq!(row.password_hash, "new-hash");
        assert_eq!(row.password_reset_code, None);
        assert!(matches!(
            dir.update_password("ada@x.com", "other-hash", "abc123XYZ0").await,
            Err(AuthError::NotFound)
        ));
    }

    #[tokio::test]
    async fn update_profile_checks_other_users_only() {
        let dir = MemoryUserDirectory::new();
        let id = dir.insert_user(ada()).await.unwrap();
        dir.insert_user(NewUser {
            name: "Bob",
            email: "bob@x.com",
            username: "bob",
            password: "secret2",
        })
        .await
        .unwrap();

        let keep = ProfileUpdate {
            name: "Ada L.".into(),
            email: "ada@x.com".into(),
            username: "ada".into(),
        };
        dir.update_profile(id, &keep).await.unwrap();
        assert_eq!(dir.user_by_id(id).await.unwrap().name, "Ada L.");

        let steal = ProfileUpdate {
            username: "bob".into(),
            ..keep
        };
        assert!(matches!(
            dir.update_profile(id, &steal).await,
            Err(AuthError::DuplicateKey)
        ));
    }
}
