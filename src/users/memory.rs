//! In-process `UserStore` used by unit tests.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::users::{
    profiles::UserType,
    repo::UserStore,
    repo_types::{NewUser, User},
};

/// Same comparison as `lower(a) = lower(b)` in Postgres.
fn same_email(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<Vec<User>>,
    profiles: Mutex<HashSet<(i64, UserType)>>,
}

impl MemoryUserStore {
    fn matching(&self, user_type: Option<UserType>) -> Vec<User> {
        let profiles = self.profiles.lock().unwrap();
        let mut users: Vec<User> = self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|u| user_type.map_or(true, |t| profiles.contains(&(u.id, t))))
            .cloned()
            .collect();
        users.sort_by_key(|u| u.id);
        users
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, new: NewUser) -> anyhow::Result<User> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| same_email(&u.email, &new.email)) {
            anyhow::bail!("duplicate email {}", new.email);
        }
        let user = User {
            id: users.len() as i64 + 1,
            email: new.email,
            first_name: new.first_name,
            last_name: new.last_name,
            password_hash: new.password_hash,
            is_active: false,
            activated_at: None,
            region: new.region,
            created_at: OffsetDateTime::now_utc(),
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<User>> {
        Ok(self.users.lock().unwrap().iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| same_email(&u.email, email))
            .cloned())
    }

    async fn find_by_token_claims(
        &self,
        id: i64,
        email: &str,
        password_hash: Option<&str>,
    ) -> anyhow::Result<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| {
                u.id == id
                    && same_email(&u.email, email)
                    && password_hash
                        .map_or(true, |h| u.password_hash.to_lowercase() == h.to_lowercase())
            })
            .cloned())
    }

    async fn save(&self, user: &User) -> anyhow::Result<()> {
        let mut users = self.users.lock().unwrap();
        match users.iter_mut().find(|u| u.id == user.id) {
            Some(slot) => *slot = user.clone(),
            None => anyhow::bail!("user {} does not exist", user.id),
        }
        Ok(())
    }

    async fn add_profile(&self, user_id: i64, user_type: UserType) -> anyhow::Result<bool> {
        Ok(self.profiles.lock().unwrap().insert((user_id, user_type)))
    }

    async fn user_types_of(&self, user_id: i64) -> anyhow::Result<Vec<UserType>> {
        let profiles = self.profiles.lock().unwrap();
        Ok(UserType::ALL
            .into_iter()
            .filter(|t| profiles.contains(&(user_id, *t)))
            .collect())
    }

    async fn count(&self, user_type: Option<UserType>) -> anyhow::Result<i64> {
        Ok(self.matching(user_type).len() as i64)
    }

    async fn list(
        &self,
        user_type: Option<UserType>,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<User>> {
        Ok(self
            .matching(user_type)
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.into(),
            first_name: String::new(),
            last_name: String::new(),
            password_hash: "hash".into(),
            region: None,
        }
    }

    #[tokio::test]
    async fn non_ascii_emails_compare_like_postgres_lower() {
        let store = MemoryUserStore::default();
        let user = store.create(new_user("ÉLODIE@example.com")).await.unwrap();
        assert!(store.create(new_user("élodie@example.com")).await.is_err());
        assert_eq!(
            store.find_by_email("élodie@EXAMPLE.com").await.unwrap(),
            Some(user.clone())
        );
        assert!(store
            .find_by_token_claims(user.id, "Élodie@example.com", None)
            .await
            .unwrap()
            .is_some());
    }
}
