use time::OffsetDateTime;
use tracing::{info, instrument};

use crate::users::{
    password::hash_password,
    profiles::UserType,
    repo::UserStore,
    repo_types::User,
};

/// Stamps `activated_at`, sets the active flag and persists the user.
///
/// Calling this on an already activated user re-stamps the timestamp; callers
/// that need single activation check `User::was_activated` first.
#[instrument(skip(store, user), fields(user_id = user.id))]
pub async fn activate(store: &dyn UserStore, user: &mut User) -> anyhow::Result<()> {
    user.activated_at = Some(OffsetDateTime::now_utc());
    user.is_active = true;
    store.save(user).await?;
    info!("user activated");
    Ok(())
}

/// Replaces the password hash. Outstanding reset tokens stop verifying.
#[instrument(skip(store, user, new_password), fields(user_id = user.id))]
pub async fn set_password(
    store: &dyn UserStore,
    user: &mut User,
    new_password: &str,
) -> anyhow::Result<()> {
    user.password_hash = hash_password(new_password)?;
    store.save(user).await?;
    info!("password changed");
    Ok(())
}

/// Creates the profile row for `user_type`. Returns `false` if it existed.
pub async fn promote(
    store: &dyn UserStore,
    user: &User,
    user_type: UserType,
) -> anyhow::Result<bool> {
    let created = store.add_profile(user.id, user_type).await?;
    if created {
        info!(user_id = user.id, %user_type, "profile created");
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::{memory::MemoryUserStore, password::verify_password, repo_types::NewUser};

    async fn seeded() -> (MemoryUserStore, User) {
        let store = MemoryUserStore::default();
        let user = store
            .create(NewUser {
                email: "a@example.com".into(),
                first_name: String::new(),
                last_name: String::new(),
                password_hash: hash_password("initial-password").unwrap(),
                region: None,
            })
            .await
            .unwrap();
        (store, user)
    }

    #[tokio::test]
    async fn activate_sets_flag_and_timestamp() {
        let (store, mut user) = seeded().await;
        assert!(!user.was_activated());
        activate(&store, &mut user).await.unwrap();
        assert!(user.is_active);
        assert!(user.was_activated());

        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(stored.is_active);
        assert_eq!(stored.activated_at, user.activated_at);
    }

    #[tokio::test]
    async fn activate_twice_restamps() {
        let (store, mut user) = seeded().await;
        activate(&store, &mut user).await.unwrap();
        let first = user.activated_at.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        activate(&store, &mut user).await.unwrap();
        assert!(user.activated_at.unwrap() > first);
    }

    #[tokio::test]
    async fn set_password_rehashes_and_persists() {
        let (store, mut user) = seeded().await;
        let old_hash = user.password_hash.clone();
        set_password(&store, &mut user, "brand-new-password").await.unwrap();
        assert_ne!(user.password_hash, old_hash);
        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(verify_password("brand-new-password", &stored.password_hash).unwrap());
    }

    #[tokio::test]
    async fn promote_is_idempotent_and_derives_type() {
        let (store, user) = seeded().await;
        assert!(promote(&store, &user, UserType::Customer).await.unwrap());
        assert!(!promote(&store, &user, UserType::Customer).await.unwrap());
        assert_eq!(
            store.user_types_of(user.id).await.unwrap(),
            vec![UserType::Customer]
        );
    }
}
