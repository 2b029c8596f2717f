use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;

use crate::users::{
    profiles::UserType,
    repo_types::{NewUser, User, UserRow},
};

const USER_COLUMNS: &str =
    "id, email, first_name, last_name, password_hash, is_active, activated_at, region, created_at";

/// Persistence seam for users and their profile extension rows.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, new: NewUser) -> anyhow::Result<User>;
    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<User>>;
    /// Case-insensitive match on email.
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    /// Matches id exactly, email case-insensitively and, when given, the
    /// password hash case-insensitively.
    async fn find_by_token_claims(
        &self,
        id: i64,
        email: &str,
        password_hash: Option<&str>,
    ) -> anyhow::Result<Option<User>>;
    /// Writes every mutable column of `user` back to its row.
    async fn save(&self, user: &User) -> anyhow::Result<()>;
    /// Returns `false` when the profile row already existed.
    async fn add_profile(&self, user_id: i64, user_type: UserType) -> anyhow::Result<bool>;
    async fn user_types_of(&self, user_id: i64) -> anyhow::Result<Vec<UserType>>;
    async fn count(&self, user_type: Option<UserType>) -> anyhow::Result<i64>;
    /// Ordered by id.
    async fn list(
        &self,
        user_type: Option<UserType>,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<User>>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn type_filter(user_type: Option<UserType>) -> String {
    match user_type {
        Some(t) => format!(
            "WHERE EXISTS (SELECT 1 FROM {} p WHERE p.user_id = u.id)",
            t.table()
        ),
        None => String::new(),
    }
}

fn into_users(rows: Vec<UserRow>) -> anyhow::Result<Vec<User>> {
    rows.into_iter().map(User::try_from).collect()
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, new: NewUser) -> anyhow::Result<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO app_user (email, first_name, last_name, password_hash, region)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new.email)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(&new.password_hash)
        .bind(new.region.map(|r| r.code()))
        .fetch_one(&self.db)
        .await
        .context("insert user")?;
        row.try_into()
    }

    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM app_user WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        row.map(User::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM app_user WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        row.map(User::try_from).transpose()
    }

    async fn find_by_token_claims(
        &self,
        id: i64,
        email: &str,
        password_hash: Option<&str>,
    ) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM app_user
            WHERE id = $1
              AND lower(email) = lower($2)
              AND ($3::text IS NULL OR lower(password_hash) = lower($3))
            "#
        ))
        .bind(id)
        .bind(email)
        .bind(password_hash)
        .fetch_optional(&self.db)
        .await
        .context("find user by token claims")?;
        row.map(User::try_from).transpose()
    }

    async fn save(&self, user: &User) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE app_user
               SET email = $2,
                   first_name = $3,
                   last_name = $4,
                   password_hash = $5,
                   is_active = $6,
                   activated_at = $7,
                   region = $8
             WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.password_hash)
        .bind(user.is_active)
        .bind(user.activated_at)
        .bind(user.region.map(|r| r.code()))
        .execute(&self.db)
        .await
        .context("update user")?;
        Ok(())
    }

    async fn add_profile(&self, user_id: i64, user_type: UserType) -> anyhow::Result<bool> {
        let res = sqlx::query(&format!(
            "INSERT INTO {} (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING",
            user_type.table()
        ))
        .bind(user_id)
        .execute(&self.db)
        .await
        .with_context(|| format!("insert {} row", user_type.table()))?;
        Ok(res.rows_affected() == 1)
    }

    async fn user_types_of(&self, user_id: i64) -> anyhow::Result<Vec<UserType>> {
        let mut types = Vec::new();
        for t in UserType::ALL {
            let exists: bool = sqlx::query_scalar(&format!(
                "SELECT EXISTS (SELECT 1 FROM {} WHERE user_id = $1)",
                t.table()
            ))
            .bind(user_id)
            .fetch_one(&self.db)
            .await
            .with_context(|| format!("probe {}", t.table()))?;
            if exists {
                types.push(t);
            }
        }
        Ok(types)
    }

    async fn count(&self, user_type: Option<UserType>) -> anyhow::Result<i64> {
        let n: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM app_user u {}",
            type_filter(user_type)
        ))
        .fetch_one(&self.db)
        .await
        .context("count users")?;
        Ok(n)
    }

    async fn list(
        &self,
        user_type: Option<UserType>,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            SELECT u.id, u.email, u.first_name, u.last_name, u.password_hash,
                   u.is_active, u.activated_at, u.region, u.created_at
            FROM app_user u
            {}
            ORDER BY u.id
            LIMIT $1 OFFSET $2
            "#,
            type_filter(user_type)
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await
        .context("list users")?;
        into_users(rows)
    }
}
