use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// Region codes stored as SMALLINT on the user row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub enum Region {
    Oceania = 1,
    Asia = 2,
    Africa = 3,
    America = 4,
    Europe = 5,
    Antarctica = 6,
    Atlantis = 7,
}

impl Region {
    pub const ALL: [Region; 7] = [
        Region::Oceania,
        Region::Asia,
        Region::Africa,
        Region::America,
        Region::Europe,
        Region::Antarctica,
        Region::Atlantis,
    ];

    pub fn code(self) -> i16 {
        self as i16
    }

    pub fn label(self) -> &'static str {
        match self {
            Region::Oceania => "Oceania",
            Region::Asia => "Asia",
            Region::Africa => "Africa",
            Region::America => "America",
            Region::Europe => "Europe",
            Region::Antarctica => "Antarctica",
            Region::Atlantis => "Atlantis",
        }
    }
}

impl TryFrom<i16> for Region {
    type Error = String;

    fn try_from(code: i16) -> Result<Self, Self::Error> {
        Region::ALL
            .into_iter()
            .find(|r| r.code() == code)
            .ok_or_else(|| format!("unknown region code {code}"))
    }
}

impl From<Region> for i16 {
    fn from(r: Region) -> Self {
        r.code()
    }
}

/// Raw `app_user` row as returned by sqlx.
#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub is_active: bool,
    pub activated_at: Option<OffsetDateTime>,
    pub region: Option<i16>,
    pub created_at: OffsetDateTime,
}

/// User record in the database.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // argon2 PHC string, not exposed in JSON
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub activated_at: Option<OffsetDateTime>,
    pub region: Option<Region>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        let region = r
            .region
            .map(Region::try_from)
            .transpose()
            .map_err(anyhow::Error::msg)?;
        Ok(Self {
            id: r.id,
            email: r.email,
            first_name: r.first_name,
            last_name: r.last_name,
            password_hash: r.password_hash,
            is_active: r.is_active,
            activated_at: r.activated_at,
            region,
            created_at: r.created_at,
        })
    }
}

impl User {
    pub fn was_activated(&self) -> bool {
        self.activated_at.is_some()
    }
}

impl std::fmt::Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.email)
    }
}

/// Fields required to insert a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub region: Option<Region>,
}
