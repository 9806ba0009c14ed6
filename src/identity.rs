use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

/// key: identity-directory -> opaque identity provider seam
///
/// The identity provider owns users; this service only needs to turn the
/// contact email on a checkout event into a user id.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user_id_for_email(&self, email: &str) -> Result<Option<Uuid>>;
}

/// Directory backed by the replicated `users` table.
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn user_id_for_email(&self, email: &str) -> Result<Option<Uuid>> {
        let user_id = sqlx::query_scalar("SELECT id FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user_id)
    }
}
