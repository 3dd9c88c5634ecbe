//! User profiles and reward grants

use super::{Database, DbError};
use crate::achievements::Reward;
use crate::auth::Role;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgConnection;
use uuid::Uuid;

/// Profile row, created the first time a token holder needs one
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub xp: i64,
    pub badges: Vec<String>,
    pub titles: Vec<String>,
    pub unlocked_features: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Database {
    // ==========================================
    // User Operations
    // ==========================================

    /// Insert a profile for the user if none exists yet
    pub async fn ensure_user(&self, id: Uuid, role: Role) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, role)
            VALUES ($1, $2)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(role.as_str())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    pub async fn get_user(&self, id: Uuid) -> Result<Option<UserProfile>, DbError> {
        let user = sqlx::query_as::<_, UserProfile>(
            r#"
            SELECT id, name, email, role, xp, badges, titles, unlocked_features, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        Ok(user)
    }
}

/// Apply a claimed reward to the user row. Set-like rewards are only added once.
pub(super) async fn grant_reward(
    conn: &mut PgConnection,
    user_id: Uuid,
    reward: &Reward,
) -> Result<(), DbError> {
    let column = match reward {
        Reward::Xp(amount) => {
            sqlx::query("UPDATE users SET xp = xp + $2, updated_at = CURRENT_TIMESTAMP WHERE id = $1")
                .bind(user_id)
                .bind(*amount)
                .execute(&mut *conn)
                .await?;
            return Ok(());
        }
        Reward::Badge(_) => "badges",
        Reward::Title(_) => "titles",
        Reward::FeatureUnlock(_) => "unlocked_features",
    };

    let sql = format!(
        r#"
        UPDATE users
        SET {col} = array_append({col}, $2), updated_at = CURRENT_TIMESTAMP
        WHERE id = $1 AND NOT ($2 = ANY({col}))
        "#,
        col = column
    );
    sqlx::query(&sql)
        .bind(user_id)
        .bind(reward.value_text())
        .execute(&mut *conn)
        .await?;

    Ok(())
}
