//! Achievement definitions, per-user progress and the claim transaction

use super::users::grant_reward;
use super::{enum_text, text_enum, Database, DbError, PageRequest};
use crate::achievements::{
    Achievement, AchievementCategory, Criteria, CriteriaType, LeaderboardEntry, Progress,
    ProgressEvent, Reward, UserAchievement,
};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{FromRow, Row};
use tracing::info;
use uuid::Uuid;

const ACHIEVEMENT_COLUMNS: &str = r#"
    id, title, description, category, kind, criteria_type, threshold, timeframe,
    reward_type, reward_value, icon, rarity, status, tags, created_at, updated_at
"#;

const USER_ACHIEVEMENT_COLUMNS: &str = r#"
    id, user_id, achievement_id, current_value, target_value, percentage, status,
    completed_at, claimed_at, history, last_updated
"#;

impl<'r> FromRow<'r, PgRow> for Achievement {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let reward_type: String = row.try_get("reward_type")?;
        let reward_value: String = row.try_get("reward_value")?;
        let reward = Reward::from_parts(&reward_type, &reward_value).map_err(|e| {
            sqlx::Error::ColumnDecode {
                index: "reward_value".to_string(),
                source: e.into(),
            }
        })?;

        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            category: text_enum(row, "category")?,
            kind: text_enum(row, "kind")?,
            criteria: Criteria {
                criteria_type: text_enum(row, "criteria_type")?,
                threshold: row.try_get("threshold")?,
                timeframe: text_enum(row, "timeframe")?,
            },
            reward,
            icon: row.try_get("icon")?,
            rarity: text_enum(row, "rarity")?,
            status: text_enum(row, "status")?,
            tags: row.try_get("tags")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for UserAchievement {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let history: Json<Vec<ProgressEvent>> = row.try_get("history")?;

        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            achievement_id: row.try_get("achievement_id")?,
            progress: Progress {
                current_value: row.try_get("current_value")?,
                target_value: row.try_get("target_value")?,
                percentage: row.try_get("percentage")?,
            },
            status: text_enum(row, "status")?,
            completed_at: row.try_get("completed_at")?,
            claimed_at: row.try_get("claimed_at")?,
            history: history.0,
            last_updated: row.try_get("last_updated")?,
        })
    }
}

impl Database {
    // ==========================================
    // Achievement Operations
    // ==========================================

    pub async fn insert_achievement(&self, achievement: &Achievement) -> Result<(), DbError> {
        let result = sqlx::query(
            r#"
            INSERT INTO achievements (
                id, title, description, category, kind, criteria_type, threshold, timeframe,
                reward_type, reward_value, icon, rarity, status, tags, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(achievement.id)
        .bind(&achievement.title)
        .bind(&achievement.description)
        .bind(enum_text(&achievement.category))
        .bind(enum_text(&achievement.kind))
        .bind(enum_text(&achievement.criteria.criteria_type))
        .bind(achievement.criteria.threshold)
        .bind(enum_text(&achievement.criteria.timeframe))
        .bind(achievement.reward.kind())
        .bind(achievement.reward.value_text())
        .bind(&achievement.icon)
        .bind(enum_text(&achievement.rarity))
        .bind(enum_text(&achievement.status))
        .bind(&achievement.tags)
        .bind(achievement.created_at)
        .bind(achievement.updated_at)
        .execute(self.pool())
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(DbError::InvalidData(
                format!("An achievement titled '{}' already exists", achievement.title),
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_achievements(&self, page: &PageRequest) -> Result<Vec<Achievement>, DbError> {
        let sql = format!(
            "SELECT {} FROM achievements ORDER BY {} LIMIT $1 OFFSET $2",
            ACHIEVEMENT_COLUMNS, page.order_by
        );
        let rows = sqlx::query(&sql)
            .bind(page.limit)
            .bind(page.offset())
            .fetch_all(self.pool())
            .await?;

        rows.iter()
            .map(Achievement::from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(DbError::from)
    }

    pub async fn get_achievement(&self, id: Uuid) -> Result<Option<Achievement>, DbError> {
        let sql = format!("SELECT {} FROM achievements WHERE id = $1", ACHIEVEMENT_COLUMNS);
        let row = sqlx::query(&sql).bind(id).fetch_optional(self.pool()).await?;

        row.map(|r| Achievement::from_row(&r))
            .transpose()
            .map_err(DbError::from)
    }

    pub async fn get_achievements_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Achievement>, DbError> {
        let sql = format!("SELECT {} FROM achievements WHERE id = ANY($1)", ACHIEVEMENT_COLUMNS);
        let rows = sqlx::query(&sql).bind(ids).fetch_all(self.pool()).await?;

        rows.iter()
            .map(Achievement::from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(DbError::from)
    }

    /// Active achievements driven by the given event type
    pub async fn active_achievements_for(&self, criteria: CriteriaType) -> Result<Vec<Achievement>, DbError> {
        let sql = format!(
            "SELECT {} FROM achievements WHERE criteria_type = $1 AND status = 'active'",
            ACHIEVEMENT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(enum_text(&criteria))
            .fetch_all(self.pool())
            .await?;

        rows.iter()
            .map(Achievement::from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(DbError::from)
    }

    // ==========================================
    // User Progress Operations
    // ==========================================

    pub async fn get_user_achievement(
        &self,
        user_id: Uuid,
        achievement_id: Uuid,
    ) -> Result<Option<UserAchievement>, DbError> {
        let sql = format!(
            "SELECT {} FROM user_achievements WHERE user_id = $1 AND achievement_id = $2",
            USER_ACHIEVEMENT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(achievement_id)
            .fetch_optional(self.pool())
            .await?;

        row.map(|r| UserAchievement::from_row(&r))
            .transpose()
            .map_err(DbError::from)
    }

    /// All progress records of a user, most recently updated first
    pub async fn list_user_achievements(&self, user_id: Uuid) -> Result<Vec<UserAchievement>, DbError> {
        let sql = format!(
            "SELECT {} FROM user_achievements WHERE user_id = $1 ORDER BY updated_at DESC",
            USER_ACHIEVEMENT_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(user_id).fetch_all(self.pool()).await?;

        rows.iter()
            .map(UserAchievement::from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(DbError::from)
    }

    /// Insert or update a progress record. Rows that were claimed in the
    /// meantime are left alone.
    pub async fn upsert_user_achievement(&self, record: &UserAchievement) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO user_achievements (
                id, user_id, achievement_id, current_value, target_value, percentage, status,
                completed_at, claimed_at, history, last_updated
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (user_id, achievement_id) DO UPDATE SET
                current_value = EXCLUDED.current_value,
                percentage = EXCLUDED.percentage,
                status = EXCLUDED.status,
                completed_at = COALESCE(user_achievements.completed_at, EXCLUDED.completed_at),
                history = EXCLUDED.history,
                last_updated = EXCLUDED.last_updated,
                updated_at = CURRENT_TIMESTAMP
            WHERE user_achievements.status <> 'claimed'
            "#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(record.achievement_id)
        .bind(record.progress.current_value)
        .bind(record.progress.target_value)
        .bind(record.progress.percentage)
        .bind(enum_text(&record.status))
        .bind(record.completed_at)
        .bind(record.claimed_at)
        .bind(Json(&record.history))
        .bind(record.last_updated)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Flip a completed record to claimed and grant its reward in one
    /// transaction. Returns false when the record was not in `completed`.
    pub async fn claim_user_achievement(
        &self,
        user_id: Uuid,
        achievement_id: Uuid,
        reward: &Reward,
        now: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let mut tx = self.pool().begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE user_achievements
            SET status = 'claimed', claimed_at = $3, last_updated = $3, updated_at = CURRENT_TIMESTAMP
            WHERE user_id = $1 AND achievement_id = $2 AND status = 'completed'
            "#,
        )
        .bind(user_id)
        .bind(achievement_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        grant_reward(&mut *tx, user_id, reward).await?;
        tx.commit().await?;

        info!(
            "User {} claimed achievement {} ({} reward)",
            user_id,
            achievement_id,
            reward.kind()
        );
        Ok(true)
    }

    /// Users ranked by XP earned from claimed achievements
    pub async fn achievement_leaderboard(
        &self,
        category: Option<AchievementCategory>,
        limit: i64,
    ) -> Result<Vec<LeaderboardEntry>, DbError> {
        let rows = sqlx::query(
            r#"
            SELECT ua.user_id,
                   u.name,
                   COUNT(*) AS achievements,
                   COALESCE(SUM(CASE WHEN a.reward_type = 'xp' THEN a.reward_value::BIGINT ELSE 0 END), 0)::BIGINT AS total_xp
            FROM user_achievements ua
            JOIN achievements a ON a.id = ua.achievement_id
            LEFT JOIN users u ON u.id = ua.user_id
            WHERE ua.status = 'claimed'
              AND ($1::TEXT IS NULL OR a.category = $1)
            GROUP BY ua.user_id, u.name
            ORDER BY total_xp DESC, achievements DESC
            LIMIT $2
            "#,
        )
        .bind(category.map(|c| enum_text(&c)))
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .enumerate()
            .map(|(i, row)| {
                Ok(LeaderboardEntry {
                    rank: i as i64 + 1,
                    user_id: row.try_get("user_id")?,
                    name: row.try_get("name")?,
                    achievements: row.try_get("achievements")?,
                    total_xp: row.try_get("total_xp")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(DbError::from)
    }
}
