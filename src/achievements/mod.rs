//! Achievements - goals with a threshold, per-user progress and claimable rewards

mod tracker;

pub use tracker::{AchievementTracker, ProgressOutcome};

use crate::db::DbError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AchievementError {
    #[error("Achievement not found")]
    AchievementNotFound,
    #[error("Achievement progress not found")]
    ProgressNotFound,
    #[error("Achievement must be completed before claiming (status: {0})")]
    NotCompleted(ProgressStatus),
    #[error("Invalid achievement: {0}")]
    Invalid(String),
    #[error(transparent)]
    Database(#[from] DbError),
}

// ==========================================
// Achievement definitions
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AchievementCategory {
    Learning,
    Trading,
    Community,
    Milestone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AchievementKind {
    OneTime,
    Tiered,
    Recurring,
}

/// Event types that drive progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriteriaType {
    CourseCompletion,
    TradeVolume,
    ProfitTarget,
    LoginStreak,
    ForumParticipation,
    PortfolioDiversity,
    QuizScore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Timeframe {
    Daily,
    Weekly,
    Monthly,
    #[default]
    AllTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AchievementStatus {
    #[default]
    Active,
    Inactive,
    Retired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Criteria {
    #[serde(rename = "type")]
    pub criteria_type: CriteriaType,
    pub threshold: f64,
    #[serde(default)]
    pub timeframe: Timeframe,
}

/// What the user receives when claiming
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Reward {
    Xp(i64),
    Badge(String),
    Title(String),
    FeatureUnlock(String),
}

impl Reward {
    /// Name stored in the `reward_type` column
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Xp(_) => "xp",
            Self::Badge(_) => "badge",
            Self::Title(_) => "title",
            Self::FeatureUnlock(_) => "feature_unlock",
        }
    }

    /// Value stored in the `reward_value` column
    pub fn value_text(&self) -> String {
        match self {
            Self::Xp(amount) => amount.to_string(),
            Self::Badge(v) | Self::Title(v) | Self::FeatureUnlock(v) => v.clone(),
        }
    }

    pub fn from_parts(kind: &str, value: &str) -> Result<Self, String> {
        match kind {
            "xp" => value
                .parse()
                .map(Self::Xp)
                .map_err(|_| format!("Invalid XP amount '{}'", value)),
            "badge" => Ok(Self::Badge(value.to_string())),
            "title" => Ok(Self::Title(value.to_string())),
            "feature_unlock" => Ok(Self::FeatureUnlock(value.to_string())),
            other => Err(format!("Unknown reward type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: AchievementCategory,
    #[serde(rename = "type")]
    pub kind: AchievementKind,
    pub criteria: Criteria,
    pub reward: Reward,
    pub icon: String,
    pub rarity: Rarity,
    pub status: AchievementStatus,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /api/achievements`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAchievement {
    pub title: String,
    pub description: String,
    pub category: AchievementCategory,
    #[serde(rename = "type")]
    pub kind: AchievementKind,
    pub criteria: Criteria,
    pub reward: Reward,
    pub icon: String,
    pub rarity: Rarity,
    #[serde(default)]
    pub status: AchievementStatus,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewAchievement {
    pub fn validate(&self) -> Result<(), AchievementError> {
        if self.title.trim().is_empty() {
            return Err(AchievementError::Invalid("title is required".into()));
        }
        if self.description.trim().is_empty() {
            return Err(AchievementError::Invalid("description is required".into()));
        }
        if self.icon.trim().is_empty() {
            return Err(AchievementError::Invalid("icon is required".into()));
        }
        if !self.criteria.threshold.is_finite() || self.criteria.threshold <= 0.0 {
            return Err(AchievementError::Invalid("criteria threshold must be positive".into()));
        }
        match &self.reward {
            Reward::Xp(amount) if *amount <= 0 => {
                Err(AchievementError::Invalid("XP reward must be positive".into()))
            }
            Reward::Badge(v) | Reward::Title(v) | Reward::FeatureUnlock(v) if v.trim().is_empty() => {
                Err(AchievementError::Invalid("reward value is required".into()))
            }
            _ => Ok(()),
        }
    }

    pub fn into_achievement(self, now: DateTime<Utc>) -> Achievement {
        Achievement {
            id: Uuid::new_v4(),
            title: self.title.trim().to_string(),
            description: self.description,
            category: self.category,
            kind: self.kind,
            criteria: self.criteria,
            reward: self.reward,
            icon: self.icon,
            rarity: self.rarity,
            status: self.status,
            tags: self.tags,
            created_at: now,
            updated_at: now,
        }
    }
}

// ==========================================
// Per-user progress
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    InProgress,
    Completed,
    Claimed,
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Claimed => "claimed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub current_value: f64,
    pub target_value: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub date: DateTime<Utc>,
    /// Change in current value caused by this event
    pub value: f64,
    pub event: CriteriaType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAchievement {
    pub id: Uuid,
    pub user_id: Uuid,
    pub achievement_id: Uuid,
    pub progress: Progress,
    pub status: ProgressStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub history: Vec<ProgressEvent>,
    pub last_updated: DateTime<Utc>,
}

impl UserAchievement {
    pub fn start(user_id: Uuid, achievement: &Achievement, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            achievement_id: achievement.id,
            progress: Progress {
                current_value: 0.0,
                target_value: achievement.criteria.threshold,
                percentage: 0.0,
            },
            status: ProgressStatus::InProgress,
            completed_at: None,
            claimed_at: None,
            history: Vec::new(),
            last_updated: now,
        }
    }

    /// Record an absolute measurement. Claimed records are frozen; returns
    /// false when nothing changed.
    pub fn update_progress(&mut self, value: f64, event: CriteriaType, now: DateTime<Utc>) -> bool {
        if self.status == ProgressStatus::Claimed || !value.is_finite() {
            return false;
        }

        let target = self.progress.target_value;
        let old_value = self.progress.current_value;
        let new_value = value.max(0.0).min(target);

        self.progress.current_value = new_value;
        self.progress.percentage = if target > 0.0 {
            new_value / target * 100.0
        } else {
            100.0
        };
        self.history.push(ProgressEvent {
            date: now,
            value: new_value - old_value,
            event,
        });

        if new_value >= target && self.status == ProgressStatus::InProgress {
            self.status = ProgressStatus::Completed;
            self.completed_at.get_or_insert(now);
        }

        self.last_updated = now;
        true
    }

    pub fn claim(&mut self, now: DateTime<Utc>) -> Result<(), AchievementError> {
        if self.status != ProgressStatus::Completed {
            return Err(AchievementError::NotCompleted(self.status));
        }
        self.status = ProgressStatus::Claimed;
        self.claimed_at = Some(now);
        self.last_updated = now;
        Ok(())
    }
}

/// Progress record together with the achievement it tracks
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAchievementDetail {
    #[serde(flatten)]
    pub progress: UserAchievement,
    pub achievement: Achievement,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: i64,
    pub user_id: Uuid,
    pub name: Option<String>,
    pub achievements: i64,
    pub total_xp: i64,
}

#[cfg(test)]
pub(crate) fn sample_achievement(threshold: f64, reward: Reward) -> Achievement {
    NewAchievement {
        title: "First Steps".to_string(),
        description: "Place your first trades".to_string(),
        category: AchievementCategory::Trading,
        kind: AchievementKind::OneTime,
        criteria: Criteria {
            criteria_type: CriteriaType::TradeVolume,
            threshold,
            timeframe: Timeframe::AllTime,
        },
        reward,
        icon: "rocket".to_string(),
        rarity: Rarity::Common,
        status: AchievementStatus::Active,
        tags: vec![],
    }
    .into_achievement(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(threshold: f64) -> UserAchievement {
        let achievement = sample_achievement(threshold, Reward::Xp(100));
        UserAchievement::start(Uuid::new_v4(), &achievement, Utc::now())
    }

    #[test]
    fn test_progress_clamps_and_completes() {
        let mut ua = record(10.0);
        let now = Utc::now();

        assert!(ua.update_progress(4.0, CriteriaType::TradeVolume, now));
        assert_eq!(ua.progress.current_value, 4.0);
        assert_eq!(ua.progress.percentage, 40.0);
        assert_eq!(ua.status, ProgressStatus::InProgress);

        ua.update_progress(25.0, CriteriaType::TradeVolume, now);
        assert_eq!(ua.progress.current_value, 10.0);
        assert_eq!(ua.progress.percentage, 100.0);
        assert_eq!(ua.status, ProgressStatus::Completed);
        assert_eq!(ua.completed_at, Some(now));

        let deltas: Vec<f64> = ua.history.iter().map(|h| h.value).collect();
        assert_eq!(deltas, vec![4.0, 6.0]);
    }

    #[test]
    fn test_completed_at_is_kept() {
        let mut ua = record(5.0);
        let first = Utc::now();
        ua.update_progress(5.0, CriteriaType::TradeVolume, first);
        ua.update_progress(5.0, CriteriaType::TradeVolume, first + Duration::hours(1));
        assert_eq!(ua.completed_at, Some(first));
        assert_eq!(ua.status, ProgressStatus::Completed);
    }

    #[test]
    fn test_claim_only_once_and_only_when_completed() {
        let mut ua = record(3.0);
        let now = Utc::now();

        let err = ua.claim(now).unwrap_err();
        assert!(matches!(err, AchievementError::NotCompleted(ProgressStatus::InProgress)));

        ua.update_progress(3.0, CriteriaType::TradeVolume, now);
        ua.claim(now).unwrap();
        assert_eq!(ua.status, ProgressStatus::Claimed);
        assert_eq!(ua.claimed_at, Some(now));

        let err = ua.claim(now).unwrap_err();
        assert!(matches!(err, AchievementError::NotCompleted(ProgressStatus::Claimed)));
    }

    #[test]
    fn test_claimed_progress_is_frozen() {
        let mut ua = record(1.0);
        let now = Utc::now();
        ua.update_progress(1.0, CriteriaType::TradeVolume, now);
        ua.claim(now).unwrap();

        assert!(!ua.update_progress(0.0, CriteriaType::TradeVolume, now));
        assert_eq!(ua.progress.current_value, 1.0);
        assert_eq!(ua.history.len(), 1);
    }

    #[test]
    fn test_reward_column_round_trip() {
        let reward = Reward::FeatureUnlock("advanced_charts".into());
        assert_eq!(reward.kind(), "feature_unlock");
        assert_eq!(
            Reward::from_parts(reward.kind(), &reward.value_text()).unwrap(),
            reward
        );
        assert_eq!(Reward::from_parts("xp", "250").unwrap(), Reward::Xp(250));
        assert!(Reward::from_parts("xp", "lots").is_err());
        assert!(Reward::from_parts("coins", "5").is_err());
    }

    #[test]
    fn test_new_achievement_json_and_validation() {
        let body = r#"{
            "title": "Diversified",
            "description": "Hold five different symbols",
            "category": "trading",
            "type": "one-time",
            "criteria": {"type": "portfolio_diversity", "threshold": 5},
            "reward": {"type": "badge", "value": "diversifier"},
            "icon": "pie",
            "rarity": "rare"
        }"#;
        let new: NewAchievement = serde_json::from_str(body).unwrap();
        assert_eq!(new.criteria.timeframe, Timeframe::AllTime);
        assert_eq!(new.status, AchievementStatus::Active);
        assert!(new.validate().is_ok());

        let mut bad = new.clone();
        bad.criteria.threshold = 0.0;
        assert!(bad.validate().is_err());

        let mut bad = new;
        bad.reward = Reward::Xp(-5);
        assert!(bad.validate().is_err());
    }
}
