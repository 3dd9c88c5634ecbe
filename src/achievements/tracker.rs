//! Achievement Tracker - applies progress events and handles claims

use super::{
    Achievement, AchievementCategory, AchievementError, CriteriaType, LeaderboardEntry,
    NewAchievement, ProgressStatus, UserAchievement, UserAchievementDetail,
};
use crate::auth::Role;
use crate::db::{Database, PageRequest};
use crate::trading::Portfolio;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

const LEADERBOARD_SIZE: i64 = 100;

/// Result of feeding one measurement to the tracker
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressOutcome {
    /// Progress records written
    pub updated: usize,
    /// Achievements that moved to `completed` with this measurement
    pub completed: Vec<Uuid>,
}

impl ProgressOutcome {
    fn merge(&mut self, other: ProgressOutcome) {
        self.updated += other.updated;
        self.completed.extend(other.completed);
    }
}

/// Trading measures taken from stored portfolios: executed trades, summed
/// profit/loss and the widest set of distinct holdings in one portfolio.
pub fn trading_measures(portfolios: &[Portfolio]) -> [(CriteriaType, f64); 3] {
    let trades = portfolios.iter().map(|p| p.transactions.len()).sum::<usize>();
    let profit: Decimal = portfolios
        .iter()
        .map(|p| p.performance.total_profit_loss)
        .sum();
    let diversity = portfolios
        .iter()
        .map(|p| p.holdings.iter().filter(|h| h.quantity > 0).count())
        .max()
        .unwrap_or(0);

    [
        (CriteriaType::TradeVolume, trades as f64),
        (CriteriaType::ProfitTarget, profit.to_f64().unwrap_or(0.0)),
        (CriteriaType::PortfolioDiversity, diversity as f64),
    ]
}

#[derive(Clone)]
pub struct AchievementTracker {
    db: Database,
}

impl AchievementTracker {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create(&self, new: NewAchievement) -> Result<Achievement, AchievementError> {
        new.validate()?;
        let achievement = new.into_achievement(Utc::now());
        self.db.insert_achievement(&achievement).await?;
        info!("Created achievement '{}' ({})", achievement.title, achievement.id);
        Ok(achievement)
    }

    pub async fn list(&self, page: &PageRequest) -> Result<Vec<Achievement>, AchievementError> {
        Ok(self.db.list_achievements(page).await?)
    }

    /// Every progress record of the user with its achievement attached
    pub async fn user_achievements(&self, user_id: Uuid) -> Result<Vec<UserAchievementDetail>, AchievementError> {
        let records = self.db.list_user_achievements(user_id).await?;
        let ids: Vec<Uuid> = records.iter().map(|r| r.achievement_id).collect();
        let mut achievements: HashMap<Uuid, Achievement> = self
            .db
            .get_achievements_by_ids(&ids)
            .await?
            .into_iter()
            .map(|a| (a.id, a))
            .collect();

        Ok(records
            .into_iter()
            .filter_map(|progress| {
                achievements
                    .remove(&progress.achievement_id)
                    .map(|achievement| UserAchievementDetail { progress, achievement })
            })
            .collect())
    }

    pub async fn progress(&self, user_id: Uuid, achievement_id: Uuid) -> Result<UserAchievementDetail, AchievementError> {
        let progress = self
            .db
            .get_user_achievement(user_id, achievement_id)
            .await?
            .ok_or(AchievementError::ProgressNotFound)?;
        let achievement = self
            .db
            .get_achievement(achievement_id)
            .await?
            .ok_or(AchievementError::AchievementNotFound)?;

        Ok(UserAchievementDetail { progress, achievement })
    }

    /// Feed an absolute measurement to every active achievement of that type
    pub async fn record_event(
        &self,
        user_id: Uuid,
        criteria: CriteriaType,
        value: f64,
    ) -> Result<ProgressOutcome, AchievementError> {
        if !value.is_finite() {
            return Err(AchievementError::Invalid("progress value must be a number".into()));
        }

        let achievements = self.db.active_achievements_for(criteria).await?;
        let now = Utc::now();
        let mut outcome = ProgressOutcome::default();

        for achievement in &achievements {
            let mut record = match self.db.get_user_achievement(user_id, achievement.id).await? {
                Some(existing) => existing,
                None => UserAchievement::start(user_id, achievement, now),
            };

            let was_open = record.status == ProgressStatus::InProgress;
            if !record.update_progress(value, criteria, now) {
                debug!("Skipping claimed achievement {} for user {}", achievement.id, user_id);
                continue;
            }
            self.db.upsert_user_achievement(&record).await?;
            outcome.updated += 1;
            if was_open && record.status == ProgressStatus::Completed {
                info!("User {} completed achievement '{}'", user_id, achievement.title);
                outcome.completed.push(achievement.id);
            }
        }

        debug!(
            "Recorded {:?} = {} for user {} ({} achievements updated)",
            criteria, value, user_id, outcome.updated
        );
        Ok(outcome)
    }

    /// Recompute the measures the server can observe itself (trading and
    /// forum activity) and feed each one to the matching achievements.
    pub async fn evaluate(&self, user_id: Uuid) -> Result<ProgressOutcome, AchievementError> {
        let portfolios = self.db.list_portfolios(user_id).await?;
        let forum_activity = self.db.forum_activity_count(user_id).await?;

        let mut outcome = ProgressOutcome::default();
        for (criteria, value) in trading_measures(&portfolios) {
            outcome.merge(self.record_event(user_id, criteria, value).await?);
        }
        outcome.merge(
            self.record_event(user_id, CriteriaType::ForumParticipation, forum_activity as f64)
                .await?,
        );

        Ok(outcome)
    }

    /// Claim a completed achievement and grant its reward. Succeeds at most once.
    pub async fn claim(
        &self,
        user_id: Uuid,
        role: Role,
        achievement_id: Uuid,
    ) -> Result<UserAchievementDetail, AchievementError> {
        let mut detail = self.progress(user_id, achievement_id).await?;
        let now = Utc::now();
        detail.progress.claim(now)?;

        self.db.ensure_user(user_id, role).await?;
        let claimed = self
            .db
            .claim_user_achievement(user_id, achievement_id, &detail.achievement.reward, now)
            .await?;
        if !claimed {
            // Someone else claimed it between the read and the update
            let current = self
                .db
                .get_user_achievement(user_id, achievement_id)
                .await?
                .ok_or(AchievementError::ProgressNotFound)?;
            return Err(AchievementError::NotCompleted(current.status));
        }

        Ok(detail)
    }

    pub async fn leaderboard(
        &self,
        category: Option<AchievementCategory>,
    ) -> Result<Vec<LeaderboardEntry>, AchievementError> {
        Ok(self.db.achievement_leaderboard(category, LEADERBOARD_SIZE).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::Symbol;
    use crate::trading::{TradeOrder, TradeType};
    use rust_decimal_macros::dec;

    fn portfolio_with(trades: &[(&str, TradeType, i64, Decimal)]) -> Portfolio {
        let mut portfolio = Portfolio::new(Uuid::new_v4(), "Main", None, dec!(100000), true, Utc::now());
        for (symbol, side, quantity, price) in trades {
            let order = TradeOrder::new(Symbol::parse(symbol).unwrap(), *side, *quantity).unwrap();
            portfolio.apply_trade(&order, *price, Utc::now()).unwrap();
        }
        portfolio
    }

    #[test]
    fn test_trading_measures_across_portfolios() {
        let mut first = portfolio_with(&[
            ("AAPL", TradeType::Buy, 10, dec!(100)),
            ("MSFT", TradeType::Buy, 5, dec!(200)),
            ("MSFT", TradeType::Sell, 5, dec!(220)),
        ]);
        first.performance.total_profit_loss = dec!(100);
        let mut second = portfolio_with(&[
            ("AAPL", TradeType::Buy, 1, dec!(100)),
            ("TSLA", TradeType::Buy, 1, dec!(100)),
        ]);
        second.performance.total_profit_loss = dec!(-25.5);

        let measures = trading_measures(&[first, second]);
        assert_eq!(measures[0], (CriteriaType::TradeVolume, 5.0));
        assert_eq!(measures[1], (CriteriaType::ProfitTarget, 74.5));
        // MSFT was sold out of the first portfolio
        assert_eq!(measures[2], (CriteriaType::PortfolioDiversity, 2.0));
    }

    #[test]
    fn test_trading_measures_without_portfolios() {
        let measures = trading_measures(&[]);
        assert!(measures.iter().all(|(_, value)| *value == 0.0));
    }

    #[test]
    fn test_outcomes_merge() {
        let id = Uuid::new_v4();
        let mut outcome = ProgressOutcome {
            updated: 1,
            completed: vec![],
        };
        outcome.merge(ProgressOutcome {
            updated: 2,
            completed: vec![id],
        });
        assert_eq!(outcome.updated, 3);
        assert_eq!(outcome.completed, vec![id]);
    }
}
