//! EduTrade backend - courses, achievements and virtual stock trading
//!
//! The server binary builds an `AppState` once at startup and shares it with
//! every handler through `Arc`.

pub mod achievements;
pub mod api;
pub mod auth;
pub mod community;
pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod market_data;
pub mod trading;

use crate::achievements::AchievementTracker;
use crate::auth::JwtKeys;
use crate::config::AppConfig;
use crate::db::Database;
use crate::market_data::{MarketDataCache, MarketDataClient, MarketDataError};
use crate::trading::TradeEngine;
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    pub config: AppConfig,
    pub db: Database,
    pub jwt: JwtKeys,
    pub market: Arc<MarketDataCache>,
    pub trading: TradeEngine,
    pub achievements: AchievementTracker,
}

impl AppState {
    pub fn new(config: AppConfig, db: Database) -> Result<Self, MarketDataError> {
        let client = MarketDataClient::new(&config.market_data)?;
        let market = Arc::new(MarketDataCache::new(db.clone(), client));
        let trading = TradeEngine::new(db.clone(), market.clone(), config.starting_balance);
        let achievements = AchievementTracker::new(db.clone());
        let jwt = JwtKeys::new(&config.auth);

        Ok(Self {
            config,
            db,
            jwt,
            market,
            trading,
            achievements,
        })
    }
}
