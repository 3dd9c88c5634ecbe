//! Trade Engine - executes orders against stored portfolios
//!
//! A portfolio is read, changed in memory and written back as one row. The write
//! is a compare-and-swap on `version`; when another request got there first the
//! portfolio is reloaded and the change applied again against the fresh state.

use super::{
    HoldingValuation, PerformanceSnapshot, Portfolio, PortfolioStatus, TradeError, TradeOrder,
    Transaction, TransactionFilter,
};
use crate::db::{Database, DbError};
use crate::market_data::{MarketData, MarketDataCache, MarketDataError, Symbol};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

const MAX_TRADE_ATTEMPTS: u32 = 3;
const DEFAULT_PORTFOLIO_NAME: &str = "Main Portfolio";

#[derive(Error, Debug)]
pub enum TradingError {
    #[error(transparent)]
    Trade(#[from] TradeError),
    #[error(transparent)]
    Market(#[from] MarketDataError),
    #[error(transparent)]
    Database(#[from] DbError),
    #[error("Portfolio not found")]
    PortfolioNotFound,
    #[error("Portfolio was modified concurrently, please retry")]
    Conflict,
}

/// Snapshot plus per-holding valuation, as returned by the performance endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub portfolio_id: Uuid,
    pub cash_balance: Decimal,
    pub initial_deposit: Decimal,
    pub performance: PerformanceSnapshot,
    pub holdings: Vec<HoldingValuation>,
}

impl From<&Portfolio> for PerformanceReport {
    fn from(portfolio: &Portfolio) -> Self {
        Self {
            portfolio_id: portfolio.id,
            cash_balance: portfolio.cash_balance,
            initial_deposit: portfolio.initial_deposit,
            performance: portfolio.performance.clone(),
            holdings: portfolio.valuations(),
        }
    }
}

/// Where the compare-and-swap loop reads and writes portfolios
pub(crate) trait PortfolioStore {
    async fn load(&self, id: Uuid) -> Result<Option<Portfolio>, DbError>;
    async fn save(&self, portfolio: &Portfolio, expected_version: i64) -> Result<bool, DbError>;
    /// Insert a new portfolio. Returns false when it is marked default and the
    /// user already has a default portfolio.
    async fn insert(&self, portfolio: &Portfolio) -> Result<bool, DbError>;
}

impl PortfolioStore for Database {
    async fn load(&self, id: Uuid) -> Result<Option<Portfolio>, DbError> {
        self.get_portfolio(id).await
    }

    async fn save(&self, portfolio: &Portfolio, expected_version: i64) -> Result<bool, DbError> {
        self.save_portfolio(portfolio, expected_version).await
    }

    async fn insert(&self, portfolio: &Portfolio) -> Result<bool, DbError> {
        if portfolio.is_default {
            return self.insert_portfolio_if_absent(portfolio).await;
        }
        self.insert_portfolio(portfolio).await?;
        Ok(true)
    }
}

/// Insert a portfolio, demoting it to a plain one if another request created
/// the user's default in the meantime.
pub(crate) async fn insert_new_portfolio<S: PortfolioStore>(
    store: &S,
    mut portfolio: Portfolio,
) -> Result<Portfolio, TradingError> {
    if !store.insert(&portfolio).await? {
        portfolio.is_default = false;
        store.insert(&portfolio).await?;
    }
    Ok(portfolio)
}

/// Apply `change` and write the portfolio back with a version check,
/// reloading and applying again on conflict.
pub(crate) async fn update_with_retry<S, T, F>(
    store: &S,
    mut portfolio: Portfolio,
    mut change: F,
) -> Result<(Portfolio, T), TradingError>
where
    S: PortfolioStore,
    F: FnMut(&mut Portfolio) -> Result<T, TradingError>,
{
    for attempt in 1..=MAX_TRADE_ATTEMPTS {
        let expected_version = portfolio.version;
        let mut updated = portfolio.clone();
        let output = change(&mut updated)?;

        if store.save(&updated, expected_version).await? {
            updated.version = expected_version + 1;
            return Ok((updated, output));
        }

        warn!(
            "Version conflict on portfolio {} (attempt {}/{})",
            portfolio.id, attempt, MAX_TRADE_ATTEMPTS
        );
        portfolio = store
            .load(portfolio.id)
            .await?
            .ok_or(TradingError::PortfolioNotFound)?;
    }

    Err(TradingError::Conflict)
}

#[derive(Clone)]
pub struct TradeEngine {
    db: Database,
    market: Arc<MarketDataCache>,
    starting_balance: Decimal,
}

impl TradeEngine {
    pub fn new(db: Database, market: Arc<MarketDataCache>, starting_balance: Decimal) -> Self {
        Self {
            db,
            market,
            starting_balance,
        }
    }

    // ==========================================
    // Portfolio lookup
    // ==========================================

    /// The user's default portfolio, created with the starting balance on first access
    pub async fn default_portfolio(&self, user_id: Uuid) -> Result<Portfolio, TradingError> {
        if let Some(portfolio) = self.db.get_default_portfolio(user_id).await? {
            return Ok(portfolio);
        }

        let portfolio = Portfolio::new(
            user_id,
            DEFAULT_PORTFOLIO_NAME,
            None,
            self.starting_balance,
            true,
            Utc::now(),
        );
        if self.db.insert_portfolio_if_absent(&portfolio).await? {
            info!("Created default portfolio {} for user {}", portfolio.id, user_id);
        }

        // A concurrent request may have won the insert; read whichever row exists
        self.db
            .get_default_portfolio(user_id)
            .await?
            .ok_or(TradingError::PortfolioNotFound)
    }

    /// A specific portfolio owned by the user, or the default one
    pub async fn resolve_portfolio(
        &self,
        user_id: Uuid,
        portfolio_id: Option<Uuid>,
    ) -> Result<Portfolio, TradingError> {
        match portfolio_id {
            None => self.default_portfolio(user_id).await,
            Some(id) => self.owned_portfolio(user_id, id).await,
        }
    }

    pub async fn list_portfolios(&self, user_id: Uuid) -> Result<Vec<Portfolio>, TradingError> {
        let mut portfolios = self.db.list_portfolios(user_id).await?;
        if portfolios.is_empty() {
            portfolios.push(self.default_portfolio(user_id).await?);
        }
        Ok(portfolios)
    }

    /// Create an extra named portfolio. The first portfolio a user owns becomes the default.
    pub async fn create_portfolio(
        &self,
        user_id: Uuid,
        name: String,
        description: Option<String>,
        starting_balance: Option<Decimal>,
    ) -> Result<Portfolio, TradingError> {
        let balance = starting_balance.unwrap_or(self.starting_balance);
        let has_default = self.db.get_default_portfolio(user_id).await?.is_some();
        let portfolio = Portfolio::new(user_id, name, description, balance, !has_default, Utc::now());
        let portfolio = insert_new_portfolio(&self.db, portfolio).await?;

        info!("Created portfolio '{}' ({}) for user {}", portfolio.name, portfolio.id, user_id);
        Ok(portfolio)
    }

    async fn owned_portfolio(&self, user_id: Uuid, id: Uuid) -> Result<Portfolio, TradingError> {
        match self.db.get_portfolio(id).await? {
            Some(p) if p.user_id == user_id && p.status != PortfolioStatus::Deleted => Ok(p),
            _ => Err(TradingError::PortfolioNotFound),
        }
    }

    // ==========================================
    // Trade execution
    // ==========================================

    /// Execute a buy or sell at the current market price
    pub async fn execute_trade(
        &self,
        user_id: Uuid,
        portfolio_id: Option<Uuid>,
        order: TradeOrder,
    ) -> Result<(Portfolio, Transaction), TradingError> {
        let quote = self.price_for(&order.symbol).await?;
        let price = quote.price.current;
        let company_name = quote.company_name.clone();
        let target = self.resolve_portfolio(user_id, portfolio_id).await?;

        let (portfolio, transaction) = self
            .update_portfolio(target, |portfolio| {
                let transaction = portfolio.apply_trade(&order, price, Utc::now())?;
                if let Some(name) = &company_name {
                    portfolio.label_holding(&order.symbol, name);
                }
                Ok(transaction)
            })
            .await?;

        info!(
            "Executed {:?} {} x {} @ {} for portfolio {} (cash now {})",
            order.trade_type, order.quantity, order.symbol, price, portfolio.id, portfolio.cash_balance
        );
        Ok((portfolio, transaction))
    }

    async fn price_for(&self, symbol: &Symbol) -> Result<MarketData, TradingError> {
        match self.market.quote(symbol).await {
            Ok(quote) => Ok(quote),
            Err(MarketDataError::SymbolNotFound(s)) => Err(TradeError::SymbolNotFound(s).into()),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_portfolio<T, F>(&self, portfolio: Portfolio, change: F) -> Result<(Portfolio, T), TradingError>
    where
        F: FnMut(&mut Portfolio) -> Result<T, TradingError>,
    {
        update_with_retry(&self.db, portfolio, change).await
    }

    // ==========================================
    // Performance & history
    // ==========================================

    /// Reprice every holding from the cache and store the new snapshot
    pub async fn refresh_performance(
        &self,
        user_id: Uuid,
        portfolio_id: Option<Uuid>,
    ) -> Result<PerformanceReport, TradingError> {
        let portfolio = self.resolve_portfolio(user_id, portfolio_id).await?;

        let mut prices = HashMap::new();
        for holding in &portfolio.holdings {
            let quote = self.market.quote(&holding.symbol).await?;
            prices.insert(holding.symbol.clone(), quote.price.current);
        }

        let (portfolio, ()) = self
            .update_portfolio(portfolio, |p| {
                p.reprice(&prices, Utc::now());
                Ok(())
            })
            .await?;

        Ok(PerformanceReport::from(&portfolio))
    }

    pub async fn transactions(
        &self,
        user_id: Uuid,
        portfolio_id: Option<Uuid>,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, TradingError> {
        let portfolio = self.resolve_portfolio(user_id, portfolio_id).await?;
        Ok(portfolio.filter_transactions(filter))
    }

    // ==========================================
    // Watchlist
    // ==========================================

    /// Cached quotes for every watched symbol
    pub async fn watchlist(&self, user_id: Uuid) -> Result<Vec<MarketData>, TradingError> {
        let portfolio = self.default_portfolio(user_id).await?;
        Ok(self.market.cached_quotes(&portfolio.watched_symbols()).await?)
    }

    pub async fn add_to_watchlist(&self, user_id: Uuid, symbol: Symbol) -> Result<Portfolio, TradingError> {
        // Unknown symbols are rejected before touching the portfolio
        self.price_for(&symbol).await?;

        let portfolio = self.default_portfolio(user_id).await?;
        let (portfolio, ()) = self
            .update_portfolio(portfolio, |p| {
                p.add_to_watchlist(symbol.clone(), Utc::now())
                    .map_err(TradingError::from)
            })
            .await?;

        info!("User {} added {} to watchlist", user_id, symbol);
        Ok(portfolio)
    }

    pub async fn remove_from_watchlist(&self, user_id: Uuid, symbol: &Symbol) -> Result<Portfolio, TradingError> {
        let portfolio = self.default_portfolio(user_id).await?;
        if !portfolio.watchlist.iter().any(|entry| &entry.symbol == symbol) {
            return Ok(portfolio);
        }

        let (portfolio, _) = self
            .update_portfolio(portfolio, |p| Ok(p.remove_from_watchlist(symbol, Utc::now())))
            .await?;
        Ok(portfolio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::TradeType;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    /// In-memory store that loses the first `conflicts` writes to another writer
    /// who takes 1000 out of the cash balance each time.
    struct ContendedStore {
        stored: Mutex<Portfolio>,
        conflicts: Mutex<u32>,
        inserted: Mutex<Vec<Portfolio>>,
        default_taken: bool,
    }

    impl ContendedStore {
        fn new(portfolio: &Portfolio, conflicts: u32) -> Self {
            Self {
                stored: Mutex::new(portfolio.clone()),
                conflicts: Mutex::new(conflicts),
                inserted: Mutex::new(Vec::new()),
                default_taken: false,
            }
        }
    }

    impl PortfolioStore for ContendedStore {
        async fn load(&self, _id: Uuid) -> Result<Option<Portfolio>, DbError> {
            Ok(Some(self.stored.lock().unwrap().clone()))
        }

        async fn save(&self, portfolio: &Portfolio, expected_version: i64) -> Result<bool, DbError> {
            let mut stored = self.stored.lock().unwrap();
            let mut conflicts = self.conflicts.lock().unwrap();
            if *conflicts > 0 {
                *conflicts -= 1;
                stored.cash_balance -= dec!(1000);
                stored.version += 1;
                return Ok(false);
            }
            if stored.version != expected_version {
                return Ok(false);
            }
            *stored = portfolio.clone();
            stored.version = expected_version + 1;
            Ok(true)
        }

        async fn insert(&self, portfolio: &Portfolio) -> Result<bool, DbError> {
            if portfolio.is_default && self.default_taken {
                return Ok(false);
            }
            self.inserted.lock().unwrap().push(portfolio.clone());
            Ok(true)
        }
    }

    fn buy_ten(portfolio: &mut Portfolio) -> Result<Transaction, TradingError> {
        let order = TradeOrder::new(Symbol::parse("AAPL").unwrap(), TradeType::Buy, 10)?;
        Ok(portfolio.apply_trade(&order, dec!(50), Utc::now())?)
    }

    #[tokio::test]
    async fn test_conflict_reapplies_change_to_reloaded_portfolio() {
        let portfolio = Portfolio::new(Uuid::new_v4(), "Main", None, dec!(100000), true, Utc::now());
        let store = ContendedStore::new(&portfolio, 1);

        let (saved, transaction) = update_with_retry(&store, portfolio, buy_ten).await.unwrap();

        // 100000 - 1000 taken by the other writer - 500 for the buy
        assert_eq!(saved.cash_balance, dec!(98500));
        assert_eq!(saved.version, 2);
        assert_eq!(transaction.quantity, 10);
        assert_eq!(store.stored.lock().unwrap().cash_balance, dec!(98500));
    }

    #[tokio::test]
    async fn test_gives_up_after_three_conflicts() {
        let portfolio = Portfolio::new(Uuid::new_v4(), "Main", None, dec!(100000), true, Utc::now());
        let store = ContendedStore::new(&portfolio, MAX_TRADE_ATTEMPTS);

        let result = update_with_retry(&store, portfolio, buy_ten).await;
        assert!(matches!(result, Err(TradingError::Conflict)));

        let stored = store.stored.lock().unwrap();
        assert_eq!(stored.cash_balance, dec!(97000));
        assert!(stored.holdings.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_trade_is_not_written() {
        let portfolio = Portfolio::new(Uuid::new_v4(), "Main", None, dec!(100), true, Utc::now());
        let store = ContendedStore::new(&portfolio, 0);

        let result = update_with_retry(&store, portfolio, buy_ten).await;
        assert!(matches!(
            result,
            Err(TradingError::Trade(TradeError::InsufficientFunds { .. }))
        ));
        assert_eq!(store.stored.lock().unwrap().version, 0);
    }

    #[tokio::test]
    async fn test_new_portfolio_demoted_when_default_already_exists() {
        let portfolio = Portfolio::new(Uuid::new_v4(), "Growth", None, dec!(5000), true, Utc::now());
        let mut store = ContendedStore::new(&portfolio, 0);

        let created = insert_new_portfolio(&store, portfolio.clone()).await.unwrap();
        assert!(created.is_default);

        store.default_taken = true;
        let created = insert_new_portfolio(&store, portfolio).await.unwrap();
        assert!(!created.is_default);

        let inserted = store.inserted.lock().unwrap();
        assert_eq!(inserted.len(), 2);
        assert!(!inserted[1].is_default);
    }
}
