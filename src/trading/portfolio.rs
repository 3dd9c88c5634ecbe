//! Virtual portfolio document and the rules for applying trades to it
//!
//! Everything here is pure: a trade either fails validation and leaves the
//! portfolio untouched, or mutates it in memory. Persistence is the engine's job.

use super::TradeError;
use crate::market_data::Symbol;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

const DEFAULT_TRANSACTION_LIMIT: usize = 50;
const MAX_TRANSACTION_LIMIT: usize = 500;
const PERCENTAGE_DP: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeType {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortfolioStatus {
    Active,
    Inactive,
    Deleted,
}

/// A validated order. Quantity is always a positive whole number of shares.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeOrder {
    pub symbol: Symbol,
    pub trade_type: TradeType,
    pub quantity: i64,
}

impl TradeOrder {
    pub fn new(symbol: Symbol, trade_type: TradeType, quantity: i64) -> Result<Self, TradeError> {
        if quantity <= 0 {
            return Err(TradeError::InvalidQuantity);
        }
        Ok(Self {
            symbol,
            trade_type,
            quantity,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub symbol: Symbol,
    #[serde(default)]
    pub company_name: Option<String>,
    pub quantity: i64,
    pub average_buy_price: Decimal,
    /// Last observed price, used for valuation
    pub current_price: Decimal,
}

impl Holding {
    pub fn market_value(&self) -> Decimal {
        self.current_price * Decimal::from(self.quantity)
    }

    pub fn cost_basis(&self) -> Decimal {
        self.average_buy_price * Decimal::from(self.quantity)
    }
}

/// Completed trade. Never modified after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub trade_type: TradeType,
    pub symbol: Symbol,
    pub quantity: i64,
    pub price: Decimal,
    pub total: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistEntry {
    pub symbol: Symbol,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSnapshot {
    pub total_value: Decimal,
    pub holdings_value: Decimal,
    pub total_profit_loss: Decimal,
    pub total_profit_loss_percentage: Decimal,
    pub calculated_at: DateTime<Utc>,
}

impl PerformanceSnapshot {
    /// `totalValue = cash + Σ quantity × currentPrice`, profit/loss measured
    /// against the portfolio's own initial deposit.
    pub fn compute(
        cash_balance: Decimal,
        holdings: &[Holding],
        initial_deposit: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        let holdings_value: Decimal = holdings.iter().map(Holding::market_value).sum();
        let total_value = cash_balance + holdings_value;
        let total_profit_loss = total_value - initial_deposit;
        let total_profit_loss_percentage = if initial_deposit.is_zero() {
            Decimal::ZERO
        } else {
            (total_profit_loss / initial_deposit * Decimal::ONE_HUNDRED).round_dp(PERCENTAGE_DP)
        };

        Self {
            total_value,
            holdings_value,
            total_profit_loss,
            total_profit_loss_percentage,
            calculated_at: now,
        }
    }
}

/// Per-holding valuation returned by the performance endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingValuation {
    pub symbol: Symbol,
    pub company_name: Option<String>,
    pub quantity: i64,
    pub average_buy_price: Decimal,
    pub current_price: Decimal,
    pub market_value: Decimal,
    pub cost_basis: Decimal,
    pub profit_loss: Decimal,
    pub profit_loss_percentage: Decimal,
}

impl From<&Holding> for HoldingValuation {
    fn from(holding: &Holding) -> Self {
        let market_value = holding.market_value();
        let cost_basis = holding.cost_basis();
        let profit_loss = market_value - cost_basis;
        let profit_loss_percentage = if cost_basis.is_zero() {
            Decimal::ZERO
        } else {
            (profit_loss / cost_basis * Decimal::ONE_HUNDRED).round_dp(PERCENTAGE_DP)
        };

        Self {
            symbol: holding.symbol.clone(),
            company_name: holding.company_name.clone(),
            quantity: holding.quantity,
            average_buy_price: holding.average_buy_price,
            current_price: holding.current_price,
            market_value,
            cost_basis,
            profit_loss,
            profit_loss_percentage,
        }
    }
}

/// Filter for the embedded transaction history
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub trade_type: Option<TradeType>,
    pub symbol: Option<Symbol>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_default: bool,
    pub cash_balance: Decimal,
    pub initial_deposit: Decimal,
    pub holdings: Vec<Holding>,
    pub transactions: Vec<Transaction>,
    pub watchlist: Vec<WatchlistEntry>,
    pub performance: PerformanceSnapshot,
    pub status: PortfolioStatus,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Portfolio {
    pub fn new(
        user_id: Uuid,
        name: impl Into<String>,
        description: Option<String>,
        starting_balance: Decimal,
        is_default: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            name: name.into(),
            description,
            is_default,
            cash_balance: starting_balance,
            initial_deposit: starting_balance,
            holdings: Vec::new(),
            transactions: Vec::new(),
            watchlist: Vec::new(),
            performance: PerformanceSnapshot::compute(starting_balance, &[], starting_balance, now),
            status: PortfolioStatus::Active,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn holding(&self, symbol: &Symbol) -> Option<&Holding> {
        self.holdings.iter().find(|h| &h.symbol == symbol)
    }

    /// Execute an order at `price`. All checks run before any field changes,
    /// so an error leaves the portfolio exactly as it was.
    pub fn apply_trade(
        &mut self,
        order: &TradeOrder,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Transaction, TradeError> {
        if self.status != PortfolioStatus::Active {
            return Err(TradeError::PortfolioInactive);
        }
        if order.quantity <= 0 {
            return Err(TradeError::InvalidQuantity);
        }
        if price <= Decimal::ZERO {
            return Err(TradeError::InvalidPrice);
        }

        let quantity = Decimal::from(order.quantity);
        let trade_amount = price * quantity;

        match order.trade_type {
            TradeType::Buy => {
                if self.cash_balance < trade_amount {
                    return Err(TradeError::InsufficientFunds {
                        required: trade_amount,
                        available: self.cash_balance,
                    });
                }

                self.cash_balance -= trade_amount;
                match self.holdings.iter_mut().find(|h| h.symbol == order.symbol) {
                    Some(holding) => {
                        let held = Decimal::from(holding.quantity);
                        holding.average_buy_price =
                            (holding.average_buy_price * held + trade_amount) / (held + quantity);
                        holding.quantity += order.quantity;
                        holding.current_price = price;
                    }
                    None => self.holdings.push(Holding {
                        symbol: order.symbol.clone(),
                        company_name: None,
                        quantity: order.quantity,
                        average_buy_price: price,
                        current_price: price,
                    }),
                }
            }
            TradeType::Sell => {
                let index = self
                    .holdings
                    .iter()
                    .position(|h| h.symbol == order.symbol && h.quantity >= order.quantity)
                    .ok_or_else(|| TradeError::InsufficientShares {
                        symbol: order.symbol.clone(),
                        requested: order.quantity,
                        held: self.holding(&order.symbol).map_or(0, |h| h.quantity),
                    })?;

                self.cash_balance += trade_amount;
                let holding = &mut self.holdings[index];
                holding.quantity -= order.quantity;
                holding.current_price = price;
                if holding.quantity == 0 {
                    self.holdings.remove(index);
                }
            }
        }

        let transaction = Transaction {
            id: Uuid::new_v4(),
            trade_type: order.trade_type,
            symbol: order.symbol.clone(),
            quantity: order.quantity,
            price,
            total: trade_amount,
            timestamp: now,
        };
        self.transactions.push(transaction.clone());
        self.recompute_performance(now);

        Ok(transaction)
    }

    /// Record a display name on a holding that has none yet
    pub fn label_holding(&mut self, symbol: &Symbol, company_name: &str) {
        if let Some(holding) = self.holdings.iter_mut().find(|h| &h.symbol == symbol) {
            if holding.company_name.is_none() {
                holding.company_name = Some(company_name.to_string());
            }
        }
    }

    /// Update holding prices from fresh quotes and recompute the snapshot.
    /// Holdings without a quote keep their last observed price.
    pub fn reprice(&mut self, prices: &HashMap<Symbol, Decimal>, now: DateTime<Utc>) {
        for holding in &mut self.holdings {
            if let Some(price) = prices.get(&holding.symbol) {
                holding.current_price = *price;
            }
        }
        self.recompute_performance(now);
    }

    pub fn recompute_performance(&mut self, now: DateTime<Utc>) {
        self.performance =
            PerformanceSnapshot::compute(self.cash_balance, &self.holdings, self.initial_deposit, now);
        self.updated_at = now;
    }

    pub fn valuations(&self) -> Vec<HoldingValuation> {
        self.holdings.iter().map(HoldingValuation::from).collect()
    }

    pub fn add_to_watchlist(&mut self, symbol: Symbol, now: DateTime<Utc>) -> Result<(), TradeError> {
        if self.watchlist.iter().any(|entry| entry.symbol == symbol) {
            return Err(TradeError::AlreadyInWatchlist(symbol));
        }
        self.watchlist.push(WatchlistEntry {
            symbol,
            added_at: now,
        });
        self.updated_at = now;
        Ok(())
    }

    /// Returns whether the symbol was on the watchlist
    pub fn remove_from_watchlist(&mut self, symbol: &Symbol, now: DateTime<Utc>) -> bool {
        let before = self.watchlist.len();
        self.watchlist.retain(|entry| &entry.symbol != symbol);
        let removed = self.watchlist.len() != before;
        if removed {
            self.updated_at = now;
        }
        removed
    }

    pub fn watched_symbols(&self) -> Vec<Symbol> {
        self.watchlist.iter().map(|entry| entry.symbol.clone()).collect()
    }

    /// Matching transactions, newest first
    pub fn filter_transactions(&self, filter: &TransactionFilter) -> Vec<Transaction> {
        let limit = filter
            .limit
            .unwrap_or(DEFAULT_TRANSACTION_LIMIT)
            .clamp(1, MAX_TRANSACTION_LIMIT);

        let mut matching: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|t| filter.start_date.map_or(true, |start| t.timestamp >= start))
            .filter(|t| filter.end_date.map_or(true, |end| t.timestamp <= end))
            .filter(|t| filter.trade_type.map_or(true, |kind| t.trade_type == kind))
            .filter(|t| filter.symbol.as_ref().map_or(true, |s| &t.symbol == s))
            .cloned()
            .collect();

        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matching.truncate(limit);
        matching
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn symbol(s: &str) -> Symbol {
        Symbol::parse(s).unwrap()
    }

    fn order(s: &str, trade_type: TradeType, quantity: i64) -> TradeOrder {
        TradeOrder::new(symbol(s), trade_type, quantity).unwrap()
    }

    fn portfolio(cash: Decimal) -> Portfolio {
        Portfolio::new(Uuid::new_v4(), "Main", None, cash, true, Utc::now())
    }

    #[test]
    fn test_buy_buy_sell_walkthrough() {
        let mut p = portfolio(dec!(100000));
        let now = Utc::now();

        p.apply_trade(&order("AAPL", TradeType::Buy, 10), dec!(50), now).unwrap();
        assert_eq!(p.cash_balance, dec!(99500));
        let h = p.holding(&symbol("AAPL")).unwrap();
        assert_eq!((h.quantity, h.average_buy_price), (10, dec!(50)));

        p.apply_trade(&order("AAPL", TradeType::Buy, 10), dec!(60), now).unwrap();
        assert_eq!(p.cash_balance, dec!(98900));
        let h = p.holding(&symbol("AAPL")).unwrap();
        assert_eq!((h.quantity, h.average_buy_price), (20, dec!(55)));

        p.apply_trade(&order("AAPL", TradeType::Sell, 15), dec!(70), now).unwrap();
        assert_eq!(p.cash_balance, dec!(99950));
        let h = p.holding(&symbol("AAPL")).unwrap();
        assert_eq!((h.quantity, h.average_buy_price), (5, dec!(55)));

        assert_eq!(p.transactions.len(), 3);
        let last = p.transactions.last().unwrap();
        assert_eq!(last.price, dec!(70));
        assert_eq!(last.total, dec!(1050));
    }

    #[test]
    fn test_weighted_average_uneven_lots() {
        let mut p = portfolio(dec!(100000));
        let now = Utc::now();
        p.apply_trade(&order("MSFT", TradeType::Buy, 3), dec!(100), now).unwrap();
        p.apply_trade(&order("MSFT", TradeType::Buy, 1), dec!(200), now).unwrap();

        // (3*100 + 1*200) / 4
        assert_eq!(p.holding(&symbol("MSFT")).unwrap().average_buy_price, dec!(125));
    }

    #[test]
    fn test_insufficient_funds_leaves_state_unchanged() {
        let mut p = portfolio(dec!(1000));
        let before = p.clone();

        let err = p
            .apply_trade(&order("TSLA", TradeType::Buy, 5), dec!(200.01), Utc::now())
            .unwrap_err();
        assert!(matches!(err, TradeError::InsufficientFunds { .. }));
        assert_eq!(p.cash_balance, before.cash_balance);
        assert!(p.holdings.is_empty());
        assert!(p.transactions.is_empty());
        assert_eq!(p.performance, before.performance);
    }

    #[test]
    fn test_buy_exact_cash_allowed() {
        let mut p = portfolio(dec!(1000));
        p.apply_trade(&order("TSLA", TradeType::Buy, 5), dec!(200), Utc::now()).unwrap();
        assert_eq!(p.cash_balance, Decimal::ZERO);
    }

    #[test]
    fn test_insufficient_shares() {
        let mut p = portfolio(dec!(10000));
        let now = Utc::now();

        let err = p.apply_trade(&order("NVDA", TradeType::Sell, 1), dec!(100), now).unwrap_err();
        assert_eq!(
            err,
            TradeError::InsufficientShares {
                symbol: symbol("NVDA"),
                requested: 1,
                held: 0
            }
        );

        p.apply_trade(&order("NVDA", TradeType::Buy, 2), dec!(100), now).unwrap();
        let before = p.clone();
        let err = p.apply_trade(&order("NVDA", TradeType::Sell, 3), dec!(100), now).unwrap_err();
        assert!(matches!(err, TradeError::InsufficientShares { held: 2, .. }));
        assert_eq!(p.cash_balance, before.cash_balance);
        assert_eq!(p.holdings, before.holdings);
        assert_eq!(p.transactions.len(), 1);
    }

    #[test]
    fn test_selling_everything_removes_holding() {
        let mut p = portfolio(dec!(10000));
        let now = Utc::now();
        p.apply_trade(&order("AMD", TradeType::Buy, 4), dec!(150), now).unwrap();
        p.apply_trade(&order("AMD", TradeType::Sell, 4), dec!(160), now).unwrap();

        assert!(p.holding(&symbol("AMD")).is_none());
        assert_eq!(p.cash_balance, dec!(10040));
    }

    #[test]
    fn test_inactive_portfolio_rejects_trades() {
        let mut p = portfolio(dec!(10000));
        p.status = PortfolioStatus::Inactive;
        let err = p.apply_trade(&order("AMD", TradeType::Buy, 1), dec!(10), Utc::now()).unwrap_err();
        assert_eq!(err, TradeError::PortfolioInactive);
    }

    #[test]
    fn test_order_requires_positive_quantity() {
        assert_eq!(
            TradeOrder::new(symbol("AAPL"), TradeType::Buy, 0).unwrap_err(),
            TradeError::InvalidQuantity
        );
        assert!(TradeOrder::new(symbol("AAPL"), TradeType::Sell, -3).is_err());
    }

    #[test]
    fn test_performance_uses_initial_deposit() {
        let mut p = portfolio(dec!(50000));
        let now = Utc::now();
        p.apply_trade(&order("AAPL", TradeType::Buy, 100), dec!(100), now).unwrap();
        assert_eq!(p.performance.total_value, dec!(50000));
        assert_eq!(p.performance.total_profit_loss, Decimal::ZERO);

        let prices = HashMap::from([(symbol("AAPL"), dec!(110))]);
        p.reprice(&prices, now);
        assert_eq!(p.performance.holdings_value, dec!(11000));
        assert_eq!(p.performance.total_value, dec!(51000));
        assert_eq!(p.performance.total_profit_loss, dec!(1000));
        assert_eq!(p.performance.total_profit_loss_percentage, dec!(2));

        let valuation = &p.valuations()[0];
        assert_eq!(valuation.profit_loss, dec!(1000));
        assert_eq!(valuation.profit_loss_percentage, dec!(10));
    }

    #[test]
    fn test_watchlist_rejects_duplicates() {
        let mut p = portfolio(dec!(100));
        let now = Utc::now();
        p.add_to_watchlist(symbol("AAPL"), now).unwrap();
        assert_eq!(
            p.add_to_watchlist(symbol("aapl"), now).unwrap_err(),
            TradeError::AlreadyInWatchlist(symbol("AAPL"))
        );
        assert!(p.remove_from_watchlist(&symbol("AAPL"), now));
        assert!(!p.remove_from_watchlist(&symbol("AAPL"), now));
        assert!(p.watched_symbols().is_empty());
    }

    #[test]
    fn test_filter_transactions() {
        let mut p = portfolio(dec!(100000));
        let start = Utc::now() - Duration::days(10);
        for day in 0..5 {
            let kind = if day % 2 == 0 { TradeType::Buy } else { TradeType::Sell };
            let t = if kind == TradeType::Buy {
                order("AAPL", kind, 2)
            } else {
                order("AAPL", kind, 1)
            };
            p.apply_trade(&t, dec!(10), start + Duration::days(day)).unwrap();
        }
        p.apply_trade(&order("MSFT", TradeType::Buy, 1), dec!(10), start + Duration::days(6))
            .unwrap();

        let all = p.filter_transactions(&TransactionFilter::default());
        assert_eq!(all.len(), 6);
        assert_eq!(all[0].symbol, symbol("MSFT"), "Newest first");

        let sells = p.filter_transactions(&TransactionFilter {
            trade_type: Some(TradeType::Sell),
            ..Default::default()
        });
        assert_eq!(sells.len(), 2);

        let windowed = p.filter_transactions(&TransactionFilter {
            start_date: Some(start + Duration::days(1)),
            end_date: Some(start + Duration::days(3)),
            symbol: Some(symbol("AAPL")),
            ..Default::default()
        });
        assert_eq!(windowed.len(), 3);

        let limited = p.filter_transactions(&TransactionFilter {
            limit: Some(2),
            ..Default::default()
        });
        assert_eq!(limited.len(), 2);
    }
}
