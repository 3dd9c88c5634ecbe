//! Virtual trading - portfolios, trade execution and watchlists

mod engine;
mod portfolio;

pub use engine::{PerformanceReport, TradeEngine, TradingError};
pub use portfolio::{
    Holding, HoldingValuation, PerformanceSnapshot, Portfolio, PortfolioStatus, TradeOrder,
    TradeType, Transaction, TransactionFilter, WatchlistEntry,
};

use crate::market_data::Symbol;
use rust_decimal::Decimal;
use thiserror::Error;

/// Business-rule failures of a single trade or watchlist change
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TradeError {
    #[error("Symbol not found: {0}")]
    SymbolNotFound(Symbol),
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },
    #[error("Insufficient shares of {symbol}: requested {requested}, held {held}")]
    InsufficientShares {
        symbol: Symbol,
        requested: i64,
        held: i64,
    },
    #[error("Quantity must be a positive whole number")]
    InvalidQuantity,
    #[error("Market price must be positive")]
    InvalidPrice,
    #[error("Portfolio is not active")]
    PortfolioInactive,
    #[error("{0} is already in the watchlist")]
    AlreadyInWatchlist(Symbol),
}
