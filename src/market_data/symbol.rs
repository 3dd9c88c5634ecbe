//! Ticker symbols, parsed once at the API boundary

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

const MAX_SYMBOL_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid symbol: '{0}' (expected 1-12 characters of A-Z, 0-9, '.' or '-', including a letter or digit)")]
pub struct InvalidSymbol(pub String);

/// Upper-cased, trimmed ticker symbol
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    pub fn parse(raw: &str) -> Result<Self, InvalidSymbol> {
        let normalized = raw.trim().to_ascii_uppercase();
        let valid = !normalized.is_empty()
            && normalized.len() <= MAX_SYMBOL_LEN
            && normalized
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
            && normalized.chars().any(|c| c.is_ascii_alphanumeric());

        if valid {
            Ok(Self(normalized))
        } else {
            Err(InvalidSymbol(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Symbol {
    type Error = InvalidSymbol;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes() {
        assert_eq!(Symbol::parse(" aapl ").unwrap().as_str(), "AAPL");
        assert_eq!(Symbol::parse("brk.b").unwrap().as_str(), "BRK.B");
        assert_eq!(Symbol::parse("BTC-USD").unwrap().as_str(), "BTC-USD");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Symbol::parse("").is_err());
        assert!(Symbol::parse("   ").is_err());
        assert!(Symbol::parse("AAPL; DROP").is_err());
        assert!(Symbol::parse("ABCDEFGHIJKLM").is_err(), "13 chars is too long");
        assert!(Symbol::parse("..").is_err());
        assert!(Symbol::parse(".-.").is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Symbol = serde_json::from_str("\"msft\"").unwrap();
        assert_eq!(ok.as_str(), "MSFT");
        assert!(serde_json::from_str::<Symbol>("\"../etc\"").is_err());
    }
}
