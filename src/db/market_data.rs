//! Cached market data rows

use super::{enum_text, text_enum, Database, DbError};
use crate::market_data::{
    AssetType, HistoricalBar, MarketData, PriceChange, PriceData, Symbol, VolumeData,
};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{FromRow, Row};

const MARKET_DATA_COLUMNS: &str = r#"
    symbol, asset_type, exchange, company_name,
    price_current, price_open, price_high, price_low, price_close, price_previous_close,
    volume_current, volume_average, change_value, change_percentage,
    historical, last_updated, update_frequency, status
"#;

impl<'r> FromRow<'r, PgRow> for MarketData {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let raw_symbol: String = row.try_get("symbol")?;
        let symbol = Symbol::parse(&raw_symbol).map_err(|e| sqlx::Error::ColumnDecode {
            index: "symbol".to_string(),
            source: Box::new(e),
        })?;
        let historical: Json<Vec<HistoricalBar>> = row.try_get("historical")?;

        Ok(Self {
            symbol,
            asset_type: text_enum(row, "asset_type")?,
            exchange: row.try_get("exchange")?,
            company_name: row.try_get("company_name")?,
            price: PriceData {
                current: row.try_get("price_current")?,
                open: row.try_get("price_open")?,
                high: row.try_get("price_high")?,
                low: row.try_get("price_low")?,
                close: row.try_get("price_close")?,
                previous_close: row.try_get("price_previous_close")?,
            },
            volume: VolumeData {
                current: row.try_get("volume_current")?,
                average: row.try_get("volume_average")?,
            },
            change: PriceChange {
                value: row.try_get("change_value")?,
                percentage: row.try_get("change_percentage")?,
            },
            historical: historical.0,
            last_updated: row.try_get("last_updated")?,
            update_frequency: text_enum(row, "update_frequency")?,
            status: text_enum(row, "status")?,
        })
    }
}

impl Database {
    // ==========================================
    // Market Data Operations
    // ==========================================

    /// Get the cached quote for a symbol
    pub async fn get_market_data(&self, symbol: &Symbol) -> Result<Option<MarketData>, DbError> {
        let sql = format!("SELECT {} FROM market_data WHERE symbol = $1", MARKET_DATA_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(symbol.as_str())
            .fetch_optional(self.pool())
            .await?;

        row.map(|r| MarketData::from_row(&r))
            .transpose()
            .map_err(DbError::from)
    }

    /// Get cached quotes for a set of symbols
    pub async fn get_market_data_many(&self, symbols: &[Symbol]) -> Result<Vec<MarketData>, DbError> {
        let names: Vec<String> = symbols.iter().map(|s| s.as_str().to_string()).collect();
        let sql = format!(
            "SELECT {} FROM market_data WHERE symbol = ANY($1) ORDER BY symbol",
            MARKET_DATA_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(names).fetch_all(self.pool()).await?;

        rows.iter()
            .map(MarketData::from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(DbError::from)
    }

    /// Insert or refresh the quote columns for a symbol (history is left untouched)
    pub async fn upsert_quote(&self, data: &MarketData) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO market_data (
                symbol, asset_type, exchange, company_name,
                price_current, price_open, price_high, price_low, price_close, price_previous_close,
                volume_current, volume_average, change_value, change_percentage,
                historical, last_updated, update_frequency, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            ON CONFLICT (symbol) DO UPDATE SET
                exchange = EXCLUDED.exchange,
                company_name = EXCLUDED.company_name,
                price_current = EXCLUDED.price_current,
                price_open = EXCLUDED.price_open,
                price_high = EXCLUDED.price_high,
                price_low = EXCLUDED.price_low,
                price_close = EXCLUDED.price_close,
                price_previous_close = EXCLUDED.price_previous_close,
                volume_current = EXCLUDED.volume_current,
                volume_average = EXCLUDED.volume_average,
                change_value = EXCLUDED.change_value,
                change_percentage = EXCLUDED.change_percentage,
                last_updated = EXCLUDED.last_updated,
                update_frequency = EXCLUDED.update_frequency,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(data.symbol.as_str())
        .bind(enum_text(&data.asset_type))
        .bind(&data.exchange)
        .bind(&data.company_name)
        .bind(data.price.current)
        .bind(data.price.open)
        .bind(data.price.high)
        .bind(data.price.low)
        .bind(data.price.close)
        .bind(data.price.previous_close)
        .bind(data.volume.current)
        .bind(data.volume.average)
        .bind(data.change.value)
        .bind(data.change.percentage)
        .bind(Json(&data.historical))
        .bind(data.last_updated)
        .bind(enum_text(&data.update_frequency))
        .bind(enum_text(&data.status))
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Replace the stored price history for a symbol
    pub async fn update_history(&self, symbol: &Symbol, bars: &[HistoricalBar]) -> Result<(), DbError> {
        let result = sqlx::query(
            r#"
            UPDATE market_data
            SET historical = $2, updated_at = CURRENT_TIMESTAMP
            WHERE symbol = $1
            "#,
        )
        .bind(symbol.as_str())
        .bind(Json(bars))
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Case-insensitive search over symbols and company names
    pub async fn search_market_data(
        &self,
        query: &str,
        asset_type: Option<AssetType>,
        limit: i64,
    ) -> Result<Vec<MarketData>, DbError> {
        let pattern = format!("%{}%", escape_like(query));
        let sql = format!(
            r#"
            SELECT {} FROM market_data
            WHERE (symbol ILIKE $1 OR company_name ILIKE $1)
              AND ($2::TEXT IS NULL OR asset_type = $2)
            ORDER BY symbol
            LIMIT $3
            "#,
            MARKET_DATA_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(pattern)
            .bind(asset_type.map(|t| enum_text(&t)))
            .bind(limit)
            .fetch_all(self.pool())
            .await?;

        rows.iter()
            .map(MarketData::from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(DbError::from)
    }

    /// Biggest movers by change percentage for an asset type
    pub async fn top_movers(
        &self,
        asset_type: AssetType,
        limit: i64,
        gainers: bool,
    ) -> Result<Vec<MarketData>, DbError> {
        let direction = if gainers { "DESC" } else { "ASC" };
        let sql = format!(
            r#"
            SELECT {} FROM market_data
            WHERE asset_type = $1 AND change_percentage IS NOT NULL
            ORDER BY change_percentage {}
            LIMIT $2
            "#,
            MARKET_DATA_COLUMNS, direction
        );
        let rows = sqlx::query(&sql)
            .bind(enum_text(&asset_type))
            .bind(limit)
            .fetch_all(self.pool())
            .await?;

        rows.iter()
            .map(MarketData::from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(DbError::from)
    }
}

/// Escape LIKE wildcards in user input
fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("AAPL"), "AAPL");
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
    }
}
