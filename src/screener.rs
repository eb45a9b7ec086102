use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::{Config, HTTP_TIMEOUT_SECS};
use crate::error::{AppError, Result};
use crate::types::SnapshotRow;

/// Columns we request from the screener, in d-array position order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Price,
    ChangePct,
    PremarketChangePct,
    GapPct,
    Volume,
    PremarketVolume,
    Rvol5m,
    FloatShares,
}

impl Column {
    /// Wire name in the scan request.
    pub fn field(&self) -> &'static str {
        match self {
            Column::Price => "close",
            Column::ChangePct => "change_from_open",
            Column::PremarketChangePct => "premarket_change",
            Column::GapPct => "gap",
            Column::Volume => "volume",
            Column::PremarketVolume => "premarket_volume",
            Column::Rvol5m => "relative_volume_intraday|5",
            Column::FloatShares => "float_shares_outstanding",
        }
    }

    fn apply(&self, row: &mut SnapshotRow, value: Option<f64>) {
        match self {
            Column::Price => row.price = value,
            Column::ChangePct => row.change_pct = value,
            Column::PremarketChangePct => row.premarket_change_pct = value,
            Column::GapPct => row.gap_pct = value,
            Column::Volume => row.volume = value,
            Column::PremarketVolume => row.premarket_volume = value,
            Column::Rvol5m => row.rvol_5m = value,
            Column::FloatShares => row.float_shares = value,
        }
    }
}

/// One screener scan request. Built by the preset constructors; workers never
/// assemble filter JSON themselves.
#[derive(Debug, Clone)]
pub struct ScanQuery {
    /// Short label for logs and diagnostics.
    pub label: &'static str,
    pub columns: Vec<Column>,
    filter: Value,
    sort_by: &'static str,
    descending: bool,
    limit: usize,
    /// Non-empty = restrict the scan to exactly these tickers.
    tickers: Vec<String>,
}

impl ScanQuery {
    /// Premarket gainers ordered by premarket change.
    pub fn premarket_gainers(limit: usize) -> Self {
        Self {
            label: "premarket_gainers",
            columns: vec![
                Column::Price,
                Column::PremarketChangePct,
                Column::PremarketVolume,
                Column::FloatShares,
            ],
            filter: json!([
                {"left": "premarket_change", "operation": "greater", "right": 0}
            ]),
            sort_by: "premarket_change",
            descending: true,
            limit,
            tickers: Vec::new(),
        }
    }

    /// Highest-volume movers of the regular session, both directions.
    pub fn market_movers(limit: usize) -> Self {
        Self {
            label: "market_movers",
            columns: vec![
                Column::Price,
                Column::ChangePct,
                Column::Volume,
                Column::Rvol5m,
            ],
            filter: json!([
                {"left": "volume", "operation": "greater", "right": 1_000_000}
            ]),
            sort_by: "volume",
            descending: true,
            limit,
            tickers: Vec::new(),
        }
    }

    /// Gapping symbols with premarket activity, both gap directions.
    pub fn gap_candidates(limit: usize) -> Self {
        Self {
            label: "gap_candidates",
            columns: vec![
                Column::Price,
                Column::GapPct,
                Column::PremarketChangePct,
                Column::PremarketVolume,
            ],
            filter: json!([
                {"left": "premarket_volume", "operation": "greater", "right": 0}
            ]),
            sort_by: "premarket_volume",
            descending: true,
            limit,
            tickers: Vec::new(),
        }
    }

    /// Live snapshot of an explicit ticker list (watchlist monitoring).
    pub fn watch(tickers: Vec<String>) -> Self {
        let limit = tickers.len();
        Self {
            label: "watch",
            columns: vec![
                Column::Price,
                Column::ChangePct,
                Column::GapPct,
                Column::Volume,
            ],
            filter: json!([]),
            sort_by: "change_from_open",
            descending: true,
            limit,
            tickers,
        }
    }

    /// Request body in the screener's scan format.
    pub fn body(&self) -> Value {
        let columns: Vec<&str> = self.columns.iter().map(|c| c.field()).collect();
        let mut body = json!({
            "filter": self.filter,
            "options": {"lang": "en"},
            "markets": ["america"],
            "columns": columns,
            "sort": {
                "sortBy": self.sort_by,
                "sortOrder": if self.descending { "desc" } else { "asc" },
            },
            "range": [0, self.limit],
        });
        if !self.tickers.is_empty() {
            body["symbols"] = json!({"tickers": self.tickers});
        }
        body
    }
}

// ---------------------------------------------------------------------------
// DataSource trait + screener implementation
// ---------------------------------------------------------------------------

#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch(&self, query: &ScanQuery) -> Result<Vec<SnapshotRow>>;
}

#[derive(Debug, Default)]
struct ParseStats {
    api_total: usize,
    rejected_no_symbol: usize,
    rejected_bad_value: usize,
}

pub struct ScreenerClient {
    client: reqwest::Client,
    url: String,
}

impl ScreenerClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            url: cfg.screener_url.clone(),
        })
    }
}

#[async_trait]
impl DataSource for ScreenerClient {
    async fn fetch(&self, query: &ScanQuery) -> Result<Vec<SnapshotRow>> {
        let resp: Value = self
            .client
            .post(&self.url)
            .json(&query.body())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let items = resp
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| {
                AppError::Source(format!("screener {} response missing data array", query.label))
            })?;

        let mut stats = ParseStats {
            api_total: items.len(),
            ..Default::default()
        };
        let mut rows = Vec::with_capacity(items.len());
        for item in items {
            match parse_row(item, &query.columns) {
                ParsedRow::Ok(row) => rows.push(row),
                ParsedRow::NoSymbol => stats.rejected_no_symbol += 1,
                ParsedRow::BadValue => stats.rejected_bad_value += 1,
            }
        }

        debug!(
            query = query.label,
            total = stats.api_total,
            parsed = rows.len(),
            no_symbol = stats.rejected_no_symbol,
            bad_value = stats.rejected_bad_value,
            "screener scan parsed"
        );
        Ok(rows)
    }
}

enum ParsedRow {
    Ok(SnapshotRow),
    NoSymbol,
    BadValue,
}

/// Parse one `{s, d}` item into a row. The d array is positional against the
/// requested column list; null cells stay None, a non-finite cell poisons the
/// whole row.
fn parse_row(item: &Value, columns: &[Column]) -> ParsedRow {
    let Some(ticker) = item.get("s").and_then(|s| s.as_str()) else {
        return ParsedRow::NoSymbol;
    };
    if ticker.is_empty() {
        return ParsedRow::NoSymbol;
    }
    let symbol = ticker
        .split_once(':')
        .map(|(_, sym)| sym)
        .unwrap_or(ticker)
        .to_string();

    let mut row = SnapshotRow {
        symbol,
        ticker: ticker.to_string(),
        ..Default::default()
    };

    let empty = Vec::new();
    let cells = item
        .get("d")
        .and_then(|d| d.as_array())
        .unwrap_or(&empty);
    for (idx, column) in columns.iter().enumerate() {
        let cell = cells.get(idx).unwrap_or(&Value::Null);
        let value = match cell {
            Value::Null => None,
            other => match other.as_f64() {
                Some(v) if v.is_finite() => Some(v),
                // Number cell we cannot use: drop the row, not just the cell.
                _ => return ParsedRow::BadValue,
            },
        };
        column.apply(&mut row, value);
    }

    ParsedRow::Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols() -> Vec<Column> {
        vec![
            Column::Price,
            Column::PremarketChangePct,
            Column::PremarketVolume,
            Column::FloatShares,
        ]
    }

    #[test]
    fn parses_standard_row() {
        let item = json!({"s": "NASDAQ:ABCD", "d": [4.52, 23.4, 1_250_000.0, 8_400_000.0]});
        let ParsedRow::Ok(row) = parse_row(&item, &cols()) else {
            panic!("expected parsed row");
        };
        assert_eq!(row.symbol, "ABCD");
        assert_eq!(row.ticker, "NASDAQ:ABCD");
        assert_eq!(row.price, Some(4.52));
        assert_eq!(row.premarket_change_pct, Some(23.4));
        assert_eq!(row.premarket_volume, Some(1_250_000.0));
        assert_eq!(row.float_shares, Some(8_400_000.0));
        assert_eq!(row.volume, None);
    }

    #[test]
    fn null_cells_stay_none() {
        let item = json!({"s": "NYSE:EFGH", "d": [12.0, null, 300_000.0, null]});
        let ParsedRow::Ok(row) = parse_row(&item, &cols()) else {
            panic!("expected parsed row");
        };
        assert_eq!(row.premarket_change_pct, None);
        assert_eq!(row.float_shares, None);
        assert_eq!(row.premarket_volume, Some(300_000.0));
    }

    #[test]
    fn missing_symbol_rejected() {
        let item = json!({"d": [1.0, 2.0, 3.0, 4.0]});
        assert!(matches!(parse_row(&item, &cols()), ParsedRow::NoSymbol));
        let item = json!({"s": "", "d": [1.0, 2.0, 3.0, 4.0]});
        assert!(matches!(parse_row(&item, &cols()), ParsedRow::NoSymbol));
    }

    #[test]
    fn non_numeric_cell_rejects_row() {
        let item = json!({"s": "NASDAQ:IJKL", "d": [4.0, "n/a", 100.0, 200.0]});
        assert!(matches!(parse_row(&item, &cols()), ParsedRow::BadValue));
    }

    #[test]
    fn short_d_array_leaves_tail_none() {
        let item = json!({"s": "NASDAQ:MNOP", "d": [4.0]});
        let ParsedRow::Ok(row) = parse_row(&item, &cols()) else {
            panic!("expected parsed row");
        };
        assert_eq!(row.price, Some(4.0));
        assert_eq!(row.premarket_change_pct, None);
    }

    #[test]
    fn watch_query_carries_tickers() {
        let q = ScanQuery::watch(vec!["NASDAQ:ABCD".to_string(), "NYSE:EF".to_string()]);
        let body = q.body();
        assert_eq!(body["symbols"]["tickers"][0], "NASDAQ:ABCD");
        assert_eq!(body["range"][1], 2);
        // Preset queries scan the whole market instead.
        let body = ScanQuery::market_movers(150).body();
        assert!(body.get("symbols").is_none());
    }
}
