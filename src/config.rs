use chrono::NaiveTime;

use crate::error::{AppError, Result};

pub const SCREENER_URL: &str = "https://scanner.tradingview.com/america/scan";
pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Channel capacity for the alert journal queue.
pub const CHANNEL_CAPACITY: usize = 1024;

/// HTTP timeout for screener and Telegram requests (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Row cap for full-market screener scans.
pub const SCAN_ROW_LIMIT: usize = 150;

/// A momentum symbol absent from scans for longer than this is treated as a
/// fresh entrant again when it reappears (seconds).
pub const STALE_SEEN_SECS: u64 = 1800;

/// Cooldown entries older than PRUNE_WINDOW_FACTOR * cooldown window are
/// garbage-collected at the end of each dispatch cycle.
pub const PRUNE_WINDOW_FACTOR: u32 = 2;

/// Scan-cycle gates for the momentum scorer. A row failing any gate of a side
/// gets no score for that side (excluded from ranking, not scored zero).
pub mod score_gates {
    /// Long side: minimum 5-minute relative volume.
    pub const UP_MIN_RVOL_5M: f64 = 5.0;
    /// Long side: minimum change from open (percent).
    pub const UP_MIN_CHANGE_PCT: f64 = 2.0;
    /// Long side: minimum session volume (shares).
    pub const UP_MIN_VOLUME: f64 = 10_000_000.0;
    /// Long side: minimum last price (dollars).
    pub const UP_MIN_PRICE: f64 = 2.0;
    /// Short side: maximum change from open (percent; candidates are fallers).
    pub const DOWN_MAX_CHANGE_PCT: f64 = -2.0;
    /// Short side: minimum session volume (shares).
    pub const DOWN_MIN_VOLUME: f64 = 50_000_000.0;
}

#[derive(Debug, Clone)]
pub struct Config {
    pub screener_url: String,
    pub telegram_api_url: String,
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Telegram bot credentials (TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID). Required.
    pub telegram_bot_token: String,
    pub telegram_chat_id: String,
    /// Market timezone as a fixed UTC offset in hours (MARKET_UTC_OFFSET_HOURS).
    /// Default -4 = US Eastern daylight time; adjust when DST flips.
    pub market_utc_offset_hours: i32,
    /// Trading-day window boundaries in market-local time, "HH:MM"
    /// (PREMARKET_START, MARKET_OPEN, MARKET_CLOSE).
    pub premarket_start: NaiveTime,
    pub market_open: NaiveTime,
    pub market_close: NaiveTime,
    /// Orchestrator phase-poll interval in seconds (ORCH_POLL_SECS)
    pub orch_poll_secs: u64,
    /// Premarket gainer scan interval in seconds (PREMARKET_SCAN_SECS)
    pub premarket_scan_secs: u64,
    /// Momentum scan interval in seconds (MOMENTUM_SCAN_SECS)
    pub momentum_scan_secs: u64,
    /// Gap watchlist build interval during premarket, seconds (WATCH_SETUP_SCAN_SECS)
    pub watch_setup_scan_secs: u64,
    /// Gap watchlist monitor interval after the open, seconds (WATCH_ACTIVE_SCAN_SECS)
    pub watch_active_scan_secs: u64,
    /// Premarket step alerts fire every this many percent of growth (STEP_SIZE_PCT)
    pub step_size_pct: f64,
    /// Premarket gainer gates (STEP_MIN_VOLUME, STEP_MIN_PRICE, STEP_MAX_FLOAT)
    pub step_min_volume: f64,
    pub step_min_price: f64,
    pub step_max_float: f64,
    /// Alert on symbols already crossing thresholds at worker start instead of
    /// silently baselining them (SEND_ON_STARTUP)
    pub send_on_startup: bool,
    /// Ranked list depth for the momentum scorer (MOMENTUM_TOP_N)
    pub momentum_top_n: usize,
    /// Per (symbol, trigger) momentum alert cooldown in seconds (COOLDOWN_SECS)
    pub cooldown_secs: u64,
    /// Minimum rvol growth between scans to count as a spike (RVOL_SPIKE_DELTA)
    pub rvol_spike_delta: f64,
    /// Price drop vs the previous scan that counts as a reversal, percent
    /// (DUMP_THRESHOLD_PCT, negative)
    pub dump_threshold_pct: f64,
    /// Gap watchlist admission gates (WATCH_MIN_GAP_PCT, WATCH_MIN_PM_VOLUME)
    pub watch_min_gap_pct: f64,
    pub watch_min_pm_volume: f64,
    /// Change-from-open levels that fire fade/bounce plays, percent
    /// (FADE_TRIGGER_PCT negative, BOUNCE_TRIGGER_PCT positive)
    pub fade_trigger_pct: f64,
    pub bounce_trigger_pct: f64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            screener_url: std::env::var("SCREENER_URL").unwrap_or_else(|_| SCREENER_URL.to_string()),
            telegram_api_url: std::env::var("TELEGRAM_API_URL")
                .unwrap_or_else(|_| TELEGRAM_API_URL.to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "scanner.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            telegram_bot_token: std::env::var("TELEGRAM_BOT_TOKEN")
                .map_err(|_| AppError::Config("TELEGRAM_BOT_TOKEN must be set".to_string()))?,
            telegram_chat_id: std::env::var("TELEGRAM_CHAT_ID")
                .map_err(|_| AppError::Config("TELEGRAM_CHAT_ID must be set".to_string()))?,
            market_utc_offset_hours: std::env::var("MARKET_UTC_OFFSET_HOURS")
                .unwrap_or_else(|_| "-4".to_string())
                .parse::<i32>()
                .map_err(|_| {
                    AppError::Config("MARKET_UTC_OFFSET_HOURS must be an integer".to_string())
                })?,
            premarket_start: parse_hhmm("PREMARKET_START", "04:00")?,
            market_open: parse_hhmm("MARKET_OPEN", "09:30")?,
            market_close: parse_hhmm("MARKET_CLOSE", "16:00")?,
            orch_poll_secs: parse_secs("ORCH_POLL_SECS", 30),
            premarket_scan_secs: parse_secs("PREMARKET_SCAN_SECS", 60),
            momentum_scan_secs: parse_secs("MOMENTUM_SCAN_SECS", 60),
            watch_setup_scan_secs: parse_secs("WATCH_SETUP_SCAN_SECS", 120),
            watch_active_scan_secs: parse_secs("WATCH_ACTIVE_SCAN_SECS", 30),
            step_size_pct: parse_f64("STEP_SIZE_PCT", 5.0),
            step_min_volume: parse_f64("STEP_MIN_VOLUME", 500_000.0),
            step_min_price: parse_f64("STEP_MIN_PRICE", 2.0),
            step_max_float: parse_f64("STEP_MAX_FLOAT", 50_000_000.0),
            send_on_startup: std::env::var("SEND_ON_STARTUP")
                .map(|v| matches!(v.as_str(), "1" | "true"))
                .unwrap_or(false),
            momentum_top_n: std::env::var("MOMENTUM_TOP_N")
                .unwrap_or_else(|_| "5".to_string())
                .parse::<usize>()
                .unwrap_or(5),
            cooldown_secs: parse_secs("COOLDOWN_SECS", 300),
            rvol_spike_delta: parse_f64("RVOL_SPIKE_DELTA", 5.0),
            dump_threshold_pct: parse_f64("DUMP_THRESHOLD_PCT", -2.0),
            watch_min_gap_pct: parse_f64("WATCH_MIN_GAP_PCT", 7.0),
            watch_min_pm_volume: parse_f64("WATCH_MIN_PM_VOLUME", 500_000.0),
            fade_trigger_pct: parse_f64("FADE_TRIGGER_PCT", -2.0),
            bounce_trigger_pct: parse_f64("BOUNCE_TRIGGER_PCT", 2.0),
        })
    }
}

#[cfg(test)]
impl Config {
    /// Baseline config for unit tests. Tests override the fields they probe.
    pub fn for_tests() -> Self {
        Self {
            screener_url: SCREENER_URL.to_string(),
            telegram_api_url: TELEGRAM_API_URL.to_string(),
            log_level: "debug".to_string(),
            db_path: ":memory:".to_string(),
            api_port: 0,
            telegram_bot_token: "test-token".to_string(),
            telegram_chat_id: "1000".to_string(),
            market_utc_offset_hours: -4,
            premarket_start: NaiveTime::from_hms_opt(4, 0, 0).unwrap(),
            market_open: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            market_close: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            orch_poll_secs: 30,
            premarket_scan_secs: 60,
            momentum_scan_secs: 60,
            watch_setup_scan_secs: 120,
            watch_active_scan_secs: 30,
            step_size_pct: 5.0,
            step_min_volume: 500_000.0,
            step_min_price: 2.0,
            step_max_float: 50_000_000.0,
            send_on_startup: false,
            momentum_top_n: 5,
            cooldown_secs: 300,
            rvol_spike_delta: 5.0,
            dump_threshold_pct: -2.0,
            watch_min_gap_pct: 7.0,
            watch_min_pm_volume: 500_000.0,
            fade_trigger_pct: -2.0,
            bounce_trigger_pct: 2.0,
        }
    }
}

fn parse_secs(var: &str, default: u64) -> u64 {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_f64(var: &str, default: f64) -> f64 {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(default)
}

fn parse_hhmm(var: &str, default: &str) -> Result<NaiveTime> {
    let raw = std::env::var(var).unwrap_or_else(|_| default.to_string());
    NaiveTime::parse_from_str(&raw, "%H:%M")
        .map_err(|_| AppError::Config(format!("{var} must be HH:MM, got '{raw}'")))
}
