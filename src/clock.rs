use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Utc, Weekday};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::types::Phase;

/// Trading-day window boundaries in market-local time.
#[derive(Debug, Clone, Copy)]
pub struct PhaseWindows {
    pub premarket_start: NaiveTime,
    pub market_open: NaiveTime,
    pub market_close: NaiveTime,
}

/// Classify a market-local instant into its trading-day phase.
/// Total over all inputs; Saturday/Sunday win regardless of time of day.
/// Window starts are inclusive, ends exclusive.
pub fn classify(at: DateTime<FixedOffset>, windows: &PhaseWindows) -> Phase {
    if matches!(at.weekday(), Weekday::Sat | Weekday::Sun) {
        return Phase::Weekend;
    }

    let tod = at.time();
    if tod < windows.premarket_start {
        Phase::PreOpen
    } else if tod < windows.market_open {
        Phase::Premarket
    } else if tod < windows.market_close {
        Phase::Market
    } else {
        Phase::Closed
    }
}

/// Wall clock pinned to the market timezone by a fixed UTC offset.
#[derive(Debug, Clone)]
pub struct MarketClock {
    offset: FixedOffset,
    windows: PhaseWindows,
}

impl MarketClock {
    pub fn new(utc_offset_hours: i32, windows: PhaseWindows) -> Result<Self> {
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600).ok_or_else(|| {
            AppError::Config(format!(
                "MARKET_UTC_OFFSET_HOURS out of range: {utc_offset_hours}"
            ))
        })?;
        Ok(Self { offset, windows })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(
            cfg.market_utc_offset_hours,
            PhaseWindows {
                premarket_start: cfg.premarket_start,
                market_open: cfg.market_open,
                market_close: cfg.market_close,
            },
        )
    }

    /// Phase of "now" on the market clock.
    pub fn current_phase(&self) -> Phase {
        classify(Utc::now().with_timezone(&self.offset), &self.windows)
    }

    pub fn local_now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn windows() -> PhaseWindows {
        PhaseWindows {
            premarket_start: NaiveTime::from_hms_opt(4, 0, 0).unwrap(),
            market_open: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            market_close: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
        }
    }

    /// 2024-01-08 was a Monday; offsets pick other weekdays from that week.
    fn monday_at(hour: u32, min: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(-4 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 8, hour, min, 0)
            .unwrap()
    }

    fn saturday_at(hour: u32, min: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(-4 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 6, hour, min, 0)
            .unwrap()
    }

    #[test]
    fn early_morning_is_pre_open() {
        assert_eq!(classify(monday_at(0, 0), &windows()), Phase::PreOpen);
        assert_eq!(classify(monday_at(3, 59), &windows()), Phase::PreOpen);
    }

    #[test]
    fn premarket_start_is_inclusive() {
        assert_eq!(classify(monday_at(4, 0), &windows()), Phase::Premarket);
        assert_eq!(classify(monday_at(9, 29), &windows()), Phase::Premarket);
    }

    #[test]
    fn open_and_close_boundaries() {
        assert_eq!(classify(monday_at(9, 30), &windows()), Phase::Market);
        assert_eq!(classify(monday_at(15, 59), &windows()), Phase::Market);
        assert_eq!(classify(monday_at(16, 0), &windows()), Phase::Closed);
        assert_eq!(classify(monday_at(23, 59), &windows()), Phase::Closed);
    }

    #[test]
    fn weekend_wins_over_time_of_day() {
        assert_eq!(classify(saturday_at(10, 30), &windows()), Phase::Weekend);
        assert_eq!(classify(saturday_at(5, 0), &windows()), Phase::Weekend);
        // Sunday too
        let sunday = FixedOffset::east_opt(-4 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 7, 10, 0, 0)
            .unwrap();
        assert_eq!(classify(sunday, &windows()), Phase::Weekend);
    }

    #[test]
    fn offset_shifts_the_trading_day() {
        // 14:00 UTC = 10:00 at UTC-4 (market hours) but 09:00 at UTC-5.
        let utc = Utc.with_ymd_and_hms(2024, 1, 8, 14, 0, 0).unwrap();
        let east4 = utc.with_timezone(&FixedOffset::east_opt(-4 * 3600).unwrap());
        let east5 = utc.with_timezone(&FixedOffset::east_opt(-5 * 3600).unwrap());
        assert_eq!(classify(east4, &windows()), Phase::Market);
        assert_eq!(classify(east5, &windows()), Phase::Premarket);
    }

    #[test]
    fn out_of_range_offset_rejected() {
        assert!(MarketClock::new(25, windows()).is_err());
        assert!(MarketClock::new(-25, windows()).is_err());
        assert!(MarketClock::new(-4, windows()).is_ok());
    }
}
