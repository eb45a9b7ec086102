mod engine;

pub use engine::{WatchMode, WatchTrigger, WatchlistConfig, WatchlistEngine};
