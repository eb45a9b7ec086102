use std::collections::HashMap;

/// Last alerted value and notification count for one symbol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SymbolRecord {
    pub last_value: f64,
    pub repeat_count: u32,
}

/// Step-alert dedup state. Owned exclusively by one scanner; every baseline
/// move funnels through `record`, so `last_value` can only change when a
/// notification went out (or on the silent startup-baseline path).
#[derive(Debug, Default)]
pub struct AlertState {
    entries: HashMap<String, SymbolRecord>,
}

impl AlertState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, symbol: &str) -> Option<SymbolRecord> {
        self.entries.get(symbol).copied()
    }

    /// Overwrite the symbol's baseline and bump its notification count.
    /// Returns the new count.
    pub fn record(&mut self, symbol: &str, value: f64) -> u32 {
        let entry = self
            .entries
            .entry(symbol.to_string())
            .or_insert(SymbolRecord {
                last_value: value,
                repeat_count: 0,
            });
        entry.last_value = value;
        entry.repeat_count += 1;
        entry.repeat_count
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
