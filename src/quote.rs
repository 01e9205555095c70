use std::cmp::Ordering;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalised quote for a single symbol, independent of the provider that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub current_price: f64,
    pub previous_reference: Option<f64>,
    pub change_absolute: f64,
    pub change_percent: f64,
    #[serde(default)]
    pub volume: Option<f64>,
}

impl Quote {
    /// Build a quote and derive its change fields.
    ///
    /// The change is only defined against a positive, finite reference price; anything
    /// else (missing, zero, negative, NaN, infinite) leaves both change fields at zero.
    pub fn new(symbol: impl Into<String>, current_price: f64, previous_reference: Option<f64>) -> Self {
        let (change_absolute, change_percent) =
            match usable_reference(current_price, previous_reference) {
                Some(reference) => {
                    let change = current_price - reference;
                    (change, change / reference * 100.0)
                }
                None => (0.0, 0.0),
            };

        Self {
            symbol: symbol.into(),
            name: None,
            current_price,
            previous_reference,
            change_absolute,
            change_percent,
            volume: None,
        }
    }

    pub fn with_volume(mut self, volume: Option<f64>) -> Self {
        self.volume = volume.filter(|value| value.is_finite());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Percent change when it is defined, `None` otherwise.
    pub fn change(&self) -> Option<f64> {
        usable_reference(self.current_price, self.previous_reference).map(|_| self.change_percent)
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.symbol)
    }
}

fn usable_reference(current_price: f64, previous_reference: Option<f64>) -> Option<f64> {
    if !current_price.is_finite() {
        return None;
    }
    previous_reference.filter(|reference| reference.is_finite() && *reference > 0.0)
}

/// Descending by percent change; quotes without a defined change go last.
pub fn compare_by_change(a: &Quote, b: &Quote) -> Ordering {
    match (a.change(), b.change()) {
        (Some(left), Some(right)) => right.partial_cmp(&left).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Immutable set of quotes captured at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    entries: Vec<Quote>,
    captured_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(mut entries: Vec<Quote>, captured_at: DateTime<Utc>) -> Self {
        // Stable sort keeps watchlist order among equal changes.
        entries.sort_by(compare_by_change);
        Self {
            entries,
            captured_at,
        }
    }

    pub fn entries(&self) -> &[Quote] {
        &self.entries
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, symbol: &str) -> Option<&Quote> {
        self.entries.iter().find(|quote| quote.symbol == symbol)
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.captured_at
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => self.age(now) < ttl,
            // A ttl too large for chrono never expires.
            Err(_) => true,
        }
    }
}
