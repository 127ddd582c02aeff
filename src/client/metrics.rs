//! Usage counters reported back to the upstream flag API.
//!
//! [`MetricsAccumulator`] counts yes/no evaluations and variant hits,
//! both from the proxy's own evaluations and from metrics posted by
//! frontend SDKs. [`MetricsAccumulator::drain`] swaps the bucket out for
//! submission. Counters saturate rather than wrap, and the number of
//! distinct toggle and variant names held between drains is capped.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{SecondsFormat, Utc};

use super::model::{EvaluatedToggle, MetricsBucket, ToggleCount};

/// Distinct toggle names kept per bucket. Counts for further names are dropped.
pub const MAX_TOGGLE_NAMES: usize = 1_000;

/// Distinct variant names kept per toggle.
pub const MAX_VARIANT_NAMES: usize = 100;

#[derive(Debug)]
pub struct MetricsAccumulator {
    inner: Mutex<Pending>,
}

#[derive(Debug)]
struct Pending {
    start: String,
    toggles: HashMap<String, ToggleCount>,
}

impl Pending {
    fn entry(&mut self, name: &str) -> Option<&mut ToggleCount> {
        if !self.toggles.contains_key(name) && self.toggles.len() >= MAX_TOGGLE_NAMES {
            return None;
        }
        Some(self.toggles.entry(name.to_owned()).or_default())
    }
}

fn add_variant(count: &mut ToggleCount, variant: &str, hits: u64) {
    if let Some(existing) = count.variants.get_mut(variant) {
        *existing = existing.saturating_add(hits);
    } else if count.variants.len() < MAX_VARIANT_NAMES {
        count.variants.insert(variant.to_owned(), hits);
    }
}

fn add_counts(entry: &mut ToggleCount, count: &ToggleCount) {
    entry.yes = entry.yes.saturating_add(count.yes);
    entry.no = entry.no.saturating_add(count.no);
    for (variant, hits) in &count.variants {
        add_variant(entry, variant, *hits);
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl Default for MetricsAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Pending {
                start: now_rfc3339(),
                toggles: HashMap::new(),
            }),
        }
    }

    pub fn count(&self, toggle: &EvaluatedToggle) {
        let mut pending = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = pending.entry(&toggle.name) else {
            return;
        };
        if toggle.enabled {
            entry.yes = entry.yes.saturating_add(1);
        } else {
            entry.no = entry.no.saturating_add(1);
        }
        if toggle.variant.enabled {
            add_variant(entry, &toggle.variant.name, 1);
        }
    }

    pub fn merge(&self, bucket: &MetricsBucket) {
        let mut pending = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        for (name, count) in &bucket.toggles {
            if let Some(entry) = pending.entry(name) {
                add_counts(entry, count);
            }
        }
    }

    /// Put a drained bucket back after a failed submission. The window is
    /// widened to start at the returned bucket's start.
    pub fn restore(&self, bucket: MetricsBucket) {
        let mut pending = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        pending.start = bucket.start;
        for (name, count) in &bucket.toggles {
            if let Some(entry) = pending.entry(name) {
                add_counts(entry, count);
            }
        }
    }

    /// Take the pending bucket, or `None` when nothing was counted.
    pub fn drain(&self) -> Option<MetricsBucket> {
        let mut pending = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.toggles.is_empty() {
            return None;
        }
        let stop = now_rfc3339();
        let start = std::mem::replace(&mut pending.start, stop.clone());
        let toggles = std::mem::take(&mut pending.toggles);
        Some(MetricsBucket {
            start,
            stop,
            toggles,
        })
    }
}
