// SPDX-License-Identifier: GPL-3.0-only

//! Lock-free frame counters shared by both pipeline threads

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::DropReason;

#[derive(Debug, Default)]
pub struct PipelineStats {
    captured: AtomicU64,
    filtered: AtomicU64,
    presented: AtomicU64,
    filter_fallbacks: AtomicU64,
    drops: [AtomicU64; DropReason::ALL.len()],
}

impl PipelineStats {
    pub fn record_captured(&self) -> u64 {
        self.captured.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_filtered(&self) {
        self.filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_presented(&self) -> u64 {
        self.presented.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_filter_fallback(&self) {
        self.filter_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a dropped frame, returning the new count for that reason
    pub fn record_drop(&self, reason: DropReason) -> u64 {
        self.drops[reason.index()].fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn dropped(&self, reason: DropReason) -> u64 {
        self.drops[reason.index()].load(Ordering::Relaxed)
    }

    pub fn presented(&self) -> u64 {
        self.presented.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let drops: BTreeMap<String, u64> = DropReason::ALL
            .iter()
            .map(|reason| (snake_name(*reason), self.dropped(*reason)))
            .collect();
        StatsSnapshot {
            captured: self.captured.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            presented: self.presented(),
            filter_fallbacks: self.filter_fallbacks.load(Ordering::Relaxed),
            total_dropped: drops.values().sum(),
            drops,
        }
    }
}

fn snake_name(reason: DropReason) -> String {
    serde_json::to_value(reason)
        .ok()
        .and_then(|v| v.as_str().map(str::to_owned))
        .unwrap_or_else(|| reason.to_string())
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub captured: u64,
    pub filtered: u64,
    pub presented: u64,
    pub filter_fallbacks: u64,
    pub total_dropped: u64,
    /// Drop counts keyed by reason
    pub drops: BTreeMap<String, u64>,
}

impl StatsSnapshot {
    pub fn dropped(&self, reason: DropReason) -> u64 {
        self.drops.get(&snake_name(reason)).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_totals_drops() {
        let stats = PipelineStats::default();
        stats.record_captured();
        stats.record_drop(DropReason::SourceBusy);
        stats.record_drop(DropReason::SourceBusy);
        stats.record_drop(DropReason::NoDrawable);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.captured, 1);
        assert_eq!(snapshot.total_dropped, 3);
        assert_eq!(snapshot.dropped(DropReason::SourceBusy), 2);
        assert_eq!(snapshot.drops["no_drawable"], 1);
        assert_eq!(snapshot.drops.len(), DropReason::ALL.len());
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_value(PipelineStats::default().snapshot()).unwrap();
        assert_eq!(json["drops"]["mailbox_overwrite"], 0);
        assert_eq!(json["presented"], 0);
    }
}
