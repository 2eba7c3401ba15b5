//! Bounded per-device SNR history used by ADR.

use crate::constants::ADR_SNR_FLOOR_DB;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Link quality of one uplink transmission across every gateway that heard it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnrHistoryRow {
    pub frame_counter: u16,
    pub snr_max: f64,
    pub gateway_diversity: u8,
}

/// Newest-first ring of [`SnrHistoryRow`]s; the oldest row is evicted on overflow.
#[derive(Debug, Clone, PartialEq)]
pub struct SnrHistory {
    rows: VecDeque<SnrHistoryRow>,
    capacity: usize,
}

impl SnrHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            rows: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Records a new transmission heard by one gateway.
    pub fn push(&mut self, frame_counter: u16, snr: f64) {
        if self.rows.len() == self.capacity {
            self.rows.pop_back();
        }
        self.rows.push_front(SnrHistoryRow {
            frame_counter,
            snr_max: snr,
            gateway_diversity: 1,
        });
    }

    /// Folds a copy received by another gateway into the newest row.
    ///
    /// Returns `false` when there is no row for `frame_counter` at the head.
    pub fn merge(&mut self, frame_counter: u16, snr: f64) -> bool {
        match self.rows.front_mut() {
            Some(row) if row.frame_counter == frame_counter => {
                row.gateway_diversity = row.gateway_diversity.saturating_add(1);
                if snr > row.snr_max {
                    row.snr_max = snr;
                }
                true
            }
            _ => false,
        }
    }

    /// Best SNR over the whole history, floored at -128 dB.
    pub fn max_snr(&self) -> f64 {
        self.rows
            .iter()
            .map(|row| row.snr_max)
            .fold(ADR_SNR_FLOOR_DB, f64::max)
    }

    pub fn newest(&self) -> Option<&SnrHistoryRow> {
        self.rows.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SnrHistoryRow> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
