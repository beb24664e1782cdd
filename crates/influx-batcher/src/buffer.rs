// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-database buffer of encoded Line Protocol records.
//!
//! Lines are kept in admission order per database. Batches are sliced off
//! the front, and failed batches are put back at the front, so delivery
//! within one database stays FIFO across retries.

use std::collections::{HashMap, VecDeque};

/// Pending Line Protocol records keyed by database name.
#[derive(Debug, Default)]
pub struct Buffer {
    pending: HashMap<String, VecDeque<String>>,
    len: usize,
}

impl Buffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an encoded line for `database`.
    pub fn push(&mut self, database: &str, line: String) {
        match self.pending.get_mut(database) {
            Some(lines) => lines.push_back(line),
            None => {
                self.pending
                    .insert(database.to_string(), VecDeque::from([line]));
            }
        }
        self.len += 1;
    }

    /// Remove and return up to `max` of the oldest lines for `database`.
    pub fn take_batch(&mut self, database: &str, max: usize) -> Vec<String> {
        let Some(lines) = self.pending.get_mut(database) else {
            return Vec::new();
        };
        let n = max.min(lines.len());
        let batch: Vec<String> = lines.drain(..n).collect();
        if lines.is_empty() {
            self.pending.remove(database);
        }
        self.len -= batch.len();
        batch
    }

    /// Slice one batch of up to `max` lines off every database.
    pub fn take_batches(&mut self, max: usize) -> Vec<(String, Vec<String>)> {
        let databases: Vec<String> = self.pending.keys().cloned().collect();
        databases
            .into_iter()
            .map(|db| {
                let batch = self.take_batch(&db, max);
                (db, batch)
            })
            .filter(|(_, batch)| !batch.is_empty())
            .collect()
    }

    /// Put `lines` back ahead of everything still pending for `database`,
    /// preserving their relative order.
    pub fn requeue_front(&mut self, database: &str, lines: Vec<String>) {
        if lines.is_empty() {
            return;
        }
        self.len += lines.len();
        let queue = self.pending.entry(database.to_string()).or_default();
        for line in lines.into_iter().rev() {
            queue.push_front(line);
        }
    }

    /// Total number of pending lines across all databases.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[cfg(test)]
    fn len_for(&self, database: &str) -> usize {
        self.pending.get(database).map_or(0, VecDeque::len)
    }

    #[cfg(test)]
    fn databases(&self) -> impl Iterator<Item = &str> {
        self.pending.keys().map(String::as_str)
    }

    #[cfg(test)]
    fn counted_len(&self) -> usize {
        self.pending.values().map(VecDeque::len).sum()
    }
}
