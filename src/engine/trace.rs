// SPDX-License-Identifier: MIT

//! Bounded in-memory trace of run events
//!
//! Keeps the most recent events for the debug surface and fans them out to
//! live subscribers (the SSE stream).

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::Local;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 50;

#[derive(Debug, Clone, Serialize)]
pub struct TraceEvent {
    pub timestamp: String,
    pub flow_id: String,
    pub node_id: String,
    pub node_name: String,
    pub event: String,
    pub details: Value,
}

pub struct RunTrace {
    entries: Mutex<VecDeque<TraceEvent>>,
    capacity: usize,
    tx: broadcast::Sender<TraceEvent>,
}

impl RunTrace {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(128);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            tx,
        }
    }

    pub fn record(
        &self,
        flow_id: &str,
        node_id: &str,
        node_name: &str,
        event: &str,
        details: Value,
    ) {
        let entry = TraceEvent {
            timestamp: Local::now().format("%H:%M:%S%.3f").to_string(),
            flow_id: flow_id.to_string(),
            node_id: node_id.to_string(),
            node_name: node_name.to_string(),
            event: event.to_string(),
            details,
        };

        if let Ok(mut entries) = self.entries.lock() {
            if entries.len() == self.capacity {
                entries.pop_front();
            }
            entries.push_back(entry.clone());
        }
        let _ = self.tx.send(entry);
    }

    /// Recorded events, newest first.
    pub fn entries(&self) -> Vec<TraceEvent> {
        match self.entries.lock() {
            Ok(entries) => entries.iter().rev().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TraceEvent> {
        self.tx.subscribe()
    }
}

impl Default for RunTrace {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_newest_first() {
        let trace = RunTrace::default();
        trace.record("f", "a", "A", "node_start", json!({}));
        trace.record("f", "b", "B", "node_start", json!({}));

        let entries = trace.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].node_id, "b");
        assert_eq!(entries[1].node_id, "a");
    }

    #[test]
    fn test_capacity_bound() {
        let trace = RunTrace::new(3);
        for i in 0..5 {
            trace.record("f", &format!("n{}", i), "", "node_start", json!({}));
        }

        let entries = trace.entries();
        assert_eq!(entries.len(), 3);
        // Oldest two were evicted
        assert_eq!(entries[2].node_id, "n2");
        assert_eq!(entries[0].node_id, "n4");
    }

    #[test]
    fn test_clear() {
        let trace = RunTrace::default();
        trace.record("f", "a", "A", "flow_start", json!({}));
        trace.clear();
        assert!(trace.entries().is_empty());
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let trace = RunTrace::default();
        let mut rx = trace.subscribe();
        trace.record("f", "a", "A", "flow_start", json!({"input": "x"}));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event, "flow_start");
        assert_eq!(event.flow_id, "f");
    }
}
