// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Prometheus metrics of the protocol runner.

use crate::core::protocol::Protocol;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use thiserror::Error;

/// Metrics errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Construction or registration failed.
    #[error("prometheus")]
    Prom,
}

/// Metrics container.
#[derive(Clone)]
pub struct Metrics {
    /// Registry.
    pub registry: Registry,

    /// Runs started, by protocol.
    pub runs_started_total: IntCounterVec,
    /// Runs completed, by protocol.
    pub runs_completed_total: IntCounterVec,
    /// Runs aborted, by protocol and error kind.
    pub runs_failed_total: IntCounterVec,
    /// Runs aborted on a reply timeout.
    pub runs_timed_out_total: IntCounter,
    /// Runs currently executing.
    pub active_executions: IntGauge,

    /// Commitments written.
    pub commitments_written_total: IntCounter,
    /// Inbound messages that failed to decode.
    pub invalid_msg_total: IntCounter,
    /// Replies that arrived with nobody waiting.
    pub orphan_replies_total: IntCounter,
}

impl Metrics {
    /// Create and register metrics.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let runs_started_total = IntCounterVec::new(
            Opts::new("statechannels_runs_started_total", "Protocol runs started"),
            &["protocol"],
        )
        .map_err(|_| MetricsError::Prom)?;
        let runs_completed_total = IntCounterVec::new(
            Opts::new("statechannels_runs_completed_total", "Protocol runs completed"),
            &["protocol"],
        )
        .map_err(|_| MetricsError::Prom)?;
        let runs_failed_total = IntCounterVec::new(
            Opts::new("statechannels_runs_failed_total", "Protocol runs aborted"),
            &["protocol", "kind"],
        )
        .map_err(|_| MetricsError::Prom)?;
        let runs_timed_out_total =
            IntCounter::new("statechannels_runs_timed_out_total", "Runs aborted on reply timeout")
                .map_err(|_| MetricsError::Prom)?;
        let active_executions =
            IntGauge::new("statechannels_active_executions", "Runs currently executing")
                .map_err(|_| MetricsError::Prom)?;

        let commitments_written_total =
            IntCounter::new("statechannels_commitments_written_total", "Commitments written")
                .map_err(|_| MetricsError::Prom)?;
        let invalid_msg_total =
            IntCounter::new("statechannels_invalid_msg_total", "Invalid decoded messages")
                .map_err(|_| MetricsError::Prom)?;
        let orphan_replies_total = IntCounter::new(
            "statechannels_orphan_replies_total",
            "Replies without a waiting run",
        )
        .map_err(|_| MetricsError::Prom)?;

        registry
            .register(Box::new(runs_started_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(runs_completed_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(runs_failed_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(runs_timed_out_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(active_executions.clone()))
            .map_err(|_| MetricsError::Prom)?;

        registry
            .register(Box::new(commitments_written_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(invalid_msg_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(orphan_replies_total.clone()))
            .map_err(|_| MetricsError::Prom)?;

        // Every protocol exports its run counters from the start, at zero.
        for p in Protocol::ALL {
            runs_started_total.with_label_values(&[p.as_str()]);
            runs_completed_total.with_label_values(&[p.as_str()]);
        }

        Ok(Self {
            registry,
            runs_started_total,
            runs_completed_total,
            runs_failed_total,
            runs_timed_out_total,
            active_executions,
            commitments_written_total,
            invalid_msg_total,
            orphan_replies_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn families_are_registered_with_prefix() {
        let m = Metrics::new().unwrap();
        m.runs_started_total.with_label_values(&["setup"]).inc();
        m.runs_failed_total.with_label_values(&["install", "timeout"]).inc();
        m.commitments_written_total.inc();
        let names: Vec<String> = m.registry.gather().iter().map(|f| f.get_name().to_string()).collect();
        assert!(names.iter().all(|n| n.starts_with("statechannels_")));
        assert!(names.contains(&"statechannels_runs_started_total".to_string()));
        assert!(names.contains(&"statechannels_commitments_written_total".to_string()));
    }

    #[test]
    fn run_counters_start_at_zero_for_every_protocol() {
        let m = Metrics::new().unwrap();
        let families = m.registry.gather();
        let started = families
            .iter()
            .find(|f| f.get_name() == "statechannels_runs_started_total")
            .unwrap();
        assert_eq!(started.get_metric().len(), Protocol::ALL.len());
        assert!(started.get_metric().iter().all(|s| s.get_counter().get_value() == 0.0));
        for p in Protocol::ALL {
            assert_eq!(m.runs_completed_total.with_label_values(&[p.as_str()]).get(), 0);
        }
    }
}
