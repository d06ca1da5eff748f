// SPDX-FileCopyrightText: 2026 Proofbench Project Team
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Per-model outcome statistics
//!
//! Environmental outcomes (compiler missing, provider down) say nothing about
//! a model and are excluded from its success rate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::{Outcome, VerificationResult};

/// Outcome counts and verification timing for one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStats {
    pub attempts: u64,
    pub verified: u64,
    pub proof_failed: u64,
    pub syntax_errors: u64,
    pub timeouts: u64,
    pub environment_errors: u64,
    pub provider_failures: u64,
    /// Model requests across all units, feedback rounds included
    pub requests: u64,

    /// Sum of compile times of verified proofs (ms)
    pub total_time_ms: u64,
    pub total_time_sq_ms: u128,
    pub min_time_ms: u64,
    pub max_time_ms: u64,
}

impl Default for ModelStats {
    fn default() -> Self {
        ModelStats {
            attempts: 0,
            verified: 0,
            proof_failed: 0,
            syntax_errors: 0,
            timeouts: 0,
            environment_errors: 0,
            provider_failures: 0,
            requests: 0,
            total_time_ms: 0,
            total_time_sq_ms: 0,
            min_time_ms: u64::MAX,
            max_time_ms: 0,
        }
    }
}

impl ModelStats {
    pub fn record(&mut self, outcome: Outcome, time_ms: u64, rounds: u32) {
        self.attempts += 1;
        self.requests += u64::from(rounds);
        match outcome {
            Outcome::Verified => {
                self.verified += 1;
                self.total_time_ms += time_ms;
                self.total_time_sq_ms += (time_ms as u128) * (time_ms as u128);
                self.min_time_ms = self.min_time_ms.min(time_ms);
                self.max_time_ms = self.max_time_ms.max(time_ms);
            }
            Outcome::ProofFailed => self.proof_failed += 1,
            Outcome::SyntaxError => self.syntax_errors += 1,
            Outcome::Timeout => self.timeouts += 1,
            Outcome::EnvironmentError => self.environment_errors += 1,
            Outcome::ProviderFailed => self.provider_failures += 1,
        }
    }

    /// Attempts that count towards the success rate
    pub fn scored(&self) -> u64 {
        self.attempts - self.environment_errors - self.provider_failures
    }

    pub fn success_rate(&self) -> f64 {
        match self.scored() {
            0 => 0.0,
            n => self.verified as f64 / n as f64,
        }
    }

    pub fn mean_time_ms(&self) -> Option<f64> {
        if self.verified == 0 {
            return None;
        }
        Some(self.total_time_ms as f64 / self.verified as f64)
    }

    pub fn std_dev_time_ms(&self) -> Option<f64> {
        if self.verified < 2 {
            return None;
        }
        let n = self.verified as f64;
        let mean = self.total_time_ms as f64 / n;
        let variance = (self.total_time_sq_ms as f64 / n) - (mean * mean);
        Some(variance.max(0.0).sqrt())
    }

    /// 95% Wilson score interval on the success rate
    pub fn confidence_interval(&self) -> (f64, f64) {
        let total = self.scored();
        if total == 0 {
            return (0.0, 1.0);
        }
        let n = total as f64;
        let p_hat = self.verified as f64 / n;
        let z = 1.96;

        let denominator = 1.0 + z * z / n;
        let center = (p_hat + z * z / (2.0 * n)) / denominator;
        let spread =
            z * ((p_hat * (1.0 - p_hat) / n + z * z / (4.0 * n * n)).sqrt()) / denominator;
        ((center - spread).max(0.0), (center + spread).min(1.0))
    }
}

/// Summary of a results directory, keyed by model id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub models: BTreeMap<String, ModelStats>,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: &VerificationResult) {
        self.models
            .entry(result.model.clone())
            .or_default()
            .record(result.outcome, result.elapsed_ms, result.rounds);
    }

    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a VerificationResult>) -> Self {
        let mut stats = Self::new();
        for result in results {
            stats.record(result);
        }
        stats
    }

    pub fn total_attempts(&self) -> u64 {
        self.models.values().map(|s| s.attempts).sum()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Tactic frequencies over all candidates and over verified ones
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TacticSummary {
    pub all: BTreeMap<String, u64>,
    pub verified: BTreeMap<String, u64>,
}

impl TacticSummary {
    pub fn record(&mut self, result: &VerificationResult) {
        for (tactic, count) in &result.tactics.counts {
            *self.all.entry(tactic.clone()).or_insert(0) += u64::from(*count);
            if result.outcome == Outcome::Verified {
                *self.verified.entry(tactic.clone()).or_insert(0) += u64::from(*count);
            }
        }
    }

    /// Most used tactics first; ties by name
    pub fn top(&self, n: usize) -> Vec<(&str, u64)> {
        let mut ranked: Vec<(&str, u64)> = self.all.iter().map(|(t, c)| (t.as_str(), *c)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        ranked.truncate(n);
        ranked
    }
}
