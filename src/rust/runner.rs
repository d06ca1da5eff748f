// SPDX-FileCopyrightText: 2026 Proofbench Project Team
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Run coordination
//!
//! A unit is one proof object paired with one model. Units whose result is
//! already stored are skipped, the rest are driven through generation,
//! verification and optional feedback rounds by a bounded worker pool.
//! Results are committed one at a time, so an interrupted run resumes where
//! it stopped.

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{self, write_atomic, KvStore, ResultKey};
use crate::config::{ModelSpec, RunConfig};
use crate::context::{load_objects, save_objects, ContextBuilder};
use crate::core::{Outcome, ProofObject, SamplingParams, Verification, VerificationResult};
use crate::extract::Extractor;
use crate::llm::{prompt, FeedbackTurn, ModelClient};
use crate::project::CoqProject;
use crate::runlog::{RunLog, RunLogs, RUN_LOG_FILE};
use crate::stats::{RunStats, TacticSummary};
use crate::verify::{AttemptState, Verifier};

pub const SUMMARY_FILE: &str = "summary.json";
pub const TACTICS_FILE: &str = "tactics.json";

/// Proof objects for the configured ablation.
///
/// Objects saved by an earlier run are reused unless `reconstruct` is set;
/// otherwise the project is extracted and the objects are saved.
pub fn prepare_objects(
    config: &RunConfig,
    project: &CoqProject,
    reconstruct: bool,
) -> Result<Vec<ProofObject>> {
    let dir = config.objects_dir();
    if !reconstruct && has_objects(&dir) {
        let objects = load_objects(&dir)?;
        info!("Loaded {} proof objects from {}", objects.len(), dir.display());
        return Ok(objects);
    }

    let extraction = Extractor::new(project.clone()).extract()?;
    for failure in &extraction.failures {
        warn!("Extraction: {}", failure);
    }
    let builder = ContextBuilder::new(&extraction, config.context.clone());
    let objects = builder.build_all(config.run.ablation());
    save_objects(&dir, &objects)?;
    info!(
        "Built {} proof objects ({}) into {}",
        objects.len(),
        config.run.ablation(),
        dir.display()
    );
    Ok(objects)
}

fn has_objects(dir: &Path) -> bool {
    std::fs::read_dir(dir).is_ok_and(|entries| {
        entries
            .filter_map(|e| e.ok())
            .any(|e| e.path().extension().is_some_and(|x| x == "json"))
    })
}

/// Token usage forecast for a dry run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEstimate {
    pub objects: usize,
    pub models: usize,
    /// System plus user prompt tokens over all units
    pub input_tokens: u64,
    /// Output if every model answered with the original proof
    pub output_lower: u64,
    /// Output if every answer used the whole token budget
    pub output_upper: u64,
    pub mean_prompt_tokens: u64,
    pub median_prompt_tokens: u64,
    pub max_prompt_tokens: u64,
}

pub fn estimate_tokens(
    objects: &[ProofObject],
    system_prompt: &str,
    models: usize,
    max_tokens: u32,
) -> TokenEstimate {
    let system = prompt::estimate_tokens(system_prompt);
    let mut prompts: Vec<u64> = objects
        .iter()
        .map(|o| prompt::estimate_tokens(&o.context))
        .collect();
    prompts.sort_unstable();

    let units = models as u64;
    let input: u64 = prompts.iter().map(|p| p + system).sum();
    let lower: u64 = objects
        .iter()
        .filter_map(|o| o.declaration.proof.as_ref())
        .map(|p| prompt::estimate_tokens(&p.text))
        .sum();

    TokenEstimate {
        objects: objects.len(),
        models,
        input_tokens: input * units,
        output_lower: lower * units,
        output_upper: u64::from(max_tokens) * objects.len() as u64 * units,
        mean_prompt_tokens: match prompts.len() {
            0 => 0,
            n => prompts.iter().sum::<u64>() / n as u64,
        },
        median_prompt_tokens: prompts.get(prompts.len() / 2).copied().unwrap_or(0),
        max_prompt_tokens: prompts.last().copied().unwrap_or(0),
    }
}

/// What one invocation did
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    /// Units in scope
    pub total: usize,
    /// Units with a stored result, not dispatched
    pub skipped: usize,
    pub dispatched: usize,
    pub completed: usize,
    pub interrupted: bool,
    /// Per-model statistics over every stored result, this run's included
    pub stats: RunStats,
}

struct Unit {
    object: Arc<ProofObject>,
    model: ModelSpec,
}

/// Drives units through the pipeline with a bounded worker pool
pub struct Runner {
    config: RunConfig,
    client: Arc<ModelClient>,
    verifier: Arc<Verifier>,
    results: Arc<dyn KvStore>,
    logs: RunLogs,
    progress: ProgressBar,
}

impl Runner {
    pub fn new(
        config: RunConfig,
        client: Arc<ModelClient>,
        verifier: Arc<Verifier>,
        results: Arc<dyn KvStore>,
    ) -> Self {
        Self {
            config,
            client,
            verifier,
            results,
            logs: RunLogs::new(),
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.logs.run_id()
    }

    fn params(&self) -> SamplingParams {
        self.config.llm.sampling()
    }

    fn result_key(&self, object: &ProofObject, model: &ModelSpec) -> String {
        ResultKey {
            fingerprint: &object.fingerprint,
            model: &model.id,
            params: self.params(),
        }
        .digest()
    }

    /// Evaluate every object against every configured model until done or
    /// until `shutdown` resolves
    pub async fn run(
        &self,
        objects: Vec<ProofObject>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<RunReport> {
        let models = self
            .config
            .run
            .models
            .iter()
            .map(|id| self.config.model(id))
            .collect::<Result<Vec<_>, _>>()?;
        let objects: Vec<Arc<ProofObject>> = objects
            .into_iter()
            .filter(|o| o.declaration.is_provable())
            .map(Arc::new)
            .collect();

        let total = objects.len() * models.len();
        let mut units = Vec::new();
        for model in &models {
            for object in &objects {
                let key = self.result_key(object, model);
                let done = if self.config.run.force {
                    false
                } else {
                    self.results.contains(&key).await.unwrap_or_else(|e| {
                        warn!("Result store unavailable for {}: {}", key, e);
                        false
                    })
                };
                if !done {
                    units.push(Unit {
                        object: Arc::clone(object),
                        model: model.clone(),
                    });
                }
            }
        }
        let dispatched = units.len();
        let skipped = total - dispatched;
        info!(
            "Run {}: {} units, {} already complete, dispatching {} on {} workers",
            self.run_id(),
            total,
            skipped,
            dispatched,
            self.config.run.threads
        );
        self.progress.set_length(dispatched as u64);

        let mut completed = 0;
        let mut interrupted = false;
        {
            let mut pending = stream::iter(units)
                .map(|unit| self.process(unit))
                .buffer_unordered(self.config.run.threads.max(1));
            tokio::pin!(shutdown);
            loop {
                tokio::select! {
                    next = pending.next() => match next {
                        Some(result) => {
                            completed += 1;
                            self.progress.inc(1);
                            self.progress.set_message(format!(
                                "{} {}",
                                result.declaration, result.outcome
                            ));
                        }
                        None => break,
                    },
                    _ = &mut shutdown => {
                        warn!("Interrupted; stopping dispatch with {} of {} units done", completed, dispatched);
                        interrupted = true;
                        break;
                    }
                }
            }
        }
        self.progress.finish_and_clear();

        let mut stats = RunStats::new();
        for model in &models {
            let dir = self.config.results_dir(model, self.params());
            match write_summary(&dir) {
                Ok(summary) => stats.models.extend(summary.models),
                Err(e) => warn!("Failed to summarise {}: {:#}", dir.display(), e),
            }
        }

        Ok(RunReport {
            run_id: self.run_id(),
            total,
            skipped,
            dispatched,
            completed,
            interrupted,
            stats,
        })
    }

    /// One unit end to end, bounded by the unit timeout, then committed
    async fn process(&self, unit: Unit) -> VerificationResult {
        let limit = Duration::from_secs(self.config.run.unit_timeout_secs);
        let (result, persist) = match tokio::time::timeout(limit, self.attempt(&unit)).await {
            Ok(done) => done,
            Err(_) => {
                warn!(
                    "{} [{}] exceeded the {}s unit limit",
                    unit.object.declaration.qualified_name, unit.model.id, limit.as_secs()
                );
                let verification = Verification::without_compiler(
                    Outcome::Timeout,
                    format!("unit exceeded {}s", limit.as_secs()),
                );
                let result =
                    VerificationResult::new(&unit.object, &unit.model.id, self.params(), 0, None, verification);
                (result, true)
            }
        };

        info!(
            "{} [{}]: {}",
            result.declaration, result.model, result.outcome
        );
        if persist {
            let key = self.result_key(&unit.object, &unit.model);
            if let Err(e) = cache::put_json(self.results.as_ref(), &key, &result).await {
                warn!("Failed to store result for {}: {:#}", result.declaration, e);
            }
        }
        let dir = self.config.results_dir(&unit.model, self.params());
        let appended = match self.logs.get(&dir) {
            Ok(log) => log.append(&result).await,
            Err(e) => Err(e),
        };
        if let Err(e) = appended {
            warn!("Failed to append run log in {}: {:#}", dir.display(), e);
        }
        result
    }

    /// Generate, verify and refine; the flag says whether the result is final
    /// enough to be stored for resumption
    async fn attempt(&self, unit: &Unit) -> (VerificationResult, bool) {
        let object = unit.object.as_ref();
        let model = &unit.model;
        let params = self.params();
        let max_rounds = self.config.verify.feedback_rounds;

        let mut state = AttemptState::Pending;
        let mut history: Vec<FeedbackTurn> = Vec::new();
        let mut last: Option<(String, Verification)> = None;
        let mut requests = 0;

        while let Some(round) = state.next_round() {
            let response = if history.is_empty() {
                self.client.generate(object, model, params).await
            } else {
                self.client.refine(object, model, params, &history).await
            };
            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    warn!(
                        "{} [{}] round {}: {}",
                        object.declaration.qualified_name, model.id, round, e
                    );
                    if let Some((candidate, verification)) = last {
                        // keep the best we have from earlier rounds
                        let result = VerificationResult::new(
                            object, &model.id, params, requests, Some(candidate), verification,
                        );
                        return (result, !e.is_retryable());
                    }
                    let verification =
                        Verification::without_compiler(Outcome::ProviderFailed, e.to_string());
                    let result =
                        VerificationResult::new(object, &model.id, params, requests, None, verification);
                    return (result, !e.is_retryable());
                }
            };
            requests += 1;

            let verification = self
                .verifier
                .verify(&object.declaration, &response.candidate)
                .await;
            debug!(
                "{} [{}] round {}: {}",
                object.declaration.qualified_name, model.id, round, verification.outcome
            );
            state = state.after(verification.outcome, max_rounds);
            if !state.is_done() {
                history.push(FeedbackTurn {
                    candidate: response.candidate.clone(),
                    feedback: prompt::feedback_message(
                        &verification.diagnostics,
                        &verification.raw_diagnostics,
                    ),
                });
            }
            last = Some((response.candidate, verification));
        }

        match last {
            Some((candidate, verification)) => {
                let result = VerificationResult::new(
                    object, &model.id, params, requests, Some(candidate), verification,
                );
                (result, true)
            }
            None => {
                let verification = Verification::without_compiler(
                    Outcome::EnvironmentError,
                    "no request was made",
                );
                let result =
                    VerificationResult::new(object, &model.id, params, 0, None, verification);
                (result, false)
            }
        }
    }
}

/// Latest entry per proof object in a results directory
pub fn latest_results(dir: &Path) -> Result<Vec<VerificationResult>> {
    let entries = RunLog::read(&dir.join(RUN_LOG_FILE))?;
    let mut latest: HashMap<String, usize> = HashMap::new();
    let mut results: Vec<VerificationResult> = Vec::new();
    for entry in entries {
        let key = entry.result.fingerprint.0.clone();
        match latest.get(&key) {
            Some(&i) => results[i] = entry.result,
            None => {
                latest.insert(key, results.len());
                results.push(entry.result);
            }
        }
    }
    Ok(results)
}

/// Recompute and write `summary.json` and `tactics.json` for a results directory
pub fn write_summary(dir: &Path) -> Result<RunStats> {
    let results = latest_results(dir)?;
    let stats = RunStats::from_results(&results);
    let mut tactics = TacticSummary::default();
    for result in &results {
        tactics.record(result);
    }
    write_atomic(&dir.join(SUMMARY_FILE), stats.to_json()?.as_bytes())?;
    write_atomic(
        &dir.join(TACTICS_FILE),
        &serde_json::to_vec_pretty(&tactics)?,
    )?;
    Ok(stats)
}

/// Stored summaries under a logs directory, by results directory name
pub fn read_summaries(logs_dir: &Path) -> Result<Vec<(String, RunStats)>> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(logs_dir)
        .with_context(|| format!("reading {}", logs_dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.join(SUMMARY_FILE).is_file())
        .collect();
    dirs.sort();

    let mut summaries = Vec::new();
    for dir in dirs {
        let path = dir.join(SUMMARY_FILE);
        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let stats = RunStats::from_json(&json)
            .with_context(|| format!("parsing {}", path.display()))?;
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        summaries.push((name, stats));
    }
    Ok(summaries)
}
