// SPDX-FileCopyrightText: 2026 Proofbench Project Team
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Output formatting for the CLI
//!
//! Every report is printed either as colored text or as pretty JSON.

use anyhow::Result;
use colored::Colorize;
use proofbench::runner::{RunReport, TokenEstimate};
use proofbench::stats::{ModelStats, RunStats};
use proofbench::ModelSpec;
use serde::Serialize;
use std::fmt::Display;
use std::str::FromStr;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(anyhow::anyhow!("Invalid output format: {}. Must be 'text' or 'json'", s)),
        }
    }
}

impl Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Summary of an extraction, for `proofbench extract`
#[derive(Debug, Serialize)]
pub struct ExtractionReport {
    pub files: usize,
    pub declarations: usize,
    pub provable: usize,
    pub excluded: usize,
    pub failures: Vec<String>,
    /// Most referenced identifiers outside the project
    pub external_refs: Vec<(String, usize)>,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    pub fn success(&self, message: &str) -> Result<()> {
        self.message("success", message, |m| println!("{}", m.green().bold()))
    }

    pub fn warning(&self, message: &str) -> Result<()> {
        self.message("warning", message, |m| println!("{}", m.yellow()))
    }

    pub fn info(&self, message: &str) -> Result<()> {
        self.message("info", message, |m| println!("{}", m))
    }

    pub fn header(&self, title: &str) -> Result<()> {
        self.message("header", title, |t| {
            println!("\n{}", t.bold().underline());
            println!("{}", "=".repeat(t.len()));
        })
    }

    fn message(&self, level: &str, message: &str, text: impl FnOnce(&str)) -> Result<()> {
        match self.format {
            OutputFormat::Text => text(message),
            OutputFormat::Json => self.json(&JsonMessage { level, message })?,
        }
        Ok(())
    }

    pub fn extraction(&self, report: &ExtractionReport) -> Result<()> {
        if self.is_json() {
            return self.json(report);
        }
        self.header("Extraction")?;
        println!("{:<14} {}", "Files:".bold(), report.files);
        println!("{:<14} {}", "Declarations:".bold(), report.declarations);
        println!("{:<14} {}", "Provable:".bold(), report.provable.to_string().green());
        if report.excluded > 0 {
            println!("{:<14} {}", "In cycles:".bold(), report.excluded.to_string().yellow());
        }
        if !report.failures.is_empty() {
            println!("\n{} ({}):", "Failures".red().bold(), report.failures.len());
            for failure in &report.failures {
                println!("  - {}", failure);
            }
        }
        if !report.external_refs.is_empty() {
            println!("\n{}:", "Top external references".cyan().bold());
            for (name, count) in &report.external_refs {
                println!("  {:>5}  {}", count, name);
            }
        }
        Ok(())
    }

    pub fn estimate(&self, estimate: &TokenEstimate) -> Result<()> {
        if self.is_json() {
            return self.json(estimate);
        }
        self.header("Dry run")?;
        println!("Proof objects:            {}", estimate.objects);
        println!("Models:                   {}", estimate.models);
        println!("Mean prompt tokens:       {}", estimate.mean_prompt_tokens);
        println!("Median prompt tokens:     {}", estimate.median_prompt_tokens);
        println!("Max prompt tokens:        {}", estimate.max_prompt_tokens);
        println!("Total input tokens:       {}", estimate.input_tokens.to_string().bold());
        println!("Output tokens, lower:     {}", estimate.output_lower);
        println!("Output tokens, upper:     {}", estimate.output_upper);
        Ok(())
    }

    pub fn run_report(&self, report: &RunReport) -> Result<()> {
        if self.is_json() {
            return self.json(report);
        }
        self.header(&format!("Run {}", report.run_id))?;
        println!(
            "{} units, {} already complete, {} of {} dispatched units finished",
            report.total, report.skipped, report.completed, report.dispatched
        );
        if report.interrupted {
            self.warning("Interrupted. Completed results are stored; run again to resume.")?;
        } else {
            self.success("Run complete")?;
        }
        self.stats_table(&report.stats);
        Ok(())
    }

    pub fn summaries(&self, summaries: &[(String, RunStats)]) -> Result<()> {
        if self.is_json() {
            return self.json(&summaries);
        }
        for (name, stats) in summaries {
            println!("\n{}", name.cyan().bold());
            self.stats_table(stats);
        }
        Ok(())
    }

    fn stats_table(&self, stats: &RunStats) {
        for (model, s) in &stats.models {
            println!("\n  {}", model.bold());
            print_model(s);
        }
    }

    pub fn models(&self, models: &[ModelSpec]) -> Result<()> {
        if self.is_json() {
            return self.json(&models);
        }
        self.header("Models")?;
        for m in models {
            let mut notes = Vec::new();
            if let Some(effort) = &m.reasoning_effort {
                notes.push(format!("reasoning effort {}", effort));
            }
            if !m.supports_temperature {
                notes.push("fixed temperature".to_string());
            }
            println!(
                "  {:<36} {:>8} tokens  {}",
                m.id.bright_blue(),
                m.context_window,
                notes.join(", ").dimmed()
            );
        }
        Ok(())
    }

    pub fn json<T: Serialize + ?Sized>(&self, data: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(data)?;
        println!("{}", json);
        Ok(())
    }
}

fn print_model(s: &ModelStats) {
    let (lo, hi) = s.confidence_interval();
    println!(
        "    Verified {}/{} ({:.2}%, 95% CI {:.1}-{:.1}%)",
        s.verified.to_string().green().bold(),
        s.scored(),
        s.success_rate() * 100.0,
        lo * 100.0,
        hi * 100.0
    );
    println!(
        "    Proof failed {}, syntax errors {}, timeouts {}",
        s.proof_failed, s.syntax_errors, s.timeouts
    );
    if s.environment_errors + s.provider_failures > 0 {
        println!(
            "    {}",
            format!(
                "Not scored: {} environment errors, {} provider failures",
                s.environment_errors, s.provider_failures
            )
            .yellow()
        );
    }
    if let Some(mean) = s.mean_time_ms() {
        println!("    Mean check time {:.0} ms", mean);
    }
}

#[derive(Serialize)]
struct JsonMessage<'a> {
    level: &'a str,
    message: &'a str,
}
