use check_core::diagnosis::{analyze, partition, AggregateSummary, KeyVerdict};
use check_core::probe::{ModelProbeResult, ProbeObserver};
use crossterm::style::Stylize;
use serde::Serialize;
use std::io::{stdout, Write};

/// Body shared by `GET /api/test-models` and `probe --json`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReport {
    pub results: Vec<ModelProbeResult>,
    pub summary: AggregateSummary,
    pub api_key_valid: bool,
}

impl ProbeReport {
    pub fn new(results: Vec<ModelProbeResult>) -> Self {
        let summary = analyze(&results);
        Self {
            results,
            api_key_valid: summary.credential_valid,
            summary,
        }
    }
}

pub fn verdict_message(verdict: KeyVerdict) -> &'static str {
    match verdict {
        KeyVerdict::Invalid => {
            "Warning: Your API key appears to be invalid or has insufficient permissions."
        }
        KeyVerdict::Restricted => {
            "Warning: None of the models worked. You might have subscription limitations."
        }
        KeyVerdict::Working => "Your API key is working with some models.",
    }
}

pub fn print_header(masked_key: &str) {
    println!("{}", "OpenAI Model Tester".blue().bold());
    println!("{}", "Testing all available models with your API key\n".blue());
    println!("{}", format!("API Key detected: {}\n", masked_key).dark_grey());
}

/// Prints `Testing <model>... ` before each request and the outcome on the
/// same line once it lands.
pub struct TerminalProgress;

impl ProbeObserver for TerminalProgress {
    fn on_start(&mut self, model: &str) {
        print!("{}", format!("Testing {}... ", model).yellow());
        let _ = stdout().flush();
    }

    fn on_result(&mut self, result: &ModelProbeResult) {
        print_result(result);
    }
}

fn print_result(r: &ModelProbeResult) {
    if r.success() {
        println!(
            "{}",
            format!("✓ Success ({}ms)", r.latency_ms().unwrap_or_default()).green()
        );
        println!(
            "{}",
            format!("  Response: \"{}\"\n", r.response().unwrap_or_default()).dark_grey()
        );
    } else {
        println!("{}", "✗ Failed".red());
        println!(
            "{}",
            format!("  Error: {}\n", r.error().unwrap_or_default()).dark_grey()
        );
    }
}

pub fn print_summary(report: &ProbeReport) {
    let s = &report.summary;
    println!("{}", "\nTest Summary:".blue().bold());
    println!("{}", format!("Total models tested: {}", s.total).blue());
    println!("{}", format!("Working models: {}", s.working_count).green());
    println!("{}", format!("Failed models: {}", s.failed_count).red());

    let verdict = s.verdict();
    let line = format!("\n{}", verdict_message(verdict));
    match verdict {
        KeyVerdict::Working => println!("{}", line.green().bold()),
        _ => println!("{}", line.yellow().bold()),
    }

    let (working, _) = partition(&report.results);
    if !working.is_empty() {
        println!("{}", "\nWorking Models:".blue().bold());
        for r in working {
            println!(
                "{}",
                format!("- {} ({}ms)", r.model(), r.latency_ms().unwrap_or_default()).green()
            );
        }
    }
}
