use std::io::Write;

use owo_colors::OwoColorize;
use rulecheck_core::{CheckResponse, RuleVerdict, VerdictStatus};

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Print what is about to be checked.
pub fn print_header(
    w: &mut dyn Write,
    file_name: &str,
    rule_count: usize,
    model: &str,
    color: ColorMode,
) -> std::io::Result<()> {
    let noun = if rule_count == 1 { "rule" } else { "rules" };
    writeln!(w, "Checking {} against {} {}...", file_name, rule_count, noun)?;
    if color.enabled() {
        writeln!(w, "{}", format!("(model: {})", model).dimmed())?;
    } else {
        writeln!(w, "(model: {})", model)?;
    }
    writeln!(w)?;
    Ok(())
}

/// Print one block per verdict, in rule order.
pub fn print_results(
    w: &mut dyn Write,
    response: &CheckResponse,
    color: ColorMode,
) -> std::io::Result<()> {
    let total = response.results.len();
    for (i, verdict) in response.results.iter().enumerate() {
        print_verdict(w, i + 1, total, verdict, color)?;
    }
    Ok(())
}

fn print_verdict(
    w: &mut dyn Write,
    idx: usize,
    total: usize,
    verdict: &RuleVerdict,
    color: ColorMode,
) -> std::io::Result<()> {
    let label = verdict.status.as_str().to_uppercase();
    if color.enabled() {
        let label = match verdict.status {
            VerdictStatus::Pass => label.green().bold().to_string(),
            VerdictStatus::Fail => label.red().bold().to_string(),
        };
        writeln!(
            w,
            "[{}/{}] {} ({}%) {}",
            idx, total, label, verdict.confidence, verdict.rule
        )?;
        writeln!(w, "      {} {}", "Evidence: ".dimmed(), verdict.evidence)?;
        writeln!(w, "      {} {}", "Reasoning:".dimmed(), verdict.reasoning)?;
    } else {
        writeln!(
            w,
            "[{}/{}] {} ({}%) {}",
            idx, total, label, verdict.confidence, verdict.rule
        )?;
        writeln!(w, "      Evidence:  {}", verdict.evidence)?;
        writeln!(w, "      Reasoning: {}", verdict.reasoning)?;
    }
    writeln!(w)?;
    Ok(())
}

/// Print the pass/fail tally.
pub fn print_summary(
    w: &mut dyn Write,
    response: &CheckResponse,
    color: ColorMode,
) -> std::io::Result<()> {
    let passed = response
        .results
        .iter()
        .filter(|v| v.status == VerdictStatus::Pass)
        .count();
    let failed = response.results.len() - passed;

    if color.enabled() {
        writeln!(
            w,
            "{} {}, {} {}",
            passed.to_string().green().bold(),
            "passed".green(),
            failed.to_string().red().bold(),
            "failed".red()
        )?;
    } else {
        writeln!(w, "{} passed, {} failed", passed, failed)?;
    }
    Ok(())
}
