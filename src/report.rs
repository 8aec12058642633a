//! Human-readable report text. Not a stable format.
use crate::command::Command;
use crate::links::{LinkResult, LinkStatus};
use crate::matcher::{MatchMode, MatchOrder, MatchOutcome};
use colored::Colorize;

pub(crate) fn step_header(name: &str) -> String {
    if name.is_empty() {
        String::new()
    } else {
        format!("Step: {name}\n")
    }
}

/// Command text and return code, colored by how the code compares to expectation.
pub(crate) fn command_line(command: &Command, expected: Option<i32>) -> String {
    let code = command.return_code().to_string();
    let code = match expected {
        None => code.yellow(),
        Some(expected) if command.return_code_matches(expected) => code.green(),
        Some(_) => code.red(),
    };
    let mut out = format!("\tcommand: `{}`\n\treturn_code: {code}\n", command.text());
    if let Some(duration) = command.duration() {
        out.push_str(&format!("\tduration: {:.2}s\n", duration.as_secs_f64()));
    }
    if command.timed_out() {
        out.push_str(&format!("\t{}\n", "ERROR command timed out".red()));
    }
    out
}

pub(crate) fn stream_section(
    label: &str,
    expected: &[String],
    actual: &[String],
    outcome: &MatchOutcome,
    mode: MatchMode,
    order: MatchOrder,
) -> String {
    let mut out =
        format!("\tExpected {label} (output_match_mode: {mode}, match_order: {order}):\n");
    for line in expected {
        out.push_str(&format!("\t\t{line}\n"));
    }
    out.push_str(&format!("\tActual {label}:\n"));
    for (index, line) in actual.iter().enumerate() {
        if outcome.is_matched(index) {
            out.push_str(&format!("\t\t{}\n", line.green()));
        } else {
            out.push_str(&format!("\t\t{line}\n"));
        }
    }
    if !outcome.missing.is_empty() {
        out.push_str(&format!("{}\n", "\tERROR expected lines not found:".red()));
        for line in &outcome.missing {
            out.push_str(&format!("\t\t{}\n", line.red()));
        }
    }
    if outcome.out_of_order {
        out.push_str(&format!("{}\n", "\tERROR expected lines matched out of order".red()));
    }
    out
}

pub(crate) fn links_section(results: &[LinkResult]) -> String {
    let mut out = String::from("\nExternal link validation:\n");
    for result in results {
        let status = match result.status {
            LinkStatus::Ok(code) => code.to_string().green(),
            LinkStatus::Failed(code) => code.to_string().red(),
            LinkStatus::ConnectionFailed => "Connection Failed".red(),
            LinkStatus::Ignored => "Ignored".yellow(),
        };
        out.push_str(&format!("\t{} Status: {}\n", result.url, status));
    }
    out
}
