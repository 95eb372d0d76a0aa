//! Report output shared by the stress and scenario commands
//!
//! Every helper has two renderings: cliclack framing on a terminal, and
//! plain lines with `pass`/`FAIL` markers that scripts can grep otherwise.

use super::context::UiContext;
use console::{style, Style};

/// Width of the label column in plain output
const LABEL_WIDTH: usize = 28;

/// Open a report
pub fn banner(ctx: &UiContext, title: &str) {
    if ctx.use_fancy_output() {
        cliclack::intro(style(title).cyan().bold()).ok();
    } else {
        println!("== {} ==", title);
    }
}

/// Close a report with its overall verdict
pub fn verdict(ctx: &UiContext, passed: bool, message: &str) {
    let tone = if passed {
        Style::new().green().bold()
    } else {
        Style::new().red().bold()
    };

    if ctx.use_fancy_output() {
        cliclack::outro(tone.apply_to(message)).ok();
    } else {
        println!();
        println!("{} {}", marker(passed), message);
    }
}

/// Start a group of fields
pub fn heading(ctx: &UiContext, title: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::step(style(title).bold()).ok();
    } else {
        println!();
        println!("[{}]", title);
    }
}

/// Free-form remark inside a group
pub fn note(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::remark(message).ok();
    } else {
        println!("  - {}", message);
    }
}

/// Labelled measurement
pub fn field(ctx: &UiContext, label: &str, value: &str) {
    if ctx.use_fancy_output() {
        println!("  {}: {}", style(label).dim(), value);
    } else {
        println!("  {:<width$} {}", label, value, width = LABEL_WIDTH);
    }
}

/// Invariant check with its observed value
pub fn check(ctx: &UiContext, label: &str, observed: &str, held: bool) {
    if ctx.use_fancy_output() {
        let symbol = if held {
            style("✔").green()
        } else {
            style("✘").red()
        };
        println!("  {} {}: {}", symbol, style(label).dim(), observed);
    } else {
        println!(
            "  {} {:<width$} {}",
            marker(held),
            label,
            observed,
            width = LABEL_WIDTH
        );
    }
}

fn marker(ok: bool) -> &'static str {
    if ok {
        "pass"
    } else {
        "FAIL"
    }
}
