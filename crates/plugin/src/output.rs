//! Operator-facing output

use colored::Colorize;
use deploy_lib::Outcome;

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Print the terminal outcome of a run for `target` (e.g. "Deployment web")
pub fn report(target: &str, outcome: &Outcome) {
    match outcome {
        Outcome::Applied | Outcome::AppliedAndStable => {
            print_success(&format!("{} {}", target, outcome.label()));
        }
        Outcome::AppliedButUnstable(err) => {
            print_warning(&format!("{} {}: {}", target, outcome.label(), err));
        }
        Outcome::Failed(err) if err.applied() => {
            print_warning(&format!("{} was applied", target));
            print_error(&format!("{} {}: {}", target, outcome.label(), err));
        }
        Outcome::Failed(err) => {
            print_error(&format!("{} {}: {}", target, outcome.label(), err));
        }
    }
}

/// Describe a resource as "Kind name"
pub fn describe(kind: &str, name: &str) -> String {
    if name.is_empty() {
        kind.to_string()
    } else {
        format!("{} {}", kind, name.bold())
    }
}
