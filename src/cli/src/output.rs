//! Output helpers.

use colored::Colorize;

pub fn print_error(message: &str) {
    eprintln!("{} {}", "error:".red().bold(), message);
}

pub fn print_ok(message: &str) {
    println!("{} {}", "ok:".green().bold(), message);
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Render a task status with a stable color scheme.
pub fn status_label(status: &str) -> colored::ColoredString {
    match status {
        "done" | "validated" => status.green(),
        "in_progress" | "running" | "review" | "delivered" => status.yellow(),
        "rejected" | "canceled" => status.red(),
        _ => status.normal(),
    }
}
