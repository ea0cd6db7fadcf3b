//! Console status lines (✓ success, ⊘ skipped, ✗ error)
//!
//! Every message passed in here has already been through secret masking.

use std::time::Duration;

use colored::Colorize;

#[derive(Debug, Clone, Copy, Default)]
pub struct StatusPrinter {
    quiet: bool,
}

impl StatusPrinter {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    pub fn workflow_started(&self, name: &str, steps: usize) {
        if self.quiet {
            return;
        }
        println!("{} {} {}", "▶".cyan(), name.bold(), format!("({} steps)", steps).dimmed());
    }

    pub fn job_started(&self, name: &str, iteration: Option<usize>) {
        if self.quiet {
            return;
        }
        match iteration {
            Some(i) => println!("  {} {} {}", "[⟳]".yellow(), name, format!("[{}]", i).dimmed()),
            None => println!("  {} {}", "[⟳]".yellow(), name),
        }
    }

    pub fn job_skipped(&self, name: &str, message: &str) {
        if self.quiet {
            return;
        }
        println!("  {} {} {}", "⊘".yellow(), name, message.dimmed());
    }

    pub fn step_succeeded(&self, sequence: usize, name: &str, message: Option<&str>, duration: Duration) {
        if self.quiet {
            return;
        }
        println!(
            "    {} {} {} {}",
            format!("[{}]", sequence).green(),
            name,
            "✓".green(),
            format!("({:.1}s)", duration.as_secs_f32()).dimmed()
        );
        if let Some(message) = message {
            println!("      {}", message);
        }
    }

    pub fn step_skipped(&self, sequence: usize, name: &str, message: &str) {
        if self.quiet {
            return;
        }
        println!(
            "    {} {} {} {}",
            format!("[{}]", sequence).yellow(),
            name,
            "⊘".yellow(),
            message.dimmed()
        );
    }

    /// Error lines print even when quiet
    pub fn step_failed(&self, sequence: usize, name: &str, error: &str, continued: bool) {
        let suffix = if continued { " (continue-on-error)" } else { "" };
        eprintln!(
            "    {} {} {}{}",
            format!("[{}]", sequence).red(),
            name,
            "✗".red(),
            suffix.dimmed()
        );
        eprintln!("      {} {}", "Error:".red(), error);
    }

    pub fn cancelled(&self) {
        if self.quiet {
            return;
        }
        println!("\n{} Cancelled\n", "⊘".yellow());
    }

    pub fn done(&self, duration: Duration) {
        if self.quiet {
            return;
        }
        println!(
            "\n{} Done! {}\n",
            "✓".green(),
            format!("({:.1}s)", duration.as_secs_f32()).dimmed()
        );
    }
}
