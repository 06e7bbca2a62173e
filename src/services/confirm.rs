//! Confirmation policy
//!
//! Destructive or expensive steps (renaming, refreshing the index before
//! a rename) ask before proceeding. The asking is injected so the core
//! never touches a terminal: interactive runs prompt on stdin,
//! non-interactive runs answer from configuration.

use std::io::{BufRead, Write};

/// Answers yes/no questions on behalf of the user.
pub trait Confirm {
    fn confirm(&self, question: &str) -> bool;
}

/// Prompts on the terminal, accepting `y`/`Y` as assent.
pub struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn confirm(&self, question: &str) -> bool {
        print!("{question} (y/n): ");
        if std::io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        if std::io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        answer.trim().eq_ignore_ascii_case("y")
    }
}

/// Fixed answer for non-interactive runs.
pub struct AutoConfirm(pub bool);

impl Confirm for AutoConfirm {
    fn confirm(&self, _question: &str) -> bool {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_confirm() {
        assert!(AutoConfirm(true).confirm("proceed?"));
        assert!(!AutoConfirm(false).confirm("proceed?"));
    }
}
