//! Rendering an [`ErrorList`] to a terminal report under the configured
//! line budget (§7), and the summary line printed after a run.

use crate::error::ErrorList;
use tracing::warn;

pub fn report(errors: &ErrorList, line_budget: usize, ansi: bool) -> String {
    if errors.is_empty() {
        return String::new();
    }
    warn!(count = errors.len(), "compilation produced errors");
    errors.render(line_budget, ansi)
}

pub fn summary_line(errors: &ErrorList) -> String {
    match errors.len() {
        0 => "compiled with no errors".to_string(),
        1 => "compiled with 1 error".to_string(),
        n => format!("compiled with {n} errors"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceLocation;

    #[test]
    fn empty_error_list_renders_nothing() {
        let errors = ErrorList::new();
        assert_eq!(report(&errors, 100, false), "");
        assert_eq!(summary_line(&errors), "compiled with no errors");
    }

    #[test]
    fn nonempty_error_list_renders_and_summarises() {
        let mut errors = ErrorList::new();
        errors.push("bad thing", SourceLocation::new("m.ava", "x", 1, 1));
        assert!(!report(&errors, 100, false).is_empty());
        assert_eq!(summary_line(&errors), "compiled with 1 error");
    }
}
