//! Compiler configuration: the symbols an embedding program exposes to the
//! compiled module without those symbols living in any `.ava` source, plus
//! the knobs that control error reporting.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// An externally-provided function or variable a module may reference
/// without a local `extern` declaration (the embedding program registers
/// these before compiling).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalSymbol {
    pub full_name: String,
    /// Parseable by `avc_core::FunctionPrototype::parse`, e.g. `"1 arg1"`.
    /// `None` for external variables.
    pub prototype: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerConfig {
    #[serde(default)]
    pub external_symbols: Vec<ExternalSymbol>,

    /// Whether rendered error reports use ANSI colour codes.
    #[serde(default = "default_ansi_colour")]
    pub ansi_colour: bool,

    /// The `ErrorList::render` line budget (§7): how much of the report a
    /// single compile invocation is allowed to spend before truncating.
    #[serde(default = "default_max_report_lines")]
    pub max_report_lines: usize,

    /// Extra `.avam`/`.avapi` search directories, beyond the standard
    /// library location, consulted when resolving `import`.
    #[serde(default)]
    pub import_search_paths: Vec<PathBuf>,
}

fn default_ansi_colour() -> bool {
    true
}

fn default_max_report_lines() -> usize {
    200
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            external_symbols: Vec::new(),
            ansi_colour: default_ansi_colour(),
            max_report_lines: default_max_report_lines(),
            import_search_paths: Vec::new(),
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    pub fn with_external_symbol(mut self, symbol: ExternalSymbol) -> Self {
        self.external_symbols.push(symbol);
        self
    }

    pub fn with_import_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.import_search_paths.push(path.into());
        self
    }

    /// Parses a TOML configuration file, as loaded via `--config` on the
    /// CLI.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_budgets() {
        let cfg = CompilerConfig::default();
        assert!(cfg.max_report_lines > 0);
        assert!(cfg.external_symbols.is_empty());
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = CompilerConfig::new().with_external_symbol(ExternalSymbol {
            full_name: "host:log".into(),
            prototype: Some("1 message".into()),
        });
        let text = cfg.to_toml().unwrap();
        let back = CompilerConfig::from_toml(&text).unwrap();
        assert_eq!(back.external_symbols.len(), 1);
        assert_eq!(back.external_symbols[0].full_name, "host:log");
    }
}
