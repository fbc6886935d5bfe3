//! Formatter options.
//!
//! Options come from `lua-formatter.json` next to the source when present,
//! then from the environment (`LUA_FMT_DEBUG`, `LUA_FMT_DECOMPILER_DIR`).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{FormatError, Result};

pub const CONFIG_FILE: &str = "lua-formatter.json";

pub const DEFAULT_INDENT: usize = 2;
pub const DEFAULT_ROUND_THRESHOLD: usize = 3;
pub const DEFAULT_MAX_ROUNDS: usize = 64;

fn default_indent() -> usize {
    DEFAULT_INDENT
}

fn default_round_threshold() -> usize {
    DEFAULT_ROUND_THRESHOLD
}

fn default_max_rounds() -> usize {
    DEFAULT_MAX_ROUNDS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatOptions {
    /// Spaces per nesting level in the output.
    #[serde(default = "default_indent")]
    pub indent: usize,
    /// Per-pass iteration cap; derived from the line count when unset.
    #[serde(default)]
    pub max_iterations: Option<usize>,
    /// A deobfuscation round with fewer changes than this ends the rounds.
    #[serde(default = "default_round_threshold")]
    pub round_threshold: usize,
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    #[serde(default)]
    pub debug: bool,
    /// Where `decompiler-XXYY` binaries live; the executable's directory
    /// when unset.
    #[serde(default)]
    pub decompiler_dir: Option<PathBuf>,
    /// Cache directory for batch runs; caching is off when unset.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl Default for FormatOptions {
    fn default() -> Self {
        FormatOptions {
            indent: DEFAULT_INDENT,
            max_iterations: None,
            round_threshold: DEFAULT_ROUND_THRESHOLD,
            max_rounds: DEFAULT_MAX_ROUNDS,
            debug: false,
            decompiler_dir: None,
            cache_dir: None,
        }
    }
}

impl FormatOptions {
    /// Options for the source at `src`: the config file beside it, if any,
    /// with environment overrides applied.
    pub fn load_for(src: &Path) -> Result<Self> {
        let dir = if src.is_dir() {
            Some(src)
        } else {
            src.parent()
        };
        let file = dir.map(|dir| dir.join(CONFIG_FILE));

        let options = match file {
            Some(file) if file.is_file() => {
                debug!(path = %file.display(), "loading options");
                let text = fs::read_to_string(&file).map_err(|e| FormatError::io(&file, e))?;
                serde_json::from_str(&text)?
            }
            _ => FormatOptions::default(),
        };
        Ok(options.with_env())
    }

    /// Applies `LUA_FMT_DEBUG` and `LUA_FMT_DECOMPILER_DIR`.
    pub fn with_env(self) -> Self {
        self.with_overrides(
            std::env::var("LUA_FMT_DEBUG").ok().as_deref(),
            std::env::var_os("LUA_FMT_DECOMPILER_DIR").map(PathBuf::from),
        )
    }

    fn with_overrides(mut self, debug_flag: Option<&str>, decompiler_dir: Option<PathBuf>) -> Self {
        if let Some(flag) = debug_flag {
            self.debug = matches!(flag.trim(), "1" | "true" | "yes" | "on");
        }
        if let Some(dir) = decompiler_dir {
            self.decompiler_dir = Some(dir);
        }
        self
    }

    /// The options that shape the formatted output, as a cache key part.
    pub fn output_fingerprint(&self) -> String {
        format!(
            "indent={};maxIterations={:?};roundThreshold={};maxRounds={}",
            self.indent, self.max_iterations, self.round_threshold, self.max_rounds
        )
    }

    /// Iteration cap for a source of `line_count` lines.
    pub fn iterations_for(&self, line_count: usize) -> usize {
        self.max_iterations.unwrap_or_else(|| line_count.div_ceil(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let options: FormatOptions = serde_json::from_str(r#"{ "maxRounds": 5 }"#).unwrap();
        assert_eq!(options.indent, 2);
        assert_eq!(options.round_threshold, 3);
        assert_eq!(options.max_rounds, 5);
        assert_eq!(options.max_iterations, None);
        assert!(!options.debug);
    }

    #[test]
    fn test_camel_case_fields() {
        let options: FormatOptions = serde_json::from_str(
            r#"{ "indent": 4, "maxIterations": 7, "roundThreshold": 1, "decompilerDir": "bin" }"#,
        )
        .unwrap();
        assert_eq!(options.indent, 4);
        assert_eq!(options.max_iterations, Some(7));
        assert_eq!(options.round_threshold, 1);
        assert_eq!(options.decompiler_dir, Some(PathBuf::from("bin")));
    }

    #[test]
    fn test_overrides() {
        let options = FormatOptions::default().with_overrides(Some("1"), Some(PathBuf::from("/opt/dec")));
        assert!(options.debug);
        assert_eq!(options.decompiler_dir, Some(PathBuf::from("/opt/dec")));

        let options = options.with_overrides(Some("0"), None);
        assert!(!options.debug);
        assert_eq!(options.decompiler_dir, Some(PathBuf::from("/opt/dec")));
    }

    #[test]
    fn test_iterations_from_line_count() {
        let options = FormatOptions::default();
        assert_eq!(options.iterations_for(0), 0);
        assert_eq!(options.iterations_for(10), 1);
        assert_eq!(options.iterations_for(11), 2);

        let fixed = FormatOptions {
            max_iterations: Some(40),
            ..FormatOptions::default()
        };
        assert_eq!(fixed.iterations_for(1000), 40);
    }

    #[test]
    fn test_load_reads_config_beside_source() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), r#"{ "indent": 3 }"#).unwrap();
        let src = dir.path().join("main.lua");
        fs::write(&src, "return 1").unwrap();

        let options = FormatOptions::load_for(&src).unwrap();
        assert_eq!(options.indent, 3);
    }
}
