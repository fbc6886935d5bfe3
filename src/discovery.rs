//! Batch discovery.
//!
//! Recursively scans a directory for Lua sources and compiled chunks and
//! derives where each formatted output goes.

use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const OUTPUT_SUFFIX: &str = ".ast.lua";

lazy_static! {
    static ref SOURCE_EXTENSION: Regex = Regex::new(r"(\.lua|\.luac)?$").unwrap();
}

/// `foo.lua` and `foo.luac` become `foo.ast.lua`; anything else gets the
/// suffix appended.
pub fn default_destination(src: &Path) -> PathBuf {
    let src = src.to_string_lossy();
    PathBuf::from(SOURCE_EXTENSION.replacen(&src, 1, OUTPUT_SUFFIX).into_owned())
}

fn is_output(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(OUTPUT_SUFFIX))
}

fn is_source(path: &Path) -> bool {
    matches!(path.extension().and_then(|ext| ext.to_str()), Some("lua" | "luac")) && !is_output(path)
}

/// Every `*.lua` / `*.luac` file below `dir`, previous outputs excluded,
/// in a stable order.
pub fn discover_sources(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_source(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn test_default_destination() {
        assert_eq!(default_destination(Path::new("a/main.lua")), PathBuf::from("a/main.ast.lua"));
        assert_eq!(default_destination(Path::new("a/main.luac")), PathBuf::from("a/main.ast.lua"));
        assert_eq!(default_destination(Path::new("a/main")), PathBuf::from("a/main.ast.lua"));
        assert_eq!(default_destination(Path::new("a/main.txt")), PathBuf::from("a/main.txt.ast.lua"));
    }

    #[test]
    fn test_discover_skips_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("lib");
        fs::create_dir(&nested).unwrap();
        fs::write(dir.path().join("main.lua"), "").unwrap();
        fs::write(dir.path().join("main.ast.lua"), "").unwrap();
        fs::write(nested.join("util.luac"), "").unwrap();
        fs::write(nested.join("notes.txt"), "").unwrap();

        let found = discover_sources(dir.path());
        assert_eq!(found, vec![nested.join("util.luac"), dir.path().join("main.lua")]);
    }
}
