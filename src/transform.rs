//! Mode dispatch and the pass schedule.
//!
//! `deobfuscate` alternates inlining and table folding in rounds until fewer
//! passes of a round report a change than the round threshold. One more
//! inline, the function name fixup and dead code stripping follow.
//! `obfuscate` leaves the tree alone.

use rayon::prelude::*;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, error, info};

use crate::ast::Ast;
use crate::cache::OutputCache;
use crate::codec;
use crate::config::FormatOptions;
use crate::decompile::{self, default_decompiler_dir};
use crate::discovery::{default_destination, discover_sources};
use crate::error::{FormatError, Result};
use crate::parse::parse;
use crate::stack;
use crate::step::{FixupFunctionNameStep, InlineStep, Step, StripDeadCodeStep, TableConstructorStep};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Deobfuscate,
    Obfuscate,
}

impl FromStr for Mode {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "deobfuscate" => Ok(Mode::Deobfuscate),
            "obfuscate" => Ok(Mode::Obfuscate),
            other => Err(FormatError::InvalidMode(other.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Deobfuscate => "deobfuscate",
            Mode::Obfuscate => "obfuscate",
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PASS SCHEDULE
// ═══════════════════════════════════════════════════════════════════════════════

/// Runs `mode` over `ast` in place.
pub fn process(ast: &mut Ast, mode: Mode, max_iterations: usize, options: &FormatOptions) -> Result<()> {
    match mode {
        Mode::Obfuscate => Ok(()),
        Mode::Deobfuscate => deobfuscate(ast, max_iterations, options),
    }
}

fn deobfuscate(ast: &mut Ast, max_iterations: usize, options: &FormatOptions) -> Result<()> {
    deobfuscation_rounds(ast, max_iterations, options)?;

    Step::new(InlineStep::new()).apply(ast, max_iterations)?;
    Step::new(FixupFunctionNameStep::new()).apply(ast, max_iterations)?;
    Step::new(StripDeadCodeStep::new()).apply(ast, max_iterations)?;
    Ok(())
}

/// Alternates inlining and table folding; returns the number of rounds run.
///
/// A round counts the passes that changed the tree. The rounds end once that
/// count drops below `round_threshold`, or after `max_rounds`.
pub(crate) fn deobfuscation_rounds(ast: &mut Ast, max_iterations: usize, options: &FormatOptions) -> Result<usize> {
    let mut round = 0;
    loop {
        round += 1;

        let inlined = Step::new(InlineStep::new()).apply(ast, max_iterations)?;
        let folded = Step::new(TableConstructorStep::new()).apply(ast, max_iterations)?;
        let reinlined = Step::new(InlineStep::new()).apply(ast, max_iterations)?;

        let changes = [inlined, folded, reinlined].into_iter().filter(|&c| c).count();
        debug!(round, changes, "deobfuscation round");

        if changes < options.round_threshold || round >= options.max_rounds {
            return Ok(round);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEXT PIPELINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Parses `source`, runs `mode` and prints the result.
pub fn format_source(source: &str, mode: Mode, options: &FormatOptions) -> Result<String> {
    let line_count = source.lines().count();
    let max_iterations = options.iterations_for(line_count);

    let serialized = parse(source)?;
    let ast = Ast::from_serialized(&serialized);
    stack::dismantle(serialized);
    let mut ast = ast?;
    info!(%mode, line_count, nodes = ast.nodes.len(), "formatting");

    process(&mut ast, mode, max_iterations, options)?;
    ast.to_lua(options.indent)
}

/// Shorthand for [`format_source`] in deobfuscate mode with default options.
pub fn deobfuscate_source(source: &str) -> Result<String> {
    format_source(source, Mode::Deobfuscate, &FormatOptions::default())
}

// ═══════════════════════════════════════════════════════════════════════════════
// FILES
// ═══════════════════════════════════════════════════════════════════════════════

fn format_bytes(src: &Path, mode: Mode, options: &FormatOptions) -> Result<String> {
    let decompiler_dir = options
        .decompiler_dir
        .clone()
        .unwrap_or_else(default_decompiler_dir);
    let source = decompile::load(src, &decompiler_dir)?;
    debug!(path = %src.display(), kind = ?source.kind, lines = source.line_count, "loaded");
    format_source(&source.text, mode, options)
}

/// Formats `src` into `dst`, going through `cache` when given.
pub fn format_file(
    src: &Path,
    dst: &Path,
    mode: Mode,
    options: &FormatOptions,
    cache: Option<&OutputCache>,
) -> Result<()> {
    let output = match cache {
        Some(cache) => {
            let bytes = fs::read(src).map_err(|e| FormatError::io(src, e))?;
            let hash = OutputCache::compute_hash(&bytes, &mode.to_string(), options);
            match cache.get(src, &hash) {
                Some(output) => output,
                None => {
                    let output = format_bytes(src, mode, options)?;
                    cache.set(src, hash, output.clone())?;
                    output
                }
            }
        }
        None => format_bytes(src, mode, options)?,
    };

    fs::write(dst, codec::encode(&output)).map_err(|e| FormatError::io(dst, e))?;
    info!("{} -> {}", src.display(), dst.display());
    Ok(())
}

/// Formats every source below `dir` in parallel, each next to its input.
///
/// Returns the failures; an empty list means every file succeeded.
pub fn format_dir(dir: &Path, mode: Mode, options: &FormatOptions) -> Result<Vec<(PathBuf, FormatError)>> {
    let cache = options.cache_dir.as_deref().map(OutputCache::open).transpose()?;
    let sources = discover_sources(dir);
    info!(count = sources.len(), "formatting {}", dir.display());

    let failures = sources
        .par_iter()
        .filter_map(|src| {
            let dst = default_destination(src);
            match format_file(src, &dst, mode, options, cache.as_ref()) {
                Ok(()) => None,
                Err(e) => {
                    error!(code = e.code(), "{}: {e}", src.display());
                    Some((src.clone(), e))
                }
            }
        })
        .collect();
    Ok(failures)
}
