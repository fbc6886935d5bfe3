//! Input detection and the external decompiler bridge.
//!
//! Plain sources are decoded with the byte-transparent codec. Compiled chunks
//! (`\x1bLua`) and shell payloads (the XOR-shift encoding of a compiled
//! chunk) are handed to a `decompiler-XXYY` binary picked by the chunk's
//! version and format bytes; its stdout is the Lua source.

use lazy_static::lazy_static;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, error, info};

use crate::codec;
use crate::error::{FormatError, Result};

pub const SHELL_MAGIC: [u8; 4] = [0x57, 0x39, 0x14, 0x32];
pub const LUA_MAGIC: [u8; 4] = [0x1B, 0x4C, 0x75, 0x61];

lazy_static! {
    static ref DECOMPILER_FAILURE: Regex = Regex::new(r"^Exception in").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Text,
    Bytecode,
    Shell,
}

pub fn detect(bytes: &[u8]) -> SourceKind {
    if bytes.starts_with(&SHELL_MAGIC) {
        SourceKind::Shell
    } else if bytes.starts_with(&LUA_MAGIC) {
        SourceKind::Bytecode
    } else {
        SourceKind::Text
    }
}

/// Decodes a shell payload back to front: each byte is XORed with the one
/// decoded after it, the chain seeded by `last ^ key`. The last byte always
/// decodes to `key`.
pub fn xor_shift_decode(encoded: &[u8], key: u8) -> Vec<u8> {
    let mut decoded = vec![0u8; encoded.len()];
    let Some(&last) = encoded.last() else {
        return decoded;
    };
    let mut byte = last ^ key;
    for i in (0..encoded.len()).rev() {
        byte ^= encoded[i];
        decoded[i] = byte;
    }
    decoded
}

pub fn decompiler_failed(output: &str) -> bool {
    DECOMPILER_FAILURE.is_match(output)
}

/// File name of the decompiler for a chunk header.
pub fn decompiler_name(version: u8, format: u8) -> String {
    let name = format!("decompiler-{version:02x}{format:02x}");
    if cfg!(windows) {
        name + ".exe"
    } else {
        name
    }
}

/// Directory holding the decompilers when none is configured.
pub fn default_decompiler_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// A loaded source, ready for the parser.
#[derive(Debug, Clone)]
pub struct Source {
    pub text: String,
    pub kind: SourceKind,
    pub line_count: usize,
}

/// Reads `path` and turns it into Lua text, decompiling when needed.
pub fn load(path: &Path, decompiler_dir: &Path) -> Result<Source> {
    let bytes = fs::read(path).map_err(|e| FormatError::io(path, e))?;
    let kind = detect(&bytes);

    let text = match kind {
        SourceKind::Text => codec::decode(&bytes),
        SourceKind::Shell => {
            debug!(path = %path.display(), "shell payload");
            decompile(path, &xor_shift_decode(&bytes, 0), decompiler_dir)?
        }
        SourceKind::Bytecode => decompile(path, &bytes, decompiler_dir)?,
    };

    let line_count = text.lines().count();
    Ok(Source { text, kind, line_count })
}

fn decompile(path: &Path, chunk: &[u8], decompiler_dir: &Path) -> Result<String> {
    if !chunk.starts_with(&LUA_MAGIC) || chunk.len() < 6 {
        let head: String = chunk.iter().take(4).map(|b| format!("{b:02X}")).collect();
        return Err(FormatError::Decompiler(format!("invalid luac header {head}")));
    }
    let (version, format) = (chunk[4], chunk[5]);

    let decompiler = decompiler_dir.join(decompiler_name(version, format));
    if !decompiler.is_file() {
        error!(path = %decompiler.display(), "decompiler not found");
        return Err(FormatError::UnsupportedFormat { version, format });
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, chunk).map_err(|e| FormatError::io(&tmp, e))?;

    info!(decompiler = %decompiler.display(), "decompiling {}", path.display());
    let output = Command::new(&decompiler).arg(&tmp).output();
    if let Err(e) = fs::remove_file(&tmp) {
        debug!(path = %tmp.display(), "failed to remove temp file: {e}");
    }

    let output = output.map_err(|e| FormatError::io(&decompiler, e))?;
    let text = codec::decode(&output.stdout);
    if decompiler_failed(&text) {
        return Err(FormatError::Decompiler(text.trim_end().to_string()));
    }
    Ok(text)
}
