use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tracing::{error, info};

use lua_formatter::discovery::default_destination;
use lua_formatter::{format_dir, format_file, logging, FormatError, FormatOptions, Mode};

fn usage(program: &str) -> ExitCode {
    let name = Path::new(program)
        .file_name()
        .map_or_else(|| program.to_string(), |name| name.to_string_lossy().into_owned());
    eprintln!("Usage: {name} <mode> <srcPath> [dstPath]");
    eprintln!("  mode: deobfuscate | obfuscate");
    ExitCode::FAILURE
}

fn run(mode: &str, src: &Path, dst: Option<PathBuf>) -> Result<bool, FormatError> {
    let options = FormatOptions::load_for(src)?;
    if let Err(e) = logging::init(options.debug) {
        eprintln!("failed to install logger: {e}");
    }
    let mode: Mode = mode.parse()?;

    if src.is_dir() {
        let failures = format_dir(src, mode, &options)?;
        if !failures.is_empty() {
            error!(failed = failures.len(), "batch finished with errors");
        }
        return Ok(failures.is_empty());
    }

    let dst = dst.unwrap_or_else(|| default_destination(src));
    format_file(src, &dst, mode, &options, None)?;
    info!("done");
    Ok(true)
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map_or("lua-formatter", String::as_str);
    if !(3..=4).contains(&args.len()) {
        return usage(program);
    }

    let src = PathBuf::from(&args[2]);
    let dst = args.get(3).map(PathBuf::from);
    match run(&args[1], &src, dst) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("[{}] {e}", e.code());
            ExitCode::FAILURE
        }
    }
}
