//! Input detection and decompiler bridge tests.

#[cfg(test)]
mod tests {
    use crate::decompile::{
        decompiler_failed, decompiler_name, detect, load, xor_shift_decode, SourceKind, LUA_MAGIC, SHELL_MAGIC,
    };
    use crate::error::FormatError;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn test_detect_magic() {
        assert_eq!(detect(&[0x57, 0x39, 0x14, 0x32, 0x00]), SourceKind::Shell);
        assert_eq!(detect(b"\x1bLua\x53\x00"), SourceKind::Bytecode);
        assert_eq!(detect(b"return 1"), SourceKind::Text);
        assert_eq!(detect(&[0x57, 0x39]), SourceKind::Text);
        assert_eq!(detect(&[]), SourceKind::Text);
    }

    #[test]
    fn test_xor_shift_decode_vector() {
        let encoded = [0x57, 0x39, 0x14, 0x32, 0x53, 0x00];
        assert_eq!(xor_shift_decode(&encoded, 0), vec![0x1B, 0x4C, 0x75, 0x61, 0x53, 0x00]);
    }

    #[test]
    fn test_xor_shift_last_byte_is_key() {
        assert_eq!(xor_shift_decode(&[0x01, 0x02], 0), vec![0x01, 0x00]);
        assert_eq!(xor_shift_decode(&[0x10, 0x20], 0x07), vec![0x17, 0x07]);
        assert_eq!(xor_shift_decode(&[], 0), Vec::<u8>::new());
    }

    #[test]
    fn test_shell_magic_decodes_to_lua_magic() {
        let mut payload = SHELL_MAGIC.to_vec();
        payload.extend([0x53, 0x00]);
        assert!(xor_shift_decode(&payload, 0).starts_with(&LUA_MAGIC));
    }

    #[test]
    fn test_decompiler_name() {
        let expected = if cfg!(windows) {
            "decompiler-5300.exe"
        } else {
            "decompiler-5300"
        };
        assert_eq!(decompiler_name(0x53, 0x00), expected);
        assert!(decompiler_name(0x0a, 0xff).starts_with("decompiler-0aff"));
    }

    #[test]
    fn test_decompiler_failure_output() {
        assert!(decompiler_failed("Exception in thread \"main\" java.lang.NullPointerException\n"));
        assert!(!decompiler_failed("local x = 1\n-- Exception in comment\n"));
    }

    #[test]
    fn test_load_plain_text() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("main.lua");
        fs::write(&src, b"local s = '\xff'\nreturn s\n").unwrap();

        let source = load(&src, dir.path()).unwrap();
        assert_eq!(source.kind, SourceKind::Text);
        assert_eq!(source.line_count, 2);
        assert_eq!(source.text, "local s = '\u{F7FF}'\nreturn s\n");
    }

    #[test]
    fn test_missing_decompiler_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("main.luac");
        fs::write(&src, b"\x1bLua\x53\x00rest").unwrap();

        let err = load(&src, dir.path()).unwrap_err();
        assert!(matches!(
            err,
            FormatError::UnsupportedFormat {
                version: 0x53,
                format: 0x00
            }
        ));
        assert!(!dir.path().join("main.luac.tmp").exists());
    }

    #[test]
    fn test_shell_payload_reaches_decompiler_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("main.luac");
        fs::write(&src, [0x57, 0x39, 0x14, 0x32, 0x53, 0x00]).unwrap();

        let err = load(&src, dir.path()).unwrap_err();
        assert!(matches!(err, FormatError::UnsupportedFormat { version: 0x53, .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_decompiler_runs_on_temp_copy() {
        let echo = std::path::Path::new("/bin/echo");
        if !echo.exists() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(echo, dir.path().join(decompiler_name(0x53, 0x00))).unwrap();
        let src = dir.path().join("main.luac");
        fs::write(&src, b"\x1bLua\x53\x00rest").unwrap();

        let source = load(&src, dir.path()).unwrap();
        let tmp = dir.path().join("main.luac.tmp");
        assert_eq!(source.kind, SourceKind::Bytecode);
        assert_eq!(source.text.trim_end(), tmp.to_string_lossy());
        assert!(!tmp.exists());
    }
}
