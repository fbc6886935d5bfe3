//! End-to-end tests of the mode pipeline and the file entry points.

#[cfg(test)]
mod tests {
    use crate::ast::Ast;
    use crate::cache::CacheEntry;
    use crate::config::FormatOptions;
    use crate::error::FormatError;
    use crate::parse::parse;
    use crate::transform::{deobfuscate_source, deobfuscation_rounds, format_dir, format_file, format_source, Mode};
    use pretty_assertions::assert_eq;
    use std::fs;

    fn options_in(dir: &std::path::Path) -> FormatOptions {
        FormatOptions {
            decompiler_dir: Some(dir.to_path_buf()),
            ..FormatOptions::default()
        }
    }

    #[test]
    fn test_mode_names() {
        assert_eq!("deobfuscate".parse::<Mode>().unwrap(), Mode::Deobfuscate);
        assert_eq!("obfuscate".parse::<Mode>().unwrap(), Mode::Obfuscate);
        assert_eq!(Mode::Deobfuscate.to_string(), "deobfuscate");

        let err = "beautify".parse::<Mode>().unwrap_err();
        assert!(matches!(err, FormatError::InvalidMode(ref mode) if mode == "beautify"));
        assert_eq!(err.code(), crate::error::ERR_INVALID_MODE);
    }

    #[test]
    fn test_obfuscate_only_reformats() {
        let out = format_source("local   x=1\nreturn x", Mode::Obfuscate, &FormatOptions::default()).unwrap();
        assert_eq!(out, "local x = 1\nreturn x");
    }

    #[test]
    fn test_indent_option() {
        let options = FormatOptions {
            indent: 4,
            ..FormatOptions::default()
        };
        let out = format_source("if g then h() end", Mode::Obfuscate, &options).unwrap();
        assert_eq!(out, "if g then\n    h()\nend");
    }

    #[test]
    fn test_deobfuscate_examples() {
        let cases = [
            ("local a = 1\nlocal b = a + 2\nreturn b", "return 1 + 2"),
            ("local x = 1", ""),
            ("local x = f()", "f()"),
            ("local s = 'hello'\nlocal p = print\np(s)", "print('hello')"),
            ("local x = 1\nx = x + 2\nprint(x)", "print(1 + 2)"),
            ("local x = 1\nx = 2\nprint(x)", "print(2)"),
            ("local a = f()\nreturn 1, a", "return 1, (f())"),
            (
                "local n = 5\nfor i = 1, n do\n  print(i)\nend",
                "for i = 1, 5 do\n  print(i)\nend",
            ),
            (
                "local f = function(a)\n  return a\nend\nreturn f(1)",
                "local function f(a)\n  return a\nend\nreturn f(1)",
            ),
        ];
        for (source, expected) in cases {
            assert_eq!(deobfuscate_source(source).unwrap(), expected, "source: {source}");
        }
    }

    #[test]
    fn test_loops_keep_their_state() {
        let source = "local i = 0\nwhile i < 10 do\n  i = i + 1\nend\nreturn i";
        assert_eq!(deobfuscate_source(source).unwrap(), source);

        let source = "local t = f()\nwhile true do\n  print(t)\nend";
        assert_eq!(deobfuscate_source(source).unwrap(), source);
    }

    #[test]
    fn test_deobfuscate_is_a_fixed_point() {
        let source = "\
local a = 'x'
local b = a .. 'y'
local t = {}
t.k = b
local u = t
print(u)
local unused = 10
local n = g()
for i = 1, n do
  print(i)
end";
        let once = deobfuscate_source(source).unwrap();
        assert_eq!(
            once,
            "print({k = 'x' .. 'y'})\nlocal n = g()\nfor i = 1, n do\n  print(i)\nend"
        );
        assert_eq!(deobfuscate_source(&once).unwrap(), once);
    }

    #[test]
    fn test_syntax_error_surfaces() {
        let err = deobfuscate_source("local = 1").unwrap_err();
        assert_eq!(err.code(), crate::error::ERR_SYNTAX);
    }

    #[test]
    fn test_format_file_writes_destination() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("main.lua");
        let dst = dir.path().join("out.lua");
        fs::write(&src, b"local a = '\xe9'\nreturn a\n").unwrap();

        format_file(&src, &dst, Mode::Deobfuscate, &options_in(dir.path()), None).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), b"return '\xe9'".to_vec());
    }

    #[test]
    fn test_format_file_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("absent.lua");
        let err = format_file(
            &src,
            &dir.path().join("out.lua"),
            Mode::Deobfuscate,
            &options_in(dir.path()),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, FormatError::Io { .. }));
    }

    #[test]
    fn test_format_dir_reports_failures() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("lib")).unwrap();
        fs::write(dir.path().join("main.lua"), "local a = 1\nreturn a").unwrap();
        fs::write(dir.path().join("lib/util.lua"), "return 2").unwrap();
        fs::write(dir.path().join("broken.lua"), "local = 1").unwrap();
        fs::write(dir.path().join("notes.txt"), "not lua").unwrap();

        let failures = format_dir(dir.path(), Mode::Deobfuscate, &options_in(dir.path())).unwrap();

        assert_eq!(failures.len(), 1);
        assert!(failures[0].0.ends_with("broken.lua"));
        assert!(matches!(failures[0].1, FormatError::Syntax { .. }));
        assert_eq!(fs::read_to_string(dir.path().join("main.ast.lua")).unwrap(), "return 1");
        assert_eq!(fs::read_to_string(dir.path().join("lib/util.ast.lua")).unwrap(), "return 2");
        assert!(!dir.path().join("notes.txt.ast.lua").exists());
        assert!(!dir.path().join("broken.ast.lua").exists());
    }

    #[test]
    fn test_format_dir_uses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("main.lua");
        fs::write(&src, "local a = 1\nreturn a").unwrap();
        let options = FormatOptions {
            cache_dir: Some(cache_dir.path().to_path_buf()),
            ..options_in(dir.path())
        };

        assert!(format_dir(dir.path(), Mode::Deobfuscate, &options).unwrap().is_empty());
        let entries: Vec<_> = fs::read_dir(cache_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(entries.len(), 1);

        // A hit is served from the entry without formatting again.
        let mut entry: CacheEntry = serde_json::from_str(&fs::read_to_string(&entries[0]).unwrap()).unwrap();
        assert_eq!(entry.output, "return 1");
        entry.output = "return 'cached'".to_string();
        fs::write(&entries[0], serde_json::to_string(&entry).unwrap()).unwrap();

        assert!(format_dir(dir.path(), Mode::Deobfuscate, &options).unwrap().is_empty());
        let dst = dir.path().join("main.ast.lua");
        assert_eq!(fs::read_to_string(&dst).unwrap(), "return 'cached'");

        // Changing the source invalidates the entry.
        fs::write(&src, "return 3").unwrap();
        assert!(format_dir(dir.path(), Mode::Deobfuscate, &options).unwrap().is_empty());
        assert_eq!(fs::read_to_string(&dst).unwrap(), "return 3");
    }

    #[test]
    fn test_cache_entry_follows_output_options() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.lua"), "if g then h() end").unwrap();
        let options = FormatOptions {
            cache_dir: Some(cache_dir.path().to_path_buf()),
            ..options_in(dir.path())
        };
        let dst = dir.path().join("main.ast.lua");

        assert!(format_dir(dir.path(), Mode::Deobfuscate, &options).unwrap().is_empty());
        assert_eq!(fs::read_to_string(&dst).unwrap(), "if g then\n  h()\nend");

        let wider = FormatOptions { indent: 4, ..options };
        assert!(format_dir(dir.path(), Mode::Deobfuscate, &wider).unwrap().is_empty());
        assert_eq!(fs::read_to_string(&dst).unwrap(), "if g then\n    h()\nend");
        assert_eq!(fs::read_dir(cache_dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_rounds_count_changed_passes() {
        let rounds = |round_threshold: usize, max_rounds: usize| {
            let mut ast = Ast::from_serialized(&parse("local a = 1\nreturn a").unwrap()).unwrap();
            let options = FormatOptions {
                round_threshold,
                max_rounds,
                ..FormatOptions::default()
            };
            deobfuscation_rounds(&mut ast, 0, &options).unwrap()
        };

        // Only the first inline changes anything, which is below the default.
        assert_eq!(rounds(3, 10), 1);
        // One changed pass keeps the rounds going until a round changes nothing.
        assert_eq!(rounds(1, 10), 2);
        assert_eq!(rounds(0, 4), 4);
    }
}
