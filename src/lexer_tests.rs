//! Tokenizer tests.

#[cfg(test)]
mod tests {
    use crate::error::FormatError;
    use crate::lexer::{long_bracket_content, numeral_value, string_value, tokenize, LineIndex, Token};
    use pretty_assertions::assert_eq;

    fn tokens(source: &str) -> Vec<Token> {
        tokenize(source).unwrap().into_iter().map(|lexeme| lexeme.token).collect()
    }

    #[test]
    fn test_statement_tokens() {
        assert_eq!(
            tokens("local x = y.z:w(1, ...)"),
            vec![
                Token::Local,
                Token::Name,
                Token::Eq,
                Token::Name,
                Token::Dot,
                Token::Name,
                Token::Colon,
                Token::Name,
                Token::LParen,
                Token::Number,
                Token::Comma,
                Token::Ellipsis,
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_every_operator() {
        assert_eq!(
            tokens("+ - * / // % ^ # & ~ | << >> .. == ~= <= >= < > = :: ;"),
            vec![
                Token::Plus,
                Token::Minus,
                Token::Star,
                Token::Slash,
                Token::DoubleSlash,
                Token::Percent,
                Token::Caret,
                Token::Hash,
                Token::Amp,
                Token::Tilde,
                Token::Pipe,
                Token::Shl,
                Token::Shr,
                Token::DotDot,
                Token::EqEq,
                Token::NotEq,
                Token::LtEq,
                Token::GtEq,
                Token::Lt,
                Token::Gt,
                Token::Eq,
                Token::DoubleColon,
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn test_operator_spellings() {
        let source = "+ - * / // % ^ & ~ | << >> .. == ~= <= >= < > and or";
        for lexeme in tokenize(source).unwrap() {
            let spelling = &source[lexeme.span.clone()];
            assert_eq!(lexeme.token.binary_operator(), Some(spelling));
        }
        for (source, token) in [("not", Token::Not), ("-", Token::Minus), ("~", Token::Tilde), ("#", Token::Hash)] {
            assert_eq!(token.unary_operator(), Some(source));
        }
        assert_eq!(Token::Eq.binary_operator(), None);
        assert_eq!(Token::Plus.unary_operator(), None);
    }

    #[test]
    fn test_keywords_are_not_names() {
        assert_eq!(
            tokens("andy and nil nilx"),
            vec![Token::Name, Token::And, Token::Nil, Token::Name]
        );
    }

    #[test]
    fn test_long_strings_and_comments() {
        let source = "x = [==[ a ]] b ]==] -- line\n--[[ block\n ]] y";
        let lexemes = tokenize(source).unwrap();
        let kinds: Vec<Token> = lexemes.iter().map(|lexeme| lexeme.token).collect();
        assert_eq!(
            kinds,
            vec![Token::Name, Token::Eq, Token::LongString, Token::Comment, Token::Comment, Token::Name]
        );
        assert_eq!(&source[lexemes[2].span.clone()], "[==[ a ]] b ]==]");
        assert_eq!(&source[lexemes[3].span.clone()], "-- line");
        assert_eq!(&source[lexemes[4].span.clone()], "--[[ block\n ]]");
    }

    #[test]
    fn test_long_bracket_content_drops_first_newline() {
        assert_eq!(long_bracket_content("[[\nhello]]"), "hello");
        assert_eq!(long_bracket_content("[=[a]]b]=]"), "a]]b");
        assert_eq!(long_bracket_content("[[]]"), "");
    }

    #[test]
    fn test_numerals() {
        assert_eq!(tokens("3 3.5 .5 1e10 0x1F 0x1p4 0xA.8"), vec![Token::Number; 7]);
        assert_eq!(numeral_value("3"), Some(3.0));
        assert_eq!(numeral_value(".5"), Some(0.5));
        assert_eq!(numeral_value("1e2"), Some(100.0));
        assert_eq!(numeral_value("0x1F"), Some(31.0));
        assert_eq!(numeral_value("0x1p4"), Some(16.0));
        assert_eq!(numeral_value("0xA.8"), Some(10.5));
        assert_eq!(numeral_value("0x"), None);
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(string_value(r#""a\n\65\x41\u{48}""#).unwrap(), "a\nAAH");
        assert_eq!(string_value(r"'it\'s \\ ok'").unwrap(), "it's \\ ok");
        assert_eq!(string_value("'a\\z   \n  b'").unwrap(), "ab");
        assert_eq!(string_value(r"'\255'").unwrap(), "\u{F7FF}");
        assert!(string_value(r"'\q'").is_err());
        assert!(string_value(r"'\300'").is_err());
    }

    #[test]
    fn test_shebang_is_skipped() {
        assert_eq!(tokens("#!/usr/bin/lua\nreturn"), vec![Token::Return]);
    }

    #[test]
    fn test_bad_symbol_reports_position() {
        let err = tokenize("x = 1\ny = $").unwrap_err();
        match err {
            FormatError::Syntax { line, column, .. } => assert_eq!((line, column), (2, 4)),
            other => panic!("expected a syntax error, got {other:?}"),
        }
    }

    #[test]
    fn test_line_index_positions() {
        let source = "ab\ncd\n\nef";
        let index = LineIndex::new(source);
        let at = |offset| {
            let position = index.position(source, offset);
            (position.line, position.column)
        };
        assert_eq!(at(0), (1, 0));
        assert_eq!(at(4), (2, 1));
        assert_eq!(at(6), (3, 0));
        assert_eq!(at(7), (4, 0));
    }
}
