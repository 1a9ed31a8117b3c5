//! Lexer for Cypheri source text.
//!
//! The lexer scans the source character by character, producing the token
//! stream consumed by the parser. Key behaviors:
//!
//! - **Maximal munch**: every multi-character operator (`+=`, `**`, `**=`,
//!   `//`, `<<=`, `::`, ...) is preferred over its prefixes, implemented by
//!   nested `match_char` probes after the first character.
//!
//! - **First error stops the scan**: unlike lexers that skip a bad byte and
//!   continue, this one returns the tokens produced so far together with
//!   the first [`SyntaxError`]. The parser refuses to run on such a result.
//!
//! - **Keyword folding**: identifiers are scanned first, then checked
//!   against the keyword table; non-keywords are interned into the shared
//!   [`NameTable`] and the token carries the ID.
//!
//! - **Location tracking**: tokens record the 1-indexed line/column of the
//!   first character of their lexeme.

use crate::errors::{SourceLocation, SyntaxError};
use crate::nametable::NameTable;
use crate::token::{Token, TokenKind, TokenizeResult};

/// Tokenize `source`, interning identifiers into `names`. Never fails to
/// return a result; a lexical fault is reported through
/// [`TokenizeResult::error`].
pub fn tokenize(source: &str, names: &mut NameTable) -> TokenizeResult {
    Lexer::new(source, names).run()
}

struct Lexer<'nt> {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    tokens: Vec<Token>,
    str_literals: Vec<String>,
    names: &'nt mut NameTable,
}

impl<'nt> Lexer<'nt> {
    fn new(source: &str, names: &'nt mut NameTable) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
            str_literals: Vec::new(),
            names,
        }
    }

    fn run(mut self) -> TokenizeResult {
        self.skip_whitespace();
        while !self.is_at_end() {
            let loc = self.location();
            let c = self.advance();
            if let Err(err) = self.scan_token(c, loc) {
                return TokenizeResult {
                    tokens: self.tokens,
                    str_literals: self.str_literals,
                    error: Some(err),
                };
            }
            self.skip_whitespace();
        }

        self.tokens.push(Token::new(TokenKind::Eof, self.location()));
        TokenizeResult {
            tokens: self.tokens,
            str_literals: self.str_literals,
            error: None,
        }
    }

    fn scan_token(&mut self, c: char, loc: SourceLocation) -> Result<(), SyntaxError> {
        let kind = match c {
            '+' => {
                if self.match_char('=') {
                    TokenKind::PlusEq
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if self.match_char('=') {
                    TokenKind::MinusEq
                } else {
                    TokenKind::Minus
                }
            }
            '*' => {
                if self.match_char('=') {
                    TokenKind::StarEq
                } else if self.match_char('*') {
                    if self.match_char('=') {
                        TokenKind::StarStarEq
                    } else {
                        TokenKind::StarStar
                    }
                } else {
                    TokenKind::Star
                }
            }
            '/' => {
                if self.match_char('=') {
                    TokenKind::SlashEq
                } else if self.match_char('/') {
                    if self.match_char('=') {
                        TokenKind::SlashSlashEq
                    } else {
                        TokenKind::SlashSlash
                    }
                } else {
                    TokenKind::Slash
                }
            }
            '%' => {
                if self.match_char('=') {
                    TokenKind::PercentEq
                } else {
                    TokenKind::Percent
                }
            }
            '^' => {
                if self.match_char('=') {
                    TokenKind::CaretEq
                } else {
                    TokenKind::Caret
                }
            }
            '~' => {
                if self.match_char('=') {
                    TokenKind::TildeEq
                } else {
                    TokenKind::Tilde
                }
            }
            '=' => {
                if self.match_char('=') {
                    TokenKind::EqEq
                } else {
                    TokenKind::Eq
                }
            }
            '!' => {
                if self.match_char('=') {
                    TokenKind::BangEq
                } else {
                    TokenKind::Bang
                }
            }
            '<' => {
                if self.match_char('=') {
                    TokenKind::LtEq
                } else if self.match_char('<') {
                    if self.match_char('=') {
                        TokenKind::LtLtEq
                    } else {
                        TokenKind::LtLt
                    }
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if self.match_char('=') {
                    TokenKind::GtEq
                } else if self.match_char('>') {
                    if self.match_char('=') {
                        TokenKind::GtGtEq
                    } else {
                        TokenKind::GtGt
                    }
                } else {
                    TokenKind::Gt
                }
            }
            '&' => {
                if self.match_char('&') {
                    TokenKind::AmpAmp
                } else if self.match_char('=') {
                    TokenKind::AmpEq
                } else {
                    TokenKind::Amp
                }
            }
            '|' => {
                if self.match_char('|') {
                    TokenKind::PipePipe
                } else if self.match_char('=') {
                    TokenKind::PipeEq
                } else {
                    TokenKind::Pipe
                }
            }
            ';' => TokenKind::Semicolon,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '.' => TokenKind::Dot,
            ':' => {
                if self.match_char(':') {
                    TokenKind::ColonColon
                } else {
                    return Err(SyntaxError::new("Expected '::'", loc));
                }
            }
            '"' => {
                let value = self.string();
                self.str_literals.push(value);
                TokenKind::Str(self.str_literals.len() - 1)
            }
            c if c.is_ascii_digit() => return self.integer(c, loc),
            c if c.is_ascii_alphabetic() || c == '_' => {
                let name = self.identifier(c);
                match keyword(&name) {
                    Some(kw) => kw,
                    None => TokenKind::Identifier(self.names.get_id_or_insert(&name)),
                }
            }
            _ => return Err(SyntaxError::new("Unexpected character", loc)),
        };

        self.tokens.push(Token::new(kind, loc));
        Ok(())
    }

    // ── Literal scanners ─────────────────────────────────────────────

    /// Scan a string literal. The opening quote is already consumed.
    ///
    /// Recognized escapes: \n \t \r \b \f \" \' \\. Any other escaped
    /// character is kept as-is with the backslash dropped. Hitting EOF
    /// before the closing quote hands back whatever accumulated.
    fn string(&mut self) -> String {
        // TODO: \0, \x and \u escapes
        let mut value = String::new();
        let mut escaped = false;
        while !self.is_at_end() {
            let c = self.advance();
            if escaped {
                match c {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    'b' => value.push('\u{0008}'),
                    'f' => value.push('\u{000C}'),
                    '"' => value.push('"'),
                    '\'' => value.push('\''),
                    '\\' => value.push('\\'),
                    other => value.push(other),
                }
                escaped = false;
            } else {
                match c {
                    '"' => return value,
                    '\\' => escaped = true,
                    other => value.push(other),
                }
            }
        }

        // unterminated string: the partial content stands
        value
    }

    /// Scan a decimal integer literal starting with `first`.
    fn integer(&mut self, first: char, loc: SourceLocation) -> Result<(), SyntaxError> {
        // TODO: hex, octal and binary numbers, as well as floats
        let mut value = (first as u8 - b'0') as u64;
        while !self.is_at_end() && self.peek().is_ascii_digit() {
            let digit = (self.peek() as u8 - b'0') as u64;
            value = match value.checked_mul(10).and_then(|v| v.checked_add(digit)) {
                Some(v) => v,
                None => return Err(SyntaxError::new("Integer literal overflow", loc)),
            };
            self.advance();
        }

        self.tokens.push(Token::new(TokenKind::Integer(value), loc));
        Ok(())
    }

    /// Scan the rest of an identifier whose first character is `first`.
    fn identifier(&mut self, first: char) -> String {
        let mut name = String::new();
        name.push(first);
        while !self.is_at_end() && (self.peek().is_ascii_alphanumeric() || self.peek() == '_') {
            name.push(self.advance());
        }
        name
    }

    // ── Character-level helpers ──────────────────────────────────────

    fn advance(&mut self) -> char {
        let c = self.chars[self.pos];
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            '\0'
        } else {
            self.chars[self.pos]
        }
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.chars[self.pos] != expected {
            return false;
        }
        self.advance();
        true
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column)
    }

    fn skip_whitespace(&mut self) {
        while !self.is_at_end() && self.peek().is_ascii_whitespace() {
            self.advance();
        }
    }
}

/// Exact, case-sensitive keyword table.
fn keyword(name: &str) -> Option<TokenKind> {
    let kind = match name {
        "Break" => TokenKind::Break,
        "Class" => TokenKind::Class,
        "Continue" => TokenKind::Continue,
        "Catch" => TokenKind::Catch,
        "Declare" => TokenKind::Declare,
        "Do" => TokenKind::Do,
        "End" => TokenKind::End,
        "Else" => TokenKind::Else,
        "ElseIf" => TokenKind::ElseIf,
        "Function" => TokenKind::Function,
        "For" => TokenKind::For,
        "FALSE" => TokenKind::False,
        "If" => TokenKind::If,
        "Import" => TokenKind::Import,
        "Lambda" => TokenKind::Lambda,
        "Module" => TokenKind::Module,
        "New" => TokenKind::New,
        "NULL" => TokenKind::Null,
        "Return" => TokenKind::Return,
        "While" => TokenKind::While,
        "Then" => TokenKind::Then,
        "Throw" => TokenKind::Throw,
        "Try" => TokenKind::Try,
        "Typeof" => TokenKind::Typeof,
        "TRUE" => TokenKind::True,
        "_Yield" => TokenKind::Yield,
        _ => return None,
    };
    Some(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<TokenKind> {
        let mut names = NameTable::new();
        let result = tokenize(source, &mut names);
        assert!(result.error.is_none(), "lexer error: {:?}", result.error);
        result.tokens.into_iter().map(|t| t.kind).collect()
    }

    fn lex_err(source: &str) -> SyntaxError {
        let mut names = NameTable::new();
        let result = tokenize(source, &mut names);
        result.error.expect("expected a lexer error")
    }

    #[test]
    fn test_empty_source() {
        assert_eq!(lex(""), vec![TokenKind::Eof]);
        assert_eq!(lex("  \t\n "), vec![TokenKind::Eof]);
    }

    #[test]
    fn test_maximal_munch() {
        assert_eq!(
            lex("+ += * ** **= / // //= < << <<= <= > >> >>= >="),
            vec![
                TokenKind::Plus,
                TokenKind::PlusEq,
                TokenKind::Star,
                TokenKind::StarStar,
                TokenKind::StarStarEq,
                TokenKind::Slash,
                TokenKind::SlashSlash,
                TokenKind::SlashSlashEq,
                TokenKind::Lt,
                TokenKind::LtLt,
                TokenKind::LtLtEq,
                TokenKind::LtEq,
                TokenKind::Gt,
                TokenKind::GtGt,
                TokenKind::GtGtEq,
                TokenKind::GtEq,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_munch_without_spaces() {
        // `**=` must win over `*` `*=` and over `**` `=`
        assert_eq!(
            lex("a**=b"),
            vec![
                TokenKind::Identifier(0),
                TokenKind::StarStarEq,
                TokenKind::Identifier(1),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_logic_and_bitwise_operators() {
        assert_eq!(
            lex("&& & &= || | |= ^ ^= ~ ~= ! != == ="),
            vec![
                TokenKind::AmpAmp,
                TokenKind::Amp,
                TokenKind::AmpEq,
                TokenKind::PipePipe,
                TokenKind::Pipe,
                TokenKind::PipeEq,
                TokenKind::Caret,
                TokenKind::CaretEq,
                TokenKind::Tilde,
                TokenKind::TildeEq,
                TokenKind::Bang,
                TokenKind::BangEq,
                TokenKind::EqEq,
                TokenKind::Eq,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_keywords_are_case_sensitive() {
        assert_eq!(
            lex("Function End TRUE FALSE NULL _Yield"),
            vec![
                TokenKind::Function,
                TokenKind::End,
                TokenKind::True,
                TokenKind::False,
                TokenKind::Null,
                TokenKind::Yield,
                TokenKind::Eof,
            ]
        );
        // lowercase forms are plain identifiers
        assert_eq!(
            lex("function true"),
            vec![
                TokenKind::Identifier(0),
                TokenKind::Identifier(1),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_identifiers_intern_into_the_table() {
        let mut names = NameTable::new();
        let result = tokenize("foo bar foo", &mut names);
        assert!(result.error.is_none());
        let kinds: Vec<_> = result.tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Identifier(0),
                TokenKind::Identifier(1),
                TokenKind::Identifier(0),
                TokenKind::Eof,
            ]
        );
        assert_eq!(names.get_name(0), "foo");
        assert_eq!(names.get_name(1), "bar");
    }

    #[test]
    fn test_integer_literals() {
        assert_eq!(
            lex("0 42 18446744073709551615"),
            vec![
                TokenKind::Integer(0),
                TokenKind::Integer(42),
                TokenKind::Integer(u64::MAX),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_integer_overflow() {
        // one past u64::MAX
        let err = lex_err("18446744073709551616");
        assert_eq!(err.message, "Integer literal overflow");
        assert_eq!(err.location, SourceLocation::new(1, 1));

        let err = lex_err("99999999999999999999999");
        assert_eq!(err.message, "Integer literal overflow");
    }

    #[test]
    fn test_string_escapes() {
        let mut names = NameTable::new();
        let result = tokenize(r#""a\nb""#, &mut names);
        assert!(result.error.is_none());
        assert_eq!(result.tokens[0].kind, TokenKind::Str(0));
        assert_eq!(result.str_literals[0], "a\nb");

        let result = tokenize(r#""\t\r\b\f\"\'\\""#, &mut names);
        assert_eq!(result.str_literals[0], "\t\r\u{0008}\u{000C}\"'\\");
    }

    #[test]
    fn test_unknown_escape_drops_backslash() {
        let mut names = NameTable::new();
        let result = tokenize(r#""\q\z""#, &mut names);
        assert!(result.error.is_none());
        assert_eq!(result.str_literals[0], "qz");
    }

    #[test]
    fn test_unterminated_string_keeps_partial_content() {
        let mut names = NameTable::new();
        let result = tokenize("\"abc", &mut names);
        assert!(result.error.is_none());
        assert_eq!(result.tokens[0].kind, TokenKind::Str(0));
        assert_eq!(result.str_literals[0], "abc");
        assert_eq!(result.tokens[1].kind, TokenKind::Eof);
    }

    #[test]
    fn test_lone_colon_is_an_error() {
        let err = lex_err("a : b");
        assert_eq!(err.message, "Expected '::'");
        assert_eq!(err.location, SourceLocation::new(1, 3));

        assert_eq!(
            lex("a::b"),
            vec![
                TokenKind::Identifier(0),
                TokenKind::ColonColon,
                TokenKind::Identifier(1),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unexpected_character() {
        let err = lex_err("Declare x = @;");
        assert_eq!(err.message, "Unexpected character");
        assert_eq!(err.location, SourceLocation::new(1, 13));
    }

    #[test]
    fn test_error_keeps_tokens_scanned_so_far() {
        let mut names = NameTable::new();
        let result = tokenize("a + @", &mut names);
        assert!(result.error.is_some());
        let kinds: Vec<_> = result.tokens.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![TokenKind::Identifier(0), TokenKind::Plus]);
    }

    #[test]
    fn test_locations() {
        let mut names = NameTable::new();
        let result = tokenize("ab +\n  cd", &mut names);
        assert!(result.error.is_none());
        let locs: Vec<_> = result.tokens.iter().map(|t| (t.loc.line, t.loc.column)).collect();
        assert_eq!(locs, vec![(1, 1), (1, 4), (2, 3), (2, 5)]);
    }

    #[test]
    fn test_single_eof_terminator() {
        let kinds = lex("Function f ( )");
        assert_eq!(kinds.last(), Some(&TokenKind::Eof));
        let eofs = kinds.iter().filter(|k| **k == TokenKind::Eof).count();
        assert_eq!(eofs, 1);
    }

    #[test]
    fn test_utf8_passes_through_strings() {
        let mut names = NameTable::new();
        let result = tokenize("\"héllo ≤\"", &mut names);
        assert!(result.error.is_none());
        assert_eq!(result.str_literals[0], "héllo ≤");
    }
}
