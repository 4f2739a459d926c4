//! S-expression tokenizer.
//!
//! Produces the flat token stream the reader consumes: bracket
//! operators, quoted strings (plain and `r"…"` raw), char literals, and
//! name/number atoms. Tokens keep their raw text; classification happens
//! in the reader's shorthand tables.

use crosswind_base::{CompileError, ErrorKind, Result, SrcLoc, Sym};

/// A raw token plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub loc: SrcLoc,
}

/// Cursor over the token list with a remembered last location for
/// truncation errors.
#[derive(Debug)]
pub struct TokenStream {
    tokens: Vec<Token>,
    pos: usize,
    last_loc: SrcLoc,
}

impl TokenStream {
    pub fn new(tokens: Vec<Token>, file: Sym) -> Self {
        Self {
            tokens,
            pos: 0,
            last_loc: SrcLoc::new(file, 1),
        }
    }

    /// Next token, or `None` at a clean end of input.
    pub fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned()?;
        self.pos += 1;
        self.last_loc = tok.loc;
        Some(tok)
    }

    /// Next token, where running out mid-node is a parse error.
    pub fn next_required(&mut self) -> Result<Token> {
        self.next().ok_or_else(|| {
            CompileError::new(ErrorKind::Parse, self.last_loc, "truncated file")
        })
    }

    /// Location of the most recently produced token.
    pub fn loc(&self) -> SrcLoc {
        self.last_loc
    }
}

fn is_atom_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | '[' | ']' | '"' | '\'')
}

/// Tokenizes a whole source file. `file` is the interned path used in
/// every emitted [`SrcLoc`].
pub fn tokenize(src: &str, file: Sym) -> Result<TokenStream> {
    let mut tokens = Vec::new();
    let mut line: u32 = 1;
    let mut chars = src.chars().peekable();

    while let Some(c) = chars.next() {
        let loc = SrcLoc::new(file, line);
        match c {
            '\n' => line += 1,
            _ if c.is_whitespace() => {}
            '(' | ')' | '[' | ']' => tokens.push(Token {
                text: c.to_string(),
                loc,
            }),
            '"' => tokens.push(Token {
                text: scan_quoted(&mut chars, '"', loc, String::from("\""))?,
                loc,
            }),
            '\'' => tokens.push(Token {
                text: scan_quoted(&mut chars, '\'', loc, String::from("'"))?,
                loc,
            }),
            'r' if chars.peek() == Some(&'"') => {
                chars.next();
                tokens.push(Token {
                    text: scan_quoted(&mut chars, '"', loc, String::from("r\""))?,
                    loc,
                });
            }
            _ => {
                let mut text = String::new();
                text.push(c);
                while let Some(&next) = chars.peek() {
                    if !is_atom_char(next) {
                        break;
                    }
                    text.push(next);
                    chars.next();
                }
                tokens.push(Token { text, loc });
            }
        }
    }

    Ok(TokenStream::new(tokens, file))
}

/// Scans the remainder of a quoted token. `\` escapes the next
/// character; a newline or end of input before the closing quote is a
/// parse error.
fn scan_quoted(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    quote: char,
    loc: SrcLoc,
    mut text: String,
) -> Result<String> {
    loop {
        match chars.next() {
            None | Some('\n') => {
                return Err(CompileError::new(
                    ErrorKind::Parse,
                    loc,
                    format!("unterminated {} literal", if quote == '"' { "string" } else { "char" }),
                ))
            }
            Some('\\') => {
                text.push('\\');
                match chars.next() {
                    None | Some('\n') => {
                        return Err(CompileError::new(
                            ErrorKind::Parse,
                            loc,
                            "unterminated escape sequence",
                        ))
                    }
                    Some(esc) => text.push(esc),
                }
            }
            Some(c) => {
                text.push(c);
                if c == quote {
                    return Ok(text);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(src: &str) -> Vec<String> {
        let mut stream = tokenize(src, Sym::NONE).unwrap();
        let mut out = Vec::new();
        while let Some(tok) = stream.next() {
            out.push(tok.text);
        }
        out
    }

    #[test]
    fn brackets_and_atoms_split() {
        assert_eq!(
            texts("(let mut x u32 0)"),
            vec!["(", "let", "mut", "x", "u32", "0", ")"]
        );
    }

    #[test]
    fn nested_brackets_are_single_tokens() {
        assert_eq!(texts("[a [b]]"), vec!["[", "a", "[", "b", "]", "]"]);
    }

    #[test]
    fn strings_keep_quotes_and_escapes() {
        assert_eq!(texts(r#"(x "a\"b")"#), vec!["(", "x", "\"a\\\"b\"", ")"]);
    }

    #[test]
    fn raw_strings_keep_prefix() {
        assert_eq!(texts(r#"r"\n""#), vec!["r\"\\n\""]);
    }

    #[test]
    fn char_literals_tokenize_whole() {
        assert_eq!(texts(r"'a' '\n'"), vec!["'a'", r"'\n'"]);
    }

    #[test]
    fn line_numbers_advance() {
        let mut stream = tokenize("a\nb\n\nc", Sym::NONE).unwrap();
        assert_eq!(stream.next().unwrap().loc.line, 1);
        assert_eq!(stream.next().unwrap().loc.line, 2);
        assert_eq!(stream.next().unwrap().loc.line, 4);
    }

    #[test]
    fn unterminated_string_is_parse_error() {
        let err = tokenize("\"abc", Sym::NONE).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn qualified_names_stay_joined() {
        assert_eq!(texts("os::open"), vec!["os::open"]);
    }

    #[test]
    fn next_required_reports_truncation() {
        let mut stream = tokenize("(", Sym::NONE).unwrap();
        stream.next().unwrap();
        let err = stream.next_required().unwrap_err();
        assert!(err.message.contains("truncated"));
    }
}
