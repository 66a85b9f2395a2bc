pub mod tokens;

pub use tokens::{Loc, Located, Token};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub message: String,
    pub loc: Loc,
}

/// Tokenizes an indentation-sensitive, line-oriented subset of YAML.
///
/// Unlike a classic char-at-a-time scanner this walks whole lines: a blank
/// line or a comment-only line contributes nothing, and every other line
/// contributes an `Indent(n)` marker followed by the line's own tokens. The
/// parser never needs to chase newline tokens to find a line boundary.
pub struct Tokenizer<'a> {
    source: &'a str,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { source }
    }

    pub fn tokenize(&self) -> Result<Vec<Located<'a>>, LexError> {
        let mut out = Vec::new();
        for (line_no, raw_line) in self.source.lines().enumerate() {
            let line = strip_comment(raw_line);
            if line.trim().is_empty() {
                continue;
            }
            let indent = line.len() - line.trim_start_matches(' ').len();
            let loc = Loc { line: line_no + 1, col: 1 };
            out.push(Located { token: Token::Indent(indent), loc });
            tokenize_line(&line[indent..], line_no + 1, indent + 1, &mut out)?;
        }
        out.push(Located {
            token: Token::Eof,
            loc: Loc { line: self.source.lines().count() + 1, col: 1 },
        });
        Ok(out)
    }
}

fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    for (i, ch) in line.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '#' if !in_quotes => return &line[..i],
            _ => {}
        }
    }
    line
}

fn tokenize_line<'a>(
    mut rest: &'a str,
    line_no: usize,
    mut col: usize,
    out: &mut Vec<Located<'a>>,
) -> Result<(), LexError> {
    loop {
        let trimmed = rest.trim_start_matches(' ');
        col += rest.len() - trimmed.len();
        rest = trimmed;
        if rest.is_empty() {
            return Ok(());
        }
        let loc = Loc { line: line_no, col };
        let ch = rest.as_bytes()[0] as char;
        match ch {
            '-' if rest.len() == 1 || rest.as_bytes()[1] == b' ' => {
                out.push(Located { token: Token::Dash, loc });
                rest = &rest[1..];
                col += 1;
            }
            ':' => {
                out.push(Located { token: Token::Colon, loc });
                rest = &rest[1..];
                col += 1;
            }
            ',' => {
                out.push(Located { token: Token::Comma, loc });
                rest = &rest[1..];
                col += 1;
            }
            '[' => {
                out.push(Located { token: Token::OpenBracket, loc });
                rest = &rest[1..];
                col += 1;
            }
            ']' => {
                out.push(Located { token: Token::CloseBracket, loc });
                rest = &rest[1..];
                col += 1;
            }
            '{' => {
                out.push(Located { token: Token::OpenBrace, loc });
                rest = &rest[1..];
                col += 1;
            }
            '}' => {
                out.push(Located { token: Token::CloseBrace, loc });
                rest = &rest[1..];
                col += 1;
            }
            '"' => {
                let body = &rest[1..];
                let end = body.find('"').ok_or(LexError {
                    message: "unterminated string".to_string(),
                    loc,
                })?;
                out.push(Located { token: Token::Scalar(&body[..end]), loc });
                col += end + 2;
                rest = &body[end + 1..];
            }
            _ => {
                let end = rest
                    .find([':', ',', '[', ']', '{', '}'])
                    .unwrap_or(rest.len());
                let word = rest[..end].trim_end_matches(' ');
                if word.is_empty() {
                    return Err(LexError {
                        message: format!("unexpected character '{}'", ch),
                        loc,
                    });
                }
                out.push(Located { token: Token::Identifier(word), loc });
                col += end;
                rest = &rest[end..];
            }
        }
    }
}
