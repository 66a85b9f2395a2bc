pub mod from_yaml;
pub mod lexer;

pub use from_yaml::FromYaml;

use std::collections::BTreeMap;
use std::fmt;

use lexer::{LexError, Loc, Located, Token, Tokenizer};

/// Errors produced while lexing, parsing, or converting a document into a
/// typed value.
#[derive(Debug, Clone)]
pub enum YamlError {
    Lex(LexError),
    Parse { message: String, loc: Loc },
    Generic(String),
}

impl fmt::Display for YamlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            YamlError::Lex(e) => write!(f, "{}:{}: {}", e.loc.line, e.loc.col, e.message),
            YamlError::Parse { message, loc } => {
                write!(f, "{}:{}: {}", loc.line, loc.col, message)
            }
            YamlError::Generic(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for YamlError {}

impl From<LexError> for YamlError {
    fn from(e: LexError) -> Self {
        YamlError::Lex(e)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum YamlValue<'a> {
    Map(BTreeMap<&'a str, YamlValue<'a>>),
    List(Vec<YamlValue<'a>>),
    Scalar(&'a str),
}

impl<'a> YamlValue<'a> {
    pub fn get(&self, key: &str) -> Option<&YamlValue<'a>> {
        match self {
            YamlValue::Map(m) => m.get(key),
            _ => None,
        }
    }

    pub fn index(&self, i: usize) -> Option<&YamlValue<'a>> {
        match self {
            YamlValue::List(l) => l.get(i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&'a str> {
        match self {
            YamlValue::Scalar(s) => Some(s),
            _ => None,
        }
    }
}

/// Recursive-descent parser over a flat, pre-tokenized stream.
///
/// Blocks (maps and sequences) are recognized by comparing the `Indent`
/// marker at the start of each line against the indent the current block
/// opened at: a deeper indent starts a nested block, an equal indent is a
/// sibling entry, and a shallower indent ends the block without consuming
/// the token, so the caller one level up can see it.
pub struct Parser<'a> {
    tokens: Vec<Located<'a>>,
    pos: usize,
}

const NESTED_INDENT_STEP: usize = 2;

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Result<Self, YamlError> {
        let tokens = Tokenizer::new(source).tokenize()?;
        Ok(Self { tokens, pos: 0 })
    }

    pub fn parse(&mut self) -> Result<YamlValue<'a>, YamlError> {
        match self.tok() {
            Token::Indent(n) => {
                let indent = *n;
                self.bump();
                self.parse_block(indent)
            }
            Token::Eof => Ok(YamlValue::Map(BTreeMap::new())),
            other => Err(self.err(format!("expected start of document, found {:?}", other))),
        }
    }

    fn tok(&self) -> &Token<'a> {
        &self.tokens[self.pos].token
    }

    fn loc(&self) -> Loc {
        self.tokens[self.pos].loc
    }

    fn bump(&mut self) -> Token<'a> {
        let t = self.tokens[self.pos].token.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn next_is_colon(&self) -> bool {
        self.tokens
            .get(self.pos + 1)
            .map(|l| l.token == Token::Colon)
            .unwrap_or(false)
    }

    fn err(&self, message: impl Into<String>) -> YamlError {
        YamlError::Parse { message: message.into(), loc: self.loc() }
    }

    fn parse_block(&mut self, indent: usize) -> Result<YamlValue<'a>, YamlError> {
        match self.tok() {
            Token::Dash => self.parse_block_list(indent),
            Token::Identifier(_) if self.next_is_colon() => self.parse_block_map(indent),
            _ => self.parse_inline_value(),
        }
    }

    fn parse_block_list(&mut self, indent: usize) -> Result<YamlValue<'a>, YamlError> {
        let mut items = Vec::new();
        loop {
            if !matches!(self.tok(), Token::Dash) {
                break;
            }
            self.bump();
            items.push(self.parse_item_value(indent)?);
            if !self.consume_indent_matching(indent) {
                break;
            }
        }
        Ok(YamlValue::List(items))
    }

    fn parse_block_map(&mut self, indent: usize) -> Result<YamlValue<'a>, YamlError> {
        let mut map = BTreeMap::new();
        loop {
            let key = match self.tok() {
                Token::Identifier(s) => *s,
                _ => break,
            };
            self.bump();
            if !matches!(self.tok(), Token::Colon) {
                return Err(self.err(format!("expected ':' after key '{}'", key)));
            }
            self.bump();
            let value = self.parse_item_value(indent)?;
            map.insert(key, value);
            if !self.consume_indent_matching(indent) {
                break;
            }
        }
        Ok(YamlValue::Map(map))
    }

    /// Parses what follows a `key:` or `- `: either an inline scalar/flow
    /// value on the same line, or a nested block starting on the next line.
    fn parse_item_value(&mut self, parent_indent: usize) -> Result<YamlValue<'a>, YamlError> {
        if let Token::Identifier(_) = self.tok() {
            if self.next_is_colon() {
                return self.parse_block_map(parent_indent + NESTED_INDENT_STEP);
            }
        }
        if let Token::Indent(n) = self.tok() {
            let n = *n;
            if n <= parent_indent {
                return Ok(YamlValue::Scalar(""));
            }
            self.bump();
            return self.parse_block(n);
        }
        self.parse_inline_value()
    }

    fn consume_indent_matching(&mut self, indent: usize) -> bool {
        match self.tok() {
            Token::Indent(n) if *n == indent => {
                self.bump();
                true
            }
            _ => false,
        }
    }

    fn parse_inline_value(&mut self) -> Result<YamlValue<'a>, YamlError> {
        match self.tok().clone() {
            Token::OpenBracket => self.parse_flow_list(),
            Token::OpenBrace => self.parse_flow_map(),
            Token::Identifier(s) => {
                self.bump();
                Ok(YamlValue::Scalar(s))
            }
            Token::Scalar(s) => {
                self.bump();
                Ok(YamlValue::Scalar(s))
            }
            other => Err(self.err(format!("unexpected token {:?}", other))),
        }
    }

    fn parse_flow_list(&mut self) -> Result<YamlValue<'a>, YamlError> {
        self.bump();
        let mut items = Vec::new();
        loop {
            if matches!(self.tok(), Token::CloseBracket) {
                self.bump();
                break;
            }
            items.push(self.parse_inline_value()?);
            match self.tok() {
                Token::Comma => {
                    self.bump();
                }
                Token::CloseBracket => {
                    self.bump();
                    break;
                }
                other => return Err(self.err(format!("expected ',' or ']', found {:?}", other))),
            }
        }
        Ok(YamlValue::List(items))
    }

    fn parse_flow_map(&mut self) -> Result<YamlValue<'a>, YamlError> {
        self.bump();
        let mut map = BTreeMap::new();
        loop {
            if matches!(self.tok(), Token::CloseBrace) {
                self.bump();
                break;
            }
            let key = match self.tok() {
                Token::Identifier(s) => *s,
                other => return Err(self.err(format!("expected key, found {:?}", other))),
            };
            self.bump();
            if !matches!(self.tok(), Token::Colon) {
                return Err(self.err("expected ':'"));
            }
            self.bump();
            let value = self.parse_inline_value()?;
            map.insert(key, value);
            match self.tok() {
                Token::Comma => {
                    self.bump();
                }
                Token::CloseBrace => {
                    self.bump();
                    break;
                }
                other => {
                    return Err(self.err(format!("expected ',' or '}}', found {:?}", other)))
                }
            }
        }
        Ok(YamlValue::Map(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_map() {
        let src = "port: 8080\nhost: 127.0.0.1\n";
        let mut parser = Parser::new(src).unwrap();
        let value = parser.parse().unwrap();
        assert_eq!(value.get("port").and_then(|v| v.as_str()), Some("8080"));
        assert_eq!(value.get("host").and_then(|v| v.as_str()), Some("127.0.0.1"));
    }

    #[test]
    fn parses_nested_list_of_maps() {
        let src = "routes:\n  - path: /api\n    root: ./www\n  - path: /static\n    root: ./assets\n";
        let mut parser = Parser::new(src).unwrap();
        let value = parser.parse().unwrap();
        let routes = value.get("routes").unwrap();
        assert_eq!(routes.index(0).unwrap().get("path").and_then(|v| v.as_str()), Some("/api"));
        assert_eq!(routes.index(1).unwrap().get("root").and_then(|v| v.as_str()), Some("./assets"));
    }

    #[test]
    fn parses_inline_flow_list() {
        let src = "methods: [GET, POST]\n";
        let mut parser = Parser::new(src).unwrap();
        let value = parser.parse().unwrap();
        let methods = value.get("methods").unwrap();
        assert_eq!(methods.index(0).and_then(|v| v.as_str()), Some("GET"));
        assert_eq!(methods.index(1).and_then(|v| v.as_str()), Some("POST"));
    }

    #[test]
    fn strips_comments_and_blank_lines() {
        let src = "# a comment\nport: 8080\n\n# trailing\n";
        let mut parser = Parser::new(src).unwrap();
        let value = parser.parse().unwrap();
        assert_eq!(value.get("port").and_then(|v| v.as_str()), Some("8080"));
    }
}
