#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Loc {
    pub line: usize,
    pub col: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    Indent(usize),
    Identifier(&'a str),
    Scalar(&'a str),
    Dash,
    Colon,
    Comma,
    OpenBracket,
    CloseBracket,
    OpenBrace,
    CloseBrace,
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located<'a> {
    pub token: Token<'a>,
    pub loc: Loc,
}
