use super::error::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tok {
    Num(f64),
    Str(String),
    Template(Vec<TplPart>),
    Ident(String),
    Punct(&'static str),
    Eof,
}

/// Raw template literal pieces. Chunks always alternate starting and ending
/// with a (possibly empty) `Str`, so `Expr` parts have literal neighbors.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TplPart {
    Str(String),
    Expr(String),
}

#[derive(Debug, Clone)]
pub(crate) struct Token {
    pub tok: Tok,
    pub line: u32,
    pub col: u32,
}

/// Multi-character punctuators, longest first so prefixes never shadow them.
const PUNCTS: &[&str] = &[
    "===", "!==", ">>>", "...", "**", "=>", "==", "!=", "<=", ">=", "&&", "||", "++", "--", "+=",
    "-=", "*=", "/=", "%=", "<<", ">>", "{", "}", "(", ")", "[", "]", ";", ",", "<", ">", "+",
    "-", "*", "/", "%", "&", "|", "^", "~", "!", "?", ":", "=", ".",
];

pub(crate) fn lex(source: &str) -> Result<Vec<Token>, ParseError> {
    Lexer::new(source).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn run(mut self) -> Result<Vec<Token>, ParseError> {
        let mut out = Vec::new();
        loop {
            self.skip_trivia()?;
            let (line, col) = (self.line, self.col);
            let Some(c) = self.peek() else {
                out.push(Token {
                    tok: Tok::Eof,
                    line,
                    col,
                });
                return Ok(out);
            };

            let tok = if is_ident_start(c) {
                Tok::Ident(self.read_ident())
            } else if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) {
                Tok::Num(self.read_number()?)
            } else if c == '"' || c == '\'' {
                Tok::Str(self.read_string(c)?)
            } else if c == '`' {
                Tok::Template(self.read_template()?)
            } else {
                Tok::Punct(self.read_punct()?)
            };
            out.push(Token { tok, line, col });
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn error(&self, msg: impl Into<String>) -> ParseError {
        ParseError::new(msg, self.line, self.col)
    }

    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    self.bump();
                    self.bump();
                    loop {
                        match self.peek() {
                            None => return Err(self.error("unterminated block comment")),
                            Some('*') if self.peek_at(1) == Some('/') => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            _ => {
                                self.bump();
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn read_ident(&mut self) -> String {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if is_ident_part(c) {
                s.push(c);
                self.bump();
            } else {
                break;
            }
        }
        s
    }

    fn read_number(&mut self) -> Result<f64, ParseError> {
        let mut s = String::new();
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X')) {
            self.bump();
            self.bump();
            while let Some(c) = self.peek() {
                if c.is_ascii_hexdigit() {
                    s.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
            if s.is_empty() {
                return Err(self.error("invalid hexadecimal literal"));
            }
            let n = u64::from_str_radix(&s, 16)
                .map_err(|_| self.error("hexadecimal literal out of range"))?;
            return Ok(n as f64);
        }

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                s.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if self.peek() == Some('.') {
            s.push('.');
            self.bump();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    s.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            s.push('e');
            self.bump();
            if matches!(self.peek(), Some('+') | Some('-')) {
                s.push(self.bump().expect("sign present"));
            }
            let mut digits = false;
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    s.push(c);
                    self.bump();
                    digits = true;
                } else {
                    break;
                }
            }
            if !digits {
                return Err(self.error("missing exponent digits"));
            }
        }
        if self.peek().is_some_and(is_ident_start) {
            return Err(self.error("identifier starts immediately after numeric literal"));
        }
        s.parse::<f64>()
            .map_err(|_| self.error("invalid numeric literal"))
    }

    fn read_escape(&mut self, out: &mut String) -> Result<(), ParseError> {
        let Some(esc) = self.bump() else {
            return Err(self.error("unterminated escape sequence"));
        };
        match esc {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' => out.push('\0'),
            '\n' => {} // line continuation
            'x' => {
                let hi = self.bump();
                let lo = self.bump();
                let (Some(hi), Some(lo)) = (hi, lo) else {
                    return Err(self.error("unterminated \\x escape"));
                };
                let code = u32::from_str_radix(&format!("{hi}{lo}"), 16)
                    .map_err(|_| self.error("invalid \\x escape"))?;
                out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
            'u' => {
                let mut hex = String::new();
                for _ in 0..4 {
                    let Some(c) = self.bump() else {
                        return Err(self.error("unterminated \\u escape"));
                    };
                    hex.push(c);
                }
                let code =
                    u32::from_str_radix(&hex, 16).map_err(|_| self.error("invalid \\u escape"))?;
                out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
            other => out.push(other),
        }
        Ok(())
    }

    fn read_string(&mut self, quote: char) -> Result<String, ParseError> {
        self.bump();
        let mut s = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string literal")),
                Some('\n') => return Err(self.error("unterminated string literal")),
                Some(c) if c == quote => {
                    self.bump();
                    return Ok(s);
                }
                Some('\\') => {
                    self.bump();
                    self.read_escape(&mut s)?;
                }
                Some(c) => {
                    s.push(c);
                    self.bump();
                }
            }
        }
    }

    fn read_template(&mut self) -> Result<Vec<TplPart>, ParseError> {
        self.bump();
        let mut parts = Vec::new();
        let mut cur = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated template literal")),
                Some('`') => {
                    self.bump();
                    parts.push(TplPart::Str(cur));
                    return Ok(parts);
                }
                Some('\\') => {
                    self.bump();
                    self.read_escape(&mut cur)?;
                }
                Some('$') if self.peek_at(1) == Some('{') => {
                    self.bump();
                    self.bump();
                    parts.push(TplPart::Str(std::mem::take(&mut cur)));
                    parts.push(TplPart::Expr(self.read_template_expr()?));
                }
                Some(c) => {
                    cur.push(c);
                    self.bump();
                }
            }
        }
    }

    /// Consume the raw source of a `${...}` substitution up to its matching
    /// closing brace, skipping over nested braces and string literals.
    fn read_template_expr(&mut self) -> Result<String, ParseError> {
        let mut raw = String::new();
        let mut depth = 1u32;
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated template substitution")),
                Some('`') => return Err(self.error("nested template literals are not supported")),
                Some('{') => {
                    depth += 1;
                    raw.push('{');
                    self.bump();
                }
                Some('}') => {
                    depth -= 1;
                    self.bump();
                    if depth == 0 {
                        return Ok(raw);
                    }
                    raw.push('}');
                }
                Some(q @ ('"' | '\'')) => {
                    raw.push(q);
                    self.bump();
                    loop {
                        match self.peek() {
                            None | Some('\n') => {
                                return Err(self.error("unterminated string literal"))
                            }
                            Some('\\') => {
                                raw.push('\\');
                                self.bump();
                                if let Some(c) = self.bump() {
                                    raw.push(c);
                                }
                            }
                            Some(c) => {
                                raw.push(c);
                                self.bump();
                                if c == q {
                                    break;
                                }
                            }
                        }
                    }
                }
                Some(c) => {
                    raw.push(c);
                    self.bump();
                }
            }
        }
    }

    fn read_punct(&mut self) -> Result<&'static str, ParseError> {
        for p in PUNCTS {
            let mut matches = true;
            for (i, pc) in p.chars().enumerate() {
                if self.peek_at(i) != Some(pc) {
                    matches = false;
                    break;
                }
            }
            if matches {
                for _ in 0..p.len() {
                    self.bump();
                }
                return Ok(p);
            }
        }
        Err(self.error(format!(
            "unexpected character '{}'",
            self.peek().unwrap_or(' ')
        )))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Tok> {
        lex(src).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn idents_and_puncts() {
        assert_eq!(
            toks("a === b"),
            vec![
                Tok::Ident("a".into()),
                Tok::Punct("==="),
                Tok::Ident("b".into()),
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(toks("42"), vec![Tok::Num(42.0), Tok::Eof]);
        assert_eq!(toks("1.5e2"), vec![Tok::Num(150.0), Tok::Eof]);
        assert_eq!(toks("0xff"), vec![Tok::Num(255.0), Tok::Eof]);
        assert_eq!(toks(".5"), vec![Tok::Num(0.5), Tok::Eof]);
    }

    #[test]
    fn strings_with_escapes() {
        assert_eq!(
            toks(r#""a\nb" 'c\'d'"#),
            vec![
                Tok::Str("a\nb".into()),
                Tok::Str("c'd".into()),
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn comments_are_trivia() {
        assert_eq!(
            toks("a // line\n/* block\nstill */ b"),
            vec![Tok::Ident("a".into()), Tok::Ident("b".into()), Tok::Eof]
        );
    }

    #[test]
    fn template_parts_alternate() {
        assert_eq!(
            toks("`a${x}b`"),
            vec![
                Tok::Template(vec![
                    TplPart::Str("a".into()),
                    TplPart::Expr("x".into()),
                    TplPart::Str("b".into()),
                ]),
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn template_expr_skips_nested_braces() {
        assert_eq!(
            toks("`${ {a: 1}.a }`"),
            vec![
                Tok::Template(vec![
                    TplPart::Str(String::new()),
                    TplPart::Expr(" {a: 1}.a ".into()),
                    TplPart::Str(String::new()),
                ]),
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn arrow_and_spread_puncts() {
        assert_eq!(
            toks("=> ..."),
            vec![Tok::Punct("=>"), Tok::Punct("..."), Tok::Eof]
        );
    }

    #[test]
    fn line_numbers_track_newlines() {
        let tokens = lex("a\nb").unwrap();
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[1].line, 2);
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert!(lex("\"abc").is_err());
    }
}
