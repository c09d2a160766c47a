use crate::diagnostics::{Diagnostic, ErrorCode, Provenance, SourceSpan};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    True,
    False,
    None,
    And,
    Or,
    Not,
    Fa,
    Fo,
    For,
    In,
    To,
    Until,
    Step,
    Include,
    Exclude,
    Prepend,
    Append,
    Is,
    Can,
    As,
    Keyof,
    Import,
    Assert,
}

impl Keyword {
    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::True => "true",
            Keyword::False => "false",
            Keyword::None => "none",
            Keyword::And => "and",
            Keyword::Or => "or",
            Keyword::Not => "not",
            Keyword::Fa => "fa",
            Keyword::Fo => "fo",
            Keyword::For => "for",
            Keyword::In => "in",
            Keyword::To => "to",
            Keyword::Until => "until",
            Keyword::Step => "step",
            Keyword::Include => "include",
            Keyword::Exclude => "exclude",
            Keyword::Prepend => "prepend",
            Keyword::Append => "append",
            Keyword::Is => "is",
            Keyword::Can => "can",
            Keyword::As => "as",
            Keyword::Keyof => "keyof",
            Keyword::Import => "import",
            Keyword::Assert => "assert",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Number,
    String,
    Date,
    Unit,
    Name,
    Macro,
    Keyword(Keyword),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Assign,
    Question,
    Spread,
    Pipe,
    Shift,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Bang,
    BangEqual,
    EqualEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    AndAnd,
    OrOr,
    Unknown,
    Eof,
}

/// Coarse lexical class of a token, as consumed by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClass {
    Value,
    Operator,
    Macro,
    Grouping,
    Structural,
}

impl TokenKind {
    pub fn class(self) -> TokenClass {
        use TokenKind::*;
        match self {
            Number | String | Date | Unit | Name => TokenClass::Value,
            Keyword(kw) => match kw {
                self::Keyword::True | self::Keyword::False | self::Keyword::None => {
                    TokenClass::Value
                }
                self::Keyword::And
                | self::Keyword::Or
                | self::Keyword::Not
                | self::Keyword::In
                | self::Keyword::Is
                | self::Keyword::Can
                | self::Keyword::As
                | self::Keyword::Keyof => TokenClass::Operator,
                _ => TokenClass::Structural,
            },
            Macro => TokenClass::Macro,
            LParen | RParen | LBracket | RBracket | LBrace | RBrace => TokenClass::Grouping,
            Plus | Minus | Star | Slash | Percent | Caret | Bang | BangEqual | EqualEqual
            | Less | LessEqual | Greater | GreaterEqual | AndAnd | OrOr | Question | Pipe => {
                TokenClass::Operator
            }
            Comma | Colon | Assign | Spread | Shift | Unknown | Eof => TokenClass::Structural,
        }
    }

    pub fn describe(self) -> String {
        use TokenKind::*;
        match self {
            Number => "number".into(),
            String => "string".into(),
            Date => "date".into(),
            Unit => "unit".into(),
            Name => "name".into(),
            Macro => "macro".into(),
            Keyword(kw) => format!("`{}`", kw.as_str()),
            LParen => "`(`".into(),
            RParen => "`)`".into(),
            LBracket => "`[`".into(),
            RBracket => "`]`".into(),
            LBrace => "`{`".into(),
            RBrace => "`}`".into(),
            Comma => "`,`".into(),
            Colon => "`:`".into(),
            Assign => "`=`".into(),
            Question => "`?`".into(),
            Spread => "`...`".into(),
            Pipe => "`|>`".into(),
            Shift => "`<<`".into(),
            Plus => "`+`".into(),
            Minus => "`-`".into(),
            Star => "`*`".into(),
            Slash => "`/`".into(),
            Percent => "`%`".into(),
            Caret => "`^`".into(),
            Bang => "`!`".into(),
            BangEqual => "`!=`".into(),
            EqualEqual => "`==`".into(),
            Less => "`<`".into(),
            LessEqual => "`<=`".into(),
            Greater => "`>`".into(),
            GreaterEqual => "`>=`".into(),
            AndAnd => "`&&`".into(),
            OrOr => "`||`".into(),
            Unknown => "character".into(),
            Eof => "end of line".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub span: SourceSpan,
}

impl Token {
    pub fn class(&self) -> TokenClass {
        self.kind.class()
    }
}

pub struct Lexer<'a> {
    source: &'a str,
    chars: std::str::CharIndices<'a>,
    current: usize,
    peeked: Option<(usize, char)>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices(),
            current: 0,
            peeked: None,
        }
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        let next = if let Some((idx, ch)) = self.peeked.take() {
            Some((idx, ch))
        } else {
            self.chars.next()
        };
        if let Some((idx, ch)) = next {
            self.current = idx + ch.len_utf8();
            Some((idx, ch))
        } else {
            None
        }
    }

    fn peek(&mut self) -> Option<(usize, char)> {
        if self.peeked.is_none() {
            self.peeked = self.chars.next();
        }
        self.peeked
    }

    fn peek_char(&mut self) -> Option<char> {
        self.peek().map(|(_, ch)| ch)
    }

    fn peek_second(&self) -> Option<char> {
        let offset = self.peeked.map(|(idx, _)| idx).unwrap_or(self.current);
        self.source[offset..].chars().nth(1)
    }

    fn match_next(&mut self, expected: char) -> bool {
        if self.peek_char() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn simple_token(&self, start: usize, kind: TokenKind) -> Token {
        Token {
            kind,
            lexeme: self.source[start..self.current].to_string(),
            span: SourceSpan::new(start, self.current),
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, Diagnostic> {
        let mut tokens = Vec::new();
        while let Some((start, ch)) = self.bump() {
            if ch.is_whitespace() {
                continue;
            }
            if ch == '#' {
                while let Some(next) = self.peek_char() {
                    if next == '\n' {
                        break;
                    }
                    self.bump();
                }
                continue;
            }
            let token = match ch {
                '0'..='9' => self.number(start),
                '.' if self.peek_char().is_some_and(|c| c.is_ascii_digit()) => self.number(start),
                'a'..='z' | 'A'..='Z' | '_' => self.name(start),
                '"' => self.string(start, tokens.len())?,
                '`' => self.unit(start, tokens.len())?,
                '@' => self.date(start),
                '(' => self.simple_token(start, TokenKind::LParen),
                ')' => self.simple_token(start, TokenKind::RParen),
                '[' => self.simple_token(start, TokenKind::LBracket),
                ']' => self.simple_token(start, TokenKind::RBracket),
                '{' => self.simple_token(start, TokenKind::LBrace),
                '}' => self.simple_token(start, TokenKind::RBrace),
                ',' => self.simple_token(start, TokenKind::Comma),
                ':' => self.simple_token(start, TokenKind::Colon),
                '?' => self.simple_token(start, TokenKind::Question),
                '+' => self.simple_token(start, TokenKind::Plus),
                '-' => self.simple_token(start, TokenKind::Minus),
                '*' => self.simple_token(start, TokenKind::Star),
                '/' => self.simple_token(start, TokenKind::Slash),
                '%' => self.simple_token(start, TokenKind::Percent),
                '^' => self.simple_token(start, TokenKind::Caret),
                '.' => {
                    if self.peek_char() == Some('.') && self.peek_second() == Some('.') {
                        self.bump();
                        self.bump();
                        self.simple_token(start, TokenKind::Spread)
                    } else {
                        self.simple_token(start, TokenKind::Unknown)
                    }
                }
                '=' => {
                    if self.match_next('=') {
                        self.simple_token(start, TokenKind::EqualEqual)
                    } else {
                        self.simple_token(start, TokenKind::Assign)
                    }
                }
                '!' => {
                    if self.match_next('=') {
                        self.simple_token(start, TokenKind::BangEqual)
                    } else {
                        self.simple_token(start, TokenKind::Bang)
                    }
                }
                '&' => {
                    if self.match_next('&') {
                        self.simple_token(start, TokenKind::AndAnd)
                    } else {
                        self.simple_token(start, TokenKind::Unknown)
                    }
                }
                '|' => {
                    if self.match_next('|') {
                        self.simple_token(start, TokenKind::OrOr)
                    } else if self.match_next('>') {
                        self.simple_token(start, TokenKind::Pipe)
                    } else {
                        self.simple_token(start, TokenKind::Unknown)
                    }
                }
                '<' => {
                    if self.match_next('=') {
                        self.simple_token(start, TokenKind::LessEqual)
                    } else if self.match_next('<') {
                        self.simple_token(start, TokenKind::Shift)
                    } else {
                        self.simple_token(start, TokenKind::Less)
                    }
                }
                '>' => {
                    if self.match_next('=') {
                        self.simple_token(start, TokenKind::GreaterEqual)
                    } else {
                        self.simple_token(start, TokenKind::Greater)
                    }
                }
                _ => self.simple_token(start, TokenKind::Unknown),
            };
            tokens.push(token);
        }
        tokens.push(Token {
            kind: TokenKind::Eof,
            lexeme: String::new(),
            span: SourceSpan::new(self.source.len(), self.source.len()),
        });
        Ok(tokens)
    }

    fn number(&mut self, start: usize) -> Token {
        let mut seen_dot = self.source[start..self.current].ends_with('.');
        while let Some(ch) = self.peek_char() {
            if ch.is_ascii_digit() {
                self.bump();
            } else if ch == '.'
                && !seen_dot
                && self.peek_second().is_some_and(|c| c.is_ascii_digit())
            {
                seen_dot = true;
                self.bump();
            } else {
                break;
            }
        }
        if matches!(self.peek_char(), Some('e') | Some('E')) {
            let second = self.peek_second();
            let exponent_follows = match second {
                Some(c) if c.is_ascii_digit() => true,
                Some('+') | Some('-') => {
                    let offset = self.peeked.map(|(idx, _)| idx).unwrap_or(self.current);
                    self.source[offset..]
                        .chars()
                        .nth(2)
                        .is_some_and(|c| c.is_ascii_digit())
                }
                _ => false,
            };
            if exponent_follows {
                self.bump();
                if matches!(self.peek_char(), Some('+') | Some('-')) {
                    self.bump();
                }
                while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                    self.bump();
                }
            }
        }
        self.simple_token(start, TokenKind::Number)
    }

    fn name(&mut self, start: usize) -> Token {
        loop {
            match self.peek_char() {
                Some(ch) if ch.is_ascii_alphanumeric() || ch == '_' => {
                    self.bump();
                }
                Some('.')
                    if self
                        .peek_second()
                        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_') =>
                {
                    self.bump();
                }
                _ => break,
            }
        }
        let ident = &self.source[start..self.current];
        if self.peek_char() == Some('!') && self.peek_second() != Some('=') {
            self.bump();
            return Token {
                kind: TokenKind::Macro,
                lexeme: ident.to_string(),
                span: SourceSpan::new(start, self.current),
            };
        }
        let kind = keyword_for(ident).unwrap_or(TokenKind::Name);
        self.simple_token(start, kind)
    }

    fn string(&mut self, start: usize, index: usize) -> Result<Token, Diagnostic> {
        let mut value = String::new();
        loop {
            match self.bump() {
                Some((_, '"')) => break,
                Some((_, '\\')) => match self.bump() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, other)) => value.push(other),
                    None => return Err(unterminated("string", start, self.current, index)),
                },
                Some((_, ch)) => value.push(ch),
                None => return Err(unterminated("string", start, self.current, index)),
            }
        }
        Ok(Token {
            kind: TokenKind::String,
            lexeme: value,
            span: SourceSpan::new(start, self.current),
        })
    }

    fn unit(&mut self, start: usize, index: usize) -> Result<Token, Diagnostic> {
        let mut value = String::new();
        loop {
            match self.bump() {
                Some((_, '`')) => break,
                Some((_, ch)) => value.push(ch),
                None => return Err(unterminated("unit", start, self.current, index)),
            }
        }
        Ok(Token {
            kind: TokenKind::Unit,
            lexeme: value.trim().to_string(),
            span: SourceSpan::new(start, self.current),
        })
    }

    fn date(&mut self, start: usize) -> Token {
        while self
            .peek_char()
            .is_some_and(|c| c.is_ascii_digit() || c == '-')
        {
            self.bump();
        }
        Token {
            kind: TokenKind::Date,
            lexeme: self.source[start + 1..self.current].to_string(),
            span: SourceSpan::new(start, self.current),
        }
    }
}

fn unterminated(what: &str, start: usize, end: usize, index: usize) -> Diagnostic {
    Diagnostic::error(ErrorCode::UnexpectedEnd)
        .with_str(format!("closing delimiter of {what}"))
        .with_span(SourceSpan::new(start, end))
        .with_provenance(&Provenance::token(index))
}

fn keyword_for(ident: &str) -> Option<TokenKind> {
    use self::Keyword as Kw;
    let keyword = match ident {
        "true" => Kw::True,
        "false" => Kw::False,
        "none" => Kw::None,
        "and" => Kw::And,
        "or" => Kw::Or,
        "not" => Kw::Not,
        "fa" => Kw::Fa,
        "fo" => Kw::Fo,
        "for" => Kw::For,
        "in" => Kw::In,
        "to" => Kw::To,
        "until" => Kw::Until,
        "step" => Kw::Step,
        "include" => Kw::Include,
        "exclude" => Kw::Exclude,
        "prepend" => Kw::Prepend,
        "append" => Kw::Append,
        "is" => Kw::Is,
        "can" => Kw::Can,
        "as" => Kw::As,
        "keyof" => Kw::Keyof,
        "import" => Kw::Import,
        "assert" => Kw::Assert,
        _ => return None,
    };
    Some(TokenKind::Keyword(keyword))
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, Diagnostic> {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .expect("lexes")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn classifies_macro_and_pipe() {
        assert_eq!(
            kinds("print!(v |> sum())"),
            vec![
                TokenKind::Macro,
                TokenKind::LParen,
                TokenKind::Name,
                TokenKind::Pipe,
                TokenKind::Name,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn measurement_and_date_literals() {
        let tokens = tokenize("5`km/h` + @2024-01-31").expect("lexes");
        assert_eq!(tokens[1].kind, TokenKind::Unit);
        assert_eq!(tokens[1].lexeme, "km/h");
        assert_eq!(tokens[3].kind, TokenKind::Date);
        assert_eq!(tokens[3].lexeme, "2024-01-31");
    }

    #[test]
    fn spread_and_dotted_names() {
        assert_eq!(
            kinds("[...v, stats.mean]"),
            vec![
                TokenKind::LBracket,
                TokenKind::Spread,
                TokenKind::Name,
                TokenKind::Comma,
                TokenKind::Name,
                TokenKind::RBracket,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn exponent_needs_digits() {
        let tokens = tokenize("2e3 2e").expect("lexes");
        assert_eq!(tokens[0].lexeme, "2e3");
        assert_eq!(tokens[1].lexeme, "2");
        assert_eq!(tokens[2].kind, TokenKind::Name);
    }

    #[test]
    fn comment_runs_to_end() {
        assert_eq!(kinds("1 # note"), vec![TokenKind::Number, TokenKind::Eof]);
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert!(tokenize("\"abc").is_err());
    }
}
