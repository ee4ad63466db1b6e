//! Tokenizer for indicator scripts.

use super::ExecutionError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Ident(String),
    Str(String),
    // keywords
    Fn,
    Let,
    If,
    Else,
    For,
    In,
    While,
    Return,
    True,
    False,
    And,
    Or,
    Not,
    // punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semi,
    Colon,
    Dot,
    Assign,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

fn keyword(word: &str) -> Option<TokenKind> {
    Some(match word {
        "fn" => TokenKind::Fn,
        "let" => TokenKind::Let,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "for" => TokenKind::For,
        "in" => TokenKind::In,
        "while" => TokenKind::While,
        "return" => TokenKind::Return,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        _ => return None,
    })
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn error(&self, line: usize, column: usize, message: impl Into<String>) -> ExecutionError {
        ExecutionError::Syntax {
            line,
            column,
            message: message.into(),
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('#') => self.skip_line(),
                Some('/') => {
                    let mut ahead = self.chars.clone();
                    ahead.next();
                    if ahead.peek() == Some(&'/') {
                        self.skip_line();
                    } else {
                        return;
                    }
                }
                _ => return,
            }
        }
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn number(&mut self, line: usize, column: usize) -> Result<TokenKind, ExecutionError> {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '.' || c == '_' {
                if c != '_' {
                    text.push(c);
                }
                self.bump();
            } else if (c == 'e' || c == 'E') && !text.contains('e') && !text.contains('E') {
                text.push(c);
                self.bump();
                if let Some(sign @ ('+' | '-')) = self.peek() {
                    text.push(sign);
                    self.bump();
                }
            } else {
                break;
            }
        }
        text.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| self.error(line, column, format!("invalid number literal '{text}'")))
    }

    fn string(&mut self, quote: char, line: usize, column: usize) -> Result<TokenKind, ExecutionError> {
        let mut text = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(TokenKind::Str(text)),
                Some('\n') | None => return Err(self.error(line, column, "unterminated string")),
                Some(c) => text.push(c),
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, ExecutionError> {
        self.skip_trivia();
        let (line, column) = (self.line, self.column);
        let token = |kind| Ok(Token { kind, line, column });

        let Some(c) = self.peek() else {
            return token(TokenKind::Eof);
        };

        if c.is_ascii_digit() {
            return token(self.number(line, column)?);
        }
        if c.is_alphabetic() || c == '_' {
            let mut word = String::new();
            while let Some(c) = self.peek() {
                if c.is_alphanumeric() || c == '_' {
                    word.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
            return token(keyword(&word).unwrap_or(TokenKind::Ident(word)));
        }

        self.bump();
        let kind = match c {
            '"' | '\'' => self.string(c, line, column)?,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semi,
            ':' => TokenKind::Colon,
            '.' => TokenKind::Dot,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '=' if self.eat('=') => TokenKind::Eq,
            '=' => TokenKind::Assign,
            '!' if self.eat('=') => TokenKind::Ne,
            '!' => TokenKind::Not,
            '<' if self.eat('=') => TokenKind::Le,
            '<' => TokenKind::Lt,
            '>' if self.eat('=') => TokenKind::Ge,
            '>' => TokenKind::Gt,
            '&' if self.eat('&') => TokenKind::And,
            '|' if self.eat('|') => TokenKind::Or,
            other => return Err(self.error(line, column, format!("unexpected character '{other}'"))),
        };
        token(kind)
    }
}

/// Split source text into tokens, ending with a single `Eof`.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ExecutionError> {
    let mut lexer = Lexer {
        chars: source.chars().peekable(),
        line: 1,
        column: 1,
    };
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}
