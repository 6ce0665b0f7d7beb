// A lexeme is the raw sequence of characters in the source code that represents a meaningful unit.
// A token is a categorized representation of a lexeme, pairing it with its kind.

use log::trace;

use crate::error::ErrorReporter;
use crate::token::{Literal, Token, TokenKind, KEYWORDS};

pub struct Scanner<'a> {
    source: Vec<char>,
    tokens: Vec<Token>,
    start: usize,
    current: usize,
    line: u32,
    reporter: &'a ErrorReporter,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &str, reporter: &'a ErrorReporter) -> Self {
        Self {
            source: source.chars().collect(),
            tokens: Vec::new(),
            start: 0,
            current: 0,
            line: 1,
            reporter,
        }
    }

    pub fn scan_tokens(mut self) -> Vec<Token> {
        while !self.is_at_end() {
            self.start = self.current;
            self.scan_token();
        }

        self.tokens.push(Token::eof(self.line));
        trace!("scanned {} tokens over {} lines", self.tokens.len(), self.line);
        self.tokens
    }

    fn scan_token(&mut self) {
        let c = self.advance();
        match c {
            '(' => self.add_token(TokenKind::LeftParen),
            ')' => self.add_token(TokenKind::RightParen),
            '{' => self.add_token(TokenKind::LeftBrace),
            '}' => self.add_token(TokenKind::RightBrace),
            ',' => self.add_token(TokenKind::Comma),
            '.' => self.add_token(TokenKind::Dot),
            '-' => self.add_token(TokenKind::Minus),
            '+' => self.add_token(TokenKind::Plus),
            ';' => self.add_token(TokenKind::Semicolon),
            '*' => self.add_token(TokenKind::Star),

            '!' => {
                let kind = if self.r#match('=') {
                    TokenKind::BangEqual
                } else {
                    TokenKind::Bang
                };
                self.add_token(kind);
            }
            '=' => {
                let kind = if self.r#match('=') {
                    TokenKind::EqualEqual
                } else {
                    TokenKind::Equal
                };
                self.add_token(kind);
            }
            '<' => {
                let kind = if self.r#match('=') {
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                };
                self.add_token(kind);
            }
            '>' => {
                let kind = if self.r#match('=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                };
                self.add_token(kind);
            }

            '/' => {
                if self.r#match('/') {
                    while self.peek() != '\n' && !self.is_at_end() {
                        self.advance();
                    }
                } else {
                    self.add_token(TokenKind::Slash);
                }
            }

            ' ' | '\t' | '\r' => (),

            '\n' => self.line += 1,

            '"' => self.string(),

            c if c.is_ascii_digit() => self.number(),
            c if c.is_alphabetic() || c == '_' => self.identifier(),

            _ => self.reporter.error_at_line(self.line, "Unexpected character."),
        }
    }

    fn string(&mut self) {
        while self.peek() != '"' && !self.is_at_end() {
            if self.peek() == '\n' {
                self.line += 1;
            }
            self.advance();
        }

        if self.is_at_end() {
            self.reporter.error_at_line(self.line, "Unterminated string.");
            return;
        }

        // the closing "
        self.advance();

        let value: String = self.source[(self.start + 1)..(self.current - 1)]
            .iter()
            .collect();
        self.add_token_with_literal(TokenKind::String, Literal::Str(value));
    }

    fn number(&mut self) {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let text: String = self.source[self.start..self.current].iter().collect();
        let value: f64 = text.parse().expect("scanned number lexeme must parse");
        self.add_token_with_literal(TokenKind::Number, Literal::Number(value));
    }

    fn identifier(&mut self) {
        while self.peek().is_alphanumeric() || self.peek() == '_' {
            self.advance();
        }

        let text: String = self.source[self.start..self.current].iter().collect();
        let kind = KEYWORDS.get(text.as_str()).copied().unwrap_or(TokenKind::Identifier);
        self.add_token(kind);
    }

    fn advance(&mut self) -> char {
        let c = self.source[self.current];
        self.current += 1;
        c
    }

    fn peek(&self) -> char {
        self.source.get(self.current).copied().unwrap_or('\0')
    }

    fn peek_next(&self) -> char {
        self.source.get(self.current + 1).copied().unwrap_or('\0')
    }

    fn r#match(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.source[self.current] != expected {
            return false;
        }
        self.current += 1;
        true
    }

    fn add_token(&mut self, kind: TokenKind) {
        self.add_token_with_literal(kind, Literal::Nil);
    }

    fn add_token_with_literal(&mut self, kind: TokenKind, literal: Literal) {
        let lexeme: String = self.source[self.start..self.current].iter().collect();
        self.tokens.push(Token::new(kind, lexeme, literal, self.line));
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(src: &str) -> Vec<Token> {
        let reporter = ErrorReporter::new();
        Scanner::new(src, &reporter).scan_tokens()
    }

    #[test]
    fn single_and_double_char_tokens() {
        let tokens = scan("!= == <= >= // comment\n!");
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::BangEqual,
                TokenKind::EqualEqual,
                TokenKind::LessEqual,
                TokenKind::GreaterEqual,
                TokenKind::Bang,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn line_numbers_are_monotonically_non_decreasing() {
        let tokens = scan("var a = 1;\nvar b = 2;\n\nvar c = 3;");
        let mut last = 0;
        for tok in &tokens {
            assert!(tok.line >= last);
            last = tok.line;
        }
        assert_eq!(tokens.last().unwrap().line, 4);
    }

    #[test]
    fn string_literal_is_interior_bytes() {
        let tokens = scan("\"hello world\"");
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].literal, Literal::Str("hello world".to_string()));
    }

    #[test]
    fn unterminated_string_reports_error_and_emits_no_token() {
        let reporter = ErrorReporter::new();
        let tokens = Scanner::new("\"oops", &reporter).scan_tokens();
        assert!(reporter.had_error());
        assert_eq!(tokens.len(), 1); // just EOF
    }

    #[test]
    fn number_literal_parses_as_f64() {
        let tokens = scan("123.45");
        assert_eq!(tokens[0].literal, Literal::Number(123.45));
    }

    #[test]
    fn keywords_are_recognized() {
        let tokens = scan("and class else false for fun if nil or print return super this true var while");
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::And,
                TokenKind::Class,
                TokenKind::Else,
                TokenKind::False,
                TokenKind::For,
                TokenKind::Fun,
                TokenKind::If,
                TokenKind::Nil,
                TokenKind::Or,
                TokenKind::Print,
                TokenKind::Return,
                TokenKind::Super,
                TokenKind::This,
                TokenKind::True,
                TokenKind::Var,
                TokenKind::While,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unexpected_character_reports_but_continues() {
        let reporter = ErrorReporter::new();
        let tokens = Scanner::new("@", &reporter).scan_tokens();
        assert!(reporter.had_error());
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
    }
}
