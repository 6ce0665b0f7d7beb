use std::rc::Rc;

use log::debug;

use crate::error::ErrorReporter;
use crate::syntax::{Expr, ExprId, ExprKind, FunctionDecl, Stmt};
use crate::token::{Literal, Token, TokenKind};

const MAX_PARAMS: usize = 255;
const MAX_ARGS: usize = 255;

/// Raised internally to unwind to the nearest `declaration` boundary;
/// the error itself has already been reported through the shared
/// `ErrorReporter` by the time this is constructed.
struct ParseError;

macro_rules! matches_any {
    ( $sel:ident, $( $kind:expr ),+ $(,)? ) => {{
        if $( $sel.check($kind) )||+ {
            $sel.advance();
            true
        } else {
            false
        }
    }};
}

pub struct Parser<'a> {
    tokens: Vec<Token>,
    current: usize,
    next_id: ExprId,
    reporter: &'a ErrorReporter,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, reporter: &'a ErrorReporter) -> Self {
        Self {
            tokens,
            current: 0,
            next_id: 0,
            reporter,
        }
    }

    /// `program := declaration* EOF`. Parse errors do not abort the whole
    /// run — each failing declaration is dropped and parsing resumes at
    /// the next statement boundary, so one invocation can surface every
    /// syntax error in the file.
    pub fn parse(&mut self) -> Vec<Stmt> {
        let mut statements = Vec::new();
        while !self.is_at_end() {
            match self.declaration() {
                Ok(stmt) => statements.push(stmt),
                Err(ParseError) => self.synchronize(),
            }
        }
        debug!("parsed {} top-level statements", statements.len());
        statements
    }

    fn next_id(&mut self) -> ExprId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn expr(&mut self, kind: ExprKind) -> Expr {
        Expr {
            id: self.next_id(),
            kind,
        }
    }

    // declaration := classDecl | funDecl | varDecl | statement
    fn declaration(&mut self) -> Result<Stmt, ParseError> {
        if matches_any!(self, TokenKind::Class) {
            self.class_declaration()
        } else if matches_any!(self, TokenKind::Fun) {
            self.function_declaration("function")
        } else if matches_any!(self, TokenKind::Var) {
            self.var_declaration()
        } else {
            self.statement()
        }
    }

    // classDecl := "class" IDENT ( "<" IDENT )? "{" function* "}"
    fn class_declaration(&mut self) -> Result<Stmt, ParseError> {
        let name = self.consume(TokenKind::Identifier, "Expect class name.")?;

        let superclass = if matches_any!(self, TokenKind::Less) {
            let super_name = self.consume(TokenKind::Identifier, "Expect superclass name.")?;
            Some(self.expr(ExprKind::Variable { name: super_name }))
        } else {
            None
        };

        self.consume(TokenKind::LeftBrace, "Expect '{' before class body.")?;

        let mut methods = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            methods.push(Rc::new(self.function("method")?));
        }

        self.consume(TokenKind::RightBrace, "Expect '}' after class body.")?;

        Ok(Stmt::Class {
            name,
            superclass,
            methods,
        })
    }

    // funDecl := "fun" function
    fn function_declaration(&mut self, kind: &str) -> Result<Stmt, ParseError> {
        let decl = self.function(kind)?;
        Ok(Stmt::Function { decl: Rc::new(decl) })
    }

    // function := IDENT "(" params? ")" block
    fn function(&mut self, kind: &str) -> Result<FunctionDecl, ParseError> {
        let name = self.consume(TokenKind::Identifier, &format!("Expect {kind} name."))?;
        self.consume(TokenKind::LeftParen, &format!("Expect '(' after {kind} name."))?;

        let mut params = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                if params.len() >= MAX_PARAMS {
                    self.report_error(self.peek().clone(), "Can't have more than 255 parameters.");
                }
                params.push(self.consume(TokenKind::Identifier, "Expect parameter name.")?);
                if !matches_any!(self, TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.")?;

        self.consume(TokenKind::LeftBrace, &format!("Expect '{{' before {kind} body."))?;
        let body = self.block()?;

        Ok(FunctionDecl { name, params, body })
    }

    // varDecl := "var" IDENT ( "=" expression )? ";"
    fn var_declaration(&mut self) -> Result<Stmt, ParseError> {
        let name = self.consume(TokenKind::Identifier, "Expect variable name.")?;
        let init = if matches_any!(self, TokenKind::Equal) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration.")?;
        Ok(Stmt::Var { name, init })
    }

    // statement := forStmt | ifStmt | printStmt | returnStmt
    //            | whileStmt | block | exprStmt
    fn statement(&mut self) -> Result<Stmt, ParseError> {
        if matches_any!(self, TokenKind::For) {
            self.for_statement()
        } else if matches_any!(self, TokenKind::If) {
            self.if_statement()
        } else if matches_any!(self, TokenKind::Print) {
            self.print_statement()
        } else if matches_any!(self, TokenKind::Return) {
            self.return_statement()
        } else if matches_any!(self, TokenKind::While) {
            self.while_statement()
        } else if matches_any!(self, TokenKind::LeftBrace) {
            Ok(Stmt::Block { stmts: self.block()? })
        } else {
            self.expression_statement()
        }
    }

    // forStmt := "for" "(" ( varDecl | exprStmt | ";" )
    //                  expression? ";" expression? ")" statement
    //
    // Desugared into `{ init; while (cond) { body; inc; } }` — there is no
    // dedicated `For` AST node.
    fn for_statement(&mut self) -> Result<Stmt, ParseError> {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.")?;

        let initializer = if matches_any!(self, TokenKind::Semicolon) {
            None
        } else if matches_any!(self, TokenKind::Var) {
            Some(self.var_declaration()?)
        } else {
            Some(self.expression_statement()?)
        };

        let condition = if !self.check(TokenKind::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.")?;

        let increment = if !self.check(TokenKind::RightParen) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenKind::RightParen, "Expect ')' after for clauses.")?;

        let mut body = self.statement()?;

        if let Some(increment) = increment {
            body = Stmt::Block {
                stmts: vec![body, Stmt::Expression { expr: increment }],
            };
        }

        let condition = match condition {
            Some(cond) => cond,
            None => self.expr(ExprKind::Literal { value: Literal::Boolean(true) }),
        };

        body = Stmt::While {
            cond: condition,
            body: Box::new(body),
        };

        if let Some(initializer) = initializer {
            body = Stmt::Block {
                stmts: vec![initializer, body],
            };
        }

        Ok(body)
    }

    // ifStmt := "if" "(" expression ")" statement ( "else" statement )?
    fn if_statement(&mut self) -> Result<Stmt, ParseError> {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.")?;
        let cond = self.expression()?;
        self.consume(TokenKind::RightParen, "Expect ')' after if condition.")?;

        let then_branch = Box::new(self.statement()?);
        let else_branch = if matches_any!(self, TokenKind::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };

        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    // printStmt := "print" expression ";"
    fn print_statement(&mut self) -> Result<Stmt, ParseError> {
        let value = self.expression()?;
        self.consume(TokenKind::Semicolon, "Expect ';' after value.")?;
        Ok(Stmt::Print { expr: value })
    }

    // returnStmt := "return" expression? ";"
    fn return_statement(&mut self) -> Result<Stmt, ParseError> {
        let keyword = self.previous().clone();
        let value = if !self.check(TokenKind::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenKind::Semicolon, "Expect ';' after return value.")?;
        Ok(Stmt::Return { keyword, value })
    }

    // whileStmt := "while" "(" expression ")" statement
    fn while_statement(&mut self) -> Result<Stmt, ParseError> {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.")?;
        let cond = self.expression()?;
        self.consume(TokenKind::RightParen, "Expect ')' after condition.")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::While { cond, body })
    }

    // block := "{" declaration* "}"
    fn block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            stmts.push(self.declaration()?);
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.")?;
        Ok(stmts)
    }

    // exprStmt := expression ";"
    fn expression_statement(&mut self) -> Result<Stmt, ParseError> {
        let expr = self.expression()?;
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.")?;
        Ok(Stmt::Expression { expr })
    }

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.assignment()
    }

    // assignment := ( call "." )? IDENT "=" assignment | logic_or
    //
    // The left side is parsed as an ordinary expression first, then
    // reinterpreted as an assignment target if `=` follows — every valid
    // target also parses as a valid expression, so no lookahead is needed.
    fn assignment(&mut self) -> Result<Expr, ParseError> {
        let expr = self.logic_or()?;

        if matches_any!(self, TokenKind::Equal) {
            let equals = self.previous().clone();
            let value = Box::new(self.assignment()?);

            return match expr.kind {
                ExprKind::Variable { name } => Ok(self.expr(ExprKind::Assign { name, value })),
                ExprKind::Get { object, name } => {
                    Ok(self.expr(ExprKind::Set { object, name, value }))
                }
                _ => {
                    // Not in a confused state, so only report — no synchronize.
                    self.report_error(equals, "Invalid assignment target.");
                    Ok(*value)
                }
            };
        }

        Ok(expr)
    }

    // logic_or := logic_and ( "or" logic_and )*
    fn logic_or(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.logic_and()?;
        while matches_any!(self, TokenKind::Or) {
            let op = self.previous().clone();
            let right = self.logic_and()?;
            expr = self.expr(ExprKind::Logical {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            });
        }
        Ok(expr)
    }

    // logic_and := equality ( "and" equality )*
    fn logic_and(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.equality()?;
        while matches_any!(self, TokenKind::And) {
            let op = self.previous().clone();
            let right = self.equality()?;
            expr = self.expr(ExprKind::Logical {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            });
        }
        Ok(expr)
    }

    // equality := comparison ( ("!="|"==") comparison )*
    fn equality(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.comparison()?;
        while matches_any!(self, TokenKind::BangEqual, TokenKind::EqualEqual) {
            let op = self.previous().clone();
            let right = self.comparison()?;
            expr = self.expr(ExprKind::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            });
        }
        Ok(expr)
    }

    // comparison := term ( ( ">"|">="|"<"|"<=" ) term )*
    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.term()?;
        while matches_any!(
            self,
            TokenKind::Greater,
            TokenKind::GreaterEqual,
            TokenKind::Less,
            TokenKind::LessEqual
        ) {
            let op = self.previous().clone();
            let right = self.term()?;
            expr = self.expr(ExprKind::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            });
        }
        Ok(expr)
    }

    // term := factor ( ( "-"|"+" ) factor )*
    fn term(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.factor()?;
        while matches_any!(self, TokenKind::Minus, TokenKind::Plus) {
            let op = self.previous().clone();
            let right = self.factor()?;
            expr = self.expr(ExprKind::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            });
        }
        Ok(expr)
    }

    // factor := unary ( ( "/"|"*" ) unary )*
    fn factor(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.unary()?;
        while matches_any!(self, TokenKind::Slash, TokenKind::Star) {
            let op = self.previous().clone();
            let right = self.unary()?;
            expr = self.expr(ExprKind::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            });
        }
        Ok(expr)
    }

    // unary := ( "!"|"-" ) unary | call
    fn unary(&mut self) -> Result<Expr, ParseError> {
        if matches_any!(self, TokenKind::Bang, TokenKind::Minus) {
            let op = self.previous().clone();
            let right = Box::new(self.unary()?);
            return Ok(self.expr(ExprKind::Unary { op, right }));
        }
        self.call()
    }

    // call := primary ( "(" args? ")" | "." IDENT )*
    fn call(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        loop {
            if matches_any!(self, TokenKind::LeftParen) {
                expr = self.finish_call(expr)?;
            } else if matches_any!(self, TokenKind::Dot) {
                let name = self.consume(TokenKind::Identifier, "Expect property name after '.'.")?;
                expr = self.expr(ExprKind::Get {
                    object: Box::new(expr),
                    name,
                });
            } else {
                break;
            }
        }
        Ok(expr)
    }

    // args := expression ( "," expression )*
    fn finish_call(&mut self, callee: Expr) -> Result<Expr, ParseError> {
        let mut args = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                if args.len() >= MAX_ARGS {
                    self.report_error(self.peek().clone(), "Can't have more than 255 arguments.");
                }
                args.push(self.expression()?);
                if !matches_any!(self, TokenKind::Comma) {
                    break;
                }
            }
        }
        let paren = self.consume(TokenKind::RightParen, "Expect ')' after arguments.")?;
        Ok(self.expr(ExprKind::Call {
            callee: Box::new(callee),
            paren,
            args,
        }))
    }

    // primary := "true"|"false"|"nil"|"this"|NUMBER|STRING
    //          | IDENT | "(" expression ")" | "super" "." IDENT
    fn primary(&mut self) -> Result<Expr, ParseError> {
        if matches_any!(self, TokenKind::False) {
            return Ok(self.expr(ExprKind::Literal { value: Literal::Boolean(false) }));
        }
        if matches_any!(self, TokenKind::True) {
            return Ok(self.expr(ExprKind::Literal { value: Literal::Boolean(true) }));
        }
        if matches_any!(self, TokenKind::Nil) {
            return Ok(self.expr(ExprKind::Literal { value: Literal::Nil }));
        }
        if self.check(TokenKind::Number) || self.check(TokenKind::String) {
            let literal = self.peek().literal.clone();
            self.advance();
            return Ok(self.expr(ExprKind::Literal { value: literal }));
        }
        if matches_any!(self, TokenKind::Super) {
            let keyword = self.previous().clone();
            self.consume(TokenKind::Dot, "Expect '.' after 'super'.")?;
            let method = self.consume(TokenKind::Identifier, "Expect superclass method name.")?;
            return Ok(self.expr(ExprKind::Super { keyword, method }));
        }
        if matches_any!(self, TokenKind::This) {
            let keyword = self.previous().clone();
            return Ok(self.expr(ExprKind::This { keyword }));
        }
        if self.check(TokenKind::Identifier) {
            let name = self.peek().clone();
            self.advance();
            return Ok(self.expr(ExprKind::Variable { name }));
        }
        if matches_any!(self, TokenKind::LeftParen) {
            let inner = self.expression()?;
            self.consume(TokenKind::RightParen, "Expect ')' after expression.")?;
            return Ok(self.expr(ExprKind::Grouping { expr: Box::new(inner) }));
        }

        Err(self.error(self.peek().clone(), "Expect expression."))
    }

    fn synchronize(&mut self) {
        self.advance();
        while !self.is_at_end() {
            if self.previous().kind == TokenKind::Semicolon {
                return;
            }
            match self.peek().kind {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        !self.is_at_end() && self.peek().kind == kind
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance().clone())
        } else {
            Err(self.error(self.peek().clone(), message))
        }
    }

    fn error(&self, token: Token, message: &str) -> ParseError {
        self.report_error(token, message);
        ParseError
    }

    fn report_error(&self, token: Token, message: &str) {
        self.reporter.error_at_token(&token, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::Scanner;

    fn parse(source: &str) -> (Vec<Stmt>, bool) {
        let reporter = ErrorReporter::new();
        let tokens = Scanner::new(source, &reporter).scan_tokens();
        let stmts = Parser::new(tokens, &reporter).parse();
        (stmts, reporter.had_error())
    }

    #[test]
    fn parses_a_print_statement() {
        let (stmts, had_error) = parse("print 1 + 2;");
        assert!(!had_error);
        assert_eq!(stmts.len(), 1);
        assert!(matches!(stmts[0], Stmt::Print { .. }));
    }

    #[test]
    fn for_loop_desugars_into_block_with_while() {
        let (stmts, had_error) = parse("for (var i = 0; i < 3; i = i + 1) print i;");
        assert!(!had_error);
        assert_eq!(stmts.len(), 1);
        match &stmts[0] {
            Stmt::Block { stmts } => {
                assert_eq!(stmts.len(), 2);
                assert!(matches!(stmts[0], Stmt::Var { .. }));
                assert!(matches!(stmts[1], Stmt::While { .. }));
            }
            other => panic!("expected desugared block, got {other:?}"),
        }
    }

    #[test]
    fn missing_semicolon_is_reported_and_recovers() {
        let (stmts, had_error) = parse("print 1\nprint 2;");
        assert!(had_error);
        // The first (malformed) statement is dropped; the second still parses.
        assert_eq!(stmts.len(), 1);
    }

    #[test]
    fn invalid_assignment_target_is_reported_without_aborting_parse() {
        let (stmts, had_error) = parse("1 + 2 = 3;\nprint 4;");
        assert!(had_error);
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn class_with_superclass_and_methods_parses() {
        let (stmts, had_error) = parse("class B < A { init() { this.x = 1; } greet() { return 1; } }");
        assert!(!had_error);
        match &stmts[0] {
            Stmt::Class { superclass, methods, .. } => {
                assert!(superclass.is_some());
                assert_eq!(methods.len(), 2);
            }
            other => panic!("expected class decl, got {other:?}"),
        }
    }
}
