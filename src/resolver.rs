use std::collections::HashMap;
use std::mem;

use log::trace;

use crate::error::ErrorReporter;
use crate::interpreter::Interpreter;
use crate::syntax::{Expr, ExprKind, Stmt};
use crate::token::Token;

#[derive(Clone, Copy, PartialEq)]
enum FunctionType {
    None,
    Function,
    Initializer,
    Method,
}

#[derive(Clone, Copy, PartialEq)]
enum ClassType {
    None,
    Class,
    Subclass,
}

/// Static pass that computes, for every variable-bearing expression, how
/// many enclosing scopes separate it from its binding — and performs the
/// checks that don't need a running program to catch (double
/// declaration, misplaced `this`/`super`/`return`, self-inheritance).
/// Writes directly into the interpreter's side-table as it walks.
pub struct Resolver<'a, 'i> {
    interpreter: &'i mut Interpreter,
    reporter: &'a ErrorReporter,
    scopes: Vec<HashMap<String, bool>>,
    current_function: FunctionType,
    current_class: ClassType,
}

impl<'a, 'i> Resolver<'a, 'i> {
    pub fn new(interpreter: &'i mut Interpreter, reporter: &'a ErrorReporter) -> Self {
        Self {
            interpreter,
            reporter,
            scopes: Vec::new(),
            current_function: FunctionType::None,
            current_class: ClassType::None,
        }
    }

    pub fn resolve(&mut self, statements: &[Stmt]) {
        for statement in statements {
            self.resolve_stmt(statement);
        }
        trace!("resolved {} top-level statements", statements.len());
    }

    fn resolve_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block { stmts } => {
                self.begin_scope();
                self.resolve(stmts);
                self.end_scope();
            }
            Stmt::Class {
                name,
                superclass,
                methods,
            } => self.resolve_class(name, superclass.as_ref(), methods),
            Stmt::Expression { expr } => self.resolve_expr(expr),
            Stmt::Function { decl } => {
                self.declare(&decl.name);
                self.define(&decl.name);
                self.resolve_function(&decl.params, &decl.body, FunctionType::Function);
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(cond);
                self.resolve_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.resolve_stmt(else_branch);
                }
            }
            Stmt::Print { expr } => self.resolve_expr(expr),
            Stmt::Return { keyword, value } => {
                if self.current_function == FunctionType::None {
                    self.reporter
                        .error_at_token(keyword, "Can't return from top-level code.");
                }
                if let Some(value) = value {
                    if self.current_function == FunctionType::Initializer {
                        self.reporter
                            .error_at_token(keyword, "Can't return a value from an initializer.");
                    }
                    self.resolve_expr(value);
                }
            }
            Stmt::Var { name, init } => {
                self.declare(name);
                if let Some(init) = init {
                    self.resolve_expr(init);
                }
                self.define(name);
            }
            Stmt::While { cond, body } => {
                self.resolve_expr(cond);
                self.resolve_stmt(body);
            }
        }
    }

    fn resolve_class(&mut self, name: &Token, superclass: Option<&Expr>, methods: &[std::rc::Rc<crate::syntax::FunctionDecl>]) {
        let enclosing_class = mem::replace(&mut self.current_class, ClassType::Class);

        self.declare(name);
        self.define(name);

        if let Some(superclass_expr) = superclass {
            if let ExprKind::Variable { name: super_name } = &superclass_expr.kind {
                if super_name.lexeme == name.lexeme {
                    self.reporter
                        .error_at_token(super_name, "A class can't inherit from itself.");
                }
            }
            self.current_class = ClassType::Subclass;
            self.resolve_expr(superclass_expr);

            self.begin_scope();
            self.scopes
                .last_mut()
                .expect("scope just pushed")
                .insert("super".to_string(), true);
        }

        self.begin_scope();
        self.scopes
            .last_mut()
            .expect("scope just pushed")
            .insert("this".to_string(), true);

        for method in methods {
            let function_type = if method.name.lexeme == "init" {
                FunctionType::Initializer
            } else {
                FunctionType::Method
            };
            self.resolve_function(&method.params, &method.body, function_type);
        }

        self.end_scope();

        if superclass.is_some() {
            self.end_scope();
        }

        self.current_class = enclosing_class;
    }

    fn resolve_function(&mut self, params: &[Token], body: &[Stmt], function_type: FunctionType) {
        let enclosing_function = mem::replace(&mut self.current_function, function_type);
        self.begin_scope();
        for param in params {
            self.declare(param);
            self.define(param);
        }
        self.resolve(body);
        self.end_scope();
        self.current_function = enclosing_function;
    }

    fn resolve_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Variable { name } => {
                if let Some(scope) = self.scopes.last() {
                    if scope.get(&name.lexeme) == Some(&false) {
                        self.reporter.error_at_token(
                            name,
                            "Can't read local variable in its own initializer.",
                        );
                    }
                }
                self.resolve_local(expr.id, name);
            }
            ExprKind::Assign { name, value } => {
                self.resolve_expr(value);
                self.resolve_local(expr.id, name);
            }
            ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }
            ExprKind::Call { callee, args, .. } => {
                self.resolve_expr(callee);
                for arg in args {
                    self.resolve_expr(arg);
                }
            }
            ExprKind::Get { object, .. } => self.resolve_expr(object),
            ExprKind::Set { object, value, .. } => {
                self.resolve_expr(value);
                self.resolve_expr(object);
            }
            ExprKind::Grouping { expr } => self.resolve_expr(expr),
            ExprKind::Literal { .. } => {}
            ExprKind::Super { keyword, .. } => {
                if self.current_class == ClassType::None {
                    self.reporter
                        .error_at_token(keyword, "Can't use 'super' outside of a class.");
                } else if self.current_class != ClassType::Subclass {
                    self.reporter
                        .error_at_token(keyword, "Can't use 'super' in a class with no superclass.");
                }
                self.resolve_local(expr.id, keyword);
            }
            ExprKind::This { keyword } => {
                if self.current_class == ClassType::None {
                    self.reporter
                        .error_at_token(keyword, "Can't use 'this' outside of a class.");
                } else {
                    self.resolve_local(expr.id, keyword);
                }
            }
            ExprKind::Unary { right, .. } => self.resolve_expr(right),
        }
    }

    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            if scope.contains_key(&name.lexeme) {
                self.reporter.error_at_token(
                    name,
                    "Already variable with this name in this scope.",
                );
            }
            scope.insert(name.lexeme.clone(), false);
        }
    }

    fn define(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.lexeme.clone(), true);
        }
    }

    /// Walks the scope stack from innermost outward; the first match wins
    /// and the depth — distance from the innermost scope — is recorded
    /// for this expression, including a depth of `0`. Nothing is recorded
    /// if the name is never found: the evaluator treats that as global.
    fn resolve_local(&mut self, id: crate::syntax::ExprId, name: &Token) {
        for (i, scope) in self.scopes.iter().rev().enumerate() {
            if scope.contains_key(&name.lexeme) {
                self.interpreter.resolve(id, i);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorReporter;
    use crate::interpreter::Interpreter;
    use crate::parser::Parser;
    use crate::scanner::Scanner;

    use super::Resolver;

    fn resolve(source: &str) -> bool {
        let reporter = ErrorReporter::new();
        let tokens = Scanner::new(source, &reporter).scan_tokens();
        let statements = Parser::new(tokens, &reporter).parse();
        assert!(!reporter.had_error(), "source failed to parse: {source}");

        let mut interpreter = Interpreter::new();
        Resolver::new(&mut interpreter, &reporter).resolve(&statements);
        reporter.had_error()
    }

    #[test]
    fn double_declaration_in_same_scope_is_an_error() {
        assert!(resolve("{ var a = 1; var a = 2; }"));
    }

    #[test]
    fn shadowing_in_a_nested_scope_is_allowed() {
        assert!(!resolve("var a = 1; { var a = 2; }"));
    }

    #[test]
    fn reading_a_local_in_its_own_initializer_is_an_error() {
        assert!(resolve("{ var a = a; }"));
    }

    #[test]
    fn return_outside_any_function_is_an_error() {
        assert!(resolve("return 1;"));
    }

    #[test]
    fn return_inside_a_function_is_allowed() {
        assert!(!resolve("fun f() { return 1; }"));
    }

    #[test]
    fn returning_a_value_from_an_initializer_is_an_error() {
        assert!(resolve("class C { init() { return 1; } }"));
    }

    #[test]
    fn bare_return_from_an_initializer_is_allowed() {
        assert!(!resolve("class C { init() { return; } }"));
    }

    #[test]
    fn this_outside_a_class_is_an_error() {
        assert!(resolve("print this;"));
    }

    #[test]
    fn this_inside_a_method_is_allowed() {
        assert!(!resolve("class C { m() { print this; } }"));
    }

    #[test]
    fn super_outside_a_class_is_an_error() {
        assert!(resolve("print super.m();"));
    }

    #[test]
    fn super_in_a_class_with_no_superclass_is_an_error() {
        assert!(resolve("class C { m() { super.m(); } }"));
    }

    #[test]
    fn super_in_a_subclass_method_is_allowed() {
        assert!(!resolve("class A { m() {} } class B < A { m() { super.m(); } }"));
    }

    #[test]
    fn class_cannot_inherit_from_itself() {
        assert!(resolve("class A < A {}"));
    }
}
