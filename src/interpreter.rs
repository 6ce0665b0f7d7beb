use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::trace;

use crate::class::{Instance, LoxClass};
use crate::environment::Environment;
use crate::error::{ErrorReporter, RuntimeError, Signal};
use crate::function::{LoxFunction, NativeFunction};
use crate::object::{Callable, Value};
use crate::syntax::{Expr, ExprId, ExprKind, Stmt};
use crate::token::{Literal, Token, TokenKind};

/// Absolute tolerance for treating a division's divisor as zero — `1e-15`
/// rather than a bit-exact `== 0.0`, so near-zero floats raised by prior
/// floating point error are caught too.
const DIVISOR_ZERO_TOLERANCE: f64 = 1e-15;

/// Walks the AST, driving `Environment` and `Callable` values, consulting
/// the resolver's side-table (`locals`) for every depth-sensitive lookup.
pub struct Interpreter {
    pub globals: Rc<RefCell<Environment>>,
    environment: Rc<RefCell<Environment>>,
    locals: HashMap<ExprId, usize>,
}

impl Interpreter {
    pub fn new() -> Self {
        let globals = Rc::new(RefCell::new(Environment::new()));
        globals.borrow_mut().define(
            "clock".to_string(),
            Value::Callable(Callable::Native(Rc::new(NativeFunction {
                name: "clock",
                arity: 0,
                func: |_args| {
                    let now = std::time::SystemTime::now()
                        .duration_since(std::time::UNIX_EPOCH)
                        .unwrap_or_default();
                    Value::Number(now.as_secs_f64())
                },
            }))),
        );

        Self {
            environment: globals.clone(),
            globals,
            locals: HashMap::new(),
        }
    }

    /// Called by the resolver once per variable-bearing expression it
    /// manages to bind to a scope on its stack; absence means global.
    pub fn resolve(&mut self, id: ExprId, depth: usize) {
        self.locals.insert(id, depth);
    }

    pub fn interpret(&mut self, statements: &[Stmt], reporter: &ErrorReporter) {
        trace!("interpreting {} top-level statements", statements.len());
        for statement in statements {
            if let Err(Signal::Error(err)) = self.execute(statement) {
                reporter.runtime_error(&err);
                return;
            }
        }
    }

    fn execute(&mut self, stmt: &Stmt) -> Result<(), Signal> {
        match stmt {
            Stmt::Block { stmts } => {
                let scope = Rc::new(RefCell::new(Environment::with_enclosing(self.environment.clone())));
                self.execute_block(stmts, scope)
            }
            Stmt::Class {
                name,
                superclass,
                methods,
            } => self.execute_class(name, superclass.as_ref(), methods),
            Stmt::Expression { expr } => {
                self.evaluate(expr)?;
                Ok(())
            }
            Stmt::Function { decl } => {
                let function = LoxFunction::new(decl.clone(), self.environment.clone(), false);
                self.environment.borrow_mut().define(
                    decl.name.lexeme.clone(),
                    Value::Callable(Callable::Function(Rc::new(function))),
                );
                Ok(())
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(cond)?.is_truthy() {
                    self.execute(then_branch)?;
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)?;
                }
                Ok(())
            }
            Stmt::Print { expr } => {
                let value = self.evaluate(expr)?;
                println!("{}", value.stringify());
                Ok(())
            }
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                Err(Signal::Return(value))
            }
            Stmt::Var { name, init } => {
                let value = match init {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                self.environment.borrow_mut().define(name.lexeme.clone(), value);
                Ok(())
            }
            Stmt::While { cond, body } => {
                while self.evaluate(cond)?.is_truthy() {
                    self.execute(body)?;
                }
                Ok(())
            }
        }
    }

    /// Swaps in `environment` for the duration of `stmts`, restoring the
    /// previous one on every exit path — a normal finish, a `return`
    /// unwinding through it, or a runtime error.
    pub fn execute_block(&mut self, stmts: &[Stmt], environment: Rc<RefCell<Environment>>) -> Result<(), Signal> {
        let previous = std::mem::replace(&mut self.environment, environment);
        let result = (|| {
            for stmt in stmts {
                self.execute(stmt)?;
            }
            Ok(())
        })();
        self.environment = previous;
        result
    }

    fn execute_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[Rc<crate::syntax::FunctionDecl>],
    ) -> Result<(), Signal> {
        let superclass = match superclass {
            Some(expr) => {
                // The parser only ever produces a `Variable` expression here.
                let ExprKind::Variable { name: super_name } = &expr.kind else {
                    unreachable!("class superclass is always parsed as a Variable expression");
                };
                match self.evaluate(expr)? {
                    Value::Callable(Callable::Class(class)) => Some(class),
                    _ => {
                        return Err(RuntimeError::SuperclassMustBeClass {
                            token: super_name.clone(),
                        }
                        .into())
                    }
                }
            }
            None => None,
        };

        self.environment.borrow_mut().define(name.lexeme.clone(), Value::Nil);

        let method_env = if let Some(superclass) = &superclass {
            let env = Rc::new(RefCell::new(Environment::with_enclosing(self.environment.clone())));
            env.borrow_mut()
                .define("super".to_string(), Value::Callable(Callable::Class(superclass.clone())));
            env
        } else {
            self.environment.clone()
        };

        let mut method_table = HashMap::new();
        for method in methods {
            let is_initializer = method.name.lexeme == "init";
            let function = LoxFunction::new(method.clone(), method_env.clone(), is_initializer);
            method_table.insert(method.name.lexeme.clone(), Rc::new(function));
        }

        let class = Rc::new(LoxClass {
            name: name.lexeme.clone(),
            superclass,
            methods: method_table,
        });

        self.environment
            .borrow_mut()
            .assign(name, Value::Callable(Callable::Class(class)))
            .expect("class name was just defined in this scope");

        Ok(())
    }

    fn evaluate(&mut self, expr: &Expr) -> Result<Value, Signal> {
        match &expr.kind {
            ExprKind::Literal { value } => Ok(literal_to_value(value)),
            ExprKind::Grouping { expr } => self.evaluate(expr),
            ExprKind::Unary { op, right } => self.evaluate_unary(expr.id, op, right),
            ExprKind::Binary { left, op, right } => self.evaluate_binary(op, left, right),
            ExprKind::Logical { left, op, right } => self.evaluate_logical(op, left, right),
            ExprKind::Variable { name } => self.look_up_variable(expr.id, name),
            ExprKind::Assign { name, value } => {
                let value = self.evaluate(value)?;
                match self.locals.get(&expr.id) {
                    Some(&depth) => self.environment.borrow_mut().assign_at(depth, name, value.clone()),
                    None => self.globals.borrow_mut().assign(name, value.clone())?,
                }
                Ok(value)
            }
            ExprKind::Call { callee, paren, args } => self.evaluate_call(callee, paren, args),
            ExprKind::Get { object, name } => {
                let object = self.evaluate(object)?;
                match object {
                    Value::Instance(instance) => Ok(Instance::get(&instance, name)?),
                    _ => Err(RuntimeError::NotAnInstance { token: name.clone() }.into()),
                }
            }
            ExprKind::Set { object, name, value } => {
                let object = self.evaluate(object)?;
                match object {
                    Value::Instance(instance) => {
                        let value = self.evaluate(value)?;
                        instance.borrow_mut().set(name, value.clone());
                        Ok(value)
                    }
                    _ => Err(RuntimeError::NotAnInstance { token: name.clone() }.into()),
                }
            }
            ExprKind::This { keyword } => self.look_up_variable(expr.id, keyword),
            ExprKind::Super { keyword, method } => self.evaluate_super(expr.id, keyword, method),
        }
    }

    fn evaluate_unary(&mut self, id: ExprId, op: &Token, right: &Expr) -> Result<Value, Signal> {
        let right = self.evaluate(right)?;
        match op.kind {
            TokenKind::Minus => match right {
                Value::Number(n) => Ok(Value::Number(-n)),
                _ => Err(RuntimeError::OperandMustBeNumber { token: op.clone() }.into()),
            },
            TokenKind::Bang => Ok(Value::Boolean(!right.is_truthy())),
            _ => unreachable!("parser only emits Minus/Bang for unary expressions, id {id}"),
        }
    }

    fn evaluate_binary(&mut self, op: &Token, left: &Expr, right: &Expr) -> Result<Value, Signal> {
        let left = self.evaluate(left)?;
        let right = self.evaluate(right)?;

        match op.kind {
            TokenKind::Minus => numeric(op, left, right, |a, b| a - b),
            TokenKind::Slash => {
                let (a, b) = numeric_operands(op, left, right)?;
                if b.abs() < DIVISOR_ZERO_TOLERANCE {
                    return Err(RuntimeError::DivisionByZero { token: op.clone() }.into());
                }
                Ok(Value::Number(a / b))
            }
            TokenKind::Star => numeric(op, left, right, |a, b| a * b),
            TokenKind::Plus => match (left, right) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
                (Value::String(a), Value::String(b)) => Ok(Value::string(format!("{a}{b}"))),
                _ => Err(RuntimeError::OperandsMustBeNumbersOrStrings { token: op.clone() }.into()),
            },
            TokenKind::Greater => numeric_cmp(op, left, right, |a, b| a > b),
            TokenKind::GreaterEqual => numeric_cmp(op, left, right, |a, b| a >= b),
            TokenKind::Less => numeric_cmp(op, left, right, |a, b| a < b),
            TokenKind::LessEqual => numeric_cmp(op, left, right, |a, b| a <= b),
            TokenKind::BangEqual => Ok(Value::Boolean(!left.lox_eq(&right))),
            TokenKind::EqualEqual => Ok(Value::Boolean(left.lox_eq(&right))),
            _ => unreachable!("parser only emits comparison/arithmetic kinds for binary expressions"),
        }
    }

    fn evaluate_logical(&mut self, op: &Token, left: &Expr, right: &Expr) -> Result<Value, Signal> {
        let left = self.evaluate(left)?;
        match op.kind {
            TokenKind::Or if left.is_truthy() => Ok(left),
            TokenKind::And if !left.is_truthy() => Ok(left),
            _ => self.evaluate(right),
        }
    }

    fn evaluate_call(&mut self, callee: &Expr, paren: &Token, args: &[Expr]) -> Result<Value, Signal> {
        let callee = self.evaluate(callee)?;
        let mut evaluated_args = Vec::with_capacity(args.len());
        for arg in args {
            evaluated_args.push(self.evaluate(arg)?);
        }

        let callable = match callee {
            Value::Callable(c) => c,
            _ => return Err(RuntimeError::NotCallable { token: paren.clone() }.into()),
        };

        let arity = callable.arity();
        if evaluated_args.len() != arity {
            return Err(RuntimeError::ArityMismatch {
                token: paren.clone(),
                expected: arity,
                got: evaluated_args.len(),
            }
            .into());
        }

        Ok(callable.call(self, evaluated_args)?)
    }

    fn evaluate_super(&mut self, id: ExprId, keyword: &Token, method: &Token) -> Result<Value, Signal> {
        let depth = *self
            .locals
            .get(&id)
            .expect("resolver always annotates a valid 'super' expression");

        let superclass = match self.environment.borrow().get_at(depth, "super") {
            Value::Callable(Callable::Class(class)) => class,
            _ => unreachable!("'super' is only ever bound to a class value"),
        };
        // The scope binding `this` is always exactly one level below the
        // one binding `super` — see the two-tier class scope in §4.3.
        let this = match self.environment.borrow().get_at(depth - 1, "this") {
            Value::Instance(instance) => instance,
            _ => unreachable!("'this' is only ever bound to an instance value"),
        };

        match superclass.find_method(&method.lexeme) {
            Some(found) => Ok(Value::Callable(Callable::Function(Rc::new(found.bind(this))))),
            None => Err(RuntimeError::UndefinedProperty { name: method.clone() }.into()),
        }
    }

    fn look_up_variable(&self, id: ExprId, name: &Token) -> Result<Value, Signal> {
        match self.locals.get(&id) {
            Some(&depth) => Ok(self.environment.borrow().get_at(depth, &name.lexeme)),
            None => Ok(self.globals.borrow().get(name)?),
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

fn literal_to_value(literal: &Literal) -> Value {
    match literal {
        Literal::Nil => Value::Nil,
        Literal::Boolean(b) => Value::Boolean(*b),
        Literal::Number(n) => Value::Number(*n),
        Literal::Str(s) => Value::string(s.clone()),
    }
}

fn numeric_operands(op: &Token, left: Value, right: Value) -> Result<(f64, f64), Signal> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok((a, b)),
        _ => Err(RuntimeError::OperandsMustBeNumbers { token: op.clone() }.into()),
    }
}

fn numeric(op: &Token, left: Value, right: Value, f: impl Fn(f64, f64) -> f64) -> Result<Value, Signal> {
    let (a, b) = numeric_operands(op, left, right)?;
    Ok(Value::Number(f(a, b)))
}

fn numeric_cmp(op: &Token, left: Value, right: Value, f: impl Fn(f64, f64) -> bool) -> Result<Value, Signal> {
    let (a, b) = numeric_operands(op, left, right)?;
    Ok(Value::Boolean(f(a, b)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorReporter;
    use crate::parser::Parser;
    use crate::resolver::Resolver;
    use crate::scanner::Scanner;

    fn run(source: &str) -> (bool, bool) {
        let reporter = ErrorReporter::new();
        let tokens = Scanner::new(source, &reporter).scan_tokens();
        let statements = Parser::new(tokens, &reporter).parse();
        if reporter.had_error() {
            return (true, false);
        }

        let mut interpreter = Interpreter::new();
        Resolver::new(&mut interpreter, &reporter).resolve(&statements);
        if reporter.had_error() {
            return (true, false);
        }

        interpreter.interpret(&statements, &reporter);
        (false, reporter.had_runtime_error())
    }

    #[test]
    fn arithmetic_precedence() {
        let (had_error, had_runtime_error) = run("print 1 + 2 * 3;");
        assert!(!had_error && !had_runtime_error);
    }

    #[test]
    fn block_shadowing_does_not_leak_outward() {
        let (had_error, had_runtime_error) = run("var a = 1; { var a = 2; } print a;");
        assert!(!had_error && !had_runtime_error);
    }

    #[test]
    fn division_by_near_zero_is_a_runtime_error() {
        let (had_error, had_runtime_error) = run("print 1 / 0.0000000000000001;");
        assert!(!had_error);
        assert!(had_runtime_error);
    }

    #[test]
    fn string_plus_number_is_a_runtime_error() {
        let (had_error, had_runtime_error) = run("print \"a\" + 1;");
        assert!(!had_error);
        assert!(had_runtime_error);
    }

    #[test]
    fn closures_capture_their_defining_environment() {
        let (had_error, had_runtime_error) = run(
            "fun f() { var x = 10; fun g() { return x; } return g; } print f()();",
        );
        assert!(!had_error && !had_runtime_error);
    }

    #[test]
    fn super_dispatches_to_statically_enclosing_class() {
        let (had_error, had_runtime_error) = run(
            "class A { m() { print \"A\"; } } \
             class B < A { m() { super.m(); print \"B\"; } } \
             B().m();",
        );
        assert!(!had_error && !had_runtime_error);
    }

    #[test]
    fn initializer_always_returns_bound_this_even_with_bare_return() {
        let (had_error, had_runtime_error) = run(
            "class C { init(v) { this.v = v; return; } } var c = C(3); print c.v;",
        );
        assert!(!had_error && !had_runtime_error);
    }

    #[test]
    fn return_at_top_level_is_a_compile_error() {
        let (had_error, _) = run("return 1;");
        assert!(had_error);
    }

    #[test]
    fn class_cannot_inherit_from_itself() {
        let (had_error, _) = run("class A < A {}");
        assert!(had_error);
    }
}
