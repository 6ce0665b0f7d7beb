use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::class::Instance;
use crate::environment::Environment;
use crate::error::{RuntimeError, Signal};
use crate::interpreter::Interpreter;
use crate::object::Value;
use crate::syntax::FunctionDecl;

/// A function implemented in the host language and exposed to Lox code.
/// The only one this interpreter ships is `clock` (§6); user code cannot
/// define its own natives.
pub struct NativeFunction {
    pub name: &'static str,
    pub arity: usize,
    pub func: fn(&[Value]) -> Value,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<native fn {}>", self.name)
    }
}

/// A user-defined Lox function or method: its declaration (shared, never
/// cloned) plus the environment that was current when it was declared.
/// `is_initializer` marks a class's `init` method, which always returns
/// the bound `this` regardless of an explicit `return;`.
#[derive(Debug)]
pub struct LoxFunction {
    pub decl: Rc<FunctionDecl>,
    pub closure: Rc<RefCell<Environment>>,
    pub is_initializer: bool,
}

impl LoxFunction {
    pub fn new(decl: Rc<FunctionDecl>, closure: Rc<RefCell<Environment>>, is_initializer: bool) -> Self {
        Self {
            decl,
            closure,
            is_initializer,
        }
    }

    pub fn arity(&self) -> usize {
        self.decl.params.len()
    }

    /// Creates a new environment nested inside the method's original
    /// closure — a closure within a closure — and binds `this` to the
    /// given instance in it. That environment becomes the parent of the
    /// method body's environment on every call.
    pub fn bind(&self, instance: Rc<RefCell<Instance>>) -> LoxFunction {
        let env = Rc::new(RefCell::new(Environment::with_enclosing(self.closure.clone())));
        env.borrow_mut()
            .define("this".to_string(), Value::Instance(instance));
        LoxFunction {
            decl: self.decl.clone(),
            closure: env,
            is_initializer: self.is_initializer,
        }
    }

    pub fn call(&self, interpreter: &mut Interpreter, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let env = Rc::new(RefCell::new(Environment::with_enclosing(self.closure.clone())));
        for (param, arg) in self.decl.params.iter().zip(args) {
            env.borrow_mut().define(param.lexeme.clone(), arg);
        }

        match interpreter.execute_block(&self.decl.body, env) {
            Ok(()) => {
                if self.is_initializer {
                    Ok(self.closure.borrow().get_at(0, "this"))
                } else {
                    Ok(Value::Nil)
                }
            }
            Err(Signal::Return(value)) => {
                if self.is_initializer {
                    Ok(self.closure.borrow().get_at(0, "this"))
                } else {
                    Ok(value)
                }
            }
            Err(Signal::Error(err)) => Err(err),
        }
    }
}
