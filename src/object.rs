use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::class::{Instance, LoxClass};
use crate::error::RuntimeError;
use crate::function::{LoxFunction, NativeFunction};
use crate::interpreter::Interpreter;

/// The runtime value every expression evaluates to.
#[derive(Clone)]
pub enum Value {
    Nil,
    Boolean(bool),
    Number(f64),
    String(Rc<str>),
    Callable(Callable),
    Instance(Rc<RefCell<Instance>>),
}

#[derive(Clone)]
pub enum Callable {
    Native(Rc<NativeFunction>),
    Function(Rc<LoxFunction>),
    Class(Rc<LoxClass>),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(Rc::from(s.into().as_str()))
    }

    /// `nil` and `false` are falsy; everything else, including `0` and the
    /// empty string, is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Boolean(b) => *b,
            _ => true,
        }
    }

    /// Lox equality: `nil == nil`, different runtime kinds are never
    /// equal, numbers compare by IEEE `==` (so `NaN == NaN` is false),
    /// strings by byte equality, callables and instances by identity.
    pub fn lox_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Callable(a), Value::Callable(b)) => a.identity_eq(b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Stringification for `print`: integral numbers drop their trailing
    /// `.0`, everything else prints in its canonical `Display` form.
    pub fn stringify(&self) -> String {
        match self {
            Value::Nil => "nil".to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            Value::String(s) => s.to_string(),
            Value::Callable(c) => c.to_string(),
            Value::Instance(instance) => format!("{} instance", instance.borrow().class.name),
        }
    }
}

impl Callable {
    fn identity_eq(&self, other: &Callable) -> bool {
        match (self, other) {
            (Callable::Native(a), Callable::Native(b)) => Rc::ptr_eq(a, b),
            (Callable::Function(a), Callable::Function(b)) => Rc::ptr_eq(a, b),
            (Callable::Class(a), Callable::Class(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Callable::Native(native) => native.arity,
            Callable::Function(func) => func.arity(),
            Callable::Class(class) => class.arity(),
        }
    }

    /// Dispatches a call uniformly across the three callable kinds. The
    /// caller has already checked arity against `paren`; this only routes
    /// to the right implementation.
    pub fn call(&self, interpreter: &mut Interpreter, args: Vec<Value>) -> Result<Value, RuntimeError> {
        match self {
            Callable::Native(native) => Ok((native.func)(&args)),
            Callable::Function(func) => func.call(interpreter, args),
            Callable::Class(class) => {
                let instance = Instance::new(class.clone());
                if let Some(init) = class.find_method("init") {
                    init.bind(instance.clone()).call(interpreter, args)?;
                }
                Ok(Value::Instance(instance))
            }
        }
    }
}

impl fmt::Display for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Native(_) => write!(f, "<native fn>"),
            Callable::Function(func) => write!(f, "<fn {}>", func.decl.name.lexeme),
            Callable::Class(class) => write!(f, "{}", class.name),
        }
    }
}
