use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::RuntimeError;
use crate::function::LoxFunction;
use crate::object::{Callable, Value};
use crate::token::Token;

/// The class stores behavior (a methods table and an optional
/// superclass); instances store state. `methods` is immutable once the
/// class is constructed.
#[derive(Debug)]
pub struct LoxClass {
    pub name: String,
    pub superclass: Option<Rc<LoxClass>>,
    pub methods: HashMap<String, Rc<LoxFunction>>,
}

impl LoxClass {
    pub fn find_method(&self, name: &str) -> Option<Rc<LoxFunction>> {
        self.methods
            .get(name)
            .cloned()
            .or_else(|| self.superclass.as_ref().and_then(|sc| sc.find_method(name)))
    }

    /// Arity equals `init`'s arity, or 0 if the class has no initializer.
    pub fn arity(&self) -> usize {
        self.find_method("init").map(|init| init.arity()).unwrap_or(0)
    }
}

/// Produced by calling a class: a back-pointer to the class plus a
/// mutable field map. Lox instances are loose bags of data — fields are
/// never declared up front, only assigned.
#[derive(Debug)]
pub struct Instance {
    pub class: Rc<LoxClass>,
    fields: HashMap<String, Value>,
}

impl Instance {
    pub fn new(class: Rc<LoxClass>) -> Rc<RefCell<Instance>> {
        Rc::new(RefCell::new(Instance {
            class,
            fields: HashMap::new(),
        }))
    }

    /// Looks a property up first among fields, then among the class's
    /// methods (walking the superclass chain); a method found this way is
    /// bound to `this` before being returned.
    pub fn get(this: &Rc<RefCell<Instance>>, name: &Token) -> Result<Value, RuntimeError> {
        {
            let borrowed = this.borrow();
            if let Some(value) = borrowed.fields.get(&name.lexeme) {
                return Ok(value.clone());
            }
        }

        let method = this.borrow().class.find_method(&name.lexeme);
        match method {
            Some(method) => {
                let bound = method.bind(this.clone());
                Ok(Value::Callable(Callable::Function(Rc::new(bound))))
            }
            None => Err(RuntimeError::UndefinedProperty { name: name.clone() }),
        }
    }

    pub fn set(&mut self, name: &Token, value: Value) {
        self.fields.insert(name.lexeme.clone(), value);
    }
}
