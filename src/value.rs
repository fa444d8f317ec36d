//! Values and callables flowing through task graphs
//!
//! A task graph carries opaque data between calls. `Value` is the dynamic
//! representation of that data and `Callable` is the function object a task
//! invokes. Both are cheap to clone so that compiled units can own their
//! bindings without copying large buffers.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Error returned by a `Callable`
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    #[error("expected {expected} value, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("`{callable}` takes {expected} argument(s), got {got}")]
    Arity {
        callable: String,
        expected: usize,
        got: usize,
    },

    #[error("array length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("{0}")]
    Failed(String),
}

impl CallError {
    pub fn failed(message: impl Into<String>) -> Self {
        CallError::Failed(message.into())
    }
}

/// Dynamic value produced and consumed by task calls
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    /// Dense `f64` buffer, shared between clones
    Array(Arc<[f64]>),
}

impl Value {
    pub fn array(values: impl Into<Vec<f64>>) -> Self {
        Value::Array(values.into().into())
    }

    /// Name of the variant, used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Array(_) => "array",
        }
    }

    pub fn as_bool(&self) -> Result<bool, CallError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(other.mismatch("bool")),
        }
    }

    pub fn as_int(&self) -> Result<i64, CallError> {
        match self {
            Value::Int(i) => Ok(*i),
            other => Err(other.mismatch("int")),
        }
    }

    /// Floats and ints both read as `f64`
    pub fn as_float(&self) -> Result<f64, CallError> {
        match self {
            Value::Float(x) => Ok(*x),
            Value::Int(i) => Ok(*i as f64),
            other => Err(other.mismatch("float")),
        }
    }

    pub fn as_str(&self) -> Result<&str, CallError> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(other.mismatch("str")),
        }
    }

    pub fn as_array(&self) -> Result<&[f64], CallError> {
        match self {
            Value::Array(values) => Ok(values),
            other => Err(other.mismatch("array")),
        }
    }

    fn mismatch(&self, expected: &'static str) -> CallError {
        CallError::TypeMismatch {
            expected,
            found: self.type_name(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "()"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Array(values) => write!(f, "array(len={})", values.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.into())
    }
}

impl From<Vec<f64>> for Value {
    fn from(values: Vec<f64>) -> Self {
        Value::array(values)
    }
}

type CallFn = dyn Fn(&[Value]) -> Result<Value, CallError> + Send + Sync;

/// A named function object invoked by a task
///
/// Equality is identity: two callables are equal only when they share the
/// same underlying function object.
#[derive(Clone)]
pub struct Callable {
    name: Arc<str>,
    arity: Option<usize>,
    func: Arc<CallFn>,
}

impl Callable {
    /// Wrap a function accepting any number of arguments
    pub fn new<F>(name: impl Into<Arc<str>>, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            arity: None,
            func: Arc::new(func),
        }
    }

    /// Wrap a function that must be called with exactly `arity` arguments
    pub fn with_arity<F>(name: impl Into<Arc<str>>, arity: usize, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        Self {
            arity: Some(arity),
            ..Self::new(name, func)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> Option<usize> {
        self.arity
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, CallError> {
        if let Some(expected) = self.arity {
            if args.len() != expected {
                return Err(CallError::Arity {
                    callable: self.name.to_string(),
                    expected,
                    got: args.len(),
                });
            }
        }
        (self.func)(args)
    }

    pub fn ptr_eq(&self, other: &Callable) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}
