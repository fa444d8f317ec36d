//! Turning wrapper units into executable code
//!
//! A `WrapperUnit` and its `Bindings` are linked into a `Program`, which a
//! `Backend` turns into an `Executable`. Every program owns its constants and
//! functions, so units compiled concurrently never see each other's bindings.

mod frame;
mod interpreter;
#[cfg(feature = "jit")]
pub mod jit;
mod program;

pub use interpreter::InterpreterBackend;
#[cfg(feature = "jit")]
pub use jit::CraneliftBackend;
pub use program::{LinkError, Program};

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::codegen::{parse_wrapper, Bindings, ParseError};
use crate::symbols::Symbol;
use crate::value::{CallError, Value};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("invalid unit source: {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("JIT compilation failed: {0}")]
    Jit(String),
}

/// Failure while running a compiled unit
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("`{unit}` takes {expected} argument(s), got {got}")]
    ArgumentCount {
        unit: String,
        expected: usize,
        got: usize,
    },

    #[error("call to {symbol} (`{callable}`) failed: {source}")]
    Call {
        symbol: Symbol,
        callable: String,
        source: CallError,
    },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("compiled kernel returned unknown status {0}")]
    KernelStatus(i32),
}

/// A compiled program that can be called any number of times
pub trait Executable: Send + Sync {
    fn invoke(&self, args: &[Value]) -> Result<Value, RuntimeError>;
}

/// Code generation strategy for linked programs
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    fn compile(&self, program: Arc<Program>) -> Result<Arc<dyn Executable>, BackendError>;
}

/// Which backend a compiler should use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Interpreter,
    #[cfg(feature = "jit")]
    Jit,
}

impl Default for BackendKind {
    fn default() -> Self {
        #[cfg(feature = "jit")]
        {
            BackendKind::Jit
        }
        #[cfg(not(feature = "jit"))]
        {
            BackendKind::Interpreter
        }
    }
}

impl BackendKind {
    /// Instantiate the backend. `warm_up` only affects the JIT, which then
    /// compiles kernels eagerly instead of on first call.
    pub fn create(self, warm_up: bool) -> Arc<dyn Backend> {
        match self {
            BackendKind::Interpreter => Arc::new(InterpreterBackend::new()),
            #[cfg(feature = "jit")]
            BackendKind::Jit => Arc::new(CraneliftBackend::new().warm_up(warm_up)),
        }
    }
}

/// Backend used when none is specified
pub fn default_backend() -> Arc<dyn Backend> {
    BackendKind::default().create(true)
}

/// A compiled wrapper unit
#[derive(Clone)]
pub struct WrapperFn {
    program: Arc<Program>,
    executable: Arc<dyn Executable>,
    backend: String,
}

impl WrapperFn {
    pub fn name(&self) -> &str {
        self.program.name()
    }

    pub fn arity(&self) -> usize {
        self.program.arity()
    }

    /// Name of the backend that compiled this unit
    pub fn backend_name(&self) -> &str {
        &self.backend
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, RuntimeError> {
        self.executable.invoke(args)
    }
}

impl fmt::Debug for WrapperFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrapperFn")
            .field("name", &self.program.name())
            .field("arity", &self.program.arity())
            .field("backend", &self.backend)
            .finish()
    }
}

/// Link and compile an already parsed unit
pub fn compile_unit(
    backend: &dyn Backend,
    unit: &crate::codegen::WrapperUnit,
    bindings: &Bindings,
) -> Result<WrapperFn, BackendError> {
    let program = Arc::new(Program::link(unit, bindings)?);
    let executable = backend.compile(program.clone())?;
    Ok(WrapperFn {
        program,
        executable,
        backend: backend.name().to_string(),
    })
}

/// Compile the unit named `name` from `source` with the default backend
pub fn compile_wrapper(
    name: &str,
    source: &str,
    bindings: &Bindings,
) -> Result<WrapperFn, BackendError> {
    compile_wrapper_with(default_backend().as_ref(), name, source, bindings)
}

/// Compile the unit named `name` from `source` with `backend`
pub fn compile_wrapper_with(
    backend: &dyn Backend,
    name: &str,
    source: &str,
    bindings: &Bindings,
) -> Result<WrapperFn, BackendError> {
    let unit = parse_wrapper(source)?;
    if unit.name != name {
        return Err(LinkError::NameMismatch {
            expected: name.to_string(),
            found: unit.name,
        }
        .into());
    }
    compile_unit(backend, &unit, bindings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::construct_call_wrapper_text;
    use crate::graph::{Arg, Key};
    use crate::symbols::SymbolTable;
    use crate::value::Callable;

    fn example() -> (String, Bindings) {
        let mut tbl = SymbolTable::new();
        tbl.register_var("input0").unwrap();
        tbl.register_var("input1").unwrap();

        let algo0 = Callable::new("algo0", |args| {
            Ok(Value::Int(
                (args[0].as_int()? - args[1].as_int()?) * args[2].as_int()?,
            ))
        });
        let algo1 = Callable::new("algo1", |args| {
            Ok(Value::Int(args[0].as_int()? + args[1].as_int()?))
        });
        tbl.register_func(
            "algo0",
            algo0,
            &[Arg::key("input0"), Arg::key("input1"), Arg::literal(2i64)],
        )
        .unwrap();
        tbl.register_func("algo1", algo1, &[Arg::key("algo0"), Arg::literal(5i64)])
            .unwrap();

        construct_call_wrapper_text(
            "subgraph0",
            &tbl,
            &[Key::from("input0"), Key::from("input1")],
            &[Key::from("algo0"), Key::from("algo1")],
            &Key::from("algo1"),
        )
        .unwrap()
    }

    fn all_backends() -> Vec<Arc<dyn Backend>> {
        let mut backends = vec![BackendKind::Interpreter.create(true)];
        #[cfg(feature = "jit")]
        {
            backends.push(BackendKind::Jit.create(true));
            backends.push(BackendKind::Jit.create(false));
        }
        backends
    }

    #[test]
    fn test_compile_wrapper() {
        let (text, bindings) = example();
        let wrapper = compile_wrapper("subgraph0", &text, &bindings).unwrap();

        for (i0, i1) in [(10, 6), (12, 18), (-5, 2)] {
            let ret = wrapper.call(&[Value::Int(i0), Value::Int(i1)]).unwrap();
            assert_eq!(ret, Value::Int(((i0 - i1) * 2) + 5));
        }
    }

    #[test]
    fn test_backends_agree() {
        let (text, bindings) = example();
        for backend in all_backends() {
            let wrapper = compile_wrapper_with(backend.as_ref(), "subgraph0", &text, &bindings)
                .unwrap();
            assert_eq!(wrapper.arity(), 2);
            assert_eq!(wrapper.backend_name(), backend.name());
            assert_eq!(
                wrapper.call(&[Value::Int(10), Value::Int(6)]),
                Ok(Value::Int(13))
            );
            assert_eq!(
                wrapper.call(&[Value::Int(12), Value::Int(18)]),
                Ok(Value::Int(-7))
            );
            assert_eq!(
                wrapper.call(&[Value::Int(-5), Value::Int(2)]),
                Ok(Value::Int(-9))
            );
        }
    }

    #[test]
    fn test_runtime_errors_match_across_backends() {
        let (text, bindings) = example();
        for backend in all_backends() {
            let wrapper = compile_wrapper_with(backend.as_ref(), "subgraph0", &text, &bindings)
                .unwrap();

            assert_eq!(
                wrapper.call(&[Value::Int(1)]),
                Err(RuntimeError::ArgumentCount {
                    unit: "subgraph0".into(),
                    expected: 2,
                    got: 1
                })
            );

            let err = wrapper
                .call(&[Value::Int(1), Value::Float(0.5)])
                .unwrap_err();
            assert_eq!(
                err.to_string(),
                "call to func0 (`algo0`) failed: expected int value, found float"
            );
        }
    }

    #[test]
    fn test_name_mismatch() {
        let (text, bindings) = example();
        let err = compile_wrapper("subgraph1", &text, &bindings).unwrap_err();
        assert_eq!(
            err,
            BackendError::Link(LinkError::NameMismatch {
                expected: "subgraph1".into(),
                found: "subgraph0".into()
            })
        );
    }

    #[test]
    fn test_bindings_are_private() {
        let (text, bindings) = example();
        let first = compile_wrapper("subgraph0", &text, &bindings).unwrap();

        let mut other = bindings.clone();
        let const0 = Symbol::parse("const0").unwrap();
        other.insert(const0, crate::codegen::Binding::Const(Value::Int(100)));
        let second = compile_wrapper("subgraph0", &text, &other).unwrap();

        let args = [Value::Int(10), Value::Int(6)];
        assert_eq!(first.call(&args), Ok(Value::Int(13)));
        assert_eq!(second.call(&args), Ok(Value::Int(405)));
    }
}
