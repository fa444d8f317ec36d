//! Subgraph fusion for task graphs
//!
//! A `TaskGraph` maps keys to calls whose arguments are other keys or literal
//! values. `SubgraphCompiler` takes the tasks feeding one output and fuses them
//! into a single callable: every task gets a symbol, a straight-line wrapper
//! unit is synthesized in dependency order, and the unit is handed to a backend
//! (an interpreter, or a Cranelift JIT with the `jit` feature).

pub mod backend;
pub mod codegen;
pub mod compiler;
pub mod graph;
pub mod symbols;
pub mod value;

pub use backend::{
    compile_wrapper, compile_wrapper_with, default_backend, Backend, BackendError, BackendKind,
    Executable, InterpreterBackend, RuntimeError, WrapperFn,
};
#[cfg(feature = "jit")]
pub use backend::CraneliftBackend;
pub use codegen::{construct_call_wrapper, construct_call_wrapper_text, Binding, Bindings};
pub use compiler::{CompileError, CompiledSubgraph, CompilerOptions, SubgraphCompiler};
pub use graph::{evaluate, Arg, Key, Task, TaskGraph};
pub use symbols::{Namespace, Symbol, SymbolTable};
pub use value::{CallError, Callable, Value};
