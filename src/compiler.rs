//! Subgraph fusion
//!
//! `SubgraphCompiler` turns the part of a task graph that feeds one output into
//! a single callable. The pipeline is linear: ancestor closure, calling
//! convention check, topological sort, symbol registration, wrapper synthesis,
//! backend compilation. Each compilation owns its symbol table and bindings.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexSet;
use thiserror::Error;

use crate::backend::{compile_unit, Backend, BackendError, BackendKind, RuntimeError, WrapperFn};
use crate::codegen::{construct_call_wrapper, CodegenError};
use crate::graph::{topological_sort, GraphError, Key, Task, TaskGraph};
use crate::symbols::{SymbolError, SymbolTable};
use crate::value::{CallError, Callable, Value};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error(
        "task `{}` passes {} by keyword, but fused units only accept positional arguments",
        .key,
        .names.join(", ")
    )]
    UnsupportedCallingConvention { key: Key, names: Vec<String> },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Symbol(#[from] SymbolError),

    #[error(transparent)]
    Codegen(#[from] CodegenError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("`{0}` does not declare its arity and cannot be compiled on its own")]
    UnknownArity(String),
}

/// Settings for a `SubgraphCompiler`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Name given to every synthesized unit
    pub wrapper_name: String,
    pub backend: BackendKind,
    /// Compile JIT kernels eagerly instead of on first call
    pub warm_up: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            wrapper_name: "subgraph".to_string(),
            backend: BackendKind::default(),
            warm_up: true,
        }
    }
}

impl CompilerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wrapper_name(mut self, name: impl Into<String>) -> Self {
        self.wrapper_name = name.into();
        self
    }

    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn warm_up(mut self, warm_up: bool) -> Self {
        self.warm_up = warm_up;
        self
    }
}

/// Fuses task subgraphs into single callables
#[derive(Clone)]
pub struct SubgraphCompiler {
    options: CompilerOptions,
    backend: Arc<dyn Backend>,
}

impl SubgraphCompiler {
    pub fn new() -> Self {
        Self::with_options(CompilerOptions::default())
    }

    pub fn with_options(options: CompilerOptions) -> Self {
        let backend = options.backend.create(options.warm_up);
        Self { options, backend }
    }

    /// Use `backend` instead of the one named in the options
    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Compile the tasks needed for `output_key` into one callable
    ///
    /// The result takes one positional argument per entry of `input_keys`, in
    /// that order. Input keys are never expanded, even when the graph has a
    /// task for them.
    pub fn compile_subgraph(
        &self,
        graph: &TaskGraph,
        input_keys: &[Key],
        output_key: &Key,
    ) -> Result<CompiledSubgraph, CompileError> {
        let boundary: IndexSet<Key> = input_keys.iter().cloned().collect();
        // Keyword arguments are rejected before their values are resolved
        let closure = graph.ancestors_with(output_key, &boundary, |key, task| {
            let names = task.keyword_names();
            if names.is_empty() {
                return Ok(());
            }
            Err(CompileError::UnsupportedCallingConvention {
                key: key.clone(),
                names: names.into_iter().map(str::to_string).collect(),
            })
        })?;
        log::debug!(
            "subgraph for `{}`: {} task(s), {} input(s)",
            output_key,
            closure.len(),
            input_keys.len()
        );

        let order = topological_sort(closure, |key| {
            graph
                .get(key.as_str())
                .map(|task| task.dependencies().into_iter().cloned().collect())
                .unwrap_or_default()
        })
        .map_err(GraphError::from)?;
        log::debug!("execution order: {:?}", order);

        let mut table = SymbolTable::new();
        for key in input_keys {
            table.register_var(key.clone())?;
        }
        for key in &order {
            let task = lookup(graph, key)?;
            table.register_func(key.clone(), task.callable.clone(), &task.args)?;
        }

        let (unit, bindings) = construct_call_wrapper(
            &self.options.wrapper_name,
            &table,
            input_keys,
            &order,
            output_key,
        )?;
        let source = unit.to_string();
        log::debug!("generated unit:\n{}", source);

        let wrapper = compile_unit(self.backend.as_ref(), &unit, &bindings)?;
        Ok(CompiledSubgraph {
            wrapper,
            input_keys: input_keys.to_vec(),
            output_key: output_key.clone(),
            source,
        })
    }

    /// Compile a single callable as a one-task subgraph
    ///
    /// The callable must declare its arity; every parameter becomes an input.
    pub fn compile_algorithm(&self, callable: &Callable) -> Result<CompiledSubgraph, CompileError> {
        let arity = callable
            .arity()
            .ok_or_else(|| CompileError::UnknownArity(callable.name().to_string()))?;

        let output_key = Key::from(callable.name());
        let input_keys: Vec<Key> = (0..arity)
            .map(|i| Key::from(format!("{}[{}]", callable.name(), i)))
            .collect();

        let task = input_keys
            .iter()
            .fold(Task::new(callable.clone()), |task, key| task.key(key));
        let mut graph = TaskGraph::new();
        graph.insert(output_key.clone(), task);

        self.compile_subgraph(&graph, &input_keys, &output_key)
    }
}

impl Default for SubgraphCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SubgraphCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubgraphCompiler")
            .field("options", &self.options)
            .field("backend", &self.backend.name())
            .finish()
    }
}

fn lookup<'g>(graph: &'g TaskGraph, key: &Key) -> Result<&'g Task, GraphError> {
    graph
        .get(key.as_str())
        .ok_or_else(|| GraphError::UnknownKey(key.clone()))
}

/// A fused subgraph
#[derive(Debug, Clone)]
pub struct CompiledSubgraph {
    wrapper: WrapperFn,
    input_keys: Vec<Key>,
    output_key: Key,
    source: String,
}

impl CompiledSubgraph {
    /// Run the subgraph with one value per input key
    pub fn call(&self, args: &[Value]) -> Result<Value, RuntimeError> {
        self.wrapper.call(args)
    }

    pub fn arity(&self) -> usize {
        self.wrapper.arity()
    }

    pub fn input_keys(&self) -> &[Key] {
        &self.input_keys
    }

    pub fn output_key(&self) -> &Key {
        &self.output_key
    }

    /// Source text of the synthesized unit
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn backend_name(&self) -> &str {
        self.wrapper.backend_name()
    }

    /// Wrap the compiled unit as a `Callable`, so it can be placed back into a
    /// task graph in place of the tasks it replaces
    pub fn into_callable(self) -> Callable {
        let name = format!("{}:{}", self.wrapper.name(), self.output_key);
        let arity = self.arity();
        let wrapper = self.wrapper;
        Callable::with_arity(name, arity, move |args| {
            wrapper.call(args).map_err(|err| match err {
                RuntimeError::Call { source, .. } => source,
                other => CallError::failed(other.to_string()),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{evaluate, TopologyError};
    use indexmap::IndexMap;

    fn add() -> Callable {
        Callable::with_arity("add", 2, |args| {
            Ok(Value::Int(args[0].as_int()? + args[1].as_int()?))
        })
    }

    fn mul() -> Callable {
        Callable::with_arity("mul", 2, |args| {
            Ok(Value::Int(args[0].as_int()? * args[1].as_int()?))
        })
    }

    fn interpreter() -> SubgraphCompiler {
        SubgraphCompiler::with_options(CompilerOptions::new().backend(BackendKind::Interpreter))
    }

    /// d = (a + 1) * (a + b), with a and b as boundary inputs
    fn diamond() -> TaskGraph {
        [
            ("c", Task::new(add()).key("a").literal(1i64)),
            ("e", Task::new(add()).key("a").key("b")),
            ("d", Task::new(mul()).key("c").key("e")),
        ]
        .into_iter()
        .collect()
    }

    fn keys(names: &[&str]) -> Vec<Key> {
        names.iter().map(|name| Key::from(*name)).collect()
    }

    #[test]
    fn test_compile_diamond() {
        let compiled = interpreter()
            .compile_subgraph(&diamond(), &keys(&["a", "b"]), &Key::from("d"))
            .unwrap();

        assert_eq!(compiled.arity(), 2);
        assert_eq!(compiled.backend_name(), "interpreter");
        assert_eq!(
            compiled.call(&[Value::Int(3), Value::Int(4)]),
            Ok(Value::Int(28))
        );
        assert_eq!(
            compiled.source(),
            "\
fn subgraph(var0, var1) {
    global const0;
    global func0;
    global func1;
    global func2;

    ret0 = func0(var0, const0);
    ret1 = func1(var0, var1);
    ret2 = func2(ret0, ret1);

    return ret2;
}
"
        );
    }

    #[test]
    fn test_matches_reference_evaluation() {
        let graph = diamond();
        let compiled = interpreter()
            .compile_subgraph(&graph, &keys(&["a", "b"]), &Key::from("d"))
            .unwrap();

        for (a, b) in [(0, 0), (-2, 5), (10, 1)] {
            let mut inputs = IndexMap::new();
            inputs.insert(Key::from("a"), Value::Int(a));
            inputs.insert(Key::from("b"), Value::Int(b));
            let expected = evaluate(&graph, &Key::from("d"), &inputs).unwrap();
            assert_eq!(compiled.call(&[Value::Int(a), Value::Int(b)]), Ok(expected));
        }
    }

    #[test]
    fn test_input_order_is_caller_order() {
        let compiled = interpreter()
            .compile_subgraph(&diamond(), &keys(&["b", "a"]), &Key::from("d"))
            .unwrap();
        assert_eq!(compiled.input_keys(), &keys(&["b", "a"])[..]);
        // b = 4, a = 3
        assert_eq!(
            compiled.call(&[Value::Int(4), Value::Int(3)]),
            Ok(Value::Int(28))
        );
    }

    #[test]
    fn test_only_ancestors_are_compiled() {
        let mut graph = diamond();
        graph.insert("unused", Task::new(add()).key("missing").literal(1i64));

        let compiled = interpreter()
            .compile_subgraph(&graph, &keys(&["a", "b"]), &Key::from("c"))
            .unwrap();
        assert_eq!(
            compiled.call(&[Value::Int(1), Value::Int(0)]),
            Ok(Value::Int(2))
        );
        assert!(!compiled.source().contains("func1"));
    }

    #[test]
    fn test_keyword_arguments_rejected() {
        let mut graph = diamond();
        graph.insert(
            "d",
            Task::new(mul())
                .key("c")
                .keyword("offset", Value::Float(4.0))
                .keyword("scale", Key::from("e")),
        );

        let err = interpreter()
            .compile_subgraph(&graph, &keys(&["a", "b"]), &Key::from("d"))
            .unwrap_err();
        assert_eq!(
            err,
            CompileError::UnsupportedCallingConvention {
                key: Key::from("d"),
                names: vec!["offset".to_string(), "scale".to_string()],
            }
        );
        let message = err.to_string();
        assert!(message.contains("offset"));
        assert!(message.contains("scale"));
        assert!(message.contains("`d`"));
    }

    #[test]
    fn test_keyword_reported_before_missing_dependency() {
        let graph: TaskGraph = [(
            "x",
            Task::new(mul())
                .literal(2i64)
                .keyword("offset", Key::from("nowhere")),
        )]
        .into_iter()
        .collect();

        let err = interpreter()
            .compile_subgraph(&graph, &[], &Key::from("x"))
            .unwrap_err();
        assert_eq!(
            err,
            CompileError::UnsupportedCallingConvention {
                key: Key::from("x"),
                names: vec!["offset".to_string()],
            }
        );
    }

    #[test]
    fn test_graph_errors() {
        let compiler = interpreter();

        let err = compiler
            .compile_subgraph(&diamond(), &keys(&["a"]), &Key::from("d"))
            .unwrap_err();
        assert_eq!(
            err,
            CompileError::Graph(GraphError::MissingDependency {
                key: Key::from("e"),
                missing: Key::from("b"),
            })
        );

        let err = compiler
            .compile_subgraph(&diamond(), &keys(&["a", "b"]), &Key::from("z"))
            .unwrap_err();
        assert_eq!(err, CompileError::Graph(GraphError::UnknownKey(Key::from("z"))));

        let err = compiler
            .compile_subgraph(&diamond(), &keys(&["a", "a", "b"]), &Key::from("d"))
            .unwrap_err();
        assert_eq!(
            err,
            CompileError::Symbol(SymbolError::DuplicateKey(Key::from("a")))
        );
    }

    #[test]
    fn test_cycle_rejected() {
        let graph: TaskGraph = [
            ("x", Task::new(add()).key("y").literal(1i64)),
            ("y", Task::new(add()).key("x").literal(1i64)),
        ]
        .into_iter()
        .collect();

        let err = interpreter()
            .compile_subgraph(&graph, &[], &Key::from("x"))
            .unwrap_err();
        assert!(matches!(
            err,
            CompileError::Graph(GraphError::Cycle(TopologyError::CycleDetected { .. }))
        ));
    }

    #[test]
    fn test_output_is_input() {
        let compiled = interpreter()
            .compile_subgraph(&diamond(), &keys(&["d"]), &Key::from("d"))
            .unwrap();
        assert_eq!(compiled.call(&[Value::Int(5)]), Ok(Value::Int(5)));
    }

    #[test]
    fn test_custom_wrapper_name() {
        let compiler = SubgraphCompiler::with_options(
            CompilerOptions::new()
                .backend(BackendKind::Interpreter)
                .wrapper_name("fused_d"),
        );
        let compiled = compiler
            .compile_subgraph(&diamond(), &keys(&["a", "b"]), &Key::from("d"))
            .unwrap();
        assert!(compiled.source().starts_with("fn fused_d(var0, var1) {"));

        let err = SubgraphCompiler::with_options(
            CompilerOptions::new()
                .backend(BackendKind::Interpreter)
                .wrapper_name("fused d"),
        )
        .compile_subgraph(&diamond(), &keys(&["a", "b"]), &Key::from("d"))
        .unwrap_err();
        assert_eq!(
            err,
            CompileError::Codegen(CodegenError::InvalidName("fused d".into()))
        );
    }

    #[test]
    fn test_compile_algorithm() {
        let compiled = interpreter().compile_algorithm(&mul()).unwrap();
        assert_eq!(compiled.arity(), 2);
        assert_eq!(
            compiled.call(&[Value::Int(6), Value::Int(7)]),
            Ok(Value::Int(42))
        );

        let untyped = Callable::new("untyped", |args| Ok(args[0].clone()));
        assert_eq!(
            interpreter().compile_algorithm(&untyped).unwrap_err(),
            CompileError::UnknownArity("untyped".into())
        );
    }

    #[test]
    fn test_into_callable() {
        let fused = interpreter()
            .compile_subgraph(&diamond(), &keys(&["a", "b"]), &Key::from("d"))
            .unwrap()
            .into_callable();
        assert_eq!(fused.arity(), Some(2));

        let graph: TaskGraph = [("out", Task::new(fused).literal(3i64).literal(4i64))]
            .into_iter()
            .collect();
        let value = evaluate(&graph, &Key::from("out"), &IndexMap::new()).unwrap();
        assert_eq!(value, Value::Int(28));
    }
}
