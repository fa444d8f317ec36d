use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use thiserror::Error;

use super::topology::TopologyError;
use crate::value::{Callable, Value};

/// Identifier of a task (or of an externally supplied value) in a task graph
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(Arc<str>);

impl Key {
    pub fn new(key: impl Into<Arc<str>>) -> Self {
        Key(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Key {
    fn from(key: &str) -> Self {
        Key::new(key)
    }
}

impl From<String> for Key {
    fn from(key: String) -> Self {
        Key::new(key)
    }
}

impl From<&Key> for Key {
    fn from(key: &Key) -> Self {
        key.clone()
    }
}

/// Argument of a task call
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// Result of another task, or a boundary input supplied by the caller
    Key(Key),
    /// Literal value embedded in the graph
    Literal(Value),
    /// Argument passed by name. Fused units only support positional calls.
    Keyword { name: String, value: Box<Arg> },
}

impl Arg {
    pub fn key(key: impl Into<Key>) -> Self {
        Arg::Key(key.into())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Arg::Literal(value.into())
    }
}

impl From<Key> for Arg {
    fn from(key: Key) -> Self {
        Arg::Key(key)
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Arg::Literal(value)
    }
}

/// A single call in a task graph: a callable plus its arguments
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub callable: Callable,
    pub args: Vec<Arg>,
}

impl Task {
    pub fn new(callable: Callable) -> Self {
        Self {
            callable,
            args: Vec::new(),
        }
    }

    /// Append a reference to another key
    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.args.push(Arg::Key(key.into()));
        self
    }

    /// Append a literal value
    pub fn literal(mut self, value: impl Into<Value>) -> Self {
        self.args.push(Arg::Literal(value.into()));
        self
    }

    /// Append a named argument
    pub fn keyword(mut self, name: impl Into<String>, value: impl Into<Arg>) -> Self {
        self.args.push(Arg::Keyword {
            name: name.into(),
            value: Box::new(value.into()),
        });
        self
    }

    /// Names of all keyword arguments, in declaration order
    pub fn keyword_names(&self) -> Vec<&str> {
        self.args
            .iter()
            .filter_map(|arg| match arg {
                Arg::Keyword { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Every key this task reads, including keys passed by name, in argument order
    pub fn dependencies(&self) -> Vec<&Key> {
        fn collect<'a>(arg: &'a Arg, out: &mut Vec<&'a Key>) {
            match arg {
                Arg::Key(key) => out.push(key),
                Arg::Literal(_) => {}
                Arg::Keyword { value, .. } => collect(value, out),
            }
        }

        let mut deps = Vec::new();
        for arg in &self.args {
            collect(arg, &mut deps);
        }
        deps
    }
}

/// Structural problems in a task graph
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("key `{0}` is neither a task in the graph nor a boundary input")]
    UnknownKey(Key),

    #[error("task `{key}` depends on `{missing}`, which is neither a task in the graph nor a boundary input")]
    MissingDependency { key: Key, missing: Key },

    #[error("{0}")]
    Cycle(TopologyError<Key>),
}

impl From<TopologyError<Key>> for GraphError {
    fn from(err: TopologyError<Key>) -> Self {
        GraphError::Cycle(err)
    }
}

/// Mapping from key to task, iterated in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskGraph {
    tasks: IndexMap<Key, Task>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a task, returning the task previously stored under `key`
    pub fn insert(&mut self, key: impl Into<Key>, task: Task) -> Option<Task> {
        self.tasks.insert(key.into(), task)
    }

    pub fn remove(&mut self, key: &str) -> Option<Task> {
        self.tasks.shift_remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Task> {
        self.tasks.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.tasks.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.tasks.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Task)> {
        self.tasks.iter()
    }

    /// Tasks needed to compute `output`, stopping at `boundary` keys
    ///
    /// The returned set is ordered by discovery from `output` and never contains
    /// boundary keys. An `output` that is itself a boundary key yields an empty set.
    pub fn ancestors(
        &self,
        output: &Key,
        boundary: &IndexSet<Key>,
    ) -> Result<IndexSet<Key>, GraphError> {
        self.ancestors_with(output, boundary, |_, _| Ok(()))
    }

    /// Like `ancestors`, but calls `inspect` on every task as it joins the
    /// closure, before any of its dependencies are resolved.
    pub fn ancestors_with<E, F>(
        &self,
        output: &Key,
        boundary: &IndexSet<Key>,
        mut inspect: F,
    ) -> Result<IndexSet<Key>, E>
    where
        E: From<GraphError>,
        F: FnMut(&Key, &Task) -> Result<(), E>,
    {
        let mut closure = IndexSet::new();
        if boundary.contains(output) {
            return Ok(closure);
        }
        if !self.contains_key(output.as_str()) {
            return Err(GraphError::UnknownKey(output.clone()).into());
        }

        let mut pending = vec![output.clone()];
        while let Some(key) = pending.pop() {
            if !closure.insert(key.clone()) {
                continue;
            }
            let task = &self.tasks[&key];
            inspect(&key, task)?;
            for dep in task.dependencies() {
                if boundary.contains(dep) || closure.contains(dep) {
                    continue;
                }
                if !self.contains_key(dep.as_str()) {
                    return Err(GraphError::MissingDependency {
                        key: key.clone(),
                        missing: dep.clone(),
                    }
                    .into());
                }
                pending.push(dep.clone());
            }
        }

        Ok(closure)
    }
}

impl<K: Into<Key>> FromIterator<(K, Task)> for TaskGraph {
    fn from_iter<I: IntoIterator<Item = (K, Task)>>(iter: I) -> Self {
        Self {
            tasks: iter.into_iter().map(|(k, t)| (k.into(), t)).collect(),
        }
    }
}
