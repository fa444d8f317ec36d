//! Reference evaluation of a task graph
//!
//! Executes the tasks needed for one key, one call at a time, in dependency
//! order. This is the behaviour a fused unit must reproduce.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use thiserror::Error;

use super::topology::topological_sort;
use super::types::{Arg, GraphError, Key, TaskGraph};
use crate::value::{CallError, Value};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("task `{key}` failed: {source}")]
    Call { key: Key, source: CallError },
}

/// Compute the value of `output`
///
/// `inputs` supplies values for boundary keys; those keys are not expanded even if
/// the graph also has tasks for them. Keyword arguments are passed positionally,
/// in declaration order.
pub fn evaluate(
    graph: &TaskGraph,
    output: &Key,
    inputs: &IndexMap<Key, Value>,
) -> Result<Value, EvalError> {
    if let Some(value) = inputs.get(output) {
        return Ok(value.clone());
    }

    let boundary: IndexSet<Key> = inputs.keys().cloned().collect();
    let closure = graph.ancestors(output, &boundary)?;
    let order = topological_sort(closure, |key| {
        graph
            .get(key.as_str())
            .map(|task| task.dependencies().into_iter().cloned().collect())
            .unwrap_or_default()
    })
    .map_err(GraphError::from)?;

    let mut results: HashMap<Key, Value> = HashMap::with_capacity(order.len());
    for key in order {
        let task = graph
            .get(key.as_str())
            .ok_or_else(|| GraphError::UnknownKey(key.clone()))?;

        let mut args = Vec::with_capacity(task.args.len());
        for arg in &task.args {
            args.push(resolve(arg, &key, inputs, &results)?);
        }

        let value = task
            .callable
            .call(&args)
            .map_err(|source| EvalError::Call {
                key: key.clone(),
                source,
            })?;
        results.insert(key, value);
    }

    results
        .remove(output)
        .ok_or_else(|| GraphError::UnknownKey(output.clone()).into())
}

fn resolve(
    arg: &Arg,
    task: &Key,
    inputs: &IndexMap<Key, Value>,
    results: &HashMap<Key, Value>,
) -> Result<Value, GraphError> {
    match arg {
        Arg::Literal(value) => Ok(value.clone()),
        Arg::Keyword { value, .. } => resolve(value, task, inputs, results),
        Arg::Key(key) => inputs
            .get(key)
            .or_else(|| results.get(key))
            .cloned()
            .ok_or_else(|| GraphError::MissingDependency {
                key: task.clone(),
                missing: key.clone(),
            }),
    }
}
