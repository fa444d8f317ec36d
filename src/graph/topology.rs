use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;

/// Error type for topology operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyError<K: Debug + Clone> {
    /// Cycle detected in the graph. `path` starts and ends at the same node.
    CycleDetected { path: Vec<K> },
}

impl<K: Debug + Clone> std::fmt::Display for TopologyError<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopologyError::CycleDetected { path } => {
                write!(f, "Cycle detected: ")?;
                for (i, node) in path.iter().enumerate() {
                    if i > 0 {
                        write!(f, " -> ")?;
                    }
                    write!(f, "{:?}", node)?;
                }
                Ok(())
            }
        }
    }
}

impl<K: Debug + Clone> std::error::Error for TopologyError<K> {}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// One level of the explicit DFS stack
struct Frame<K> {
    node: K,
    deps: Vec<K>,
    next: usize,
}

/// Generic topological sort using DFS over dependencies
///
/// # Arguments
/// * `nodes` - Iterator over all nodes to sort
/// * `get_dependencies` - Function that returns the dependencies (predecessors) for a node
///
/// # Returns
/// A vector of nodes in dependency order (dependencies before dependents), or an
/// error if a cycle is detected.
///
/// Dependencies that are not part of `nodes` are ignored, so callers can pass a
/// subset of a larger graph. The order is deterministic: nodes are visited in
/// iteration order and dependencies in the order `get_dependencies` returns them.
/// The DFS keeps its own stack so long chains do not exhaust the call stack.
pub fn topological_sort<K>(
    nodes: impl IntoIterator<Item = K>,
    get_dependencies: impl Fn(&K) -> Vec<K>,
) -> Result<Vec<K>, TopologyError<K>>
where
    K: Hash + Eq + Clone + Debug,
{
    let nodes: Vec<K> = nodes.into_iter().collect();
    let members: HashSet<K> = nodes.iter().cloned().collect();

    let deps_within = |node: &K| -> Vec<K> {
        get_dependencies(node)
            .into_iter()
            .filter(|dep| members.contains(dep))
            .collect()
    };

    let mut sorted = Vec::with_capacity(nodes.len());
    let mut marks: HashMap<K, Mark> = HashMap::with_capacity(nodes.len());

    for root in &nodes {
        if marks.contains_key(root) {
            continue;
        }

        marks.insert(root.clone(), Mark::InProgress);
        let mut stack = vec![Frame {
            node: root.clone(),
            deps: deps_within(root),
            next: 0,
        }];

        loop {
            let next_dep = match stack.last_mut() {
                None => break,
                Some(frame) if frame.next < frame.deps.len() => {
                    frame.next += 1;
                    Some(frame.deps[frame.next - 1].clone())
                }
                Some(_) => None,
            };

            match next_dep {
                Some(dep) => match marks.get(&dep) {
                    Some(Mark::Done) => {}
                    Some(Mark::InProgress) => {
                        // The cycle is the part of the stack above `dep`
                        let start = stack.iter().position(|f| f.node == dep).unwrap_or(0);
                        let mut path: Vec<K> =
                            stack[start..].iter().map(|f| f.node.clone()).collect();
                        path.push(dep);
                        return Err(TopologyError::CycleDetected { path });
                    }
                    None => {
                        marks.insert(dep.clone(), Mark::InProgress);
                        let deps = deps_within(&dep);
                        stack.push(Frame {
                            node: dep,
                            deps,
                            next: 0,
                        });
                    }
                },
                None => {
                    if let Some(frame) = stack.pop() {
                        marks.insert(frame.node.clone(), Mark::Done);
                        sorted.push(frame.node);
                    }
                }
            }
        }
    }

    Ok(sorted)
}
