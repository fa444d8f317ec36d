mod evaluate;
pub mod topology;
mod types;

pub use evaluate::{evaluate, EvalError};
pub use topology::{topological_sort, TopologyError};
pub use types::{Arg, GraphError, Key, Task, TaskGraph};
