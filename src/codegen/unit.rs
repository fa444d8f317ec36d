use std::fmt;

use crate::symbols::Symbol;

/// One call inside a wrapper unit: `target = func(args...)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub target: Symbol,
    pub func: Symbol,
    pub args: Vec<Symbol>,
}

/// The synthesized composite of a subgraph
///
/// A unit takes its parameters in order, reads constants and functions declared
/// as globals from its binding environment, runs its statements top to bottom
/// and returns `output`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperUnit {
    pub name: String,
    pub params: Vec<Symbol>,
    pub globals: Vec<Symbol>,
    pub body: Vec<Statement>,
    pub output: Symbol,
}

fn write_list(f: &mut fmt::Formatter<'_>, symbols: &[Symbol]) -> fmt::Result {
    for (i, symbol) in symbols.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", symbol)?;
    }
    Ok(())
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}(", self.target, self.func)?;
        write_list(f, &self.args)?;
        write!(f, ");")
    }
}

/// Renders the unit source, e.g.
///
/// ```text
/// fn subgraph0(var0) {
///     global const0;
///     global func0;
///
///     ret0 = func0(var0, const0);
///
///     return ret0;
/// }
/// ```
impl fmt::Display for WrapperUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn {}(", self.name)?;
        write_list(f, &self.params)?;
        writeln!(f, ") {{")?;

        for global in &self.globals {
            writeln!(f, "    global {};", global)?;
        }
        if !self.globals.is_empty() {
            writeln!(f)?;
        }

        for statement in &self.body {
            writeln!(f, "    {}", statement)?;
        }
        if !self.body.is_empty() {
            writeln!(f)?;
        }

        writeln!(f, "    return {};", self.output)?;
        writeln!(f, "}}")
    }
}
