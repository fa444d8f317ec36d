use std::collections::HashMap;

use indexmap::IndexSet;
use thiserror::Error;

use crate::codegen::{Binding, Bindings, WrapperUnit};
use crate::symbols::{Namespace, Symbol};
use crate::value::{Callable, Value};

/// Problems found while checking a unit against its bindings
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("global `{0}` has no binding")]
    Unbound(Symbol),

    #[error("`{symbol}` must be bound to a {expected}")]
    BindingKind {
        symbol: Symbol,
        expected: &'static str,
    },

    #[error("`{0}` is declared more than once")]
    Duplicate(Symbol),

    #[error("`{0}` is used before it is defined")]
    Undefined(Symbol),

    #[error("`{0}` is not declared global")]
    Undeclared(Symbol),

    #[error("`{0}` is assigned more than once")]
    Reassigned(Symbol),

    #[error("function `{0}` cannot be used as a value")]
    NotAValue(Symbol),

    #[error("expected a unit named `{expected}`, found `{found}`")]
    NameMismatch { expected: String, found: String },
}

/// Where a step reads an argument from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operand {
    /// Parameter or call result
    Register(usize),
    /// Bound constant
    Const(usize),
}

/// A single call of a linked program
#[derive(Debug, Clone)]
pub(crate) struct Step {
    pub callee: Callable,
    pub func: Symbol,
    pub args: Vec<Operand>,
    pub target: usize,
}

/// A wrapper unit linked against its bindings, ready to execute
///
/// Registers `0..arity` hold the parameters, the rest hold call results in
/// statement order. Constants live in their own table and are cloned into the
/// argument list of each call that reads them.
#[derive(Debug, Clone)]
pub struct Program {
    pub(crate) name: String,
    pub(crate) arity: usize,
    pub(crate) registers: usize,
    pub(crate) consts: Vec<Value>,
    pub(crate) steps: Vec<Step>,
    pub(crate) output: Operand,
}

impl Program {
    /// Check `unit` against `bindings` and lower it to register form
    pub fn link(unit: &WrapperUnit, bindings: &Bindings) -> Result<Program, LinkError> {
        let mut scope: HashMap<Symbol, Operand> = HashMap::new();
        let mut funcs: HashMap<Symbol, Callable> = HashMap::new();
        let mut consts = Vec::new();

        for (register, param) in unit.params.iter().enumerate() {
            if scope.insert(*param, Operand::Register(register)).is_some() {
                return Err(LinkError::Duplicate(*param));
            }
        }

        let mut declared = IndexSet::new();
        for global in &unit.globals {
            if !declared.insert(*global) {
                return Err(LinkError::Duplicate(*global));
            }
            match (global.namespace(), bindings.get(global)) {
                (_, None) => return Err(LinkError::Unbound(*global)),
                (Namespace::Const, Some(Binding::Const(value))) => {
                    scope.insert(*global, Operand::Const(consts.len()));
                    consts.push(value.clone());
                }
                (Namespace::Func, Some(Binding::Func(callable))) => {
                    funcs.insert(*global, callable.clone());
                }
                (Namespace::Func, Some(_)) => {
                    return Err(LinkError::BindingKind {
                        symbol: *global,
                        expected: "function",
                    })
                }
                (_, Some(_)) => {
                    return Err(LinkError::BindingKind {
                        symbol: *global,
                        expected: "constant",
                    })
                }
            }
        }

        let mut registers = unit.params.len();
        let mut steps = Vec::with_capacity(unit.body.len());
        for statement in &unit.body {
            let callee = funcs
                .get(&statement.func)
                .cloned()
                .ok_or(LinkError::Undeclared(statement.func))?;

            let args = statement
                .args
                .iter()
                .map(|arg| resolve(arg, &scope, &funcs))
                .collect::<Result<Vec<_>, _>>()?;

            if scope.contains_key(&statement.target) || funcs.contains_key(&statement.target) {
                return Err(LinkError::Reassigned(statement.target));
            }
            scope.insert(statement.target, Operand::Register(registers));

            steps.push(Step {
                callee,
                func: statement.func,
                args,
                target: registers,
            });
            registers += 1;
        }

        let output = resolve(&unit.output, &scope, &funcs)?;

        log::debug!(
            "linked `{}`: {} parameter(s), {} constant(s), {} step(s)",
            unit.name,
            unit.params.len(),
            consts.len(),
            steps.len()
        );

        Ok(Program {
            name: unit.name.clone(),
            arity: unit.params.len(),
            registers,
            consts,
            steps,
            output,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of positional arguments the program expects
    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}

fn resolve(
    symbol: &Symbol,
    scope: &HashMap<Symbol, Operand>,
    funcs: &HashMap<Symbol, Callable>,
) -> Result<Operand, LinkError> {
    if let Some(operand) = scope.get(symbol) {
        return Ok(*operand);
    }
    if funcs.contains_key(symbol) {
        return Err(LinkError::NotAValue(*symbol));
    }
    match symbol.namespace() {
        Namespace::Const | Namespace::Func => Err(LinkError::Undeclared(*symbol)),
        Namespace::Var | Namespace::Ret => Err(LinkError::Undefined(*symbol)),
    }
}
