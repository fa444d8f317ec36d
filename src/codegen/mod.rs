//! Wrapper unit synthesis
//!
//! Turns a populated `SymbolTable` and an execution order into a `WrapperUnit`
//! plus the private bindings (constants and functions) the unit reads. The unit
//! renders to source text and parses back, so the same unit can be logged,
//! inspected, or handed to `backend::compile_wrapper` as text.

mod parse;
mod unit;

pub use parse::{is_identifier, parse_wrapper, ParseError};
pub use unit::{Statement, WrapperUnit};

use indexmap::{IndexMap, IndexSet};
use thiserror::Error;

use crate::graph::Key;
use crate::symbols::{Namespace, Symbol, SymbolTable};
use crate::value::{Callable, Value};

/// Value a global symbol is bound to
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Const(Value),
    Func(Callable),
}

/// Binding environment of one unit, in declaration order
pub type Bindings = IndexMap<Symbol, Binding>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodegenError {
    #[error("`{0}` is not a valid wrapper name")]
    InvalidName(String),

    #[error("input `{0}` is not a registered variable")]
    UnknownInput(Key),

    #[error("`{0}` is not a registered function")]
    UnknownCall(Key),

    #[error("output `{0}` does not resolve to a symbol")]
    UnresolvedOutput(Key),

    #[error("symbol `{0}` has no binding in the symbol table")]
    Unbound(Symbol),
}

/// Build the wrapper unit for `execute_keys` and collect its bindings
///
/// Parameters follow `input_keys`, statements follow `execute_keys`. Globals are
/// the constants in order of first use followed by the functions in execution
/// order; the returned bindings use the same order.
pub fn construct_call_wrapper(
    wrapper_name: &str,
    symbol_table: &SymbolTable,
    input_keys: &[Key],
    execute_keys: &[Key],
    output_key: &Key,
) -> Result<(WrapperUnit, Bindings), CodegenError> {
    if !is_identifier(wrapper_name) {
        return Err(CodegenError::InvalidName(wrapper_name.to_string()));
    }

    let params = input_keys
        .iter()
        .map(|key| {
            symbol_table
                .var_key_to_sym()
                .get(key)
                .copied()
                .ok_or_else(|| CodegenError::UnknownInput(key.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut consts = IndexSet::new();
    let mut funcs = IndexSet::new();
    let mut body = Vec::with_capacity(execute_keys.len());

    for key in execute_keys {
        let func = *symbol_table
            .func_key_to_sym()
            .get(key)
            .ok_or_else(|| CodegenError::UnknownCall(key.clone()))?;
        let target = *symbol_table
            .func_sym_to_ret_sym()
            .get(&func)
            .ok_or(CodegenError::Unbound(func))?;
        let args = symbol_table
            .func_sym_to_args_sym()
            .get(&func)
            .cloned()
            .ok_or(CodegenError::Unbound(func))?;

        consts.extend(
            args.iter()
                .copied()
                .filter(|arg| arg.namespace() == Namespace::Const),
        );
        funcs.insert(func);
        body.push(Statement { target, func, args });
    }

    let output = symbol_table
        .find_key(output_key)
        .ok_or_else(|| CodegenError::UnresolvedOutput(output_key.clone()))?;

    let mut bindings = Bindings::with_capacity(consts.len() + funcs.len());
    for symbol in &consts {
        let value = symbol_table
            .const_sym_to_value()
            .get(symbol)
            .ok_or(CodegenError::Unbound(*symbol))?;
        bindings.insert(*symbol, Binding::Const(value.clone()));
    }
    for symbol in &funcs {
        let callable = symbol_table
            .func_sym_to_func()
            .get(symbol)
            .ok_or(CodegenError::Unbound(*symbol))?;
        bindings.insert(*symbol, Binding::Func(callable.clone()));
    }

    let unit = WrapperUnit {
        name: wrapper_name.to_string(),
        params,
        globals: bindings.keys().copied().collect(),
        body,
        output,
    };
    Ok((unit, bindings))
}

/// Same as `construct_call_wrapper`, returning the rendered source text
pub fn construct_call_wrapper_text(
    wrapper_name: &str,
    symbol_table: &SymbolTable,
    input_keys: &[Key],
    execute_keys: &[Key],
    output_key: &Key,
) -> Result<(String, Bindings), CodegenError> {
    let (unit, bindings) = construct_call_wrapper(
        wrapper_name,
        symbol_table,
        input_keys,
        execute_keys,
        output_key,
    )?;
    Ok((unit.to_string(), bindings))
}
