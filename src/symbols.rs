//! Symbolic names for the pieces of a fused unit
//!
//! Every input variable, literal constant, called function and call result of
//! a compiled subgraph gets a symbol from one of four namespaces. Each namespace
//! has its own counter that starts at zero and only moves forward, so symbols
//! are unique within a table and stable for identical registration sequences.

use std::fmt;

use indexmap::IndexMap;
use thiserror::Error;

use crate::graph::{Arg, Key};
use crate::value::{Callable, Value};

/// Namespace a symbol belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    /// Input variable of the unit
    Var,
    /// Literal bound from the enclosing scope
    Const,
    /// Function bound from the enclosing scope
    Func,
    /// Result of a call
    Ret,
}

impl Namespace {
    pub const ALL: [Namespace; 4] = [
        Namespace::Var,
        Namespace::Const,
        Namespace::Func,
        Namespace::Ret,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            Namespace::Var => "var",
            Namespace::Const => "const",
            Namespace::Func => "func",
            Namespace::Ret => "ret",
        }
    }

    fn slot(self) -> usize {
        match self {
            Namespace::Var => 0,
            Namespace::Const => 1,
            Namespace::Func => 2,
            Namespace::Ret => 3,
        }
    }
}

/// A namespaced symbol such as `var0` or `ret3`
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol {
    namespace: Namespace,
    index: usize,
}

impl Symbol {
    pub fn new(namespace: Namespace, index: usize) -> Self {
        Self { namespace, index }
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Inverse of `Display`. Indices must be written without leading zeros.
    pub fn parse(text: &str) -> Option<Symbol> {
        Namespace::ALL.into_iter().find_map(|namespace| {
            let digits = text.strip_prefix(namespace.prefix())?;
            if digits.is_empty()
                || !digits.bytes().all(|b| b.is_ascii_digit())
                || (digits.len() > 1 && digits.starts_with('0'))
            {
                return None;
            }
            digits.parse().ok().map(|index| Symbol::new(namespace, index))
        })
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.namespace.prefix(), self.index)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl PartialEq<str> for Symbol {
    fn eq(&self, other: &str) -> bool {
        Symbol::parse(other) == Some(*self)
    }
}

impl PartialEq<&str> for Symbol {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SymbolError {
    #[error("key `{0}` is already registered")]
    DuplicateKey(Key),

    #[error("argument `{key}` of `{func}` is not a registered variable or function")]
    UnresolvedKey { func: Key, key: Key },

    #[error("`{func}` passes `{name}` by keyword; only positional arguments can be registered")]
    KeywordArgument { func: Key, name: String },
}

/// Symbol allocation and lookup for one compilation
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    counters: [usize; 4],

    var_key_to_sym: IndexMap<Key, Symbol>,
    var_sym_to_key: IndexMap<Symbol, Key>,

    const_sym_to_value: IndexMap<Symbol, Value>,

    func_key_to_sym: IndexMap<Key, Symbol>,
    func_sym_to_key: IndexMap<Symbol, Key>,
    func_sym_to_func: IndexMap<Symbol, Callable>,
    func_sym_to_ret_sym: IndexMap<Symbol, Symbol>,
    func_sym_to_args_sym: IndexMap<Symbol, Vec<Symbol>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self, namespace: Namespace) -> Symbol {
        let counter = &mut self.counters[namespace.slot()];
        let symbol = Symbol::new(namespace, *counter);
        *counter += 1;
        symbol
    }

    pub fn next_var(&mut self) -> Symbol {
        self.next(Namespace::Var)
    }

    pub fn next_const(&mut self) -> Symbol {
        self.next(Namespace::Const)
    }

    pub fn next_func(&mut self) -> Symbol {
        self.next(Namespace::Func)
    }

    pub fn next_ret(&mut self) -> Symbol {
        self.next(Namespace::Ret)
    }

    /// True if `key` is registered as either a variable or a function
    pub fn contains_key(&self, key: &Key) -> bool {
        self.var_key_to_sym.contains_key(key) || self.func_key_to_sym.contains_key(key)
    }

    /// Register an input variable. A key can only be registered once.
    pub fn register_var(&mut self, key: impl Into<Key>) -> Result<Symbol, SymbolError> {
        let key = key.into();
        if self.contains_key(&key) {
            return Err(SymbolError::DuplicateKey(key));
        }

        let symbol = self.next_var();
        log::trace!("registered {} for input `{}`", symbol, key);
        self.var_key_to_sym.insert(key.clone(), symbol);
        self.var_sym_to_key.insert(symbol, key);
        Ok(symbol)
    }

    /// Register a call of `callable` under `key`
    ///
    /// Keys in `args` must already be registered; they resolve to the variable or
    /// to the result of the earlier call. Literals become fresh constants. On error
    /// the table, counters included, is left untouched.
    pub fn register_func(
        &mut self,
        key: impl Into<Key>,
        callable: Callable,
        args: &[Arg],
    ) -> Result<Symbol, SymbolError> {
        let key = key.into();
        if self.contains_key(&key) {
            return Err(SymbolError::DuplicateKey(key));
        }
        for arg in args {
            match arg {
                Arg::Key(dep) if self.find_key(dep).is_none() => {
                    return Err(SymbolError::UnresolvedKey {
                        func: key,
                        key: dep.clone(),
                    });
                }
                Arg::Keyword { name, .. } => {
                    return Err(SymbolError::KeywordArgument {
                        func: key,
                        name: name.clone(),
                    });
                }
                _ => {}
            }
        }

        let func_sym = self.next_func();
        let ret_sym = self.next_ret();

        let mut arg_syms = Vec::with_capacity(args.len());
        for arg in args {
            let symbol = match self.find_symbol(arg) {
                Some(symbol) => symbol,
                None => {
                    let symbol = self.next_const();
                    if let Arg::Literal(value) = arg {
                        self.const_sym_to_value.insert(symbol, value.clone());
                    }
                    symbol
                }
            };
            arg_syms.push(symbol);
        }

        log::trace!(
            "registered {} = {}{:?} for task `{}`",
            ret_sym,
            func_sym,
            arg_syms,
            key
        );

        self.func_key_to_sym.insert(key.clone(), func_sym);
        self.func_sym_to_key.insert(func_sym, key);
        self.func_sym_to_func.insert(func_sym, callable);
        self.func_sym_to_ret_sym.insert(func_sym, ret_sym);
        self.func_sym_to_args_sym.insert(func_sym, arg_syms);
        Ok(func_sym)
    }

    /// Symbol holding the value of `arg`
    ///
    /// Variables resolve to their var symbol and functions to their result symbol.
    /// Literals and keyword arguments never resolve.
    pub fn find_symbol(&self, arg: &Arg) -> Option<Symbol> {
        match arg {
            Arg::Key(key) => self.find_key(key),
            Arg::Literal(_) | Arg::Keyword { .. } => None,
        }
    }

    pub fn find_key(&self, key: &Key) -> Option<Symbol> {
        self.var_key_to_sym
            .get(key)
            .or_else(|| {
                self.func_key_to_sym
                    .get(key)
                    .and_then(|func| self.func_sym_to_ret_sym.get(func))
            })
            .copied()
    }

    pub fn var_key_to_sym(&self) -> &IndexMap<Key, Symbol> {
        &self.var_key_to_sym
    }

    pub fn var_sym_to_key(&self) -> &IndexMap<Symbol, Key> {
        &self.var_sym_to_key
    }

    pub fn const_sym_to_value(&self) -> &IndexMap<Symbol, Value> {
        &self.const_sym_to_value
    }

    pub fn func_key_to_sym(&self) -> &IndexMap<Key, Symbol> {
        &self.func_key_to_sym
    }

    pub fn func_sym_to_key(&self) -> &IndexMap<Symbol, Key> {
        &self.func_sym_to_key
    }

    pub fn func_sym_to_func(&self) -> &IndexMap<Symbol, Callable> {
        &self.func_sym_to_func
    }

    pub fn func_sym_to_ret_sym(&self) -> &IndexMap<Symbol, Symbol> {
        &self.func_sym_to_ret_sym
    }

    pub fn func_sym_to_args_sym(&self) -> &IndexMap<Symbol, Vec<Symbol>> {
        &self.func_sym_to_args_sym
    }
}
