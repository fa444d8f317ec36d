use thiserror::Error;

use super::unit::{Statement, WrapperUnit};
use crate::symbols::{Namespace, Symbol};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl ParseError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// True for names made of ASCII letters, digits and `_` that do not start with a digit
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !matches!(name, "fn" | "global" | "return")
}

#[derive(PartialEq)]
enum Section {
    Globals,
    Body,
    Returned,
    Closed,
}

/// Parse wrapper unit source as produced by `WrapperUnit`'s `Display`
///
/// Blank lines and indentation are ignored. Declarations must come before
/// statements and `return` must be the last line of the body.
pub fn parse_wrapper(text: &str) -> Result<WrapperUnit, ParseError> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty());

    let (header_line, header) = lines
        .next()
        .ok_or_else(|| ParseError::new(1, "empty source"))?;
    let (name, params) = parse_header(header_line, header)?;

    let mut globals = Vec::new();
    let mut body = Vec::new();
    let mut output = None;
    let mut section = Section::Globals;

    for (line_no, line) in lines {
        if section == Section::Closed {
            return Err(ParseError::new(line_no, "unexpected text after end of unit"));
        }

        if line == "}" {
            if section != Section::Returned {
                return Err(ParseError::new(line_no, "unit ends without a return"));
            }
            section = Section::Closed;
        } else if section == Section::Returned {
            return Err(ParseError::new(line_no, "statement after return"));
        } else if let Some(rest) = line.strip_prefix("global ") {
            if section != Section::Globals {
                return Err(ParseError::new(
                    line_no,
                    "global declaration after the first statement",
                ));
            }
            let symbol = parse_symbol(line_no, strip_semicolon(line_no, rest)?)?;
            if !matches!(symbol.namespace(), Namespace::Const | Namespace::Func) {
                return Err(ParseError::new(
                    line_no,
                    format!("`{}` cannot be declared global", symbol),
                ));
            }
            globals.push(symbol);
        } else if let Some(rest) = line.strip_prefix("return ") {
            output = Some(parse_symbol(line_no, strip_semicolon(line_no, rest)?)?);
            section = Section::Returned;
        } else {
            body.push(parse_statement(line_no, line)?);
            section = Section::Body;
        }
    }

    if section != Section::Closed {
        return Err(ParseError::new(
            text.lines().count().max(1),
            "missing closing `}`",
        ));
    }

    Ok(WrapperUnit {
        name,
        params,
        globals,
        body,
        // `Closed` is only reachable after a return
        output: output.ok_or_else(|| ParseError::new(header_line, "missing return"))?,
    })
}

fn parse_header(line_no: usize, line: &str) -> Result<(String, Vec<Symbol>), ParseError> {
    let rest = line
        .strip_prefix("fn ")
        .ok_or_else(|| ParseError::new(line_no, "expected `fn <name>(<params>) {`"))?;
    let (name, rest) = rest
        .split_once('(')
        .ok_or_else(|| ParseError::new(line_no, "expected `(` after unit name"))?;
    let name = name.trim();
    if !is_identifier(name) {
        return Err(ParseError::new(
            line_no,
            format!("`{}` is not a valid unit name", name),
        ));
    }

    let (params, rest) = rest
        .split_once(')')
        .ok_or_else(|| ParseError::new(line_no, "expected `)` after parameters"))?;
    if rest.trim() != "{" {
        return Err(ParseError::new(line_no, "expected `{` after parameters"));
    }

    let params = parse_list(line_no, params)?;
    if let Some(bad) = params.iter().find(|s| s.namespace() != Namespace::Var) {
        return Err(ParseError::new(
            line_no,
            format!("parameter `{}` is not a variable", bad),
        ));
    }

    Ok((name.to_string(), params))
}

fn parse_statement(line_no: usize, line: &str) -> Result<Statement, ParseError> {
    let line = strip_semicolon(line_no, line)?;
    let (target, call) = line
        .split_once('=')
        .ok_or_else(|| ParseError::new(line_no, "expected `<ret> = <func>(<args>);`"))?;

    let target = parse_symbol(line_no, target)?;
    if target.namespace() != Namespace::Ret {
        return Err(ParseError::new(
            line_no,
            format!("cannot assign to `{}`", target),
        ));
    }

    let (func, args) = call
        .trim()
        .strip_suffix(')')
        .and_then(|call| call.split_once('('))
        .ok_or_else(|| ParseError::new(line_no, "expected a call `<func>(<args>)`"))?;
    let func = parse_symbol(line_no, func)?;
    if func.namespace() != Namespace::Func {
        return Err(ParseError::new(
            line_no,
            format!("`{}` is not a function", func),
        ));
    }

    Ok(Statement {
        target,
        func,
        args: parse_list(line_no, args)?,
    })
}

fn parse_list(line_no: usize, list: &str) -> Result<Vec<Symbol>, ParseError> {
    if list.trim().is_empty() {
        return Ok(Vec::new());
    }
    list.split(',')
        .map(|item| parse_symbol(line_no, item))
        .collect()
}

fn parse_symbol(line_no: usize, text: &str) -> Result<Symbol, ParseError> {
    let text = text.trim();
    Symbol::parse(text)
        .ok_or_else(|| ParseError::new(line_no, format!("`{}` is not a symbol", text)))
}

fn strip_semicolon(line_no: usize, text: &str) -> Result<&str, ParseError> {
    text.trim_end()
        .strip_suffix(';')
        .ok_or_else(|| ParseError::new(line_no, "expected `;`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "\
fn subgraph0(var0, var1) {
    global const0;
    global func0;

    ret0 = func0(var0, var1, const0);

    return ret0;
}
";

    #[test]
    fn test_parse_roundtrip() {
        let unit = parse_wrapper(SOURCE).unwrap();
        assert_eq!(unit.name, "subgraph0");
        assert_eq!(unit.params, vec![Symbol::new(Namespace::Var, 0), Symbol::new(Namespace::Var, 1)]);
        assert_eq!(unit.body.len(), 1);
        assert_eq!(unit.output, "ret0");
        assert_eq!(unit.to_string(), SOURCE);
    }

    #[test]
    fn test_parse_empty_unit() {
        let unit = parse_wrapper("fn identity(var0) {\n    return var0;\n}\n").unwrap();
        assert!(unit.globals.is_empty());
        assert!(unit.body.is_empty());
        assert_eq!(unit.output, "var0");
    }

    #[test]
    fn test_identifiers() {
        assert!(is_identifier("subgraph0"));
        assert!(is_identifier("_fused"));
        assert!(!is_identifier("0abc"));
        assert!(!is_identifier("scale-1"));
        assert!(!is_identifier("return"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn test_parse_errors() {
        let cases = [
            ("", "empty source"),
            ("fn 1x(var0) {\n return var0;\n}", "not a valid unit name"),
            ("fn f(const0) {\n return const0;\n}", "not a variable"),
            ("fn f(var0) {\n ret0 = func0(var0);\n global func0;\n return ret0;\n}", "after the first statement"),
            ("fn f(var0) {\n var1 = func0(var0);\n return var1;\n}", "cannot assign"),
            ("fn f(var0) {\n ret0 = const0(var0);\n return ret0;\n}", "not a function"),
            ("fn f(var0) {\n global ret0;\n return var0;\n}", "cannot be declared global"),
            ("fn f(var0) {\n return var0\n}", "expected `;`"),
            ("fn f(var0) {\n}", "without a return"),
            ("fn f(var0) {\n return var0;\n ret0 = func0(var0);\n}", "after return"),
            ("fn f(var0) {\n return var0;\n", "missing closing"),
            ("fn f(var0) {\n return var0;\n}\nfn g() {", "after end of unit"),
        ];

        for (source, expected) in cases {
            let err = parse_wrapper(source).unwrap_err();
            assert!(
                err.message.contains(expected),
                "source {:?}: expected error containing {:?}, got {:?}",
                source,
                expected,
                err.message
            );
        }
    }

    #[test]
    fn test_error_line_numbers() {
        let err = parse_wrapper("fn f(var0) {\n\n    ret0 = func0(x);\n}").unwrap_err();
        assert_eq!(err.line, 3);
        assert_eq!(err.to_string(), "line 3: `x` is not a symbol");
    }
}
