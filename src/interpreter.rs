// ABOUTME: Wires tokenizer -> parser -> standardizer -> control generator -> CSE machine together

use crate::ast::Node;
use crate::control::CsGenerator;
use crate::cse::CseMachine;
use crate::env::Environment;
use crate::error::RpalError;
use crate::parser;
use crate::standardizer;
use crate::token::{self, TokenizerWarning};
use crate::value::Value;
use std::collections::HashMap;

/// Maps every surface primitive name to the internal operator tag the CSE
/// machine dispatches on. Several surface names share one internal tag
/// (`Print` and `print` both resolve to the `print` built-in function).
fn primitive_bindings() -> HashMap<String, Value> {
    let table: &[(&str, &str)] = &[
        ("Print", "print"),
        ("print", "print"),
        ("Conc", "conc"),
        ("Stem", "stem"),
        ("Stern", "stern"),
        ("Isinteger", "isInteger"),
        ("Isstring", "isString"),
        ("Istruthvalue", "isTruthValue"),
        ("Isfunction", "isFunction"),
        ("Istuple", "isTuple"),
        ("Isdummy", "isDummy"),
        ("Order", "order"),
        ("Null", "null"),
    ];
    table
        .iter()
        .map(|(surface, internal)| (surface.to_string(), Value::Builtin(internal.to_string())))
        .collect()
}

/// Optional per-run limits and requests for intermediate artifacts, set by
/// the CLI front end from its flags.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub step_budget: Option<usize>,
    pub dump_ast: bool,
    pub dump_st: bool,
}

#[derive(Debug, Clone)]
pub struct InterpretResult {
    pub value: Value,
    pub output: String,
    pub warnings: Vec<TokenizerWarning>,
    pub ast: Option<Node>,
    pub st: Option<Node>,
}

/// Runs the full pipeline over `source` and returns the final value plus
/// any `Print` output accumulated along the way.
pub fn interpret(source: &str, config: &Config) -> Result<InterpretResult, RpalError> {
    let (tokens, warnings) = token::tokenize(source);
    tracing::debug!(count = tokens.len(), warnings = warnings.len(), "tokenized source");

    let ast = parser::parse(tokens)?;
    tracing::debug!("parsed ast");
    let dumped_ast = if config.dump_ast { Some(ast.clone()) } else { None };

    let mut st = ast;
    standardizer::standardize(&mut st)?;
    tracing::debug!("standardized tree");
    let dumped_st = if config.dump_st { Some(st.clone()) } else { None };

    let structures = CsGenerator::generate(&st)?;
    tracing::debug!(count = structures.len(), "generated control structures");
    let root = Environment::root(0, primitive_bindings());
    let mut machine = CseMachine::new(structures, root, config.step_budget)?;
    let value = machine.run()?;

    Ok(InterpretResult {
        value,
        output: machine.output().to_string(),
        warnings,
        ast: dumped_ast,
        st: dumped_st,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> InterpretResult {
        interpret(source, &Config::default()).expect("expected interpretation to succeed")
    }

    // ------------------------------------------------------------------
    // End-to-end scenarios
    // ------------------------------------------------------------------

    #[test]
    fn test_print_of_integer_literal() {
        let result = run("Print(42)");
        assert_eq!(result.output, "42");
    }

    #[test]
    fn test_let_binding_and_arithmetic() {
        let result = run("let x = 3 in Print(x + 4)");
        assert_eq!(result.output, "7");
    }

    #[test]
    fn test_conditional_expression() {
        let result = run("Print((1 gr 0) -> 'yes' | 'no')");
        assert_eq!(result.output, "yes");
    }

    #[test]
    fn test_recursive_function_via_rec() {
        let result = run("let rec fact n = (n eq 0) -> 1 | n * fact(n - 1) in Print(fact(5))");
        assert_eq!(result.output, "120");
    }

    #[test]
    fn test_tuple_construction_and_indexing() {
        let result = run("Print((1, 2, 3))");
        assert_eq!(result.output, "(1, 2, 3)");
    }

    #[test]
    fn test_string_builtins() {
        let result = run("Print(Conc 'foo' 'bar')");
        assert_eq!(result.output, "foobar");
    }

    // ------------------------------------------------------------------
    // Errors
    // ------------------------------------------------------------------

    #[test]
    fn test_undeclared_identifier_propagates() {
        let err = interpret("Print(y)", &Config::default()).unwrap_err();
        assert!(matches!(err, RpalError::UndeclaredIdentifier { .. }));
    }

    #[test]
    fn test_syntax_error_propagates() {
        let err = interpret("let x = in x", &Config::default()).unwrap_err();
        assert!(matches!(err, RpalError::Syntax { .. }));
    }

    // ------------------------------------------------------------------
    // Ast/St dumps
    // ------------------------------------------------------------------

    #[test]
    fn test_ast_and_st_are_not_dumped_by_default() {
        let result = run("1");
        assert!(result.ast.is_none());
        assert!(result.st.is_none());
    }

    #[test]
    fn test_ast_and_st_are_captured_when_requested() {
        let config = Config {
            step_budget: None,
            dump_ast: true,
            dump_st: true,
        };
        let result = interpret("let x = 1 in x", &config).unwrap();
        assert!(result.ast.is_some());
        assert!(result.st.is_some());
        // standardization rewrites 'let' into 'gamma', so the dumped ast
        // and st must differ in shape for this program.
        assert!(result.ast.unwrap().is_tag("let"));
        assert!(result.st.unwrap().is_tag("gamma"));
    }
}
