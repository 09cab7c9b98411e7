// ABOUTME: End-to-end scenarios exercising the full tokenizer -> parser -> standardizer -> CSE pipeline

use rpal::error::RpalError;
use rpal::value::Value;
use rpal::{interpret, Config};

/// Runs `source` through the full pipeline with default limits, panicking on
/// any pipeline error so each scenario reads as a single assertion on output.
fn run(source: &str) -> String {
    interpret(source, &Config::default())
        .unwrap_or_else(|e| panic!("expected '{source}' to interpret, got error: {e}"))
        .output
}

fn run_err(source: &str) -> RpalError {
    interpret(source, &Config::default())
        .err()
        .unwrap_or_else(|| panic!("expected '{source}' to fail"))
}

// ----------------------------------------------------------------------
// The six end-to-end scenarios
// ----------------------------------------------------------------------

#[test]
fn test_let_binding_print() {
    assert_eq!(run("let x = 42 in Print x"), "42");
}

#[test]
fn test_recursive_factorial_via_conditional() {
    let source = "let rec f n = n eq 0 -> 1 | n * f (n-1) in Print (f 5)";
    assert_eq!(run(source), "120");
}

#[test]
fn test_where_clause_with_recursive_helper() {
    let source = "let Sum(A) = Psum (A, Order A) \
                   where rec Psum (T,N) = N eq 0 -> 0 | Psum(T,N-1) + T N \
                   in Print ( Sum (1,2,3,4,5) )";
    assert_eq!(run(source), "15");
}

#[test]
fn test_conc_builtin() {
    assert_eq!(run("Print ( Conc 'foo' 'bar' )"), "foobar");
}

#[test]
fn test_fn_multi_parameter_lambda() {
    assert_eq!(run("let add = fn x y. x + y in Print ( add 3 4 )"), "7");
}

#[test]
fn test_tuple_construction_and_swap() {
    assert_eq!(run("let swap(x,y) = (y,x) in Print ( swap (1,2) )"), "(2, 1)");
}

// ----------------------------------------------------------------------
// Additional end-to-end coverage: and/within, Y-combinator shape, builtins
// ----------------------------------------------------------------------

#[test]
fn test_and_binds_simultaneous_definitions() {
    let source = "let x = 1 and y = 2 in Print (x + y)";
    assert_eq!(run(source), "3");
}

#[test]
fn test_within_threads_one_definition_into_the_next() {
    let source = "let x = 2 within y = x * 3 in Print y";
    assert_eq!(run(source), "6");
}

#[test]
fn test_nested_recursive_fibonacci() {
    let source = "let rec fib n = n ls 2 -> n | fib (n - 1) + fib (n - 2) in Print (fib 10)";
    assert_eq!(run(source), "55");
}

#[test]
fn test_order_and_null_builtins() {
    assert_eq!(run("Print (Order (1, 2, 3, 4, 5))"), "5");
    assert_eq!(run("Print (Null nil)"), "true");
    assert_eq!(run("Print (Null (1, 2))"), "false");
}

#[test]
fn test_stem_and_stern_builtins() {
    assert_eq!(run("Print (Stem 'hello')"), "h");
    assert_eq!(run("Print (Stern 'hello')"), "ello");
}

#[test]
fn test_tuple_indexing_is_one_based() {
    assert_eq!(run("let t = (10, 20, 30) in Print (t 2)"), "20");
}

#[test]
fn test_aug_builds_and_extends_tuples() {
    assert_eq!(run("Print (nil aug 1 aug 2)"), "(1, 2)");
}

#[test]
fn test_string_equality_and_relational_operators() {
    assert_eq!(run("Print (3 gr 2)"), "true");
    assert_eq!(run("Print (3 le 2)"), "false");
    assert_eq!(run("Print ('ab' eq 'ab')"), "true");
}

#[test]
fn test_closure_captures_enclosing_binding() {
    let source = "let make_adder n = fn x. x + n in let add5 = make_adder 5 in Print (add5 10)";
    assert_eq!(run(source), "15");
}

// ----------------------------------------------------------------------
// Error paths
// ----------------------------------------------------------------------

#[test]
fn test_undeclared_identifier_carries_source_line() {
    let err = run_err("let x = 1 in\ny");
    match err {
        RpalError::UndeclaredIdentifier { name, line } => {
            assert_eq!(name, "y");
            assert_eq!(line, 2);
        }
        other => panic!("expected UndeclaredIdentifier, got {other:?}"),
    }
}

#[test]
fn test_division_by_zero_is_an_error() {
    assert!(matches!(run_err("Print (1 / 0)"), RpalError::DivisionByZero));
}

#[test]
fn test_tuple_index_out_of_range_is_an_error() {
    let err = run_err("let t = (1, 2) in Print (t 5)");
    assert!(matches!(err, RpalError::TupleIndexOutOfRange));
}

#[test]
fn test_syntax_error_reports_expected_and_got() {
    assert!(matches!(run_err("let x = in x"), RpalError::Syntax { .. }));
}

#[test]
fn test_deeply_nested_recursion_within_step_budget() {
    let source = "let rec count n = n eq 0 -> 0 | 1 + count (n - 1) in Print (count 500)";
    assert_eq!(run(source), "500");
}

#[test]
fn test_step_budget_exhaustion_is_reported() {
    let source = "let rec loop n = loop (n + 1) in Print (loop 0)";
    let config = Config {
        step_budget: Some(1000),
        ..Config::default()
    };
    let err = interpret(source, &config).unwrap_err();
    assert!(matches!(err, RpalError::StepBudgetExhausted(1000)));
}

// ----------------------------------------------------------------------
// AST/ST dump plumbing
// ----------------------------------------------------------------------

#[test]
fn test_ast_and_st_dumps_differ_after_standardization() {
    let config = Config {
        dump_ast: true,
        dump_st: true,
        ..Config::default()
    };
    let result = interpret("let x = 1 in x", &config).unwrap();
    assert!(result.ast.unwrap().is_tag("let"));
    assert!(result.st.unwrap().is_tag("gamma"));
    assert_eq!(result.value, Value::Int(1));
}
