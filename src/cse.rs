// ABOUTME: The Control-Stack-Environment abstract machine: the 13-rule dispatch loop plus built-ins

use crate::control::{ControlItem, ControlStructure, Tau};
use crate::env::{Environment, EnvironmentCatalogue};
use crate::error::RpalError;
use crate::value::Value;
use std::collections::HashMap;
use std::rc::Rc;

const BINARY_OPERATORS: &[&str] = &["+", "-", "*", "/", "eq", "ne", "gr", "ge", "ls", "le", "aug", "**"];
const UNARY_OPERATORS: &[&str] = &["not", "neg"];
const BUILTIN_OPERATORS: &[&str] = &[
    "conc",
    "stem",
    "stern",
    "isInteger",
    "isString",
    "isTruthValue",
    "isFunction",
    "isTuple",
    "isDummy",
    "order",
    "null",
];

fn is_binary_operator(name: &str) -> bool {
    BINARY_OPERATORS.contains(&name)
}

fn is_unary_operator(name: &str) -> bool {
    UNARY_OPERATORS.contains(&name)
}

fn type_mismatch(operator: &str, value: &Value) -> RpalError {
    RpalError::TypeMismatch {
        operator: operator.to_string(),
        message: format!("unexpected operand {value}"),
    }
}

/// A control-stack item: either a flattened delta-block item, or a frame
/// marker dropped in place whenever a new environment is entered (Rule
/// 4/11), consumed by Rule 5 once everything above it has been reduced.
#[derive(Debug, Clone)]
enum CItem {
    Control(ControlItem),
    EnvMarker(usize),
}

/// A value-stack item. Environment markers ride on the value stack too,
/// dropped alongside their control-stack counterpart so Rule 5 can find and
/// discard whichever one a nested application left behind.
#[derive(Debug, Clone)]
enum SItem {
    Value(Value),
    EnvMarker(usize),
}

enum TopDispatch {
    Literal,
    Lambda,
    Gamma,
    EnvMarker,
    BinaryOp,
    UnaryOp,
    Beta,
    Tau,
    Illegal,
}

enum GammaDispatch {
    BuiltinOperator,
    YCombinator,
    Print,
    SingleArgClosure,
    MultiArgClosure,
    TupleIndex,
    EtaSelf,
    Illegal,
}

/// Runs one standardized, control-structure-generated program to a final
/// value. Each instance is single-use: construct with the delta-block table
/// and a primitive environment, then call `run` once.
pub struct CseMachine {
    structures: Vec<ControlStructure>,
    control: Vec<CItem>,
    stack: Vec<SItem>,
    environments: EnvironmentCatalogue,
    current_env: usize,
    output: String,
    steps: usize,
    step_budget: Option<usize>,
}

impl CseMachine {
    pub fn new(
        structures: Vec<ControlStructure>,
        root: Rc<Environment>,
        step_budget: Option<usize>,
    ) -> Result<Self, RpalError> {
        let first = structures
            .first()
            .ok_or_else(|| RpalError::internal("control structure 0 not found"))?;
        if first.items.is_empty() {
            return Err(RpalError::internal("control structure 0 has no items"));
        }
        let mut machine = CseMachine {
            structures,
            control: vec![CItem::EnvMarker(0)],
            stack: vec![SItem::EnvMarker(0)],
            environments: EnvironmentCatalogue::new(root),
            current_env: 0,
            output: String::new(),
            steps: 0,
            step_budget,
        };
        machine.push_control_structure(0)?;
        Ok(machine)
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    /// Runs the dispatch loop to completion and returns the value left on
    /// top of the value stack.
    pub fn run(&mut self) -> Result<Value, RpalError> {
        loop {
            if self.control.is_empty() {
                break;
            }
            self.steps += 1;
            if let Some(budget) = self.step_budget {
                if self.steps > budget {
                    return Err(RpalError::StepBudgetExhausted(budget));
                }
            }
            let dispatch = self.classify_top();
            tracing::trace!(step = self.steps, env = self.current_env, "dispatching");
            match dispatch {
                TopDispatch::Literal => self.rule1()?,
                TopDispatch::Lambda => self.rule2()?,
                TopDispatch::Gamma => self.dispatch_gamma()?,
                TopDispatch::EnvMarker => self.rule5()?,
                TopDispatch::BinaryOp => self.rule6()?,
                TopDispatch::UnaryOp => self.rule7()?,
                TopDispatch::Beta => self.rule8()?,
                TopDispatch::Tau => self.rule9()?,
                TopDispatch::Illegal => return Err(RpalError::IllegalApplication),
            }
        }
        match self.stack.last() {
            Some(SItem::Value(v)) => Ok(v.clone()),
            Some(SItem::EnvMarker(_)) => Err(RpalError::internal("final value stack top is an environment marker")),
            None => Err(RpalError::internal("value stack is empty at end of interpretation")),
        }
    }

    fn classify_top(&self) -> TopDispatch {
        match self.control.last() {
            None => TopDispatch::Illegal,
            Some(CItem::Control(ControlItem::Int(_))) | Some(CItem::Control(ControlItem::Str(_))) => {
                TopDispatch::Literal
            }
            Some(CItem::Control(ControlItem::Name(name, _))) => {
                if is_binary_operator(name) {
                    TopDispatch::BinaryOp
                } else if is_unary_operator(name) {
                    TopDispatch::UnaryOp
                } else {
                    TopDispatch::Literal
                }
            }
            Some(CItem::Control(ControlItem::Lambda(_))) => TopDispatch::Lambda,
            Some(CItem::Control(ControlItem::Gamma)) => TopDispatch::Gamma,
            Some(CItem::EnvMarker(_)) => TopDispatch::EnvMarker,
            Some(CItem::Control(ControlItem::Beta)) => TopDispatch::Beta,
            Some(CItem::Control(ControlItem::Tau(_))) => TopDispatch::Tau,
            Some(CItem::Control(ControlItem::Delta(_))) => TopDispatch::Illegal,
        }
    }

    fn classify_gamma(&self) -> GammaDispatch {
        match self.stack.last() {
            Some(SItem::Value(Value::Builtin(name))) => {
                if BUILTIN_OPERATORS.contains(&name.as_str()) {
                    GammaDispatch::BuiltinOperator
                } else if name == "Y" {
                    GammaDispatch::YCombinator
                } else if name == "print" {
                    GammaDispatch::Print
                } else {
                    GammaDispatch::Illegal
                }
            }
            Some(SItem::Value(Value::Closure { variables, .. })) => {
                if variables.len() == 1 {
                    GammaDispatch::SingleArgClosure
                } else {
                    GammaDispatch::MultiArgClosure
                }
            }
            Some(SItem::Value(Value::Tuple(items))) if !items.is_empty() => GammaDispatch::TupleIndex,
            Some(SItem::Value(Value::Eta { .. })) => GammaDispatch::EtaSelf,
            _ => GammaDispatch::Illegal,
        }
    }

    fn dispatch_gamma(&mut self) -> Result<(), RpalError> {
        match self.classify_gamma() {
            GammaDispatch::BuiltinOperator => self.rule3(),
            GammaDispatch::YCombinator => self.rule12(),
            GammaDispatch::Print => self.builtin_print(),
            GammaDispatch::SingleArgClosure => self.rule4(),
            GammaDispatch::MultiArgClosure => self.rule11(),
            GammaDispatch::TupleIndex => self.rule10(),
            GammaDispatch::EtaSelf => self.rule13(),
            GammaDispatch::Illegal => Err(RpalError::IllegalApplication),
        }
    }

    // ------------------------------------------------------------------
    // Stack primitives
    // ------------------------------------------------------------------

    fn pop_control(&mut self) -> Result<CItem, RpalError> {
        self.control.pop().ok_or_else(|| RpalError::internal("control stack underflow"))
    }

    fn pop_value(&mut self) -> Result<Value, RpalError> {
        match self.stack.pop() {
            Some(SItem::Value(v)) => Ok(v),
            Some(SItem::EnvMarker(_)) => Err(RpalError::internal("expected a value, found an environment marker")),
            None => Err(RpalError::internal("value stack underflow")),
        }
    }

    fn pop_str_value(&mut self, op: &str) -> Result<String, RpalError> {
        match self.pop_value()? {
            Value::Str(s) => Ok(s),
            other => Err(type_mismatch(op, &other)),
        }
    }

    fn push_value(&mut self, value: Value) {
        self.stack.push(SItem::Value(value));
    }

    fn push_control_structure(&mut self, k: usize) -> Result<(), RpalError> {
        let structure = self
            .structures
            .get(k)
            .ok_or_else(|| RpalError::internal(format!("control structure {k} not found")))?;
        for item in &structure.items {
            self.control.push(CItem::Control(item.clone()));
        }
        Ok(())
    }

    fn current_environment(&self) -> Result<Rc<Environment>, RpalError> {
        self.environments.get(self.current_env)
    }

    fn enter_new_frame(&mut self, parent: usize, bindings: HashMap<String, Value>, k: usize) -> Result<(), RpalError> {
        let parent_env = self.environments.get(parent)?;
        let frame_number = self.environments.next_number();
        let new_env = Environment::child(frame_number, parent_env, bindings);
        self.environments.push(new_env);
        self.current_env = frame_number;
        self.control.push(CItem::EnvMarker(frame_number));
        self.push_control_structure(k)?;
        self.stack.push(SItem::EnvMarker(frame_number));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Rule 1: name resolution
    // ------------------------------------------------------------------

    fn rule1(&mut self) -> Result<(), RpalError> {
        let item = self.pop_control()?;
        let value = match item {
            CItem::Control(ControlItem::Int(n)) => Value::Int(n),
            CItem::Control(ControlItem::Str(s)) => Value::Str(s),
            CItem::Control(ControlItem::Name(name, line)) => self.resolve_name(&name, line)?,
            other => return Err(RpalError::internal(format!("rule1 dispatched on {other:?}"))),
        };
        self.push_value(value);
        Ok(())
    }

    /// `nil`/`true`/`false`/`dummy`/`Y` are literal leaves resolved here
    /// directly rather than through environment lookup; everything else is
    /// an identifier.
    fn resolve_name(&self, name: &str, line: usize) -> Result<Value, RpalError> {
        match name {
            "nil" => Ok(Value::Nil),
            "dummy" => Ok(Value::Dummy),
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            "Y" => Ok(Value::Builtin("Y".to_string())),
            _ => self.current_environment()?.lookup(name, line),
        }
    }

    // ------------------------------------------------------------------
    // Rule 2: lambda lift
    // ------------------------------------------------------------------

    fn rule2(&mut self) -> Result<(), RpalError> {
        let template = match self.pop_control()? {
            CItem::Control(ControlItem::Lambda(t)) => t,
            other => return Err(RpalError::internal(format!("rule2 dispatched on {other:?}"))),
        };
        self.push_value(Value::Closure {
            k: template.k,
            variables: template.variables,
            c: self.current_env,
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Rule 3: built-in operator dispatch
    // ------------------------------------------------------------------

    fn rule3(&mut self) -> Result<(), RpalError> {
        self.pop_control()?; // gamma
        let operator = match self.pop_value()? {
            Value::Builtin(name) => name,
            other => return Err(RpalError::internal(format!("rule3 dispatched on non-builtin {other:?}"))),
        };
        match operator.as_str() {
            "conc" => {
                // conc is curried over two separate gammas; the second one
                // is consumed here rather than driving a further dispatch.
                self.pop_control()?;
                let value1 = self.pop_str_value("conc")?;
                let value2 = self.pop_str_value("conc")?;
                self.push_value(Value::Str(format!("{value1}{value2}")));
            }
            "stem" => {
                let value = self.pop_str_value("stem")?;
                self.push_value(Value::Str(value.chars().next().map(|c| c.to_string()).unwrap_or_default()));
            }
            "stern" => {
                let value = self.pop_str_value("stern")?;
                let rest: String = value.chars().skip(1).collect();
                self.push_value(Value::Str(rest));
            }
            "isInteger" => {
                let v = self.pop_value()?;
                self.push_value(Value::Bool(matches!(v, Value::Int(_))));
            }
            "isString" => {
                let v = self.pop_value()?;
                self.push_value(Value::Bool(matches!(v, Value::Str(_))));
            }
            "isTruthValue" => {
                let v = self.pop_value()?;
                self.push_value(Value::Bool(matches!(v, Value::Bool(_))));
            }
            "isFunction" => {
                let v = self.pop_value()?;
                self.push_value(Value::Bool(v.is_function()));
            }
            "isTuple" => {
                let v = self.pop_value()?;
                self.push_value(Value::Bool(matches!(&v, Value::Tuple(items) if !items.is_empty())));
            }
            // The reference implementation checks for a Token of a "DUMMY"
            // kind the tokenizer never produces, so this built-in can never
            // fire there; matching the `dummy` sentinel value directly is
            // the behavior the language description actually calls for.
            "isDummy" => {
                let v = self.pop_value()?;
                self.push_value(Value::Bool(matches!(v, Value::Dummy)));
            }
            "order" => match self.pop_value()? {
                Value::Tuple(items) => self.push_value(Value::Int(items.len() as i64)),
                other => return Err(type_mismatch("order", &other)),
            },
            "null" => {
                let result = match self.pop_value()? {
                    Value::Nil => true,
                    Value::Tuple(items) => items.is_empty(),
                    other => return Err(type_mismatch("null", &other)),
                };
                self.push_value(Value::Bool(result));
            }
            other => return Err(RpalError::internal(format!("unknown built-in operator '{other}'"))),
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Rule 4: single-parameter application
    // ------------------------------------------------------------------

    fn rule4(&mut self) -> Result<(), RpalError> {
        self.pop_control()?; // gamma
        let (k, variable, c) = match self.pop_value()? {
            Value::Closure { k, mut variables, c } if variables.len() == 1 => (k, variables.remove(0), c),
            other => return Err(RpalError::internal(format!("rule4 dispatched on {other:?}"))),
        };
        let argument = self.pop_value()?;
        let mut bindings = HashMap::new();
        bindings.insert(variable, argument);
        self.enter_new_frame(c, bindings, k)
    }

    // ------------------------------------------------------------------
    // Rule 5: environment frame pop
    // ------------------------------------------------------------------

    fn rule5(&mut self) -> Result<(), RpalError> {
        self.pop_control()?;
        if let Some(pos) = self.stack.iter().rposition(|item| matches!(item, SItem::EnvMarker(_))) {
            self.stack.remove(pos);
        }
        if let Some(CItem::EnvMarker(n)) = self.control.iter().rev().find(|item| matches!(item, CItem::EnvMarker(_))) {
            self.current_env = *n;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Rule 6: binary operators
    // ------------------------------------------------------------------

    fn rule6(&mut self) -> Result<(), RpalError> {
        let op = match self.pop_control()? {
            CItem::Control(ControlItem::Name(name, _)) => name,
            other => return Err(RpalError::internal(format!("rule6 dispatched on {other:?}"))),
        };
        let operand1 = self.pop_value()?;
        let operand2 = self.pop_value()?;
        let result = apply_binary_operator(&op, operand1, operand2)?;
        self.push_value(result);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Rule 7: unary operators
    // ------------------------------------------------------------------

    fn rule7(&mut self) -> Result<(), RpalError> {
        let op = match self.pop_control()? {
            CItem::Control(ControlItem::Name(name, _)) => name,
            other => return Err(RpalError::internal(format!("rule7 dispatched on {other:?}"))),
        };
        let operand = self.pop_value()?;
        let result = match op.as_str() {
            "not" => match operand {
                Value::Bool(b) => Value::Bool(!b),
                other => return Err(type_mismatch("not", &other)),
            },
            "neg" => match operand {
                Value::Int(n) => Value::Int(-n),
                other => return Err(type_mismatch("neg", &other)),
            },
            other => return Err(RpalError::internal(format!("unknown unary operator '{other}'"))),
        };
        self.push_value(result);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Rule 8: conditional
    // ------------------------------------------------------------------

    fn rule8(&mut self) -> Result<(), RpalError> {
        self.pop_control()?; // beta
        let truthy = match self.pop_value()? {
            Value::Bool(b) => b,
            other => return Err(type_mismatch("->", &other)),
        };
        // Push order was then-delta, else-delta, beta, so immediately
        // under beta sits the else branch, and the then branch underneath it.
        if truthy {
            self.pop_control()?; // discard else-delta
            let then_delta = self.pop_control()?;
            self.splice_delta(then_delta)?;
        } else {
            let else_delta = self.pop_control()?;
            self.pop_control()?; // discard then-delta
            self.splice_delta(else_delta)?;
        }
        Ok(())
    }

    fn splice_delta(&mut self, item: CItem) -> Result<(), RpalError> {
        let k = match item {
            CItem::Control(ControlItem::Delta(k)) => k,
            other => return Err(RpalError::internal(format!("expected a delta reference, got {other:?}"))),
        };
        self.push_control_structure(k)
    }

    // ------------------------------------------------------------------
    // Rule 9: tuple construction
    // ------------------------------------------------------------------

    fn rule9(&mut self) -> Result<(), RpalError> {
        let tau = match self.pop_control()? {
            CItem::Control(ControlItem::Tau(t)) => t,
            other => return Err(RpalError::internal(format!("rule9 dispatched on {other:?}"))),
        };
        self.build_tuple(tau)
    }

    fn build_tuple(&mut self, tau: Tau) -> Result<(), RpalError> {
        if let Some(SItem::Value(Value::Nil)) = self.stack.last() {
            return Ok(());
        }
        let mut elements = Vec::with_capacity(tau.n);
        for _ in 0..tau.n {
            match self.stack.pop() {
                None => return Ok(()),
                Some(SItem::EnvMarker(_)) => return Ok(()),
                Some(SItem::Value(v)) => elements.push(v),
            }
        }
        self.push_value(Value::Tuple(elements));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Rule 10: tuple indexing
    // ------------------------------------------------------------------

    fn rule10(&mut self) -> Result<(), RpalError> {
        self.pop_control()?; // gamma
        let items = match self.pop_value()? {
            Value::Tuple(items) => items,
            other => return Err(RpalError::internal(format!("rule10 dispatched on {other:?}"))),
        };
        let index = match self.pop_value()? {
            Value::Int(n) => n,
            other => return Err(type_mismatch("tuple index", &other)),
        };
        if index < 1 || index as usize > items.len() {
            return Err(RpalError::TupleIndexOutOfRange);
        }
        self.push_value(items[(index - 1) as usize].clone());
        Ok(())
    }

    // ------------------------------------------------------------------
    // Rule 11: multi-parameter application
    // ------------------------------------------------------------------

    fn rule11(&mut self) -> Result<(), RpalError> {
        self.pop_control()?; // gamma
        let (k, variables, c) = match self.pop_value()? {
            Value::Closure { k, variables, c } if variables.len() > 1 => (k, variables, c),
            other => return Err(RpalError::internal(format!("rule11 dispatched on {other:?}"))),
        };
        let values = match self.pop_value()? {
            Value::Tuple(items) => items,
            other => return Err(type_mismatch("apply", &other)),
        };
        if values.len() != variables.len() {
            return Err(RpalError::ArityMismatch {
                expected: variables.len(),
                got: values.len(),
            });
        }
        let bindings: HashMap<String, Value> = variables.into_iter().zip(values).collect();
        self.enter_new_frame(c, bindings, k)
    }

    // ------------------------------------------------------------------
    // Rule 12: Y-combinator wrap
    // ------------------------------------------------------------------

    fn rule12(&mut self) -> Result<(), RpalError> {
        self.pop_control()?; // gamma
        match self.pop_value()? {
            Value::Builtin(name) if name == "Y" => {}
            other => return Err(RpalError::internal(format!("rule12 expected 'Y', got {other:?}"))),
        }
        let (k, variables, c) = match self.pop_value()? {
            Value::Closure { k, variables, c } => (k, variables, c),
            other => return Err(RpalError::internal(format!("rule12 dispatched on non-closure {other:?}"))),
        };
        self.push_value(Value::Eta { k, variables, c });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Rule 13: eta self-application
    // ------------------------------------------------------------------

    fn rule13(&mut self) -> Result<(), RpalError> {
        self.pop_control()?; // gamma
        let (k, variables, c) = match self.stack.last() {
            Some(SItem::Value(Value::Eta { k, variables, c })) => (*k, variables.clone(), *c),
            other => return Err(RpalError::internal(format!("rule13 dispatched on {other:?}"))),
        };
        self.push_value(Value::Closure { k, variables, c });
        self.control.push(CItem::Control(ControlItem::Gamma));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Print
    // ------------------------------------------------------------------

    fn builtin_print(&mut self) -> Result<(), RpalError> {
        self.pop_control()?; // gamma
        match self.pop_value()? {
            Value::Builtin(name) if name == "print" => {}
            other => return Err(RpalError::internal(format!("print dispatched on {other:?}"))),
        }
        let value = self.pop_value()?;
        let formatted = value.to_string();
        self.output.push_str(&formatted);
        self.push_value(Value::Str(formatted));
        Ok(())
    }
}

fn apply_binary_operator(op: &str, operand1: Value, operand2: Value) -> Result<Value, RpalError> {
    match op {
        "+" => int_op(op, operand1, operand2, |a, b| Ok(a + b)),
        "-" => int_op(op, operand1, operand2, |a, b| Ok(a - b)),
        "*" => int_op(op, operand1, operand2, |a, b| Ok(a * b)),
        "/" => int_op(op, operand1, operand2, |a, b| {
            if b == 0 {
                Err(RpalError::DivisionByZero)
            } else {
                Ok(a / b)
            }
        }),
        "**" => int_op(op, operand1, operand2, |a, b| {
            if b < 0 {
                Err(RpalError::TypeMismatch {
                    operator: "**".to_string(),
                    message: "negative exponent".to_string(),
                })
            } else {
                Ok(a.pow(b as u32))
            }
        }),
        "eq" => Ok(Value::Bool(operand1 == operand2)),
        "ne" => Ok(Value::Bool(operand1 != operand2)),
        "gr" => compare(op, operand1, operand2, |o| o == std::cmp::Ordering::Greater),
        "ge" => compare(op, operand1, operand2, |o| o != std::cmp::Ordering::Less),
        "ls" => compare(op, operand1, operand2, |o| o == std::cmp::Ordering::Less),
        "le" => compare(op, operand1, operand2, |o| o != std::cmp::Ordering::Greater),
        "aug" => match operand1 {
            Value::Nil => Ok(Value::Tuple(vec![operand2])),
            Value::Tuple(mut items) => {
                items.push(operand2);
                Ok(Value::Tuple(items))
            }
            other => Err(type_mismatch("aug", &other)),
        },
        other => Err(RpalError::internal(format!("unknown binary operator '{other}'"))),
    }
}

fn int_op(op: &str, a: Value, b: Value, f: impl FnOnce(i64, i64) -> Result<i64, RpalError>) -> Result<Value, RpalError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => f(x, y).map(Value::Int),
        (other, _) => Err(type_mismatch(op, &other)),
    }
}

fn compare(op: &str, a: Value, b: Value, check: impl Fn(std::cmp::Ordering) -> bool) -> Result<Value, RpalError> {
    let ordering = match (&a, &b) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        _ => return Err(type_mismatch(op, &a)),
    };
    Ok(Value::Bool(check(ordering)))
}
