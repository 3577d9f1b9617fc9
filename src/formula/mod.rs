//! Derived metrics defined by restricted Python-like expressions.
//!
//! A formula is parsed once, checked against the variables it declares, then
//! evaluated per sample with the base metrics and that sample's attribute
//! dictionary bound.

mod parser;

pub use parser::{parse_formula, BinaryOp, Expr};

use serde_json::Value as Json;
use sqleval_core::{
    FormulaEvaluationError, FreeVariable, MetricFormula, MetricMap, MetricSeries, BASE_METRICS,
};
use std::cmp::Ordering;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Number(f64),
    Bool(bool),
    Str(String),
    None,
    Json(Json),
}

impl Value {
    fn from_json(json: &Json) -> Value {
        match json {
            Json::Null => Value::None,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::None),
            Json::String(s) => Value::Str(s.clone()),
            other => Value::Json(other.clone()),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Bool(_) => "bool",
            Value::Str(_) => "str",
            Value::None => "None",
            Value::Json(Json::Array(_)) => "list",
            Value::Json(_) => "dict",
        }
    }

    fn number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0,
            Value::Bool(b) => *b,
            Value::Str(s) => !s.is_empty(),
            Value::None => false,
            Value::Json(Json::Array(a)) => !a.is_empty(),
            Value::Json(Json::Object(o)) => !o.is_empty(),
            Value::Json(_) => true,
        }
    }
}

/// Per-sample variable bindings.
struct Scope<'a> {
    metrics: &'a MetricMap,
    attributes: &'a Json,
    sample: usize,
}

impl Scope<'_> {
    fn lookup(&self, var: FreeVariable) -> Result<Value, String> {
        if var == FreeVariable::SamplesAttrs {
            return Ok(Value::from_json(self.attributes));
        }
        let name: &str = var.as_ref();
        self.metrics
            .values(name)
            .and_then(|values| values.get(self.sample))
            .map(|v| Value::Number(*v))
            .ok_or_else(|| format!("metric {} is not available in this run", name))
    }

    fn eval(&self, expr: &Expr) -> Result<Value, String> {
        Ok(match expr {
            Expr::Number(n) => Value::Number(*n),
            Expr::Str(s) => Value::Str(s.clone()),
            Expr::Bool(b) => Value::Bool(*b),
            Expr::None => Value::None,
            Expr::Var(v) => self.lookup(*v)?,
            Expr::Neg(e) => {
                let v = self.eval(e)?;
                Value::Number(-v
                    .number()
                    .ok_or_else(|| format!("bad operand type for unary -: {}", v.type_name()))?)
            }
            Expr::Not(e) => Value::Bool(!self.eval(e)?.truthy()),
            Expr::And(a, b) => {
                let left = self.eval(a)?;
                if left.truthy() {
                    self.eval(b)?
                } else {
                    left
                }
            }
            Expr::Or(a, b) => {
                let left = self.eval(a)?;
                if left.truthy() {
                    left
                } else {
                    self.eval(b)?
                }
            }
            Expr::Conditional {
                then,
                cond,
                otherwise,
            } => {
                if self.eval(cond)?.truthy() {
                    self.eval(then)?
                } else {
                    self.eval(otherwise)?
                }
            }
            Expr::Index(target, key) => index(self.eval(target)?, self.eval(key)?)?,
            Expr::Binary(op, a, b) => binary(*op, self.eval(a)?, self.eval(b)?)?,
        })
    }
}

fn index(target: Value, key: Value) -> Result<Value, String> {
    match (&target, &key) {
        (Value::Json(Json::Object(map)), Value::Str(k)) => map
            .get(k)
            .map(Value::from_json)
            .ok_or_else(|| format!("key {:?} not found", k)),
        (Value::Json(Json::Array(items)), _) => {
            let i = key
                .number()
                .filter(|n| n.fract() == 0.0)
                .ok_or_else(|| format!("list indices must be integers, not {}", key.type_name()))?
                as i64;
            let len = items.len() as i64;
            let at = if i < 0 { len + i } else { i };
            items
                .get(usize::try_from(at).map_err(|_| "list index out of range".to_string())?)
                .map(Value::from_json)
                .ok_or_else(|| "list index out of range".to_string())
        }
        _ => Err(format!(
            "{} is not subscriptable by {}",
            target.type_name(),
            key.type_name()
        )),
    }
}

fn binary(op: BinaryOp, a: Value, b: Value) -> Result<Value, String> {
    match op {
        BinaryOp::Eq => return Ok(Value::Bool(equals(&a, &b))),
        BinaryOp::Ne => return Ok(Value::Bool(!equals(&a, &b))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ord = compare(&a, &b)?;
            return Ok(Value::Bool(match op {
                BinaryOp::Lt => ord == Ordering::Less,
                BinaryOp::Le => ord != Ordering::Greater,
                BinaryOp::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            }));
        }
        BinaryOp::Add => {
            if let (Value::Str(x), Value::Str(y)) = (&a, &b) {
                return Ok(Value::Str(format!("{}{}", x, y)));
            }
        }
        _ => {}
    }

    let (Some(x), Some(y)) = (a.number(), b.number()) else {
        return Err(format!(
            "unsupported operand types for {:?}: {} and {}",
            op,
            a.type_name(),
            b.type_name()
        ));
    };
    let result = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod if y == 0.0 => {
            return Err("division by zero".into())
        }
        BinaryOp::Div => x / y,
        BinaryOp::FloorDiv => (x / y).floor(),
        BinaryOp::Mod => x - y * (x / y).floor(),
        BinaryOp::Pow if x == 0.0 && y < 0.0 => {
            return Err("0.0 cannot be raised to a negative power".into())
        }
        BinaryOp::Pow => x.powf(y),
        _ => unreachable!("comparisons handled above"),
    };
    if result.is_finite() {
        Ok(Value::Number(result))
    } else {
        Err(format!("{:?} produced a non-finite result", op))
    }
}

fn equals(a: &Value, b: &Value) -> bool {
    match (a.number(), b.number()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Result<Ordering, String> {
    if let (Some(x), Some(y)) = (a.number(), b.number()) {
        return x
            .partial_cmp(&y)
            .ok_or_else(|| "comparison with NaN".to_string());
    }
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        _ => Err(format!(
            "'<' not supported between {} and {}",
            a.type_name(),
            b.type_name()
        )),
    }
}

/// A parsed formula ready to be evaluated per sample.
#[derive(Debug, Clone)]
pub struct CompiledFormula {
    name: String,
    expr: Expr,
}

impl CompiledFormula {
    /// Parse `formula` and check it only names variables it declares.
    pub fn compile(formula: &MetricFormula) -> Result<Self, FormulaEvaluationError> {
        let fail = |reason: String| FormulaEvaluationError::new(&formula.name, None, reason);
        let expr = parse_formula(&formula.expression).map_err(fail)?;

        let mut used = Vec::new();
        expr.variables(&mut used);
        if let Some(undeclared) = used.iter().find(|v| !formula.free_variables.contains(*v)) {
            return Err(fail(format!(
                "variable {} is not declared by the formula",
                undeclared
            )));
        }
        Ok(Self {
            name: formula.name.clone(),
            expr,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluate for every sample of `metrics`. `attributes` holds one JSON
    /// document per sample; an empty slice binds `None` everywhere.
    pub fn evaluate(
        &self,
        metrics: &MetricMap,
        attributes: &[Json],
    ) -> Result<MetricSeries, FormulaEvaluationError> {
        let count = metrics.sample_count().unwrap_or(attributes.len());
        let null = Json::Null;
        let values = (0..count)
            .map(|sample| {
                let scope = Scope {
                    metrics,
                    attributes: attributes.get(sample).unwrap_or(&null),
                    sample,
                };
                let fail = |reason: String| {
                    FormulaEvaluationError::new(&self.name, Some(sample), reason)
                };
                let value = scope.eval(&self.expr).map_err(fail)?;
                value
                    .number()
                    .filter(|n| n.is_finite())
                    .ok_or_else(|| fail(format!("result is {}, not a number", value.type_name())))
            })
            .collect::<Result<Vec<f64>, _>>()?;
        Ok(MetricSeries::new(self.name.clone(), values))
    }
}

/// Evaluate every formula and add the successful series to `metrics`.
///
/// Base metrics are never replaced: a formula named like one is skipped. Each
/// failing formula is reported and leaves `metrics` untouched.
pub fn apply_formulas(
    formulas: &[MetricFormula],
    metrics: &mut MetricMap,
    attributes: &[Json],
) -> Vec<FormulaEvaluationError> {
    let base = metrics.clone();
    let mut errors = Vec::new();
    for formula in formulas {
        if BASE_METRICS.contains(&formula.name.as_str()) {
            warn!(metric = %formula.name, "formula shadows a base metric, skipped");
            continue;
        }
        let series = CompiledFormula::compile(formula).and_then(|f| f.evaluate(&base, attributes));
        let inserted = series.and_then(|s| {
            metrics
                .insert(s)
                .map_err(|e| FormulaEvaluationError::new(&formula.name, None, e.to_string()))
        });
        match inserted {
            Ok(()) => debug!(metric = %formula.name, "derived metric computed"),
            Err(e) => {
                warn!(error = %e, "derived metric failed");
                errors.push(e);
            }
        }
    }
    errors
}
