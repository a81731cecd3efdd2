use evalexpr::{
    ContextWithMutableVariables, DefaultNumericTypes, HashMapContext, IterateVariablesContext,
};
use serde_json::{Number, Value};

use crate::error::ScriptError;
use crate::runtime::task::DataMap;

/// Evaluates flow conditions and runs script tasks. Implementations see a
/// flat scope of JSON values and report failures as [`ScriptError`].
pub trait ScriptEngine: Send + Sync {
    fn evaluate(&self, expression: &str, scope: &DataMap) -> Result<bool, ScriptError>;

    /// Run a script, writing variable changes back into the scope.
    fn execute(&self, script: &str, scope: &mut DataMap) -> Result<(), ScriptError>;
}

/// Default backend over the `evalexpr` crate. Expressions like
/// `choice == "A"` or `total = price * quantity; approved = total < 500`
/// run against the scope; nested JSON values are not exposed.
pub struct EvalexprEngine;

impl ScriptEngine for EvalexprEngine {
    fn evaluate(&self, expression: &str, scope: &DataMap) -> Result<bool, ScriptError> {
        let ctx = to_eval_context(scope);
        evalexpr::eval_boolean_with_context(expression, &ctx).map_err(|e| {
            ScriptError::Evaluation { expression: expression.to_string(), message: e.to_string() }
        })
    }

    fn execute(&self, script: &str, scope: &mut DataMap) -> Result<(), ScriptError> {
        let mut ctx = to_eval_context(scope);
        evalexpr::eval_with_context_mut(script, &mut ctx).map_err(|e| ScriptError::Evaluation {
            expression: script.to_string(),
            message: e.to_string(),
        })?;
        for (name, value) in ctx.iter_variables() {
            let json = match value {
                evalexpr::Value::String(s) => Value::String(s),
                evalexpr::Value::Int(i) => Value::Number(i.into()),
                evalexpr::Value::Float(f) => match Number::from_f64(f) {
                    Some(n) => Value::Number(n),
                    None => Value::Null,
                },
                evalexpr::Value::Boolean(b) => Value::Bool(b),
                evalexpr::Value::Empty => Value::Null,
                _ => continue,
            };
            scope.insert(name, json);
        }
        Ok(())
    }
}

fn to_eval_context(scope: &DataMap) -> HashMapContext<DefaultNumericTypes> {
    let mut ctx = HashMapContext::<DefaultNumericTypes>::new();
    for (k, v) in scope {
        let eval_val = match v {
            Value::String(s) => Some(evalexpr::Value::String(s.clone())),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(evalexpr::Value::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Some(evalexpr::Value::Float(f))
                } else {
                    None
                }
            }
            Value::Bool(b) => Some(evalexpr::Value::Boolean(*b)),
            _ => None,
        };
        if let Some(ev) = eval_val {
            let _ = ctx.set_value(k.clone(), ev);
        }
    }
    ctx
}

/// Fixed-answer stand-in for tests that only need deterministic routing.
pub struct StaticAnswer(pub bool);

impl ScriptEngine for StaticAnswer {
    fn evaluate(&self, _expression: &str, _scope: &DataMap) -> Result<bool, ScriptError> {
        Ok(self.0)
    }

    fn execute(&self, _script: &str, _scope: &mut DataMap) -> Result<(), ScriptError> {
        Ok(())
    }
}
