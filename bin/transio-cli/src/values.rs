//! JSON rendering of parameter values

use serde_json::{Map, Number, Value};
use transio_common::ParameterValue;

/// Parse a parameter given as JSON. Objects and arrays nest; `null` has no
/// parameter counterpart.
pub fn from_json(value: Value) -> anyhow::Result<ParameterValue> {
    Ok(match value {
        Value::Null => anyhow::bail!("null is not a valid parameter value"),
        Value::Bool(b) => ParameterValue::Boolean(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => ParameterValue::Integer(i),
            None => ParameterValue::Float(
                n.as_f64()
                    .ok_or_else(|| anyhow::anyhow!("unsupported number {n}"))?,
            ),
        },
        Value::String(s) => ParameterValue::Text(s),
        Value::Array(items) => {
            ParameterValue::List(items.into_iter().map(from_json).collect::<anyhow::Result<_>>()?)
        }
        Value::Object(fields) => ParameterValue::Map(
            fields
                .into_iter()
                .map(|(k, v)| from_json(v).map(|v| (k, v)))
                .collect::<anyhow::Result<_>>()?,
        ),
    })
}

/// Render a parameter as JSON. Raw bytes become an array of numbers.
pub fn to_json(value: &ParameterValue) -> Value {
    match value {
        ParameterValue::Text(s) => Value::String(s.clone()),
        ParameterValue::Bytes(bytes) => {
            Value::Array(bytes.iter().map(|b| Value::from(*b)).collect())
        }
        ParameterValue::Integer(i) => Value::from(*i),
        ParameterValue::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
        ParameterValue::Boolean(b) => Value::Bool(*b),
        ParameterValue::List(items) => Value::Array(items.iter().map(to_json).collect()),
        ParameterValue::Map(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), to_json(v)))
                .collect::<Map<_, _>>(),
        ),
    }
}
