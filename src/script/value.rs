//! Dynamic value helpers over `serde_json::Value`.

use std::cmp::Ordering;

use serde_json::{Number, Value};

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Text form used by interpolation and `ToString()`.
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => match as_int(value) {
            Some(i) => i.to_string(),
            None => n.as_f64().map_or_else(|| n.to_string(), |f| f.to_string()),
        },
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(display).collect::<Vec<_>>().join(", "),
        Value::Object(map) if map.is_empty() => "{ }".to_string(),
        Value::Object(map) => {
            let fields: Vec<_> = map
                .iter()
                .map(|(k, v)| format!("{k} = {}", display(v)))
                .collect();
            format!("{{ {} }}", fields.join(", "))
        }
    }
}

/// Integral numbers only; floats (even `2.0`) return `None`.
pub fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) if !n.is_f64() => n.as_i64(),
        _ => None,
    }
}

pub fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Finite floats only; JSON cannot carry NaN or infinities.
pub fn float(f: f64) -> Option<Value> {
    Number::from_f64(f).map(Value::Number)
}

/// Structural equality with numeric comparison across int/float.
pub fn equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => match (as_int(a), as_int(b)) {
            (Some(x), Some(y)) => x == y,
            _ => as_float(a) == as_float(b),
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| equals(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| equals(v, other)))
        }
        _ => a == b,
    }
}

/// Ordering of comparable values, `None` for mixed or unordered types.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => match (as_int(a), as_int(b)) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => as_float(a)?.partial_cmp(&as_float(b)?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Total order for sorting: nulls first, then by type, then by value.
pub fn sort_order(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    compare(a, b).unwrap_or_else(|| rank(a).cmp(&rank(b)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display() {
        assert_eq!(display(&json!(null)), "");
        assert_eq!(display(&json!(true)), "True");
        assert_eq!(display(&json!(3)), "3");
        assert_eq!(display(&json!(2.5)), "2.5");
        assert_eq!(display(&json!(2.0)), "2");
        assert_eq!(display(&json!(["a", 1])), "a, 1");
        assert_eq!(display(&json!({"Name": "Welt", "N": 2})), "{ Name = Welt, N = 2 }");
        assert_eq!(display(&json!({})), "{ }");
    }

    #[test]
    fn test_numeric_equality() {
        assert!(equals(&json!(1), &json!(1.0)));
        assert!(!equals(&json!(1), &json!("1")));
        assert!(equals(&json!({"a": [1, 2]}), &json!({"a": [1.0, 2]})));
    }

    #[test]
    fn test_sort_order_mixed() {
        let mut values = vec![json!("b"), json!(2), json!(null), json!("a"), json!(1.5)];
        values.sort_by(sort_order);
        assert_eq!(values, vec![json!(null), json!(1.5), json!(2), json!("a"), json!("b")]);
    }
}
