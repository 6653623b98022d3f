//! Capability allow-list for scripts and templates.
//!
//! Every facility beyond the core language belongs to a [`Module`]. A
//! [`Library`] is the enumerated set of modules an evaluation may use; it
//! is built from configuration and handed to each evaluation explicitly.
//!
//! | Module        | Facilities                                          |
//! |---------------|-----------------------------------------------------|
//! | `collections` | `Enumerable.*`, `.Count`, `.Length`, `.Keys`, ...   |
//! | `sequence`    | LINQ-style methods: `Select`, `Where`, `OrderBy`... |
//! | `text`        | string methods, `String.Join`, `String.Concat`      |
//! | `math`        | `Math.*`                                            |
//! | `datetime`    | `DateTime.Now`, `DateTime.Today`, `DateTime.Parse`  |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::diagnostic::Span;
use super::interp::{Arg, EvalResult, Func, Interpreter, RuntimeError};
use super::value::{self, as_float, as_int, display, type_name};
use crate::utils::date::DateTimeUtc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Module {
    Collections,
    Sequence,
    Text,
    Math,
    DateTime,
}

impl Module {
    pub const ALL: [Module; 5] = [
        Module::Collections,
        Module::Sequence,
        Module::Text,
        Module::Math,
        Module::DateTime,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Module::Collections => "collections",
            Module::Sequence => "sequence",
            Module::Text => "text",
            Module::Math => "math",
            Module::DateTime => "datetime",
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Module {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Module::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| {
                let known: Vec<_> = Module::ALL.iter().map(|m| m.name()).collect();
                format!("unknown module `{s}` (expected one of: {})", known.join(", "))
            })
    }
}

const SEQUENCE_METHODS: &[&str] = &[
    "Select",
    "Where",
    "SelectMany",
    "OrderBy",
    "OrderByDescending",
    "First",
    "FirstOrDefault",
    "Last",
    "LastOrDefault",
    "ElementAt",
    "Count",
    "Any",
    "All",
    "Sum",
    "Min",
    "Max",
    "Average",
    "Take",
    "Skip",
    "Reverse",
    "Distinct",
    "Concat",
    "Contains",
    "ToList",
    "ToArray",
    "Aggregate",
    "GroupBy",
];

/// Enabled modules, sorted and deduplicated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Library {
    modules: Vec<Module>,
}

impl Default for Library {
    fn default() -> Self {
        Self::standard()
    }
}

impl Library {
    pub fn new(modules: impl IntoIterator<Item = Module>) -> Self {
        let mut modules: Vec<_> = modules.into_iter().collect();
        modules.sort();
        modules.dedup();
        Self { modules }
    }

    /// Every module enabled.
    pub fn standard() -> Self {
        Self::new(Module::ALL)
    }

    pub fn allows(&self, module: Module) -> bool {
        self.modules.contains(&module)
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    fn require(&self, module: Module, what: &str, span: Span) -> EvalResult<()> {
        if self.allows(module) {
            Ok(())
        } else {
            Err(RuntimeError::new(span, missing_module(module, what)))
        }
    }

    /// Module providing a static class name.
    pub fn static_module(name: &str) -> Option<Module> {
        match name {
            "Enumerable" => Some(Module::Collections),
            "Math" => Some(Module::Math),
            "DateTime" => Some(Module::DateTime),
            "String" => Some(Module::Text),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    pub fn static_property(&self, root: &str, name: &str, span: Span) -> EvalResult {
        let Some(module) = Self::static_module(root) else {
            return Err(RuntimeError::new(span, format!("unknown static class `{root}`")));
        };
        self.require(module, &format!("{root}.{name}"), span)?;

        let value = match (root, name) {
            ("Math", "PI") => value::float(std::f64::consts::PI),
            ("Math", "E") => value::float(std::f64::consts::E),
            ("DateTime", "Now" | "UtcNow") => Some(Value::String(DateTimeUtc::now().to_rfc3339())),
            ("DateTime", "Today") => Some(Value::String(DateTimeUtc::now().to_date_string())),
            ("String", "Empty") => Some(Value::String(String::new())),
            _ => None,
        };
        value.ok_or_else(|| RuntimeError::new(span, format!("`{root}` has no property `{name}`")))
    }

    /// Member access on a value. Missing object fields read as `null`.
    pub fn property(&self, target: Value, name: &str, span: Span) -> EvalResult {
        match target {
            Value::Null => Ok(Value::Null),
            Value::Object(mut map) => {
                if let Some(field) = map.remove(name) {
                    return Ok(field);
                }
                if !self.allows(Module::Collections) {
                    return Ok(Value::Null);
                }
                Ok(match name {
                    "Count" => Value::from(map.len()),
                    "Keys" => Value::Array(map.keys().cloned().map(Value::String).collect()),
                    "Values" => Value::Array(map.values().cloned().collect()),
                    _ => Value::Null,
                })
            }
            Value::Array(items) if matches!(name, "Count" | "Length") => {
                self.require(Module::Collections, name, span)?;
                Ok(Value::from(items.len()))
            }
            Value::String(s) if name == "Length" => {
                self.require(Module::Text, name, span)?;
                Ok(Value::from(s.chars().count()))
            }
            other => Err(RuntimeError::new(
                span,
                format!("{} has no member `{name}`", type_name(&other)),
            )),
        }
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    pub fn call_static(
        &self,
        root: &str,
        name: &str,
        args: Vec<Arg<'_>>,
        span: Span,
    ) -> EvalResult {
        let Some(module) = Self::static_module(root) else {
            return Err(RuntimeError::new(span, format!("unknown static class `{root}`")));
        };
        let qualified = format!("{root}.{name}");
        self.require(module, &qualified, span)?;
        let call = Call {
            name: &qualified,
            args,
            span,
        };

        match (root, name) {
            ("Enumerable", "Range") => {
                call.arity(2, 2)?;
                let (start, count) = (call.int(0)?, call.int(1)?);
                if count < 0 {
                    return call.fail("count must not be negative");
                }
                if start.checked_add(count).is_none() {
                    return call.fail("range exceeds the integer limit");
                }
                Ok(Value::Array((start..start + count).map(Value::from).collect()))
            }
            ("Enumerable", "Repeat") => {
                call.arity(2, 2)?;
                let item = call.value(0)?.clone();
                let count = usize::try_from(call.int(1)?).unwrap_or(0);
                Ok(Value::Array(vec![item; count]))
            }
            ("Enumerable", "Empty") => {
                call.arity(0, 0)?;
                Ok(Value::Array(Vec::new()))
            }
            ("Math", _) => math(&call, name),
            ("DateTime", "Parse") => {
                call.arity(1, 1)?;
                let text = call.string(0)?;
                let Some(dt) = DateTimeUtc::parse(text) else {
                    return call.fail(format!("`{text}` is not a valid date (expected YYYY-MM-DD or an RFC 3339 timestamp)"));
                };
                Ok(Value::String(if text.trim().len() == 10 {
                    dt.to_date_string()
                } else {
                    dt.to_rfc3339()
                }))
            }
            ("String", "Join") => {
                call.arity(2, 2)?;
                let separator = call.string(0)?;
                let items = call.array(1)?;
                let parts: Vec<_> = items.iter().map(display).collect();
                Ok(Value::String(parts.join(separator)))
            }
            ("String", "Concat") => {
                let mut out = String::new();
                for i in 0..call.args.len() {
                    out.push_str(&display(call.value(i)?));
                }
                Ok(Value::String(out))
            }
            ("String", "IsNullOrEmpty") => {
                call.arity(1, 1)?;
                let value = call.value(0)?;
                Ok(Value::Bool(
                    value.is_null() || value.as_str().is_some_and(str::is_empty),
                ))
            }
            _ => call.fail_no_method(root),
        }
    }

    pub fn call_method(
        &self,
        interp: &Interpreter<'_>,
        target: Value,
        name: &str,
        args: Vec<Arg<'_>>,
        span: Span,
    ) -> EvalResult {
        let call = Call { name, args, span };

        if name == "ToString" {
            call.arity(0, 0)?;
            return Ok(Value::String(display(&target)));
        }

        match target {
            Value::Array(items) => {
                if !SEQUENCE_METHODS.contains(&name) {
                    return call.fail_no_method("array");
                }
                self.require(Module::Sequence, name, span)?;
                sequence(interp, items, &call)
            }
            Value::String(s) => {
                self.require(Module::Text, name, span)?;
                text(&s, &call)
            }
            Value::Object(map) if name == "ContainsKey" => {
                self.require(Module::Collections, name, span)?;
                call.arity(1, 1)?;
                Ok(Value::Bool(map.contains_key(call.string(0)?)))
            }
            Value::Null => call.fail(format!("cannot call `{name}` on null")),
            other => call.fail_no_method(type_name(&other)),
        }
    }
}

fn missing_module(module: Module, what: &str) -> String {
    format!("`{what}` requires the `{module}` module, which is not enabled")
}

/// Arguments of one library call plus its name for error messages.
struct Call<'c, 'a> {
    name: &'c str,
    args: Vec<Arg<'a>>,
    span: Span,
}

impl<'a> Call<'_, 'a> {
    fn fail<T>(&self, message: impl fmt::Display) -> EvalResult<T> {
        Err(RuntimeError::new(self.span, format!("`{}`: {message}", self.name)))
    }

    fn fail_no_method<T>(&self, owner: &str) -> EvalResult<T> {
        Err(RuntimeError::new(
            self.span,
            format!("{owner} has no method `{}`", self.name),
        ))
    }

    fn arity(&self, min: usize, max: usize) -> EvalResult<()> {
        let n = self.args.len();
        if n < min || n > max {
            let expected = if min == max {
                min.to_string()
            } else {
                format!("{min} to {max}")
            };
            return self.fail(format!("expects {expected} argument(s), found {n}"));
        }
        Ok(())
    }

    fn value(&self, i: usize) -> EvalResult<&Value> {
        match self.args.get(i) {
            Some(Arg::Value(value)) => Ok(value),
            Some(Arg::Func(_)) => self.fail(format!("argument {} must be a value, not a lambda", i + 1)),
            None => self.fail(format!("missing argument {}", i + 1)),
        }
    }

    fn func(&self, i: usize) -> EvalResult<&Func<'a>> {
        match self.args.get(i) {
            Some(Arg::Func(func)) => Ok(func),
            _ => self.fail(format!("argument {} must be a lambda", i + 1)),
        }
    }

    fn opt_func(&self, i: usize) -> EvalResult<Option<&Func<'a>>> {
        if self.args.len() <= i {
            Ok(None)
        } else {
            self.func(i).map(Some)
        }
    }

    fn int(&self, i: usize) -> EvalResult<i64> {
        let value = self.value(i)?;
        as_int(value).map_or_else(
            || self.fail(format!("argument {} must be an integer, found {}", i + 1, type_name(value))),
            Ok,
        )
    }

    fn number(&self, i: usize) -> EvalResult<&Value> {
        let value = self.value(i)?;
        if value.is_number() {
            Ok(value)
        } else {
            self.fail(format!("argument {} must be a number, found {}", i + 1, type_name(value)))
        }
    }

    fn string(&self, i: usize) -> EvalResult<&str> {
        let value = self.value(i)?;
        value.as_str().map_or_else(
            || self.fail(format!("argument {} must be a string, found {}", i + 1, type_name(value))),
            Ok,
        )
    }

    fn array(&self, i: usize) -> EvalResult<&[Value]> {
        let value = self.value(i)?;
        value.as_array().map_or_else(
            || self.fail(format!("argument {} must be an array, found {}", i + 1, type_name(value))),
            |items| Ok(items.as_slice()),
        )
    }
}

// ============================================================================
// sequence
// ============================================================================

#[allow(clippy::cast_possible_wrap)]
fn index_value(i: usize) -> Value {
    Value::from(i as i64)
}

fn predicate(interp: &Interpreter<'_>, func: &Func<'_>, item: &Value, i: usize) -> EvalResult<bool> {
    let result = interp.invoke(func, vec![item.clone(), index_value(i)])?;
    interp.condition(&result, func.span)
}

fn select(interp: &Interpreter<'_>, func: Option<&Func<'_>>, items: Vec<Value>) -> EvalResult<Vec<Value>> {
    match func {
        None => Ok(items),
        Some(func) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| interp.invoke(func, vec![item, index_value(i)]))
            .collect(),
    }
}

fn filter(interp: &Interpreter<'_>, func: Option<&Func<'_>>, items: Vec<Value>) -> EvalResult<Vec<Value>> {
    let Some(func) = func else {
        return Ok(items);
    };
    let mut kept = Vec::new();
    for (i, item) in items.into_iter().enumerate() {
        if predicate(interp, func, &item, i)? {
            kept.push(item);
        }
    }
    Ok(kept)
}

fn sequence(interp: &Interpreter<'_>, items: Vec<Value>, call: &Call<'_, '_>) -> EvalResult {
    match call.name {
        "Select" => {
            call.arity(1, 1)?;
            select(interp, Some(call.func(0)?), items).map(Value::Array)
        }
        "Where" => {
            call.arity(1, 1)?;
            filter(interp, Some(call.func(0)?), items).map(Value::Array)
        }
        "SelectMany" => {
            call.arity(1, 1)?;
            let mut flat = Vec::new();
            for inner in select(interp, Some(call.func(0)?), items)? {
                match inner {
                    Value::Array(inner) => flat.extend(inner),
                    Value::Null => {}
                    other => {
                        return call.fail(format!("selector must return an array, found {}", type_name(&other)));
                    }
                }
            }
            Ok(Value::Array(flat))
        }
        "OrderBy" | "OrderByDescending" => {
            call.arity(1, 1)?;
            let func = call.func(0)?;
            let mut keyed = Vec::with_capacity(items.len());
            for item in items {
                let key = interp.invoke(func, vec![item.clone()])?;
                keyed.push((key, item));
            }
            if call.name == "OrderBy" {
                keyed.sort_by(|a, b| value::sort_order(&a.0, &b.0));
            } else {
                keyed.sort_by(|a, b| value::sort_order(&b.0, &a.0));
            }
            Ok(Value::Array(keyed.into_iter().map(|(_, item)| item).collect()))
        }
        "First" | "FirstOrDefault" | "Last" | "LastOrDefault" => {
            call.arity(0, 1)?;
            let mut matching = filter(interp, call.opt_func(0)?, items)?;
            let found = if call.name.starts_with("First") {
                (!matching.is_empty()).then(|| matching.swap_remove(0))
            } else {
                matching.pop()
            };
            match found {
                Some(item) => Ok(item),
                None if call.name.ends_with("OrDefault") => Ok(Value::Null),
                None => call.fail("sequence contains no matching element"),
            }
        }
        "ElementAt" => {
            call.arity(1, 1)?;
            let i = call.int(0)?;
            usize::try_from(i)
                .ok()
                .and_then(|i| items.get(i).cloned())
                .map_or_else(|| call.fail(format!("index {i} is out of range")), Ok)
        }
        "Count" => {
            call.arity(0, 1)?;
            Ok(Value::from(filter(interp, call.opt_func(0)?, items)?.len()))
        }
        "Any" => {
            call.arity(0, 1)?;
            Ok(Value::Bool(!filter(interp, call.opt_func(0)?, items)?.is_empty()))
        }
        "All" => {
            call.arity(1, 1)?;
            let func = call.func(0)?;
            for (i, item) in items.iter().enumerate() {
                if !predicate(interp, func, item, i)? {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        "Sum" | "Average" | "Min" | "Max" => {
            call.arity(0, 1)?;
            let values = select(interp, call.opt_func(0)?, items)?;
            aggregate_numbers(call, values)
        }
        "Take" | "Skip" => {
            call.arity(1, 1)?;
            let n = usize::try_from(call.int(0)?).unwrap_or(0);
            Ok(Value::Array(if call.name == "Take" {
                items.into_iter().take(n).collect()
            } else {
                items.into_iter().skip(n).collect()
            }))
        }
        "Reverse" => {
            call.arity(0, 0)?;
            Ok(Value::Array(items.into_iter().rev().collect()))
        }
        "Distinct" => {
            call.arity(0, 0)?;
            let mut unique: Vec<Value> = Vec::with_capacity(items.len());
            for item in items {
                if !unique.iter().any(|seen| value::equals(seen, &item)) {
                    unique.push(item);
                }
            }
            Ok(Value::Array(unique))
        }
        "Concat" => {
            call.arity(1, 1)?;
            let mut items = items;
            items.extend_from_slice(call.array(0)?);
            Ok(Value::Array(items))
        }
        "Contains" => {
            call.arity(1, 1)?;
            let needle = call.value(0)?;
            Ok(Value::Bool(items.iter().any(|item| value::equals(item, needle))))
        }
        "ToList" | "ToArray" => {
            call.arity(0, 0)?;
            Ok(Value::Array(items))
        }
        "Aggregate" => {
            call.arity(2, 2)?;
            let func = call.func(1)?;
            let mut acc = call.value(0)?.clone();
            for item in items {
                acc = interp.invoke(func, vec![acc, item])?;
            }
            Ok(acc)
        }
        "GroupBy" => {
            call.arity(1, 1)?;
            let func = call.func(0)?;
            let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
            for item in items {
                let key = interp.invoke(func, vec![item.clone()])?;
                match groups.iter_mut().find(|(k, _)| value::equals(k, &key)) {
                    Some((_, members)) => members.push(item),
                    None => groups.push((key, vec![item])),
                }
            }
            Ok(Value::Array(
                groups
                    .into_iter()
                    .map(|(key, members)| {
                        let mut group = serde_json::Map::new();
                        group.insert("Key".to_string(), key);
                        group.insert("Items".to_string(), Value::Array(members));
                        Value::Object(group)
                    })
                    .collect(),
            ))
        }
        _ => call.fail_no_method("array"),
    }
}

fn aggregate_numbers(call: &Call<'_, '_>, values: Vec<Value>) -> EvalResult {
    let values: Vec<Value> = values.into_iter().filter(|v| !v.is_null()).collect();

    match call.name {
        "Min" | "Max" => {
            let mut best: Option<Value> = None;
            for item in values {
                let Some(current) = &best else {
                    best = Some(item);
                    continue;
                };
                let Some(ordering) = value::compare(&item, current) else {
                    return call.fail(format!(
                        "cannot compare {} with {}",
                        type_name(&item),
                        type_name(current)
                    ));
                };
                let better = if call.name == "Min" {
                    ordering.is_lt()
                } else {
                    ordering.is_gt()
                };
                if better {
                    best = Some(item);
                }
            }
            best.map_or_else(|| call.fail("sequence contains no elements"), Ok)
        }
        _ => {
            if let Some(bad) = values.iter().find(|v| !v.is_number()) {
                return call.fail(format!("requires numbers, found {}", type_name(bad)));
            }
            if call.name == "Sum" && values.iter().all(|v| as_int(v).is_some()) {
                let mut total = 0i64;
                for v in &values {
                    let Some(next) = as_int(v).and_then(|n| total.checked_add(n)) else {
                        return call.fail("arithmetic operation resulted in an overflow");
                    };
                    total = next;
                }
                return Ok(Value::from(total));
            }
            let sum: f64 = values.iter().filter_map(as_float).sum();
            let result = if call.name == "Average" {
                if values.is_empty() {
                    return call.fail("sequence contains no elements");
                }
                #[allow(clippy::cast_precision_loss)]
                let n = values.len() as f64;
                sum / n
            } else {
                sum
            };
            value::float(result).map_or_else(|| call.fail("result is not a finite number"), Ok)
        }
    }
}

// ============================================================================
// text
// ============================================================================

fn text(s: &str, call: &Call<'_, '_>) -> EvalResult {
    let string = |s: String| Ok(Value::String(s));
    match call.name {
        "ToUpper" | "ToLower" | "Trim" | "TrimStart" | "TrimEnd" => {
            call.arity(0, 0)?;
            string(match call.name {
                "ToUpper" => s.to_uppercase(),
                "ToLower" => s.to_lowercase(),
                "Trim" => s.trim().to_string(),
                "TrimStart" => s.trim_start().to_string(),
                _ => s.trim_end().to_string(),
            })
        }
        "Contains" | "StartsWith" | "EndsWith" => {
            call.arity(1, 1)?;
            let needle = call.string(0)?;
            Ok(Value::Bool(match call.name {
                "Contains" => s.contains(needle),
                "StartsWith" => s.starts_with(needle),
                _ => s.ends_with(needle),
            }))
        }
        "Replace" => {
            call.arity(2, 2)?;
            let (from, to) = (call.string(0)?, call.string(1)?);
            if from.is_empty() {
                return call.fail("old value cannot be empty");
            }
            string(s.replace(from, to))
        }
        "Split" => {
            call.arity(1, 1)?;
            let separator = call.string(0)?;
            let parts: Vec<Value> = if separator.is_empty() {
                vec![Value::String(s.to_string())]
            } else {
                s.split(separator).map(|p| Value::String(p.to_string())).collect()
            };
            Ok(Value::Array(parts))
        }
        "Substring" => {
            call.arity(1, 2)?;
            let chars: Vec<char> = s.chars().collect();
            let start = call.int(0)?;
            let len = if call.args.len() == 2 {
                call.int(1)?
            } else {
                i64::try_from(chars.len()).unwrap_or(i64::MAX) - start
            };
            let range = usize::try_from(start)
                .ok()
                .zip(usize::try_from(len).ok())
                .filter(|(start, len)| start + len <= chars.len());
            match range {
                Some((start, len)) => string(chars[start..start + len].iter().collect()),
                None => call.fail(format!("range {start}+{len} is outside a string of length {}", chars.len())),
            }
        }
        "PadLeft" | "PadRight" => {
            call.arity(1, 2)?;
            let width = usize::try_from(call.int(0)?).unwrap_or(0);
            let fill = if call.args.len() == 2 {
                call.string(1)?.chars().next().unwrap_or(' ')
            } else {
                ' '
            };
            let missing = width.saturating_sub(s.chars().count());
            let padding: String = std::iter::repeat_n(fill, missing).collect();
            string(if call.name == "PadLeft" {
                padding + s
            } else {
                s.to_string() + &padding
            })
        }
        "IndexOf" => {
            call.arity(1, 1)?;
            let needle = call.string(0)?;
            Ok(match s.find(needle) {
                Some(byte) => Value::from(s[..byte].chars().count()),
                None => Value::from(-1),
            })
        }
        _ => call.fail_no_method("string"),
    }
}

// ============================================================================
// math
// ============================================================================

fn math(call: &Call<'_, '_>, name: &str) -> EvalResult {
    let finite = |f: f64| value::float(f).map_or_else(|| call.fail("result is not a finite number"), Ok);
    let float_arg = |i: usize| call.number(i).map(|v| as_float(v).unwrap_or(0.0));

    match name {
        "Abs" => {
            call.arity(1, 1)?;
            let x = call.number(0)?;
            match as_int(x) {
                Some(i) => i
                    .checked_abs()
                    .map_or_else(|| call.fail("arithmetic operation resulted in an overflow"), |n| Ok(Value::from(n))),
                None => finite(float_arg(0)?.abs()),
            }
        }
        "Min" | "Max" => {
            call.arity(2, 2)?;
            let (a, b) = (call.number(0)?, call.number(1)?);
            let a_wins = match value::compare(a, b) {
                Some(ordering) if name == "Min" => ordering.is_le(),
                Some(ordering) => ordering.is_ge(),
                None => return call.fail("arguments are not comparable"),
            };
            Ok(if a_wins { a.clone() } else { b.clone() })
        }
        "Round" => {
            call.arity(1, 2)?;
            let x = call.number(0)?;
            if as_int(x).is_some() {
                return Ok(x.clone());
            }
            let digits = if call.args.len() == 2 { call.int(1)? } else { 0 };
            if !(0..=15).contains(&digits) {
                return call.fail("digits must be between 0 and 15");
            }
            #[allow(clippy::cast_possible_truncation)]
            let scale = 10f64.powi(digits as i32);
            finite((float_arg(0)? * scale).round_ties_even() / scale)
        }
        "Floor" | "Ceiling" => {
            call.arity(1, 1)?;
            let x = call.number(0)?;
            if as_int(x).is_some() {
                return Ok(x.clone());
            }
            let f = float_arg(0)?;
            finite(if name == "Floor" { f.floor() } else { f.ceil() })
        }
        "Sqrt" => {
            call.arity(1, 1)?;
            finite(float_arg(0)?.sqrt())
        }
        "Pow" => {
            call.arity(2, 2)?;
            finite(float_arg(0)?.powf(float_arg(1)?))
        }
        _ => call.fail_no_method("Math"),
    }
}
