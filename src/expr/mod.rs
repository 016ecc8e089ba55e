//! Injection-safe condition and expression evaluation
//!
//! Conditions reference variables by name (`power > 50`) and entity
//! properties as dotted pairs (`reactor.temperature < 800`). Evaluation
//! substitutes current values with whole-word matching, rejects any
//! character outside the arithmetic whitelist, and hands the rest to a
//! hand-written recursive-descent evaluator. Nothing here invokes dynamic
//! code execution, and malformed input evaluates to `false` rather than
//! failing: rule and event processing must survive bad expressions.

use ahash::AHashMap;
use serde_json::Value;

use crate::model::EntityBag;

mod eval;

/// Evaluate a condition against current values; any failure is `false`
pub fn evaluate_condition(
    expression: &str,
    vars: &AHashMap<String, f64>,
    entities: &AHashMap<String, EntityBag>,
) -> bool {
    match evaluate_numeric(expression, vars, entities) {
        Some(value) => value != 0.0,
        None => false,
    }
}

/// Evaluate an expression to a number, for rule-internal math
///
/// Returns `None` on any malformed or disallowed input instead of an error:
/// callers that need the condition contract go through
/// [`evaluate_condition`].
pub fn evaluate_numeric(
    expression: &str,
    vars: &AHashMap<String, f64>,
    entities: &AHashMap<String, EntityBag>,
) -> Option<f64> {
    if expression.trim().is_empty() {
        return None;
    }

    let substituted = substitute(expression, vars, entities);
    if !is_whitelisted(&substituted) {
        tracing::debug!(expression, "condition contains disallowed characters");
        return None;
    }

    eval::evaluate(&substituted)
}

/// Replace `entity.property` references, then variable names, with their
/// current literal values
///
/// Entity references go first so a variable sharing an entity's name cannot
/// clobber the prefix of a dotted reference.
fn substitute(
    expression: &str,
    vars: &AHashMap<String, f64>,
    entities: &AHashMap<String, EntityBag>,
) -> String {
    let mut result = expression.to_owned();

    for (entity, bag) in entities {
        for (property, value) in bag {
            if let Some(text) = scalar_text(value) {
                let reference = format!("{entity}.{property}");
                result = replace_whole_word(&result, &reference, &text);
            }
        }
    }

    for (name, value) in vars {
        result = replace_whole_word(&result, name, &value.to_string());
    }

    result
}

/// Literal text for a scalar property; structured values never substitute
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Replace every whole-word occurrence of `needle` in `haystack`
fn replace_whole_word(haystack: &str, needle: &str, replacement: &str) -> String {
    if needle.is_empty() {
        return haystack.to_owned();
    }

    let mut result = String::with_capacity(haystack.len());
    let mut i = 0;
    while i < haystack.len() {
        let Some(offset) = haystack[i..].find(needle) else {
            result.push_str(&haystack[i..]);
            break;
        };
        let start = i + offset;
        let end = start + needle.len();

        let boundary_before = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !is_word_char(c));
        let boundary_after = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !is_word_char(c));

        result.push_str(&haystack[i..start]);
        if boundary_before && boundary_after {
            result.push_str(replacement);
            i = end;
        } else {
            // mid-word match: keep one character and keep scanning
            let step = haystack[start..].chars().next().map_or(1, char::len_utf8);
            result.push_str(&haystack[start..start + step]);
            i = start + step;
        }
    }
    result
}

/// Allow only arithmetic, comparison, and grouping characters
fn is_whitelisted(expression: &str) -> bool {
    expression.chars().all(|c| {
        matches!(
            c,
            '0'..='9' | '+' | '-' | '*' | '/' | '(' | ')' | '.' | '<' | '>' | '=' | '!' | '&'
                | '|' | ' '
        )
    })
}
