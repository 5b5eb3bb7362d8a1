// Workflow Conditions - Evaluates a condition group against an event payload
//
// Evaluation never fails. Missing fields resolve to "absent", unknown
// operators fail closed, and comparisons follow loose (coercing) semantics
// so payloads with inconsistent types still match.

use resolve_shared::{Condition, ConditionGroup, ConditionOperator, LogicOperator};
use serde_json::Value;
use tracing::debug;

use super::triggers::resolve_path;

/// Evaluate `group` against `payload`. An empty group always passes.
pub fn evaluate(group: &ConditionGroup, payload: &Value) -> bool {
    if group.conditions.is_empty() {
        return true;
    }

    match group.logic {
        LogicOperator::And => group.conditions.iter().all(|c| evaluate_condition(c, payload)),
        LogicOperator::Or => group.conditions.iter().any(|c| evaluate_condition(c, payload)),
    }
}

/// Evaluate a single leaf
pub fn evaluate_condition(condition: &Condition, payload: &Value) -> bool {
    let actual = resolve_path(payload, &condition.field);
    let expected = condition.value.as_ref();

    let result = match &condition.operator {
        ConditionOperator::Equals => loose_equals(actual, expected),
        ConditionOperator::NotEquals => !loose_equals(actual, expected),
        ConditionOperator::Contains => to_js_string(actual).contains(&to_js_string(expected)),
        ConditionOperator::NotContains => !to_js_string(actual).contains(&to_js_string(expected)),
        ConditionOperator::GreaterThan => to_number(actual) > to_number(expected),
        ConditionOperator::LessThan => to_number(actual) < to_number(expected),
        ConditionOperator::GreaterThanOrEqual => to_number(actual) >= to_number(expected),
        ConditionOperator::LessThanOrEqual => to_number(actual) <= to_number(expected),
        ConditionOperator::IsEmpty => is_falsy(actual),
        ConditionOperator::IsNotEmpty => is_truthy(actual),
        ConditionOperator::Unknown(name) => {
            debug!("Unknown condition operator '{}' on field '{}'", name, condition.field);
            false
        }
    };

    debug!(
        "Condition {} {} {:?} against {:?} => {}",
        condition.field,
        condition.operator.as_str(),
        expected,
        actual,
        result
    );

    result
}

/// Type-coercing equality. `None` stands for an absent field or operand.
///
/// Absent and null only equal each other; numbers, booleans and strings
/// compare numerically when their types differ; two strings compare exactly.
pub fn loose_equals(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None | Some(Value::Null), None | Some(Value::Null)) => true,
        (None | Some(Value::Null), _) | (_, None | Some(Value::Null)) => false,
        (Some(Value::String(x)), Some(Value::String(y))) => x == y,
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x == y,
        // Objects and arrays only equal themselves by identity
        (Some(x), Some(y)) if is_compound(x) && is_compound(y) => false,
        (Some(x), Some(y)) if is_compound(x) => loose_equals(Some(&Value::String(to_js_string(Some(x)))), Some(y)),
        (Some(x), Some(y)) if is_compound(y) => loose_equals(Some(x), Some(&Value::String(to_js_string(Some(y))))),
        (x, y) => to_number(x) == to_number(y),
    }
}

fn is_compound(value: &Value) -> bool {
    matches!(value, Value::Array(_) | Value::Object(_))
}

/// Numeric coercion: blank strings, null and false are 0, true is 1,
/// absent values, objects, arrays and non-numeric strings are NaN
pub fn to_number(value: Option<&Value>) -> f64 {
    match value {
        None => f64::NAN,
        Some(Value::Null) => 0.0,
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => parse_numeric(s),
        Some(Value::Array(_) | Value::Object(_)) => f64::NAN,
    }
}

fn parse_numeric(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }

    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }

    // Rust also accepts "inf" and "nan", which are not numeric here
    if trimmed.chars().any(|c| c.is_ascii_alphabetic() && !matches!(c, 'e' | 'E')) {
        return f64::NAN;
    }

    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

/// String form used by substring tests
pub fn to_js_string(value: Option<&Value>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(Value::Null) => "null".to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => number_to_string(n),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => to_js_string(Some(other)),
            })
            .collect::<Vec<_>>()
            .join(","),
        Some(Value::Object(_)) => "[object Object]".to_string(),
    }
}

fn number_to_string(n: &serde_json::Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    match n.as_f64() {
        Some(f) if f == 0.0 => "0".to_string(),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

/// Falsy: absent, null, false, 0 and the empty string
pub fn is_falsy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Bool(b)) => !b,
        Some(Value::Number(n)) => n.as_f64().is_none_or(|f| f == 0.0 || f.is_nan()),
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(_) | Value::Object(_)) => false,
    }
}

/// Truthy test backing `IS_NOT_EMPTY`, written out on its own
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_) | Value::Object(_)) => true,
        Some(Value::Null) | None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lead_rules() -> ConditionGroup {
        ConditionGroup::and(vec![
            Condition::equals("status", json!("NEW")),
            Condition::greater_than("budget", json!(1000)),
        ])
    }

    #[test]
    fn test_and_group_matches_hot_lead() {
        assert!(evaluate(&lead_rules(), &json!({ "status": "NEW", "budget": 5000 })));
    }

    #[test]
    fn test_and_group_rejects_small_budget() {
        assert!(!evaluate(&lead_rules(), &json!({ "status": "NEW", "budget": 500 })));
    }

    #[test]
    fn test_or_group_needs_one_leaf() {
        let group = ConditionGroup::or(vec![
            Condition::contains("company.name", "foo"),
            Condition::equals("employees", json!(10)),
        ]);

        assert!(evaluate(&group, &json!({ "company": { "name": "Acme" }, "employees": 10 })));
        assert!(evaluate(&group, &json!({ "company": { "name": "Acme" }, "employees": "10" })));
        assert!(!evaluate(&group, &json!({ "company": { "name": "Acme" }, "employees": 11 })));
    }

    #[test]
    fn test_empty_group_always_passes() {
        for payload in [json!({}), json!(null), json!({ "status": "LOST" })] {
            assert!(evaluate(&ConditionGroup::and(vec![]), &payload));
            assert!(evaluate(&ConditionGroup::or(vec![]), &payload));
        }
    }

    #[test]
    fn test_missing_logic_means_and() {
        let group: ConditionGroup = serde_json::from_value(json!({
            "conditions": [
                { "field": "status", "operator": "EQUALS", "value": "NEW" },
                { "field": "source", "operator": "EQUALS", "value": "WEB" }
            ]
        }))
        .unwrap();

        assert!(!evaluate(&group, &json!({ "status": "NEW", "source": "REFERRAL" })));
        assert!(evaluate(&group, &json!({ "status": "NEW", "source": "WEB" })));
    }

    #[test]
    fn test_unknown_operator_fails_closed() {
        let group: ConditionGroup = serde_json::from_value(json!({
            "logic": "OR",
            "conditions": [{ "field": "status", "operator": "SOUNDS_LIKE", "value": "NEW" }]
        }))
        .unwrap();

        assert!(!evaluate(&group, &json!({ "status": "NEW" })));
    }

    #[test]
    fn test_loose_equality() {
        assert!(loose_equals(Some(&json!("1000")), Some(&json!(1000))));
        assert!(loose_equals(Some(&json!(1)), Some(&json!(true))));
        assert!(loose_equals(Some(&json!("")), Some(&json!(0))));
        assert!(loose_equals(None, Some(&Value::Null)));
        assert!(loose_equals(None, None));
        assert!(loose_equals(Some(&json!([1, 2])), Some(&json!("1,2"))));
        assert!(!loose_equals(Some(&Value::Null), Some(&json!(0))));
        assert!(!loose_equals(Some(&json!("abc")), Some(&json!("ABC"))));
        assert!(!loose_equals(Some(&json!("abc")), Some(&json!(0))));
        assert!(!loose_equals(Some(&json!({})), Some(&json!({}))));
        assert!(!loose_equals(None, Some(&json!(0))));
    }

    #[test]
    fn test_not_equals_on_missing_field() {
        let condition = Condition::not_equals("owner", json!("alice"));
        assert!(evaluate_condition(&condition, &json!({})));
    }

    #[test]
    fn test_numeric_comparisons() {
        let payload = json!({ "budget": "2500", "score": null, "name": "Acme", "tier": true });

        assert!(evaluate_condition(&Condition::greater_than("budget", json!(1000)), &payload));
        assert!(evaluate_condition(&Condition::less_than("score", json!(1)), &payload));
        assert!(!evaluate_condition(&Condition::greater_than("name", json!(0)), &payload));
        assert!(!evaluate_condition(&Condition::less_than("name", json!(0)), &payload));
        assert!(!evaluate_condition(&Condition::greater_than("missing", json!(-1)), &payload));
        assert!(!evaluate_condition(&Condition::less_than("budget", json!("lots")), &payload));

        let gte = Condition::new("tier", ConditionOperator::GreaterThanOrEqual, Some(json!(1)));
        let lte = Condition::new("budget", ConditionOperator::LessThanOrEqual, Some(json!(2500)));
        assert!(evaluate_condition(&gte, &payload));
        assert!(evaluate_condition(&lte, &payload));
    }

    #[test]
    fn test_contains_stringifies() {
        let payload = json!({ "tags": ["vip", "emea"], "amount": 10.0, "meta": { "a": 1 } });

        assert!(evaluate_condition(&Condition::contains("tags", "vip,emea"), &payload));
        assert!(evaluate_condition(&Condition::contains("amount", "10"), &payload));
        assert!(!evaluate_condition(&Condition::contains("amount", "10.0"), &payload));
        assert!(evaluate_condition(&Condition::contains("meta", "object"), &payload));
        assert!(evaluate_condition(&Condition::contains("missing", "undef"), &payload));

        let not_contains = Condition::new("tags", ConditionOperator::NotContains, Some(json!("apac")));
        assert!(evaluate_condition(&not_contains, &payload));
    }

    #[test]
    fn test_emptiness_operators_are_complementary() {
        let cases = [
            json!({ "v": 0 }),
            json!({ "v": 0.0 }),
            json!({ "v": "0" }),
            json!({ "v": false }),
            json!({ "v": null }),
            json!({}),
            json!({ "v": "" }),
            json!({ "v": " " }),
            json!({ "v": 1 }),
            json!({ "v": true }),
            json!({ "v": [] }),
            json!({ "v": {} }),
            json!({ "v": "text" }),
        ];

        for payload in &cases {
            let empty = evaluate_condition(&Condition::is_empty("v"), payload);
            let not_empty = evaluate_condition(&Condition::is_not_empty("v"), payload);
            assert_ne!(empty, not_empty, "operators disagree for {}", payload);
        }

        assert!(evaluate_condition(&Condition::is_empty("v"), &json!({ "v": 0 })));
        assert!(evaluate_condition(&Condition::is_not_empty("v"), &json!({ "v": "0" })));
        assert!(evaluate_condition(&Condition::is_empty("v"), &json!({ "v": false })));
        assert!(evaluate_condition(&Condition::is_empty("v"), &json!({})));
    }

    #[test]
    fn test_to_number_rules() {
        assert_eq!(to_number(Some(&json!("  42 "))), 42.0);
        assert_eq!(to_number(Some(&json!(""))), 0.0);
        assert_eq!(to_number(Some(&json!("1e3"))), 1000.0);
        assert_eq!(to_number(Some(&json!(false))), 0.0);
        assert_eq!(to_number(Some(&Value::Null)), 0.0);
        assert!(to_number(Some(&json!("inf"))).is_nan());
        assert!(to_number(Some(&json!("nan"))).is_nan());
        assert!(to_number(None).is_nan());
        assert!(to_number(Some(&json!([1]))).is_nan());
        assert_eq!(to_number(Some(&json!("-Infinity"))), f64::NEG_INFINITY);
    }
}
