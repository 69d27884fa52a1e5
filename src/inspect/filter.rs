//! Filter chain evaluation
//!
//! Evaluation never fails: a literal that does not parse as a number simply
//! makes a numeric predicate false.

use crate::inspect::body::body_size;
use crate::models::{CapturedRequest, FieldKind, Filter, FilterChain, FilterField, LogicalOperator, Operator};

/// Evaluate a chain against a request, folding strictly left to right
pub fn matches(req: &CapturedRequest, chain: &FilterChain) -> bool {
    let filters = chain.filters();
    let Some(first) = filters.first() else {
        return true;
    };

    let mut result = matches_filter(req, first);
    for pair in filters.windows(2) {
        let current = matches_filter(req, &pair[1]);
        result = match pair[0].logical {
            LogicalOperator::Or => result || current,
            LogicalOperator::And => result && current,
        };
    }
    result
}

/// Evaluate a single predicate
pub fn matches_filter(req: &CapturedRequest, filter: &Filter) -> bool {
    match filter.field.kind() {
        FieldKind::Text => {
            let actual = text_value(req, &filter.field);
            compare_text(&actual, filter.operator, &filter.value)
        }
        FieldKind::NumericWithUnit => {
            let Some(target) = filter.canonical_value() else {
                return false;
            };
            let actual = match filter.field {
                FilterField::Duration => req.duration_ms as f64,
                FilterField::ResponseSize => body_size(&req.response_body) as f64,
                _ => return false,
            };
            compare_number(actual, filter.operator, target)
        }
    }
}

fn text_value(req: &CapturedRequest, field: &FilterField) -> String {
    match field {
        FilterField::Status => req.status_code.to_string(),
        FilterField::Path => req.path.clone(),
        FilterField::Method => req.method.clone(),
        FilterField::Header(name) => req.request_header(name).unwrap_or_default().to_string(),
        FilterField::Duration | FilterField::ResponseSize => String::new(),
    }
}

fn compare_text(actual: &str, op: Operator, target: &str) -> bool {
    let actual = actual.to_lowercase();
    let target = target.to_lowercase();
    match op {
        Operator::Eq => actual == target,
        Operator::NotEq => actual != target,
        Operator::Match => actual.contains(&target),
        Operator::NotMatch => !actual.contains(&target),
        _ => false,
    }
}

fn compare_number(actual: f64, op: Operator, target: f64) -> bool {
    match op {
        Operator::Gt => actual > target,
        Operator::Lt => actual < target,
        Operator::Ge => actual >= target,
        Operator::Le => actual <= target,
        _ => false,
    }
}
