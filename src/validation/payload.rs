use super::format;
use super::report::{MultiError, Violation};
use super::ValidationMode;
use crate::cancellation::{Phase, checkpoint};
use crate::error::{OapitError, Result};
use crate::models::{
    AdditionalProperties, ArrayRules, Composition, CompositionKind, Document, NumberRules,
    ObjectRules, SchemaArena, SchemaId, SchemaKind, SchemaNode, StringRules,
};
use serde_json::{Map, Number, Value};
use tokio_util::sync::CancellationToken;

/// How a payload is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadOptions {
    pub mode: ValidationMode,
    pub validate_formats: bool,
}

impl Default for PayloadOptions {
    fn default() -> Self {
        Self {
            mode: ValidationMode::Request,
            validate_formats: true,
        }
    }
}

/// Validate `payload` against the schema component named `component`.
pub fn validate_payload(
    document: &Document,
    component: &str,
    payload: &Value,
    options: &PayloadOptions,
    cancel: &CancellationToken,
) -> Result<()> {
    let schema = document.require_schema(component)?;
    checkpoint(cancel, Phase::PayloadValidation)?;

    PayloadValidator::new(&document.arena)
        .with_mode(options.mode)
        .with_format_validation(options.validate_formats)
        .validate(payload, schema)
        .map_err(OapitError::PayloadValidation)?;

    tracing::info!(component, mode = %options.mode, "payload is valid");
    Ok(())
}

/// Checks JSON values against resolved schemas, collecting every violation.
///
/// Without a mode neither `readOnly` nor `writeOnly` is enforced, which is how
/// examples and defaults are checked.
#[derive(Debug, Clone, Copy)]
pub struct PayloadValidator<'a> {
    arena: &'a SchemaArena,
    mode: Option<ValidationMode>,
    formats: bool,
}

/// Traversal state: current payload path, collected violations, and the
/// (schema, value) pairs being visited.
struct Visit {
    path: Vec<String>,
    violations: Vec<Violation>,
    active: Vec<(SchemaId, usize)>,
}

impl Visit {
    fn report(&mut self, message: impl Into<String>) {
        self.violations
            .push(Violation::new(self.path.join("/"), message));
    }

    fn report_at(&mut self, segment: &str, message: impl Into<String>) {
        self.path.push(segment.to_string());
        self.report(message);
        self.path.pop();
    }
}

impl<'a> PayloadValidator<'a> {
    pub fn new(arena: &'a SchemaArena) -> Self {
        Self {
            arena,
            mode: None,
            formats: true,
        }
    }

    pub fn with_mode(mut self, mode: ValidationMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_format_validation(mut self, enabled: bool) -> Self {
        self.formats = enabled;
        self
    }

    /// Succeed, or fail with every violation in discovery order.
    pub fn validate(&self, value: &Value, schema: SchemaId) -> std::result::Result<(), MultiError> {
        match MultiError::from_violations(self.violations(value, schema)) {
            None => Ok(()),
            Some(errors) => Err(errors),
        }
    }

    pub fn violations(&self, value: &Value, schema: SchemaId) -> Vec<Violation> {
        let mut visit = Visit {
            path: Vec::new(),
            violations: Vec::new(),
            active: Vec::new(),
        };
        self.visit(&mut visit, value, schema);
        visit.violations
    }

    fn visit(&self, cx: &mut Visit, value: &Value, id: SchemaId) {
        // A schema re-entered on the same value without descending (e.g. a
        // recursive allOf) adds nothing new.
        let key = (id, std::ptr::from_ref(value) as usize);
        if cx.active.contains(&key) {
            return;
        }
        cx.active.push(key);
        self.visit_node(cx, value, self.arena.get(id));
        cx.active.pop();
    }

    fn visit_node(&self, cx: &mut Visit, value: &Value, node: &SchemaNode) {
        if value.is_null() {
            if node.annotations.nullable {
                return;
            }
            if !matches!(node.kind, SchemaKind::Untyped(_)) {
                cx.report("Value is not nullable");
                return;
            }
        }

        if let Some(allowed) = &node.annotations.enumeration
            && !allowed.iter().any(|candidate| json_equal(candidate, value))
        {
            cx.report(format!(
                "value is not one of the allowed values {}",
                Value::Array(allowed.clone())
            ));
        }

        let format = node.annotations.format.as_deref();
        match &node.kind {
            SchemaKind::Untyped(rules) => match value {
                Value::String(s) => self.check_string(cx, &rules.string, format, s),
                Value::Number(n) => self.check_number(cx, &rules.number, format, n),
                Value::Array(items) => self.check_array(cx, &rules.array, items),
                Value::Object(map) => self.check_object(cx, &rules.object, map),
                _ => {}
            },
            SchemaKind::Boolean => {
                if !value.is_boolean() {
                    cx.report("value must be a boolean");
                }
            }
            SchemaKind::String(rules) => match value {
                Value::String(s) => self.check_string(cx, rules, format, s),
                _ => cx.report("value must be a string"),
            },
            SchemaKind::Number(rules) => match value {
                Value::Number(n) => self.check_number(cx, rules, format, n),
                _ => cx.report("value must be a number"),
            },
            SchemaKind::Integer(rules) => match value {
                Value::Number(n) if is_whole(n) => self.check_number(cx, rules, format, n),
                _ => cx.report("value must be an integer"),
            },
            SchemaKind::Array(rules) => match value {
                Value::Array(items) => self.check_array(cx, rules, items),
                _ => cx.report("value must be an array"),
            },
            SchemaKind::Object(rules) => match value {
                Value::Object(map) => self.check_object(cx, rules, map),
                _ => cx.report("value must be an object"),
            },
            SchemaKind::Unsupported(name) => {
                cx.report(format!("unsupported schema type \"{}\"", name));
            }
        }

        for composition in &node.compositions {
            self.check_composition(cx, value, composition);
        }
    }

    fn check_string(&self, cx: &mut Visit, rules: &StringRules, format: Option<&str>, s: &str) {
        let length = s.chars().count() as u64;
        if let Some(min) = rules.min_length
            && length < min
        {
            cx.report(format!("minimum string length is {}", min));
        }
        if let Some(max) = rules.max_length
            && length > max
        {
            cx.report(format!("maximum string length is {}", max));
        }

        if let Some(pattern) = &rules.pattern {
            match pattern.regex() {
                Ok(re) if !re.is_match(s) => cx.report(format!(
                    "string doesn't match the regular expression \"{}\"",
                    pattern.source
                )),
                Ok(_) => {}
                Err(e) => cx.report(format!(
                    "pattern \"{}\" is not a valid regular expression: {}",
                    pattern.source, e
                )),
            }
        }

        if self.formats
            && let Some(format) = format
            && let Err(message) = format::check_string(format, s)
        {
            cx.report(message);
        }
    }

    fn check_number(&self, cx: &mut Visit, rules: &NumberRules, format: Option<&str>, n: &Number) {
        let Some(value) = n.as_f64() else {
            return;
        };

        if let Some(min) = rules.minimum {
            if rules.exclusive_minimum && value <= min {
                cx.report(format!("number must be more than {}", min));
            } else if value < min {
                cx.report(format!("number must be at least {}", min));
            }
        }
        if let Some(max) = rules.maximum {
            if rules.exclusive_maximum && value >= max {
                cx.report(format!("number must be less than {}", max));
            } else if value > max {
                cx.report(format!("number must be at most {}", max));
            }
        }
        if let Some(divisor) = rules.multiple_of
            && divisor > 0.0
            && !is_multiple_of(n, value, divisor)
        {
            cx.report(format!("number must be a multiple of {}", divisor));
        }

        if self.formats
            && let Some(format) = format
            && let Err(message) = format::check_number(format, value)
        {
            cx.report(message);
        }
    }

    fn check_array(&self, cx: &mut Visit, rules: &ArrayRules, items: &[Value]) {
        let count = items.len() as u64;
        if let Some(min) = rules.min_items
            && count < min
        {
            cx.report(format!("minimum number of items is {}", min));
        }
        if let Some(max) = rules.max_items
            && count > max
        {
            cx.report(format!("maximum number of items is {}", max));
        }
        if rules.unique_items
            && items
                .iter()
                .enumerate()
                .any(|(i, a)| items[i + 1..].iter().any(|b| json_equal(a, b)))
        {
            cx.report("duplicate items are not allowed");
        }

        if let Some(item_schema) = rules.items {
            for (i, item) in items.iter().enumerate() {
                cx.path.push(i.to_string());
                self.visit(cx, item, item_schema);
                cx.path.pop();
            }
        }
    }

    fn check_object(&self, cx: &mut Visit, rules: &ObjectRules, map: &Map<String, Value>) {
        let count = map.len() as u64;
        if let Some(min) = rules.min_properties
            && count < min
        {
            cx.report(format!("there must be at least {} properties", min));
        }
        if let Some(max) = rules.max_properties
            && count > max
        {
            cx.report(format!("there must be at most {} properties", max));
        }

        for name in &rules.required {
            if map.contains_key(name) {
                continue;
            }
            let exempt = rules
                .properties
                .get(name)
                .is_some_and(|&id| self.hidden_in_mode(self.arena.get(id)));
            if !exempt {
                cx.report(format!("property \"{}\" is missing", name));
            }
        }

        for (name, property) in map {
            match rules.properties.get(name) {
                Some(&id) => {
                    let node = self.arena.get(id);
                    if self.hidden_in_mode(node) {
                        let (annotation, mode) = match self.mode {
                            Some(ValidationMode::Request) => ("readOnly", "request"),
                            _ => ("writeOnly", "response"),
                        };
                        cx.report_at(
                            name,
                            format!("{} property \"{}\" in {}", annotation, name, mode),
                        );
                        continue;
                    }
                    cx.path.push(name.clone());
                    self.visit(cx, property, id);
                    cx.path.pop();
                }
                None => match rules.additional_properties {
                    AdditionalProperties::Allowed => {}
                    AdditionalProperties::Forbidden => {
                        cx.report_at(name, format!("property \"{}\" is unsupported", name));
                    }
                    AdditionalProperties::Schema(id) => {
                        cx.path.push(name.clone());
                        self.visit(cx, property, id);
                        cx.path.pop();
                    }
                },
            }
        }
    }

    /// Whether a property must not appear in the current mode.
    fn hidden_in_mode(&self, property: &SchemaNode) -> bool {
        match self.mode {
            Some(ValidationMode::Request) => property.annotations.read_only,
            Some(ValidationMode::Response) => property.annotations.write_only,
            None => false,
        }
    }

    fn check_composition(&self, cx: &mut Visit, value: &Value, composition: &Composition) {
        let keyword = composition.kind.keyword();
        if composition.kind == CompositionKind::AllOf {
            for &child in &composition.children {
                self.visit(cx, value, child);
            }
            return;
        }

        let branches: Vec<Vec<Violation>> = composition
            .children
            .iter()
            .map(|&child| self.branch(cx, value, child))
            .collect();
        let passing: Vec<usize> = branches
            .iter()
            .enumerate()
            .filter(|(_, violations)| violations.is_empty())
            .map(|(i, _)| i)
            .collect();

        let causes = || {
            branches
                .iter()
                .enumerate()
                .flat_map(|(i, violations)| {
                    violations.iter().map(move |v| {
                        Violation::new(v.path.clone(), format!("{}[{}]: {}", keyword, i, v.message))
                            .with_causes(v.causes.clone())
                    })
                })
                .collect::<Vec<_>>()
        };

        match composition.kind {
            CompositionKind::AnyOf if passing.is_empty() => {
                let violation = Violation::new(
                    cx.path.join("/"),
                    format!("doesn't match any schema from \"{}\"", keyword),
                );
                cx.violations.push(violation.with_causes(causes()));
            }
            CompositionKind::OneOf if passing.is_empty() => {
                let violation = Violation::new(
                    cx.path.join("/"),
                    format!("doesn't match any schema from \"{}\"", keyword),
                );
                cx.violations.push(violation.with_causes(causes()));
            }
            CompositionKind::OneOf if passing.len() > 1 => {
                let matched: Vec<String> = passing.iter().map(|i| i.to_string()).collect();
                cx.report(format!(
                    "value matches more than one schema from \"oneOf\" (branches {})",
                    matched.join(", ")
                ));
            }
            CompositionKind::Not if !passing.is_empty() => {
                cx.report("value must not match the schema in \"not\"");
            }
            _ => {}
        }
    }

    /// Validate one composition branch in isolation.
    fn branch(&self, cx: &Visit, value: &Value, child: SchemaId) -> Vec<Violation> {
        let mut sub = Visit {
            path: cx.path.clone(),
            violations: Vec::new(),
            active: cx.active.clone(),
        };
        self.visit(&mut sub, value, child);
        sub.violations
    }
}

fn is_whole(n: &Number) -> bool {
    n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
}

/// JSON equality treating `1` and `1.0` as the same number.
fn json_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| json_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| json_equal(v, w)))
        }
        _ => a == b,
    }
}

/// Whole operands are compared exactly, anything else within a small tolerance.
fn is_multiple_of(n: &Number, value: f64, divisor: f64) -> bool {
    if let Some(divisor) = whole(divisor)
        && let Some(value) = n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
            .or_else(|| whole(value))
    {
        return value % divisor == 0;
    }
    let quotient = value / divisor;
    (quotient - quotient.round()).abs() <= 1e-9
}

fn whole(value: f64) -> Option<i128> {
    (value.fract() == 0.0 && value.abs() < 1e38).then_some(value as i128)
}
