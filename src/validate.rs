use std::collections::BTreeMap;
use std::fmt;

use crate::descriptor::{Descriptor, Kind, Primitive};
use crate::value::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathElem {
    Key(String),
    Index(usize),
}

/// Location of a value inside a props mapping, printed as `$.user.emails[2]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropPath(Vec<PathElem>);

impl PropPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn elems(&self) -> &[PathElem] {
        &self.0
    }

    pub fn key(&self, key: &str) -> Self {
        let mut elems = self.0.clone();
        elems.push(PathElem::Key(key.to_string()));
        Self(elems)
    }

    pub fn index(&self, i: usize) -> Self {
        let mut elems = self.0.clone();
        elems.push(PathElem::Index(i));
        Self(elems)
    }
}

impl fmt::Display for PropPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for p in &self.0 {
            match p {
                PathElem::Key(name) => write!(f, ".{name}")?,
                PathElem::Index(i) => write!(f, "[{i}]")?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    TypeMismatch,
    MissingRequiredProp,
    UnexpectedProp,
}

/// One prop mismatch: where it is, what was expected, and what was found (`None` when absent).
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub path: PropPath,
    pub expected: String,
    pub actual: Option<Value>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.actual) {
            (DiagnosticKind::MissingRequiredProp, _) => {
                write!(f, "{}: required {} is missing", self.path, self.expected)
            }
            (DiagnosticKind::UnexpectedProp, Some(v)) => {
                write!(f, "{}: unexpected prop (got {v})", self.path)
            }
            (DiagnosticKind::UnexpectedProp, None) => {
                write!(f, "{}: unexpected prop", self.path)
            }
            (DiagnosticKind::TypeMismatch, Some(v)) => write!(
                f,
                "{}: expected {}, got {} {v}",
                self.path,
                self.expected,
                v.kind_name()
            ),
            (DiagnosticKind::TypeMismatch, None) => {
                write!(f, "{}: expected {}", self.path, self.expected)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    pub fn ok(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, d) in self.diagnostics.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{d}")?;
        }
        Ok(())
    }
}

/// Check `value` against `descriptor`. `Null` counts as an absent value.
pub fn validate(descriptor: &Descriptor, value: &Value) -> ValidationResult {
    let mut diagnostics = Vec::new();
    check(descriptor, Some(value), &PropPath::root(), &mut diagnostics);
    ValidationResult { diagnostics }
}

/// Check a props mapping against per-prop descriptors. Undeclared props are allowed.
pub fn validate_props(descriptors: &BTreeMap<String, Descriptor>, props: &Map) -> ValidationResult {
    let mut diagnostics = Vec::new();
    let root = PropPath::root();
    for (name, d) in descriptors {
        check(d, props.get(name), &root.key(name), &mut diagnostics);
    }
    ValidationResult { diagnostics }
}

fn check(d: &Descriptor, value: Option<&Value>, path: &PropPath, out: &mut Vec<Diagnostic>) {
    let value = match value {
        Some(v) if !v.is_null() => v,
        _ => {
            if d.is_required() {
                out.push(Diagnostic {
                    kind: DiagnosticKind::MissingRequiredProp,
                    path: path.clone(),
                    expected: d.expected(),
                    actual: None,
                });
            }
            return;
        }
    };
    check_present(d, value, path, out);
}

fn check_present(d: &Descriptor, value: &Value, path: &PropPath, out: &mut Vec<Diagnostic>) {
    match d.kind() {
        Kind::Any => {}
        Kind::Primitive(p) => {
            if !matches_primitive(*p, value) {
                out.push(mismatch(d, value, path));
            }
        }
        Kind::EnumOf(allowed) => {
            if !allowed.iter().any(|a| a.same(value)) {
                out.push(mismatch(d, value, path));
            }
        }
        Kind::OneOf(options) => {
            let mut failures = Vec::new();
            for option in options {
                let before = failures.len();
                check_present(option, value, path, &mut failures);
                if failures.len() == before {
                    return;
                }
            }
            if options.is_empty() {
                out.push(mismatch(d, value, path));
            }
            out.extend(failures);
        }
        Kind::ArrayOf(item) => {
            let Some(items) = value.as_array() else {
                out.push(mismatch(d, value, path));
                return;
            };
            for (i, el) in items.iter().enumerate() {
                let before = out.len();
                check(item, Some(el), &path.index(i), out);
                if out.len() > before {
                    break;
                }
            }
        }
        Kind::ObjectOf(item) => {
            let Value::Object(map) = value else {
                out.push(mismatch(d, value, path));
                return;
            };
            for (k, v) in map.iter() {
                check(item, Some(v), &path.key(k), out);
            }
        }
        Kind::Shape {
            fields,
            extra_keys_allowed,
        } => {
            let Some(map) = value.as_map() else {
                out.push(mismatch(d, value, path));
                return;
            };
            for (k, fd) in fields {
                check(fd, map.get(k), &path.key(k), out);
            }
            if !extra_keys_allowed {
                for (k, v) in map {
                    if !fields.contains_key(k) {
                        out.push(Diagnostic {
                            kind: DiagnosticKind::UnexpectedProp,
                            path: path.key(k),
                            expected: d.expected(),
                            actual: Some(v.clone()),
                        });
                    }
                }
            }
        }
        Kind::InstanceOf(tag) => {
            let is_instance = matches!(value, Value::Tagged(t) if t.tag == *tag);
            if !is_instance {
                out.push(mismatch(d, value, path));
            }
        }
        Kind::Refined {
            base, predicate, ..
        } => {
            let before = out.len();
            check_present(base, value, path, out);
            if out.len() == before && !predicate(value) {
                out.push(mismatch(d, value, path));
            }
        }
    }
}

fn mismatch(d: &Descriptor, value: &Value, path: &PropPath) -> Diagnostic {
    Diagnostic {
        kind: DiagnosticKind::TypeMismatch,
        path: path.clone(),
        expected: d.expected(),
        actual: Some(value.clone()),
    }
}

fn matches_primitive(p: Primitive, value: &Value) -> bool {
    match p {
        Primitive::Bool => matches!(value, Value::Bool(_)),
        Primitive::Number => matches!(value, Value::Number(n) if n.is_finite()),
        Primitive::String => matches!(value, Value::String(_)),
        Primitive::Symbol => matches!(value, Value::Symbol(_)),
        Primitive::Function => matches!(value, Value::Function(_)),
        Primitive::AnyObject => {
            matches!(value, Value::Object(_) | Value::Tagged(_) | Value::Element(_))
        }
        Primitive::AnyArray => matches!(value, Value::Array(_)),
        Primitive::Node => is_renderable(value),
        Primitive::Element => matches!(value, Value::Element(_)),
        Primitive::ElementType => matches!(value, Value::String(_) | Value::Component(_)),
    }
}

fn is_renderable(value: &Value) -> bool {
    match value {
        Value::Null | Value::Number(_) | Value::String(_) | Value::Element(_) => true,
        Value::Bool(b) => !b,
        Value::Array(items) => items.iter().all(is_renderable),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Symbol, Tag};

    fn kinds(r: &ValidationResult) -> Vec<DiagnosticKind> {
        r.diagnostics.iter().map(|d| d.kind).collect()
    }

    #[test]
    fn primitives_check_runtime_category() {
        assert!(validate(&Descriptor::bool(), &Value::from(true)).ok());
        assert!(validate(&Descriptor::number(), &Value::from(1.5)).ok());
        assert!(!validate(&Descriptor::number(), &Value::Number(f64::INFINITY)).ok());
        assert!(!validate(&Descriptor::number(), &Value::from("1")).ok());
        assert!(validate(&Descriptor::symbol(), &Value::Symbol(Symbol::new("s"))).ok());
        assert!(validate(&Descriptor::func(), &Value::function(|_| Value::Null)).ok());
        assert!(!validate(&Descriptor::object(), &Value::array([])).ok());
        assert!(validate(&Descriptor::array(), &Value::array([])).ok());
    }

    #[test]
    fn integer_is_a_refined_number() {
        assert!(validate(&Descriptor::integer(), &Value::from(3)).ok());
        let r = validate(&Descriptor::integer(), &Value::from(3.5));
        assert_eq!(kinds(&r), vec![DiagnosticKind::TypeMismatch]);
        assert_eq!(r.diagnostics[0].expected, "integer");

        // The base check reports first; the predicate never sees a string.
        let r = validate(&Descriptor::integer(), &Value::from("3"));
        assert_eq!(r.diagnostics.len(), 1);
        assert_eq!(r.diagnostics[0].expected, "number");
    }

    #[test]
    fn null_is_absent() {
        assert!(validate(&Descriptor::string(), &Value::Null).ok());
        let r = validate(&Descriptor::any().required(), &Value::Null);
        assert_eq!(kinds(&r), vec![DiagnosticKind::MissingRequiredProp]);
    }

    #[test]
    fn enum_uses_strict_equality() {
        let d = Descriptor::enum_of([Value::from("News"), Value::from("Photos")]);
        assert!(validate(&d, &Value::from("Photos")).ok());
        assert!(!validate(&d, &Value::from("news")).ok());

        let shared = Value::object([("id", Value::from(1))]);
        let d = Descriptor::enum_of([shared.clone()]);
        assert!(validate(&d, &shared).ok());
        assert!(!validate(&d, &Value::object([("id", Value::from(1))])).ok());
    }

    #[test]
    fn one_of_reports_all_branches_only_when_all_fail() {
        let msg = Tag::new("Message");
        let d = Descriptor::one_of([
            Descriptor::string(),
            Descriptor::number(),
            Descriptor::instance_of(&msg),
        ]);
        assert!(validate(&d, &Value::from(4)).ok());
        assert!(validate(&d, &Value::tagged(&msg, [("text", Value::from("x"))])).ok());

        let r = validate(&d, &Value::from(true));
        assert_eq!(r.diagnostics.len(), 3);
        let expected: Vec<&str> = r.diagnostics.iter().map(|d| d.expected.as_str()).collect();
        assert_eq!(expected, vec!["string", "number", "instance of Message"]);
    }

    #[test]
    fn array_of_stops_at_first_failing_index() {
        let d = Descriptor::array_of(Descriptor::number());
        let r = validate(
            &d,
            &Value::array([Value::from(1), Value::from("a"), Value::from("b")]),
        );
        assert_eq!(r.diagnostics.len(), 1);
        assert_eq!(r.diagnostics[0].path.to_string(), "$[1]");

        let r = validate(&d, &Value::from("nope"));
        assert_eq!(r.diagnostics[0].path.to_string(), "$");
    }

    #[test]
    fn object_of_checks_every_value() {
        let d = Descriptor::object_of(Descriptor::string());
        let v = Value::object([
            ("email", Value::from("a@b.com")),
            ("age", Value::from(3)),
            ("zip", Value::from(9)),
        ]);
        let r = validate(&d, &v);
        let paths: Vec<String> = r.diagnostics.iter().map(|d| d.path.to_string()).collect();
        assert_eq!(paths, vec!["$.age", "$.zip"]);
    }

    #[test]
    fn shape_versus_exact_on_extra_keys() {
        let fields = || [("a", Descriptor::string()), ("b", Descriptor::number())];
        let v = Value::object([
            ("a", Value::from("x")),
            ("b", Value::from(1)),
            ("c", Value::from(true)),
        ]);

        assert!(validate(&Descriptor::shape(fields()), &v).ok());

        let r = validate(&Descriptor::exact(fields()), &v);
        assert_eq!(kinds(&r), vec![DiagnosticKind::UnexpectedProp]);
        assert_eq!(r.diagnostics[0].path.to_string(), "$.c");
        assert_eq!(r.diagnostics[0].actual, Some(Value::from(true)));
    }

    #[test]
    fn shape_reports_missing_required_fields() {
        let d = Descriptor::shape([
            ("fullName", Descriptor::string().required()),
            ("email", Descriptor::string()),
        ]);
        let r = validate(&d, &Value::object([("email", Value::from("a@b.com"))]));
        assert_eq!(kinds(&r), vec![DiagnosticKind::MissingRequiredProp]);
        assert_eq!(r.diagnostics[0].path.to_string(), "$.fullName");
    }

    #[test]
    fn instance_of_is_nominal() {
        let a = Tag::new("Message");
        let b = Tag::new("Message");
        let d = Descriptor::instance_of(&a);
        assert!(validate(&d, &Value::tagged(&a, Vec::<(String, Value)>::new())).ok());
        assert!(!validate(&d, &Value::tagged(&b, Vec::<(String, Value)>::new())).ok());
        assert!(!validate(&d, &Value::object([("tag", Value::from("Message"))])).ok());
    }

    #[test]
    fn node_accepts_renderables() {
        let d = Descriptor::node();
        assert!(validate(&d, &Value::from("text")).ok());
        assert!(validate(&d, &Value::from(false)).ok());
        assert!(validate(&d, &Value::array([Value::from(1), Value::from("x")])).ok());
        assert!(!validate(&d, &Value::from(true)).ok());
        assert!(!validate(&d, &Value::object([("a", Value::from(1))])).ok());
    }

    #[test]
    fn validate_props_checks_declared_keys_only() {
        let descriptors = BTreeMap::from([
            ("label".to_string(), Descriptor::string()),
            ("onClick".to_string(), Descriptor::func().required()),
        ]);
        let props = Map::from([
            ("label".to_string(), Value::from(3)),
            ("extra".to_string(), Value::from(true)),
        ]);
        let r = validate_props(&descriptors, &props);
        assert_eq!(
            kinds(&r),
            vec![
                DiagnosticKind::TypeMismatch,
                DiagnosticKind::MissingRequiredProp
            ]
        );
        assert_eq!(r.diagnostics[0].path.to_string(), "$.label");
        assert_eq!(r.diagnostics[1].path.to_string(), "$.onClick");
    }

    #[test]
    fn diagnostic_display_is_readable() {
        let r = validate(
            &Descriptor::shape([("age", Descriptor::number())]),
            &Value::object([("age", Value::from("ten"))]),
        );
        assert_eq!(r.to_string(), r#"$.age: expected number, got string "ten""#);
    }
}
