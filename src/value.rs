use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde::ser::SerializeMap as _;

use crate::component::{Component, Node};

/// String-keyed mapping used for props, state and object values.
pub type Map = BTreeMap<String, Value>;

/// A unique symbol. Two symbols are equal only if they come from the same `Symbol::new` call.
#[derive(Clone)]
pub struct Symbol(Rc<str>);

impl Symbol {
    pub fn new(description: &str) -> Self {
        Self(Rc::from(description))
    }

    pub fn description(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Symbol {}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.0)
    }
}

/// Nominal type tag, the analogue of a constructor identity.
///
/// Tags compare by identity, so two tags named `Message` created separately never match.
#[derive(Clone)]
pub struct Tag(Rc<str>);

impl Tag {
    pub fn new(name: &str) -> Self {
        Self(Rc::from(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Tag {}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({})", self.0)
    }
}

type NativeFn = dyn Fn(&[Value]) -> Value;

/// Callable prop value (event handlers and the like). Compared by identity.
#[derive(Clone)]
pub struct Function(Rc<NativeFn>);

impl Function {
    pub fn new(f: impl Fn(&[Value]) -> Value + 'static) -> Self {
        Self(Rc::new(f))
    }

    pub fn call(&self, args: &[Value]) -> Value {
        (self.0)(args)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Function(..)")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TaggedValue {
    pub tag: Tag,
    pub fields: Map,
}

/// Dynamic value carried in props and state.
///
/// Compound variants are reference counted: cloning a `Value` never copies an array or object,
/// which is what lets [`Value::same`] answer "is this the very same value".
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Symbol(Symbol),
    Function(Function),
    Array(Rc<Vec<Value>>),
    Object(Rc<Map>),
    Tagged(Rc<TaggedValue>),
    Element(Rc<Node>),
    Component(Rc<Component>),
}

impl Value {
    pub fn string(s: impl AsRef<str>) -> Self {
        Self::String(Rc::from(s.as_ref()))
    }

    pub fn number(n: impl Into<f64>) -> Self {
        Self::Number(n.into())
    }

    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Self::Array(Rc::new(items.into_iter().collect()))
    }

    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Object(Rc::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn function(f: impl Fn(&[Value]) -> Value + 'static) -> Self {
        Self::Function(Function::new(f))
    }

    pub fn tagged<K: Into<String>>(
        tag: &Tag,
        fields: impl IntoIterator<Item = (K, Value)>,
    ) -> Self {
        Self::Tagged(Rc::new(TaggedValue {
            tag: tag.clone(),
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }))
    }

    pub fn element(node: Node) -> Self {
        Self::Element(Rc::new(node))
    }

    pub fn component(component: &Rc<Component>) -> Self {
        Self::Component(Rc::clone(component))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Key/value view of plain objects and tagged instances.
    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Self::Object(map) => Some(map.as_ref()),
            Self::Tagged(t) => Some(&t.fields),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|m| m.get(key))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Symbol(_) => "symbol",
            Self::Function(_) => "function",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Tagged(_) => "instance",
            Self::Element(_) => "element",
            Self::Component(_) => "component",
        }
    }

    /// Identity comparison with `Object.is` semantics.
    ///
    /// Primitives compare by value (`NaN` is the same as `NaN`, `0.0` is not the same as `-0.0`),
    /// strings by content, everything else by reference.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => {
                (a.is_nan() && b.is_nan())
                    || (a == b && a.is_sign_negative() == b.is_sign_negative())
            }
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Symbol(a), Self::Symbol(b)) => a == b,
            (Self::Function(a), Self::Function(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => Rc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            (Self::Tagged(a), Self::Tagged(b)) => Rc::ptr_eq(a, b),
            (Self::Element(a), Self::Element(b)) => Rc::ptr_eq(a, b),
            (Self::Component(a), Self::Component(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Structural equality: arrays, objects and tagged values compare deeply; symbols, functions,
/// elements and components compare by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Symbol(a), Self::Symbol(b)) => a == b,
            (Self::Function(a), Self::Function(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::Tagged(a), Self::Tagged(b)) => a == b,
            (Self::Element(a), Self::Element(b)) => Rc::ptr_eq(a, b),
            (Self::Component(a), Self::Component(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Self::Number(n) => f.debug_tuple("Number").field(n).finish(),
            Self::String(s) => f.debug_tuple("String").field(&&**s).finish(),
            Self::Symbol(s) => s.fmt(f),
            Self::Function(func) => func.fmt(f),
            Self::Array(items) => f.debug_list().entries(items.iter()).finish(),
            Self::Object(map) => f.debug_map().entries(map.iter()).finish(),
            Self::Tagged(t) => f
                .debug_tuple("Tagged")
                .field(&t.tag)
                .field(&t.fields)
                .finish(),
            Self::Element(node) => write!(f, "Element(<{}>)", node.component().name()),
            Self::Component(c) => write!(f, "Component(<{}>)", c.name()),
        }
    }
}

/// Compact JSON rendering, used in diagnostics and log lines.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&s)
    }
}

impl serde::Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => s.serialize_unit(),
            Self::Bool(b) => s.serialize_bool(*b),
            Self::Number(n) => {
                // Keep integral values integral in JSON output ("1", not "1.0").
                if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
                    s.serialize_i64(*n as i64)
                } else {
                    s.serialize_f64(*n)
                }
            }
            Self::String(v) => s.serialize_str(v),
            Self::Symbol(sym) => s.serialize_str(&format!("Symbol({})", sym.description())),
            Self::Function(_) => s.serialize_str("[function]"),
            Self::Array(items) => s.collect_seq(items.iter()),
            Self::Object(map) => s.collect_map(map.iter()),
            Self::Tagged(t) => {
                let mut m = s.serialize_map(Some(t.fields.len() + 1))?;
                m.serialize_entry("$tag", t.tag.name())?;
                for (k, v) in &t.fields {
                    m.serialize_entry(k, v)?;
                }
                m.end()
            }
            Self::Element(node) => {
                let mut m = s.serialize_map(Some(3))?;
                m.serialize_entry("$element", node.component().name())?;
                m.serialize_entry("key", &node.key())?;
                m.serialize_entry("props", node.props())?;
                m.end()
            }
            Self::Component(c) => s.serialize_str(&format!("<{}>", c.name())),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Number(v as f64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::string(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(Rc::from(v))
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::Array(Rc::new(v))
    }
}

impl From<Map> for Value {
    fn from(v: Map) -> Self {
        Self::Object(Rc::new(v))
    }
}

impl From<Node> for Value {
    fn from(v: Node) -> Self {
        Self::element(v)
    }
}

/// Plain JSON conversion. Objects stay plain objects; see `schema::TagTable` for `$tag` support.
impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Self::from(s),
            serde_json::Value::Array(items) => Self::array(items.into_iter().map(Self::from)),
            serde_json::Value::Object(map) => {
                Self::object(map.into_iter().map(|(k, v)| (k, Self::from(v))))
            }
        }
    }
}
