use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::value::{Tag, Value};

/// Runtime categories a value can be checked against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Primitive {
    Bool,
    Number,
    String,
    Symbol,
    Function,
    AnyObject,
    AnyArray,
    /// Anything renderable: null, numbers, strings, `false`, elements and arrays of those.
    Node,
    /// A component node carried as a value.
    Element,
    /// Something a node can be built from: a host tag name or a component.
    ElementType,
}

impl Primitive {
    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Number => "number",
            Self::String => "string",
            Self::Symbol => "symbol",
            Self::Function => "function",
            Self::AnyObject => "object",
            Self::AnyArray => "array",
            Self::Node => "node",
            Self::Element => "element",
            Self::ElementType => "element type",
        }
    }
}

/// Extra check layered on top of a base descriptor.
pub type Refinement = Rc<dyn Fn(&Value) -> bool>;

#[derive(Clone)]
pub enum Kind {
    Any,
    Primitive(Primitive),
    EnumOf(Vec<Value>),
    OneOf(Vec<Descriptor>),
    ArrayOf(Box<Descriptor>),
    ObjectOf(Box<Descriptor>),
    Shape {
        fields: BTreeMap<String, Descriptor>,
        extra_keys_allowed: bool,
    },
    InstanceOf(Tag),
    Refined {
        base: Box<Descriptor>,
        name: Rc<str>,
        predicate: Refinement,
    },
}

impl fmt::Debug for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("Any"),
            Self::Primitive(p) => f.debug_tuple("Primitive").field(p).finish(),
            Self::EnumOf(values) => f.debug_tuple("EnumOf").field(values).finish(),
            Self::OneOf(ds) => f.debug_tuple("OneOf").field(ds).finish(),
            Self::ArrayOf(d) => f.debug_tuple("ArrayOf").field(d).finish(),
            Self::ObjectOf(d) => f.debug_tuple("ObjectOf").field(d).finish(),
            Self::Shape {
                fields,
                extra_keys_allowed,
            } => f
                .debug_struct("Shape")
                .field("fields", fields)
                .field("extra_keys_allowed", extra_keys_allowed)
                .finish(),
            Self::InstanceOf(tag) => f.debug_tuple("InstanceOf").field(tag).finish(),
            Self::Refined { base, name, .. } => f
                .debug_struct("Refined")
                .field("base", base)
                .field("name", &&**name)
                .finish_non_exhaustive(),
        }
    }
}

/// Expected shape of a value. Immutable; build one with the constructor functions and share it
/// freely between components.
#[derive(Clone, Debug)]
pub struct Descriptor {
    kind: Kind,
    required: bool,
}

impl Descriptor {
    fn of(kind: Kind) -> Self {
        Self {
            kind,
            required: false,
        }
    }

    pub fn any() -> Self {
        Self::of(Kind::Any)
    }

    pub fn primitive(p: Primitive) -> Self {
        Self::of(Kind::Primitive(p))
    }

    pub fn bool() -> Self {
        Self::primitive(Primitive::Bool)
    }

    pub fn number() -> Self {
        Self::primitive(Primitive::Number)
    }

    pub fn string() -> Self {
        Self::primitive(Primitive::String)
    }

    pub fn symbol() -> Self {
        Self::primitive(Primitive::Symbol)
    }

    pub fn func() -> Self {
        Self::primitive(Primitive::Function)
    }

    pub fn object() -> Self {
        Self::primitive(Primitive::AnyObject)
    }

    pub fn array() -> Self {
        Self::primitive(Primitive::AnyArray)
    }

    pub fn node() -> Self {
        Self::primitive(Primitive::Node)
    }

    pub fn element() -> Self {
        Self::primitive(Primitive::Element)
    }

    pub fn element_type() -> Self {
        Self::primitive(Primitive::ElementType)
    }

    /// A finite number with no fractional part.
    pub fn integer() -> Self {
        Self::number().refine("integer", |v| {
            v.as_f64().is_some_and(|n| n.fract() == 0.0)
        })
    }

    pub fn enum_of(values: impl IntoIterator<Item = Value>) -> Self {
        Self::of(Kind::EnumOf(values.into_iter().collect()))
    }

    pub fn one_of(options: impl IntoIterator<Item = Descriptor>) -> Self {
        Self::of(Kind::OneOf(options.into_iter().collect()))
    }

    pub fn array_of(item: Descriptor) -> Self {
        Self::of(Kind::ArrayOf(Box::new(item)))
    }

    pub fn object_of(value: Descriptor) -> Self {
        Self::of(Kind::ObjectOf(Box::new(value)))
    }

    /// Declared keys are checked when present; undeclared keys are allowed.
    pub fn shape<K: Into<String>>(fields: impl IntoIterator<Item = (K, Descriptor)>) -> Self {
        Self::of(Kind::Shape {
            fields: fields.into_iter().map(|(k, d)| (k.into(), d)).collect(),
            extra_keys_allowed: true,
        })
    }

    /// Like [`Descriptor::shape`], but undeclared keys are reported as unexpected.
    pub fn exact<K: Into<String>>(fields: impl IntoIterator<Item = (K, Descriptor)>) -> Self {
        Self::of(Kind::Shape {
            fields: fields.into_iter().map(|(k, d)| (k.into(), d)).collect(),
            extra_keys_allowed: false,
        })
    }

    pub fn instance_of(tag: &Tag) -> Self {
        Self::of(Kind::InstanceOf(tag.clone()))
    }

    /// Layer a named predicate over this descriptor. The predicate only runs once the base
    /// descriptor has matched. `required` carries over to the refined descriptor.
    pub fn refine(self, name: &str, predicate: impl Fn(&Value) -> bool + 'static) -> Self {
        let required = self.required;
        Self {
            kind: Kind::Refined {
                base: Box::new(self),
                name: Rc::from(name),
                predicate: Rc::new(predicate),
            },
            required,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Human-readable name of what this descriptor expects.
    pub fn expected(&self) -> String {
        match &self.kind {
            Kind::Any => "any".to_string(),
            Kind::Primitive(p) => p.name().to_string(),
            Kind::EnumOf(values) => {
                let items: Vec<String> = values.iter().map(Value::to_string).collect();
                format!("one of [{}]", items.join(", "))
            }
            Kind::OneOf(options) => {
                let items: Vec<String> = options.iter().map(Descriptor::expected).collect();
                format!("one of type [{}]", items.join(", "))
            }
            Kind::ArrayOf(d) => format!("array of {}", d.expected()),
            Kind::ObjectOf(d) => format!("object of {}", d.expected()),
            Kind::Shape {
                fields,
                extra_keys_allowed,
            } => {
                let keys: Vec<&str> = fields.keys().map(String::as_str).collect();
                let label = if *extra_keys_allowed { "shape" } else { "exact" };
                format!("{label} {{{}}}", keys.join(", "))
            }
            Kind::InstanceOf(tag) => format!("instance of {}", tag.name()),
            Kind::Refined { name, .. } => name.to_string(),
        }
    }
}
