use std::collections::BTreeMap;
use std::fmt;

use crate::descriptor::Descriptor;
use crate::foundation::error::ArborError;
use crate::value::{Tag, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaPathElem {
    Field(&'static str),
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone)]
pub struct SchemaError {
    pub path: Vec<SchemaPathElem>,
    pub message: String,
}

impl SchemaError {
    pub(crate) fn at(path: &[SchemaPathElem], message: impl Into<String>) -> Self {
        Self {
            path: path.to_vec(),
            message: message.into(),
        }
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            return write!(f, "{}", self.message);
        }
        write!(f, "{}: {}", format_path(&self.path), self.message)
    }
}

fn format_path(path: &[SchemaPathElem]) -> String {
    let mut s = String::from("$");
    for p in path {
        match p {
            SchemaPathElem::Field(name) => {
                s.push('.');
                s.push_str(name);
            }
            SchemaPathElem::Key(name) => {
                s.push('.');
                s.push_str(name);
            }
            SchemaPathElem::Index(i) => {
                s.push('[');
                s.push_str(&i.to_string());
                s.push(']');
            }
        }
    }
    s
}

#[derive(Debug, Clone)]
pub struct SchemaErrors {
    pub errors: Vec<SchemaError>,
}

impl fmt::Display for SchemaErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for SchemaErrors {}

impl From<SchemaErrors> for ArborError {
    fn from(e: SchemaErrors) -> Self {
        ArborError::schema(e.to_string())
    }
}

/// Serialized descriptor, e.g. `{"type": "array_of", "of": {"type": "number"}, "required": true}`.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct DescriptorDef {
    #[serde(flatten)]
    pub kind: KindDef,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KindDef {
    Any,
    Bool,
    Number,
    Integer,
    String,
    Symbol,
    Func,
    Object,
    Array,
    Node,
    Element,
    ElementType,
    EnumOf {
        values: Vec<serde_json::Value>,
    },
    OneOf {
        types: Vec<DescriptorDef>,
    },
    ArrayOf {
        of: Box<DescriptorDef>,
    },
    ObjectOf {
        of: Box<DescriptorDef>,
    },
    Shape {
        fields: BTreeMap<String, DescriptorDef>,
    },
    Exact {
        fields: BTreeMap<String, DescriptorDef>,
    },
    InstanceOf {
        tag: String,
    },
}

impl DescriptorDef {
    pub fn lower(&self, tags: &mut TagTable) -> Result<Descriptor, SchemaErrors> {
        let mut errors = Vec::new();
        let d = lower_at(self, tags, &mut Vec::new(), &mut errors);
        if errors.is_empty() {
            Ok(d)
        } else {
            Err(SchemaErrors { errors })
        }
    }
}

/// Lower `def`, appending problems to `errors` with `path` as their location. Always returns a
/// descriptor so that sibling errors can still be collected.
pub(crate) fn lower_at(
    def: &DescriptorDef,
    tags: &mut TagTable,
    path: &mut Vec<SchemaPathElem>,
    errors: &mut Vec<SchemaError>,
) -> Descriptor {
    let d = match &def.kind {
        KindDef::Any => Descriptor::any(),
        KindDef::Bool => Descriptor::bool(),
        KindDef::Number => Descriptor::number(),
        KindDef::Integer => Descriptor::integer(),
        KindDef::String => Descriptor::string(),
        KindDef::Symbol => Descriptor::symbol(),
        KindDef::Func => Descriptor::func(),
        KindDef::Object => Descriptor::object(),
        KindDef::Array => Descriptor::array(),
        KindDef::Node => Descriptor::node(),
        KindDef::Element => Descriptor::element(),
        KindDef::ElementType => Descriptor::element_type(),
        KindDef::EnumOf { values } => {
            if values.is_empty() {
                errors.push(SchemaError::at(
                    &[path.as_slice(), &[SchemaPathElem::Field("values")]].concat(),
                    "enum_of needs at least one value",
                ));
            }
            Descriptor::enum_of(values.iter().map(|v| tags.json_to_value(v)))
        }
        KindDef::OneOf { types } => {
            if types.is_empty() {
                errors.push(SchemaError::at(
                    &[path.as_slice(), &[SchemaPathElem::Field("types")]].concat(),
                    "one_of needs at least one type",
                ));
            }
            let mut options = Vec::with_capacity(types.len());
            for (i, t) in types.iter().enumerate() {
                path.push(SchemaPathElem::Field("types"));
                path.push(SchemaPathElem::Index(i));
                options.push(lower_at(t, tags, path, errors));
                path.pop();
                path.pop();
            }
            Descriptor::one_of(options)
        }
        KindDef::ArrayOf { of } => {
            path.push(SchemaPathElem::Field("of"));
            let item = lower_at(of, tags, path, errors);
            path.pop();
            Descriptor::array_of(item)
        }
        KindDef::ObjectOf { of } => {
            path.push(SchemaPathElem::Field("of"));
            let item = lower_at(of, tags, path, errors);
            path.pop();
            Descriptor::object_of(item)
        }
        KindDef::Shape { fields } => Descriptor::shape(lower_fields(fields, tags, path, errors)),
        KindDef::Exact { fields } => Descriptor::exact(lower_fields(fields, tags, path, errors)),
        KindDef::InstanceOf { tag } => {
            if tag.trim().is_empty() {
                errors.push(SchemaError::at(
                    &[path.as_slice(), &[SchemaPathElem::Field("tag")]].concat(),
                    "instance_of tag must be non-empty",
                ));
            }
            Descriptor::instance_of(&tags.intern(tag))
        }
    };
    if def.required { d.required() } else { d }
}

fn lower_fields(
    fields: &BTreeMap<String, DescriptorDef>,
    tags: &mut TagTable,
    path: &mut Vec<SchemaPathElem>,
    errors: &mut Vec<SchemaError>,
) -> Vec<(String, Descriptor)> {
    let mut out = Vec::with_capacity(fields.len());
    for (name, def) in fields {
        path.push(SchemaPathElem::Field("fields"));
        path.push(SchemaPathElem::Key(name.clone()));
        out.push((name.clone(), lower_at(def, tags, path, errors)));
        path.pop();
        path.pop();
    }
    out
}

/// Interns tag names so that every mention of a tag within one document is the same [`Tag`].
#[derive(Debug, Default)]
pub struct TagTable {
    tags: BTreeMap<String, Tag>,
}

impl TagTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, name: &str) -> Tag {
        self.tags
            .entry(name.to_string())
            .or_insert_with(|| Tag::new(name))
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<&Tag> {
        self.tags.get(name)
    }

    /// Like `Value::from(serde_json::Value)`, except that objects carrying a string `$tag`
    /// become tagged values with the remaining keys as fields.
    pub fn json_to_value(&mut self, v: &serde_json::Value) -> Value {
        match v {
            serde_json::Value::Array(items) => {
                Value::array(items.iter().map(|item| self.json_to_value(item)))
            }
            serde_json::Value::Object(map) => {
                let fields: Vec<(String, Value)> = map
                    .iter()
                    .filter(|(k, _)| k.as_str() != "$tag")
                    .map(|(k, v)| (k.clone(), self.json_to_value(v)))
                    .collect();
                match map.get("$tag").and_then(serde_json::Value::as_str) {
                    Some(name) => {
                        let tag = self.intern(name);
                        Value::tagged(&tag, fields)
                    }
                    None => Value::object(fields),
                }
            }
            other => Value::from(other.clone()),
        }
    }
}
