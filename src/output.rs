use crate::foundation::math::Fnv1a64;
use crate::value::{Map, Value};

/// Result of a pass: what the presentation layer receives.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Output {
    Element {
        component: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        props: Map,
        children: Vec<Output>,
    },
    Primitive(Value),
}

impl Output {
    pub fn component(&self) -> Option<&str> {
        match self {
            Self::Element { component, .. } => Some(component.as_str()),
            Self::Primitive(_) => None,
        }
    }

    pub fn props(&self) -> Option<&Map> {
        match self {
            Self::Element { props, .. } => Some(props),
            Self::Primitive(_) => None,
        }
    }

    pub fn children(&self) -> &[Output] {
        match self {
            Self::Element { children, .. } => children.as_slice(),
            Self::Primitive(_) => &[],
        }
    }

    /// First element named `component`, depth-first in render order.
    pub fn find(&self, component: &str) -> Option<&Output> {
        if self.component() == Some(component) {
            return Some(self);
        }
        self.children().iter().find_map(|c| c.find(component))
    }

    /// Concatenated string and number leaves, in render order.
    pub fn text(&self) -> String {
        let mut s = String::new();
        self.collect_text(&mut s);
        s
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Self::Primitive(Value::String(v)) => out.push_str(v),
            Self::Primitive(v @ Value::Number(_)) => out.push_str(&v.to_string()),
            Self::Primitive(_) => {}
            Self::Element { children, .. } => {
                for c in children {
                    c.collect_text(out);
                }
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OutputFingerprint {
    pub hi: u64,
    pub lo: u64,
}

impl std::fmt::Display for OutputFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}{:016x}", self.hi, self.lo)
    }
}

/// 128-bit structural digest of an output tree. Functions hash by identity, so a digest is only
/// comparable within one process.
pub fn fingerprint_output(out: &Output) -> OutputFingerprint {
    let mut a = Fnv1a64::new(Fnv1a64::OFFSET_BASIS);
    let mut b = Fnv1a64::new(0x9ae1_6a3b_2f90_404f);
    write_output_pair(&mut a, &mut b, out);
    OutputFingerprint {
        hi: a.finish(),
        lo: b.finish(),
    }
}

fn write_output_pair(a: &mut Fnv1a64, b: &mut Fnv1a64, out: &Output) {
    match out {
        Output::Element {
            component,
            key,
            props,
            children,
        } => {
            write_u8_pair(a, b, 0);
            write_str_pair(a, b, component);
            match key {
                Some(k) => {
                    write_u8_pair(a, b, 1);
                    write_str_pair(a, b, k);
                }
                None => write_u8_pair(a, b, 0),
            }
            write_map_pair(a, b, props);
            write_u64_pair(a, b, children.len() as u64);
            for c in children {
                write_output_pair(a, b, c);
            }
        }
        Output::Primitive(v) => {
            write_u8_pair(a, b, 1);
            write_value_pair(a, b, v);
        }
    }
}

fn write_map_pair(a: &mut Fnv1a64, b: &mut Fnv1a64, map: &Map) {
    write_u64_pair(a, b, map.len() as u64);
    for (k, v) in map {
        write_str_pair(a, b, k);
        write_value_pair(a, b, v);
    }
}

fn write_value_pair(a: &mut Fnv1a64, b: &mut Fnv1a64, v: &Value) {
    match v {
        Value::Null => write_u8_pair(a, b, 0),
        Value::Bool(x) => {
            write_u8_pair(a, b, 1);
            write_u8_pair(a, b, u8::from(*x));
        }
        Value::Number(n) => {
            write_u8_pair(a, b, 2);
            write_u64_pair(a, b, n.to_bits());
        }
        Value::String(s) => {
            write_u8_pair(a, b, 3);
            write_str_pair(a, b, s);
        }
        Value::Symbol(s) => {
            write_u8_pair(a, b, 4);
            write_str_pair(a, b, s.description());
        }
        Value::Function(f) => {
            write_u8_pair(a, b, 5);
            write_u64_pair(a, b, f.addr() as u64);
        }
        Value::Array(items) => {
            write_u8_pair(a, b, 6);
            write_u64_pair(a, b, items.len() as u64);
            for item in items.iter() {
                write_value_pair(a, b, item);
            }
        }
        Value::Object(map) => {
            write_u8_pair(a, b, 7);
            write_map_pair(a, b, map);
        }
        Value::Tagged(t) => {
            write_u8_pair(a, b, 8);
            write_str_pair(a, b, t.tag.name());
            write_map_pair(a, b, &t.fields);
        }
        Value::Element(node) => {
            write_u8_pair(a, b, 9);
            write_str_pair(a, b, node.component().name());
            write_str_pair(a, b, node.key().unwrap_or_default());
            write_map_pair(a, b, node.props());
        }
        Value::Component(c) => {
            write_u8_pair(a, b, 10);
            write_str_pair(a, b, c.name());
        }
    }
}

fn write_u8_pair(a: &mut Fnv1a64, b: &mut Fnv1a64, v: u8) {
    a.write_u8(v);
    b.write_u8(v);
}

fn write_u64_pair(a: &mut Fnv1a64, b: &mut Fnv1a64, v: u64) {
    a.write_u64(v);
    b.write_u64(v);
}

fn write_str_pair(a: &mut Fnv1a64, b: &mut Fnv1a64, s: &str) {
    write_u64_pair(a, b, s.len() as u64);
    a.write_bytes(s.as_bytes());
    b.write_bytes(s.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(label: &str) -> Output {
        Output::Element {
            component: "div".to_string(),
            key: None,
            props: Map::from([("className".to_string(), Value::from("form"))]),
            children: vec![
                Output::Primitive(Value::from(label)),
                Output::Element {
                    component: "button".to_string(),
                    key: Some("submit".to_string()),
                    props: Map::new(),
                    children: vec![Output::Primitive(Value::from("Log In"))],
                },
            ],
        }
    }

    #[test]
    fn fingerprint_is_deterministic_for_same_tree() {
        assert_eq!(fingerprint_output(&tree("Login")), fingerprint_output(&tree("Login")));
    }

    #[test]
    fn fingerprint_changes_when_tree_changes() {
        assert_ne!(fingerprint_output(&tree("Login")), fingerprint_output(&tree("Logout")));
    }

    #[test]
    fn find_and_text_walk_in_render_order() {
        let t = tree("Login");
        assert_eq!(t.find("button").and_then(Output::component), Some("button"));
        assert_eq!(t.text(), "LoginLog In");
    }

    #[test]
    fn serializes_without_empty_key() {
        let s = serde_json::to_string(&tree("Login")).unwrap();
        assert!(s.starts_with(r#"{"component":"div","props":{"className":"form"}"#));
        assert!(s.contains(r#""key":"submit""#));
    }
}
