use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use crate::boundary::ErrorStatus;
use crate::component::{Child, Component, Node};
use crate::foundation::error::ArborError;
use crate::output::Output;
use crate::scheduler::Updater;
use crate::value::Map;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SegmentKey {
    Index(usize),
    Key(String),
}

/// One step of an instance path: the component type plus its explicit key or position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathSegment {
    pub component: String,
    pub key: SegmentKey,
}

/// Component name of the path segment a boundary mounts a fallback under.
pub const FALLBACK_SEGMENT: &str = "@fallback";

impl PathSegment {
    pub(crate) fn for_node(node: &Node, position: usize) -> Self {
        let key = match node.key() {
            Some(k) => SegmentKey::Key(k.to_string()),
            None => SegmentKey::Index(position),
        };
        Self {
            component: node.component().name().to_string(),
            key,
        }
    }

    /// Where a boundary mounts the fallback standing in for this child.
    pub(crate) fn fallback(&self) -> Self {
        Self {
            component: FALLBACK_SEGMENT.to_string(),
            key: self.key.clone(),
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            SegmentKey::Index(i) => write!(f, "{}#{i}", self.component),
            SegmentKey::Key(k) => write!(f, "{}:{k}", self.component),
        }
    }
}

/// Identity of a mounted instance: the segments from the root down to it.
///
/// Ordering is lexicographic over segments, so all descendants of a path sort directly after it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstancePath(Vec<PathSegment>);

impl InstancePath {
    pub(crate) fn root(node: &Node) -> Self {
        Self(vec![PathSegment::for_node(node, 0)])
    }

    pub(crate) fn child(&self, segment: PathSegment) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment);
        Self(segments)
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn last(&self) -> Option<&PathSegment> {
        self.0.last()
    }

    /// The ancestor (or self) with `depth` segments.
    pub(crate) fn truncated(&self, depth: usize) -> Self {
        Self(self.0[..depth.min(self.0.len())].to_vec())
    }

    pub fn parent(&self) -> Option<Self> {
        match self.0.split_last() {
            Some((_, rest)) if !rest.is_empty() => Some(Self(rest.to_vec())),
            _ => None,
        }
    }

    /// True for `self` itself and every descendant of it.
    pub fn starts_with(&self, prefix: &InstancePath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    pub fn is_descendant_of(&self, ancestor: &InstancePath) -> bool {
        self.0.len() > ancestor.0.len() && self.starts_with(ancestor)
    }
}

impl fmt::Display for InstancePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, s) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{s}")?;
        }
        Ok(())
    }
}

/// Parses the `Display` form, e.g. `App#0/List#1/Item:row-3`.
impl FromStr for InstancePath {
    type Err = ArborError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut segments = Vec::new();
        for part in s.split('/') {
            // Keys may contain `#` and `:`; component names contain neither.
            let indexed = part
                .split_once('#')
                .and_then(|(name, idx)| idx.parse::<usize>().ok().map(|i| (name, i)));
            let segment = if let Some((name, key)) = part.split_once(':') {
                PathSegment {
                    component: name.to_string(),
                    key: SegmentKey::Key(key.to_string()),
                }
            } else if let Some((name, i)) = indexed {
                PathSegment {
                    component: name.to_string(),
                    key: SegmentKey::Index(i),
                }
            } else {
                return Err(ArborError::validation(format!(
                    "invalid instance path segment '{part}' in '{s}'"
                )));
            };
            if segment.component.is_empty() {
                return Err(ArborError::validation(format!(
                    "instance path segment '{part}' has no component name"
                )));
            }
            segments.push(segment);
        }
        Ok(Self(segments))
    }
}

/// Liveness flag shared by everything scoped to one mounted instance.
///
/// Invalidated when the instance is destroyed; updates carrying a cancelled token are dropped.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Rc<Cell<bool>>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }

    pub(crate) fn cancel(&self) {
        self.0.set(true);
    }
}

pub(crate) struct Instance {
    pub(crate) component: Rc<Component>,
    pub(crate) state: Map,
    pub(crate) last_props: Option<Map>,
    pub(crate) last_children_in: Rc<[Child]>,
    pub(crate) last_rendered: Vec<Child>,
    pub(crate) last_output: Vec<Output>,
    pub(crate) status: ErrorStatus,
    pub(crate) updater: Updater,
    pub(crate) render_count: u64,
}

impl Instance {
    pub(crate) fn mount(component: Rc<Component>, state: Map, updater: Updater) -> Self {
        Self {
            component,
            state,
            last_props: None,
            last_children_in: Rc::from(Vec::new()),
            last_rendered: Vec::new(),
            last_output: Vec::new(),
            status: ErrorStatus::Healthy,
            updater,
            render_count: 0,
        }
    }

    pub(crate) fn has_rendered(&self) -> bool {
        self.last_props.is_some()
    }

    /// Memoization gate: same props by shallow equality and the very same passed-in children.
    pub(crate) fn inputs_unchanged(&self, props: &Map, children: &Rc<[Child]>) -> bool {
        let Some(last) = &self.last_props else {
            return false;
        };
        shallow_equal(last, props) && same_children(&self.last_children_in, children)
    }

    pub(crate) fn destroy(&self) {
        self.updater.scope().cancel();
    }
}

/// Same key set and every value [`same`](crate::Value::same) as its counterpart.
pub fn shallow_equal(a: &Map, b: &Map) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b.iter())
            .all(|((ka, va), (kb, vb))| ka == kb && va.same(vb))
}

fn same_children(a: &Rc<[Child]>, b: &Rc<[Child]>) -> bool {
    Rc::ptr_eq(a, b) || (a.is_empty() && b.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn path_display_roundtrips_through_parse() {
        let p: InstancePath = "App#0/List#1/Item:row-3".parse().unwrap();
        assert_eq!(p.depth(), 3);
        assert_eq!(p.segments()[2].key, SegmentKey::Key("row-3".to_string()));
        assert_eq!(p.to_string(), "App#0/List#1/Item:row-3");
    }

    #[test]
    fn keys_with_separators_roundtrip() {
        for key in ["row#3", "a:b", "x#y:z"] {
            let p = InstancePath::default().child(PathSegment {
                component: "Item".to_string(),
                key: SegmentKey::Key(key.to_string()),
            });
            let back: InstancePath = p.to_string().parse().unwrap();
            assert_eq!(back, p);
        }
    }

    #[test]
    fn parse_rejects_bare_names() {
        assert!("App".parse::<InstancePath>().is_err());
        assert!("#0".parse::<InstancePath>().is_err());
    }

    #[test]
    fn descendants_sort_after_ancestor() {
        let a: InstancePath = "App#0/Form#0".parse().unwrap();
        let b: InstancePath = "App#0/Form#0/Input#1".parse().unwrap();
        let c: InstancePath = "App#0/Form#1".parse().unwrap();
        assert!(a < b && b < c);
        assert!(b.is_descendant_of(&a));
        assert!(!c.is_descendant_of(&a));
        assert!(a.starts_with(&a));
        assert_eq!(b.parent(), Some(a));
    }

    #[test]
    fn shallow_equal_compares_by_reference() {
        let user = Value::object([("fullName", Value::from("Ada"))]);
        let a = Map::from([
            ("user".to_string(), user.clone()),
            ("n".to_string(), Value::from(1)),
        ]);
        let b = Map::from([
            ("user".to_string(), user),
            ("n".to_string(), Value::from(1)),
        ]);
        assert!(shallow_equal(&a, &b));

        let c = Map::from([
            (
                "user".to_string(),
                Value::object([("fullName", Value::from("Ada"))]),
            ),
            ("n".to_string(), Value::from(1)),
        ]);
        assert!(!shallow_equal(&a, &c));
        assert!(!shallow_equal(&a, &Map::new()));
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let t = CancelToken::new();
        let held = t.clone();
        assert!(!held.is_cancelled());
        t.cancel();
        assert!(held.is_cancelled());
    }
}
