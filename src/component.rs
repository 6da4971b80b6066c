use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::boundary::CaughtError;
use crate::descriptor::Descriptor;
use crate::foundation::error::RenderError;
use crate::instance::{CancelToken, InstancePath};
use crate::scheduler::Updater;
use crate::validate::{ValidationResult, validate_props};
use crate::value::{Map, Value};

pub type RenderResult = Result<Vec<Child>, RenderError>;

type RenderFn = dyn Fn(&RenderCtx<'_>) -> RenderResult;
type InitialStateFn = dyn Fn(&Map) -> Map;
type FallbackFn = dyn Fn(&CaughtError) -> Vec<Child>;

/// A component family: everything that is shared by all nodes built from it.
///
/// Validation is composed in as data (`prop`), never inherited: a stricter input is the same
/// render function with a refined descriptor.
pub struct Component {
    name: String,
    prop_types: BTreeMap<String, Descriptor>,
    default_props: Map,
    memo: bool,
    fallback: Option<Rc<FallbackFn>>,
    initial_state: Option<Rc<InitialStateFn>>,
    render: Rc<RenderFn>,
}

impl Component {
    pub fn new(
        name: impl Into<String>,
        render: impl Fn(&RenderCtx<'_>) -> RenderResult + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            prop_types: BTreeMap::new(),
            default_props: Map::new(),
            memo: false,
            fallback: None,
            initial_state: None,
            render: Rc::new(render),
        }
    }

    /// A component that renders the children its parent passed in, like `div` or `input`.
    pub fn host(name: impl Into<String>) -> Self {
        Self::new(name, |ctx| Ok(ctx.children().to_vec()))
    }

    pub fn prop(mut self, name: impl Into<String>, descriptor: Descriptor) -> Self {
        self.prop_types.insert(name.into(), descriptor);
        self
    }

    pub fn default_prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.default_props.insert(name.into(), value.into());
        self
    }

    /// Opt in to the shallow-equality memoization gate.
    pub fn memo(mut self) -> Self {
        self.memo = true;
        self
    }

    /// Mark this component as an error boundary rendering `fallback` once a descendant fails.
    pub fn boundary(mut self, fallback: impl Fn(&CaughtError) -> Vec<Child> + 'static) -> Self {
        self.fallback = Some(Rc::new(fallback));
        self
    }

    /// State for a freshly mounted instance, computed from its resolved props.
    pub fn initial_state(mut self, f: impl Fn(&Map) -> Map + 'static) -> Self {
        self.initial_state = Some(Rc::new(f));
        self
    }

    pub fn build(self) -> Rc<Self> {
        Rc::new(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prop_types(&self) -> &BTreeMap<String, Descriptor> {
        &self.prop_types
    }

    pub fn default_props(&self) -> &Map {
        &self.default_props
    }

    pub fn is_memo(&self) -> bool {
        self.memo
    }

    pub fn is_boundary(&self) -> bool {
        self.fallback.is_some()
    }

    pub(crate) fn render(&self, ctx: &RenderCtx<'_>) -> RenderResult {
        (self.render)(ctx)
    }

    pub(crate) fn fallback(&self, caught: &CaughtError) -> Option<Vec<Child>> {
        self.fallback.as_ref().map(|f| f(caught))
    }

    pub(crate) fn initial_state_for(&self, props: &Map) -> Map {
        match &self.initial_state {
            Some(f) => f(props),
            None => Map::new(),
        }
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("prop_types", &self.prop_types)
            .field("default_props", &self.default_props)
            .field("memo", &self.memo)
            .field("boundary", &self.is_boundary())
            .finish_non_exhaustive()
    }
}

/// Immutable description of what to render. Parents build fresh nodes on every pass.
#[derive(Clone)]
pub struct Node {
    component: Rc<Component>,
    key: Option<String>,
    props: Map,
    children: Rc<[Child]>,
}

impl Node {
    pub fn new(component: &Rc<Component>) -> Self {
        Self {
            component: Rc::clone(component),
            key: None,
            props: Map::new(),
            children: Rc::from(Vec::new()),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }

    pub fn with_props(mut self, props: Map) -> Self {
        self.props.extend(props);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = Child>) -> Self {
        self.children = children.into_iter().collect();
        self
    }

    pub fn component(&self) -> &Rc<Component> {
        &self.component
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Prop values exactly as supplied by the parent.
    pub fn props(&self) -> &Map {
        &self.props
    }

    pub fn children(&self) -> &[Child] {
        &self.children
    }

    pub(crate) fn children_rc(&self) -> &Rc<[Child]> {
        &self.children
    }

    /// Supplied props with defaults substituted for strictly absent keys. Partially supplied
    /// object props are used as-is.
    pub fn resolved_props(&self) -> Map {
        let mut props = self.props.clone();
        for (k, v) in self.component.default_props() {
            if !props.contains_key(k) {
                props.insert(k.clone(), v.clone());
            }
        }
        props
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("component", &self.component.name())
            .field("key", &self.key)
            .field("props", &self.props)
            .field("children", &self.children)
            .finish()
    }
}

/// One entry of a render result.
#[derive(Clone, Debug)]
pub enum Child {
    Node(Node),
    Primitive(Value),
}

impl From<Node> for Child {
    fn from(v: Node) -> Self {
        Self::Node(v)
    }
}

impl From<Value> for Child {
    fn from(v: Value) -> Self {
        Self::Primitive(v)
    }
}

impl From<&str> for Child {
    fn from(v: &str) -> Self {
        Self::Primitive(Value::from(v))
    }
}

impl From<String> for Child {
    fn from(v: String) -> Self {
        Self::Primitive(Value::from(v))
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedProps {
    pub props: Map,
    pub validation: ValidationResult,
}

/// Apply defaults, then validate against the component's declared prop types.
pub fn resolve_props(node: &Node) -> ResolvedProps {
    let props = node.resolved_props();
    let validation = validate_props(node.component().prop_types(), &props);
    ResolvedProps { props, validation }
}

/// What a render function gets to look at.
pub struct RenderCtx<'a> {
    pub(crate) path: &'a InstancePath,
    pub(crate) props: &'a Map,
    pub(crate) state: &'a Map,
    pub(crate) children: &'a [Child],
    pub(crate) updater: &'a Updater,
}

impl<'a> RenderCtx<'a> {
    pub fn path(&self) -> &'a InstancePath {
        self.path
    }

    pub fn props(&self) -> &'a Map {
        self.props
    }

    pub fn prop(&self, name: &str) -> Option<&'a Value> {
        self.props.get(name)
    }

    pub fn state(&self) -> &'a Map {
        self.state
    }

    pub fn state_value(&self, key: &str) -> Option<&'a Value> {
        self.state.get(key)
    }

    pub fn children(&self) -> &'a [Child] {
        self.children
    }

    /// Handle for requesting state updates on this instance, usable after render returns.
    pub fn updater(&self) -> Updater {
        self.updater.clone()
    }

    /// Cancellation token of this instance's mount scope.
    pub fn scope(&self) -> CancelToken {
        self.updater.scope().clone()
    }
}
