//! JSON documents: component definitions plus the element tree to mount.
//!
//! ```json
//! {
//!   "config": {"strictValidation": false},
//!   "components": {
//!     "Greeting": {
//!       "propTypes": {"name": {"type": "string", "required": true}},
//!       "render": [{"type": "h1", "children": ["Hello, ", {"$prop": "name"}]}]
//!     }
//!   },
//!   "root": {"type": "Greeting", "props": {"name": "Ada"}}
//! }
//! ```
//!
//! Capitalized element types must be declared under `components`; lowercase ones are host
//! components that render whatever children they are given. Inside a component's `render` and
//! `fallback`, `{"$prop": name}` stands for a resolved prop (as a prop value or a text child) and
//! an element of type `$children` splices in the children passed by the parent. A fallback
//! additionally sees an `error` prop holding the caught message.

use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

use crate::component::{Child, Component, Node, RenderCtx};
use crate::foundation::error::{ArborError, ArborResult, RenderError};
use crate::runtime::RuntimeConfig;
use crate::schema::{DescriptorDef, SchemaError, SchemaErrors, SchemaPathElem, TagTable, lower_at};
use crate::value::{Map, Value};

const CHILDREN_SLOT: &str = "$children";
const PROP_REF: &str = "$prop";

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Document {
    #[serde(default)]
    pub config: RuntimeConfig,
    #[serde(default)]
    pub components: BTreeMap<String, ComponentDef>,
    pub root: ElementDef,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct ComponentDef {
    pub prop_types: BTreeMap<String, DescriptorDef>,
    pub default_props: serde_json::Map<String, serde_json::Value>,
    pub initial_state: serde_json::Map<String, serde_json::Value>,
    pub memo: bool,
    /// Render fails with this message instead of producing children.
    pub throws: Option<String>,
    /// Makes the component an error boundary.
    pub fallback: Option<ElementDef>,
    /// Children to produce. Absent means "render the children passed in".
    pub render: Option<Vec<ChildDef>>,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ElementDef {
    #[serde(rename = "type")]
    pub component: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub props: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub children: Vec<ChildDef>,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(untagged)]
pub enum ChildDef {
    Element(ElementDef),
    Value(serde_json::Value),
}

impl Document {
    pub fn from_json(s: &str) -> ArborResult<Self> {
        serde_json::from_str(s).map_err(|e| ArborError::serde(e.to_string()))
    }

    /// Check references, keys and prop type definitions without building anything.
    pub fn validate(&self) -> Result<(), SchemaErrors> {
        let mut errors = Vec::new();
        let mut tags = TagTable::new();

        for (name, def) in &self.components {
            let mut path = vec![
                SchemaPathElem::Field("components"),
                SchemaPathElem::Key(name.clone()),
            ];
            if !is_declared_name(name) {
                errors.push(SchemaError::at(
                    &path,
                    "component names must start with an uppercase letter",
                ));
            }
            for (prop, d) in &def.prop_types {
                path.push(SchemaPathElem::Field("propTypes"));
                path.push(SchemaPathElem::Key(prop.clone()));
                lower_at(d, &mut tags, &mut path, &mut errors);
                path.pop();
                path.pop();
            }
            if let Some(body) = &def.render {
                path.push(SchemaPathElem::Field("render"));
                self.check_children(body, Scope::Template, &mut path, &mut errors);
                path.pop();
            }
            if let Some(fallback) = &def.fallback {
                path.push(SchemaPathElem::Field("fallback"));
                self.check_element(fallback, Scope::Template, &mut path, &mut errors);
                path.pop();
            }
        }

        let mut path = vec![SchemaPathElem::Field("root")];
        self.check_element(&self.root, Scope::Root, &mut path, &mut errors);

        if let Some(cycle) = self.find_cycle() {
            errors.push(SchemaError::at(
                &[SchemaPathElem::Field("components")],
                format!("components render each other in a cycle: {}", cycle.join(" -> ")),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SchemaErrors { errors })
        }
    }

    fn check_element(
        &self,
        el: &ElementDef,
        scope: Scope,
        path: &mut Vec<SchemaPathElem>,
        errors: &mut Vec<SchemaError>,
    ) {
        if el.component == CHILDREN_SLOT {
            if scope == Scope::Root {
                errors.push(SchemaError::at(
                    path,
                    "$children is only allowed inside component templates",
                ));
            }
        } else if el.component.is_empty() {
            errors.push(SchemaError::at(
                &[path.as_slice(), &[SchemaPathElem::Field("type")]].concat(),
                "element type must be non-empty",
            ));
        } else if is_declared_name(&el.component) && !self.components.contains_key(&el.component) {
            errors.push(SchemaError::at(
                &[path.as_slice(), &[SchemaPathElem::Field("type")]].concat(),
                format!("unknown component \"{}\"", el.component),
            ));
        }

        if scope == Scope::Root {
            for (name, v) in &el.props {
                if prop_ref(v).is_some() {
                    errors.push(SchemaError::at(
                        &[
                            path.as_slice(),
                            &[SchemaPathElem::Field("props"), SchemaPathElem::Key(name.clone())],
                        ]
                        .concat(),
                        "$prop references are only allowed inside component templates",
                    ));
                }
            }
        }

        path.push(SchemaPathElem::Field("children"));
        self.check_children(&el.children, scope, path, errors);
        path.pop();
    }

    fn check_children(
        &self,
        children: &[ChildDef],
        scope: Scope,
        path: &mut Vec<SchemaPathElem>,
        errors: &mut Vec<SchemaError>,
    ) {
        let mut keys = HashSet::new();
        for (i, child) in children.iter().enumerate() {
            path.push(SchemaPathElem::Index(i));
            match child {
                ChildDef::Element(el) => {
                    if let Some(key) = &el.key {
                        if !keys.insert(key.as_str()) {
                            errors.push(SchemaError::at(
                                &[path.as_slice(), &[SchemaPathElem::Field("key")]].concat(),
                                format!("duplicate sibling key \"{key}\""),
                            ));
                        }
                    }
                    self.check_element(el, scope, path, errors);
                }
                ChildDef::Value(v) => match (v, prop_ref(v)) {
                    (_, Some(_)) if scope == Scope::Root => errors.push(SchemaError::at(
                        path,
                        "$prop references are only allowed inside component templates",
                    )),
                    (_, Some(_)) => {}
                    (serde_json::Value::Object(_), None) => errors.push(SchemaError::at(
                        path,
                        "object children must be elements (with \"type\") or {\"$prop\": name}",
                    )),
                    _ => {}
                },
            }
            path.pop();
        }
    }

    /// First cycle in the "renders" relation between declared components, if any.
    fn find_cycle(&self) -> Option<Vec<String>> {
        let mut done = HashSet::new();
        for name in self.components.keys() {
            let mut stack = Vec::new();
            if let Some(cycle) = self.visit(name, &mut stack, &mut done) {
                return Some(cycle);
            }
        }
        None
    }

    fn visit<'a>(
        &'a self,
        name: &'a str,
        stack: &mut Vec<&'a str>,
        done: &mut HashSet<&'a str>,
    ) -> Option<Vec<String>> {
        if let Some(pos) = stack.iter().position(|n| *n == name) {
            let mut cycle: Vec<String> = stack[pos..].iter().map(|s| s.to_string()).collect();
            cycle.push(name.to_string());
            return Some(cycle);
        }
        if done.contains(name) {
            return None;
        }
        let def = self.components.get(name)?;
        stack.push(name);
        for dep in def.dependencies() {
            if let Some(cycle) = self.visit(dep, stack, done) {
                return Some(cycle);
            }
        }
        stack.pop();
        done.insert(name);
        None
    }

    /// Validate, then build components in dependency order and return the root node.
    #[tracing::instrument(skip_all, fields(components = self.components.len()))]
    pub fn build(&self) -> ArborResult<Node> {
        self.validate()?;

        let mut builder = Builder {
            doc: self,
            tags: TagTable::new(),
            built: BTreeMap::new(),
        };
        for name in self.components.keys() {
            builder.component(name)?;
        }
        let root = builder.template(&self.root)?;
        let Template::Element(root) = root else {
            return Err(ArborError::schema("root must be an element"));
        };
        tracing::debug!(components = builder.built.len(), "document built");
        Ok(root.instantiate(&Map::new(), &[]))
    }
}

impl ComponentDef {
    fn dependencies(&self) -> Vec<&str> {
        let mut out = Vec::new();
        if let Some(body) = &self.render {
            collect_refs(body, &mut out);
        }
        if let Some(fallback) = &self.fallback {
            collect_element_refs(fallback, &mut out);
        }
        out
    }
}

fn collect_refs<'a>(children: &'a [ChildDef], out: &mut Vec<&'a str>) {
    for child in children {
        if let ChildDef::Element(el) = child {
            collect_element_refs(el, out);
        }
    }
}

fn collect_element_refs<'a>(el: &'a ElementDef, out: &mut Vec<&'a str>) {
    if is_declared_name(&el.component) {
        out.push(&el.component);
    }
    collect_refs(&el.children, out);
}

fn is_declared_name(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

fn prop_ref(v: &serde_json::Value) -> Option<&str> {
    let map = v.as_object()?;
    if map.len() != 1 {
        return None;
    }
    map.get(PROP_REF)?.as_str()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Scope {
    Root,
    Template,
}

/// A prop value or text child: either fixed, or read from the rendering component's props.
#[derive(Debug, Clone)]
enum Slot {
    Literal(Value),
    Prop(String),
}

impl Slot {
    /// `None` when the referenced prop is absent.
    fn resolve(&self, props: &Map) -> Option<Value> {
        match self {
            Self::Literal(v) => Some(v.clone()),
            Self::Prop(name) => props.get(name).cloned(),
        }
    }
}

#[derive(Debug, Clone)]
struct ElementTemplate {
    component: Rc<Component>,
    key: Option<String>,
    props: Vec<(String, Slot)>,
    children: Vec<Template>,
}

impl ElementTemplate {
    fn instantiate(&self, props: &Map, passed: &[Child]) -> Node {
        let mut node = Node::new(&self.component);
        if let Some(key) = &self.key {
            node = node.with_key(key.clone());
        }
        for (name, slot) in &self.props {
            if let Some(value) = slot.resolve(props) {
                node = node.with_prop(name.clone(), value);
            }
        }
        if self.children.is_empty() {
            return node;
        }
        node.with_children(instantiate_all(&self.children, props, passed))
    }
}

#[derive(Debug, Clone)]
enum Template {
    Element(ElementTemplate),
    Children,
    Value(Slot),
}

fn instantiate_all(templates: &[Template], props: &Map, passed: &[Child]) -> Vec<Child> {
    let mut out = Vec::with_capacity(templates.len());
    for t in templates {
        match t {
            Template::Element(el) => out.push(Child::Node(el.instantiate(props, passed))),
            Template::Children => out.extend(passed.iter().cloned()),
            Template::Value(slot) => {
                out.push(Child::Primitive(slot.resolve(props).unwrap_or(Value::Null)));
            }
        }
    }
    out
}

struct Builder<'d> {
    doc: &'d Document,
    tags: TagTable,
    built: BTreeMap<String, Rc<Component>>,
}

impl Builder<'_> {
    fn component(&mut self, name: &str) -> ArborResult<Rc<Component>> {
        if let Some(c) = self.built.get(name) {
            return Ok(Rc::clone(c));
        }
        let Some(def) = self.doc.components.get(name) else {
            // Lowercase host component.
            let c = Component::host(name).build();
            self.built.insert(name.to_string(), Rc::clone(&c));
            return Ok(c);
        };

        let body = match &def.render {
            Some(body) => Some(self.templates(body)?),
            None => None,
        };
        let throws = def.throws.clone();
        let mut c = Component::new(name, move |ctx: &RenderCtx<'_>| {
            if let Some(msg) = &throws {
                return Err(RenderError::thrown(msg.clone()));
            }
            Ok(match &body {
                Some(body) => instantiate_all(body, ctx.props(), ctx.children()),
                None => ctx.children().to_vec(),
            })
        });

        for (prop, d) in &def.prop_types {
            c = c.prop(prop.clone(), d.lower(&mut self.tags)?);
        }
        for (prop, v) in &def.default_props {
            c = c.default_prop(prop.clone(), self.tags.json_to_value(v));
        }
        if !def.initial_state.is_empty() {
            let initial: Map = def
                .initial_state
                .iter()
                .map(|(k, v)| (k.clone(), self.tags.json_to_value(v)))
                .collect();
            c = c.initial_state(move |_| initial.clone());
        }
        if def.memo {
            c = c.memo();
        }
        if let Some(fallback) = &def.fallback {
            let Template::Element(fallback) = self.template(fallback)? else {
                return Err(ArborError::schema(format!(
                    "fallback of \"{name}\" must be an element"
                )));
            };
            c = c.boundary(move |caught| {
                let error = Value::from(caught.error.to_string());
                let props = Map::from([("error".to_string(), error.clone())]);
                vec![Child::Node(
                    fallback.instantiate(&props, &[]).with_prop("error", error),
                )]
            });
        }

        let c = c.build();
        self.built.insert(name.to_string(), Rc::clone(&c));
        Ok(c)
    }

    fn templates(&mut self, children: &[ChildDef]) -> ArborResult<Vec<Template>> {
        children
            .iter()
            .map(|child| match child {
                ChildDef::Element(el) => self.template(el),
                ChildDef::Value(v) => Ok(Template::Value(self.slot(v))),
            })
            .collect()
    }

    fn template(&mut self, el: &ElementDef) -> ArborResult<Template> {
        if el.component == CHILDREN_SLOT {
            return Ok(Template::Children);
        }
        let component = self.component(&el.component)?;
        let props = el
            .props
            .iter()
            .map(|(k, v)| (k.clone(), self.slot(v)))
            .collect();
        let children = self.templates(&el.children)?;
        Ok(Template::Element(ElementTemplate {
            component,
            key: el.key.clone(),
            props,
            children,
        }))
    }

    fn slot(&mut self, v: &serde_json::Value) -> Slot {
        match prop_ref(v) {
            Some(name) => Slot::Prop(name.to_string()),
            None => Slot::Literal(self.tags.json_to_value(v)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(json: serde_json::Value) -> Document {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn reports_unknown_components_and_duplicate_keys() {
        let d = doc(serde_json::json!({
            "root": {
                "type": "ul",
                "children": [
                    {"type": "Item", "key": "a"},
                    {"type": "li", "key": "a"}
                ]
            }
        }));
        let err = d.validate().unwrap_err();
        let lines: Vec<String> = err.errors.iter().map(ToString::to_string).collect();
        assert_eq!(
            lines,
            vec![
                "$.root.children[0].type: unknown component \"Item\"",
                "$.root.children[1].key: duplicate sibling key \"a\"",
            ]
        );
    }

    #[test]
    fn rejects_render_cycles() {
        let d = doc(serde_json::json!({
            "components": {
                "A": {"render": [{"type": "B"}]},
                "B": {"render": [{"type": "div", "children": [{"type": "A"}]}]}
            },
            "root": {"type": "A"}
        }));
        let err = d.validate().unwrap_err();
        assert!(err.to_string().contains("A -> B -> A"));
    }

    #[test]
    fn prop_refs_are_template_only() {
        let d = doc(serde_json::json!({
            "root": {"type": "p", "props": {"title": {"$prop": "x"}}, "children": [{"$prop": "y"}]}
        }));
        assert_eq!(d.validate().unwrap_err().errors.len(), 2);
    }

    #[test]
    fn builds_template_with_prop_refs_and_children_slot() {
        let d = doc(serde_json::json!({
            "components": {
                "Card": {
                    "propTypes": {"title": {"type": "string"}},
                    "defaultProps": {"title": "Untitled"},
                    "render": [
                        {"type": "h2", "children": [{"$prop": "title"}]},
                        {"type": "$children"}
                    ]
                }
            },
            "root": {"type": "Card", "children": ["body"]}
        }));
        let root = d.build().unwrap();
        assert_eq!(root.component().name(), "Card");
        assert_eq!(root.children().len(), 1);
        assert!(root.props().is_empty());
    }

    #[test]
    fn absent_prop_refs_leave_child_defaults_in_place() {
        let d = doc(serde_json::json!({
            "components": {
                "Badge": {"defaultProps": {"label": "new"}, "render": [{"$prop": "label"}]},
                "Card": {"render": [{"type": "Badge", "props": {"label": {"$prop": "badge"}}}]}
            },
            "root": {
                "type": "div",
                "children": [{"type": "Card"}, {"type": "Card", "props": {"badge": "hot"}}]
            }
        }));
        let mut rt = crate::runtime::Runtime::default();
        let h = rt.mount(d.build().unwrap()).unwrap();
        assert_eq!(rt.output(h).unwrap().text(), "newhot");
    }

    #[test]
    fn config_is_optional() {
        let d = doc(serde_json::json!({"root": {"type": "div"}}));
        assert_eq!(d.config, RuntimeConfig::default());
        assert!(d.build().is_ok());
    }
}
