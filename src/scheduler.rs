use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::boundary::{CaughtError, ErrorStatus, ResetToken, UncaughtError};
use crate::component::{Child, Component, Node, RenderCtx};
use crate::foundation::error::RenderError;
use crate::instance::{CancelToken, Instance, InstancePath, PathSegment, SegmentKey};
use crate::output::Output;
use crate::validate::{Diagnostic, validate_props};
use crate::value::Map;

/// A requested change to an instance's state.
pub enum StateUpdate {
    /// Shallow-merge these keys into the current state.
    Merge(Map),
    /// Compute the keys to merge from the state as settled so far in this batch.
    Apply(Box<dyn FnOnce(&Map) -> Map>),
}

impl StateUpdate {
    fn apply_to(self, state: &mut Map) {
        let delta = match self {
            Self::Merge(delta) => delta,
            Self::Apply(f) => f(state),
        };
        state.extend(delta);
    }
}

impl fmt::Debug for StateUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Merge(delta) => f.debug_tuple("Merge").field(delta).finish(),
            Self::Apply(_) => f.write_str("Apply(..)"),
        }
    }
}

#[derive(Debug)]
pub(crate) enum Request {
    SetState {
        path: InstancePath,
        scope: CancelToken,
        update: StateUpdate,
    },
    Reset {
        boundary: InstancePath,
        token: ResetToken,
    },
}

#[derive(Debug, Default)]
pub(crate) struct UpdateQueue {
    requests: Vec<Request>,
}

/// Weak handle to a root's update queue. Pushing after the root is gone is a no-op.
#[derive(Clone, Debug)]
pub(crate) struct QueueHandle(Weak<RefCell<UpdateQueue>>);

impl QueueHandle {
    pub(crate) fn push(&self, request: Request) -> bool {
        match self.0.upgrade() {
            Some(queue) => {
                queue.borrow_mut().requests.push(request);
                true
            }
            None => false,
        }
    }

    fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

/// Requests state updates for one mounted instance.
///
/// Updaters outlive render calls and are how asynchronous work reports back. Requests are queued
/// and applied at the start of the next pass; once the instance is unmounted they are dropped.
#[derive(Clone, Debug)]
pub struct Updater {
    queue: QueueHandle,
    path: InstancePath,
    scope: CancelToken,
}

impl Updater {
    pub fn path(&self) -> &InstancePath {
        &self.path
    }

    pub fn scope(&self) -> &CancelToken {
        &self.scope
    }

    pub fn is_live(&self) -> bool {
        !self.scope.is_cancelled() && self.queue.is_alive()
    }

    /// Queue a shallow merge of `delta` into the instance state. Returns false if dropped.
    pub fn set(&self, delta: Map) -> bool {
        self.request(StateUpdate::Merge(delta))
    }

    /// Queue a state update computed from the state it will be applied to.
    pub fn set_with(&self, f: impl FnOnce(&Map) -> Map + 'static) -> bool {
        self.request(StateUpdate::Apply(Box::new(f)))
    }

    pub fn request(&self, update: StateUpdate) -> bool {
        if self.scope.is_cancelled() {
            tracing::debug!(path = %self.path, "state update after unmount dropped");
            return false;
        }
        self.queue.push(Request::SetState {
            path: self.path.clone(),
            scope: self.scope.clone(),
            update,
        })
    }
}

type DiagnosticHook = Box<dyn FnMut(&InstancePath, &Diagnostic)>;
type UncaughtHook = Box<dyn FnMut(&UncaughtError)>;

#[derive(Default)]
pub(crate) struct Observers {
    pub(crate) diagnostics: Vec<DiagnosticHook>,
    pub(crate) uncaught: Vec<UncaughtHook>,
}

impl Observers {
    fn diagnostic(&mut self, path: &InstancePath, component: &str, d: &Diagnostic) {
        tracing::warn!(%path, component, "failed prop type: {d}");
        for hook in &mut self.diagnostics {
            hook(path, d);
        }
    }

    pub(crate) fn uncaught(&mut self, err: &UncaughtError) {
        tracing::error!(path = %err.path, error = %err.error, "uncaught render error");
        for hook in &mut self.uncaught {
            hook(err);
        }
    }
}

struct PassCtx<'o> {
    dirty: BTreeSet<InstancePath>,
    observers: &'o mut Observers,
    strict: bool,
    renders: usize,
}

impl PassCtx<'_> {
    fn subtree_dirty(&self, path: &InstancePath) -> bool {
        self.dirty
            .range(path.clone()..)
            .take_while(|p| p.starts_with(path))
            .any(|p| p != path)
    }
}

/// Owns the instances of one root and evaluates it pass by pass.
pub(crate) struct Scheduler {
    root: Node,
    instances: BTreeMap<InstancePath, Instance>,
    queue: Rc<RefCell<UpdateQueue>>,
    next_token: u64,
    strict: bool,
}

impl Scheduler {
    pub(crate) fn new(root: Node, strict: bool) -> Self {
        Self {
            root,
            instances: BTreeMap::new(),
            queue: Rc::new(RefCell::new(UpdateQueue::default())),
            next_token: 1,
            strict,
        }
    }

    pub(crate) fn set_root(&mut self, root: Node) {
        self.root = root;
    }

    pub(crate) fn root_path(&self) -> InstancePath {
        InstancePath::root(&self.root)
    }

    pub(crate) fn queue_handle(&self) -> QueueHandle {
        QueueHandle(Rc::downgrade(&self.queue))
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.queue.borrow().requests.is_empty()
    }

    pub(crate) fn clear_pending(&self) -> usize {
        let mut q = self.queue.borrow_mut();
        let n = q.requests.len();
        q.requests.clear();
        n
    }

    pub(crate) fn instance(&self, path: &InstancePath) -> Option<&Instance> {
        self.instances.get(path)
    }

    pub(crate) fn paths(&self) -> impl Iterator<Item = &InstancePath> {
        self.instances.keys()
    }

    /// Destroy every instance. Pending requests stay queued but can no longer apply.
    pub(crate) fn teardown(&mut self) {
        for (path, inst) in std::mem::take(&mut self.instances) {
            inst.destroy();
            tracing::debug!(%path, "unmount");
        }
    }

    /// Apply queued requests, then render the tree, skipping what the memo gate allows.
    #[tracing::instrument(skip_all, fields(root = self.root.component().name()))]
    pub(crate) fn run_pass(&mut self, observers: &mut Observers) -> Result<Output, UncaughtError> {
        let dirty = self.apply_pending();
        let mut ctx = PassCtx {
            dirty,
            observers,
            strict: self.strict,
            renders: 0,
        };

        let root = self.root.clone();
        let path = InstancePath::root(&root);
        self.retain_subtree(&path);

        let result = self.reconcile(&path, &root, false, &mut ctx);
        tracing::debug!(
            renders = ctx.renders,
            instances = self.instances.len(),
            "pass complete"
        );
        result.map_err(|failure| {
            self.teardown();
            UncaughtError {
                path: failure.path,
                error: failure.error,
            }
        })
    }

    fn apply_pending(&mut self) -> BTreeSet<InstancePath> {
        let requests = std::mem::take(&mut self.queue.borrow_mut().requests);
        let mut dirty = BTreeSet::new();
        for request in requests {
            match request {
                Request::SetState {
                    path,
                    scope,
                    update,
                } => {
                    if scope.is_cancelled() {
                        tracing::debug!(%path, "state update for unmounted instance dropped");
                        continue;
                    }
                    let Some(inst) = self.instances.get_mut(&path) else {
                        tracing::debug!(%path, "state update for unknown instance dropped");
                        continue;
                    };
                    update.apply_to(&mut inst.state);
                    dirty.insert(path);
                }
                Request::Reset { boundary, token } => {
                    let slot = self.instances.get_mut(&boundary).and_then(|inst| {
                        let slot = inst.status.caught_slot().cloned()?;
                        inst.status.reset(token).then_some(slot)
                    });
                    match slot {
                        Some(slot) => {
                            tracing::info!(%boundary, token = token.get(), "error boundary reset");
                            self.destroy_subtree(&boundary.child(slot.fallback()));
                            dirty.insert(boundary);
                        }
                        None => {
                            tracing::debug!(%boundary, token = token.get(), "stale boundary reset ignored");
                        }
                    }
                }
            }
        }
        dirty
    }

    fn reconcile(
        &mut self,
        path: &InstancePath,
        node: &Node,
        reused: bool,
        ctx: &mut PassCtx<'_>,
    ) -> Result<Output, Failure> {
        let component = Rc::clone(node.component());
        let props = node.resolved_props();

        let fresh = match self.instances.get(path) {
            Some(inst) if Rc::ptr_eq(&inst.component, &component) => false,
            Some(_) => {
                self.destroy_subtree(path);
                true
            }
            None => true,
        };
        if fresh {
            self.mount(path, &component, &props);
        }

        let can_skip = {
            let inst = &self.instances[path];
            !fresh
                && !ctx.dirty.contains(path)
                && inst.has_rendered()
                && (reused
                    || (component.is_memo() && inst.inputs_unchanged(&props, node.children_rc())))
        };

        let (children, children_reused) = if can_skip {
            if !ctx.subtree_dirty(path) {
                tracing::debug!(%path, "memo skip");
                let cached = self.instances[path].last_output.clone();
                return Ok(element_output(node, props, cached));
            }
            (self.instances[path].last_rendered.clone(), true)
        } else {
            match self.render_instance(path, node, &props, ctx) {
                Ok(children) => (children, false),
                Err(error) => {
                    tracing::warn!(%path, %error, "render failed");
                    if let Some(inst) = self.instances.get_mut(path) {
                        inst.status.fail(error.clone());
                    }
                    return Err(Failure {
                        path: path.clone(),
                        error,
                    });
                }
            }
        };

        let outputs = self.reconcile_children(path, &children, children_reused, ctx)?;
        if let Some(inst) = self.instances.get_mut(path) {
            inst.last_output = outputs.clone();
        }
        Ok(element_output(node, props, outputs))
    }

    fn mount(&mut self, path: &InstancePath, component: &Rc<Component>, props: &Map) {
        let updater = Updater {
            queue: self.queue_handle(),
            path: path.clone(),
            scope: CancelToken::new(),
        };
        let state = component.initial_state_for(props);
        tracing::debug!(%path, "mount");
        self.instances.insert(
            path.clone(),
            Instance::mount(Rc::clone(component), state, updater),
        );
    }

    fn render_instance(
        &mut self,
        path: &InstancePath,
        node: &Node,
        props: &Map,
        ctx: &mut PassCtx<'_>,
    ) -> Result<Vec<Child>, RenderError> {
        let Some(inst) = self.instances.get_mut(path) else {
            return Err(RenderError::thrown(format!("instance {path} is not mounted")));
        };

        let validation = validate_props(inst.component.prop_types(), props);
        for d in &validation.diagnostics {
            ctx.observers.diagnostic(path, inst.component.name(), d);
        }
        if ctx.strict && !validation.ok() {
            return Err(RenderError::InvalidProps {
                component: inst.component.name().to_string(),
                diagnostics: validation.diagnostics,
            });
        }

        let rctx = RenderCtx {
            path,
            props,
            state: &inst.state,
            children: node.children(),
            updater: &inst.updater,
        };
        let children = inst.component.render(&rctx)?;

        ctx.renders += 1;
        inst.render_count += 1;
        inst.last_props = Some(props.clone());
        inst.last_children_in = Rc::clone(node.children_rc());
        inst.last_rendered = children.clone();
        Ok(children)
    }

    /// Render each child in its own failure domain. Every sibling is attempted even after one
    /// fails. When `path` is a boundary, a failure is caught here and the fallback takes the
    /// failing child's place; any other failure is returned once all siblings have run.
    fn reconcile_children(
        &mut self,
        path: &InstancePath,
        children: &[Child],
        reused: bool,
        ctx: &mut PassCtx<'_>,
    ) -> Result<Vec<Output>, Failure> {
        let mut outputs = Vec::with_capacity(children.len());
        let mut live = BTreeSet::new();
        let mut seen_keys = HashSet::new();
        let mut first_failure = None;
        let caught_slot = self
            .instances
            .get(path)
            .and_then(|inst| inst.status.caught_slot().cloned());

        for (i, child) in children.iter().enumerate() {
            let node = match child {
                Child::Primitive(v) => {
                    outputs.push(Output::Primitive(v.clone()));
                    continue;
                }
                Child::Node(node) => node,
            };

            let mut segment = PathSegment::for_node(node, i);
            let duplicate = match &segment.key {
                SegmentKey::Key(k) => !seen_keys.insert(k.clone()),
                SegmentKey::Index(_) => false,
            };
            if duplicate {
                tracing::warn!(parent = %path, key = ?node.key(), "duplicate sibling key, using position");
                segment.key = SegmentKey::Index(i);
            }

            if caught_slot.as_ref() == Some(&segment) {
                let slot_path = path.child(segment.fallback());
                live.insert(slot_path.clone());
                match self.render_fallback(path, &slot_path, ctx) {
                    Ok(out) => outputs.extend(out),
                    Err(failure) => {
                        first_failure.get_or_insert(failure);
                    }
                }
                continue;
            }

            let child_path = path.child(segment);
            live.insert(child_path.clone());
            let failure = match self.reconcile(&child_path, node, reused, ctx) {
                Ok(out) => {
                    outputs.push(out);
                    continue;
                }
                Err(failure) => failure,
            };
            match self.catch(path, &child_path, failure, ctx) {
                Ok((slot_path, out)) => {
                    live.remove(&child_path);
                    live.insert(slot_path);
                    outputs.extend(out);
                }
                Err(failure) => {
                    first_failure.get_or_insert(failure);
                }
            }
        }

        self.remove_stale_children(path, &live);
        match first_failure {
            Some(failure) => Err(failure),
            None => Ok(outputs),
        }
    }

    /// Stop a failure from `child` at `path` if it is a healthy boundary: the child's subtree is
    /// destroyed and the fallback is rendered in its slot. Otherwise the failure is passed on.
    fn catch(
        &mut self,
        path: &InstancePath,
        child: &InstancePath,
        failure: Failure,
        ctx: &mut PassCtx<'_>,
    ) -> Result<(InstancePath, Vec<Output>), Failure> {
        let is_boundary = self
            .instances
            .get(path)
            .is_some_and(|inst| inst.component.is_boundary());
        if !is_boundary {
            return Err(failure);
        }
        let Some(slot) = child.last().cloned() else {
            return Err(failure);
        };
        let token = ResetToken(self.next_token);
        let caught = self
            .instances
            .get_mut(path)
            .is_some_and(|inst| inst.status.catch(failure.error.clone(), token, slot.clone()));
        if !caught {
            return Err(failure);
        }
        self.next_token += 1;
        tracing::warn!(
            boundary = %path,
            source = %failure.path,
            error = %failure.error,
            token = token.get(),
            "error boundary caught render failure"
        );

        self.destroy_subtree(child);
        let slot_path = path.child(slot.fallback());
        let out = self.render_fallback(path, &slot_path, ctx)?;
        Ok((slot_path, out))
    }

    /// Render the fallback of a caught boundary under `slot_path`. Failures here are not caught
    /// by the same boundary.
    fn render_fallback(
        &mut self,
        boundary: &InstancePath,
        slot_path: &InstancePath,
        ctx: &mut PassCtx<'_>,
    ) -> Result<Vec<Output>, Failure> {
        let Some(inst) = self.instances.get(boundary) else {
            return Ok(Vec::new());
        };
        let ErrorStatus::Caught { error, token, .. } = &inst.status else {
            return Ok(Vec::new());
        };
        let caught = CaughtError {
            error: error.clone(),
            token: *token,
            boundary: boundary.clone(),
            queue: self.queue_handle(),
        };
        let fallback = inst.component.fallback(&caught).unwrap_or_default();
        self.reconcile_children(slot_path, &fallback, false, ctx)
    }

    /// Destroy everything under `path` that does not hang off one of the `live` child paths.
    fn remove_stale_children(&mut self, path: &InstancePath, live: &BTreeSet<InstancePath>) {
        let depth = path.depth() + 1;
        let stale: Vec<InstancePath> = self
            .instances
            .range(path.clone()..)
            .take_while(|(p, _)| p.starts_with(path))
            .map(|(p, _)| p)
            .filter(|p| p.depth() >= depth && !live.contains(&p.truncated(depth)))
            .cloned()
            .collect();
        for p in stale {
            if let Some(inst) = self.instances.remove(&p) {
                inst.destroy();
                tracing::debug!(path = %p, "unmount");
            }
        }
    }

    /// Drop instances left over from a previous root identity.
    fn retain_subtree(&mut self, root: &InstancePath) {
        let foreign: Vec<InstancePath> = self
            .instances
            .keys()
            .filter(|p| !p.starts_with(root))
            .cloned()
            .collect();
        for p in foreign {
            if let Some(inst) = self.instances.remove(&p) {
                inst.destroy();
            }
        }
    }

    /// Destroy the instance at `root` (if any) and everything below it.
    fn destroy_subtree(&mut self, root: &InstancePath) {
        let doomed: Vec<InstancePath> = self
            .instances
            .range(root.clone()..)
            .take_while(|(p, _)| p.starts_with(root))
            .map(|(p, _)| p.clone())
            .collect();
        for p in doomed {
            if let Some(inst) = self.instances.remove(&p) {
                inst.destroy();
                tracing::debug!(path = %p, "unmount");
            }
        }
    }
}

/// A render failure travelling towards the nearest boundary.
struct Failure {
    path: InstancePath,
    error: RenderError,
}

fn element_output(node: &Node, props: Map, children: Vec<Output>) -> Output {
    Output::Element {
        component: node.component().name().to_string(),
        key: node.key().map(str::to_string),
        props,
        children,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use std::cell::Cell;

    fn counter() -> (Rc<Component>, Rc<Cell<u32>>) {
        let calls = Rc::new(Cell::new(0));
        let seen = Rc::clone(&calls);
        let c = Component::new("Counter", move |ctx| {
            seen.set(seen.get() + 1);
            let n = ctx.state_value("n").and_then(Value::as_f64).unwrap_or(0.0);
            Ok(vec![Child::from(Value::from(n))])
        })
        .build();
        (c, calls)
    }

    #[test]
    fn queued_updates_merge_into_one_render() {
        let (c, calls) = counter();
        let mut s = Scheduler::new(Node::new(&c), false);
        let mut obs = Observers::default();
        s.run_pass(&mut obs).unwrap();
        assert_eq!(calls.get(), 1);

        let updater = s.instance(&s.root_path()).unwrap().updater.clone();
        assert!(updater.set(Map::from([("n".to_string(), Value::from(1))])));
        assert!(updater.set_with(|state| {
            let n = state.get("n").and_then(Value::as_f64).unwrap_or(0.0);
            Map::from([("n".to_string(), Value::from(n + 10.0))])
        }));
        assert!(s.has_pending());

        let out = s.run_pass(&mut obs).unwrap();
        assert_eq!(calls.get(), 2);
        assert_eq!(out.text(), "11");
        assert!(!s.has_pending());
    }

    #[test]
    fn teardown_cancels_updaters() {
        let (c, _) = counter();
        let mut s = Scheduler::new(Node::new(&c), false);
        let mut obs = Observers::default();
        s.run_pass(&mut obs).unwrap();
        let updater = s.instance(&s.root_path()).unwrap().updater.clone();
        assert!(updater.is_live());

        s.teardown();
        assert!(!updater.is_live());
        assert!(!updater.set(Map::new()));
        assert!(!s.has_pending());
    }

    #[test]
    fn update_queued_before_unmount_is_dropped() {
        let (c, calls) = counter();
        let mut s = Scheduler::new(Node::new(&c), false);
        let mut obs = Observers::default();
        s.run_pass(&mut obs).unwrap();
        let updater = s.instance(&s.root_path()).unwrap().updater.clone();
        assert!(updater.set(Map::from([("n".to_string(), Value::from(5))])));

        s.teardown();
        let out = s.run_pass(&mut obs).unwrap();
        // Remounted from scratch: the queued update belonged to the old scope.
        assert_eq!(out.text(), "0");
        assert_eq!(calls.get(), 2);
    }
}
