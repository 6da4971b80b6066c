use std::collections::BTreeMap;
use std::fmt;

use crate::boundary::{ErrorStatus, UncaughtError};
use crate::component::Node;
use crate::foundation::error::{ArborError, ArborResult};
use crate::instance::InstancePath;
use crate::output::Output;
use crate::scheduler::{Observers, Request, Scheduler, StateUpdate, Updater};
use crate::validate::Diagnostic;
use crate::value::Map;

/// Runtime-wide switches.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// Escalate prop validation diagnostics to render failures.
    pub strict_validation: bool,
    /// Upper bound on passes a single flush may run before giving up on a feedback loop.
    pub max_passes_per_flush: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            strict_validation: false,
            max_passes_per_flush: 50,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RootHandle(u64);

impl fmt::Display for RootHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "root-{}", self.0)
    }
}

struct Root {
    scheduler: Scheduler,
    output: Option<Output>,
}

impl Root {
    fn pass(&mut self, observers: &mut Observers) {
        match self.scheduler.run_pass(observers) {
            Ok(out) => self.output = Some(out),
            Err(err) => {
                self.output = None;
                observers.uncaught(&err);
            }
        }
    }

    fn flush(&mut self, observers: &mut Observers, max_passes: usize) -> ArborResult<usize> {
        let mut passes = 0;
        while self.scheduler.has_pending() {
            if passes >= max_passes {
                let dropped = self.scheduler.clear_pending();
                tracing::error!(passes, dropped, "update loop did not settle");
                return Err(ArborError::scheduling(format!(
                    "updates still pending after {passes} passes; dropped {dropped} request(s)"
                )));
            }
            self.pass(observers);
            passes += 1;
        }
        Ok(passes)
    }
}

/// Owns mounted roots and drives their evaluation.
///
/// Everything runs on the calling thread. State updates requested through an [`Updater`] are
/// queued; [`Runtime::update`] and [`Runtime::reset`] flush right away unless called inside
/// [`Runtime::batch`], in which case everything queued is applied in one pass when the batch ends.
pub struct Runtime {
    config: RuntimeConfig,
    roots: BTreeMap<RootHandle, Root>,
    next_root: u64,
    observers: Observers,
    batch_depth: usize,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            roots: BTreeMap::new(),
            next_root: 1,
            observers: Observers::default(),
            batch_depth: 0,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Called once per prop validation diagnostic, in addition to the `warn` log line.
    pub fn on_validation_diagnostic(
        &mut self,
        hook: impl FnMut(&InstancePath, &Diagnostic) + 'static,
    ) {
        self.observers.diagnostics.push(Box::new(hook));
    }

    /// Called when a render failure reaches a root with no boundary in the way.
    pub fn on_uncaught_error(&mut self, hook: impl FnMut(&UncaughtError) + 'static) {
        self.observers.uncaught.push(Box::new(hook));
    }

    /// Evaluate `root` for the first time. An uncaught failure still yields a handle; the root
    /// just has no output until something renders successfully. If the first flush does not
    /// settle, the root is torn down and nothing stays mounted.
    #[tracing::instrument(skip_all, fields(component = root.component().name()))]
    pub fn mount(&mut self, root: Node) -> ArborResult<RootHandle> {
        let handle = RootHandle(self.next_root);
        self.next_root += 1;

        let mut r = Root {
            scheduler: Scheduler::new(root, self.config.strict_validation),
            output: None,
        };
        r.pass(&mut self.observers);
        if let Err(e) = r.flush(&mut self.observers, self.config.max_passes_per_flush) {
            r.scheduler.teardown();
            r.scheduler.clear_pending();
            tracing::debug!(%handle, "mount abandoned");
            return Err(e);
        }
        self.roots.insert(handle, r);
        tracing::debug!(%handle, "mounted");
        Ok(handle)
    }

    /// Merge `delta` into the state of the instance at `path`. Returns false if no such instance
    /// is mounted.
    pub fn update(&mut self, handle: RootHandle, path: &InstancePath, delta: Map) -> ArborResult<bool> {
        self.request(handle, path, StateUpdate::Merge(delta))
    }

    pub fn update_with(
        &mut self,
        handle: RootHandle,
        path: &InstancePath,
        f: impl FnOnce(&Map) -> Map + 'static,
    ) -> ArborResult<bool> {
        self.request(handle, path, StateUpdate::Apply(Box::new(f)))
    }

    fn request(
        &mut self,
        handle: RootHandle,
        path: &InstancePath,
        update: StateUpdate,
    ) -> ArborResult<bool> {
        let Some(updater) = self.updater(handle, path) else {
            tracing::warn!(%handle, %path, "update for unmounted instance ignored");
            return Ok(false);
        };
        if !updater.request(update) {
            return Ok(false);
        }
        self.flush_unless_batching(handle)?;
        Ok(true)
    }

    /// Reset the boundary at `path` with its current token. Returns false if it is not showing
    /// a fallback.
    pub fn reset(&mut self, handle: RootHandle, boundary: &InstancePath) -> ArborResult<bool> {
        let root = self.root(handle)?;
        let Some((_, token)) = root
            .scheduler
            .instance(boundary)
            .and_then(|inst| inst.status.caught())
        else {
            return Ok(false);
        };
        root.scheduler.queue_handle().push(Request::Reset {
            boundary: boundary.clone(),
            token,
        });
        self.flush_unless_batching(handle)?;
        Ok(true)
    }

    /// Run `f`, deferring every flush it would trigger until it returns. Nested batches flush
    /// once, when the outermost one ends.
    pub fn batch<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> ArborResult<R> {
        self.batch_depth += 1;
        let out = f(self);
        self.batch_depth -= 1;
        if self.batch_depth == 0 {
            self.flush_all()?;
        }
        Ok(out)
    }

    pub fn is_batching(&self) -> bool {
        self.batch_depth > 0
    }

    /// Apply everything queued for `handle`, running as many passes as needed to settle.
    pub fn flush(&mut self, handle: RootHandle) -> ArborResult<usize> {
        let max = self.config.max_passes_per_flush;
        let root = self
            .roots
            .get_mut(&handle)
            .ok_or_else(|| unknown_root(handle))?;
        root.flush(&mut self.observers, max)
    }

    pub fn flush_all(&mut self) -> ArborResult<()> {
        let max = self.config.max_passes_per_flush;
        let mut first_err = None;
        for (handle, root) in &mut self.roots {
            if let Err(e) = root.flush(&mut self.observers, max) {
                tracing::warn!(%handle, error = %e, "flush failed");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn flush_unless_batching(&mut self, handle: RootHandle) -> ArborResult<()> {
        if self.batch_depth == 0 {
            self.flush(handle)?;
        }
        Ok(())
    }

    /// Run a pass even though nothing was requested. Memoized instances with unchanged inputs
    /// are skipped.
    pub fn rerender(&mut self, handle: RootHandle) -> ArborResult<()> {
        let max = self.config.max_passes_per_flush;
        let root = self
            .roots
            .get_mut(&handle)
            .ok_or_else(|| unknown_root(handle))?;
        root.pass(&mut self.observers);
        root.flush(&mut self.observers, max)?;
        Ok(())
    }

    /// Replace the root node and re-evaluate. Instances whose identity survives keep their state.
    pub fn render(&mut self, handle: RootHandle, root: Node) -> ArborResult<()> {
        self.root_mut(handle)?.scheduler.set_root(root);
        self.rerender(handle)
    }

    /// Tear down every instance of the root. Returns false for an unknown handle.
    pub fn unmount(&mut self, handle: RootHandle) -> bool {
        match self.roots.remove(&handle) {
            Some(mut root) => {
                root.scheduler.teardown();
                let dropped = root.scheduler.clear_pending();
                tracing::debug!(%handle, dropped, "unmounted");
                true
            }
            None => false,
        }
    }

    pub fn output(&self, handle: RootHandle) -> Option<&Output> {
        self.roots.get(&handle)?.output.as_ref()
    }

    pub fn root_path(&self, handle: RootHandle) -> Option<InstancePath> {
        self.roots.get(&handle).map(|r| r.scheduler.root_path())
    }

    pub fn updater(&self, handle: RootHandle, path: &InstancePath) -> Option<Updater> {
        let inst = self.roots.get(&handle)?.scheduler.instance(path)?;
        Some(inst.updater.clone())
    }

    pub fn state(&self, handle: RootHandle, path: &InstancePath) -> Option<&Map> {
        let inst = self.roots.get(&handle)?.scheduler.instance(path)?;
        Some(&inst.state)
    }

    pub fn status(&self, handle: RootHandle, path: &InstancePath) -> Option<&ErrorStatus> {
        let inst = self.roots.get(&handle)?.scheduler.instance(path)?;
        Some(&inst.status)
    }

    /// How many times the instance at `path` has rendered since it was mounted.
    pub fn render_count(&self, handle: RootHandle, path: &InstancePath) -> Option<u64> {
        let inst = self.roots.get(&handle)?.scheduler.instance(path)?;
        Some(inst.render_count)
    }

    pub fn is_mounted(&self, handle: RootHandle, path: &InstancePath) -> bool {
        self.roots
            .get(&handle)
            .is_some_and(|r| r.scheduler.instance(path).is_some())
    }

    /// Paths of all mounted instances in tree order.
    pub fn instances(&self, handle: RootHandle) -> Vec<InstancePath> {
        self.roots
            .get(&handle)
            .map(|r| r.scheduler.paths().cloned().collect())
            .unwrap_or_default()
    }

    fn root(&self, handle: RootHandle) -> ArborResult<&Root> {
        self.roots.get(&handle).ok_or_else(|| unknown_root(handle))
    }

    fn root_mut(&mut self, handle: RootHandle) -> ArborResult<&mut Root> {
        self.roots.get_mut(&handle).ok_or_else(|| unknown_root(handle))
    }
}

fn unknown_root(handle: RootHandle) -> ArborError {
    ArborError::scheduling(format!("unknown root handle {handle}"))
}
