// src/registry.rs
//! GPU context registry.
//!
//! At most one rendering context is active at a time. Registering a new
//! surface first tears the previous context down completely: teardown hooks
//! run, every geometry and material texture in its scene is disposed exactly
//! once, the renderer is disposed, and the platform is asked to drop the
//! context. This registry is the only place GPU resources get disposed.

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::scene::SceneGraph;

/// A GPU object that must be released explicitly.
pub trait GpuResource: Send + Sync {
    fn label(&self) -> &str;

    /// Releases GPU memory. Must tolerate being called more than once.
    fn dispose(&self) -> Result<()>;
}

/// The renderer behind one registered surface.
pub trait RenderBackend: Send {
    type SurfaceId: PartialEq + Clone + fmt::Debug + Send;

    fn scene(&self) -> &SceneGraph;

    fn scene_mut(&mut self) -> &mut SceneGraph;

    /// Releases renderer-owned objects (device, queues, pipelines).
    fn dispose(&mut self) -> Result<()>;

    /// Forces the platform to drop the context. `None` if unsupported.
    fn lose_context(&mut self) -> Option<Result<()>> {
        None
    }
}

/// Notified before a context's resources are disposed.
pub trait TeardownHook: Send + Sync {
    fn on_teardown(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryState {
    Uninitialized,
    Active,
    Disposed,
}

/// Outcome of [`ContextRegistry::register_surface`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registered {
    /// Nothing was active before.
    Activated,
    /// A different surface was torn down first.
    Replaced,
    /// The surface was already active; the offered backend was dropped.
    AlreadyActive,
}

/// What one teardown did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub hooks: usize,
    pub disposed: usize,
    pub failed: usize,
    pub context_lost: bool,
}

enum Slot<B: RenderBackend> {
    Uninitialized,
    Active { surface: B::SurfaceId, backend: B },
    Disposed,
}

pub struct ContextRegistry<B: RenderBackend> {
    slot: Mutex<Slot<B>>,
    hooks: Mutex<Vec<Weak<dyn TeardownHook>>>,
    teardowns: AtomicU64,
    last_report: Mutex<Option<TeardownReport>>,
}

impl<B: RenderBackend> Default for ContextRegistry<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: RenderBackend> ContextRegistry<B> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Uninitialized),
            hooks: Mutex::new(Vec::new()),
            teardowns: AtomicU64::new(0),
            last_report: Mutex::new(None),
        }
    }

    /// Runs `hook` on every future teardown. Held weakly.
    pub fn add_teardown_hook<H: TeardownHook + 'static>(&self, hook: &Arc<H>) {
        let weak: Weak<H> = Arc::downgrade(hook);
        self.hooks.lock().push(weak);
    }

    /// Makes `surface` the active context.
    ///
    /// A different active surface is torn down first. Hooks and disposal
    /// run without the registry lock held.
    pub fn register_surface(&self, surface: B::SurfaceId, backend: B) -> Registered {
        let mut incoming = Some((surface, backend));
        let mut replaced = false;
        loop {
            let previous = {
                let mut slot = self.slot.lock();
                if let (Slot::Active { surface: active, .. }, Some((offered, _))) = (&*slot, &incoming) {
                    if active == offered {
                        debug!("surface {offered:?} already active");
                        return Registered::AlreadyActive;
                    }
                }
                match std::mem::replace(&mut *slot, Slot::Disposed) {
                    Slot::Active { surface, backend } => (surface, backend),
                    Slot::Uninitialized | Slot::Disposed => {
                        let Some((surface, backend)) = incoming.take() else {
                            return Registered::Activated;
                        };
                        info!("activating GPU context for surface {surface:?}");
                        *slot = Slot::Active { surface, backend };
                        return if replaced {
                            Registered::Replaced
                        } else {
                            Registered::Activated
                        };
                    }
                }
            };
            info!(
                "surface {:?} replaces {:?}: disposing previous context",
                incoming.as_ref().map(|(s, _)| s),
                previous.0
            );
            self.teardown(previous.0, previous.1);
            replaced = true;
        }
    }

    /// Tears down the active context if it belongs to `surface`.
    ///
    /// Returns `false` (and does nothing) otherwise, so repeated calls are
    /// harmless.
    pub fn unregister_surface(&self, surface: &B::SurfaceId) -> bool {
        let previous = {
            let mut slot = self.slot.lock();
            let is_active = matches!(&*slot, Slot::Active { surface: active, .. } if active == surface);
            if is_active {
                match std::mem::replace(&mut *slot, Slot::Disposed) {
                    Slot::Active { surface, backend } => Some((surface, backend)),
                    _ => None,
                }
            } else {
                None
            }
        };
        match previous {
            Some((surface, backend)) => {
                self.teardown(surface, backend);
                true
            }
            None => {
                debug!("unregister of inactive surface {surface:?} ignored");
                false
            }
        }
    }

    /// Registers `surface` and returns a lease that unregisters it on drop.
    ///
    /// `None` when `surface` is already active: the existing lease owns the
    /// context and `backend` is dropped unused.
    pub fn acquire(self: &Arc<Self>, surface: B::SurfaceId, backend: B) -> Option<SurfaceLease<B>> {
        match self.register_surface(surface.clone(), backend) {
            Registered::AlreadyActive => {
                warn!("surface {surface:?} already leased");
                None
            }
            Registered::Activated | Registered::Replaced => Some(SurfaceLease {
                registry: Arc::clone(self),
                surface,
            }),
        }
    }

    /// Runs `f` against the active backend.
    pub fn with_active<R>(&self, f: impl FnOnce(&B::SurfaceId, &mut B) -> R) -> Option<R> {
        let mut slot = self.slot.lock();
        match &mut *slot {
            Slot::Active { surface, backend } => Some(f(surface, backend)),
            _ => None,
        }
    }

    pub fn state(&self) -> RegistryState {
        match &*self.slot.lock() {
            Slot::Uninitialized => RegistryState::Uninitialized,
            Slot::Active { .. } => RegistryState::Active,
            Slot::Disposed => RegistryState::Disposed,
        }
    }

    pub fn active_surface(&self) -> Option<B::SurfaceId> {
        match &*self.slot.lock() {
            Slot::Active { surface, .. } => Some(surface.clone()),
            _ => None,
        }
    }

    /// Completed teardowns since construction.
    pub fn teardown_count(&self) -> u64 {
        self.teardowns.load(Ordering::Acquire)
    }

    pub fn last_teardown(&self) -> Option<TeardownReport> {
        *self.last_report.lock()
    }

    fn teardown(&self, surface: B::SurfaceId, mut backend: B) -> TeardownReport {
        let mut report = TeardownReport::default();

        let hooks: Vec<Arc<dyn TeardownHook>> = {
            let mut hooks = self.hooks.lock();
            hooks.retain(|h| h.strong_count() > 0);
            hooks.iter().filter_map(Weak::upgrade).collect()
        };
        for hook in hooks {
            guarded("teardown hook", || {
                hook.on_teardown();
                Ok(())
            });
            report.hooks += 1;
        }

        for resource in collect_resources(backend.scene()) {
            if guarded(resource.label(), || resource.dispose()) {
                report.disposed += 1;
            } else {
                report.failed += 1;
            }
        }
        backend.scene_mut().clear();

        if !guarded("renderer", || backend.dispose()) {
            report.failed += 1;
        }
        match panic::catch_unwind(AssertUnwindSafe(|| backend.lose_context())) {
            Ok(Some(Ok(()))) => report.context_lost = true,
            Ok(Some(Err(err))) => warn!("forcing context loss failed: {err}"),
            Ok(None) => debug!("platform cannot force context loss"),
            Err(payload) => warn!("forcing context loss panicked: {}", panic_message(&*payload)),
        }
        drop(backend);

        self.teardowns.fetch_add(1, Ordering::AcqRel);
        *self.last_report.lock() = Some(report);
        info!(
            "context for {surface:?} torn down: {} resource(s) disposed, {} failure(s)",
            report.disposed, report.failed
        );
        report
    }
}

impl<B: RenderBackend> Drop for ContextRegistry<B> {
    fn drop(&mut self) {
        let previous = std::mem::replace(self.slot.get_mut(), Slot::Disposed);
        if let Slot::Active { surface, backend } = previous {
            self.teardown(surface, backend);
        }
    }
}

/// Every geometry, material uniform block and material map in the scene,
/// each shared resource listed once.
fn collect_resources(scene: &SceneGraph) -> Vec<Arc<dyn GpuResource>> {
    let mut seen: HashSet<*const ()> = HashSet::new();
    let mut out: Vec<Arc<dyn GpuResource>> = Vec::new();
    let mut push = |res: &Arc<dyn GpuResource>| {
        if seen.insert(Arc::as_ptr(res) as *const ()) {
            out.push(res.clone());
        }
    };
    scene.walk(&mut |node| {
        if let Some(geometry) = &node.geometry {
            push(geometry);
        }
        if let Some(material) = &node.material {
            let material = material.lock();
            for (_, map) in material.maps() {
                push(map);
            }
            if let Some(uniforms) = &material.uniforms {
                push(uniforms);
            }
        }
    });
    out
}

/// Runs one disposal step, logging and swallowing errors and panics.
fn guarded(what: &str, f: impl FnOnce() -> Result<()>) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            let err = Error::Disposal {
                resource: what.to_string(),
                reason: err.to_string(),
            };
            warn!("{err}");
            false
        }
        Err(payload) => {
            warn!("disposal of {what} panicked: {}", panic_message(&*payload));
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    match payload.downcast_ref::<&'static str>() {
        Some(s) => *s,
        None => match payload.downcast_ref::<String>() {
            Some(s) => &s[..],
            None => "Box<dyn Any>",
        },
    }
}

/// Scoped registration. Dropping it unregisters the surface if it is still
/// the active one.
pub struct SurfaceLease<B: RenderBackend> {
    registry: Arc<ContextRegistry<B>>,
    surface: B::SurfaceId,
}

impl<B: RenderBackend> SurfaceLease<B> {
    pub fn surface(&self) -> &B::SurfaceId {
        &self.surface
    }

    pub fn registry(&self) -> &Arc<ContextRegistry<B>> {
        &self.registry
    }
}

impl<B: RenderBackend> Drop for SurfaceLease<B> {
    fn drop(&mut self) {
        self.registry.unregister_surface(&self.surface);
    }
}
