//! GPU resource handles and release bookkeeping.
//!
//! Every GPU-backed object of the viewer (geometry buffers, material state,
//! textures) carries a [`GpuHandle`] allocated by a [`ResourceTracker`]. Releasing
//! a handle does not free anything by itself: the tracker queues the id and the
//! rendering backend drops the matching GPU buffers the next time it drains the
//! queue. This keeps disposal independent of the backend and makes leaks
//! observable through [`ResourceTracker::live_count`].

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    fmt,
    rc::{Rc, Weak},
};

use anyhow::anyhow;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Geometry,
    Material,
    Texture,
}

#[derive(Debug, Default)]
struct TrackerState {
    next_id: u64,
    live: HashMap<ResourceId, ResourceKind>,
    releases: HashMap<ResourceId, u32>,
    pending: Vec<ResourceId>,
}

/// Allocates resource ids and records their release.
///
/// A tracker is owned by one viewer session and shared (via `Rc`) with every
/// handle it hands out. Handles only keep a weak reference so a torn down
/// session does not stay alive through stray handles.
#[derive(Debug, Default)]
pub struct ResourceTracker {
    state: RefCell<TrackerState>,
}

impl ResourceTracker {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn allocate(self: &Rc<Self>, kind: ResourceKind, label: &str) -> GpuHandle {
        let mut state = self.state.borrow_mut();
        let id = ResourceId(state.next_id);
        state.next_id += 1;
        state.live.insert(id, kind);
        log::trace!("allocated {:?} {} ({})", kind, id, label);
        GpuHandle {
            id,
            kind,
            label: label.to_string(),
            released: Cell::new(false),
            tracker: Rc::downgrade(self),
        }
    }

    fn release(&self, id: ResourceId) -> anyhow::Result<()> {
        let mut state = self
            .state
            .try_borrow_mut()
            .map_err(|_| anyhow!("resource tracker is busy, cannot release {}", id))?;
        if state.live.remove(&id).is_none() {
            return Err(anyhow!("resource {} is not tracked as live", id));
        }
        *state.releases.entry(id).or_insert(0) += 1;
        state.pending.push(id);
        Ok(())
    }

    /// Number of handles allocated and not released yet.
    pub fn live_count(&self) -> usize {
        self.state.borrow().live.len()
    }

    pub fn live_of(&self, kind: ResourceKind) -> usize {
        self.state
            .borrow()
            .live
            .values()
            .filter(|k| **k == kind)
            .count()
    }

    pub fn is_live(&self, id: ResourceId) -> bool {
        self.state.borrow().live.contains_key(&id)
    }

    /// How often `id` went through a release. Anything above one is a bug.
    pub fn release_count(&self, id: ResourceId) -> u32 {
        self.state
            .borrow()
            .releases
            .get(&id)
            .copied()
            .unwrap_or(0)
    }

    /// Takes the ids released since the last call. The backend frees their GPU buffers.
    pub fn drain_released(&self) -> Vec<ResourceId> {
        std::mem::take(&mut self.state.borrow_mut().pending)
    }
}

/// Ownership token of a single GPU-backed resource.
#[derive(Debug)]
pub struct GpuHandle {
    id: ResourceId,
    kind: ResourceKind,
    label: String,
    released: Cell<bool>,
    tracker: Weak<ResourceTracker>,
}

impl GpuHandle {
    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_released(&self) -> bool {
        self.released.get()
    }

    /// Releases the resource.
    ///
    /// Returns `Ok(true)` on the first call and `Ok(false)` on every later call.
    /// The handle counts as released even when the tracker reports an error.
    pub fn release(&self) -> anyhow::Result<bool> {
        if self.released.replace(true) {
            return Ok(false);
        }
        let tracker = self.tracker.upgrade().ok_or_else(|| {
            anyhow!(
                "{:?} {} ({}) outlived its resource tracker",
                self.kind,
                self.id,
                self.label
            )
        })?;
        tracker.release(self.id)?;
        Ok(true)
    }
}
