use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::actions::{ActionCenter, ActionTable};
use crate::error::{Result, UiError};
use crate::manager::ViewRoot;
use crate::state::ViewState;
use crate::view::{Listen, ViewHandle, ViewKey, ViewTemplate};

struct CacheEntry {
    template: Rc<dyn ViewTemplate>,
    /// Prototype handler table, built once per key and shared by every
    /// dispatch object allocated for it.
    table: Rc<ActionTable>,
    idle: Vec<ViewHandle>,
    issued: usize,
}

struct CacheInner {
    entries: RefCell<HashMap<ViewKey, CacheEntry>>,
    capacity: usize,
}

/// Keyed pool of idle view instances.
///
/// One entry per template key holds the retained template, the prototype
/// handler table and a bounded array of closed instances waiting to be
/// reused. Instances beyond the configured capacity are destroyed instead
/// of pooled. Clones share the cache.
#[derive(Clone)]
pub struct ViewCache {
    inner: Rc<CacheInner>,
}

impl ViewCache {
    /// A cache pooling up to `capacity` idle instances per key.
    /// Zero disables pooling entirely.
    pub fn new(capacity: usize) -> ViewCache {
        ViewCache {
            inner: Rc::new(CacheInner {
                entries: RefCell::new(HashMap::new()),
                capacity,
            }),
        }
    }

    /// Create the entry for `key`, building its prototype handler table.
    pub fn insert(&self, key: ViewKey, template: Rc<dyn ViewTemplate>) -> Result<()> {
        let table = Rc::new(template.build_actions()?);
        let mut entries = self.inner.entries.borrow_mut();
        if entries
            .insert(
                key.clone(),
                CacheEntry {
                    template,
                    table,
                    idle: Vec::new(),
                    issued: 0,
                },
            )
            .is_some()
        {
            log::warn!("cache: replaced existing entry for key {key:?}");
        }
        Ok(())
    }

    pub fn contains(&self, key: &ViewKey) -> bool {
        self.inner.entries.borrow().contains_key(key)
    }

    /// Hand out an instance for `key`, reusing an idle one when available.
    ///
    /// A fresh instance gets a dispatch object built from the prototype
    /// table and its recycle-on-close subscription, installed exactly once
    /// for the instance's entire pooled lifetime. A reused instance keeps
    /// whatever domain state it was left in; only the reset performed
    /// before opening touches it. Either way the instance is attached to
    /// the render root.
    pub fn allocate(&self, key: &ViewKey, root: &mut dyn ViewRoot) -> Result<ViewHandle> {
        let (view, reused) = {
            let mut entries = self.inner.entries.borrow_mut();
            let entry = entries
                .get_mut(key)
                .ok_or_else(|| UiError::NullTemplate { key: key.clone() })?;
            let allocated = match entry.idle.pop() {
                Some(view) => (view, true),
                None => {
                    let behavior = entry.template.instantiate();
                    let actions = ActionCenter::new(
                        entry.table.clone(),
                        entry.template.create_action_state(),
                    )?;
                    (ViewHandle::new(key.clone(), behavior, actions), false)
                }
            };
            entry.issued += 1;
            allocated
        };

        if reused {
            log::debug!("cache: reusing pooled instance for key {key:?}");
        } else {
            log::info!("cache: instantiated view for key {key:?}");
            let inner = Rc::downgrade(&self.inner);
            let recycle_key = key.clone();
            view.subscribe(Rc::new(move |view, state| {
                if state == ViewState::Closed {
                    if let Some(cache) = inner.upgrade() {
                        CacheInner::recycle(&cache, &recycle_key, view);
                    }
                }
                Listen::Keep
            }));
        }

        root.attach(&view);
        Ok(view)
    }

    /// Destroy every idle instance for `key`. With `destroy` the entry is
    /// dropped entirely — template and prototype table included — and the
    /// retained template is returned so the caller can hand it back to the
    /// loader; a later allocation for the key must reload it. Without
    /// `destroy` the entry stays usable, its pool merely empty.
    pub fn release(&self, key: &ViewKey, destroy: bool) -> Option<Rc<dyn ViewTemplate>> {
        let (idle, template) = {
            let mut entries = self.inner.entries.borrow_mut();
            if destroy {
                let entry = entries.remove(key)?;
                (entry.idle, Some(entry.template))
            } else {
                let entry = entries.get_mut(key)?;
                (std::mem::take(&mut entry.idle), None)
            }
        };

        log::info!(
            "cache: released key {key:?} ({} idle destroyed, destroy: {destroy})",
            idle.len()
        );
        for view in idle {
            view.destroy();
        }
        template
    }

    /// Release every entry. Returns the retained templates when
    /// `destroy` is set.
    pub fn release_all(&self, destroy: bool) -> Vec<(ViewKey, Rc<dyn ViewTemplate>)> {
        let keys: Vec<ViewKey> = self.inner.entries.borrow().keys().cloned().collect();
        let mut released = Vec::new();
        for key in keys {
            if let Some(template) = self.release(&key, destroy) {
                released.push((key, template));
            }
        }
        released
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.borrow().is_empty()
    }

    /// Idle instances currently pooled for `key`.
    pub fn idle_count(&self, key: &ViewKey) -> usize {
        self.inner
            .entries
            .borrow()
            .get(key)
            .map_or(0, |entry| entry.idle.len())
    }

    /// Instances currently issued (live) for `key`.
    pub fn issued_count(&self, key: &ViewKey) -> usize {
        self.inner
            .entries
            .borrow()
            .get(key)
            .map_or(0, |entry| entry.issued)
    }
}

impl CacheInner {
    /// Reclaim an instance that just reached `Closed`: pool it while the
    /// entry is alive and has spare capacity, destroy it otherwise. The
    /// subscription that got us here stays installed, so the instance can
    /// cycle through allocate and recycle indefinitely.
    fn recycle(inner: &Rc<CacheInner>, key: &ViewKey, view: &ViewHandle) {
        let pooled = {
            let mut entries = inner.entries.borrow_mut();
            match entries.get_mut(key) {
                Some(entry) => {
                    entry.issued = entry.issued.saturating_sub(1);
                    if entry.idle.len() < inner.capacity {
                        entry.idle.push(view.clone());
                        true
                    } else {
                        false
                    }
                }
                None => false,
            }
        };

        if pooled {
            log::debug!("cache: pooled closed instance for key {key:?}");
        } else {
            log::debug!("cache: destroying closed instance for key {key:?}");
            view.destroy();
        }
    }
}

impl fmt::Debug for ViewCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewCache")
            .field("entries", &self.len())
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}
