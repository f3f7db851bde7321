use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use crate::cache::ViewCache;
use crate::config::UiSettings;
use crate::error::{Result, UiError};
use crate::loader::{LoadCallback, ViewLoader};
use crate::stack::ViewStack;
use crate::view::{ObserverId, UserData, ViewHandle, ViewKey, ViewTemplate};

/// Host-side container that owns the rendered view hierarchy.
///
/// The engine never renders; it tells the root when an instance enters the
/// hierarchy and when an activated view should sit in front of everything
/// else.
pub trait ViewRoot {
    /// A newly allocated or recycled instance joined the hierarchy.
    fn attach(&mut self, view: &ViewHandle);

    /// An activated view moves to the front of the render order.
    fn bring_to_front(&mut self, view: &ViewHandle);
}

pub(crate) type RootSlot = RefCell<Option<Box<dyn ViewRoot>>>;

struct ManagerShared {
    settings: UiSettings,
    loader: RefCell<Box<dyn ViewLoader>>,
    cache: ViewCache,
    stack: ViewStack,
    /// Instances currently issued by the cache; each is ticked until it
    /// settles back into the pool or is destroyed.
    live: RefCell<Vec<ViewHandle>>,
    root: Rc<RootSlot>,
}

/// Top-level façade composing loader, cache, stack and settings.
///
/// `open` is the single entry point for showing a view: it resolves the
/// key through the cache (loading the template on a miss), allocates an
/// instance and pushes it onto the navigation stack. `tick` is the
/// cooperative scheduler that drives every live instance.
pub struct UiManager {
    shared: Rc<ManagerShared>,
}

impl UiManager {
    pub fn new(loader: Box<dyn ViewLoader>, settings: UiSettings) -> Result<UiManager> {
        settings.validate()?;
        let root: Rc<RootSlot> = Rc::new(RefCell::new(None));
        let shared = Rc::new(ManagerShared {
            stack: ViewStack::with_root(settings.stack_min_growth, root.clone()),
            cache: ViewCache::new(settings.pool_capacity_per_key),
            settings,
            loader: RefCell::new(loader),
            live: RefCell::new(Vec::new()),
            root,
        });
        Ok(UiManager { shared })
    }

    /// Attach the render root. Required before any view can open.
    pub fn set_root(&mut self, root: Box<dyn ViewRoot>) {
        *self.shared.root.borrow_mut() = Some(root);
    }

    /// Open the view registered under `key`.
    pub fn open(&mut self, key: impl Into<ViewKey>) -> Result<()> {
        self.open_with(key, None)
    }

    /// Open the view registered under `key`, threading `user_data` through
    /// the transitions it triggers.
    ///
    /// On a cache hit the instance is allocated and pushed before this
    /// returns. On a miss the loader is asked for the template; pushing
    /// happens when the loader completes, which may be on a later tick. A
    /// load that completes without a template aborts the request (logged,
    /// never retried).
    pub fn open_with(&mut self, key: impl Into<ViewKey>, user_data: Option<UserData>) -> Result<()> {
        let key = key.into();
        if self.shared.root.borrow().is_none() {
            return Err(UiError::MissingRoot);
        }

        if self.shared.cache.contains(&key) {
            ManagerShared::allocate_and_push(&self.shared, &key, user_data)
        } else {
            log::debug!("manager: loading template for key {key:?}");
            let shared = Rc::downgrade(&self.shared);
            let callback: LoadCallback = Box::new(move |key, template, user_data| {
                let Some(shared) = shared.upgrade() else {
                    return;
                };
                if let Err(err) = ManagerShared::finish_load(&shared, key, template, user_data) {
                    log::error!("manager: open of {key:?} aborted: {err}");
                }
            });
            self.shared.loader.borrow_mut().load(&key, callback, user_data);
            Ok(())
        }
    }

    /// Close the top view. A no-op when nothing is open.
    pub fn close_top(&mut self) -> Result<()> {
        self.close_top_with(None)
    }

    pub fn close_top_with(&mut self, user_data: Option<UserData>) -> Result<()> {
        self.shared.stack.pop(user_data).map(|_| ())
    }

    /// Close every open view, top to bottom.
    pub fn close_all(&mut self) -> Result<()> {
        self.close_all_with(None)
    }

    pub fn close_all_with(&mut self, user_data: Option<UserData>) -> Result<()> {
        self.shared.stack.clear(user_data)
    }

    /// Destroy the idle instances pooled for `key`; with `destroy` the
    /// template is released back to the loader and a later open must
    /// reload it.
    pub fn release_cache(&mut self, key: &ViewKey, destroy: bool) {
        if let Some(template) = self.shared.cache.release(key, destroy) {
            self.shared.loader.borrow_mut().release(key, template);
        }
    }

    /// Close everything, drop the root binding and release every cache
    /// entry; with `destroy_cache` the templates go back to the loader.
    pub fn clear(&mut self, destroy_cache: bool) -> Result<()> {
        log::info!("manager: clearing (destroy_cache: {destroy_cache})");
        *self.shared.root.borrow_mut() = None;
        self.shared.stack.clear(None)?;
        for (key, template) in self.shared.cache.release_all(destroy_cache) {
            self.shared.loader.borrow_mut().release(&key, template);
        }
        Ok(())
    }

    /// Host-defined teardown notification (scene unload, shutdown). Obeys
    /// the `auto_clear_on_teardown` setting.
    pub fn on_host_teardown(&mut self) -> Result<()> {
        if self.shared.settings.auto_clear_on_teardown {
            self.clear(true)
        } else {
            Ok(())
        }
    }

    /// Advance the engine by one tick: every live instance gets one step
    /// of its transition driver, one step of each in-flight action
    /// routine and its tick hook. Settled instances stop being ticked
    /// until the cache issues them again.
    pub fn tick(&mut self, dt: Duration) -> Result<()> {
        let live: Vec<ViewHandle> = self.shared.live.borrow().clone();
        let mut first_error = None;
        for view in &live {
            if let Err(err) = view.tick(dt) {
                log::error!("manager: tick of view {:?} failed: {err}", view.key());
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }

        self.shared.live.borrow_mut().retain(|view| !view.is_settled());

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Number of views currently on the navigation stack.
    pub fn view_count(&self) -> usize {
        self.shared.stack.len()
    }

    /// The top view, if any.
    pub fn top(&self) -> Option<ViewHandle> {
        self.shared.stack.top()
    }

    /// The view `depth` positions below the top (`0` = top).
    pub fn peek(&self, depth: usize) -> Option<ViewHandle> {
        self.shared.stack.peek(depth)
    }

    /// Shared handle to the navigation stack, e.g. for iteration.
    pub fn stack(&self) -> ViewStack {
        self.shared.stack.clone()
    }

    pub fn settings(&self) -> &UiSettings {
        &self.shared.settings
    }

    /// Notification for every view pushed onto the stack.
    pub fn on_view_opened(&self, f: impl Fn(&ViewHandle) + 'static) -> ObserverId {
        self.shared.stack.on_push(f)
    }

    /// Notification for every view removed from the stack.
    ///
    /// Fires when the close request is issued; observe the view's
    /// state-changed event to learn when the transition completes.
    pub fn on_view_closed(&self, f: impl Fn(&ViewHandle) + 'static) -> ObserverId {
        self.shared.stack.on_pop(f)
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.shared.stack.unsubscribe(id)
    }
}

impl ManagerShared {
    fn finish_load(
        shared: &Rc<ManagerShared>,
        key: &ViewKey,
        template: Option<Rc<dyn ViewTemplate>>,
        user_data: Option<UserData>,
    ) -> Result<()> {
        let template = template.ok_or_else(|| UiError::NullTemplate { key: key.clone() })?;
        shared.cache.insert(key.clone(), template)?;
        Self::allocate_and_push(shared, key, user_data)
    }

    fn allocate_and_push(
        shared: &Rc<ManagerShared>,
        key: &ViewKey,
        user_data: Option<UserData>,
    ) -> Result<()> {
        let view = {
            let mut slot = shared.root.borrow_mut();
            let root = slot.as_mut().ok_or(UiError::MissingRoot)?;
            shared.cache.allocate(key, root.as_mut())?
        };

        {
            let mut live = shared.live.borrow_mut();
            if !live.iter().any(|tracked| tracked.ptr_eq(&view)) {
                live.push(view.clone());
            }
        }

        shared.stack.push(view, user_data)
    }
}

impl fmt::Debug for UiManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UiManager")
            .field("views", &self.view_count())
            .field("live", &self.shared.live.borrow().len())
            .finish()
    }
}
