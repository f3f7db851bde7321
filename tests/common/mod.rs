#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use viewflow::{
    wait_ticks, LoadCallback, TransitionTask, UserData, ViewBehavior, ViewHandle, ViewKey,
    ViewLoader, ViewRoot, ViewTemplate,
};

/// Shared event log the doubles append to.
pub type Log = Rc<RefCell<Vec<String>>>;

pub fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

/// Opt tests into engine logging with `RUST_LOG=debug cargo test`.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn entries(log: &Log) -> Vec<String> {
    log.borrow().clone()
}

/// Behavior that records every hook invocation and spends a configurable
/// number of ticks opening and closing.
pub struct RecordingBehavior {
    pub key: String,
    pub log: Log,
    pub open_ticks: u32,
    pub close_ticks: u32,
}

impl RecordingBehavior {
    fn push(&self, event: &str) {
        self.log.borrow_mut().push(format!("{}:{event}", self.key));
    }
}

impl ViewBehavior for RecordingBehavior {
    fn on_create(&mut self) {
        self.push("create");
    }

    fn on_open(&mut self, user_data: Option<&UserData>) -> Option<TransitionTask> {
        match user_data.and_then(|data| data.downcast_ref::<i32>()) {
            Some(value) => self.push(&format!("open({value})")),
            None => self.push("open"),
        }
        (self.open_ticks > 0).then(|| wait_ticks(self.open_ticks))
    }

    fn on_close(&mut self, _user_data: Option<&UserData>) -> Option<TransitionTask> {
        self.push("close");
        (self.close_ticks > 0).then(|| wait_ticks(self.close_ticks))
    }

    fn on_suspend(&mut self, _user_data: Option<&UserData>) -> Option<TransitionTask> {
        self.push("suspend");
        None
    }

    fn on_resume(&mut self, _user_data: Option<&UserData>) -> Option<TransitionTask> {
        self.push("resume");
        None
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.push(if enabled { "enabled" } else { "disabled" });
    }

    fn on_destroy(&mut self) {
        self.push("destroy");
    }
}

pub struct RecordingTemplate {
    pub key: String,
    pub log: Log,
    pub open_ticks: u32,
    pub close_ticks: u32,
    pub instantiated: Rc<Cell<usize>>,
}

impl RecordingTemplate {
    pub fn new(key: &str, log: &Log) -> Self {
        Self::with_ticks(key, log, 0, 0)
    }

    pub fn with_ticks(key: &str, log: &Log, open_ticks: u32, close_ticks: u32) -> Self {
        Self {
            key: key.to_string(),
            log: log.clone(),
            open_ticks,
            close_ticks,
            instantiated: Rc::new(Cell::new(0)),
        }
    }
}

impl ViewTemplate for RecordingTemplate {
    fn instantiate(&self) -> Box<dyn ViewBehavior> {
        self.instantiated.set(self.instantiated.get() + 1);
        Box::new(RecordingBehavior {
            key: self.key.clone(),
            log: self.log.clone(),
            open_ticks: self.open_ticks,
            close_ticks: self.close_ticks,
        })
    }
}

/// Render root that records attach and bring-to-front calls.
pub struct RecordingRoot {
    pub log: Log,
}

impl ViewRoot for RecordingRoot {
    fn attach(&mut self, view: &ViewHandle) {
        self.log.borrow_mut().push(format!("root:attach:{}", view.key()));
    }

    fn bring_to_front(&mut self, view: &ViewHandle) {
        self.log.borrow_mut().push(format!("root:front:{}", view.key()));
    }
}

/// Loader that completes synchronously from a fixed template map.
pub struct MapLoader {
    pub templates: HashMap<ViewKey, Rc<dyn ViewTemplate>>,
    pub loads: Rc<Cell<usize>>,
    pub releases: Rc<RefCell<Vec<ViewKey>>>,
}

impl MapLoader {
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
            loads: Rc::new(Cell::new(0)),
            releases: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn register(&mut self, key: &str, template: impl ViewTemplate + 'static) {
        self.templates.insert(key.into(), Rc::new(template));
    }
}

impl ViewLoader for MapLoader {
    fn load(&mut self, key: &ViewKey, on_complete: LoadCallback, user_data: Option<UserData>) {
        self.loads.set(self.loads.get() + 1);
        on_complete(key, self.templates.get(key).cloned(), user_data);
    }

    fn release(&mut self, key: &ViewKey, _template: Rc<dyn ViewTemplate>) {
        self.releases.borrow_mut().push(key.clone());
    }
}

type PendingLoad = (ViewKey, LoadCallback, Option<UserData>);

/// Loader that parks every request until the test pumps it, modelling an
/// asset backend that completes on a later tick.
pub struct DeferredLoader {
    pub pending: Rc<RefCell<Vec<PendingLoad>>>,
}

impl DeferredLoader {
    pub fn new(pending: Rc<RefCell<Vec<PendingLoad>>>) -> Self {
        Self { pending }
    }
}

/// Complete every parked load against the given template map.
pub fn pump_loads(
    pending: &Rc<RefCell<Vec<PendingLoad>>>,
    templates: &HashMap<ViewKey, Rc<dyn ViewTemplate>>,
) {
    let drained: Vec<PendingLoad> = pending.borrow_mut().drain(..).collect();
    for (key, on_complete, user_data) in drained {
        on_complete(&key, templates.get(&key).cloned(), user_data);
    }
}

impl ViewLoader for DeferredLoader {
    fn load(&mut self, key: &ViewKey, on_complete: LoadCallback, user_data: Option<UserData>) {
        self.pending.borrow_mut().push((key.clone(), on_complete, user_data));
    }

    fn release(&mut self, _key: &ViewKey, _template: Rc<dyn ViewTemplate>) {}
}
