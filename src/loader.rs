use std::rc::Rc;

use crate::view::{UserData, ViewKey, ViewTemplate};

/// Completion callback handed to [`ViewLoader::load`].
///
/// Receives the key and user data the load was issued with, plus the
/// loaded template. `None` signals a failed load, which is fatal for the
/// open request that triggered it; the engine does not retry.
pub type LoadCallback = Box<dyn FnOnce(&ViewKey, Option<Rc<dyn ViewTemplate>>, Option<UserData>)>;

/// Asset-loading collaborator that turns keys into view templates.
///
/// Implementations must invoke the callback exactly once per `load` call,
/// with the same key and user data they received. Completion may happen
/// synchronously inside `load` or on a later tick; the engine handles
/// both.
pub trait ViewLoader {
    fn load(&mut self, key: &ViewKey, on_complete: LoadCallback, user_data: Option<UserData>);

    /// Release a template previously produced for `key`, for loaders that
    /// track asset lifetimes.
    fn release(&mut self, key: &ViewKey, template: Rc<dyn ViewTemplate>);
}
