//! Per-thread script context.
//!
//! The run loop installs a [`ScriptContext`] on its thread before the
//! bootstrap program runs. Every script API function reaches the core, its
//! own interpreter and its inbox through it, so none of them need to be
//! handed state explicitly.

use std::cell::RefCell;
use std::rc::Rc;

use rhai::{EvalAltResult, Scope, AST};

use crate::core::Core;
use crate::interpreter::Interpreter;
use crate::mailbox::Inbox;

/// An application script loaded by the bootstrap program.
pub(crate) struct App {
    pub ast: AST,
    pub scope: Scope<'static>,
}

/// State visible to script API functions on one interpreter thread.
pub struct ScriptContext {
    pub(crate) core: Core,
    pub(crate) interpreter: Interpreter,
    pub(crate) inbox: RefCell<Inbox>,
    pub(crate) app: RefCell<Option<App>>,
}

impl ScriptContext {
    pub fn new(core: Core, interpreter: Interpreter, inbox: Inbox) -> Self {
        Self {
            core,
            interpreter,
            inbox: RefCell::new(inbox),
            app: RefCell::new(None),
        }
    }
}

thread_local! {
    static CONTEXT: RefCell<Option<Rc<ScriptContext>>> = RefCell::new(None);
}

/// Restores the previously installed context when dropped.
pub struct ContextGuard {
    previous: Option<Rc<ScriptContext>>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        let current = CONTEXT.with(|c| std::mem::replace(&mut *c.borrow_mut(), previous));
        // Released outside the borrow; dropping may run message destructors.
        drop(current);
    }
}

/// Install `context` for the current thread until the guard is dropped.
pub fn install(context: ScriptContext) -> ContextGuard {
    let previous = CONTEXT.with(|c| c.borrow_mut().replace(Rc::new(context)));
    ContextGuard { previous }
}

/// The context of the interpreter running on this thread, if any.
pub fn current() -> Option<Rc<ScriptContext>> {
    CONTEXT.with(|c| c.borrow().clone())
}

/// Like [`current`], but a script error when called outside an interpreter.
pub(crate) fn require() -> Result<Rc<ScriptContext>, Box<EvalAltResult>> {
    current().ok_or_else(|| "girder API used outside of a running interpreter".into())
}
