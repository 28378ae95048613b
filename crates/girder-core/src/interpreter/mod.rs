//! Script interpreters.
//!
//! An [`Interpreter`] is one isolated scripting VM with its own mailbox and
//! its own list of attached extensions. It moves through
//! `Created -> Running -> Stopped` exactly once.
//!
//! Handles are cheap to clone and may be used from any thread. The VM
//! itself lives on whichever thread runs the loop (see [`ExecutionMode`]).

mod run_loop;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crate::cancel::CancellationToken;
use crate::core::WeakCore;
use crate::error::{Error, Result};
use crate::extension::{Extension, ExtensionInfo};
use crate::mailbox::{self, Inbox, Mailbox};
use crate::message::Message;

use run_loop::RunLoop;

/// Lifecycle state of an interpreter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterpreterState {
    Created,
    Running,
    Stopped,
}

/// Where the run loop executes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// On a dedicated, named OS thread.
    #[default]
    Threaded,
    /// On the caller's thread; `start` returns when the loop exits.
    Inline,
}

struct Lifecycle {
    state: InterpreterState,
    argument: Option<String>,
    extensions: Vec<Box<dyn Extension>>,
    extension_info: Vec<ExtensionInfo>,
    inbox: Option<Inbox>,
    thread: Option<JoinHandle<Result<()>>>,
}

struct InterpreterInner {
    id: usize,
    name: Option<String>,
    core: WeakCore,
    lifecycle: Mutex<Lifecycle>,
    token: CancellationToken,
    mailbox: Mailbox,
}

/// Shared handle to one interpreter.
#[derive(Clone)]
pub struct Interpreter {
    inner: Arc<InterpreterInner>,
}

impl Interpreter {
    pub(crate) fn new(id: usize, name: Option<String>, core: WeakCore) -> Self {
        let (mailbox, inbox) = mailbox::mailbox();
        Self {
            inner: Arc::new(InterpreterInner {
                id,
                name,
                core,
                lifecycle: Mutex::new(Lifecycle {
                    state: InterpreterState::Created,
                    argument: None,
                    extensions: Vec::new(),
                    extension_info: Vec::new(),
                    inbox: Some(inbox),
                    thread: None,
                }),
                token: CancellationToken::new(),
                mailbox,
            }),
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.inner
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Registry index of this interpreter.
    pub fn id(&self) -> usize {
        self.inner.id
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    pub fn state(&self) -> InterpreterState {
        self.lifecycle().state
    }

    pub(crate) fn set_state(&self, state: InterpreterState) {
        self.lifecycle().state = state;
    }

    /// The argument `start` was called with.
    pub fn argument(&self) -> Option<String> {
        self.lifecycle().argument.clone()
    }

    /// The stop token observed by the run loop.
    pub fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    /// Attach a native extension. Only allowed before `start`.
    ///
    /// On failure the extension is dropped without any hook being called.
    pub fn attach(&self, extension: Box<dyn Extension>) -> Result<()> {
        let mut lifecycle = self.lifecycle();
        if lifecycle.state != InterpreterState::Created {
            log::warn!(
                "[interp {}] cannot attach extension '{}' after start",
                self.id(),
                extension.name()
            );
            return Err(Error::AlreadyRunning { id: self.id() });
        }

        log::debug!(
            "[interp {}] attached extension '{}' {}",
            self.id(),
            extension.name(),
            extension.version()
        );
        lifecycle.extension_info.push(ExtensionInfo::of(extension.as_ref()));
        lifecycle.extensions.push(extension);
        Ok(())
    }

    /// Identities of the attached extensions, in attachment order.
    pub fn extensions(&self) -> Vec<ExtensionInfo> {
        self.lifecycle().extension_info.clone()
    }

    /// Queue a message for the next `fetch_messages` of this interpreter.
    ///
    /// Returns false once the run loop has exited; no reference is kept.
    pub fn send_message(&self, message: &Message) -> bool {
        let delivered = self.inner.mailbox.send(message);
        if !delivered {
            log::debug!(
                "[interp {}] stopped, dropping message of type {}",
                self.inner.id,
                message.message_type()
            );
        }
        delivered
    }

    /// Messages sent but not fetched yet.
    pub fn pending_messages(&self) -> usize {
        self.inner.mailbox.pending()
    }

    /// Run the interpreter.
    ///
    /// Threaded mode returns as soon as the thread is spawned; inline mode
    /// returns the loop's result once it exits.
    pub fn start(&self, argument: &str, mode: ExecutionMode) -> Result<()> {
        let core = self.inner.core.upgrade().ok_or_else(|| {
            Error::NotFound(format!("core for interpreter {}", self.id()))
        })?;

        let (extensions, inbox) = {
            let mut lifecycle = self.lifecycle();
            if lifecycle.state != InterpreterState::Created {
                log::warn!("[interp {}] start called while {:?}", self.id(), lifecycle.state);
                return Err(Error::AlreadyRunning { id: self.id() });
            }
            let inbox = match lifecycle.inbox.take() {
                Some(inbox) => inbox,
                None => return Err(Error::AlreadyRunning { id: self.id() }),
            };
            lifecycle.state = InterpreterState::Running;
            lifecycle.argument = Some(argument.to_string());
            (std::mem::take(&mut lifecycle.extensions), inbox)
        };

        log::info!(
            "[interp {}] starting ({:?}) with argument '{}'",
            self.id(),
            mode,
            argument
        );
        let run_loop = RunLoop::new(self.clone(), core, extensions, inbox, argument.to_string());

        match mode {
            ExecutionMode::Inline => run_loop.run(),
            ExecutionMode::Threaded => {
                let thread_name = match self.name() {
                    Some(name) => format!("girder-{}", name),
                    None => format!("girder-{}", self.id()),
                };
                let spawned = thread::Builder::new()
                    .name(thread_name.clone())
                    .spawn(move || run_loop.run());

                match spawned {
                    Ok(handle) => {
                        self.lifecycle().thread = Some(handle);
                        Ok(())
                    }
                    Err(e) => {
                        log::error!("[interp {}] failed to spawn thread: {}", self.id(), e);
                        self.set_state(InterpreterState::Stopped);
                        Err(Error::io(thread_name, e))
                    }
                }
            }
        }
    }

    /// Ask the run loop to exit at the top of its next iteration.
    pub fn stop(&self) {
        log::debug!("[interp {}] stop requested", self.id());
        self.inner.token.cancel();
    }

    /// Wait for a threaded run loop to finish and return its result.
    pub fn join(&self) -> Result<()> {
        let handle = self.lifecycle().thread.take();
        match handle {
            Some(handle) => handle.join().map_err(|_| Error::Panicked(self.id()))?,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
