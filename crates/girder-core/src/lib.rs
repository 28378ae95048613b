//! Girder Core - a host for many isolated Rhai interpreters.
//!
//! This crate provides the building blocks of a Girder process:
//!
//! - **Messages** - Reference-counted, typed byte buffers
//! - **Mailboxes** - Double-buffered per-interpreter message queues
//! - **Interpreters** - One scripting VM each, run threaded or inline
//! - **Extensions** - Native plugins driven by an interpreter's frame loop
//! - **Core** - The registry tying interpreters, messages, files and the store together
//! - **VFS** - A search path of directories, archives and embedded trees
//! - **API** - The Rhai functions every interpreter gets
//!
//! # Architecture
//!
//! The host builds one [`Core`] and spawns interpreters from it. Each
//! interpreter loads the bootstrap program through the [`Vfs`], then calls
//! its `core_init(arg)` once and `core_update()` every frame until it is
//! stopped. Interpreters never share VM state; they talk by sending
//! [`Message`]s to each other's mailboxes or through the core's store.
//!
//! ```no_run
//! use girder_core::{Config, Core, ExecutionMode, FrameClock};
//!
//! let core = Core::new(Config::default());
//! let main = core.spawn_interpreter(Some("main"));
//! main.attach(Box::new(FrameClock::new())).unwrap();
//! main.start("app.rhai", ExecutionMode::Inline).unwrap();
//! ```

pub mod api;
pub mod cancel;
pub mod clock;
pub mod config;
pub mod core;
pub mod error;
pub mod extension;
pub mod interpreter;
pub mod mailbox;
pub mod message;
pub mod vfs;

pub use cancel::CancellationToken;
pub use clock::FrameClock;
pub use config::{Config, InterpreterSettings, VfsSettings, DEFAULT_BOOTSTRAP};
pub use crate::core::Core;
pub use error::{Error, Result};
pub use extension::{Extension, ExtensionInfo};
pub use interpreter::{ExecutionMode, Interpreter, InterpreterState};
pub use mailbox::{Inbox, Mailbox};
pub use message::{Message, MessageAllocator};
pub use vfs::{FileKind, MemoryTree, MountSource, Vfs};
