//! The interpreter registry.
//!
//! [`Core`] owns everything shared between interpreters: the interpreter
//! collection, the message allocator, the virtual filesystem and the
//! process-wide key/value store. It is constructed explicitly by the host
//! and cloned wherever it is needed; clones share the same state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::interpreter::Interpreter;
use crate::message::{Message, MessageAllocator};
use crate::vfs::{self, FileKind, MountSource, Vfs};

pub(crate) struct CoreInner {
    config: Config,
    interpreters: Mutex<Vec<Interpreter>>,
    allocator: MessageAllocator,
    vfs: Vfs,
    store: RwLock<HashMap<String, Message>>,
}

/// Shared handle to the interpreter registry.
#[derive(Clone)]
pub struct Core {
    inner: Arc<CoreInner>,
}

/// Non-owning handle held by interpreters, so the registry and its
/// interpreters do not keep each other alive.
#[derive(Clone)]
pub(crate) struct WeakCore(Weak<CoreInner>);

impl WeakCore {
    pub(crate) fn upgrade(&self) -> Option<Core> {
        self.0.upgrade().map(|inner| Core { inner })
    }
}

impl Default for Core {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Core {
    /// Build a registry and apply the configured mounts.
    ///
    /// Mount and write-directory failures are logged and skipped.
    pub fn new(config: Config) -> Self {
        let vfs = Vfs::new();
        apply_vfs_settings(&vfs, &config);

        Self {
            inner: Arc::new(CoreInner {
                config,
                interpreters: Mutex::new(Vec::new()),
                allocator: MessageAllocator::new(),
                vfs,
                store: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// A registry with an empty virtual filesystem and no write directory.
    pub fn bare(mut config: Config) -> Self {
        config.vfs.mount_base_dir = false;
        config.vfs.directories.clear();
        config.vfs.archives.clear();
        config.vfs.write_dir = None;
        Self::new(config)
    }

    pub(crate) fn downgrade(&self) -> WeakCore {
        WeakCore(Arc::downgrade(&self.inner))
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn vfs(&self) -> &Vfs {
        &self.inner.vfs
    }

    pub fn allocator(&self) -> &MessageAllocator {
        &self.inner.allocator
    }

    fn registry(&self) -> MutexGuard<'_, Vec<Interpreter>> {
        self.inner
            .interpreters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // === Interpreters ===

    /// Create and register a new interpreter with the next sequential id.
    pub fn spawn_interpreter(&self, name: Option<&str>) -> Interpreter {
        let mut registry = self.registry();
        let interpreter = Interpreter::new(registry.len(), name.map(str::to_string), self.downgrade());
        registry.push(interpreter.clone());
        log::info!(
            "[core] spawned interpreter {} ({})",
            interpreter.id(),
            interpreter.name().unwrap_or("unnamed")
        );
        interpreter
    }

    pub fn interpreter(&self, id: usize) -> Result<Interpreter> {
        self.registry()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("interpreter {}", id)))
    }

    pub fn named_interpreter(&self, name: &str) -> Result<Interpreter> {
        self.registry()
            .iter()
            .find(|interpreter| interpreter.name() == Some(name))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("interpreter '{}'", name)))
    }

    pub fn interpreter_count(&self) -> usize {
        self.registry().len()
    }

    /// Snapshot of every registered interpreter.
    pub fn interpreters(&self) -> Vec<Interpreter> {
        self.registry().clone()
    }

    /// Queue `message` in the target's mailbox.
    ///
    /// `Ok(false)` when the target has already stopped, `NotFound` when it
    /// does not exist. The caller's reference is untouched either way.
    pub fn dispatch_message(&self, target: usize, message: &Message) -> Result<bool> {
        match self.interpreter(target) {
            Ok(interpreter) => Ok(interpreter.send_message(message)),
            Err(e) => {
                log::debug!("[core] dropping message for unknown interpreter {}", target);
                Err(e)
            }
        }
    }

    /// Ask every interpreter to stop. Does not wait.
    pub fn stop_all_interpreters(&self) {
        for interpreter in self.interpreters() {
            interpreter.stop();
        }
    }

    /// Wait for every threaded interpreter to leave its run loop.
    pub fn join_all(&self) {
        for interpreter in self.interpreters() {
            if let Err(e) = interpreter.join() {
                log::error!("[core] interpreter {} ended with error: {}", interpreter.id(), e);
            }
        }
    }

    // === Messages ===

    pub fn allocate_message(&self, length: usize) -> Result<Message> {
        self.inner.allocator.allocate(length)
    }

    pub fn copy_message(&self, message: &Message) -> Result<Message> {
        self.inner.allocator.copy(message)
    }

    // === Files ===

    /// Load a file through the virtual filesystem.
    pub fn load_file(&self, path: &str) -> Result<Message> {
        match self.inner.vfs.read(path) {
            Ok(bytes) => Ok(self.inner.allocator.adopt(0, bytes)),
            Err(e) => {
                match &e {
                    Error::NotFound(_) => {
                        log::error!("[vfs] Error opening file '{}': does not exist", path)
                    }
                    other => log::error!("[vfs] Cannot load '{}': {}", path, other),
                }
                Err(e)
            }
        }
    }

    /// Save a message's bytes below the write directory. The type tag is not stored.
    pub fn save_file(&self, path: &str, message: &Message) -> Result<()> {
        self.inner.vfs.write(path, message.data()).map_err(|e| {
            log::error!("[vfs] Cannot save '{}': {}", path, e);
            e
        })
    }

    pub fn check_file(&self, path: &str) -> FileKind {
        self.inner.vfs.kind(path).unwrap_or_else(|e| {
            log::warn!("[vfs] check_file '{}': {}", path, e);
            FileKind::Absent
        })
    }

    pub fn list_directory(&self, path: &str) -> Result<Vec<String>> {
        self.inner.vfs.list(path).map_err(|e| {
            log::error!("[vfs] Cannot list directory '{}': {}", path, e);
            e
        })
    }

    /// Where a virtual path is actually read from.
    pub fn real_dir(&self, path: &str) -> Option<String> {
        self.inner.vfs.real_dir(path)
    }

    /// Load a real file, bypassing the virtual filesystem.
    pub fn load_file_raw(&self, path: &Path) -> Result<Message> {
        vfs::read_raw(path)
            .map(|bytes| self.inner.allocator.adopt(0, bytes))
            .map_err(|e| {
                log::error!("[vfs] Unable to open file '{}': {}", path.display(), e);
                e
            })
    }

    /// Save to a real path, bypassing the write directory.
    pub fn save_file_raw(&self, path: &Path, message: &Message) -> Result<()> {
        vfs::write_raw(path, message.data()).map_err(|e| {
            log::error!("[vfs] Unable to write file '{}': {}", path.display(), e);
            e
        })
    }

    // === Store ===

    pub fn store_value(&self, key: &str) -> Result<Message> {
        self.inner
            .store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("store key '{}'", key)))
    }

    /// Install `value` under `key`. Returns true when a previous value was replaced.
    pub fn set_store_value(&self, key: &str, value: Message) -> bool {
        let previous = self
            .inner
            .store
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        // The old value is released only now, after the new one is visible.
        previous.is_some()
    }

    /// Store a string as a type-0 message.
    pub fn set_store_text(&self, key: &str, text: &str) -> Result<bool> {
        let message = self.inner.allocator.allocate_text(0, text)?;
        Ok(self.set_store_value(key, message))
    }

    pub fn remove_store_value(&self, key: &str) -> Option<Message> {
        self.inner
            .store
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    /// Sorted store keys.
    pub fn store_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .inner
            .store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

impl std::fmt::Debug for Core {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Core")
            .field("interpreters", &self.interpreter_count())
            .field("allocator", &self.inner.allocator)
            .field("vfs", &self.inner.vfs)
            .finish_non_exhaustive()
    }
}

fn apply_vfs_settings(vfs: &Vfs, config: &Config) {
    let settings = &config.vfs;
    let base_dir = settings
        .base_dir
        .clone()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    // Prepended in reverse so the first listed archive is searched first.
    for archive in settings.archives.iter().rev() {
        if let Err(e) = vfs.mount(MountSource::Archive(archive.clone()), "", false) {
            log::error!("[vfs] Cannot mount archive {}: {}", archive.display(), e);
        }
    }

    if settings.mount_base_dir {
        if let Err(e) = vfs.mount(MountSource::Directory(base_dir.clone()), "", true) {
            log::error!("[vfs] Cannot mount base dir {}: {}", base_dir.display(), e);
        }
    }

    for dir in &settings.directories {
        if let Err(e) = vfs.mount(MountSource::Directory(dir.clone()), "", true) {
            log::error!("[vfs] Cannot mount {}: {}", dir.display(), e);
        }
    }

    if let Some(write_dir) = &settings.write_dir {
        let write_dir = if write_dir.is_absolute() {
            write_dir.clone()
        } else {
            base_dir.join(write_dir)
        };
        match vfs.set_write_dir(&write_dir) {
            Ok(()) if settings.mount_write_dir => {
                if let Err(e) = vfs.mount(
                    MountSource::Directory(write_dir.clone()),
                    &settings.write_mount_point,
                    true,
                ) {
                    log::error!("[vfs] Cannot mount write dir: {}", e);
                }
            }
            Ok(()) => {}
            Err(e) => log::error!("[vfs] setWriteDir failed: {}", e),
        }
    }
}
