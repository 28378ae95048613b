//! Native extension contract.
//!
//! An extension is a native plugin attached to an interpreter before it
//! starts. The interpreter owns its extensions for its whole lifetime and
//! drives them from the run loop, always in attachment order:
//!
//! 1. [`Extension::register`] while the engine is being built
//! 2. [`Extension::init`] after the bootstrap program ran
//! 3. [`Extension::update`] once per frame, before the script's update
//! 4. [`Extension::shutdown`] after the loop exits

use rhai::Engine;

use crate::interpreter::Interpreter;

/// Lifecycle hooks implemented by native extension modules.
pub trait Extension: Send {
    /// Stable identifier of the extension.
    fn name(&self) -> &str;

    fn version(&self) -> &str {
        "0.0.0"
    }

    /// Declaration text consumed by the script binding layer.
    ///
    /// Opaque to the host; it is only exposed to scripts.
    fn declarations(&self) -> &str {
        ""
    }

    /// Bind native functions into the interpreter's engine.
    fn register(&self, _engine: &mut Engine) {}

    /// One-time setup. A returned error is logged and the extension keeps
    /// receiving updates in whatever state it is left in.
    fn init(&mut self, owner: &Interpreter) -> anyhow::Result<()>;

    /// Per-frame hook. Blocking here stalls the whole interpreter.
    fn update(&mut self, dt: f64);

    /// Release everything acquired in `init`.
    fn shutdown(&mut self);
}

/// Identity of an attached extension, readable from any thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtensionInfo {
    pub name: String,
    pub version: String,
    pub declarations: String,
}

impl ExtensionInfo {
    pub fn of(extension: &dyn Extension) -> Self {
        Self {
            name: extension.name().to_string(),
            version: extension.version().to_string(),
            declarations: extension.declarations().to_string(),
        }
    }
}
