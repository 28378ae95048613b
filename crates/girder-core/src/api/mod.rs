//! Girder API for Rhai scripting.
//!
//! All functions reach the host through the thread-local [`ScriptContext`]
//! installed by the interpreter's run loop.
//!
//! # Usage
//!
//! 1. Build an engine with [`create_engine`]
//! 2. Install a context with [`context::install`]
//! 3. Run scripts that call the registered functions

pub mod app;
pub mod context;
pub mod files;
pub mod interpreters;
pub mod message;
pub mod resolver;
pub mod store;

pub use context::ScriptContext;
pub use resolver::VfsModuleResolver;

use rhai::{Engine, EvalAltResult};

use crate::config::InterpreterSettings;
use crate::core::Core;

/// Register every Girder API function with a Rhai engine.
///
/// This registers:
/// - The `Message` type and message constructors
/// - Mailbox access (fetch_messages, get_message)
/// - Interpreter and extension queries
/// - Virtual filesystem access
/// - The shared store
/// - Application loading helpers for the bootstrap program
/// - `log_message`
pub fn register_api(engine: &mut Engine) {
    message::register(engine);
    interpreters::register(engine);
    files::register(engine);
    store::register(engine);
    app::register(engine);

    engine.register_fn("log_message", log_message);
}

/// Create a Rhai engine with the Girder API registered and `import`
/// resolved through the core's virtual filesystem.
pub fn create_engine(core: &Core, settings: &InterpreterSettings) -> Engine {
    let mut engine = Engine::new();

    engine.set_max_expr_depths(settings.max_expr_depth, settings.max_expr_depth);
    engine.set_max_call_levels(settings.max_call_levels);

    // print() and debug() go to the log instead of stdout
    engine.on_print(|text| {
        log::info!("[script] {}", text);
    });

    engine.on_debug(|text, source, pos| {
        let loc = match (source, pos) {
            (Some(src), pos) if !pos.is_none() => format!(" ({}:{})", src, pos),
            (Some(src), _) => format!(" ({})", src),
            (None, pos) if !pos.is_none() => format!(" ({})", pos),
            _ => String::new(),
        };
        log::debug!("[script]{} {}", loc, text);
    });

    engine.set_module_resolver(VfsModuleResolver::new(core.clone()));

    register_api(&mut engine);

    engine
}

/// Script-side logging: 0 critical, 1 error, 2 warning, 3 info, 4+ debug.
fn log_message(level: i64, text: &str) {
    match level {
        i64::MIN..=0 => log::error!("[script] CRITICAL: {}", text),
        1 => log::error!("[script] {}", text),
        2 => log::warn!("[script] {}", text),
        3 => log::info!("[script] {}", text),
        _ => log::debug!("[script] {}", text),
    }
}

/// Turn a host error into a script runtime error.
pub(crate) fn script_error(e: impl std::fmt::Display) -> Box<EvalAltResult> {
    e.to_string().into()
}

/// Convert a script integer to an index; negative values never match.
pub(crate) fn to_index(value: i64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}
