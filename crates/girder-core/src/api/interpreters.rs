//! Interpreter and extension queries.

use rhai::{Engine, EvalAltResult};

use super::{context, to_index};
use crate::extension::ExtensionInfo;
use crate::interpreter::ExecutionMode;
use crate::message::Message;

pub fn register(engine: &mut Engine) {
    engine.register_fn("interpreter_id", interpreter_id);
    engine.register_fn("interpreter_name", interpreter_name);
    engine.register_fn("interpreter_count", interpreter_count);
    engine.register_fn("find_interpreter", find_interpreter);
    engine.register_fn("spawn_interpreter", spawn_interpreter);
    engine.register_fn("start_interpreter", start_interpreter);
    engine.register_fn("stop_interpreter", stop_interpreter);
    engine.register_fn("stop", stop);
    engine.register_fn("stop_all", stop_all);
    engine.register_fn("send_message", send_message);

    engine.register_fn("extension_count", extension_count);
    engine.register_fn("extension_name", |index: i64| {
        extension_field(index, |info| info.name)
    });
    engine.register_fn("extension_version", |index: i64| {
        extension_field(index, |info| info.version)
    });
    engine.register_fn("extension_declarations", |index: i64| {
        extension_field(index, |info| info.declarations)
    });
}

fn interpreter_id() -> Result<i64, Box<EvalAltResult>> {
    Ok(context::require()?.interpreter.id() as i64)
}

/// Name of the calling interpreter; empty when unnamed.
fn interpreter_name() -> Result<String, Box<EvalAltResult>> {
    let ctx = context::require()?;
    Ok(ctx.interpreter.name().unwrap_or_default().to_string())
}

fn interpreter_count() -> Result<i64, Box<EvalAltResult>> {
    Ok(context::require()?.core.interpreter_count() as i64)
}

/// Id of the interpreter called `name`, or -1.
fn find_interpreter(name: &str) -> Result<i64, Box<EvalAltResult>> {
    let ctx = context::require()?;
    Ok(ctx
        .core
        .named_interpreter(name)
        .map(|interp| interp.id() as i64)
        .unwrap_or(-1))
}

/// Register a new interpreter. An empty name leaves it unnamed.
fn spawn_interpreter(name: &str) -> Result<i64, Box<EvalAltResult>> {
    let ctx = context::require()?;
    let name = if name.is_empty() { None } else { Some(name) };
    Ok(ctx.core.spawn_interpreter(name).id() as i64)
}

/// Start another interpreter on its own thread.
fn start_interpreter(id: i64, argument: &str) -> Result<bool, Box<EvalAltResult>> {
    let ctx = context::require()?;
    let target = match ctx.core.interpreter(to_index(id)) {
        Ok(target) => target,
        Err(e) => {
            log::warn!("[api] start_interpreter: {}", e);
            return Ok(false);
        }
    };
    Ok(target.start(argument, ExecutionMode::Threaded).is_ok())
}

fn stop_interpreter(id: i64) -> Result<bool, Box<EvalAltResult>> {
    let ctx = context::require()?;
    match ctx.core.interpreter(to_index(id)) {
        Ok(target) => {
            target.stop();
            Ok(true)
        }
        Err(_) => Ok(false),
    }
}

/// Stop the calling interpreter after the current frame.
fn stop() -> Result<(), Box<EvalAltResult>> {
    context::require()?.interpreter.stop();
    Ok(())
}

fn stop_all() -> Result<(), Box<EvalAltResult>> {
    context::require()?.core.stop_all_interpreters();
    Ok(())
}

/// Queue `msg` for interpreter `id`. False when there is no such interpreter
/// or it has stopped.
fn send_message(id: i64, msg: Message) -> Result<bool, Box<EvalAltResult>> {
    let ctx = context::require()?;
    Ok(matches!(
        ctx.core.dispatch_message(to_index(id), &msg),
        Ok(true)
    ))
}

fn extension_count() -> Result<i64, Box<EvalAltResult>> {
    Ok(context::require()?.interpreter.extensions().len() as i64)
}

/// One field of extension `index` of the calling interpreter; empty when out of range.
fn extension_field(
    index: i64,
    field: impl FnOnce(ExtensionInfo) -> String,
) -> Result<String, Box<EvalAltResult>> {
    let ctx = context::require()?;
    Ok(ctx
        .interpreter
        .extensions()
        .into_iter()
        .nth(to_index(index))
        .map(field)
        .unwrap_or_default())
}
