//! The per-interpreter frame loop.

use std::thread;
use std::time::{Duration, Instant};

use rhai::{CallFnOptions, Dynamic, Engine, FuncArgs, Scope, AST};

use super::{Interpreter, InterpreterState};
use crate::api::{self, context, ScriptContext};
use crate::core::Core;
use crate::error::{Error, Result};
use crate::extension::Extension;
use crate::mailbox::Inbox;

/// Marks the interpreter Stopped when the loop exits, including by panic.
struct StopOnExit(Interpreter);

impl Drop for StopOnExit {
    fn drop(&mut self) {
        self.0.set_state(InterpreterState::Stopped);
    }
}

pub(super) struct RunLoop {
    interpreter: Interpreter,
    core: Core,
    extensions: Vec<Box<dyn Extension>>,
    inbox: Inbox,
    argument: String,
}

impl RunLoop {
    pub(super) fn new(
        interpreter: Interpreter,
        core: Core,
        extensions: Vec<Box<dyn Extension>>,
        inbox: Inbox,
        argument: String,
    ) -> Self {
        Self {
            interpreter,
            core,
            extensions,
            inbox,
            argument,
        }
    }

    pub(super) fn run(self) -> Result<()> {
        let RunLoop {
            interpreter,
            core,
            mut extensions,
            inbox,
            argument,
        } = self;
        let id = interpreter.id();
        let _stopped = StopOnExit(interpreter.clone());
        let settings = core.config().interpreter.clone();

        let mut engine = api::create_engine(&core, &settings);
        for extension in &extensions {
            extension.register(&mut engine);
        }

        // Dropping the guard releases the inbox and every fetched message.
        let _context = context::install(ScriptContext::new(core.clone(), interpreter.clone(), inbox));

        let (ast, mut scope) = match bootstrap(&engine, &core, &settings.bootstrap) {
            Ok(program) => program,
            Err(e) => {
                log::error!("[interp {}] {}", id, e);
                return Err(e);
            }
        };

        for extension in extensions.iter_mut() {
            if let Err(e) = extension.init(&interpreter) {
                log::error!(
                    "[interp {}] extension '{}' failed to initialise: {:#}",
                    id,
                    extension.name(),
                    e
                );
            }
        }

        call_entry(&engine, &mut scope, &ast, id, "core_init", (argument,));

        let dt = settings.frame_delta();
        let frame = Duration::from_secs_f64(dt);
        while !interpreter.token().is_cancelled() {
            let frame_start = Instant::now();

            for extension in extensions.iter_mut() {
                extension.update(dt);
            }
            call_entry(&engine, &mut scope, &ast, id, "core_update", ());

            if settings.pace_frames {
                if let Some(rest) = frame.checked_sub(frame_start.elapsed()) {
                    thread::sleep(rest);
                }
            }
        }

        interpreter.set_state(InterpreterState::Stopped);
        for extension in extensions.iter_mut() {
            extension.shutdown();
        }
        log::info!("[interp {}] stopped", id);
        Ok(())
    }
}

/// Load, compile and run the bootstrap program's top level.
fn bootstrap(engine: &Engine, core: &Core, path: &str) -> Result<(AST, Scope<'static>)> {
    let source = core
        .vfs()
        .read(path)
        .map_err(|e| Error::Bootstrap(format!("cannot load '{}': {}", path, e)))?;
    let source = String::from_utf8(source)
        .map_err(|_| Error::Bootstrap(format!("'{}' is not valid UTF-8", path)))?;

    let mut ast = engine
        .compile(&source)
        .map_err(|e| Error::Bootstrap(format!("{}: {}", path, e)))?;
    ast.set_source(path);

    let mut scope = Scope::new();
    engine
        .run_ast_with_scope(&mut scope, &ast)
        .map_err(|e| Error::Bootstrap(format!("{}: {}", path, e)))?;

    log::debug!("[bootstrap] loaded '{}'", path);
    Ok((ast, scope))
}

/// Protected call of a bootstrap entry point. Errors, including an entry
/// point the bootstrap never defined, are logged and never fatal.
fn call_entry(
    engine: &Engine,
    scope: &mut Scope,
    ast: &AST,
    id: usize,
    name: &str,
    args: impl FuncArgs,
) {
    let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
    if let Err(e) = engine.call_fn_with_options::<Dynamic>(options, scope, ast, name, args) {
        log::error!("[interp {}] {}: {}", id, name, e);
    }
}
