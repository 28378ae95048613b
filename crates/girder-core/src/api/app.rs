//! Application loading for the bootstrap program.
//!
//! The bootstrap program forwards its entry points to an application
//! script:
//!
//! ```rhai
//! fn core_init(arg) { app_load(arg); app_call("init"); }
//! fn core_update() { app_call("update"); }
//! ```
//!
//! `app_load` compiles the named script and runs its top level once.
//! `app_call` invokes one of its zero-argument functions, if it defines it.

use rhai::{CallFnOptions, Dynamic, Engine, EvalAltResult, NativeCallContext, Scope, AST};

use super::context::{self, App};
use super::script_error;

pub fn register(engine: &mut Engine) {
    engine.register_fn("app_load", app_load);
    engine.register_fn("app_call", app_call);
    engine.register_fn("app_loaded", app_loaded);
}

/// Whether the bootstrap program has loaded an application.
fn app_loaded() -> bool {
    match context::current() {
        Some(ctx) => {
            let loaded = ctx.app.borrow().is_some();
            loaded
        }
        None => false,
    }
}

/// Whether `ast` defines a script function `name` taking `arity` parameters.
pub fn defines(ast: &AST, name: &str, arity: usize) -> bool {
    ast.iter_functions()
        .any(|f| f.name == name && f.params.len() == arity)
}

/// Load the application script at `path` and run its top level.
fn app_load(ctx: NativeCallContext, path: &str) -> Result<bool, Box<EvalAltResult>> {
    let script = context::require()?;
    let source = script.core.load_file(path).map_err(script_error)?;
    let engine = ctx.engine();

    let mut ast = engine.compile(source.text())?;
    ast.set_source(path);

    let mut scope = Scope::new();
    engine.run_ast_with_scope(&mut scope, &ast)?;

    log::info!(
        "[app] loaded '{}' into interpreter {}",
        path,
        script.interpreter.id()
    );
    *script.app.borrow_mut() = Some(App { ast, scope });
    Ok(true)
}

/// Call the application's `name()` function. False when no application is
/// loaded or it does not define `name`.
fn app_call(ctx: NativeCallContext, name: &str) -> Result<bool, Box<EvalAltResult>> {
    let script = context::require()?;

    // Taken out for the duration of the call so the script may use the API freely.
    let Some(mut app) = script.app.borrow_mut().take() else {
        return Ok(false);
    };

    if !defines(&app.ast, name, 0) {
        *script.app.borrow_mut() = Some(app);
        return Ok(false);
    }

    let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
    let result =
        ctx.engine()
            .call_fn_with_options::<Dynamic>(options, &mut app.scope, &app.ast, name, ());

    // A reload during the call wins over the application we took out.
    let mut slot = script.app.borrow_mut();
    if slot.is_none() {
        *slot = Some(app);
    }
    drop(slot);

    result.map(|_| true)
}

#[cfg(test)]
mod tests {
    use super::super::testing::harness;
    use super::*;
    use crate::config::Config;
    use crate::core::Core;
    use crate::vfs::{MemoryTree, MountSource};

    fn core_with(files: &[(&str, &str)]) -> Core {
        let core = Core::bare(Config::default());
        let mut tree = MemoryTree::new();
        for (path, content) in files {
            tree.insert(path, content.as_bytes().to_vec()).unwrap();
        }
        core.vfs().mount(MountSource::Tree(tree), "", true).unwrap();
        core
    }

    #[test]
    fn test_defines_checks_arity() {
        let engine = Engine::new();
        let ast = engine.compile("fn a() {} fn b(x) {}").unwrap();
        assert!(defines(&ast, "a", 0));
        assert!(defines(&ast, "b", 1));
        assert!(!defines(&ast, "b", 0));
        assert!(!defines(&ast, "c", 0));
    }

    #[test]
    fn test_load_and_call() {
        let h = harness(core_with(&[(
            "app.rhai",
            r#"
                set_store("loaded", "yes");
                fn init() { set_store("init", "called"); }
            "#,
        )]));

        assert!(h.engine.eval::<bool>(r#"app_load("app.rhai")"#).unwrap());
        assert!(h.engine.eval::<bool>("app_loaded()").unwrap());
        assert!(h.engine.eval::<bool>(r#"app_call("init")"#).unwrap());
        assert!(!h.engine.eval::<bool>(r#"app_call("update")"#).unwrap());

        assert_eq!(h.core.store_value("loaded").unwrap().text(), "yes");
        assert_eq!(h.core.store_value("init").unwrap().text(), "called");
    }

    #[test]
    fn test_call_without_app_is_false() {
        let h = harness(core_with(&[]));
        assert!(!h.engine.eval::<bool>(r#"app_call("init")"#).unwrap());
        assert!(!h.engine.eval::<bool>("app_loaded()").unwrap());
    }

    #[test]
    fn test_load_errors_surface_to_caller() {
        let h = harness(core_with(&[("broken.rhai", "let = ;")]));
        assert!(h.engine.run(r#"app_load("missing.rhai")"#).is_err());
        assert!(h.engine.run(r#"app_load("broken.rhai")"#).is_err());
    }

    #[test]
    fn test_app_error_keeps_app_loaded() {
        let h = harness(core_with(&[("app.rhai", r#"fn update() { throw "boom"; }"#)]));
        h.engine.run(r#"app_load("app.rhai")"#).unwrap();
        assert!(h.engine.run(r#"app_call("update")"#).is_err());
        assert!(h.engine.eval::<bool>("app_loaded()").unwrap());
    }
}
