//! Module resolution through the virtual filesystem.
//!
//! `import "lib/util" as util;` loads `lib/util.rhai` from the first mount
//! that has it. Paths starting with `./` or `../` are relative to the
//! importing script.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use rhai::{Engine, EvalAltResult, Module, ModuleResolver, Position, Scope, Shared};

use crate::core::Core;
use crate::vfs::normalize;

const SCRIPT_EXTENSION: &str = "rhai";

/// Resolves `import` statements against a core's virtual filesystem.
///
/// Compiled modules are cached per resolver, so each engine evaluates a
/// module at most once.
pub struct VfsModuleResolver {
    core: Core,
    cache: Mutex<HashMap<String, Shared<Module>>>,
}

impl VfsModuleResolver {
    pub fn new(core: Core) -> Self {
        Self {
            core,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Virtual file path for an import, resolved against the importing source.
    pub fn file_path(source: Option<&str>, path: &str) -> String {
        let mut file = if path.starts_with("./") || path.starts_with("../") {
            let dir = source
                .and_then(|s| s.rsplit_once('/').map(|(dir, _)| dir))
                .unwrap_or("");
            collapse(&format!("{}/{}", dir, path))
        } else {
            path.to_string()
        };

        let has_extension = file
            .rsplit('/')
            .next()
            .is_some_and(|name| name.contains('.'));
        if !has_extension {
            file.push('.');
            file.push_str(SCRIPT_EXTENSION);
        }
        file
    }
}

/// Fold `.` and `..` components; `..` above the root is kept so that
/// normalisation rejects it later.
fn collapse(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." if parts.last().is_some_and(|p| *p != "..") => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

impl ModuleResolver for VfsModuleResolver {
    fn resolve(
        &self,
        engine: &Engine,
        source: Option<&str>,
        path: &str,
        pos: Position,
    ) -> Result<Shared<Module>, Box<EvalAltResult>> {
        let file = normalize(&Self::file_path(source, path))
            .map_err(|_| Box::new(EvalAltResult::ErrorModuleNotFound(path.to_string(), pos)))?;

        if let Some(module) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&file)
        {
            return Ok(module.clone());
        }

        let bytes = self.core.vfs().read(&file).map_err(|e| {
            log::debug!("[import] '{}': {}", file, e);
            Box::new(EvalAltResult::ErrorModuleNotFound(path.to_string(), pos))
        })?;
        let script = String::from_utf8_lossy(&bytes);

        let mut ast = engine
            .compile(script.as_ref())
            .map_err(|e| Box::new(EvalAltResult::ErrorInModule(path.to_string(), e.into(), pos)))?;
        ast.set_source(file.as_str());

        let module = Module::eval_ast_as_new(Scope::new(), &ast, engine)
            .map_err(|e| Box::new(EvalAltResult::ErrorInModule(path.to_string(), e, pos)))?;
        let module: Shared<Module> = module.into();

        log::debug!("[import] loaded module '{}'", file);
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(file, module.clone());
        Ok(module)
    }
}
