//! Virtual filesystem access.
//!
//! Failures are logged by the core and reported to scripts as `()` or
//! `false`, so a missing file never aborts the calling function.

use rhai::{Array, Dynamic, Engine, EvalAltResult};

use super::context;
use crate::message::Message;

pub fn register(engine: &mut Engine) {
    engine.register_fn("load_file", load_file);
    engine.register_fn("load_text", load_text);
    engine.register_fn("save_file", save_file);
    engine.register_fn("save_text", save_text);
    engine.register_fn("check_file", check_file);
    engine.register_fn("list_directory", list_directory);
}

/// File contents as a type-0 message, or `()`.
fn load_file(path: &str) -> Result<Dynamic, Box<EvalAltResult>> {
    let ctx = context::require()?;
    Ok(match ctx.core.load_file(path) {
        Ok(msg) => Dynamic::from(msg),
        Err(_) => Dynamic::UNIT,
    })
}

/// File contents as a string, or `()`.
fn load_text(path: &str) -> Result<Dynamic, Box<EvalAltResult>> {
    let ctx = context::require()?;
    Ok(match ctx.core.load_file(path) {
        Ok(msg) => msg.text().into(),
        Err(_) => Dynamic::UNIT,
    })
}

fn save_file(path: &str, msg: Message) -> Result<bool, Box<EvalAltResult>> {
    let ctx = context::require()?;
    Ok(ctx.core.save_file(path, &msg).is_ok())
}

fn save_text(path: &str, text: &str) -> Result<bool, Box<EvalAltResult>> {
    let ctx = context::require()?;
    let saved = ctx
        .core
        .allocator()
        .allocate_text(0, text)
        .and_then(|msg| ctx.core.save_file(path, &msg));
    Ok(saved.is_ok())
}

/// 0 absent, 1 file, 2 directory.
fn check_file(path: &str) -> Result<i64, Box<EvalAltResult>> {
    Ok(context::require()?.core.check_file(path).code())
}

/// Sorted entry names; empty when the directory does not exist.
fn list_directory(path: &str) -> Result<Array, Box<EvalAltResult>> {
    let ctx = context::require()?;
    Ok(ctx
        .core
        .list_directory(path)
        .unwrap_or_default()
        .into_iter()
        .map(Dynamic::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::super::testing::harness;
    use crate::config::Config;
    use crate::core::Core;
    use crate::vfs::{MemoryTree, MountSource};

    fn core_with_files(write_dir: &std::path::Path) -> Core {
        let core = Core::bare(Config::default());
        let mut tree = MemoryTree::new();
        tree.insert("data/greeting.txt", b"hello".to_vec()).unwrap();
        tree.insert("data/blob.bin", vec![1u8, 2, 3]).unwrap();
        core.vfs().mount(MountSource::Tree(tree), "", true).unwrap();
        core.vfs().set_write_dir(write_dir).unwrap();
        core
    }

    #[test]
    fn test_load_and_check() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(core_with_files(dir.path()));

        assert_eq!(h.engine.eval::<String>(r#"load_text("data/greeting.txt")"#).unwrap(), "hello");
        assert_eq!(h.engine.eval::<i64>(r#"load_file("data/blob.bin").len"#).unwrap(), 3);
        assert!(h.engine.eval::<bool>(r#"load_file("missing.txt") == ()"#).unwrap());
        assert_eq!(h.engine.eval::<i64>(r#"check_file("data")"#).unwrap(), 2);
        assert_eq!(h.engine.eval::<i64>(r#"check_file("data/blob.bin")"#).unwrap(), 1);
        assert_eq!(h.engine.eval::<i64>(r#"check_file("nothing")"#).unwrap(), 0);
    }

    #[test]
    fn test_list_directory() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(core_with_files(dir.path()));
        let listing = h
            .engine
            .eval::<String>(r#"list_directory("data").reduce(|sum, name| sum + name + ";", "")"#)
            .unwrap();
        assert_eq!(listing, "blob.bin;greeting.txt;");
        assert_eq!(h.engine.eval::<i64>(r#"list_directory("nope").len()"#).unwrap(), 0);
    }

    #[test]
    fn test_save_lands_in_write_dir() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(core_with_files(dir.path()));
        assert!(h.engine.eval::<bool>(r#"save_text("out/note.txt", "saved")"#).unwrap());
        assert!(h
            .engine
            .eval::<bool>(r#"save_file("out/raw.bin", message(9, blob(2, 7)))"#)
            .unwrap());

        assert_eq!(std::fs::read(dir.path().join("out/note.txt")).unwrap(), b"saved");
        assert_eq!(std::fs::read(dir.path().join("out/raw.bin")).unwrap(), vec![7, 7]);
        assert!(!h.engine.eval::<bool>(r#"save_text("../escape.txt", "x")"#).unwrap());
    }
}
