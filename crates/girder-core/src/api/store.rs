//! Shared key/value store API.

use rhai::{Dynamic, Engine, EvalAltResult};

use super::{context, script_error};
use crate::message::Message;

pub fn register(engine: &mut Engine) {
    engine.register_fn("get_store", get_store);
    engine.register_fn("get_store_text", get_store_text);
    engine.register_fn("set_store", set_store);
    engine.register_fn("set_store", set_store_text);
}

/// The stored message, or `()` when the key is unset.
fn get_store(key: &str) -> Result<Dynamic, Box<EvalAltResult>> {
    let ctx = context::require()?;
    Ok(ctx
        .core
        .store_value(key)
        .map(Dynamic::from)
        .unwrap_or(Dynamic::UNIT))
}

fn get_store_text(key: &str) -> Result<Dynamic, Box<EvalAltResult>> {
    let ctx = context::require()?;
    Ok(ctx
        .core
        .store_value(key)
        .map(|msg| msg.text().into())
        .unwrap_or(Dynamic::UNIT))
}

/// Returns true when an existing value was replaced.
fn set_store(key: &str, value: Message) -> Result<bool, Box<EvalAltResult>> {
    let ctx = context::require()?;
    Ok(ctx.core.set_store_value(key, value))
}

fn set_store_text(key: &str, text: &str) -> Result<bool, Box<EvalAltResult>> {
    let ctx = context::require()?;
    ctx.core.set_store_text(key, text).map_err(script_error)
}

#[cfg(test)]
mod tests {
    use super::super::testing::bare_harness;

    #[test]
    fn test_set_and_get() {
        let h = bare_harness();
        assert!(!h.engine.eval::<bool>(r#"set_store("greeting", "hi")"#).unwrap());
        assert!(h.engine.eval::<bool>(r#"set_store("greeting", "hello")"#).unwrap());
        assert_eq!(h.engine.eval::<String>(r#"get_store_text("greeting")"#).unwrap(), "hello");
        assert_eq!(h.core.store_value("greeting").unwrap().text(), "hello");
    }

    #[test]
    fn test_missing_key_is_unit() {
        let h = bare_harness();
        assert!(h.engine.eval::<bool>(r#"get_store("nothing") == ()"#).unwrap());
        assert!(h.engine.eval::<bool>(r#"get_store_text("nothing") == ()"#).unwrap());
    }

    #[test]
    fn test_store_message_shares_buffer() {
        let h = bare_harness();
        h.engine
            .run(r#"let m = message(4, blob(2, 1)); set_store("m", m);"#)
            .unwrap();
        let stored = h.core.store_value("m").unwrap();
        assert_eq!(stored.message_type(), 4);
        assert_eq!(stored.data(), &[1, 1]);
    }
}
