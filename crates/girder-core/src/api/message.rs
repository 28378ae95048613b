//! Message and mailbox API.

use rhai::{Blob, Engine, EvalAltResult};

use super::{context, script_error, to_index};
use crate::message::Message;

impl Message {
    fn get_type(&mut self) -> i64 {
        self.message_type() as i64
    }

    fn get_len(&mut self) -> i64 {
        self.len() as i64
    }

    fn get_refcount(&mut self) -> i64 {
        self.refcount() as i64
    }
}

/// Register the Message type, its constructors and mailbox access.
pub fn register(engine: &mut Engine) {
    engine.register_type_with_name::<Message>("Message");
    engine.register_get("message_type", Message::get_type);
    engine.register_get("len", Message::get_len);
    engine.register_get("refcount", Message::get_refcount);

    engine.register_fn("bytes", |msg: &mut Message| -> Blob { msg.data().to_vec() });
    engine.register_fn("text", |msg: &mut Message| msg.text());
    engine.register_fn("to_string", |msg: &mut Message| {
        format!("Message(type={}, len={})", msg.message_type(), msg.len())
    });

    engine.register_fn("copy", copy);
    engine.register_fn("create_message", create_message);
    engine.register_fn("message", message_from_blob);
    engine.register_fn("message", message_from_text);
    engine.register_fn("set_byte", set_byte);

    engine.register_fn("fetch_messages", fetch_messages);
    engine.register_fn("get_message", get_message);
}

fn to_type(message_type: i64) -> Result<u32, Box<EvalAltResult>> {
    u32::try_from(message_type)
        .map_err(|_| script_error(format!("invalid message type {}", message_type)))
}

/// Duplicate a message into a new, unshared buffer.
fn copy(msg: &mut Message) -> Result<Message, Box<EvalAltResult>> {
    let ctx = context::require()?;
    ctx.core.copy_message(msg).map_err(script_error)
}

/// A zeroed message of `len` bytes.
fn create_message(message_type: i64, len: i64) -> Result<Message, Box<EvalAltResult>> {
    let ctx = context::require()?;
    let len = usize::try_from(len).map_err(|_| script_error(format!("invalid length {}", len)))?;
    ctx.core
        .allocator()
        .allocate_typed(to_type(message_type)?, len)
        .map_err(script_error)
}

fn message_from_blob(message_type: i64, data: Blob) -> Result<Message, Box<EvalAltResult>> {
    let ctx = context::require()?;
    Ok(ctx.core.allocator().adopt(to_type(message_type)?, data))
}

fn message_from_text(message_type: i64, text: &str) -> Result<Message, Box<EvalAltResult>> {
    let ctx = context::require()?;
    ctx.core
        .allocator()
        .allocate_text(to_type(message_type)?, text)
        .map_err(script_error)
}

/// Write one byte. Shared messages are immutable.
fn set_byte(msg: &mut Message, index: i64, value: i64) -> Result<(), Box<EvalAltResult>> {
    let len = msg.len();
    let data = msg
        .data_mut()
        .ok_or_else(|| script_error("cannot modify a shared message"))?;
    let slot = data
        .get_mut(to_index(index))
        .ok_or_else(|| script_error(format!("byte index {} out of range (length {})", index, len)))?;
    *slot = (value & 0xff) as u8;
    Ok(())
}

/// Swap in the messages received since the last fetch.
fn fetch_messages() -> Result<i64, Box<EvalAltResult>> {
    let ctx = context::require()?;
    let count = ctx.inbox.borrow_mut().fetch_messages();
    Ok(count as i64)
}

fn get_message(index: i64) -> Result<Message, Box<EvalAltResult>> {
    let ctx = context::require()?;
    let message = ctx.inbox.borrow().get_message(to_index(index)).cloned();
    message.map_err(script_error)
}
