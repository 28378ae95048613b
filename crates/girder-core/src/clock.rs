//! Built-in frame clock extension.
//!
//! Counts frames and accumulates the nominal frame delta, and exposes both
//! to scripts as `frame_count()` and `elapsed_time()`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rhai::Engine;

use crate::extension::Extension;
use crate::interpreter::Interpreter;

#[derive(Default)]
struct ClockState {
    frames: AtomicU64,
    elapsed_bits: AtomicU64,
}

impl ClockState {
    fn elapsed(&self) -> f64 {
        f64::from_bits(self.elapsed_bits.load(Ordering::Acquire))
    }

    fn reset(&self) {
        self.frames.store(0, Ordering::Release);
        self.elapsed_bits.store(0f64.to_bits(), Ordering::Release);
    }
}

/// Frame counter driven by the interpreter's update hook.
#[derive(Clone, Default)]
pub struct FrameClock {
    state: Arc<ClockState>,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames observed since `init`.
    pub fn frames(&self) -> u64 {
        self.state.frames.load(Ordering::Acquire)
    }

    /// Sum of the frame deltas since `init`, in seconds.
    pub fn elapsed(&self) -> f64 {
        self.state.elapsed()
    }
}

impl Extension for FrameClock {
    fn name(&self) -> &str {
        "clock"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn declarations(&self) -> &str {
        "fn frame_count() -> int;\nfn elapsed_time() -> float;\n"
    }

    fn register(&self, engine: &mut Engine) {
        let frames = self.state.clone();
        engine.register_fn("frame_count", move || {
            frames.frames.load(Ordering::Acquire) as i64
        });
        let elapsed = self.state.clone();
        engine.register_fn("elapsed_time", move || elapsed.elapsed());
    }

    fn init(&mut self, owner: &Interpreter) -> anyhow::Result<()> {
        self.state.reset();
        log::debug!("[clock] attached to interpreter {}", owner.id());
        Ok(())
    }

    fn update(&mut self, dt: f64) {
        self.state.frames.fetch_add(1, Ordering::AcqRel);
        let elapsed = self.state.elapsed() + dt;
        self.state
            .elapsed_bits
            .store(elapsed.to_bits(), Ordering::Release);
    }

    fn shutdown(&mut self) {
        log::debug!(
            "[clock] stopped after {} frames ({:.3}s)",
            self.frames(),
            self.elapsed()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_accumulates() {
        let mut clock = FrameClock::new();
        let observer = clock.clone();
        clock.update(0.5);
        clock.update(0.25);
        assert_eq!(observer.frames(), 2);
        assert!((observer.elapsed() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_registered_functions_read_shared_state() {
        let mut clock = FrameClock::new();
        let mut engine = Engine::new();
        clock.register(&mut engine);
        clock.update(1.0);
        assert_eq!(engine.eval::<i64>("frame_count()").unwrap(), 1);
        assert!((engine.eval::<f64>("elapsed_time()").unwrap() - 1.0).abs() < 1e-9);
    }
}
