//! Girder Standard Scripts.
//!
//! This crate embeds the default bootstrap program and a small library of
//! Rhai helper modules. Hosts mount [`scripts`] into the virtual filesystem
//! (usually appended, so project files can shadow it):
//!
//! ```rhai
//! import "lib/messages" as messages;
//! import "lib/store" as store;
//! ```
//!
//! # Directory Structure
//!
//! - `bootstrap.rhai` - Loads the application script and forwards `init`/`update`
//! - `lib/messages.rhai` - Mailbox helpers (drain, broadcast, send_text)
//! - `lib/store.rhai` - Shared store helpers (text_or, bump)

use include_dir::{include_dir, Dir};
use std::io;
use std::path::Path;

/// Embedded scripts directory (compiled into the binary)
static SCRIPTS: Dir = include_dir!("$CARGO_MANIFEST_DIR/scripts");

/// Virtual path of the bootstrap program inside [`scripts`].
pub const BOOTSTRAP: &str = "bootstrap.rhai";

/// The embedded script tree.
pub fn scripts() -> &'static Dir<'static> {
    &SCRIPTS
}

/// Source of one embedded script.
pub fn script(path: &str) -> Option<&'static str> {
    SCRIPTS.get_file(path).and_then(|file| file.contents_utf8())
}

/// Number of embedded script files.
pub fn script_count() -> usize {
    count_files(&SCRIPTS)
}

fn count_files(dir: &Dir) -> usize {
    dir.files().count() + dir.dirs().map(count_files).sum::<usize>()
}

/// Write the embedded scripts below `target`, so they can be customised.
///
/// Existing files are overwritten. Returns the number of files written.
pub fn extract_to(target: &Path) -> io::Result<usize> {
    std::fs::create_dir_all(target)?;
    extract_dir(&SCRIPTS, target)
}

fn extract_dir(dir: &Dir, target: &Path) -> io::Result<usize> {
    let mut written = 0;

    for file in dir.files() {
        let path = target.join(file.path());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, file.contents())?;
        written += 1;
    }

    for subdir in dir.dirs() {
        std::fs::create_dir_all(target.join(subdir.path()))?;
        written += extract_dir(subdir, target)?;
    }

    Ok(written)
}
