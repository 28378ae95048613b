//! Virtual filesystem setup driven by configuration.

use std::fs;
use std::path::Path;

use girder_core::{Config, Core, FileKind};

fn write_tar(path: &Path, files: &[(&str, &[u8])]) {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *data).unwrap();
    }
    fs::write(path, builder.into_inner().unwrap()).unwrap();
}

#[test]
fn archives_shadow_base_dir_and_write_dir_is_relative() {
    let base = tempfile::tempdir().unwrap();
    fs::write(base.path().join("settings.txt"), "from base").unwrap();
    fs::write(base.path().join("only_base.txt"), "base").unwrap();

    let archives = tempfile::tempdir().unwrap();
    let first = archives.path().join("first.tar");
    let second = archives.path().join("second.tar");
    write_tar(&first, &[("settings.txt", b"from first")]);
    write_tar(&second, &[("settings.txt", b"from second"), ("extra.txt", b"x")]);

    let mut config = Config::default();
    config.vfs.base_dir = Some(base.path().to_path_buf());
    config.vfs.archives = vec![first, second];
    config.vfs.mount_write_dir = true;
    let core = Core::new(config);

    // Two archives, the base dir and the write dir.
    assert_eq!(core.vfs().mount_count(), 4);
    assert_eq!(core.load_file("settings.txt").unwrap().text(), "from first");
    assert_eq!(core.load_file("extra.txt").unwrap().text(), "x");
    assert_eq!(core.load_file("only_base.txt").unwrap().text(), "base");

    let msg = core.allocator().allocate_text(0, "progress").unwrap();
    core.save_file("slot1.sav", &msg).unwrap();
    assert_eq!(
        fs::read_to_string(base.path().join("save/slot1.sav")).unwrap(),
        "progress"
    );
    assert_eq!(core.check_file("writedir/slot1.sav"), FileKind::File);

    let root = core.list_directory("/").unwrap();
    assert!(root.contains(&"writedir".to_string()));
    assert!(root.contains(&"extra.txt".to_string()));
    assert!(root.contains(&"save".to_string()));
}

#[test]
fn broken_mounts_are_skipped() {
    let base = tempfile::tempdir().unwrap();
    fs::write(base.path().join("ok.txt"), "ok").unwrap();

    let mut config = Config::default();
    config.vfs.base_dir = Some(base.path().to_path_buf());
    config.vfs.archives = vec![base.path().join("missing.tar")];
    config.vfs.directories = vec![base.path().join("no-such-dir")];
    config.vfs.write_dir = None;
    let core = Core::new(config);

    assert_eq!(core.vfs().mount_count(), 1);
    assert_eq!(core.load_file("ok.txt").unwrap().text(), "ok");
}

#[test]
fn archive_with_lying_size_header_is_skipped() {
    let base = tempfile::tempdir().unwrap();
    fs::write(base.path().join("ok.txt"), "ok").unwrap();

    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_path("huge.bin").unwrap();
    header.set_size(1u64 << 60);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append(&header, &b"tiny"[..]).unwrap();
    let archive = base.path().join("broken.tar");
    fs::write(&archive, builder.into_inner().unwrap()).unwrap();

    let mut config = Config::default();
    config.vfs.base_dir = Some(base.path().to_path_buf());
    config.vfs.archives = vec![archive];
    config.vfs.write_dir = None;
    let core = Core::new(config);

    assert_eq!(core.vfs().mount_count(), 1);
    assert_eq!(core.check_file("huge.bin"), FileKind::Absent);
    assert_eq!(core.load_file("ok.txt").unwrap().text(), "ok");
}

#[test]
fn raw_files_bypass_mounts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("outside.bin");
    let core = Core::bare(Config::default());

    let msg = core.allocator().allocate_from(3, &[0xde, 0xad]).unwrap();
    core.save_file_raw(&path, &msg).unwrap();
    let loaded = core.load_file_raw(&path).unwrap();
    assert_eq!(loaded.data(), &[0xde, 0xad]);
    assert_eq!(loaded.message_type(), 0);
    assert_eq!(core.check_file("outside.bin"), FileKind::Absent);
}
