use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let ts = Utc::now().timestamp_micros();
    let pid = std::process::id();
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("tmpfile");
    let tmp = path.with_file_name(format!(".{}.tmp.{}.{}", name, pid, ts));
    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn atomic_write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    atomic_write_bytes(path, &bytes)
}

pub fn list_dirs(dir: &Path) -> Result<BTreeSet<PathBuf>> {
    let mut out = BTreeSet::new();
    for entry in walkdir::WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        if entry.file_type().is_dir() {
            out.insert(entry.into_path());
        }
    }
    Ok(out)
}

/// Moves a file or directory, falling back to copy and delete when a rename
/// is not possible (e.g. across filesystems).
pub fn move_path(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(e),
        Err(e) => {
            debug!(src = %src.display(), dst = %dst.display(), error = %e, "rename failed, copying");
            if src.is_dir() {
                copy_dir(src, dst)?;
                fs::remove_dir_all(src)
            } else {
                fs::copy(src, dst)?;
                fs::remove_file(src)
            }
        }
    }
}

fn copy_dir(src: &Path, dst: &Path) -> io::Result<()> {
    for entry in walkdir::WalkDir::new(src) {
        let entry = entry.map_err(io::Error::from)?;
        let path = entry.path();
        let rel = path.strip_prefix(src).unwrap_or(path);
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(path, target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "pathlab_fsutil_{}_{}_{}",
            tag,
            std::process::id(),
            Utc::now().timestamp_micros()
        ));
        ensure_dir(&dir).expect("temp dir");
        dir
    }

    #[test]
    fn list_dirs_ignores_files_and_nested_dirs() {
        let root = temp_dir("list");
        ensure_dir(&root.join("a").join("nested")).expect("a");
        ensure_dir(&root.join("b")).expect("b");
        fs::write(root.join("file.txt"), "x").expect("file");

        let dirs = list_dirs(&root).expect("list");
        let names: Vec<_> = dirs
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn copy_dir_preserves_tree() {
        let root = temp_dir("copy");
        let src = root.join("src");
        ensure_dir(&src.join("inner")).expect("src");
        fs::write(src.join("inner").join("log.txt"), "hello").expect("write");

        let dst = root.join("dst");
        copy_dir(&src, &dst).expect("copy");
        assert_eq!(
            fs::read_to_string(dst.join("inner").join("log.txt")).expect("read"),
            "hello"
        );
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn move_path_reports_missing_source() {
        let root = temp_dir("move");
        let err = move_path(&root.join("nope"), &root.join("dst")).expect_err("missing");
        assert_eq!(err.kind(), io::ErrorKind::NotFound);

        fs::write(root.join("stats.txt"), "1").expect("write");
        move_path(&root.join("stats.txt"), &root.join("moved.txt")).expect("move");
        assert!(!root.join("stats.txt").exists());
        assert!(root.join("moved.txt").is_file());
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn atomic_json_write_replaces_file() {
        let root = temp_dir("json");
        let path = root.join("out").join("report.json");
        atomic_write_json_pretty(&path, &serde_json::json!({"n": 1})).expect("first");
        atomic_write_json_pretty(&path, &serde_json::json!({"n": 2})).expect("second");
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(value["n"], 2);
        let _ = fs::remove_dir_all(root);
    }
}
