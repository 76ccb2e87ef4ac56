//! Lexical path helpers for recorded layer locations.
//! 處理圖層記錄路徑的字面路徑工具。

use std::env;
use std::io;
use std::path::{Component, Path, PathBuf};

const COMPRESSION_SUFFIXES: &[&str] = &["gz", "bz2", "xz", "zst"];

/// Absolute, lexically normalized form of `path` (relative paths are joined
/// to the current directory). Symlinks are not resolved.
/// 取得絕對且正規化的路徑，不解析符號連結。
pub fn absolute(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(normalize(path))
    } else {
        Ok(normalize(&env::current_dir()?.join(path)))
    }
}

/// Removes `.` components and folds `..` into the preceding component.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(out.components().next_back(), Some(Component::Normal(_)))
                    && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Expresses `path` relative to `base`. Uses a plain prefix strip when
/// `base` is an ancestor and climbs with `..` otherwise. `None` when the two
/// paths share no root.
/// 計算 `path` 相對於 `base` 的路徑；無共同根目錄時回傳 `None`。
pub fn relative_to(path: &Path, base: &Path) -> Option<PathBuf> {
    if let Ok(stripped) = path.strip_prefix(base) {
        return Some(stripped.to_path_buf());
    }
    if path.is_absolute() != base.is_absolute() {
        return None;
    }

    let path = normalize(path);
    let base = normalize(base);
    let mut ours = path.components().peekable();
    let mut theirs = base.components().peekable();
    let mut shared = 0;
    while let (Some(a), Some(b)) = (ours.peek(), theirs.peek()) {
        if a != b {
            break;
        }
        ours.next();
        theirs.next();
        shared += 1;
    }
    if shared == 0 && path.has_root() {
        return None;
    }

    let mut relative = PathBuf::new();
    for _ in theirs {
        relative.push("..");
    }
    for component in ours {
        relative.push(component.as_os_str());
    }
    Some(relative)
}

/// Where a file recorded under `saved_dir` would be after the tree moved to
/// `current_dir`. Only returned when a file exists at that location.
/// 工作區搬移後推算檔案的新位置；僅在該處確有檔案時回傳。
pub fn relocate(recorded: &Path, saved_dir: &Path, current_dir: &Path) -> Option<PathBuf> {
    let relative = relative_to(recorded, saved_dir)?;
    let candidate = normalize(&current_dir.join(relative));
    candidate.is_file().then_some(candidate)
}

/// File name without directory, compression suffix and extension:
/// `/data/t1.nii.gz` becomes `t1`.
/// 去除目錄、壓縮副檔名與副檔名後的檔名。
pub fn base_name(path: &Path) -> String {
    let mut stem = PathBuf::from(path.file_name().unwrap_or_default());
    let compressed = stem
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            COMPRESSION_SUFFIXES
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false);
    if compressed {
        stem.set_extension("");
    }
    stem.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn normalize_folds_dots() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("/../a")), PathBuf::from("/a"));
        assert_eq!(normalize(Path::new("../a/..")), PathBuf::from(".."));
    }

    #[test]
    fn relative_paths_strip_or_climb() {
        assert_eq!(
            relative_to(Path::new("/data/case/t1.png"), Path::new("/data/case")),
            Some(PathBuf::from("t1.png"))
        );
        assert_eq!(
            relative_to(Path::new("/data/images/t1.png"), Path::new("/data/case")),
            Some(PathBuf::from("../images/t1.png"))
        );
        assert_eq!(
            relative_to(Path::new("/other/t1.png"), Path::new("/data/case")),
            Some(PathBuf::from("../../other/t1.png"))
        );
        assert_eq!(relative_to(Path::new("t1.png"), Path::new("/data")), None);
    }

    #[test]
    fn relocation_requires_existing_file() {
        let dir = tempdir().unwrap();
        let moved = dir.path().join("moved");
        fs::create_dir_all(moved.join("img")).unwrap();
        fs::write(moved.join("img").join("t1.png"), b"x").unwrap();

        let recorded = Path::new("/old/place/img/t1.png");
        assert_eq!(
            relocate(recorded, Path::new("/old/place"), &moved),
            Some(moved.join("img").join("t1.png"))
        );
        assert_eq!(
            relocate(Path::new("/old/place/img/t2.png"), Path::new("/old/place"), &moved),
            None
        );
    }

    #[test]
    fn base_names_drop_compression_and_extension() {
        assert_eq!(base_name(Path::new("/data/t1.nii.gz")), "t1");
        assert_eq!(base_name(Path::new("/data/seg.png")), "seg");
        assert_eq!(base_name(Path::new("mesh.vtk")), "mesh");
        assert_eq!(base_name(Path::new("/data/plain")), "plain");
    }

    #[test]
    fn absolute_joins_current_dir() {
        let cwd = env::current_dir().unwrap();
        assert_eq!(absolute(Path::new("a/../b.png")).unwrap(), cwd.join("b.png"));
        assert_eq!(absolute(Path::new("/x/y")).unwrap(), PathBuf::from("/x/y"));
    }
}
