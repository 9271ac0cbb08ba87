//! Safe path resolution and file-mtime capture.

use futures::StreamExt;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// Above this many files the stat calls run concurrently.
const PARALLEL_STAT_THRESHOLD: usize = 10;

/// Concurrency cap for parallel stat calls.
const STAT_CONCURRENCY: usize = 8;

/// Resolves a distiller-reported path against the execution's working
/// directory.
///
/// Returns `None` for any path containing `..` segments and for absolute
/// paths that escape `cwd`. The distiller output is model-generated text;
/// nothing it names may reach outside the project tree.
#[must_use]
pub fn safe_resolve_path(path: &str, cwd: &Path) -> Option<PathBuf> {
    let candidate = Path::new(path);
    if candidate
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return None;
    }
    if candidate.is_absolute() {
        if candidate.starts_with(cwd) {
            return Some(candidate.to_path_buf());
        }
        return None;
    }
    Some(cwd.join(candidate))
}

async fn stat_mtime_ms(path: PathBuf) -> Option<i64> {
    let metadata = tokio::fs::metadata(&path).await.ok()?;
    let mtime = metadata.modified().ok()?;
    let ms = mtime
        .duration_since(std::time::UNIX_EPOCH)
        .ok()?
        .as_millis();
    i64::try_from(ms).ok()
}

/// Captures mtimes (epoch ms) for every resolvable file.
///
/// Unresolvable or unstattable paths are silently skipped; a memory row
/// with a partial mtime map is still useful. Beyond
/// [`PARALLEL_STAT_THRESHOLD`] files the stat calls run with a concurrency
/// cap of [`STAT_CONCURRENCY`].
pub async fn capture_file_mtimes<'a, I>(files: I, cwd: &Path) -> BTreeMap<String, i64>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut resolved: Vec<(String, PathBuf)> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for file in files {
        if !seen.insert(file.clone()) {
            continue;
        }
        if let Some(path) = safe_resolve_path(file, cwd) {
            resolved.push((file.clone(), path));
        }
    }

    if resolved.len() > PARALLEL_STAT_THRESHOLD {
        futures::stream::iter(resolved)
            .map(|(name, path)| async move { (name, stat_mtime_ms(path).await) })
            .buffer_unordered(STAT_CONCURRENCY)
            .filter_map(|(name, mtime)| async move { mtime.map(|m| (name, m)) })
            .collect()
            .await
    } else {
        let mut mtimes = BTreeMap::new();
        for (name, path) in resolved {
            if let Some(mtime) = stat_mtime_ms(path).await {
                mtimes.insert(name, mtime);
            }
        }
        mtimes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_relative_path_resolves_under_cwd() {
        let cwd = Path::new("/work/project");
        assert_eq!(
            safe_resolve_path("src/main.rs", cwd),
            Some(PathBuf::from("/work/project/src/main.rs"))
        );
    }

    #[test]
    fn test_parent_segments_rejected() {
        let cwd = Path::new("/work/project");
        assert_eq!(safe_resolve_path("../secrets", cwd), None);
        assert_eq!(safe_resolve_path("src/../../etc/passwd", cwd), None);
        assert_eq!(safe_resolve_path("/work/project/../other", cwd), None);
    }

    #[test]
    fn test_absolute_paths_must_stay_inside_cwd() {
        let cwd = Path::new("/work/project");
        assert_eq!(
            safe_resolve_path("/work/project/src/lib.rs", cwd),
            Some(PathBuf::from("/work/project/src/lib.rs"))
        );
        assert_eq!(safe_resolve_path("/etc/passwd", cwd), None);
    }

    proptest! {
        /// No input containing a `..` segment ever resolves.
        #[test]
        fn prop_dotdot_never_resolves(prefix in "[a-z]{0,8}", suffix in "[a-z]{0,8}") {
            let path = format!("{prefix}/../{suffix}");
            prop_assert!(safe_resolve_path(&path, Path::new("/work")).is_none());
        }
    }

    #[tokio::test]
    async fn test_capture_mtimes_skips_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("present.txt");
        std::fs::write(&real, "data").unwrap();

        let files = vec![
            "present.txt".to_string(),
            "missing.txt".to_string(),
            "../escape.txt".to_string(),
        ];
        let mtimes = capture_file_mtimes(files.iter(), dir.path()).await;
        assert_eq!(mtimes.len(), 1);
        assert!(mtimes["present.txt"] > 0);
    }

    #[tokio::test]
    async fn test_capture_many_files_parallel_path() {
        let dir = tempfile::tempdir().unwrap();
        let files: Vec<String> = (0..20)
            .map(|i| {
                let name = format!("file{i}.txt");
                std::fs::write(dir.path().join(&name), "x").unwrap();
                name
            })
            .collect();
        let mtimes = capture_file_mtimes(files.iter(), dir.path()).await;
        assert_eq!(mtimes.len(), 20);
    }
}
