//! Recursive directory copy/delete, the primitive every stamp operation sits on.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Trait for whatever actually moves directory trees around.
#[async_trait::async_trait]
pub trait TreeStore: Send + Sync {
    /// Copy `src` recursively into `dst`, creating `dst` and overwriting files already there.
    async fn copy_tree(&self, src: &Path, dst: &Path) -> io::Result<()>;

    /// Delete `path` recursively. Returns `false` if there was nothing to delete.
    async fn delete_tree(&self, path: &Path) -> io::Result<bool>;
}

/// Local filesystem implementation; blocking work runs off the async workers.
#[derive(Debug, Default)]
pub struct LocalTreeStore;

impl LocalTreeStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl TreeStore for LocalTreeStore {
    async fn copy_tree(&self, src: &Path, dst: &Path) -> io::Result<()> {
        let (src, dst) = (src.to_path_buf(), dst.to_path_buf());
        run_blocking(move || copy_dir_recursive(&src, &dst)).await
    }

    async fn delete_tree(&self, path: &Path) -> io::Result<bool> {
        let path = path.to_path_buf();
        run_blocking(move || remove_dir_if_exists(&path)).await
    }
}

async fn run_blocking<T, F>(f: F) -> io::Result<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
}

/// Whether `path` is an existing directory, checked without blocking a worker.
pub async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> io::Result<()> {
    if !src.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} is not a directory", src.display()),
        ));
    }
    fs::create_dir_all(dst)?;

    for entry in WalkDir::new(src).min_depth(1).follow_links(true) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let dest_path: PathBuf = dst.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest_path)?;
        } else {
            fs::copy(entry.path(), &dest_path)?;
        }
    }
    Ok(())
}

fn remove_dir_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_tree(tmp: &TempDir) -> PathBuf {
        let src = tmp.path().join("source");
        fs::create_dir_all(src.join("nested/deeper")).unwrap();
        fs::create_dir_all(src.join("empty")).unwrap();
        fs::write(src.join("top.txt"), b"top").unwrap();
        fs::write(src.join("nested/deeper/leaf.txt"), b"leaf").unwrap();
        src
    }

    #[tokio::test]
    async fn test_copy_tree_is_recursive() {
        let tmp = TempDir::new().unwrap();
        let src = setup_tree(&tmp);
        let dst = tmp.path().join("copy");

        LocalTreeStore::new().copy_tree(&src, &dst).await.unwrap();

        assert_eq!(fs::read(dst.join("top.txt")).unwrap(), b"top");
        assert_eq!(fs::read(dst.join("nested/deeper/leaf.txt")).unwrap(), b"leaf");
        assert!(dst.join("empty").is_dir());
    }

    #[tokio::test]
    async fn test_copy_tree_overwrites_existing_files() {
        let tmp = TempDir::new().unwrap();
        let src = setup_tree(&tmp);
        let dst = tmp.path().join("copy");
        fs::create_dir_all(&dst).unwrap();
        fs::write(dst.join("top.txt"), b"stale").unwrap();

        LocalTreeStore::new().copy_tree(&src, &dst).await.unwrap();
        assert_eq!(fs::read(dst.join("top.txt")).unwrap(), b"top");
    }

    #[tokio::test]
    async fn test_copy_missing_source_fails() {
        let tmp = TempDir::new().unwrap();
        let result = LocalTreeStore::new()
            .copy_tree(&tmp.path().join("nope"), &tmp.path().join("copy"))
            .await;
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotFound);
        assert!(!tmp.path().join("copy").exists());
    }

    #[tokio::test]
    async fn test_is_dir() {
        let tmp = TempDir::new().unwrap();
        let src = setup_tree(&tmp);
        assert!(is_dir(&src).await);
        assert!(!is_dir(&src.join("top.txt")).await);
        assert!(!is_dir(&tmp.path().join("nope")).await);
    }

    #[tokio::test]
    async fn test_delete_tree_tolerates_missing_path() {
        let tmp = TempDir::new().unwrap();
        let src = setup_tree(&tmp);
        let store = LocalTreeStore::new();

        assert!(store.delete_tree(&src).await.unwrap());
        assert!(!src.exists());
        assert!(!store.delete_tree(&src).await.unwrap());
    }
}

#[cfg(test)]
pub(crate) mod failing {
    use super::{LocalTreeStore, TreeStore};
    use std::io;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    /// Local store whose deletes of one chosen path fail with `PermissionDenied`.
    #[derive(Default)]
    pub struct FailingDeletes {
        inner: LocalTreeStore,
        blocked: Mutex<Option<PathBuf>>,
    }

    impl FailingDeletes {
        pub fn block(&self, path: PathBuf) {
            *self.blocked.lock().unwrap() = Some(path);
        }

        pub fn unblock(&self) {
            *self.blocked.lock().unwrap() = None;
        }
    }

    #[async_trait::async_trait]
    impl TreeStore for FailingDeletes {
        async fn copy_tree(&self, src: &Path, dst: &Path) -> io::Result<()> {
            self.inner.copy_tree(src, dst).await
        }

        async fn delete_tree(&self, path: &Path) -> io::Result<bool> {
            if self.blocked.lock().unwrap().as_deref() == Some(path) {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"));
            }
            self.inner.delete_tree(path).await
        }
    }
}
