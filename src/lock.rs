//! Exclusive lock held for the lifetime of a sync process.
//!
//! Two integrators sharing one transaction log could compute the same
//! watermark for a subject and discover its documents twice, so only one may
//! run against a given database at a time.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Context;
use fs4::fs_std::FileExt;

/// Released when dropped (the OS drops the lock with the file handle).
#[derive(Debug)]
pub struct InstanceLock {
    _file: File,
    path: PathBuf,
}

impl InstanceLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// `<db path>.lock`, next to the database.
pub fn lock_path(db_path: &Path) -> PathBuf {
    let mut name = db_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// Take the lock for `db_path`, failing immediately if another process
/// holds it.
pub async fn acquire(db_path: &Path) -> anyhow::Result<InstanceLock> {
    let lock_path = lock_path(db_path);
    tokio::task::spawn_blocking(move || {
        let file = File::create(&lock_path)
            .with_context(|| format!("Failed to create lock file: {}", lock_path.display()))?;
        file.try_lock_exclusive().map_err(|_| {
            anyhow::anyhow!(
                "Another hie-integrator instance is using this transaction log (lock: {})",
                lock_path.display()
            )
        })?;
        Ok(InstanceLock {
            _file: file,
            path: lock_path,
        })
    })
    .await?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("hie-integrator")
            .join("lock_tests")
            .join(name);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_lock_path_sits_next_to_db() {
        assert_eq!(
            lock_path(Path::new("/data/integrator.db")),
            PathBuf::from("/data/integrator.db.lock")
        );
    }

    #[tokio::test]
    async fn test_second_acquire_fails_until_released() {
        let db = test_dir("exclusive").join("integrator.db");

        let first = acquire(&db).await.unwrap();
        assert_eq!(first.path(), lock_path(&db));
        let err = acquire(&db).await.unwrap_err();
        assert!(err.to_string().contains("Another hie-integrator instance"));

        drop(first);
        acquire(&db).await.unwrap();
    }
}
