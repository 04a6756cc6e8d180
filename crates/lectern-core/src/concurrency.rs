use crate::CoreError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

pub const LOCK_FILE: &str = ".lectern.lock";

/// Advisory exclusive lock held for the duration of a mutating command.
pub struct DeployLock {
    lock_file: File,
    path: PathBuf,
}

impl DeployLock {
    fn open(lock_path: &Path) -> Result<File, CoreError> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path)?)
    }

    /// Block until the lock is available.
    pub fn acquire(lock_path: &Path) -> Result<Self, CoreError> {
        let file = Self::open(lock_path)?;
        file.lock_exclusive()
            .map_err(|e| CoreError::Io(std::io::Error::new(std::io::ErrorKind::WouldBlock, e)))?;
        Ok(Self {
            lock_file: file,
            path: lock_path.to_path_buf(),
        })
    }

    pub fn try_acquire(lock_path: &Path) -> Result<Option<Self>, CoreError> {
        let file = Self::open(lock_path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                lock_file: file,
                path: lock_path.to_path_buf(),
            })),
            Err(_) => Ok(None),
        }
    }

    /// Take the run lock under `root`, failing fast when another run holds it.
    pub fn for_root(root: &Path) -> Result<Self, CoreError> {
        let path = root.join(LOCK_FILE);
        Self::try_acquire(&path)?.ok_or(CoreError::Locked(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DeployLock {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
    }
}

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

pub fn install_signal_handler() {
    let _ = ctrlc::set_handler(move || {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            std::process::exit(1);
        }
        SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
        eprintln!("\ninterrupt received, stopping after the current step (press Ctrl-C again to exit now)...");
    });
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

/// Fail with `Interrupted` once Ctrl-C has been pressed.
pub fn check_interrupt() -> Result<(), CoreError> {
    if shutdown_requested() {
        Err(CoreError::Interrupted)
    } else {
        Ok(())
    }
}
