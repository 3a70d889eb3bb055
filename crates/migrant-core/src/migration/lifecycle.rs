//! Physical store lifecycle: reservation, destruction and replacement.
//!
//! A store is one main file plus optional sidecars (`-wal`, `-shm`,
//! `-journal`) next to it. The manager only executes primitive operations;
//! deciding when a store is no longer needed is up to the caller.

use super::version::VersionId;
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Suffixes of the auxiliary files that belong to a store.
pub const SIDECAR_SUFFIXES: [&str; 3] = ["-wal", "-shm", "-journal"];

/// Attempts at reserving an unused scratch name.
const RESERVE_ATTEMPTS: usize = 8;

/// Path of the sidecar of `location` with the given suffix.
pub fn sidecar_path(location: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(location.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Whether a store may be destroyed without an explicit opt-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Scratch store owned by the migration.
    Temporary,
    /// Store owned by the caller.
    Permanent,
}

/// Reference to a physical store at a specific version.
///
/// A handle is consumed by exactly one of [`StoreLifecycleManager::destroy`],
/// [`StoreLifecycleManager::destroy_source`] or
/// [`StoreLifecycleManager::replace`].
#[derive(Debug, PartialEq, Eq)]
pub struct StoreHandle {
    location: PathBuf,
    version: VersionId,
    kind: StoreKind,
}

impl StoreHandle {
    /// Handle on a store owned by the caller.
    pub fn permanent(location: impl Into<PathBuf>, version: VersionId) -> Self {
        Self {
            location: location.into(),
            version,
            kind: StoreKind::Permanent,
        }
    }

    /// Handle on a scratch store, e.g. one left behind by a failed step.
    pub fn temporary(location: impl Into<PathBuf>, version: VersionId) -> Self {
        Self {
            location: location.into(),
            version,
            kind: StoreKind::Temporary,
        }
    }

    /// Location of the main file.
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Version the store holds.
    pub fn version(&self) -> &VersionId {
        &self.version
    }

    /// Kind of store.
    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    /// Check if this is a scratch store.
    pub fn is_temporary(&self) -> bool {
        self.kind == StoreKind::Temporary
    }
}

/// Store lifecycle errors.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A filesystem operation failed.
    #[error("{operation} {} failed: {source}", .path.display())]
    Io {
        /// What was being done.
        operation: &'static str,
        /// The file involved.
        path: PathBuf,
        /// Underlying cause.
        #[source]
        source: io::Error,
    },

    /// A caller-owned store was passed to [`StoreLifecycleManager::destroy`].
    #[error("refusing to destroy permanent store {}", .location.display())]
    ProtectedStore {
        /// The store that was kept.
        location: PathBuf,
    },

    /// No unused scratch name could be reserved.
    #[error("cannot reserve a scratch store in {}", .scratch_dir.display())]
    Exhausted {
        /// The scratch directory.
        scratch_dir: PathBuf,
    },
}

impl LifecycleError {
    fn io(operation: &'static str, path: &Path, source: io::Error) -> Self {
        LifecycleError::Io {
            operation,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Failed replacement. The candidate is returned untouched.
#[derive(Debug)]
pub struct ReplaceError {
    /// The store that was to be swapped in.
    pub candidate: StoreHandle,
    /// Underlying cause.
    pub source: LifecycleError,
}

/// Creates, destroys and swaps physical stores.
#[derive(Debug, Clone)]
pub struct StoreLifecycleManager {
    scratch_dir: PathBuf,
}

impl StoreLifecycleManager {
    /// Create a manager that reserves scratch stores in `scratch_dir`.
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Directory scratch stores are reserved in.
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Reserve an empty scratch store for `version`.
    ///
    /// The file is created exclusively, so two reservations never share a
    /// location.
    pub fn create_temporary_store(&self, version: &VersionId) -> Result<StoreHandle, LifecycleError> {
        fs::create_dir_all(&self.scratch_dir)
            .map_err(|e| LifecycleError::io("create directory", &self.scratch_dir, e))?;

        for _ in 0..RESERVE_ATTEMPTS {
            let location = self
                .scratch_dir
                .join(format!("migrant-{}.store", uuid::Uuid::new_v4()));
            match OpenOptions::new().write(true).create_new(true).open(&location) {
                Ok(_) => {
                    debug!(location = %location.display(), version = %version, "reserved scratch store");
                    return Ok(StoreHandle::temporary(location, version.clone()));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(LifecycleError::io("create", &location, e)),
            }
        }

        Err(LifecycleError::Exhausted {
            scratch_dir: self.scratch_dir.clone(),
        })
    }

    /// Remove a scratch store and its sidecars.
    ///
    /// Files that are already gone are ignored, so destroying a store twice
    /// is harmless. Permanent stores are refused.
    pub fn destroy(&self, handle: StoreHandle) -> Result<(), LifecycleError> {
        if !handle.is_temporary() {
            return Err(LifecycleError::ProtectedStore {
                location: handle.location,
            });
        }
        remove_store_files(&handle.location)
    }

    /// Remove a caller-owned store and its sidecars.
    ///
    /// Only call this when the caller asked for the source to be deleted.
    pub fn destroy_source(&self, handle: StoreHandle) -> Result<(), LifecycleError> {
        debug!(location = %handle.location.display(), "destroying source store");
        remove_store_files(&handle.location)
    }

    /// Swap the content at `destination` for the content of `candidate`.
    ///
    /// The candidate is copied next to the destination and renamed over
    /// it, which works across filesystems and is atomic for the main file.
    /// The destination's sidecars are moved aside first so the new main file
    /// never sits next to a log of the old one; they are put back if the
    /// rename fails. On success the candidate's files are removed and a
    /// permanent handle on `destination` is returned.
    pub fn replace(&self, destination: &Path, candidate: StoreHandle) -> Result<StoreHandle, ReplaceError> {
        let staged = staging_path(destination);

        if let Err(source) = stage(candidate.location(), &staged) {
            discard(&staged);
            return Err(ReplaceError { candidate, source });
        }

        let aside = match SetAside::sidecars_of(destination, &staged) {
            Ok(aside) => aside,
            Err(source) => {
                discard(&staged);
                return Err(ReplaceError { candidate, source });
            }
        };

        if let Err(e) = fs::rename(&staged, destination) {
            aside.restore();
            discard(&staged);
            return Err(ReplaceError {
                candidate,
                source: LifecycleError::io("rename", destination, e),
            });
        }

        // the destination now holds the candidate's content
        aside.remove();
        let staged_wal = sidecar_path(&staged, "-wal");
        if staged_wal.exists() {
            let wal = sidecar_path(destination, "-wal");
            if let Err(e) = fs::rename(&staged_wal, &wal) {
                warn!(
                    location = %wal.display(),
                    candidate = %candidate.location().display(),
                    error = %e,
                    "could not move write-ahead log into place; keeping candidate"
                );
                discard(&staged);
                return Ok(StoreHandle::permanent(destination, candidate.version));
            }
        }

        if let Err(e) = remove_store_files(candidate.location()) {
            warn!(
                location = %candidate.location().display(),
                error = %e,
                "replaced destination but could not remove candidate"
            );
        }

        debug!(destination = %destination.display(), version = %candidate.version, "replaced store");
        Ok(StoreHandle::permanent(destination, candidate.version))
    }
}

fn staging_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    destination.with_file_name(format!(".{name}.migrant-{}", uuid::Uuid::new_v4()))
}

fn stage(candidate: &Path, staged: &Path) -> Result<(), LifecycleError> {
    copy_synced(candidate, staged)?;

    let wal = sidecar_path(candidate, "-wal");
    if wal.exists() {
        copy_synced(&wal, &sidecar_path(staged, "-wal"))?;
    }
    Ok(())
}

fn copy_synced(from: &Path, to: &Path) -> Result<(), LifecycleError> {
    fs::copy(from, to).map_err(|e| LifecycleError::io("copy", from, e))?;
    fs::File::open(to)
        .and_then(|file| file.sync_all())
        .map_err(|e| LifecycleError::io("sync", to, e))
}

/// Sidecars of a destination moved out of the way during a replace.
struct SetAside {
    moved: Vec<(PathBuf, PathBuf)>,
}

impl SetAside {
    /// Move every existing sidecar of `destination` next to `staged`.
    ///
    /// On failure the sidecars moved so far are put back.
    fn sidecars_of(destination: &Path, staged: &Path) -> Result<Self, LifecycleError> {
        let mut aside = Self { moved: Vec::new() };
        for suffix in SIDECAR_SUFFIXES {
            let original = sidecar_path(destination, suffix);
            let parked = sidecar_path(staged, &format!("{suffix}.previous"));
            match fs::rename(&original, &parked) {
                Ok(()) => aside.moved.push((original, parked)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    aside.restore();
                    return Err(LifecycleError::io("rename", &original, e));
                }
            }
        }
        Ok(aside)
    }

    fn restore(self) {
        for (original, parked) in self.moved {
            if let Err(e) = fs::rename(&parked, &original) {
                warn!(location = %original.display(), parked = %parked.display(), error = %e, "could not restore sidecar");
            }
        }
    }

    fn remove(self) {
        for (_, parked) in self.moved {
            if let Err(e) = remove_if_exists(&parked) {
                warn!(location = %parked.display(), error = %e, "could not remove previous sidecar");
            }
        }
    }
}

fn discard(staged: &Path) {
    if let Err(e) = remove_store_files(staged) {
        warn!(location = %staged.display(), error = %e, "could not remove staged copy");
    }
}

fn remove_store_files(location: &Path) -> Result<(), LifecycleError> {
    remove_if_exists(location)?;
    for suffix in SIDECAR_SUFFIXES {
        remove_if_exists(&sidecar_path(location, suffix))?;
    }
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<(), LifecycleError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(LifecycleError::io("remove", path, e)),
    }
}
