//! Contains the structs and traits that define a backend filesystem:
//! the engine's abstract hierarchical store.
//!
//! You implement [`DavFileSystem`] (and usually [`DavFile`],
//! [`DavMetaData`], [`DavDirEntry`]) to plug a storage backend into the
//! handler. The bundled [`MemFs`](memfs::MemFs) is the reference
//! implementation and the one the tests run against.
use std::fmt::Debug;
use std::io;
use std::pin::Pin;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Buf, Bytes};
use futures_util::{future, Future, Stream};
use http::StatusCode;

use crate::davpath::DavPath;

pub mod memfs;

/// Errors generated by a filesystem implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    NotImplemented,
    GeneralFailure,
    Exists,
    NotFound,
    Forbidden,
    InsufficientStorage,
    LoopDetected,
    PathTooLong,
    TooLarge,
    IsRemote,
}

pub type FsResult<T> = Result<T, FsError>;

impl std::fmt::Display for FsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
impl std::error::Error for FsError {}

impl From<io::Error> for FsError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => FsError::NotFound,
            io::ErrorKind::PermissionDenied => FsError::Forbidden,
            io::ErrorKind::AlreadyExists => FsError::Exists,
            _ => FsError::GeneralFailure,
        }
    }
}

/// Future returned by almost all of the `DavFileSystem` methods.
pub type FsFuture<'a, T> = Pin<Box<dyn Future<Output = FsResult<T>> + Send + 'a>>;
/// Convenience alias for a boxed stream.
pub type FsStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

/// Re-export of `std::io::SeekFrom`, used by `DavFile::seek`.
pub use std::io::SeekFrom;

/// How a collection handles `Depth: infinity` PROPFIND requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfiniteDepth {
    /// Refuse with 403 and a `propfind-finite-depth` error body.
    Reject,
    /// Treat infinity as depth 0.
    AssumeZero,
    /// Treat infinity as depth 1.
    AssumeOne,
    /// Walk the entire subtree.
    Allow,
}

/// OpenOptions for `open()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenOptions {
    /// open for reading
    pub read: bool,
    /// open for writing
    pub write: bool,
    /// open in write-append mode
    pub append: bool,
    /// truncate file first when writing
    pub truncate: bool,
    /// create file if it doesn't exist
    pub create: bool,
    /// must create new file, fail if it already exists.
    pub create_new: bool,
}

impl OpenOptions {
    pub fn read() -> OpenOptions {
        OpenOptions {
            read: true,
            ..Default::default()
        }
    }

    pub fn write() -> OpenOptions {
        OpenOptions {
            write: true,
            create: true,
            truncate: true,
            ..Default::default()
        }
    }
}

/// A webdav "dead" property: client-defined metadata the store persists
/// verbatim (name, namespace, and serialized XML fragment).
#[derive(Debug, Clone)]
pub struct DavProp {
    pub name: String,
    pub prefix: Option<String>,
    pub namespace: Option<String>,
    pub xml: Option<Vec<u8>>,
}

/// The trait that defines a filesystem.
pub trait DavFileSystem: Send + Sync {
    /// Return the metadata of a file or directory.
    fn metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Box<dyn DavMetaData>>;

    /// Return a stream of the entries of a directory.
    ///
    /// The stream must be deterministic: recursive walks depend on its
    /// order for reproducible Multi-Status output.
    fn read_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, FsStream<Box<dyn DavDirEntry>>>;

    /// Open a file.
    fn open<'a>(&'a self, path: &'a DavPath, options: OpenOptions) -> FsFuture<'a, Box<dyn DavFile>>;

    /// Create a directory.
    fn create_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()>;

    /// Remove a directory. Only called when empty.
    fn remove_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()>;

    /// Remove a file.
    fn remove_file<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()>;

    /// Rename a file or directory, overwriting the destination.
    fn rename<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()>;

    /// Copy a single file (not recursive).
    fn copy<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()>;

    /// Can `rename` move this (collection) source to this destination
    /// natively? When false, MOVE falls back to create+move-children+delete.
    fn fast_move_ok<'a>(&'a self, _from: &'a DavPath, _to: &'a DavPath) -> FsFuture<'a, bool> {
        Box::pin(future::ready(Ok(true)))
    }

    /// Policy for `Depth: infinity` PROPFIND on collections.
    fn infinite_depth(&self) -> InfiniteDepth {
        InfiniteDepth::Reject
    }

    /// Does this filesystem store dead properties.
    fn have_props<'a>(&'a self, _path: &'a DavPath) -> FsFuture<'a, bool> {
        Box::pin(future::ready(Ok(false)))
    }

    /// Apply a set of property set/remove patches in order. The bool in
    /// each tuple is "set" (true) or "remove" (false). Returns the
    /// per-property result statuses.
    fn patch_props<'a>(
        &'a self,
        _path: &'a DavPath,
        _patch: Vec<(bool, DavProp)>,
    ) -> FsFuture<'a, Vec<(StatusCode, DavProp)>> {
        Box::pin(future::ready(Err(FsError::NotImplemented)))
    }

    /// List the dead properties. With `do_content` false only the names
    /// are filled in.
    fn get_props<'a>(&'a self, _path: &'a DavPath, _do_content: bool) -> FsFuture<'a, Vec<DavProp>> {
        Box::pin(future::ready(Err(FsError::NotImplemented)))
    }

    /// Get one dead property, as a serialized XML fragment.
    fn get_prop<'a>(&'a self, _path: &'a DavPath, _prop: DavProp) -> FsFuture<'a, Vec<u8>> {
        Box::pin(future::ready(Err(FsError::NotImplemented)))
    }

    /// Quota of this filesystem: (used, optional total).
    /// Feeding the quota-used/available properties; those are flagged
    /// "expensive" since this can hit the backing store hard.
    fn get_quota<'a>(&'a self) -> FsFuture<'a, (u64, Option<u64>)> {
        Box::pin(future::ready(Err(FsError::NotImplemented)))
    }
}

/// One directory entry.
pub trait DavDirEntry: Send + Sync {
    /// Name of the entry.
    fn name(&self) -> String;

    /// Metadata of the entry.
    fn metadata(&self) -> FsFuture<'_, Box<dyn DavMetaData>>;

    /// Is this entry a directory.
    fn is_dir(&self) -> FsFuture<'_, bool> {
        Box::pin(async move { Ok(self.metadata().await?.is_dir()) })
    }
}

/// An open file or item stream.
pub trait DavFile: Debug + Send {
    fn metadata(&mut self) -> FsFuture<'_, Box<dyn DavMetaData>>;
    fn write_buf(&mut self, buf: Box<dyn Buf + Send>) -> FsFuture<'_, ()>;
    fn write_bytes(&mut self, buf: Bytes) -> FsFuture<'_, ()>;
    /// Read up to `count` bytes at the current position. A short or
    /// empty result means end of file.
    fn read_bytes(&mut self, count: usize) -> FsFuture<'_, Bytes>;
    /// Seek. Non-seekable implementations return `FsError::NotImplemented`;
    /// the GET handler treats that as a hard error for ranged requests.
    fn seek(&mut self, pos: SeekFrom) -> FsFuture<'_, u64>;
    fn flush(&mut self) -> FsFuture<'_, ()>;
}

/// File or directory metadata.
pub trait DavMetaData: Debug + Send + Sync {
    fn len(&self) -> u64;
    fn modified(&self) -> FsResult<SystemTime>;
    fn is_dir(&self) -> bool;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_file(&self) -> bool {
        !self.is_dir()
    }

    fn created(&self) -> FsResult<SystemTime> {
        Err(FsError::NotImplemented)
    }

    fn accessed(&self) -> FsResult<SystemTime> {
        Err(FsError::NotImplemented)
    }

    fn executable(&self) -> FsResult<bool> {
        Err(FsError::NotImplemented)
    }

    /// Default etag, derived from modification time and length.
    fn etag(&self) -> Option<String> {
        let modified = self.modified().ok()?;
        let t = modified.duration_since(UNIX_EPOCH).ok()?;
        let t = t.as_secs() * 1_000_000 + t.subsec_nanos() as u64 / 1000;
        if self.is_file() {
            Some(format!("{:x}-{:x}", self.len(), t))
        } else {
            Some(format!("{t:x}"))
        }
    }
}
