//! Contains the structs and traits that define a locksystem:
//! the authority that grants, refreshes, queries and revokes
//! Webdav locks.
use std::fmt::Debug;
use std::time::{Duration, SystemTime};

use xmltree::Element;

use crate::davpath::DavPath;

pub mod memls;

/// Type of the lock. Webdav (RFC4918) only defines write locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockType {
    Write,
}

/// A lock combination the locksystem supports. Static capability,
/// not an instance of a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockEntry {
    pub shared: bool,
    pub locktype: LockType,
}

/// An active lock grant.
#[derive(Debug, Clone)]
pub struct DavLock {
    /// Opaque token URI identifying this grant.
    pub token: String,
    /// The lock root.
    pub path: DavPath,
    /// User that owns the lock (if the handler was configured with one).
    pub principal: Option<String>,
    /// Opaque owner XML fragment supplied by the client.
    pub owner: Option<Element>,
    /// Absolute expiry time. `None` means the lock never expires.
    pub timeout_at: Option<SystemTime>,
    /// Requested timeout duration, for reporting back to the client.
    pub timeout: Option<Duration>,
    /// Shared or exclusive.
    pub shared: bool,
    /// Does the lock cover the whole subtree below its root.
    pub deep: bool,
}

impl DavLock {
    /// Has this grant expired.
    pub fn is_expired(&self) -> bool {
        match self.timeout_at {
            Some(t) => SystemTime::now() >= t,
            None => false,
        }
    }
}

/// The trait that defines a locksystem.
pub trait DavLockSystem: Debug + Send + Sync {
    /// Try to create a new lock on `path`. On conflict, the existing
    /// lock that caused the conflict is returned as the error.
    fn lock(
        &self,
        path: &DavPath,
        principal: Option<&str>,
        owner: Option<&Element>,
        timeout: Option<Duration>,
        shared: bool,
        deep: bool,
    ) -> Result<DavLock, DavLock>;

    /// Unlock a path, by token. `Err` if the token does not match any
    /// grant on this resource; no state is changed in that case.
    fn unlock(&self, path: &DavPath, token: &str) -> Result<(), ()>;

    /// Refresh a lock: recompute its expiry from `timeout`, or from
    /// its prior duration when `timeout` is `None`. `Some(None)` makes
    /// the lock infinite. Everything else (including the token) stays
    /// unchanged.
    fn refresh(
        &self,
        path: &DavPath,
        token: &str,
        timeout: Option<Option<Duration>>,
    ) -> Result<DavLock, ()>;

    /// Check if the relevant locks on `path` (and, with `deep`, below
    /// it) are all covered by the submitted tokens. On failure the
    /// first blocking lock is returned.
    fn check(
        &self,
        path: &DavPath,
        principal: Option<&str>,
        ignore_principal: bool,
        deep: bool,
        submitted_tokens: Vec<&str>,
    ) -> Result<(), DavLock>;

    /// All active locks covering `path` (own plus deep ancestors).
    fn discover(&self, path: &DavPath) -> Vec<DavLock>;

    /// Forget all locks rooted at or below `path` (the resource is gone).
    fn delete(&self, path: &DavPath) -> Result<(), ()>;

    /// The static list of supported lock combinations.
    fn supported_locks(&self) -> Vec<LockEntry> {
        vec![
            LockEntry {
                shared: false,
                locktype: LockType::Write,
            },
            LockEntry {
                shared: true,
                locktype: LockType::Write,
            },
        ]
    }
}
