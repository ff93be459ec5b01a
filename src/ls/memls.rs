//! In-memory locksystem.
//!
//! The authoritative lock table of the engine: a nested map from
//! resource key to lock type to the active grants, behind one mutex.
//!
//! Expired grants are filtered out lazily whenever a key is queried or
//! mutated; there is no background eviction, so a grant on a key that
//! is never touched again stays in the table. Known and intentional.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use uuid::Uuid;
use xmltree::Element;

use crate::davpath::DavPath;
use crate::ls::*;

type LockTable = HashMap<String, HashMap<LockType, Vec<DavLock>>>;

/// In-memory locksystem.
#[derive(Debug)]
pub struct MemLs {
    table: Mutex<LockTable>,
}

// Resource key: the decoded path without a trailing slash, so that
// "/a" and "/a/" address the same resource.
fn key_of(path: &DavPath) -> String {
    let s = path.as_str();
    if s.len() > 1 {
        s.trim_end_matches('/').to_string()
    } else {
        s.to_string()
    }
}

// Keys of the ancestors, nearest first. "/a/b" yields "/a", "/".
fn ancestors(key: &str) -> Vec<String> {
    let mut v = Vec::new();
    let mut k = key;
    while k != "/" {
        let idx = k.rfind('/').unwrap_or(0);
        k = if idx == 0 { "/" } else { &k[..idx] };
        v.push(k.to_string());
    }
    v
}

fn is_beneath(key: &str, base: &str) -> bool {
    if base == "/" {
        return true;
    }
    match key.strip_prefix(base) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

impl MemLs {
    /// Create a new in-memory locksystem.
    pub fn new() -> Arc<MemLs> {
        Arc::new(MemLs {
            table: Mutex::new(HashMap::new()),
        })
    }

    // Drop expired grants for one key, and the key itself if that
    // leaves it empty.
    fn purge_key(table: &mut LockTable, key: &str) {
        if let Some(types) = table.get_mut(key) {
            for locks in types.values_mut() {
                locks.retain(|l| !l.is_expired());
            }
            types.retain(|_, locks| !locks.is_empty());
            if types.is_empty() {
                table.remove(key);
            }
        }
    }

    // All live grants that apply to `key`: grants on the key itself,
    // deep grants on ancestors, and (if `deep`) any grant below it.
    fn applicable(table: &LockTable, key: &str, deep: bool) -> Vec<DavLock> {
        let mut found = Vec::new();
        for (k, types) in table.iter() {
            let applies = k == key
                || (is_beneath(key, k) && k != key)
                || (deep && is_beneath(k, key) && k != key);
            if !applies {
                continue;
            }
            for locks in types.values() {
                for lock in locks.iter().filter(|l| !l.is_expired()) {
                    // an ancestor grant only applies when it is deep.
                    if is_beneath(key, k) && k != key && !lock.deep {
                        continue;
                    }
                    found.push(lock.clone());
                }
            }
        }
        found
    }

    // Find a grant by token on `key` or any of its ancestors.
    // Returns (owning key, index path) so callers can mutate it.
    fn find_by_token<'t>(
        table: &'t mut LockTable,
        key: &str,
        token: &str,
    ) -> Option<&'t mut DavLock> {
        let mut keys = vec![key.to_string()];
        keys.extend(ancestors(key));
        for k in keys {
            let hit = table
                .get(&k)
                .map(|types| {
                    types
                        .values()
                        .flatten()
                        .any(|l| l.token == token && !l.is_expired())
                })
                .unwrap_or(false);
            if hit {
                return table
                    .get_mut(&k)
                    .and_then(|types| {
                        types
                            .values_mut()
                            .flatten()
                            .find(|l| l.token == token && !l.is_expired())
                    });
            }
        }
        None
    }
}

impl DavLockSystem for MemLs {
    fn lock(
        &self,
        path: &DavPath,
        principal: Option<&str>,
        owner: Option<&Element>,
        timeout: Option<Duration>,
        shared: bool,
        deep: bool,
    ) -> Result<DavLock, DavLock> {
        let key = key_of(path);
        let mut table = self.table.lock();
        Self::purge_key(&mut table, &key);

        // An exclusive grant blocks everything; existing shared grants
        // block a new exclusive but not a new shared.
        for existing in Self::applicable(&table, &key, deep) {
            if !existing.shared || !shared {
                debug!("lock conflict on {key} with {}", existing.token);
                return Err(existing);
            }
        }

        let lock = DavLock {
            token: format!("opaquelocktoken:{}", Uuid::new_v4()),
            path: path.clone(),
            principal: principal.map(|s| s.to_string()),
            owner: owner.cloned(),
            timeout_at: timeout.map(|d| SystemTime::now() + d),
            timeout,
            shared,
            deep,
        };
        debug!("lock {} created on {key}", lock.token);
        table
            .entry(key)
            .or_default()
            .entry(LockType::Write)
            .or_default()
            .push(lock.clone());
        Ok(lock)
    }

    fn unlock(&self, path: &DavPath, token: &str) -> Result<(), ()> {
        let key = key_of(path);
        let mut table = self.table.lock();
        let mut keys = vec![key.clone()];
        keys.extend(ancestors(&key));
        for k in keys {
            let found = table
                .get(&k)
                .map(|types| types.values().flatten().any(|l| l.token == token))
                .unwrap_or(false);
            if found {
                if let Some(types) = table.get_mut(&k) {
                    for locks in types.values_mut() {
                        locks.retain(|l| l.token != token);
                    }
                }
                Self::purge_key(&mut table, &k);
                debug!("unlock {token} on {k}");
                return Ok(());
            }
        }
        Err(())
    }

    fn refresh(
        &self,
        path: &DavPath,
        token: &str,
        timeout: Option<Option<Duration>>,
    ) -> Result<DavLock, ()> {
        let key = key_of(path);
        let mut table = self.table.lock();
        match Self::find_by_token(&mut table, &key, token) {
            Some(lock) => {
                debug!("refresh lock {token}");
                // no requested timeout keeps the prior duration.
                if let Some(t) = timeout {
                    lock.timeout = t;
                }
                lock.timeout_at = lock.timeout.map(|d| SystemTime::now() + d);
                Ok(lock.clone())
            }
            None => Err(()),
        }
    }

    fn check(
        &self,
        path: &DavPath,
        principal: Option<&str>,
        ignore_principal: bool,
        deep: bool,
        submitted_tokens: Vec<&str>,
    ) -> Result<(), DavLock> {
        let key = key_of(path);
        let table = self.table.lock();
        for lock in Self::applicable(&table, &key, deep) {
            let token_ok = submitted_tokens.contains(&lock.token.as_str());
            let principal_ok = ignore_principal
                || lock.principal.is_none()
                || lock.principal.as_deref() == principal;
            if !token_ok || !principal_ok {
                return Err(lock);
            }
        }
        Ok(())
    }

    fn discover(&self, path: &DavPath) -> Vec<DavLock> {
        let key = key_of(path);
        let table = self.table.lock();
        Self::applicable(&table, &key, false)
    }

    fn delete(&self, path: &DavPath) -> Result<(), ()> {
        let key = key_of(path);
        let mut table = self.table.lock();
        table.retain(|k, _| !is_beneath(k, &key));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> DavPath {
        DavPath::new(s, "").unwrap()
    }

    fn secs(n: u64) -> Option<Duration> {
        Some(Duration::from_secs(n))
    }

    #[test]
    fn exclusive_blocks_everything() {
        let ls = MemLs::new();
        let l1 = ls.lock(&p("/f"), None, None, secs(60), false, false).unwrap();
        assert!(ls.lock(&p("/f"), None, None, secs(60), false, false).is_err());
        assert!(ls.lock(&p("/f"), None, None, secs(60), true, false).is_err());
        ls.unlock(&p("/f"), &l1.token).unwrap();
        assert!(ls.lock(&p("/f"), None, None, secs(60), false, false).is_ok());
    }

    #[test]
    fn shared_allows_shared_blocks_exclusive() {
        let ls = MemLs::new();
        ls.lock(&p("/f"), None, None, secs(60), true, false).unwrap();
        assert!(ls.lock(&p("/f"), None, None, secs(60), true, false).is_ok());
        assert!(ls.lock(&p("/f"), None, None, secs(60), false, false).is_err());
    }

    #[test]
    fn unlock_wrong_token_keeps_grant() {
        let ls = MemLs::new();
        let l1 = ls.lock(&p("/f"), None, None, secs(60), false, false).unwrap();
        assert!(ls.unlock(&p("/f"), "opaquelocktoken:nope").is_err());
        assert_eq!(ls.discover(&p("/f")).len(), 1);
        ls.unlock(&p("/f"), &l1.token).unwrap();
    }

    #[test]
    fn refresh_extends_and_keeps_token() {
        let ls = MemLs::new();
        let l1 = ls.lock(&p("/f"), None, None, secs(1), false, false).unwrap();
        let l2 = ls.refresh(&p("/f"), &l1.token, Some(secs(3600))).unwrap();
        assert_eq!(l1.token, l2.token);
        assert!(l2.timeout_at.unwrap() > l1.timeout_at.unwrap());
        assert!(ls
            .refresh(&p("/f"), "opaquelocktoken:nope", Some(secs(60)))
            .is_err());
    }

    #[test]
    fn refresh_without_timeout_keeps_prior_duration() {
        let ls = MemLs::new();
        let l1 = ls.lock(&p("/f"), None, None, secs(60), false, false).unwrap();
        let l2 = ls.refresh(&p("/f"), &l1.token, None).unwrap();
        assert_eq!(l2.timeout, secs(60));
        assert!(l2.timeout_at.is_some());
        // an infinite lock stays infinite across such a refresh.
        let l3 = ls.refresh(&p("/f"), &l1.token, Some(None)).unwrap();
        assert_eq!(l3.timeout, None);
        assert!(l3.timeout_at.is_none());
        let l4 = ls.refresh(&p("/f"), &l1.token, None).unwrap();
        assert_eq!(l4.timeout, None);
        assert!(l4.timeout_at.is_none());
    }

    #[test]
    fn refresh_can_switch_between_finite_and_infinite() {
        let ls = MemLs::new();
        let l1 = ls.lock(&p("/f"), None, None, secs(60), false, false).unwrap();
        let l2 = ls.refresh(&p("/f"), &l1.token, Some(None)).unwrap();
        assert_eq!(l2.timeout, None);
        assert!(!l2.is_expired());
        let l3 = ls.refresh(&p("/f"), &l1.token, Some(secs(30))).unwrap();
        assert_eq!(l3.timeout, secs(30));
        assert!(l3.timeout_at.is_some());
    }

    #[test]
    fn expired_locks_are_invisible() {
        let ls = MemLs::new();
        let l1 = ls.lock(&p("/f"), None, None, secs(0), false, false).unwrap();
        assert!(ls.discover(&p("/f")).is_empty());
        assert!(ls.check(&p("/f"), None, false, false, vec![]).is_ok());
        assert!(ls.refresh(&p("/f"), &l1.token, Some(secs(60))).is_err());
        // and a new lock can be granted right away.
        assert!(ls.lock(&p("/f"), None, None, secs(60), false, false).is_ok());
    }

    #[test]
    fn deep_lock_covers_descendants() {
        let ls = MemLs::new();
        let l1 = ls.lock(&p("/a/"), None, None, secs(60), false, true).unwrap();
        assert!(ls.lock(&p("/a/b"), None, None, secs(60), false, false).is_err());
        assert!(ls.check(&p("/a/b"), None, false, false, vec![]).is_err());
        assert!(ls
            .check(&p("/a/b"), None, false, false, vec![&l1.token])
            .is_ok());
        assert_eq!(ls.discover(&p("/a/b")).len(), 1);
        // a shallow lock on /a does not cover /a/b.
        ls.unlock(&p("/a/"), &l1.token).unwrap();
        ls.lock(&p("/a/"), None, None, secs(60), false, false).unwrap();
        assert!(ls.check(&p("/a/b"), None, false, false, vec![]).is_ok());
    }

    #[test]
    fn deep_request_sees_descendant_locks() {
        let ls = MemLs::new();
        ls.lock(&p("/a/b"), None, None, secs(60), false, false).unwrap();
        assert!(ls.lock(&p("/a/"), None, None, secs(60), false, true).is_err());
        assert!(ls.check(&p("/a/"), None, false, true, vec![]).is_err());
    }

    #[test]
    fn delete_forgets_subtree() {
        let ls = MemLs::new();
        ls.lock(&p("/a/b"), None, None, secs(60), false, false).unwrap();
        ls.delete(&p("/a/")).unwrap();
        assert!(ls.discover(&p("/a/b")).is_empty());
    }
}
