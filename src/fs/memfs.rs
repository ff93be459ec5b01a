//! In-memory filesystem.
//!
//! Ephemeral, tree-backed store. Supports DAV (dead) properties, so it
//! can back the full PROPFIND/PROPPATCH surface. Mostly useful for
//! testing and as the reference `DavFileSystem` implementation.
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::{Buf, Bytes};
use futures_util::{future, stream, FutureExt};
use http::StatusCode;
use parking_lot::Mutex;

use crate::davpath::DavPath;
use crate::fs::*;
use crate::tree::{Tree, ROOT_ID};

type MemTree = Tree<MemFsNode>;

/// Ephemeral in memory filesystem.
pub struct MemFs {
    tree: Arc<Mutex<MemTree>>,
}

#[derive(Debug, Clone)]
enum MemFsNode {
    Dir(DirInfo),
    File(FileInfo),
}

#[derive(Debug, Clone)]
struct DirInfo {
    crtime: SystemTime,
    mtime: SystemTime,
    props: HashMap<String, DavProp>,
}

#[derive(Debug, Clone)]
struct FileInfo {
    crtime: SystemTime,
    mtime: SystemTime,
    props: HashMap<String, DavProp>,
    data: Vec<u8>,
}

#[derive(Debug, Clone)]
struct MemFsMetaData {
    is_dir: bool,
    len: u64,
    crtime: SystemTime,
    mtime: SystemTime,
}

struct MemFsFile {
    tree: Arc<Mutex<MemTree>>,
    id: usize,
    pos: usize,
    append: bool,
}

struct MemFsDirEntry {
    name: String,
    meta: MemFsMetaData,
}

impl MemFsNode {
    fn new_dir() -> MemFsNode {
        let now = SystemTime::now();
        MemFsNode::Dir(DirInfo {
            crtime: now,
            mtime: now,
            props: HashMap::new(),
        })
    }

    fn new_file() -> MemFsNode {
        let now = SystemTime::now();
        MemFsNode::File(FileInfo {
            crtime: now,
            mtime: now,
            props: HashMap::new(),
            data: Vec::new(),
        })
    }

    fn is_dir(&self) -> bool {
        matches!(self, MemFsNode::Dir(_))
    }

    fn meta(&self) -> MemFsMetaData {
        match self {
            MemFsNode::Dir(d) => MemFsMetaData {
                is_dir: true,
                len: 0,
                crtime: d.crtime,
                mtime: d.mtime,
            },
            MemFsNode::File(f) => MemFsMetaData {
                is_dir: false,
                len: f.data.len() as u64,
                crtime: f.crtime,
                mtime: f.mtime,
            },
        }
    }

    fn props(&self) -> &HashMap<String, DavProp> {
        match self {
            MemFsNode::Dir(d) => &d.props,
            MemFsNode::File(f) => &f.props,
        }
    }

    fn props_mut(&mut self) -> &mut HashMap<String, DavProp> {
        match self {
            MemFsNode::Dir(d) => &mut d.props,
            MemFsNode::File(f) => &mut f.props,
        }
    }
}

// Key a dead property by namespace + name.
fn propkey(ns: &Option<String>, name: &str) -> String {
    format!("{}:{}", ns.as_deref().unwrap_or(""), name)
}

fn cloned_prop(p: &DavProp, with_xml: bool) -> DavProp {
    DavProp {
        name: p.name.clone(),
        prefix: p.prefix.clone(),
        namespace: p.namespace.clone(),
        xml: if with_xml { p.xml.clone() } else { None },
    }
}

impl MemFs {
    /// Create a new, empty in-memory filesystem.
    pub fn new() -> Arc<MemFs> {
        Arc::new(MemFs {
            tree: Arc::new(Mutex::new(Tree::new(MemFsNode::new_dir()))),
        })
    }

    // Walk the path segments from the root.
    fn lookup(tree: &MemTree, path: &DavPath) -> FsResult<usize> {
        let mut id = ROOT_ID;
        for seg in path.as_str().split('/').filter(|s| !s.is_empty()) {
            id = tree.get_child(id, seg)?;
        }
        Ok(id)
    }

    // Resolve the parent collection, return (parent_id, file_name).
    fn lookup_parent<'b>(tree: &MemTree, path: &'b DavPath) -> FsResult<(usize, &'b str)> {
        let parent = Self::lookup(tree, &path.parent())?;
        if !tree.get_data(parent)?.is_dir() {
            return Err(FsError::NotFound);
        }
        let name = path.file_name();
        if name.is_empty() {
            return Err(FsError::Forbidden);
        }
        Ok((parent, name))
    }

    fn clone_subtree(tree: &mut MemTree, from: usize, dest_parent: usize, name: &str) -> FsResult<()> {
        let data = tree.get_data(from)?.clone();
        let new_id = tree.add_child(dest_parent, name, data, true)?;
        for (child_name, child_id) in tree.children(from)? {
            Self::clone_subtree(tree, child_id, new_id, &child_name)?;
        }
        Ok(())
    }

    fn sum_bytes(tree: &MemTree, id: usize) -> u64 {
        let own = match tree.get_data(id) {
            Ok(MemFsNode::File(f)) => f.data.len() as u64,
            _ => 0,
        };
        let children = tree
            .children(id)
            .map(|c| c.iter().map(|(_, cid)| Self::sum_bytes(tree, *cid)).sum())
            .unwrap_or(0);
        own + children
    }
}

impl DavFileSystem for MemFs {
    fn metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Box<dyn DavMetaData>> {
        async move {
            let tree = self.tree.lock();
            let id = Self::lookup(&tree, path)?;
            Ok(Box::new(tree.get_data(id)?.meta()) as Box<dyn DavMetaData>)
        }
        .boxed()
    }

    fn read_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, FsStream<Box<dyn DavDirEntry>>> {
        async move {
            trace!("FS: read_dir {path:?}");
            let tree = self.tree.lock();
            let id = Self::lookup(&tree, path)?;
            if !tree.get_data(id)?.is_dir() {
                return Err(FsError::Forbidden);
            }
            let mut entries: Vec<Box<dyn DavDirEntry>> = Vec::new();
            for (name, child) in tree.children(id)? {
                entries.push(Box::new(MemFsDirEntry {
                    name,
                    meta: tree.get_data(child)?.meta(),
                }));
            }
            Ok(Box::pin(stream::iter(entries)) as FsStream<Box<dyn DavDirEntry>>)
        }
        .boxed()
    }

    fn open<'a>(&'a self, path: &'a DavPath, options: OpenOptions) -> FsFuture<'a, Box<dyn DavFile>> {
        async move {
            trace!("FS: open {path:?}");
            let mut tree = self.tree.lock();
            let id = match Self::lookup(&tree, path) {
                Ok(id) => {
                    if options.create_new {
                        return Err(FsError::Exists);
                    }
                    match tree.get_data_mut(id)? {
                        MemFsNode::Dir(_) => return Err(FsError::Forbidden),
                        MemFsNode::File(f) => {
                            if options.truncate {
                                f.data.clear();
                                f.mtime = SystemTime::now();
                            }
                        }
                    }
                    id
                }
                Err(FsError::NotFound) if options.create || options.create_new => {
                    let (parent, name) = Self::lookup_parent(&tree, path)?;
                    tree.add_child(parent, name, MemFsNode::new_file(), false)?
                }
                Err(e) => return Err(e),
            };
            Ok(Box::new(MemFsFile {
                tree: self.tree.clone(),
                id,
                pos: 0,
                append: options.append,
            }) as Box<dyn DavFile>)
        }
        .boxed()
    }

    fn create_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: create_dir {path:?}");
            let mut tree = self.tree.lock();
            if Self::lookup(&tree, path).is_ok() {
                return Err(FsError::Exists);
            }
            let (parent, name) = Self::lookup_parent(&tree, path)?;
            tree.add_child(parent, name, MemFsNode::new_dir(), false)?;
            Ok(())
        }
        .boxed()
    }

    fn remove_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: remove_dir {path:?}");
            let mut tree = self.tree.lock();
            let id = Self::lookup(&tree, path)?;
            if !tree.get_data(id)?.is_dir() {
                return Err(FsError::Forbidden);
            }
            if !tree.children(id)?.is_empty() {
                return Err(FsError::GeneralFailure);
            }
            tree.delete_node(id)
        }
        .boxed()
    }

    fn remove_file<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: remove_file {path:?}");
            let mut tree = self.tree.lock();
            let id = Self::lookup(&tree, path)?;
            if tree.get_data(id)?.is_dir() {
                return Err(FsError::Forbidden);
            }
            tree.delete_node(id)
        }
        .boxed()
    }

    fn rename<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: rename {from:?} {to:?}");
            let mut tree = self.tree.lock();
            let id = Self::lookup(&tree, from)?;
            let (dest_parent, dest_name) = Self::lookup_parent(&tree, to)?;
            tree.move_node(id, dest_parent, dest_name, true)
        }
        .boxed()
    }

    fn copy<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: copy {from:?} {to:?}");
            let mut tree = self.tree.lock();
            let id = Self::lookup(&tree, from)?;
            let (dest_parent, dest_name) = Self::lookup_parent(&tree, to)?;
            // single-node copy; the handler walks collections itself.
            let data = match tree.get_data(id)? {
                MemFsNode::Dir(_) => MemFsNode::new_dir(),
                file => file.clone(),
            };
            tree.add_child(dest_parent, dest_name, data, true)?;
            Ok(())
        }
        .boxed()
    }

    fn infinite_depth(&self) -> InfiniteDepth {
        InfiniteDepth::Allow
    }

    fn have_props<'a>(&'a self, _path: &'a DavPath) -> FsFuture<'a, bool> {
        Box::pin(future::ready(Ok(true)))
    }

    fn patch_props<'a>(
        &'a self,
        path: &'a DavPath,
        patch: Vec<(bool, DavProp)>,
    ) -> FsFuture<'a, Vec<(StatusCode, DavProp)>> {
        async move {
            let mut tree = self.tree.lock();
            let id = Self::lookup(&tree, path)?;
            let props = tree.get_data_mut(id)?.props_mut();
            let mut result = Vec::new();
            for (set, prop) in patch {
                let key = propkey(&prop.namespace, &prop.name);
                let status = if set {
                    props.insert(key, cloned_prop(&prop, true));
                    StatusCode::OK
                } else if props.remove(&key).is_some() {
                    StatusCode::OK
                } else {
                    StatusCode::NOT_FOUND
                };
                result.push((status, cloned_prop(&prop, false)));
            }
            Ok(result)
        }
        .boxed()
    }

    fn get_props<'a>(&'a self, path: &'a DavPath, do_content: bool) -> FsFuture<'a, Vec<DavProp>> {
        async move {
            let tree = self.tree.lock();
            let id = Self::lookup(&tree, path)?;
            let mut props: Vec<DavProp> = tree
                .get_data(id)?
                .props()
                .values()
                .map(|p| cloned_prop(p, do_content))
                .collect();
            props.sort_by(|a, b| (propkey(&a.namespace, &a.name)).cmp(&propkey(&b.namespace, &b.name)));
            Ok(props)
        }
        .boxed()
    }

    fn get_prop<'a>(&'a self, path: &'a DavPath, prop: DavProp) -> FsFuture<'a, Vec<u8>> {
        async move {
            let tree = self.tree.lock();
            let id = Self::lookup(&tree, path)?;
            tree.get_data(id)?
                .props()
                .get(&propkey(&prop.namespace, &prop.name))
                .and_then(|p| p.xml.clone())
                .ok_or(FsError::NotFound)
        }
        .boxed()
    }

    fn get_quota<'a>(&'a self) -> FsFuture<'a, (u64, Option<u64>)> {
        async move {
            let tree = self.tree.lock();
            Ok((Self::sum_bytes(&tree, ROOT_ID), None))
        }
        .boxed()
    }
}

impl DavMetaData for MemFsMetaData {
    fn len(&self) -> u64 {
        self.len
    }
    fn modified(&self) -> FsResult<SystemTime> {
        Ok(self.mtime)
    }
    fn created(&self) -> FsResult<SystemTime> {
        Ok(self.crtime)
    }
    fn is_dir(&self) -> bool {
        self.is_dir
    }
}

impl DavDirEntry for MemFsDirEntry {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn metadata(&self) -> FsFuture<'_, Box<dyn DavMetaData>> {
        Box::pin(future::ready(Ok(
            Box::new(self.meta.clone()) as Box<dyn DavMetaData>
        )))
    }
}

impl fmt::Debug for MemFsFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemFsFile").field("id", &self.id).finish()
    }
}

impl MemFsFile {
    fn with_file<T>(&self, f: impl FnOnce(&mut FileInfo) -> FsResult<T>) -> FsResult<T> {
        let mut tree = self.tree.lock();
        match tree.get_data_mut(self.id)? {
            MemFsNode::Dir(_) => Err(FsError::Forbidden),
            MemFsNode::File(file) => f(file),
        }
    }
}

impl DavFile for MemFsFile {
    fn metadata(&mut self) -> FsFuture<'_, Box<dyn DavMetaData>> {
        async move {
            let tree = self.tree.lock();
            Ok(Box::new(tree.get_data(self.id)?.meta()) as Box<dyn DavMetaData>)
        }
        .boxed()
    }

    fn write_bytes(&mut self, buf: Bytes) -> FsFuture<'_, ()> {
        self.write_buf(Box::new(buf))
    }

    fn write_buf(&mut self, mut buf: Box<dyn Buf + Send>) -> FsFuture<'_, ()> {
        async move {
            let (pos, append) = (self.pos, self.append);
            let end = self.with_file(|file| {
                let mut pos = if append { file.data.len() } else { pos };
                while buf.has_remaining() {
                    let chunk = buf.chunk();
                    if pos + chunk.len() > file.data.len() {
                        file.data.resize(pos + chunk.len(), 0);
                    }
                    file.data[pos..pos + chunk.len()].copy_from_slice(chunk);
                    pos += chunk.len();
                    let l = chunk.len();
                    buf.advance(l);
                }
                file.mtime = SystemTime::now();
                Ok(pos)
            })?;
            self.pos = end;
            Ok(())
        }
        .boxed()
    }

    fn read_bytes(&mut self, count: usize) -> FsFuture<'_, Bytes> {
        async move {
            let pos = self.pos;
            let data = self.with_file(|file| {
                let start = pos.min(file.data.len());
                let end = (pos + count).min(file.data.len());
                Ok(Bytes::copy_from_slice(&file.data[start..end]))
            })?;
            self.pos += data.len();
            Ok(data)
        }
        .boxed()
    }

    fn seek(&mut self, pos: SeekFrom) -> FsFuture<'_, u64> {
        async move {
            let len = self.with_file(|file| Ok(file.data.len() as i64))?;
            let newpos = match pos {
                SeekFrom::Start(p) => p as i64,
                SeekFrom::End(p) => len + p,
                SeekFrom::Current(p) => self.pos as i64 + p,
            };
            if newpos < 0 {
                return Err(FsError::GeneralFailure);
            }
            self.pos = newpos as usize;
            Ok(self.pos as u64)
        }
        .boxed()
    }

    fn flush(&mut self) -> FsFuture<'_, ()> {
        Box::pin(future::ready(Ok(())))
    }
}
