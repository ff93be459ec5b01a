//
// A simple id-based tree, used by the in-memory filesystem.
// Nodes are slab-allocated; child names map to node ids in sorted
// order so directory listings are deterministic.
//
use std::collections::BTreeMap;

use crate::fs::{FsError, FsResult};

pub(crate) const ROOT_ID: usize = 0;

struct Node<V> {
    parent: usize,
    children: BTreeMap<String, usize>,
    data: V,
}

pub(crate) struct Tree<V> {
    nodes: Vec<Option<Node<V>>>,
    free: Vec<usize>,
}

impl<V> Tree<V> {
    pub fn new(root_data: V) -> Tree<V> {
        Tree {
            nodes: vec![Some(Node {
                parent: ROOT_ID,
                children: BTreeMap::new(),
                data: root_data,
            })],
            free: Vec::new(),
        }
    }

    fn node(&self, id: usize) -> FsResult<&Node<V>> {
        self.nodes
            .get(id)
            .and_then(|n| n.as_ref())
            .ok_or(FsError::NotFound)
    }

    fn node_mut(&mut self, id: usize) -> FsResult<&mut Node<V>> {
        self.nodes
            .get_mut(id)
            .and_then(|n| n.as_mut())
            .ok_or(FsError::NotFound)
    }

    pub fn get_data(&self, id: usize) -> FsResult<&V> {
        Ok(&self.node(id)?.data)
    }

    pub fn get_data_mut(&mut self, id: usize) -> FsResult<&mut V> {
        Ok(&mut self.node_mut(id)?.data)
    }

    pub fn get_child(&self, parent: usize, name: &str) -> FsResult<usize> {
        self.node(parent)?
            .children
            .get(name)
            .copied()
            .ok_or(FsError::NotFound)
    }

    /// Names and ids of the children, in name order.
    pub fn children(&self, parent: usize) -> FsResult<Vec<(String, usize)>> {
        Ok(self
            .node(parent)?
            .children
            .iter()
            .map(|(name, id)| (name.clone(), *id))
            .collect())
    }

    pub fn add_child(
        &mut self,
        parent: usize,
        name: &str,
        data: V,
        overwrite: bool,
    ) -> FsResult<usize> {
        if let Ok(existing) = self.get_child(parent, name) {
            if !overwrite {
                return Err(FsError::Exists);
            }
            self.delete_subtree(existing)?;
        }
        let id = match self.free.pop() {
            Some(id) => id,
            None => {
                self.nodes.push(None);
                self.nodes.len() - 1
            }
        };
        self.nodes[id] = Some(Node {
            parent,
            children: BTreeMap::new(),
            data,
        });
        self.node_mut(parent)?.children.insert(name.to_string(), id);
        Ok(id)
    }

    /// Remove a leaf or an entire subtree.
    pub fn delete_node(&mut self, id: usize) -> FsResult<()> {
        if id == ROOT_ID {
            return Err(FsError::Forbidden);
        }
        let parent = self.node(id)?.parent;
        self.node_mut(parent)?.children.retain(|_, v| *v != id);
        self.delete_subtree(id)
    }

    fn delete_subtree(&mut self, id: usize) -> FsResult<()> {
        let children: Vec<usize> = self.node(id)?.children.values().copied().collect();
        for child in children {
            self.delete_subtree(child)?;
        }
        self.nodes[id] = None;
        self.free.push(id);
        Ok(())
    }

    /// Re-link a node under a new parent/name. The node id (and thus
    /// any open handle to it) stays valid.
    pub fn move_node(
        &mut self,
        id: usize,
        dest_parent: usize,
        dest_name: &str,
        overwrite: bool,
    ) -> FsResult<()> {
        if id == ROOT_ID {
            return Err(FsError::Forbidden);
        }
        // refuse to move a node below itself.
        let mut walk = dest_parent;
        loop {
            if walk == id {
                return Err(FsError::LoopDetected);
            }
            if walk == ROOT_ID {
                break;
            }
            walk = self.node(walk)?.parent;
        }
        if let Ok(existing) = self.get_child(dest_parent, dest_name) {
            if existing == id {
                return Ok(());
            }
            if !overwrite {
                return Err(FsError::Exists);
            }
            self.delete_node(existing)?;
        }
        let old_parent = self.node(id)?.parent;
        self.node_mut(old_parent)?.children.retain(|_, v| *v != id);
        self.node_mut(dest_parent)?
            .children
            .insert(dest_name.to_string(), id);
        self.node_mut(id)?.parent = dest_parent;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_get_delete() {
        let mut t = Tree::new(());
        let a = t.add_child(ROOT_ID, "a", (), false).unwrap();
        let b = t.add_child(a, "b", (), false).unwrap();
        assert_eq!(t.get_child(ROOT_ID, "a").unwrap(), a);
        assert_eq!(t.get_child(a, "b").unwrap(), b);
        assert_eq!(t.add_child(ROOT_ID, "a", (), false), Err(FsError::Exists));
        t.delete_node(a).unwrap();
        assert_eq!(t.get_child(ROOT_ID, "a"), Err(FsError::NotFound));
        assert!(t.get_data(b).is_err());
    }

    #[test]
    fn move_keeps_id_and_detects_loops() {
        let mut t = Tree::new(0u32);
        let a = t.add_child(ROOT_ID, "a", 1u32, false).unwrap();
        let b = t.add_child(ROOT_ID, "b", 2u32, false).unwrap();
        t.move_node(a, b, "a2", false).unwrap();
        assert_eq!(t.get_child(b, "a2").unwrap(), a);
        assert_eq!(*t.get_data(a).unwrap(), 1);
        assert_eq!(t.move_node(b, a, "x", false), Err(FsError::LoopDetected));
    }

    #[test]
    fn children_sorted() {
        let mut t = Tree::new(());
        t.add_child(ROOT_ID, "zz", (), false).unwrap();
        t.add_child(ROOT_ID, "aa", (), false).unwrap();
        let names: Vec<String> = t
            .children(ROOT_ID)
            .unwrap()
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(names, vec!["aa", "zz"]);
    }
}
