//! Points inside an inline document.
//!
//! ## Learning: Derived Ordering
//!
//! `#[derive(PartialOrd, Ord)]` compares fields in declaration order.
//! `Vec<usize>` already orders lexicographically, so a point compares by
//! its node path first and its offset second: exactly document order.

use serde::{Deserialize, Serialize};

/// Index path from the roots of an inline document down to a node.
///
/// `path[0]` selects a root element, every further index selects a child.
/// A path is only a lookup key; it never holds a reference into the tree.
pub type NodePath = Vec<usize>;

/// A position inside a text leaf.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Point {
    /// Path to a text leaf
    pub path: NodePath,
    /// Byte offset inside the leaf's text
    pub offset: usize,
}

impl Point {
    pub fn new(path: impl Into<NodePath>, offset: usize) -> Self {
        Self {
            path: path.into(),
            offset,
        }
    }

    /// Returns true if this point is before another in document order.
    pub fn is_before(&self, other: &Point) -> bool {
        self < other
    }

    /// Returns true if this point is after another in document order.
    pub fn is_after(&self, other: &Point) -> bool {
        self > other
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let path: Vec<String> = self.path.iter().map(|ix| ix.to_string()).collect();
        write!(f, "[{}]:{}", path.join(","), self.offset)
    }
}

/// Returns true if `ancestor` is a strict prefix of `path`.
pub fn is_ancestor(ancestor: &[usize], path: &[usize]) -> bool {
    ancestor.len() < path.len() && path.starts_with(ancestor)
}

/// Returns the parent path, or `None` for a root path.
pub fn parent(path: &[usize]) -> Option<&[usize]> {
    path.split_last().map(|(_, parent)| parent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_ordering() {
        let a = Point::new(vec![0, 0], 5);
        let b = Point::new(vec![0, 1], 0);
        let c = Point::new(vec![0, 1], 3);

        assert!(a.is_before(&b));
        assert!(b.is_before(&c));
        assert!(c.is_after(&a));
        assert_eq!(a.clone().min(c.clone()), a);
    }

    #[test]
    fn test_nested_path_orders_after_parent_siblings() {
        let shallow = Point::new(vec![0, 0], 9);
        let nested = Point::new(vec![0, 1, 0], 0);
        assert!(shallow < nested);
    }

    #[test]
    fn test_path_helpers() {
        assert!(is_ancestor(&[0], &[0, 2]));
        assert!(!is_ancestor(&[0, 2], &[0, 2]));
        assert_eq!(parent(&[1, 2, 3]), Some(&[1, 2][..]));
        assert_eq!(parent(&[]), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Point::new(vec![0, 3], 2).to_string(), "[0,3]:2");
    }
}
