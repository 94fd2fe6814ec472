//! The inline document of a single block.
//!
//! ## Learning: Paths Instead of Parent Pointers
//!
//! A tree with parent back-pointers needs `Rc<RefCell<_>>` or raw pointers
//! in Rust. Addressing nodes by index paths (`[root, child, grandchild]`)
//! keeps ownership a plain `Vec` of owned elements: every lookup walks down
//! from the roots, and a path is just a key that may go stale after an edit.
//! The engine re-maps the selection whenever an edit shifts paths.

use std::sync::Arc;

use unicode_segmentation::UnicodeSegmentation;

use crate::extension::InlineExtension;
use crate::node::{Descendant, Element, Props, Text};
use crate::point::{NodePath, Point};
use crate::selection::Range;
use crate::{InlineError, InlineResult};

/// Upper bound on extension normalization passes per edit.
const MAX_NORMALIZE_PASSES: usize = 32;

/// Editable inline content of one block plus its selection.
#[derive(Clone, Default)]
pub struct InlineDocument {
    /// Root elements of the block
    children: Vec<Element>,

    /// Current selection, if this document holds focus
    selection: Option<Range>,

    /// Behaviour contributed by plugins
    extensions: Vec<Arc<dyn InlineExtension>>,

    /// Nesting depth of `without_normalizing` calls
    suspended: usize,
}

impl std::fmt::Debug for InlineDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let extensions: Vec<&str> = self.extensions.iter().map(|ext| ext.id()).collect();
        f.debug_struct("InlineDocument")
            .field("children", &self.children)
            .field("selection", &self.selection)
            .field("extensions", &extensions)
            .finish()
    }
}

impl InlineDocument {
    /// Creates a document over the given roots and normalizes it.
    pub fn new(children: Vec<Element>) -> Self {
        let mut doc = Self {
            children,
            ..Self::default()
        };
        doc.normalize();
        doc
    }

    /// Creates a document with plugin extensions installed.
    pub fn with_extensions(
        children: Vec<Element>,
        extensions: Vec<Arc<dyn InlineExtension>>,
    ) -> Self {
        let mut doc = Self {
            children,
            extensions,
            ..Self::default()
        };
        doc.normalize();
        doc
    }

    // ==================== Access ====================

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    pub fn into_children(self) -> Vec<Element> {
        self.children
    }

    /// Replaces the content, keeping the selection where it still fits.
    pub fn set_children(&mut self, children: Vec<Element>) {
        self.children = children;
        self.normalize();
    }

    pub fn selection(&self) -> Option<&Range> {
        self.selection.as_ref()
    }

    /// Concatenated text of all roots.
    pub fn text(&self) -> String {
        crate::node::roots_text(&self.children)
    }

    /// Returns true if the document holds no text.
    pub fn is_blank(&self) -> bool {
        self.text_paths()
            .iter()
            .all(|path| self.leaf(path).is_none_or(|leaf| leaf.text.is_empty()))
    }

    /// Returns the element at `path`.
    pub fn element(&self, path: &[usize]) -> Option<&Element> {
        element_at(&self.children, path)
    }

    /// Returns the text leaf at `path`.
    pub fn leaf(&self, path: &[usize]) -> Option<&Text> {
        leaf_at(&self.children, path)
    }

    pub fn is_void(&self, element: &Element) -> bool {
        element.is_void() || self.extensions.iter().any(|ext| ext.is_void(element))
    }

    pub fn is_inline(&self, element: &Element) -> bool {
        element.is_inline() || self.extensions.iter().any(|ext| ext.is_inline(element))
    }

    /// Paths of every editable text leaf, in document order.
    pub fn text_paths(&self) -> Vec<NodePath> {
        let mut out = Vec::new();
        for (ix, root) in self.children.iter().enumerate() {
            let mut path = vec![ix];
            self.collect_text_paths(root, &mut path, &mut out);
        }
        out
    }

    fn collect_text_paths(&self, el: &Element, path: &mut NodePath, out: &mut Vec<NodePath>) {
        if self.is_void(el) {
            return;
        }
        for (ix, child) in el.children.iter().enumerate() {
            path.push(ix);
            match child {
                Descendant::Text(_) => out.push(path.clone()),
                Descendant::Element(child) => self.collect_text_paths(child, path, out),
            }
            path.pop();
        }
    }

    /// Paths of every element, parents before children.
    pub fn element_paths(&self) -> Vec<NodePath> {
        fn walk(el: &Element, path: &mut NodePath, out: &mut Vec<NodePath>) {
            out.push(path.clone());
            for (ix, child) in el.children.iter().enumerate() {
                if let Descendant::Element(child) = child {
                    path.push(ix);
                    walk(child, path, out);
                    path.pop();
                }
            }
        }

        let mut out = Vec::new();
        for (ix, root) in self.children.iter().enumerate() {
            walk(root, &mut vec![ix], &mut out);
        }
        out
    }

    /// First editable position, if any text leaf exists.
    pub fn start_point(&self) -> Option<Point> {
        self.text_paths()
            .into_iter()
            .next()
            .map(|path| Point::new(path, 0))
    }

    /// Last editable position, if any text leaf exists.
    pub fn end_point(&self) -> Option<Point> {
        let path = self.text_paths().pop()?;
        let len = self.leaf(&path).map_or(0, |leaf| leaf.text.len());
        Some(Point::new(path, len))
    }

    /// Absolute text offset of a point, counted over all leaves.
    pub fn offset_of(&self, point: &Point) -> Option<usize> {
        let mut acc = 0;
        for path in self.text_paths() {
            let len = self.leaf(&path).map_or(0, |leaf| leaf.text.len());
            if path == point.path {
                return Some(acc + point.offset.min(len));
            }
            acc += len;
        }
        None
    }

    /// Point at an absolute text offset; offsets past the end map to the end.
    pub fn point_at(&self, offset: usize) -> Option<Point> {
        let mut acc = 0;
        for path in self.text_paths() {
            let len = self.leaf(&path).map_or(0, |leaf| leaf.text.len());
            if offset <= acc + len {
                return Some(Point::new(path, offset - acc));
            }
            acc += len;
        }
        self.end_point()
    }

    // ==================== Selection ====================

    /// Selects a range; both edges must address existing text.
    pub fn select(&mut self, range: Range) -> InlineResult<()> {
        self.check_point(&range.anchor)?;
        self.check_point(&range.focus)?;
        self.selection = Some(range);
        Ok(())
    }

    /// Drops the selection.
    pub fn deselect(&mut self) {
        self.selection = None;
    }

    fn check_point(&self, point: &Point) -> InlineResult<()> {
        match self.leaf(&point.path) {
            Some(leaf)
                if point.offset <= leaf.text.len() && leaf.text.is_char_boundary(point.offset) =>
            {
                Ok(())
            }
            _ => Err(InlineError::InvalidPoint(point.clone())),
        }
    }

    // ==================== Text Editing ====================

    /// Inserts text at the selection, replacing it if expanded.
    pub fn insert_text(&mut self, text: &str) -> InlineResult<()> {
        let range = self.selection.clone().ok_or(InlineError::NoSelection)?;
        if range.is_expanded() {
            self.delete_range(&range)?;
        }
        let point = self
            .selection
            .as_ref()
            .map(|sel| sel.focus.clone())
            .ok_or(InlineError::NoSelection)?;

        let leaf = leaf_at_mut(&mut self.children, &point.path)
            .ok_or_else(|| InlineError::InvalidPoint(point.clone()))?;
        let offset = clamp_to_char_boundary(&leaf.text, point.offset);
        leaf.text.insert_str(offset, text);

        self.selection = Some(Range::collapsed(Point::new(
            point.path,
            offset + text.len(),
        )));
        self.normalize();
        Ok(())
    }

    /// Deletes the content covered by `range` and collapses onto its start.
    pub fn delete_range(&mut self, range: &Range) -> InlineResult<()> {
        let (start, end) = range.edges();
        self.check_point(&start)?;
        self.check_point(&end)?;

        if start.path == end.path {
            if let Some(leaf) = leaf_at_mut(&mut self.children, &start.path) {
                leaf.text.replace_range(start.offset..end.offset, "");
            }
        } else {
            let paths = self.text_paths();
            for path in &paths {
                if path < &start.path || path > &end.path {
                    continue;
                }
                let Some(leaf) = leaf_at_mut(&mut self.children, path) else {
                    continue;
                };
                if *path == start.path {
                    leaf.text.truncate(start.offset);
                } else if *path == end.path {
                    leaf.text.replace_range(..end.offset, "");
                } else {
                    leaf.text.clear();
                }
            }
            self.remove_emptied_inlines(&start.path, &end.path);
        }

        self.selection = Some(Range::collapsed(start));
        self.normalize();
        Ok(())
    }

    /// Removes inline elements that lay strictly inside a deleted span.
    fn remove_emptied_inlines(&mut self, start: &[usize], end: &[usize]) {
        let doomed: Vec<NodePath> = self
            .element_paths()
            .into_iter()
            .filter(|path| path.len() > 1)
            .filter(|path| path.as_slice() > start && path.as_slice() < end)
            .filter(|path| !start.starts_with(path) && !end.starts_with(path))
            .filter(|path| {
                self.element(path)
                    .is_some_and(|el| self.is_inline(el) && el.text_content().is_empty())
            })
            .collect();

        for path in doomed.iter().rev() {
            if let Some((last, parent)) = path.split_last() {
                if let Some(parent) = element_at_mut(&mut self.children, parent) {
                    if *last < parent.children.len() {
                        parent.children.remove(*last);
                    }
                }
            }
        }
    }

    /// Deletes one grapheme before the caret (or the expanded selection).
    ///
    /// Returns false when the caret sits at the very start of the document
    /// and nothing was deleted.
    pub fn delete_backward(&mut self) -> InlineResult<bool> {
        let range = self.selection.clone().ok_or(InlineError::NoSelection)?;
        if range.is_expanded() {
            self.delete_range(&range)?;
            return Ok(true);
        }

        let paths = self.text_paths();
        let Some(current) = paths.iter().position(|path| *path == range.focus.path) else {
            return Err(InlineError::InvalidPoint(range.focus));
        };

        let mut candidates = vec![(paths[current].clone(), range.focus.offset)];
        candidates.extend(paths[..current].iter().rev().map(|path| {
            let len = self.leaf(path).map_or(0, |leaf| leaf.text.len());
            (path.clone(), len)
        }));

        for (path, offset) in candidates {
            let Some(leaf) = self.leaf(&path) else {
                continue;
            };
            let offset = clamp_to_char_boundary(&leaf.text, offset);
            let Some((prev, _)) = leaf.text[..offset].grapheme_indices(true).next_back() else {
                continue;
            };
            let target = Range::new(Point::new(path.clone(), prev), Point::new(path, offset));
            self.delete_range(&target)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Deletes one grapheme after the caret (or the expanded selection).
    ///
    /// Returns false when the caret sits at the very end of the document.
    pub fn delete_forward(&mut self) -> InlineResult<bool> {
        let range = self.selection.clone().ok_or(InlineError::NoSelection)?;
        if range.is_expanded() {
            self.delete_range(&range)?;
            return Ok(true);
        }

        let paths = self.text_paths();
        let Some(current) = paths.iter().position(|path| *path == range.focus.path) else {
            return Err(InlineError::InvalidPoint(range.focus));
        };

        let mut candidates = vec![(paths[current].clone(), range.focus.offset)];
        candidates.extend(paths[current + 1..].iter().map(|path| (path.clone(), 0)));

        for (path, offset) in candidates {
            let Some(leaf) = self.leaf(&path) else {
                continue;
            };
            let offset = clamp_to_char_boundary(&leaf.text, offset);
            let Some(grapheme) = leaf.text[offset..].graphemes(true).next() else {
                continue;
            };
            let end = offset + grapheme.len();
            let target = Range::new(Point::new(path.clone(), offset), Point::new(path, end));
            self.delete_range(&target)?;
            // Deleting forward keeps the caret where it was.
            if let Some(point) = self.point_at(self.offset_of(&range.focus).unwrap_or(0)) {
                self.selection = Some(Range::collapsed(point));
            }
            return Ok(true);
        }
        Ok(false)
    }

    // ==================== Structure ====================

    /// Inserts a node; a one-element path inserts a new root.
    pub fn insert_node(&mut self, path: &[usize], node: Descendant) -> InlineResult<()> {
        let Some((&index, parent_path)) = path.split_last() else {
            return Err(InlineError::InvalidPath(path.to_vec()));
        };

        if parent_path.is_empty() {
            let Descendant::Element(el) = node else {
                return Err(InlineError::InvalidPath(path.to_vec()));
            };
            if index > self.children.len() {
                return Err(InlineError::InvalidPath(path.to_vec()));
            }
            self.children.insert(index, el);
        } else {
            let parent = element_at_mut(&mut self.children, parent_path)
                .ok_or_else(|| InlineError::InvalidPath(path.to_vec()))?;
            if index > parent.children.len() {
                return Err(InlineError::InvalidPath(path.to_vec()));
            }
            parent.children.insert(index, node);
        }

        let depth = parent_path.len();
        remap_points(&mut self.selection, |point| {
            if point.path.len() > depth
                && point.path.starts_with(parent_path)
                && point.path[depth] >= index
            {
                point.path[depth] += 1;
            }
        });
        self.normalize();
        Ok(())
    }

    /// Removes and returns the node at `path`.
    pub fn remove_node(&mut self, path: &[usize]) -> InlineResult<Descendant> {
        let Some((&index, parent_path)) = path.split_last() else {
            return Err(InlineError::InvalidPath(path.to_vec()));
        };

        // Where the caret should land if the removed node held it.
        let fallback_offset = self
            .text_paths()
            .into_iter()
            .find(|text| text.starts_with(path))
            .and_then(|text| self.offset_of(&Point::new(text, 0)));
        let held_selection = self
            .selection
            .as_ref()
            .is_some_and(|sel| sel.anchor.path.starts_with(path) || sel.focus.path.starts_with(path));

        let removed = if parent_path.is_empty() {
            if index >= self.children.len() {
                return Err(InlineError::InvalidPath(path.to_vec()));
            }
            Descendant::Element(self.children.remove(index))
        } else {
            let parent = element_at_mut(&mut self.children, parent_path)
                .ok_or_else(|| InlineError::InvalidPath(path.to_vec()))?;
            if index >= parent.children.len() {
                return Err(InlineError::InvalidPath(path.to_vec()));
            }
            parent.children.remove(index)
        };

        if held_selection {
            self.selection = None;
        } else {
            let depth = parent_path.len();
            remap_points(&mut self.selection, |point| {
                if point.path.len() > depth
                    && point.path.starts_with(parent_path)
                    && point.path[depth] > index
                {
                    point.path[depth] -= 1;
                }
            });
        }
        self.normalize();

        if held_selection {
            let point = fallback_offset
                .and_then(|offset| self.point_at(offset))
                .or_else(|| self.start_point());
            self.selection = point.map(Range::collapsed);
        }
        Ok(removed)
    }

    /// Merges `props` into the element at `path`.
    pub fn set_props(&mut self, path: &[usize], props: Props) -> InlineResult<()> {
        let el = element_at_mut(&mut self.children, path)
            .ok_or_else(|| InlineError::InvalidPath(path.to_vec()))?;
        el.props.get_or_insert_with(Props::new).extend(props);
        self.normalize();
        Ok(())
    }

    /// Splits the content at `point` into the roots before and after it.
    ///
    /// The root containing the point is cut in two; the second half gets
    /// fresh element ids.
    pub fn split_at(&self, point: &Point) -> InlineResult<(Vec<Element>, Vec<Element>)> {
        self.check_point(point)?;
        let Some((&root_ix, rel)) = point.path.split_first() else {
            return Err(InlineError::InvalidPoint(point.clone()));
        };

        let mut left: Vec<Element> = self.children[..root_ix].to_vec();
        let mut right: Vec<Element> = Vec::new();
        let (head, tail) = split_element(&self.children[root_ix], rel, point.offset);
        left.push(head);
        right.push(tail);
        right.extend(
            self.children[root_ix + 1..]
                .iter()
                .map(Element::clone_with_new_ids),
        );

        let left = InlineDocument::with_extensions(left, self.extensions.clone()).into_children();
        let right = InlineDocument::with_extensions(right, self.extensions.clone()).into_children();
        Ok((left, right))
    }

    // ==================== Normalization ====================

    /// Runs `f` with normalization suspended, then normalizes once.
    pub fn without_normalizing<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.suspended += 1;
        let out = f(self);
        self.suspended -= 1;
        self.normalize();
        out
    }

    /// Enforces the structural rules, then lets extensions repair nodes.
    ///
    /// Built-in rules: every element has at least one child, void elements
    /// hold exactly one empty text leaf, adjacent text leaves with equal
    /// marks (or an empty side) are merged.
    pub fn normalize(&mut self) {
        if self.suspended > 0 {
            return;
        }

        let Self {
            children,
            selection,
            extensions,
            ..
        } = self;
        let is_void =
            |el: &Element| el.is_void() || extensions.iter().any(|ext| ext.is_void(el));
        for (ix, root) in children.iter_mut().enumerate() {
            normalize_element(root, &mut vec![ix], selection, &is_void);
        }

        if !self.extensions.is_empty() {
            self.suspended += 1;
            let extensions = self.extensions.clone();
            for _ in 0..MAX_NORMALIZE_PASSES {
                let mut changed = false;
                for ext in &extensions {
                    for path in self.element_paths() {
                        changed |= ext.normalize_node(self, &path);
                    }
                }
                if !changed {
                    break;
                }
            }
            self.suspended -= 1;
        }

        self.clamp_selection();
    }

    /// Moves selection edges that no longer address text onto valid points.
    fn clamp_selection(&mut self) {
        let Some(range) = self.selection.take() else {
            return;
        };
        let anchor = self.clamp_point(&range.anchor);
        let focus = self.clamp_point(&range.focus);
        self.selection = match (anchor, focus) {
            (Some(anchor), Some(focus)) => Some(Range::new(anchor, focus)),
            _ => None,
        };
    }

    fn clamp_point(&self, point: &Point) -> Option<Point> {
        if let Some(leaf) = self.leaf(&point.path) {
            let offset = clamp_to_char_boundary(&leaf.text, point.offset);
            return Some(Point::new(point.path.clone(), offset));
        }
        let preceding = self
            .text_paths()
            .into_iter()
            .rev()
            .find(|path| *path < point.path);
        match preceding {
            Some(path) => {
                let len = self.leaf(&path).map_or(0, |leaf| leaf.text.len());
                Some(Point::new(path, len))
            }
            None => self.start_point(),
        }
    }
}

// ==================== Tree Helpers ====================

/// Returns the element at `path` below `roots`.
pub fn element_at<'a>(roots: &'a [Element], path: &[usize]) -> Option<&'a Element> {
    let (first, rest) = path.split_first()?;
    let mut el = roots.get(*first)?;
    for &ix in rest {
        el = match el.children.get(ix)? {
            Descendant::Element(child) => child,
            Descendant::Text(_) => return None,
        };
    }
    Some(el)
}

pub fn element_at_mut<'a>(
    roots: &'a mut [Element],
    path: &[usize],
) -> Option<&'a mut Element> {
    let (first, rest) = path.split_first()?;
    let mut el = roots.get_mut(*first)?;
    for &ix in rest {
        el = match el.children.get_mut(ix)? {
            Descendant::Element(child) => child,
            Descendant::Text(_) => return None,
        };
    }
    Some(el)
}

pub fn leaf_at<'a>(roots: &'a [Element], path: &[usize]) -> Option<&'a Text> {
    let (last, parent) = path.split_last()?;
    match element_at(roots, parent)?.children.get(*last)? {
        Descendant::Text(t) => Some(t),
        Descendant::Element(_) => None,
    }
}

fn leaf_at_mut<'a>(roots: &'a mut [Element], path: &[usize]) -> Option<&'a mut Text> {
    let (last, parent) = path.split_last()?;
    match element_at_mut(roots, parent)?.children.get_mut(*last)? {
        Descendant::Text(t) => Some(t),
        Descendant::Element(_) => None,
    }
}

fn clamp_to_char_boundary(s: &str, mut ix: usize) -> usize {
    ix = ix.min(s.len());
    while ix > 0 && !s.is_char_boundary(ix) {
        ix -= 1;
    }
    ix
}

fn remap_points(selection: &mut Option<Range>, f: impl Fn(&mut Point)) {
    if let Some(range) = selection {
        f(&mut range.anchor);
        f(&mut range.focus);
    }
}

fn normalize_element(
    el: &mut Element,
    path: &mut NodePath,
    selection: &mut Option<Range>,
    is_void: &dyn Fn(&Element) -> bool,
) {
    if is_void(el) {
        let settled = matches!(
            el.children.as_slice(),
            [Descendant::Text(t)] if t.text.is_empty()
        );
        if !settled {
            el.children = vec![Descendant::Text(Text::empty())];
            let void_path = path.clone();
            remap_points(selection, |point| {
                if point.path.starts_with(&void_path) && point.path.len() > void_path.len() {
                    point.path.truncate(void_path.len());
                    point.path.push(0);
                    point.offset = 0;
                }
            });
        }
        return;
    }

    if el.children.is_empty() {
        el.children.push(Descendant::Text(Text::empty()));
    }

    for ix in 0..el.children.len() {
        if let Descendant::Element(child) = &mut el.children[ix] {
            path.push(ix);
            normalize_element(child, path, selection, is_void);
            path.pop();
        }
    }

    let depth = path.len();
    let mut ix = 0;
    while ix + 1 < el.children.len() {
        let mergeable = match (&el.children[ix], &el.children[ix + 1]) {
            (Descendant::Text(a), Descendant::Text(b)) => {
                a.marks == b.marks || a.text.is_empty() || b.text.is_empty()
            }
            _ => false,
        };
        if !mergeable {
            ix += 1;
            continue;
        }

        let next = el.children.remove(ix + 1);
        if let (Descendant::Text(current), Descendant::Text(next)) = (&mut el.children[ix], next) {
            let prefix = current.text.len();
            if current.text.is_empty() {
                current.marks = next.marks;
            }
            current.text.push_str(&next.text);

            let parent = path.clone();
            remap_points(selection, |point| {
                if point.path.len() <= depth || !point.path.starts_with(&parent) {
                    return;
                }
                if point.path[depth] == ix + 1 {
                    point.path[depth] = ix;
                    point.offset += prefix;
                } else if point.path[depth] > ix + 1 {
                    point.path[depth] -= 1;
                }
            });
        }
    }
}

fn split_element(el: &Element, rel: &[usize], offset: usize) -> (Element, Element) {
    let mut head = Element {
        id: el.id.clone(),
        kind: el.kind.clone(),
        props: el.props.clone(),
        children: Vec::new(),
    };
    let mut tail = Element::new(el.kind.clone());
    tail.props = el.props.clone();

    let Some((&ix, rest)) = rel.split_first() else {
        head.children = el.children.clone();
        return (head, tail);
    };

    head.children.extend(el.children[..ix].iter().cloned());
    match &el.children[ix] {
        Descendant::Text(t) => {
            let offset = clamp_to_char_boundary(&t.text, offset);
            head.children.push(Descendant::Text(Text::with_marks(
                &t.text[..offset],
                t.marks.clone(),
            )));
            tail.children.push(Descendant::Text(Text::with_marks(
                &t.text[offset..],
                t.marks.clone(),
            )));
        }
        Descendant::Element(child) => {
            let (child_head, child_tail) = split_element(child, rest, offset);
            head.children.push(Descendant::Element(child_head));
            tail.children.push(Descendant::Element(child_tail));
        }
    }
    tail.children
        .extend(el.children[ix + 1..].iter().map(|child| match child {
            Descendant::Element(el) => Descendant::Element(el.clone_with_new_ids()),
            Descendant::Text(t) => Descendant::Text(t.clone()),
        }));
    (head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Marks, NodeType};

    fn paragraph(text: &str) -> Element {
        Element::new("paragraph").with_text(text)
    }

    fn bold(text: &str) -> Descendant {
        Descendant::Text(Text::with_marks(
            text,
            Marks {
                bold: true,
                ..Marks::default()
            },
        ))
    }

    fn caret(doc: &mut InlineDocument, path: &[usize], offset: usize) {
        doc.select(Range::collapsed(Point::new(path.to_vec(), offset)))
            .unwrap();
    }

    #[test]
    fn test_insert_text_moves_caret() {
        let mut doc = InlineDocument::new(vec![paragraph("Hello")]);
        caret(&mut doc, &[0, 0], 5);
        doc.insert_text(", World").unwrap();

        assert_eq!(doc.text(), "Hello, World");
        assert_eq!(doc.selection().unwrap().focus, Point::new(vec![0, 0], 12));
    }

    #[test]
    fn test_insert_without_selection_fails() {
        let mut doc = InlineDocument::new(vec![paragraph("x")]);
        assert_eq!(doc.insert_text("y"), Err(InlineError::NoSelection));
    }

    #[test]
    fn test_select_rejects_missing_leaf() {
        let mut doc = InlineDocument::new(vec![paragraph("abc")]);
        let bad = Range::collapsed(Point::new(vec![0, 3], 0));
        assert!(matches!(doc.select(bad), Err(InlineError::InvalidPoint(_))));
        let past_end = Range::collapsed(Point::new(vec![0, 0], 4));
        assert!(doc.select(past_end).is_err());
    }

    #[test]
    fn test_normalize_merges_equal_marks_and_remaps_selection() {
        let el = Element::new("paragraph").with_children([
            Descendant::text("ab"),
            Descendant::text("cd"),
            bold("EF"),
        ]);
        let mut doc = InlineDocument::new(vec![el]);
        assert_eq!(doc.children()[0].children.len(), 2);

        caret(&mut doc, &[0, 1], 1);
        doc.insert_text("!").unwrap();
        assert_eq!(doc.text(), "abcdE!F");
    }

    #[test]
    fn test_without_normalizing_defers_merge() {
        let mut doc = InlineDocument::new(vec![paragraph("a")]);
        let count = doc.without_normalizing(|doc| {
            doc.children[0].children.push(Descendant::text("b"));
            doc.children[0].children.len()
        });
        assert_eq!(count, 2);
        assert_eq!(doc.children()[0].children.len(), 1);
        assert_eq!(doc.text(), "ab");
    }

    #[test]
    fn test_void_element_holds_single_empty_leaf() {
        let image = Element::new("image")
            .with_node_type(NodeType::Void)
            .with_text("should not be here");
        let doc = InlineDocument::new(vec![image]);
        assert_eq!(doc.children()[0].children, vec![Descendant::text("")]);
        assert!(doc.text_paths().is_empty());
    }

    #[test]
    fn test_delete_range_across_leaves() {
        let el = Element::new("paragraph").with_children([
            Descendant::text("Hello "),
            bold("brave"),
            Descendant::text(" new world"),
        ]);
        let mut doc = InlineDocument::new(vec![el]);
        let range = Range::new(Point::new(vec![0, 0], 3), Point::new(vec![0, 2], 5));
        doc.delete_range(&range).unwrap();

        assert_eq!(doc.text(), "Helworld");
        assert!(doc.selection().unwrap().is_collapsed());
        assert_eq!(doc.offset_of(&doc.selection().unwrap().focus), Some(3));
    }

    #[test]
    fn test_delete_backward_grapheme() {
        let mut doc = InlineDocument::new(vec![paragraph("ae\u{301}")]);
        caret(&mut doc, &[0, 0], "ae\u{301}".len());
        assert!(doc.delete_backward().unwrap());
        assert_eq!(doc.text(), "a");
    }

    #[test]
    fn test_delete_backward_at_start_reports_nothing() {
        let mut doc = InlineDocument::new(vec![paragraph("abc")]);
        caret(&mut doc, &[0, 0], 0);
        assert!(!doc.delete_backward().unwrap());
        assert_eq!(doc.text(), "abc");
    }

    #[test]
    fn test_delete_forward_keeps_caret() {
        let mut doc = InlineDocument::new(vec![paragraph("abc")]);
        caret(&mut doc, &[0, 0], 1);
        assert!(doc.delete_forward().unwrap());
        assert_eq!(doc.text(), "ac");
        assert_eq!(doc.selection().unwrap().focus.offset, 1);
    }

    #[test]
    fn test_offset_point_mapping() {
        let el = Element::new("paragraph").with_children([
            Descendant::text("abc"),
            Element::new("link")
                .with_node_type(NodeType::Inline)
                .with_text("de")
                .into(),
            Descendant::text("f"),
        ]);
        let doc = InlineDocument::new(vec![el]);

        let point = doc.point_at(4).unwrap();
        assert_eq!(point, Point::new(vec![0, 1, 0], 1));
        assert_eq!(doc.offset_of(&point), Some(4));
        assert_eq!(doc.point_at(99), doc.end_point());
    }

    #[test]
    fn test_split_at_point() {
        let doc = InlineDocument::new(vec![paragraph("HelloWorld")]);
        let (left, right) = doc.split_at(&Point::new(vec![0, 0], 5)).unwrap();

        assert_eq!(left.len(), 1);
        assert_eq!(right.len(), 1);
        assert_eq!(left[0].text_content(), "Hello");
        assert_eq!(right[0].text_content(), "World");
        assert_eq!(left[0].id, doc.children()[0].id);
        assert_ne!(right[0].id, left[0].id);
    }

    #[test]
    fn test_remove_node_moves_held_selection() {
        let el = Element::new("paragraph").with_children([
            Descendant::text("ab"),
            Element::new("link")
                .with_node_type(NodeType::Inline)
                .with_text("cd")
                .into(),
            Descendant::text("ef"),
        ]);
        let mut doc = InlineDocument::new(vec![el]);
        caret(&mut doc, &[0, 1, 0], 1);

        doc.remove_node(&[0, 1]).unwrap();
        assert_eq!(doc.text(), "abef");
        let focus = doc.selection().unwrap().focus.clone();
        assert_eq!(doc.offset_of(&focus), Some(2));
    }

    #[test]
    fn test_insert_node_shifts_selection() {
        let mut doc = InlineDocument::new(vec![paragraph("x")]);
        caret(&mut doc, &[0, 0], 1);
        doc.insert_node(&[0], Descendant::Element(paragraph("before")))
            .unwrap();
        assert_eq!(doc.selection().unwrap().focus.path, vec![1, 0]);
    }

    struct UppercaseCode;

    impl InlineExtension for UppercaseCode {
        fn id(&self) -> &str {
            "uppercase-code"
        }

        fn normalize_node(&self, doc: &mut InlineDocument, path: &[usize]) -> bool {
            let Some(el) = element_at_mut(&mut doc.children, path) else {
                return false;
            };
            let mut changed = false;
            for child in &mut el.children {
                if let Descendant::Text(t) = child {
                    let upper = t.text.to_uppercase();
                    if upper != t.text {
                        t.text = upper;
                        changed = true;
                    }
                }
            }
            changed
        }
    }

    #[test]
    fn test_extension_normalize_runs_after_edit() {
        let mut doc =
            InlineDocument::with_extensions(vec![paragraph("abc")], vec![Arc::new(UppercaseCode)]);
        assert_eq!(doc.text(), "ABC");
        caret(&mut doc, &[0, 0], 3);
        doc.insert_text("d").unwrap();
        assert_eq!(doc.text(), "ABCD");
    }
}
