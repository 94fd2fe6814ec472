//! Text ranges inside an inline document.
//!
//! A [`Range`] keeps the direction the user selected in: `anchor` is where
//! the selection started, `focus` is where the caret is. `start()`/`end()`
//! give the normalized edges when direction does not matter.

use crate::point::Point;
use serde::{Deserialize, Serialize};

/// A directed selection between two points.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub anchor: Point,
    pub focus: Point,
}

/// Represents the direction of a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionDirection {
    /// Selection extends forward (caret at end)
    Forward,
    /// Selection extends backward (caret at start)
    Backward,
}

impl Range {
    pub fn new(anchor: Point, focus: Point) -> Self {
        Self { anchor, focus }
    }

    /// Creates a zero-width range (a caret).
    pub fn collapsed(point: Point) -> Self {
        Self {
            anchor: point.clone(),
            focus: point,
        }
    }

    /// Returns true if anchor and focus are the same point.
    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    pub fn is_expanded(&self) -> bool {
        !self.is_collapsed()
    }

    pub fn direction(&self) -> SelectionDirection {
        if self.anchor <= self.focus {
            SelectionDirection::Forward
        } else {
            SelectionDirection::Backward
        }
    }

    pub fn is_backward(&self) -> bool {
        self.direction() == SelectionDirection::Backward
    }

    /// The earlier edge in document order.
    pub fn start(&self) -> &Point {
        if self.anchor <= self.focus {
            &self.anchor
        } else {
            &self.focus
        }
    }

    /// The later edge in document order.
    pub fn end(&self) -> &Point {
        if self.anchor <= self.focus {
            &self.focus
        } else {
            &self.anchor
        }
    }

    /// Returns `(start, end)` cloned.
    pub fn edges(&self) -> (Point, Point) {
        (self.start().clone(), self.end().clone())
    }

    /// Returns true if a point lies within the range (edges included).
    pub fn contains(&self, point: &Point) -> bool {
        point >= self.start() && point <= self.end()
    }

    /// Collapses the range onto its start edge.
    pub fn collapse_to_start(&self) -> Range {
        Range::collapsed(self.start().clone())
    }

    /// Collapses the range onto its end edge.
    pub fn collapse_to_end(&self) -> Range {
        Range::collapsed(self.end().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapsed_range() {
        let range = Range::collapsed(Point::new(vec![0, 0], 3));
        assert!(range.is_collapsed());
        assert!(!range.is_expanded());
        assert_eq!(range.direction(), SelectionDirection::Forward);
    }

    #[test]
    fn test_backward_range_edges() {
        let range = Range::new(Point::new(vec![0, 1], 2), Point::new(vec![0, 0], 4));
        assert!(range.is_backward());
        assert_eq!(range.start(), &Point::new(vec![0, 0], 4));
        assert_eq!(range.end(), &Point::new(vec![0, 1], 2));
        assert!(range.contains(&Point::new(vec![0, 1], 0)));
        assert!(!range.contains(&Point::new(vec![0, 1], 3)));
    }

    #[test]
    fn test_collapse_edges() {
        let range = Range::new(Point::new(vec![0, 0], 5), Point::new(vec![0, 0], 1));
        assert_eq!(range.collapse_to_start().focus.offset, 1);
        assert_eq!(range.collapse_to_end().anchor.offset, 5);
    }
}
