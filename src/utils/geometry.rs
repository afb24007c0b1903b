// SPDX-License-Identifier: GPL-3.0-only

use std::fmt;

/// Size in physical pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Size {
    pub w: i32,
    pub h: i32,
}

impl Size {
    pub const fn new(w: i32, h: i32) -> Self {
        Size { w, h }
    }

    pub fn is_empty(&self) -> bool {
        self.w <= 0 || self.h <= 0
    }

    /// Component-wise minimum, the area two buffers of these sizes share.
    pub fn min(self, other: Size) -> Size {
        Size {
            w: self.w.min(other.w),
            h: self.h.min(other.h),
        }
    }
}

impl From<(i32, i32)> for Size {
    fn from((w, h): (i32, i32)) -> Self {
        Size { w, h }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.w, self.h)
    }
}

/// Axis aligned rectangle given by its extents, `x2`/`y2` exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rectangle {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Rectangle {
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Rectangle { x1, y1, x2, y2 }
    }

    pub const fn from_size(size: Size) -> Self {
        Rectangle {
            x1: 0,
            y1: 0,
            x2: size.w,
            y2: size.h,
        }
    }

    pub fn width(&self) -> i32 {
        (self.x2 - self.x1).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.y2 - self.y1).max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.x2 <= self.x1 || self.y2 <= self.y1
    }

    /// Restricts the rectangle to `[0, size.w) x [0, size.h)`.
    ///
    /// A rectangle entirely outside of the bounds collapses to an empty one.
    pub fn clamp_to(&self, size: Size) -> Rectangle {
        let x1 = self.x1.clamp(0, size.w.max(0));
        let y1 = self.y1.clamp(0, size.h.max(0));
        Rectangle {
            x1,
            y1,
            x2: self.x2.clamp(x1, size.w.max(x1)),
            y2: self.y2.clamp(y1, size.h.max(y1)),
        }
    }

    /// Smallest rectangle containing both, ignoring empty inputs.
    pub fn merge(&self, other: &Rectangle) -> Rectangle {
        match (self.is_empty(), other.is_empty()) {
            (true, _) => *other,
            (_, true) => *self,
            _ => Rectangle {
                x1: self.x1.min(other.x1),
                y1: self.y1.min(other.y1),
                x2: self.x2.max(other.x2),
                y2: self.y2.max(other.y2),
            },
        }
    }

    pub fn intersection(&self, other: &Rectangle) -> Option<Rectangle> {
        let rect = Rectangle {
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
            x2: self.x2.min(other.x2),
            y2: self.y2.min(other.y2),
        };
        (!rect.is_empty()).then_some(rect)
    }
}

impl fmt::Display for Rectangle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})-({},{})", self.x1, self.y1, self.x2, self.y2)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn clamp() {
        let size = Size::new(640, 480);
        assert_eq!(
            Rectangle::new(-10, -5, 700, 500).clamp_to(size),
            Rectangle::from_size(size)
        );
        assert_eq!(
            Rectangle::new(10, 20, 30, 40).clamp_to(size),
            Rectangle::new(10, 20, 30, 40)
        );
        assert!(Rectangle::new(800, 600, 900, 700).clamp_to(size).is_empty());
        assert!(Rectangle::new(-50, -50, -10, -10).clamp_to(size).is_empty());
    }

    #[test]
    fn merge_and_intersect() {
        let rects = [
            Rectangle::new(10, 10, 20, 20),
            Rectangle::default(),
            Rectangle::new(5, 15, 12, 40),
        ];
        assert_eq!(rects[0].merge(&rects[2]), Rectangle::new(5, 10, 20, 40));
        assert_eq!(rects[0].merge(&rects[1]), rects[0]);
        assert_eq!(rects[1].merge(&rects[2]), rects[2]);
        assert_eq!(
            rects[0].intersection(&rects[2]),
            Some(Rectangle::new(10, 15, 12, 20))
        );
        assert_eq!(rects[0].intersection(&Rectangle::new(20, 20, 30, 30)), None);
    }
}
