use crate::EPS;

/// Bounding box in the format (x, y, width, height)
///
/// `x`, `y` is the top-left corner in image pixel coordinates.
#[derive(Clone, Default, Debug, Copy)]
pub struct BoundingBox {
    _x: f32,
    _y: f32,
    _width: f32,
    _height: f32,
}

impl BoundingBox {
    /// Constructor
    ///
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            _x: x,
            _y: y,
            _width: width,
            _height: height,
        }
    }

    pub fn x(&self) -> f32 {
        self._x
    }

    pub fn y(&self) -> f32 {
        self._y
    }

    pub fn width(&self) -> f32 {
        self._width
    }

    pub fn height(&self) -> f32 {
        self._height
    }

    pub fn from_row(row: [f32; 4]) -> Self {
        Self::new(row[0], row[1], row[2], row[3])
    }

    pub fn as_row(&self) -> [f32; 4] {
        [self._x, self._y, self._width, self._height]
    }

    pub fn area(&self) -> f32 {
        self._width * self._height
    }

    pub fn center(&self) -> (f32, f32) {
        (
            self._x + self._width / 2.0,
            self._y + self._height / 2.0,
        )
    }

    /// Allows comparing bboxes
    ///
    pub fn almost_same(&self, other: &Self, eps: f32) -> bool {
        (self._x - other._x).abs() < eps
            && (self._y - other._y).abs() < eps
            && (self._width - other._width).abs() < eps
            && (self._height - other._height).abs() < eps
    }

    /// Correction of out-of-range coordinates against the frame resolution.
    ///
    /// The origin is clamped to the frame first, then the extent is shrunk so
    /// the box stays inside. The position is never shifted.
    pub fn clip(&self, bound: (u32, u32)) -> Self {
        let img_width = bound.0 as f32;
        let img_height = bound.1 as f32;

        let x = if self._x > 0.0 { self._x } else { 0.0 };
        let width = if self._width < img_width - x {
            self._width
        } else {
            img_width - x
        };

        let y = if self._y > 0.0 { self._y } else { 0.0 };
        let height = if self._height < img_height - y {
            self._height
        } else {
            img_height - y
        };

        Self {
            _x: x,
            _y: y,
            _width: width,
            _height: height,
        }
    }

    pub fn intersection(l: &BoundingBox, r: &BoundingBox) -> f64 {
        let (ax0, ay0, ax1, ay1) = (l._x, l._y, l._x + l._width, l._y + l._height);
        let (bx0, by0, bx1, by1) = (r._x, r._y, r._x + r._width, r._y + r._height);

        let (x1, y1) = (ax0.max(bx0), ay0.max(by0));
        let (x2, y2) = (ax1.min(bx1), ay1.min(by1));

        let int_width = x2 - x1;
        let int_height = y2 - y1;

        if int_width > 0.0 && int_height > 0.0 {
            (int_width * int_height) as f64
        } else {
            0.0_f64
        }
    }

    /// Smallest axis-aligned box enclosing both arguments.
    pub fn enclosing(l: &BoundingBox, r: &BoundingBox) -> BoundingBox {
        let x0 = l._x.min(r._x);
        let y0 = l._y.min(r._y);
        let x1 = (l._x + l._width).max(r._x + r._width);
        let y1 = (l._y + l._height).max(r._y + r._height);
        BoundingBox::new(x0, y0, x1 - x0, y1 - y0)
    }
}

impl PartialEq<Self> for BoundingBox {
    fn eq(&self, other: &Self) -> bool {
        self.almost_same(other, EPS)
    }
}

#[cfg(test)]
mod tests {
    use crate::utils::bbox::BoundingBox;
    use crate::EPS;

    #[test]
    fn intersection() {
        let bb1 = BoundingBox::new(-1.0, -1.0, 2.0, 2.0);
        let bb2 = BoundingBox::new(0.0, 0.0, 2.0, 2.0);
        let bb3 = BoundingBox::new(5.0, 5.0, 2.0, 2.0);

        assert!((BoundingBox::intersection(&bb1, &bb2) - 1.0).abs() < EPS as f64);
        assert!((BoundingBox::intersection(&bb1, &bb1) - 4.0).abs() < EPS as f64);
        assert!(BoundingBox::intersection(&bb1, &bb3).abs() < EPS as f64);
    }

    #[test]
    fn clip_shrinks_extent_after_clamping_origin() {
        let bb = BoundingBox::new(-10.0, -5.0, 100.0, 100.0).clip((64, 48));
        assert!(bb.almost_same(&BoundingBox::new(0.0, 0.0, 64.0, 48.0), EPS));

        // The width clamp must use the already-clamped origin.
        let bb = BoundingBox::new(60.0, 40.0, 10.0, 10.0).clip((64, 48));
        assert!(bb.almost_same(&BoundingBox::new(60.0, 40.0, 4.0, 8.0), EPS));

        let inside = BoundingBox::new(5.0, 5.0, 10.0, 10.0);
        assert_eq!(inside.clip((64, 48)), inside);
    }

    #[test]
    fn enclosing() {
        let bb1 = BoundingBox::new(0.0, 0.0, 2.0, 2.0);
        let bb2 = BoundingBox::new(4.0, 4.0, 2.0, 2.0);
        let e = BoundingBox::enclosing(&bb1, &bb2);
        assert!(e.almost_same(&BoundingBox::new(0.0, 0.0, 6.0, 6.0), EPS));
    }
}
