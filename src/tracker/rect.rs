/// Axis-aligned bounding box with format conversion and scoring helpers.
///
/// Supports three common bounding box formats:
/// - TLWH: Top-Left X, Top-Left Y, Width, Height
/// - TLBR: Top-Left X, Top-Left Y, Bottom-Right X, Bottom-Right Y
/// - XYAH: Center X, Center Y, Aspect Ratio (w/h), Height
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Rect {
    /// Top-left x coordinate
    pub x: f32,
    /// Top-left y coordinate
    pub y: f32,
    /// Width of the bounding box
    pub width: f32,
    /// Height of the bounding box
    pub height: f32,
}

impl Rect {
    /// Create a new Rect from top-left coordinates and dimensions (TLWH format).
    #[inline]
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Create a Rect from TLBR format (top-left x, top-left y, bottom-right x, bottom-right y).
    #[inline]
    pub fn from_tlbr(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        }
    }

    /// Create a Rect from XYAH format (center x, center y, aspect ratio, height).
    #[inline]
    pub fn from_xyah(cx: f32, cy: f32, aspect_ratio: f32, height: f32) -> Self {
        let width = aspect_ratio * height;
        Self {
            x: cx - width / 2.0,
            y: cy - height / 2.0,
            width,
            height,
        }
    }

    /// Convert to TLBR format: (x1, y1, x2, y2).
    #[inline]
    pub fn to_tlbr(&self) -> [f32; 4] {
        [self.x, self.y, self.x + self.width, self.y + self.height]
    }

    /// Convert to XYAH format: (center_x, center_y, aspect_ratio, height).
    #[inline]
    pub fn to_xyah(&self) -> [f32; 4] {
        let (cx, cy) = self.center();
        let aspect_ratio = if self.height > 0.0 {
            self.width / self.height
        } else {
            0.0
        };
        [cx, cy, aspect_ratio, self.height]
    }

    /// Get the center point of the bounding box.
    #[inline]
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Get the area of the bounding box.
    #[inline]
    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Height over width, 0 for a degenerate box.
    #[inline]
    pub fn height_ratio(&self) -> f32 {
        if self.width > 0.0 {
            self.height / self.width
        } else {
            0.0
        }
    }

    /// The same box shifted by `(dx, dy)`.
    #[inline]
    pub fn translate(&self, dx: f32, dy: f32) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Euclidean distance between the two box centers.
    pub fn center_distance(&self, other: &Rect) -> f32 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }

    /// Calculate Intersection over Union (IoU) with another bounding box.
    pub fn iou(&self, other: &Rect) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let inter_width = (x2 - x1).max(0.0);
        let inter_height = (y2 - y1).max(0.0);
        let inter_area = inter_width * inter_height;

        let union_area = self.area() + other.area() - inter_area;

        if union_area > 0.0 {
            inter_area / union_area
        } else {
            0.0
        }
    }

    /// Closeness of the two box areas in `[0, 1]`.
    pub fn size_similarity(&self, other: &Rect) -> f32 {
        ratio_similarity(self.area(), other.area())
    }

    /// Closeness of the two height/width ratios in `[0, 1]`.
    pub fn aspect_similarity(&self, other: &Rect) -> f32 {
        ratio_similarity(self.height_ratio(), other.height_ratio())
    }
}

/// `1 - |a - b| / max(a, b)` clamped to `[0, 1]`; two zeros are identical.
pub fn ratio_similarity(a: f32, b: f32) -> f32 {
    let largest = a.abs().max(b.abs());
    if largest <= f32::EPSILON {
        return 1.0;
    }
    (1.0 - (a - b).abs() / largest).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rect_conversions() {
        let rect = Rect::new(10.0, 20.0, 30.0, 40.0);

        // TLBR
        assert_eq!(rect.to_tlbr(), [10.0, 20.0, 40.0, 60.0]);

        // XYAH
        let xyah = rect.to_xyah();
        assert_eq!(xyah[0], 25.0); // cx
        assert_eq!(xyah[1], 40.0); // cy
        assert_relative_eq!(xyah[2], 0.75); // aspect ratio = 30/40
        assert_eq!(xyah[3], 40.0); // height
    }

    #[test]
    fn test_from_tlbr() {
        let rect = Rect::from_tlbr(10.0, 20.0, 40.0, 60.0);
        assert_eq!(rect, Rect::new(10.0, 20.0, 30.0, 40.0));
    }

    #[test]
    fn test_from_xyah() {
        let rect = Rect::from_xyah(25.0, 40.0, 0.75, 40.0);
        assert_relative_eq!(rect.x, 10.0, epsilon = 1e-6);
        assert_relative_eq!(rect.y, 20.0, epsilon = 1e-6);
        assert_relative_eq!(rect.width, 30.0, epsilon = 1e-6);
        assert_relative_eq!(rect.height, 40.0, epsilon = 1e-6);
    }

    #[test]
    fn test_iou() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 5.0, 10.0, 10.0);

        // Intersection: 5x5 = 25
        // Union: 100 + 100 - 25 = 175
        assert_relative_eq!(a.iou(&b), 25.0 / 175.0, epsilon = 1e-6);
        assert_relative_eq!(a.iou(&b), 0.142857, epsilon = 1e-5);
    }

    #[test]
    fn test_iou_symmetric() {
        let a = Rect::new(3.0, 1.0, 17.0, 9.0);
        let b = Rect::new(8.5, -2.0, 6.0, 20.0);
        assert_eq!(a.iou(&b), b.iou(&a));
    }

    #[test]
    fn test_iou_no_overlap() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(20.0, 20.0, 10.0, 10.0);
        assert_eq!(a.iou(&b), 0.0);

        // Touching edges share no area.
        let c = Rect::new(10.0, 0.0, 10.0, 10.0);
        assert_eq!(a.iou(&c), 0.0);
    }

    #[test]
    fn test_iou_same_box() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert_relative_eq!(a.iou(&a), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_iou_degenerate() {
        let empty = Rect::new(5.0, 5.0, 0.0, 0.0);
        assert_eq!(empty.iou(&empty), 0.0);
    }

    #[test]
    fn test_similarities() {
        let a = Rect::new(0.0, 0.0, 10.0, 20.0);
        let b = Rect::new(100.0, 100.0, 20.0, 40.0);
        assert_relative_eq!(a.aspect_similarity(&b), 1.0);
        assert_relative_eq!(a.size_similarity(&b), 0.25);
        assert_relative_eq!(ratio_similarity(0.0, 0.0), 1.0);
        assert_relative_eq!(a.center_distance(&a.translate(3.0, 4.0)), 5.0);
    }
}
