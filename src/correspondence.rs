//! Corner correspondences and drag state

use crate::config::{OutputConfig, Point, ViewConfig};
use tracing::debug;

/// A corner of the quad, in fixed winding order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
}

impl Corner {
    pub const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomRight,
        Corner::BottomLeft,
    ];

    pub fn index(self) -> usize {
        match self {
            Corner::TopLeft => 0,
            Corner::TopRight => 1,
            Corner::BottomRight => 2,
            Corner::BottomLeft => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Corner::TopLeft => "Top Left",
            Corner::TopRight => "Top Right",
            Corner::BottomRight => "Bottom Right",
            Corner::BottomLeft => "Bottom Left",
        }
    }
}

/// A source corner and where it currently lands in the output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    pub source: Point,
    pub destination: Point,
}

pub type CorrespondenceSet = [Correspondence; 4];

/// Source rectangle corners for an image of the given size
pub fn source_corners(width: u32, height: u32) -> [Point; 4] {
    let (w, h) = (width as f64, height as f64);
    [
        Point::new(0.0, 0.0), // Top-left
        Point::new(w, 0.0),   // Top-right
        Point::new(w, h),     // Bottom-right
        Point::new(0.0, h),   // Bottom-left
    ]
}

/// Owns the four correspondences, the active drag and the view flags
#[derive(Debug, Clone)]
pub struct CorrespondenceModel {
    source: [Point; 4],
    destination: [Point; 4],
    /// Quad restored by `reset`
    initial: [Point; 4],
    dragging: Option<Corner>,
    view: ViewConfig,
    canvas: OutputConfig,
}

impl CorrespondenceModel {
    /// `image_size` fixes the source rectangle; `destination` is the starting quad
    pub fn new(
        image_size: (u32, u32),
        destination: [Point; 4],
        canvas: OutputConfig,
        view: ViewConfig,
    ) -> Self {
        let mut model = Self {
            source: source_corners(image_size.0, image_size.1),
            destination,
            initial: destination,
            dragging: None,
            view,
            canvas,
        };
        model.destination = destination.map(|p| model.constrain(p));
        model.initial = model.destination;
        model
    }

    pub fn sources(&self) -> &[Point; 4] {
        &self.source
    }

    pub fn destinations(&self) -> &[Point; 4] {
        &self.destination
    }

    pub fn destination(&self, corner: Corner) -> Point {
        self.destination[corner.index()]
    }

    pub fn correspondences(&self) -> CorrespondenceSet {
        std::array::from_fn(|i| Correspondence {
            source: self.source[i],
            destination: self.destination[i],
        })
    }

    pub fn dragging(&self) -> Option<Corner> {
        self.dragging
    }

    pub fn view(&self) -> &ViewConfig {
        &self.view
    }

    pub fn canvas(&self) -> OutputConfig {
        self.canvas
    }

    /// First destination point within the pick radius, scanning in corner order
    pub fn select_nearest(&self, pointer: Point) -> Option<Corner> {
        let threshold_sq = self.view.drag_threshold_radius * self.view.drag_threshold_radius;
        Corner::ALL
            .into_iter()
            .find(|c| pointer.distance_squared(self.destination[c.index()]) < threshold_sq)
    }

    pub fn begin_drag(&mut self, pointer: Point) {
        self.dragging = self.select_nearest(pointer);
        if let Some(corner) = self.dragging {
            debug!("Dragging {} from ({:.1}, {:.1})", corner.label(), pointer.x, pointer.y);
        }
    }

    /// Move the dragged corner to `pointer`. Returns true if a point changed.
    pub fn update_drag(&mut self, pointer: Point) -> bool {
        match self.dragging {
            Some(corner) => {
                self.set_destination(corner, pointer);
                true
            }
            None => false,
        }
    }

    pub fn end_drag(&mut self) {
        if let Some(corner) = self.dragging.take() {
            let p = self.destination(corner);
            debug!("Released {} at ({:.1}, {:.1})", corner.label(), p.x, p.y);
        }
    }

    /// Flip marker visibility and return the new value
    pub fn toggle_markers(&mut self) -> bool {
        self.view.show_corner_markers = !self.view.show_corner_markers;
        self.view.show_corner_markers
    }

    pub fn set_destination(&mut self, corner: Corner, point: Point) {
        self.destination[corner.index()] = self.constrain(point);
    }

    /// Restore the starting quad and drop any active drag
    pub fn reset(&mut self) {
        self.dragging = None;
        self.destination = self.initial;
    }

    fn constrain(&self, p: Point) -> Point {
        if !self.view.clamp_to_canvas {
            return p;
        }
        Point::new(
            p.x.clamp(0.0, self.canvas.width as f64),
            p.y.clamp(0.0, self.canvas.height as f64),
        )
    }
}
