//! Warping the source image into the output canvas
//!
//! Every output pixel is mapped back through the inverse homography and
//! sampled bilinearly from the source. Rows are independent, so they are
//! warped in parallel. Corner markers are drawn on top afterwards.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_circle_mut;
use rayon::prelude::*;
use tracing::debug;

use crate::config::{OutputConfig, Point, ViewConfig};
use crate::correspondence::CorrespondenceModel;
use crate::transform::HomographyTransform;

/// Result of a redraw request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedrawOutcome {
    /// A new frame was rendered and should be presented
    Rendered,
    /// The correspondences are degenerate; the previous frame is kept
    Frozen,
}

/// Derives the transform from the model and keeps the last valid frame
pub struct WarpRenderer {
    input: RgbImage,
    frame: RgbImage,
    transform: Option<HomographyTransform>,
    frozen: bool,
}

impl WarpRenderer {
    pub fn new(input: RgbImage, output: OutputConfig, view: &ViewConfig) -> Self {
        let frame = RgbImage::from_pixel(output.width, output.height, Rgb(view.background));
        Self {
            input,
            frame,
            transform: None,
            frozen: false,
        }
    }

    /// Last successfully rendered frame
    pub fn frame(&self) -> &RgbImage {
        &self.frame
    }

    /// Transform behind the current frame
    pub fn transform(&self) -> Option<&HomographyTransform> {
        self.transform.as_ref()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Recompute the transform and re-render the frame in place
    pub fn redraw(&mut self, model: &CorrespondenceModel) -> RedrawOutcome {
        let transform = match HomographyTransform::compute(&model.correspondences()) {
            Ok(transform) => transform,
            Err(e) => {
                if !self.frozen {
                    debug!("Holding last frame: {}", e);
                    self.frozen = true;
                }
                return RedrawOutcome::Frozen;
            }
        };
        if self.frozen {
            debug!("Correspondences valid again, resuming redraw");
            self.frozen = false;
        }

        compose(&self.input, &transform, model.view(), model.destinations(), &mut self.frame);
        self.transform = Some(transform);
        RedrawOutcome::Rendered
    }
}

/// Render a fresh frame of `output` size
pub fn render(
    input: &RgbImage,
    transform: &HomographyTransform,
    output: OutputConfig,
    view: &ViewConfig,
    destinations: &[Point; 4],
) -> RgbImage {
    let mut frame = RgbImage::new(output.width, output.height);
    compose(input, transform, view, destinations, &mut frame);
    frame
}

/// Warp plus markers into an existing frame
fn compose(
    input: &RgbImage,
    transform: &HomographyTransform,
    view: &ViewConfig,
    destinations: &[Point; 4],
    frame: &mut RgbImage,
) {
    warp_into(input, transform, Rgb(view.background), frame);
    if view.show_corner_markers {
        draw_markers(frame, destinations, view);
    }
}

/// Warp `src` through `transform` into every pixel of `dst`
pub fn warp_into(src: &RgbImage, transform: &HomographyTransform, background: Rgb<u8>, dst: &mut RgbImage) {
    let dst_w = dst.width() as usize;
    if dst_w == 0 || src.width() == 0 || src.height() == 0 {
        return;
    }
    let stride = dst_w * 3;
    let raw: &mut [u8] = dst;

    raw.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
        for (x, out) in row.chunks_exact_mut(3).enumerate() {
            let pixel = transform
                .inverse_transform_point(x as f64, y as f64)
                .and_then(|(sx, sy)| bilinear_sample(src, sx, sy))
                .unwrap_or(background);
            out.copy_from_slice(&pixel.0);
        }
    });
}

/// Bilinear interpolation, `None` outside the source pixel area
#[inline]
fn bilinear_sample(src: &RgbImage, x: f64, y: f64) -> Option<Rgb<u8>> {
    let (width, height) = (src.width() as usize, src.height() as usize);

    // pixel i covers [i - 0.5, i + 0.5)
    if !(x >= -0.5 && y >= -0.5 && x < width as f64 - 0.5 && y < height as f64 - 0.5) {
        return None;
    }
    let x = x.clamp(0.0, (width - 1) as f64);
    let y = y.clamp(0.0, (height - 1) as f64);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let raw: &[u8] = src;
    let at = |px: usize, py: usize, c: usize| raw[(py * width + px) * 3 + c] as f64;

    let mut result = [0u8; 3];
    for (c, value) in result.iter_mut().enumerate() {
        let v = at(x0, y0, c) * (1.0 - fx) * (1.0 - fy)
            + at(x1, y0, c) * fx * (1.0 - fy)
            + at(x0, y1, c) * (1.0 - fx) * fy
            + at(x1, y1, c) * fx * fy;
        *value = v.round().clamp(0.0, 255.0) as u8;
    }

    Some(Rgb(result))
}

/// Draw a ring of the pick radius around every destination point
pub fn draw_markers(frame: &mut RgbImage, points: &[Point; 4], view: &ViewConfig) {
    let color = Rgb(view.marker_color);
    let radius = view.drag_threshold_radius.round() as i32;
    let thickness = view.marker_thickness.max(1) as i32;
    // rings from radius - t/2 up to radius + (t - 1)/2, including the radius itself
    let inner = (radius - thickness / 2).max(0);
    let reach = (inner + thickness) as f64;
    let (width, height) = (frame.width() as f64, frame.height() as f64);

    for p in points {
        // rings that cannot touch the frame are skipped before the i32 cast
        if !p.is_finite()
            || p.x < -reach
            || p.y < -reach
            || p.x > width + reach
            || p.y > height + reach
        {
            continue;
        }
        let center = (p.x.round() as i32, p.y.round() as i32);
        for r in inner..inner + thickness {
            draw_hollow_circle_mut(frame, center, r, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_DESTINATION;
    use crate::correspondence::{source_corners, Corner};

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    fn identity_model(width: u32, height: u32, view: ViewConfig) -> CorrespondenceModel {
        CorrespondenceModel::new(
            (width, height),
            source_corners(width, height),
            OutputConfig { width, height },
            view,
        )
    }

    #[test]
    fn test_identity_reproduces_input() {
        let input = gradient(37, 23);
        let model = identity_model(37, 23, ViewConfig::default());
        let transform = HomographyTransform::compute(&model.correspondences()).unwrap();
        assert!(transform.is_identity(1e-9));

        let frame = render(
            &input,
            &transform,
            OutputConfig { width: 37, height: 23 },
            model.view(),
            model.destinations(),
        );
        assert_eq!(frame, input);
    }

    #[test]
    fn test_outside_source_is_background() {
        let input = RgbImage::from_pixel(10, 10, Rgb([200, 200, 200]));
        let view = ViewConfig {
            background: [1, 2, 3],
            ..ViewConfig::default()
        };
        // identity transform into a larger canvas
        let frame = render(
            &input,
            &HomographyTransform::identity(),
            OutputConfig { width: 20, height: 20 },
            &view,
            &source_corners(10, 10),
        );
        assert_eq!(frame.get_pixel(5, 5), &Rgb([200, 200, 200]));
        assert_eq!(frame.get_pixel(9, 9), &Rgb([200, 200, 200]));
        assert_eq!(frame.get_pixel(10, 10), &Rgb([1, 2, 3]));
        assert_eq!(frame.get_pixel(19, 0), &Rgb([1, 2, 3]));
    }

    #[test]
    fn test_bilinear_midpoint() {
        let mut input = RgbImage::new(2, 1);
        input.put_pixel(0, 0, Rgb([0, 0, 0]));
        input.put_pixel(1, 0, Rgb([100, 200, 50]));
        assert_eq!(bilinear_sample(&input, 0.5, 0.0), Some(Rgb([50, 100, 25])));
        assert_eq!(bilinear_sample(&input, 1.6, 0.0), None);
        assert_eq!(bilinear_sample(&input, -0.6, 0.0), None);
    }

    #[test]
    fn test_markers_only_when_enabled() {
        let input = RgbImage::new(64, 64);
        let color = [255, 0, 255];
        let view = ViewConfig {
            marker_color: color,
            ..ViewConfig::default()
        };
        let mut model = CorrespondenceModel::new(
            (64, 64),
            DEFAULT_DESTINATION,
            OutputConfig { width: 640, height: 480 },
            view,
        );
        let mut renderer = WarpRenderer::new(input, model.canvas(), model.view());

        let marker_at = |frame: &RgbImage, p: Point| {
            let x = (p.x + 10.0) as u32;
            frame.get_pixel(x, p.y as u32) == &Rgb(color)
        };

        assert_eq!(renderer.redraw(&model), RedrawOutcome::Rendered);
        for p in model.destinations() {
            assert!(!marker_at(renderer.frame(), *p));
        }

        assert!(model.toggle_markers());
        assert_eq!(renderer.redraw(&model), RedrawOutcome::Rendered);
        for p in model.destinations() {
            assert!(marker_at(renderer.frame(), *p));
        }

        assert!(!model.toggle_markers());
        assert_eq!(renderer.redraw(&model), RedrawOutcome::Rendered);
        for p in model.destinations() {
            assert!(!marker_at(renderer.frame(), *p));
        }
    }

    #[test]
    fn test_far_markers_leave_frame_untouched() {
        let view = ViewConfig {
            show_corner_markers: true,
            ..ViewConfig::default()
        };
        let mut frame = RgbImage::from_pixel(100, 100, Rgb([7, 7, 7]));
        let before = frame.clone();
        let points = [
            Point::new(3e9, 3e9),
            Point::new(-3e9, 5.0),
            Point::new(50.0, 1e300),
            Point::new(f64::NAN, 20.0),
        ];
        draw_markers(&mut frame, &points, &view);
        assert_eq!(frame, before);

        // a ring centred just outside the edge still reaches into the frame
        let points = [Point::new(-5.0, 50.0); 4];
        draw_markers(&mut frame, &points, &view);
        assert_eq!(frame.get_pixel(5, 50), &Rgb(view.marker_color));
    }

    #[test]
    fn test_redraw_with_far_dragged_corner() {
        let view = ViewConfig {
            show_corner_markers: true,
            ..ViewConfig::default()
        };
        let mut model = CorrespondenceModel::new(
            (32, 32),
            DEFAULT_DESTINATION,
            OutputConfig { width: 640, height: 480 },
            view,
        );
        let mut renderer = WarpRenderer::new(gradient(32, 32), model.canvas(), model.view());
        model.begin_drag(DEFAULT_DESTINATION[2]);
        assert!(model.update_drag(Point::new(3e9, 3e9)));
        // either outcome is fine as long as nothing panics
        let _ = renderer.redraw(&model);
        model.end_drag();
    }

    #[test]
    fn test_renderer_matches_one_shot_render() {
        let model = CorrespondenceModel::new(
            (24, 24),
            [
                Point::new(12.0, 6.0),
                Point::new(70.0, 3.0),
                Point::new(66.0, 50.0),
                Point::new(8.0, 44.0),
            ],
            OutputConfig { width: 80, height: 60 },
            ViewConfig {
                show_corner_markers: true,
                background: [9, 8, 7],
                ..ViewConfig::default()
            },
        );
        let input = gradient(24, 24);
        let mut renderer = WarpRenderer::new(input.clone(), model.canvas(), model.view());
        assert_eq!(renderer.redraw(&model), RedrawOutcome::Rendered);

        let transform = HomographyTransform::compute(&model.correspondences()).unwrap();
        let frame = render(&input, &transform, model.canvas(), model.view(), model.destinations());
        assert_eq!(renderer.frame(), &frame);
    }

    #[test]
    fn test_degenerate_keeps_previous_frame() {
        let input = gradient(32, 32);
        let mut model = CorrespondenceModel::new(
            (32, 32),
            [
                Point::new(10.0, 5.0),
                Point::new(50.0, 8.0),
                Point::new(55.0, 40.0),
                Point::new(4.0, 45.0),
            ],
            OutputConfig { width: 64, height: 48 },
            ViewConfig::default(),
        );
        let mut renderer = WarpRenderer::new(input, model.canvas(), model.view());
        assert_eq!(renderer.redraw(&model), RedrawOutcome::Rendered);
        let good_frame = renderer.frame().clone();
        let good_transform = renderer.transform().cloned();

        let p = Point::new(20.0, 20.0);
        model.set_destination(Corner::TopLeft, p);
        model.set_destination(Corner::TopRight, p);
        model.set_destination(Corner::BottomRight, p);
        assert_eq!(renderer.redraw(&model), RedrawOutcome::Frozen);
        assert!(renderer.is_frozen());
        assert_eq!(renderer.frame(), &good_frame);
        assert_eq!(renderer.transform().cloned(), good_transform);

        model.reset();
        assert_eq!(renderer.redraw(&model), RedrawOutcome::Rendered);
        assert!(!renderer.is_frozen());
    }

    #[test]
    fn test_warp_lands_source_corner_on_destination() {
        let mut input = RgbImage::from_pixel(16, 16, Rgb([10, 10, 10]));
        input.put_pixel(0, 0, Rgb([250, 0, 0]));
        let dst = [
            Point::new(30.0, 20.0),
            Point::new(70.0, 25.0),
            Point::new(65.0, 60.0),
            Point::new(28.0, 55.0),
        ];
        let model = CorrespondenceModel::new(
            (16, 16),
            dst,
            OutputConfig { width: 100, height: 80 },
            ViewConfig::default(),
        );
        let mut renderer = WarpRenderer::new(input, model.canvas(), model.view());
        renderer.redraw(&model);

        let frame = renderer.frame();
        assert_eq!(frame.get_pixel(30, 20).0[0], 250);
        assert_eq!(frame.get_pixel(5, 5), &Rgb([0, 0, 0]));
        assert_eq!(frame.get_pixel(50, 40), &Rgb([10, 10, 10]));
    }
}
