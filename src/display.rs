//! Presenting frames to the window
//!
//! The canvas is drawn scaled to whatever size the window currently has,
//! letterboxed to keep its aspect ratio. `Viewport` holds that mapping in both directions: canvas pixels out to the
//! window, pointer positions back into canvas coordinates.

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use std::num::NonZeroU32;
use std::sync::Arc;
use winit::window::Window;

use crate::config::Point;

/// Something a finished frame can be shown on
pub trait DisplaySurface {
    fn present(&mut self, frame: &RgbImage) -> Result<()>;
}

/// Canvas to window placement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    canvas: (u32, u32),
    window: (u32, u32),
}

impl Viewport {
    pub fn new(canvas: (u32, u32), window: (u32, u32)) -> Self {
        Self { canvas, window }
    }

    pub fn window_size(&self) -> (u32, u32) {
        self.window
    }

    pub fn resize_window(&mut self, width: u32, height: u32) {
        self.window = (width, height);
    }

    /// Where the canvas lands in the window: `(x, y, width, height)`.
    ///
    /// The canvas keeps its aspect ratio, centred with black bars on the
    /// sides that do not fit. `None` while either size is zero.
    fn letterbox(&self) -> Option<(usize, usize, usize, usize)> {
        let (cw, ch) = self.canvas;
        let (ww, wh) = self.window;
        if cw == 0 || ch == 0 || ww == 0 || wh == 0 {
            return None;
        }
        let scale = (ww as f64 / cw as f64).min(wh as f64 / ch as f64);
        let w = ((cw as f64 * scale).round() as u32).clamp(1, ww);
        let h = ((ch as f64 * scale).round() as u32).clamp(1, wh);
        Some((((ww - w) / 2) as usize, ((wh - h) / 2) as usize, w as usize, h as usize))
    }

    /// Window (physical pixel) position to canvas coordinates
    pub fn to_canvas(&self, x: f64, y: f64) -> Point {
        match self.letterbox() {
            Some((ox, oy, w, h)) => Point::new(
                (x - ox as f64) * self.canvas.0 as f64 / w as f64,
                (y - oy as f64) * self.canvas.1 as f64 / h as f64,
            ),
            None => Point::new(x, y),
        }
    }

    /// Nearest-neighbour copy of `frame` into a 0RGB window buffer
    pub fn blit(&self, frame: &RgbImage, out: &mut [u32]) {
        out.fill(0);
        let (frame_w, frame_h) = (frame.width() as usize, frame.height() as usize);
        let Some((ox, oy, w, h)) = self.letterbox() else {
            return;
        };
        if frame_w == 0 || frame_h == 0 {
            return;
        }
        let win_w = self.window.0 as usize;
        let raw: &[u8] = frame;

        // precomputed column lookup, reused by every row
        let columns: Vec<usize> = (0..w).map(|x| x * frame_w / w).collect();

        for (y, row) in out.chunks_exact_mut(win_w).skip(oy).take(h).enumerate() {
            let src_y = y * frame_h / h;
            let src_row = &raw[src_y * frame_w * 3..(src_y + 1) * frame_w * 3];
            for (px, &src_x) in row[ox..ox + w].iter_mut().zip(columns.iter()) {
                let i = src_x * 3;
                *px = (src_row[i] as u32) << 16 | (src_row[i + 1] as u32) << 8 | src_row[i + 2] as u32;
            }
        }
    }
}

/// softbuffer-backed surface for a winit window
pub struct SoftbufferSurface {
    surface: softbuffer::Surface<Arc<Window>, Arc<Window>>,
    // the surface does not outlive its context
    _context: softbuffer::Context<Arc<Window>>,
    viewport: Viewport,
}

impl SoftbufferSurface {
    pub fn new(window: Arc<Window>, canvas: (u32, u32)) -> Result<Self> {
        let context = softbuffer::Context::new(window.clone())
            .map_err(|e| anyhow!("Failed to create display context: {}", e))?;
        let surface = softbuffer::Surface::new(&context, window.clone())
            .map_err(|e| anyhow!("Failed to create display surface: {}", e))?;

        let size = window.inner_size();
        Ok(Self {
            surface,
            _context: context,
            viewport: Viewport::new(canvas, (size.width, size.height)),
        })
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport.resize_window(width, height);
    }
}

impl DisplaySurface for SoftbufferSurface {
    fn present(&mut self, frame: &RgbImage) -> Result<()> {
        let (w, h) = self.viewport.window_size();
        let (Some(width), Some(height)) = (NonZeroU32::new(w), NonZeroU32::new(h)) else {
            // minimised
            return Ok(());
        };

        self.surface
            .resize(width, height)
            .map_err(|e| anyhow!("{}", e))
            .context("Failed to resize display surface")?;

        let mut buffer = self
            .surface
            .buffer_mut()
            .map_err(|e| anyhow!("{}", e))
            .context("Failed to map display buffer")?;
        self.viewport.blit(frame, &mut buffer);
        buffer
            .present()
            .map_err(|e| anyhow!("{}", e))
            .context("Failed to present frame")?;
        Ok(())
    }
}
