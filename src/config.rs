//! Configuration management for homowarp
//!
//! Configuration is read from an optional TOML file and then overridden by
//! command line arguments. Nothing is ever written back.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A 2D point in canvas (pixel) coordinates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point
    #[inline]
    pub fn distance_squared(&self, other: Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// The illustrative quad used when nothing else is configured.
/// Order: top-left, top-right, bottom-right, bottom-left
pub const DEFAULT_DESTINATION: [Point; 4] = [
    Point::new(277.0, 89.0),
    Point::new(551.0, 217.0),
    Point::new(319.0, 399.0),
    Point::new(39.0, 270.0),
];

/// Window settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    /// Borderless fullscreen on the current monitor
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "homography".to_string(),
            fullscreen: false,
        }
    }
}

/// Source image settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub path: PathBuf,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("resources/Lenna.jpg"),
        }
    }
}

/// Output canvas size
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OutputConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// How the warped frame and its overlay are drawn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ViewConfig {
    /// Draw a circle at every destination corner
    pub show_corner_markers: bool,
    /// Pick radius for pointer-down, also the marker radius
    pub drag_threshold_radius: f64,
    /// Marker color (RGB)
    pub marker_color: [u8; 3],
    /// Marker ring thickness in pixels
    pub marker_thickness: u32,
    /// Fill for output pixels that map outside the source image (RGB)
    pub background: [u8; 3],
    /// Keep destination points inside the output canvas
    pub clamp_to_canvas: bool,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            show_corner_markers: false,
            drag_threshold_radius: 10.0,
            marker_color: [0, 100, 100],
            marker_thickness: 2,
            background: [0, 0, 0],
            clamp_to_canvas: false,
        }
    }
}

/// Key bindings and pointer timing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InputConfig {
    pub toggle_key: char,
    pub reset_key: char,
    pub quit_key: char,
    /// Max gap between two presses that still counts as a double-click
    pub double_click_ms: u64,
    /// Max pointer travel between the two presses of a double-click
    pub double_click_radius: f64,
    /// Event loop wake-up interval while idle
    pub idle_poll_ms: u64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            toggle_key: 'm',
            reset_key: 'r',
            quit_key: 'q',
            double_click_ms: 400,
            double_click_radius: 4.0,
            idle_poll_ms: 30,
        }
    }
}

fn default_destination() -> [Point; 4] {
    DEFAULT_DESTINATION
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub window: WindowConfig,

    #[serde(default)]
    pub image: ImageConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub view: ViewConfig,

    #[serde(default)]
    pub input: InputConfig,

    /// Initial destination quad, top-left first, clockwise
    #[serde(default = "default_destination")]
    pub destination: [Point; 4],
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            image: ImageConfig::default(),
            output: OutputConfig::default(),
            view: ViewConfig::default(),
            input: InputConfig::default(),
            destination: DEFAULT_DESTINATION,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config from {:?}", path))?;
        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load from `path` if one is given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Set the destination quad from eight flat coordinates
    pub fn set_destination_flat(&mut self, coords: &[f64]) -> Result<()> {
        if coords.len() != 8 {
            bail!(
                "Destination quad needs 8 coordinates (x0,y0,...,x3,y3), got {}",
                coords.len()
            );
        }
        for (i, pair) in coords.chunks_exact(2).enumerate() {
            self.destination[i] = Point::new(pair[0], pair[1]);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.output.width == 0 || self.output.height == 0 {
            bail!(
                "Output canvas must be non-empty, got {}x{}",
                self.output.width,
                self.output.height
            );
        }
        let radius = self.view.drag_threshold_radius;
        if !radius.is_finite() || radius <= 0.0 {
            bail!("Drag threshold radius must be positive, got {}", radius);
        }
        if let Some(p) = self.destination.iter().find(|p| !p.is_finite()) {
            bail!("Destination point {:?} is not finite", p);
        }
        Ok(())
    }
}
