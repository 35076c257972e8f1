//! The interactive session: input in, frames out
//!
//! `Session` owns the correspondence model and the renderer. Each input event
//! is applied to the model synchronously, and if it changed what is on screen
//! the frame is recomputed and presented exactly once.

use anyhow::Result;
use image::RgbImage;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::Config;
use crate::correspondence::CorrespondenceModel;
use crate::display::DisplaySurface;
use crate::input::{ClickTracker, Command, InputEvent, KeyBindings};
use crate::render::{RedrawOutcome, WarpRenderer};

/// What the event loop should do after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Quit,
}

pub struct Session {
    model: CorrespondenceModel,
    renderer: WarpRenderer,
    keys: KeyBindings,
    clicks: ClickTracker,
}

impl Session {
    pub fn new(config: &Config, image: RgbImage) -> Self {
        let model = CorrespondenceModel::new(
            image.dimensions(),
            config.destination,
            config.output,
            config.view.clone(),
        );
        let renderer = WarpRenderer::new(image, config.output, &config.view);
        Self {
            model,
            renderer,
            keys: KeyBindings::from_config(&config.input),
            clicks: ClickTracker::from_config(&config.input),
        }
    }

    pub fn model(&self) -> &CorrespondenceModel {
        &self.model
    }

    pub fn renderer(&self) -> &WarpRenderer {
        &self.renderer
    }

    /// Last valid frame, for re-presenting after expose or resize
    pub fn frame(&self) -> &RgbImage {
        self.renderer.frame()
    }

    /// Render and present the first frame
    pub fn start(&mut self, surface: &mut impl DisplaySurface) -> Result<()> {
        if self.redraw(surface)? == RedrawOutcome::Frozen {
            info!("Initial quad is degenerate; drag a corner to begin");
        }
        Ok(())
    }

    /// Apply one input event, redrawing if it changed the picture
    pub fn handle(
        &mut self,
        event: InputEvent,
        at: Instant,
        surface: &mut impl DisplaySurface,
    ) -> Result<Control> {
        let changed = match event {
            InputEvent::PointerDown(p) => {
                let double = self.clicks.press(at, p);
                self.model.begin_drag(p);
                if double {
                    self.toggle_markers();
                }
                double
            }
            InputEvent::PointerMove(p) => self.model.update_drag(p),
            InputEvent::PointerUp(_) => {
                self.model.end_drag();
                false
            }
            InputEvent::KeyPressed(key) => match self.keys.command(key) {
                Some(Command::Quit) => {
                    info!("Quit requested");
                    return Ok(Control::Quit);
                }
                Some(Command::ToggleMarkers) => {
                    self.toggle_markers();
                    true
                }
                Some(Command::Reset) => {
                    info!("Destination quad reset");
                    self.model.reset();
                    true
                }
                None => false,
            },
        };

        if changed {
            self.redraw(surface)?;
        }
        Ok(Control::Continue)
    }

    fn toggle_markers(&mut self) {
        let shown = self.model.toggle_markers();
        debug!("Corner markers {}", if shown { "on" } else { "off" });
    }

    fn redraw(&mut self, surface: &mut impl DisplaySurface) -> Result<RedrawOutcome> {
        let outcome = self.renderer.redraw(&self.model);
        if outcome == RedrawOutcome::Rendered {
            surface.present(self.renderer.frame())?;
        }
        Ok(outcome)
    }
}
