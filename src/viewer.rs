//! winit front end
//!
//! `Viewer` owns the session and the window surface. winit events are turned
//! into `InputEvent`s in canvas coordinates and handed to the session.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key as WinitKey, NamedKey};
use winit::window::{Fullscreen, Window, WindowId};

use crate::config::{Config, Point};
use crate::display::{DisplaySurface, SoftbufferSurface};
use crate::input::{InputEvent, Key};
use crate::session::{Control, Session};

struct Viewer {
    session: Session,
    title: String,
    fullscreen: bool,
    canvas: (u32, u32),
    idle_poll: Duration,
    window: Option<Arc<Window>>,
    surface: Option<SoftbufferSurface>,
    /// Last cursor position in canvas coordinates
    cursor: Point,
    /// First error raised inside the event loop
    error: Option<anyhow::Error>,
}

impl Viewer {
    fn new(config: &Config, session: Session) -> Self {
        Self {
            session,
            title: config.window.title.clone(),
            fullscreen: config.window.fullscreen,
            canvas: (config.output.width, config.output.height),
            idle_poll: Duration::from_millis(config.input.idle_poll_ms.max(1)),
            window: None,
            surface: None,
            cursor: Point::new(0.0, 0.0),
            error: None,
        }
    }

    fn open(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let mut attributes = Window::default_attributes()
            .with_title(self.title.clone())
            .with_inner_size(PhysicalSize::new(self.canvas.0, self.canvas.1));
        if self.fullscreen {
            attributes = attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .map_err(|e| anyhow!("Failed to create window {:?}: {}", self.title, e))?,
        );
        let mut surface = SoftbufferSurface::new(window.clone(), self.canvas)?;
        info!(
            "Window {:?} open at {}x{}",
            self.title,
            surface.viewport().window_size().0,
            surface.viewport().window_size().1
        );

        self.session.start(&mut surface)?;
        self.window = Some(window);
        self.surface = Some(surface);
        Ok(())
    }

    fn dispatch(&mut self, event: InputEvent) -> Result<Control> {
        match self.surface.as_mut() {
            Some(surface) => self.session.handle(event, Instant::now(), surface),
            None => Ok(Control::Continue),
        }
    }

    fn on_window_event(&mut self, event_loop: &ActiveEventLoop, event: WindowEvent) -> Result<()> {
        let input = match event {
            WindowEvent::CloseRequested => {
                info!("Window closed");
                event_loop.exit();
                return Ok(());
            }
            WindowEvent::Resized(size) => {
                if let Some(surface) = self.surface.as_mut() {
                    surface.resize(size.width, size.height);
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
                return Ok(());
            }
            WindowEvent::RedrawRequested => {
                if let Some(surface) = self.surface.as_mut() {
                    surface.present(self.session.frame())?;
                }
                return Ok(());
            }
            WindowEvent::CursorMoved { position, .. } => {
                if let Some(surface) = &self.surface {
                    self.cursor = surface.viewport().to_canvas(position.x, position.y);
                }
                InputEvent::PointerMove(self.cursor)
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => match state {
                ElementState::Pressed => InputEvent::PointerDown(self.cursor),
                ElementState::Released => InputEvent::PointerUp(self.cursor),
            },
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key,
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => match translate_key(&logical_key) {
                Some(key) => InputEvent::KeyPressed(key),
                None => return Ok(()),
            },
            _ => return Ok(()),
        };

        if self.dispatch(input)? == Control::Quit {
            event_loop.exit();
        }
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        error!("{:#}", e);
        if self.error.is_none() {
            self.error = Some(e);
        }
        event_loop.exit();
    }
}

impl ApplicationHandler for Viewer {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.open(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Err(e) = self.on_window_event(event_loop, event) {
            self.fail(event_loop, e);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        // wake up periodically so quit stays responsive while idle
        event_loop.set_control_flow(ControlFlow::WaitUntil(Instant::now() + self.idle_poll));
    }
}

fn translate_key(key: &WinitKey) -> Option<Key> {
    match key {
        WinitKey::Named(NamedKey::Escape) => Some(Key::Escape),
        WinitKey::Character(s) => s.chars().next().map(Key::Char),
        _ => None,
    }
}

/// Open the window and run until the user quits
pub fn run(config: &Config, session: Session) -> Result<()> {
    let event_loop =
        EventLoop::new().map_err(|e| anyhow!("Failed to create event loop: {}", e))?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut viewer = Viewer::new(config, session);
    event_loop
        .run_app(&mut viewer)
        .map_err(|e| anyhow!("Event loop terminated abnormally: {}", e))?;

    match viewer.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
