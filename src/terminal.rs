// SPDX-License-Identifier: GPL-3.0-only

//! Terminal-based preview
//!
//! Drives a [`PipelineController`] whose presentation surface is sized to
//! the terminal, two pixels per cell, and draws each presented drawable
//! with Unicode half-block characters.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal, backend::CrosstermBackend, buffer::Buffer, layout::Rect, style::Color,
    widgets::Widget,
};
use std::io::{self, stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::backends::camera::create_source;
use crate::config::Config;
use crate::pipeline::{PipelineController, PipelineState, Size};
use crate::presentation::{
    HostFactory, PresentedFrame, SurfaceFactory, SurfaceHost, software_surface_factory,
    wgpu_surface_factory,
};

const INPUT_POLL: Duration = Duration::from_millis(16);

/// Forwards presented frames to the UI thread, dropping when it lags
struct ChannelHost {
    sender: Sender<PresentedFrame>,
}

impl SurfaceHost for ChannelHost {
    fn on_presented(&mut self, frame: PresentedFrame) {
        if let Err(TrySendError::Disconnected(_)) = self.sender.try_send(frame) {
            tracing::trace!("Terminal view gone, discarding presented frame");
        }
    }

    fn wants_pixels(&self) -> bool {
        true
    }
}

fn channel_host() -> (HostFactory, Receiver<PresentedFrame>) {
    let (sender, receiver) = crossbeam_channel::bounded(1);
    let factory: HostFactory = Arc::new(move || {
        Box::new(ChannelHost {
            sender: sender.clone(),
        })
    });
    (factory, receiver)
}

/// Run the terminal preview until `q` or Ctrl+C
pub fn run(config: &Config, software: bool) -> Result<(), Box<dyn std::error::Error>> {
    let (host_factory, frames) = channel_host();
    let factory: SurfaceFactory = if software {
        software_surface_factory(host_factory)
    } else {
        wgpu_surface_factory(host_factory)
    };
    let source = create_source(&config.camera_device(), config.output_format);
    let controller = PipelineController::new(source, factory, config.pipeline_settings());

    // Configure before taking over the terminal so errors stay readable
    controller.configure()?;
    info!(filter = %config.filter, "Terminal preview running");

    // Set up terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &controller, &frames);

    controller.stop();

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

/// Pixel size of the preview area: one column and two rows per cell
fn preview_size(area: Rect) -> Size {
    Size::new(
        area.width as f64,
        (area.height.saturating_sub(1) as f64) * 2.0,
    )
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    controller: &PipelineController,
    frames: &Receiver<PresentedFrame>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut frame_widget = FrameWidget::new();
    let mut show_help = false;
    let mut notice: Option<String> = None;
    let mut last_size = Size::default();

    loop {
        while let Ok(frame) = frames.try_recv() {
            frame_widget.update_frame(frame);
        }

        let area = terminal.size()?;
        let size = preview_size(Rect::new(0, 0, area.width, area.height));
        if size != last_size {
            controller.set_target_size(size, 1.0);
            last_size = size;
        }

        let message = match (&notice, show_help) {
            (Some(notice), _) => notice.clone(),
            (None, true) => build_help_message(),
            (None, false) => build_status_message(controller),
        };

        terminal.draw(|f| {
            let area = f.area();

            // Reserve bottom line for status
            let camera_area = Rect {
                x: area.x,
                y: area.y,
                width: area.width,
                height: area.height.saturating_sub(1),
            };
            f.render_widget(&frame_widget, camera_area);

            let status_area = Rect {
                x: area.x,
                y: area.height.saturating_sub(1),
                width: area.width,
                height: 1,
            };
            f.render_widget(StatusBar { message: &message }, status_area);
        })?;

        if controller.state() != PipelineState::Running {
            break;
        }

        if event::poll(INPUT_POLL)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                break;
            }

            match key.code {
                KeyCode::Char('q') => break,
                KeyCode::Char('p') => {
                    show_help = false;
                    notice = frame_widget.frame.as_ref().map(|frame| match save_snapshot(frame) {
                        Ok(path) => format!("Saved: {}", path.display()),
                        Err(e) => {
                            error!("Failed to save snapshot: {}", e);
                            format!("Error: {}", e)
                        }
                    });
                }
                KeyCode::Char('h') => {
                    notice = None;
                    show_help = !show_help;
                }
                _ => notice = None,
            }
        }
    }

    Ok(())
}

fn build_status_message(controller: &PipelineController) -> String {
    let stats = controller.stats();
    format!(
        "{} | shown {} dropped {} | 'p' snapshot | 'h' help | 'q' quit",
        controller.settings().filter,
        stats.presented,
        stats.total_dropped
    )
}

fn build_help_message() -> String {
    String::from("p: Save snapshot | h: Toggle help | q/Ctrl+C: Quit")
}

/// Save the displayed frame as PNG
fn save_snapshot(frame: &PresentedFrame) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let pixels = frame.pixels.clone().ok_or("Frame has no pixels")?;
    let img = image::RgbaImage::from_raw(frame.width, frame.height, pixels)
        .ok_or("Failed to create image")?;

    let dir = dirs::picture_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("fxcam");
    std::fs::create_dir_all(&dir)?;

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let filepath = dir.join(format!("snapshot_{}.png", timestamp));
    img.save_with_format(&filepath, image::ImageFormat::Png)?;
    info!(path = %filepath.display(), "Snapshot saved");

    Ok(filepath)
}

/// Widget that renders a presented drawable using half-block characters
struct FrameWidget {
    frame: Option<PresentedFrame>,
}

impl FrameWidget {
    fn new() -> Self {
        Self { frame: None }
    }

    fn update_frame(&mut self, frame: PresentedFrame) {
        if frame.pixels.is_some() {
            self.frame = Some(frame);
        }
    }
}

impl Widget for &FrameWidget {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let Some((frame, pixels)) = self
            .frame
            .as_ref()
            .and_then(|f| f.pixels.as_deref().map(|p| (f, p)))
            .filter(|(f, _)| f.width > 0 && f.height > 0)
        else {
            let msg = "Waiting for camera...";
            let x = area.x + (area.width.saturating_sub(msg.len() as u16)) / 2;
            let y = area.y + area.height / 2;
            if y < area.y + area.height && x < area.x + area.width {
                buf.set_string(x, y, msg, ratatui::style::Style::default());
            }
            return;
        };

        // The drawable already matches the preview area; after a resize the
        // last one is stretched until a frame at the new size arrives.
        let x_scale = frame.width as f64 / area.width.max(1) as f64;
        let y_scale = frame.height as f64 / (area.height.max(1) as f64 * 2.0);

        for ty in 0..area.height {
            for tx in 0..area.width {
                let src_x = (tx as f64 * x_scale) as u32;
                let src_y_top = (ty as f64 * 2.0 * y_scale) as u32;
                let src_y_bottom = ((ty as f64 * 2.0 + 1.0) * y_scale) as u32;

                let top_color = sample_pixel(pixels, frame.width, frame.height, src_x, src_y_top);
                let bottom_color =
                    sample_pixel(pixels, frame.width, frame.height, src_x, src_y_bottom);

                if let Some(cell) = buf.cell_mut((area.x + tx, area.y + ty)) {
                    cell.set_char('▀');
                    cell.set_fg(top_color);
                    cell.set_bg(bottom_color);
                }
            }
        }
    }
}

fn sample_pixel(pixels: &[u8], width: u32, height: u32, x: u32, y: u32) -> Color {
    let x = x.min(width - 1);
    let y = y.min(height - 1);
    let idx = ((y * width + x) * 4) as usize;
    match pixels.get(idx..idx + 3) {
        Some(rgb) => Color::Rgb(rgb[0], rgb[1], rgb[2]),
        None => Color::Black,
    }
}

/// Status bar widget
struct StatusBar<'a> {
    message: &'a str,
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        for x in area.x..area.x + area.width {
            if let Some(cell) = buf.cell_mut((x, area.y)) {
                cell.set_char(' ');
                cell.set_bg(Color::DarkGray);
            }
        }

        let text: String = self.message.chars().take(area.width as usize).collect();
        buf.set_string(
            area.x,
            area.y,
            text,
            ratatui::style::Style::default()
                .fg(Color::White)
                .bg(Color::DarkGray),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32, rgba: [u8; 4]) -> PresentedFrame {
        PresentedFrame {
            sequence: 1,
            drawable: 0,
            width,
            height,
            pixels: Some(rgba.repeat((width * height) as usize)),
            latency: Duration::ZERO,
        }
    }

    #[test]
    fn test_preview_size_uses_half_blocks() {
        let size = preview_size(Rect::new(0, 0, 80, 25));
        assert_eq!(size, Size::new(80.0, 48.0));
    }

    #[test]
    fn test_frame_widget_draws_half_blocks() {
        let mut widget = FrameWidget::new();
        widget.update_frame(frame(4, 4, [10, 20, 30, 255]));

        let area = Rect::new(0, 0, 4, 2);
        let mut buf = Buffer::empty(area);
        (&widget).render(area, &mut buf);

        let cell = &buf[(1, 1)];
        assert_eq!(cell.symbol(), "▀");
        assert_eq!(cell.fg, Color::Rgb(10, 20, 30));
        assert_eq!(cell.bg, Color::Rgb(10, 20, 30));
    }

    #[test]
    fn test_frames_without_pixels_are_ignored() {
        let mut widget = FrameWidget::new();
        let mut f = frame(2, 2, [0, 0, 0, 255]);
        f.pixels = None;
        widget.update_frame(f);
        assert!(widget.frame.is_none());
    }

    #[test]
    fn test_channel_host_never_blocks() {
        let (factory, receiver) = channel_host();
        let mut host = factory();
        assert!(host.wants_pixels());
        host.on_presented(frame(1, 1, [1, 1, 1, 255]));
        host.on_presented(frame(1, 1, [2, 2, 2, 255]));
        assert_eq!(receiver.len(), 1);
    }
}
