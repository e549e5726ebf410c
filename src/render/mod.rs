//! Render adapter
//!
//! Draws a round `Snapshot` to a `PixelSurface`. Textures come from the
//! pipeline when ready; otherwise the bubble gets the placeholder fill and a
//! texture request is queued for a later frame.

pub mod surface;

use serde::Serialize;

use crate::assets::{TexturePipeline, SIZE_BUCKETS};
use crate::game::performance::PerformanceMonitor;
use crate::game::round::Snapshot;
use crate::game::state::{BubbleView, ImageTable};

pub use self::surface::{Color, PixelSurface};

/// Most bubbles drawn in one frame
pub const MAX_SPRITES: usize = 4096;

pub const BACKGROUND: Color = [16, 18, 27, 255];
/// Fill for bubbles whose texture is not ready
pub const PLACEHOLDER: Color = [0x7f, 0xdb, 0xff, 255];
pub const SPIKE: Color = [170, 170, 185, 255];
pub const SUPER_FILL: Color = [177, 13, 201, 255];

/// Bubbles smaller than this never request textures
const MIN_TEXTURE_DIAMETER: f32 = SIZE_BUCKETS[0] as f32 / 2.0;
/// Alpha for bubbles waiting out their death delay
const DYING_ALPHA: u8 = 110;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Pixel buffer size does not match surface dimensions")]
    Buffer,
    #[error("Failed to save frame to {path}: {reason}")]
    Save { path: String, reason: String },
}

/// Health ring color by percentage
pub fn health_color(percent: f32) -> Color {
    if percent > 60.0 {
        [46, 204, 64, 255]
    } else if percent > 30.0 {
        [255, 220, 0, 255]
    } else {
        [255, 65, 54, 255]
    }
}

/// Per-frame drawing limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderBudget {
    pub max_sprites: usize,
    pub request_textures: bool,
}

impl Default for RenderBudget {
    fn default() -> Self {
        Self {
            max_sprites: MAX_SPRITES,
            request_textures: true,
        }
    }
}

impl RenderBudget {
    pub fn from_monitor(monitor: &PerformanceMonitor) -> Self {
        Self {
            max_sprites: monitor.sprite_budget(MAX_SPRITES),
            request_textures: monitor.can_request_textures(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameStats {
    pub drawn: usize,
    pub skipped: usize,
    pub textured: usize,
    pub placeholders: usize,
    pub requested: usize,
}

pub struct Renderer {
    surface: PixelSurface,
}

impl Renderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            surface: PixelSurface::new(width, height),
        }
    }

    pub fn surface(&self) -> &PixelSurface {
        &self.surface
    }

    /// Draw one frame
    pub fn draw(
        &mut self,
        snapshot: &Snapshot,
        images: &ImageTable,
        textures: &TexturePipeline,
        budget: RenderBudget,
    ) -> FrameStats {
        let (w, h) = (snapshot.arena.width.round() as u32, snapshot.arena.height.round() as u32);
        if w.max(1) != self.surface.width() || h.max(1) != self.surface.height() {
            self.surface = PixelSurface::new(w, h);
        }
        self.surface.clear(BACKGROUND);

        for spike in &snapshot.spikes {
            let tri = spike.triangle(&snapshot.arena).map(|v| (v.x, v.y));
            self.surface.fill_polygon(&tri, SPIKE);
        }

        let mut stats = FrameStats::default();
        for view in &snapshot.bubbles {
            if stats.drawn >= budget.max_sprites {
                stats.skipped += 1;
                continue;
            }
            self.draw_bubble(view, images, textures, budget, &mut stats);
            stats.drawn += 1;
        }

        if let Some(s) = &snapshot.super_entity {
            let texture = s
                .image
                .and_then(|image| images.url(image))
                .and_then(|url| {
                    let size = s.radius * 2.0;
                    let ready = textures.get_ready_texture(url, size);
                    if ready.is_none() && budget.request_textures {
                        textures.request_masked_texture(url, size);
                    }
                    ready
                });
            match texture {
                Some(tex) => self.surface.draw_texture_circle(&tex, s.x, s.y, s.radius, 255),
                None => self.surface.fill_circle(s.x, s.y, s.radius, SUPER_FILL),
            }
            let percent = if s.max_health > 0.0 { s.health / s.max_health * 100.0 } else { 0.0 };
            self.surface
                .stroke_circle(s.x, s.y, s.radius, (s.radius * 0.08).max(2.0), health_color(percent));
        }

        for p in &snapshot.projectiles {
            let (r, g, b) = p.damage_type.color();
            self.surface.fill_circle(p.x, p.y, p.radius, [r, g, b, 255]);
        }

        stats
    }

    fn draw_bubble(
        &mut self,
        view: &BubbleView,
        images: &ImageTable,
        textures: &TexturePipeline,
        budget: RenderBudget,
        stats: &mut FrameStats,
    ) {
        let alpha = if view.dying { DYING_ALPHA } else { 255 };
        let diameter = view.radius * 2.0;

        let texture = images.url(view.image).and_then(|url| {
            let ready = textures.get_ready_texture(url, diameter);
            if ready.is_none()
                && budget.request_textures
                && diameter >= MIN_TEXTURE_DIAMETER
                && textures.request_masked_texture(url, diameter)
            {
                stats.requested += 1;
            }
            ready
        });

        match texture {
            Some(tex) => {
                self.surface.draw_texture_circle(&tex, view.x, view.y, view.radius, alpha);
                stats.textured += 1;
            }
            None => {
                let mut fill = PLACEHOLDER;
                fill[3] = alpha;
                self.surface.fill_circle(view.x, view.y, view.radius, fill);
                stats.placeholders += 1;
            }
        }

        let mut ring = health_color(view.health);
        ring[3] = alpha;
        self.surface
            .stroke_circle(view.x, view.y, view.radius, (view.radius * 0.12).max(1.5), ring);
    }
}
