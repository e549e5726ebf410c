//! Arena entity definitions
//!
//! Contains the arena bounds, spikes, the boss-mode super-entity and its
//! projectiles, plus the read-only views handed to the renderer.

use std::fmt;
use std::str::FromStr;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::game::constants::{boss, projectile};
use crate::util::vec2::Vec2;

/// Stable bubble identifier, unique for the lifetime of a store
pub type BubbleId = u32;

/// Projectile identifier
pub type ProjectileId = u64;

/// Index into the deduplicated image table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef(pub u32);

/// Deduplicated table of image URLs
///
/// A bubble's visual identity is its `ImageRef`; the same URL always interns
/// to the same reference.
#[derive(Debug, Clone, Default)]
pub struct ImageTable {
    urls: Vec<String>,
    index: HashMap<String, ImageRef>,
}

impl ImageTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a URL, returning the existing reference if already present
    pub fn intern(&mut self, url: &str) -> ImageRef {
        if let Some(&r) = self.index.get(url) {
            return r;
        }
        let r = ImageRef(self.urls.len() as u32);
        self.urls.push(url.to_string());
        self.index.insert(url.to_string(), r);
        r
    }

    pub fn contains(&self, url: &str) -> bool {
        self.index.contains_key(url)
    }

    pub fn url(&self, image: ImageRef) -> Option<&str> {
        self.urls.get(image.0 as usize).map(String::as_str)
    }

    /// Identity token used for stats attribution
    pub fn identity(&self, image: ImageRef) -> Option<&str> {
        self.url(image).map(identity_token)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn clear(&mut self) {
        self.urls.clear();
        self.index.clear();
    }
}

/// Strip path components (and any query string) from an image reference,
/// leaving a bare filename-like token
pub fn identity_token(url: &str) -> &str {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let trimmed = without_query.trim_end_matches('/');
    trimmed.rsplit(['/', '\\']).next().unwrap_or(trimmed)
}

/// Game mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeKind {
    Normal,
    Boss,
}

impl ModeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModeKind::Normal => "normal",
            ModeKind::Boss => "boss",
        }
    }
}

impl FromStr for ModeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(ModeKind::Normal),
            "boss" => Ok(ModeKind::Boss),
            other => Err(format!("unknown mode '{}'", other)),
        }
    }
}

/// Arena bounds (origin at the top-left corner)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Arena {
    pub width: f32,
    pub height: f32,
}

impl Arena {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width: width.max(1.0),
            height: height.max(1.0),
        }
    }

    /// Largest radius that still fits inside the arena
    pub fn max_radius(&self) -> f32 {
        self.width.min(self.height) * 0.5
    }

    /// Clamp a circle's center so the whole circle stays inside the arena
    pub fn clamp_center(&self, position: Vec2, radius: f32) -> Vec2 {
        position.clamp(
            Vec2::new(radius, radius),
            Vec2::new(self.width - radius, self.height - radius),
        )
    }

    pub fn contains_point(&self, position: Vec2) -> bool {
        position.x >= 0.0 && position.x <= self.width && position.y >= 0.0 && position.y <= self.height
    }

    /// Length of the wall a spike on `side` sits on
    pub fn side_length(&self, side: Side) -> f32 {
        match side {
            Side::Top | Side::Bottom => self.width,
            Side::Left | Side::Right => self.height,
        }
    }
}

impl Default for Arena {
    fn default() -> Self {
        use crate::game::constants::tick::{DEFAULT_HEIGHT, DEFAULT_WIDTH};
        Self::new(DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }
}

/// Arena wall a spike is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Top,
    Bottom,
    Left,
    Right,
}

impl Side {
    pub const ALL: [Side; 4] = [Side::Top, Side::Bottom, Side::Left, Side::Right];

    /// Unit vector pointing from this wall into the arena
    pub fn inward(&self) -> Vec2 {
        match self {
            Side::Top => Vec2::DOWN,
            Side::Bottom => Vec2::UP,
            Side::Left => Vec2::RIGHT,
            Side::Right => Vec2::LEFT,
        }
    }
}

/// Static wall obstacle
///
/// `offset` is measured along the wall from its top/left end; the spike's
/// footprint is a `size` x `size` square against the wall.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spike {
    pub side: Side,
    pub offset: f32,
    pub size: f32,
}

impl Spike {
    /// Axis-aligned footprint (min, max corners) in arena coordinates
    pub fn footprint(&self, arena: &Arena) -> (Vec2, Vec2) {
        let s = self.size;
        match self.side {
            Side::Top => (Vec2::new(self.offset, 0.0), Vec2::new(self.offset + s, s)),
            Side::Bottom => (
                Vec2::new(self.offset, arena.height - s),
                Vec2::new(self.offset + s, arena.height),
            ),
            Side::Left => (Vec2::new(0.0, self.offset), Vec2::new(s, self.offset + s)),
            Side::Right => (
                Vec2::new(arena.width - s, self.offset),
                Vec2::new(arena.width, self.offset + s),
            ),
        }
    }

    /// Triangle (base on the wall, tip pointing inward) for drawing
    pub fn triangle(&self, arena: &Arena) -> [Vec2; 3] {
        let (min, max) = self.footprint(arena);
        let mid_x = (min.x + max.x) * 0.5;
        let mid_y = (min.y + max.y) * 0.5;
        match self.side {
            Side::Top => [Vec2::new(min.x, min.y), Vec2::new(max.x, min.y), Vec2::new(mid_x, max.y)],
            Side::Bottom => [Vec2::new(min.x, max.y), Vec2::new(max.x, max.y), Vec2::new(mid_x, min.y)],
            Side::Left => [Vec2::new(min.x, min.y), Vec2::new(min.x, max.y), Vec2::new(max.x, mid_y)],
            Side::Right => [Vec2::new(max.x, min.y), Vec2::new(max.x, max.y), Vec2::new(min.x, mid_y)],
        }
    }
}

/// Boss-mode singleton opponent; never stored in the bubble columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuperEntity {
    pub position: Vec2,
    pub velocity: Vec2,
    pub radius: f32,
    pub health: f32,
    pub max_health: f32,
    pub image: Option<ImageRef>,
}

impl SuperEntity {
    pub fn new(position: Vec2, max_health: f32, image: Option<ImageRef>) -> Self {
        Self {
            position,
            velocity: Vec2::ZERO,
            radius: boss::SUPER_RADIUS,
            health: max_health,
            max_health,
            image,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }

    /// Apply one contact: lose a fraction of current health. Contacts within
    /// a tick compound on the unrounded value; call `settle_health` after.
    pub fn absorb_contact(&mut self) {
        self.health = (self.health * (1.0 - boss::CONTACT_HEALTH_FRACTION)).max(0.0);
    }

    /// Round health down to whole points once a tick's contacts are applied
    pub fn settle_health(&mut self) {
        self.health = self.health.floor().max(0.0);
    }
}

/// Projectile damage type; each carries a fixed damage amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DamageType {
    Fireball,
    Frost,
    Lightning,
    Venom,
}

impl DamageType {
    pub const ALL: [DamageType; 4] = [
        DamageType::Fireball,
        DamageType::Frost,
        DamageType::Lightning,
        DamageType::Venom,
    ];

    pub fn damage(&self) -> f32 {
        match self {
            DamageType::Fireball => 25.0,
            DamageType::Frost => 15.0,
            DamageType::Lightning => 35.0,
            DamageType::Venom => 10.0,
        }
    }

    /// RGB used when drawing projectiles of this type
    pub fn color(&self) -> (u8, u8, u8) {
        match self {
            DamageType::Fireball => (255, 120, 30),
            DamageType::Frost => (120, 200, 255),
            DamageType::Lightning => (255, 240, 80),
            DamageType::Venom => (120, 220, 90),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DamageType::Fireball => "fireball",
            DamageType::Frost => "frost",
            DamageType::Lightning => "lightning",
            DamageType::Venom => "venom",
        }
    }
}

impl fmt::Display for DamageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DamageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fireball" | "fire" => Ok(DamageType::Fireball),
            "frost" | "ice" => Ok(DamageType::Frost),
            "lightning" | "bolt" => Ok(DamageType::Lightning),
            "venom" | "poison" => Ok(DamageType::Venom),
            other => Err(format!("unknown damage type '{}'", other)),
        }
    }
}

/// Super-entity projectile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projectile {
    pub id: ProjectileId,
    pub position: Vec2,
    pub velocity: Vec2,
    pub damage_type: DamageType,
}

impl Projectile {
    pub fn new(id: ProjectileId, position: Vec2, direction: Vec2, damage_type: DamageType) -> Self {
        Self {
            id,
            position,
            velocity: direction * projectile::SPEED,
            damage_type,
        }
    }

    pub fn radius(&self) -> f32 {
        projectile::RADIUS
    }
}

/// Source of a hit, recorded for kill attribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attacker {
    Bubble(ImageRef),
    Super,
}

/// Render-ready copy of one bubble row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BubbleView {
    pub id: BubbleId,
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub health: f32,
    pub image: ImageRef,
    pub dying: bool,
}

/// Render-ready copy of the super-entity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuperView {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub health: f32,
    pub max_health: f32,
    pub image: Option<ImageRef>,
}

impl From<&SuperEntity> for SuperView {
    fn from(s: &SuperEntity) -> Self {
        Self {
            x: s.position.x,
            y: s.position.y,
            radius: s.radius,
            health: s.health,
            max_health: s.max_health,
            image: s.image,
        }
    }
}

/// Render-ready copy of a projectile
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectileView {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub damage_type: DamageType,
}

impl From<&Projectile> for ProjectileView {
    fn from(p: &Projectile) -> Self {
        Self {
            x: p.position.x,
            y: p.position.y,
            radius: p.radius(),
            damage_type: p.damage_type,
        }
    }
}
