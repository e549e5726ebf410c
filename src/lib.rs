//! Bubble Arena
//!
//! A bubble battle-arena simulator: image-textured bubbles roam a rectangular
//! arena, collide, damage each other and get eliminated until one remains
//! (Normal mode) or until a single super-entity or every normal bubble falls
//! (Boss mode).
//!
//! # Features
//!
//! - `parallel_movement` - rayon-parallel movement phase for large populations (enabled by default)
//! - `http` - image roster API, remote image fetch and stats posting over HTTP

pub mod config;
pub mod util;
pub mod game;
pub mod assets;
pub mod render;
pub mod roster;
pub mod stats;
pub mod metrics;
pub mod app;
