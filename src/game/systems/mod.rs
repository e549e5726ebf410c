pub mod movement;
pub mod collision;
pub mod spikes;
pub mod boss;
pub mod projectile;
