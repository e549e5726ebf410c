//! Round termination and ranking
//!
//! `check_round_end` runs once per tick after the death queue; a bubble whose
//! health reached zero already counts as gone here even if its row is still
//! waiting out the death delay, so the round ends on the same tick.

use serde::Serialize;

use crate::game::state::{BubbleId, ImageRef, ImageTable, ModeKind, SuperEntity};
use crate::game::store::BubbleStore;

/// How a round ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// Normal mode: one bubble left standing
    Winner { id: BubbleId, image: ImageRef },
    /// Normal mode: the arena emptied with no survivor
    Draw,
    /// Boss mode: the super-entity died; every surviving normal wins
    SuperDefeated { survivors: Vec<(BubbleId, ImageRef)> },
    /// Boss mode: no normal bubbles remain
    SuperWins,
}

impl Outcome {
    /// Identity tokens of the winners, for the stats sink
    pub fn winner_identities(&self, images: &ImageTable, super_image: Option<ImageRef>) -> Vec<String> {
        match self {
            Outcome::Winner { image, .. } => images
                .identity(*image)
                .map(|s| vec![s.to_string()])
                .unwrap_or_default(),
            Outcome::Draw => Vec::new(),
            Outcome::SuperDefeated { survivors } => survivors
                .iter()
                .filter_map(|(_, image)| images.identity(*image).map(str::to_string))
                .collect(),
            Outcome::SuperWins => vec![super_identity(images, super_image)],
        }
    }
}

/// Identity used for the super-entity in stats (its image token, or "super")
pub fn super_identity(images: &ImageTable, super_image: Option<ImageRef>) -> String {
    super_image
        .and_then(|image| images.identity(image))
        .unwrap_or("super")
        .to_string()
}

/// Check whether the round is over
pub fn check_round_end(mode: ModeKind, store: &BubbleStore, boss: Option<&SuperEntity>) -> Option<Outcome> {
    match mode {
        ModeKind::Normal => {
            if store.alive_count() > 1 {
                return None;
            }
            let survivor = store.alive_ids().next();
            Some(match survivor.and_then(|id| store.get(id)) {
                Some(b) => Outcome::Winner { id: b.id, image: b.image },
                None => Outcome::Draw,
            })
        }
        ModeKind::Boss => {
            let super_alive = boss.map(SuperEntity::is_alive).unwrap_or(false);
            if !super_alive {
                let survivors = store
                    .alive_ids()
                    .filter_map(|id| store.get(id))
                    .map(|b| (b.id, b.image))
                    .collect();
                return Some(Outcome::SuperDefeated { survivors });
            }
            if store.alive_count() == 0 {
                return Some(Outcome::SuperWins);
            }
            None
        }
    }
}

/// One leaderboard line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub id: BubbleId,
    pub identity: String,
    pub health: f32,
}

/// Top `n` live bubbles by health (ties broken by id)
pub fn leaderboard(store: &BubbleStore, images: &ImageTable, n: usize) -> Vec<LeaderboardEntry> {
    let mut rows: Vec<(BubbleId, f32, ImageRef)> = (0..store.len())
        .filter(|&row| !store.is_dying(row))
        .map(|row| {
            let b = store.row(row);
            (b.id, b.health, b.image)
        })
        .collect();

    rows.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    rows.into_iter()
        .take(n)
        .enumerate()
        .map(|(i, (id, health, image))| LeaderboardEntry {
            rank: (i + 1) as u32,
            id,
            identity: images.identity(image).unwrap_or_default().to_string(),
            health,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::store::Bubble;
    use crate::util::vec2::Vec2;

    fn populated(healths: &[f32]) -> (BubbleStore, ImageTable) {
        let mut store = BubbleStore::new();
        let mut images = ImageTable::new();
        for (i, &health) in healths.iter().enumerate() {
            let id = store.alloc_id();
            let image = images.intern(&format!("/images/p{}.png", i));
            store
                .append(Bubble {
                    id,
                    x: 0.0,
                    y: 0.0,
                    vx: 0.0,
                    vy: 0.0,
                    radius: 10.0,
                    target_radius: 10.0,
                    health,
                    image,
                })
                .unwrap();
        }
        (store, images)
    }

    #[test]
    fn test_normal_ongoing() {
        let (store, _) = populated(&[100.0, 50.0]);
        assert!(check_round_end(ModeKind::Normal, &store, None).is_none());
    }

    #[test]
    fn test_normal_last_survivor() {
        let (mut store, images) = populated(&[100.0, 50.0]);
        store.apply_damage(1, 50.0);
        store.mark_dying(1);
        let outcome = check_round_end(ModeKind::Normal, &store, None).unwrap();
        assert_eq!(outcome, Outcome::Winner { id: 1, image: ImageRef(0) });
        assert_eq!(outcome.winner_identities(&images, None), vec!["p0.png".to_string()]);
    }

    #[test]
    fn test_normal_empty_is_draw() {
        let (store, _) = populated(&[]);
        assert_eq!(check_round_end(ModeKind::Normal, &store, None), Some(Outcome::Draw));
    }

    #[test]
    fn test_boss_super_defeated_lists_survivors() {
        let (mut store, _) = populated(&[100.0, 100.0, 100.0]);
        store.mark_dying(0);
        let mut boss = SuperEntity::new(Vec2::ZERO, 1000.0, None);
        boss.health = 0.0;
        match check_round_end(ModeKind::Boss, &store, Some(&boss)) {
            Some(Outcome::SuperDefeated { survivors }) => {
                let ids: Vec<BubbleId> = survivors.iter().map(|s| s.0).collect();
                assert_eq!(ids, vec![2, 3]);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_boss_super_wins() {
        let (mut store, images) = populated(&[100.0]);
        store.mark_dying(0);
        let boss = SuperEntity::new(Vec2::ZERO, 1000.0, None);
        let outcome = check_round_end(ModeKind::Boss, &store, Some(&boss)).unwrap();
        assert_eq!(outcome, Outcome::SuperWins);
        assert_eq!(outcome.winner_identities(&images, None), vec!["super".to_string()]);
    }

    #[test]
    fn test_boss_ongoing() {
        let (store, _) = populated(&[100.0]);
        let boss = SuperEntity::new(Vec2::ZERO, 1000.0, None);
        assert!(check_round_end(ModeKind::Boss, &store, Some(&boss)).is_none());
    }

    #[test]
    fn test_leaderboard_order_and_limit() {
        let (mut store, images) = populated(&[40.0, 90.0, 90.0, 10.0]);
        store.mark_dying(3);
        let board = leaderboard(&store, &images, 2);
        assert_eq!(board.len(), 2);
        assert_eq!(board[0].id, 2);
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[0].identity, "p1.png");
        assert_eq!(board[1].id, 3);

        let all = leaderboard(&store, &images, 12);
        assert_eq!(all.len(), 3);
    }
}
