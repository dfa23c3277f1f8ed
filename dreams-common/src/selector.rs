//! Weighted clip selector
//!
//! Picks the next clip with probability proportional to `1 / (count + 1)`,
//! so rarely heard chords come up more often. Candidates are walked in
//! catalog order; that order plus the random source fully determine the
//! outcome.

use crate::catalog::{Catalog, Clip, ClipId};
use crate::play_counts::{PlayCountStore, PlayCounts};
use crate::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Selection weight of a clip with the given play count
pub fn weight(count: u64) -> f64 {
    1.0 / (count as f64 + 1.0)
}

/// Roulette walk over `candidates`
///
/// `draw` is a uniform value in `[0, 1)` scaled internally by the total
/// weight. `counts` of `None` weighs every candidate equally. Returns `None`
/// only when `candidates` is empty.
pub fn pick_weighted<'a>(
    candidates: &[&'a Clip],
    counts: Option<&PlayCounts>,
    draw: f64,
) -> Option<&'a Clip> {
    let weight_of = |clip: &Clip| match counts {
        Some(c) => weight(c.get(&clip.id).copied().unwrap_or(0)),
        None => 1.0,
    };

    let total: f64 = candidates.iter().map(|c| weight_of(c)).sum();
    let target = draw.clamp(0.0, 1.0) * total;

    let mut cumulative = 0.0;
    for clip in candidates {
        cumulative += weight_of(clip);
        if cumulative > target {
            return Some(clip);
        }
    }

    // Floating point round-off can leave the target at the very end
    candidates.last().copied()
}

/// Weighted-random picker shared by sessions
pub struct Selector {
    catalog: Arc<Catalog>,
    counts: Arc<PlayCountStore>,
    rng: Mutex<StdRng>,
}

impl Selector {
    /// Selector with an entropy-seeded random source
    pub fn new(catalog: Arc<Catalog>, counts: Arc<PlayCountStore>) -> Self {
        Self {
            catalog,
            counts,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic selector for tests and reproducible runs
    pub fn with_seed(catalog: Arc<Catalog>, counts: Arc<PlayCountStore>, seed: u64) -> Self {
        Self {
            catalog,
            counts,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn play_counts(&self) -> &Arc<PlayCountStore> {
        &self.counts
    }

    /// Select a clip other than `exclude` without recording a play
    pub async fn select_next(&self, exclude: Option<ClipId>) -> Result<Clip> {
        let excluded: Vec<ClipId> = exclude.into_iter().collect();
        self.select_excluding(&excluded).await
    }

    /// Select a clip not in `excluded` without recording a play
    pub async fn select_excluding(&self, excluded: &[ClipId]) -> Result<Clip> {
        let candidates: Vec<&Clip> = self
            .catalog
            .clips()
            .iter()
            .filter(|clip| !excluded.contains(&clip.id))
            .collect();

        if candidates.is_empty() {
            return Err(Error::EmptyCatalog);
        }

        let counts = self.counts.selection_counts().await;
        let draw = self.draw()?;

        let chosen = pick_weighted(&candidates, counts.as_ref(), draw).ok_or(Error::EmptyCatalog)?;
        debug!(
            "Selected clip {} ({}) from {} candidates",
            chosen.id,
            chosen.name,
            candidates.len()
        );
        Ok(chosen.clone())
    }

    /// Select and immediately record one play of the chosen clip
    ///
    /// A persistence failure is logged; the selection still stands.
    pub async fn select_and_record(&self, exclude: Option<ClipId>) -> Result<Clip> {
        let clip = self.select_next(exclude).await?;
        if let Err(e) = self.counts.increment(clip.id).await {
            warn!("Failed to record play of clip {}: {}", clip.id, e);
        }
        Ok(clip)
    }

    fn draw(&self) -> Result<f64> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| Error::Internal("Selector random source poisoned".to_string()))?;
        Ok(rng.gen::<f64>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn abc() -> Catalog {
        Catalog::new(vec![
            Clip::new(1, "A", "a.ogg"),
            Clip::new(2, "B", "b.ogg"),
            Clip::new(3, "C", "c.ogg"),
        ])
        .unwrap()
    }

    async fn selector(catalog: Catalog, seed: u64) -> Selector {
        let counts = Arc::new(PlayCountStore::in_memory(&catalog).await);
        Selector::with_seed(Arc::new(catalog), counts, seed)
    }

    #[test]
    fn test_weight_monotonic() {
        assert_eq!(weight(0), 1.0);
        assert_eq!(weight(1), 0.5);
        for n in 0..50 {
            assert!(weight(n) > 0.0);
            assert!(weight(n) <= 1.0);
            assert!(weight(n) >= weight(n + 1));
        }
    }

    #[test]
    fn test_pick_weighted_walk() {
        let catalog = abc();
        let candidates: Vec<&Clip> = catalog.clips().iter().collect();

        // Equal weights: each third of the range maps to one clip in order
        assert_eq!(pick_weighted(&candidates, None, 0.0).unwrap().id, ClipId(1));
        assert_eq!(pick_weighted(&candidates, None, 0.5).unwrap().id, ClipId(2));
        assert_eq!(pick_weighted(&candidates, None, 0.99).unwrap().id, ClipId(3));
        // Round-off guard
        assert_eq!(pick_weighted(&candidates, None, 1.0).unwrap().id, ClipId(3));

        assert!(pick_weighted(&[], None, 0.5).is_none());
    }

    #[test]
    fn test_pick_weighted_uses_counts() {
        let catalog = abc();
        let candidates: Vec<&Clip> = catalog.clips().iter().collect();
        let mut counts = PlayCounts::new();
        counts.insert(ClipId(1), 3); // 0.25
        counts.insert(ClipId(2), 0); // 1.0
        counts.insert(ClipId(3), 0); // 1.0

        // Total 2.25; A covers [0, 0.25)
        assert_eq!(pick_weighted(&candidates, Some(&counts), 0.1).unwrap().id, ClipId(1));
        assert_eq!(pick_weighted(&candidates, Some(&counts), 0.2).unwrap().id, ClipId(2));
    }

    #[tokio::test]
    async fn test_never_returns_excluded() {
        let selector = selector(abc(), 7).await;
        selector.play_counts().increment(ClipId(3)).await.unwrap();

        for _ in 0..2_000 {
            let clip = selector.select_next(Some(ClipId(2))).await.unwrap();
            assert_ne!(clip.id, ClipId(2));
        }
    }

    #[tokio::test]
    async fn test_single_clip_catalog_excluding_itself() {
        let catalog = Catalog::new(vec![Clip::new(1, "A", "a.ogg")]).unwrap();
        let selector = selector(catalog, 1).await;

        assert!(matches!(selector.select_next(Some(ClipId(1))).await, Err(Error::EmptyCatalog)));
        assert_eq!(selector.select_next(None).await.unwrap().id, ClipId(1));
    }

    #[tokio::test]
    async fn test_select_excluding_exhausted() {
        let selector = selector(abc(), 3).await;
        let clip = selector.select_excluding(&[ClipId(1), ClipId(3)]).await.unwrap();
        assert_eq!(clip.id, ClipId(2));

        let all = [ClipId(1), ClipId(2), ClipId(3)];
        assert!(matches!(selector.select_excluding(&all).await, Err(Error::EmptyCatalog)));
    }

    #[tokio::test]
    async fn test_uniform_distribution_with_zero_counts() {
        let selector = selector(abc(), 42).await;
        let draws = 10_000;

        let mut hits: HashMap<ClipId, u32> = HashMap::new();
        for _ in 0..draws {
            let clip = selector.select_next(None).await.unwrap();
            *hits.entry(clip.id).or_insert(0) += 1;
        }

        for id in [ClipId(1), ClipId(2), ClipId(3)] {
            let share = hits[&id] as f64 / draws as f64;
            assert!((share - 1.0 / 3.0).abs() < 0.03, "clip {} share {}", id, share);
        }
    }

    #[tokio::test]
    async fn test_rarely_played_clip_favored() {
        let catalog =
            Catalog::new(vec![Clip::new(1, "A", "a.ogg"), Clip::new(2, "B", "b.ogg")]).unwrap();
        let selector = selector(catalog, 1234).await;
        for _ in 0..9 {
            selector.play_counts().increment(ClipId(1)).await.unwrap();
        }

        let draws = 10_000;
        let mut b_hits = 0;
        for _ in 0..draws {
            if selector.select_next(None).await.unwrap().id == ClipId(2) {
                b_hits += 1;
            }
        }

        // 1.0 / (1.0 + 0.1)
        let share = b_hits as f64 / draws as f64;
        assert!((share - 0.909).abs() < 0.02, "B share {}", share);
    }

    #[tokio::test]
    async fn test_every_candidate_reachable() {
        let catalog = Catalog::default_chords();
        let selector = selector(catalog.clone(), 99).await;
        for _ in 0..50 {
            selector.play_counts().increment(ClipId(5)).await.unwrap();
        }

        let mut seen = std::collections::HashSet::new();
        for _ in 0..20_000 {
            seen.insert(selector.select_next(Some(ClipId(1))).await.unwrap().id);
        }

        assert_eq!(seen.len(), catalog.len() - 1);
        assert!(seen.contains(&ClipId(5)));
        assert!(!seen.contains(&ClipId(1)));
    }

    #[tokio::test]
    async fn test_same_seed_same_sequence() {
        let a = selector(abc(), 5).await;
        let b = selector(abc(), 5).await;

        for _ in 0..100 {
            assert_eq!(a.select_next(None).await.unwrap().id, b.select_next(None).await.unwrap().id);
        }
    }

    #[tokio::test]
    async fn test_select_and_record_increments_once() {
        let selector = selector(abc(), 11).await;
        let clip = selector.select_and_record(None).await.unwrap();

        assert_eq!(selector.play_counts().get(clip.id).await, 1);
        assert_eq!(selector.play_counts().total().await, 1);

        // Preview selection never records
        selector.select_next(Some(clip.id)).await.unwrap();
        assert_eq!(selector.play_counts().total().await, 1);
    }
}
