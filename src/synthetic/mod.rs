//! Synthetic spaced-repetition interaction source.
//!
//! A [`RecallActor`] models a learner with a per-item retention span that
//! stretches when an item is reviewed before it is forgotten and shrinks
//! when the review comes too late. [`sample_interactions`] drives the actor
//! through review rounds with an injected random source, and
//! [`training_pairs`] encodes the resulting interaction stream into the
//! fixed-shape (input, target) vectors the feedforward engine trains on.

use std::collections::HashMap;

use rand::Rng;

use crate::feedforward::Vector;

/// Day the actor's history starts at.
const START_OF_TIME: f64 = 100.0;

/// One hour, in days: the shortest retention span an item can have.
const SHORTEST_RETENTION: f64 = 1.0 / 24.0;

/// Ten years, in days: the longest retention span an item can have.
const LONGEST_RETENTION: f64 = 365.24 * 10.0;

/// One review event of one item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interaction {
    pub item: usize,
    /// Absolute day of the review.
    pub day: f64,
    pub correct: bool,
}

/// A simulated learner with per-item memory state.
#[derive(Debug, Default)]
pub struct RecallActor {
    /// Per item: (day last reviewed, days until it is forgotten).
    memory: HashMap<usize, (f64, f64)>,
}

impl RecallActor {
    pub fn new() -> RecallActor {
        RecallActor {
            memory: HashMap::new(),
        }
    }

    /// Introduces an item with the shortest retention span. Items already
    /// known keep their state.
    pub fn plant_item(&mut self, item: usize) {
        self.memory
            .entry(item)
            .or_insert((START_OF_TIME, SHORTEST_RETENTION));
    }

    /// Reviews an item `days_past_due` days relative to the moment it
    /// would be forgotten: negative means the review came early enough to
    /// succeed, growing retention by 20% (up to ten years); zero or
    /// positive means the item was already forgotten, shrinking retention
    /// by 20% (down to one hour). Unknown items are planted first.
    ///
    /// Returns the absolute day the review happened on. Time never moves
    /// backwards: the review day is floored at the previous review.
    pub fn water_item(&mut self, item: usize, days_past_due: f64) -> f64 {
        self.plant_item(item);
        let (last_seen, retention) = self.memory[&item];
        let forgotten_at = last_seen + retention;
        let now = last_seen.max(forgotten_at + days_past_due);

        let adjusted = if days_past_due < 0.0 {
            (retention * 1.2).min(LONGEST_RETENTION)
        } else {
            (retention * 0.8).max(SHORTEST_RETENTION)
        };
        self.memory.insert(item, (now, adjusted));
        now
    }

    /// Current retention span of an item, if it was ever planted.
    pub fn retention(&self, item: usize) -> Option<f64> {
        self.memory.get(&item).map(|&(_, retention)| retention)
    }
}

/// Generates a finite interaction stream: for each of `items` items, one
/// planted actor reviewed `rounds` times in a row. Each review lands a
/// uniformly random offset in `[-hit_rate, 1 - hit_rate)` days around the
/// forgetting moment, so `hit_rate` is the long-run fraction of correct
/// reviews. Interactions of one item are consecutive in the output,
/// ordered by day.
pub fn sample_interactions<R>(
    rng: &mut R,
    items: usize,
    rounds: usize,
    hit_rate: f64,
) -> Vec<Interaction>
where
    R: Rng + ?Sized,
{
    let mut actor = RecallActor::new();
    let mut interactions = Vec::with_capacity(items * rounds);
    for item in 0..items {
        actor.plant_item(item);
        for _ in 0..rounds {
            let days_past_due = rng.gen::<f64>() - hit_rate;
            let day = actor.water_item(item, days_past_due);
            interactions.push(Interaction {
                item,
                day,
                correct: days_past_due < 0.0,
            });
        }
    }
    interactions
}

/// Encodes an interaction stream into training pairs.
///
/// Every run of `window + 1` consecutive interactions of the same item
/// becomes one pair: the input holds, for each of the first `window`
/// reviews, its day distance from the last review of the run (normalized
/// by the run's largest distance) and its correctness as `1.0`/`0.0`; the
/// target is a single-element vector carrying `labels.1` when the final
/// review succeeded and `labels.0` when it failed. The numeric label
/// encoding is the caller's to choose; `(0.0, 1.0)` and `(0.33, 0.66)`
/// are both common.
///
/// Windows spanning more than one item are skipped, so the input width is
/// always `2 * window`.
pub fn training_pairs(
    interactions: &[Interaction],
    window: usize,
    labels: (f64, f64),
) -> Vec<(Vector, Vector)> {
    let (fail_label, pass_label) = labels;
    let mut pairs = Vec::new();
    if window == 0 || interactions.len() <= window {
        return pairs;
    }

    for run in interactions.windows(window + 1) {
        let item = run[0].item;
        if run.iter().any(|interaction| interaction.item != item) {
            continue;
        }

        let baseline = run[window].day;
        let span = run[..window]
            .iter()
            .map(|interaction| baseline - interaction.day)
            .fold(0.0f64, f64::max);

        let mut features = Vec::with_capacity(window * 2);
        for interaction in &run[..window] {
            let distance = baseline - interaction.day;
            features.push(if span > 0.0 { distance / span } else { 0.0 });
            features.push(if interaction.correct { 1.0 } else { 0.0 });
        }

        let outcome = if run[window].correct {
            pass_label
        } else {
            fail_label
        };
        pairs.push((Vector::from(features), Vector::from(vec![outcome])));
    }
    pairs
}
