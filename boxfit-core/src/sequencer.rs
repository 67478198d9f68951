//! Shuffled cyclic traversal of split indices.
//!
//! A sequencer owns a shuffled permutation of `0..len` and hands indices out
//! one at a time, in order, wrapping around at the end. Each draw reads the
//! index under the cursor and then advances, so the first `len` draws visit
//! every index exactly once. The reshuffle policy decides whether the
//! permutation is rebuilt when the cursor wraps.

use rand::{SeedableRng, rngs::SmallRng, seq::SliceRandom};

use crate::error::PipelineError;

/// Controls what happens when a sequencer's cursor wraps past the end.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum ReshufflePolicy {
    /// Keep the initial permutation for every pass.
    #[default]
    Never,
    /// Rebuild the permutation at the start of each pass after the first.
    EveryCycle,
}

/// Deterministic shuffled index stream over `0..len`.
///
/// # Examples
/// ```
/// use boxfit_core::{IndexSequencer, ReshufflePolicy};
///
/// let mut sequencer = IndexSequencer::new(4, 11, ReshufflePolicy::Never)
///     .expect("a non-empty sequence is valid");
/// let mut first_pass: Vec<usize> = (0..4).map(|_| sequencer.next_index()).collect();
/// first_pass.sort_unstable();
/// assert_eq!(first_pass, vec![0, 1, 2, 3]);
/// ```
#[derive(Clone, Debug)]
pub struct IndexSequencer {
    order: Vec<usize>,
    cursor: usize,
    rng: SmallRng,
    policy: ReshufflePolicy,
}

impl IndexSequencer {
    /// Builds a sequencer over `0..len` with a freshly shuffled order.
    ///
    /// # Errors
    /// Returns [`PipelineError::EmptySequence`] when `len` is zero.
    pub fn new(len: usize, seed: u64, policy: ReshufflePolicy) -> Result<Self, PipelineError> {
        if len == 0 {
            return Err(PipelineError::EmptySequence);
        }
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut order: Vec<usize> = (0..len).collect();
        order.shuffle(&mut rng);
        Ok(Self {
            order,
            cursor: 0,
            rng,
            policy,
        })
    }

    /// Returns the index under the cursor and advances by one position.
    ///
    /// Wrapping happens before the read, so a pass always starts at the
    /// beginning of the current permutation and no draw is ever skipped or
    /// repeated within a pass.
    pub fn next_index(&mut self) -> usize {
        if self.cursor >= self.order.len() {
            self.cursor = 0;
            if self.policy == ReshufflePolicy::EveryCycle {
                self.order.shuffle(&mut self.rng);
            }
        }
        // The order is non-empty by construction and the cursor was just
        // wrapped into range, so the read cannot miss.
        let index = self.order.get(self.cursor).copied().unwrap_or_default();
        self.cursor = self.cursor.saturating_add(1);
        index
    }

    /// Returns the length of the underlying sequence.
    #[rustfmt::skip]
    #[must_use]
    pub fn len(&self) -> usize { self.order.len() }

    /// Reports whether the sequence is empty; always false once constructed.
    #[rustfmt::skip]
    #[must_use]
    pub fn is_empty(&self) -> bool { self.order.is_empty() }

    /// Returns the configured reshuffle policy.
    #[rustfmt::skip]
    #[must_use]
    pub const fn policy(&self) -> ReshufflePolicy { self.policy }
}
