//! Session assembly: one generated pool, two splits, two index streams.
//!
//! A session owns everything batch assembly needs. Both sequencers derive
//! their seeds from the synthesis seed through a SplitMix64 mix with distinct
//! stream offsets, so one `u64` reproduces the pool, the shuffles, and every
//! batch that follows.

use tracing::{info, instrument};

use crate::{
    batch::Batch,
    dataset::{Dataset, DatasetPool, Split, SplitKind},
    error::{ConfigError, PipelineError},
    sequencer::{IndexSequencer, ReshufflePolicy},
    synth::SynthesisConfig,
};

/// Default number of samples generated into the pool.
pub const DEFAULT_POOL_SIZE: usize = 40_000;

/// Default number of pool samples assigned to the training split.
pub const DEFAULT_TRAIN_COUNT: usize = 32_000;

const TRAIN_STREAM: u64 = 0;
const TEST_STREAM: u64 = 1;
const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

/// Derives a per-stream seed with a SplitMix64 finalisation step so the
/// train and test sequencers never share an RNG stream.
fn derive_stream_seed(seed: u64, stream: u64) -> u64 {
    let mut mixed = seed.wrapping_add(stream.wrapping_add(1).wrapping_mul(GOLDEN_GAMMA));
    mixed = (mixed ^ (mixed >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    mixed = (mixed ^ (mixed >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    mixed ^ (mixed >> 31)
}

/// Configures and validates a [`Session`].
///
/// # Examples
/// ```
/// use boxfit_core::{SessionBuilder, SynthesisConfig};
///
/// let config = SynthesisConfig {
///     raster_edge: 8,
///     min_rect_size: 2,
///     max_rect_size: 4,
///     seed: 1,
/// };
/// let mut session = SessionBuilder::new()
///     .with_synthesis(config)
///     .with_pool_size(10)
///     .with_train_count(8)
///     .build()
///     .expect("the configuration is valid");
/// let batch = session.next_train_batch(4).expect("a train batch assembles");
/// assert_eq!(batch.features().len(), 4 * 64);
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SessionBuilder {
    synthesis: SynthesisConfig,
    pool_size: usize,
    train_count: usize,
    reshuffle: ReshufflePolicy,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self {
            synthesis: SynthesisConfig::default(),
            pool_size: DEFAULT_POOL_SIZE,
            train_count: DEFAULT_TRAIN_COUNT,
            reshuffle: ReshufflePolicy::default(),
        }
    }
}

impl SessionBuilder {
    /// Creates a builder with the default pool geometry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the synthesis configuration for the generated pool.
    #[must_use]
    pub fn with_synthesis(mut self, synthesis: SynthesisConfig) -> Self {
        self.synthesis = synthesis;
        self
    }

    /// Sets the total number of samples to generate.
    #[must_use]
    pub const fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Sets how many pool samples form the training split.
    #[must_use]
    pub const fn with_train_count(mut self, train_count: usize) -> Self {
        self.train_count = train_count;
        self
    }

    /// Sets the reshuffle policy applied to both index streams.
    #[must_use]
    pub const fn with_reshuffle_policy(mut self, policy: ReshufflePolicy) -> Self {
        self.reshuffle = policy;
        self
    }

    /// Returns the configured synthesis settings.
    #[rustfmt::skip]
    #[must_use]
    pub const fn synthesis(&self) -> &SynthesisConfig { &self.synthesis }

    /// Returns the configured pool size.
    #[rustfmt::skip]
    #[must_use]
    pub const fn pool_size(&self) -> usize { self.pool_size }

    /// Returns the configured training split size.
    #[rustfmt::skip]
    #[must_use]
    pub const fn train_count(&self) -> usize { self.train_count }

    /// Returns the configured reshuffle policy.
    #[rustfmt::skip]
    #[must_use]
    pub const fn reshuffle_policy(&self) -> ReshufflePolicy { self.reshuffle }

    /// Generates the pool, partitions it, and seeds both index streams.
    ///
    /// Unlike raw partitioning, a session requires both splits to be
    /// populated: a batch can only be drawn from a non-empty split.
    ///
    /// # Errors
    /// Returns any synthesis or partitioning [`ConfigError`], and
    /// [`ConfigError::EmptySplit`] when either split would be empty.
    #[instrument(
        name = "session.build",
        err,
        skip(self),
        fields(
            pool_size = self.pool_size,
            train_count = self.train_count,
            raster_edge = self.synthesis.raster_edge,
            seed = self.synthesis.seed,
        )
    )]
    pub fn build(self) -> Result<Session, ConfigError> {
        let pool = DatasetPool::generate(&self.synthesis, self.pool_size)?;
        let dataset = Dataset::partition(pool, self.train_count)?;

        let train_len = dataset.train().len();
        let test_len = dataset.test().len();
        if train_len == 0 {
            return Err(ConfigError::EmptySplit {
                split: SplitKind::Train,
            });
        }
        if test_len == 0 {
            return Err(ConfigError::EmptySplit {
                split: SplitKind::Test,
            });
        }

        let seed = self.synthesis.seed;
        let train_sequencer = IndexSequencer::new(
            train_len,
            derive_stream_seed(seed, TRAIN_STREAM),
            self.reshuffle,
        )
        .map_err(|_| ConfigError::EmptySplit {
            split: SplitKind::Train,
        })?;
        let test_sequencer = IndexSequencer::new(
            test_len,
            derive_stream_seed(seed, TEST_STREAM),
            self.reshuffle,
        )
        .map_err(|_| ConfigError::EmptySplit {
            split: SplitKind::Test,
        })?;

        info!(
            pool = dataset.len(),
            train = train_len,
            test = test_len,
            "dataset generated and partitioned"
        );
        Ok(Session {
            dataset,
            train_sequencer,
            test_sequencer,
        })
    }
}

/// A generated dataset with independent train and test batch streams.
#[derive(Clone, Debug)]
pub struct Session {
    dataset: Dataset,
    train_sequencer: IndexSequencer,
    test_sequencer: IndexSequencer,
}

impl Session {
    /// Assembles the next batch from the training split.
    ///
    /// # Errors
    /// Returns a [`PipelineError`] when batch assembly fails.
    pub fn next_train_batch(&mut self, batch_size: usize) -> Result<Batch, PipelineError> {
        let split = self.dataset.train();
        Batch::from_split(&split, &mut self.train_sequencer, batch_size)
    }

    /// Assembles the next batch from the test split.
    ///
    /// # Errors
    /// Returns a [`PipelineError`] when batch assembly fails.
    pub fn next_test_batch(&mut self, batch_size: usize) -> Result<Batch, PipelineError> {
        let split = self.dataset.test();
        Batch::from_split(&split, &mut self.test_sequencer, batch_size)
    }

    /// Returns the view of the requested split.
    #[rustfmt::skip]
    #[must_use]
    pub fn split(&self, kind: SplitKind) -> Split<'_> { self.dataset.split(kind) }

    /// Returns the number of pixels per sample.
    #[rustfmt::skip]
    #[must_use]
    pub const fn pixel_count(&self) -> usize { self.dataset.pixel_count() }

    /// Returns the total number of samples in the pool.
    #[rustfmt::skip]
    #[must_use]
    pub fn pool_len(&self) -> usize { self.dataset.len() }

    /// Returns the number of training samples.
    #[rustfmt::skip]
    #[must_use]
    pub fn train_len(&self) -> usize { self.dataset.train().len() }

    /// Returns the number of test samples.
    #[rustfmt::skip]
    #[must_use]
    pub fn test_len(&self) -> usize { self.dataset.test().len() }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    fn small_builder(seed: u64) -> SessionBuilder {
        SessionBuilder::new()
            .with_synthesis(SynthesisConfig {
                raster_edge: 8,
                min_rect_size: 2,
                max_rect_size: 4,
                seed,
            })
            .with_pool_size(12)
            .with_train_count(8)
    }

    #[fixture]
    fn session() -> Session {
        small_builder(29).build().expect("the configuration is valid")
    }

    #[rstest]
    fn defaults_match_the_documented_geometry() {
        let builder = SessionBuilder::default();
        assert_eq!(builder.pool_size(), DEFAULT_POOL_SIZE);
        assert_eq!(builder.train_count(), DEFAULT_TRAIN_COUNT);
        assert_eq!(builder.reshuffle_policy(), ReshufflePolicy::Never);
        assert_eq!(builder.synthesis().raster_edge, 32);
    }

    #[rstest]
    #[case::empty_train(0, SplitKind::Train)]
    #[case::empty_test(12, SplitKind::Test)]
    fn empty_splits_are_rejected(#[case] train_count: usize, #[case] expected: SplitKind) {
        let error = small_builder(29)
            .with_train_count(train_count)
            .build()
            .expect_err("an empty split must fail");
        assert!(matches!(error, ConfigError::EmptySplit { split } if split == expected));
    }

    #[rstest]
    fn sessions_replay_identically_for_one_seed() {
        let mut first = small_builder(41).build().expect("the configuration is valid");
        let mut second = small_builder(41).build().expect("the configuration is valid");

        let train_a = first.next_train_batch(6).expect("a train batch assembles");
        let train_b = second.next_train_batch(6).expect("a train batch assembles");
        assert_eq!(train_a, train_b);

        let test_a = first.next_test_batch(3).expect("a test batch assembles");
        let test_b = second.next_test_batch(3).expect("a test batch assembles");
        assert_eq!(test_a, test_b);
    }

    #[rstest]
    fn distinct_seeds_generate_distinct_pools() {
        let mut first = small_builder(1).build().expect("the configuration is valid");
        let mut second = small_builder(2).build().expect("the configuration is valid");
        let batch_a = first.next_train_batch(8).expect("a train batch assembles");
        let batch_b = second.next_train_batch(8).expect("a train batch assembles");
        assert_ne!(batch_a, batch_b);
    }

    #[rstest]
    fn train_draws_do_not_disturb_the_test_stream(mut session: Session) {
        let mut undisturbed = small_builder(29)
            .build()
            .expect("the configuration is valid");
        let expected = undisturbed
            .next_test_batch(4)
            .expect("a test batch assembles");

        for _ in 0..3 {
            session
                .next_train_batch(5)
                .expect("a train batch assembles");
        }
        let observed = session.next_test_batch(4).expect("a test batch assembles");
        assert_eq!(observed, expected);
    }

    #[rstest]
    fn batches_larger_than_a_split_wrap(mut session: Session) {
        let batch = session
            .next_test_batch(9)
            .expect("wrapping draws are valid");
        assert_eq!(batch.batch_size(), 9);
        assert_eq!(session.test_len(), 4);
        assert_eq!(session.train_len(), 8);
        assert_eq!(session.pool_len(), 12);
        assert_eq!(session.pixel_count(), 64);
    }

    #[rstest]
    fn stream_seeds_never_collide() {
        assert_ne!(
            derive_stream_seed(7, TRAIN_STREAM),
            derive_stream_seed(7, TEST_STREAM)
        );
        assert_ne!(derive_stream_seed(0, TRAIN_STREAM), 0);
    }
}
