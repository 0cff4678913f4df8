use std::{collections::HashSet, num::NonZeroUsize};

use machine_learning::Feeds;
use ndarray::{Array2, ArrayView2, s};

use crate::error::DatasetErr;

/// The fraction of samples that go to the train split.
const TRAIN_RATIO: f64 = 0.8;

/// One of the dataset's splits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    pub fn name(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "test",
        }
    }
}

/// The deduplicated, split and batched samples of one round.
#[derive(Debug, Clone)]
pub struct Dataset {
    train_x: Array2<f32>,
    train_y: Array2<f32>,
    test_x: Array2<f32>,
    test_y: Array2<f32>,
    batch_size: usize,
    duplicates: usize,
}

impl Dataset {
    /// Creates a new `Dataset`.
    ///
    /// Samples sharing the exact same features as a previous one are discarded, the first
    /// occurrence and its label are kept. The first `floor(0.8 * n)` unique samples make the
    /// train split, the rest the test split, both in their original order.
    ///
    /// # Arguments
    /// * `samples` - The `(features, label)` pairs in store order.
    /// * `batch_size` - The amount of samples per batch.
    ///
    /// # Returns
    /// The dataset or a `DatasetErr` if there are less than 2 unique samples or the features
    /// don't all have the same width.
    pub fn new<I>(samples: I, batch_size: NonZeroUsize) -> Result<Self, DatasetErr>
    where
        I: IntoIterator<Item = (Vec<f32>, f32)>,
    {
        let mut width = None;
        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        let mut total = 0;

        for (features, label) in samples {
            total += 1;

            let expected = *width.get_or_insert(features.len());
            if features.len() != expected {
                return Err(DatasetErr::MixedWidths {
                    expected,
                    got: features.len(),
                });
            }

            if seen.insert(feature_key(&features)) {
                unique.push((features, label));
            }
        }

        if total == 0 {
            return Err(DatasetErr::Empty);
        }

        let n = unique.len();
        if n < 2 {
            return Err(DatasetErr::TooFewSamples { got: n });
        }

        let width = width.unwrap_or_default();
        let train_count = (n as f64 * TRAIN_RATIO).floor() as usize;
        let (train, test) = unique.split_at(train_count);

        Ok(Self {
            train_x: Array2::from_shape_fn((train.len(), width), |(i, j)| train[i].0[j]),
            train_y: Array2::from_shape_fn((train.len(), 1), |(i, _)| train[i].1),
            test_x: Array2::from_shape_fn((test.len(), width), |(i, j)| test[i].0[j]),
            test_y: Array2::from_shape_fn((test.len(), 1), |(i, _)| test[i].1),
            batch_size: batch_size.get(),
            duplicates: total - n,
        })
    }

    /// The amount of unique samples.
    pub fn len(&self) -> usize {
        self.train_count() + self.test_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn train_count(&self) -> usize {
        self.train_x.nrows()
    }

    pub fn test_count(&self) -> usize {
        self.test_x.nrows()
    }

    /// The amount of discarded duplicate samples.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// The width of every feature vector.
    pub fn features(&self) -> usize {
        self.train_x.ncols()
    }

    /// A fresh pass over the train split.
    pub fn train_batches(&self) -> Batches<'_> {
        self.batches(Split::Train)
    }

    /// A fresh pass over the test split.
    pub fn test_batches(&self) -> Batches<'_> {
        self.batches(Split::Test)
    }

    /// A fresh pass over `split`.
    pub fn batches(&self, split: Split) -> Batches<'_> {
        let (x, y) = match split {
            Split::Train => (&self.train_x, &self.train_y),
            Split::Test => (&self.test_x, &self.test_y),
        };

        Batches {
            input: x.view(),
            target: y.view(),
            batch_size: self.batch_size,
            offset: 0,
        }
    }
}

/// A single pass over a split, yielding consecutive batches.
///
/// Every batch holds `batch_size` samples except possibly the last one. Once exhausted it
/// stays exhausted, there is no way of rewinding it.
#[derive(Debug)]
pub struct Batches<'a> {
    input: ArrayView2<'a, f32>,
    target: ArrayView2<'a, f32>,
    batch_size: usize,
    offset: usize,
}

impl<'a> Iterator for Batches<'a> {
    type Item = Feeds<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let rows = self.input.nrows();
        if self.offset >= rows {
            return None;
        }

        let start = self.offset;
        let end = (start + self.batch_size).min(rows);
        self.offset = end;

        Some(Feeds {
            input: self.input.clone().slice_move(s![start..end, ..]),
            target: self.target.clone().slice_move(s![start..end, ..]),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.input.nrows().saturating_sub(self.offset);
        let batches = left.div_ceil(self.batch_size);
        (batches, Some(batches))
    }
}

impl ExactSizeIterator for Batches<'_> {}

/// The bit pattern of `features`, with both zeros being the same key.
fn feature_key(features: &[f32]) -> Vec<u32> {
    features
        .iter()
        .map(|&x| if x == 0.0 { 0 } else { x.to_bits() })
        .collect()
}
