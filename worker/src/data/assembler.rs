use std::num::NonZeroUsize;

use log::{debug, warn};

use super::Dataset;
use crate::{Result, store::LocalStore};

/// Builds this round's dataset from every observation in the local store.
///
/// # Arguments
/// * `store` - The user's local store.
/// * `batch_size` - The amount of samples per batch.
///
/// # Returns
/// The dataset or an error if the store can't be read or the observations can't make one.
pub async fn assemble(store: &LocalStore, batch_size: NonZeroUsize) -> Result<Dataset> {
    let batches = store.observations().await?;

    let mut samples = Vec::new();
    for (id, batch) in batches.into_iter().enumerate() {
        if batch.features.len() != batch.labels.len() {
            warn!(
                batch = id,
                features = batch.features.len(),
                labels = batch.labels.len();
                "observation batch has unpaired samples, ignoring the excess"
            );
        }

        samples.extend(batch.features.into_iter().zip(batch.labels));
    }

    let dataset = Dataset::new(samples, batch_size)?;
    if dataset.duplicates() > 0 {
        warn!(duplicates = dataset.duplicates(); "discarded duplicate observations");
    }

    debug!(
        train = dataset.train_count(),
        test = dataset.test_count(),
        features = dataset.features();
        "assembled dataset"
    );

    Ok(dataset)
}
