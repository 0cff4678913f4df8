mod assembler;
mod dataset;

pub use assembler::assemble;
pub use dataset::{Batches, Dataset, Split};
