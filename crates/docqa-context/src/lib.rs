//! docqa-context
//!
//! Context shaping: trims a retrieved chunk set down to a token budget.
//! Four stages run in order: dedup, sentence prune, proportional token
//! budgeting, conditional compression. Each stage is toggleable and
//! failure-tolerant; shaping never errors and never increases the chunk
//! count beyond its input.

pub mod shaper;
pub mod similarity;

pub use shaper::{ContextShaper, ShapeResult, ShaperConfig};
pub use similarity::{jaccard, split_sentences};
