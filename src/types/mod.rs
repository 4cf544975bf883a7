//! Shared data structures for the interpretation pipeline
//!
//! - `ModelType`: which statistical model a call interprets (FA, GM, IRT, CDM)
//! - `VariableMetadata`: user-supplied variable → description table
//! - `LabeledMatrix`: numeric matrix with row and column labels (loadings,
//!   cluster means, factor correlations)

mod model_type;
mod variables;
mod matrix;

pub use model_type::*;
pub use variables::*;
pub use matrix::*;
