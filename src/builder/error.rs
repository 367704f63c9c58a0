//! Build errors for chart builders.

use crate::validation::StructuralError;
use stillwater::NonEmptyVec;
use thiserror::Error;

/// Errors that can occur when building a chart.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Duplicate target id \"{id}\". Ids must be unique across the document")]
    DuplicateId { id: String },

    #[error("Empty target id. Use an anonymous builder for unnamed targets")]
    EmptyId,

    #[error("Document is invalid: {} structural error(s), first: {}", .0.len(), .0.head())]
    Invalid(NonEmptyVec<StructuralError>),
}

impl BuildError {
    /// Structural errors, when the document failed validation.
    pub fn structural_errors(&self) -> Vec<StructuralError> {
        match self {
            Self::Invalid(errors) => errors.iter().cloned().collect(),
            _ => Vec::new(),
        }
    }
}
