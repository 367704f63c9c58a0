//! Model validation.
//!
//! Runs once after a document is assembled and before it can execute. All
//! violations are accumulated rather than stopping at the first one, and
//! each is reported with the node that caused it. On success the validator
//! also stores the precomputed path of every transition.

mod error;
mod rules;

pub use error::StructuralError;

use crate::core::ErrorReporter;
use crate::model::StateChart;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

/// Validate `chart`, resolving ids and precomputing paths in place.
///
/// Returns `Validation::Success(())` if the document is sound, or
/// `Validation::Failure` with ALL structural errors otherwise. Every error is
/// also sent to `reporter`.
pub fn validate(
    chart: &mut StateChart,
    reporter: &dyn ErrorReporter,
) -> Validation<(), NonEmptyVec<StructuralError>> {
    let mut checks = rules::resolve_root_initial(chart);
    checks.extend(rules::resolve_targets(chart));
    checks.extend(rules::check_histories(chart));
    checks.extend(rules::check_initials(chart));
    checks.extend(rules::check_transitions(chart));
    checks.extend(rules::check_invokes(chart));

    let result = Validation::all_vec(checks).map(|_| ());
    match &result {
        Validation::Success(()) => rules::precompute_paths(chart),
        Validation::Failure(errors) => {
            for error in errors.iter() {
                reporter.on_error(error.code(), &error.to_string(), &error.node());
            }
        }
    }
    result
}
