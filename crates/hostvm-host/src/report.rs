use hostvm_types::EngineError;
use tracing::{error, warn};

/// Logs a failed engine call and collapses it to `None`.
///
/// Errors that leave the engine unusable log at `error`; everything else at `warn`.
pub(crate) fn check<T, E: EngineError>(
    engine: &'static str,
    op: &'static str,
    result: Result<T, E>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            let kind = err.kind();
            if kind.is_fatal_to_engine() {
                error!(engine, op, %kind, "{err}");
            } else {
                warn!(engine, op, %kind, "{err}");
            }
            None
        }
    }
}
