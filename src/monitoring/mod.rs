/*!
 * Monitoring
 * Tracing subscriber setup and evaluation timing
 */

mod tracer;

pub use tracer::{init_tracing, EvaluationSpan, SLOW_EVALUATION};
