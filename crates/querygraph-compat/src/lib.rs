//! Round-trip regression suite for the transpiler
//!
//! Runs every `.sql` file of a corpus directory through parse, generate and
//! compare, and tracks:
//! - Parse success rate
//! - Exact and structural round-trip equivalence
//! - Idempotence of the query model across a round trip
//! - Top failure codes and samples
//!
//! Files under an `unsupported/` directory are expected to fail parsing.

pub mod harness;
pub mod metrics;
pub mod report;

pub use harness::CorpusHarness;
pub use metrics::{CorpusMetrics, FailureDetail, QueryOutcome, QueryResult};
pub use report::CompatReport;
