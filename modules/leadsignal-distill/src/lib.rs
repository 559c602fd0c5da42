//! Pure CPU distillation: boilerplate removal, keyword/regex signal
//! detection, and confidence scoring. No I/O; every function here is a
//! deterministic transform over text and definitions.

pub mod detector;
pub mod distiller;
pub mod fluff;
pub mod scorer;

pub use detector::{lint_definitions, CandidateMatch, SignalDetector};
pub use distiller::Distiller;
pub use fluff::{default_fluff_patterns, FluffFilter};
pub use scorer::ConfidenceScorer;
