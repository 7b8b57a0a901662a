 // failure-classifier-rs/src/lib.rs
 // Fast, deterministic triage of failing CI runs.
 //
 // Design notes:
 // - Classification is a pure function of the event: no I/O, no clock, no
 //   randomness. The same event always yields the same classification.
 // - Rules are evaluated in table order and the first match wins.
 // - Only a bounded window of the log text is scanned, so multi-megabyte
 //   logs cost the same as a 64 KiB one.

mod classifier;
mod rules;
mod scan;


pub use classifier::{FailureClassifier, PatternFailureClassifier, DEFAULT_SCAN_LIMIT};
pub use rules::{rule_names, Rule};
pub use scan::scan_window;
