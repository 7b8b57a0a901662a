//! Test suites for the reasoning gateway
//!
//! Unit tests for single components live next to the code; these suites
//! exercise components together.
