//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against mock adapters. All tests run on the host with no flash or
//! network required.

mod controller_tests;
mod ledger_tests;
mod mock_store;
