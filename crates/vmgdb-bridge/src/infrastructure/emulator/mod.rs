//! Emulator adapters.
//!
//! The real emulator is supplied by the embedder through the
//! [`Emulator`](crate::application::emulator::Emulator) trait.  This module
//! ships the scriptable `mock` used by the test suites.

pub mod mock;

pub use mock::MockEmulator;
