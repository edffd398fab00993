//! Domain module: boot detection and the symbol bundle.

pub mod boot;
pub mod symbols;

pub use boot::{BootSequencer, BootState, BootStep, BOOT_MARKER};
pub use symbols::SymbolBundle;
