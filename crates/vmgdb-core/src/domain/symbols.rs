//! In-memory symbol bundle received from the debugger relay.
//!
//! The bundle is filled lazily: the relay answers `downloadElf` with an `elf`
//! message and `downloadSources` with a `sources` message, in any order.  The
//! bundle is usable as soon as the ELF is present; sources are optional.

use crate::protocol::messages::SourceFile;

/// The symbol file (base64, as received) and its source files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolBundle {
    elf_base64: Option<String>,
    sources: Option<Vec<SourceFile>>,
}

impl SymbolBundle {
    /// Creates an empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores (or replaces) the base64-encoded symbol file.
    pub fn set_elf(&mut self, elf_base64: String) {
        self.elf_base64 = Some(elf_base64);
    }

    /// Stores (or replaces) the source files.
    pub fn set_sources(&mut self, sources: Vec<SourceFile>) {
        self.sources = Some(sources);
    }

    /// The base64-encoded symbol file, if received.
    pub fn elf_base64(&self) -> Option<&str> {
        self.elf_base64.as_deref()
    }

    /// The source files, if received.
    pub fn sources(&self) -> Option<&[SourceFile]> {
        self.sources.as_deref()
    }

    /// `true` once the symbol file is present.
    pub fn has_elf(&self) -> bool {
        self.elf_base64.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_bundle_is_empty() {
        let bundle = SymbolBundle::new();
        assert!(!bundle.has_elf());
        assert!(bundle.sources().is_none());
    }

    #[test]
    fn test_sources_without_elf_is_not_usable() {
        let mut bundle = SymbolBundle::new();
        bundle.set_sources(vec![("a.c".to_string(), "x".to_string())]);
        assert!(!bundle.has_elf());
        assert_eq!(bundle.sources().map(<[_]>::len), Some(1));
    }

    #[test]
    fn test_set_elf_replaces_previous() {
        let mut bundle = SymbolBundle::new();
        bundle.set_elf("AA==".to_string());
        bundle.set_elf("AQ==".to_string());
        assert_eq!(bundle.elf_base64(), Some("AQ=="));
    }
}
