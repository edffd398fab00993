//! Injection of the symbol bundle into the guest filesystem.
//!
//! The guest debugger loads its symbols from `/mnt/sketch.elf` and looks up
//! source files in `/mnt`.  [`FilesystemInjector`] writes whatever part of the
//! [`SymbolBundle`] has arrived into those locations.  When the symbol file
//! is missing it asks the caller to request the bundle from the relay, once,
//! until data arrives.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;
use tracing::{debug, info};

use vmgdb_core::SymbolBundle;

use crate::application::emulator::{EmulatorError, GuestFiles};
use crate::domain::guest::{source_guest_path, ELF_PATH};

/// Error type for symbol injection.
#[derive(Debug, Error)]
pub enum InjectError {
    /// The symbol file is not valid base64.
    #[error("symbol file is not valid base64: {0}")]
    InvalidElf(#[from] base64::DecodeError),

    /// The emulator refused to create a guest file.
    #[error(transparent)]
    Guest(#[from] EmulatorError),
}

/// What an [`FilesystemInjector::inject`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectOutcome {
    /// The symbol file is missing; ask the relay for the bundle.
    RequestBundle,
    /// The symbol file is missing and a request is already outstanding.
    AwaitingBundle,
    /// The symbol file and `sources` source files were written.
    Injected { sources: usize },
}

/// Writes the symbol bundle into the guest and tracks outstanding requests.
#[derive(Debug, Default)]
pub struct FilesystemInjector {
    request_pending: bool,
}

impl FilesystemInjector {
    /// Creates an injector with no outstanding request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that the bundle was requested outside of [`inject`](Self::inject).
    pub fn mark_requested(&mut self) {
        self.request_pending = true;
    }

    /// `true` while a bundle request is outstanding.
    pub fn is_request_pending(&self) -> bool {
        self.request_pending
    }

    /// Writes the available parts of `bundle` into the guest.
    ///
    /// Safe to call repeatedly.  Sources are optional; the symbol file is not.
    ///
    /// # Errors
    ///
    /// Returns [`InjectError`] if the symbol file cannot be decoded or a
    /// guest file cannot be created.  Files written before the failure stay.
    pub fn inject<G: GuestFiles + ?Sized>(
        &mut self,
        bundle: &SymbolBundle,
        guest: &G,
    ) -> Result<InjectOutcome, InjectError> {
        let Some(elf_base64) = bundle.elf_base64() else {
            if self.request_pending {
                debug!("symbol bundle still outstanding");
                return Ok(InjectOutcome::AwaitingBundle);
            }
            self.request_pending = true;
            return Ok(InjectOutcome::RequestBundle);
        };
        self.request_pending = false;

        let elf = STANDARD.decode(elf_base64.trim())?;
        guest.create_guest_file(ELF_PATH, &elf)?;

        let sources = bundle.sources().unwrap_or_default();
        for (path, text) in sources {
            guest.create_guest_file(&source_guest_path(path), text.as_bytes())?;
        }

        info!(
            elf_bytes = elf.len(),
            sources = sources.len(),
            "symbol bundle injected into guest"
        );
        Ok(InjectOutcome::Injected {
            sources: sources.len(),
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // ── Recording guest filesystem ────────────────────────────────────────────

    #[derive(Default)]
    struct RecordingGuest {
        files: Mutex<Vec<(String, Vec<u8>)>>,
        should_fail: bool,
    }

    impl RecordingGuest {
        fn files(&self) -> Vec<(String, Vec<u8>)> {
            self.files.lock().unwrap().clone()
        }
    }

    impl GuestFiles for RecordingGuest {
        fn create_guest_file(&self, path: &str, contents: &[u8]) -> Result<(), EmulatorError> {
            if self.should_fail {
                return Err(EmulatorError::GuestFile {
                    path: path.to_string(),
                    reason: "injected failure".to_string(),
                });
            }
            self.files
                .lock()
                .unwrap()
                .push((path.to_string(), contents.to_vec()));
            Ok(())
        }
    }

    fn bundle(elf: Option<&str>, sources: Option<Vec<(&str, &str)>>) -> SymbolBundle {
        let mut bundle = SymbolBundle::new();
        if let Some(elf) = elf {
            bundle.set_elf(elf.to_string());
        }
        if let Some(sources) = sources {
            bundle.set_sources(
                sources
                    .into_iter()
                    .map(|(p, t)| (p.to_string(), t.to_string()))
                    .collect(),
            );
        }
        bundle
    }

    #[test]
    fn test_missing_elf_requests_once_and_writes_nothing() {
        // Arrange
        let guest = RecordingGuest::default();
        let mut injector = FilesystemInjector::new();
        let empty = bundle(None, None);

        // Act
        let first = injector.inject(&empty, &guest).unwrap();
        let second = injector.inject(&empty, &guest).unwrap();

        // Assert
        assert_eq!(first, InjectOutcome::RequestBundle);
        assert_eq!(second, InjectOutcome::AwaitingBundle);
        assert!(guest.files().is_empty());
    }

    #[test]
    fn test_elf_without_sources_writes_only_elf() {
        // Arrange: "\x7fELF" in base64
        let guest = RecordingGuest::default();
        let mut injector = FilesystemInjector::new();

        // Act
        let outcome = injector.inject(&bundle(Some("f0VMRg=="), None), &guest).unwrap();

        // Assert
        assert_eq!(outcome, InjectOutcome::Injected { sources: 0 });
        assert_eq!(
            guest.files(),
            vec![(ELF_PATH.to_string(), b"\x7fELF".to_vec())]
        );
    }

    #[test]
    fn test_elf_with_sources_writes_flattened_names() {
        // Arrange
        let guest = RecordingGuest::default();
        let mut injector = FilesystemInjector::new();
        let full = bundle(Some("f0VMRg=="), Some(vec![("/a/b/c.c", "x")]));

        // Act
        let outcome = injector.inject(&full, &guest).unwrap();

        // Assert
        assert_eq!(outcome, InjectOutcome::Injected { sources: 1 });
        let files = guest.files();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].0, ELF_PATH);
        assert_eq!(files[1], ("/c.c".to_string(), b"x".to_vec()));
    }

    #[test]
    fn test_sources_keep_utf8_content() {
        let guest = RecordingGuest::default();
        let mut injector = FilesystemInjector::new();

        injector
            .inject(&bundle(Some("AA=="), Some(vec![("src/ü.c", "// π")])), &guest)
            .unwrap();

        assert_eq!(guest.files()[1].1, "// π".as_bytes().to_vec());
    }

    #[test]
    fn test_arrival_clears_pending_request() {
        // Arrange
        let guest = RecordingGuest::default();
        let mut injector = FilesystemInjector::new();
        injector.inject(&bundle(None, None), &guest).unwrap();
        assert!(injector.is_request_pending());

        // Act
        injector.inject(&bundle(Some("AA=="), None), &guest).unwrap();

        // Assert
        assert!(!injector.is_request_pending());
    }

    #[test]
    fn test_mark_requested_suppresses_duplicate_request() {
        let guest = RecordingGuest::default();
        let mut injector = FilesystemInjector::new();

        injector.mark_requested();
        let outcome = injector.inject(&bundle(None, None), &guest).unwrap();

        assert_eq!(outcome, InjectOutcome::AwaitingBundle);
    }

    #[test]
    fn test_invalid_base64_is_an_error() {
        let guest = RecordingGuest::default();
        let mut injector = FilesystemInjector::new();

        let result = injector.inject(&bundle(Some("not base64!"), None), &guest);

        assert!(matches!(result, Err(InjectError::InvalidElf(_))));
        assert!(guest.files().is_empty());
    }

    #[test]
    fn test_guest_failure_is_propagated() {
        let guest = RecordingGuest {
            should_fail: true,
            ..Default::default()
        };
        let mut injector = FilesystemInjector::new();

        let result = injector.inject(&bundle(Some("AA=="), None), &guest);

        assert!(matches!(result, Err(InjectError::Guest(_))));
    }
}
