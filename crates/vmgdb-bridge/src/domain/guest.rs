//! Fixed layout of the guest filesystem and the debugger launch contract.
//!
//! The host-writable guest filesystem is mounted at `/mnt` inside the guest.
//! Paths here are relative to that filesystem's root, so `/sketch.elf` is
//! seen by the guest as `/mnt/sketch.elf`.

/// Where the symbol file is written.
pub const ELF_PATH: &str = "/sketch.elf";

/// Directory the source files are written to (flattened to their file names).
pub const SOURCES_DIR: &str = "/";

/// Where the launch script is written.
pub const LAUNCH_SCRIPT_PATH: &str = "gdb.sh";

/// Typed on the console line to start the debugger once the shell is ready.
pub const LAUNCH_COMMAND: &str = ". /mnt/gdb.sh\n";

/// Shell loop that sizes the terminal and (re)starts the debugger, pointed
/// at the symbol file and at the debug serial line as its remote target.
pub const LAUNCH_SCRIPT: &str = r#"
#!/bin/sh
while true; do
  eval `resize`
  gdb -ex "dir /mnt" -ex "symbol-file /mnt/sketch.elf" -ex "target remote /dev/ttyS1"
done
"#;

/// Guest path for a source file: its last path segment inside [`SOURCES_DIR`].
///
/// ```rust
/// use vmgdb_bridge::domain::guest::source_guest_path;
///
/// assert_eq!(source_guest_path("/home/me/project/main.c"), "/main.c");
/// assert_eq!(source_guest_path("util.h"), "/util.h");
/// ```
pub fn source_guest_path(path: &str) -> String {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    format!("{SOURCES_DIR}{file_name}")
}
