//! Centralized default constants for bongo-notes.
//!
//! Crates reference these constants instead of defining their own magic
//! numbers. Organized by domain area.

// =============================================================================
// CONTENT STORE
// =============================================================================

/// Default notes root directory when `NOTES_ROOT` is unset.
pub const NOTES_ROOT: &str = "./data/notes";

/// File name of a note's current content inside its directory.
pub const CURRENT_FILE_NAME: &str = "recent";

/// Directory holding a note's diff artifacts.
pub const DIFFS_DIR_NAME: &str = "diffs";

/// Directory under the notes root holding content-addressed staged content.
pub const STAGING_DIR_NAME: &str = "temp";

/// Extension of a diff artifact that is still being written.
pub const PARTIAL_EXTENSION: &str = "partial";

/// Lock file under the notes root held by the process running the update worker.
pub const WORKER_LOCK_FILE_NAME: &str = ".worker.lock";

/// Buffer size for streaming file copies (1 MiB).
pub const COPY_BUFFER_BYTES: usize = 1024 * 1024;

// =============================================================================
// EXTERNAL TOOLS
// =============================================================================

/// Default diff executable, resolved through `PATH`.
pub const DIFF_BIN: &str = "diff";

/// Default patch executable, resolved through `PATH`.
pub const PATCH_BIN: &str = "patch";

/// Upper bound on captured stderr from an external tool.
pub const TOOL_STDERR_LIMIT_BYTES: u64 = 64 * 1024;

/// Timeout for a single diff or patch invocation in seconds.
pub const TOOL_TIMEOUT_SECS: u64 = 120;

// =============================================================================
// UPDATE QUEUE
// =============================================================================

/// Capacity of the bounded update queue.
pub const UPDATE_QUEUE_CAPACITY: usize = 10;

/// Worker event broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// DATABASE
// =============================================================================

/// Default database URL when `DATABASE_URL` is unset.
pub const DATABASE_URL: &str = "postgres://localhost/bongo_notes";
