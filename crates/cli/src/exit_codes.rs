//! CLI Exit Code Registry
//!
//! Single source of truth for `rlink` exit codes. Exit codes are part
//! of the shell contract — scripts gate on them.
//!
//! | Code | Meaning                                   |
//! |------|-------------------------------------------|
//! | 0    | Success, fully reconciled                 |
//! | 1    | General error (unspecified)               |
//! | 2    | Usage error (bad args)                    |
//! | 3    | Invalid configuration                     |
//! | 4    | Runtime error (missing file, bad CSV, ...)|
//! | 5    | Run completed with unmatched rows         |

/// Success - reconciliation completed and everything paired.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

/// Configuration failed to parse or validate.
pub const EXIT_INVALID_CONFIG: u8 = 3;

/// Runtime failure: unreadable input, CSV parse error, missing columns.
pub const EXIT_RUNTIME: u8 = 4;

/// The run finished but left unmatched rows on either side.
/// Like `diff(1)` exiting 1, this is signal rather than failure.
pub const EXIT_UNMATCHED: u8 = 5;
