//! hhprep CLI - résumé CSV preprocessing into dense arrays.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use std::process::ExitCode;

fn main() -> ExitCode {
    hhprep::cli::run()
}
