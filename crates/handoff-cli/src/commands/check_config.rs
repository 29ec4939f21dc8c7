//! `handoff check-config` -- validate a config file.
//!
//! This is the offline half of the reload-config contract: operators run
//! it before pointing the watcher at a new file. Exit code 2 signals a
//! validation failure, 1 an unreadable file, 0 success.

use tracing::error;

use crate::config_file;

/// Run the command; returns the process exit code.
pub fn run(path: Option<&str>) -> i32 {
    let config = match config_file::load(path) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "could not load config");
            return 1;
        }
    };
    match config.validate() {
        Ok(()) => {
            println!("config ok");
            0
        }
        Err(err) => {
            error!(error = %err, "config validation failed");
            2
        }
    }
}
