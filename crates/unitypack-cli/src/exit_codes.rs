//! Process exit codes. Part of the CLI contract; they mirror `PackError::exit_code`.

pub const SUCCESS: i32 = 0;
pub const INPUT_ERROR: i32 = 1; // Bad meta file, bad path, empty request
pub const IO_ERROR: i32 = 2; // Filesystem failure or internal error
pub const ARCHIVE_ERROR: i32 = 3; // tar/gzip step failed
