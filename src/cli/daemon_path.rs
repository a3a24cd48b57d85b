use std::path::PathBuf;

/// The daemon binary ships next to the cli binary under this name.
pub fn to_daemon_path(mut path: PathBuf) -> PathBuf {
    path.set_file_name("timekeep-daemon");
    #[cfg(windows)]
    {
        path.set_extension("exe");
    }
    path
}
