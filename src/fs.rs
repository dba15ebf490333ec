//! Filesystem probes used during Unix-socket resolution

use std::path::Path;

/// Answers the two questions socket resolution needs
pub trait SocketFs: Send + Sync {
    fn is_dir(&self, path: &Path) -> bool;

    fn is_socket(&self, path: &Path) -> bool;
}

/// Probes the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl SocketFs for LocalFs {
    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    #[cfg(unix)]
    fn is_socket(&self, path: &Path) -> bool {
        use std::os::unix::fs::FileTypeExt;

        std::fs::metadata(path).is_ok_and(|m| m.file_type().is_socket())
    }

    #[cfg(not(unix))]
    fn is_socket(&self, _path: &Path) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_is_not_a_socket() {
        let dir = std::env::temp_dir();
        assert!(LocalFs.is_dir(&dir));
        assert!(!LocalFs.is_socket(&dir));
    }

    #[test]
    fn test_missing_path() {
        let missing = std::env::temp_dir().join("dbconnect_missing_socket_path");
        assert!(!LocalFs.is_dir(&missing));
        assert!(!LocalFs.is_socket(&missing));
    }

    #[cfg(unix)]
    #[test]
    fn test_bound_unix_listener_is_a_socket() {
        use std::os::unix::net::UnixListener;
        use std::time::{SystemTime, UNIX_EPOCH};

        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        let path = std::env::temp_dir().join(format!("dbconnect_fs_{nanos}.sock"));
        let _listener = UnixListener::bind(&path).unwrap();

        assert!(LocalFs.is_socket(&path));
        assert!(!LocalFs.is_dir(&path));

        let _ = std::fs::remove_file(&path);
    }
}
