//! Temporary directory helpers for tests.

use tempfile::TempDir;

/// Create a temporary directory for test output. Cleaned up on drop.
pub fn temp_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temporary test directory")
}

/// Create a temporary study directory with the cache subdirectories the
/// result cache expects (`source/`, `desired_cell/`, `undesired_cell/`).
pub fn temp_study_dir() -> TempDir {
    let dir = tempfile::Builder::new()
        .prefix("study_test_")
        .tempdir()
        .expect("Failed to create temporary study directory");
    for sub in ["source", "desired_cell", "undesired_cell"] {
        std::fs::create_dir_all(dir.path().join(sub)).expect("Failed to create cache subdir");
    }
    dir
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_study_dir_layout() {
        let dir = temp_study_dir();
        assert!(dir.path().join("source").is_dir());
        assert!(dir.path().join("desired_cell").is_dir());
        assert!(dir.path().join("undesired_cell").is_dir());
    }
}
