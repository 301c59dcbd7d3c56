use std::fs;
use std::path::{Path, PathBuf};

use script_runner::config::SupervisorConfig;
use tempfile::TempDir;

/// A shell script written to a temporary directory.
pub struct ScriptFixture {
    dir: TempDir,
    path: PathBuf,
}

impl ScriptFixture {
    pub fn new(contents: &str) -> Self {
        let dir = tempfile::tempdir().expect("creating temp dir");
        let path = dir.path().join("script.sh");
        fs::write(&path, contents).expect("writing script fixture");
        Self { dir, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A path inside the fixture directory that does not exist.
    pub fn missing(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// `/bin/sh <script>` as the current user.
    pub fn config(&self) -> SupervisorConfig {
        SupervisorConfig::new("/bin/sh", &self.path)
    }
}
