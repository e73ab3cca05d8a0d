use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn write_kumo_kdl(&self, content: &str) {
        let path = self.root.path().join("kumo.kdl");
        fs::write(path, content).unwrap();
    }

    #[allow(dead_code)]
    pub fn write_resource(&self, name: &str, content: &str) {
        let dir = self.root.path().join("resources");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{}.kdl", name)), content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    #[allow(dead_code)]
    pub fn state_file(&self) -> PathBuf {
        self.root.path().join(".kumo/state.json")
    }

    #[allow(dead_code)]
    pub fn object_file(&self, resource_type: &str, name: &str) -> PathBuf {
        self.root
            .path()
            .join(".kumo/objects")
            .join(resource_type)
            .join(format!("{}.json", name))
    }
}
