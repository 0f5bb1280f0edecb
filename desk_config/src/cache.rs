//! Last-known peripheral, persisted so later runs can skip a full scan.
use serde::{Deserialize, Serialize};
use std::{fs, io::Write, path::Path};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedDevice {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Read the cache file. Missing or unreadable caches are treated as empty.
pub fn load_device_cache(path: &Path) -> Option<CachedDevice> {
    let text = fs::read_to_string(path).ok()?;
    toml::from_str::<CachedDevice>(&text).ok()
}

pub fn store_device_cache(path: &Path, device: &CachedDevice) -> eyre::Result<()> {
    let text = toml::to_string(device)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    write_atomic(path, text.as_bytes())?;
    Ok(())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("new");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("device.toml");
        let dev = CachedDevice {
            address: "FD:46:77:A9:30:CA".into(),
            name: Some("Desk 4711".into()),
        };
        store_device_cache(&path, &dev).unwrap();
        assert_eq!(load_device_cache(&path), Some(dev));
        assert!(!path.with_extension("new").exists());
    }

    #[test]
    fn garbage_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.toml");
        fs::write(&path, "address = [").unwrap();
        assert_eq!(load_device_cache(&path), None);
        assert_eq!(load_device_cache(&dir.path().join("missing.toml")), None);
    }
}
