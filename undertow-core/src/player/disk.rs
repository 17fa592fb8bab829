//! Free disk space probing.

use std::fmt;
use std::io;
use std::path::Path;

use sysinfo::Disks;

/// Reports free bytes on the filesystem holding a path.
pub trait SpaceProbe: Send + Sync + fmt::Debug {
    fn free_space(&self, path: &Path) -> io::Result<u64>;
}

/// Probe backed by the system disk list.
///
/// Picks the disk with the longest mount point that prefixes the path.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSpaceProbe;

impl SpaceProbe for SystemSpaceProbe {
    fn free_space(&self, path: &Path) -> io::Result<u64> {
        let path = nearest_existing(path)?;
        let disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .filter(|disk| path.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no disk found for {}", path.display()),
                )
            })
    }
}

/// Canonical form of `path` or of its closest existing ancestor, since the
/// download directory may not exist yet.
fn nearest_existing(path: &Path) -> io::Result<std::path::PathBuf> {
    let mut current = Some(path);
    while let Some(candidate) = current {
        if let Ok(canonical) = candidate.canonicalize() {
            return Ok(canonical);
        }
        current = candidate.parent();
    }
    Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} has no existing ancestor", path.display()),
    ))
}

/// Probe that always reports the same amount.
#[derive(Debug, Clone, Copy)]
pub struct FixedSpace(pub u64);

impl SpaceProbe for FixedSpace {
    fn free_space(&self, _path: &Path) -> io::Result<u64> {
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_existing_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("a/b/c");
        assert_eq!(
            nearest_existing(&missing).unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn test_fixed_space() {
        assert_eq!(FixedSpace(42).free_space(Path::new("/")).unwrap(), 42);
    }
}
