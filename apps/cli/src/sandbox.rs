//! Sandbox hook.
//!
//! The commands declare the filesystem they intend to touch before opening
//! the database; on OpenBSD the declaration is enforced with unveil(2) and
//! pledge(2), elsewhere it is a no-op.

use std::path::{Path, PathBuf};

use sigvault_store::context::intended_paths;

pub struct Plan {
    read: Vec<PathBuf>,
    read_write_create: Vec<PathBuf>,
    fattr: bool,
}

impl Plan {
    /// Access needed to open the data store in `dir`: the profile tree
    /// read-only, except the WAL and shared-memory siblings, which
    /// SQLite may need to create.
    pub fn for_signal_dir(dir: &Path) -> Plan {
        let mut plan = Plan {
            read: vec![dir.to_path_buf()],
            read_write_create: Vec::new(),
            fattr: false,
        };
        for path in intended_paths(dir) {
            let name = path.to_string_lossy().into_owned();
            if name.ends_with("-wal") || name.ends_with("-shm") {
                plan.read_write_create.push(path);
            } else {
                plan.read.push(path);
            }
        }
        plan
    }

    /// Add an output file or directory.
    pub fn write_to(mut self, path: &Path) -> Plan {
        self.read_write_create.push(path.to_path_buf());
        self
    }

    /// The command will change file timestamps.
    pub fn with_fattr(mut self) -> Plan {
        self.fattr = true;
        self
    }

    #[cfg(target_os = "openbsd")]
    pub fn apply(&self) -> anyhow::Result<()> {
        for path in &self.read {
            unveil(path, "r")?;
        }
        for path in &self.read_write_create {
            unveil(path, "rwc")?;
        }
        let promises = if self.fattr {
            "stdio rpath wpath cpath flock fattr"
        } else {
            "stdio rpath wpath cpath flock"
        };
        pledge(promises)
    }

    #[cfg(not(target_os = "openbsd"))]
    pub fn apply(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(target_os = "openbsd")]
fn unveil(path: &Path, permissions: &str) -> anyhow::Result<()> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())?;
    let c_perms = CString::new(permissions)?;
    if unsafe { libc::unveil(c_path.as_ptr(), c_perms.as_ptr()) } != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

#[cfg(target_os = "openbsd")]
fn pledge(promises: &str) -> anyhow::Result<()> {
    use std::ffi::CString;

    let c_promises = CString::new(promises)?;
    if unsafe { libc::pledge(c_promises.as_ptr(), std::ptr::null()) } != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_splits_database_siblings_from_read_paths() {
        let plan = Plan::for_signal_dir(Path::new("/profile"))
            .write_to(Path::new("/out"))
            .with_fattr();
        assert!(plan.read.iter().any(|p| p.ends_with("db.sqlite")));
        assert!(plan
            .read_write_create
            .iter()
            .any(|p| p.to_string_lossy().ends_with("-wal")));
        assert!(plan
            .read_write_create
            .iter()
            .any(|p| p.to_string_lossy().ends_with("-shm")));
        assert!(plan.read_write_create.iter().any(|p| p == Path::new("/out")));
        assert!(plan.fattr);
        plan.apply().unwrap();
    }
}
