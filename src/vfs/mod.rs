//! In-memory file store
//!
//! A flat, permissioned file store: filenames are unique keys mapping to a
//! content payload, a read/write permission pair, and an owning directory.
//! Directories are ordered, duplicate-free listings of filenames. Nothing is
//! persisted; the store lives and dies with the kernel that owns it.
//!
//! Two deliberate asymmetries in strictness:
//! - `write` to an unknown directory is an error (you cannot invent a
//!   directory by writing into it)
//! - `list` of an unknown directory returns an empty listing, not an error

use std::collections::HashMap;
use std::fmt;

/// The directory every store starts with
pub const ROOT_DIR: &str = "root";

/// Per-file read/write permission flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    pub read: bool,
    pub write: bool,
}

impl Permissions {
    pub const READ_WRITE: Permissions = Permissions {
        read: true,
        write: true,
    };

    pub const READ_ONLY: Permissions = Permissions {
        read: true,
        write: false,
    };

    pub const WRITE_ONLY: Permissions = Permissions {
        read: false,
        write: true,
    };

    /// Parse a permission string: any combination of `r` and `w`
    pub fn parse(s: &str) -> Self {
        Self {
            read: s.contains('r'),
            write: s.contains('w'),
        }
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.read {
            write!(f, "r")?;
        }
        if self.write {
            write!(f, "w")?;
        }
        if !self.read && !self.write {
            write!(f, "-")?;
        }
        Ok(())
    }
}

/// File store error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    /// The name has never been written
    FileNotFound(String),
    /// The file exists but the required permission flag is absent
    PermissionDenied(String),
    /// The target directory does not exist
    DirectoryNotFound(String),
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::FileNotFound(name) => write!(f, "file not found: {}", name),
            FsError::PermissionDenied(name) => write!(f, "permission denied: {}", name),
            FsError::DirectoryNotFound(dir) => write!(f, "directory not found: {}", dir),
        }
    }
}

impl std::error::Error for FsError {}

/// One stored file
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub content: String,
    pub permissions: Permissions,
    pub directory: String,
}

/// Filename-keyed store with ordered directory listings
#[derive(Debug, Clone)]
pub struct FileStore {
    files: HashMap<String, FileEntry>,
    directories: HashMap<String, Vec<String>>,
}

impl FileStore {
    pub fn new() -> Self {
        let mut store = Self {
            files: HashMap::new(),
            directories: HashMap::new(),
        };
        store.create_dir(ROOT_DIR);
        store
    }

    /// Register a directory. Idempotent; an existing listing is untouched.
    pub fn create_dir(&mut self, name: &str) {
        self.directories.entry(name.to_string()).or_default();
    }

    /// Create or overwrite a file.
    ///
    /// Overwriting replaces content and permissions in place. The filename is
    /// appended to the directory listing only if not already present, so a
    /// listing never shows the same name twice. A file appears in exactly one
    /// listing: overwriting into a different directory moves it.
    pub fn write(
        &mut self,
        name: &str,
        content: &str,
        directory: &str,
        permissions: Permissions,
    ) -> Result<(), FsError> {
        if !self.directories.contains_key(directory) {
            return Err(FsError::DirectoryNotFound(directory.to_string()));
        }

        if let Some(existing) = self.files.get(name)
            && existing.directory != directory
            && let Some(listing) = self.directories.get_mut(&existing.directory)
        {
            listing.retain(|n| n != name);
        }

        let listing = self
            .directories
            .get_mut(directory)
            .ok_or_else(|| FsError::DirectoryNotFound(directory.to_string()))?;
        if !listing.iter().any(|n| n == name) {
            listing.push(name.to_string());
        }

        self.files.insert(
            name.to_string(),
            FileEntry {
                content: content.to_string(),
                permissions,
                directory: directory.to_string(),
            },
        );
        Ok(())
    }

    /// Read a file's content. Requires the Read flag.
    pub fn read(&self, name: &str) -> Result<&str, FsError> {
        let entry = self
            .files
            .get(name)
            .ok_or_else(|| FsError::FileNotFound(name.to_string()))?;
        if !entry.permissions.read {
            return Err(FsError::PermissionDenied(name.to_string()));
        }
        Ok(&entry.content)
    }

    /// List a directory in insertion order. Unknown directories list empty.
    pub fn list(&self, directory: &str) -> Vec<String> {
        self.directories.get(directory).cloned().unwrap_or_default()
    }

    /// Whether `name` has ever been written
    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    /// Look up a file entry, permissions included
    pub fn entry(&self, name: &str) -> Option<&FileEntry> {
        self.files.get(name)
    }
}

impl Default for FileStore {
    fn default() -> Self {
        Self::new()
    }
}
