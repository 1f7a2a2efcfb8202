use std::{fs::{self, ReadDir}, io, path::{Path, PathBuf}};

use serde::Deserialize;

pub const EXTENSION: &str = "toml";

#[derive(thiserror::Error, Debug)]
pub enum TomlDirError {
    /// Reading the directory or one of its files failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file is not valid TOML or does not match the expected shape
    #[error("TOML parsing error in file {0}: {1}")]
    TomlParse(PathBuf, toml::de::Error),

    /// The path is not a directory
    #[error("Invalid path: {0}")]
    PathError(String),

    #[error("Could not determine file stem for path: {0}")]
    StemError(PathBuf),
}

// Lazily reads and parses the TOML files of a directory, keyed by file stem.
pub struct TomlDirIterator<T>
where
    T: for<'de> Deserialize<'de>,
{
    dir_entries: ReadDir,
    // Ties the iterator to the parsed type without holding one
    _marker: std::marker::PhantomData<T>,
}

/// Reads and parses one file. Parse errors name the file.
pub fn parse_file<T>(path: &Path) -> Result<T, TomlDirError>
where
    T: for<'de> Deserialize<'de>,
{
    let contents = fs::read_to_string(path)?;

    toml::from_str(&contents).map_err(|e| TomlDirError::TomlParse(path.to_path_buf(), e))
}

impl<T> Iterator for TomlDirIterator<T>
where
    T: for<'de> Deserialize<'de>,
{
    type Item = Result<(String, T), TomlDirError>;

    // Errors are yielded per file so one broken file does not end the walk.
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.dir_entries.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(TomlDirError::from(e))),
            };
            let path = entry.path();
            // Anything but *.toml files is skipped
            if !path.is_file() || !path.extension().is_some_and(|ext| ext == EXTENSION) {
                continue;
            }

            let file_stem = match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) => stem.to_string(),
                None => return Some(Err(TomlDirError::StemError(path))),
            };

            return Some(parse_file(&path).map(|data| (file_stem, data)));
        }
    }
}

/// Returns an iterator over the parsed TOML files in a directory.
pub fn parse<T>(dir_path: &Path) -> Result<TomlDirIterator<T>, TomlDirError>
where
    T: for<'de> Deserialize<'de>,
{
    if !dir_path.is_dir() {
        return Err(TomlDirError::PathError(format!(
            "Path '{}' is not a directory.",
            dir_path.display()
        )));
    }

    let dir_entries = fs::read_dir(dir_path)?;

    Ok(TomlDirIterator {
        dir_entries,
        _marker: std::marker::PhantomData,
    })
}
