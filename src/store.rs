use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    mapping::Mapping,
    tomldir::{self, TomlDirError},
};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("could not read mappings: {0}")]
    TomlDir(#[from] TomlDirError),

    #[error("could not serialize mapping: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("mapping not found: {0}")]
    NotFound(String),

    #[error("invalid mapping id: '{0}'")]
    InvalidId(String),
}

/// Mappings kept as one `<id>.toml` file each in a directory.
#[derive(Debug, Clone)]
pub struct MappingStore {
    dir: PathBuf,
}

impl MappingStore {
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(dir)?;
        debug!(dir = %dir.display(), "opened mapping store");

        Ok(MappingStore {
            dir: dir.to_path_buf(),
        })
    }

    fn path(&self, id: &str) -> Result<PathBuf, StoreError> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::InvalidId(id.to_string()));
        }

        Ok(self.dir.join(format!("{}.{}", id, tomldir::EXTENSION)))
    }

    /// All mappings ordered by name, then id. The file stem is authoritative
    /// for the id.
    pub fn list(&self) -> Result<Vec<Mapping>, StoreError> {
        let mut mappings = Vec::new();
        for result in tomldir::parse::<Mapping>(&self.dir)? {
            let (id, mut mapping) = result?;
            mapping.id = id;
            mappings.push(mapping);
        }
        mappings.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

        Ok(mappings)
    }

    pub fn get(&self, id: &str) -> Result<Mapping, StoreError> {
        let path = self.path(id)?;
        if !path.is_file() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let mut mapping: Mapping = tomldir::parse_file(&path)?;
        mapping.id = id.to_string();

        Ok(mapping)
    }

    pub fn save(&self, mapping: &Mapping) -> Result<(), StoreError> {
        let path = self.path(&mapping.id)?;
        let text = toml::to_string(mapping)?;
        fs::write(&path, text)?;
        info!(id = %mapping.id, topic = %mapping.topic, "saved mapping");

        Ok(())
    }

    /// Stores `mapping` under a newly generated id and returns the id.
    pub fn create(&self, mut mapping: Mapping) -> Result<String, StoreError> {
        mapping.id = Uuid::new_v4().to_string();
        self.save(&mapping)?;

        Ok(mapping.id)
    }

    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        let path = self.path(id)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(id, "deleted mapping");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}
