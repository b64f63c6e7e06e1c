use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::compat::is_compatible;
use crate::error::{ClipboardError, Result};
use crate::graph::TransportValue;

/// One clipboard file: the copied elements plus the type they were copied as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipboardFile {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(deserialize_with = "one_or_many")]
    pub data: Vec<TransportValue>,
    #[serde(default)]
    pub is_multi: bool,
}

impl ClipboardFile {
    pub fn new(type_name: impl Into<String>, data: Vec<TransportValue>) -> Self {
        let is_multi = data.len() > 1;
        Self {
            type_name: type_name.into(),
            data,
            is_multi,
        }
    }

    /// Refuses the file when its type cannot go where `target` is expected.
    pub fn check_compatible(&self, target: &str) -> Result<()> {
        if is_compatible(target, &self.type_name) {
            Ok(())
        } else {
            Err(ClipboardError::Incompatible {
                target: target.to_string(),
                source_type: self.type_name.clone(),
            })
        }
    }
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<TransportValue>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<TransportValue>),
        One(TransportValue),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::Many(values) => values,
        OneOrMany::One(value) => vec![value],
    })
}

/// Directory of clipboard files, one per element type.
#[derive(Debug, Clone)]
pub struct ClipboardStore {
    dir: PathBuf,
}

impl ClipboardStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<data dir>/reasy/clipboard` for the current user.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("reasy").join("clipboard"))
    }

    pub fn open_default() -> Result<Self> {
        let dir = Self::default_dir().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "no user data directory on this platform")
        })?;
        Ok(Self::new(dir))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, type_name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_file_name(type_name)))
    }

    pub fn save(&self, file: &ClipboardFile) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&file.type_name);
        let json = serde_json::to_string_pretty(file)?;
        fs::write(&path, json)?;
        log::debug!("clipboard: saved {} element(s) to {}", file.data.len(), path.display());
        Ok(path)
    }

    /// `None` when nothing was copied for `type_name` yet.
    pub fn load(&self, type_name: &str) -> Result<Option<ClipboardFile>> {
        let path = self.path_for(type_name);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// Removes the file for `type_name`. Returns whether one existed.
    pub fn clear(&self, type_name: &str) -> Result<bool> {
        match fs::remove_file(self.path_for(type_name)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

/// File-system safe stem for a type name: anything but ASCII alphanumerics,
/// `.`, `_` and `-` becomes `_`.
pub fn sanitize_file_name(type_name: &str) -> String {
    let name: String = type_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() { "_".to_string() } else { name }
}
