//! Writing generated files to disk.
//!
//! Every asset may expose a list of [`File`](crate::File)s. Persisting an
//! engine writes the files of all generated assets below one directory and
//! returns a [`Manifest`] recording what was written, so that a later run can
//! tell which artifacts changed.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fs;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::{Deserialize, Serialize};

use crate::core::{AssetId, Dynamic, File};
use crate::error::{EngineError, PersistError};

/// A single file written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub filename: Utf8PathBuf,
    /// Hex encoded BLAKE3 hash of the content.
    pub hash: String,
    pub size: u64,
}

impl FileRecord {
    fn new(file: &File) -> Self {
        Self {
            filename: file.filename.clone(),
            hash: file.hash().to_hex(),
            size: file.data.len() as u64,
        }
    }
}

/// Files written by a single [`Engine::persist`](crate::Engine::persist),
/// grouped by the name of the asset which produced them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub assets: BTreeMap<String, Vec<FileRecord>>,
}

impl Manifest {
    pub fn files(&self, id: AssetId) -> &[FileRecord] {
        self.assets.get(id.name()).map(Vec::as_slice).unwrap_or_default()
    }

    /// Total number of files in the manifest.
    pub fn len(&self) -> usize {
        self.assets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, PersistError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save(&self, path: impl AsRef<Utf8Path>) -> Result<(), PersistError> {
        let path = path.as_ref();

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// Only plain relative paths are allowed, so that nothing is ever written
/// outside of the target directory.
fn check_filename(filename: &Utf8Path) -> Result<(), PersistError> {
    let valid = !filename.as_str().is_empty()
        && filename
            .components()
            .all(|c| matches!(c, Utf8Component::Normal(_) | Utf8Component::CurDir));

    if valid {
        Ok(())
    } else {
        Err(PersistError::InvalidFilename(filename.to_path_buf()))
    }
}

/// Path as written to disk, without `.` components.
fn normalize(filename: &Utf8Path) -> Utf8PathBuf {
    let mut acc = Utf8PathBuf::new();

    for component in filename.components() {
        if let Utf8Component::Normal(part) = component {
            acc.push(part);
        }
    }

    acc
}

/// Assigns every file to the single asset allowed to write it.
fn claim(entries: &[(AssetId, &Dynamic)]) -> Result<(), EngineError> {
    let mut owners: BTreeMap<Utf8PathBuf, AssetId> = BTreeMap::new();

    for (id, asset) in entries {
        for file in asset.files() {
            check_filename(&file.filename).map_err(|err| EngineError::Persist(*id, err))?;

            match owners.entry(normalize(&file.filename)) {
                Entry::Vacant(entry) => {
                    entry.insert(*id);
                }
                Entry::Occupied(entry) => {
                    tracing::error!(asset = %id, owner = %entry.get(), file = %entry.key(), "file conflict");
                    let conflict = PersistError::Conflict(entry.key().clone(), *entry.get());
                    return Err(EngineError::Persist(*id, conflict));
                }
            }
        }
    }

    Ok(())
}

fn write_file(dir: &Utf8Path, file: &File) -> Result<FileRecord, PersistError> {
    let path = dir.join(&file.filename);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(&path, &file.data)?;
    tracing::debug!(file = %path, "written");

    Ok(FileRecord::new(file))
}

/// Writes the files of every asset in `entries` into `dir`. Nothing is
/// written unless every file name is valid and owned by exactly one asset.
pub(crate) fn persist(
    dir: &Utf8Path,
    entries: &[(AssetId, &Dynamic)],
) -> Result<Manifest, EngineError> {
    claim(entries)?;

    fs::create_dir_all(dir)
        .map_err(|err| EngineError::Output(PersistError::Directory(dir.to_path_buf(), err)))?;

    let written = entries
        .par_iter()
        .map(|(id, asset)| {
            let records = asset
                .files()
                .iter()
                .map(|file| write_file(dir, file))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| EngineError::Persist(*id, err))?;

            Ok((id.name().to_string(), records))
        })
        .collect::<Result<Vec<_>, EngineError>>()?;

    let assets: BTreeMap<_, _> = written
        .into_iter()
        .filter(|(_, records)| !records.is_empty())
        .collect();

    tracing::info!(dir = %dir, assets = assets.len(), "persisted");

    Ok(Manifest { assets })
}
