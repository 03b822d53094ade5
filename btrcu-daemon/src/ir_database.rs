//! §6.4: a file-backed IR code database. A TOML catalog maps brand/model names and EDID
//! fingerprints to code ids; each code id's key waveforms live as individual files under a
//! waveform directory, mirroring the way the daemon reads its other small on-disk lookup tables.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use btrcu_core::error::{BlercuError, BlercuResult};
use btrcu_core::ir_database::{Brand, IrDatabase, Model};
use btrcu_core::uuids::Key;
use serde_derive::Deserialize;
use tokio::fs;

#[derive(Clone, Debug, Deserialize)]
struct CatalogModel {
    name: String,
    code_ids: Vec<u32>,
}

#[derive(Clone, Debug, Deserialize)]
struct CatalogBrand {
    name: String,
    #[serde(default)]
    models: Vec<CatalogModel>,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct Catalog {
    #[serde(default)]
    brands: Vec<CatalogBrand>,
    /// Maps a lower-case hex-encoded EDID manufacturer/product byte string to candidate code ids.
    #[serde(default)]
    edid: HashMap<String, Vec<u32>>,
}

pub struct FileIrDatabase {
    catalog: Catalog,
    waveform_dir: PathBuf,
}

impl FileIrDatabase {
    pub async fn load(catalog_path: &Path, waveform_dir: &Path) -> BlercuResult<Self> {
        let contents = fs::read_to_string(catalog_path)
            .await
            .map_err(|err| BlercuError::FileNotFound(format!("{}: {err}", catalog_path.display())))?;
        let catalog: Catalog = toml::from_str(&contents)
            .map_err(|err| BlercuError::BadFormat(format!("{}: {err}", catalog_path.display())))?;
        Ok(FileIrDatabase {
            catalog,
            waveform_dir: waveform_dir.to_owned(),
        })
    }

    fn key_filename(key: Key) -> &'static str {
        match key {
            Key::WakeUp => "wake_up",
            Key::Standby => "standby",
            Key::InputSelect => "input_select",
            Key::VolumeUp => "volume_up",
            Key::VolumeDown => "volume_down",
            Key::Mute => "mute",
            Key::Select => "select",
            Key::Up => "up",
            Key::Down => "down",
            Key::Left => "left",
            Key::Right => "right",
        }
    }
}

#[async_trait]
impl IrDatabase for FileIrDatabase {
    async fn brands(&self, search: &str, offset: u32, limit: u32) -> BlercuResult<Vec<Brand>> {
        let search = search.to_lowercase();
        Ok(self
            .catalog
            .brands
            .iter()
            .filter(|brand| search.is_empty() || brand.name.to_lowercase().contains(&search))
            .skip(offset as usize)
            .take(limit as usize)
            .map(|brand| Brand { name: brand.name.clone() })
            .collect())
    }

    async fn models(&self, brand: &str, search: &str, offset: u32, limit: u32) -> BlercuResult<Vec<Model>> {
        let search = search.to_lowercase();
        let Some(brand) = self.catalog.brands.iter().find(|b| b.name == brand) else {
            return Ok(Vec::new());
        };
        Ok(brand
            .models
            .iter()
            .filter(|model| search.is_empty() || model.name.to_lowercase().contains(&search))
            .skip(offset as usize)
            .take(limit as usize)
            .map(|model| Model { name: model.name.clone() })
            .collect())
    }

    async fn code_ids(&self, brand: &str, model: &str) -> BlercuResult<Vec<u32>> {
        Ok(self
            .catalog
            .brands
            .iter()
            .find(|b| b.name == brand)
            .and_then(|b| b.models.iter().find(|m| m.name == model))
            .map(|m| m.code_ids.clone())
            .unwrap_or_default())
    }

    async fn code_ids_from_edid(&self, edid: &[u8]) -> BlercuResult<Vec<u32>> {
        let key: String = edid.iter().map(|byte| format!("{byte:02x}")).collect();
        Ok(self.catalog.edid.get(&key).cloned().unwrap_or_default())
    }

    async fn waveforms_for(&self, code_id: u32, keys: &[Key]) -> BlercuResult<HashMap<Key, Vec<u8>>> {
        let mut waveforms = HashMap::new();
        for &key in keys {
            let path = self
                .waveform_dir
                .join(code_id.to_string())
                .join(format!("{}.bin", Self::key_filename(key)));
            if let Ok(bytes) = fs::read(&path).await {
                waveforms.insert(key, bytes);
            }
        }
        Ok(waveforms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_catalog_file_is_a_file_not_found_error() {
        let err = FileIrDatabase::load(Path::new("/nonexistent/catalog.toml"), Path::new("/nonexistent"))
            .await
            .unwrap_err();
        assert!(matches!(err, BlercuError::FileNotFound(_)));
    }

    #[test]
    fn key_filenames_are_unique() {
        let keys = [
            Key::WakeUp,
            Key::Standby,
            Key::InputSelect,
            Key::VolumeUp,
            Key::VolumeDown,
            Key::Mute,
            Key::Select,
            Key::Up,
            Key::Down,
            Key::Left,
            Key::Right,
        ];
        let mut names: Vec<&'static str> = keys.iter().map(|&k| FileIrDatabase::key_filename(k)).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), keys.len());
    }
}
