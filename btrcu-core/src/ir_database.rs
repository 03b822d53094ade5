//! §6.4: the external IR code database collaborator. Supplied by the daemon; `btrcu-core` only
//! depends on this trait.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::BlercuResult;
use crate::uuids::Key;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Brand {
    pub name: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Model {
    pub name: String,
}

#[async_trait]
pub trait IrDatabase: Send + Sync {
    async fn brands(
        &self,
        search: &str,
        offset: u32,
        limit: u32,
    ) -> BlercuResult<Vec<Brand>>;

    async fn models(
        &self,
        brand: &str,
        search: &str,
        offset: u32,
        limit: u32,
    ) -> BlercuResult<Vec<Model>>;

    async fn code_ids(&self, brand: &str, model: &str) -> BlercuResult<Vec<u32>>;

    async fn code_ids_from_edid(&self, edid: &[u8]) -> BlercuResult<Vec<u32>>;

    /// Look up the IR waveform bytes for each requested key under `code_id`. Keys the database
    /// has no waveform for are simply absent from the returned map.
    async fn waveforms_for(
        &self,
        code_id: u32,
        keys: &[Key],
    ) -> BlercuResult<HashMap<Key, Vec<u8>>>;
}
