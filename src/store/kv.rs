//! Flat key-value backend over sled, used when the relational engine is
//! unavailable. One tree per table; values are the entity's JSON document,
//! which keeps structured fields (interest sets, filter predicates) in a
//! single scalar value exactly like the relational backend's JSON columns.

use std::path::Path;

use uuid::Uuid;

use crate::store::{Record, StoreError};

const SYNC_STATE_TREE: &str = "sync_state";

pub struct KvStore {
    db: sled::Db,
}

impl KvStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    fn tree(&self, name: &str) -> Result<sled::Tree, StoreError> {
        Ok(self.db.open_tree(name)?)
    }

    pub(crate) fn get_all<T: Record>(&self) -> Result<Vec<T>, StoreError> {
        let tree = self.tree(T::TABLE)?;
        let mut out = Vec::new();
        for item in tree.iter() {
            let (_key, value) = item?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    pub(crate) fn get<T: Record>(&self, id: Uuid) -> Result<Option<T>, StoreError> {
        let tree = self.tree(T::TABLE)?;
        match tree.get(id.as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn put<T: Record>(&self, entity: &T) -> Result<(), StoreError> {
        let tree = self.tree(T::TABLE)?;
        tree.insert(entity.id().as_bytes(), serde_json::to_vec(entity)?)?;
        Ok(())
    }

    pub(crate) fn delete(&self, table: &str, id: Uuid) -> Result<(), StoreError> {
        let tree = self.tree(table)?;
        tree.remove(id.as_bytes())?;
        Ok(())
    }

    pub(crate) fn watermark(&self, table: &str) -> Result<f64, StoreError> {
        let tree = self.tree(SYNC_STATE_TREE)?;
        match tree.get(table.as_bytes())? {
            Some(value) => Ok(serde_json::from_slice(&value)?),
            None => Ok(0.0),
        }
    }

    pub(crate) fn set_watermark(&self, table: &str, ts: f64) -> Result<(), StoreError> {
        let tree = self.tree(SYNC_STATE_TREE)?;
        tree.insert(table.as_bytes(), serde_json::to_vec(&ts)?)?;
        Ok(())
    }
}
