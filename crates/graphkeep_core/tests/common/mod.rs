#![allow(dead_code)]

use graphkeep_core::{
    Context, Coordinator, Entity, Field, QuerySpec, Record, StoreConfig, StoreResult,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub uid: String,
    pub name: String,
    pub rank: i64,
    pub folder: Option<String>,
}

impl Item {
    pub const UID: Field<Item, String> = Field::unique_id();
    pub const NAME: Field<Item, String> = Field::new("name");
    pub const RANK: Field<Item, i64> = Field::new("rank");
    pub const FOLDER: Field<Item, Option<String>> = Field::new("folder");

    pub fn new(uid: &str, name: &str, rank: i64) -> Self {
        Self {
            uid: uid.to_string(),
            name: name.to_string(),
            rank,
            folder: None,
        }
    }

    pub fn in_folder(mut self, folder: &str) -> Self {
        self.folder = Some(folder.to_string());
        self
    }
}

impl Entity for Item {
    fn unique_id(&self) -> Option<&str> {
        Some(&self.uid)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    pub uid: String,
    pub title: String,
}

impl Folder {
    pub const UID: Field<Folder, String> = Field::unique_id();

    pub fn new(uid: &str, title: &str) -> Self {
        Self {
            uid: uid.to_string(),
            title: title.to_string(),
        }
    }
}

impl Entity for Folder {
    fn unique_id(&self) -> Option<&str> {
        Some(&self.uid)
    }

    fn prepare_for_deletion(&self, context: &mut Context) -> StoreResult<()> {
        let children = context.get_all(&QuerySpec::filter(Item::FOLDER.eq(self.uid.clone())))?;
        for child in &children {
            context.delete(child)?;
        }
        Ok(())
    }
}

pub fn memory_coordinator() -> Coordinator {
    Coordinator::open(
        StoreConfig::in_memory()
            .register::<Item>()
            .register::<Folder>(),
    )
}

/// Inserts and saves `items` through one background context.
pub fn seed(coordinator: &Coordinator, items: Vec<Item>) -> Vec<Record<Item>> {
    let mut context = coordinator.background_context();
    let records = items
        .into_iter()
        .map(|item| context.insert(item).unwrap())
        .collect();
    context.save().unwrap();
    records
}

pub fn sorted_uids(records: &[Record<Item>]) -> Vec<String> {
    let mut uids: Vec<String> = records.iter().map(|record| record.uid.clone()).collect();
    uids.sort();
    uids
}
