use serde::{Deserialize, Serialize};

use imprint_core::{Actor, DomainError, DomainResult, Entity, ListItemId, RecordMeta, WarehouseId};

/// A physical or logical stock location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: WarehouseId,
    pub name_en: String,
    pub name_ar: String,
    /// Entry of the `warehouse_type` list.
    pub warehouse_type: Option<ListItemId>,
    pub location: String,
    pub meta: RecordMeta,
}

impl Entity for Warehouse {
    type Id = WarehouseId;
    const NAME: &'static str = "warehouse";

    fn id(&self) -> WarehouseId {
        self.id
    }

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWarehouse {
    pub name_en: String,
    #[serde(default)]
    pub name_ar: String,
    #[serde(default)]
    pub warehouse_type: Option<ListItemId>,
    #[serde(default)]
    pub location: String,
}

impl NewWarehouse {
    pub fn validate(&self) -> DomainResult<()> {
        if self.name_en.trim().is_empty() {
            return Err(DomainError::field("name_en", "name_en cannot be empty"));
        }
        Ok(())
    }

    pub fn into_warehouse(self, id: WarehouseId, actor: &Actor) -> Warehouse {
        Warehouse {
            id,
            name_en: self.name_en.trim().to_string(),
            name_ar: self.name_ar.trim().to_string(),
            warehouse_type: self.warehouse_type,
            location: self.location,
            meta: RecordMeta::created(actor),
        }
    }
}
