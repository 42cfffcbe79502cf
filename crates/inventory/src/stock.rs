use serde::{Deserialize, Serialize};

use imprint_core::{
    Actor, DomainError, DomainResult, Entity, InventoryId, ProductId, RecordMeta, WarehouseId,
};

/// Stock of one product in one warehouse. Unique per `(product_id, warehouse_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub id: InventoryId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: i32,
    pub meta: RecordMeta,
}

impl InventoryRecord {
    pub fn from_line(id: InventoryId, line: InventoryLine, actor: &Actor) -> Self {
        Self {
            id,
            product_id: line.product_id,
            warehouse_id: line.warehouse_id,
            quantity: line.quantity,
            meta: RecordMeta::created(actor),
        }
    }

    pub fn key(&self) -> (ProductId, WarehouseId) {
        (self.product_id, self.warehouse_id)
    }

    pub fn set_quantity(&mut self, quantity: i32, actor: &Actor) {
        self.quantity = quantity;
        self.meta.touch(actor);
    }
}

impl Entity for InventoryRecord {
    type Id = InventoryId;
    const NAME: &'static str = "inventory";

    fn id(&self) -> InventoryId {
        self.id
    }

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }
}

/// Raw bulk-upsert row as received. Every field is optional so that a missing
/// column is reported as a field error rather than a parse failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryUpsertRow {
    #[serde(default)]
    pub product_id: Option<ProductId>,
    #[serde(default)]
    pub warehouse_id: Option<WarehouseId>,
    #[serde(default)]
    pub quantity: Option<i32>,
}

/// A validated upsert row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InventoryLine {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: i32,
}

impl InventoryUpsertRow {
    pub fn validate(&self) -> DomainResult<InventoryLine> {
        let product_id = self
            .product_id
            .ok_or_else(|| DomainError::field("product_id", "product_id is required"))?;
        let warehouse_id = self
            .warehouse_id
            .ok_or_else(|| DomainError::field("warehouse_id", "warehouse_id is required"))?;
        let quantity = self
            .quantity
            .ok_or_else(|| DomainError::field("quantity", "quantity is required"))?;
        if quantity < 0 {
            return Err(DomainError::field("quantity", "quantity cannot be negative"));
        }
        Ok(InventoryLine {
            product_id,
            warehouse_id,
            quantity,
        })
    }
}
