use serde::{Serialize, Deserialize};
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub category: Option<String>,
    pub quantity: Decimal,        // >= 0, moved by stock movements or edits
    pub unit: String,
    pub unit_cost: Decimal,
    pub minimum_stock: Decimal,
    pub project_id: Option<i32>,
    pub supplier: Option<String>,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// Low stock as soon as the quantity reaches the minimum
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.minimum_stock
    }

    pub fn stock_value(&self) -> Decimal {
        self.quantity * self.unit_cost
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::project::Entity",
        from = "Column::ProjectId",
        to = "super::project::Column::Id",
        on_delete = "SetNull"
    )]
    Project,

    #[sea_orm(has_many = "super::inventory_movement::Entity")]
    InventoryMovement,
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl Related<super::inventory_movement::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InventoryMovement.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
