use sea_orm::entity::prelude::*;

/// One cached upstream record. `(source, external_id)` is unique.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "catalog_items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub source: String,
    pub external_id: String,
    pub title: Option<String>,
    pub year: Option<i32>,
    pub image_url: Option<String>,
    pub creator: Option<String>,
    pub metadata: Json,
    pub cached_at: i64,
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::collection_item::Entity")]
    CollectionItem,
}

impl Related<super::collection_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CollectionItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
