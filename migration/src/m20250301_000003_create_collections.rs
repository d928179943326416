use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Collections::Table)
                    .if_not_exists()
                    .col(pk_auto(Collections::Id))
                    .col(integer(Collections::UserId))
                    .col(string(Collections::Name))
                    .col(text_null(Collections::Description))
                    .col(big_integer(Collections::CreatedAt))
                    .col(big_integer(Collections::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_collections_user")
                            .from(Collections::Table, Collections::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_collections_user_name")
                    .table(Collections::Table)
                    .col(Collections::UserId)
                    .col(Collections::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CollectionItems::Table)
                    .if_not_exists()
                    .col(pk_auto(CollectionItems::Id))
                    .col(integer(CollectionItems::CollectionId))
                    .col(integer(CollectionItems::ItemId))
                    .col(text_null(CollectionItems::Note))
                    .col(big_integer(CollectionItems::AddedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_collection_items_collection")
                            .from(CollectionItems::Table, CollectionItems::CollectionId)
                            .to(Collections::Table, Collections::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_collection_items_item")
                            .from(CollectionItems::Table, CollectionItems::ItemId)
                            .to(CatalogItems::Table, CatalogItems::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_collection_items_unique")
                    .table(CollectionItems::Table)
                    .col(CollectionItems::CollectionId)
                    .col(CollectionItems::ItemId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(CollectionItems::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Collections::Table).to_owned()).await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Collections {
    Table,
    Id,
    UserId,
    Name,
    Description,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum CollectionItems {
    Table,
    Id,
    CollectionId,
    ItemId,
    Note,
    AddedAt,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum CatalogItems {
    Table,
    Id,
}
