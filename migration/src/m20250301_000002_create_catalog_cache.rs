use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CatalogItems::Table)
                    .if_not_exists()
                    .col(pk_auto(CatalogItems::Id))
                    .col(string(CatalogItems::Source))
                    .col(string(CatalogItems::ExternalId))
                    .col(string_null(CatalogItems::Title))
                    .col(integer_null(CatalogItems::Year))
                    .col(string_null(CatalogItems::ImageUrl))
                    .col(string_null(CatalogItems::Creator))
                    .col(json(CatalogItems::Metadata))
                    .col(big_integer(CatalogItems::CachedAt))
                    .col(big_integer(CatalogItems::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_catalog_items_source_external_id")
                    .table(CatalogItems::Table)
                    .col(CatalogItems::Source)
                    .col(CatalogItems::ExternalId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_catalog_items_creator")
                    .table(CatalogItems::Table)
                    .col(CatalogItems::Source)
                    .col(CatalogItems::Creator)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Directors::Table)
                    .if_not_exists()
                    .col(pk_auto(Directors::Id))
                    .col(string_uniq(Directors::ExternalId))
                    .col(string(Directors::Name))
                    .col(text_null(Directors::Bio))
                    .col(big_integer(Directors::CachedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_directors_name")
                    .table(Directors::Table)
                    .col(Directors::Name)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Directors::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(CatalogItems::Table).to_owned()).await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum CatalogItems {
    Table,
    Id,
    Source,
    ExternalId,
    Title,
    Year,
    ImageUrl,
    Creator,
    Metadata,
    CachedAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Directors {
    Table,
    Id,
    ExternalId,
    Name,
    Bio,
    CachedAt,
}
