use anyhow::anyhow;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    sea_query::OnConflict,
};

use crate::{
    entities::{catalog_item, director},
    error::AppResult,
    models::{CatalogRecord, DirectorRecord, Source, now_sec},
};

#[derive(Clone, Copy, Debug)]
pub struct CacheTtls {
    pub film_days: i64,
    pub director_days: i64,
    pub art_days: i64,
}

#[derive(Clone)]
pub struct CacheManager {
    db: DatabaseConnection,
    ttls: CacheTtls,
}

impl CacheManager {
    pub fn new(db: DatabaseConnection, ttls: CacheTtls) -> Self {
        Self { db, ttls }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub async fn get_item(
        &self,
        source: Source,
        external_id: &str,
    ) -> AppResult<Option<catalog_item::Model>> {
        let item = catalog_item::Entity::find()
            .filter(catalog_item::Column::Source.eq(source.as_code()))
            .filter(catalog_item::Column::ExternalId.eq(external_id))
            .one(&self.db)
            .await?;
        Ok(item)
    }

    pub async fn get_item_by_id(&self, id: i32) -> AppResult<Option<catalog_item::Model>> {
        Ok(catalog_item::Entity::find_by_id(id).one(&self.db).await?)
    }

    pub async fn items_by_creator(
        &self,
        source: Source,
        creator: &str,
    ) -> AppResult<Vec<catalog_item::Model>> {
        let items = catalog_item::Entity::find()
            .filter(catalog_item::Column::Source.eq(source.as_code()))
            .filter(catalog_item::Column::Creator.eq(creator))
            .order_by_asc(catalog_item::Column::Year)
            .all(&self.db)
            .await?;
        Ok(items)
    }

    pub async fn upsert_item(
        &self,
        source: Source,
        record: &CatalogRecord,
    ) -> AppResult<catalog_item::Model> {
        self.upsert_item_at(source, record, now_sec()).await
    }

    /// Insert-or-update keyed on `(source, external_id)`, so two writers racing
    /// on the same miss both land on one row.
    pub async fn upsert_item_at(
        &self,
        source: Source,
        record: &CatalogRecord,
        cached_at: i64,
    ) -> AppResult<catalog_item::Model> {
        let model = catalog_item::ActiveModel {
            id: Default::default(),
            source: Set(source.as_code().to_string()),
            external_id: Set(record.external_id.clone()),
            title: Set(record.title.clone()),
            year: Set(record.year),
            image_url: Set(record.image_url.clone()),
            creator: Set(record.creator.clone()),
            metadata: Set(record.metadata.clone()),
            cached_at: Set(cached_at),
            created_at: Set(cached_at),
        };

        catalog_item::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    catalog_item::Column::Source,
                    catalog_item::Column::ExternalId,
                ])
                .update_columns([
                    catalog_item::Column::Title,
                    catalog_item::Column::Year,
                    catalog_item::Column::ImageUrl,
                    catalog_item::Column::Creator,
                    catalog_item::Column::Metadata,
                    catalog_item::Column::CachedAt,
                ])
                .to_owned(),
            )
            .exec(&self.db)
            .await?;

        self.get_item(source, &record.external_id)
            .await?
            .ok_or_else(|| anyhow!("catalog row {} missing after upsert", record.external_id).into())
    }

    pub async fn get_director(&self, external_id: &str) -> AppResult<Option<director::Model>> {
        let found = director::Entity::find()
            .filter(director::Column::ExternalId.eq(external_id))
            .one(&self.db)
            .await?;
        Ok(found)
    }

    pub async fn get_director_by_id(&self, id: i32) -> AppResult<Option<director::Model>> {
        Ok(director::Entity::find_by_id(id).one(&self.db).await?)
    }

    pub async fn upsert_director(&self, record: &DirectorRecord) -> AppResult<director::Model> {
        self.upsert_director_at(record, now_sec()).await
    }

    pub async fn upsert_director_at(
        &self,
        record: &DirectorRecord,
        cached_at: i64,
    ) -> AppResult<director::Model> {
        let model = director::ActiveModel {
            id: Default::default(),
            external_id: Set(record.external_id.clone()),
            name: Set(record.name.clone()),
            bio: Set(record.bio.clone()),
            cached_at: Set(cached_at),
        };

        director::Entity::insert(model)
            .on_conflict(
                OnConflict::column(director::Column::ExternalId)
                    .update_columns([
                        director::Column::Name,
                        director::Column::Bio,
                        director::Column::CachedAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;

        self.get_director(&record.external_id)
            .await?
            .ok_or_else(|| anyhow!("director row {} missing after upsert", record.external_id).into())
    }

    pub fn is_item_fresh(&self, item: &catalog_item::Model) -> bool {
        match Source::from_code(&item.source) {
            Some(source) => self.is_fresh(item.cached_at, self.ttl_days(source)),
            None => false,
        }
    }

    pub fn is_director_fresh(&self, director: &director::Model) -> bool {
        self.is_fresh(director.cached_at, self.ttls.director_days)
    }

    fn ttl_days(&self, source: Source) -> i64 {
        match source {
            Source::Dfi => self.ttls.film_days,
            Source::Smk => self.ttls.art_days,
        }
    }

    fn is_fresh(&self, cached_at: i64, ttl_days: i64) -> bool {
        now_sec().saturating_sub(cached_at) < ttl_days.saturating_mul(86_400)
    }
}
