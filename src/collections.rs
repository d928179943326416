//! Per-user collections of cached catalog items. Every lookup is scoped to
//! the owner, so another user's collection is indistinguishable from a
//! missing one.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use tracing::info;

use crate::{
    entities::{catalog_item, collection, collection_item},
    error::{AppError, AppResult, is_unique_violation},
    models::{
        AddItemRequest, CollectionDetailView, CollectionItemView, CreateCollectionRequest,
        UpdateCollectionRequest, now_sec,
    },
};

const COLLECTION_NOT_FOUND: &str = "Collection not found";
const ITEM_NOT_IN_COLLECTION: &str = "Item not found in collection";

#[derive(Clone)]
pub struct CollectionStore {
    db: DatabaseConnection,
}

impl CollectionStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn list(&self, owner: i32) -> AppResult<Vec<collection::Model>> {
        let rows = collection::Entity::find()
            .filter(collection::Column::UserId.eq(owner))
            .order_by_asc(collection::Column::Id)
            .all(&self.db)
            .await?;
        Ok(rows)
    }

    pub async fn create(&self, owner: i32, req: &CreateCollectionRequest) -> AppResult<collection::Model> {
        let name = checked_name(&req.name)?;
        let now = now_sec();

        let model = collection::ActiveModel {
            user_id: Set(owner),
            name: Set(name),
            description: Set(req.description.clone()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let created = model.insert(&self.db).await.map_err(name_conflict)?;
        info!(collection_id = created.id, user_id = owner, "created collection");
        Ok(created)
    }

    /// The collection if it exists and belongs to `owner`.
    pub async fn get(&self, owner: i32, id: i32) -> AppResult<collection::Model> {
        collection::Entity::find_by_id(id)
            .filter(collection::Column::UserId.eq(owner))
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::not_found(COLLECTION_NOT_FOUND))
    }

    pub async fn detail(&self, owner: i32, id: i32) -> AppResult<CollectionDetailView> {
        let collection = self.get(owner, id).await?;

        let items = collection_item::Entity::find()
            .filter(collection_item::Column::CollectionId.eq(collection.id))
            .order_by_asc(collection_item::Column::AddedAt)
            .order_by_asc(collection_item::Column::Id)
            .find_also_related(catalog_item::Entity)
            .all(&self.db)
            .await?
            .into_iter()
            .filter_map(|(entry, item)| item.map(|item| CollectionItemView::from((entry, item))))
            .collect();

        Ok(CollectionDetailView { collection: collection.into(), items })
    }

    pub async fn update(
        &self,
        owner: i32,
        id: i32,
        req: &UpdateCollectionRequest,
    ) -> AppResult<collection::Model> {
        let existing = self.get(owner, id).await?;
        let mut active = existing.into_active_model();

        if let Some(name) = &req.name {
            active.name = Set(checked_name(name)?);
        }
        if let Some(description) = &req.description {
            active.description = Set(Some(description.clone()));
        }
        active.updated_at = Set(now_sec());

        active.update(&self.db).await.map_err(name_conflict)
    }

    /// Deletes the collection together with its item links.
    pub async fn delete(&self, owner: i32, id: i32) -> AppResult<()> {
        let collection = self.get(owner, id).await?;

        let txn = self.db.begin().await?;
        collection_item::Entity::delete_many()
            .filter(collection_item::Column::CollectionId.eq(collection.id))
            .exec(&txn)
            .await?;
        collection::Entity::delete_by_id(collection.id).exec(&txn).await?;
        txn.commit().await?;

        info!(collection_id = id, user_id = owner, "deleted collection");
        Ok(())
    }

    pub async fn add_item(
        &self,
        owner: i32,
        id: i32,
        req: &AddItemRequest,
    ) -> AppResult<CollectionItemView> {
        let collection = self.get(owner, id).await?;
        let item = catalog_item::Entity::find_by_id(req.item_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::not_found("Item not found"))?;

        let entry = collection_item::ActiveModel {
            collection_id: Set(collection.id),
            item_id: Set(item.id),
            note: Set(req.note.clone()),
            added_at: Set(now_sec()),
            ..Default::default()
        };

        let entry = entry.insert(&self.db).await.map_err(|err| {
            if is_unique_violation(&err) {
                AppError::conflict("Item already in collection")
            } else {
                err.into()
            }
        })?;

        Ok((entry, item).into())
    }

    pub async fn update_item(
        &self,
        owner: i32,
        id: i32,
        item_id: i32,
        note: Option<String>,
    ) -> AppResult<CollectionItemView> {
        let entry = self.entry(owner, id, item_id).await?;
        let mut active = entry.into_active_model();
        active.note = Set(note);
        let entry = active.update(&self.db).await?;

        let item = catalog_item::Entity::find_by_id(entry.item_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::not_found(ITEM_NOT_IN_COLLECTION))?;
        Ok((entry, item).into())
    }

    pub async fn remove_item(&self, owner: i32, id: i32, item_id: i32) -> AppResult<()> {
        let entry = self.entry(owner, id, item_id).await?;
        collection_item::Entity::delete_by_id(entry.id).exec(&self.db).await?;
        Ok(())
    }

    async fn entry(&self, owner: i32, id: i32, item_id: i32) -> AppResult<collection_item::Model> {
        let collection = self.get(owner, id).await?;
        collection_item::Entity::find()
            .filter(collection_item::Column::CollectionId.eq(collection.id))
            .filter(collection_item::Column::ItemId.eq(item_id))
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::not_found(ITEM_NOT_IN_COLLECTION))
    }
}

fn checked_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation("collection name must not be empty"));
    }
    Ok(name.to_string())
}

fn name_conflict(err: sea_orm::DbErr) -> AppError {
    if is_unique_violation(&err) {
        AppError::conflict("A collection with that name already exists")
    } else {
        err.into()
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::PaginatorTrait;

    use super::*;
    use crate::{
        auth::{register_user, tests::register_request},
        cache::tests::{TTLS, record},
        cache::CacheManager,
        db::test_db,
        models::Source,
    };

    struct Fixture {
        store: CollectionStore,
        cache: CacheManager,
        alice: i32,
        bob: i32,
    }

    async fn fixture() -> Fixture {
        let db = test_db().await;
        let alice = register_user(&db, &register_request("alice")).await.unwrap().id;
        let bob = register_user(&db, &register_request("bob")).await.unwrap().id;
        Fixture { store: CollectionStore::new(db.clone()), cache: CacheManager::new(db, TTLS), alice, bob }
    }

    fn named(name: &str) -> CreateCollectionRequest {
        CreateCollectionRequest { name: name.to_string(), description: None }
    }

    #[tokio::test]
    async fn adding_same_item_twice_conflicts() {
        let f = fixture().await;
        let item = f.cache.upsert_item(Source::Dfi, &record("1", "Jagten")).await.unwrap();
        let coll = f.store.create(f.alice, &named("Danske film")).await.unwrap();
        let add = AddItemRequest { item_id: item.id, note: Some("Se igen".into()) };

        let view = f.store.add_item(f.alice, coll.id, &add).await.unwrap();
        assert_eq!(view.item.external_id, "1");
        assert_eq!(view.note.as_deref(), Some("Se igen"));

        let again = f.store.add_item(f.alice, coll.id, &add).await;
        assert!(matches!(again, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn other_users_collection_is_not_found() {
        let f = fixture().await;
        let item = f.cache.upsert_item(Source::Smk, &record("KMS1", "Amager")).await.unwrap();
        let coll = f.store.create(f.alice, &named("Favoritter")).await.unwrap();
        let add = AddItemRequest { item_id: item.id, note: None };

        assert!(matches!(f.store.get(f.bob, coll.id).await, Err(AppError::NotFound(_))));
        assert!(matches!(f.store.detail(f.bob, coll.id).await, Err(AppError::NotFound(_))));
        assert!(matches!(
            f.store.update(f.bob, coll.id, &UpdateCollectionRequest::default()).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(f.store.add_item(f.bob, coll.id, &add).await, Err(AppError::NotFound(_))));
        assert!(matches!(f.store.delete(f.bob, coll.id).await, Err(AppError::NotFound(_))));
        assert!(f.store.list(f.bob).await.unwrap().is_empty());

        // still intact for the owner
        assert_eq!(f.store.get(f.alice, coll.id).await.unwrap().name, "Favoritter");
    }

    #[tokio::test]
    async fn names_are_unique_per_owner() {
        let f = fixture().await;
        f.store.create(f.alice, &named("Film")).await.unwrap();

        assert!(matches!(f.store.create(f.alice, &named("Film")).await, Err(AppError::Conflict(_))));
        assert!(f.store.create(f.bob, &named("Film")).await.is_ok());
        assert!(matches!(f.store.create(f.alice, &named("  ")).await, Err(AppError::Validation(_))));

        let other = f.store.create(f.alice, &named("Kunst")).await.unwrap();
        let rename = UpdateCollectionRequest { name: Some("Film".into()), description: None };
        assert!(matches!(f.store.update(f.alice, other.id, &rename).await, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn partial_update_keeps_other_fields() {
        let f = fixture().await;
        let coll = f
            .store
            .create(f.alice, &CreateCollectionRequest { name: "Film".into(), description: Some("gamle".into()) })
            .await
            .unwrap();

        let renamed = f
            .store
            .update(f.alice, coll.id, &UpdateCollectionRequest { name: Some("Klassikere".into()), description: None })
            .await
            .unwrap();

        assert_eq!(renamed.name, "Klassikere");
        assert_eq!(renamed.description.as_deref(), Some("gamle"));
    }

    #[tokio::test]
    async fn item_note_update_and_removal() {
        let f = fixture().await;
        let item = f.cache.upsert_item(Source::Dfi, &record("1", "Festen")).await.unwrap();
        let coll = f.store.create(f.alice, &named("Dogme")).await.unwrap();
        f.store.add_item(f.alice, coll.id, &AddItemRequest { item_id: item.id, note: None }).await.unwrap();

        let updated =
            f.store.update_item(f.alice, coll.id, item.id, Some("Dogme #1".into())).await.unwrap();
        assert_eq!(updated.note.as_deref(), Some("Dogme #1"));

        f.store.remove_item(f.alice, coll.id, item.id).await.unwrap();
        assert!(matches!(
            f.store.remove_item(f.alice, coll.id, item.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(f.store.detail(f.alice, coll.id).await.unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn unknown_catalog_item_is_not_found() {
        let f = fixture().await;
        let coll = f.store.create(f.alice, &named("Tom")).await.unwrap();
        let add = AddItemRequest { item_id: 999, note: None };
        assert!(matches!(f.store.add_item(f.alice, coll.id, &add).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn delete_removes_item_links() {
        let f = fixture().await;
        let item = f.cache.upsert_item(Source::Dfi, &record("1", "Jagten")).await.unwrap();
        let coll = f.store.create(f.alice, &named("Slettes")).await.unwrap();
        f.store.add_item(f.alice, coll.id, &AddItemRequest { item_id: item.id, note: None }).await.unwrap();

        f.store.delete(f.alice, coll.id).await.unwrap();

        assert!(matches!(f.store.get(f.alice, coll.id).await, Err(AppError::NotFound(_))));
        let links = collection_item::Entity::find().count(f.cache.db()).await.unwrap();
        assert_eq!(links, 0);
        // the cached catalog row is shared and stays
        assert!(f.cache.get_item_by_id(item.id).await.unwrap().is_some());
    }
}
