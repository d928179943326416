pub mod catalog_item;
pub mod collection;
pub mod collection_item;
pub mod director;
pub mod user;
