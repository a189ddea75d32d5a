//! MongoDB-backed record source
//!
//! Each page is one `find` with a `{_id: {$gt: last}}` clause, an ascending
//! `_id` sort and a limit. The driver cursor is drained into a page and
//! dropped before the page is returned, so no server cursor outlives a
//! fetch.

use async_trait::async_trait;
use bson::{Document, doc};
use futures::TryStreamExt;
use mongodb::Collection;
use tracing::debug;

use crate::error::QueryError;
use crate::schema::ID_FIELD;

use super::{PageRequest, RecordSource};

/// Record source reading one collection
pub struct MongoRecordSource {
    collection: Collection<Document>,
    /// Restricts the collection to one record type, if it holds several
    type_filter: Option<Document>,
}

impl MongoRecordSource {
    /// Read every document of `collection`
    pub fn new(collection: Collection<Document>) -> Self {
        Self {
            collection,
            type_filter: None,
        }
    }

    /// Read only documents whose `type` field equals `type_name`
    pub fn for_type(collection: Collection<Document>, type_name: &str) -> Self {
        Self {
            collection,
            type_filter: Some(doc! { "type": type_name }),
        }
    }

    fn filter_for(&self, request: &PageRequest) -> Document {
        let query = request.query();
        match &self.type_filter {
            Some(type_filter) if query.is_empty() => type_filter.clone(),
            Some(type_filter) => doc! { "$and": [type_filter.clone(), query] },
            None => query,
        }
    }
}

#[async_trait]
impl RecordSource for MongoRecordSource {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<Document>, QueryError> {
        let filter = self.filter_for(request);
        let limit = i64::try_from(request.limit)
            .map_err(|_| QueryError::InvalidFilter(format!("limit {} too large", request.limit)))?;

        debug!(
            collection = %self.collection.name(),
            after = %request.after,
            limit,
            "Fetching page"
        );

        let cursor = self
            .collection
            .find(filter)
            .sort(doc! { ID_FIELD: 1 })
            .limit(limit)
            .batch_size(u32::try_from(limit).unwrap_or(u32::MAX))
            .await?;

        let page: Vec<Document> = cursor.try_collect().await?;

        debug!("Fetched page of {} documents", page.len());
        Ok(page)
    }
}
