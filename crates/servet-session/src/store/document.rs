//! Document-store backend over MongoDB.
//!
//! Records live in a `sessions` collection as `{identityHash, info}`, with
//! `info` holding the same hex ciphertext the relational backend stores.

use async_trait::async_trait;
use mongodb::bson::{Bson, doc};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, IndexModel};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::BackendKind;
use crate::error::Result;
use crate::hasher::IdentityHash;
use crate::store::{SessionBackend, SessionRecord};

const COLLECTION: &str = "sessions";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionDocument {
    #[serde(rename = "identityHash")]
    identity_hash: String,
    info: String,
}

/// MongoDB-backed session collection.
#[derive(Debug, Clone)]
pub struct DocumentBackend {
    client: Client,
    collection: Collection<SessionDocument>,
}

impl DocumentBackend {
    /// Connect to `uri` and use the `sessions` collection of `database`.
    ///
    /// Ensures a unique index on `identityHash` so the store can rely on
    /// one document per identity.
    pub async fn connect(uri: &str, database: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri).await?;
        let collection = client
            .database(database)
            .collection::<SessionDocument>(COLLECTION);

        let index = IndexModel::builder()
            .keys(doc! { "identityHash": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        collection.create_index(index).await?;

        info!(database = %database, "Connected to document store");
        Ok(Self { client, collection })
    }
}

#[async_trait]
impl SessionBackend for DocumentBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::DocumentStore
    }

    async fn put(&self, record: &SessionRecord) -> Result<()> {
        let document = SessionDocument {
            identity_hash: record.identity_hash.as_str().to_string(),
            info: record.encrypted_payload.clone(),
        };
        self.collection
            .replace_one(doc! { "identityHash": &document.identity_hash }, &document)
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn get(&self, identity: &IdentityHash) -> Result<Option<String>> {
        let found = self
            .collection
            .find_one(doc! { "identityHash": identity.as_str() })
            .await?;
        Ok(found.map(|d| d.info))
    }

    async fn remove(&self, identity: &IdentityHash) -> Result<bool> {
        let result = self
            .collection
            .delete_one(doc! { "identityHash": identity.as_str() })
            .await?;
        Ok(result.deleted_count > 0)
    }

    async fn identities(&self) -> Result<Vec<IdentityHash>> {
        let values = self.collection.distinct("identityHash", doc! {}).await?;
        Ok(values
            .into_iter()
            .filter_map(|value| match value {
                Bson::String(hash) => Some(IdentityHash::from_hex(hash)),
                _ => None,
            })
            .collect())
    }

    async fn close(&self) -> Result<()> {
        self.client.clone().shutdown().await;
        debug!("Closed document store connection");
        Ok(())
    }
}
