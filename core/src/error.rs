use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} already exists: {key}")]
    Conflict { entity: &'static str, key: String },
    #[error("{entity} {id} not found")]
    Missing { entity: &'static str, id: u64 },
    #[error("sled: {0}")]
    Sled(#[from] sled::Error),
    #[error("codec: {0}")]
    Codec(#[from] bincode::Error),
    #[error("meta: {0}")]
    Meta(#[from] serde_json::Error),
}
