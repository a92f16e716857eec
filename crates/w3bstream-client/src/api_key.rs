use std::fmt::Debug;
use std::sync::Arc;
use std::{future::Future, pin::Pin};
use tokio::sync::OnceCell;

use crate::errors::TransportError;

pub type ApiKeyResolverFn =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = String> + Send>> + Send + Sync>;

/// Source of the bearer token sent with every request.
///
/// A dynamic key is resolved on the first dispatch and cached afterwards, so
/// a secret fetched from a vault does not delay client construction.
#[derive(Clone)]
pub enum ApiKeyFactory {
    Static(String),
    Dynamic {
        resolver_fn: ApiKeyResolverFn,
        api_key: Arc<OnceCell<String>>,
    },
}

impl ApiKeyFactory {
    pub fn new(api_key: &str) -> Self {
        Self::Static(api_key.to_string())
    }

    pub fn new_from_resolver(resolver_fn: ApiKeyResolverFn) -> Self {
        Self::Dynamic {
            resolver_fn,
            api_key: Arc::new(OnceCell::new()),
        }
    }

    /// Static keys can be checked up front; dynamic ones only once resolved.
    pub(crate) fn is_statically_empty(&self) -> bool {
        matches!(self, Self::Static(key) if key.is_empty())
    }

    pub async fn get_api_key(&self) -> Result<&str, TransportError> {
        let key = match self {
            Self::Static(api_key) => api_key.as_str(),
            Self::Dynamic {
                resolver_fn,
                api_key,
            } => api_key
                .get_or_init(|| async { (resolver_fn)().await })
                .await
                .as_str(),
        };
        if key.is_empty() {
            return Err(TransportError::ApiKey("api key is empty".to_string()));
        }
        Ok(key)
    }
}

impl Debug for ApiKeyFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ApiKeyFactory")
    }
}
