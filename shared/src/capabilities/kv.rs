use crux_kv::error::KeyValueError;
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;
use thiserror::Error;

pub const MAX_KEY_LENGTH: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KvKey {
    namespace: KeyNamespace,
    key: String,
}

impl KvKey {
    pub fn new(namespace: KeyNamespace, key: impl Into<String>) -> Result<Self, KvError> {
        let key = key.into();
        Self::validate_key(&key)?;
        Ok(Self { namespace, key })
    }

    /// The shell-visible key, `namespace:key`.
    pub fn raw(&self) -> String {
        format!("{}:{}", self.namespace.prefix(), self.key)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn validate_key(key: &str) -> Result<(), KvError> {
        let invalid = |reason: &str| KvError::InvalidKey {
            key: key.chars().take(50).collect(),
            reason: reason.to_string(),
        };

        if key.trim().is_empty() {
            return Err(invalid("key cannot be empty"));
        }
        if key.len() > MAX_KEY_LENGTH {
            return Err(invalid("key exceeds maximum length"));
        }
        if key.contains(':') {
            return Err(invalid("key cannot contain the namespace separator"));
        }
        if key.chars().any(char::is_control) {
            return Err(invalid("key contains control characters"));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyNamespace {
    Session,
}

impl KeyNamespace {
    pub fn prefix(self) -> &'static str {
        match self {
            KeyNamespace::Session => "session",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KvError {
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<KeyValueError> for KvError {
    fn from(e: KeyValueError) -> Self {
        Self::Storage(e.to_string())
    }
}

/// JSON codec for one value type stored under a namespace.
pub struct TypedKvStore<T> {
    key: KvKey,
    _phantom: PhantomData<T>,
}

impl<T: Serialize + DeserializeOwned> TypedKvStore<T> {
    pub fn new(namespace: KeyNamespace, key: impl Into<String>) -> Result<Self, KvError> {
        Ok(Self {
            key: KvKey::new(namespace, key)?,
            _phantom: PhantomData,
        })
    }

    pub fn raw_key(&self) -> String {
        self.key.raw()
    }

    pub fn encode(&self, value: &T) -> Result<Vec<u8>, KvError> {
        serde_json::to_vec(value).map_err(|e| KvError::Serialization(e.to_string()))
    }

    /// `None` when nothing is stored under the key.
    pub fn decode(&self, bytes: Option<&[u8]>) -> Result<Option<T>, KvError> {
        bytes
            .map(|b| serde_json::from_slice(b).map_err(|e| KvError::Serialization(e.to_string())))
            .transpose()
    }
}
