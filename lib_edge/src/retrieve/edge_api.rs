//! # Edge REST API
//!
//! Typed access to the edge server's collections. Every collection supports
//! `GET`/`POST` on its own path and `GET`/`PATCH`/`PUT`/`DELETE` on
//! `<path>/<id>`. `PATCH` bodies are partial JSON objects; `PUT` replaces a
//! sub-resource wholesale.

use std::fmt;

use reqwest::Method;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::retrieve::ky_http::{ApiClient, ApiError};

/// A collection endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Collection {
    Headsets,
    Locations,
    /// Headsets checked in at one location.
    LocationHeadsets(String),
    Features(String),
    Layers(String),
    Photos,
    Incidents,
    Users,
    Streams,
    Websockets,
}

impl Collection {
    pub fn path(&self) -> String {
        match self {
            Collection::Headsets => "/headsets".to_string(),
            Collection::Locations => "/locations".to_string(),
            Collection::LocationHeadsets(loc) => format!("/locations/{loc}/headsets"),
            Collection::Features(loc) => format!("/locations/{loc}/features"),
            Collection::Layers(loc) => format!("/locations/{loc}/layers"),
            Collection::Photos => "/photos".to_string(),
            Collection::Incidents => "/incidents".to_string(),
            Collection::Users => "/users".to_string(),
            Collection::Streams => "/streams".to_string(),
            Collection::Websockets => "/websockets".to_string(),
        }
    }

    pub fn item_path(&self, id: &str) -> String {
        format!("{}/{id}", self.path())
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// The edge server's REST surface.
#[derive(Clone)]
pub struct EdgeApi {
    client: ApiClient,
}

impl EdgeApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Connects to `base_url` with the default of three retries.
    pub fn connect(base_url: &str, auth_token: Option<String>) -> Result<Self, ApiError> {
        Ok(Self::new(ApiClient::new(base_url, auth_token, 3)?))
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    async fn call<T, B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.client
            .request::<T, B>(method, path, None, body)
            .await?
            .into_result()
    }

    pub async fn list<T: DeserializeOwned>(&self, collection: &Collection) -> Result<Vec<T>, ApiError> {
        self.call::<_, Value>(Method::GET, &collection.path(), None).await
    }

    pub async fn get<T: DeserializeOwned>(&self, collection: &Collection, id: &str) -> Result<T, ApiError> {
        self.call::<_, Value>(Method::GET, &collection.item_path(id), None).await
    }

    pub async fn create<T, B>(&self, collection: &Collection, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.call(Method::POST, &collection.path(), Some(body)).await
    }

    /// Updates only the fields present in `fields`.
    pub async fn patch<T: DeserializeOwned>(
        &self,
        collection: &Collection,
        id: &str,
        fields: &Value,
    ) -> Result<T, ApiError> {
        self.call(Method::PATCH, &collection.item_path(id), Some(fields)).await
    }

    /// Replaces the item (or a sub-resource path below it) wholesale.
    pub async fn replace<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.call(Method::PUT, path, Some(body)).await
    }

    pub async fn delete(&self, collection: &Collection, id: &str) -> Result<(), ApiError> {
        self.call::<Value, Value>(Method::DELETE, &collection.item_path(id), None)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_paths() {
        assert_eq!(Collection::Headsets.path(), "/headsets");
        assert_eq!(Collection::Features("L1".into()).path(), "/locations/L1/features");
        assert_eq!(
            Collection::Layers("L1".into()).item_path("7"),
            "/locations/L1/layers/7"
        );
        assert_eq!(Collection::LocationHeadsets("L2".into()).to_string(), "/locations/L2/headsets");
    }
}
