use reqwest::{
    Client, RequestBuilder, Response,
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Method,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;

#[derive(Debug, Error)]
pub enum SupabaseError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid header value: {0}")]
    Header(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Thin PostgREST / Storage / Functions client. Server-side calls authenticate
/// with the service key; the backend performs its own authorization.
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
    service_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
            service_key: config.service_key().to_string(),
        }
    }

    fn get_headers(&self, content_type: &str) -> Result<HeaderMap, SupabaseError> {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", header_value(&self.anon_key)?);
        headers.insert(CONTENT_TYPE, header_value(content_type)?);
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", self.service_key))?);

        Ok(headers)
    }

    fn builder(&self, method: Method, path: &str, content_type: &str) -> Result<RequestBuilder, SupabaseError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        Ok(self.client.request(method, &url).headers(self.get_headers(content_type)?))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, SupabaseError> {
        let response = request.send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response.text().await.unwrap_or_default();
        error!("API error ({}): {}", status, error_text);

        Err(match status.as_u16() {
            401 | 403 => SupabaseError::Auth(error_text),
            404 => SupabaseError::NotFound(error_text),
            409 => SupabaseError::Conflict(error_text),
            code => SupabaseError::Api { status: code, message: error_text },
        })
    }

    pub async fn request<T>(&self, method: Method, path: &str, body: Option<Value>) -> Result<T, SupabaseError>
    where
        T: DeserializeOwned,
    {
        let mut req = self.builder(method, path, "application/json")?;
        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = self.send(req).await?;
        Ok(response.json::<T>().await?)
    }

    /// Like `request`, but asks PostgREST to return the affected rows.
    pub async fn request_returning<T>(&self, method: Method, path: &str, body: Value) -> Result<Vec<T>, SupabaseError>
    where
        T: DeserializeOwned,
    {
        let req = self
            .builder(method, path, "application/json")?
            .header("Prefer", "return=representation")
            .json(&body);

        let response = self.send(req).await?;
        Ok(response.json::<Vec<T>>().await?)
    }

    pub async fn upload_object(
        &self,
        bucket: &str,
        object_path: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), SupabaseError> {
        let path = format!("/storage/v1/object/{}/{}", bucket, object_path);
        let req = self
            .builder(Method::POST, &path, content_type)?
            .header("x-upsert", "true")
            .body(data);

        self.send(req).await?;
        Ok(())
    }

    /// Returns the object's bytes and the content type the storage API reports.
    pub async fn download_object(
        &self,
        bucket: &str,
        object_path: &str,
    ) -> Result<(Vec<u8>, Option<String>), SupabaseError> {
        let path = format!("/storage/v1/object/{}/{}", bucket, object_path);
        let response = self.send(self.builder(Method::GET, &path, "application/json")?).await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?;

        Ok((bytes.to_vec(), content_type))
    }

    pub async fn invoke_function(&self, name: &str, body: Value) -> Result<(), SupabaseError> {
        let path = format!("/functions/v1/{}", name);
        let req = self.builder(Method::POST, &path, "application/json")?.json(&body);

        self.send(req).await?;
        Ok(())
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}

fn header_value(value: &str) -> Result<HeaderValue, SupabaseError> {
    HeaderValue::from_str(value).map_err(|e| SupabaseError::Header(e.to_string()))
}
