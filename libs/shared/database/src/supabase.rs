use anyhow::Result;
use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;

const UNIQUE_VIOLATION: &str = "23505";

/// A non-2xx PostgREST response, kept typed so callers can react to constraint violations.
#[derive(Debug, Clone, Error)]
#[error("API error ({status}): {message}")]
pub struct PostgrestError {
    pub status: u16,
    pub code: Option<String>,
    pub message: String,
    pub details: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostgrestBody {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
}

impl PostgrestError {
    pub fn from_response(status: u16, body: &str) -> Self {
        match serde_json::from_str::<PostgrestBody>(body) {
            Ok(parsed) => Self {
                status,
                code: parsed.code,
                message: parsed.message.unwrap_or_else(|| body.to_string()),
                details: parsed.details,
            },
            Err(_) => Self {
                status,
                code: None,
                message: body.to_string(),
                details: None,
            },
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        self.code.as_deref() == Some(UNIQUE_VIOLATION) || self.status == 409
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self.status, 401 | 403)
    }

    /// Name of the violated constraint, e.g. `token_ledger_partition_key`.
    pub fn constraint(&self) -> Option<&str> {
        let start = self.message.find("constraint \"")? + "constraint \"".len();
        let rest = &self.message[start..];
        let end = rest.find('"')?;
        Some(&rest[..end])
    }
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    api_key: String,
    service_token: Option<String>,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.clone(),
            api_key: config.supabase_anon_key.clone(),
            service_token: None,
        }
    }

    /// Client authenticated with the service role; used for server-side booking writes.
    pub fn service(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.clone(),
            api_key: config.supabase_service_role_key.clone(),
            service_token: Some(config.supabase_service_role_key.clone()),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Ok(key) = HeaderValue::from_str(&self.api_key) {
            headers.insert("apikey", key);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        if let Some(token) = auth_token.or(self.service_token.as_deref()) {
            if let Ok(bearer) = HeaderValue::from_str(&format!("Bearer {}", token)) {
                headers.insert(AUTHORIZATION, bearer);
            }
        }

        headers
    }

    pub async fn request<T>(&self, method: Method, path: &str,
                            auth_token: Option<&str>, body: Option<Value>)
                            -> Result<T>
    where T: DeserializeOwned {
        self.request_with_headers(method, path, auth_token, body, HeaderMap::new()).await
    }

    pub async fn request_with_headers<T>(&self, method: Method, path: &str,
                                         auth_token: Option<&str>, body: Option<Value>,
                                         extra_headers: HeaderMap)
                                         -> Result<T>
    where T: DeserializeOwned {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers(auth_token);
        headers.extend(extra_headers);

        let mut req = self.client.request(method, &url)
            .headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);
            return Err(PostgrestError::from_response(status.as_u16(), &error_text).into());
        }

        // Edge functions and some PATCH calls may answer with an empty body.
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(serde_json::from_value(Value::Null)?);
        }

        let data = serde_json::from_slice::<T>(&bytes)?;
        Ok(data)
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_constraint_name_from_unique_violation() {
        let body = r#"{"code":"23505","details":"Key (doctor_id, appointment_date, token_number)=(a, 2024-06-01, 3) already exists.","hint":null,"message":"duplicate key value violates unique constraint \"token_ledger_partition_key\""}"#;
        let err = PostgrestError::from_response(409, body);
        assert!(err.is_unique_violation());
        assert_eq!(err.constraint(), Some("token_ledger_partition_key"));
    }

    #[test]
    fn plain_text_bodies_are_kept_as_message() {
        let err = PostgrestError::from_response(503, "upstream unavailable");
        assert!(!err.is_unique_violation());
        assert_eq!(err.message, "upstream unavailable");
        assert_eq!(err.constraint(), None);
    }
}
