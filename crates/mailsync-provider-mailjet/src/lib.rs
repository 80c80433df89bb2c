// # Mailjet Contact API Client
//
// This crate provides the Mailjet implementation of `ContactApi` for the
// mailsync system, over the Mailjet REST API v3.
//
// ## Behavior
//
// - A few HTTP requests per operation: lookups first, then the write
// - Errors propagate to the engine untouched; no retry, no backoff
// - HTTP timeout of 30 seconds
// - Specific error mapping for HTTP status codes (401, 403, 404, 429, 5xx)
// - No caching; list lookups hit the API every time
//
// ## Security Requirements
//
// - API key and secret NEVER appear in logs
// - Construction fails fast if either credential is empty
//
// ## API Reference
//
// - Contacts: `POST /contact`, `GET /contact/{email}`
// - Contact lists: `GET /contactslist?Name=...`, `GET /contactslist?Address=...`
// - List membership: `GET /listrecipient/{id}`, `POST /listrecipient`,
//   `PUT /listrecipient/{id}`, `DELETE /listrecipient/{id}`

use std::time::Duration;

use async_trait::async_trait;
use mailsync_core::config::ProviderConfig;
use mailsync_core::traits::{ContactApi, ContactApiFactory, ContactId, NO_RELATION, RelationId};
use mailsync_core::{Error, Result};
use reqwest::{Method, StatusCode, Url};
use serde_json::{Value, json};

/// Provider name used in logs and errors
const PROVIDER: &str = "mailjet";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Domain of Mailjet list addresses
const LIST_ADDRESS_DOMAIN: &str = "@lists.mailjet.com";

/// Mailjet contact API client
///
/// Stateless and single-shot: every call maps to fresh HTTP requests.
///
/// # Security
///
/// The Debug implementation does NOT expose the API key or secret.
pub struct MailjetClient {
    /// ⚠️ NEVER log this value
    api_key: String,
    /// ⚠️ NEVER log this value
    api_secret: String,
    base: Url,
    client: reqwest::Client,
}

impl std::fmt::Debug for MailjetClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailjetClient")
            .field("api_key", &"<REDACTED>")
            .field("api_secret", &"<REDACTED>")
            .field("base", &self.base.as_str())
            .finish()
    }
}

impl MailjetClient {
    /// Create a new Mailjet client
    ///
    /// # Parameters
    ///
    /// - `api_key` / `api_secret`: Mailjet API credentials
    /// - `ws_address`: REST API base, e.g. `https://api.mailjet.com/v3/REST`
    pub fn new(
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        ws_address: &str,
    ) -> Result<Self> {
        let api_key = api_key.into();
        let api_secret = api_secret.into();
        if api_key.is_empty() || api_secret.is_empty() {
            return Err(Error::config("Mailjet API key and secret cannot be empty"));
        }

        let base = Url::parse(ws_address.trim_end_matches('/')).map_err(|e| {
            Error::config(format!("Invalid Mailjet API address {}: {}", ws_address, e))
        })?;
        if base.cannot_be_a_base() {
            return Err(Error::config(format!(
                "Invalid Mailjet API address: {}",
                ws_address
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            api_secret,
            base,
            client,
        })
    }

    /// Build `{base}/{segments...}` with each segment percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::config("Mailjet API address cannot take a path"))?
            .extend(segments);
        Ok(url)
    }

    /// Send a request and return the parsed body of a 2xx response
    async fn request(
        &self,
        method: Method,
        url: Url,
        query: &[(&str, &str)],
        body: Option<Value>,
        context: &str,
    ) -> Result<Value> {
        tracing::debug!("Mailjet {} {}", method, url.path());

        let mut builder = self
            .client
            .request(method, url)
            .basic_auth(&self.api_key, Some(&self.api_secret))
            .query(query);
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::http(format!("Mailjet request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read response".to_string());

        if !status.is_success() {
            return Err(map_status(status, &text, context));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| {
            Error::remote_api(PROVIDER, format!("Failed to parse response: {}", e))
        })
    }

    /// Find the contact list id for `list_name`
    async fn find_list_id(&self, list_name: &str) -> Result<Option<u64>> {
        let json = self
            .request(
                Method::GET,
                self.endpoint(&["contactslist"])?,
                &[("Name", list_name)],
                None,
                "Contact list lookup",
            )
            .await?;
        Ok(first_data(&json).and_then(|list| list["ID"].as_u64()))
    }

    /// Look up the id of an existing contact
    async fn find_contact_id(&self, email: &str) -> Result<ContactId> {
        let json = self
            .request(
                Method::GET,
                self.endpoint(&["contact", email])?,
                &[],
                None,
                "Contact lookup",
            )
            .await?;
        data_id(&json)
    }

    /// Contact list id of an existing list membership, `None` when it is gone
    async fn membership_list_id(&self, relation_id: RelationId) -> Result<Option<u64>> {
        let rid = relation_id.to_string();
        match self
            .request(
                Method::GET,
                self.endpoint(&["listrecipient", rid.as_str()])?,
                &[],
                None,
                "List membership lookup",
            )
            .await
        {
            Ok(json) => Ok(first_data(&json).and_then(|item| item["ListID"].as_u64())),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Set the unsubscribed flag of a list membership
    async fn set_unsubscribed(&self, relation_id: RelationId, unsubscribed: bool) -> Result<()> {
        let rid = relation_id.to_string();
        self.request(
            Method::PUT,
            self.endpoint(&["listrecipient", rid.as_str()])?,
            &[],
            Some(json!({ "IsUnsubscribed": unsubscribed })),
            "List membership update",
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ContactApi for MailjetClient {
    /// Create a contact, or return the id of the one already registered
    ///
    /// ```http
    /// POST /contact
    /// { "Email": "jane@example.com", "Name": "Jane Doe" }
    /// ```
    async fn create_contact(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<ContactId> {
        let body = json!({
            "Email": email,
            "Name": display_name(first_name, last_name),
        });

        let result = self
            .request(
                Method::POST,
                self.endpoint(&["contact"])?,
                &[],
                Some(body),
                "Contact creation",
            )
            .await;

        match result {
            Ok(json) => data_id(&json),
            Err(Error::RemoteApi { message, .. }) if message.contains("already exists") => {
                tracing::debug!("Contact {} already registered on Mailjet", email);
                self.find_contact_id(email).await
            }
            Err(e) => Err(e),
        }
    }

    /// Reactivate an existing membership of `list_name` or create a new one
    ///
    /// A membership of any other list is left alone and a new one is created.
    ///
    /// ```http
    /// GET /contactslist?Name={list_name}
    /// GET /listrecipient/{relation_id}
    ///
    /// PUT /listrecipient/{relation_id}
    /// { "IsUnsubscribed": false }
    ///
    /// POST /listrecipient
    /// { "ContactID": 1, "ListID": 2, "IsUnsubscribed": false }
    /// ```
    async fn add_to_list(
        &self,
        contact_id: ContactId,
        relation_id: RelationId,
        email: &str,
        list_name: &str,
    ) -> Result<RelationId> {
        let list_id = self
            .find_list_id(list_name)
            .await?
            .ok_or_else(|| Error::not_found(format!("Contact list not found: {}", list_name)))?;

        if relation_id != NO_RELATION {
            match self.membership_list_id(relation_id).await? {
                Some(current) if current == list_id => {
                    tracing::debug!("Reactivating membership {} of {}", relation_id, email);
                    self.set_unsubscribed(relation_id, false).await?;
                    return Ok(relation_id);
                }
                Some(current) => tracing::debug!(
                    "Membership {} of {} belongs to list {}, not {}",
                    relation_id,
                    email,
                    current,
                    list_id
                ),
                None => tracing::debug!("Membership {} of {} no longer exists", relation_id, email),
            }
        }

        let json = self
            .request(
                Method::POST,
                self.endpoint(&["listrecipient"])?,
                &[],
                Some(json!({
                    "ContactID": contact_id,
                    "ListID": list_id,
                    "IsUnsubscribed": false,
                })),
                "List membership creation",
            )
            .await?;

        tracing::info!("Added {} to Mailjet list {}", email, list_id);
        data_id(&json)
    }

    async fn remove_from_list(&self, email: &str, relation_id: RelationId) -> Result<bool> {
        if relation_id == NO_RELATION {
            tracing::debug!("{} holds no list membership to remove", email);
            return Ok(false);
        }

        let rid = relation_id.to_string();
        match self
            .request(
                Method::DELETE,
                self.endpoint(&["listrecipient", rid.as_str()])?,
                &[],
                None,
                "List membership removal",
            )
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn unsubscribe(&self, email: &str, relation_id: RelationId) -> Result<bool> {
        if relation_id == NO_RELATION {
            tracing::debug!("{} holds no list membership to unsubscribe", email);
            return Ok(false);
        }

        match self.set_unsubscribed(relation_id, true).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list_exists(&self, list_name: &str) -> Result<bool> {
        Ok(self.find_list_id(list_name).await?.is_some())
    }

    /// ```http
    /// GET /contactslist?Address=newsletter
    /// ```
    async fn list_name_from_address(&self, address: &str) -> Result<Option<String>> {
        let Some(local) = list_local_part(address) else {
            return Ok(None);
        };

        let json = self
            .request(
                Method::GET,
                self.endpoint(&["contactslist"])?,
                &[("Address", local)],
                None,
                "Contact list address lookup",
            )
            .await?;

        Ok(first_data(&json)
            .and_then(|list| list["Name"].as_str())
            .filter(|name| !name.is_empty())
            .map(str::to_string))
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

/// Map a non-2xx status to an error
fn map_status(status: StatusCode, body: &str, context: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::auth(format!(
            "Invalid Mailjet API credentials or insufficient permissions. Status: {}",
            status
        )),
        404 => Error::not_found(format!("{}: {} - {}", context, status, body)),
        429 => Error::rate_limited(format!("Mailjet rate limit exceeded. Status: {}", status)),
        500..=599 => Error::remote_api(
            PROVIDER,
            format!("Mailjet server error (transient): {} - {}", status, body),
        ),
        _ => Error::remote_api(PROVIDER, format!("{} failed: {} - {}", context, status, body)),
    }
}

/// First element of the `Data` array of a Mailjet response
fn first_data(json: &Value) -> Option<&Value> {
    json["Data"].as_array().and_then(|data| data.first())
}

/// `Data[0].ID` of a Mailjet response, `0` when absent
fn data_id(json: &Value) -> Result<u64> {
    match first_data(json) {
        Some(item) => Ok(item["ID"].as_u64().unwrap_or(0)),
        None if json["Data"].is_array() => Ok(0),
        None => Err(Error::remote_api(
            PROVIDER,
            "Invalid response format: Data is not an array",
        )),
    }
}

/// Local part of a list address, with the Mailjet list domain stripped
fn list_local_part(address: &str) -> Option<&str> {
    let address = address.trim();
    let local = address.strip_suffix(LIST_ADDRESS_DOMAIN).unwrap_or(address);
    (!local.is_empty()).then_some(local)
}

fn display_name(first_name: &str, last_name: &str) -> String {
    format!("{} {}", first_name.trim(), last_name.trim())
        .trim()
        .to_string()
}

/// Factory for creating Mailjet clients
pub struct MailjetFactory;

impl ContactApiFactory for MailjetFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn ContactApi>> {
        match config {
            ProviderConfig::Mailjet {
                api_key,
                api_secret,
                ws_address,
            } => Ok(Box::new(MailjetClient::new(
                api_key.clone(),
                api_secret.clone(),
                ws_address,
            )?)),
            _ => Err(Error::config("Invalid config for Mailjet provider")),
        }
    }
}

/// Register the Mailjet client with a registry
///
/// This function should be called during initialization to make the
/// Mailjet provider available.
///
/// # Example
///
/// ```rust,ignore
/// use mailsync_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// mailsync_provider_mailjet::register(&registry);
/// ```
pub fn register(registry: &mailsync_core::ProviderRegistry) {
    registry.register_provider(PROVIDER, Box::new(MailjetFactory));
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Serve canned Mailjet responses on a local port
    ///
    /// Returns the API base address and the request lines received, in order.
    async fn serve(route: fn(&str) -> &'static str) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let request = read_request(&mut socket).await;
                let line = request.lines().next().unwrap_or_default().to_string();
                let body = route(&line);
                log.lock().unwrap().push(line);

                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
                     content-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{}/v3/REST", addr), seen)
    }

    /// Read one request: headers, then `content-length` bytes of body
    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let body_len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + body_len {
                break;
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// "News EN" is list 7, "News FR" list 8; relation 5 is a membership of list 7
    fn two_lists(line: &str) -> &'static str {
        if line.starts_with("GET /v3/REST/contactslist?Name=News+FR") {
            r#"{"Count":1,"Data":[{"ID":8,"Name":"News FR"}]}"#
        } else if line.starts_with("GET /v3/REST/contactslist?Name=News+EN") {
            r#"{"Count":1,"Data":[{"ID":7,"Name":"News EN"}]}"#
        } else if line.starts_with("GET /v3/REST/listrecipient/5 ") {
            r#"{"Count":1,"Data":[{"ID":5,"ContactID":1,"ListID":7}]}"#
        } else if line.starts_with("POST /v3/REST/listrecipient ") {
            r#"{"Count":1,"Data":[{"ID":42}]}"#
        } else {
            r#"{"Count":1,"Data":[{"ID":5}]}"#
        }
    }

    #[tokio::test]
    async fn test_membership_of_another_list_gets_a_new_relation() {
        let (base, seen) = serve(two_lists).await;
        let client = MailjetClient::new("k", "s", &base).unwrap();

        let relation = client
            .add_to_list(1, 5, "jane@example.com", "News FR")
            .await
            .unwrap();

        assert_eq!(relation, 42);
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 3, "requests: {seen:?}");
        assert!(seen[0].starts_with("GET /v3/REST/contactslist?Name=News+FR"));
        assert!(seen[1].starts_with("GET /v3/REST/listrecipient/5 "));
        assert!(seen[2].starts_with("POST /v3/REST/listrecipient "));
    }

    #[tokio::test]
    async fn test_membership_of_same_list_is_reactivated() {
        let (base, seen) = serve(two_lists).await;
        let client = MailjetClient::new("k", "s", &base).unwrap();

        let relation = client
            .add_to_list(1, 5, "jane@example.com", "News EN")
            .await
            .unwrap();

        assert_eq!(relation, 5);
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 3, "requests: {seen:?}");
        assert!(seen[2].starts_with("PUT /v3/REST/listrecipient/5 "));
    }

    fn mailjet_config(key: &str, secret: &str) -> ProviderConfig {
        ProviderConfig::Mailjet {
            api_key: key.to_string(),
            api_secret: secret.to_string(),
            ws_address: "https://api.mailjet.com/v3/REST".to_string(),
        }
    }

    #[test]
    fn test_factory_creation() {
        let provider = MailjetFactory.create(&mailjet_config("key", "secret"));
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().provider_name(), "mailjet");
    }

    #[test]
    fn test_factory_missing_credentials() {
        assert!(MailjetFactory.create(&mailjet_config("", "secret")).is_err());
        assert!(MailjetFactory.create(&mailjet_config("key", "")).is_err());
    }

    #[test]
    fn test_factory_rejects_other_config() {
        let config = ProviderConfig::Custom {
            factory: "other".to_string(),
            config: serde_json::json!({}),
        };
        assert!(MailjetFactory.create(&config).is_err());
    }

    #[test]
    fn test_register() {
        let registry = mailsync_core::ProviderRegistry::new();
        register(&registry);
        assert!(registry.has_provider("mailjet"));
        assert!(registry.create_provider(&mailjet_config("key", "secret")).is_ok());
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let client =
            MailjetClient::new("public-key", "very-secret", "https://api.mailjet.com/v3/REST")
                .unwrap();
        let debug = format!("{:?}", client);
        assert!(!debug.contains("public-key"));
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("<REDACTED>"));
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let client = MailjetClient::new("k", "s", "https://api.mailjet.com/v3/REST/").unwrap();
        let url = client.endpoint(&["contact", "jane+news@example.com"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.mailjet.com/v3/REST/contact/jane+news@example.com"
        );

        let url = client.endpoint(&["contact", "a/b@example.com"]).unwrap();
        assert!(url.path().ends_with("/contact/a%2Fb@example.com"));
    }

    #[test]
    fn test_list_local_part() {
        assert_eq!(list_local_part("newsletter@lists.mailjet.com"), Some("newsletter"));
        assert_eq!(list_local_part("  newsletter  "), Some("newsletter"));
        assert_eq!(list_local_part("@lists.mailjet.com"), None);
        assert_eq!(list_local_part(""), None);
    }

    #[test]
    fn test_data_id() {
        let json = serde_json::json!({ "Count": 1, "Data": [{ "ID": 1234 }] });
        assert_eq!(data_id(&json).unwrap(), 1234);

        let empty = serde_json::json!({ "Count": 0, "Data": [] });
        assert_eq!(data_id(&empty).unwrap(), 0);

        assert!(data_id(&serde_json::json!({ "ErrorMessage": "x" })).is_err());
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            map_status(StatusCode::UNAUTHORIZED, "", "x"),
            Error::Authentication(_)
        ));
        assert!(map_status(StatusCode::NOT_FOUND, "", "x").is_not_found());
        assert!(matches!(
            map_status(StatusCode::TOO_MANY_REQUESTS, "", "x"),
            Error::RateLimited(_)
        ));
        assert!(matches!(
            map_status(StatusCode::BAD_REQUEST, "MJ18 already exists", "x"),
            Error::RemoteApi { message, .. } if message.contains("already exists")
        ));
    }

    #[tokio::test]
    async fn test_missing_relation_makes_no_request() {
        // Unroutable base: any request would fail with an HTTP error
        let client = MailjetClient::new("k", "s", "http://127.0.0.1:9/v3/REST").unwrap();

        assert!(!client.remove_from_list("jane@example.com", NO_RELATION).await.unwrap());
        assert!(!client.unsubscribe("jane@example.com", NO_RELATION).await.unwrap());
        assert_eq!(client.list_name_from_address("  ").await.unwrap(), None);
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("Jane", "Doe"), "Jane Doe");
        assert_eq!(display_name("", "Doe"), "Doe");
        assert_eq!(display_name(" ", ""), "");
    }
}
