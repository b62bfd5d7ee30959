//! HTTP client for the Imgur REST API.
//!
//! One request per ID: `GET {base}/album/{id}` or `GET {base}/image/{id}`
//! with a `Client-ID` authorization header. Responses arrive wrapped in an
//! envelope (`{"success": bool, "data": {...}}`); the body is parsed even on
//! non-2xx statuses because Imgur reports errors through the envelope, not
//! just the status line.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::validate_client_id;
use crate::error::{Error, Result};

/// Base URL of the public Imgur API.
pub const API_URL: &str = "https://api.imgur.com/3";

/// Per-request timeout. Bounds worst-case latency of one stale ID; there is
/// no global refresh timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Parsed metadata from an album query.
///
/// `images` preserves the order returned by the API; it becomes the album
/// entry's member list verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumPayload {
    /// Album title; remote `null` maps to empty.
    pub title: String,
    /// Album description; remote `null` maps to empty.
    pub description: String,
    /// Imgur ID of the cover image.
    pub cover: String,
    /// Member images with their embedded metadata, in remote order.
    pub images: Vec<ImagePayload>,
}

/// Parsed metadata from an image query, or one embedded album member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    /// Bare Imgur ID of the image.
    pub id: String,
    /// Image title; remote `null` maps to empty.
    pub title: String,
    /// Image description; remote `null` maps to empty.
    pub description: String,
    /// Width in pixels; 0 when the payload omits it.
    pub width: u32,
    /// Height in pixels; 0 when the payload omits it.
    pub height: u32,
    /// MIME type reported by the API (the `type` key).
    pub mime_type: String,
}

/// Response envelope shared by every Imgur API endpoint.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<Value>,
}

/// Client for fetching album and image metadata from the Imgur API.
#[derive(Debug)]
pub struct ImgurClient {
    http: Client,
    base_url: String,
    client_id: String,
}

impl ImgurClient {
    /// Create a client against the public Imgur API.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when `client_id` is empty or not 5-30
    /// lowercase hexadecimal characters. This check runs before any request
    /// can be issued, so an invalid credential aborts a refresh up front.
    pub fn new(client_id: &str) -> Result<Self> {
        Self::with_base_url(client_id, API_URL)
    }

    /// Create a client against a custom base URL (primarily for tests).
    pub fn with_base_url(client_id: &str, base_url: &str) -> Result<Self> {
        validate_client_id(client_id)?;
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("outfitter-imgcache/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
        })
    }

    /// Fetch metadata for one album.
    pub async fn fetch_album(&self, id: &str) -> Result<AlbumPayload> {
        let url = self.endpoint("album", id);
        let data = self.query(&url).await?;
        parse_album(&url, id, &data)
    }

    /// Fetch metadata for one standalone image.
    pub async fn fetch_image(&self, id: &str) -> Result<ImagePayload> {
        let url = self.endpoint("image", id);
        let data = self.query(&url).await?;
        parse_image(id, &data)
    }

    fn endpoint(&self, kind: &str, id: &str) -> String {
        format!("{}/{kind}/{id}", self.base_url)
    }

    /// Issue one GET and unwrap the response envelope down to its `data`
    /// object.
    async fn query(&self, url: &str) -> Result<Value> {
        info!("querying {url}");
        let response = self
            .http
            .get(url)
            .header(AUTHORIZATION, format!("Client-ID {}", self.client_id))
            .send()
            .await
            .map_err(|e| classify_transport_error(e, url))?;

        let body = response
            .text()
            .await
            .map_err(|e| classify_transport_error(e, url))?;
        debug!("Imgur API responded with: {body}");

        let envelope: Envelope =
            serde_json::from_str(&body).map_err(|_| Error::MalformedPayload {
                url: url.to_string(),
            })?;

        if !envelope.success {
            return Err(Error::RemoteFailure {
                url: url.to_string(),
                reason: remote_reason(envelope.data.as_ref()),
            });
        }
        envelope.data.ok_or_else(|| Error::RemoteFailure {
            url: url.to_string(),
            reason: "not available".to_string(),
        })
    }
}

/// Map a transport-level failure onto the error taxonomy.
fn classify_transport_error(err: reqwest::Error, url: &str) -> Error {
    if err.is_timeout() {
        Error::Timeout {
            url: url.to_string(),
        }
    } else {
        Error::Connect {
            url: url.to_string(),
            source: err,
        }
    }
}

/// Extract the remote-supplied failure reason from an unsuccessful envelope.
fn remote_reason(data: Option<&Value>) -> String {
    data.and_then(|d| d.get("error"))
        .and_then(Value::as_str)
        .unwrap_or("not available")
        .to_string()
}

fn parse_album(url: &str, id: &str, data: &Value) -> Result<AlbumPayload> {
    let object = data.as_object().ok_or_else(|| Error::MalformedPayload {
        url: url.to_string(),
    })?;

    let images = object
        .get("images")
        .ok_or_else(|| Error::MissingField {
            id: id.to_string(),
            field: "images",
        })?
        .as_array()
        .ok_or_else(|| Error::MalformedPayload {
            url: url.to_string(),
        })?
        .iter()
        .map(|image| {
            let member_id = text_field(image, "id", id)?;
            parse_image(&member_id, image)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(AlbumPayload {
        title: text_field(data, "title", id)?,
        description: text_field(data, "description", id)?,
        cover: text_field(data, "cover", id)?,
        images,
    })
}

fn parse_image(id: &str, data: &Value) -> Result<ImagePayload> {
    Ok(ImagePayload {
        id: text_field(data, "id", id)?,
        title: text_field(data, "title", id)?,
        description: text_field(data, "description", id)?,
        width: dimension(data, "width"),
        height: dimension(data, "height"),
        mime_type: data
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

/// Read a required text field, treating an explicit `null` as empty.
///
/// A missing key is a [`Error::MissingField`] — the entry cannot be updated
/// without it — while `null` is how the API spells "no title set".
fn text_field(data: &Value, field: &'static str, id: &str) -> Result<String> {
    match data.get(field) {
        None => Err(Error::MissingField {
            id: id.to_string(),
            field,
        }),
        Some(Value::Null) => Ok(String::new()),
        Some(value) => Ok(value.as_str().unwrap_or_default().to_string()),
    }
}

fn dimension(data: &Value, field: &str) -> u32 {
    data.get(field)
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CLIENT_ID: &str = "abc123def456";

    async fn client_for(server: &MockServer) -> ImgurClient {
        ImgurClient::with_base_url(CLIENT_ID, &server.uri()).expect("client")
    }

    fn album_body() -> Value {
        json!({
            "success": true,
            "status": 200,
            "data": {
                "id": "V76cJ",
                "title": "2010 JSW, 2012 Projects",
                "description": "Car projects.",
                "cover": "mGQBV",
                "images": [
                    {"id": "mGQBV", "title": "Wireless Charging 1: Testing",
                     "description": "Testing.", "width": 2560, "height": 1920,
                     "type": "image/jpeg"},
                    {"id": "pc8hc", "title": null, "description": null,
                     "width": 1024, "height": 768, "type": "image/png"}
                ]
            }
        })
    }

    #[tokio::test]
    async fn invalid_client_id_is_fatal_before_any_request() {
        for bad in ["", "UPPERCASE1", "abc", "xyz!!", &"a".repeat(31)] {
            match ImgurClient::new(bad) {
                Err(Error::Config(_)) => {},
                other => panic!("expected Config error for {bad:?}, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn fetch_album_parses_embedded_members_in_order() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/album/V76cJ"))
            .and(header("authorization", format!("Client-ID {CLIENT_ID}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(album_body()))
            .mount(&server)
            .await;

        let album = client_for(&server).await.fetch_album("V76cJ").await?;
        assert_eq!(album.title, "2010 JSW, 2012 Projects");
        assert_eq!(album.cover, "mGQBV");
        assert_eq!(
            album.images.iter().map(|i| i.id.as_str()).collect::<Vec<_>>(),
            ["mGQBV", "pc8hc"]
        );
        // Explicit nulls map to empty strings.
        assert_eq!(album.images[1].title, "");
        assert_eq!(album.images[0].width, 2560);
        assert_eq!(album.images[0].mime_type, "image/jpeg");
        Ok(())
    }

    #[tokio::test]
    async fn fetch_image_parses_fields() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/image/hiX02"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {"id": "hiX02", "title": "Work", "description": null,
                         "width": 3264, "height": 2448, "type": "image/jpeg"}
            })))
            .mount(&server)
            .await;

        let image = client_for(&server).await.fetch_image("hiX02").await?;
        assert_eq!(image.id, "hiX02");
        assert_eq!(image.title, "Work");
        assert_eq!(image.description, "");
        assert_eq!((image.width, image.height), (3264, 2448));
        Ok(())
    }

    #[tokio::test]
    async fn unsuccessful_envelope_carries_the_remote_reason() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/image/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "success": false,
                "status": 404,
                "data": {"error": "Unable to find an image with the id, gone"}
            })))
            .mount(&server)
            .await;

        match client_for(&server).await.fetch_image("gone").await {
            Err(Error::RemoteFailure { reason, url }) => {
                assert_eq!(reason, "Unable to find an image with the id, gone");
                assert!(url.ends_with("/image/gone"));
            },
            other => panic!("expected RemoteFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_success_indicator_reads_as_not_available() {
        // A bare 500 with an empty JSON object has no success key and no
        // remote reason.
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/album/broken"))
            .respond_with(ResponseTemplate::new(500).set_body_string("{}"))
            .mount(&server)
            .await;

        match client_for(&server).await.fetch_album("broken").await {
            Err(Error::RemoteFailure { reason, .. }) => assert_eq!(reason, "not available"),
            other => panic!("expected RemoteFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unparseable_body_is_a_malformed_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/image/garbled"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&server)
            .await;

        match client_for(&server).await.fetch_image("garbled").await {
            Err(Error::MalformedPayload { url }) => assert!(url.ends_with("/image/garbled")),
            other => panic!("expected MalformedPayload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn success_without_required_field_names_the_offender() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/image/topless"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {"id": "topless", "description": "no title key here"}
            })))
            .mount(&server)
            .await;

        match client_for(&server).await.fetch_image("topless").await {
            Err(Error::MissingField { id, field }) => {
                assert_eq!(id, "topless");
                assert_eq!(field, "title");
            },
            other => panic!("expected MissingField, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_response_classifies_as_timeout() {
        // The production timeout is 5s; exercise the classification with a
        // response delayed past it.
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/image/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true, "data": {}}))
                    .set_delay(Duration::from_secs(7)),
            )
            .mount(&server)
            .await;

        match client_for(&server).await.fetch_image("slow").await {
            Err(Error::Timeout { url }) => assert!(url.ends_with("/image/slow")),
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_host_classifies_as_connect_failure() {
        // Nothing listens on this port.
        let client = ImgurClient::with_base_url(CLIENT_ID, "http://127.0.0.1:9").expect("client");
        match client.fetch_album("V76cJ").await {
            Err(Error::Connect { url, .. }) => assert!(url.contains("/album/V76cJ")),
            other => panic!("expected Connect, got {other:?}"),
        }
    }
}
