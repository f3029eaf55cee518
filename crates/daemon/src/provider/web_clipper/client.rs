// HTTP client for the notes web clipper API.
//
//   GET /notes?token=..&fields=id,parent_id&page=N   -> {items, has_more}
//   GET /notes/{id}?token=..&fields=id,parent_id,body,title
//   PUT /notes/{id}?token=..  {"body": ...}
//
// Any 5xx is a server error. Other non-200 responses carry `{"error": ..}`.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
const LIST_FIELDS: &str = "id,parent_id";
const NOTE_FIELDS: &str = "id,parent_id,body,title";

#[derive(Debug, thiserror::Error)]
pub enum ClipperError {
    #[error("web clipper request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("web clipper server error (HTTP {status})")]
    Server { status: u16 },

    #[error("web clipper rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid web clipper url `{url}`")]
    InvalidUrl { url: String },
}

impl ClipperError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Rejected { status, .. } if *status == StatusCode::NOT_FOUND.as_u16())
    }
}

/// A note as returned by the API. Listing only fills `id` and `parent_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ClipperNote {
    pub id: String,
    #[serde(default)]
    pub parent_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NotePage {
    #[serde(default)]
    pub items: Vec<ClipperNote>,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Serialize)]
struct BodyUpdate<'a> {
    body: &'a str,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
}

#[derive(Debug, Clone)]
pub struct WebClipperClient {
    http: Client,
    base: Url,
    token: String,
}

impl WebClipperClient {
    /// Client for the service at `base_url`; every request is bounded by
    /// `request_timeout` and connecting by one second.
    pub fn new(base_url: &str, token: &str, request_timeout: Duration) -> Result<Self, ClipperError> {
        let base = Url::parse(base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| ClipperError::InvalidUrl { url: base_url.to_string() })?;

        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(request_timeout)
            .build()?;

        Ok(Self { http, base, token: token.to_string() })
    }

    /// One page of note ids (pages start at 1).
    pub async fn list_page(&self, page: u32) -> Result<NotePage, ClipperError> {
        let page = page.to_string();
        let url = self.endpoint(&[], &[("fields", LIST_FIELDS), ("page", &page)])?;
        debug!(%page, "listing web clipper notes");
        read_response(self.http.get(url).send().await?).await
    }

    pub async fn get_note(&self, id: &str) -> Result<ClipperNote, ClipperError> {
        let url = self.endpoint(&[id], &[("fields", NOTE_FIELDS)])?;
        read_response(self.http.get(url).send().await?).await
    }

    /// Replace the body of note `id`.
    pub async fn put_body(&self, id: &str, body: &str) -> Result<ClipperNote, ClipperError> {
        let url = self.endpoint(&[id], &[])?;
        let response = self.http.put(url).json(&BodyUpdate { body }).send().await?;
        read_response(response).await
    }

    fn endpoint(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url, ClipperError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ClipperError::InvalidUrl { url: self.base.to_string() })?
            .pop_if_empty()
            .push("notes")
            .extend(segments);

        url.query_pairs_mut().append_pair("token", &self.token).extend_pairs(query);
        Ok(url)
    }
}

async fn read_response<T: DeserializeOwned>(response: Response) -> Result<T, ClipperError> {
    let status = response.status();
    if status.is_server_error() {
        return Err(ClipperError::Server { status: status.as_u16() });
    }

    if status != StatusCode::OK {
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(err) => format!("unreadable error body: {err}"),
        };
        return Err(ClipperError::Rejected { status: status.as_u16(), message });
    }

    Ok(response.json::<T>().await?)
}
