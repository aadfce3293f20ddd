use calcsheet_lock::{LockError, LockService};
use calcsheet_model::{Lock, Session, SheetDefinition, SheetId, VersionId, VersionSnapshot, VersionSummary};
use calcsheet_versions::{SheetSource, SourceError};
use serde::Serialize;
use url::Url;

use crate::decode;
use crate::error::ClientError;

/// Upper bound on any response body we are willing to buffer.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024; // 16 MiB

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TabBody<'a> {
    tab_id: &'a str,
}

#[derive(Serialize)]
struct CreateVersionBody<'a> {
    tag: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

/// The calcsheet server, reached over HTTP. Implements both the lock protocol and the
/// sheet/version protocol.
///
/// Authentication is whatever the supplied [`reqwest::Client`] carries (default
/// headers, cookies); this type adds none of its own.
#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: reqwest::Client,
    base: Url,
}

impl HttpBackend {
    pub fn new(base: &str) -> Result<Self, ClientError> {
        Self::with_client(reqwest::Client::new(), base)
    }

    pub fn with_client(client: reqwest::Client, base: &str) -> Result<Self, ClientError> {
        let base = Url::parse(base)?;
        if base.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(format!("{base} cannot be a base url")));
        }
        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base.clone();
        url.set_query(None);
        url.set_fragment(None);
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn lock_url(&self, sheet: &SheetId) -> Result<Url, ClientError> {
        self.endpoint(&["sheets", sheet.as_str(), "lock"])
    }

    /// Send a request and buffer its body, enforcing [`MAX_BODY_BYTES`].
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<(u16, Vec<u8>), ClientError> {
        let mut response = request.send().await?;
        let status = response.status().as_u16();
        let body = read_body_with_limit(&mut response, MAX_BODY_BYTES).await?;
        tracing::trace!(status, url = %response.url(), bytes = body.len(), "response received");
        Ok((status, body))
    }
}

async fn read_body_with_limit(
    response: &mut reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, ClientError> {
    if response.content_length().is_some_and(|len| len > limit as u64) {
        return Err(ClientError::BodyTooLarge { limit });
    }
    let mut out = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if out.len().saturating_add(chunk.len()) > limit {
            return Err(ClientError::BodyTooLarge { limit });
        }
        out.extend_from_slice(&chunk);
    }
    Ok(out)
}

impl LockService for HttpBackend {
    async fn peek(&self, sheet: &SheetId) -> Result<Option<Lock>, LockError> {
        let url = self.lock_url(sheet)?;
        let (status, body) = self.send(self.client.get(url)).await?;
        decode::decode_peek(status, &body)
    }

    async fn acquire(&self, sheet: &SheetId, session: &Session) -> Result<Lock, LockError> {
        let url = self.lock_url(sheet)?;
        let request = self.client.post(url).json(&TabBody {
            tab_id: &session.tab_id,
        });
        let (status, body) = self.send(request).await?;
        decode::decode_lock(status, &body)
    }

    async fn take_over(&self, sheet: &SheetId, session: &Session) -> Result<Lock, LockError> {
        let url = self.endpoint(&["sheets", sheet.as_str(), "lock", "takeover"])?;
        let request = self.client.post(url).json(&TabBody {
            tab_id: &session.tab_id,
        });
        let (status, body) = self.send(request).await?;
        decode::decode_lock(status, &body)
    }

    async fn release(&self, sheet: &SheetId, session: &Session) -> Result<(), LockError> {
        let url = self.lock_url(sheet)?;
        let request = self.client.delete(url).json(&TabBody {
            tab_id: &session.tab_id,
        });
        let (status, _) = self.send(request).await?;
        decode::decode_release(status)
    }

    fn release_beacon(&self, sheet: &SheetId, session: &Session) {
        let url = match self.lock_url(sheet) {
            Ok(url) => url,
            Err(err) => {
                tracing::warn!(error = %err, "cannot build release beacon url");
                return;
            }
        };
        let request = self.client.delete(url).json(&TabBody {
            tab_id: &session.tab_id,
        });
        let sheet_id = sheet.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = request.send().await {
                        tracing::debug!(sheet_id = %sheet_id, error = %err, "release beacon failed");
                    }
                });
            }
            Err(_) => tracing::warn!(sheet_id = %sheet_id, "no async runtime; release beacon dropped"),
        }
    }
}

impl SheetSource for HttpBackend {
    async fn fetch_sheet(&self, sheet: &SheetId) -> Result<SheetDefinition, SourceError> {
        let url = self.endpoint(&["sheets", sheet.as_str()])?;
        let (status, body) = self.send(self.client.get(url)).await?;
        decode::decode_sheet(sheet, status, &body)
    }

    async fn fetch_version(
        &self,
        sheet: &SheetId,
        version: &VersionId,
    ) -> Result<VersionSnapshot, SourceError> {
        let url = self.endpoint(&["sheets", sheet.as_str(), "versions", version.as_str()])?;
        let (status, body) = self.send(self.client.get(url)).await?;
        decode::decode_version(sheet, version, status, &body)
    }

    async fn list_versions(&self, sheet: &SheetId) -> Result<Vec<VersionSummary>, SourceError> {
        let url = self.endpoint(&["sheets", sheet.as_str(), "versions"])?;
        let (status, body) = self.send(self.client.get(url)).await?;
        decode::decode_versions(sheet, status, &body)
    }

    async fn create_version(
        &self,
        sheet: &SheetId,
        tag: &str,
        description: Option<&str>,
    ) -> Result<VersionSnapshot, SourceError> {
        let url = self.endpoint(&["sheets", sheet.as_str(), "versions"])?;
        let request = self
            .client
            .post(url)
            .json(&CreateVersionBody { tag, description });
        let (status, body) = self.send(request).await?;
        decode::decode_created(sheet, status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_are_built_under_the_base_path() {
        let backend = HttpBackend::new("https://calc.example/api?x=1").unwrap();
        assert_eq!(
            backend.lock_url(&SheetId::new("a b")).unwrap().as_str(),
            "https://calc.example/api/sheets/a%20b/lock"
        );
        let backend = HttpBackend::new("https://calc.example/api/").unwrap();
        assert_eq!(
            backend
                .endpoint(&["sheets", "s1", "versions", "v1"])
                .unwrap()
                .as_str(),
            "https://calc.example/api/sheets/s1/versions/v1"
        );
    }

    #[test]
    fn non_hierarchical_base_is_rejected() {
        assert!(matches!(
            HttpBackend::new("mailto:someone@example.com"),
            Err(ClientError::InvalidUrl(_))
        ));
    }
}
