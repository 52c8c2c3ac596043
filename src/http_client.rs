use crate::error::HttpError;
use hyper::client::HttpConnector;
use hyper::header::{ACCEPT, CONTENT_TYPE};
use hyper::{Body, Client, Method, Request, Uri};
use hyper_rustls::HttpsConnector;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Minimal JSON-over-HTTP(S) client.
#[derive(Clone)]
pub struct JsonClient {
    inner: Client<HttpsConnector<HttpConnector>, Body>,
}

impl JsonClient {
    pub fn new() -> Self {
        let roots = match hyper_rustls::HttpsConnectorBuilder::new().with_native_roots() {
            Ok(builder) => builder,
            Err(e) => {
                tracing::warn!("native TLS roots unavailable ({}), using bundled webpki roots", e);
                hyper_rustls::HttpsConnectorBuilder::new().with_webpki_roots()
            }
        };
        let https = roots.https_or_http().enable_http1().build();
        Self {
            inner: Client::builder().build(https),
        }
    }

    pub async fn post_json<B, R>(&self, uri: &Uri, body: &B) -> Result<R, HttpError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body)?;
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .body(Body::from(payload))?;

        let response = self.inner.request(request).await?;
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await?;

        if !status.is_success() {
            return Err(HttpError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        tracing::debug!(%uri, status = status.as_u16(), bytes = bytes.len(), "json response");
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl Default for JsonClient {
    fn default() -> Self {
        Self::new()
    }
}
