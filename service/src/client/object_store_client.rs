use crate::client::listing::{parse_list_objects, ListObjects};
use crate::client::signing::{sign, uri_encode, CanonicalRequest, Credentials, EMPTY_PAYLOAD_SHA256};
use crate::client::ObjectStoreError;
use chrono::{DateTime, Utc};
use hyper::body::Bytes;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, ETAG, LAST_MODIFIED};
use reqwest::{RequestBuilder, Response, Url};
use std::time::Duration;
use tracing::{debug, info, instrument};

const REGION: &str = "auto";

#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    /// S3 API endpoint, e.g. `https://<account id>.r2.cloudflarestorage.com`.
    pub endpoint: Option<String>,
    pub bucket: Option<String>,
    pub credentials: Option<Credentials>,
    /// Public bucket URL used for anonymous reads.
    pub public_url: Option<String>,
    pub timeout: Duration,
}

impl ObjectStoreConfig {
    pub fn r2_endpoint(account_id: &str) -> String {
        format!("https://{account_id}.r2.cloudflarestorage.com")
    }
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Bytes,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Thin wrapper over the R2 S3 API. Built once at startup and shared.
#[derive(Debug)]
pub struct ObjectStoreClient {
    http: reqwest::Client,
    config: ObjectStoreConfig,
}

impl ObjectStoreClient {
    pub fn new(config: ObjectStoreConfig) -> Result<ObjectStoreClient, reqwest::Error> {
        info!("Initializing object store client.");
        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(config.timeout)
            .build()?;
        Ok(ObjectStoreClient { http, config })
    }

    /// True when at least anonymous reads are possible.
    pub fn is_configured(&self) -> bool {
        self.signing_target().is_some() || self.config.public_url.is_some()
    }

    pub fn public_url(&self, key: &str) -> Option<String> {
        self.config
            .public_url
            .as_ref()
            .map(|base| format!("{}/{}", base.trim_end_matches('/'), uri_encode(key, false)))
    }

    #[instrument(skip(self))]
    pub async fn get_object(&self, key: &str) -> Result<StoredObject, ObjectStoreError> {
        let request = match self.signing_target() {
            Some((endpoint, bucket, credentials)) => {
                let uri = format!("/{}/{}", uri_encode(bucket, true), uri_encode(key, false));
                self.signed_get(endpoint, credentials, &uri, "")?
            }
            None => {
                let url = self.public_url(key).ok_or(ObjectStoreError::NotConfigured)?;
                self.http.get(url)
            }
        };

        let response = check_status(request.send().await?)?;
        let headers = response.headers();
        let content_type = header_string(headers.get(CONTENT_TYPE));
        let etag = header_string(headers.get(ETAG));
        let last_modified = header_string(headers.get(LAST_MODIFIED))
            .and_then(|raw| DateTime::parse_from_rfc2822(&raw).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let bytes = response.bytes().await?;
        debug!("Fetched {} bytes for {key}", bytes.len());
        Ok(StoredObject {
            bytes,
            content_type,
            etag,
            last_modified,
        })
    }

    /// ListObjectsV2. Requires credentials.
    #[instrument(skip(self))]
    pub async fn list_objects(
        &self,
        prefix: &str,
        max_keys: u32,
    ) -> Result<ListObjects, ObjectStoreError> {
        let (endpoint, bucket, credentials) =
            self.signing_target().ok_or(ObjectStoreError::NotConfigured)?;
        let uri = format!("/{}", uri_encode(bucket, true));
        // keys must be in sorted order for the canonical request
        let query = format!(
            "list-type=2&max-keys={max_keys}&prefix={}",
            uri_encode(prefix, true)
        );

        let response = check_status(self.signed_get(endpoint, credentials, &uri, &query)?.send().await?)?;
        let body = response.text().await?;
        parse_list_objects(&body)
    }

    fn signing_target(&self) -> Option<(&str, &str, &Credentials)> {
        match (&self.config.endpoint, &self.config.bucket, &self.config.credentials) {
            (Some(endpoint), Some(bucket), Some(credentials)) => {
                Some((endpoint.as_str(), bucket.as_str(), credentials))
            }
            _ => None,
        }
    }

    fn signed_get(
        &self,
        endpoint: &str,
        credentials: &Credentials,
        uri: &str,
        query: &str,
    ) -> Result<RequestBuilder, ObjectStoreError> {
        let mut raw = format!("{}{uri}", endpoint.trim_end_matches('/'));
        if !query.is_empty() {
            raw.push('?');
            raw.push_str(query);
        }
        let url = Url::parse(&raw)
            .map_err(|e| ObjectStoreError::Malformed(format!("invalid endpoint url {raw}: {e}")))?;
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(ObjectStoreError::NotConfigured),
        };

        let signed = sign(
            credentials,
            REGION,
            &CanonicalRequest {
                method: "GET",
                host: &host,
                uri,
                query,
            },
            Utc::now(),
        );

        Ok(self
            .http
            .get(url)
            .header("x-amz-date", signed.amz_date)
            .header("x-amz-content-sha256", EMPTY_PAYLOAD_SHA256)
            .header(AUTHORIZATION, signed.authorization))
    }
}

fn check_status(response: Response) -> Result<Response, ObjectStoreError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ObjectStoreError::from_status(status))
    }
}

fn header_string(value: Option<&reqwest::header::HeaderValue>) -> Option<String> {
    value
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}
