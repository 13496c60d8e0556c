//! S3 repository: notebooks stored as objects under a bucket prefix.
//!
//! Talks to the S3 REST API directly with AWS Signature V4 authentication
//! (`hmac` + `sha2`, no C dependencies). Custom endpoints (MinIO,
//! LocalStack) are addressed path-style.
//!
//! # Configuration
//!
//! ```toml
//! [repos.s3.backup]
//! bucket = "acme-notes"
//! prefix = "org/"
//! region = "us-east-1"
//! # endpoint_url = "http://localhost:9000"   # MinIO
//! ```
//!
//! Credentials come from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and
//! optionally `AWS_SESSION_TOKEN`.
//!
//! The revision marker is the object's ETag.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::book_name::{BookFormat, BookName};
use crate::config::S3RepoConfig;
use crate::models::{RemoteBook, RepoType};
use crate::traits::SyncRepo;

type HmacSha256 = Hmac<Sha256>;

pub struct S3Repo {
    url: String,
    config: S3RepoConfig,
    client: reqwest::Client,
}

impl S3Repo {
    pub fn new(config: S3RepoConfig) -> Self {
        Self {
            url: config.url(),
            config,
            client: reqwest::Client::new(),
        }
    }

    fn key_for(&self, relative: &str) -> String {
        let prefix = self.config.prefix.trim_matches('/');
        let relative = relative.trim_start_matches('/');
        if prefix.is_empty() {
            relative.to_string()
        } else {
            format!("{}/{}", prefix, relative)
        }
    }

    fn relative_of(&self, key: &str) -> String {
        let prefix = self.config.prefix.trim_matches('/');
        if prefix.is_empty() {
            return key.to_string();
        }
        key.strip_prefix(prefix)
            .map(|s| s.trim_start_matches('/').to_string())
            .unwrap_or_else(|| key.to_string())
    }

    async fn send(
        &self,
        method: reqwest::Method,
        key: Option<&str>,
        query: &[(String, String)],
        body: Vec<u8>,
    ) -> Result<reqwest::Response> {
        let creds = AwsCredentials::from_env()?;
        let endpoint = S3Endpoint::for_config(&self.config);

        let encoded_key = key
            .map(|k| k.split('/').map(uri_encode).collect::<Vec<_>>().join("/"))
            .unwrap_or_default();
        let canonical_uri = endpoint.canonical_uri(&self.config.bucket, &encoded_key);

        let mut sorted_params = query.to_vec();
        sorted_params.sort_by(|a, b| a.0.cmp(&b.0));
        let canonical_querystring: String = sorted_params
            .iter()
            .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let now = Utc::now();
        let signed = sign_request(&SigningInput {
            creds: &creds,
            region: &self.config.region,
            method: method.as_str(),
            host: &endpoint.host,
            canonical_uri: &canonical_uri,
            canonical_querystring: &canonical_querystring,
            payload_hash: &hex_sha256(&body),
            now,
        });

        let mut full_url = format!("{}://{}{}", endpoint.scheme, endpoint.host, canonical_uri);
        if !canonical_querystring.is_empty() {
            full_url.push('?');
            full_url.push_str(&canonical_querystring);
        }

        let mut req = self
            .client
            .request(method.clone(), &full_url)
            .header("Authorization", &signed.authorization)
            .header("x-amz-content-sha256", &signed.payload_hash)
            .header("x-amz-date", &signed.amz_date);
        if let Some(ref token) = creds.session_token {
            req = req.header("x-amz-security-token", token);
        }
        if !body.is_empty() || method == reqwest::Method::PUT {
            req = req.body(body);
        }

        let resp = req
            .send()
            .await
            .with_context(|| format!("S3 {} {} failed", method, full_url))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!(
                "S3 {} failed (HTTP {}) for {}: {}",
                method,
                status,
                key.unwrap_or("/"),
                text.chars().take(500).collect::<String>()
            );
        }
        Ok(resp)
    }

    /// Lists every object under the prefix, following continuation tokens.
    async fn list_objects(&self) -> Result<Vec<S3Object>> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;
        let prefix = self.config.prefix.trim_start_matches('/').to_string();

        loop {
            let mut query = vec![
                ("list-type".to_string(), "2".to_string()),
                ("max-keys".to_string(), "1000".to_string()),
            ];
            if !prefix.is_empty() {
                query.push(("prefix".to_string(), prefix.clone()));
            }
            if let Some(ref token) = continuation_token {
                query.push(("continuation-token".to_string(), token.clone()));
            }

            let resp = self
                .send(reqwest::Method::GET, None, &query, Vec::new())
                .await?;
            let xml_body = resp.text().await?;
            let (batch, is_truncated, next_token) = parse_list_objects_response(&xml_body);
            objects.extend(batch);

            match (is_truncated, next_token) {
                (true, Some(token)) => continuation_token = Some(token),
                _ => break,
            }
        }

        Ok(objects)
    }
}

#[async_trait]
impl SyncRepo for S3Repo {
    fn url(&self) -> &str {
        &self.url
    }

    fn repo_type(&self) -> RepoType {
        RepoType::S3
    }

    fn format(&self) -> BookFormat {
        self.config.format
    }

    async fn list_books(&self) -> Result<Vec<RemoteBook>> {
        let mut books: Vec<RemoteBook> = self
            .list_objects()
            .await?
            .into_iter()
            .map(|obj| RemoteBook {
                path: self.relative_of(&obj.key),
                revision: obj.etag,
                mtime: obj.last_modified,
            })
            .filter(|book| BookName::is_supported(&book.path))
            .collect();
        books.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(books)
    }

    async fn retrieve_book(&self, path: &str, dest: &Path) -> Result<RemoteBook> {
        let key = self.key_for(path);
        let resp = self
            .send(reqwest::Method::GET, Some(&key), &[], Vec::new())
            .await?;
        let (revision, mtime) = revision_from_headers(resp.headers());
        let bytes = resp.bytes().await?;
        std::fs::write(dest, &bytes)
            .with_context(|| format!("Failed to write {}", dest.display()))?;
        Ok(RemoteBook {
            path: path.to_string(),
            revision,
            mtime,
        })
    }

    async fn store_book(&self, src: &Path, path: &str) -> Result<RemoteBook> {
        let key = self.key_for(path);
        let body = std::fs::read(src).with_context(|| format!("Failed to read {}", src.display()))?;
        let resp = self
            .send(reqwest::Method::PUT, Some(&key), &[], body)
            .await?;
        let (revision, _) = revision_from_headers(resp.headers());
        Ok(RemoteBook {
            path: path.to_string(),
            revision,
            mtime: Utc::now().timestamp(),
        })
    }
}

fn revision_from_headers(headers: &reqwest::header::HeaderMap) -> (String, i64) {
    let etag = headers
        .get(reqwest::header::ETAG)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .trim_matches('"')
        .to_string();
    let mtime = headers
        .get(reqwest::header::LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| DateTime::parse_from_rfc2822(s).ok())
        .map(|dt| dt.timestamp())
        .unwrap_or_else(|| Utc::now().timestamp());
    (etag, mtime)
}

// ============ AWS Credentials ============

struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .context("AWS_ACCESS_KEY_ID environment variable not set")?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

// ============ Endpoint ============

struct S3Endpoint {
    scheme: &'static str,
    host: String,
    path_style: bool,
}

impl S3Endpoint {
    /// Virtual-hosted AWS endpoint, or path-style for a custom endpoint.
    fn for_config(config: &S3RepoConfig) -> Self {
        match config.endpoint_url {
            Some(ref endpoint) => {
                let scheme = if endpoint.starts_with("http://") {
                    "http"
                } else {
                    "https"
                };
                let host = endpoint
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .trim_end_matches('/')
                    .to_string();
                Self {
                    scheme,
                    host,
                    path_style: true,
                }
            }
            None => Self {
                scheme: "https",
                host: format!("{}.s3.{}.amazonaws.com", config.bucket, config.region),
                path_style: false,
            },
        }
    }

    fn canonical_uri(&self, bucket: &str, encoded_key: &str) -> String {
        match (self.path_style, encoded_key.is_empty()) {
            (true, true) => format!("/{}", uri_encode(bucket)),
            (true, false) => format!("/{}/{}", uri_encode(bucket), encoded_key),
            (false, _) => format!("/{}", encoded_key),
        }
    }
}

// ============ AWS SigV4 ============

struct SigningInput<'a> {
    creds: &'a AwsCredentials,
    region: &'a str,
    method: &'a str,
    host: &'a str,
    canonical_uri: &'a str,
    canonical_querystring: &'a str,
    payload_hash: &'a str,
    now: DateTime<Utc>,
}

struct SignedHeaders {
    authorization: String,
    amz_date: String,
    payload_hash: String,
}

fn sign_request(input: &SigningInput<'_>) -> SignedHeaders {
    let date_stamp = input.now.format("%Y%m%d").to_string();
    let amz_date = input.now.format("%Y%m%dT%H%M%SZ").to_string();

    let mut headers = vec![
        ("host".to_string(), input.host.to_string()),
        (
            "x-amz-content-sha256".to_string(),
            input.payload_hash.to_string(),
        ),
        ("x-amz-date".to_string(), amz_date.clone()),
    ];
    if let Some(ref token) = input.creds.session_token {
        headers.push(("x-amz-security-token".to_string(), token.clone()));
    }
    headers.sort_by(|a, b| a.0.cmp(&b.0));

    let signed_headers: String = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");
    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v))
        .collect();

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        input.method,
        input.canonical_uri,
        input.canonical_querystring,
        canonical_headers,
        signed_headers,
        input.payload_hash
    );

    let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, input.region);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        credential_scope,
        hex_sha256(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(
        &input.creds.secret_access_key,
        &date_stamp,
        input.region,
        "s3",
    );
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

    SignedHeaders {
        authorization: format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            input.creds.access_key_id, credential_scope, signed_headers, signature
        ),
        amz_date,
        payload_hash: input.payload_hash.to_string(),
    }
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 encoding of everything except `A-Z a-z 0-9 - _ . ~`.
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

// ============ XML Parsing ============

struct S3Object {
    key: String,
    last_modified: i64,
    etag: String,
}

/// Returns the objects, whether the listing is truncated and the next
/// continuation token.
fn parse_list_objects_response(xml: &str) -> (Vec<S3Object>, bool, Option<String>) {
    let mut objects = Vec::new();
    let is_truncated = extract_xml_value(xml, "IsTruncated")
        .map(|v| v == "true")
        .unwrap_or(false);
    let next_token = extract_xml_value(xml, "NextContinuationToken");

    let mut remaining = xml;
    while let Some(start) = remaining.find("<Contents>") {
        let block_start = start + "<Contents>".len();
        let Some(end) = remaining[block_start..].find("</Contents>") else {
            break;
        };
        let block = &remaining[block_start..block_start + end];
        remaining = &remaining[block_start + end + "</Contents>".len()..];

        let key = extract_xml_value(block, "Key").unwrap_or_default();
        if key.is_empty() || key.ends_with('/') {
            continue;
        }

        let last_modified = extract_xml_value(block, "LastModified")
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.timestamp())
            .unwrap_or(0);

        let etag = extract_xml_value(block, "ETag")
            .unwrap_or_default()
            .replace("&quot;", "\"")
            .trim_matches('"')
            .to_string();

        objects.push(S3Object {
            key,
            last_modified,
            etag,
        });
    }

    (objects, is_truncated, next_token)
}

fn extract_xml_value(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)?;
    Some(xml[start..start + end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book_name::BookFormat;

    fn config(prefix: &str, endpoint: Option<&str>) -> S3RepoConfig {
        S3RepoConfig {
            bucket: "notes".to_string(),
            prefix: prefix.to_string(),
            region: "us-east-1".to_string(),
            endpoint_url: endpoint.map(str::to_string),
            format: BookFormat::Org,
        }
    }

    #[test]
    fn test_parses_listing_with_quoted_etags() {
        let xml = r#"<ListBucketResult>
            <IsTruncated>true</IsTruncated>
            <NextContinuationToken>abc</NextContinuationToken>
            <Contents><Key>org/todo.org</Key><LastModified>2024-03-01T10:00:00.000Z</LastModified><ETag>&quot;d41d8&quot;</ETag></Contents>
            <Contents><Key>org/sub/</Key><ETag>"x"</ETag></Contents>
        </ListBucketResult>"#;
        let (objects, truncated, token) = parse_list_objects_response(xml);
        assert!(truncated);
        assert_eq!(token.as_deref(), Some("abc"));
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].key, "org/todo.org");
        assert_eq!(objects[0].etag, "d41d8");
        assert_eq!(objects[0].last_modified, 1709287200);
    }

    #[test]
    fn test_keys_and_relative_paths_follow_prefix() {
        let repo = S3Repo::new(config("/org/", None));
        assert_eq!(repo.url(), "s3://notes/org");
        assert_eq!(repo.key_for("todo.org"), "org/todo.org");
        assert_eq!(repo.relative_of("org/journal/2024.org"), "journal/2024.org");

        let flat = S3Repo::new(config("", None));
        assert_eq!(flat.key_for("todo.org"), "todo.org");
    }

    #[test]
    fn test_custom_endpoint_is_path_style() {
        let endpoint = S3Endpoint::for_config(&config("", Some("http://localhost:9000/")));
        assert_eq!(endpoint.scheme, "http");
        assert_eq!(endpoint.host, "localhost:9000");
        assert_eq!(endpoint.canonical_uri("notes", "todo.org"), "/notes/todo.org");

        let aws = S3Endpoint::for_config(&config("", None));
        assert_eq!(aws.host, "notes.s3.us-east-1.amazonaws.com");
        assert_eq!(aws.canonical_uri("notes", "todo.org"), "/todo.org");
    }

    #[test]
    fn test_signing_is_deterministic() {
        let creds = AwsCredentials {
            access_key_id: "AKID".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: None,
        };
        let now = DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let input = SigningInput {
            creds: &creds,
            region: "us-east-1",
            method: "GET",
            host: "notes.s3.us-east-1.amazonaws.com",
            canonical_uri: "/todo.org",
            canonical_querystring: "",
            payload_hash: &hex_sha256(b""),
            now,
        };
        let a = sign_request(&input);
        let b = sign_request(&input);
        assert_eq!(a.authorization, b.authorization);
        assert_eq!(a.amz_date, "20240301T100000Z");
        assert!(a
            .authorization
            .starts_with("AWS4-HMAC-SHA256 Credential=AKID/20240301/us-east-1/s3/aws4_request"));
        assert!(a.authorization.contains("SignedHeaders=host;x-amz-content-sha256;x-amz-date"));
    }

    #[test]
    fn test_uri_encode_reserved_characters() {
        assert_eq!(uri_encode("a b/c"), "a%20b%2Fc");
        assert_eq!(uri_encode("safe-_.~"), "safe-_.~");
    }
}
