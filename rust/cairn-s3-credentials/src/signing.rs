//! AWS S3 Signature Version 4 signing implementation.
//!
//! A [SigningContext] captures every input to the signature. Signing it
//! produces a [PresignedRequest] in one of two modes:
//!
//! - [query string authentication]: credential, expiry and signature travel
//!   in the URL, so the URL alone grants access until it expires.
//! - [header authentication]: the signature travels in an `Authorization`
//!   header next to `x-amz-date` and `x-amz-content-sha256`.
//!
//! [query string authentication]: https://docs.aws.amazon.com/AmazonS3/latest/API/sigv4-query-string-auth.html
//! [header authentication]: https://docs.aws.amazon.com/AmazonS3/latest/API/sig-v4-header-based-auth.html

use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{DateTime, SubsecRound, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::{Address, PayloadHash, PresignedRequest};

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";

/// HTTP verbs that can be presigned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// Fetch an object or a listing
    Get,
    /// Upload an object
    Put,
    /// Fetch object metadata
    Head,
    /// Remove an object
    Delete,
}

impl Verb {
    /// The method name as it appears on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Head => "HEAD",
            Self::Delete => "DELETE",
        }
    }
}

/// Everything that determines a request signature.
///
/// Built once with the `with_*` methods and then only read. The timestamp is
/// truncated to whole seconds on construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningContext {
    verb: Verb,
    host: String,
    key: String,
    payload: PayloadHash,
    expires: Option<u64>,
    public_read: bool,
    header_auth: bool,
    query: BTreeMap<String, String>,
    headers: BTreeMap<String, String>,
    access_key_id: String,
    region: String,
    time: DateTime<Utc>,
}

impl SigningContext {
    /// A query-authenticated request for `key` with an unsigned payload
    pub fn new(
        verb: Verb,
        address: &Address,
        key: impl Into<String>,
        access_key_id: impl Into<String>,
        time: DateTime<Utc>,
    ) -> Self {
        Self {
            verb,
            host: address.host().to_string(),
            key: key.into(),
            payload: PayloadHash::Unsigned,
            expires: None,
            public_read: false,
            header_auth: false,
            query: BTreeMap::new(),
            headers: BTreeMap::new(),
            access_key_id: access_key_id.into(),
            region: address.region().to_string(),
            time: time.trunc_subsecs(0),
        }
    }

    /// Commit to a payload hash
    pub fn with_payload(mut self, payload: PayloadHash) -> Self {
        self.payload = payload;
        self
    }

    /// Bound the validity of a query-authenticated request
    pub fn with_expires(mut self, seconds: Option<u64>) -> Self {
        self.expires = seconds;
        self
    }

    /// Mark an upload as publicly readable (`x-amz-acl: public-read`)
    pub fn with_public_read(mut self, public_read: bool) -> Self {
        self.public_read = public_read;
        self
    }

    /// Sign with an `Authorization` header instead of the query string
    pub fn with_header_auth(mut self, header_auth: bool) -> Self {
        self.header_auth = header_auth;
        self
    }

    /// Add a query parameter
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Add a header that will be sent and signed
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// The signing time, in whole seconds
    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    /// ISO 8601 basic timestamp, e.g. `20130524T000000Z`
    pub fn timestamp(&self) -> String {
        self.time.format("%Y%m%dT%H%M%SZ").to_string()
    }

    fn short_date(&self) -> String {
        self.time.format("%Y%m%d").to_string()
    }

    /// `date/region/s3/aws4_request`
    pub fn scope(&self) -> String {
        format!(
            "{}/{}/{}/aws4_request",
            self.short_date(),
            self.region,
            SERVICE
        )
    }

    fn credential(&self) -> String {
        format!("{}/{}", self.access_key_id, self.scope())
    }

    /// Query parameters before the signature is added, sorted by name
    pub fn query_parameters(&self) -> BTreeMap<String, String> {
        let mut query = self.query.clone();
        if !self.header_auth {
            query.insert("X-Amz-Algorithm".into(), ALGORITHM.into());
            query.insert("X-Amz-Credential".into(), self.credential());
            query.insert("X-Amz-Date".into(), self.timestamp());
            if let Some(expires) = self.expires {
                query.insert("X-Amz-Expires".into(), expires.to_string());
            }
            query.insert("X-Amz-SignedHeaders".into(), "host".into());
        }
        query
    }

    /// Headers sent with the request, before any `Authorization` header
    pub fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![("Host".to_string(), self.host.clone())];
        if !self.header_auth {
            return headers;
        }
        headers.push(("x-amz-date".into(), self.timestamp()));
        headers.push(("x-amz-content-sha256".into(), self.payload.to_string()));
        headers.extend(
            self.headers
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );
        if self.public_read {
            headers.push(("x-amz-acl".into(), "public-read".into()));
        }
        headers
    }

    fn canonical_headers(&self) -> BTreeMap<String, String> {
        self.headers()
            .into_iter()
            .map(|(name, value)| (name.to_lowercase(), value.trim().to_string()))
            .collect()
    }

    /// Lower-cased header names, sorted and joined with `;`
    pub fn signed_headers(&self) -> String {
        self.canonical_headers()
            .into_keys()
            .collect::<Vec<_>>()
            .join(";")
    }

    /// The canonical request whose hash is signed
    pub fn canonical_request(&self) -> String {
        let mut request = String::new();
        request.push_str(self.verb.as_str());
        request.push('\n');
        request.push('/');
        request.push_str(&percent_encode_path(&self.key));
        request.push('\n');
        request.push_str(&canonical_query(&self.query_parameters()));
        request.push('\n');
        for (name, value) in self.canonical_headers() {
            request.push_str(&name);
            request.push(':');
            request.push_str(&value);
            request.push('\n');
        }
        request.push('\n');
        request.push_str(&self.signed_headers());
        request.push('\n');
        request.push_str(&self.payload.to_string());
        request
    }

    /// `AWS4-HMAC-SHA256`, timestamp, scope and the canonical request hash
    pub fn string_to_sign(&self) -> String {
        format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            self.timestamp(),
            self.scope(),
            hex_encode(&Sha256::digest(self.canonical_request().as_bytes()))
        )
    }

    /// Sign with `secret_access_key` and assemble the request
    pub fn presign(&self, secret_access_key: &str) -> PresignedRequest {
        let signature = compute_signature(self, secret_access_key);

        let mut query = self.query_parameters();
        if !self.header_auth {
            query.insert("X-Amz-Signature".into(), signature.clone());
        }

        let mut url = format!("https://{}/{}", self.host, percent_encode_path(&self.key));
        if !query.is_empty() {
            url.push('?');
            url.push_str(&canonical_query(&query));
        }

        let mut headers = self.headers();
        if self.header_auth {
            headers.push((
                "Authorization".into(),
                format!(
                    "{} Credential={},SignedHeaders={},Signature={}",
                    ALGORITHM,
                    self.credential(),
                    self.signed_headers(),
                    signature
                ),
            ));
        }

        PresignedRequest { url, headers }
    }
}

/// Hex-encoded SigV4 signature of `context` under `secret_access_key`
pub fn compute_signature(context: &SigningContext, secret_access_key: &str) -> String {
    let key = SigningKey::derive(
        secret_access_key,
        &context.short_date(),
        &context.region,
        SERVICE,
    );
    hex_encode(&key.sign(context.string_to_sign().as_bytes()))
}

fn canonical_query(query: &BTreeMap<String, String>) -> String {
    query
        .iter()
        .map(|(name, value)| format!("{}={}", percent_encode(name), percent_encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// AWS SigV4 signing key derived from credentials.
///
/// The key is derived through an HMAC chain:
/// `HMAC(HMAC(HMAC(HMAC("AWS4" + secret, date), region), service), "aws4_request")`
#[derive(Debug, Clone)]
struct SigningKey(Vec<u8>);

impl SigningKey {
    fn derive(secret: &str, date: &str, region: &str, service: &str) -> Self {
        let secret = format!("AWS4{}", secret);
        let k_date = Self::hmac(secret.as_bytes(), date.as_bytes());
        let k_region = Self::hmac(&k_date, region.as_bytes());
        let k_service = Self::hmac(&k_region, service.as_bytes());
        Self(Self::hmac(&k_service, b"aws4_request"))
    }

    fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
        let mut mac =
            Hmac::<Sha256>::new_from_slice(key).expect("HMAC-SHA256 accepts keys of any size");
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }

    fn sign(&self, data: &[u8]) -> Vec<u8> {
        Self::hmac(&self.0, data)
    }
}

/// Encode bytes as lowercase hexadecimal string.
pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(s, "{:02x}", byte);
    }
    s
}

/// Percent-encode a string according to RFC 3986.
///
/// Unreserved characters (A-Z, a-z, 0-9, `-`, `_`, `.`, `~`) are not encoded.
/// All other bytes are encoded as `%XX` where XX is the uppercase hex value.
fn percent_encode(s: &str) -> String {
    let mut result = String::with_capacity(s.len() * 3);
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                let _ = write!(result, "%{:02X}", byte);
            }
        }
    }
    result
}

/// Like [percent_encode], keeping `/` so keys can name a hierarchy.
fn percent_encode_path(path: &str) -> String {
    percent_encode(path).replace("%2F", "/")
}
