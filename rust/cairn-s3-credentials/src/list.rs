//! Parsing of S3 [ListObjectsV2] responses fetched with
//! [Credentials::presign_list](crate::Credentials::presign_list).
//!
//! [ListObjectsV2]: https://docs.aws.amazon.com/AmazonS3/latest/API/API_ListObjectsV2.html

use serde::Deserialize;

use crate::AuthorizationError;

/// One page of a bucket listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListPage {
    /// Object keys returned in this page
    pub keys: Vec<String>,
    /// If true, there are more results to fetch
    pub is_truncated: bool,
    /// Token to pass to the next [presign_list](crate::Credentials::presign_list)
    pub next_continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "ListBucketResult")]
struct ListBucketResult {
    #[serde(rename = "IsTruncated", default)]
    is_truncated: bool,
    #[serde(rename = "Contents", default)]
    contents: Vec<Contents>,
    #[serde(rename = "NextContinuationToken")]
    next_continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Contents {
    #[serde(rename = "Key")]
    key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "Error")]
struct ErrorDocument {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message")]
    message: Option<String>,
}

/// Parse a ListObjectsV2 body.
///
/// An `<Error>` document becomes [AuthorizationError::Service]; anything
/// that is not a `ListBucketResult` is [AuthorizationError::InvalidListing].
pub fn parse_list_response(xml: &str) -> Result<ListPage, AuthorizationError> {
    if let Ok(error) = quick_xml::de::from_str::<ErrorDocument>(xml) {
        return Err(AuthorizationError::Service {
            code: error.code,
            message: error.message.unwrap_or_default(),
        });
    }

    // quick-xml fills defaults for unknown documents, so check the root.
    if !xml.contains("<ListBucketResult") {
        return Err(AuthorizationError::InvalidListing(
            "missing ListBucketResult element".into(),
        ));
    }

    let result: ListBucketResult = quick_xml::de::from_str(xml)
        .map_err(|error| AuthorizationError::InvalidListing(error.to_string()))?;

    Ok(ListPage {
        keys: result.contents.into_iter().map(|c| c.key).collect(),
        is_truncated: result.is_truncated,
        next_continuation_token: result.next_continuation_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_parses_an_empty_page() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <ListBucketResult>
                <IsTruncated>false</IsTruncated>
            </ListBucketResult>"#;

        let page = parse_list_response(xml).unwrap();
        assert!(page.keys.is_empty());
        assert!(!page.is_truncated);
        assert!(page.next_continuation_token.is_none());
    }

    #[test]
    fn it_parses_a_truncated_page() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <ListBucketResult>
                <IsTruncated>true</IsTruncated>
                <NextContinuationToken>abc123</NextContinuationToken>
                <Contents>
                    <Key>AFKREIA</Key>
                    <Size>100</Size>
                </Contents>
                <Contents>
                    <Key>AFKREIB</Key>
                    <Size>200</Size>
                </Contents>
            </ListBucketResult>"#;

        let page = parse_list_response(xml).unwrap();
        assert_eq!(page.keys, vec!["AFKREIA", "AFKREIB"]);
        assert!(page.is_truncated);
        assert_eq!(page.next_continuation_token.as_deref(), Some("abc123"));
    }

    #[test]
    fn it_surfaces_error_documents() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <Error>
                <Code>AccessDenied</Code>
                <Message>Request has expired</Message>
            </Error>"#;

        let error = parse_list_response(xml).unwrap_err();
        assert!(
            matches!(error, AuthorizationError::Service { ref code, .. } if code == "AccessDenied")
        );
    }

    #[test]
    fn it_rejects_unexpected_documents() {
        let xml = r#"<SomethingElse><Foo>bar</Foo></SomethingElse>"#;
        assert!(matches!(
            parse_list_response(xml),
            Err(AuthorizationError::InvalidListing(_))
        ));
        assert!(parse_list_response("not xml at all").is_err());
    }
}
