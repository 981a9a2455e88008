use crate::client::ObjectStoreError;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListObjects {
    pub objects: Vec<ObjectSummary>,
    pub is_truncated: bool,
}

/// Parses a ListObjectsV2 `ListBucketResult` document.
pub fn parse_list_objects(xml: &str) -> Result<ListObjects, ObjectStoreError> {
    if !xml.contains("<ListBucketResult") {
        return Err(ObjectStoreError::Malformed(
            "missing ListBucketResult element".to_string(),
        ));
    }

    let objects = elements(xml, "Contents")
        .into_iter()
        .map(|contents| {
            let key = element(contents, "Key")
                .map(unescape)
                .ok_or_else(|| ObjectStoreError::Malformed("object without Key".to_string()))?;
            let size = element(contents, "Size")
                .unwrap_or("0")
                .trim()
                .parse::<u64>()
                .map_err(|e| ObjectStoreError::Malformed(format!("bad Size for {key}: {e}")))?;
            let last_modified = element(contents, "LastModified")
                .and_then(|raw| DateTime::parse_from_rfc3339(raw.trim()).ok())
                .map(|dt| dt.with_timezone(&Utc));
            Ok(ObjectSummary {
                key,
                size,
                last_modified,
            })
        })
        .collect::<Result<Vec<ObjectSummary>, ObjectStoreError>>()?;

    let is_truncated = element(xml, "IsTruncated").is_some_and(|v| v.trim() == "true");

    Ok(ListObjects {
        objects,
        is_truncated,
    })
}

fn element<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(&xml[start..end])
}

fn elements<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut found = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find(&open) {
        let body = &rest[start + open.len()..];
        match body.find(&close) {
            Some(end) => {
                found.push(&body[..end]);
                rest = &body[end + close.len()..];
            }
            None => break,
        }
    }
    found
}

fn unescape(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
