//! Request body parsing: URL-encoded forms, multipart forms and JSON.

use bytes::Bytes;
use futures::stream;
use http::HeaderMap;
use http::header::CONTENT_TYPE;
use serde_json::Value;

use crate::error::{Error, Result};

/// Fields extracted from a request body.
#[derive(Debug, Default)]
pub(crate) struct ParsedBody {
    /// Form fields in body order, duplicates kept.
    pub form: Vec<(String, String)>,
    /// Decoded JSON document and its raw text.
    pub json: Option<(Value, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    UrlEncoded,
    Multipart,
    Json,
    Other,
}

fn body_kind(headers: &HeaderMap) -> (BodyKind, Option<&str>) {
    let Some(content_type) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return (BodyKind::Other, None);
    };
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let kind = match mime.as_str() {
        "application/x-www-form-urlencoded" => BodyKind::UrlEncoded,
        "multipart/form-data" => BodyKind::Multipart,
        m if m == "application/json" || m.ends_with("+json") => BodyKind::Json,
        _ => BodyKind::Other,
    };
    (kind, Some(content_type))
}

/// Parse `body` according to its `Content-Type`.
///
/// Bodies of any other type, and empty bodies, yield no fields.
pub(crate) fn parse_body(headers: &HeaderMap, body: &[u8]) -> Result<ParsedBody> {
    let mut parsed = ParsedBody::default();
    if body.is_empty() {
        return Ok(parsed);
    }

    match body_kind(headers) {
        (BodyKind::UrlEncoded, _) => {
            parsed.form = url::form_urlencoded::parse(body).into_owned().collect();
        }
        (BodyKind::Multipart, Some(content_type)) => {
            parsed.form = parse_multipart(content_type, Bytes::copy_from_slice(body))?;
        }
        (BodyKind::Json, _) => {
            let value: Value = serde_json::from_slice(body)
                .map_err(|e| Error::Body(format!("invalid JSON: {e}")))?;
            let raw = String::from_utf8_lossy(body).into_owned();
            parsed.json = Some((value, raw));
        }
        _ => {}
    }
    Ok(parsed)
}

/// Text fields of a multipart body. File parts are skipped.
fn parse_multipart(content_type: &str, body: Bytes) -> Result<Vec<(String, String)>> {
    let boundary = multer::parse_boundary(content_type).map_err(|e| Error::Body(e.to_string()))?;
    let stream = stream::once(async move { Ok::<Bytes, std::io::Error>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    futures::executor::block_on(async move {
        let mut fields = Vec::new();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| Error::Body(e.to_string()))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            if field.file_name().is_some() {
                tracing::debug!(field = %name, "skipping multipart file part");
                continue;
            }
            let value = field.text().await.map_err(|e| Error::Body(e.to_string()))?;
            fields.push((name, value));
        }
        Ok::<_, Error>(fields)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(content_type: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        headers
    }

    #[test]
    fn test_urlencoded() {
        let parsed = parse_body(
            &headers("application/x-www-form-urlencoded; charset=utf-8"),
            b"name=Ada+L&tag=a&tag=b",
        )
        .unwrap();
        assert_eq!(
            parsed.form,
            vec![
                ("name".to_string(), "Ada L".to_string()),
                ("tag".to_string(), "a".to_string()),
                ("tag".to_string(), "b".to_string()),
            ]
        );
    }

    #[test]
    fn test_multipart_skips_files() {
        let body = "--XYZ\r\n\
            Content-Disposition: form-data; name=\"title\"\r\n\r\n\
            hello\r\n\
            --XYZ\r\n\
            Content-Disposition: form-data; name=\"upload\"; filename=\"a.txt\"\r\n\
            Content-Type: text/plain\r\n\r\n\
            file body\r\n\
            --XYZ--\r\n";
        let content_type = headers("multipart/form-data; boundary=XYZ");
        let parsed = parse_body(&content_type, body.as_bytes()).unwrap();
        assert_eq!(parsed.form, vec![("title".to_string(), "hello".to_string())]);
    }

    #[test]
    fn test_json() {
        let parsed = parse_body(&headers("application/json"), br#"{"a":1}"#).unwrap();
        let (value, raw) = parsed.json.unwrap();
        assert_eq!(value["a"], 1);
        assert_eq!(raw, r#"{"a":1}"#);
    }

    #[test]
    fn test_malformed_json() {
        let err = parse_body(&headers("application/json"), b"{nope").unwrap_err();
        assert!(matches!(err, Error::Body(_)));
    }

    #[test]
    fn test_other_and_empty() {
        assert!(parse_body(&headers("text/plain"), b"a=b").unwrap().form.is_empty());
        assert!(parse_body(&headers("application/json"), b"").unwrap().json.is_none());
        assert!(parse_body(&HeaderMap::new(), b"a=b").unwrap().form.is_empty());
    }
}
