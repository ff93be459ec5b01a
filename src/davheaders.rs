//! Typed versions of the Webdav request/response headers.
//!
//! Implemented on top of the `headers::Header` trait so they can be
//! read and written with `HeaderMapExt::typed_get`/`typed_insert`.
use std::time::Duration;

use headers::{self, Header};
use http::header::{HeaderName, HeaderValue};
use regex::Regex;

lazy_static! {
    static ref DEPTH: HeaderName = HeaderName::from_static("depth");
    static ref DESTINATION: HeaderName = HeaderName::from_static("destination");
    static ref OVERWRITE: HeaderName = HeaderName::from_static("overwrite");
    static ref TIMEOUT: HeaderName = HeaderName::from_static("timeout");
    static ref IF: HeaderName = HeaderName::from_static("if");
    static ref LOCK_TOKEN: HeaderName = HeaderName::from_static("lock-token");
    static ref CONTENT_LOCATION: HeaderName = HeaderName::from_static("content-location");
    static ref X_LITMUS: HeaderName = HeaderName::from_static("x-litmus");
    static ref TIMEOUT_RE: Regex = Regex::new(r"^Second-(\d+)$").unwrap();
}

fn one<'i, I>(values: &mut I) -> Result<&'i HeaderValue, headers::Error>
where
    I: Iterator<Item = &'i HeaderValue>,
{
    values.next().ok_or_else(headers::Error::invalid)
}

fn one_str<'i, I>(values: &mut I) -> Result<&'i str, headers::Error>
where
    I: Iterator<Item = &'i HeaderValue>,
{
    one(values)?.to_str().map_err(|_| headers::Error::invalid())
}

/// Depth: 0, 1, infinity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Zero,
    One,
    Infinity,
}

impl Header for Depth {
    fn name() -> &'static HeaderName {
        &DEPTH
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        match one_str(values)? {
            "0" => Ok(Depth::Zero),
            "1" => Ok(Depth::One),
            "infinity" | "Infinity" => Ok(Depth::Infinity),
            _ => Err(headers::Error::invalid()),
        }
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        let value = match self {
            Depth::Zero => "0",
            Depth::One => "1",
            Depth::Infinity => "infinity",
        };
        values.extend(Some(HeaderValue::from_static(value)));
    }
}

/// Destination: absolute URI or root-relative reference.
#[derive(Debug, Clone)]
pub struct Destination(pub String);

impl Header for Destination {
    fn name() -> &'static HeaderName {
        &DESTINATION
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let s = one_str(values)?;
        if s.starts_with('/') {
            return Ok(Destination(s.to_string()));
        }
        // Absolute URI: strip scheme and authority, keep the path.
        let url = url::Url::parse(s).map_err(|_| headers::Error::invalid())?;
        match url.scheme() {
            "http" | "https" => Ok(Destination(url.path().to_string())),
            _ => Err(headers::Error::invalid()),
        }
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        if let Ok(value) = HeaderValue::from_str(&self.0) {
            values.extend(Some(value));
        }
    }
}

/// Overwrite: T or F. Default is T.
#[derive(Debug, Clone, Copy)]
pub struct Overwrite(pub bool);

impl Header for Overwrite {
    fn name() -> &'static HeaderName {
        &OVERWRITE
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        match one_str(values)? {
            "T" => Ok(Overwrite(true)),
            "F" => Ok(Overwrite(false)),
            _ => Err(headers::Error::invalid()),
        }
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        let value = if self.0 { "T" } else { "F" };
        values.extend(Some(HeaderValue::from_static(value)));
    }
}

/// Timeout: comma separated list of "Second-N" or "Infinite".
/// `None` in the list means infinite.
#[derive(Debug, Clone)]
pub struct DavTimeout(pub Vec<Option<Duration>>);

impl Header for DavTimeout {
    fn name() -> &'static HeaderName {
        &TIMEOUT
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let mut v = Vec::new();
        for word in one_str(values)?.split(',').map(str::trim) {
            match word {
                "Infinite" => v.push(None),
                w => match TIMEOUT_RE.captures(w).and_then(|c| c[1].parse::<u64>().ok()) {
                    Some(secs) => v.push(Some(Duration::from_secs(secs))),
                    None => return Err(headers::Error::invalid()),
                },
            }
        }
        if v.is_empty() {
            return Err(headers::Error::invalid());
        }
        Ok(DavTimeout(v))
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        let s = self
            .0
            .iter()
            .map(|t| match t {
                None => "Infinite".to_string(),
                Some(d) => format!("Second-{}", d.as_secs()),
            })
            .collect::<Vec<_>>()
            .join(", ");
        if let Ok(value) = HeaderValue::from_str(&s) {
            values.extend(Some(value));
        }
    }
}

/// If: raw header value, parsed further by the `conditional` module.
#[derive(Debug, Clone)]
pub struct IfHeader(pub String);

impl Header for IfHeader {
    fn name() -> &'static HeaderName {
        &IF
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        Ok(IfHeader(one_str(values)?.to_string()))
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        if let Ok(value) = HeaderValue::from_str(&self.0) {
            values.extend(Some(value));
        }
    }
}

/// Lock-Token: one coded-url, "<opaquelocktoken:...>".
#[derive(Debug, Clone)]
pub struct LockToken(pub String);

impl LockToken {
    /// The token without the angle brackets.
    pub fn as_token(&self) -> &str {
        self.0
            .trim_start_matches('<')
            .trim_end_matches('>')
    }
}

impl Header for LockToken {
    fn name() -> &'static HeaderName {
        &LOCK_TOKEN
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let s = one_str(values)?.trim();
        if !s.starts_with('<') || !s.ends_with('>') {
            return Err(headers::Error::invalid());
        }
        Ok(LockToken(s.to_string()))
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        if let Ok(value) = HeaderValue::from_str(&self.0) {
            values.extend(Some(value));
        }
    }
}

/// Content-Location response header.
#[derive(Debug, Clone)]
pub struct ContentLocation(pub String);

impl Header for ContentLocation {
    fn name() -> &'static HeaderName {
        &CONTENT_LOCATION
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        Ok(ContentLocation(one_str(values)?.to_string()))
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        if let Ok(value) = HeaderValue::from_str(&self.0) {
            values.extend(Some(value));
        }
    }
}

/// X-Litmus: test name, sent by the litmus test suite. Only logged.
#[derive(Debug, Clone)]
pub struct XLitmus(pub String);

impl Header for XLitmus {
    fn name() -> &'static HeaderName {
        &X_LITMUS
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        Ok(XLitmus(one_str(values)?.to_string()))
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        if let Ok(value) = HeaderValue::from_str(&self.0) {
            values.extend(Some(value));
        }
    }
}
