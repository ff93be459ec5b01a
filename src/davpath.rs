//! Utility module to handle the path part of an URL.
//!
//! A `DavPath` is always rooted at the prefix that was stripped off the
//! request URL, percent-decoded, and normalized (no `.` or `..` segments).
//! It doubles as the engine-internal unique key of a resource.
use std::fmt;

use http::uri::Uri;
use percent_encoding::{percent_decode, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::errors::DavError;
use crate::DavResult;

// Encode all characters that are not valid raw in a path segment.
const PATH_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'%');

/// URL path, with hidden prefix.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DavPath {
    path: String,
    prefix: String,
}

impl fmt::Display for DavPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

impl fmt::Debug for DavPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.path)
    }
}

// Normalize the path: interpret empty, "." and ".." segments.
// A ".." that would escape the root is forbidden.
fn normalize(path: &str) -> DavResult<String> {
    if !path.starts_with('/') {
        return Err(DavError::InvalidPath);
    }
    let mut segs: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                if segs.pop().is_none() {
                    return Err(DavError::ForbiddenPath);
                }
            }
            s => segs.push(s),
        }
    }
    let mut p = String::with_capacity(path.len());
    for seg in &segs {
        p.push('/');
        p.push_str(seg);
    }
    if p.is_empty() || path.ends_with('/') {
        p.push('/');
    }
    Ok(p)
}

impl DavPath {
    /// Create a new DavPath from a percent-encoded path and a prefix.
    pub fn new(src: &str, prefix: &str) -> DavResult<DavPath> {
        let rest = match src.strip_prefix(prefix) {
            Some(rest) if prefix.is_empty() || rest.is_empty() || rest.starts_with('/') => rest,
            _ => return Err(DavError::IllegalPath),
        };
        let rest = if rest.is_empty() { "/" } else { rest };
        let decoded = percent_decode(rest.as_bytes())
            .decode_utf8()
            .map_err(|_| DavError::InvalidPath)?;
        if decoded.contains('\0') {
            return Err(DavError::InvalidPath);
        }
        Ok(DavPath {
            path: normalize(&decoded)?,
            prefix: prefix.to_string(),
        })
    }

    /// Create a new DavPath from a request URI and a prefix to be stripped off.
    pub fn from_uri_and_prefix(uri: &Uri, prefix: &str) -> DavResult<DavPath> {
        match uri.path() {
            "*" => Ok(DavPath {
                path: "*".to_string(),
                prefix: prefix.to_string(),
            }),
            path => DavPath::new(path, prefix),
        }
    }

    /// Is this a collection i.e. does the original path end in "/".
    pub fn is_collection(&self) -> bool {
        self.path.ends_with('/')
    }

    /// Add a trailing slash, if not yet present.
    pub fn add_slash(&mut self) {
        if !self.is_collection() {
            self.path.push('/');
        }
    }

    /// Add a path segment (a single name, no slashes).
    pub fn push_segment(&mut self, seg: &str) {
        self.add_slash();
        self.path.push_str(seg);
    }

    /// The last segment of the path.
    pub fn file_name(&self) -> &str {
        self.path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or("")
    }

    /// The parent collection of this path. The root is its own parent.
    pub fn parent(&self) -> DavPath {
        let stripped = self.path.trim_end_matches('/');
        if stripped.is_empty() {
            return DavPath {
                path: "/".to_string(),
                prefix: self.prefix.clone(),
            };
        }
        let idx = stripped.rfind('/').unwrap_or(0);
        DavPath {
            path: stripped[..=idx].to_string(),
            prefix: self.prefix.clone(),
        }
    }

    /// The decoded path relative to the prefix. This is the resource's
    /// unique key within one engine instance.
    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// Percent-encoded path, without prefix.
    pub fn as_url_string(&self) -> String {
        utf8_percent_encode(&self.path, PATH_ENCODE_SET).to_string()
    }

    /// Percent-encoded path, with prefix.
    pub fn as_url_string_with_prefix(&self) -> String {
        let mut p = utf8_percent_encode(&self.prefix, PATH_ENCODE_SET).to_string();
        p.push_str(&self.as_url_string());
        p
    }

    /// Guess the mime type from the file name.
    pub fn get_mime_type_str(&self) -> String {
        mime_guess::from_path(self.file_name())
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }

    /// True if `self` is `other` or a descendant of `other`.
    pub fn is_beneath(&self, other: &DavPath) -> bool {
        let base = other.path.trim_end_matches('/');
        match self.path.strip_prefix(base) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_dots_and_slashes() {
        let p = DavPath::new("/a//b/./c/../d", "").unwrap();
        assert_eq!(p.as_str(), "/a/b/d");
        assert!(DavPath::new("/../x", "").is_err());
    }

    #[test]
    fn prefix_is_stripped_and_restored() {
        let p = DavPath::new("/dav/foo%20bar", "/dav").unwrap();
        assert_eq!(p.as_str(), "/foo bar");
        assert_eq!(p.as_url_string(), "/foo%20bar");
        assert_eq!(p.as_url_string_with_prefix(), "/dav/foo%20bar");
        assert!(DavPath::new("/other/foo", "/dav").is_err());
    }

    #[test]
    fn parent_and_file_name() {
        let p = DavPath::new("/a/b/c/", "").unwrap();
        assert!(p.is_collection());
        assert_eq!(p.file_name(), "c");
        assert_eq!(p.parent().as_str(), "/a/b/");
        assert_eq!(DavPath::new("/top", "").unwrap().parent().as_str(), "/");
        assert_eq!(DavPath::new("/", "").unwrap().parent().as_str(), "/");
    }

    #[test]
    fn beneath() {
        let root = DavPath::new("/a/", "").unwrap();
        let child = DavPath::new("/a/b", "").unwrap();
        let other = DavPath::new("/ab", "").unwrap();
        assert!(child.is_beneath(&root));
        assert!(root.is_beneath(&root));
        assert!(!other.is_beneath(&root));
    }
}
