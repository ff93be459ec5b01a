//
// Evaluation of the precondition headers: the Webdav "If" header
// (reduced to what the engine needs: submitted lock tokens) and the
// HTTP conditionals used by GET.
//
use headers::HeaderMapExt;
use http::{Request, StatusCode};

use crate::davheaders;
use crate::davpath::DavPath;
use crate::ls::DavLockSystem;
use crate::DavResult;

// Pull the submitted lock tokens out of the If header.
//
// The full If grammar is (tagged) lists of conditions; the engine only
// needs the coded-urls, i.e. "<opaquelocktoken:...>" occurrences inside
// parenthesized lists. Etag conditions ("[...]") and "Not" are skipped.
pub(crate) fn dav_if_tokens(req: &Request<()>) -> Vec<String> {
    let hdr = match req.headers().typed_get::<davheaders::IfHeader>() {
        Some(h) => h.0,
        None => return Vec::new(),
    };
    let mut tokens = Vec::new();
    let mut in_list = false;
    let mut rest = hdr.as_str();
    while let Some(idx) = rest.find(['(', ')', '<', '[']) {
        let (ch, tail) = (&rest[idx..idx + 1], &rest[idx + 1..]);
        match ch {
            "(" => {
                in_list = true;
                rest = tail;
            }
            ")" => {
                in_list = false;
                rest = tail;
            }
            "<" => match tail.find('>') {
                Some(end) => {
                    if in_list {
                        tokens.push(tail[..end].to_string());
                    }
                    rest = &tail[end + 1..];
                }
                None => break,
            },
            "[" => match tail.find(']') {
                Some(end) => rest = &tail[end + 1..],
                None => break,
            },
            _ => unreachable!(),
        }
    }
    tokens
}

// If the path is locked, require that one of the submitted tokens
// unlocks it. 423 otherwise.
pub(crate) fn lock_check(
    ls: Option<&dyn DavLockSystem>,
    principal: Option<&str>,
    path: &DavPath,
    deep: bool,
    tokens: &[String],
) -> DavResult<()> {
    if let Some(ls) = ls {
        let t = tokens.iter().map(|s| s.as_str()).collect::<Vec<&str>>();
        if ls.check(path, principal, false, deep, t).is_err() {
            return Err(StatusCode::LOCKED.into());
        }
    }
    Ok(())
}
