use std::time::Duration;

use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};
use xmltree::{Element, XMLNode};

use crate::body::Body;
use crate::conditional::dav_if_tokens;
use crate::davhandler::DavHandler;
use crate::davheaders;
use crate::errors::DavError;
use crate::ls::DavLock;
use crate::props::list_lockdiscovery;
use crate::xmltree_ext::{element_to_xml, ElementExt};
use crate::DavResult;

// Used when the client does not ask for a timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3600);

// 200 OK with a lockdiscovery body. Only a newly created lock gets
// the Lock-Token response header.
fn lock_response(lock: &DavLock, new: bool) -> DavResult<Response<Body>> {
    let mut prop = Element::new2("D:prop").ns("D", "DAV:");
    let mut discovery = Element::new2("D:lockdiscovery");
    for active in list_lockdiscovery(std::slice::from_ref(lock)) {
        discovery.children.push(XMLNode::Element(active));
    }
    prop.children.push(XMLNode::Element(discovery));

    let mut xml = b"<?xml version=\"1.0\" encoding=\"utf-8\" ?>\n".to_vec();
    xml.extend(element_to_xml(&prop)?);

    let mut res = Response::builder()
        .header("Content-Type", "application/xml; charset=utf-8")
        .status(StatusCode::OK);
    if new {
        res = res.header("Lock-Token", format!("<{}>", lock.token));
    }
    Ok(res.body(Body::from(xml)).unwrap())
}

impl DavHandler {
    pub(crate) async fn handle_lock(
        &self,
        req: &Request<()>,
        body: &[u8],
    ) -> DavResult<Response<Body>> {
        let ls = match &self.ls {
            Some(ls) => ls,
            None => return Err(StatusCode::NOT_IMPLEMENTED.into()),
        };
        let mut path = self.path(req);

        // no lock-null resources, the target must exist.
        let meta = self
            .fs
            .metadata(&path)
            .await
            .map_err(|_| DavError::Status(StatusCode::PRECONDITION_FAILED))?;
        if meta.is_dir() {
            path.add_slash();
        }

        // the first entry of the Timeout header wins. the outer Option
        // distinguishes "no header" from "Infinite": a refresh without
        // a Timeout header keeps the lock's prior duration.
        let timeout = req
            .headers()
            .typed_get::<davheaders::DavTimeout>()
            .map(|t| t.0[0]);

        // an If header with a token makes this a refresh.
        let tokens = dav_if_tokens(req);
        if !tokens.is_empty() {
            if !body.is_empty() {
                return Err(StatusCode::BAD_REQUEST.into());
            }
            let lock = ls
                .refresh(&path, &tokens[0], timeout)
                .map_err(|_| DavError::Status(StatusCode::PRECONDITION_FAILED))?;
            return lock_response(&lock, false);
        }

        // only a new lock falls back to the default duration.
        let timeout = timeout.unwrap_or(Some(DEFAULT_TIMEOUT));

        // new lock: a strict lockinfo body with exactly one lockscope,
        // one locktype (write) and one owner.
        let root = Element::parse2(&body[..])?;
        if root.name != "lockinfo" {
            return Err(DavError::XmlParseError);
        }
        let mut shared: Option<bool> = None;
        let mut have_write = false;
        let mut owner: Option<Element> = None;
        for elem in root.child_elems() {
            match elem.name.as_str() {
                "lockscope" if shared.is_none() => {
                    match elem.child_elems().first().map(|e| e.name.as_str()) {
                        Some("exclusive") => shared = Some(false),
                        Some("shared") => shared = Some(true),
                        _ => return Err(DavError::XmlParseError),
                    }
                }
                "locktype" if !have_write => {
                    match elem.child_elems().first().map(|e| e.name.as_str()) {
                        Some("write") => have_write = true,
                        _ => return Err(DavError::XmlParseError),
                    }
                }
                "owner" if owner.is_none() => {
                    owner = Some(elem.clone());
                }
                _ => return Err(DavError::XmlParseError),
            }
        }
        let shared = match (shared, have_write, owner.as_ref()) {
            (Some(shared), true, Some(_)) => shared,
            _ => return Err(DavError::XmlParseError),
        };

        let deep = match req.headers().typed_get::<davheaders::Depth>() {
            None | Some(davheaders::Depth::Infinity) => true,
            Some(davheaders::Depth::Zero) => false,
            Some(davheaders::Depth::One) => return Err(StatusCode::BAD_REQUEST.into()),
        };

        match ls.lock(
            &path,
            self.principal(),
            owner.as_ref(),
            timeout,
            shared,
            deep,
        ) {
            Ok(lock) => lock_response(&lock, true),
            Err(conflict) => {
                debug!("lock on {path} blocked by {}", conflict.token);
                Err(StatusCode::LOCKED.into())
            }
        }
    }

    pub(crate) async fn handle_unlock(&self, req: &Request<()>) -> DavResult<Response<Body>> {
        let ls = match &self.ls {
            Some(ls) => ls,
            None => return Err(StatusCode::NOT_IMPLEMENTED.into()),
        };
        let path = self.path(req);

        let token = match req.headers().typed_get::<davheaders::LockToken>() {
            Some(token) => token,
            None => return Err(StatusCode::BAD_REQUEST.into()),
        };
        if self.fs.metadata(&path).await.is_err() {
            return Err(StatusCode::PRECONDITION_FAILED.into());
        }

        match ls.unlock(&path, token.as_token()) {
            Ok(()) => {
                let res = Response::builder()
                    .header("Content-Length", "0")
                    .status(StatusCode::NO_CONTENT);
                Ok(res.body(Body::empty()).unwrap())
            }
            Err(()) => Err(StatusCode::PRECONDITION_FAILED.into()),
        }
    }
}
