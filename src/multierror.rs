//
// Per-operation result accumulator for the recursive COPY/MOVE/DELETE
// algorithms. Collects (path, status) pairs for the resources that
// failed; decides whether the final response is a single status or a
// 207 Multi-Status document listing exactly the failures.
//
use std::borrow::Cow;

use http::{Response, StatusCode};
use xml::common::XmlVersion;
use xml::writer::{EmitterConfig, EventWriter, XmlEvent as XmlWEvent};
use xmltree::Element;

use crate::body::Body;
use crate::davpath::DavPath;
use crate::util::MemBuffer;
use crate::xmltree_ext::ElementExt;
use crate::DavResult;

#[derive(Default)]
pub(crate) struct MultiError {
    errors: Vec<(DavPath, StatusCode)>,
}

impl MultiError {
    pub fn new() -> MultiError {
        MultiError::default()
    }

    pub fn add_status(&mut self, path: &DavPath, status: impl Into<StatusCode>) {
        self.errors.push((path.clone(), status.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Build the final response: `ok_status` with an empty body if
    /// nothing failed, otherwise a 207 document listing the failures.
    /// Successful resources are implicit and never listed.
    pub fn into_response(self, ok_status: StatusCode) -> DavResult<Response<Body>> {
        let mut res = Response::new(Body::empty());
        if self.errors.is_empty() {
            *res.status_mut() = ok_status;
            res.headers_mut()
                .insert("content-length", "0".parse().unwrap());
            return Ok(res);
        }

        let mut buffer = MemBuffer::new();
        let mut emitter = EventWriter::new_with_config(
            &mut buffer,
            EmitterConfig {
                normalize_empty_elements: false,
                perform_indent: false,
                indent_string: Cow::Borrowed(""),
                ..Default::default()
            },
        );
        emitter.write(XmlWEvent::StartDocument {
            version: XmlVersion::Version10,
            encoding: Some("utf-8"),
            standalone: None,
        })?;
        emitter.write(XmlWEvent::start_element("D:multistatus").ns("D", "DAV:"))?;
        for (path, status) in &self.errors {
            emitter.write(XmlWEvent::start_element("D:response"))?;
            Element::new2("D:href")
                .text(path.as_url_string_with_prefix())
                .write_ev(&mut emitter)?;
            Element::new2("D:status")
                .text(format!("HTTP/1.1 {status}"))
                .write_ev(&mut emitter)?;
            emitter.write(XmlWEvent::end_element())?;
        }
        emitter.write(XmlWEvent::end_element())?;

        *res.status_mut() = StatusCode::MULTI_STATUS;
        res.headers_mut().insert(
            "content-type",
            "application/xml; charset=utf-8".parse().unwrap(),
        );
        *res.body_mut() = Body::from(buffer.take());
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    async fn body_string(body: Body) -> String {
        let mut s = String::new();
        let mut body = body;
        while let Some(chunk) = body.next().await {
            s.push_str(std::str::from_utf8(&chunk.unwrap()).unwrap());
        }
        s
    }

    #[tokio::test]
    async fn empty_accumulator_is_single_status() {
        let me = MultiError::new();
        let res = me.into_response(StatusCode::NO_CONTENT).unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn failures_become_207() {
        let mut me = MultiError::new();
        me.add_status(
            &DavPath::new("/a/b", "").unwrap(),
            StatusCode::FORBIDDEN,
        );
        let res = me.into_response(StatusCode::OK).unwrap();
        assert_eq!(res.status(), StatusCode::MULTI_STATUS);
        let body = body_string(res.into_body()).await;
        assert!(body.contains("/a/b"));
        assert!(body.contains("403"));
        assert!(!body.contains("200 OK"));
    }
}
