use std::io;
use std::ops::Bound;

use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};

use crate::async_stream::AsyncStream;
use crate::body::Body;
use crate::davhandler::DavHandler;
use crate::fs::{OpenOptions, SeekFrom};
use crate::DavResult;

pub(crate) const READ_BUF_SIZE: usize = 65536;

impl DavHandler {
    pub(crate) async fn handle_get(&self, req: &Request<()>) -> DavResult<Response<Body>> {
        let head = req.method() == http::Method::HEAD;
        let mut path = self.path(req);

        let meta = self.fs.metadata(&path).await?;
        let mut res = Response::new(Body::empty());
        let meta = self.fixpath(&mut res, &mut path, meta);

        // A collection has no byte stream to serve.
        if meta.is_dir() {
            res.headers_mut()
                .insert("Content-Length", "0".parse().unwrap());
            *res.status_mut() = StatusCode::NO_CONTENT;
            return Ok(res);
        }

        let len = meta.len();
        let etag = meta
            .etag()
            .and_then(|t| format!("\"{t}\"").parse::<headers::ETag>().ok());
        let modified = meta.modified().ok();

        if let (Some(im), Some(etag)) = (req.headers().typed_get::<headers::IfMatch>(), &etag) {
            if !im.precondition_passes(etag) {
                return Err(StatusCode::PRECONDITION_FAILED.into());
            }
        }
        let mut not_modified = false;
        if let Some(inm) = req.headers().typed_get::<headers::IfNoneMatch>() {
            if let Some(etag) = &etag {
                not_modified = !inm.precondition_passes(etag);
            }
        } else if let (Some(ims), Some(modified)) = (
            req.headers().typed_get::<headers::IfModifiedSince>(),
            modified,
        ) {
            not_modified = !ims.is_modified(modified);
        }
        if not_modified {
            if let Some(etag) = etag {
                res.headers_mut().typed_insert(etag);
            }
            *res.status_mut() = StatusCode::NOT_MODIFIED;
            return Ok(res);
        }

        // Range, held against If-Range. An unsatisfiable or multipart
        // range is ignored and the whole entity is served.
        let mut start = 0u64;
        let mut count = len;
        let mut do_range = false;
        if let Some(range) = req.headers().typed_get::<headers::Range>() {
            let last_modified = modified.map(headers::LastModified::from);
            let ignore = match req.headers().typed_get::<headers::IfRange>() {
                Some(ir) => ir.is_modified(etag.as_ref(), last_modified.as_ref()),
                None => false,
            };
            if !ignore {
                let mut ranges = range.iter();
                if let (Some((s, e)), None) = (ranges.next(), ranges.next()) {
                    let first = match s {
                        Bound::Included(n) => n,
                        Bound::Excluded(n) => n + 1,
                        Bound::Unbounded => 0,
                    };
                    let end = match e {
                        Bound::Included(n) => n + 1,
                        Bound::Excluded(n) => n,
                        Bound::Unbounded => len,
                    };
                    if first < end && end <= len {
                        start = first;
                        count = end - first;
                        do_range = true;
                    }
                }
            }
        }

        {
            let h = res.headers_mut();
            if let Some(etag) = etag {
                h.typed_insert(etag);
            }
            if let Some(modified) = modified {
                h.typed_insert(headers::LastModified::from(modified));
            }
            h.typed_insert(headers::ContentLength(count));
            h.typed_insert(headers::AcceptRanges::bytes());
            h.insert(
                "Content-Type",
                path.get_mime_type_str().parse().unwrap(),
            );
        }
        if do_range {
            res.headers_mut().typed_insert(
                headers::ContentRange::bytes(start..start + count, len)
                    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?,
            );
            *res.status_mut() = StatusCode::PARTIAL_CONTENT;
        } else {
            *res.status_mut() = StatusCode::OK;
        }

        if head {
            return Ok(res);
        }

        let mut file = self.fs.open(&path, OpenOptions::read()).await?;
        if do_range {
            // a range on a non-seekable file is a hard error, we
            // never silently serve the wrong bytes.
            file.seek(SeekFrom::Start(start)).await?;
        }

        let read_buf_size = self.read_buf_size;
        let body = AsyncStream::new(move |mut tx| async move {
            let mut todo = count;
            while todo > 0 {
                let n = std::cmp::min(todo, read_buf_size as u64) as usize;
                let buf = file
                    .read_bytes(n)
                    .await
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                if buf.is_empty() {
                    break;
                }
                todo -= buf.len() as u64;
                tx.send(buf).await;
            }
            Ok::<(), io::Error>(())
        });
        *res.body_mut() = Body::stream(body);
        Ok(res)
    }
}
