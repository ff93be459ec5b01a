use std::error::Error as StdError;
use std::io;

use bytes::Buf;
use http::{Request, Response, StatusCode};
use http_body::Body as HttpBody;

use crate::body::Body;
use crate::conditional::{dav_if_tokens, lock_check};
use crate::davhandler::DavHandler;
use crate::errors::DavError;
use crate::fs::OpenOptions;
use crate::DavResult;

impl DavHandler {
    pub(crate) async fn handle_put<ReqBody, ReqData, ReqError>(
        &self,
        req: &Request<()>,
        body: ReqBody,
    ) -> DavResult<Response<Body>>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        let path = self.path(req);

        // Partial PUT is not supported.
        if req.headers().contains_key("content-range") {
            return Err(StatusCode::BAD_REQUEST.into());
        }

        if path.is_collection() {
            return Err(StatusCode::METHOD_NOT_ALLOWED.into());
        }
        let exists = match self.fs.metadata(&path).await {
            Ok(meta) if meta.is_dir() => return Err(StatusCode::METHOD_NOT_ALLOWED.into()),
            Ok(_) => true,
            Err(_) => false,
        };
        if !exists && !self.has_parent(&path).await {
            return Err(StatusCode::CONFLICT.into());
        }

        let tokens = dav_if_tokens(req);
        lock_check(
            self.ls.as_deref(),
            self.principal(),
            &path,
            false,
            &tokens,
        )?;

        let mut file = self.fs.open(&path, OpenOptions::write()).await?;

        pin_utils::pin_mut!(body);
        while let Some(chunk) = body.data().await {
            let buf = chunk.map_err(|_| {
                DavError::IoError(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "UnexpectedEof",
                ))
            })?;
            // a full store surfaces here as InsufficientStorage (507).
            file.write_buf(Box::new(buf)).await?;
        }
        file.flush().await?;

        let mut res = Response::builder().header("Content-Length", "0");
        if let Ok(meta) = file.metadata().await {
            if let Some(tag) = meta.etag() {
                res = res.header("ETag", format!("\"{tag}\""));
            }
        }
        let status = if exists {
            StatusCode::NO_CONTENT
        } else {
            StatusCode::CREATED
        };
        Ok(res.status(status).body(Body::empty()).unwrap())
    }
}
