use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::conditional::{dav_if_tokens, lock_check};
use crate::davhandler::DavHandler;
use crate::fs::FsError;
use crate::DavResult;

impl DavHandler {
    pub(crate) async fn handle_mkcol(&self, req: &Request<()>) -> DavResult<Response<Body>> {
        let mut path = self.path(req);

        let tokens = dav_if_tokens(req);
        lock_check(
            self.ls.as_deref(),
            self.principal(),
            &path,
            false,
            &tokens,
        )?;

        // the parent collection must exist.
        if !self.has_parent(&path).await {
            return Err(StatusCode::CONFLICT.into());
        }

        match self.fs.create_dir(&path).await {
            Ok(()) => {
                path.add_slash();
                let res = Response::builder()
                    .header("Content-Length", "0")
                    .status(StatusCode::CREATED);
                Ok(res.body(Body::empty()).unwrap())
            }
            // already there, be it a file or a directory.
            Err(FsError::Exists) => Err(StatusCode::METHOD_NOT_ALLOWED.into()),
            Err(FsError::NotFound) => Err(StatusCode::CONFLICT.into()),
            Err(e) => Err(e.into()),
        }
    }
}
