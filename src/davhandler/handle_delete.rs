use futures_util::future::{BoxFuture, FutureExt};
use futures_util::StreamExt;
use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::conditional::{dav_if_tokens, lock_check};
use crate::davhandler::DavHandler;
use crate::davheaders;
use crate::davpath::DavPath;
use crate::errors::fserror_to_status;
use crate::fs::DavMetaData;
use crate::multierror::MultiError;
use crate::DavResult;

impl DavHandler {
    // Children before the node itself, accumulating the failures.
    // Returns true if `path` is gone afterwards.
    pub(crate) fn delete_items<'a>(
        &'a self,
        me: &'a mut MultiError,
        meta: Box<dyn DavMetaData>,
        path: DavPath,
    ) -> BoxFuture<'a, bool> {
        async move {
            if !meta.is_dir() {
                return match self.fs.remove_file(&path).await {
                    Ok(()) => true,
                    Err(e) => {
                        debug!("delete failed on {path}: {e}");
                        me.add_status(&path, fserror_to_status(&e));
                        false
                    }
                };
            }

            let mut entries = match self.fs.read_dir(&path).await {
                Ok(entries) => entries,
                Err(e) => {
                    me.add_status(&path, fserror_to_status(&e));
                    return false;
                }
            };
            let mut ok = true;
            while let Some(entry) = entries.next().await {
                let mut child = path.clone();
                child.push_segment(&entry.name());
                match entry.metadata().await {
                    Ok(m) => {
                        if m.is_dir() {
                            child.add_slash();
                        }
                        if !self.delete_items(&mut *me, m, child).await {
                            ok = false;
                        }
                    }
                    Err(e) => {
                        me.add_status(&child, fserror_to_status(&e));
                        ok = false;
                    }
                }
            }
            if !ok {
                // the collection cannot go, but it is not a failure
                // of the collection itself. only the children appear
                // in the multistatus.
                return false;
            }
            match self.fs.remove_dir(&path).await {
                Ok(()) => true,
                Err(e) => {
                    me.add_status(&path, fserror_to_status(&e));
                    false
                }
            }
        }
        .boxed()
    }

    pub(crate) async fn handle_delete(&self, req: &Request<()>) -> DavResult<Response<Body>> {
        // only Depth: infinity (or no Depth at all) is valid.
        if let Some(depth) = req.headers().typed_get::<davheaders::Depth>() {
            if depth != davheaders::Depth::Infinity {
                return Err(StatusCode::BAD_REQUEST.into());
            }
        }

        let mut path = self.path(req);
        let meta = self.fs.metadata(&path).await?;
        if meta.is_dir() {
            path.add_slash();
        }

        let tokens = dav_if_tokens(req);
        lock_check(self.ls.as_deref(), self.principal(), &path, true, &tokens)?;

        let mut me = MultiError::new();
        if self.delete_items(&mut me, meta, path.clone()).await {
            // the resource is gone, drop the locks under it.
            if let Some(ls) = &self.ls {
                let _ = ls.delete(&path);
            }
        }
        me.into_response(StatusCode::NO_CONTENT)
    }
}
