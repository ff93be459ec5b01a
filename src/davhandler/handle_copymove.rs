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
use crate::fs::FsError;
use crate::multierror::MultiError;
use crate::util::DavMethod;
use crate::DavResult;

// compare as resource keys: ignore a trailing slash, and ignore case
// so that stores with case-insensitive names are not tricked into
// copying a resource onto itself.
fn same_resource(a: &DavPath, b: &DavPath) -> bool {
    let a = a.as_str().trim_end_matches('/');
    let b = b.as_str().trim_end_matches('/');
    a.eq_ignore_ascii_case(b)
}

impl DavHandler {
    // Pre-order recursive copy. Failures are recorded under the
    // destination URI, and we stop descending below a failed node.
    fn do_copy<'a>(
        &'a self,
        source: DavPath,
        dest: DavPath,
        recurse: bool,
        me: &'a mut MultiError,
    ) -> BoxFuture<'a, bool> {
        async move {
            let meta = match self.fs.metadata(&source).await {
                Ok(meta) => meta,
                Err(e) => {
                    me.add_status(&dest, fserror_to_status(&e));
                    return false;
                }
            };
            if !meta.is_dir() {
                return match self.fs.copy(&source, &dest).await {
                    Ok(()) => true,
                    Err(e) => {
                        debug!("copy failed {source} -> {dest}: {e}");
                        me.add_status(&dest, fserror_to_status(&e));
                        false
                    }
                };
            }

            // create the target collection first.
            if let Err(e) = self.fs.create_dir(&dest).await {
                if e != FsError::Exists {
                    me.add_status(&dest, fserror_to_status(&e));
                    return false;
                }
            }
            if !recurse {
                return true;
            }
            let mut entries = match self.fs.read_dir(&source).await {
                Ok(entries) => entries,
                Err(e) => {
                    me.add_status(&dest, fserror_to_status(&e));
                    return false;
                }
            };
            let mut ok = true;
            while let Some(entry) = entries.next().await {
                let name = entry.name();
                let mut s = source.clone();
                s.push_segment(&name);
                let mut d = dest.clone();
                d.push_segment(&name);
                if entry.is_dir().await.unwrap_or(false) {
                    s.add_slash();
                    d.add_slash();
                }
                if !self.do_copy(s, d, true, &mut *me).await {
                    ok = false;
                }
            }
            ok
        }
        .boxed()
    }

    // Move one node. Collections on a store without a native move for
    // this pair are emulated: create the destination, move the
    // children, remove the then-empty source.
    fn do_move<'a>(
        &'a self,
        source: DavPath,
        dest: DavPath,
        me: &'a mut MultiError,
    ) -> BoxFuture<'a, bool> {
        async move {
            let meta = match self.fs.metadata(&source).await {
                Ok(meta) => meta,
                Err(e) => {
                    me.add_status(&dest, fserror_to_status(&e));
                    return false;
                }
            };
            let native = !meta.is_dir()
                || self.fs.fast_move_ok(&source, &dest).await.unwrap_or(true);
            if native {
                return match self.fs.rename(&source, &dest).await {
                    Ok(()) => true,
                    Err(e) => {
                        debug!("move failed {source} -> {dest}: {e}");
                        me.add_status(&dest, fserror_to_status(&e));
                        false
                    }
                };
            }

            if let Err(e) = self.fs.create_dir(&dest).await {
                if e != FsError::Exists {
                    me.add_status(&dest, fserror_to_status(&e));
                    return false;
                }
            }
            let mut entries = match self.fs.read_dir(&source).await {
                Ok(entries) => entries,
                Err(e) => {
                    me.add_status(&dest, fserror_to_status(&e));
                    return false;
                }
            };
            let mut ok = true;
            while let Some(entry) = entries.next().await {
                let name = entry.name();
                let mut s = source.clone();
                s.push_segment(&name);
                let mut d = dest.clone();
                d.push_segment(&name);
                if entry.is_dir().await.unwrap_or(false) {
                    s.add_slash();
                    d.add_slash();
                }
                if !self.do_move(s, d, &mut *me).await {
                    ok = false;
                }
            }
            if !ok {
                return false;
            }
            match self.fs.remove_dir(&source).await {
                Ok(()) => true,
                Err(e) => {
                    me.add_status(&dest, fserror_to_status(&e));
                    false
                }
            }
        }
        .boxed()
    }

    pub(crate) async fn handle_copymove(
        &self,
        req: &Request<()>,
        method: DavMethod,
    ) -> DavResult<Response<Body>> {
        let mut path = self.path(req);

        let dest = match req.headers().typed_get::<davheaders::Destination>() {
            Some(dest) => dest,
            None => return Err(StatusCode::BAD_REQUEST.into()),
        };
        let mut dest = DavPath::new(&dest.0, &self.prefix)?;

        let recurse = match req.headers().typed_get::<davheaders::Depth>() {
            None | Some(davheaders::Depth::Infinity) => true,
            Some(davheaders::Depth::Zero) if method == DavMethod::COPY => false,
            _ => return Err(StatusCode::BAD_REQUEST.into()),
        };

        let meta = self.fs.metadata(&path).await?;
        if meta.is_dir() {
            path.add_slash();
            dest.add_slash();
        }

        if same_resource(&path, &dest) {
            return Err(StatusCode::FORBIDDEN.into());
        }
        if dest.is_beneath(&path) || path.is_beneath(&dest) {
            return Err(StatusCode::FORBIDDEN.into());
        }
        if !self.has_parent(&dest).await {
            let status = match method {
                DavMethod::COPY => StatusCode::CONFLICT,
                _ => StatusCode::NOT_FOUND,
            };
            return Err(status.into());
        }

        let overwrite = req
            .headers()
            .typed_get::<davheaders::Overwrite>()
            .map(|o| o.0)
            .unwrap_or(true);
        let dest_meta = self.fs.metadata(&dest).await.ok();
        if dest_meta.is_some() && !overwrite {
            return Err(StatusCode::PRECONDITION_FAILED.into());
        }

        let tokens = dav_if_tokens(req);
        if method == DavMethod::MOVE {
            lock_check(self.ls.as_deref(), self.principal(), &path, true, &tokens)?;
        }
        lock_check(self.ls.as_deref(), self.principal(), &dest, true, &tokens)?;

        // Overwrite means replace: the destination goes away first.
        if let Some(dest_meta) = dest_meta {
            let mut delme = MultiError::new();
            if !self
                .delete_items(&mut delme, dest_meta, dest.clone())
                .await
            {
                return delme.into_response(StatusCode::OK);
            }
            if let Some(ls) = &self.ls {
                let _ = ls.delete(&dest);
            }
        }

        let mut me = MultiError::new();
        match method {
            DavMethod::COPY => {
                self.do_copy(path.clone(), dest.clone(), recurse, &mut me)
                    .await;
            }
            _ => {
                if self.do_move(path.clone(), dest.clone(), &mut me).await {
                    // locks do not travel with the resource.
                    if let Some(ls) = &self.ls {
                        let _ = ls.delete(&path);
                    }
                }
            }
        }
        me.into_response(StatusCode::OK)
    }
}
