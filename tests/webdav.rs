//
// End to end tests: full requests against a handler over the
// in-memory filesystem and locksystem.
//
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::{Buf, Bytes};
use futures_util::StreamExt;
use http::{Request, Response, StatusCode};

use dav_engine::body::Body;
use dav_engine::davpath::DavPath;
use dav_engine::fs::{
    DavDirEntry, DavFile, DavFileSystem, DavMetaData, DavProp, FsError, FsFuture, FsStream,
    InfiniteDepth, OpenOptions, SeekFrom,
};
use dav_engine::{DavHandler, MemFs, MemLs};

fn handler() -> DavHandler {
    DavHandler::builder(MemFs::new())
        .locksystem(MemLs::new())
        .build()
}

async fn request(
    dav: &DavHandler,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: &str,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let req = builder.body(Body::from(body.to_string())).unwrap();
    dav.handle(req).await
}

async fn body_string(res: Response<Body>) -> String {
    let mut body = res.into_body();
    let mut s = String::new();
    while let Some(chunk) = body.next().await {
        s.push_str(std::str::from_utf8(&chunk.unwrap()).unwrap());
    }
    s
}

const LOCKINFO_EXCLUSIVE: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:lockinfo xmlns:D="DAV:">
  <D:lockscope><D:exclusive/></D:lockscope>
  <D:locktype><D:write/></D:locktype>
  <D:owner>test-suite</D:owner>
</D:lockinfo>"#;

async fn lock(dav: &DavHandler, uri: &str, timeout: &str) -> (StatusCode, Option<String>) {
    let res = request(dav, "LOCK", uri, &[("Timeout", timeout)], LOCKINFO_EXCLUSIVE).await;
    let status = res.status();
    let token = res
        .headers()
        .get("lock-token")
        .map(|v| v.to_str().unwrap().to_string());
    (status, token)
}

#[tokio::test]
async fn mkcol_put_get() {
    let dav = handler();

    let res = request(&dav, "MKCOL", "/a", &[], "").await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = request(&dav, "PUT", "/a/f.txt", &[], "hi").await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let res = request(&dav, "PUT", "/a/f.txt", &[], "bye").await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = request(&dav, "GET", "/a/f.txt", &[], "").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_string(res).await, "bye");
}

#[tokio::test]
async fn mkcol_conflicts() {
    let dav = handler();
    // parent is missing.
    let res = request(&dav, "MKCOL", "/no/sub", &[], "").await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    // already exists.
    request(&dav, "MKCOL", "/a", &[], "").await;
    let res = request(&dav, "MKCOL", "/a", &[], "").await;
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn unknown_method_is_501() {
    let dav = handler();
    let res = request(&dav, "BREW", "/", &[], "").await;
    assert_eq!(res.status(), StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn lock_protects_delete() {
    let dav = handler();
    request(&dav, "MKCOL", "/a", &[], "").await;
    request(&dav, "PUT", "/a/f.txt", &[], "hi").await;

    let (status, token) = lock(&dav, "/a/f.txt", "Second-60").await;
    assert_eq!(status, StatusCode::OK);
    let token = token.expect("Lock-Token header");
    assert!(token.starts_with("<opaquelocktoken:"));

    // no If header.
    let res = request(&dav, "DELETE", "/a/f.txt", &[], "").await;
    assert_eq!(res.status(), StatusCode::LOCKED);

    // the right token unlocks the delete.
    let cond = format!("({token})");
    let res = request(&dav, "DELETE", "/a/f.txt", &[("If", &cond)], "").await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    let res = request(&dav, "GET", "/a/f.txt", &[], "").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn second_exclusive_lock_conflicts() {
    let dav = handler();
    request(&dav, "PUT", "/f", &[], "x").await;
    let (status, _) = lock(&dav, "/f", "Second-60").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = lock(&dav, "/f", "Second-60").await;
    assert_eq!(status, StatusCode::LOCKED);
}

#[tokio::test]
async fn unlock_needs_the_right_token() {
    let dav = handler();
    request(&dav, "PUT", "/f", &[], "x").await;
    let (_, token) = lock(&dav, "/f", "Second-60").await;
    let token = token.unwrap();

    let res = request(
        &dav,
        "UNLOCK",
        "/f",
        &[("Lock-Token", "<opaquelocktoken:wrong>")],
        "",
    )
    .await;
    assert_eq!(res.status(), StatusCode::PRECONDITION_FAILED);
    // the grant is still there.
    let (status, _) = lock(&dav, "/f", "Second-60").await;
    assert_eq!(status, StatusCode::LOCKED);

    let res = request(&dav, "UNLOCK", "/f", &[("Lock-Token", &token)], "").await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    let (status, _) = lock(&dav, "/f", "Second-60").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn lock_refresh_keeps_token() {
    let dav = handler();
    request(&dav, "PUT", "/f", &[], "x").await;
    let (_, token) = lock(&dav, "/f", "Second-60").await;
    let token = token.unwrap();

    let cond = format!("({token})");
    let res = request(
        &dav,
        "LOCK",
        "/f",
        &[("If", &cond), ("Timeout", "Second-3600")],
        "",
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    // refresh response has no Lock-Token header.
    assert!(res.headers().get("lock-token").is_none());
    let body = body_string(res).await;
    assert!(body.contains("Second-3600"));
    assert!(body.contains(token.trim_start_matches('<').trim_end_matches('>')));
}

#[tokio::test]
async fn refresh_without_timeout_keeps_infinite() {
    let dav = handler();
    request(&dav, "PUT", "/f", &[], "x").await;
    let (status, token) = lock(&dav, "/f", "Infinite").await;
    assert_eq!(status, StatusCode::OK);
    let token = token.unwrap();

    // no Timeout header on the refresh: the lock keeps its duration.
    let cond = format!("({token})");
    let res = request(&dav, "LOCK", "/f", &[("If", &cond)], "").await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_string(res).await;
    assert!(body.contains("Infinite"));
    assert!(!body.contains("Second-"));
}

#[tokio::test]
async fn refresh_can_make_a_lock_infinite() {
    let dav = handler();
    request(&dav, "PUT", "/f", &[], "x").await;
    let (_, token) = lock(&dav, "/f", "Second-60").await;
    let token = token.unwrap();

    let cond = format!("({token})");
    let res = request(
        &dav,
        "LOCK",
        "/f",
        &[("If", &cond), ("Timeout", "Infinite")],
        "",
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_string(res).await;
    assert!(body.contains("Infinite"));
    assert!(!body.contains("Second-"));
}

#[tokio::test]
async fn expired_lock_no_longer_blocks() {
    let dav = handler();
    request(&dav, "PUT", "/f", &[], "x").await;
    let (status, _) = lock(&dav, "/f", "Second-0").await;
    assert_eq!(status, StatusCode::OK);
    // the grant expired immediately, delete goes through.
    let res = request(&dav, "DELETE", "/f", &[], "").await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn lock_missing_resource_is_412() {
    let dav = handler();
    let (status, _) = lock(&dav, "/missing", "Second-60").await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
}

#[tokio::test]
async fn lock_bad_body_is_400() {
    let dav = handler();
    request(&dav, "PUT", "/f", &[], "x").await;
    // no owner element.
    let body = r#"<D:lockinfo xmlns:D="DAV:">
      <D:lockscope><D:exclusive/></D:lockscope>
      <D:locktype><D:write/></D:locktype>
    </D:lockinfo>"#;
    let res = request(&dav, "LOCK", "/f", &[], body).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn deep_lock_covers_children() {
    let dav = handler();
    request(&dav, "MKCOL", "/a", &[], "").await;
    request(&dav, "PUT", "/a/f", &[], "x").await;

    let res = request(
        &dav,
        "LOCK",
        "/a",
        &[("Depth", "infinity"), ("Timeout", "Second-60")],
        LOCKINFO_EXCLUSIVE,
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = request(&dav, "DELETE", "/a/f", &[], "").await;
    assert_eq!(res.status(), StatusCode::LOCKED);
}

#[tokio::test]
async fn copy_and_move() {
    let dav = handler();
    request(&dav, "MKCOL", "/d", &[], "").await;
    request(&dav, "MKCOL", "/d/sub", &[], "").await;
    request(&dav, "PUT", "/d/sub/leaf.txt", &[], "leaf").await;

    let res = request(&dav, "COPY", "/d", &[("Destination", "/d2")], "").await;
    assert_eq!(res.status(), StatusCode::OK);
    let res = request(&dav, "GET", "/d2/sub/leaf.txt", &[], "").await;
    assert_eq!(body_string(res).await, "leaf");
    // source is still there.
    let res = request(&dav, "GET", "/d/sub/leaf.txt", &[], "").await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = request(&dav, "MOVE", "/d", &[("Destination", "/d3")], "").await;
    assert_eq!(res.status(), StatusCode::OK);
    let res = request(&dav, "GET", "/d3/sub/leaf.txt", &[], "").await;
    assert_eq!(res.status(), StatusCode::OK);
    let res = request(&dav, "GET", "/d/sub/leaf.txt", &[], "").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn copy_onto_itself_is_403() {
    let dav = handler();
    request(&dav, "PUT", "/f", &[], "x").await;
    let res = request(&dav, "COPY", "/f", &[("Destination", "/f")], "").await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    // the check ignores case.
    let res = request(&dav, "COPY", "/f", &[("Destination", "/F")], "").await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn move_without_overwrite_is_412() {
    let dav = handler();
    request(&dav, "PUT", "/f1", &[], "one").await;
    request(&dav, "PUT", "/f2", &[], "two").await;
    let res = request(
        &dav,
        "MOVE",
        "/f1",
        &[("Destination", "/f2"), ("Overwrite", "F")],
        "",
    )
    .await;
    assert_eq!(res.status(), StatusCode::PRECONDITION_FAILED);
    // with overwrite it replaces.
    let res = request(&dav, "MOVE", "/f1", &[("Destination", "/f2")], "").await;
    assert_eq!(res.status(), StatusCode::OK);
    let res = request(&dav, "GET", "/f2", &[], "").await;
    assert_eq!(body_string(res).await, "one");
}

#[tokio::test]
async fn propfind_depth_one_stops_at_children() {
    let dav = handler();
    request(&dav, "MKCOL", "/d", &[], "").await;
    request(&dav, "MKCOL", "/d/sub", &[], "").await;
    request(&dav, "PUT", "/d/sub/leaf.txt", &[], "leaf").await;

    let res = request(&dav, "PROPFIND", "/d", &[("Depth", "1")], "").await;
    assert_eq!(res.status(), StatusCode::MULTI_STATUS);
    let body = body_string(res).await;
    assert!(body.contains("/d/sub/"));
    assert!(!body.contains("leaf.txt"));

    // and depth infinity reaches the grandchild.
    let res = request(&dav, "PROPFIND", "/d", &[("Depth", "infinity")], "").await;
    let body = body_string(res).await;
    assert!(body.contains("leaf.txt"));
}

#[tokio::test]
async fn allprop_omits_expensive_props() {
    let dav = handler();
    let res = request(&dav, "PROPFIND", "/", &[("Depth", "0")], "").await;
    assert_eq!(res.status(), StatusCode::MULTI_STATUS);
    let body = body_string(res).await;
    assert!(body.contains("resourcetype"));
    assert!(body.contains("collection"));
    assert!(!body.contains("quota-used-bytes"));

    // naming it explicitly includes it.
    let propfind = r#"<?xml version="1.0"?>
      <D:propfind xmlns:D="DAV:">
        <D:prop><D:quota-used-bytes/></D:prop>
      </D:propfind>"#;
    let res = request(&dav, "PROPFIND", "/", &[("Depth", "0")], propfind).await;
    let body = body_string(res).await;
    assert!(body.contains("quota-used-bytes"));
}

#[tokio::test]
async fn propfind_unknown_prop_gets_404_propstat() {
    let dav = handler();
    request(&dav, "PUT", "/f", &[], "x").await;
    let propfind = r#"<?xml version="1.0"?>
      <D:propfind xmlns:D="DAV:" xmlns:X="urn:example:">
        <D:prop><D:getcontentlength/><X:nosuch/></D:prop>
      </D:propfind>"#;
    let res = request(&dav, "PROPFIND", "/f", &[("Depth", "0")], propfind).await;
    assert_eq!(res.status(), StatusCode::MULTI_STATUS);
    let body = body_string(res).await;
    assert!(body.contains("HTTP/1.1 200 OK"));
    assert!(body.contains("HTTP/1.1 404 Not Found"));
    assert!(body.contains("nosuch"));
}

#[tokio::test]
async fn proppatch_dead_prop_roundtrip() {
    let dav = handler();
    request(&dav, "PUT", "/f", &[], "x").await;

    let update = r#"<?xml version="1.0"?>
      <D:propertyupdate xmlns:D="DAV:" xmlns:X="urn:example:">
        <D:set><D:prop><X:color>green</X:color></D:prop></D:set>
      </D:propertyupdate>"#;
    let res = request(&dav, "PROPPATCH", "/f", &[], update).await;
    assert_eq!(res.status(), StatusCode::MULTI_STATUS);
    let body = body_string(res).await;
    assert!(body.contains("HTTP/1.1 200 OK"));

    let propfind = r#"<?xml version="1.0"?>
      <D:propfind xmlns:D="DAV:" xmlns:X="urn:example:">
        <D:prop><X:color/></D:prop>
      </D:propfind>"#;
    let res = request(&dav, "PROPFIND", "/f", &[("Depth", "0")], propfind).await;
    let body = body_string(res).await;
    assert!(body.contains("green"));

    // remove it again.
    let update = r#"<?xml version="1.0"?>
      <D:propertyupdate xmlns:D="DAV:" xmlns:X="urn:example:">
        <D:remove><D:prop><X:color/></D:prop></D:remove>
      </D:propertyupdate>"#;
    let res = request(&dav, "PROPPATCH", "/f", &[], update).await;
    assert_eq!(res.status(), StatusCode::MULTI_STATUS);
    let res = request(&dav, "PROPFIND", "/f", &[("Depth", "0")], propfind).await;
    let body = body_string(res).await;
    assert!(body.contains("HTTP/1.1 404 Not Found"));
}

#[tokio::test]
async fn proppatch_readonly_prop_is_409() {
    let dav = handler();
    request(&dav, "PUT", "/f", &[], "x").await;
    let update = r#"<?xml version="1.0"?>
      <D:propertyupdate xmlns:D="DAV:">
        <D:set><D:prop><D:getetag>"fake"</D:getetag></D:prop></D:set>
      </D:propertyupdate>"#;
    let res = request(&dav, "PROPPATCH", "/f", &[], update).await;
    assert_eq!(res.status(), StatusCode::MULTI_STATUS);
    let body = body_string(res).await;
    assert!(body.contains("HTTP/1.1 409 Conflict"));
}

#[tokio::test]
async fn get_ranges() {
    let dav = handler();
    let content: String = (0..60).map(|i| format!("{i:09} ")).collect();
    assert_eq!(content.len(), 600);
    request(&dav, "PUT", "/big", &[], &content).await;

    let res = request(&dav, "GET", "/big", &[("Range", "bytes=0-99")], "").await;
    assert_eq!(res.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        res.headers().get("content-range").unwrap(),
        "bytes 0-99/600"
    );
    assert_eq!(body_string(res).await.len(), 100);

    let res = request(&dav, "GET", "/big", &[("Range", "bytes=500-")], "").await;
    assert_eq!(res.status(), StatusCode::PARTIAL_CONTENT);
    let body = body_string(res).await;
    assert_eq!(body.len(), 100);
    assert_eq!(&body, &content[500..]);

    // unsatisfiable range: the whole entity.
    let res = request(&dav, "GET", "/big", &[("Range", "bytes=900-999")], "").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_string(res).await.len(), 600);
}

#[tokio::test]
async fn get_conditionals() {
    let dav = handler();
    request(&dav, "PUT", "/f", &[], "hello").await;
    let res = request(&dav, "GET", "/f", &[], "").await;
    let etag = res.headers().get("etag").unwrap().to_str().unwrap().to_string();

    let res = request(&dav, "GET", "/f", &[("If-None-Match", &etag)], "").await;
    assert_eq!(res.status(), StatusCode::NOT_MODIFIED);

    let res = request(&dav, "GET", "/f", &[("If-Match", "\"other\"")], "").await;
    assert_eq!(res.status(), StatusCode::PRECONDITION_FAILED);
}

#[tokio::test]
async fn get_on_collection_is_204() {
    let dav = handler();
    request(&dav, "MKCOL", "/a", &[], "").await;
    let res = request(&dav, "GET", "/a/", &[], "").await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    // missing trailing slash gets a Content-Location fixup.
    let res = request(&dav, "GET", "/a", &[], "").await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(res.headers().get("content-location").unwrap(), "/a/");
}

#[tokio::test]
async fn options_advertises_dav() {
    let dav = handler();
    let res = request(&dav, "OPTIONS", "/", &[], "").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers().get("dav").unwrap(), "1,2");
    let allow = res.headers().get("allow").unwrap().to_str().unwrap();
    assert!(allow.contains("PROPFIND"));
    assert!(allow.contains("LOCK"));
}

// A filesystem wrapper that makes move-capability and seekability
// configurable, counts the primitives used, and can refuse to remove
// or rename one specific path.
struct InstrumentedFs {
    inner: Arc<dyn DavFileSystem>,
    fast_move: bool,
    seekable: bool,
    fail_remove: Option<&'static str>,
    fail_rename: Option<&'static str>,
    renames: AtomicUsize,
    dir_creates: AtomicUsize,
}

impl InstrumentedFs {
    fn new(fast_move: bool, seekable: bool) -> Arc<InstrumentedFs> {
        Arc::new(InstrumentedFs {
            inner: MemFs::new(),
            fast_move,
            seekable,
            fail_remove: None,
            fail_rename: None,
            renames: AtomicUsize::new(0),
            dir_creates: AtomicUsize::new(0),
        })
    }

    fn with_failures(
        fail_remove: Option<&'static str>,
        fail_rename: Option<&'static str>,
    ) -> Arc<InstrumentedFs> {
        Arc::new(InstrumentedFs {
            inner: MemFs::new(),
            fast_move: false,
            seekable: true,
            fail_remove,
            fail_rename,
            renames: AtomicUsize::new(0),
            dir_creates: AtomicUsize::new(0),
        })
    }
}

#[derive(Debug)]
struct NoSeekFile(Box<dyn DavFile>);

impl DavFile for NoSeekFile {
    fn metadata(&mut self) -> FsFuture<'_, Box<dyn DavMetaData>> {
        self.0.metadata()
    }
    fn write_buf(&mut self, buf: Box<dyn Buf + Send>) -> FsFuture<'_, ()> {
        self.0.write_buf(buf)
    }
    fn write_bytes(&mut self, buf: Bytes) -> FsFuture<'_, ()> {
        self.0.write_bytes(buf)
    }
    fn read_bytes(&mut self, count: usize) -> FsFuture<'_, Bytes> {
        self.0.read_bytes(count)
    }
    fn seek(&mut self, _pos: SeekFrom) -> FsFuture<'_, u64> {
        Box::pin(async { Err(FsError::NotImplemented) })
    }
    fn flush(&mut self) -> FsFuture<'_, ()> {
        self.0.flush()
    }
}

impl DavFileSystem for InstrumentedFs {
    fn metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Box<dyn DavMetaData>> {
        self.inner.metadata(path)
    }
    fn read_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, FsStream<Box<dyn DavDirEntry>>> {
        self.inner.read_dir(path)
    }
    fn open<'a>(&'a self, path: &'a DavPath, options: OpenOptions) -> FsFuture<'a, Box<dyn DavFile>> {
        if self.seekable {
            self.inner.open(path, options)
        } else {
            Box::pin(async move {
                let file = self.inner.open(path, options).await?;
                Ok(Box::new(NoSeekFile(file)) as Box<dyn DavFile>)
            })
        }
    }
    fn create_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        self.dir_creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create_dir(path)
    }
    fn remove_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        self.inner.remove_dir(path)
    }
    fn remove_file<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        if self.fail_remove == Some(path.as_str()) {
            return Box::pin(async { Err(FsError::Forbidden) });
        }
        self.inner.remove_file(path)
    }
    fn rename<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()> {
        self.renames.fetch_add(1, Ordering::SeqCst);
        if self.fail_rename == Some(from.as_str()) {
            return Box::pin(async { Err(FsError::Forbidden) });
        }
        self.inner.rename(from, to)
    }
    fn copy<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()> {
        self.inner.copy(from, to)
    }
    fn fast_move_ok<'a>(&'a self, _from: &'a DavPath, _to: &'a DavPath) -> FsFuture<'a, bool> {
        let ok = self.fast_move;
        Box::pin(async move { Ok(ok) })
    }
    fn infinite_depth(&self) -> InfiniteDepth {
        InfiniteDepth::Allow
    }
    fn have_props<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, bool> {
        self.inner.have_props(path)
    }
    fn patch_props<'a>(
        &'a self,
        path: &'a DavPath,
        patch: Vec<(bool, DavProp)>,
    ) -> FsFuture<'a, Vec<(StatusCode, DavProp)>> {
        self.inner.patch_props(path, patch)
    }
    fn get_props<'a>(&'a self, path: &'a DavPath, do_content: bool) -> FsFuture<'a, Vec<DavProp>> {
        self.inner.get_props(path, do_content)
    }
    fn get_prop<'a>(&'a self, path: &'a DavPath, prop: DavProp) -> FsFuture<'a, Vec<u8>> {
        self.inner.get_prop(path, prop)
    }
    fn get_quota<'a>(&'a self) -> FsFuture<'a, (u64, Option<u64>)> {
        self.inner.get_quota()
    }
}

#[tokio::test]
async fn fast_move_uses_one_rename() {
    let fs = InstrumentedFs::new(true, true);
    let dav = DavHandler::builder(fs.clone()).build();
    request(&dav, "MKCOL", "/d", &[], "").await;
    request(&dav, "PUT", "/d/f", &[], "x").await;
    fs.renames.store(0, Ordering::SeqCst);
    fs.dir_creates.store(0, Ordering::SeqCst);

    let res = request(&dav, "MOVE", "/d", &[("Destination", "/d2")], "").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(fs.renames.load(Ordering::SeqCst), 1);
    assert_eq!(fs.dir_creates.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn slow_move_emulates_with_create_and_delete() {
    let fs = InstrumentedFs::new(false, true);
    let dav = DavHandler::builder(fs.clone()).build();
    request(&dav, "MKCOL", "/d", &[], "").await;
    request(&dav, "PUT", "/d/f1", &[], "x").await;
    request(&dav, "PUT", "/d/f2", &[], "y").await;
    fs.renames.store(0, Ordering::SeqCst);
    fs.dir_creates.store(0, Ordering::SeqCst);

    let res = request(&dav, "MOVE", "/d", &[("Destination", "/d2")], "").await;
    assert_eq!(res.status(), StatusCode::OK);
    // the collection is created, the files are moved one by one.
    assert_eq!(fs.dir_creates.load(Ordering::SeqCst), 1);
    assert_eq!(fs.renames.load(Ordering::SeqCst), 2);
    let res = request(&dav, "GET", "/d2/f1", &[], "").await;
    assert_eq!(res.status(), StatusCode::OK);
    let res = request(&dav, "GET", "/d/f1", &[], "").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_with_failing_child_is_207() {
    let fs = InstrumentedFs::with_failures(Some("/d/f1"), None);
    let dav = DavHandler::builder(fs).build();
    request(&dav, "MKCOL", "/d", &[], "").await;
    request(&dav, "PUT", "/d/f1", &[], "x").await;
    request(&dav, "PUT", "/d/f2", &[], "y").await;

    let res = request(&dav, "DELETE", "/d", &[], "").await;
    assert_eq!(res.status(), StatusCode::MULTI_STATUS);
    let body = body_string(res).await;
    // only the child that could not go is listed, not its siblings
    // and not the collection itself.
    assert!(body.contains("<D:href>/d/f1</D:href>"));
    assert!(body.contains("HTTP/1.1 403 Forbidden"));
    assert!(!body.contains("/d/f2"));
    assert!(!body.contains("<D:href>/d/</D:href>"));

    let res = request(&dav, "GET", "/d/f2", &[], "").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let res = request(&dav, "GET", "/d/f1", &[], "").await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn move_with_failing_child_is_207() {
    let fs = InstrumentedFs::with_failures(None, Some("/d/f1"));
    let dav = DavHandler::builder(fs).build();
    request(&dav, "MKCOL", "/d", &[], "").await;
    request(&dav, "PUT", "/d/f1", &[], "x").await;
    request(&dav, "PUT", "/d/f2", &[], "y").await;

    let res = request(&dav, "MOVE", "/d", &[("Destination", "/d2")], "").await;
    assert_eq!(res.status(), StatusCode::MULTI_STATUS);
    let body = body_string(res).await;
    // failures are reported under the destination URI.
    assert!(body.contains("<D:href>/d2/f1</D:href>"));
    assert!(body.contains("HTTP/1.1 403 Forbidden"));
    assert!(!body.contains("/d2/f2"));

    // the sibling moved, the blocked file stayed behind.
    let res = request(&dav, "GET", "/d2/f2", &[], "").await;
    assert_eq!(res.status(), StatusCode::OK);
    let res = request(&dav, "GET", "/d/f1", &[], "").await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn range_on_unseekable_file_is_an_error() {
    let fs = InstrumentedFs::new(true, false);
    let dav = DavHandler::builder(fs).build();
    request(&dav, "PUT", "/f", &[], "0123456789").await;

    // plain GET works.
    let res = request(&dav, "GET", "/f", &[], "").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_string(res).await, "0123456789");

    // ranged GET is refused, not silently served from offset 0.
    let res = request(&dav, "GET", "/f", &[("Range", "bytes=2-5")], "").await;
    assert_eq!(res.status(), StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn delete_missing_is_404_and_collections_recurse() {
    let dav = handler();
    let res = request(&dav, "DELETE", "/gone", &[], "").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    request(&dav, "MKCOL", "/d", &[], "").await;
    request(&dav, "MKCOL", "/d/sub", &[], "").await;
    request(&dav, "PUT", "/d/sub/f", &[], "x").await;
    let res = request(&dav, "DELETE", "/d", &[], "").await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    let res = request(&dav, "GET", "/d/sub/f", &[], "").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn put_to_missing_parent_is_409() {
    let dav = handler();
    let res = request(&dav, "PUT", "/no/f", &[], "x").await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
}
