use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::davhandler::DavHandler;
use crate::DavResult;

impl DavHandler {
    pub(crate) async fn handle_options(&self, _req: &Request<()>) -> DavResult<Response<Body>> {
        // Compliance class 2 needs a locksystem.
        let dav = if self.ls.is_some() { "1,2" } else { "1" };
        let methods = self
            .allow
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let res = Response::builder()
            .header("DAV", dav)
            .header("MS-Author-Via", "DAV")
            .header("Allow", methods.as_str())
            .header("Public", methods.as_str())
            .header("Content-Length", "0")
            .status(StatusCode::OK);
        Ok(res.body(Body::empty()).unwrap())
    }
}
