//! ## Generic async Webdav protocol engine
//!
//! Webdav (RFC4918) is defined as
//! HTTP (GET/HEAD/PUT/DELETE) plus a bunch of extension methods (PROPFIND, etc).
//! These extension methods are used to manage collections (like unix directories),
//! get information on collections (like unix `ls` or `readdir`), rename and
//! copy items, lock/unlock items, etc.
//!
//! A `handler` is a piece of code that takes a `http::Request`, processes it in some
//! way, and then generates a `http::Response`. This library is a `handler` that maps
//! the HTTP/Webdav protocol to an abstract filesystem, without tying itself to
//! any specific HTTP server. Included is an in-memory filesystem (`memfs`) and an
//! in-memory locksystem (`memls`).
//!
//! ## Backend interfaces.
//!
//! - the library contains a [HTTP handler][DavHandler].
//! - you supply a [filesystem][fs::DavFileSystem] for backend storage, which can optionally
//!   implement reading/writing [DAV properties][fs::DavProp].
//! - you can supply a [locksystem][ls::DavLockSystem] that handles webdav locks.
//!
//! The handler works with the standard http types from the `http` and
//! `http_body` crates, so it slots into any server or framework that also
//! uses those types.
//!
//! ## Example.
//!
//! ```
//! use dav_engine::{body::Body, DavHandler, MemFs, MemLs};
//! use http::Request;
//!
//! # async fn run() {
//! let dav = DavHandler::builder(MemFs::new())
//!     .locksystem(MemLs::new())
//!     .build();
//!
//! let req = Request::builder()
//!     .method("MKCOL")
//!     .uri("/archive/")
//!     .body(Body::empty())
//!     .unwrap();
//! let res = dav.handle(req).await;
//! assert_eq!(res.status(), http::StatusCode::CREATED);
//! # }
//! ```

#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;

mod async_stream;
mod conditional;
mod davhandler;
mod davheaders;
mod errors;
mod multierror;
mod tree;
mod util;
mod xmltree_ext;

pub mod body;
pub mod davpath;
pub mod fs;
pub mod ls;
pub mod props;

use crate::errors::DavResult;

pub use crate::davhandler::{DavBuilder, DavHandler};
pub use crate::fs::memfs::MemFs;
pub use crate::ls::memls::MemLs;
pub use crate::util::{DavMethod, DavMethodSet};
