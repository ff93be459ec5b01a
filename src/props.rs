//! Declarative model of the live Webdav properties.
//!
//! A property is a [`PropDescriptor`]: a qualified name, an "expensive"
//! marker, a getter and an optional setter. Descriptors are grouped
//! into static [`PropCatalog`]s; the file and collection catalogs
//! shadow and extend a common base catalog. The PROPFIND/PROPPATCH
//! handler resolves names against the catalog of the resource and
//! falls back to the filesystem's dead-property support for everything
//! the catalog does not know.
use std::sync::Arc;
use std::time::SystemTime;

use http::StatusCode;
use parking_lot::Mutex;
use xmltree::{Element, XMLNode};

use crate::davpath::DavPath;
use crate::fs::{DavFileSystem, DavMetaData, FsError, FsFuture};
use crate::ls::{DavLock, DavLockSystem, LockEntry};
use crate::util::{systemtime_to_httpdate, systemtime_to_rfc3339};
use crate::xmltree_ext::ElementExt;

pub const NS_DAV_URI: &str = "DAV:";
pub const NS_APACHE_URI: &str = "http://apache.org/dav/props/";
pub const NS_MS_URI: &str = "urn:schemas-microsoft-com:";

/// Qualified property name. The namespaces of the built-in catalogs
/// are static strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QName {
    pub ns: &'static str,
    pub name: &'static str,
}

/// A property value, tagged with how it serializes onto the wire.
#[derive(Debug, Clone)]
pub enum PropValue {
    Text(String),
    Int(i64),
    /// RFC 7231 HTTP-date (getlastmodified).
    HttpDate(SystemTime),
    /// RFC 3339 date (creationdate).
    Rfc3339(SystemTime),
    /// Serialized as "T" / "F" (the apache executable convention).
    Bool(bool),
    /// Child elements (resourcetype, lockdiscovery, supportedlock).
    Elements(Vec<Element>),
    Empty,
}

impl PropValue {
    /// Serialize this value into the (already created) property element.
    pub(crate) fn fill(self, elem: &mut Element) {
        match self {
            PropValue::Text(s) => elem.children.push(XMLNode::Text(s)),
            PropValue::Int(n) => elem.children.push(XMLNode::Text(n.to_string())),
            PropValue::HttpDate(t) => {
                elem.children.push(XMLNode::Text(systemtime_to_httpdate(t)))
            }
            PropValue::Rfc3339(t) => {
                elem.children.push(XMLNode::Text(systemtime_to_rfc3339(t)))
            }
            PropValue::Bool(b) => {
                elem.children
                    .push(XMLNode::Text(if b { "T" } else { "F" }.to_string()))
            }
            PropValue::Elements(els) => {
                for e in els {
                    elem.children.push(XMLNode::Element(e));
                }
            }
            PropValue::Empty => {}
        }
    }
}

/// Everything a property accessor might need.
pub struct PropContext<'a> {
    pub path: &'a DavPath,
    pub meta: &'a dyn DavMetaData,
    pub fs: &'a Arc<dyn DavFileSystem>,
    pub ls: Option<&'a Arc<dyn DavLockSystem>>,
    // quota is queried at most once per resource, both quota props
    // share the result.
    quota: Mutex<Option<(u64, Option<u64>)>>,
}

impl<'a> PropContext<'a> {
    pub fn new(
        path: &'a DavPath,
        meta: &'a dyn DavMetaData,
        fs: &'a Arc<dyn DavFileSystem>,
        ls: Option<&'a Arc<dyn DavLockSystem>>,
    ) -> PropContext<'a> {
        PropContext {
            path,
            meta,
            fs,
            ls,
            quota: Mutex::new(None),
        }
    }

    async fn quota(&self) -> Result<(u64, Option<u64>), FsError> {
        if let Some(q) = *self.quota.lock() {
            return Ok(q);
        }
        let q = self.fs.get_quota().await?;
        *self.quota.lock() = Some(q);
        Ok(q)
    }
}

pub type PropGet = for<'a> fn(&'a PropContext<'a>) -> FsFuture<'a, PropValue>;
pub type PropSet = fn(&PropContext<'_>, Option<&Element>) -> PropSetResult;

/// One live property.
pub struct PropDescriptor {
    pub name: QName,
    /// Expensive properties are skipped by allprop unless asked for
    /// by name.
    pub expensive: bool,
    pub get: PropGet,
    pub set: Option<PropSet>,
}

/// Result of a catalog property lookup.
#[derive(Debug)]
pub enum PropGetResult {
    Value(PropValue),
    /// The property is live but unavailable; for NOT_FOUND the caller
    /// may still find it among the dead properties.
    Status(StatusCode),
    /// Expensive property skipped on an allprop walk.
    Skipped,
    /// Not a live property here.
    Unknown,
}

/// Result of a catalog property update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropSetResult {
    Status(StatusCode),
    /// Store (or remove) this as a dead property in the filesystem.
    Dead,
    /// Not a live property here.
    Unknown,
}

/// An ordered set of property descriptors, optionally layered over a
/// base catalog. Own entries shadow base entries with the same name.
pub struct PropCatalog {
    base: Option<&'static PropCatalog>,
    own: Vec<PropDescriptor>,
}

impl PropCatalog {
    pub fn find(&self, ns: &str, name: &str) -> Option<&PropDescriptor> {
        self.own
            .iter()
            .find(|d| d.name.ns == ns && d.name.name == name)
            .or_else(|| self.base.and_then(|b| b.find(ns, name)))
    }

    /// All descriptors, base catalog first, shadowed entries skipped.
    pub fn all(&self) -> Vec<&PropDescriptor> {
        let mut v: Vec<&PropDescriptor> = Vec::new();
        if let Some(base) = self.base {
            for d in base.all() {
                if !self
                    .own
                    .iter()
                    .any(|o| o.name.ns == d.name.ns && o.name.name == d.name.name)
                {
                    v.push(d);
                }
            }
        }
        v.extend(self.own.iter());
        v
    }

    pub async fn get(
        &self,
        ctx: &PropContext<'_>,
        ns: &str,
        name: &str,
        skip_expensive: bool,
    ) -> PropGetResult {
        let desc = match self.find(ns, name) {
            Some(d) => d,
            None => return PropGetResult::Unknown,
        };
        if skip_expensive && desc.expensive {
            return PropGetResult::Skipped;
        }
        match (desc.get)(ctx).await {
            Ok(v) => PropGetResult::Value(v),
            Err(FsError::NotFound) | Err(FsError::NotImplemented) => {
                PropGetResult::Status(StatusCode::NOT_FOUND)
            }
            Err(FsError::Forbidden) => PropGetResult::Status(StatusCode::FORBIDDEN),
            Err(_) => PropGetResult::Status(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    /// `value` is `Some` for a set, `None` for a remove.
    pub fn set(
        &self,
        ctx: &PropContext<'_>,
        ns: &str,
        name: &str,
        value: Option<&Element>,
    ) -> PropSetResult {
        match self.find(ns, name) {
            None => PropSetResult::Unknown,
            Some(desc) => match desc.set {
                // live but read-only.
                None => PropSetResult::Status(StatusCode::CONFLICT),
                Some(f) => f(ctx, value),
            },
        }
    }
}

/// The catalog for a resource of this type.
pub fn catalog_for(is_dir: bool) -> &'static PropCatalog {
    if is_dir {
        &DIR_CATALOG
    } else {
        &FILE_CATALOG
    }
}

// Create the wire element for a property name, using the prefixes the
// multistatus root declares (D, A, Z). Foreign namespaces get an
// inline xmlns.
pub(crate) fn prop_element(ns: Option<&str>, name: &str) -> Element {
    match ns {
        Some(NS_DAV_URI) => Element::new2(&format!("D:{name}")),
        Some(NS_APACHE_URI) => Element::new2(&format!("A:{name}")),
        Some(NS_MS_URI) => Element::new2(&format!("Z:{name}")),
        Some(uri) => Element::new2(name).ns("", uri),
        None => Element::new2(name),
    }
}

// -- lock XML shared between lockdiscovery and the LOCK response.

/// D:activelock elements for a set of lock grants.
pub(crate) fn list_lockdiscovery(locks: &[DavLock]) -> Vec<Element> {
    locks.iter().map(activelock_element).collect()
}

fn activelock_element(lock: &DavLock) -> Element {
    let mut al = Element::new2("D:activelock");
    let scope = if lock.shared {
        "D:shared"
    } else {
        "D:exclusive"
    };
    let mut e = Element::new2("D:lockscope");
    e.children
        .push(XMLNode::Element(Element::new2(scope)));
    al.children.push(XMLNode::Element(e));
    let mut e = Element::new2("D:locktype");
    e.children
        .push(XMLNode::Element(Element::new2("D:write")));
    al.children.push(XMLNode::Element(e));
    al.children.push(XMLNode::Element(
        Element::new2("D:depth").text(if lock.deep { "infinity" } else { "0" }),
    ));
    if let Some(owner) = &lock.owner {
        al.children.push(XMLNode::Element(owner.clone()));
    }
    let timeout = match lock.timeout {
        Some(d) => format!("Second-{}", d.as_secs()),
        None => "Infinite".to_string(),
    };
    al.children
        .push(XMLNode::Element(Element::new2("D:timeout").text(timeout)));
    let mut e = Element::new2("D:locktoken");
    e.children.push(XMLNode::Element(
        Element::new2("D:href").text(lock.token.clone()),
    ));
    al.children.push(XMLNode::Element(e));
    let mut e = Element::new2("D:lockroot");
    e.children.push(XMLNode::Element(
        Element::new2("D:href").text(lock.path.as_url_string_with_prefix()),
    ));
    al.children.push(XMLNode::Element(e));
    al
}

/// D:lockentry elements for the supportedlock property.
pub(crate) fn list_supportedlock(entries: &[LockEntry]) -> Vec<Element> {
    entries
        .iter()
        .map(|entry| {
            let mut le = Element::new2("D:lockentry");
            let scope = if entry.shared {
                "D:shared"
            } else {
                "D:exclusive"
            };
            let mut e = Element::new2("D:lockscope");
            e.children
                .push(XMLNode::Element(Element::new2(scope)));
            le.children.push(XMLNode::Element(e));
            let mut e = Element::new2("D:locktype");
            e.children
                .push(XMLNode::Element(Element::new2("D:write")));
            le.children.push(XMLNode::Element(e));
            le
        })
        .collect()
}

// -- getters.

fn prop_creationdate<'a>(ctx: &'a PropContext<'a>) -> FsFuture<'a, PropValue> {
    Box::pin(async move { Ok(PropValue::Rfc3339(ctx.meta.created()?)) })
}

fn prop_displayname<'a>(ctx: &'a PropContext<'a>) -> FsFuture<'a, PropValue> {
    Box::pin(async move { Ok(PropValue::Text(ctx.path.file_name().to_string())) })
}

// only ever stored as a dead property.
fn prop_absent<'a>(_ctx: &'a PropContext<'a>) -> FsFuture<'a, PropValue> {
    Box::pin(async move { Err(FsError::NotFound) })
}

fn prop_getcontenttype<'a>(ctx: &'a PropContext<'a>) -> FsFuture<'a, PropValue> {
    Box::pin(async move { Ok(PropValue::Text(ctx.path.get_mime_type_str())) })
}

fn prop_getcontenttype_dir<'a>(_ctx: &'a PropContext<'a>) -> FsFuture<'a, PropValue> {
    Box::pin(async move { Ok(PropValue::Text("httpd/unix-directory".to_string())) })
}

fn prop_getetag<'a>(ctx: &'a PropContext<'a>) -> FsFuture<'a, PropValue> {
    Box::pin(async move {
        match ctx.meta.etag() {
            Some(tag) => Ok(PropValue::Text(format!("\"{tag}\""))),
            None => Err(FsError::NotFound),
        }
    })
}

fn prop_getlastmodified<'a>(ctx: &'a PropContext<'a>) -> FsFuture<'a, PropValue> {
    Box::pin(async move { Ok(PropValue::HttpDate(ctx.meta.modified()?)) })
}

fn prop_resourcetype<'a>(_ctx: &'a PropContext<'a>) -> FsFuture<'a, PropValue> {
    Box::pin(async move { Ok(PropValue::Empty) })
}

fn prop_resourcetype_dir<'a>(_ctx: &'a PropContext<'a>) -> FsFuture<'a, PropValue> {
    Box::pin(async move { Ok(PropValue::Elements(vec![Element::new2("D:collection")])) })
}

fn prop_supportedlock<'a>(ctx: &'a PropContext<'a>) -> FsFuture<'a, PropValue> {
    Box::pin(async move {
        match ctx.ls {
            Some(ls) => Ok(PropValue::Elements(list_supportedlock(
                &ls.supported_locks(),
            ))),
            None => Ok(PropValue::Empty),
        }
    })
}

fn prop_lockdiscovery<'a>(ctx: &'a PropContext<'a>) -> FsFuture<'a, PropValue> {
    Box::pin(async move {
        match ctx.ls {
            Some(ls) => Ok(PropValue::Elements(list_lockdiscovery(
                &ls.discover(ctx.path),
            ))),
            None => Ok(PropValue::Empty),
        }
    })
}

fn prop_getcontentlength<'a>(ctx: &'a PropContext<'a>) -> FsFuture<'a, PropValue> {
    Box::pin(async move { Ok(PropValue::Int(ctx.meta.len() as i64)) })
}

fn prop_executable<'a>(ctx: &'a PropContext<'a>) -> FsFuture<'a, PropValue> {
    Box::pin(async move { Ok(PropValue::Bool(ctx.meta.executable()?)) })
}

fn prop_quota_used<'a>(ctx: &'a PropContext<'a>) -> FsFuture<'a, PropValue> {
    Box::pin(async move {
        let (used, _) = ctx.quota().await?;
        Ok(PropValue::Int(used as i64))
    })
}

fn prop_quota_available<'a>(ctx: &'a PropContext<'a>) -> FsFuture<'a, PropValue> {
    Box::pin(async move {
        let (used, total) = ctx.quota().await?;
        match total {
            Some(total) => Ok(PropValue::Int(total.saturating_sub(used) as i64)),
            None => Err(FsError::NotImplemented),
        }
    })
}

// -- setters.

fn set_dead(_ctx: &PropContext<'_>, _value: Option<&Element>) -> PropSetResult {
    PropSetResult::Dead
}

// Windows clients set these on every PUT; accept and ignore.
fn set_accept(_ctx: &PropContext<'_>, value: Option<&Element>) -> PropSetResult {
    match value {
        Some(_) => PropSetResult::Status(StatusCode::OK),
        None => PropSetResult::Status(StatusCode::CONFLICT),
    }
}

const fn dav(name: &'static str) -> QName {
    QName {
        ns: NS_DAV_URI,
        name,
    }
}

fn live(name: QName, get: PropGet) -> PropDescriptor {
    PropDescriptor {
        name,
        expensive: false,
        get,
        set: None,
    }
}

fn live_rw(name: QName, get: PropGet, set: PropSet) -> PropDescriptor {
    PropDescriptor {
        name,
        expensive: false,
        get,
        set: Some(set),
    }
}

fn win32(name: &'static str) -> PropDescriptor {
    PropDescriptor {
        name: QName {
            ns: NS_MS_URI,
            name,
        },
        expensive: false,
        get: prop_absent,
        set: Some(set_accept),
    }
}

lazy_static! {
    static ref BASE_CATALOG: PropCatalog = PropCatalog {
        base: None,
        own: vec![
            live(dav("creationdate"), prop_creationdate),
            live_rw(dav("displayname"), prop_displayname, set_dead),
            live_rw(dav("getcontentlanguage"), prop_absent, set_dead),
            live(dav("getcontenttype"), prop_getcontenttype),
            live(dav("getetag"), prop_getetag),
            live(dav("getlastmodified"), prop_getlastmodified),
            live(dav("resourcetype"), prop_resourcetype),
            live(dav("supportedlock"), prop_supportedlock),
            live(dav("lockdiscovery"), prop_lockdiscovery),
        ],
    };
    static ref FILE_CATALOG: PropCatalog = PropCatalog {
        base: Some(&BASE_CATALOG),
        own: vec![
            live(dav("getcontentlength"), prop_getcontentlength),
            live(
                QName {
                    ns: NS_APACHE_URI,
                    name: "executable",
                },
                prop_executable,
            ),
            win32("Win32CreationTime"),
            win32("Win32FileAttributes"),
            win32("Win32LastAccessTime"),
            win32("Win32LastModifiedTime"),
        ],
    };
    static ref DIR_CATALOG: PropCatalog = PropCatalog {
        base: Some(&BASE_CATALOG),
        own: vec![
            live(dav("getcontenttype"), prop_getcontenttype_dir),
            live(dav("resourcetype"), prop_resourcetype_dir),
            PropDescriptor {
                name: dav("quota-available-bytes"),
                expensive: true,
                get: prop_quota_available,
                set: None,
            },
            PropDescriptor {
                name: dav("quota-used-bytes"),
                expensive: true,
                get: prop_quota_used,
                set: None,
            },
        ],
    };
}
