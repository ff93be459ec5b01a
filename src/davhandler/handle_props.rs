use std::io;
use std::io::Write;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::StreamExt;
use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};
use xml::common::XmlVersion;
use xml::writer::{EmitterConfig, EventWriter, XmlEvent as XmlWEvent};
use xmltree::Element;

use crate::async_stream::{AsyncStream, Sender};
use crate::body::Body;
use crate::conditional::{dav_if_tokens, lock_check};
use crate::davhandler::DavHandler;
use crate::davheaders;
use crate::davpath::DavPath;
use crate::errors::{fserror_to_status, DavError};
use crate::fs::{DavFileSystem, DavMetaData, DavProp, InfiniteDepth};
use crate::ls::DavLockSystem;
use crate::props::{
    catalog_for, prop_element, PropContext, PropGetResult, PropSetResult, NS_APACHE_URI,
    NS_DAV_URI, NS_MS_URI,
};
use crate::util::{dav_xml_error, MemBuffer};
use crate::xmltree_ext::{element_to_xml, ElementExt};
use crate::DavResult;

// What the propfind body asked for.
enum PropQuery {
    AllProp { include: Vec<Element> },
    PropName,
    Prop(Vec<Element>),
}

fn parse_propfind(body: &[u8]) -> DavResult<PropQuery> {
    if body.is_empty() {
        return Ok(PropQuery::AllProp {
            include: Vec::new(),
        });
    }
    let root = Element::parse2(body)?;
    if root.name != "propfind" {
        return Err(DavError::XmlParseError);
    }
    let children = root.child_elems();
    if children.is_empty() {
        return Ok(PropQuery::AllProp {
            include: Vec::new(),
        });
    }
    let mut allprop = false;
    let mut include = Vec::new();
    let mut query = None;
    for child in children {
        match child.name.as_str() {
            "allprop" if !allprop => allprop = true,
            "include" => include.extend(child.child_elems().into_iter().cloned()),
            "propname" if query.is_none() => query = Some(PropQuery::PropName),
            "prop" if query.is_none() => {
                query = Some(PropQuery::Prop(
                    child.child_elems().into_iter().cloned().collect(),
                ))
            }
            _ => return Err(DavError::XmlParseError),
        }
    }
    match (allprop, query) {
        (true, None) => Ok(PropQuery::AllProp { include }),
        (false, Some(q)) if include.is_empty() => Ok(q),
        _ => Err(DavError::XmlParseError),
    }
}

fn write_propstat<W: Write>(
    emitter: &mut EventWriter<W>,
    elems: &[Element],
    status: StatusCode,
) -> DavResult<()> {
    emitter.write(XmlWEvent::start_element("D:propstat"))?;
    emitter.write(XmlWEvent::start_element("D:prop"))?;
    for elem in elems {
        elem.write_ev(emitter)?;
    }
    emitter.write(XmlWEvent::end_element())?;
    Element::new2("D:status")
        .text(format!("HTTP/1.1 {status}"))
        .write_ev(emitter)?;
    emitter.write(XmlWEvent::end_element())?;
    Ok(())
}

fn start_multistatus<W: Write>(emitter: &mut EventWriter<W>) -> DavResult<()> {
    emitter.write(XmlWEvent::StartDocument {
        version: XmlVersion::Version10,
        encoding: Some("utf-8"),
        standalone: None,
    })?;
    emitter.write(
        XmlWEvent::start_element("D:multistatus")
            .ns("D", NS_DAV_URI)
            .ns("A", NS_APACHE_URI)
            .ns("Z", NS_MS_URI),
    )?;
    Ok(())
}

fn dav_prop(elem: &Element, xml: Option<Vec<u8>>) -> DavProp {
    DavProp {
        name: elem.name.clone(),
        prefix: elem.prefix.clone(),
        namespace: elem.namespace.clone(),
        xml,
    }
}

// Streams one D:response element per resource while the tree walk is
// still running.
struct PropWriter {
    emitter: EventWriter<MemBuffer>,
    tx: Sender<Bytes>,
    query: PropQuery,
    fs: Arc<dyn DavFileSystem>,
    ls: Option<Arc<dyn DavLockSystem>>,
}

impl PropWriter {
    fn new(
        tx: Sender<Bytes>,
        query: PropQuery,
        fs: Arc<dyn DavFileSystem>,
        ls: Option<Arc<dyn DavLockSystem>>,
    ) -> DavResult<PropWriter> {
        let mut emitter = EventWriter::new_with_config(
            MemBuffer::new(),
            EmitterConfig {
                normalize_empty_elements: false,
                perform_indent: false,
                ..Default::default()
            },
        );
        start_multistatus(&mut emitter)?;
        Ok(PropWriter {
            emitter,
            tx,
            query,
            fs,
            ls,
        })
    }

    async fn write_response(&mut self, path: &DavPath, meta: &dyn DavMetaData) -> DavResult<()> {
        let catalog = catalog_for(meta.is_dir());
        let mut found: Vec<Element> = Vec::new();
        let mut groups: Vec<(StatusCode, Vec<Element>)> = Vec::new();

        {
            let ctx = PropContext::new(path, meta, &self.fs, self.ls.as_ref());
            match &self.query {
                PropQuery::PropName => {
                    for desc in catalog.all() {
                        found.push(prop_element(Some(desc.name.ns), desc.name.name));
                    }
                    if self.fs.have_props(path).await.unwrap_or(false) {
                        if let Ok(props) = self.fs.get_props(path, false).await {
                            for p in props {
                                found.push(prop_element(p.namespace.as_deref(), &p.name));
                            }
                        }
                    }
                }
                PropQuery::AllProp { include } => {
                    for desc in catalog.all() {
                        let named = include.iter().any(|e| {
                            e.name == desc.name.name
                                && e.namespace.as_deref() == Some(desc.name.ns)
                        });
                        // unavailable properties are simply absent here.
                        if let PropGetResult::Value(value) = catalog
                            .get(&ctx, desc.name.ns, desc.name.name, !named)
                            .await
                        {
                            let mut elem = prop_element(Some(desc.name.ns), desc.name.name);
                            value.fill(&mut elem);
                            found.push(elem);
                        }
                    }
                    if self.fs.have_props(path).await.unwrap_or(false) {
                        if let Ok(props) = self.fs.get_props(path, true).await {
                            for p in props {
                                if let Some(xml) = p.xml {
                                    if let Ok(elem) = Element::parse2(&xml[..]) {
                                        found.push(elem);
                                    }
                                }
                            }
                        }
                    }
                }
                PropQuery::Prop(list) => {
                    for want in list {
                        let ns = want.namespace.as_deref().unwrap_or("");
                        match catalog.get(&ctx, ns, &want.name, false).await {
                            PropGetResult::Value(value) => {
                                let mut elem =
                                    prop_element(want.namespace.as_deref(), &want.name);
                                value.fill(&mut elem);
                                found.push(elem);
                            }
                            PropGetResult::Status(StatusCode::NOT_FOUND)
                            | PropGetResult::Unknown => {
                                // maybe it is a dead property.
                                let dead =
                                    match self.fs.get_prop(path, dav_prop(want, None)).await {
                                        Ok(xml) => Element::parse2(&xml[..]).ok(),
                                        Err(_) => None,
                                    };
                                match dead {
                                    Some(elem) => found.push(elem),
                                    None => {
                                        let mut bare = want.clone();
                                        bare.children.clear();
                                        add_group(&mut groups, StatusCode::NOT_FOUND, bare);
                                    }
                                }
                            }
                            PropGetResult::Status(status) => {
                                let mut bare = want.clone();
                                bare.children.clear();
                                add_group(&mut groups, status, bare);
                            }
                            PropGetResult::Skipped => {}
                        }
                    }
                }
            }
        }

        self.emitter.write(XmlWEvent::start_element("D:response"))?;
        Element::new2("D:href")
            .text(path.as_url_string_with_prefix())
            .write_ev(&mut self.emitter)?;
        if !found.is_empty() || groups.is_empty() {
            write_propstat(&mut self.emitter, &found, StatusCode::OK)?;
        }
        for (status, elems) in &groups {
            write_propstat(&mut self.emitter, elems, *status)?;
        }
        self.emitter.write(XmlWEvent::end_element())?;
        self.flush().await;
        Ok(())
    }

    async fn write_end(&mut self) -> DavResult<()> {
        self.emitter.write(XmlWEvent::end_element())?;
        self.flush().await;
        Ok(())
    }

    async fn flush(&mut self) {
        let buf = self.emitter.inner_mut().take();
        if !buf.is_empty() {
            self.tx.send(buf).await;
        }
    }
}

fn add_group(groups: &mut Vec<(StatusCode, Vec<Element>)>, status: StatusCode, elem: Element) {
    match groups.iter_mut().find(|(s, _)| *s == status) {
        Some((_, elems)) => elems.push(elem),
        None => groups.push((status, vec![elem])),
    }
}

impl DavHandler {
    fn propfind_walk<'a>(
        &'a self,
        pw: &'a mut PropWriter,
        path: DavPath,
        recurse: bool,
    ) -> BoxFuture<'a, DavResult<()>> {
        async move {
            let mut entries = match self.fs.read_dir(&path).await {
                Ok(entries) => entries,
                Err(e) => {
                    debug!("propfind: read_dir {path}: {e}");
                    return Ok(());
                }
            };
            while let Some(entry) = entries.next().await {
                let mut child = path.clone();
                child.push_segment(&entry.name());
                let meta = match entry.metadata().await {
                    Ok(meta) => meta,
                    Err(_) => continue,
                };
                if meta.is_dir() {
                    child.add_slash();
                }
                pw.write_response(&child, &*meta).await?;
                if recurse && meta.is_dir() {
                    self.propfind_walk(&mut *pw, child, true).await?;
                }
            }
            Ok(())
        }
        .boxed()
    }

    pub(crate) async fn handle_propfind(
        &self,
        req: &Request<()>,
        body: &[u8],
    ) -> DavResult<Response<Body>> {
        let mut path = self.path(req);
        let meta = self.fs.metadata(&path).await?;

        let query = parse_propfind(body)?;

        let depth = req
            .headers()
            .typed_get::<davheaders::Depth>()
            .unwrap_or(davheaders::Depth::Infinity);
        let depth = match depth {
            davheaders::Depth::Infinity if meta.is_dir() => match self.fs.infinite_depth() {
                InfiniteDepth::Reject => {
                    debug!("{path}: Depth: infinity rejected");
                    let res = Response::builder()
                        .status(StatusCode::FORBIDDEN)
                        .header("content-type", "application/xml; charset=utf-8")
                        .body(dav_xml_error("<D:propfind-finite-depth/>"))
                        .unwrap();
                    return Ok(res);
                }
                InfiniteDepth::AssumeZero => davheaders::Depth::Zero,
                InfiniteDepth::AssumeOne => davheaders::Depth::One,
                InfiniteDepth::Allow => davheaders::Depth::Infinity,
            },
            depth => depth,
        };

        let mut res = Response::new(Body::empty());
        let meta = self.fixpath(&mut res, &mut path, meta);
        *res.status_mut() = StatusCode::MULTI_STATUS;
        res.headers_mut().insert(
            "content-type",
            "application/xml; charset=utf-8".parse().unwrap(),
        );

        let this = self.clone();
        let stream = AsyncStream::new(move |tx| async move {
            let mut pw = PropWriter::new(tx, query, this.fs.clone(), this.ls.clone())?;
            pw.write_response(&path, &*meta).await?;
            if meta.is_dir() && depth != davheaders::Depth::Zero {
                this.propfind_walk(&mut pw, path, depth == davheaders::Depth::Infinity)
                    .await?;
            }
            pw.write_end().await?;
            Ok::<(), DavError>(())
        });
        *res.body_mut() = Body::stream(stream.map(|r| r.map_err(io::Error::from)));
        Ok(res)
    }

    pub(crate) async fn handle_proppatch(
        &self,
        req: &Request<()>,
        body: &[u8],
    ) -> DavResult<Response<Body>> {
        let mut path = self.path(req);
        let meta = self.fs.metadata(&path).await?;
        if meta.is_dir() {
            path.add_slash();
        }

        let tokens = dav_if_tokens(req);
        lock_check(
            self.ls.as_deref(),
            self.principal(),
            &path,
            false,
            &tokens,
        )?;

        let root = Element::parse2(body)?;
        if root.name != "propertyupdate" {
            return Err(DavError::XmlParseError);
        }
        // ordered list of (set, property element) actions.
        let mut actions: Vec<(bool, Element)> = Vec::new();
        for child in root.child_elems() {
            let set = match child.name.as_str() {
                "set" => true,
                "remove" => false,
                _ => return Err(DavError::XmlParseError),
            };
            let prop = match child.child_elems().as_slice() {
                [p] if p.name == "prop" => (*p).clone(),
                _ => return Err(DavError::XmlParseError),
            };
            for elem in prop.child_elems() {
                actions.push((set, elem.clone()));
            }
        }

        let catalog = catalog_for(meta.is_dir());
        let have_dead = self.fs.have_props(&path).await.unwrap_or(false);

        // apply the actions one by one, in document order.
        let mut groups: Vec<(StatusCode, Vec<Element>)> = Vec::new();
        for (set, elem) in actions {
            let status = {
                let ctx = PropContext::new(&path, &*meta, &self.fs, self.ls.as_ref());
                let ns = elem.namespace.as_deref().unwrap_or("");
                let value = if set { Some(&elem) } else { None };
                match catalog.set(&ctx, ns, &elem.name, value) {
                    PropSetResult::Status(status) => status,
                    PropSetResult::Dead | PropSetResult::Unknown => {
                        if !have_dead {
                            StatusCode::FORBIDDEN
                        } else {
                            let xml = if set { Some(element_to_xml(&elem)?) } else { None };
                            match self
                                .fs
                                .patch_props(&path, vec![(set, dav_prop(&elem, xml))])
                                .await
                            {
                                Ok(mut results) if !results.is_empty() => results.remove(0).0,
                                Ok(_) => StatusCode::OK,
                                Err(e) => fserror_to_status(&e),
                            }
                        }
                    }
                }
            };
            let mut bare = elem;
            bare.children.clear();
            add_group(&mut groups, status, bare);
        }

        let mut buffer = MemBuffer::new();
        {
            let mut emitter = EventWriter::new_with_config(
                &mut buffer,
                EmitterConfig {
                    normalize_empty_elements: false,
                    perform_indent: false,
                    ..Default::default()
                },
            );
            start_multistatus(&mut emitter)?;
            emitter.write(XmlWEvent::start_element("D:response"))?;
            Element::new2("D:href")
                .text(path.as_url_string_with_prefix())
                .write_ev(&mut emitter)?;
            for (status, elems) in &groups {
                write_propstat(&mut emitter, elems, *status)?;
            }
            emitter.write(XmlWEvent::end_element())?;
            emitter.write(XmlWEvent::end_element())?;
        }

        let res = Response::builder()
            .status(StatusCode::MULTI_STATUS)
            .header("content-type", "application/xml; charset=utf-8");
        Ok(res.body(Body::from(buffer.take())).unwrap())
    }
}
