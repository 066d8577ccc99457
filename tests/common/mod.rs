//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Request, StatusCode};
use axum::response::Response;

use arbor_runtime::cache::{
    handler_fn, Handler, HandlerSet, LoadError, LoadRequest, ModuleCache, ModuleLoader,
    ModuleRegistry,
};
use arbor_runtime::cookies::CookieSigner;
use arbor_runtime::dispatch::Dispatcher;
use arbor_runtime::http::{response, HandlerOutput};
use arbor_runtime::routing::{RouteTable, StaticSource};

pub const SECRET: &[u8] = b"integration-secret";

pub fn signer() -> Arc<CookieSigner> {
    Arc::new(CookieSigner::new(SECRET).unwrap())
}

/// Loader that counts loads and can be slowed down.
pub struct SpyLoader {
    pub inner: ModuleRegistry,
    pub loads: AtomicUsize,
    pub delay: Duration,
}

impl SpyLoader {
    pub fn new(inner: ModuleRegistry) -> Self {
        Self {
            inner,
            loads: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModuleLoader for SpyLoader {
    async fn load(&self, request: &LoadRequest) -> Result<HandlerSet, LoadError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.load(request).await
    }
}

pub fn dispatcher_with(loader: Arc<dyn ModuleLoader>, table: RouteTable) -> Arc<Dispatcher> {
    Arc::new(Dispatcher::new(
        Arc::new(ModuleCache::new(loader)),
        Arc::new(StaticSource::new(table)),
        signer(),
    ))
}

/// A handler that always answers 200 with `body`.
pub fn text(body: &'static str) -> Arc<dyn Handler> {
    handler_fn(move |_ctx| {
        Box::pin(async move { HandlerOutput::from(response::text(StatusCode::OK, body)) })
    })
}

/// A handler that bumps `counter` and continues.
pub fn counting(counter: Arc<AtomicUsize>) -> Arc<dyn Handler> {
    handler_fn(move |_ctx| {
        let counter = Arc::clone(&counter);
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            HandlerOutput::Empty
        })
    })
}

/// A handler that bumps `counter` and answers with `body`.
pub fn counting_text(counter: Arc<AtomicUsize>, body: &'static str) -> Arc<dyn Handler> {
    handler_fn(move |_ctx| {
        let counter = Arc::clone(&counter);
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            HandlerOutput::from(response::text(StatusCode::OK, body))
        })
    })
}

pub fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

pub fn count(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn get_with_cookies(uri: &str, cookies: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::COOKIE, cookies)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn set_cookies(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

/// The `Cookie` header a browser would send back after `headers`.
pub fn cookie_header(headers: &HeaderMap) -> HeaderValue {
    let pairs: Vec<String> = set_cookies(headers)
        .iter()
        .map(|line| line.split(';').next().unwrap().to_string())
        .collect();
    HeaderValue::from_str(&pairs.join("; ")).unwrap()
}
