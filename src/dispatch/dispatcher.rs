//! The request pipeline.
//!
//! # States
//! ```text
//! Resolving ─none─▶ NotFound
//!     │
//!     ▼
//! Middlewares ─response─▶ Responded
//!     │ (all empty)
//!     ▼
//! Fallbacks ─response─▶ Responded
//!     │ (all empty)
//!     ▼
//! Controller ─response─▶ Responded
//!     │ (empty)
//!     ▼
//! NotFound
//! ```
//!
//! # Design Decisions
//! - Stages run strictly in declared order; the first response wins
//! - A module that cannot load short-circuits with 500, never 404
//! - A module without a matching or default handler short-circuits with 402
//! - Cookies are prepared once, before the first handler runs

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;

use crate::cache::{InvalidationEvent, ModuleCache, ModuleId};
use crate::cookies::CookieSigner;
use crate::http::response::{self, normalize};
use crate::http::RequestContext;
use crate::observability::metrics;
use crate::routing::{ResolverSlot, ResolverSource, RouteResolution};

/// Pipeline stage, used to label what decided a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolving,
    Middleware,
    Fallback,
    Controller,
    NotFound,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Resolving => "resolving",
            Stage::Middleware => "middleware",
            Stage::Fallback => "fallback",
            Stage::Controller => "controller",
            Stage::NotFound => "not_found",
        }
    }
}

/// Runs requests through resolver, module cache and handlers.
pub struct Dispatcher {
    modules: Arc<ModuleCache>,
    resolver: ResolverSlot,
    signer: Arc<CookieSigner>,
}

impl Dispatcher {
    pub fn new(
        modules: Arc<ModuleCache>,
        source: Arc<dyn ResolverSource>,
        signer: Arc<CookieSigner>,
    ) -> Self {
        Self {
            modules,
            resolver: ResolverSlot::new(source),
            signer,
        }
    }

    pub fn modules(&self) -> &Arc<ModuleCache> {
        &self.modules
    }

    pub fn resolver(&self) -> &ResolverSlot {
        &self.resolver
    }

    pub fn signer(&self) -> &Arc<CookieSigner> {
        &self.signer
    }

    /// Handle one request end to end.
    pub async fn dispatch(&self, request: Request<Body>) -> Response {
        let start = Instant::now();
        let method = request.method().clone();
        let mut ctx = RequestContext::new(request, Arc::clone(&self.signer));

        let (stage, response) = self.run(&mut ctx).await;

        tracing::debug!(
            request_id = ctx.request_id().unwrap_or("-"),
            method = %method,
            path = %ctx.pathname(),
            stage = stage.as_str(),
            status = response.status().as_u16(),
            "Request dispatched"
        );
        metrics::record_request(method.as_str(), response.status().as_u16(), stage.as_str(), start);
        response
    }

    /// React to a source change.
    pub fn apply_invalidation(&self, event: &InvalidationEvent) {
        match event {
            InvalidationEvent::Changed { kind, path } => {
                let id = ModuleId::from_path(path);
                tracing::info!(kind = kind.as_str(), module = %id, "Source changed");
                self.modules.invalidate(id.as_str());
            }
            InvalidationEvent::RoutesChanged => {
                self.resolver.reset();
                self.modules.clear();
            }
        }
    }

    async fn run(&self, ctx: &mut RequestContext) -> (Stage, Response) {
        let resolver = match self.resolver.current().await {
            Ok(resolver) => resolver,
            Err(e) => {
                tracing::error!(error = %e, "Route resolver unavailable");
                return (
                    Stage::Resolving,
                    response::text(StatusCode::INTERNAL_SERVER_ERROR, "Routing table unavailable"),
                );
            }
        };

        let Some(resolution) = resolver.resolve(ctx) else {
            tracing::debug!(path = %ctx.pathname(), "Routing miss");
            return (
                Stage::NotFound,
                response::text(StatusCode::NOT_FOUND, "Not Found"),
            );
        };

        let RouteResolution {
            middlewares,
            fallbacks,
            controller,
            params,
        } = resolution;
        ctx.params_mut().extend(params);
        ctx.prepare();

        for id in &middlewares {
            if let Some(response) = self.run_module(Stage::Middleware, id, ctx).await {
                return (Stage::Middleware, response);
            }
        }

        for id in &fallbacks {
            if let Some(response) = self.run_module(Stage::Fallback, id, ctx).await {
                return (Stage::Fallback, response);
            }
        }

        if let Some(response) = self.run_module(Stage::Controller, &controller, ctx).await {
            return (Stage::Controller, response);
        }

        (
            Stage::NotFound,
            response::text(StatusCode::NOT_FOUND, "Not found"),
        )
    }

    /// Run one module; `None` means it had nothing to say.
    async fn run_module(
        &self,
        stage: Stage,
        id: &ModuleId,
        ctx: &mut RequestContext,
    ) -> Option<Response> {
        let module = match self.modules.resolve(id).await {
            Ok(module) => module,
            Err(e) => {
                tracing::error!(stage = stage.as_str(), module = %id, error = %e, "Module unavailable");
                return Some(response::text(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Controller doesn't exist: {id}"),
                ));
            }
        };

        let Some(handler) = module.handler_for(ctx.method()) else {
            tracing::debug!(
                stage = stage.as_str(),
                module = %id,
                method = %ctx.method(),
                "Method not implemented"
            );
            return Some(response::text(
                StatusCode::PAYMENT_REQUIRED,
                "Method not implemented",
            ));
        };

        let output = handler.call(ctx).await;
        normalize(ctx.response_headers(), output)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("modules", &self.modules)
            .field("resolver_loaded", &self.resolver.is_loaded())
            .finish_non_exhaustive()
    }
}
