//! Demo route tree served by the `arbor` binary.
//!
//! Module ids are file paths under the watched root, so touching
//! `<root>/convention/middleware/_middleware.rs` with watching enabled drops
//! that module from the cache.

use std::path::Path;

use axum::http::StatusCode;
use chrono::Utc;
use serde_json::{Map, Value};

use crate::cache::{handler_fn, HandlerSet, ModuleId, ModuleRegistry};
use crate::cookies::{CookieOptions, CookieValue};
use crate::http::response::{self, json_response};
use crate::http::{HandlerOutput, HttpError, RequestContext};
use crate::routing::{ResolveError, RouteEntry, RouteTable};

const INDEX: &str = "_index.rs";
const MIDDLEWARE: &str = "convention/middleware/_middleware.rs";
const MIDDLEWARE_INDEX: &str = "convention/middleware/_index.rs";
const MIDDLEWARE_ROUTE: &str = "convention/middleware/route.rs";
const FALLBACK: &str = "convention/fallback/_fallback.rs";
const FALLBACK_INDEX: &str = "convention/fallback/_index.rs";
const PARAM_P1: &str = "convention/url-params/$p1.rs";
const PARAM_DEEP: &str = "convention/url-params/$p2/deep.rs";
const COOKIES_INDEX: &str = "feats/cookies/_index.rs";
const COOKIES_GET: &str = "feats/cookies/get/$name.rs";
const COOKIES_SET_MIDDLEWARE: &str = "feats/cookies/set/$name/_middleware.rs";
const COOKIES_SET: &str = "feats/cookies/set/$name/_index.rs";
const COOKIES_SET_UNSIGNED: &str = "feats/cookies/set/$name/unsigned.rs";
const DYNAMIC: &str = "feats/dynamic/$param.rs";
const OUT_FUNCTION: &str = "out/function.rs";

/// Side-channel key used by the cookie-setting middleware.
pub const DATA_KEY: &str = "data";

/// Lifetime of cookies written by the demo.
const COOKIE_TTL_SECS: i64 = 50;

pub fn module_id(root: &Path, relative: &str) -> ModuleId {
    ModuleId::from_path(&root.join(relative))
}

fn ok(body: String) -> HandlerOutput {
    HandlerOutput::from(response::text(StatusCode::OK, body))
}

/// Register every demo module under `root`.
pub fn register_modules(registry: &ModuleRegistry, root: &Path) {
    let id = |relative: &str| module_id(root, relative);

    registry.register_set(id(INDEX), || {
        HandlerSet::new().get(handler_fn(|_ctx| {
            Box::pin(async move {
                ok("Arbor demo. Try /convention/middleware?mid, \
                    /convention/url-params/a/deep or /feats/cookies/set/n?data=42&type=json"
                    .to_string())
            })
        }))
    });

    registry.register_set(id(MIDDLEWARE), || {
        HandlerSet::new().get(handler_fn(|ctx| {
            Box::pin(async move {
                if ctx.has_query("mid") {
                    ok(format!("MIDDLEWARE: Matched {}", ctx.pathname()))
                } else {
                    HandlerOutput::Empty
                }
            })
        }))
    });

    registry.register_set(id(MIDDLEWARE_INDEX), || {
        HandlerSet::new().get(handler_fn(|ctx| {
            Box::pin(async move {
                ok(format!(
                    "INDEX: Matched {}\nYou can use ?mid in the url for test middleware",
                    ctx.pathname()
                ))
            })
        }))
    });

    registry.register_set(id(MIDDLEWARE_ROUTE), || {
        HandlerSet::new().get(handler_fn(|ctx| {
            Box::pin(async move { ok(format!("ROUTE: Matched {}", ctx.pathname())) })
        }))
    });

    registry.register_set(id(FALLBACK), || {
        HandlerSet::new().get(handler_fn(|ctx| {
            Box::pin(async move {
                if ctx.has_query("pass") {
                    HandlerOutput::Empty
                } else {
                    ok(format!("FALLBACK: Matched {}", ctx.pathname()))
                }
            })
        }))
    });

    registry.register_set(id(FALLBACK_INDEX), || {
        HandlerSet::new().get(handler_fn(|ctx| {
            Box::pin(async move { ok(format!("INDEX: Matched {}", ctx.pathname())) })
        }))
    });

    registry.register_set(id(PARAM_P1), || {
        HandlerSet::new().get(handler_fn(|ctx| {
            Box::pin(async move {
                ok(format!(
                    "PARAM: Matched ({}) {}",
                    ctx.param("p1").unwrap_or_default(),
                    ctx.pathname()
                ))
            })
        }))
    });

    registry.register_set(id(PARAM_DEEP), || {
        HandlerSet::new().get(handler_fn(|ctx| {
            Box::pin(async move {
                ok(format!(
                    "DEEP: Matched ({}) {}",
                    ctx.param("p2").unwrap_or_default(),
                    ctx.pathname()
                ))
            })
        }))
    });

    registry.register_set(id(COOKIES_INDEX), || {
        HandlerSet::new().get(handler_fn(|ctx| {
            Box::pin(async move {
                match ctx.cookies().raw_all() {
                    Ok(all) => {
                        let body: Map<String, Value> = all
                            .iter()
                            .map(|(name, raw)| (name.clone(), Value::String(raw.clone())))
                            .collect();
                        HandlerOutput::from(json_response(&Value::Object(body)))
                    }
                    Err(e) => HandlerOutput::from(e),
                }
            })
        }))
    });

    registry.register_set(id(COOKIES_GET), || {
        HandlerSet::new().get(handler_fn(|ctx| {
            Box::pin(async move {
                let name = ctx.param("name").unwrap_or_default();
                match ctx.cookies().get_value(name) {
                    Ok(value) => {
                        let body = value.map_or(Value::Null, CookieValue::into_json);
                        HandlerOutput::from(json_response(&body))
                    }
                    Err(e) => HandlerOutput::from(e),
                }
            })
        }))
    });

    registry.register_set(id(COOKIES_SET_MIDDLEWARE), || {
        HandlerSet::new().any(handler_fn(|ctx| Box::pin(async move { stash_data(ctx) })))
    });

    registry.register_set(id(COOKIES_SET), || {
        HandlerSet::new().any(handler_fn(|ctx| {
            Box::pin(async move { write_cookie(ctx, CookieOptions::default()) })
        }))
    });

    registry.register_set(id(COOKIES_SET_UNSIGNED), || {
        HandlerSet::new().any(handler_fn(|ctx| {
            Box::pin(async move { write_cookie(ctx, CookieOptions::raw()) })
        }))
    });

    registry.register_set(id(DYNAMIC), || {
        HandlerSet::new().get(handler_fn(|ctx| {
            Box::pin(async move { HandlerOutput::from(json_response(&dynamic_view(ctx))) })
        }))
    });

    registry.register_set(id(OUT_FUNCTION), || {
        HandlerSet::new().get(handler_fn(|_ctx| {
            Box::pin(async move { ok(out_function(1, 2).to_string()) })
        }))
    });
}

/// Shared helper called from a route module.
fn out_function(a: i64, b: i64) -> i64 {
    a + b
}

/// The values a `dynamic` view would be rendered with.
fn dynamic_view(ctx: &RequestContext) -> Value {
    let condition = ctx.query("condition").map_or(true, |c| c == "true");
    let num = ctx
        .query("num")
        .and_then(|n| n.parse::<i64>().ok())
        .unwrap_or(0);

    serde_json::json!({
        "title": "Dynamic",
        "param": ctx.param("param").unwrap_or("PARAM"),
        "condition": condition,
        "num": num,
    })
}

/// Parse `?data=` (JSON when `?type=json`) into the side channel.
fn stash_data(ctx: &mut RequestContext) -> HandlerOutput {
    let Some(data) = ctx.query("data") else {
        return HandlerOutput::from(HttpError::with_message(
            StatusCode::BAD_REQUEST,
            "Missing 'data' param",
        ));
    };

    let value = if ctx.query("type").as_deref() == Some("json") {
        match serde_json::from_str::<Value>(&data) {
            Ok(json) => CookieValue::from(json),
            Err(e) => {
                return HandlerOutput::from(
                    HttpError::with_message(StatusCode::BAD_REQUEST, "Invalid JSON in 'data'")
                        .with_details(Value::String(e.to_string())),
                );
            }
        }
    } else {
        CookieValue::Text(data)
    };

    ctx.insert_data(DATA_KEY, value);
    HandlerOutput::Empty
}

fn write_cookie(ctx: &mut RequestContext, options: CookieOptions) -> HandlerOutput {
    let Some(value) = ctx.take_data::<CookieValue>(DATA_KEY) else {
        return HandlerOutput::from(HttpError::with_message(
            StatusCode::BAD_REQUEST,
            "Expecting data",
        ));
    };
    let name = ctx.param("name").unwrap_or_default().to_string();

    let options = options
        .with_path("/")
        .with_expires(Utc::now() + chrono::Duration::seconds(COOKIE_TTL_SECS));

    match ctx.set_cookie(&name, value, &options) {
        Ok(()) => ok("OK".to_string()),
        Err(e) => HandlerOutput::from(e),
    }
}

/// The route table for the demo modules under `root`.
pub fn route_table(root: &Path) -> Result<RouteTable, ResolveError> {
    let id = |relative: &str| module_id(root, relative);

    Ok(RouteTable::new()
        .with_route(RouteEntry::new("/", id(INDEX))?)
        .with_route(RouteEntry::new("/convention/middleware", id(MIDDLEWARE_INDEX))?.middleware(id(MIDDLEWARE)))
        .with_route(RouteEntry::new("/convention/middleware/route", id(MIDDLEWARE_ROUTE))?.middleware(id(MIDDLEWARE)))
        .with_route(RouteEntry::new("/convention/fallback/*", id(FALLBACK_INDEX))?.fallback(id(FALLBACK)))
        .with_route(RouteEntry::new("/convention/url-params/$p2/deep", id(PARAM_DEEP))?)
        .with_route(RouteEntry::new("/convention/url-params/$p1", id(PARAM_P1))?)
        .with_route(RouteEntry::new("/feats/cookies", id(COOKIES_INDEX))?)
        .with_route(RouteEntry::new("/feats/cookies/get/$name", id(COOKIES_GET))?)
        .with_route(
            RouteEntry::new("/feats/cookies/set/$name/unsigned", id(COOKIES_SET_UNSIGNED))?
                .middleware(id(COOKIES_SET_MIDDLEWARE)),
        )
        .with_route(
            RouteEntry::new("/feats/cookies/set/$name", id(COOKIES_SET))?
                .middleware(id(COOKIES_SET_MIDDLEWARE)),
        )
        .with_route(RouteEntry::new("/feats/dynamic/$param", id(DYNAMIC))?)
        .with_route(RouteEntry::new("/out/function", id(OUT_FUNCTION))?))
}
