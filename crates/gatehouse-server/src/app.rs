//! Route registration and dispatch.
//!
//! An [`App`] owns the application-level interceptors and a table of exact
//! paths. Each registered handler is composed once, at registration, as
//! `app interceptors -> route interceptors -> handler`.
//!
//! ```
//! use std::sync::Arc;
//! use gatehouse_core::Reply;
//! use gatehouse_middleware::handler_fn;
//! use gatehouse_middleware::stages::MemoryTokenStore;
//! use gatehouse_server::App;
//! use http::{Method, StatusCode};
//!
//! let mut app = App::with_default_stack(Arc::new(MemoryTokenStore::new()));
//! app.handle(
//!     Method::GET,
//!     "/api",
//!     "/ping",
//!     handler_fn(|_ctx, _req| async { Reply::json_status(StatusCode::OK) }),
//!     Vec::new(),
//! );
//! assert!(app.has_route(&Method::GET, "/api/ping"));
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use gatehouse_config::GatehouseConfig;
use gatehouse_core::{RequestContext, ResponseWriter};
use gatehouse_middleware::stages::{
    CsrfMiddleware, CsrfTokenStore, ErrorsMiddleware, LoggerMiddleware, PanicsMiddleware,
};
use gatehouse_middleware::{compose, BoxedMiddleware, Handler, Request};
use http::header::{self, HeaderMap, HeaderValue};
use http::{Method, Response, StatusCode};
use http_body_util::Full;

use crate::respond::{respond, RespondError};

/// `Strict-Transport-Security` value sent on every response.
pub const HSTS: &str = "max-age=63072000; includeSubDomains; preload";

const CORS_ALLOW_METHODS: &str = "GET, OPTIONS, POST, PATCH, PUT, DELETE";
const CORS_ALLOW_HEADERS: &str =
    "Accept, Content-Type, Content-Length, Accept-Encoding, X-CSRF-Token, Authorization";
const CORS_MAX_AGE: &str = "86400";
const PREFLIGHT_VARY: [&str; 3] = [
    "Origin",
    "Access-Control-Request-Method",
    "Access-Control-Request-Headers",
];

const NOT_FOUND_BODY: &str = "404 page not found\n";

/// The HTTP response type produced by dispatch.
pub type HttpResponse = Response<Full<Bytes>>;

/// Registers routes on an [`App`].
///
/// Implemented by the crates that own the domain handlers.
pub trait RouteAdder: Send + Sync {
    /// Adds routes to `app`.
    fn add(&self, app: &mut App, cfg: &GatehouseConfig);
}

/// Application router.
pub struct App {
    middleware: Vec<BoxedMiddleware>,
    routes: HashMap<String, HashMap<Method, Arc<dyn Handler>>>,
    cors_origins: Option<Vec<String>>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stages: Vec<_> = self.middleware.iter().map(|mw| mw.name()).collect();
        f.debug_struct("App")
            .field("middleware", &stages)
            .field("routes", &self.routes.len())
            .field("cors_origins", &self.cors_origins)
            .finish()
    }
}

impl App {
    /// Creates a router with the given application interceptors,
    /// outermost first.
    #[must_use]
    pub fn new(middleware: Vec<BoxedMiddleware>) -> Self {
        Self {
            middleware,
            routes: HashMap::new(),
            cors_origins: None,
        }
    }

    /// Creates a router with the standard stack: panics, errors, logger, csrf.
    ///
    /// Error translation sits directly inside panic recovery.
    #[must_use]
    pub fn with_default_stack(store: Arc<dyn CsrfTokenStore>) -> Self {
        Self::new(vec![
            Arc::new(PanicsMiddleware::new()),
            Arc::new(ErrorsMiddleware::new()),
            Arc::new(LoggerMiddleware::new()),
            Arc::new(CsrfMiddleware::new(store)),
        ])
    }

    /// Builds the standard application from configuration and route
    /// registrars.
    ///
    /// CORS is enabled when `cfg.cors.origins` is not empty.
    #[must_use]
    pub fn from_config(
        cfg: &GatehouseConfig,
        store: Arc<dyn CsrfTokenStore>,
        adders: &[&dyn RouteAdder],
    ) -> Self {
        let mut app = Self::with_default_stack(store);
        if !cfg.cors.origins.is_empty() {
            app.enable_cors(cfg.cors.origins.clone());
        }
        for adder in adders {
            adder.add(&mut app, cfg);
        }
        app
    }

    /// Sends CORS headers on every response and answers preflight requests.
    ///
    /// An origin matches when it equals an entry or the entry is `*`.
    pub fn enable_cors<I, S>(&mut self, origins: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cors_origins = Some(origins.into_iter().map(Into::into).collect());
    }

    /// Registers `handler` for `method` at `group + path`.
    ///
    /// Registering the same method and path again replaces the earlier
    /// handler.
    pub fn handle(
        &mut self,
        method: Method,
        group: &str,
        path: &str,
        handler: Arc<dyn Handler>,
        route_middleware: Vec<BoxedMiddleware>,
    ) {
        let pattern = format!("{group}{path}");
        let composed = compose(self.middleware.clone(), compose(route_middleware, handler));

        let methods = self.routes.entry(pattern.clone()).or_default();
        if methods.insert(method.clone(), composed).is_some() {
            tracing::warn!(method = %method, path = %pattern, "route replaced");
        } else {
            tracing::debug!(method = %method, path = %pattern, "route registered");
        }
    }

    /// Returns `true` if `method` is routed at `path`.
    #[must_use]
    pub fn has_route(&self, method: &Method, path: &str) -> bool {
        self.routes
            .get(path)
            .is_some_and(|methods| methods.contains_key(method))
    }

    /// Returns the number of method and path pairs registered.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.values().map(HashMap::len).sum()
    }

    /// Routes one request and builds its response.
    pub async fn dispatch(&self, ctx: RequestContext, request: Request) -> HttpResponse {
        let writer = ResponseWriter::new();
        let mut edge = HeaderMap::new();
        self.apply_edge_headers(&mut edge, request.headers().get(header::ORIGIN));
        for (name, value) in edge {
            if let Some(name) = name {
                writer.set_header(name, value);
            }
        }

        if self.cors_origins.is_some() {
            if request.method() == Method::OPTIONS {
                for value in PREFLIGHT_VARY {
                    writer.append_header(header::VARY, HeaderValue::from_static(value));
                }
                writer.write_header(StatusCode::NO_CONTENT);
                return writer.into_response();
            }
        }

        let Some(methods) = self.routes.get(request.uri().path()) else {
            writer.set_header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            );
            writer.write_header(StatusCode::NOT_FOUND);
            writer.write_body(NOT_FOUND_BODY);
            return writer.into_response();
        };

        let Some(handler) = methods.get(request.method()) else {
            if let Ok(allow) = HeaderValue::from_str(&allow_list(methods)) {
                writer.set_header(header::ALLOW, allow);
            }
            writer.write_header(StatusCode::METHOD_NOT_ALLOWED);
            return writer.into_response();
        };

        let ctx = ctx.with_writer(writer.clone());
        let reply = handler.call(ctx.clone(), request).await;

        match respond(&ctx, &writer, reply) {
            Ok(()) => {}
            Err(RespondError::ClientDisconnected) => {
                tracing::debug!(request_id = %ctx.request_id(), "client disconnected");
            }
            Err(err) => {
                tracing::error!(request_id = %ctx.request_id(), err = %err, "web-response");
            }
        }

        writer.into_response()
    }

    /// Returns the application interceptor names, outermost first.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.middleware.iter().map(|mw| mw.name()).collect()
    }

    /// Adds the headers every response carries: HSTS, and the CORS headers
    /// when CORS is enabled.
    ///
    /// `origin` is the request's `Origin` header. Responses built outside
    /// [`dispatch`](Self::dispatch), such as timeouts, use this too.
    pub fn apply_edge_headers(&self, headers: &mut HeaderMap, origin: Option<&HeaderValue>) {
        headers.insert(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static(HSTS),
        );
        if let Some(origins) = &self.cors_origins {
            apply_cors(headers, origins, origin);
        }
    }
}

fn apply_cors(headers: &mut HeaderMap, origins: &[String], origin: Option<&HeaderValue>) {
    let origin = origin.and_then(|value| value.to_str().ok()).unwrap_or_default();
    let matched = origins
        .iter()
        .find(|allowed| allowed.as_str() == "*" || allowed.as_str() == origin);

    if let Some(value) = matched.and_then(|allowed| HeaderValue::from_str(allowed).ok()) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(CORS_ALLOW_HEADERS),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static(CORS_MAX_AGE),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
}

fn allow_list(methods: &HashMap<Method, Arc<dyn Handler>>) -> String {
    let mut names: Vec<_> = methods.keys().map(Method::as_str).collect();
    names.sort_unstable();
    names.join(", ")
}
