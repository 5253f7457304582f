//! A small RESTful + Web service: a JSON API under `/api`, a couple of
//! server-rendered pages under `/pages`, and the standard liveness/readiness
//! probes. Demonstrates registering both HTTP context types side by side and
//! letting the Router's classifier pick between them per request.
//!
//! Run with `ACTON_server__port=8080 cargo run --example rest-and-web`.

use std::sync::Arc;

use acton_service::prelude::*;
use acton_service::listeners::HttpListener;

#[derive(Clone)]
struct Greeter {
    default_name: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut config = Config::load_for_service("rest-and-web")?;
    if config.server.is_none() {
        config.server = Some(acton_service::config::ServerConfig::default());
    }

    init_tracing(&config)?;

    let dispatcher = Dispatcher::new(config.router.as_ref(), GroupConfig::default()).await?;

    dispatcher.configure_services(|services| {
        services.add_singleton(Greeter { default_name: "world".to_string() });
    });

    let router = dispatcher.router();

    router.register_restful(vec![Predicate::url("/health").unwrap()], health);
    router.register_restful(vec![Predicate::url("/ready").unwrap()], readiness);

    router.register_restful(
        vec![Predicate::url("/api/greet/:name").unwrap()],
        |ctx: RESTfulContext, greeter: Arc<Greeter>| async move {
            let name = ctx.url_segments().get("name").cloned().unwrap_or_else(|| greeter.default_name.clone());
            Ok(serde_json::json!({ "greeting": format!("hello, {name}") }))
        },
    );

    router.register_restful(
        vec![
            Predicate::url("/api/echo").unwrap(),
            Predicate::callback(|ctx| {
                ctx.as_any()
                    .downcast_ref::<RESTfulContext>()
                    .is_some_and(|ctx| ctx.request.method.as_ref() == Some(&Method::POST))
            }),
        ],
        |ctx: RESTfulContext| async move {
            let body: serde_json::Value = ctx.request.json()?;
            Ok(body)
        },
    );

    router.register_web(
        vec![Predicate::url("/pages/about").unwrap()],
        |_ctx: WebContext| async move {
            Ok(String::from("<html><body><h1>About</h1></body></html>"))
        },
    );

    router.register_web(
        vec![Predicate::url("/pages/:slug").unwrap()],
        |ctx: WebContext| async move {
            let slug = ctx.url_segments().get("slug").cloned().unwrap_or_default();
            Ok(format!("<html><body><h1>{slug}</h1></body></html>"))
        },
    );

    dispatcher.ensure_router_ready();

    let dispatcher = Arc::new(dispatcher);

    if let Some(http) = HttpListener::new(&config) {
        dispatcher.add_listener(Arc::new(http));
    }

    dispatcher.run().await
}
