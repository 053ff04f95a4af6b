use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Notify;

use restmux::config::{self, Config};
use restmux::rest::{str_case_equal, Context, Dispatcher, HandlerFuture, Reply};
use restmux::routing::ServeMux;
use restmux::server::{self, signal, ServerState};
use restmux::{logger, rest_error};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config::DEFAULT_CONFIG_PATH.to_string());
    let cfg = Config::load_from(&path)?;
    logger::init(&cfg)?;

    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
    }
    let runtime = runtime_builder.build()?;

    runtime.block_on(async_main(cfg))
}

async fn async_main(cfg: Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr = cfg.socket_addr()?;
    let listener = server::create_reusable_listener(addr, cfg.server.backlog)?;

    let mux = ServeMux::new();
    let dispatcher = Dispatcher::new(cfg.api.prefix.clone(), &mux);
    register_resources(&dispatcher);

    let shutdown = Arc::new(Notify::new());
    signal::start_signal_handler(Arc::clone(&shutdown))?;

    logger::log_server_start(&addr, &cfg, &dispatcher.resources());
    let state = Arc::new(ServerState::new(mux, &cfg));
    server::serve(listener, state, shutdown).await;
    Ok(())
}

fn register_resources(dispatcher: &Dispatcher) {
    dispatcher.handle_func("hello", hello);
    dispatcher.handle_func("echo", echo);
    dispatcher.handle_func("greet", greet);
    dispatcher.handle_func("raw", raw);
    dispatcher.handle_func("fail", fail);
}

#[derive(Serialize)]
struct Greeting {
    message: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct Echo {
    #[serde(default)]
    text: String,
    #[serde(default)]
    client: String,
}

/// GET /api/hello/<name>
fn hello(ctx: &mut Context) -> HandlerFuture<'_> {
    Box::pin(async move {
        let name = match ctx.path(1) {
            "" => "world",
            name => name,
        };
        Ok(Reply::json(Greeting {
            message: format!("hello, {name}"),
        }))
    })
}

/// POST /api/echo with a JSON body; echoes it back with the caller's address
fn echo(ctx: &mut Context) -> HandlerFuture<'_> {
    Box::pin(async move {
        let mut body: Echo = ctx.parse_json().await?;
        body.client = ctx.client_address()?;
        Ok(Reply::json(body))
    })
}

/// GET /api/greet?name=...&lang=...
fn greet(ctx: &mut Context) -> HandlerFuture<'_> {
    Box::pin(async move {
        let name = ctx.form_value("name", "stranger");
        let message = if str_case_equal(ctx.form_value("lang", "en"), "DE") {
            format!("hallo, {name}")
        } else {
            format!("hello, {name}")
        };
        Ok(Reply::json(Greeting { message }))
    })
}

/// Plain text reply
fn raw(ctx: &mut Context) -> HandlerFuture<'_> {
    Box::pin(async move {
        ctx.set_resource_type("text/plain; charset=utf-8");
        Ok(Reply::bytes(format!("{} {}\n", ctx.method(), ctx.uri())))
    })
}

/// Structured error, or an opaque one with a chosen status
fn fail(ctx: &mut Context) -> HandlerFuture<'_> {
    Box::pin(async move {
        if ctx.path(1) == "teapot" {
            ctx.set_error_response_code(hyper::StatusCode::IM_A_TEAPOT);
            return Err("short and stout".into());
        }
        Err(rest_error!(4001, "requested failure").into())
    })
}
