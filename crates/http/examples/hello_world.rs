use http::StatusCode;
use http::header::CONTENT_TYPE;
use lean_http::config::ListenerConfig;
use lean_http::handler::{HandlerError, make_handler};
use lean_http::protocol::{Request, Response};
use lean_http::server::Server;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

async fn hello_world(request: Request) -> Result<Response, HandlerError> {
    info!(method = %request.method(), path = request.path(), body_len = request.body().len(), "request");

    match request.path() {
        "/" => Ok(Response::text(StatusCode::OK, "Hello World!\r\n")),
        "/echo" => {
            let mut response = Response::new(StatusCode::OK).with_body(request.body().clone());
            if let Some(content_type) = request.headers().get(CONTENT_TYPE) {
                response.headers_mut().insert(CONTENT_TYPE, content_type.clone());
            }
            Ok(response)
        }
        "/fail" => Err("this handler always fails".into()),
        _ => Ok(Response::text(StatusCode::NOT_FOUND, "404 not found\r\n")),
    }
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config = ListenerConfig::default().with_port(3000);
    let listener = match Server::new(config, make_handler(hello_world)).bind().await {
        Ok(listener) => listener,
        Err(e) => {
            error!(cause = %e, "bind server error");
            return;
        }
    };

    info!(address = %listener.local_addr(), "press ctrl-c to stop");
    listener
        .serve(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(cause = %e, "can't listen for ctrl-c");
            }
        })
        .await;
}
