use std::time::Duration;

use micro_fetch::redirect::RedirectPolicy;
use micro_fetch::{Context, Request, handler_fn};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

// cargo run --example get -- http://127.0.0.1:8080/
#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let url = std::env::args().nth(1).unwrap_or_else(|| "http://127.0.0.1:8080/".to_string());

    let result = Request::get(&url)
        .set_header("accept", "*/*")
        .timeout(Duration::from_secs(10))
        .redirect_policy(RedirectPolicy::default())
        .execute(
            &Context::background(),
            handler_fn(|state| {
                Box::pin(async move {
                    info!(status = %state.status(), url = %state.url(), "response head");
                    for (name, value) in state.header() {
                        info!(name, value = %String::from_utf8_lossy(value), "header");
                    }

                    let mut received = 0;
                    while let Some(chunk) = state.body().chunk().await? {
                        received += chunk.len();
                    }

                    let trailer = state.trailer()?;
                    Ok((received, trailer.len()))
                })
            }),
        )
        .await;

    match result {
        Ok((received, trailers)) => info!(received, trailers, "done"),
        Err(e) => error!(cause = %e, "request failed"),
    }
}
