use serde::de::DeserializeOwned;

use crate::extract::json;
use crate::redirect::RedirectPolicy;
use crate::{ClientError, Context, Request};

/// Performs `method` on `url` and deserializes the JSON response body.
///
/// Redirects are followed with the default [`RedirectPolicy`]. Non-2xx responses fail
/// with [`ClientError::Status`].
///
/// ```no_run
/// use micro_fetch::{fetch, ClientError, Context};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Health {
///     status: String,
/// }
///
/// # async fn run() -> Result<(), ClientError> {
/// let health: Health = fetch(&Context::background(), "GET", "http://127.0.0.1:8080/health").await?;
/// println!("{}", health.status);
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// See [`Request::execute`].
pub async fn fetch<T>(ctx: &Context, method: &str, url: &str) -> Result<T, ClientError>
where
    T: DeserializeOwned + Send,
{
    fetch_with(ctx, method, url, |request| request).await
}

/// Like [`fetch`], with `configure` adjusting the request before it runs.
///
/// # Errors
///
/// See [`Request::execute`].
pub async fn fetch_with<T, F>(ctx: &Context, method: &str, url: &str, configure: F) -> Result<T, ClientError>
where
    T: DeserializeOwned + Send,
    F: FnOnce(Request) -> Request,
{
    let request = Request::new(method, url).redirect_policy(RedirectPolicy::default());
    configure(request).execute(ctx, json::<T>()).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde::Deserialize;

    use super::*;
    use crate::test_support::ScriptedConnector;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: u32,
        name: String,
    }

    #[tokio::test]
    async fn follows_redirects_and_decodes() {
        let connector = ScriptedConnector::new(vec![
            vec!["HTTP/1.1 302 Found\r\nlocation: /items/7\r\ncontent-length: 0\r\n\r\n"],
            vec!["HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 24\r\n\r\n{\"id\":7,\"name\":\"widget\"}"],
        ]);

        let item: Item = fetch_with(&Context::background(), "GET", "http://example.com/latest", |request| {
            request.no_pool().connector(Arc::new(connector.clone()))
        })
        .await
        .unwrap();

        assert_eq!(item, Item { id: 7, name: "widget".to_string() });
        let requests = connector.requests();
        assert!(requests[1].starts_with("GET /items/7 HTTP/1.1\r\n"));
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let connector = ScriptedConnector::new(vec![vec!["HTTP/1.1 404 Not Found\r\ncontent-length: 9\r\n\r\nnot found"]]);

        let result: Result<Item, _> = fetch_with(&Context::background(), "GET", "http://example.com/items/8", |request| {
            request.no_pool().connector(Arc::new(connector.clone()))
        })
        .await;

        match result {
            Err(ClientError::Status(e)) => {
                assert_eq!(e.status().code(), 404);
                assert_eq!(e.url().as_str(), "http://example.com/items/8");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
