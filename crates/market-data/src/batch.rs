//! Concurrent fan-out with per-item results.

use std::future::Future;

use futures::future::join_all;

/// Runs `task` for every key concurrently and returns `(key, result)` pairs
/// in input order. One failing or slow item never prevents the others from
/// completing.
pub async fn fan_out<T, E, F, Fut>(keys: &[String], task: F) -> Vec<(String, Result<T, E>)>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let futures = keys.iter().map(|key| {
        let fut = task(key.clone());
        let key = key.clone();
        async move { (key, fut.await) }
    });
    join_all(futures).await
}
