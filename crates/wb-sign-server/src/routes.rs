// Copyright (c) Whitebox Signing Service Contributors
// SPDX-License-Identifier: Apache-2.0

//! Warp filter composition: wires every handler to its route, injects the
//! shared [`Context`], and installs the top-level rejection recovery and
//! per-request timeout.

use crate::auth::service::{self, authenticated};
use crate::context::Context;
use crate::error::{handle_rejection, reply_ok, ServiceError};
use crate::protected;
use futures::FutureExt;
use std::future::Future;
use std::net::IpAddr;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use warp::Filter;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs `fut` under the 30s per-request timeout and a panic guard,
/// converting either an elapsed deadline or a caught panic into the same
/// `ServiceError` rejection path every other handler failure takes, so one
/// bad request can never take the whole listener down with it.
async fn with_timeout<T>(
    fut: impl Future<Output = Result<T, ServiceError>>,
) -> Result<T, warp::Rejection> {
    let guarded = AssertUnwindSafe(tokio::time::timeout(REQUEST_TIMEOUT, fut)).catch_unwind();
    match guarded.await {
        Ok(Ok(result)) => result.map_err(warp::reject::custom),
        Ok(Err(_)) => Err(warp::reject::custom(ServiceError::Config(
            "request timed out".into(),
        ))),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "handler panicked".to_string());
            tracing::error!(%message, "request handler panicked");
            Err(warp::reject::custom(ServiceError::Panic(message)))
        }
    }
}

fn with_context(
    ctx: Context,
) -> impl Filter<Extract = (Context,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

fn remote_ip() -> impl Filter<Extract = (Option<IpAddr>,), Error = std::convert::Infallible> + Clone
{
    warp::filters::addr::remote().map(|addr: Option<std::net::SocketAddr>| addr.map(|a| a.ip()))
}

/// Records one `HTTP_REQUESTS` observation for `route`, using the status the
/// response will actually carry: 200 on success, or the `ServiceError`'s
/// mapped status when the rejection is one of ours.
fn record_route_metric(route: &'static str, result: &Result<impl warp::Reply, warp::Rejection>) {
    let status = match result {
        Ok(_) => 200,
        Err(rejection) => rejection
            .find::<ServiceError>()
            .map(|e| e.status_code().as_u16())
            .unwrap_or(500),
    };
    crate::metrics::HTTP_REQUESTS
        .with_label_values(&[route, &status.to_string()])
        .inc();
}

pub fn routes(
    ctx: Context,
) -> impl Filter<Extract = (impl warp::Reply,), Error = std::convert::Infallible> + Clone {
    let introduce = warp::path("introduce")
        .and(warp::post())
        .and(with_context(ctx.clone()))
        .and(remote_ip())
        .and(warp::body::json())
        .and_then(|ctx, ip, req| async move {
            let result = with_timeout(service::introduce(ctx, ip, req)).await.map(reply_ok);
            record_route_metric("introduce", &result);
            result
        });

    let answer = warp::path("answer")
        .and(warp::post())
        .and(with_context(ctx.clone()))
        .and(remote_ip())
        .and(warp::body::json())
        .and_then(|ctx, ip, req| async move {
            let result = with_timeout(service::answer(ctx, ip, req)).await.map(reply_ok);
            record_route_metric("answer", &result);
            result
        });

    let knock = warp::path("knock")
        .and(warp::post())
        .and(authenticated(ctx.clone()))
        .and_then(|session| async move {
            let result = with_timeout(protected::knock(session)).await.map(reply_ok);
            record_route_metric("knock", &result);
            result
        });

    let sign = warp::path("sign")
        .and(warp::post())
        .and(with_context(ctx.clone()))
        .and(authenticated(ctx.clone()))
        .and(warp::body::json())
        .and_then(|ctx, session, req| async move {
            let result = with_timeout(protected::sign(ctx, session, req)).await.map(reply_ok);
            record_route_metric("sign", &result);
            result
        });

    let metrics = warp::path("metrics")
        .and(warp::get())
        .map(crate::metrics::render);

    let healthz = warp::path("healthz")
        .and(warp::get())
        .map(|| warp::reply::with_status("ok", warp::http::StatusCode::OK));

    introduce
        .or(answer)
        .or(knock)
        .or(sign)
        .or(metrics)
        .or(healthz)
        .with(warp::trace::request())
        .recover(handle_rejection)
}
