use std::net::SocketAddr;

use axum::{
    extract::State,
    http::{header, StatusCode},
    middleware,
    response::IntoResponse,
    routing::get,
    Router,
};
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};

use crate::{metrics, state::AppState, tokens, users};

pub fn build_app(state: AppState) -> Router {
    let request_metrics = state.metrics.clone();
    Router::new()
        .nest(
            "/v1",
            Router::new()
                .merge(users::router())
                .merge(tokens::router())
                .route("/health", get(|| async { "ok" }))
                .route("/metrics", get(render_metrics)),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, ?latency, "response");
                        } else {
                            tracing::info!(%status, ?latency, "response");
                        }
                    },
                ),
        )
        // A broken record invariant panics inside a handler; answer 500 and keep serving.
        .layer(CatchPanicLayer::new())
        .layer(middleware::from_fn_with_state(
            request_metrics,
            metrics::track,
        ))
}

async fn render_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "metrics encoding failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;

    #[tokio::test]
    async fn health_is_served_under_v1() {
        let app = build_app(AppState::fake());
        let res = app
            .oneshot(Request::get("/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn handler_panics_become_500() {
        async fn boom() -> &'static str {
            panic!("missing password hash for user")
        }

        let app = Router::new()
            .route("/boom", get(boom))
            .layer(CatchPanicLayer::new());
        let res = app
            .oneshot(Request::get("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn metrics_count_requests_by_status() {
        let state = AppState::fake();

        let res = build_app(state.clone())
            .oneshot(Request::get("/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let res = build_app(state.clone())
            .oneshot(Request::get("/v1/nowhere").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let res = build_app(state)
            .oneshot(Request::get("/v1/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();

        assert!(text.contains("userbase_http_requests_received_total 3"), "{text}");
        assert!(
            text.contains(r#"userbase_http_responses_total{method="GET",status="200"} 1"#),
            "{text}"
        );
        assert!(
            text.contains(r#"userbase_http_responses_total{method="GET",status="404"} 1"#),
            "{text}"
        );
        assert!(
            text.contains(r#"userbase_http_request_duration_seconds_count{method="GET"} 2"#),
            "{text}"
        );
        // the scrape itself is still in flight while rendering
        assert!(text.contains("userbase_http_requests_in_flight 1"), "{text}");
    }

    #[tokio::test]
    async fn panics_are_counted_as_server_errors() {
        async fn boom() -> &'static str {
            panic!("missing password hash for user")
        }

        let state = AppState::fake();
        let recorder = state.metrics.clone();
        let app = Router::new()
            .route("/boom", get(boom))
            .layer(CatchPanicLayer::new())
            .layer(middleware::from_fn_with_state(recorder.clone(), metrics::track));
        let res = app
            .oneshot(Request::get("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let text = recorder.render().unwrap();
        assert!(
            text.contains(r#"userbase_http_responses_total{method="GET",status="500"} 1"#),
            "{text}"
        );
    }
}
