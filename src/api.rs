use crate::chart::ChartOptions;
use crate::config::RateLimitConfig;
use crate::dashboard::build_dashboard;
use crate::data_structures::{AppState, SharedProvider};
use crate::page::{PageContent, render_page};
use axum::{
    Form, Router,
    extract::State,
    response::Html,
    routing::get,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Deserialize)]
pub struct TickerForm {
    #[serde(default)]
    pub ticker: String,
}

pub fn router(state: AppState, rate_limit: &RateLimitConfig) -> Router {
    let mut router = Router::new().route("/", get(index_handler).post(analyze_handler));

    if rate_limit.is_enabled() {
        match GovernorConfigBuilder::default()
            .per_second(rate_limit.per_second)
            .burst_size(rate_limit.burst_size)
            .finish()
        {
            Some(governor_conf) => {
                info!(
                    per_second = rate_limit.per_second,
                    burst_size = rate_limit.burst_size,
                    "Rate limiting enabled"
                );
                router = router.route_layer(GovernorLayer::new(Arc::new(governor_conf)));
            }
            None => warn!(?rate_limit, "Invalid rate limit settings, serving without a limit"),
        }
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

#[instrument]
pub async fn index_handler() -> Html<String> {
    debug!("Rendering blank form");
    Html(render_page(PageContent::Blank))
}

// Handled failures are rendered inline; the status stays 200
#[instrument(skip_all, fields(ticker = %form.ticker))]
pub async fn analyze_handler(
    State(provider): State<SharedProvider>,
    State(chart): State<ChartOptions>,
    Form(form): Form<TickerForm>,
) -> Html<String> {
    match build_dashboard(provider.as_ref(), &form.ticker, chart).await {
        Ok(dashboard) => Html(render_page(PageContent::Results(&dashboard))),
        Err(error) => {
            warn!(%error, "Dashboard request failed");
            Html(render_page(PageContent::Error(&error)))
        }
    }
}
