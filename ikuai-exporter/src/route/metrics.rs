use axum::extract::State;
use tracing::{Instrument, debug_span};

use crate::{AppState, collector::RouterApi, exposition::Exposition};

/// Run one collection cycle and render it.
///
/// Cycles never overlap; a scrape arriving mid-cycle waits for the running one.
pub async fn metrics<R>(State(state): State<AppState<R>>) -> Exposition
where
    R: RouterApi + Send + Sync + 'static,
{
    let _cycle = state.cycle.lock().await;

    let samples = crate::collector::scrape(state.router.as_ref(), &state.registry)
        .instrument(debug_span!("collect"))
        .await;

    Exposition::encode(&state.registry, &samples)
}
