#[derive(Clone)]
struct AppState {
    inner: std::sync::Arc<Mutex<SpaceApi>>,
    bus: std::sync::Arc<SpaceBus>,
    notifier: WebhookNotifier,
    api_token: std::sync::Arc<String>,
}

impl AppState {
    fn new(api: SpaceApi, api_token: String) -> Self {
        Self {
            inner: std::sync::Arc::new(Mutex::new(api)),
            bus: std::sync::Arc::new(SpaceBus::new()),
            notifier: WebhookNotifier::new(),
            api_token: std::sync::Arc::new(api_token),
        }
    }
}

/// Surfaces a degraded persistence layer to stream clients without failing
/// the request that noticed it.
fn forward_persistence_warning(state: &AppState, api: &SpaceApi) {
    if let Some(error) = api.last_persistence_error() {
        state.bus.warn(format!("persistence degraded: {error}"));
    }
}
