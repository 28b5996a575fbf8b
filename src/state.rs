use std::sync::Arc;

use crate::api::rest::auth::TokenKeys;
use crate::config::Config;
use crate::engine::{DispatchEngine, DispatchSettings};
use crate::geo::{GeoIndex, InMemoryGeoIndex};
use crate::hub::session::SessionContext;
use crate::hub::{self, ConnectionHub, HubHandle};
use crate::observability::metrics::Metrics;
use crate::store::{InMemoryStore, Store};

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub geo: Arc<dyn GeoIndex>,
    pub engine: Arc<DispatchEngine>,
    pub hub: HubHandle,
    pub tokens: TokenKeys,
    pub metrics: Metrics,
}

impl AppState {
    /// Builds the state on the in-memory backends. The returned hub must be
    /// spawned before any session or dispatch runs.
    pub fn new(config: Config) -> (Self, ConnectionHub) {
        Self::with_backends(
            config,
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryGeoIndex::new()),
        )
    }

    pub fn with_backends(
        config: Config,
        store: Arc<dyn Store>,
        geo: Arc<dyn GeoIndex>,
    ) -> (Self, ConnectionHub) {
        let metrics = Metrics::new();
        let (hub, connection_hub) = hub::channel(config.hub_command_buffer, metrics.clone());

        let engine = DispatchEngine::new(
            store.clone(),
            geo.clone(),
            Arc::new(hub.clone()),
            DispatchSettings {
                radius_km: config.match_radius_km,
                candidate_limit: config.match_candidate_limit,
            },
            metrics.clone(),
        );

        let tokens = TokenKeys::new(&config.jwt_secret, config.token_ttl_secs);

        (
            Self {
                config,
                store,
                geo,
                engine: Arc::new(engine),
                hub,
                tokens,
                metrics,
            },
            connection_hub,
        )
    }

    pub fn session_context(&self) -> SessionContext {
        SessionContext {
            hub: self.hub.clone(),
            geo: self.geo.clone(),
            logic: self.engine.clone(),
            request_timeout: self.config.request_timeout,
            client_buffer_size: self.config.client_buffer_size,
        }
    }
}
