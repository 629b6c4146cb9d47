//! Application state for the web layer.

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::graph::ReferenceData;
use crate::incidents::IncidentService;
use crate::notify::{EventPublisher, NotificationDispatcher, Notifier};
use crate::planner::JourneyService;
use crate::quorum::QuorumEngine;
use crate::store::DocumentStore;
use crate::sweep::Sweepers;
use crate::trust::TrustService;

/// Shared application state.
///
/// Contains all the services needed to handle requests.
#[derive(Clone)]
pub struct AppState {
    /// Journey planner over the current graph
    pub journeys: Arc<JourneyService>,

    /// Crowd report quorum and moderation
    pub quorum: Arc<QuorumEngine>,

    /// Staff incident operations
    pub incidents: Arc<IncidentService>,
}

impl AppState {
    /// Wire every service over one store, clock and notification transport.
    ///
    /// Also returns the services the background sweeps drive.
    pub fn wire(
        config: &AppConfig,
        data: ReferenceData,
        store: Arc<dyn DocumentStore>,
        publisher: Arc<dyn EventPublisher>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> (Self, Sweepers) {
        let dispatcher = Arc::new(NotificationDispatcher::new(
            store.clone(),
            publisher,
            notifier,
            clock.clone(),
            config.notification.clone(),
        ));
        let journeys = Arc::new(JourneyService::new(
            data,
            store.clone(),
            clock.clone(),
            config.search.clone(),
        ));
        let trust = TrustService::new(store.clone(), clock.clone(), config.trust.clone());
        let quorum = Arc::new(
            QuorumEngine::new(
                store.clone(),
                trust.clone(),
                dispatcher.clone(),
                clock.clone(),
                config.threshold.clone(),
            )
            .with_stop_lookup(journeys.clone()),
        );
        let incidents = Arc::new(IncidentService::new(store, dispatcher.clone(), clock));

        let state = Self {
            journeys,
            quorum: quorum.clone(),
            incidents,
        };
        let sweepers = Sweepers {
            quorum,
            trust,
            dispatcher,
        };
        (state, sweepers)
    }
}
