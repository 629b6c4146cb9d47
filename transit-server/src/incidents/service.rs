//! Staff incident lifecycle.

use std::sync::Arc;

use tracing::{info, warn};

use crate::clock::Clock;
use crate::domain::{DomainError, Incident, IncidentId, IncidentKind, IncidentSource, LineId, StopId, UserId};
use crate::error::ErrorKind;
use crate::notify::{DispatchReport, NotificationDispatcher, Provenance};
use crate::store::{DocumentStore, StoreError};

/// Error from a staff incident operation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum IncidentError {
    #[error("invalid incident: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IncidentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IncidentError::InvalidInput(_) => ErrorKind::InvalidInput,
            IncidentError::Domain(e) => e.kind(),
            IncidentError::Store(e) => e.kind(),
        }
    }
}

/// An incident entered directly by staff.
#[derive(Debug, Clone)]
pub struct StaffIncident {
    pub kind: IncidentKind,
    /// Defaults to the kind's name.
    pub title: Option<String>,
    pub line_ids: Vec<LineId>,
    pub stop_ids: Vec<StopId>,
    pub segments: Vec<(StopId, StopId)>,
    pub delay_minutes: Option<u32>,
    pub created_by: UserId,
}

/// Creates and resolves staff incidents.
pub struct IncidentService {
    store: Arc<dyn DocumentStore>,
    dispatcher: Arc<NotificationDispatcher>,
    clock: Arc<dyn Clock>,
}

impl IncidentService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        dispatcher: Arc<NotificationDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            clock,
        }
    }

    /// Publish a staff incident immediately and notify without gating.
    pub async fn create_staff_incident(
        &self,
        request: StaffIncident,
    ) -> Result<(Incident, DispatchReport), IncidentError> {
        if request.line_ids.is_empty() {
            return Err(IncidentError::InvalidInput("at least one line is required".into()));
        }

        let mut incident = Incident::published(
            request.kind,
            request.line_ids,
            IncidentSource::Staff {
                created_by: request.created_by.clone(),
            },
            self.clock.now(),
        );
        if let Some(title) = request.title.filter(|t| !t.trim().is_empty()) {
            incident.title = title;
        }
        incident.stop_ids = request.stop_ids;
        incident.segments = request.segments;
        incident.delay_minutes = request.delay_minutes;

        self.store.put_incident(incident.clone()).await?;
        info!(incident = %incident.id, kind = %incident.kind, by = %request.created_by, "staff incident published");

        let report = match self.dispatcher.dispatch_created(&incident, Provenance::Staff).await {
            Ok(report) => report,
            Err(e) => {
                warn!(incident = %incident.id, error = %e, "notification dispatch failed");
                DispatchReport::default()
            }
        };
        Ok((incident, report))
    }

    /// Mark an incident resolved so the planner stops applying it.
    pub async fn resolve_incident(&self, id: IncidentId) -> Result<Incident, IncidentError> {
        let mut incident = self.store.get_incident(id).await?;
        incident.resolve(self.clock.now())?;
        self.store.put_incident(incident.clone()).await?;

        let report = self.dispatcher.dispatch_updated(&incident).await;
        info!(incident = %id, events = report.events_published, "incident resolved");
        Ok(incident)
    }
}
