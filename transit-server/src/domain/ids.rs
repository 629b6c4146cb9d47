//! Identifier types.
//!
//! Reference-data ids (stops, lines, routes, trips, users) are opaque
//! non-empty strings assigned by the importer or identity provider.
//! Ids minted by this service (incidents, pending reports) are UUIDs.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error returned when parsing an empty or oversized identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} id: {reason}")]
pub struct InvalidId {
    kind: &'static str,
    reason: &'static str,
}

/// Longest accepted reference id.
const MAX_ID_LEN: usize = 128;

macro_rules! reference_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Parse an id, rejecting empty, blank or oversized strings.
            pub fn parse(s: impl Into<String>) -> Result<Self, InvalidId> {
                let s = s.into();
                if s.trim().is_empty() {
                    return Err(InvalidId {
                        kind: $kind,
                        reason: "must not be empty",
                    });
                }
                if s.len() > MAX_ID_LEN {
                    return Err(InvalidId {
                        kind: $kind,
                        reason: "too long",
                    });
                }
                Ok(Self(s))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = InvalidId;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::parse(s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

macro_rules! generated_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Mint a fresh random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

reference_id!(
    /// Identifier of a stop.
    ///
    /// ```
    /// use transit_server::domain::StopId;
    ///
    /// let id = StopId::parse("S-001").unwrap();
    /// assert_eq!(id.as_str(), "S-001");
    /// assert!(StopId::parse("  ").is_err());
    /// ```
    StopId,
    "stop"
);
reference_id!(
    /// Identifier of a line (a branded service such as "Bus 12").
    LineId,
    "line"
);
reference_id!(
    /// Identifier of a route (one direction/pattern of a line).
    RouteId,
    "route"
);
reference_id!(
    /// Identifier of a scheduled trip.
    TripId,
    "trip"
);
reference_id!(
    /// Identifier of a user (reporter, moderator or notification recipient).
    UserId,
    "user"
);

generated_id!(
    /// Identifier of a published (or draft) incident.
    IncidentId
);
generated_id!(
    /// Identifier of a pending incident report.
    PendingId
);
