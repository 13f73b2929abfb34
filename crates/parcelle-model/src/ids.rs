//! Record identifiers
//!
//! Every persisted record is keyed by a ULID (sortable, collision-free).
//! `RecordId` is the raw store-level id; each entity gets its own newtype so
//! a zone id cannot be handed to code expecting a document id.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Raw record identifier as seen by the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub Ulid);

impl RecordId {
    /// Generate a fresh id.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RecordId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Ulid::from_str(s)?))
    }
}

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub RecordId);

        impl $name {
            /// Generate a fresh id.
            #[inline]
            #[must_use]
            pub fn new() -> Self {
                Self(RecordId::new())
            }

            /// The raw store-level id.
            #[inline]
            #[must_use]
            pub fn record(self) -> RecordId {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<RecordId> for $name {
            fn from(id: RecordId) -> Self {
                Self(id)
            }
        }

        impl From<$name> for RecordId {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Conversation identifier.
    ConversationId
);
entity_id!(
    /// Project identifier.
    ProjectId
);
entity_id!(
    /// Municipality ("city") record identifier.
    CityId
);
entity_id!(
    /// Zoning category identifier.
    ZoningId
);
entity_id!(
    /// Zone identifier.
    ZoneId
);
entity_id!(
    /// Regulatory document identifier.
    DocumentId
);
entity_id!(
    /// Research-history entry identifier.
    ResearchEntryId
);
