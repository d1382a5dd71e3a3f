//! Opaque ID newtypes for board and search entities.
//!
//! Pads, traces, vias and connections are owned by the [`Board`](crate::board::Board);
//! component placements are owned by the
//! [`MatchArena`](crate::matcher::MatchArena). Everything else refers to them
//! through these `u32` handles.

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Creates an ID from a raw `u32` index.
            pub fn from_raw(index: u32) -> Self {
                Self(index)
            }

            /// Returns the raw `u32` index.
            pub fn as_raw(self) -> u32 {
                self.0
            }

            pub(crate) fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Solderable pad on either side of the board.
    PadId
);

define_id!(
    /// Copper trace polygon on one side of the board.
    TraceId
);

define_id!(
    /// Drilled hole.
    ViaId
);

define_id!(
    /// Electrically joined group of pads, traces and through-holes.
    ConnectionId
);

define_id!(
    /// Interned component placement.
    MatchId
);
