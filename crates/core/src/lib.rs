#![forbid(unsafe_code)]

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod model;
pub mod time;
pub mod validation;

pub use model::{
    AuthUser, Box3D, BoxColor, BoxPatch, Dimensions, Measurement, MeasurementPatch, NewBox,
    NewMeasurement, PhotoRef, Placement, Space,
};

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub uuid::Uuid);

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(uuid::Uuid::parse_str(s)?))
            }
        }
    };
}

define_id!(
    /// Identity-provider user id. Opaque to the application.
    UserId
);
define_id!(
    /// Id of a space document in the per-user collection.
    SpaceId
);
define_id!(MeasurementId);
define_id!(BoxId);
