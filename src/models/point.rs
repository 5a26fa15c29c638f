use serde::{Deserialize, Serialize};
use validator::Validate;

/// A fixed geographic location data is extracted for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct GridPoint {
    pub id: u32,

    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,

    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
}

impl GridPoint {
    pub fn new(id: u32, latitude: f64, longitude: f64) -> Self {
        Self {
            id,
            latitude,
            longitude,
        }
    }
}
