use crate::models::event::LocationFix;
use crate::utils::geo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Circles smaller than this are unreliable on consumer GPS; the use-case
/// layer rejects them outright.
pub const MIN_FENCE_RADIUS_M: f64 = 100.0;

/// A named circular geofence owned by a user. Mirrored into the OS
/// geofencing layer whenever the set of active fences changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeofenceLocation {
    pub id: String,       // ⇔ geofence_locations.id (TEXT, uuid v4)
    pub user_id: String,  // ⇔ geofence_locations.user_id
    pub name: String,     // ⇔ geofence_locations.name
    pub lat: f64,         // ⇔ geofence_locations.lat
    pub lng: f64,         // ⇔ geofence_locations.lng
    pub radius_m: f64,    // ⇔ geofence_locations.radius_m (>= MIN_FENCE_RADIUS_M)
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub synced: bool,
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GeofenceLocation {
    pub fn new(
        user_id: &str,
        name: &str,
        lat: f64,
        lng: f64,
        radius_m: f64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            lat,
            lng,
            radius_m,
            deleted: false,
            synced: false,
            synced_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Distance from a fix to the fence center, meters.
    pub fn distance_m(&self, fix: &LocationFix) -> f64 {
        geo::distance_m(self.lat, self.lng, fix.lat, fix.lng)
    }

    pub fn contains(&self, fix: &LocationFix) -> bool {
        self.distance_m(fix) <= self.radius_m
    }
}
