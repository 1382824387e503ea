//! Record shapes for externally managed users and devices.
//!
//! The aggregation engine only consumes user and device ids as opaque keys;
//! the records themselves are created and looked up by an external CRUD
//! layer. The shapes live here so collaborators (seed tooling, API layers)
//! share one definition.

use serde::{Deserialize, Serialize};
use time::Date;

/// A person whose devices report glucose measurements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Opaque identifier.
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(with = "crate::day::serde_day")]
    pub date_of_birth: Date,
    pub email: String,
    pub phone_number: String,
}

/// Kind of glucose measuring device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceKind {
    /// Blood glucose reader (spot checks).
    #[serde(rename = "BG")]
    BloodGlucose,
    /// Continuous glucose monitor.
    #[serde(rename = "CGM")]
    Continuous,
}

/// A glucose measuring device owned by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Opaque identifier.
    pub id: String,
    /// Owning user's id.
    pub user_id: String,
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
    pub kind: DeviceKind,
}
