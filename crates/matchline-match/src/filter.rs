//! Candidate eligibility: relationship exclusions, attribute filters and the
//! geo-distance gate.

use std::collections::HashSet;
use std::str::FromStr;

use tracing::trace;
use uuid::Uuid;

use matchline_types::CoreError;
use matchline_types::api::RecommendationQuery;
use matchline_types::models::User;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Requested age matches candidates within this many years either side.
pub const AGE_WINDOW: i32 = 3;

/// Which attribute filter the client switched on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FilterMode {
    #[default]
    None,
    Location,
    Age,
    Gender,
    Hobbies,
    All,
}

impl FilterMode {
    fn enables(self, filter: FilterMode) -> bool {
        self == FilterMode::All || self == filter
    }
}

impl FromStr for FilterMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "location" => Ok(Self::Location),
            "age" => Ok(Self::Age),
            "gender" => Ok(Self::Gender),
            "hobbies" => Ok(Self::Hobbies),
            "all" => Ok(Self::All),
            other => Err(CoreError::bad_request(format!("unknown filter mode '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters {
    pub location: Option<String>,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub hobbies: Option<String>,
    pub mode: FilterMode,
}

impl Filters {
    /// Blank query values count as absent.
    pub fn from_query(query: &RecommendationQuery) -> Result<Self, CoreError> {
        let age = match non_blank(&query.age) {
            Some(raw) => Some(
                raw.parse::<i32>()
                    .map_err(|_| CoreError::bad_request(format!("invalid age '{}'", raw)))?,
            ),
            None => None,
        };

        Ok(Self {
            location: non_blank(&query.location),
            age,
            gender: non_blank(&query.gender),
            hobbies: non_blank(&query.hobbies),
            mode: query.mode.as_deref().unwrap_or_default().parse()?,
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Great-circle distance in kilometres between two (lat, lon) points in degrees.
pub fn haversine_km(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lon1) = (from.0.to_radians(), from.1.to_radians());
    let (lat2, lon2) = (to.0.to_radians(), to.1.to_radians());
    let d_lat = lat2 - lat1;
    let d_lon = lon2 - lon1;

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Attribute and geo checks for a single candidate. Relationship exclusions
/// are applied separately by [`candidates`].
pub fn passes(viewer: &User, candidate: &User, filters: &Filters) -> bool {
    let mode = filters.mode;

    if mode.enables(FilterMode::Age) {
        if let Some(age) = filters.age {
            if (candidate.age - age).abs() > AGE_WINDOW {
                return false;
            }
        }
    }

    if mode.enables(FilterMode::Gender) {
        if let Some(gender) = &filters.gender {
            if !candidate.gender.trim().eq_ignore_ascii_case(gender) {
                return false;
            }
        }
    }

    if mode.enables(FilterMode::Hobbies) {
        if let Some(hobbies) = &filters.hobbies {
            if !contains_ci(&candidate.interests, hobbies) {
                return false;
            }
        }
    }

    // With coordinates on both sides the distance gate replaces the
    // location-label filter entirely.
    if let (Some(from), Some(to)) = (viewer.coordinates(), candidate.coordinates()) {
        let distance = haversine_km(from, to);
        if distance > viewer.preferred_radius {
            trace!(
                candidate = %candidate.id,
                distance_km = distance,
                radius_km = viewer.preferred_radius,
                "Candidate outside preferred radius"
            );
            return false;
        }
        return true;
    }

    if mode.enables(FilterMode::Location) {
        let wanted = filters.location.as_deref().unwrap_or(&viewer.location);
        if !contains_ci(&candidate.location, wanted) {
            trace!(
                candidate = %candidate.id,
                location = %candidate.location,
                wanted,
                "Candidate location does not match"
            );
            return false;
        }
    }

    true
}

/// The viewer's eligible candidates out of `pool`: never the viewer, never
/// anyone in `excluded` (declined either way or already connected), and only
/// those passing the active filters.
pub fn candidates(
    viewer: &User,
    pool: impl IntoIterator<Item = User>,
    excluded: &HashSet<Uuid>,
    filters: &Filters,
) -> Vec<User> {
    pool.into_iter()
        .filter(|c| c.id != viewer.id && !excluded.contains(&c.id))
        .filter(|c| passes(viewer, c, filters))
        .collect()
}
