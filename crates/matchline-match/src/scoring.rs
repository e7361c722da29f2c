//! Compatibility scoring between a viewer and a candidate.
//!
//! The score is only meaningful relative to other scores for the same viewer.
//! Interest overlap, location match and age proximity are symmetric in the two
//! profiles; completeness and preference matching are not.

use std::collections::HashSet;

use matchline_types::models::User;

pub const POINTS_PER_SHARED_INTEREST: i64 = 10;
pub const SAME_LOCATION_POINTS: i64 = 30;
pub const CLOSE_AGE_POINTS: i64 = 20;
pub const COMPLETE_PROFILE_POINTS: i64 = 10;
pub const PREFERENCE_MATCH_POINTS: i64 = 20;

/// Preference value that matches every gender.
const ANY_PREFERENCE: &str = "any";

/// Per-component score, kept around for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreBreakdown {
    pub interests: i64,
    pub location: i64,
    pub age: i64,
    pub completeness: i64,
    pub preference: i64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> i64 {
        self.interests + self.location + self.age + self.completeness + self.preference
    }
}

pub fn score(viewer: &User, candidate: &User) -> i64 {
    breakdown(viewer, candidate).total()
}

pub fn breakdown(viewer: &User, candidate: &User) -> ScoreBreakdown {
    ScoreBreakdown {
        interests: interest_score(&viewer.interests, &candidate.interests),
        location: if viewer.location == candidate.location {
            SAME_LOCATION_POINTS
        } else {
            0
        },
        age: age_score(viewer.age, candidate.age),
        completeness: if candidate.has_custom_picture() && !candidate.interests.trim().is_empty() {
            COMPLETE_PROFILE_POINTS
        } else {
            0
        },
        preference: preference_score(viewer, candidate),
    }
}

/// Splits a comma-separated interest list into trimmed, lowercased tokens.
pub fn parse_interests(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn interest_score(a: &str, b: &str) -> i64 {
    let a = parse_interests(a);
    let b = parse_interests(b);
    a.intersection(&b).count() as i64 * POINTS_PER_SHARED_INTEREST
}

/// Full points within two years, then two points off per year, bottoming out at ten years.
fn age_score(a: i32, b: i32) -> i64 {
    let diff = i64::from(a.abs_diff(b));
    match diff {
        0..=2 => CLOSE_AGE_POINTS,
        3..=10 => CLOSE_AGE_POINTS - 2 * diff,
        _ => 0,
    }
}

fn preference_score(viewer: &User, candidate: &User) -> i64 {
    let mut points = 0;
    if matches_preference(&viewer.looking_for, &candidate.gender) {
        points += PREFERENCE_MATCH_POINTS;
    }
    if matches_preference(&candidate.looking_for, &viewer.gender) {
        points += PREFERENCE_MATCH_POINTS;
    }
    points
}

// Blank gender never matches, not even a blank preference.
fn matches_preference(looking_for: &str, gender: &str) -> bool {
    let looking_for = looking_for.trim().to_lowercase();
    let gender = gender.trim().to_lowercase();
    looking_for == ANY_PREFERENCE || (!gender.is_empty() && looking_for == gender)
}
