mod activity;
mod recommendation;

pub use activity::{
    Activity, ParticipationEntry, Preference, RecommendationRequest, INTEREST_LEVELS,
};
pub use recommendation::{Availability, Recommendation, RecommendationResponse, StatusResponse};
