//! Time-boxed missions: templates, generation and progress tracking

mod generator;
mod templates;
mod tracker;

pub use generator::MissionGenerator;
pub use templates::{
    Mission, MissionCompletion, MissionFrequency, MissionProgress, MissionTemplate, MissionType,
};
pub use tracker::{MissionTracker, UserMission};
