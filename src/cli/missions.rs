//! Mission commands

use anyhow::Result;

use lexiquest::engine::missions::MissionType;

use super::{print_json, GlobalOptions};

/// Report a mission total, or list the user's progress when no type is given
pub fn progress_command(
    options: &GlobalOptions,
    user: &str,
    mission_type: Option<&str>,
    value: Option<u64>,
) -> Result<()> {
    let engine = options.open_engine()?;

    if let (Some(mission_type), Some(value)) = (mission_type, value) {
        let mission_type = MissionType::parse(mission_type)?;
        let completed = engine.update_mission_progress(user, mission_type, value)?;
        for completion in &completed {
            println!(
                "Mission completed: {} (+{} points)",
                completion.mission.name, completion.mission.reward_points
            );
        }
    }

    let progress = engine.user_mission_progress(user)?;
    if progress.is_empty() {
        println!("No mission progress.");
        return Ok(());
    }
    print_json(&progress)
}

pub fn generate_command(options: &GlobalOptions) -> Result<()> {
    let engine = options.open_engine()?;
    let created = engine.generate_missions()?;
    println!("Generated {} missions", created.len());
    for mission in &created {
        println!(
            "  {} [{}] target {}",
            mission.id,
            mission.mission_type.as_str(),
            mission.target_value
        );
    }
    Ok(())
}
