//! Reward commands

use anyhow::Result;

use super::{print_json, GlobalOptions};

pub fn award_command(options: &GlobalOptions, user: &str, reward_id: &str) -> Result<()> {
    let engine = options.open_engine()?;
    let grant = engine.award_reward(user, reward_id)?;
    if !grant.newly_awarded {
        println!("{} already holds {}", user, reward_id);
    }
    print_json(&grant)
}

pub fn consume_command(options: &GlobalOptions, user: &str, reward_id: &str) -> Result<()> {
    let engine = options.open_engine()?;
    let reward = engine.consume_reward(user, reward_id)?;
    print_json(&reward)
}

/// One reward's effective status, or every reward the user holds
pub fn status_command(options: &GlobalOptions, user: &str, reward_id: Option<&str>) -> Result<()> {
    let engine = options.open_engine()?;
    match reward_id {
        Some(reward_id) => {
            let status = engine.check_reward_expiry(user, reward_id)?;
            println!("{}", status.as_str());
        }
        None => {
            let rewards = engine.list_user_rewards(user)?;
            if rewards.is_empty() {
                println!("No rewards found.");
                return Ok(());
            }
            for reward in &rewards {
                println!(
                    "  #{} {} [{}]",
                    reward.id,
                    reward.reward_id,
                    reward.status.as_str()
                );
            }
        }
    }
    Ok(())
}

pub fn sweep_command(options: &GlobalOptions) -> Result<()> {
    let engine = options.open_engine()?;
    let expired = engine.sweep_expired_rewards()?;
    println!("Expired {} rewards", expired);
    Ok(())
}
