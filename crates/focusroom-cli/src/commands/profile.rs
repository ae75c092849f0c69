use std::sync::Arc;

use focusroom_core::store::XP_PER_LEVEL;
use focusroom_core::{Config, SystemClock};
use serde::Serialize;

use super::{open_store, CmdResult};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileView {
    xp: u64,
    level: u32,
    xp_to_next_level: u64,
}

pub async fn run() -> CmdResult {
    let config = Config::load()?;
    let store = open_store(&config, Arc::new(SystemClock))?;
    let profile = store.fetch_profile().await?;

    let view = ProfileView {
        xp: profile.xp,
        level: profile.level,
        xp_to_next_level: XP_PER_LEVEL - profile.xp % XP_PER_LEVEL,
    };
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}
