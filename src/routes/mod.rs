pub mod cycle;
pub mod cycle_stats;
pub mod safety;

use serde::Deserialize;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub user_id: Option<String>,
}
