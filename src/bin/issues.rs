//! Closed issues with target-contributor involvement, per repository and timeframe.

use contributor_census::pipeline;
use contributor_census::types::ItemKind;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    contributor_census::init_tracing("contributor_census=info,issues=info");
    pipeline::run_contribution_script(ItemKind::Issue).await
}
