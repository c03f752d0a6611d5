//! Idempotent engine shutdown shared by all generations.

use tracing::{info, warn};

use nimbus_core::pause;
use nimbus_remote::{ExecOptions, RemoteNode};

use crate::error::EngineResult;
use crate::plugin::EngineContext;

/// Commands and process patterns a generation stops with.
#[derive(Debug, Clone, Copy)]
pub struct StopPlan {
    /// Graceful stop, run on the master as the engine user.
    pub graceful: &'static str,
    /// `pkill -f` pattern for the controller (master only).
    pub controller_pattern: &'static str,
    /// `pkill -f` pattern for engines (every node).
    pub engine_pattern: &'static str,
}

/// Graceful stop, grace period, then forced kill by pattern.
///
/// Every step tolerates a non-zero exit ("no such process").
pub async fn stop_engine(
    plan: &StopPlan,
    ctx: &EngineContext,
    nodes: &[RemoteNode],
    master: &RemoteNode,
    user: &str,
) -> EngineResult<()> {
    info!(master = %master.id(), %user, "shutting down engine");
    let lenient = ExecOptions::default().source_profile().ignore_exit_status();
    let master_user = master.as_user(user);

    let graceful = master_user.execute_with(plan.graceful, lenient).await?;
    if !graceful.success() {
        warn!(status = graceful.status, "graceful engine stop reported failure");
    }

    let mut cancel = ctx.cancel.clone();
    pause(ctx.stop_grace, &mut cancel).await?;

    master_user
        .execute_with(&format!("pkill -f {}", plan.controller_pattern), lenient)
        .await?;
    for node in nodes {
        node.as_user(user)
            .execute_with(&format!("pkill -f {}", plan.engine_pattern), lenient)
            .await?;
    }

    info!("engine stopped");
    Ok(())
}
