use nimbus_core::Cancel;

use super::Context;

const NO_MASTER: &str = "No master node found, nothing to do.";

pub async fn start(ctx: &Context, cancel: Cancel) -> anyhow::Result<()> {
    match ctx.controller.engine_start(cancel).await? {
        Some(instructions) => println!("{instructions}"),
        None => println!("{NO_MASTER}"),
    }
    Ok(())
}

pub async fn stop(ctx: &Context, cancel: Cancel) -> anyhow::Result<()> {
    match ctx.controller.engine_stop(cancel).await? {
        Some(()) => println!("Engine stopped."),
        None => println!("{NO_MASTER}"),
    }
    Ok(())
}

pub async fn add_node(ctx: &Context, instance_id: &str, cancel: Cancel) -> anyhow::Result<()> {
    match ctx.controller.engine_add_node(instance_id, cancel).await? {
        Some(()) => println!("Added {instance_id} to the engine."),
        None => println!("{NO_MASTER}"),
    }
    Ok(())
}

pub async fn remove_node(ctx: &Context, instance_id: &str, cancel: Cancel) -> anyhow::Result<()> {
    match ctx.controller.engine_remove_node(instance_id, cancel).await? {
        Some(()) => println!("Removed {instance_id} from the engine."),
        None => println!("{NO_MASTER}"),
    }
    Ok(())
}
