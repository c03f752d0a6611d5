use std::io::Write;

use nimbus_cluster::StopOutcome;
use nimbus_core::Cancel;
use nimbus_provider::RawRecord;

use super::Context;

pub async fn start(ctx: &mut Context, cancel: Cancel) -> anyhow::Result<()> {
    let report = ctx.controller.start(cancel).await?;
    println!("{report}");
    Ok(())
}

pub async fn stop(ctx: &mut Context, workers_only: bool, cancel: Cancel) -> anyhow::Result<()> {
    let outcome = if workers_only {
        ctx.controller.stop_workers(cancel).await?
    } else {
        let answer = prompt("This will shut down all cluster instances. Are you sure (yes/no)? ")?;
        ctx.controller.stop_cluster(&answer, cancel).await?
    };

    match outcome {
        StopOutcome::Aborted => println!("Exiting without shutting down instances."),
        StopOutcome::Terminated { ids, before, after } => {
            println!("Instances before shutdown:");
            print_rows(&before);
            for id in &ids {
                println!("Shutting down instance: {id}");
            }
            println!("Instances after shutdown:");
            print_rows(&after);
        }
    }
    Ok(())
}

pub async fn list(ctx: &Context, format: &str) -> anyhow::Result<()> {
    let rows = ctx.controller.list().await?;
    match format {
        "json" => {
            let fields: Vec<&Vec<String>> = rows.iter().map(|r| &r.fields).collect();
            println!("{}", serde_json::to_string_pretty(&fields)?);
        }
        _ => {
            if rows.is_empty() {
                println!("No instances.");
            } else {
                print_rows(&rows);
            }
        }
    }
    Ok(())
}

pub async fn sshmaster(ctx: &Context, user: Option<&str>) -> anyhow::Result<()> {
    let Some(master) = ctx.controller.master_address().await? else {
        println!("No master node found.");
        return Ok(());
    };
    let user = user.unwrap_or(&ctx.controller.config().cluster.login_user);
    println!("Master node: {master}");

    let status = ctx.controller.connector().shell(&master, user).interactive().await?;
    if status != 0 {
        anyhow::bail!("ssh exited with status {status}");
    }
    Ok(())
}

fn print_rows(rows: &[RawRecord]) {
    for row in rows {
        println!("{row}");
    }
}

fn prompt(question: &str) -> anyhow::Result<String> {
    let mut stdout = std::io::stdout();
    write!(stdout, "{question}")?;
    stdout.flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(answer)
}
