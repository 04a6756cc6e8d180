use super::{core_error, json_pretty, Context, EXIT_FAILURE, EXIT_SUCCESS};
use lectern_core::provision::{bootstrap_admin, ensure_runtime_dependency};
use lectern_core::{resolve, ProvisionOutcome};
use lectern_profile::ServiceRole;
use lectern_runtime::ContainerState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Task {
    /// Install the runtime dependency (calibre) in the backend container.
    Deps,
    /// Create the initial admin account.
    Admin,
}

pub fn run(ctx: &Context, task: Task) -> Result<u8, String> {
    let session = ctx.session();
    let command = ctx
        .engine()
        .compose_command()
        .ok_or_else(|| "compose tooling is not available".to_owned())?;
    let deployment = resolve(&session, &command).map_err(|e| core_error(&e))?;
    let container = deployment
        .profile
        .service(ServiceRole::Backend)
        .map(|s| s.container.as_str().to_owned())
        .ok_or_else(|| "the resolved profile has no backend service".to_owned())?;

    let state = ctx
        .engine()
        .container_state(&container)
        .map_err(|e| e.to_string())?;
    if state != ContainerState::Running {
        return Err(format!(
            "container {container} is {state}; run `lectern install` first"
        ));
    }

    let outcome = match task {
        Task::Deps => ensure_runtime_dependency(&session, &container),
        Task::Admin => bootstrap_admin(&session, &container),
    }
    .map_err(|e| core_error(&e))?;

    if ctx.json {
        println!("{}", json_pretty(&outcome)?);
    } else {
        match &outcome {
            ProvisionOutcome::AlreadyPresent => println!("already installed in {container}"),
            ProvisionOutcome::Completed => println!("done"),
            ProvisionOutcome::Skipped => println!("skipped"),
            ProvisionOutcome::Failed { reason, retry } => {
                eprintln!("failed: {reason}");
                eprintln!("retry manually: {retry}");
            }
        }
    }
    Ok(if outcome.is_failure() {
        EXIT_FAILURE
    } else {
        EXIT_SUCCESS
    })
}
