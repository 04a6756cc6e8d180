use super::{finish, json_pretty, Context, EXIT_SUCCESS};
use lectern_core::{install_sidecar, ProvisionOutcome, SidecarModel};
use lectern_profile::ServiceRole;

pub fn run(ctx: &Context, role: ServiceRole, model: Option<&str>) -> Result<u8, String> {
    if !role.is_sidecar() {
        return Err(format!("{role} is not a sidecar (expected: tts, ocr)"));
    }
    let model = model.map(str::parse::<SidecarModel>).transpose()?;
    let _lock = ctx.lock()?;
    let session = ctx.session();
    let report = match install_sidecar(&session, role, model) {
        Ok(r) => r,
        Err(e) => return finish(Err(e)),
    };
    if ctx.json {
        println!("{}", json_pretty(&report)?);
    } else {
        println!("{} sidecar: {} ({})", role, report.container, report.url);
        match &report.model {
            Some((m, ProvisionOutcome::Completed)) => println!("model {m} downloaded"),
            Some((m, ProvisionOutcome::Failed { retry, .. })) => {
                println!("model {m} not downloaded; retry with: {retry}");
            }
            _ => {}
        }
    }
    Ok(EXIT_SUCCESS)
}
