use super::{core_error, json_pretty, parse_roles, spin_fail, spin_ok, Context, EXIT_SUCCESS};
use lectern_core::{declared_image, DeleteReport, ImageManager, RemovalOutcome};
use lectern_profile::ServiceRole;

fn describe(outcome: &RemovalOutcome) -> String {
    match outcome {
        RemovalOutcome::NotFound => "not found".to_owned(),
        RemovalOutcome::Removed => "removed".to_owned(),
        RemovalOutcome::ForceRemoved => "force-removed".to_owned(),
        RemovalOutcome::Failed(causes) => format!("failed ({})", causes.join("; ")),
    }
}

fn print_report(report: &DeleteReport) {
    for (name, outcome) in &report.containers {
        if *outcome != RemovalOutcome::NotFound {
            println!("    container {name}: {}", describe(outcome));
        }
    }
    if let RemovalOutcome::Failed(causes) = &report.image_outcome {
        println!("    image could not be removed. Likely causes:");
        for cause in causes {
            println!("      - {cause}");
        }
    }
}

pub fn run(ctx: &Context, roles: &[ServiceRole]) -> Result<u8, String> {
    let roles = parse_roles(roles, &ServiceRole::CORE);
    let names = roles
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    if !ctx.confirm(
        &format!("Delete the {names} image(s) and their containers?"),
        true,
    ) {
        eprintln!("! delete cancelled");
        return Ok(EXIT_SUCCESS);
    }

    let _lock = ctx.lock()?;
    let session = ctx.session();
    let manager = ImageManager::new(ctx.engine());
    let mut reports = Vec::new();
    for role in roles {
        let image = declared_image(&session, role).map_err(|e| core_error(&e))?;
        let pb = ctx.spinner(&format!("deleting {image}..."));
        let report = match manager.delete(&image, role) {
            Ok(r) => r,
            Err(e) => {
                if let Some(ref pb) = pb {
                    spin_fail(pb, &format!("{image}: delete failed"));
                }
                return Err(core_error(&e));
            }
        };
        if let Some(ref pb) = pb {
            let line = format!("{image}: {}", describe(&report.image_outcome));
            if report.image_outcome.is_failure() {
                spin_fail(pb, &line);
            } else {
                spin_ok(pb, &line);
            }
            print_report(&report);
        }
        reports.push(report);
    }

    if ctx.json {
        println!("{}", json_pretty(&reports)?);
    }
    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_lists_causes() {
        let failed = RemovalOutcome::Failed(vec!["in use".to_owned(), "extra tags".to_owned()]);
        assert_eq!(describe(&failed), "failed (in use; extra tags)");
        assert_eq!(describe(&RemovalOutcome::ForceRemoved), "force-removed");
    }
}
