use super::{core_error, json_pretty, parse_roles, spin_fail, spin_ok, Context, EXIT_SUCCESS};
use lectern_core::{declared_image, ExportOutcome, ImageManager};
use lectern_profile::ServiceRole;

pub fn run(ctx: &Context, roles: &[ServiceRole]) -> Result<u8, String> {
    let session = ctx.session();
    let dir = session.export_dir();
    let manager = ImageManager::new(ctx.engine());
    let mut results = Vec::new();

    for role in parse_roles(roles, &ServiceRole::ALL) {
        let image = declared_image(&session, role).map_err(|e| core_error(&e))?;
        let pb = ctx.spinner(&format!("exporting {image}..."));
        let outcome = match manager.export(&image, role, &dir) {
            Ok(o) => o,
            Err(e) => {
                if let Some(ref pb) = pb {
                    spin_fail(pb, &format!("{image}: export failed"));
                }
                return Err(core_error(&e));
            }
        };
        if let Some(ref pb) = pb {
            match &outcome {
                ExportOutcome::Exported(path) => {
                    spin_ok(pb, &format!("{image} -> {}", path.display()));
                }
                ExportOutcome::NotPresent => spin_ok(pb, &format!("{image} not present, skipped")),
            }
        }
        results.push(serde_json::json!({
            "role": role,
            "image": image.to_string(),
            "outcome": outcome,
        }));
    }

    if ctx.json {
        println!("{}", json_pretty(&results)?);
    }
    Ok(EXIT_SUCCESS)
}
