use super::{colorize_state, core_error, json_pretty, Context, EXIT_SUCCESS};
use lectern_core::{declared_service, ImageManager};
use lectern_profile::{ContainerFamily, ImageRef, ServiceRole};
use lectern_runtime::{ContainerRecord, ContainerState};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct RoleStatus {
    role: ServiceRole,
    image: String,
    image_present: bool,
    containers: Vec<ContainerRecord>,
    url: String,
}

fn port_for(ctx: &Context, role: ServiceRole) -> u16 {
    let ports = &ctx.config.ports;
    match role {
        ServiceRole::Frontend => ports.web,
        ServiceRole::Backend => ports.api,
        ServiceRole::Tts => ports.tts,
        ServiceRole::Ocr => ports.ocr,
    }
}

pub fn run(ctx: &Context) -> Result<u8, String> {
    let engine = ctx.engine();
    let manager = ImageManager::new(engine);
    let all = engine.containers().map_err(|e| e.to_string())?;

    let session = ctx.session();
    let mut roles = Vec::new();
    for role in ServiceRole::ALL {
        let declared = declared_service(&session, role).map_err(|e| core_error(&e))?;
        let image = declared
            .as_ref()
            .map_or_else(|| ImageRef::default_for(role), |s| s.image.clone());
        let image_present = manager.exists(&image).map_err(|e| e.to_string())?;
        let mut names: Vec<String> = ContainerFamily::ALL
            .iter()
            .map(|f| f.container_name(role).into_inner())
            .collect();
        if let Some(spec) = &declared {
            if !names.iter().any(|n| spec.container == n.as_str()) {
                names.push(spec.container.as_str().to_owned());
            }
        }
        let containers = all
            .iter()
            .filter(|c| names.contains(&c.name))
            .cloned()
            .collect();
        roles.push(RoleStatus {
            role,
            image: image.to_string(),
            image_present,
            containers,
            url: format!("http://localhost:{}", port_for(ctx, role)),
        });
    }

    if ctx.json {
        let payload = serde_json::json!({
            "root": ctx.root,
            "engine": engine.name(),
            "host": ctx.host,
            "roles": roles,
        });
        println!("{}", json_pretty(&payload)?);
        return Ok(EXIT_SUCCESS);
    }

    println!(
        "engine: {}   platform: {}{}",
        engine.name(),
        ctx.host.platform,
        if ctx.host.nas { " (NAS)" } else { "" }
    );
    for r in &roles {
        let image = if r.image_present { "present" } else { "missing" };
        println!("\n{} ({} {image})", r.role, r.image);
        if r.containers.is_empty() {
            println!("  no container");
        }
        for c in &r.containers {
            println!("  {:<24} {}", c.name, colorize_state(&c.state.to_string()));
            if c.state == ContainerState::Running {
                println!("  {}", r.url);
            }
        }
    }
    Ok(EXIT_SUCCESS)
}
