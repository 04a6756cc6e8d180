use super::{core_error, json_pretty, spin_fail, spin_ok, Context, EXIT_SUCCESS};
use lectern_core::images::archives_in;
use lectern_core::ImageManager;
use std::path::PathBuf;

pub fn run(ctx: &Context, archives: &[PathBuf]) -> Result<u8, String> {
    let _lock = ctx.lock()?;
    let dir = ctx.session().export_dir();
    let archives = if archives.is_empty() {
        archives_in(&dir)
    } else {
        archives.to_vec()
    };
    if archives.is_empty() {
        return Err(format!("no image archives found in {}", dir.display()));
    }

    let manager = ImageManager::new(ctx.engine());
    let mut imported = Vec::new();
    for archive in &archives {
        let pb = ctx.spinner(&format!("importing {}...", archive.display()));
        if let Err(e) = manager.import(archive) {
            if let Some(ref pb) = pb {
                spin_fail(pb, &format!("{}: import failed", archive.display()));
            }
            return Err(core_error(&e));
        }
        if let Some(ref pb) = pb {
            spin_ok(pb, &format!("imported {}", archive.display()));
        }
        imported.push(archive.display().to_string());
    }

    if ctx.json {
        let payload = serde_json::json!({ "imported": imported });
        println!("{}", json_pretty(&payload)?);
    }
    Ok(EXIT_SUCCESS)
}
