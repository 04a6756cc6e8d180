use super::{colorize_state, finish, json_pretty, Context, EXIT_SUCCESS};
use console::Style;
use lectern_core::{InstallReport, Installer, ProvisionOutcome};

fn print_summary(report: &InstallReport) {
    println!();
    println!(
        "{} installed with profile {}",
        Style::new().green().bold().apply_to("Lectern"),
        report.profile.display_name()
    );
    for c in &report.containers {
        println!("  {:<24} {}", c.name, colorize_state(&c.state.to_string()));
    }
    for url in &report.urls {
        println!("  {url}");
    }
    if let ProvisionOutcome::Failed { retry, .. } = &report.admin {
        println!("  create the admin later with: {retry}");
    }
    if !report.warnings.is_empty() {
        println!(
            "\n{} warning(s) during install; see the lines marked !",
            report.warnings.len()
        );
    }
}

pub fn run(ctx: &Context) -> Result<u8, String> {
    let _lock = ctx.lock()?;
    let session = ctx.session();
    finish(Installer::new(&session).run().map(|report| {
        if ctx.json {
            match json_pretty(&report) {
                Ok(s) => println!("{s}"),
                Err(e) => eprintln!("error: {e}"),
            }
        } else {
            print_summary(&report);
        }
        EXIT_SUCCESS
    }))
}
