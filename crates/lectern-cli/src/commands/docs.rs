use super::EXIT_SUCCESS;
use clap::CommandFactory;
use clap_complete::Shell;
use std::path::Path;

const BIN: &str = "lectern";

#[allow(clippy::unnecessary_wraps)]
pub fn completions<C: CommandFactory>(shell: Shell) -> Result<u8, String> {
    clap_complete::generate(shell, &mut C::command(), BIN, &mut std::io::stdout());
    Ok(EXIT_SUCCESS)
}

fn render_page(cmd: clap::Command, path: &Path) -> Result<(), String> {
    let mut buf = Vec::new();
    clap_mangen::Man::new(cmd)
        .render(&mut buf)
        .map_err(|e| format!("man page render failed: {e}"))?;
    std::fs::write(path, &buf).map_err(|e| format!("failed to write {}: {e}", path.display()))
}

/// One page for the binary and one per subcommand.
pub fn man_pages<C: CommandFactory>(dir: &Path) -> Result<u8, String> {
    std::fs::create_dir_all(dir)
        .map_err(|e| format!("failed to create {}: {e}", dir.display()))?;
    let cmd = C::command().name(BIN);
    render_page(cmd.clone(), &dir.join(format!("{BIN}.1")))?;
    for sub in cmd.get_subcommands() {
        let name = format!("{BIN}-{}", sub.get_name());
        render_page(sub.clone(), &dir.join(format!("{name}.1")))?;
    }
    println!("man pages written to {}", dir.display());
    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(clap::Parser)]
    #[command(name = "lectern")]
    struct Demo {
        #[command(subcommand)]
        _cmd: DemoCmd,
    }

    #[derive(clap::Subcommand)]
    enum DemoCmd {
        Install,
        Status,
    }

    #[test]
    fn writes_one_page_per_subcommand() {
        let dir = tempfile::tempdir().unwrap();
        man_pages::<Demo>(dir.path()).unwrap();
        for page in ["lectern.1", "lectern-install.1", "lectern-status.1"] {
            assert!(dir.path().join(page).is_file(), "{page} missing");
        }
    }
}
