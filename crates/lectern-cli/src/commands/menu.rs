use super::{delete, export, import, install, provision, sidecar, status, Context, EXIT_SUCCESS};
use console::Style;
use lectern_core::shutdown_requested;
use lectern_profile::ServiceRole;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuItem {
    Install,
    InstallTts,
    InstallOcr,
    Export,
    Import,
    Delete,
    RuntimeDependency,
    AdminBootstrap,
    Status,
    Quit,
}

impl MenuItem {
    const ALL: [MenuItem; 10] = [
        Self::Install,
        Self::InstallTts,
        Self::InstallOcr,
        Self::Export,
        Self::Import,
        Self::Delete,
        Self::RuntimeDependency,
        Self::AdminBootstrap,
        Self::Status,
        Self::Quit,
    ];

    fn label(self) -> &'static str {
        match self {
            Self::Install => "Install Lectern",
            Self::InstallTts => "Install TTS sidecar",
            Self::InstallOcr => "Install OCR sidecar",
            Self::Export => "Export images",
            Self::Import => "Import images",
            Self::Delete => "Delete images",
            Self::RuntimeDependency => "Install runtime dependency",
            Self::AdminBootstrap => "Bootstrap admin account",
            Self::Status => "Status",
            Self::Quit => "Quit",
        }
    }

    fn dispatch(self, ctx: &Context) -> Result<u8, String> {
        match self {
            Self::Install => install::run(ctx),
            Self::InstallTts => sidecar::run(ctx, ServiceRole::Tts, None),
            Self::InstallOcr => sidecar::run(ctx, ServiceRole::Ocr, None),
            Self::Export => export::run(ctx, &[]),
            Self::Import => import::run(ctx, &[]),
            Self::Delete => delete::run(ctx, &[]),
            Self::RuntimeDependency => provision::run(ctx, provision::Task::Deps),
            Self::AdminBootstrap => provision::run(ctx, provision::Task::Admin),
            Self::Status => status::run(ctx),
            Self::Quit => Ok(EXIT_SUCCESS),
        }
    }
}

/// Show the menu until Quit. A failed operation is reported with its hint
/// and the menu comes back; only an interrupt ends the session early.
fn drive(
    mut choose: impl FnMut() -> MenuItem,
    mut dispatch: impl FnMut(MenuItem) -> Result<u8, String>,
    interrupted: impl Fn() -> bool,
) -> Result<u8, String> {
    loop {
        let item = choose();
        if item == MenuItem::Quit {
            return Ok(EXIT_SUCCESS);
        }
        debug!("menu: {}", item.label());
        match dispatch(item) {
            Ok(code) => debug!("menu: {} finished with {code}", item.label()),
            Err(msg) if interrupted() => return Err(msg),
            Err(msg) => eprintln!("{} {msg}", Style::new().red().bold().apply_to("error:")),
        }
        println!();
    }
}

pub fn run(ctx: &Context) -> Result<u8, String> {
    if !ctx.interactive {
        return Err("no command given and no interactive terminal (see `lectern --help`)".to_owned());
    }
    let items: Vec<String> = MenuItem::ALL.iter().map(|i| i.label().to_owned()).collect();
    drive(
        || {
            let idx = ctx.select("What would you like to do?", &items, 0);
            MenuItem::ALL.get(idx).copied().unwrap_or(MenuItem::Quit)
        },
        |item| item.dispatch(ctx),
        shutdown_requested,
    )
}
