use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tracing::warn;

use nsusbloader_settings::settings::{
    EditOutcome, GlVersion, Notification, NotificationLevel, TextField, Toggle,
};
use nsusbloader_settings::store::MemoryPreferenceStore;
use nsusbloader_settings::utils::paths::preferences_path;
use nsusbloader_settings::{Collaborators, PreferenceStore, SettingsController, TomlPreferenceStore};

const APP_NAME: &str = "NS-USBloader settings";
const UPDATE_WAIT: Duration = Duration::from_secs(40);

const HELP: &str = "\
nsusbloader-settings

USAGE:
  nsusbloader-settings [COMMAND]

COMMANDS:
  show                                      Print current settings (default)
  set <ip|port|extra> <text>                Edit a host field
  toggle <dont-serve|auto-ip|random-port|expert> <on|off>
  language <code>                           Select and apply a UI language
  gl-version <v0.5|v0.7.x|v0.8>             Goldleaf protocol version
  check-updates [--open]                    Ask GitHub for a newer release,
                                            optionally open its release page
  install-drivers                           Start the USB drivers installer (Windows)

Preferences are stored in NSUSBLOADER_CONFIG_DIR or the OS config directory.
";

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    // RUST_LOG overrides the default filter
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[derive(Debug)]
enum Command {
    Show,
    Set(TextField, String),
    Toggle(Toggle, bool),
    Language(String),
    GlVersion(GlVersion),
    CheckUpdates { open: bool },
    InstallDrivers,
}

fn parse_switch(s: &str) -> Result<bool> {
    match s {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        other => Err(anyhow!("expected on/off, got {:?}", other)),
    }
}

fn parse_command(mut args: pico_args::Arguments) -> Result<Command> {
    let cmd = match args.subcommand()?.as_deref() {
        None | Some("show") => Command::Show,
        Some("set") => {
            let field = match args.free_from_str::<String>()?.as_str() {
                "ip" => TextField::HostIp,
                "port" => TextField::HostPort,
                "extra" => TextField::HostExtra,
                other => bail!("unknown field {:?}", other),
            };
            // Missing text means "clear the field"
            let text = args.opt_free_from_str::<String>()?.unwrap_or_default();
            Command::Set(field, text)
        }
        Some("toggle") => {
            let toggle = match args.free_from_str::<String>()?.as_str() {
                "dont-serve" => Toggle::DontServe,
                "auto-ip" => Toggle::AutoDetectIp,
                "random-port" => Toggle::RandomPort,
                "expert" => Toggle::ExpertMode,
                other => bail!("unknown toggle {:?}", other),
            };
            let value = parse_switch(&args.free_from_str::<String>()?)?;
            Command::Toggle(toggle, value)
        }
        Some("language") => Command::Language(args.free_from_str()?),
        Some("gl-version") => {
            let raw: String = args.free_from_str()?;
            Command::GlVersion(raw.parse()?)
        }
        Some("check-updates") => Command::CheckUpdates {
            open: args.contains("--open"),
        },
        Some("install-drivers") => Command::InstallDrivers,
        Some(other) => bail!("unknown command {:?}\n\n{}", other, HELP),
    };
    let rest = args.finish();
    if !rest.is_empty() {
        warn!("ignoring extra arguments: {:?}", rest);
    }
    Ok(cmd)
}

fn print_notifications<S: PreferenceStore>(ctl: &mut SettingsController<S>) {
    for Notification { level, title, body } in ctl.take_notifications() {
        let tag = match level {
            NotificationLevel::Info => "info",
            NotificationLevel::Error => "error",
        };
        if title.is_empty() {
            println!("[{}] {}", tag, body);
        } else {
            println!("[{}] {}\n{}", tag, title, body);
        }
    }
}

fn print_state<S: PreferenceStore>(ctl: &SettingsController<S>) {
    let s = ctl.state();
    let d = ctl.derived();
    let lock = |editable: bool| if editable { "" } else { " (locked)" };
    println!("nsp_filter_for_gl       = {}", s.nsp_filter_for_gl);
    println!("validate_host_name      = {}", s.validate_host_name);
    println!("expert_mode             = {}", s.expert_mode);
    println!("dont_serve              = {}", s.dont_serve);
    println!(
        "auto_detect_ip          = {}{}",
        s.auto_detect_ip,
        lock(d.auto_detect_toggle_editable)
    );
    println!(
        "random_port             = {}{}",
        s.random_port,
        lock(d.random_port_toggle_editable)
    );
    println!("host_ip                 = {:?}{}", s.host_ip, lock(d.ip_field_editable));
    println!("host_port               = {:?}{}", s.host_port, lock(d.port_field_editable));
    println!("host_extra              = {:?}{}", s.host_extra, lock(d.extra_field_editable));
    println!("auto_check_updates      = {}", s.auto_check_updates);
    println!("tf_xci_nsz_xcz_support  = {}", s.tf_xci_nsz_xcz_support);
    println!("gl_version              = {}", s.gl_version);
    println!(
        "language                = {} (installed: {})",
        s.language,
        ctl.catalog().codes().collect::<Vec<_>>().join(", ")
    );
}

fn wait_for_update<S: PreferenceStore>(ctl: &mut SettingsController<S>) {
    ctl.check_for_updates();
    if ctl.wait_for_update(UPDATE_WAIT).is_none() {
        warn!("update check did not finish in {:?}", UPDATE_WAIT);
    }
    if let Some(link) = ctl.version_link() {
        println!("{}", link);
    }
}

fn run<S: PreferenceStore>(store: S, cmd: &Command) -> Result<S> {
    let mut ctl = SettingsController::open(store, Collaborators::for_runtime());

    match cmd {
        Command::Show => {
            print_state(&ctl);
            if ctl.state().auto_check_updates {
                wait_for_update(&mut ctl);
            }
        }
        Command::Set(field, text) => match ctl.edit_text(*field, text) {
            EditOutcome::Applied => println!("{:?} = {:?}", field, text),
            EditOutcome::Rejected(why) => println!("{:?} unchanged: {}", field, why),
        },
        Command::Toggle(toggle, value) => {
            if let Some(focus) = ctl.toggle(*toggle, *value) {
                println!("edit {:?} next", focus);
            }
            print_state(&ctl);
        }
        Command::Language(code) => {
            if !ctl.select_language(code) {
                bail!(
                    "language {:?} is not installed (installed: {})",
                    code,
                    ctl.catalog().codes().collect::<Vec<_>>().join(", ")
                );
            }
            ctl.apply_language().context("save language")?;
        }
        Command::GlVersion(v) => ctl.set_gl_version(*v),
        Command::CheckUpdates { open } => {
            wait_for_update(&mut ctl);
            if *open {
                ctl.open_version_link();
            }
        }
        Command::InstallDrivers => {
            if let Err(e) = ctl.install_drivers() {
                println!("{}", e);
            }
        }
    }
    print_notifications(&mut ctl);

    Ok(ctl.commit()?)
}

fn main() -> Result<()> {
    init_logging();
    tracing::info!("{} version {}", APP_NAME, env!("CARGO_PKG_VERSION"));

    let mut args = pico_args::Arguments::from_env();
    if args.contains(["-h", "--help"]) {
        print!("{}", HELP);
        return Ok(());
    }
    let cmd = parse_command(args)?;

    let path = preferences_path();
    match TomlPreferenceStore::open(&path) {
        Ok(store) => {
            let store = run(store, &cmd)?;
            store.close().context("close preferences")?;
        }
        Err(e) => {
            // Keep the session usable; edits just won't survive it
            warn!("{}; changes will not be saved", e);
            run(MemoryPreferenceStore::new(), &cmd)?;
        }
    }
    Ok(())
}
