mod actions;
mod button;
mod config;
mod daemon;
mod dispatch;
mod gpio;
mod registry;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;

use crate::dispatch::Dispatcher;
use crate::gpio::{InputSource, SysfsInput};

/// Binding file read when -c/--config is not given.
const DEFAULT_CONFIG: &str = "/etc/buttonsd.conf";

/// Set by the SIGINT/SIGTERM handler; the poll loop checks it every cycle.
static STOP: AtomicBool = AtomicBool::new(false);

extern "C" fn request_stop(_signum: libc::c_int) {
    // The one operation a signal handler is allowed here.
    STOP.store(true, Ordering::Relaxed);
}

struct Options {
    config: PathBuf,
    daemonize: bool,
    pidfile: Option<PathBuf>,
}

fn main() {
    let opts = parse_args();
    set_signals();

    if let Err(e) = run(&opts) {
        eprintln!("[buttonsd] {:#}", e);
        std::process::exit(1);
    }
}

fn run(opts: &Options) -> Result<()> {
    let buttons = config::load(&opts.config, |pin| {
        Ok(Box::new(SysfsInput::open(pin)?) as Box<dyn InputSource>)
    })?;
    println!(
        "[buttonsd] loaded {} button(s) from '{}'",
        buttons.len(),
        opts.config.display()
    );
    if buttons.is_empty() {
        println!("[buttonsd] nothing bound; waiting for a stop signal");
    }

    if opts.daemonize {
        daemon::daemonize(opts.pidfile.as_deref())?;
    }

    let mut dispatcher = Dispatcher::new(buttons)?;
    dispatcher.run(&STOP)?;
    println!("[buttonsd] stopping");
    Ok(())
}

fn parse_args() -> Options {
    let mut opts = Options {
        config: PathBuf::from(DEFAULT_CONFIG),
        daemonize: false,
        pidfile: None,
    };

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                println!("{}", USAGE_TEXT);
                std::process::exit(0);
            }
            "-v" | "--version" => {
                println!("buttonsd {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "-c" | "--config" => match args.next() {
                Some(path) => opts.config = PathBuf::from(path),
                None => usage_error("--config needs a path"),
            },
            "-d" | "--daemonize" => opts.daemonize = true,
            "-p" | "--pidfile" => match args.next() {
                Some(path) => opts.pidfile = Some(PathBuf::from(path)),
                None => usage_error("--pidfile needs a path"),
            },
            other => usage_error(&format!("unknown option '{}'", other)),
        }
    }
    opts
}

fn usage_error(msg: &str) -> ! {
    eprintln!("[buttonsd] {}", msg);
    eprintln!("{}", USAGE_TEXT);
    std::process::exit(1);
}

/// Ask to be told about SIGINT and SIGTERM. SA_RESTART stays off so a
/// blocked poll wakes with EINTR when the signal lands.
fn set_signals() {
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        let handler: extern "C" fn(libc::c_int) = request_stop;
        sa.sa_sigaction = handler as libc::sighandler_t;
        libc::sigemptyset(&mut sa.sa_mask);
        sa.sa_flags = 0;
        libc::sigaction(libc::SIGINT, &sa, std::ptr::null_mut());
        libc::sigaction(libc::SIGTERM, &sa, std::ptr::null_mut());
    }
}

static USAGE_TEXT: &str = r#"Usage: buttonsd [options]

Options:
    -h, --help                 Show this message and exit
    -v, --version              Show version information and exit
    -c PATH, --config PATH     Read button bindings from PATH
                               (default /etc/buttonsd.conf)
    -d, --daemonize            Detach and run in the background
    -p PATH, --pidfile PATH    Write the daemon pid to PATH"#;
