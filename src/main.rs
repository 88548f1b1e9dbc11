mod cli;

use std::{io, process};

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::{generate, shells::Bash};
use env_logger::TimestampPrecision;
use lazy_static::lazy_static;
use log::error;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

use delta_rpi::engine::{CancelToken, Engine};
use delta_rpi::port;
use delta_rpi::sink::{ConsoleSink, GenerationFilter, JsonSink, Sink};

use cli::Cli;

lazy_static! {
    static ref STOP: CancelToken = CancelToken::new();
}

extern "C" fn on_signal(_: nix::libc::c_int) {
    STOP.cancel();
}

/// SIGINT and SIGTERM end the loop after the current cycle. No SA_RESTART,
/// so a blocked read returns early.
fn install_signal_handlers() -> Result<()> {
    lazy_static::initialize(&STOP);

    let action = SigAction::new(
        SigHandler::Handler(on_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );
    for sig in [Signal::SIGINT, Signal::SIGTERM] {
        unsafe { signal::sigaction(sig, &action) }?;
    }
    Ok(())
}

fn make_sink(cli: &Cli) -> Box<dyn Sink> {
    let sink: Box<dyn Sink> = if cli.json {
        Box::new(JsonSink::new(io::stdout()))
    } else {
        Box::new(ConsoleSink::new(io::stdout()))
    };

    if cli.skip_idle {
        Box::new(GenerationFilter::new(sink))
    } else {
        sink
    }
}

fn do_main() -> Result<()> {
    if std::env::var("GENERATE_COMPLETION").is_ok() {
        generate(Bash, &mut Cli::command(), "delta-rpi", &mut io::stdout());
        return Ok(());
    }

    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(if cli.debug {
        "debug"
    } else {
        "info"
    }))
    .format_timestamp(Some(TimestampPrecision::Millis))
    .format_target(false)
    .init();

    install_signal_handlers()?;

    let port = match port::open_port(&cli.device, cli.baudrate, cli.timeout, cli.force) {
        Ok(port) => port,
        Err(e) => {
            error!("Can't open port '{}': {:#}", cli.device, e);
            process::exit(1);
        }
    };

    let mut engine = Engine::new(port, make_sink(&cli), cli.engine_config(), STOP.clone())?;
    engine.run()
}

fn main() {
    if let Err(e) = do_main() {
        error!("{:#}", e);
        process::exit(1);
    }
}
