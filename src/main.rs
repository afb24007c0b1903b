// SPDX-License-Identifier: GPL-3.0-only

use anyhow::{anyhow, Context, Result};
use calloop::{channel::Event, EventLoop};
use clap_lex::{ArgCursor, RawArgs};
use rtpvideo_comp::{
    backend::{
        render::TestPattern,
        rtpvideo::{RtpVideoBackend, RtpVideoOutputApi, OUTPUT_NAME, RTPVIDEO_OUTPUT_API_NAME},
        Output, OutputEvent,
    },
    config::{parse_size, parse_ssrc, Config, Overrides},
    logger,
    transport::{RtpSession, VideoTransport},
    utils::{
        clock::MonotonicClock,
        geometry::{Rectangle, Size},
    },
};
use std::{cell::Cell, path::PathBuf, process, rc::Rc};
use tracing::{debug, error, info, warn};

struct State {
    backend: RtpVideoBackend<State>,
    frame: Rc<Cell<u64>>,
    size: Size,
    should_stop: bool,
}

impl State {
    fn frame_finished(&mut self, name: &str) {
        let frame = self.frame.get();
        let next = frame + 1;
        let damage = if frame == 0 {
            Rectangle::from_size(self.size)
        } else {
            TestPattern::block(frame, self.size).merge(&TestPattern::block(next, self.size))
        };
        self.frame.set(next);

        let Some(output) = self.backend.output_mut(name) else {
            warn!(output = name, "Frame finished for unknown output");
            return;
        };
        if let Err(err) = output.repaint(damage) {
            error!(?err, "Failed to repaint output");
            self.should_stop = true;
        }
    }
}

fn main() {
    if let Err(err) = main_inner() {
        error!("Error occured in main(): {:?}", err);
        if !tracing::dispatcher::has_been_set() {
            eprintln!("rtpvideo-comp: {err:#}");
        }
        process::exit(1);
    }
}

fn main_inner() -> Result<()> {
    let raw_args = RawArgs::from_args();
    let mut cursor = raw_args.cursor();
    let git_hash = option_env!("GIT_HASH").unwrap_or("unknown");

    let mut config_path = None;
    let mut overrides = Overrides::default();
    while let Some(arg) = raw_args.next_os(&mut cursor) {
        match arg.to_str() {
            Some("--help") | Some("-h") => {
                print_help(env!("CARGO_PKG_VERSION"), git_hash);
                return Ok(());
            }
            Some("--version") | Some("-V") => {
                println!(
                    "rtpvideo-comp {} (git commit {})",
                    env!("CARGO_PKG_VERSION"),
                    git_hash
                );
                return Ok(());
            }
            Some(flag @ "--config") => {
                config_path = Some(PathBuf::from(value(&raw_args, &mut cursor, flag)?));
            }
            Some(flag @ "--destination") => {
                overrides.destination = Some(value(&raw_args, &mut cursor, flag)?.to_string());
            }
            Some(flag @ "--port") => {
                let port = value(&raw_args, &mut cursor, flag)?;
                overrides.port = Some(
                    port.parse::<u16>()
                        .with_context(|| format!("Invalid port {port:?}"))?,
                );
            }
            Some(flag @ "--ssrc") => {
                overrides.ssrc = Some(parse_ssrc(value(&raw_args, &mut cursor, flag)?)?);
            }
            Some(flag @ "--colorspace") => {
                overrides.colorspace = Some(value(&raw_args, &mut cursor, flag)?.to_string());
            }
            Some(flag @ "--size") => {
                overrides.size = Some(parse_size(value(&raw_args, &mut cursor, flag)?)?);
            }
            _ => return Err(anyhow!("Unknown argument {:?}, see --help", arg)),
        }
    }

    // setup logger
    logger::init_logger()?;
    info!("rtpvideo-comp starting up!");

    let mut config = Config::load(config_path.as_deref())?;
    overrides.apply(&mut config.rtp);
    let size = Size::new(config.rtp.width, config.rtp.height);

    // init event loop
    let mut event_loop =
        EventLoop::<State>::try_new().with_context(|| "Failed to initialize event loop")?;

    // init backend
    let frame = Rc::new(Cell::new(0));
    let bind_address = config.rtp.bind_address.clone();
    let bind_port = config.rtp.bind_port;
    let (backend, events) = RtpVideoBackend::new(
        &config.rtp,
        event_loop.handle(),
        Box::new(TestPattern::new(frame.clone())),
        Rc::new(MonotonicClock),
        move |format| {
            let session = RtpSession::open(format, bind_address.as_deref().map(|a| (a, bind_port)))?;
            info!(ssrc = session.ssrc(), "Opened RTP session");
            Ok(Box::new(session) as Box<dyn VideoTransport>)
        },
    )
    .with_context(|| "Failed to initialize rtpvideo backend")?;

    event_loop
        .handle()
        .insert_source(events, |event, _, state| match event {
            Event::Msg(OutputEvent::FrameFinished {
                output, presented, ..
            }) => {
                debug!(output = %output, ?presented, "Frame finished");
                state.frame_finished(&output);
            }
            Event::Closed => state.should_stop = true,
        })
        .map_err(|err| err.error)
        .with_context(|| "Failed to init the output event source")?;

    let mut state = State {
        backend,
        frame,
        size,
        should_stop: false,
    };

    {
        let set_size = state
            .backend
            .apis()
            .get::<RtpVideoOutputApi>(RTPVIDEO_OUTPUT_API_NAME)
            .map(|api| api.output_set_size)
            .context("Output api is not registered")?;
        let output = state
            .backend
            .output_mut(OUTPUT_NAME)
            .context("Backend has no output")?;
        set_size(&mut *output, size)?;
        output.enable()?;
        output.start_repaint_loop();
    }

    // run the event loop
    let signal = event_loop.get_signal();
    event_loop.run(None, &mut state, |state| {
        // shall we shut down?
        if state.should_stop {
            info!("Shutting down");
            signal.stop();
            signal.wakeup();
        }
    })?;

    if let Some(output) = state.backend.output_mut(OUTPUT_NAME) {
        output.disable()?;
    }

    // drop eventloop & state before logger
    std::mem::drop(event_loop);
    std::mem::drop(state);

    Ok(())
}

fn value<'a>(raw_args: &'a RawArgs, cursor: &mut ArgCursor, flag: &str) -> Result<&'a str> {
    raw_args
        .next_os(cursor)
        .ok_or_else(|| anyhow!("{flag} requires a value"))?
        .to_str()
        .ok_or_else(|| anyhow!("Value of {flag} is not valid UTF-8"))
}

fn print_help(version: &str, git_rev: &str) {
    println!(
        r#"rtpvideo-comp {version} (git commit {git_rev})

Streams a virtual output as uncompressed RTP video (RFC 4175).

Options:
  -h, --help                Show this message
  -V, --version             Show the version of rtpvideo-comp
      --config <path>       Read the configuration from <path>
      --destination <addr>  Send the stream to <addr> (default 232.0.0.1)
      --port <n>            Destination port (default 49410)
      --ssrc <n>            Fixed RTP SSRC, decimal or 0x prefixed hex
      --colorspace <fmt>    One of RGB, ARGB, BGR, ABGR (default RGB)
      --size <WxH>          Output size in pixels (default 640x480)"#
    );
}
