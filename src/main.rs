/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Desktop shell mirroring one page element's text to stdout.
//!
//! ```bash
//! display-mirror
//! display-mirror --devtools https://kkutu.org/
//! display-mirror --selector '#status' --interval 500 https://example.com
//! ```
//!
//! Runs until the browser window is closed (or Enter is pressed on an
//! off-screen session), then tears down in order: poller, session, engine.

use std::io::BufRead;
use std::path::PathBuf;
use std::process;
use std::sync::mpsc::Receiver;

use bpaf::Bpaf;
use log::{error, warn};
use serde::{Deserialize, Serialize};
use url::Url;

use display_mirror::{
    DisplayMirror, EngineConfig, EngineContext, MirrorSettings, RenderMode, SessionOptions,
    WryEngineBackend,
};

const DEFAULT_START_URL: &str = "https://kkutu.org/";

// ---------------------------------------------------------------------------
// CLI parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Bpaf)]
#[bpaf(options, usage("display-mirror [OPTIONS] [URL]"))]
struct CliArgs {
    /// Window width in pixels
    #[bpaf(long, argument("PIXELS"), fallback(800u32))]
    width: u32,

    /// Window height in pixels
    #[bpaf(long, argument("PIXELS"), fallback(600u32))]
    height: u32,

    /// CSS selector of the element to mirror (overrides the config file)
    #[bpaf(long, argument("SELECTOR"))]
    selector: Option<String>,

    /// Poll interval in milliseconds (overrides the config file)
    #[bpaf(long, argument("MILLIS"))]
    interval: Option<u64>,

    /// Open a devtools view next to the browser
    #[bpaf(long, short)]
    devtools: bool,

    /// Run without a visible window; exit on Enter instead of window close
    #[bpaf(long)]
    osr: bool,

    /// Transparent browser background
    #[bpaf(long)]
    transparent: bool,

    /// Path to the JSON config file (written with defaults if missing)
    #[bpaf(long, argument("PATH"), fallback(PathBuf::from("display-mirror.json")))]
    config: PathBuf,

    /// URL to load
    #[bpaf(positional::<String>("URL"), parse(parse_url), fallback(default_url()))]
    url: Url,
}

fn parse_url(s: String) -> Result<Url, String> {
    Url::parse(&s).map_err(|e| format!("Invalid URL: {e}"))
}

fn default_url() -> Url {
    // Constant is a valid URL.
    Url::parse(DEFAULT_START_URL).unwrap()
}

// ---------------------------------------------------------------------------
// Config file
// ---------------------------------------------------------------------------

/// On-disk settings, created with defaults on first run so users have a
/// file to edit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct FileConfig {
    engine: EngineConfig,
    mirror: MirrorSettings,
}

fn load_or_create_config(path: &PathBuf) -> FileConfig {
    match std::fs::read_to_string(path) {
        Ok(text) => match serde_json::from_str(&text) {
            Ok(config) => config,
            Err(e) => {
                warn!("config file {} is invalid, using defaults: {e}", path.display());
                FileConfig::default()
            }
        },
        Err(_) => {
            let config = FileConfig::default();
            match serde_json::to_string_pretty(&config) {
                Ok(text) => {
                    if let Err(e) = std::fs::write(path, text) {
                        warn!("could not write default config to {}: {e}", path.display());
                    }
                }
                Err(e) => warn!("could not serialize default config: {e}"),
            }
            config
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    env_logger::init();
    let args = cli_args().run();

    let mut file_config = load_or_create_config(&args.config);
    if let Some(selector) = args.selector.clone() {
        file_config.mirror.selector = selector;
    }
    if let Some(interval) = args.interval {
        file_config.mirror.poll_interval_ms = interval;
    }
    if args.devtools {
        file_config.mirror.show_devtools = true;
    }
    file_config.engine.windowless_rendering = args.osr;

    let backend = WryEngineBackend::new();
    let close_signal = backend.take_close_signal();

    let engine = EngineContext::initialize(file_config.engine.clone(), Box::new(backend))
        .unwrap_or_else(|e| {
            eprintln!("Error: failed to initialize engine: {e}");
            process::exit(1);
        });

    let mut options = SessionOptions::new(args.url.clone());
    options.width = args.width;
    options.height = args.height;
    options.transparent = args.transparent;
    if args.osr {
        options.render_mode = RenderMode::OffScreen;
    }

    eprintln!("Loading {}...", args.url);

    let mirror = DisplayMirror::attach(&engine, options, &file_config.mirror, |text| {
        println!("Display text change: {text}");
    })
    .unwrap_or_else(|e| {
        eprintln!("Error: failed to start mirroring: {e}");
        if let Err(e) = engine.shutdown() {
            error!("engine shutdown after failed attach: {e}");
        }
        process::exit(1);
    });

    wait_for_exit(args.osr, close_signal);

    let failures = mirror.injection_failures();
    if failures > 0 {
        warn!("{failures} poll injections failed during this run");
    }

    // Poller, then session, then engine.
    mirror.detach();
    if let Err(e) = engine.shutdown() {
        eprintln!("Error: engine shutdown failed: {e}");
        process::exit(1);
    }
}

/// Block until the user is done: window close for windowed sessions,
/// Enter on stdin for off-screen ones.
fn wait_for_exit(osr: bool, close_signal: Option<Receiver<()>>) {
    if !osr {
        if let Some(signal) = close_signal {
            let _ = signal.recv();
            return;
        }
    }
    eprintln!("Press Enter to exit.");
    let mut line = String::new();
    let _ = std::io::stdin().lock().read_line(&mut line);
}
