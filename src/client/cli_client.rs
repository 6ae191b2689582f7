use crate::client::config::PollerConfig;
use crate::client::models::events::PollEvent;
use crate::client::models::filters::{parse_date, parse_list};
use crate::client::services::poller::Poller;
use crate::client::services::transport::HttpTransport;
use crate::client::surface::{write_row, Surface};
use chrono::NaiveDate;
use clap::Parser;
use log::debug;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{stdin, AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;

#[derive(Debug, Parser)]
#[command(name = "ajax-poller", about = "Polls an ajax backend and renders what it returns")]
pub struct CliArgs {
    /// Backend root, the poller requests `<base-url>/ajax/<action>`
    #[arg(long)]
    pub base_url: Option<String>,
    /// Action to start polling right away (e.g. stats, primes, ping)
    #[arg(long)]
    pub action: Option<String>,
    /// Comma separated symbol list
    #[arg(long)]
    pub symbols: Option<String>,
    /// Comma separated statistic selectors
    #[arg(long)]
    pub stats: Option<String>,
    #[arg(long, value_parser = parse_date)]
    pub start: Option<NaiveDate>,
    #[arg(long, value_parser = parse_date)]
    pub end: Option<NaiveDate>,
    #[arg(long)]
    pub interval_ms: Option<u64>,
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

impl CliArgs {
    /// Command line flags win over the environment.
    pub fn apply(&self, mut config: PollerConfig) -> PollerConfig {
        if let Some(url) = &self.base_url {
            config.base_url = url.clone();
        }
        if let Some(symbols) = &self.symbols {
            config.filters.symbols = parse_list(symbols);
        }
        if let Some(stats) = &self.stats {
            config.filters.stats = parse_list(stats);
        }
        if self.start.is_some() {
            config.filters.start = self.start;
        }
        if self.end.is_some() {
            config.filters.end = self.end;
        }
        if let Some(ms) = self.interval_ms {
            config.interval = Duration::from_millis(ms);
        }
        if let Some(ms) = self.timeout_ms {
            config.request_timeout = Duration::from_millis(ms);
        }
        config
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start(Option<String>),
    Stop,
    Restart(Option<String>),
    Poll(Option<String>),
    Symbols(Vec<String>),
    Stats(Vec<String>),
    Range { start: Option<NaiveDate>, end: Option<NaiveDate> },
    Rows,
    Clear,
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
Commands:
  start [action]        start polling (defaults to the last action)
  stop                  stop after the request in flight
  restart [action]      stop, then start again
  poll [action]         run a single cycle
  symbols A,B,C         set the symbol filter (empty clears it)
  stats x,y             set the statistics filter
  range [start] [end]   set the date range (MM/DD/YYYY, '-' clears)
  rows                  print the results table
  clear                 clear message and results
  status                show poller state
  help | quit";

pub fn parse_command(line: &str) -> Result<Command, String> {
    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or("").to_ascii_lowercase();
    let args: Vec<&str> = parts.collect();
    let first = args.first().map(|s| s.to_string());

    match command.as_str() {
        "start" => Ok(Command::Start(first)),
        "stop" => Ok(Command::Stop),
        "restart" => Ok(Command::Restart(first)),
        "poll" => Ok(Command::Poll(first)),
        "symbols" => Ok(Command::Symbols(parse_list(&args.join(" ")))),
        "stats" => Ok(Command::Stats(parse_list(&args.join(" ")))),
        "range" => {
            let date_arg = |idx: usize| -> Result<Option<NaiveDate>, String> {
                match args.get(idx) {
                    None | Some(&"-") => Ok(None),
                    Some(raw) => parse_date(raw).map(Some),
                }
            };
            Ok(Command::Range { start: date_arg(0)?, end: date_arg(1)? })
        }
        "rows" => Ok(Command::Rows),
        "clear" => Ok(Command::Clear),
        "status" => Ok(Command::Status),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        "" => Err("empty command".to_string()),
        other => Err(format!("unknown command '{}', type 'help'", other)),
    }
}

pub async fn run(args: CliArgs) -> anyhow::Result<()> {
    let config = args.apply(PollerConfig::from_env());
    let transport = Arc::new(HttpTransport::new(&config.base_url, config.request_timeout)?);
    let poller = Poller::new(&config, transport);
    poller.set_filters(config.filters.clone()).await;

    let count_label = config.count_fields.first().cloned().unwrap_or_default();
    let surface = Arc::new(Mutex::new(Surface::new(count_label)));
    let mut events = poller
        .take_receiver()
        .ok_or_else(|| anyhow::anyhow!("poll event receiver already taken"))?;

    // Task che applica gli eventi alla superficie e li stampa
    let render_surface = surface.clone();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let mut surface = render_surface.lock().await;
            surface.apply(&event);
            let mut out = std::io::stdout().lock();
            if let Err(e) = print_event(&mut out, &surface, &event) {
                log::error!("[CLIENT] Failed to render event: {}", e);
            }
        }
    });

    println!("[CLIENT] Backend: {} (type 'help' for commands)", config.base_url);
    let mut last_action = args.action.clone();
    if let Some(action) = &last_action {
        poller.start(action).await?;
    }

    let mut input = BufReader::new(stdin());
    let mut line = String::new();
    loop {
        line.clear();
        let n = input.read_line(&mut line).await?;
        if n == 0 {
            break;
        }
        let cmd = line.trim();
        if cmd.is_empty() {
            continue;
        }
        let command = match parse_command(cmd) {
            Ok(c) => c,
            Err(e) => {
                println!("[CLIENT] {}", e);
                continue;
            }
        };
        match command {
            Command::Start(action) | Command::Restart(action) | Command::Poll(action)
                if action.is_none() && last_action.is_none() =>
            {
                println!("[CLIENT] No action yet, e.g. 'start stats'");
            }
            Command::Start(action) => {
                let action = action.or_else(|| last_action.clone()).unwrap_or_default();
                match poller.start(&action).await {
                    Ok(()) => last_action = Some(action),
                    Err(e) => println!("[CLIENT] {}", e),
                }
            }
            Command::Restart(action) => {
                let action = action.or_else(|| last_action.clone()).unwrap_or_default();
                match poller.restart(&action).await {
                    Ok(()) => last_action = Some(action),
                    Err(e) => println!("[CLIENT] {}", e),
                }
            }
            Command::Poll(action) => {
                let action = action.or_else(|| last_action.clone()).unwrap_or_default();
                if !poller.poll(&action).await {
                    println!("[CLIENT] Poll skipped: stopped or a request is in flight");
                }
            }
            Command::Stop => poller.stop().await,
            Command::Symbols(symbols) => {
                let mut filters = poller.filters().await;
                filters.symbols = symbols;
                poller.set_filters(filters).await;
            }
            Command::Stats(stats) => {
                let mut filters = poller.filters().await;
                filters.stats = stats;
                poller.set_filters(filters).await;
            }
            Command::Range { start, end } => {
                let mut filters = poller.filters().await;
                filters.start = start;
                filters.end = end;
                poller.set_filters(filters).await;
            }
            Command::Rows => {
                let surface = surface.lock().await;
                surface.write_table(&mut std::io::stdout().lock())?;
            }
            Command::Clear => surface.lock().await.clear(),
            Command::Status => {
                let state = poller.state().await;
                println!(
                    "[CLIENT] running={} action={} interval={:?} pending={} filters={:?}",
                    state.running,
                    state.action.as_deref().unwrap_or("-"),
                    state.interval,
                    state.pending_request,
                    poller.filters().await.query_pairs()
                );
            }
            Command::Help => println!("{}", HELP),
            Command::Quit => break,
        }
    }

    poller.stop().await;
    Ok(())
}

fn print_event<W: Write>(out: &mut W, surface: &Surface, event: &PollEvent) -> std::io::Result<()> {
    match event {
        PollEvent::Message(_) => surface.write_message(out)?,
        PollEvent::Rows(rows) => {
            for row in rows {
                write_row(out, row)?;
            }
        }
        PollEvent::ControlChanged { running: true, action } => {
            writeln!(out, "[CLIENT] Polling '{}'", action.as_deref().unwrap_or("?"))?
        }
        PollEvent::ControlChanged { running: false, .. } => writeln!(out, "[CLIENT] Polling stopped")?,
        PollEvent::CycleFinished { action, rescheduled } => {
            debug!("[CLIENT] Cycle for '{}' done, rescheduled={}", action, rescheduled)
        }
    }
    out.flush()
}
