// Interactive controller: reads commands from stdin and drives the scheduler
use crate::hbt_destinations::DestinationTable;
use crate::hbt_engine::DisplaySink;
use crate::hbt_feed::FeedClient;
use crate::hbt_filter::FilterState;
use crate::hbt_models::{HBTError, Result};
use crate::hbt_scheduler::PollScheduler;
use crate::hbt_views::HBTViews;
use std::io::BufRead;
use tokio::sync::mpsc;

const MAX_SUGGESTIONS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Route(String),
    Default,
    Status,
    Routes,
    Refresh,
    Help,
    Quit,
    Empty,
    Invalid(String),
}

impl Command {
    pub fn parse(input: &str) -> Command {
        let input = input.trim();
        let mut parts = input.split_whitespace();
        let Some(verb) = parts.next() else {
            return Command::Empty;
        };
        let rest: Vec<&str> = parts.collect();

        match (verb.to_lowercase().as_str(), rest.as_slice()) {
            ("route" | "r", [route]) => Command::Route(route.to_string()),
            ("default" | "d", []) => Command::Default,
            ("status" | "s", []) => Command::Status,
            ("routes", []) => Command::Routes,
            ("refresh", []) => Command::Refresh,
            ("help" | "h" | "?", []) => Command::Help,
            ("quit" | "q" | "exit", []) => Command::Quit,
            _ => Command::Invalid(input.to_string()),
        }
    }
}

/// What handling one command did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    FilterApplied(FilterState),
    /// A searched route is known but has no vehicles in the feed.
    NotOperating(String),
    /// The route is not in the known list; the filter was left alone.
    RouteRejected(String),
    Failed(String),
    Quit,
}

pub struct HBTControllers;

impl HBTControllers {
    /// Read stdin lines on a plain thread. A blocked read there never holds
    /// up runtime shutdown.
    pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(16);
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        log::error!("Failed to read input: {}", e);
                        break;
                    }
                }
            }
        });
        rx
    }

    /// Command loop. Returns on `quit` or when the input closes.
    pub async fn run<C, S>(
        scheduler: &PollScheduler<C, S>,
        routes: &DestinationTable,
        default_filter: &FilterState,
        mut input: mpsc::Receiver<String>,
    ) where
        C: FeedClient + 'static,
        S: DisplaySink + 'static,
    {
        loop {
            HBTViews::prompt();
            let Some(line) = input.recv().await else {
                log::debug!("Input closed");
                return;
            };

            let command = Command::parse(&line);
            if Self::handle_command(scheduler, routes, default_filter, command).await
                == Outcome::Quit
            {
                return;
            }
        }
    }

    pub async fn handle_command<C, S>(
        scheduler: &PollScheduler<C, S>,
        routes: &DestinationTable,
        default_filter: &FilterState,
        command: Command,
    ) -> Outcome
    where
        C: FeedClient + 'static,
        S: DisplaySink + 'static,
    {
        match command {
            Command::Route(input) => match resolve_route(&input, routes) {
                Ok(route) => Self::apply_filter(scheduler, FilterState::SingleRoute(route)).await,
                Err(HBTError::UnknownRoute(route)) => {
                    HBTViews::unknown_route(&route, &suggest_routes(&route, routes));
                    Outcome::RouteRejected(route)
                }
                Err(e) => {
                    HBTViews::command_failed(&e.to_string());
                    Outcome::Failed(e.to_string())
                }
            },
            Command::Default => Self::apply_filter(scheduler, default_filter.clone()).await,
            Command::Status => {
                let filter = scheduler.filter().await;
                HBTViews::show_status(&filter, &scheduler.tracked().await);
                Outcome::Continue
            }
            Command::Routes => {
                HBTViews::show_routes(routes.routes());
                Outcome::Continue
            }
            Command::Refresh => match scheduler.refresh().await {
                Ok(Some(report)) if report.no_match => match scheduler.filter().await {
                    FilterState::SingleRoute(route) => {
                        HBTViews::route_not_operating(&route);
                        Outcome::NotOperating(route)
                    }
                    _ => Outcome::Continue,
                },
                Ok(_) => Outcome::Continue,
                Err(e) => {
                    HBTViews::command_failed(&e.to_string());
                    Outcome::Failed(e.to_string())
                }
            },
            Command::Help => {
                HBTViews::show_help();
                Outcome::Continue
            }
            Command::Quit => Outcome::Quit,
            Command::Empty => Outcome::Continue,
            Command::Invalid(input) => {
                HBTViews::invalid_command(&input);
                Outcome::Continue
            }
        }
    }

    async fn apply_filter<C, S>(scheduler: &PollScheduler<C, S>, filter: FilterState) -> Outcome
    where
        C: FeedClient + 'static,
        S: DisplaySink + 'static,
    {
        match scheduler.set_filter(filter.clone()).await {
            Ok(report) => {
                HBTViews::show_filter_applied(&filter, report.as_ref());
                let no_match = report.is_some_and(|report| report.no_match);
                match filter {
                    FilterState::SingleRoute(route) if no_match => {
                        HBTViews::route_not_operating(&route);
                        Outcome::NotOperating(route)
                    }
                    filter => Outcome::FilterApplied(filter),
                }
            }
            // The filter is stored even when the immediate cycle fails; the
            // next tick applies it.
            Err(e) => {
                HBTViews::show_filter_applied(&filter, None);
                HBTViews::command_failed(&e.to_string());
                Outcome::Failed(e.to_string())
            }
        }
    }
}

/// Match user input against the known route list. Case-insensitive, so
/// `6a` resolves to `6A`.
pub fn resolve_route(input: &str, routes: &DestinationTable) -> Result<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(HBTError::UnknownRoute(input.to_string()));
    }
    if routes.is_known_route(trimmed) {
        return Ok(trimmed.to_string());
    }

    let wanted = trimmed.to_uppercase();
    routes
        .routes()
        .iter()
        .find(|route| route.to_uppercase() == wanted)
        .cloned()
        .ok_or(HBTError::UnknownRoute(wanted))
}

/// Known routes that start with or contain `input`, prefix matches first.
pub fn suggest_routes(input: &str, routes: &DestinationTable) -> Vec<String> {
    let wanted = input.trim().to_uppercase();
    if wanted.is_empty() {
        return Vec::new();
    }

    let (prefix, contains): (Vec<&String>, Vec<&String>) = routes
        .routes()
        .iter()
        .filter(|route| route.to_uppercase().contains(&wanted))
        .partition(|route| route.to_uppercase().starts_with(&wanted));

    prefix
        .into_iter()
        .chain(contains)
        .take(MAX_SUGGESTIONS)
        .cloned()
        .collect()
}
