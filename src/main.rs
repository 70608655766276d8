use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};

use nice_outside::{
    AppConfig, AppContext, CacheStore, ConfigStore, DigestCounts, Event, Filters, GroupedView,
    LocalClock, SeasonPartition,
};

#[derive(Parser, Debug)]
#[command(name = "nice-outside")]
#[command(about = "Local events dashboard for the Côte d'Azur", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Events happening today
    Today(FilterArgs),
    /// This week, grouped by day
    Week(FilterArgs),
    /// The coming weekend
    Weekend(FilterArgs),
    /// This month, grouped by week
    Month(FilterArgs),
    /// Featured picks
    Featured,
    /// Upcoming events, type-diversified
    Upcoming(FilterArgs),
    /// Timeless activities, in and out of season
    Seasons,
    /// Dashboard digest
    Digest {
        /// Ease the counts in instead of printing them once
        #[arg(long)]
        animate: bool,
    },
    /// Backend statistics
    Stats,
    /// Tag vocabulary, optionally for a single category (type, vibe, budget...)
    Tags { category: Option<String> },
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    #[arg(long)]
    city: Option<String>,
    #[arg(long = "type")]
    kind: Option<String>,
    #[arg(long)]
    vibe: Option<String>,
    #[arg(long)]
    budget: Option<String>,
    #[arg(long)]
    search: Option<String>,
}

impl From<FilterArgs> for Filters {
    fn from(args: FilterArgs) -> Self {
        Filters {
            city: args.city,
            kind: args.kind,
            vibe: args.vibe,
            budget: args.budget,
            search: args.search,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = match cli.config {
        Some(path) => ConfigStore::load_from(path),
        None => ConfigStore::load(),
    };
    let config = store.read().with_env_overrides();
    tracing::debug!(api = %config.api_base_url, version = %config.cache_version, "config loaded");

    let json = cli.json;
    match cli.command {
        Command::Seasons => {
            let clock = LocalClock::system(config.tz()?);
            print_seasons(&nice_outside::season_view(&clock), json)?;
        }
        Command::Today(args) => {
            let ctx = connect(config)?;
            let view = nice_outside::today_view(&ctx, &args.into(), &ctx.clock()).await;
            print_grouped(view.map_err(|e| anyhow!(e))?, json)?;
        }
        Command::Week(args) => {
            let ctx = connect(config)?;
            let view = nice_outside::week_view(&ctx, &args.into(), &ctx.clock()).await;
            print_grouped(view.map_err(|e| anyhow!(e))?, json)?;
        }
        Command::Weekend(args) => {
            let ctx = connect(config)?;
            let view = nice_outside::weekend_view(&ctx, &args.into(), &ctx.clock()).await;
            print_grouped(view.map_err(|e| anyhow!(e))?, json)?;
        }
        Command::Month(args) => {
            let ctx = connect(config)?;
            let view = nice_outside::month_view(&ctx, &args.into(), &ctx.clock()).await;
            print_grouped(view.map_err(|e| anyhow!(e))?, json)?;
        }
        Command::Featured => {
            let ctx = connect(config)?;
            let events = nice_outside::featured_view(&ctx).await.map_err(|e| anyhow!(e))?;
            print_list(&events, json)?;
        }
        Command::Upcoming(args) => {
            let ctx = connect(config)?;
            let events = nice_outside::upcoming_view(&ctx, &args.into())
                .await
                .map_err(|e| anyhow!(e))?;
            print_list(&events, json)?;
        }
        Command::Digest { animate } => {
            let ctx = connect(config)?;
            let digest = nice_outside::digest_view(&ctx).await.map_err(|e| anyhow!(e))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&digest)?);
                return Ok(());
            }
            let counts = DigestCounts {
                total: digest.week_count,
                featured: digest.featured.len() as u64,
                deals: digest.deals.len() as u64,
            };
            if animate {
                animate_counts(&ctx, counts).await?;
            } else {
                println!("{}", counts_line(counts));
            }
            println!("Aujourd'hui: {}", digest.today_count);
            print_list(&digest.featured, false)?;
        }
        Command::Stats => {
            let ctx = connect(config)?;
            let stats = nice_outside::stats_view(&ctx).await.map_err(|e| anyhow!(e))?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Tags { category } => {
            let ctx = connect(config)?;
            let catalog = nice_outside::tags_view(&ctx, category.as_deref())
                .await
                .map_err(|e| anyhow!(e))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&catalog)?);
                return Ok(());
            }
            for (name, vocabulary) in &catalog {
                println!("{name}");
                for (code, label) in vocabulary {
                    println!("  {code:<20} {label}");
                }
            }
        }
    }

    Ok(())
}

fn connect(config: AppConfig) -> Result<AppContext> {
    let cache = Arc::new(CacheStore::open_default()?);
    AppContext::bootstrap(config, cache).map_err(|e| anyhow!(e))
}

fn print_seasons(partition: &SeasonPartition, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(partition)?);
        return Ok(());
    }
    println!("En saison");
    for activity in &partition.in_season {
        println!("  {} ({}) {}", activity.title, activity.season_label, activity.location);
    }
    println!("Hors saison");
    for activity in &partition.off_season {
        println!("  {} ({})", activity.title, activity.season_label);
    }
    Ok(())
}

fn counts_line(counts: DigestCounts) -> String {
    format!(
        "{} événements | {} à la une | {} bons plans",
        counts.total, counts.featured, counts.deals
    )
}

async fn animate_counts(ctx: &AppContext, target: DigestCounts) -> Result<()> {
    let mut total = ctx.counter();
    let mut featured = ctx.counter();
    let mut deals = ctx.counter();
    total.set_target(target.total);
    featured.set_target(target.featured);
    deals.set_target(target.deals);

    let frame = ctx.config.animation_frame();
    let mut stdout = std::io::stdout();
    loop {
        let done = !total.is_running() && !featured.is_running() && !deals.is_running();
        let shown = DigestCounts {
            total: total.value(),
            featured: featured.value(),
            deals: deals.value(),
        };
        write!(stdout, "\r{}", counts_line(shown))?;
        stdout.flush()?;
        if done {
            break;
        }
        tokio::time::sleep(frame).await;
    }
    writeln!(stdout)?;
    Ok(())
}

fn print_grouped(view: GroupedView, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }
    println!("{}", counts_line(view.counts));
    if view.matched == 0 {
        println!("Aucun événement");
        return Ok(());
    }
    for group in &view.groups {
        println!("\n{}", group.label);
        for event in &group.events {
            println!("  {}", event_line(event));
        }
    }
    Ok(())
}

fn print_list(events: &[Event], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(events)?);
        return Ok(());
    }
    for event in events {
        println!("  {}", event_line(event));
    }
    Ok(())
}

fn event_line(event: &Event) -> String {
    let mut line = format!("[{:>3}] {}", event.interest_score, event.title);
    if !event.location_city.is_empty() {
        line.push_str(" | ");
        line.push_str(&event.location_city);
    }
    let price = event.price_display();
    if !price.is_empty() {
        line.push_str(" | ");
        line.push_str(&price);
    }
    line
}
