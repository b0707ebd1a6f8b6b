use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use climscrape::plot::ChartRenderer;
use climscrape::scraper::{ScraperConfig, WebScraper};
use climscrape::store::{DEFAULT_LOCATION, SqliteStore, WeatherStore};
use climscrape::types::YearMonth;
use climscrape::{CrawlReport, Crawler};
use log::LevelFilter;

#[derive(Parser)]
#[command(name = "climscrape")]
#[command(about = "Downloads, stores and charts daily climate data from climate.weather.gc.ca", long_about = None)]
struct Cli {
    #[arg(
        short = 'l',
        long = "log-level",
        value_enum,
        default_value = "info",
        global = true,
        help = "Set the logging level"
    )]
    log_level: LogLevel,

    #[arg(
        short = 'd',
        long,
        default_value = "weather.sqlite",
        global = true,
        help = "Path to the SQLite database"
    )]
    database: PathBuf,

    #[arg(
        long,
        default_value_t = ScraperConfig::default().station_id,
        global = true,
        help = "Climate station to download"
    )]
    station_id: u32,

    #[arg(
        long,
        default_value = DEFAULT_LOCATION,
        global = true,
        help = "Location label stored alongside each row"
    )]
    location: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Download everything when the database is empty, otherwise fetch what is missing
    Sync {
        #[arg(short = 'o', long = "output", value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Purge the database and download every available month
    Full {
        #[arg(short = 'o', long = "output", value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Fetch the days after the most recently stored one
    Update {
        #[arg(short = 'o', long = "output", value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Show daily average temperatures for one month, optionally as a line chart
    Daily {
        #[arg(long, help = "Year to show (YYYY)")]
        year: i32,

        #[arg(
            long,
            help = "Month to show (1-12)",
            value_parser = clap::value_parser!(u32).range(1..=12)
        )]
        month: u32,

        #[arg(long, value_name = "FILE", help = "Write an SVG line chart to this file")]
        chart: Option<PathBuf>,

        #[arg(short = 'o', long = "output", value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Chart the distribution of daily averages per month across a range of years
    Monthly {
        #[arg(long, help = "First year of the range (YYYY)")]
        start_year: i32,

        #[arg(long, help = "Last year of the range (YYYY)")]
        end_year: i32,

        #[arg(
            long,
            value_name = "FILE",
            default_value = "monthly.svg",
            help = "Where to write the SVG box plot"
        )]
        chart: PathBuf,
    },
    /// Print the number of stored days
    Count,
}

fn serialize_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            log::error!("Error serializing to JSON: {}", e);
            process::exit(1);
        }
    }
}

fn print_report(report: &CrawlReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => serialize_json(report),
        OutputFormat::Text => println!("{}", report),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.clone().into())
        .init();

    let mut store = SqliteStore::open(&cli.database)
        .map(|store| store.with_location(cli.location.as_str()))
        .unwrap_or_else(|e| {
            log::error!("Error opening {}: {}", cli.database.display(), e);
            process::exit(1);
        });

    let crawler = || {
        let scraper = WebScraper::with_config(ScraperConfig {
            station_id: cli.station_id,
            ..ScraperConfig::default()
        })
        .unwrap_or_else(|e| {
            log::error!("Error creating scraper: {}", e);
            process::exit(1);
        });
        Crawler::new(scraper)
    };

    match cli.command {
        Commands::Sync { format } => {
            let report = crawler().sync(&mut store).await.unwrap_or_else(|e| {
                log::error!("Sync failed: {}", e);
                process::exit(1);
            });
            print_report(&report, format);
        }

        Commands::Full { format } => {
            log::warn!("Purging {} before a full download", cli.database.display());
            store.purge().unwrap_or_else(|e| {
                log::error!("Error purging database: {}", e);
                process::exit(1);
            });

            let report = crawler()
                .full_backfill(&mut store)
                .await
                .unwrap_or_else(|e| {
                    log::error!("Full download failed: {}", e);
                    process::exit(1);
                });
            print_report(&report, format);
        }

        Commands::Update { format } => {
            let report = crawler()
                .incremental_update(&mut store)
                .await
                .unwrap_or_else(|e| {
                    log::error!("Update failed: {}", e);
                    process::exit(1);
                });
            print_report(&report, format);
        }

        Commands::Daily {
            year,
            month,
            chart,
            format,
        } => {
            let Some(period) = YearMonth::new(year, month) else {
                log::error!("Invalid month: {}", month);
                process::exit(1);
            };

            let means = store.daily_means(period).unwrap_or_else(|e| {
                log::error!("Error reading {}: {}", period, e);
                process::exit(1);
            });

            match format {
                OutputFormat::Json => serialize_json(&means),
                OutputFormat::Text => {
                    if means.is_empty() {
                        println!("No entries for {}.", period);
                    } else {
                        println!("Daily average temperatures for {}:", period);
                        for mean in &means {
                            println!("  {}  {:>6.1} °C", mean.date, mean.mean);
                        }
                    }
                }
            }

            if let Some(path) = chart {
                ChartRenderer::default()
                    .line_plot(period, &means, &path)
                    .unwrap_or_else(|e| {
                        log::error!("Error drawing chart: {}", e);
                        process::exit(1);
                    });
                log::info!("Chart saved to {}", path.display());
            }
        }

        Commands::Monthly {
            start_year,
            end_year,
            chart,
        } => {
            if start_year > end_year {
                log::error!(
                    "Invalid args: start year ({start_year}) cannot be after end year ({end_year})"
                );
                process::exit(1);
            }

            let buckets = store
                .monthly_means(start_year, end_year)
                .unwrap_or_else(|e| {
                    log::error!("Error reading {} to {}: {}", start_year, end_year, e);
                    process::exit(1);
                });

            ChartRenderer::default()
                .box_plot(start_year, end_year, &buckets, &chart)
                .unwrap_or_else(|e| {
                    log::error!("Error drawing chart: {}", e);
                    process::exit(1);
                });
            println!("Chart saved to {}", chart.display());
        }

        Commands::Count => {
            let count = store.row_count().unwrap_or_else(|e| {
                log::error!("Error counting rows: {}", e);
                process::exit(1);
            });
            println!("{} day(s) stored in {}", count, cli.database.display());
        }
    }
}
