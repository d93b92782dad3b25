//! CLI for biobaseline: synthetic biometric cohorts and stratified baselines.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "biobaseline")]
#[command(about = "biobaseline: synthetic wearable cohorts reduced to stratified reference baselines")]
#[command(version = biobaseline_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a virtual cohort and compute stratified baselines from its records.
    /// Writes healthkit_baselines.json and synthetic_healthkit_data.json.
    Generate {
        /// Run configuration JSON; flags below override its fields
        #[arg(long)]
        config: Option<String>,

        /// Number of virtual people
        #[arg(long)]
        people: Option<u32>,

        /// Days simulated per person
        #[arg(long)]
        days: Option<u32>,

        /// First simulated day (YYYY-MM-DD)
        #[arg(long)]
        start_date: Option<String>,

        /// Run seed (random if omitted; the value used is written to the report)
        #[arg(long)]
        seed: Option<u64>,

        /// Suppression threshold: minimum values behind a baseline entry
        #[arg(long)]
        min_count: Option<usize>,

        /// Day-to-day noise as a fraction of the population std (all offset metrics)
        #[arg(long)]
        noise_fraction: Option<f64>,

        /// Stratum assignment: round_robin covers every age x sex cell, random draws uniformly
        #[arg(long, value_parser = ["round_robin", "random"])]
        coverage: Option<String>,

        /// Declared age bands, comma separated (e.g. 18-29,30-39)
        #[arg(long, value_delimiter = ',')]
        age_bands: Option<Vec<String>>,

        /// Declared sexes, comma separated (male,female)
        #[arg(long, value_delimiter = ',')]
        sexes: Option<Vec<String>>,

        /// Activity mix: four weights for sedentary,moderate,active,athletic
        #[arg(long, value_delimiter = ',', conflicts_with = "pin_activity")]
        activity_weights: Option<Vec<f64>>,

        /// Give every entity this activity level
        #[arg(long)]
        pin_activity: Option<String>,

        /// Cross-cuts to compute, comma separated (default: all six)
        #[arg(long, value_delimiter = ',')]
        cross_cuts: Option<Vec<String>>,

        /// Sample size assumed for parameter entries that declare none
        #[arg(long)]
        assumed_n: Option<usize>,

        /// Also drop whole partitions below 50 per age band and 30 per age x sex cell
        #[arg(long)]
        biomarker_minimums: bool,

        /// Population parameter table JSON (literature defaults if omitted)
        #[arg(long)]
        params: Option<String>,

        /// Circadian curves JSON
        #[arg(long)]
        circadian: Option<String>,

        /// Day-of-week curves JSON
        #[arg(long)]
        calendar: Option<String>,

        /// Directory for output files
        #[arg(long, default_value = ".")]
        output_dir: String,

        /// Skip writing the raw record set
        #[arg(long)]
        no_records: bool,

        /// Run generation and aggregation on one thread
        #[arg(long)]
        serial: bool,
    },

    /// Compute baselines straight from the parameter table (normal quantiles, no simulation)
    Parametric {
        /// Population parameter table JSON (literature defaults if omitted)
        #[arg(long)]
        params: Option<String>,

        /// Suppression threshold applied to each entry's sample size
        #[arg(long, default_value = "30")]
        min_count: usize,

        /// Sample size assumed for distributions that declare none
        #[arg(long, default_value = "1000")]
        assumed_n: usize,

        /// Output JSON path
        #[arg(long, default_value = "literature_baselines.json")]
        output: String,
    },

    /// Write the built-in parameter table and modulation curves as editable JSON
    Defaults {
        /// Directory for the three payload files
        #[arg(long, default_value = ".")]
        output_dir: String,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            config,
            people,
            days,
            start_date,
            seed,
            min_count,
            noise_fraction,
            coverage,
            age_bands,
            sexes,
            activity_weights,
            pin_activity,
            cross_cuts,
            assumed_n,
            biomarker_minimums,
            params,
            circadian,
            calendar,
            output_dir,
            no_records,
            serial,
        } => commands::generate::run(commands::generate::GenerateCommandConfig {
            config_path: config.as_deref(),
            people,
            days,
            start_date: start_date.as_deref(),
            seed,
            min_count,
            noise_fraction,
            coverage: coverage.as_deref(),
            age_bands: age_bands.as_deref(),
            sexes: sexes.as_deref(),
            activity_weights: activity_weights.as_deref(),
            pin_activity: pin_activity.as_deref(),
            cross_cuts: cross_cuts.as_deref(),
            assumed_n,
            biomarker_minimums,
            params_path: params.as_deref(),
            circadian_path: circadian.as_deref(),
            calendar_path: calendar.as_deref(),
            output_dir: &output_dir,
            write_records: !no_records,
            serial,
        }),
        Commands::Parametric {
            params,
            min_count,
            assumed_n,
            output,
        } => commands::parametric::run(params.as_deref(), min_count, assumed_n, &output),
        Commands::Defaults { output_dir } => commands::defaults::run(&output_dir),
    }
}
