use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use biobaseline_core::{ActivityAssignment, ActivityLevel, Coverage, CrossCut, Pipeline, RunConfig};
use chrono::NaiveDate;

pub const BASELINES_FILE: &str = "healthkit_baselines.json";
pub const RECORDS_FILE: &str = "synthetic_healthkit_data.json";

pub struct GenerateCommandConfig<'a> {
    pub config_path: Option<&'a str>,
    pub people: Option<u32>,
    pub days: Option<u32>,
    pub start_date: Option<&'a str>,
    pub seed: Option<u64>,
    pub min_count: Option<usize>,
    pub noise_fraction: Option<f64>,
    pub coverage: Option<&'a str>,
    pub age_bands: Option<&'a [String]>,
    pub sexes: Option<&'a [String]>,
    pub activity_weights: Option<&'a [f64]>,
    pub pin_activity: Option<&'a str>,
    pub cross_cuts: Option<&'a [String]>,
    pub assumed_n: Option<usize>,
    pub biomarker_minimums: bool,
    pub params_path: Option<&'a str>,
    pub circadian_path: Option<&'a str>,
    pub calendar_path: Option<&'a str>,
    pub output_dir: &'a str,
    pub write_records: bool,
    pub serial: bool,
}

fn parse_list<T>(flag: &str, items: &[String]) -> Result<Vec<T>, String>
where
    T: FromStr,
    T::Err: Display,
{
    items
        .iter()
        .map(|item| {
            item.trim()
                .parse()
                .map_err(|e| format!("invalid --{flag} entry '{item}': {e}"))
        })
        .collect()
}

/// Config file (or defaults) with flag overrides applied.
fn resolve_config(cfg: &GenerateCommandConfig<'_>) -> Result<RunConfig, String> {
    let mut run = match cfg.config_path {
        Some(path) => RunConfig::from_path(path).map_err(|e| format!("{path}: {e}"))?,
        None => RunConfig::default(),
    };
    if let Some(people) = cfg.people {
        run.people = people;
    }
    if let Some(days) = cfg.days {
        run.days = days;
    }
    if let Some(date) = cfg.start_date {
        run.start_date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|e| format!("invalid --start-date '{date}': {e}"))?;
    }
    if cfg.seed.is_some() {
        run.seed = cfg.seed;
    }
    if let Some(min_count) = cfg.min_count {
        run.aggregation.min_count = min_count;
    }
    if cfg.noise_fraction.is_some() {
        run.noise_fraction = cfg.noise_fraction;
    }
    match cfg.coverage {
        Some("random") => run.plan.coverage = Coverage::Random,
        Some("round_robin") => run.plan.coverage = Coverage::RoundRobin,
        Some(other) => return Err(format!("unknown coverage '{other}'")),
        None => {}
    }
    if let Some(items) = cfg.age_bands {
        run.plan.age_bands = parse_list("age-bands", items)?;
    }
    if let Some(items) = cfg.sexes {
        run.plan.sexes = parse_list("sexes", items)?;
    }
    if let Some(weights) = cfg.activity_weights {
        let weights: [f64; 4] = weights
            .try_into()
            .map_err(|_| format!("--activity-weights needs 4 values, got {}", weights.len()))?;
        run.plan.activity = ActivityAssignment::Weighted(weights);
    }
    if let Some(level) = cfg.pin_activity {
        let level: ActivityLevel = level
            .parse()
            .map_err(|e| format!("invalid --pin-activity '{level}': {e}"))?;
        run.plan.activity = ActivityAssignment::Pinned(level);
    }
    if let Some(items) = cfg.cross_cuts {
        run.cross_cuts = parse_list("cross-cuts", items)?;
    }
    if let Some(n) = cfg.assumed_n {
        run.aggregation.assumed_sample_size = n;
    }
    if cfg.biomarker_minimums {
        run.aggregation = run.aggregation.with_biomarker_partition_minimums();
    }
    if cfg.serial {
        run.aggregation.parallel = false;
    }
    Ok(run)
}

pub fn run(cfg: GenerateCommandConfig<'_>) {
    let run_config = resolve_config(&cfg).unwrap_or_else(|e| super::fail("Invalid configuration", e));
    log::debug!("resolved run config: {run_config:?}");
    let pipeline = Pipeline::new(run_config)
        .with_table(super::load_table(cfg.params_path))
        .with_circadian(super::load_circadian(cfg.circadian_path))
        .with_calendar(super::load_calendar(cfg.calendar_path));

    println!(
        "Generating {} people x {} days from {}...",
        pipeline.config.people, pipeline.config.days, pipeline.config.start_date
    );
    let output = pipeline
        .run()
        .unwrap_or_else(|e| super::fail("Generation failed", e));
    let report = &output.report;

    let dir = Path::new(cfg.output_dir);
    let baselines_path = dir.join(BASELINES_FILE);
    super::write_json_or_exit(&baselines_path, report);
    println!("  Baselines: {}", baselines_path.display());
    if cfg.write_records {
        let records_path = dir.join(RECORDS_FILE);
        super::write_json_or_exit(&records_path, &output.cohort.records);
        println!("  Records:   {}", records_path.display());
    }

    println!();
    println!("Summary:");
    println!("  Total records: {}", report.total_records);
    if let Some(params) = &report.parameters {
        println!("  Seed: {}", params.seed);
    }
    println!("  Metrics: {}", report.baselines.global.len());
    for (cut, cells) in report.cell_counts() {
        if cut != CrossCut::Global {
            println!("  {:<20} {cells} cells", cut.name());
        }
    }
}
