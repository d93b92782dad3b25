use std::path::Path;

use biobaseline_core::{AggregationConfig, CrossCut, Pipeline, RunConfig};

pub fn run(params_path: Option<&str>, min_count: usize, assumed_n: usize, output: &str) {
    let config = RunConfig {
        aggregation: AggregationConfig {
            min_count,
            assumed_sample_size: assumed_n,
            ..AggregationConfig::default()
        },
        ..RunConfig::default()
    };
    let report = Pipeline::new(config)
        .with_table(super::load_table(params_path))
        .parametric()
        .unwrap_or_else(|e| super::fail("Parametric baselines failed", e));

    super::write_json_or_exit(Path::new(output), &report);
    println!("Parametric baselines written to {output}");
    for (cut, cells) in report.cell_counts() {
        if cut != CrossCut::ByHour {
            println!("  {:<20} {cells} cells", cut.name());
        }
    }
}
