use std::path::Path;

use biobaseline_core::{CalendarModel, CircadianModel, ParameterTable, RunConfig};

pub const PARAMS_FILE: &str = "population_params.json";
pub const CIRCADIAN_FILE: &str = "circadian_patterns.json";
pub const CALENDAR_FILE: &str = "calendar_patterns.json";
pub const RUN_FILE: &str = "run_config.json";

pub fn run(output_dir: &str) {
    let dir = Path::new(output_dir);
    let files = [
        (PARAMS_FILE, serde_json::to_value(ParameterTable::literature())),
        (CIRCADIAN_FILE, serde_json::to_value(CircadianModel::literature())),
        (CALENDAR_FILE, serde_json::to_value(CalendarModel::literature())),
        (RUN_FILE, serde_json::to_value(RunConfig::default())),
    ];
    for (name, value) in files {
        let value = value.unwrap_or_else(|e| super::fail(&format!("Failed to encode {name}"), e));
        let path = dir.join(name);
        super::write_json_or_exit(&path, &value);
        println!("  wrote {}", path.display());
    }
}
