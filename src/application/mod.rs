// Lab pass orchestration and ranking
pub mod lab_analyzer;

// Parameter range planning against the data source
pub mod parameter_planner;

// Console and JSON output
pub mod reporting;

pub mod timing;
