// Misc utilities useful to both simlog and simalyze.

mod configs;
mod csv;

// Structures representing the configuration of one analysis run and of a comparison across runs.

pub use configs::ComparisonConfig;
pub use configs::Reference;
pub use configs::RunConfig;
pub use configs::Simulation;

// Read a run configuration or a comparison configuration from a json file.

pub use configs::read_comparison_config;
pub use configs::read_run_config;

// Defaults for the optional run configuration fields.

pub use configs::DEFAULT_OUTPUT_DIR;
pub use configs::DEFAULT_RESAMPLE_INTERVAL;

// Fast, non-allocating CSV parser.

pub use csv::Token as CsvToken;
pub use csv::Tokenizer as CsvTokenizer;
