/// Settings of a whole analysis run, loaded from and saved to JSON.
pub mod config;
/// Absolute concentration robustness: structural candidates and numerical confirmation.
pub mod acr;
/// eng
/// Result aggregation:
/// 1) units without positive steady states decide injectivity of the whole network
/// 2) unit witnesses are lifted to the whole network and rechecked
/// 3) inconclusive outcomes carry their reason
pub mod aggregator;
/// Report types, table printing and JSON export.
pub mod report;
pub mod pipeline;
