/// Interactive menu and the non-interactive `<network file> [config.json] [report.json]` entry.
pub mod cli_main;
