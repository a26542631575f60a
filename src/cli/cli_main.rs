use crate::Analysis::config::AnalysisConfig;
use crate::Analysis::pipeline::MultistabilityAnalysis;
use crate::Examples::crn_examples::crn_examples;
use crate::ReactionNetwork::network_parser::{network_from_equations, network_from_file};
use crate::Utils::logger::init_logger;
use crate::crn_error::{CrnError, CrnResult};
use log::error;
use std::io::{self, Write};
use std::path::Path;

pub fn run_interactive_menu() {
    if let Err(e) = init_logger("info", None) {
        println!("logger not started: {}", e);
    }
    loop {
        show_main_menu();
        let choice = get_user_input();

        let result = match choice.trim() {
            "1" => analyse_file_prompt(),
            "2" => analyse_equations_prompt(),
            "3" => examples_menu(),
            "0" => {
                println!("Goodbye!");
                break;
            }
            _ => {
                println!("Invalid choice. Please try again.");
                Ok(())
            }
        };
        if let Err(e) = result {
            error!("{}", e);
        }
    }
}

/// `args` without the program name: network file, optional configuration, optional
/// path of the JSON report.
pub fn run_from_args(args: &[String]) -> CrnResult<()> {
    let network_path = args.first().ok_or_else(|| {
        CrnError::ConfigError(
            "usage: crn_multistability <network file> [config.json] [report.json]".to_string(),
        )
    })?;
    let config = match args.get(1) {
        Some(path) => AnalysisConfig::from_json_file(Path::new(path))?,
        None => AnalysisConfig::default(),
    };
    init_logger(&config.log_level, config.log_file.as_deref().map(Path::new))?;
    let network = network_from_file(Path::new(network_path))?;
    let report = MultistabilityAnalysis::new(&network, config)?.run()?;
    report.print_table();
    if let Some(out) = args.get(2) {
        report.write_json(Path::new(out))?;
    }
    Ok(())
}

/* colors
Blue (\x1b[34m) - Welcome header text

Yellow (\x1b[33m) - Menu options

Cyan (\x1b[36m) - prompts

Reset (\x1b[0m) - Returns to normal color after each colored section
*/
fn show_main_menu() {
    println!(
        "\x1b[34m\n Multistability and ACR analysis of mass-action reaction networks \n \x1b[0m"
    );
    println!("\x1b[33m1. Analyse a network file\x1b[0m");
    println!("\x1b[33m2. Type reactions\x1b[0m");
    println!("\x1b[33m3. Examples\x1b[0m");
    println!("\x1b[33m0. Exit\x1b[0m");
    prompt("Enter your choice: ");
}

fn examples_menu() -> CrnResult<()> {
    loop {
        println!("\n=== Examples ===");
        println!("\x1b[33m0. Network structure (Michaelis-Menten)\x1b[0m");
        println!("\x1b[33m1. Decomposition\x1b[0m");
        println!("\x1b[33m2. Michaelis-Menten analysis\x1b[0m");
        println!("\x1b[33m3. Schlögl model\x1b[0m");
        println!("\x1b[33m4. Cooperative switch\x1b[0m");
        println!("\x1b[33m5. ACR motif\x1b[0m");
        println!("\x1b[33m6. Constant sign determinant\x1b[0m");
        println!("\x1b[33mb. Back to main menu\x1b[0m");
        prompt("Enter your choice: ");
        let choice = get_user_input();
        let choice = choice.trim();
        if choice == "b" {
            return Ok(());
        }
        match choice.parse::<usize>() {
            Ok(task) => crn_examples(task)?,
            Err(_) => println!("Invalid choice. Please try again."),
        }
    }
}

fn analyse_file_prompt() -> CrnResult<()> {
    prompt("Network file: ");
    let network_path = get_user_input();
    prompt("Configuration file (empty for defaults): ");
    let config_path = get_user_input();
    let mut args = vec![network_path.trim().to_string()];
    if !config_path.trim().is_empty() {
        args.push(config_path.trim().to_string());
    }
    run_from_args(&args)
}

fn analyse_equations_prompt() -> CrnResult<()> {
    println!("One reaction per line, e.g. 2X <-> 3X. Empty line to finish.");
    let mut lines = Vec::new();
    loop {
        prompt("> ");
        let line = get_user_input();
        if line.trim().is_empty() {
            break;
        }
        lines.push(line.trim().to_string());
    }
    let equations: Vec<&str> = lines.iter().map(|s| s.as_str()).collect();
    let network = network_from_equations(&equations)?;
    let report = MultistabilityAnalysis::new(&network, AnalysisConfig::default())?.run()?;
    report.print_table();
    Ok(())
}

fn prompt(text: &str) {
    print!("\x1b[36m{}\x1b[0m", text);
    let _ = io::stdout().flush();
}

fn get_user_input() -> String {
    let mut input = String::new();
    if let Err(e) = io::stdin().read_line(&mut input) {
        error!("failed to read input: {}", e);
    }
    input
}
