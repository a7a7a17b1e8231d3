//! DNR CLI
//!
//! CLI tool for converting filter lists into declarative rulesets and
//! inspecting the result.

use std::fs;
use std::path::Path;
use std::time::Instant;

use clap::{Parser, Subcommand};

use dnr_compiler::{scan_unit, validate_rule_ids, ConverterOptions, RulesConverter, ScanOptions};
use dnr_core::{DeclarativeRule, RuleAction};

#[derive(Parser)]
#[command(name = "dnr-cli")]
#[command(about = "Filter list to declarative ruleset converter")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert filter lists into a declarative ruleset
    Compile {
        /// Input filter list files; each one is a unit, numbered in order
        #[arg(short, long, required = true)]
        input: Vec<String>,

        /// Output ruleset file
        #[arg(short, long, default_value = "rules.json")]
        output: String,

        /// Write the source map to this file
        #[arg(long)]
        source_map: Option<String>,

        /// Extension path of the redirect resources, e.g. /war/redirects
        #[arg(long)]
        resources_path: Option<String>,

        #[arg(long)]
        max_rules: Option<usize>,

        #[arg(long)]
        max_unsafe_rules: Option<usize>,

        #[arg(long)]
        max_regexp_rules: Option<usize>,

        /// Stop scanning a list after this many rules
        #[arg(long)]
        max_scanned_rules: Option<usize>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a declarative ruleset
    Validate {
        /// Ruleset file to validate
        #[arg(short, long)]
        input: String,
    },

    /// Dump ruleset info
    Info {
        /// Ruleset file to inspect
        #[arg(short, long)]
        input: String,
    },
}

struct CompileArgs {
    inputs: Vec<String>,
    output: String,
    source_map: Option<String>,
    options: ConverterOptions,
    scan_options: ScanOptions,
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Compile {
            input,
            output,
            source_map,
            resources_path,
            max_rules,
            max_unsafe_rules,
            max_regexp_rules,
            max_scanned_rules,
            verbose,
        } => cmd_compile(CompileArgs {
            inputs: input,
            output,
            source_map,
            options: ConverterOptions {
                resources_path,
                max_number_of_rules: max_rules,
                max_number_of_unsafe_rules: max_unsafe_rules,
                max_number_of_regexp_rules: max_regexp_rules,
            },
            scan_options: ScanOptions {
                max_number_of_scanned_rules: max_scanned_rules,
            },
            verbose,
        }),
        Commands::Validate { input } => cmd_validate(&input),
        Commands::Info { input } => cmd_info(&input),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn cmd_compile(args: CompileArgs) -> Result<(), String> {
    if args.inputs.is_empty() {
        return Err("No input files specified".to_string());
    }

    let start = Instant::now();
    let mut units = Vec::with_capacity(args.inputs.len());
    let mut total_lines = 0usize;

    for (unit_id, path) in args.inputs.iter().enumerate() {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read '{}': {}", path, e))?;

        let line_count = content.lines().count();
        total_lines += line_count;

        let unit = scan_unit(unit_id, &content, &args.scan_options, None);

        if args.verbose {
            println!(
                "  [{}] {} - {} lines, {} rules, {} errors",
                unit_id,
                Path::new(path).file_name().unwrap_or_default().to_string_lossy(),
                line_count,
                unit.rules.len(),
                unit.errors.len()
            );
        }

        units.push(unit);
    }

    let scan_time = start.elapsed();
    let scanned: usize = units.iter().map(|unit| unit.rules.len()).sum();

    let convert_start = Instant::now();
    let converted = RulesConverter::new()
        .convert(units, &args.options)
        .map_err(|e| format!("Conversion failed: {}", e))?;
    let convert_time = convert_start.elapsed();

    let json = serde_json::to_string_pretty(&converted.declarative_rules)
        .map_err(|e| format!("Failed to serialize rules: {}", e))?;
    fs::write(&args.output, json)
        .map_err(|e| format!("Failed to write '{}': {}", args.output, e))?;

    if let Some(path) = &args.source_map {
        let json = serde_json::to_string(&converted.source_map_values)
            .map_err(|e| format!("Failed to serialize source map: {}", e))?;
        fs::write(path, json).map_err(|e| format!("Failed to write '{}': {}", path, e))?;
    }

    if args.verbose {
        for error in &converted.errors {
            println!("  error: {error}");
        }
    }
    for limitation in &converted.limitations {
        println!("  limit: {limitation}");
    }

    let total_time = start.elapsed();

    println!("Converted {} filter lists to '{}'", args.inputs.len(), args.output);
    println!("  Lines:    {}", total_lines);
    println!(
        "  Rules:    {} scanned -> {} declarative",
        scanned,
        converted.declarative_rules.len()
    );
    println!("  Errors:   {}", converted.errors.len());
    println!(
        "  Time:     {:.1}ms (scan: {:.1}ms, convert: {:.1}ms)",
        total_time.as_secs_f64() * 1000.0,
        scan_time.as_secs_f64() * 1000.0,
        convert_time.as_secs_f64() * 1000.0,
    );

    Ok(())
}

fn load_ruleset(input: &str) -> Result<Vec<DeclarativeRule>, String> {
    let text = fs::read_to_string(input)
        .map_err(|e| format!("Failed to read '{}': {}", input, e))?;
    serde_json::from_str(&text).map_err(|e| format!("Invalid ruleset: {}", e))
}

fn cmd_validate(input: &str) -> Result<(), String> {
    let rules = load_ruleset(input)?;

    validate_rule_ids(&rules).map_err(|e| format!("Invalid ruleset: {}", e))?;

    let conflicting = rules
        .iter()
        .filter(|rule| rule.condition.url_filter.is_some() && rule.condition.regex_filter.is_some())
        .count();
    if conflicting > 0 {
        return Err(format!(
            "Invalid ruleset: {conflicting} rules set both urlFilter and regexFilter"
        ));
    }

    println!("Ruleset '{}' is valid", input);
    println!("  Rules:       {}", rules.len());

    Ok(())
}

fn cmd_info(input: &str) -> Result<(), String> {
    let rules = load_ruleset(input)?;

    let count = |pred: fn(&DeclarativeRule) -> bool| rules.iter().filter(|rule| pred(rule)).count();

    println!("Ruleset: {}", input);
    println!("  Rules:       {}", rules.len());
    println!("  Unsafe:      {}", count(DeclarativeRule::is_unsafe));
    println!("  Regex:       {}", count(DeclarativeRule::is_regex));
    println!();

    println!("Actions:");
    println!("  Block:             {}", count(|r| r.action == RuleAction::Block));
    println!("  Allow:             {}", count(|r| r.action == RuleAction::Allow));
    println!(
        "  AllowAllRequests:  {}",
        count(|r| r.action == RuleAction::AllowAllRequests)
    );
    println!(
        "  Redirect:          {}",
        count(|r| matches!(r.action, RuleAction::Redirect { .. }))
    );
    println!(
        "  ModifyHeaders:     {}",
        count(|r| matches!(r.action, RuleAction::ModifyHeaders { .. }))
    );

    Ok(())
}
