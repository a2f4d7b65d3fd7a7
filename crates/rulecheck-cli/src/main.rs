use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use rulecheck_core::checker::collect_rules;
use rulecheck_core::extract::has_pdf_header;
use rulecheck_core::{CheckError, Checker, Config, PdfBackend, RuleEvaluator};
use rulecheck_pdf_mupdf::MupdfBackend;

mod output;

use output::ColorMode;

/// Rulecheck - Judge a PDF against natural-language rules with an LLM
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a PDF against one or more rules
    Check {
        /// Path to the PDF file to check
        file_path: PathBuf,

        /// A rule the document should satisfy (repeatable)
        #[arg(short, long = "rule", value_name = "TEXT", required = true)]
        rules: Vec<String>,

        /// Print the JSON response body instead of a report
        #[arg(long)]
        json: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,

        /// Path to output file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Model name
        #[arg(long)]
        model: Option<String>,

        /// Base URL of an OpenAI-compatible API
        #[arg(long)]
        base_url: Option<String>,

        /// API key (defaults to OPENAI_API_KEY)
        #[arg(long)]
        api_key: Option<String>,

        /// Log debug output to stderr
        #[arg(short, long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Check {
            file_path,
            rules,
            json,
            no_color,
            output,
            model,
            base_url,
            api_key,
            verbose,
        } => {
            init_tracing(verbose);

            // Resolve configuration: CLI flags > env vars > config files > defaults
            let mut config = Config::load();
            if let Some(model) = model {
                config.model = model;
            }
            if let Some(base_url) = base_url {
                config.base_url = base_url;
            }
            if api_key.is_some() {
                config.api_key = api_key;
            }

            let use_color = !no_color && !json && output.is_none();
            let mut writer: Box<dyn Write> = if let Some(ref output_path) = output {
                Box::new(std::fs::File::create(output_path).with_context(|| {
                    format!("failed to create {}", output_path.display())
                })?)
            } else {
                Box::new(std::io::stdout())
            };

            check(
                &config,
                file_path,
                &rules,
                json,
                ColorMode(use_color),
                &mut writer,
            )
            .await
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn check(
    config: &Config,
    file_path: PathBuf,
    rules: &[String],
    json: bool,
    color: ColorMode,
    writer: &mut dyn Write,
) -> anyhow::Result<()> {
    let rule_count = usable_rule_count(rules);
    if rule_count == 0 {
        return Err(CheckError::NoRules.into());
    }

    let data = std::fs::read(&file_path)
        .with_context(|| format!("failed to read {}", file_path.display()))?;
    if !has_pdf_header(&data) {
        anyhow::bail!("{} is not a PDF file", file_path.display());
    }

    let llm = config.build_llm_backend()?;
    if !llm.has_api_key() {
        anyhow::bail!("No API key configured. Set OPENAI_API_KEY or pass --api-key.");
    }

    let pdf: Arc<dyn PdfBackend> = Arc::new(MupdfBackend::new());
    let evaluator = Arc::new(RuleEvaluator::new(
        Arc::new(llm),
        config.evaluator_settings(),
    ));
    let checker = Checker::new(pdf, evaluator, config.checker_settings());

    let file_name = file_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_path.display().to_string());

    if !json {
        output::print_header(writer, &file_name, rule_count, &config.model, color)?;
    }

    let response = checker.check_rules(data, rules).await?;

    if json {
        serde_json::to_writer_pretty(&mut *writer, &response)?;
        writeln!(writer)?;
    } else {
        output::print_results(writer, &response, color)?;
        output::print_summary(writer, &response, color)?;
    }
    writer.flush()?;

    Ok(())
}

/// Rules left once blank `--rule` values are dropped.
fn usable_rule_count(rules: &[String]) -> usize {
    collect_rules(rules).len()
}
