//! pplx: ask a question from the command line
//!
//! Thin wrapper over the library: loads settings, submits one query and
//! prints the answer, optionally as it streams in.

use anyhow::{anyhow, bail, Context, Result};
use futures::TryStreamExt;
use pplx_client::{
    config::{self, Settings},
    AskOptions, CitationMode, ModelRegistry, PerplexityClient, ResponseState, SearchResultItem,
};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Debug, Default)]
struct Args {
    stream: bool,
    model: Option<String>,
    citation_mode: Option<CitationMode>,
    files: Vec<PathBuf>,
    config: Option<PathBuf>,
    list_models: bool,
    query: Vec<String>,
}

enum Command {
    Ask(Args),
    Help,
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = match parse_args(std::env::args().skip(1))? {
        Command::Help => {
            print_usage();
            return Ok(());
        }
        Command::Version => {
            println!("pplx {}", pplx_client::VERSION);
            return Ok(());
        }
        Command::Ask(args) => args,
    };

    if args.list_models {
        print_models();
        return Ok(());
    }
    if args.query.is_empty() {
        print_usage();
        bail!("no query given");
    }

    let settings = match &args.config {
        Some(path) => {
            let mut settings = Settings::from_file(path)?;
            settings.merge_env();
            settings
        }
        None => config::load()?,
    };

    let mut options = AskOptions::from_settings(&settings.query)?;
    if let Some(key) = &args.model {
        let model = ModelRegistry::get(key).ok_or_else(|| anyhow!("unknown model: {}", key))?;
        options = options.model(model);
    }
    if let Some(mode) = args.citation_mode {
        options = options.citation_mode(mode);
    }

    let client = PerplexityClient::new(&settings).context("failed to create client")?;
    let query = args.query.join(" ");
    info!("Asking with model {}", options.model.identifier);
    let call = client.ask(&query, &args.files, options).await?;

    let state = if args.stream {
        stream_answer(call.stream()).await?
    } else {
        let state = call.run().await?;
        println!("{}", state.answer.as_deref().unwrap_or_default());
        state
    };

    print_sources(&state);
    Ok(())
}

/// Print the answer as it grows and return the final snapshot
async fn stream_answer(
    mut snapshots: futures::stream::BoxStream<'static, pplx_client::Result<ResponseState>>,
) -> Result<ResponseState> {
    let mut stdout = std::io::stdout();
    let mut printed = String::new();
    let mut last = ResponseState::default();

    while let Some(snapshot) = snapshots.try_next().await? {
        if let Some(answer) = &snapshot.answer {
            match answer.strip_prefix(printed.as_str()) {
                Some(delta) if !delta.is_empty() => {
                    write!(stdout, "{}", delta)?;
                    stdout.flush()?;
                    printed = answer.clone();
                }
                Some(_) => {}
                None => debug!("Answer rewritten mid-stream, skipping delta"),
            }
        }
        last = snapshot;
    }

    match &last.answer {
        Some(answer) if *answer != printed => {
            if !printed.is_empty() {
                println!();
            }
            println!("{}", answer);
        }
        _ => println!(),
    }
    Ok(last)
}

fn print_sources(state: &ResponseState) {
    if state.search_results.is_empty() {
        return;
    }
    println!();
    for (i, result) in state.search_results.iter().enumerate() {
        println!("{}", source_line(i + 1, result));
    }
}

/// `[n] title <url>`, omitting whichever parts the service left out
fn source_line(index: usize, result: &SearchResultItem) -> String {
    let mut line = format!("[{}]", index);
    if let Some(title) = result.title.as_deref().filter(|t| !t.is_empty()) {
        line.push(' ');
        line.push_str(title);
    }
    if let Some(url) = result.url.as_deref().filter(|u| !u.is_empty()) {
        line.push_str(&format!(" <{}>", url));
    }
    line
}

fn print_models() {
    for entry in ModelRegistry::all() {
        println!("{:<40} {:<22} {}", entry.key, entry.name, entry.description);
    }
}

fn parse_args(raw: impl IntoIterator<Item = String>) -> Result<Command> {
    let mut args = Args::default();
    let mut raw = raw.into_iter();

    while let Some(arg) = raw.next() {
        let mut value =
            |flag: &str| raw.next().ok_or_else(|| anyhow!("missing value for {}", flag));
        match arg.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "-V" | "--version" => return Ok(Command::Version),
            "-s" | "--stream" => args.stream = true,
            "--models" => args.list_models = true,
            "-m" | "--model" => args.model = Some(value(&arg)?),
            "-c" | "--citations" => {
                let mode = value(&arg)?.parse().map_err(|e: String| anyhow!(e))?;
                args.citation_mode = Some(mode);
            }
            "-f" | "--file" => args.files.push(PathBuf::from(value(&arg)?)),
            "--config" => args.config = Some(PathBuf::from(value(&arg)?)),
            flag if flag.starts_with('-') && flag.len() > 1 => bail!("unknown option: {}", flag),
            word => args.query.push(word.to_string()),
        }
    }

    Ok(Command::Ask(args))
}

fn print_usage() {
    println!(
        r#"
pplx v{}
Ask Perplexity from the command line

USAGE:
    pplx [OPTIONS] <QUERY>...

OPTIONS:
    -s, --stream             Print the answer as it arrives
    -m, --model <KEY>        Model key (see --models)
    -c, --citations <MODE>   Citation style: default, markdown or clean
    -f, --file <FILE>        Attach a file (repeatable)
        --config <FILE>      Path to settings.yml
        --models             List available models
    -h, --help               Print help information
    -V, --version            Print version information

ENVIRONMENT VARIABLES:
    PPLX_SETTINGS_PATH       Path to settings.yml
    PPLX_SESSION_TOKEN       Session cookie value
    PPLX_BASE_URL            Service base URL
    PPLX_MODEL               Default model key
    PPLX_CITATION_MODE       Default citation style
    PPLX_LANGUAGE            Answer language, e.g. en-US
    PPLX_TIMEZONE            IANA timezone
    RUST_LOG                 Log filter, e.g. pplx_client=debug
"#,
        pplx_client::VERSION
    );
}
