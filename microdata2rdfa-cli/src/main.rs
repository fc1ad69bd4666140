use std::convert::Infallible;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use clap::Parser;
use microdata2rdfa::{Document, ElementError, PrefixTable};
use oxiri::Iri;
use tracing_subscriber::EnvFilter;

/// Rewrites the Microdata of an HTML page as XHTML+RDFa.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// An http(s) URL, a file, or `-` for stdin.
    #[arg(value_name = "TARGET")]
    target: Target,

    /// Base IRI for relative references; defaults to the target's location.
    #[arg(long, value_name = "IRI")]
    base: Option<String>,

    /// Print the Microdata graph as Turtle instead of converting.
    #[arg(long)]
    rdf: bool,

    /// Log what the conversion does (`RUST_LOG` takes precedence).
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Debug)]
enum Target {
    Url(url::Url),
    File(PathBuf),
    Stdin,
}

impl FromStr for Target {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "-" {
            return Ok(Target::Stdin);
        }

        match url::Url::parse(s) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(Target::Url(url)),
            _ => Ok(Target::File(PathBuf::from(s))),
        }
    }
}

impl Target {
    fn default_base(&self) -> Result<String, Box<dyn std::error::Error>> {
        let url = match self {
            Target::Url(url) => url.clone(),
            Target::File(path) => url::Url::from_file_path(std::fs::canonicalize(path)?)
                .map_err(|()| format!("no file URL for {}", path.display()))?,
            Target::Stdin => url::Url::from_directory_path(std::env::current_dir()?)
                .map_err(|()| "no file URL for the working directory")?,
        };

        Ok(url.to_string())
    }

    fn read(self) -> Result<String, Box<dyn std::error::Error>> {
        match self {
            Target::Url(url) => {
                let client = reqwest::blocking::Client::new();
                let response = client.get(url).send()?.error_for_status()?;
                let content_type = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok());

                if content_type.is_some_and(|ct| !ct.starts_with("text/html")) {
                    return Err("content type is not text/html".into());
                }

                Ok(response.text()?)
            }
            Target::File(path) => Ok(std::fs::read_to_string(path)?),
            Target::Stdin => {
                let mut input = String::new();
                std::io::stdin().read_to_string(&mut input)?;
                Ok(input)
            }
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "microdata2rdfa=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn report(diagnostics: &[ElementError]) -> ExitCode {
    for error in diagnostics {
        eprintln!("Error: {error}");
    }

    if diagnostics.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let base = match args.base {
        Some(base) => base,
        None => args.target.default_base()?,
    };
    let base = Iri::parse(base)?;
    let input = args.target.read()?;

    let document = Document::parse_html(&input);
    let base = microdata2rdfa::document_base(&document, base)?;
    tracing::debug!(%base, rdf = args.rdf, "read input");

    if args.rdf {
        let extraction = microdata2rdfa::extract_graph(&document, base.clone());

        // use serializer with all known prefixes
        let serializer = PrefixTable::new().iter().try_fold(
            oxttl::TurtleSerializer::new().with_base_iri(base.as_str())?,
            |serializer, (namespace, prefix)| serializer.with_prefix(prefix, namespace),
        )?;

        let mut locked_out = std::io::stdout().lock();
        let mut writer = serializer.for_writer(&mut locked_out);
        for triple in extraction.graph.iter() {
            writer.serialize_triple(triple)?;
        }
        writer.finish()?;

        return Ok(report(&extraction.diagnostics));
    }

    let conversion = microdata2rdfa::Converter::new(base).convert(&document);
    let mut out = conversion.write_xhtml(std::io::stdout().lock())?;
    writeln!(out)?;
    Ok(report(&conversion.diagnostics))
}
