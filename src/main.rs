use std::str::FromStr;

use anyhow::*;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::Verbosity;
use log::*;
use owo_colors::OwoColorize;
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value as Json;

use hail_ir::{
    cse::{self, CseRenderer},
    expr::to_expr,
    impute::impute_type,
    ir::parse_ir,
    parser::parse_sexps,
    types::Type,
    value::Value,
};

#[derive(Parser)]
#[clap(author, version = concat!(env!("CARGO_PKG_VERSION"), " ", env!("GIT_HASH")))]
#[clap(propagate_version = true)]
pub struct Args {
    #[clap(flatten)]
    verbose: Verbosity,

    #[clap(
        short = 't',
        long = "threads",
        help = "number of threads to use",
        default_value_t = 1,
        global = true
    )]
    threads: usize,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the type imputed for JSON-encoded values
    Impute {
        #[clap(required = true, help = "JSON values to type")]
        values: Vec<String>,

        #[clap(long = "json", help = "print the types as JSON documents")]
        json: bool,
    },
    /// Lift a JSON-encoded value to an expression and print its IR
    Lift {
        #[clap(help = "the JSON value to lift")]
        value: String,

        #[clap(
            short = 'T',
            long = "type",
            help = "the type to lift the value as, instead of the imputed one"
        )]
        typ: Option<String>,
    },
    /// Render textual value IR, binding repeated subexpressions
    Render {
        #[clap(
            required = true,
            help = "either files or strings containing the IR to render"
        )]
        sources: Vec<String>,

        #[clap(long = "plain", help = "render without sharing subexpressions")]
        plain: bool,
    },
    /// Print the IR form of a type
    ParseType {
        #[clap(help = "a type, e.g. 'dict<str, array<int32>>'")]
        typ: String,

        #[clap(long = "json", help = "print the type as a JSON document")]
        json: bool,
    },
}

#[derive(Serialize)]
struct Imputed<'a> {
    value: &'a str,
    #[serde(rename = "type")]
    typ: Type,
    ir: String,
}

fn parse_value(source: &str) -> Result<Value> {
    let json: Json =
        serde_json::from_str(source).with_context(|| anyhow!("while parsing `{}`", source))?;
    Ok(Value::from_json_untyped(&json))
}

fn read_source(s: &str) -> Result<(String, String)> {
    if std::path::Path::new(s).is_file() {
        Ok((
            s.to_owned(),
            std::fs::read_to_string(s).with_context(|| anyhow!("reading `{}`", s))?,
        ))
    } else {
        Ok(("Immediate expression".to_owned(), s.to_owned()))
    }
}

fn render(sources: &[String], plain: bool) -> Result<()> {
    let inputs = sources
        .iter()
        .map(|s| read_source(s))
        .collect::<Result<Vec<_>>>()?;
    let renderer = CseRenderer::new();
    let rendered = inputs
        .par_iter()
        .map(|(name, source)| -> Result<Vec<String>> {
            info!("Rendering {}", name);
            parse_sexps(source)
                .with_context(|| anyhow!("while parsing {}", name))?
                .iter()
                .map(|sexp| {
                    let ir = parse_ir(sexp).with_context(|| anyhow!("in {}", name))?;
                    Ok(if plain {
                        ir.to_string()
                    } else {
                        renderer.render(&ir)
                    })
                })
                .collect()
        })
        .collect::<Result<Vec<_>>>()?;
    for r in rendered.into_iter().flatten() {
        println!("{}", r);
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    buche::new()
        .verbosity(args.verbose.log_level_filter())
        .quiet(args.verbose.is_silent())
        .init()
        .map_err(|e| anyhow!("failed to initialize logging: {}", e))?;

    rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build_global()
        .context("while initializing the thread pool")?;

    match args.command {
        Commands::Impute { values, json } => {
            let mut imputed = Vec::with_capacity(values.len());
            for v in values.iter() {
                let typ = impute_type(&parse_value(v)?)?;
                if json {
                    imputed.push(Imputed {
                        value: v,
                        ir: typ.parsable_string(),
                        typ,
                    });
                } else {
                    println!("{}  {}", v, typ.bold());
                }
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&imputed)?);
            }
        }
        Commands::Lift { value, typ } => {
            let v = parse_value(&value)?;
            let t = typ.as_deref().map(Type::from_str).transpose()?;
            let e = to_expr(v, t.as_ref())?;
            println!("{}", "IR".bold().blue());
            println!("    {}", e.ir());
            println!("{}", "Shared".bold().blue());
            println!("    {}", cse::render(e.ir()));
            println!("{}", e.describe());
        }
        Commands::Render { sources, plain } => render(&sources, plain)?,
        Commands::ParseType { typ, json } => {
            let t = Type::from_str(&typ)?;
            if json {
                println!("{}", serde_json::to_string(&t)?);
            } else {
                println!("{}", t.parsable_string());
            }
        }
    }

    Ok(())
}
