//! Parsetrail - step through how an HTML parser builds a tree
//!
//! Usage: parsetrail [OPTIONS] <FILE>

use std::env;
use std::error::Error;
use std::fs::{self, File};
use std::io::{self, Read};
use std::process::ExitCode;

use log::debug;
use parsetrail_dom::render::{replace_invisible, TreePrinter};
use parsetrail_html::{Capabilities, HostParser, ReferenceHost, ScriptedHost};
use parsetrail_playback::{build, respond, Markup, Request};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Settings gathered from the command line
#[derive(Debug, Default, PartialEq)]
struct CliConfig {
    /// HTML file, `-` for stdin
    input: Option<String>,
    context_html: Option<String>,
    selector: Option<String>,
    legacy: bool,
    xml: bool,
    json: bool,
    frame: Option<usize>,
    replay: Option<String>,
    request: Option<String>,
    show_closers: bool,
    show_invisible: bool,
    show_virtual: bool,
}

#[derive(Debug, PartialEq)]
enum Command {
    Help,
    Version,
    Run(CliConfig),
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("parsetrail");

    match parse_args(&args[1.min(args.len())..]) {
        Ok(Command::Help) => {
            print_usage(program);
            ExitCode::SUCCESS
        }
        Ok(Command::Version) => {
            println!("Parsetrail {}", VERSION);
            ExitCode::SUCCESS
        }
        Ok(Command::Run(config)) => {
            if let Err(e) = run(&config) {
                eprintln!("Error: {}", e);
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage(program);
            ExitCode::FAILURE
        }
    }
}

fn print_usage(program: &str) {
    println!(
        r#"Parsetrail {} - step through how an HTML parser builds a tree

USAGE:
    {} [OPTIONS] <FILE>

Reads HTML from FILE, or from stdin when FILE is "-".

OPTIONS:
    -h, --help              Print this help message
    -V, --version           Print version information
    --context <HTML>        Parse as a fragment inside the last element of HTML
    --selector <SELECTOR>   Ask the parser to flag elements matching SELECTOR
    --legacy                Use a fragment-only parser without optional features
    --xml                   Treat the input as an XML document (needs --replay)
    --json                  Print the full JSON response
    --frame <N>             Print playback frame N instead of the final tree
    --replay <FILE.json>    Replay recorded token streams instead of parsing
    --request <FILE.json>   Read a {{"html", "contextHTML", "selector", "markup"}} request
    --show-closers          Include closer nodes in the tree
    --show-invisible        Show control characters as visible symbols
    --show-virtual          Mark nodes the parser synthesized

EXAMPLES:
    {} page.html
    {} --context '<table>' --show-closers rows.html
    echo '<p>Hi' | {} --frame 5 -
    {} --json --request request.json

"#,
        VERSION, program, program, program, program, program
    );
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    let mut config = CliConfig::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(Command::Help),
            "--version" | "-V" => return Ok(Command::Version),
            "--context" => config.context_html = Some(value_of(&mut iter, arg)?),
            "--selector" => config.selector = Some(value_of(&mut iter, arg)?),
            "--legacy" => config.legacy = true,
            "--xml" => config.xml = true,
            "--json" => config.json = true,
            "--frame" => {
                let value = value_of(&mut iter, arg)?;
                let frame = value
                    .parse()
                    .map_err(|_| format!("Invalid frame number: {}", value))?;
                config.frame = Some(frame);
            }
            "--replay" => config.replay = Some(value_of(&mut iter, arg)?),
            "--request" => config.request = Some(value_of(&mut iter, arg)?),
            "--show-closers" => config.show_closers = true,
            "--show-invisible" => config.show_invisible = true,
            "--show-virtual" => config.show_virtual = true,
            flag if flag.starts_with("--") => return Err(format!("Unknown option: {}", flag)),
            path => {
                if config.input.is_some() {
                    return Err(format!("Unexpected argument: {}", path));
                }
                config.input = Some(path.to_string());
            }
        }
    }

    if config.input.is_none() && config.request.is_none() {
        return Err("No input given".to_string());
    }
    Ok(Command::Run(config))
}

fn value_of<'a>(iter: &mut impl Iterator<Item = &'a String>, flag: &str) -> Result<String, String> {
    iter.next()
        .cloned()
        .ok_or_else(|| format!("{} needs a value", flag))
}

fn run(config: &CliConfig) -> Result<(), Box<dyn Error>> {
    let request = load_request(config)?;

    match &config.replay {
        Some(path) => {
            debug!("Replaying token streams from {}", path);
            let host = ScriptedHost::from_reader(File::open(path)?)?;
            show(&host, &request, config)
        }
        None if config.legacy => {
            debug!("Using the fragment-only parser");
            let host = ReferenceHost::with_capabilities(Capabilities::minimal());
            show(&host, &request, config)
        }
        None => show(&ReferenceHost::new(), &request, config),
    }
}

/// Request from `--request`, or built from the input file and flags
fn load_request(config: &CliConfig) -> Result<Request, Box<dyn Error>> {
    let mut request = match (&config.request, &config.input) {
        (Some(path), _) => Request::from_json(&fs::read_to_string(path)?)?,
        (None, Some(path)) if path == "-" => {
            let mut html = String::new();
            io::stdin().read_to_string(&mut html)?;
            Request::new(html)
        }
        (None, Some(path)) => Request::new(fs::read_to_string(path)?),
        (None, None) => return Err("No input given".into()),
    };

    if config.context_html.is_some() {
        request.context_html = config.context_html.clone();
    }
    if config.selector.is_some() {
        request.selector = config.selector.clone();
    }
    if config.xml {
        request.markup = Markup::Xml;
    }
    Ok(request)
}

fn show<H: HostParser>(host: &H, request: &Request, config: &CliConfig) -> Result<(), Box<dyn Error>> {
    if config.json {
        println!("{}", respond(host, request).to_json()?);
        return Ok(());
    }

    let result = build(host, &request.html, &request.options())?;
    for warning in &result.warnings {
        eprintln!("warning: {}", warning);
    }

    let printer = TreePrinter {
        show_closers: config.show_closers,
        show_invisible: config.show_invisible,
        show_virtual: config.show_virtual,
    };
    let visible = |s: &str| {
        if config.show_invisible {
            replace_invisible(s)
        } else {
            s.to_string()
        }
    };

    if let Some(index) = config.frame {
        let frame = result.playback.get(index).ok_or_else(|| {
            format!(
                "Frame {} out of range, playback has {} frames",
                index,
                result.playback.len()
            )
        })?;
        println!("=== Frame {} of {} ===\n", index, result.playback.len());
        println!("Consumed: {}\n", visible(frame.consumed_input_prefix()));
        print!("{}", printer.print(frame.tree()));
        return Ok(());
    }

    println!("=== Tree ===\n");
    print!("{}", printer.print(&result.tree));

    println!("\n=== Stats ===");
    if let Some(context) = &result.context_node_name {
        println!("Context: {}", context);
    }
    println!("Compat mode: {}", result.compat_mode);
    if let Some(title) = &result.document_title {
        println!("Title: {}", visible(title));
    }
    println!("Tokens: {}", result.tokens.len());
    println!("Frames: {}", result.playback.len());
    println!("Nodes: {}", result.tree.node_count());

    Ok(())
}
