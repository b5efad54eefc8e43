use std::path::Path;

use clap::Parser;
use color_eyre::Result;
use kiln_core::{backend, BuildError, ConfigSettings};
use serde::Serialize;

mod cli;

use cli::{BuildArgs, CommandCli, ConfigArgs, KilnCli, RequiresFor};

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = KilnCli::parse();
    init_tracing(cli.trace, cli.verbose);

    let code = match run(&cli.command) {
        Ok(outcome) => emit_success(&cli, &outcome)?,
        Err(err) => emit_failure(&cli, &err)?,
    };
    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(trace: bool, verbose: u8) {
    let level = if trace {
        "trace"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("kiln={level},kiln_core={level},kiln_domain={level},kiln_cli={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[derive(Debug, Serialize)]
#[serde(tag = "hook", rename_all = "snake_case")]
enum Outcome {
    BuildWheel { file: String },
    BuildSdist { file: String },
    BuildEditable { file: String },
    PrepareMetadata { dist_info: String },
    GetRequires { requires: Vec<String> },
}

impl Outcome {
    fn human(&self) -> String {
        match self {
            Self::BuildWheel { file } | Self::BuildSdist { file } | Self::BuildEditable { file } => {
                file.clone()
            }
            Self::PrepareMetadata { dist_info } => dist_info.clone(),
            Self::GetRequires { requires } => requires.join("\n"),
        }
    }
}

fn config_settings(args: &ConfigArgs) -> ConfigSettings {
    args.config.iter().cloned().collect()
}

fn run(command: &CommandCli) -> kiln_core::Result<Outcome> {
    match command {
        CommandCli::BuildWheel(args) => {
            let (root, out, config) = build_inputs(args);
            Ok(Outcome::BuildWheel {
                file: backend::build_wheel(root, out, &config, None)?,
            })
        }
        CommandCli::BuildSdist(args) => {
            let (root, out, config) = build_inputs(args);
            Ok(Outcome::BuildSdist {
                file: backend::build_sdist(root, out, &config)?,
            })
        }
        CommandCli::BuildEditable(args) => {
            let (root, out, config) = build_inputs(args);
            Ok(Outcome::BuildEditable {
                file: backend::build_editable(root, out, &config, None)?,
            })
        }
        CommandCli::PrepareMetadata(args) => {
            let (root, out, config) = build_inputs(args);
            Ok(Outcome::PrepareMetadata {
                dist_info: backend::prepare_metadata_for_build_wheel(root, out, &config)?,
            })
        }
        CommandCli::GetRequires(args) => {
            let config = config_settings(&args.settings);
            let requires = match args.target {
                RequiresFor::Wheel => backend::get_requires_for_build_wheel(&config),
                RequiresFor::Sdist => backend::get_requires_for_build_sdist(&config),
                RequiresFor::Editable => backend::get_requires_for_build_editable(&config),
            };
            Ok(Outcome::GetRequires { requires })
        }
    }
}

fn build_inputs(args: &BuildArgs) -> (&Path, &Path, ConfigSettings) {
    (
        args.project.project.as_path(),
        args.out.as_path(),
        config_settings(&args.project.settings),
    )
}

fn emit_success(cli: &KilnCli, outcome: &Outcome) -> Result<i32> {
    if cli.json {
        let payload = serde_json::json!({ "status": "ok", "result": outcome });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        let text = outcome.human();
        if !text.is_empty() {
            println!("{text}");
        }
    }
    Ok(0)
}

/// Project problems exit 1; environment and I/O failures exit 2.
fn emit_failure(cli: &KilnCli, err: &BuildError) -> Result<i32> {
    let kind = err.kind();
    let code = match kind {
        kiln_core::ErrorKind::Configuration
        | kiln_core::ErrorKind::Selection
        | kiln_core::ErrorKind::Format => 1,
        kiln_core::ErrorKind::Io | kiln_core::ErrorKind::Cancelled => 2,
    };
    if cli.json {
        let payload = serde_json::json!({
            "status": "error",
            "kind": kind,
            "code": err.code(),
            "message": err.to_string(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        eprintln!("error: {err}");
    }
    Ok(code)
}
