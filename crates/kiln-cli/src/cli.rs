use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "kiln",
    author,
    version,
    about = "Build wheels and sdists for Python projects",
    disable_help_subcommand = true
)]
pub struct KilnCli {
    #[arg(short, long, action = ArgAction::Count, global = true, help = "Increase logging (-vv reaches trace)")]
    pub verbose: u8,
    #[arg(long, global = true, help = "Force trace logging regardless of -v")]
    pub trace: bool,
    #[arg(long, global = true, help = "Emit a JSON object instead of the bare file name")]
    pub json: bool,
    #[command(subcommand)]
    pub command: CommandCli,
}

#[derive(Subcommand, Debug)]
pub enum CommandCli {
    #[command(about = "Build a wheel into --out")]
    BuildWheel(BuildArgs),
    #[command(about = "Build a source distribution into --out")]
    BuildSdist(BuildArgs),
    #[command(about = "Build an editable wheel that points back at the source tree")]
    BuildEditable(BuildArgs),
    #[command(about = "Write the .dist-info directory a wheel build would contain")]
    PrepareMetadata(BuildArgs),
    #[command(about = "List extra build requirements (always empty)")]
    GetRequires(RequiresArgs),
}

#[derive(Args, Debug)]
pub struct ProjectArgs {
    #[arg(
        long,
        value_name = "DIR",
        default_value = ".",
        help = "Project root containing pyproject.toml"
    )]
    pub project: PathBuf,
    #[command(flatten)]
    pub settings: ConfigArgs,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[arg(
        short = 'C',
        long = "config-setting",
        value_name = "KEY=VALUE",
        value_parser = parse_config_setting,
        help = "PEP 517 config setting (jobs, timeout); repeatable"
    )]
    pub config: Vec<(String, String)>,
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    #[command(flatten)]
    pub project: ProjectArgs,
    #[arg(long, value_name = "DIR", default_value = "dist", help = "Output directory")]
    pub out: PathBuf,
}

#[derive(Args, Debug)]
pub struct RequiresArgs {
    #[command(flatten)]
    pub settings: ConfigArgs,
    #[arg(long, value_enum, default_value_t = RequiresFor::Wheel)]
    pub target: RequiresFor,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequiresFor {
    Wheel,
    Sdist,
    Editable,
}

fn parse_config_setting(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("config setting `{raw}` has an empty key"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_settings_split_on_the_first_equals() {
        assert_eq!(
            parse_config_setting("jobs=4"),
            Ok(("jobs".to_string(), "4".to_string()))
        );
        assert_eq!(
            parse_config_setting("note=a=b"),
            Ok(("note".to_string(), "a=b".to_string()))
        );
        assert!(parse_config_setting("jobs").is_err());
        assert!(parse_config_setting("=4").is_err());
    }

    #[test]
    fn parses_build_commands() {
        let cli = KilnCli::parse_from([
            "kiln", "--json", "build-wheel", "--project", "demo", "--out", "wheels", "-C", "jobs=2",
        ]);
        assert!(cli.json);
        let CommandCli::BuildWheel(args) = cli.command else {
            panic!("expected build-wheel");
        };
        assert_eq!(args.project.project, PathBuf::from("demo"));
        assert_eq!(args.out, PathBuf::from("wheels"));
        assert_eq!(args.project.settings.config, vec![("jobs".into(), "2".into())]);
    }

    #[test]
    fn get_requires_takes_only_config_settings() {
        let cli = KilnCli::parse_from(["kiln", "get-requires", "--target", "sdist", "-C", "jobs=3"]);
        let CommandCli::GetRequires(args) = cli.command else {
            panic!("expected get-requires");
        };
        assert_eq!(args.target, RequiresFor::Sdist);
        assert_eq!(args.settings.config, vec![("jobs".into(), "3".into())]);

        let err = KilnCli::try_parse_from(["kiln", "get-requires", "--project", "demo"])
            .expect_err("get-requires has no project flag");
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }
}
