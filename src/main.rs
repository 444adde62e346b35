use file_merger::app_logic::MergerAppLogic;
use file_merger::core::config::{APP_NAME, LOG_FILENAME};
use file_merger::core::path_utils;
use file_merger::core::{LoadOutcome, MergeOutcome, MergerConfig};
use simplelog::{
    ColorChoice, CombinedLogger, Config, LevelFilter, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};
use std::env;
use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;

const LOG_LEVEL_ENV: &str = "FILE_MERGER_LOG";

#[derive(Debug, Default)]
struct CliOptions {
    project: Option<String>,
    root: Option<PathBuf>,
    select_all: bool,
    merge: Option<Option<PathBuf>>,
}

fn usage() -> String {
    "Usage: file_merger [--project <name>] [--root <dir>] [--select-all] [--merge [<output>]]"
        .to_string()
}

fn parse_args(args: &[String]) -> Result<CliOptions, String> {
    let mut options = CliOptions::default();
    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--project" => {
                let name = iter.next().ok_or("--project needs a name")?;
                options.project = Some(name.clone());
            }
            "--root" => {
                let dir = iter.next().ok_or("--root needs a directory")?;
                options.root = Some(PathBuf::from(dir));
            }
            "--select-all" => options.select_all = true,
            "--merge" => {
                let output = iter
                    .next_if(|next| !next.starts_with("--"))
                    .map(PathBuf::from);
                options.merge = Some(output);
            }
            "-h" | "--help" => return Err(usage()),
            other => return Err(format!("Unknown argument '{other}'\n{}", usage())),
        }
    }
    Ok(options)
}

fn init_logging() {
    let term_level = env::var(LOG_LEVEL_ENV)
        .ok()
        .and_then(|level| level.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        term_level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];
    if let Some(dir) = path_utils::get_base_app_config_local_dir(APP_NAME) {
        match File::create(dir.join(LOG_FILENAME)) {
            Ok(file) => loggers.push(WriteLogger::new(LevelFilter::Debug, Config::default(), file)),
            Err(e) => eprintln!("Could not create log file in {dir:?}: {e}"),
        }
    }
    if let Err(e) = CombinedLogger::init(loggers) {
        eprintln!("Failed to initialize logging: {e}");
    }
}

fn run(options: CliOptions) -> Result<(), Box<dyn std::error::Error>> {
    let mut app = MergerAppLogic::with_core_services(MergerConfig::default());
    match app.startup() {
        LoadOutcome::Recovered { reason } => {
            println!("Preferences could not be read ({reason}); started with a new default project.")
        }
        LoadOutcome::FellBackToDefault { requested } => {
            println!("Project '{requested}' no longer exists; using the default project.")
        }
        _ => {}
    }

    if let Some(name) = &options.project {
        if app.store().get(name).is_some() {
            app.switch_project(name)?;
        } else {
            app.create_project(name)?;
        }
    }
    if let Some(root) = &options.root {
        app.change_root_directory(root)?;
    }
    if !app.is_tree_ready() {
        return Err(app.status_message().to_string().into());
    }

    // Restored selections below collapsed directories only become live once loaded.
    let root = app.session().root_dir().to_path_buf();
    if options.select_all || options.merge.is_some() {
        app.on_expand_all(&root)?;
    }
    if options.select_all {
        app.select_all_loaded();
    }

    println!("Project: {}", app.store().current_name());
    println!("Root:    {}", root.display());
    println!("Output:  {}", app.session().output_dir().display());
    println!("{}", app.selection_stats().summary_line());

    if let Some(output) = options.merge {
        let output = output.unwrap_or_else(|| app.suggested_output_path());
        match app.merge_now(&output)? {
            MergeOutcome::Completed {
                files_written,
                output_path,
            } => println!("Merged {files_written} files into {}", output_path.display()),
            MergeOutcome::Cancelled { files_written, .. } => {
                println!("Merge cancelled after {files_written} files")
            }
        }
    }

    app.on_closing()?;
    Ok(())
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(2);
        }
    };
    init_logging();
    log::debug!("Main: Starting with {options:?}");

    match run(options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Main: {e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_merge_with_and_without_output() {
        let options = parse_args(&args(&["--merge", "--select-all"])).unwrap();
        assert_eq!(options.merge, Some(None));
        assert!(options.select_all);

        let options = parse_args(&args(&["--project", "Work", "--merge", "out.txt"])).unwrap();
        assert_eq!(options.project.as_deref(), Some("Work"));
        assert_eq!(options.merge, Some(Some(PathBuf::from("out.txt"))));
    }

    #[test]
    fn test_parse_rejects_unknown_and_incomplete_arguments() {
        assert!(parse_args(&args(&["--bogus"])).is_err());
        assert!(parse_args(&args(&["--root"])).is_err());
    }
}
