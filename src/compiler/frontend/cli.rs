use super::config::{Config, ErrorFormat, CONFIG_FILE_NAMES};
use crate::compiler::errors::{Severity, TypeError};
use crate::infrastructure::logging::{self, LogConfig, LogFormat};
use crate::infrastructure::parallel::{FileReport, ParallelAnalyzer};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Exit status when no error diagnostics were reported
pub const EXIT_OK: i32 = 0;
pub const EXIT_ERRORS: i32 = 1;
/// Bad arguments, unreadable configuration, missing paths
pub const EXIT_USAGE: i32 = 2;

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub paths: Vec<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub format: Option<ErrorFormat>,
    pub no_color: bool,
    pub max_errors: Option<usize>,
    /// Worker threads, 0 = one per core
    pub jobs: usize,
    pub parallel: bool,
    pub init: bool,
    pub help: bool,
    pub verbosity: u8,
    pub log_format: LogFormat,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            config_path: None,
            format: None,
            no_color: false,
            max_errors: None,
            jobs: 0,
            parallel: true,
            init: false,
            help: false,
            verbosity: 0,
            log_format: LogFormat::Compact,
        }
    }
}

pub fn usage(prog: &str) -> String {
    format!(
        "paramspec - checks ParamSpec usage in Python signatures\n\n\
        USAGE:\n    {prog} [OPTIONS] <paths...>\n\n\
        OPTIONS:\n    \
        -h, --help              Print help information\n    \
        --config <file>         Use this configuration instead of discovering one\n    \
        --format <fmt>          default, json, compact or verbose\n    \
        --no-color              Disable colored output\n    \
        --max-errors <n>        Maximum errors reported per file\n    \
        --jobs <n>              Worker threads (0 = one per core)\n    \
        --no-parallel           Check files one at a time\n    \
        --init                  Write a default {config} and exit\n    \
        -v, -vv                 Log progress (info, debug)\n    \
        --log-format <fmt>      pretty, compact or json\n\n\
        EXAMPLES:\n    \
        {prog} src/\n    \
        {prog} --format json decorators.py",
        prog = prog,
        config = CONFIG_FILE_NAMES[0]
    )
}

/// Parse `argv` without the program name
pub fn parse_args<I, S>(args: I) -> Result<CliConfig, String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let args: Vec<String> = args.into_iter().map(Into::into).collect();
    let mut config = CliConfig::default();
    let mut i = 0;

    let value = |i: &mut usize, flag: &str| -> Result<String, String> {
        *i += 1;
        args.get(*i)
            .cloned()
            .ok_or_else(|| format!("{} requires an argument", flag))
    };

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => config.help = true,
            "--no-color" => config.no_color = true,
            "--no-parallel" => config.parallel = false,
            "--init" => config.init = true,
            "--config" => config.config_path = Some(PathBuf::from(value(&mut i, "--config")?)),
            "--format" => config.format = Some(value(&mut i, "--format")?.parse()?),
            "--log-format" => config.log_format = value(&mut i, "--log-format")?.parse()?,
            "--max-errors" => {
                config.max_errors = Some(
                    value(&mut i, "--max-errors")?
                        .parse()
                        .map_err(|_| "Invalid value for --max-errors".to_string())?,
                )
            }
            "--jobs" | "-j" => {
                config.jobs = value(&mut i, "--jobs")?
                    .parse()
                    .map_err(|_| "Invalid value for --jobs".to_string())?
            }
            flag if flag.starts_with("-v") && flag[1..].chars().all(|c| c == 'v') => {
                config.verbosity = config.verbosity.saturating_add((flag.len() - 1) as u8);
            }
            flag if flag.starts_with('-') => return Err(format!("Unknown option: {}", flag)),
            path => config.paths.push(PathBuf::from(path)),
        }
        i += 1;
    }

    if config.paths.is_empty() && !config.init && !config.help {
        return Err("No paths specified".to_string());
    }

    Ok(config)
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    files: &'a [FileReport],
    summary: Summary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub files: usize,
    pub errors: usize,
    pub notes: usize,
}

impl Summary {
    pub fn of(reports: &[FileReport]) -> Self {
        Self {
            files: reports.len(),
            errors: reports.iter().map(FileReport::error_count).sum(),
            notes: reports
                .iter()
                .flat_map(|r| &r.errors)
                .filter(|e| e.severity == Severity::Note)
                .count(),
        }
    }
}

pub struct Cli {
    options: CliConfig,
    config: Config,
}

impl Cli {
    /// Resolve the configuration file and fold command-line overrides into it
    pub fn new(options: CliConfig) -> Result<Self, String> {
        let mut config = match &options.config_path {
            Some(path) => Config::load(path)?,
            None => {
                let start = options
                    .paths
                    .first()
                    .map(|p| {
                        if p.is_dir() {
                            p.clone()
                        } else {
                            p.parent().map(Path::to_path_buf).unwrap_or_default()
                        }
                    })
                    .filter(|p| !p.as_os_str().is_empty())
                    .or_else(|| std::env::current_dir().ok());
                start.map_or_else(Config::default, |dir| Config::discover_from(&dir))
            }
        };

        if let Some(format) = options.format {
            config.errors.format = format;
        }
        if let Some(max_errors) = options.max_errors {
            config.errors.max_errors = max_errors;
        }
        if options.no_color {
            config.errors.color = false;
        }

        Ok(Self { options, config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn run(&self) -> Result<i32, String> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.run_with_output(&mut out)
    }

    pub fn run_with_output(&self, out: &mut dyn Write) -> Result<i32, String> {
        if self.options.init {
            let dir = self.options.paths.first().cloned().unwrap_or_else(|| PathBuf::from("."));
            let path = write_default_config(&dir)?;
            writeln!(out, "Wrote {}", path.display()).map_err(|e| e.to_string())?;
            return Ok(EXIT_OK);
        }

        let analyzer = ParallelAnalyzer::new(self.config.clone())
            .with_workers(self.options.jobs)
            .with_parallel(self.options.parallel);
        let reports = analyzer.analyze_paths(&self.options.paths)?;

        let summary = Summary::of(&reports);
        info!(files = summary.files, errors = summary.errors, "Check finished");

        let rendered = self.render(&reports)?;
        out.write_all(rendered.as_bytes()).map_err(|e| e.to_string())?;

        Ok(if summary.errors == 0 { EXIT_OK } else { EXIT_ERRORS })
    }

    pub fn render(&self, reports: &[FileReport]) -> Result<String, String> {
        let summary = Summary::of(reports);
        let errors = &self.config.errors;

        if errors.format == ErrorFormat::Json {
            let mut json = serde_json::to_string_pretty(&JsonOutput { files: reports, summary })
                .map_err(|e| format!("Failed to serialize diagnostics: {}", e))?;
            json.push('\n');
            return Ok(json);
        }

        let mut out = String::new();
        for report in reports {
            if errors.format == ErrorFormat::Verbose {
                let ms = report.duration_ms;
                out.push_str(&format!("checked {} in {}ms\n", report.path.display(), ms));
            }
            for diagnostic in &report.errors {
                let line = match errors.format {
                    ErrorFormat::Compact => compact(diagnostic),
                    _ => diagnostic.render(errors.show_error_codes, errors.show_suggestions),
                };
                out.push_str(&self.paint(&line, diagnostic.severity));
                out.push('\n');
            }
            if report.dropped > 0 {
                out.push_str(&format!(
                    "{}: {} more error{} not shown\n",
                    report.path.display(),
                    report.dropped,
                    plural(report.dropped)
                ));
            }
        }

        if errors.format != ErrorFormat::Compact {
            out.push_str(&self.summary_line(&summary));
            out.push('\n');
        }
        Ok(out)
    }

    fn summary_line(&self, summary: &Summary) -> String {
        if summary.errors == 0 {
            let line = format!(
                "✓ Checked {} file{}, no errors found",
                summary.files,
                plural(summary.files)
            );
            self.paint_with(&line, "32")
        } else {
            let line = format!(
                "Found {} error{} in {} file{}",
                summary.errors,
                plural(summary.errors),
                summary.files,
                plural(summary.files)
            );
            self.paint_with(&line, "31")
        }
    }

    fn paint(&self, text: &str, severity: Severity) -> String {
        match severity {
            Severity::Error => self.paint_with(text, "31"),
            Severity::Note => self.paint_with(text, "36"),
        }
    }

    fn paint_with(&self, text: &str, code: &str) -> String {
        if self.config.errors.color {
            format!("\x1b[{}m{}\x1b[0m", code, text)
        } else {
            text.to_string()
        }
    }
}

fn compact(diagnostic: &TypeError) -> String {
    format!(
        "{}:{}:{}: {}: {}",
        diagnostic.file,
        diagnostic.location.line,
        diagnostic.location.col,
        diagnostic.code,
        diagnostic.message
    )
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

/// Write the default configuration into `dir`, refusing to overwrite
pub fn write_default_config(dir: &Path) -> Result<PathBuf, String> {
    let path = dir.join(CONFIG_FILE_NAMES[0]);
    if path.exists() {
        return Err(format!("{} already exists", path.display()));
    }
    Config::default().save(&path)?;
    debug!(path = %path.display(), "Wrote default config");
    Ok(path)
}

/// Entry point for the binary; returns the process exit status
pub fn cli_main() -> i32 {
    let mut argv = std::env::args();
    let prog = argv.next().unwrap_or_else(|| "paramspec".to_string());

    let options = match parse_args(argv) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{}\n\n{}", e, usage(&prog));
            return EXIT_USAGE;
        }
    };

    if options.help {
        println!("{}", usage(&prog));
        return EXIT_OK;
    }

    let _guard = logging::init_logging(
        LogConfig::from_verbosity(options.verbosity).with_format(options.log_format),
    );
    debug!(paths = ?options.paths, jobs = options.jobs, "Parsed arguments");

    let cli = match Cli::new(options) {
        Ok(cli) => cli,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            eprintln!("{}", e);
            return EXIT_USAGE;
        }
    };

    match cli.run() {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Check failed");
            eprintln!("{}", e);
            EXIT_USAGE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let options = parse_args([
            "--format", "json", "--no-color", "--max-errors", "5", "--jobs", "2", "-vv", "src",
        ])
        .unwrap();

        assert_eq!(options.format, Some(ErrorFormat::Json));
        assert!(options.no_color);
        assert_eq!(options.max_errors, Some(5));
        assert_eq!(options.jobs, 2);
        assert_eq!(options.verbosity, 2);
        assert_eq!(options.paths, vec![PathBuf::from("src")]);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_args(Vec::<String>::new()).unwrap_err(), "No paths specified");
        assert!(parse_args(["--max-errors"]).unwrap_err().contains("requires an argument"));
        assert!(parse_args(["--max-errors", "many", "a.py"]).is_err());
        assert!(parse_args(["--format", "xml", "a.py"]).is_err());
        assert_eq!(parse_args(["--strict", "a.py"]).unwrap_err(), "Unknown option: --strict");
    }

    #[test]
    fn test_init_needs_no_paths() {
        let options = parse_args(["--init"]).unwrap();
        assert!(options.init);
        assert!(options.paths.is_empty());
    }

    #[test]
    fn test_compact_line() {
        let location = crate::compiler::errors::SourceLocation::new(3, 4, 3, 9);
        let error = TypeError::invalid_declaration("bad", location).with_file("m.py".to_string());
        assert_eq!(
            compact(&error),
            "m.py:3:4: paramspec-declaration: Invalid ParamSpec declaration: bad"
        );
    }
}
